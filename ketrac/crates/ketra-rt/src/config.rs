//! Tunables for a [`crate::vm::Vm`] instance.
//!
//! Every knob gets its own doc comment and a `Default` chosen to behave
//! well for an embedded script, not a server-sized heap.

/// Collector tunables, threaded into [`crate::gc::Msg::new`].
#[derive(Debug, Clone)]
pub struct GcConfig {
    /// Bytes a freshly allocated object must have survived one collection
    /// cycle in generation 0 before it is promoted to generation 1 on the
    /// next write barrier hit.
    pub promotion_threshold_bytes: usize,

    /// Soft cap on total live heap bytes. Crossing it while generation 0 is
    /// not already being collected forces a `Step` call before the
    /// allocation that crossed it proceeds.
    pub max_heap_bytes: usize,

    /// Number of gray objects `Propagate` drains per `Step` tick. Smaller
    /// values spread a cycle's pause cost over more ticks at the expense of
    /// a longer cycle; larger values finish sooner but with fatter pauses.
    pub propagate_quantum: usize,

    /// Whether `Step` is ever called implicitly by the allocator, as opposed
    /// to only by the interpreter's `gc_tick` opcode. The `ketra` CLI
    /// disables this for `--gc=manual`.
    pub auto_step: bool,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            promotion_threshold_bytes: 0,
            max_heap_bytes: 256 * 1024 * 1024,
            propagate_quantum: 512,
            auto_step: true,
        }
    }
}

/// Top-level runtime tunables, composed with [`GcConfig`].
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Initial byte capacity of a thread's primitive and object stacks
    ///. Both stacks grow independently by doubling.
    pub initial_stack_bytes: usize,

    /// Hard cap on stack depth in frames, checked on `call`/`frame`.
    pub max_stack_frames: usize,

    /// Initial byte capacity of each global `MemorySegment`.
    pub initial_segment_bytes: usize,

    /// Collector configuration.
    pub gc: GcConfig,

    /// Enable the sampling profiler thread at `Vm` construction.
    pub enable_profiler: bool,

    /// Sampling interval for the profiler thread, in microseconds.
    pub profiler_interval_micros: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            initial_stack_bytes: 64 * 1024,
            max_stack_frames: 4096,
            initial_segment_bytes: 4096,
            gc: GcConfig::default(),
            enable_profiler: false,
            profiler_interval_micros: 1000,
        }
    }
}
