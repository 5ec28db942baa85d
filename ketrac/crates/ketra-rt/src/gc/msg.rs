//! `Msg`: the incremental, non-moving, two-generation mark-sweep collector.
//!
//! Phases are driven by repeated `Step` calls through `MarkRoot`,
//! `Propagate`, `Atomic`, and `SweepYoung`, with a `WriteBarrier` hook on
//! every object store. Two simplifications recorded in DESIGN.md: there is
//! no separate remembered set for old-to-young pointers — the write barrier
//! promotes a young referent to old the moment an old object stores a
//! reference to it, which makes a remembered set unnecessary; and a
//! separate `Remark` phase is folded into `Atomic` since this collector is
//! incremental but not concurrent (the mutator never runs during a `Step`).

use crate::gc::scanner::GrayWorklist;
use crate::gc::{GcCollector, GcStats, Registry};
use crate::object::shapes::WeakMapShape;
use crate::object::{Color, Generation, Kind, ObjectPayload, ObjectRef};
use crate::config::GcConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Pause,
    MarkRoot,
    Propagate,
    Atomic,
    SweepWeak,
    SweepYoung,
    SweepOld,
    Finalize,
}

pub struct Msg {
    config: GcConfig,
    phase: Phase,
    /// The white shade that means "not yet proven alive" in the cycle
    /// currently running. Flips every cycle so surviving black objects from
    /// the previous cycle don't need to be repainted one at a time.
    current_white: Color,
    gray: GrayWorklist,
    stats: GcStats,
}

impl Msg {
    pub fn new(config: GcConfig) -> Self {
        Self {
            config,
            phase: Phase::Pause,
            current_white: Color::White0,
            gray: GrayWorklist::new(),
            stats: GcStats::default(),
        }
    }

    fn other_white(&self) -> Color {
        match self.current_white {
            Color::White0 => Color::White1,
            Color::White1 => Color::White0,
            _ => unreachable!("current_white is never Gray/Black"),
        }
    }

    fn mark_roots(&mut self, roots: &[ObjectRef]) {
        for &root in roots {
            self.gray.shade(root, self.current_white);
        }
    }

    /// Drain at most `quantum` entries from the gray worklist, greying
    /// every white child found along the way.
    fn propagate(&mut self, quantum: usize) {
        for _ in 0..quantum {
            let Some(obj) = self.gray.pop() else { break };
            obj.header().set_color(Color::Black);
            let current_white = self.current_white;
            let mut gray = std::mem::take(&mut self.gray);
            obj.trace_children(|child| gray.shade(child, current_white));
            self.gray = gray;
        }
    }

    fn sweep_weak(&mut self, registry: &mut Registry) {
        // Objects never reached by `Propagate` are still wearing this
        // cycle's "white" at this point; anything else survived.
        let dead_white = self.current_white;
        for obj in registry.iter() {
            if obj.kind() != Kind::WeakMap {
                continue;
            }
            let mut obj = obj;
            if let ObjectPayload::WeakMap(WeakMapShape { entries }) = obj.payload_mut() {
                entries.retain(|(key, _)| match key {
                    crate::object::Slot::Obj(Some(k)) => k.header().color() != dead_white,
                    _ => true,
                });
            }
        }
    }

    fn sweep_generation(&mut self, registry: &mut Registry, generation: Generation) {
        let dead_white = self.current_white;
        let mut reclaimed = 0u64;
        registry.sweep_where(
            |obj| {
                obj.header().generation() == generation
                    && obj.header().color() == dead_white
                    && obj.header().handle_count() == 0
            },
            |_| reclaimed += 1,
        );
        self.stats.objects_reclaimed += reclaimed;
        self.stats.bytes_reclaimed += reclaimed * std::mem::size_of::<crate::object::GcBox>() as u64;
    }

    fn finalize(&mut self, registry: &Registry) {
        // Every surviving object is currently Black; repaint it the new
        // cycle's white so the next `MarkRoot` has a clean slate, and flip
        // which shade means "white" going forward.
        let next_white = self.other_white();
        for obj in registry.iter() {
            obj.header().set_color(next_white);
        }
        self.current_white = next_white;
        self.stats.cycles_completed += 1;
        self.stats.live_objects = registry.len();
        self.phase = Phase::Pause;
    }

    fn step_once(&mut self, registry: &mut Registry, roots: &[ObjectRef]) {
        match self.phase {
            Phase::Pause => {
                self.gray.clear();
                self.phase = Phase::MarkRoot;
            }
            Phase::MarkRoot => {
                self.mark_roots(roots);
                self.phase = Phase::Propagate;
            }
            Phase::Propagate => {
                self.propagate(self.config.propagate_quantum);
                if self.gray.is_empty() {
                    self.phase = Phase::Atomic;
                }
            }
            Phase::Atomic => {
                // Stop-the-world catch-up: anything the mutator rooted
                // since `MarkRoot` is caught here, then drained fully.
                self.mark_roots(roots);
                while !self.gray.is_empty() {
                    self.propagate(usize::MAX);
                }
                self.phase = Phase::SweepWeak;
            }
            Phase::SweepWeak => {
                self.sweep_weak(registry);
                self.phase = Phase::SweepYoung;
            }
            Phase::SweepYoung => {
                self.sweep_generation(registry, Generation::Young);
                self.phase = Phase::SweepOld;
            }
            Phase::SweepOld => {
                self.sweep_generation(registry, Generation::Old);
                self.phase = Phase::Finalize;
            }
            Phase::Finalize => {
                self.finalize(registry);
            }
        }
    }
}

impl GcCollector for Msg {
    fn write_barrier(&mut self, _registry: &Registry, holder: ObjectRef, referent: ObjectRef) {
        if holder.header().generation() == Generation::Old {
            referent.header().promote();
        }
        if holder.header().color() == Color::Black {
            self.gray.shade(referent, self.current_white);
        }
    }

    fn step(&mut self, registry: &mut Registry, roots: &[ObjectRef]) {
        self.step_once(registry, roots);
    }

    fn full_gc(&mut self, registry: &mut Registry, roots: &[ObjectRef]) {
        if self.phase == Phase::Pause {
            self.step_once(registry, roots);
        }
        while self.phase != Phase::Pause {
            self.step_once(registry, roots);
        }
    }

    fn stats(&self) -> GcStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::Factory;
    use crate::gc::Registry;

    #[test]
    fn full_gc_reclaims_unreachable_array() {
        let mut registry = Registry::new();
        let mut factory = Factory::new();
        let mut gc = Msg::new(GcConfig::default());

        let _kept = factory.alloc_array(&mut registry, vec![]);
        let _garbage = factory.alloc_array(&mut registry, vec![]);
        assert_eq!(registry.len(), 2);

        let roots = vec![_kept];
        gc.full_gc(&mut registry, &roots);

        assert_eq!(registry.len(), 1);
        assert_eq!(gc.stats().objects_reclaimed, 1);
    }

    #[test]
    fn handle_keeps_object_alive_with_no_roots() {
        let mut registry = Registry::new();
        let mut factory = Factory::new();
        let mut gc = Msg::new(GcConfig::default());

        let obj = factory.alloc_array(&mut registry, vec![]);
        let _handle = crate::object::Handle::new(obj);

        gc.full_gc(&mut registry, &[]);
        assert_eq!(registry.len(), 1);
    }
}
