//! A collector that never reclaims anything. Exists to prove the
//! interpreter's opcodes never reach into [`super::msg::Msg`] directly —
//! only through [`super::GcCollector`] — by swapping this in for the
//! allocation-heavy end-to-end tests and checking they still produce
//! correct results, just with unbounded memory growth (resolved Open
//! Question, see DESIGN.md).

use crate::gc::{GcCollector, GcStats, Registry};
use crate::object::ObjectRef;

#[derive(Default)]
pub struct NoopCollector {
    stats: GcStats,
}

impl NoopCollector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GcCollector for NoopCollector {
    fn write_barrier(&mut self, _registry: &Registry, _holder: ObjectRef, _referent: ObjectRef) {}

    fn step(&mut self, registry: &mut Registry, _roots: &[ObjectRef]) {
        self.stats.live_objects = registry.len();
    }

    fn full_gc(&mut self, registry: &mut Registry, _roots: &[ObjectRef]) {
        self.stats.live_objects = registry.len();
    }

    fn stats(&self) -> GcStats {
        self.stats
    }
}
