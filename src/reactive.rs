//! Seam to the reactive framework's scheduler.
//!
//! The reconciler does not track dependencies itself. It asks the framework
//! for an effect: run a closure now, run it again synchronously whenever a
//! value it read changes, and stop when the returned [`Cleanup`] is called.

/// Stops an effect when called.
pub type Cleanup = Box<dyn FnOnce()>;

/// "Run now and re-run on invalidation", supplied by the reactive framework.
pub trait Reactive {
    /// Run `effect` immediately and again after each change to what it read.
    ///
    /// Re-runs must happen synchronously inside the write that invalidated
    /// the effect; the reconciler relies on that for command ordering.
    fn effect(&self, effect: Box<dyn FnMut()>) -> Cleanup;
}

/// Scheduler for static UIs: every effect runs exactly once.
#[derive(Debug, Clone, Copy, Default)]
pub struct Immediate;

impl Reactive for Immediate {
    fn effect(&self, mut effect: Box<dyn FnMut()>) -> Cleanup {
        effect();
        Box::new(|| {})
    }
}
