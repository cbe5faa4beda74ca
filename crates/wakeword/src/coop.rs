//! Cooperative yield points for long-running compute stages.
//!
//! The pipeline runs on one cooperative task; a DFT over a full window
//! or a convolution pass can run long enough to starve a liveness
//! monitor. Compute loops tick a [`YieldBudget`] per processed element
//! and the budget invokes the hook at a fixed granularity.

use crate::constants::YIELD_GRANULARITY;

/// Invoked periodically from inside long loops so a supervising
/// scheduler can observe progress.
pub trait YieldHook {
    fn on_yield(&mut self);
}

/// No-op hook for tests and offline processing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoYield;

impl YieldHook for NoYield {
    fn on_yield(&mut self) {}
}

/// Yields the OS thread; the hook the CLI installs.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadYield;

impl YieldHook for ThreadYield {
    fn on_yield(&mut self) {
        std::thread::yield_now();
    }
}

/// Element counter that fires the hook every `granularity` ticks.
pub struct YieldBudget<'a> {
    hook: &'a mut dyn YieldHook,
    granularity: usize,
    count: usize,
}

impl<'a> YieldBudget<'a> {
    pub fn new(hook: &'a mut dyn YieldHook) -> Self {
        Self::with_granularity(hook, YIELD_GRANULARITY)
    }

    pub fn with_granularity(hook: &'a mut dyn YieldHook, granularity: usize) -> Self {
        assert!(granularity > 0);
        Self {
            hook,
            granularity,
            count: 0,
        }
    }

    /// Count one processed element; yields at the configured granularity.
    #[inline]
    pub fn tick(&mut self) {
        self.count += 1;
        if self.count >= self.granularity {
            self.count = 0;
            self.hook.on_yield();
        }
    }

    /// Explicit stage-boundary yield, independent of the element count.
    pub fn stage_boundary(&mut self) {
        self.count = 0;
        self.hook.on_yield();
    }
}

#[cfg(test)]
mod tests {
    use super::{YieldBudget, YieldHook};

    struct Counting(usize);

    impl YieldHook for Counting {
        fn on_yield(&mut self) {
            self.0 += 1;
        }
    }

    #[test]
    fn ticks_fire_at_granularity() {
        let mut hook = Counting(0);
        {
            let mut budget = YieldBudget::with_granularity(&mut hook, 10);
            for _ in 0..35 {
                budget.tick();
            }
        }
        assert_eq!(hook.0, 3);
    }

    #[test]
    fn stage_boundary_always_fires() {
        let mut hook = Counting(0);
        {
            let mut budget = YieldBudget::with_granularity(&mut hook, 1000);
            budget.tick();
            budget.stage_boundary();
            budget.stage_boundary();
        }
        assert_eq!(hook.0, 2);
    }
}
