use std::collections::VecDeque;
use std::sync::Mutex;

use rand::Rng;

/// Source of the simulated outcomes (payment settlement, delivery times)
pub trait RandomSource: Send + Sync {
    /// Uniform value in `[0, bound)`; `0` when `bound` is `0`
    fn below(&self, bound: u32) -> u32;
}

/// Production source backed by the thread-local generator
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn below(&self, bound: u32) -> u32 {
        if bound == 0 {
            return 0;
        }
        rand::thread_rng().gen_range(0..bound)
    }
}

/// Replays queued values, then keeps returning `fallback`.
/// Values are reduced modulo the requested bound.
#[derive(Debug)]
pub struct ScriptedRandom {
    values: Mutex<VecDeque<u32>>,
    fallback: u32,
}

impl ScriptedRandom {
    pub fn new(values: impl IntoIterator<Item = u32>) -> Self {
        Self {
            values: Mutex::new(values.into_iter().collect()),
            fallback: 0,
        }
    }

    /// Always returns `value` (modulo the bound)
    pub fn constant(value: u32) -> Self {
        Self {
            values: Mutex::new(VecDeque::new()),
            fallback: value,
        }
    }

    pub fn with_fallback(mut self, fallback: u32) -> Self {
        self.fallback = fallback;
        self
    }
}

impl RandomSource for ScriptedRandom {
    fn below(&self, bound: u32) -> u32 {
        if bound == 0 {
            return 0;
        }
        let next = match self.values.lock() {
            Ok(mut values) => values.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        next.unwrap_or(self.fallback) % bound
    }
}
