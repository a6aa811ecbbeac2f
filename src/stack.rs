use log::debug;

/// Storage a stack starts with and never shrinks below.
pub const MIN_STACK_CAPACITY: usize = 16;

/// Counters kept over the lifetime of a [`Stack`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StackStats {
    pub pushes: usize,
    pub pops: usize,
    pub grows: usize,
    pub shrinks: usize,
}

/// Value stack of 32-bit words with self-adjusting storage.
///
/// Storage doubles once more than half of it is live and halves once less
/// than a quarter is, so capacity stays between the live count and four times
/// the live count (or [`MIN_STACK_CAPACITY`], whichever is larger).
#[derive(Debug, Clone)]
pub struct Stack {
    slots: Vec<i32>,
    sp: isize,
    stats: StackStats,
}

impl Stack {
    pub fn new() -> Self {
        Self {
            slots: vec![0; MIN_STACK_CAPACITY],
            sp: -1,
            stats: StackStats::default(),
        }
    }

    pub fn push(&mut self, value: i32) {
        if self.len() == self.capacity() {
            self.resize(self.capacity() * 2);
            self.stats.grows += 1;
        }
        self.sp += 1;
        let index = self.len() - 1;
        self.slots[index] = value;
        self.stats.pushes += 1;
        self.rebalance();
    }

    pub fn pop(&mut self) -> Option<i32> {
        let value = self.top()?;
        self.sp -= 1;
        self.stats.pops += 1;
        self.rebalance();
        Some(value)
    }

    pub fn top(&self) -> Option<i32> {
        self.as_slice().last().copied()
    }

    /// Index of the top element, `-1` when empty.
    pub fn sp(&self) -> isize {
        self.sp
    }

    pub fn len(&self) -> usize {
        (self.sp + 1) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.sp < 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Live elements, bottom first.
    pub fn as_slice(&self) -> &[i32] {
        &self.slots[..self.len()]
    }

    pub fn stats(&self) -> StackStats {
        self.stats
    }

    fn rebalance(&mut self) {
        let live = self.len();
        while live > self.capacity() / 2 {
            self.resize(self.capacity() * 2);
            self.stats.grows += 1;
        }
        while live < self.capacity() / 4 && self.capacity() / 2 >= MIN_STACK_CAPACITY {
            self.resize(self.capacity() / 2);
            self.stats.shrinks += 1;
        }
    }

    fn resize(&mut self, capacity: usize) {
        debug!(
            "stack: resize {} -> {capacity} with {} live",
            self.capacity(),
            self.len()
        );
        self.slots.resize(capacity, 0);
        self.slots.shrink_to_fit();
    }
}

impl Default for Stack {
    fn default() -> Self {
        Self::new()
    }
}
