//! Bounded FIFO of decoded blocks waiting to be scheduled.

use std::collections::VecDeque;

use crate::audio::SampleBlock;
use crate::config::OverflowPolicy;

/// FIFO with a hard upper bound and an overflow policy.
///
/// ```
/// use babelcast::audio::SampleBlock;
/// use babelcast::config::OverflowPolicy;
/// use babelcast::playback::BlockQueue;
///
/// let mut q = BlockQueue::new(2, OverflowPolicy::DropOldest);
/// for v in [1.0, 2.0, 3.0] {
///     q.push(SampleBlock::new(vec![v], 48_000));
/// }
/// assert_eq!(q.len(), 2);
/// assert_eq!(q.dropped(), 1);
/// assert_eq!(q.pop().unwrap().samples(), &[2.0]);
/// ```
#[derive(Debug)]
pub struct BlockQueue {
    blocks: VecDeque<SampleBlock>,
    capacity: usize,
    policy: OverflowPolicy,
    dropped: u64,
}

impl BlockQueue {
    /// `capacity` is clamped to at least one block.
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            blocks: VecDeque::with_capacity(capacity),
            capacity,
            policy,
            dropped: 0,
        }
    }

    /// Append `block` at the tail.
    ///
    /// Returns the block that was discarded to respect the bound, if any.
    pub fn push(&mut self, block: SampleBlock) -> Option<SampleBlock> {
        if self.blocks.len() < self.capacity {
            self.blocks.push_back(block);
            return None;
        }

        self.dropped += 1;
        match self.policy {
            OverflowPolicy::DropOldest => {
                let oldest = self.blocks.pop_front();
                self.blocks.push_back(block);
                oldest
            }
            OverflowPolicy::DropNewest => Some(block),
        }
    }

    pub fn pop(&mut self) -> Option<SampleBlock> {
        self.blocks.pop_front()
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total blocks discarded by the overflow policy.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
