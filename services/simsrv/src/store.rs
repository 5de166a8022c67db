//! Holding-register block shared by the update loop and the server
//!
//! The update loop is the only writer. A tick is applied under one write
//! lock, so a reader never observes half of an update.

use parking_lot::RwLock;
use tracing::debug;

/// Number of holding registers the simulator exposes
pub const REGISTER_COUNT: usize = 5000;

#[derive(Debug)]
pub struct RegisterStore {
    words: RwLock<Vec<u16>>,
}

impl Default for RegisterStore {
    fn default() -> Self {
        Self::new(REGISTER_COUNT)
    }
}

impl RegisterStore {
    pub fn new(size: usize) -> Self {
        Self {
            words: RwLock::new(vec![0; size]),
        }
    }

    pub fn len(&self) -> usize {
        self.words.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.read().is_empty()
    }

    /// Apply one tick; returns how many words landed inside the block
    pub fn write_batch(&self, updates: &[(u16, u16)]) -> usize {
        let mut words = self.words.write();
        let mut written = 0;
        for &(address, value) in updates {
            match words.get_mut(usize::from(address)) {
                Some(slot) => {
                    *slot = value;
                    written += 1;
                },
                None => debug!("Address {} outside register block, ignored", address),
            }
        }
        written
    }

    /// `count` words from `start`, or `None` if the range leaves the block
    pub fn read(&self, start: u16, count: u16) -> Option<Vec<u16>> {
        let start = usize::from(start);
        let end = start + usize::from(count);
        self.words.read().get(start..end).map(<[u16]>::to_vec)
    }

    pub fn get(&self, address: u16) -> Option<u16> {
        self.words.read().get(usize::from(address)).copied()
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_and_range_reads() {
        let store = RegisterStore::default();
        assert_eq!(store.len(), REGISTER_COUNT);

        let written = store.write_batch(&[(0, 11), (1, 22), (4999, 7), (5000, 9)]);
        assert_eq!(written, 3);
        assert_eq!(store.read(0, 3), Some(vec![11, 22, 0]));
        assert_eq!(store.get(4999), Some(7));
        assert_eq!(store.read(4999, 1), Some(vec![7]));
        assert_eq!(store.read(4999, 2), None);
        assert_eq!(store.get(5000), None);
    }
}
