use std::sync::{Mutex, MutexGuard, PoisonError};

/// Capacity-one buffer that only ever holds the newest value.
///
/// `put` always succeeds and evicts any unread value; `take` returns the
/// newest value and leaves the slot empty.
#[derive(Debug)]
pub struct FreshnessSlot<T> {
    value: Mutex<Option<T>>,
}

impl<T> FreshnessSlot<T> {
    pub fn new() -> Self {
        Self {
            value: Mutex::new(None),
        }
    }

    pub fn put(&self, value: T) {
        *self.lock() = Some(value);
    }

    pub fn take(&self) -> Option<T> {
        self.lock().take()
    }

    fn lock(&self) -> MutexGuard<'_, Option<T>> {
        self.value.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for FreshnessSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn read_returns_newest_and_empties() {
        let slot = FreshnessSlot::new();
        assert_eq!(slot.take(), None::<u32>);
        slot.put(1);
        slot.put(2);
        slot.put(3);
        assert_eq!(slot.take(), Some(3));
        assert_eq!(slot.take(), None);
    }

    #[test]
    fn concurrent_writer_never_blocks_reader() {
        let slot = Arc::new(FreshnessSlot::new());
        let writer = {
            let slot = Arc::clone(&slot);
            std::thread::spawn(move || {
                for i in 0..10_000u32 {
                    slot.put(i);
                }
            })
        };
        let mut last_seen = None;
        while !writer.is_finished() {
            if let Some(value) = slot.take() {
                assert!(last_seen.map_or(true, |prev| value > prev));
                last_seen = Some(value);
            }
        }
        writer.join().expect("writer thread");
        if let Some(value) = slot.take() {
            assert_eq!(value, 9_999);
        } else {
            assert_eq!(last_seen, Some(9_999));
        }
    }
}
