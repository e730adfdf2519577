use std::sync::atomic::{AtomicU64, Ordering};

/// Process-local serial number source, shared by every call a client
/// issues. Starts at 1 and only moves forward; wraparound is
/// unreachable at realistic call volumes.
#[derive(Debug)]
pub struct SerialCounter(AtomicU64);

impl SerialCounter {
    pub fn new() -> Self {
        Self(AtomicU64::new(1))
    }

    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }

    /// The most recently issued serial number; 0 before the first call.
    pub fn last(&self) -> u64 {
        self.0.load(Ordering::Relaxed).wrapping_sub(1)
    }
}

impl Default for SerialCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_one_and_increments() {
        let counter = SerialCounter::new();
        assert_eq!(counter.last(), 0);
        assert_eq!(counter.next(), 1);
        assert_eq!(counter.next(), 2);
        assert_eq!(counter.last(), 2);
    }

    #[test]
    fn concurrent_serials_are_pairwise_distinct() {
        use std::collections::HashSet;
        use std::sync::Arc;

        let counter = Arc::new(SerialCounter::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let counter = Arc::clone(&counter);
            handles.push(std::thread::spawn(move || {
                (0..100).map(|_| counter.next()).collect::<Vec<_>>()
            }));
        }
        let mut seen = HashSet::new();
        for handle in handles {
            for sn in handle.join().unwrap() {
                assert!(seen.insert(sn), "serial number {sn} issued twice");
            }
        }
        assert_eq!(seen.len(), 800);
    }
}
