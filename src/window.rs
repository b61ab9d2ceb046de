//! Fixed-capacity sliding window.
//!
//! Both tracker windows (normalized innovation errors and raw samples for
//! spectral analysis) share this buffer. Index 0 is always the newest entry;
//! once full, every push overwrites the oldest slot, so memory never grows
//! past `capacity`.

#[derive(Debug, Clone)]
pub struct RingWindow<T> {
    slots: Vec<T>,
    capacity: usize,
    write_pos: usize,
}

impl<T: Clone> RingWindow<T> {
    pub fn new(capacity: usize) -> Self {
        RingWindow {
            slots: Vec::with_capacity(capacity),
            capacity,
            write_pos: 0,
        }
    }

    /// Window that starts full of `value`.
    pub fn filled(capacity: usize, value: T) -> Self {
        RingWindow {
            slots: vec![value; capacity],
            capacity,
            write_pos: 0,
        }
    }

    /// Pushes a new entry as the newest one, returning the evicted oldest
    /// entry when the window was already full.
    pub fn push(&mut self, value: T) -> Option<T> {
        if self.capacity == 0 {
            return Some(value);
        }
        if self.slots.len() < self.capacity {
            self.slots.push(value);
            self.write_pos = self.slots.len() % self.capacity;
            None
        } else {
            let evicted = std::mem::replace(&mut self.slots[self.write_pos], value);
            self.write_pos = (self.write_pos + 1) % self.capacity;
            Some(evicted)
        }
    }

    /// Entry `age` steps back from the newest (0 = newest).
    pub fn get(&self, age: usize) -> Option<&T> {
        if age >= self.slots.len() {
            return None;
        }
        let idx = (self.write_pos + self.capacity - 1 - age) % self.capacity;
        self.slots.get(idx)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.capacity > 0 && self.slots.len() == self.capacity
    }

    /// Newest to oldest.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.slots.len()).filter_map(move |age| self.get(age))
    }

    /// Oldest to newest.
    pub fn to_chronological(&self) -> Vec<T> {
        let mut out: Vec<T> = self.iter().cloned().collect();
        out.reverse();
        out
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.write_pos = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newest_first_ordering() {
        let mut w = RingWindow::new(3);
        w.push(1);
        w.push(2);
        assert_eq!(w.get(0), Some(&2));
        assert_eq!(w.get(1), Some(&1));
        assert_eq!(w.get(2), None);
        assert!(!w.is_full());
    }

    #[test]
    fn test_eviction_when_full() {
        let mut w = RingWindow::new(3);
        assert_eq!(w.push(1), None);
        assert_eq!(w.push(2), None);
        assert_eq!(w.push(3), None);
        assert!(w.is_full());
        assert_eq!(w.push(4), Some(1), "oldest entry must be evicted");
        assert_eq!(w.iter().copied().collect::<Vec<_>>(), vec![4, 3, 2]);
        assert_eq!(w.to_chronological(), vec![2, 3, 4]);
        assert_eq!(w.len(), 3, "length never exceeds capacity");
    }

    #[test]
    fn test_filled_window_is_full_from_start() {
        let mut w = RingWindow::filled(4, 0.0);
        assert!(w.is_full());
        w.push(0.7);
        assert_eq!(w.get(0), Some(&0.7));
        assert_eq!(w.get(1), Some(&0.0));
        assert_eq!(w.len(), 4);
    }

    #[test]
    fn test_many_wraps() {
        let mut w = RingWindow::new(5);
        for i in 0..103 {
            w.push(i);
        }
        assert_eq!(w.to_chronological(), vec![98, 99, 100, 101, 102]);
    }

    #[test]
    fn test_clear() {
        let mut w = RingWindow::new(2);
        w.push(1);
        w.push(2);
        w.clear();
        assert!(w.is_empty());
        w.push(9);
        assert_eq!(w.get(0), Some(&9));
    }
}
