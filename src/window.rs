//! Bounded history with a reset-on-full policy.
//!
//! Unlike a ring buffer, a [`WindowBuffer`] never evicts its oldest entry.
//! When an append brings it to capacity it empties itself, so plots driven
//! from it periodically restart from an empty x axis.

/// Ordered recent history holding at most `capacity - 1` elements.
///
/// ```
/// # use lips_rs::window::WindowBuffer;
/// let mut w = WindowBuffer::new(3);
/// w.push(1);
/// w.push(2);
/// assert_eq!(w.as_slice(), &[1, 2]);
/// w.push(3); // reaches capacity → cleared
/// assert!(w.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct WindowBuffer<T> {
    items: Vec<T>,
    capacity: usize,
    resets: u64,
}

impl<T> WindowBuffer<T> {
    /// Create an empty window.  A capacity of zero is treated as one, so
    /// every push clears immediately.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Vec::with_capacity(capacity),
            capacity,
            resets: 0,
        }
    }

    /// Append `item`; if that makes the length equal to the capacity, drop
    /// the whole history.
    ///
    /// Returns `true` when the append triggered a reset.
    pub fn push(&mut self, item: T) -> bool {
        self.items.push(item);
        if self.items.len() >= self.capacity {
            self.items.clear();
            self.resets += 1;
            return true;
        }
        false
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// How many times the window has emptied itself by filling up.
    pub fn resets(&self) -> u64 {
        self.resets
    }

    pub fn last(&self) -> Option<&T> {
        self.items.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }
}

impl<'a, T> IntoIterator for &'a WindowBuffer<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hundredth_append_empties_the_window() {
        let mut w = WindowBuffer::new(100);
        for i in 0..99 {
            assert!(!w.push(i));
            assert_eq!(w.len(), i + 1);
        }
        assert_eq!(w.as_slice().first(), Some(&0));
        assert!(w.push(99));
        assert!(w.is_empty());
        assert_eq!(w.resets(), 1);
    }

    #[test]
    fn length_never_reaches_capacity() {
        let mut w = WindowBuffer::new(10);
        for i in 0..1000 {
            w.push(i);
            assert!(w.len() < 10);
        }
        assert_eq!(w.resets(), 100);
    }

    #[test]
    fn refills_after_reset() {
        let mut w = WindowBuffer::new(2);
        w.push('a');
        w.push('b');
        w.push('c');
        assert_eq!(w.as_slice(), &['c']);
        assert_eq!(w.last(), Some(&'c'));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut w = WindowBuffer::new(0);
        assert_eq!(w.capacity(), 1);
        assert!(w.push(()));
        assert!(w.is_empty());
    }

    #[test]
    fn manual_clear_does_not_count_as_reset() {
        let mut w = WindowBuffer::new(5);
        w.push(1);
        w.clear();
        assert!(w.is_empty());
        assert_eq!(w.resets(), 0);
    }
}
