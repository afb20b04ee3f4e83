//! Chunk-grown sequence used for the parameter, field and value tables.

use std::collections::TryReserveError;

use crate::arena::{AllocError, Tier};

/// A growable sequence that reserves room `chunk` elements at a time.
///
/// Growth goes through `try_reserve_exact`, so running out of memory is reported as
/// an [`AllocError`] instead of aborting.
///
/// The table's own storage comes from the global allocator and is not counted against
/// the byte limits of [`ArenaConfig`](crate::config::ArenaConfig). `tier` only names
/// the tier the table belongs to in [`AllocError::OutOfMemory`].
#[derive(Debug, Clone)]
pub struct IndirectArray<T> {
    items: Vec<T>,
    chunk: usize,
    tier: Tier,
}

impl<T> IndirectArray<T> {
    /// Creates an empty array. Nothing is reserved until the first insertion.
    pub fn new(chunk: usize, tier: Tier) -> Self {
        Self {
            items: Vec::new(),
            chunk: chunk.max(1),
            tier,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.items.capacity()
    }

    pub fn chunk(&self) -> usize {
        self.chunk
    }

    /// Appends an element, growing by one chunk when full.
    pub fn push(&mut self, item: T) -> Result<(), AllocError> {
        self.ensure_room(1)?;
        self.items.push(item);
        Ok(())
    }

    /// Removes the last element.
    pub fn pop(&mut self) -> Option<T> {
        self.items.pop()
    }

    /// Removes the first element, shifting the rest left.
    pub fn shift(&mut self) -> Option<T> {
        self.remove(0)
    }

    /// Inserts an element at the front, shifting the rest right.
    pub fn unshift(&mut self, item: T) -> Result<(), AllocError> {
        self.ensure_room(1)?;
        self.items.insert(0, item);
        Ok(())
    }

    pub fn get(&self, idx: usize) -> Option<&T> {
        self.items.get(idx)
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut T> {
        self.items.get_mut(idx)
    }

    /// Removes and returns the element at `idx`. Only the `len - idx - 1` elements
    /// after it are moved.
    pub fn remove(&mut self, idx: usize) -> Option<T> {
        if idx >= self.items.len() {
            return None;
        }
        Some(self.items.remove(idx))
    }

    /// Appends clones of every element of `src`.
    pub fn merge(&mut self, src: &IndirectArray<T>) -> Result<(), AllocError>
    where
        T: Clone,
    {
        self.ensure_room(src.len())?;
        self.items.extend_from_slice(&src.items);
        Ok(())
    }

    /// Drops every element but keeps the reserved room.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.items.iter_mut()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.items
    }

    fn ensure_room(&mut self, additional: usize) -> Result<(), AllocError> {
        let free = self.items.capacity() - self.items.len();
        if free >= additional {
            return Ok(());
        }
        let missing = additional - free;
        // round the growth up to whole chunks
        let grow = missing.div_ceil(self.chunk) * self.chunk;
        self.items
            .try_reserve_exact(grow)
            .map_err(|e| self.reserve_failed(e, grow))
    }

    fn reserve_failed(&self, _: TryReserveError, grow: usize) -> AllocError {
        AllocError::OutOfMemory {
            tier: self.tier,
            requested: grow.saturating_mul(std::mem::size_of::<T>()),
        }
    }
}

impl<T: Default> IndirectArray<T> {
    /// Stores `item` at `idx`. Setting past the end extends the array to `idx + 1`,
    /// filling the gap with `T::default()`.
    pub fn set(&mut self, idx: usize, item: T) -> Result<(), AllocError> {
        if idx < self.items.len() {
            self.items[idx] = item;
            return Ok(());
        }
        let grow = idx + 1 - self.items.len();
        self.ensure_room(grow)?;
        self.items.resize_with(idx, T::default);
        self.items.push(item);
        Ok(())
    }
}

impl<'a, T> IntoIterator for &'a IndirectArray<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn array(chunk: usize) -> IndirectArray<usize> {
        IndirectArray::new(chunk, Tier::Statement)
    }

    #[test]
    fn test_array_create() {
        let a = array(10);
        assert_eq!(a.capacity(), 0);
        assert_eq!(a.chunk(), 10);
        assert_eq!(a.len(), 0);
    }

    #[test]
    fn test_array_lifo() {
        // chunk of one forces a growth on every push
        let mut a = array(1);
        for i in 0..10 {
            a.push(5000 + i).unwrap();
        }
        assert_eq!(a.len(), 10);
        for i in (0..10).rev() {
            assert_eq!(a.pop(), Some(5000 + i));
        }
        assert_eq!(a.pop(), None);
    }

    #[test]
    fn test_array_fifo() {
        let mut a = array(3);
        for i in 0..10 {
            a.push(5000 + i).unwrap();
        }
        for i in 0..10 {
            assert_eq!(a.shift(), Some(5000 + i));
        }
        assert!(a.is_empty());
        assert_eq!(a.shift(), None);
    }

    #[test]
    fn test_array_grows_by_chunk() {
        let mut a = array(4);
        a.push(1).unwrap();
        assert!(a.capacity() >= 4);
        for i in 0..5 {
            a.push(i).unwrap();
        }
        assert!(a.capacity() >= 8);
    }

    #[test]
    fn test_array_unshift() {
        let mut a = array(2);
        a.push(2).unwrap();
        a.push(3).unwrap();
        a.unshift(1).unwrap();
        assert_eq!(a.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn test_array_set_past_end_zero_fills() {
        let mut a = array(2);
        a.push(7).unwrap();
        a.set(5, 9).unwrap();
        assert_eq!(a.len(), 6);
        assert_eq!(a.as_slice(), &[7, 0, 0, 0, 0, 9]);

        a.set(2, 4).unwrap();
        assert_eq!(a.len(), 6);
        assert_eq!(a.get(2), Some(&4));
    }

    #[test]
    fn test_array_get_out_of_range() {
        let mut a = array(2);
        a.push(1).unwrap();
        assert_eq!(a.get(1), None);
    }

    #[test]
    fn test_array_remove_middle() {
        let mut a = array(4);
        for i in 0..5 {
            a.push(i).unwrap();
        }
        assert_eq!(a.remove(2), Some(2));
        assert_eq!(a.as_slice(), &[0, 1, 3, 4]);
    }

    #[test]
    fn test_array_remove_last() {
        let mut a = array(4);
        for i in 0..4 {
            a.push(i).unwrap();
        }
        assert_eq!(a.remove(3), Some(3));
        assert_eq!(a.as_slice(), &[0, 1, 2]);
        assert_eq!(a.remove(3), None);
    }

    #[test]
    fn test_array_merge() {
        let mut dst = array(2);
        let mut src = array(2);
        dst.push(1).unwrap();
        for i in 2..7 {
            src.push(i).unwrap();
        }
        dst.merge(&src).unwrap();
        assert_eq!(dst.as_slice(), &[1, 2, 3, 4, 5, 6]);
        assert_eq!(src.len(), 5);
    }

    #[test]
    fn test_array_clear_keeps_capacity() {
        let mut a = array(8);
        a.push(1).unwrap();
        let capacity = a.capacity();
        a.clear();
        assert!(a.is_empty());
        assert_eq!(a.capacity(), capacity);
    }

    #[test]
    fn test_array_failed_growth_names_tier() {
        let mut a: IndirectArray<u64> = IndirectArray::new(usize::MAX / 2, Tier::Result);
        let err = a.push(1).unwrap_err();
        assert!(matches!(err, AllocError::OutOfMemory { tier: Tier::Result, .. }));
        assert!(a.is_empty());
    }
}
