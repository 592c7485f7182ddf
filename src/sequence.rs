/// LiveBuffer Sequence Implementation
///
/// A Sequence is the positional storage underneath a `Buffer`: one element
/// per slot, in view order. Two implementations are available:
/// - ArraySequence: contiguous array with O(1) access, O(N) insert/delete
/// - TieredVectorSequence: blocks of ~√N elements, O(log √N) access and
///   O(√N) insert/delete anywhere
///
/// Buffers for large tables see inserts and deletes at arbitrary positions
/// (optimistic creates, remote deletes, drag moves), which is what the tiered
/// vector is for.

use crate::config::StorageHint;
use crate::error::{Error, Result};
use std::fmt::Debug;

/// Trait for positional slot storage
pub trait Sequence<T>: Debug + Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, index: usize) -> Option<&T>;

    fn get_mut(&mut self, index: usize) -> Option<&mut T>;

    /// Replace the value at index, returning the previous one
    fn set(&mut self, index: usize, value: T) -> Result<T>;

    /// Insert value at index, shifting subsequent elements
    fn insert(&mut self, index: usize, value: T) -> Result<()>;

    /// Delete and return value at index
    fn delete(&mut self, index: usize) -> Result<T>;

    fn append(&mut self, value: T);

    fn clear(&mut self);

    /// Iterate over all values in order
    fn iter(&self) -> Box<dyn Iterator<Item = &T> + '_>;
}

/// Create a sequence of `len` copies of `value` for the given storage hint.
pub fn new_sequence<T>(hint: StorageHint, value: T, len: usize) -> Box<dyn Sequence<T>>
where
    T: Clone + Debug + Send + Sync + 'static,
{
    if hint.use_tiered_vector() {
        Box::new(TieredVectorSequence::filled(value, len))
    } else {
        Box::new(ArraySequence::filled(value, len))
    }
}

/// Simple contiguous array implementation.
#[derive(Debug, Clone)]
pub struct ArraySequence<T> {
    data: Vec<T>,
}

impl<T> ArraySequence<T> {
    pub fn new() -> Self {
        ArraySequence { data: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        ArraySequence {
            data: Vec::with_capacity(capacity),
        }
    }

    pub fn filled(value: T, len: usize) -> Self
    where
        T: Clone,
    {
        ArraySequence {
            data: vec![value; len],
        }
    }
}

impl<T> Default for ArraySequence<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Debug + Send + Sync> Sequence<T> for ArraySequence<T> {
    fn len(&self) -> usize {
        self.data.len()
    }

    fn get(&self, index: usize) -> Option<&T> {
        self.data.get(index)
    }

    fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.data.get_mut(index)
    }

    fn set(&mut self, index: usize, value: T) -> Result<T> {
        let len = self.data.len();
        let slot = self
            .data
            .get_mut(index)
            .ok_or(Error::IndexOutOfRange { index, len })?;
        Ok(std::mem::replace(slot, value))
    }

    fn insert(&mut self, index: usize, value: T) -> Result<()> {
        if index > self.data.len() {
            return Err(Error::IndexOutOfRange {
                index,
                len: self.data.len() + 1,
            });
        }
        self.data.insert(index, value);
        Ok(())
    }

    fn delete(&mut self, index: usize) -> Result<T> {
        if index >= self.data.len() {
            return Err(Error::IndexOutOfRange {
                index,
                len: self.data.len(),
            });
        }
        Ok(self.data.remove(index))
    }

    fn append(&mut self, value: T) {
        self.data.push(value);
    }

    fn clear(&mut self) {
        self.data.clear();
    }

    fn iter(&self) -> Box<dyn Iterator<Item = &T> + '_> {
        Box::new(self.data.iter())
    }
}

/// Tiered Vector implementation using sqrt decomposition.
///
/// - `blocks`: vector of blocks, each holding approximately √N elements
/// - `block_starts`: block_starts[i] is the global index where block i
///   begins, which makes lookup a binary search over blocks
/// - blocks split above 2√N elements and merge below √N/4
#[derive(Debug, Clone)]
pub struct TieredVectorSequence<T> {
    blocks: Vec<Vec<T>>,
    block_starts: Vec<usize>,
    size: usize,
}

impl<T: Clone> TieredVectorSequence<T> {
    const MIN_BLOCK_SIZE: usize = 16;
    const MAX_BLOCK_SIZE: usize = 4096;

    pub fn new() -> Self {
        TieredVectorSequence {
            blocks: Vec::new(),
            block_starts: Vec::new(),
            size: 0,
        }
    }

    /// Build a sequence of `len` copies of `value` with balanced blocks.
    /// This is how a buffer of `count` unfetched slots is laid out.
    pub fn filled(value: T, len: usize) -> Self {
        let mut seq = Self::new();
        seq.size = len;
        let block_size = seq.ideal_block_size();
        let mut start = 0;
        while start < len {
            let end = (start + block_size).min(len);
            seq.blocks.push(vec![value.clone(); end - start]);
            seq.block_starts.push(start);
            start = end;
        }
        seq
    }

    fn ideal_block_size(&self) -> usize {
        if self.size == 0 {
            return Self::MIN_BLOCK_SIZE;
        }
        let sqrt = (self.size as f64).sqrt() as usize;
        sqrt.clamp(Self::MIN_BLOCK_SIZE, Self::MAX_BLOCK_SIZE)
    }

    /// Returns (block_index, offset_within_block) for a global index.
    fn find_block(&self, index: usize) -> Option<(usize, usize)> {
        if index >= self.size || self.blocks.is_empty() {
            return None;
        }

        // Rightmost block where block_starts[i] <= index
        let block_idx = match self.block_starts.binary_search(&index) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };
        let offset = index - self.block_starts[block_idx];

        debug_assert!(
            offset < self.blocks[block_idx].len(),
            "Offset {} >= block len {} for index {}",
            offset,
            self.blocks[block_idx].len(),
            index
        );

        Some((block_idx, offset))
    }

    fn shift_block_starts_after(&mut self, block_idx: usize, delta: isize) {
        for start in self.block_starts.iter_mut().skip(block_idx + 1) {
            *start = (*start as isize + delta) as usize;
        }
    }

    fn maybe_split_block(&mut self, block_idx: usize) {
        let threshold = 2 * self.ideal_block_size();
        if self.blocks[block_idx].len() <= threshold {
            return;
        }

        let mid = self.blocks[block_idx].len() / 2;
        let new_block = self.blocks[block_idx].split_off(mid);
        let new_block_start = self.block_starts[block_idx] + self.blocks[block_idx].len();

        self.blocks.insert(block_idx + 1, new_block);
        self.block_starts.insert(block_idx + 1, new_block_start);
    }

    fn maybe_merge_block(&mut self, block_idx: usize) {
        if self.blocks.len() <= 1 || self.blocks[block_idx].is_empty() {
            return;
        }

        let ideal = self.ideal_block_size();
        if self.blocks[block_idx].len() >= ideal / 4 {
            return;
        }

        // Prefer the smaller neighbor to keep blocks balanced
        let merge_with_next = block_idx + 1 < self.blocks.len()
            && (block_idx == 0
                || self.blocks[block_idx + 1].len() <= self.blocks[block_idx - 1].len());

        if merge_with_next {
            let combined = self.blocks[block_idx].len() + self.blocks[block_idx + 1].len();
            if combined <= 2 * ideal {
                let next_block = self.blocks.remove(block_idx + 1);
                self.block_starts.remove(block_idx + 1);
                self.blocks[block_idx].extend(next_block);
                return;
            }
        }

        if block_idx > 0 {
            let combined = self.blocks[block_idx - 1].len() + self.blocks[block_idx].len();
            if combined <= 2 * ideal {
                let current_block = self.blocks.remove(block_idx);
                self.block_starts.remove(block_idx);
                self.blocks[block_idx - 1].extend(current_block);
            }
        }
    }
}

impl<T: Clone> Default for TieredVectorSequence<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Debug + Send + Sync> Sequence<T> for TieredVectorSequence<T> {
    fn len(&self) -> usize {
        self.size
    }

    fn get(&self, index: usize) -> Option<&T> {
        self.find_block(index)
            .map(|(block_idx, offset)| &self.blocks[block_idx][offset])
    }

    fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        let (block_idx, offset) = self.find_block(index)?;
        Some(&mut self.blocks[block_idx][offset])
    }

    fn set(&mut self, index: usize, value: T) -> Result<T> {
        let len = self.size;
        let slot = self
            .get_mut(index)
            .ok_or(Error::IndexOutOfRange { index, len })?;
        Ok(std::mem::replace(slot, value))
    }

    fn insert(&mut self, index: usize, value: T) -> Result<()> {
        if index > self.size {
            return Err(Error::IndexOutOfRange {
                index,
                len: self.size + 1,
            });
        }

        if index == self.size {
            self.append(value);
            return Ok(());
        }

        let (block_idx, offset) = self
            .find_block(index)
            .ok_or(Error::IndexOutOfRange { index, len: self.size })?;

        self.blocks[block_idx].insert(offset, value);
        self.size += 1;
        self.shift_block_starts_after(block_idx, 1);
        self.maybe_split_block(block_idx);

        Ok(())
    }

    fn delete(&mut self, index: usize) -> Result<T> {
        let (block_idx, offset) = self
            .find_block(index)
            .ok_or(Error::IndexOutOfRange { index, len: self.size })?;

        let value = self.blocks[block_idx].remove(offset);
        self.size -= 1;
        self.shift_block_starts_after(block_idx, -1);

        if self.blocks[block_idx].is_empty() {
            self.blocks.remove(block_idx);
            self.block_starts.remove(block_idx);
        } else {
            self.maybe_merge_block(block_idx);
        }

        Ok(value)
    }

    fn append(&mut self, value: T) {
        if self.blocks.is_empty() {
            self.blocks.push(vec![value]);
            self.block_starts.push(0);
            self.size = 1;
            return;
        }

        let last_block_idx = self.blocks.len() - 1;
        self.blocks[last_block_idx].push(value);
        self.size += 1;
        self.maybe_split_block(last_block_idx);
    }

    fn clear(&mut self) {
        self.blocks.clear();
        self.block_starts.clear();
        self.size = 0;
    }

    fn iter(&self) -> Box<dyn Iterator<Item = &T> + '_> {
        Box::new(self.blocks.iter().flat_map(|block| block.iter()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn both(values: &[i32]) -> Vec<Box<dyn Sequence<i32>>> {
        let mut array: Box<dyn Sequence<i32>> = Box::new(ArraySequence::new());
        let mut tiered: Box<dyn Sequence<i32>> = Box::new(TieredVectorSequence::new());
        for v in values {
            array.append(*v);
            tiered.append(*v);
        }
        vec![array, tiered]
    }

    #[test]
    fn test_insert_and_delete_both_backends() {
        for mut seq in both(&[10, 30, 40]) {
            seq.insert(1, 20).unwrap();
            assert_eq!(seq.iter().copied().collect::<Vec<_>>(), vec![10, 20, 30, 40]);

            assert_eq!(seq.delete(0).unwrap(), 10);
            assert_eq!(seq.len(), 3);
            assert_eq!(seq.get(0), Some(&20));
        }
    }

    #[test]
    fn test_set_returns_previous() {
        for mut seq in both(&[1, 2, 3]) {
            assert_eq!(seq.set(1, 9).unwrap(), 2);
            assert_eq!(seq.get(1), Some(&9));
            assert!(seq.set(3, 0).is_err());
        }
    }

    #[test]
    fn test_filled_layout_is_addressable() {
        let seq = TieredVectorSequence::filled(7u8, 1000);
        assert_eq!(seq.len(), 1000);
        assert_eq!(seq.get(0), Some(&7));
        assert_eq!(seq.get(999), Some(&7));
        assert_eq!(seq.get(1000), None);
        assert_eq!(seq.iter().count(), 1000);
    }

    #[test]
    fn test_tiered_vector_insert_at_all_positions() {
        for insert_pos in 0..=40 {
            let mut seq = TieredVectorSequence::filled(0i32, 0);
            for i in 0..40 {
                seq.append(i);
            }
            seq.insert(insert_pos, 999).unwrap();

            for i in 0..41 {
                let expected = if i < insert_pos {
                    i as i32
                } else if i == insert_pos {
                    999
                } else {
                    (i - 1) as i32
                };
                assert_eq!(
                    seq.get(i),
                    Some(&expected),
                    "Mismatch at index {} after inserting at {}",
                    i,
                    insert_pos
                );
            }
        }
    }

    #[test]
    fn test_tiered_vector_mixed_operations_stay_ordered() {
        let mut seq = TieredVectorSequence::<usize>::new();
        for i in 0..500 {
            seq.append(i * 2);
        }
        for i in 0..500 {
            seq.insert(i * 2 + 1, i * 2 + 1).unwrap();
        }
        for i in (0..1000).step_by(3).rev() {
            seq.delete(i).unwrap();
        }
        let collected: Vec<usize> = seq.iter().copied().collect();
        let expected: Vec<usize> = (0..1000).filter(|x| x % 3 != 0).collect();
        assert_eq!(collected, expected);
    }

    #[test]
    fn test_tiered_vector_interleaved_deletes() {
        let mut seq = TieredVectorSequence::new();
        for i in 0..100 {
            seq.append(i);
        }
        for i in (0..50).rev() {
            seq.delete(i * 2).unwrap();
        }
        assert_eq!(seq.len(), 50);

        let expected: Vec<i32> = (0..100).filter(|x| x % 2 == 1).collect();
        for (i, value) in expected.iter().enumerate() {
            assert_eq!(seq.get(i), Some(value));
        }
    }

    #[test]
    fn test_out_of_range_errors() {
        for mut seq in both(&[]) {
            assert!(seq.get(0).is_none());
            assert!(seq.insert(1, 42).is_err());
            assert!(seq.delete(0).is_err());
            seq.append(1);
            seq.clear();
            assert!(seq.is_empty());
        }
    }
}
