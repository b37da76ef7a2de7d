//! Ranges the algorithms write to.
//!
//! A [`Target`] describes a writable range by its starting position, optional length and
//! positional capability ([`Traversal`]). Positions are global offsets into the
//! underlying storage; an algorithm returns the position one past the last element it
//! wrote.
//!
//! Concrete targets:
//! - [`SeqRange`]: a window over a shared [`Sequence`]
//! - [`BackInserter`]: an output-only sink appending to a [`Sequence`]
//! - [`SegmentedRange`](crate::segmented::SegmentedRange): a range spread over
//!   partitions, see [`crate::segmented`]

use std::{
    ops::Range,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use parex_common::{Error, Result};

use crate::segmented::SegmentDescriptor;

/// Positional capability of a target, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Traversal {
    /// Single pass, read only.
    Input,
    /// Single pass, write only. Cannot be split into chunks.
    Output,
    /// Multi-pass, positions can be revisited and split.
    Forward,
    RandomAccess,
}

/// How the elements of a target are laid out.
#[derive(Debug)]
pub enum Layout<T> {
    /// One contiguous local range.
    Plain,
    /// Spread over partitions; one descriptor per non-empty intersection, in order.
    Segmented(Vec<SegmentDescriptor<T>>),
}

pub trait Target: Send + Sync + 'static {
    type Item: Send + 'static;

    fn traversal(&self) -> Traversal;

    /// Position of the first element.
    fn begin(&self) -> usize;

    /// Number of elements, or `None` for unbounded sinks.
    fn len(&self) -> Option<usize>;

    fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// Layout of the first `count` elements.
    fn layout(&self, _count: usize) -> Result<Layout<Self::Item>> {
        Ok(Layout::Plain)
    }

    /// Assigns the values returned by `f` to the first `count` elements, in order.
    fn assign_each<F>(&self, count: usize, f: F) -> Result<()>
    where
        F: FnMut() -> Self::Item;

    /// Calls `f` with exclusive access to the first `count` elements.
    fn with_slice_mut<F, R>(&self, count: usize, f: F) -> Result<R>
    where
        F: FnOnce(&mut [Self::Item]) -> R;
}

/// Growable storage shared between the caller and the targets created from it.
///
/// An algorithm locks the storage once for its whole duration and hands disjoint
/// sub-slices to its chunks.
pub struct Sequence<T>(Arc<Mutex<Vec<T>>>);

impl<T> Clone for Sequence<T> {
    fn clone(&self) -> Self {
        Sequence(self.0.clone())
    }
}

impl<T: Send + 'static> Sequence<T> {
    pub fn from_vec(values: Vec<T>) -> Sequence<T> {
        Sequence(Arc::new(Mutex::new(values)))
    }

    pub fn filled(len: usize, value: T) -> Sequence<T>
    where
        T: Clone,
    {
        Self::from_vec(vec![value; len])
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.lock().clone()
    }

    /// The whole sequence as a random-access target.
    pub fn range(&self) -> SeqRange<T> {
        let len = self.len();
        SeqRange {
            seq: self.clone(),
            start: 0,
            end: len,
            traversal: Traversal::RandomAccess,
        }
    }

    /// A window of the sequence.
    pub fn sub_range(&self, range: Range<usize>) -> Result<SeqRange<T>> {
        let len = self.len();
        parex_common::verify_arg!(range, range.start <= range.end && range.end <= len);
        Ok(SeqRange {
            seq: self.clone(),
            start: range.start,
            end: range.end,
            traversal: Traversal::RandomAccess,
        })
    }

    /// Output-only sink appending to the end of the sequence.
    pub fn back_inserter(&self) -> BackInserter<T> {
        BackInserter { seq: self.clone() }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<T>> {
        // A generator that panicked mid-assignment leaves valid elements behind.
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Window `[start, end)` over a [`Sequence`].
pub struct SeqRange<T> {
    seq: Sequence<T>,
    start: usize,
    end: usize,
    traversal: Traversal,
}

impl<T> Clone for SeqRange<T> {
    fn clone(&self) -> Self {
        SeqRange {
            seq: self.seq.clone(),
            start: self.start,
            end: self.end,
            traversal: self.traversal,
        }
    }
}

impl<T: Send + 'static> SeqRange<T> {
    /// Reports at most `traversal` as the range's capability.
    pub fn restrict(mut self, traversal: Traversal) -> SeqRange<T> {
        self.traversal = self.traversal.min(traversal);
        self
    }

    fn window(&self, count: usize) -> Result<Range<usize>> {
        parex_common::verify_arg!(count, count <= self.end - self.start);
        Ok(self.start..self.start + count)
    }
}

impl<T> std::fmt::Debug for SeqRange<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeqRange")
            .field("start", &self.start)
            .field("end", &self.end)
            .field("traversal", &self.traversal)
            .finish()
    }
}

impl<T: Send + 'static> Target for SeqRange<T> {
    type Item = T;

    fn traversal(&self) -> Traversal {
        self.traversal
    }

    fn begin(&self) -> usize {
        self.start
    }

    fn len(&self) -> Option<usize> {
        Some(self.end - self.start)
    }

    fn assign_each<F>(&self, count: usize, mut f: F) -> Result<()>
    where
        F: FnMut() -> T,
    {
        let window = self.window(count)?;
        let mut values = self.seq.lock();
        values[window].iter_mut().for_each(|slot| *slot = f());
        Ok(())
    }

    fn with_slice_mut<F, R>(&self, count: usize, f: F) -> Result<R>
    where
        F: FnOnce(&mut [T]) -> R,
    {
        let window = self.window(count)?;
        let mut values = self.seq.lock();
        Ok(f(&mut values[window]))
    }
}

/// Write-only sink that appends every assigned value to a [`Sequence`].
///
/// Its positions count the values appended through it, starting at 0.
pub struct BackInserter<T> {
    seq: Sequence<T>,
}

impl<T> Clone for BackInserter<T> {
    fn clone(&self) -> Self {
        BackInserter {
            seq: self.seq.clone(),
        }
    }
}

impl<T: Send + 'static> Target for BackInserter<T> {
    type Item = T;

    fn traversal(&self) -> Traversal {
        Traversal::Output
    }

    fn begin(&self) -> usize {
        0
    }

    fn len(&self) -> Option<usize> {
        None
    }

    fn assign_each<F>(&self, count: usize, mut f: F) -> Result<()>
    where
        F: FnMut() -> T,
    {
        let mut values = self.seq.lock();
        values.reserve(count);
        for _ in 0..count {
            values.push(f());
        }
        Ok(())
    }

    fn with_slice_mut<F, R>(&self, _count: usize, _f: F) -> Result<R>
    where
        F: FnOnce(&mut [T]) -> R,
    {
        Err(Error::invalid_operation(
            "with_slice_mut on an output-only sink",
        ))
    }
}
