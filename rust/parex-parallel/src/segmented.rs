//! Ranges spread over partitions owned by different localities.
//!
//! A [`PartitionService`] decomposes a global range into [`SegmentDescriptor`]s, one per
//! partition the range intersects. The dispatcher runs the algorithm on each segment's
//! local range independently and translates the results back to global positions.
//! [`SegmentedSequence`] is an in-process partition service that keeps every partition
//! in its own [`Sequence`].

use std::{fmt, ops::Range, sync::Arc};

use parex_common::{Error, Result, verify_arg};

use crate::target::{Layout, SeqRange, Sequence, Target, Traversal};

/// Identifies the owner of a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocalityId(pub u32);

impl fmt::Display for LocalityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "locality#{}", self.0)
    }
}

/// The part of a global range owned by one partition.
pub struct SegmentDescriptor<T> {
    /// Positions covered by the segment in the global space.
    pub global: Range<usize>,
    /// The same elements as a local range.
    pub local: SeqRange<T>,
    pub locality: LocalityId,
}

impl<T: Send + 'static> SegmentDescriptor<T> {
    pub fn len(&self) -> usize {
        self.global.len()
    }

    pub fn is_empty(&self) -> bool {
        self.global.is_empty()
    }

    /// Translates a position of the local range into the global space.
    pub fn to_global(&self, local_pos: usize) -> usize {
        self.global.start + (local_pos - self.local.begin())
    }
}

impl<T> fmt::Debug for SegmentDescriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentDescriptor")
            .field("global", &self.global)
            .field("local", &self.local)
            .field("locality", &self.locality)
            .finish()
    }
}

pub trait PartitionService: Send + Sync + 'static {
    type Item: Send + 'static;

    /// Total number of elements across all partitions.
    fn len(&self) -> usize;

    /// One descriptor per partition intersecting `range`, in global order. Partitions
    /// with an empty intersection are skipped.
    fn decompose(&self, range: Range<usize>) -> Result<Vec<SegmentDescriptor<Self::Item>>>;
}

struct Partition<T> {
    locality: LocalityId,
    start: usize,
    data: Sequence<T>,
}

/// In-process partitioned storage.
pub struct SegmentedSequence<T> {
    partitions: Arc<Vec<Partition<T>>>,
}

impl<T> Clone for SegmentedSequence<T> {
    fn clone(&self) -> Self {
        SegmentedSequence {
            partitions: self.partitions.clone(),
        }
    }
}

impl<T: Send + 'static> SegmentedSequence<T> {
    /// Builds the storage from partitions listed in global order.
    pub fn from_parts(parts: Vec<(LocalityId, Vec<T>)>) -> SegmentedSequence<T> {
        let mut start = 0;
        let partitions = parts
            .into_iter()
            .map(|(locality, values)| {
                let partition = Partition {
                    locality,
                    start,
                    data: Sequence::from_vec(values),
                };
                start += partition.data.len();
                partition
            })
            .collect();
        SegmentedSequence {
            partitions: Arc::new(partitions),
        }
    }

    /// Distributes `values` over `segments` partitions of near-equal size, owned by
    /// localities `0..segments`.
    pub fn split(mut values: Vec<T>, segments: usize) -> SegmentedSequence<T> {
        let segments = segments.max(1);
        let base = values.len() / segments;
        let extra = values.len() % segments;
        let sizes = (0..segments).map(|i| base + usize::from(i < extra)).collect::<Vec<_>>();
        let mut parts = Vec::with_capacity(segments);
        for (i, size) in sizes.into_iter().enumerate().rev() {
            let tail = values.split_off(values.len() - size);
            parts.push((LocalityId(i as u32), tail));
        }
        parts.reverse();
        Self::from_parts(parts)
    }

    pub fn num_partitions(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        PartitionService::len(self) == 0
    }

    /// Concatenation of all partitions.
    pub fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.partitions
            .iter()
            .flat_map(|p| p.data.to_vec())
            .collect()
    }

    pub fn range(&self) -> SegmentedRange<SegmentedSequence<T>> {
        let len = PartitionService::len(self);
        SegmentedRange::new(self.clone(), 0..len)
    }
}

impl<T: Send + 'static> PartitionService for SegmentedSequence<T> {
    type Item = T;

    fn len(&self) -> usize {
        self.partitions.iter().map(|p| p.data.len()).sum()
    }

    fn decompose(&self, range: Range<usize>) -> Result<Vec<SegmentDescriptor<T>>> {
        verify_arg!(
            range,
            range.start <= range.end && range.end <= PartitionService::len(self)
        );
        let mut segments = Vec::new();
        for partition in self.partitions.iter() {
            let end = partition.start + partition.data.len();
            let lo = range.start.max(partition.start);
            let hi = range.end.min(end);
            if lo >= hi {
                continue;
            }
            let local = partition
                .data
                .sub_range(lo - partition.start..hi - partition.start)?;
            segments.push(SegmentDescriptor {
                global: lo..hi,
                local,
                locality: partition.locality,
            });
        }
        Ok(segments)
    }
}

/// A global range over a [`PartitionService`].
///
/// Its layout is always segmented, so elements are never accessed through the target
/// itself.
pub struct SegmentedRange<P> {
    service: P,
    global: Range<usize>,
}

impl<P: PartitionService> SegmentedRange<P> {
    pub fn new(service: P, global: Range<usize>) -> SegmentedRange<P> {
        SegmentedRange { service, global }
    }
}

impl<P: PartitionService> Target for SegmentedRange<P> {
    type Item = P::Item;

    fn traversal(&self) -> Traversal {
        Traversal::RandomAccess
    }

    fn begin(&self) -> usize {
        self.global.start
    }

    fn len(&self) -> Option<usize> {
        Some(self.global.len())
    }

    fn layout(&self, count: usize) -> Result<Layout<P::Item>> {
        verify_arg!(count, count <= self.global.len());
        let segments = self
            .service
            .decompose(self.global.start..self.global.start + count)?;
        Ok(Layout::Segmented(segments))
    }

    fn assign_each<F>(&self, _count: usize, _f: F) -> Result<()>
    where
        F: FnMut() -> P::Item,
    {
        Err(Error::invalid_operation("assign_each on a segmented range"))
    }

    fn with_slice_mut<F, R>(&self, _count: usize, _f: F) -> Result<R>
    where
        F: FnOnce(&mut [P::Item]) -> R,
    {
        Err(Error::invalid_operation("with_slice_mut on a segmented range"))
    }
}

#[cfg(test)]
mod tests {
    use super::{LocalityId, PartitionService, SegmentedSequence};
    use crate::target::Target;

    #[test]
    fn test_split_sizes() {
        let seq = SegmentedSequence::split((0..10).collect::<Vec<u32>>(), 3);
        assert_eq!(seq.num_partitions(), 3);
        assert_eq!(seq.to_vec(), (0..10).collect::<Vec<_>>());
        let sizes = seq
            .decompose(0..10)
            .unwrap()
            .iter()
            .map(|s| s.len())
            .collect::<Vec<_>>();
        assert_eq!(sizes, vec![4, 3, 3]);
    }

    #[test]
    fn test_decompose_skips_empty_intersections() {
        let seq = SegmentedSequence::from_parts(vec![
            (LocalityId(7), vec![0u8; 4]),
            (LocalityId(8), vec![]),
            (LocalityId(9), vec![0u8; 4]),
        ]);
        let segments = seq.decompose(2..6).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].global, 2..4);
        assert_eq!(segments[0].local.begin(), 2);
        assert_eq!(segments[0].locality, LocalityId(7));
        assert_eq!(segments[1].global, 4..6);
        assert_eq!(segments[1].local.begin(), 0);
        assert_eq!(segments[1].to_global(2), 6);

        assert!(seq.decompose(0..0).unwrap().is_empty());
        assert!(seq.decompose(3..9).is_err());
    }

    #[test]
    fn test_segmented_range_layout() {
        let seq = SegmentedSequence::split(vec![0i64; 12], 4);
        let range = seq.range();
        assert_eq!(range.len(), Some(12));
        assert!(range.layout(13).is_err());
        assert!(range.assign_each(1, || 1).is_err());
    }
}
