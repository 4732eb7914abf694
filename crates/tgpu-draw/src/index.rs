//! Index buffers and the min/max index range every indexed draw needs.
//!
//! The hardware shades the vertex range `[min, max]` before the PLBU walks the indices, so the
//! range must be known up front. It comes from the caller when supplied, otherwise from a
//! per-buffer cache, otherwise from scanning the indices.

use std::cell::RefCell;
use std::num::NonZeroUsize;

use lru::LruCache;

use crate::bo::BoRef;
use crate::error::DrawError;
use crate::state::PrimMode;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct RangeKey {
    index_size: u8,
    start: u32,
    count: u32,
}

impl RangeKey {
    fn overlaps(&self, offset: u64, len: u64) -> bool {
        let size = u64::from(self.index_size);
        let lo = u64::from(self.start) * size;
        let hi = lo + u64::from(self.count) * size;
        lo < offset + len && offset < hi
    }
}

/// LRU cache of scanned index ranges.
#[derive(Debug)]
pub struct MinMaxCache {
    entries: LruCache<RangeKey, (u32, u32)>,
}

impl MinMaxCache {
    pub const DEFAULT_CAPACITY: usize = 64;

    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
        }
    }

    pub fn get(&mut self, index_size: u8, start: u32, count: u32) -> Option<(u32, u32)> {
        self.entries
            .get(&RangeKey {
                index_size,
                start,
                count,
            })
            .copied()
    }

    pub fn add(&mut self, index_size: u8, start: u32, count: u32, range: (u32, u32)) {
        self.entries.put(
            RangeKey {
                index_size,
                start,
                count,
            },
            range,
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Drop every range that reads a byte of `[offset, offset + len)`.
    pub fn invalidate_range(&mut self, offset: u64, len: u64) {
        let stale: Vec<RangeKey> = self
            .entries
            .iter()
            .filter(|(key, _)| key.overlaps(offset, len))
            .map(|(key, _)| *key)
            .collect();
        for key in stale {
            self.entries.pop(&key);
        }
    }
}

impl Default for MinMaxCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

/// A buffer object used as index data. Writers must call [`IndexBuffer::invalidate`] or
/// [`IndexBuffer::invalidate_range`] after changing its contents.
#[derive(Debug)]
pub struct IndexBuffer {
    pub bo: BoRef,
    cache: RefCell<MinMaxCache>,
}

impl IndexBuffer {
    pub fn new(bo: BoRef) -> Self {
        Self::with_cache_capacity(bo, MinMaxCache::DEFAULT_CAPACITY)
    }

    pub fn with_cache_capacity(bo: BoRef, capacity: usize) -> Self {
        Self {
            bo,
            cache: RefCell::new(MinMaxCache::new(capacity)),
        }
    }

    pub fn invalidate(&self) {
        self.cache.borrow_mut().clear();
    }

    pub fn invalidate_range(&self, offset: u64, len: u64) {
        self.cache.borrow_mut().invalidate_range(offset, len);
    }

    pub fn cached_ranges(&self) -> usize {
        self.cache.borrow().len()
    }

    pub(crate) fn cached(&self, index_size: u8, start: u32, count: u32) -> Option<(u32, u32)> {
        self.cache.borrow_mut().get(index_size, start, count)
    }

    pub(crate) fn remember(&self, index_size: u8, start: u32, count: u32, range: (u32, u32)) {
        self.cache.borrow_mut().add(index_size, start, count, range);
    }
}

/// Where an indexed draw reads its indices from.
#[derive(Clone, Copy, Debug)]
pub enum IndexSource<'a> {
    Resource(&'a IndexBuffer),
    /// Client memory, uploaded per draw and never cached.
    User(&'a [u8]),
}

/// Per-call draw parameters shared by all `(start, count)` pairs of a multi-draw.
#[derive(Clone, Copy, Debug)]
pub struct DrawInfo<'a> {
    pub mode: PrimMode,
    /// 0 for non-indexed draws, otherwise 1, 2 or 4 bytes.
    pub index_size: u8,
    pub index: Option<IndexSource<'a>>,
    /// Added to every index before fetching attributes.
    pub index_bias: i32,
    /// Caller-supplied `(min, max)` index, skipping the scan.
    pub index_bounds: Option<(u32, u32)>,
}

impl<'a> DrawInfo<'a> {
    pub fn arrays(mode: PrimMode) -> Self {
        Self {
            mode,
            index_size: 0,
            index: None,
            index_bias: 0,
            index_bounds: None,
        }
    }

    pub fn indexed(mode: PrimMode, index_size: u8, index: IndexSource<'a>) -> Self {
        Self {
            mode,
            index_size,
            index: Some(index),
            index_bias: 0,
            index_bounds: None,
        }
    }

    pub fn is_indexed(&self) -> bool {
        self.index_size != 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawStartCount {
    pub start: u32,
    pub count: u32,
}

impl DrawStartCount {
    pub fn new(start: u32, count: u32) -> Self {
        Self { start, count }
    }
}

/// Smallest and largest of `count` indices of `index_size` bytes starting at index `start`.
pub fn scan_min_max(
    data: &[u8],
    index_size: u8,
    start: u32,
    count: u32,
) -> Result<(u32, u32), DrawError> {
    let size = match index_size {
        1 | 2 | 4 => usize::from(index_size),
        other => return Err(DrawError::UnsupportedIndexSize(other)),
    };
    let out_of_bounds = DrawError::IndexRangeOutOfBounds {
        start,
        count,
        len: data.len(),
    };
    let begin = (start as usize)
        .checked_mul(size)
        .ok_or_else(|| out_of_bounds.clone())?;
    let end = (count as usize)
        .checked_mul(size)
        .and_then(|n| n.checked_add(begin))
        .ok_or_else(|| out_of_bounds.clone())?;
    let bytes = data.get(begin..end).ok_or(out_of_bounds)?;

    let (mut min, mut max) = (u32::MAX, 0);
    for chunk in bytes.chunks_exact(size) {
        let v = match size {
            1 => u32::from(chunk[0]),
            2 => u32::from(u16::from_le_bytes([chunk[0], chunk[1]])),
            _ => u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]),
        };
        min = min.min(v);
        max = max.max(v);
    }
    if count == 0 {
        min = 0;
    }
    Ok((min, max))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bo::{BoAllocator, VaAllocator};

    #[test]
    fn scan_reads_little_endian_indices() {
        let data: Vec<u8> = [7u16, 3, 9, 4].iter().flat_map(|v| v.to_le_bytes()).collect();
        assert_eq!(scan_min_max(&data, 2, 0, 4), Ok((3, 9)));
        assert_eq!(scan_min_max(&data, 2, 2, 2), Ok((4, 9)));
        assert_eq!(scan_min_max(&[5, 1, 200], 1, 0, 3), Ok((1, 200)));
    }

    #[test]
    fn scan_rejects_bad_sizes_and_ranges() {
        assert_eq!(
            scan_min_max(&[0; 8], 3, 0, 1),
            Err(DrawError::UnsupportedIndexSize(3))
        );
        assert_eq!(
            scan_min_max(&[0; 8], 4, 1, 2),
            Err(DrawError::IndexRangeOutOfBounds {
                start: 1,
                count: 2,
                len: 8
            })
        );
    }

    #[test]
    fn cache_evicts_least_recently_used() {
        let mut cache = MinMaxCache::new(2);
        cache.add(2, 0, 3, (0, 2));
        cache.add(2, 3, 3, (3, 5));
        assert_eq!(cache.get(2, 0, 3), Some((0, 2)));
        cache.add(2, 6, 3, (6, 8));
        assert_eq!(cache.get(2, 3, 3), None);
        assert_eq!(cache.get(2, 0, 3), Some((0, 2)));
    }

    #[test]
    fn range_invalidation_drops_only_overlapping_entries() {
        let mut alloc = VaAllocator::default();
        let ib = IndexBuffer::new(alloc.alloc(64).unwrap());
        ib.remember(2, 0, 4, (0, 3));
        ib.remember(2, 8, 4, (8, 11));
        ib.remember(4, 0, 2, (0, 1));
        // Bytes 16..20 belong to the 16-bit range starting at index 8 only.
        ib.invalidate_range(16, 4);
        assert_eq!(ib.cached(2, 8, 4), None);
        assert_eq!(ib.cached(2, 0, 4), Some((0, 3)));
        assert_eq!(ib.cached(4, 0, 2), Some((0, 1)));
        ib.invalidate();
        assert_eq!(ib.cached_ranges(), 0);
    }
}
