//! GPU buffer objects and their allocation.
//!
//! A [`BufferObject`] is a GPU virtual address range plus a CPU-visible copy of its contents.
//! Objects are shared through [`BoRef`]: every job that references a buffer keeps a clone, so a
//! buffer lives until the last job using it has been drained.

use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::util::align_up;

/// Kernel-visible buffer handle, unique per allocator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoHandle(pub u32);

pub struct BufferObject {
    handle: BoHandle,
    va: u32,
    data: RefCell<Vec<u8>>,
}

pub type BoRef = Rc<BufferObject>;

impl BufferObject {
    pub fn new(handle: BoHandle, va: u32, size: u32) -> Self {
        Self {
            handle,
            va,
            data: RefCell::new(vec![0; size as usize]),
        }
    }

    pub fn handle(&self) -> BoHandle {
        self.handle
    }

    /// GPU virtual address of the first byte.
    pub fn va(&self) -> u32 {
        self.va
    }

    pub fn size(&self) -> u32 {
        self.data.borrow().len() as u32
    }

    /// CPU view of the contents.
    pub fn map(&self) -> Ref<'_, [u8]> {
        Ref::map(self.data.borrow(), Vec::as_slice)
    }

    /// Copy `bytes` to `offset`. Writes past the end are truncated.
    pub fn write(&self, offset: u32, bytes: &[u8]) {
        let mut data = self.data.borrow_mut();
        let start = (offset as usize).min(data.len());
        let end = (start + bytes.len()).min(data.len());
        data[start..end].copy_from_slice(&bytes[..end - start]);
    }

    /// Little-endian dword at `offset`, zero past the end.
    pub fn read_u32(&self, offset: u32) -> u32 {
        let data = self.data.borrow();
        let start = offset as usize;
        data.get(start..start + 4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .unwrap_or(0)
    }
}

impl fmt::Debug for BufferObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferObject")
            .field("handle", &self.handle)
            .field("va", &format_args!("{:#x}", self.va))
            .field("size", &self.size())
            .finish()
    }
}

/// Source of new buffer objects.
///
/// Returns `None` when the request cannot be satisfied.
pub trait BoAllocator {
    fn alloc(&mut self, size: u32) -> Option<BoRef>;
}

/// Bump allocator over a GPU virtual address range. Addresses are never reused.
#[derive(Clone)]
pub struct VaAllocator {
    base: u32,
    end: u64,
    cursor: u64,
    alignment: u32,
    next_handle: u32,
}

impl VaAllocator {
    /// Default placement granularity, one GPU page.
    pub const PAGE_SIZE: u32 = 0x1000;

    /// Allocate from `[base, base + capacity)`.
    pub fn new(base: u32, capacity: u32) -> Self {
        Self {
            base,
            end: u64::from(base) + u64::from(capacity),
            cursor: u64::from(base),
            alignment: Self::PAGE_SIZE,
            next_handle: 1,
        }
    }

    pub fn with_alignment(mut self, alignment: u32) -> Self {
        self.alignment = alignment.max(1);
        self
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    /// Bytes still available.
    pub fn remaining(&self) -> u64 {
        self.end.saturating_sub(self.cursor)
    }
}

impl Default for VaAllocator {
    fn default() -> Self {
        Self::new(0x1000_0000, 0x8000_0000)
    }
}

impl BoAllocator for VaAllocator {
    fn alloc(&mut self, size: u32) -> Option<BoRef> {
        let va = u32::try_from(self.cursor).ok()?;
        let va = align_up(va, self.alignment);
        let end = u64::from(va) + u64::from(size.max(1));
        if end > self.end {
            return None;
        }
        self.cursor = end;

        let handle = BoHandle(self.next_handle);
        self.next_handle += 1;
        Some(Rc::new(BufferObject::new(handle, va, size)))
    }
}

impl fmt::Debug for VaAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaAllocator")
            .field("base", &self.base)
            .field("end", &self.end)
            .field("cursor", &self.cursor)
            .finish()
    }
}
