//! Transient per-draw records (uniforms, attribute and varying tables, render state, texture
//! descriptors) and the stream buffer they are sub-allocated from.

use tracing::trace;

use crate::bo::{BoAllocator, BoRef};
use crate::error::DrawError;
use crate::job::{BoAccess, Job, Pipe};
use crate::util::align_up;

/// Records the packer uploads for the hardware. Each keeps its last upload until replaced, so
/// a draw that does not rewrite one reuses the previous contents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CtxBuff {
    GpUniform,
    GpAttributeInfo,
    GpVaryingInfo,
    PpPlbRsw,
    PpUniformArray,
    PpUniform,
    PpTexDesc,
}

impl CtxBuff {
    const COUNT: usize = 7;

    /// The pipe that reads this record.
    pub fn pipe(self) -> Pipe {
        match self {
            CtxBuff::GpUniform | CtxBuff::GpAttributeInfo | CtxBuff::GpVaryingInfo => Pipe::Gp,
            CtxBuff::PpPlbRsw | CtxBuff::PpUniformArray | CtxBuff::PpUniform | CtxBuff::PpTexDesc => {
                Pipe::Pp
            }
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Placement of one uploaded record.
#[derive(Clone, Debug)]
pub struct BufferState {
    pub bo: BoRef,
    pub offset: u32,
    pub size: u32,
}

impl BufferState {
    pub fn va(&self) -> u32 {
        self.bo.va() + self.offset
    }
}

/// Linear sub-allocator over fixed-size blocks. Uploads larger than a block get their own
/// buffer.
#[derive(Debug)]
pub struct StreamUploader {
    block_size: u32,
    block: Option<BoRef>,
    cursor: u32,
}

impl StreamUploader {
    pub const DEFAULT_BLOCK_SIZE: u32 = 0x1_0000;
    pub const ALIGNMENT: u32 = 0x40;

    pub fn new(block_size: u32) -> Self {
        Self {
            block_size: block_size.max(Self::ALIGNMENT),
            block: None,
            cursor: 0,
        }
    }

    /// Copy `bytes` into the stream at an `ALIGNMENT`-aligned offset.
    pub fn upload(
        &mut self,
        alloc: &mut dyn BoAllocator,
        bytes: &[u8],
    ) -> Result<(BoRef, u32), DrawError> {
        let size = bytes.len() as u32;
        let (bo, offset) = self.reserve(alloc, size)?;
        bo.write(offset, bytes);
        Ok((bo, offset))
    }

    fn reserve(&mut self, alloc: &mut dyn BoAllocator, size: u32) -> Result<(BoRef, u32), DrawError> {
        if size > self.block_size {
            let bo = alloc.alloc(size).ok_or(DrawError::OutOfMemory { size })?;
            return Ok((bo, 0));
        }

        let offset = align_up(self.cursor, Self::ALIGNMENT);
        match &self.block {
            Some(bo) if u64::from(offset) + u64::from(size) <= u64::from(self.block_size) => {
                self.cursor = offset + size;
                Ok((bo.clone(), offset))
            }
            _ => {
                let bo = alloc.alloc(self.block_size).ok_or(DrawError::OutOfMemory {
                    size: self.block_size,
                })?;
                trace!(va = bo.va(), size = self.block_size, "new upload block");
                self.block = Some(bo.clone());
                self.cursor = size;
                Ok((bo, 0))
            }
        }
    }
}

impl Default for StreamUploader {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BLOCK_SIZE)
    }
}

#[derive(Debug, Default)]
pub struct CtxBuffers {
    uploader: StreamUploader,
    states: [Option<BufferState>; CtxBuff::COUNT],
}

impl CtxBuffers {
    pub fn new(block_size: u32) -> Self {
        Self {
            uploader: StreamUploader::new(block_size),
            states: Default::default(),
        }
    }

    /// Upload a new version of `buff`.
    pub fn upload(
        &mut self,
        alloc: &mut dyn BoAllocator,
        buff: CtxBuff,
        bytes: &[u8],
    ) -> Result<&BufferState, DrawError> {
        let (bo, offset) = self.uploader.upload(alloc, bytes)?;
        let state = self.states[buff.index()].insert(BufferState {
            bo,
            offset,
            size: bytes.len() as u32,
        });
        Ok(state)
    }

    /// Upload bytes that are not one of the records, such as user index data.
    pub fn upload_raw(
        &mut self,
        alloc: &mut dyn BoAllocator,
        bytes: &[u8],
    ) -> Result<(BoRef, u32), DrawError> {
        self.uploader.upload(alloc, bytes)
    }

    pub fn state(&self, buff: CtxBuff) -> Option<&BufferState> {
        self.states[buff.index()].as_ref()
    }

    /// GPU address of the current `buff`, registering it as read by its pipe in `job`.
    pub fn va(&self, buff: CtxBuff, job: &mut Job) -> Result<u32, DrawError> {
        let state = self
            .state(buff)
            .ok_or(DrawError::ContextBufferNotUploaded(buff))?;
        job.add_bo(buff.pipe(), &state.bo, BoAccess::READ);
        Ok(state.va())
    }
}
