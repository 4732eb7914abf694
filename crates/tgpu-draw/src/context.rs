//! Bound pipeline state, clears and job flushing. Draw packing lives in [`crate::draw`].

use bitflags::bitflags;
use tracing::debug;

use crate::bo::{BoAllocator, BoRef, VaAllocator};
use crate::ctx_buff::{BufferState, CtxBuff, CtxBuffers, StreamUploader};
use crate::error::DrawError;
use crate::index::{IndexBuffer, MinMaxCache};
use crate::job::{BoAccess, ClearBuffers, Job, JobTracker, Pipe};
use crate::rect::Rect;
use crate::state::{
    BlendColor, BlendState, ConstantBuffer, DepthStencilAlphaState, FramebufferState, FsShader,
    RasterizerState, ScissorState, ShaderStage, StencilRef, VertexBuffer, VertexElement,
    Viewport, ViewportState, VsShader,
};
use crate::stats::ContextStats;
use crate::texture::{SamplerView, MAX_SAMPLER_VIEWS};
use crate::util::{float_to_ubyte, float_to_ushort, pack_z24};

bitflags! {
    /// State groups changed since the last draw.
    #[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct DirtyFlags: u32 {
        const FRAMEBUFFER = 1 << 0;
        const CLEAR = 1 << 1;
        const COMPILED_VS = 1 << 2;
        const COMPILED_FS = 1 << 3;
        const VERTEX_ELEM = 1 << 4;
        const VERTEX_BUFF = 1 << 5;
        const VIEWPORT = 1 << 6;
        const SCISSOR = 1 << 7;
        const RASTERIZER = 1 << 8;
        const ZSA = 1 << 9;
        const BLEND_COLOR = 1 << 10;
        const BLEND = 1 << 11;
        const STENCIL_REF = 1 << 12;
        const CONST_BUFF = 1 << 13;
        const TEXTURES = 1 << 14;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextConfig {
    /// Vertex count above which non-indexed draws are split.
    pub max_vertices_per_draw: u32,
    /// Size of each stream upload block.
    pub stream_block_size: u32,
    /// Ranges remembered per index buffer created through [`Context::index_buffer`].
    pub minmax_cache_capacity: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_vertices_per_draw: 65535,
            stream_block_size: StreamUploader::DEFAULT_BLOCK_SIZE,
            minmax_cache_capacity: MinMaxCache::DEFAULT_CAPACITY,
        }
    }
}

/// A rendering context: the bound state plus the jobs recorded from it.
pub struct Context<A: BoAllocator = VaAllocator> {
    pub(crate) config: ContextConfig,
    pub(crate) alloc: A,
    pub(crate) dirty: DirtyFlags,

    pub(crate) framebuffer: FramebufferState,
    pub(crate) rasterizer: RasterizerState,
    pub(crate) blend: BlendState,
    pub(crate) blend_color: BlendColor,
    pub(crate) zsa: DepthStencilAlphaState,
    pub(crate) stencil_ref: StencilRef,
    pub(crate) viewport: Viewport,
    pub(crate) scissor: ScissorState,
    pub(crate) clipped_scissor: Rect,
    pub(crate) vs: Option<VsShader>,
    pub(crate) fs: Option<FsShader>,
    pub(crate) vertex_elements: Vec<VertexElement>,
    pub(crate) vertex_buffers: Vec<Option<VertexBuffer>>,
    pub(crate) const_buffers: [ConstantBuffer; 2],
    pub(crate) sampler_views: Vec<SamplerView>,

    pub(crate) buffers: CtxBuffers,
    pub(crate) jobs: JobTracker,
    pub(crate) stats: ContextStats,
}

impl Context<VaAllocator> {
    pub fn new() -> Self {
        Self::with_allocator(VaAllocator::default(), ContextConfig::default())
    }
}

impl Default for Context<VaAllocator> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: BoAllocator> Context<A> {
    pub fn with_allocator(alloc: A, config: ContextConfig) -> Self {
        Self {
            config,
            alloc,
            dirty: DirtyFlags::all(),
            framebuffer: FramebufferState::default(),
            rasterizer: RasterizerState::default(),
            blend: BlendState::default(),
            blend_color: BlendColor::default(),
            zsa: DepthStencilAlphaState::default(),
            stencil_ref: StencilRef::default(),
            viewport: Viewport::from(&ViewportState::default()),
            scissor: ScissorState::default(),
            clipped_scissor: Rect::EMPTY,
            vs: None,
            fs: None,
            vertex_elements: Vec::new(),
            vertex_buffers: Vec::new(),
            const_buffers: Default::default(),
            sampler_views: Vec::new(),
            buffers: CtxBuffers::new(config.stream_block_size),
            jobs: JobTracker::new(),
            stats: ContextStats::default(),
        }
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub fn allocator(&mut self) -> &mut A {
        &mut self.alloc
    }

    /// Allocate a buffer object from the context's allocator.
    pub fn alloc_bo(&mut self, size: u32) -> Result<BoRef, DrawError> {
        self.alloc.alloc(size).ok_or(DrawError::OutOfMemory { size })
    }

    /// Wrap `bo` as index data with the configured range cache size.
    pub fn index_buffer(&self, bo: BoRef) -> IndexBuffer {
        IndexBuffer::with_cache_capacity(bo, self.config.minmax_cache_capacity)
    }

    /// Placement of the last upload of `buff`.
    pub fn record(&self, buff: CtxBuff) -> Option<&BufferState> {
        self.buffers.state(buff)
    }

    pub fn dirty(&self) -> DirtyFlags {
        self.dirty
    }

    pub fn stats(&self) -> ContextStats {
        ContextStats {
            jobs_submitted: self.jobs.submitted_total(),
            ..self.stats
        }
    }

    pub fn set_rasterizer(&mut self, state: RasterizerState) {
        self.rasterizer = state;
        self.dirty |= DirtyFlags::RASTERIZER;
    }

    pub fn set_blend(&mut self, state: BlendState) {
        self.blend = state;
        self.dirty |= DirtyFlags::BLEND;
    }

    pub fn set_blend_color(&mut self, color: BlendColor) {
        self.blend_color = color;
        self.dirty |= DirtyFlags::BLEND_COLOR;
    }

    pub fn set_depth_stencil_alpha(&mut self, state: DepthStencilAlphaState) {
        self.zsa = state;
        self.dirty |= DirtyFlags::ZSA;
    }

    pub fn set_stencil_ref(&mut self, stencil_ref: StencilRef) {
        self.stencil_ref = stencil_ref;
        self.dirty |= DirtyFlags::STENCIL_REF;
    }

    pub fn set_viewport(&mut self, state: &ViewportState) {
        self.viewport = Viewport::from(state);
        self.dirty |= DirtyFlags::VIEWPORT;
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn set_scissor(&mut self, scissor: ScissorState) {
        self.scissor = scissor;
        self.dirty |= DirtyFlags::SCISSOR;
    }

    /// The last scissor rectangle a draw was clipped to.
    pub fn clipped_scissor(&self) -> Rect {
        self.clipped_scissor
    }

    pub fn set_framebuffer(&mut self, fb: FramebufferState) {
        self.framebuffer = fb;
        self.dirty |= DirtyFlags::FRAMEBUFFER;
    }

    pub fn framebuffer(&self) -> &FramebufferState {
        &self.framebuffer
    }

    pub fn bind_vs(&mut self, vs: Option<VsShader>) {
        self.vs = vs;
        self.dirty |= DirtyFlags::COMPILED_VS;
    }

    pub fn bind_fs(&mut self, fs: Option<FsShader>) {
        self.fs = fs;
        self.dirty |= DirtyFlags::COMPILED_FS;
    }

    pub fn set_vertex_elements(&mut self, elements: Vec<VertexElement>) {
        self.vertex_elements = elements;
        self.dirty |= DirtyFlags::VERTEX_ELEM;
    }

    /// Bind `buffers` starting at slot `start`; `None` unbinds a slot.
    pub fn set_vertex_buffers(&mut self, start: usize, buffers: Vec<Option<VertexBuffer>>) {
        let end = start + buffers.len();
        if self.vertex_buffers.len() < end {
            self.vertex_buffers.resize(end, None);
        }
        for (slot, vb) in self.vertex_buffers[start..end].iter_mut().zip(buffers) {
            *slot = vb;
        }
        self.dirty |= DirtyFlags::VERTEX_BUFF;
    }

    /// Replace the constant buffer of `stage`; `None` unbinds it.
    pub fn set_constant_buffer(&mut self, stage: ShaderStage, data: Option<Vec<u8>>) {
        let cb = &mut self.const_buffers[stage_index(stage)];
        cb.data = data;
        cb.dirty = true;
        self.dirty |= DirtyFlags::CONST_BUFF;
    }

    pub fn set_sampler_views(&mut self, views: Vec<SamplerView>) -> Result<(), DrawError> {
        if views.len() > MAX_SAMPLER_VIEWS {
            return Err(DrawError::TooManySamplerViews(views.len()));
        }
        self.sampler_views = views;
        self.dirty |= DirtyFlags::TEXTURES;
        Ok(())
    }

    /// Clear `buffers` of the bound framebuffer.
    ///
    /// Consecutive clears share a job; a clear after a draw starts a new one.
    pub fn clear(&mut self, buffers: ClearBuffers, color: [f32; 4], depth: f64, stencil: u32) {
        if self.jobs.current(&self.framebuffer).has_draw_pending() {
            debug!("clear after draw, flushing job");
            self.jobs.flush_current(&self.framebuffer);
        }

        self.update_job_wb(buffers);

        let fb = &self.framebuffer;
        if let Some(cbuf) = &fb.cbuf {
            if buffers.contains(ClearBuffers::COLOR0) {
                cbuf.reload.set(cbuf.reload.get() - ClearBuffers::COLOR0);
            }
        }
        if let Some(zsbuf) = &fb.zsbuf {
            let cleared = buffers & ClearBuffers::DEPTH_STENCIL;
            zsbuf.reload.set(zsbuf.reload.get() - cleared);
        }

        let (width, height) = (fb.width, fb.height);
        let job = self.jobs.current(&self.framebuffer);
        job.clear.buffers = buffers;
        if buffers.contains(ClearBuffers::COLOR0) {
            let [r, g, b, a] = color;
            job.clear.color_8pc = (u32::from(float_to_ubyte(a)) << 24)
                | (u32::from(float_to_ubyte(b)) << 16)
                | (u32::from(float_to_ubyte(g)) << 8)
                | u32::from(float_to_ubyte(r));
            job.clear.color_16pc = (u64::from(float_to_ushort(a)) << 48)
                | (u64::from(float_to_ushort(b)) << 32)
                | (u64::from(float_to_ushort(g)) << 16)
                | u64::from(float_to_ushort(r));
        }
        if buffers.contains(ClearBuffers::DEPTH) {
            job.clear.depth = pack_z24(depth);
        }
        if buffers.contains(ClearBuffers::STENCIL) {
            job.clear.stencil = stencil;
        }
        job.damage.union(&Rect::new(0, width, 0, height));

        self.dirty |= DirtyFlags::CLEAR;
        self.stats.clears += 1;
    }

    /// Flush every open job to the submit queue.
    pub fn flush(&mut self) {
        self.jobs.flush_all();
    }

    /// Drain the jobs flushed so far, oldest first.
    pub fn take_submitted(&mut self) -> Vec<Job> {
        self.jobs.take_submitted()
    }

    /// The open job for the bound framebuffer, if it exists.
    pub fn current_job(&self) -> Option<&Job> {
        self.jobs.job(&self.framebuffer.key())
    }

    /// Register the bound render targets covered by `buffers` as written by the current job.
    ///
    /// A target is only registered once per job: the first time its plane joins the resolve
    /// set, other jobs touching it are flushed and this job becomes its last writer.
    pub(crate) fn update_job_wb(&mut self, buffers: ClearBuffers) {
        let resolve = self.jobs.current(&self.framebuffer).resolve;

        if let Some(cbuf) = self.framebuffer.cbuf.clone() {
            if buffers.contains(ClearBuffers::COLOR0) && !resolve.contains(ClearBuffers::COLOR0) {
                self.register_write(&cbuf.bo);
            }
        }

        if let Some(zsbuf) = self.framebuffer.zsbuf.clone() {
            if buffers.intersects(ClearBuffers::DEPTH_STENCIL)
                && !resolve.intersects(ClearBuffers::DEPTH_STENCIL)
            {
                self.register_write(&zsbuf.bo);
            }
        }

        self.jobs.current(&self.framebuffer).resolve |= buffers;
    }

    fn register_write(&mut self, bo: &BoRef) {
        self.jobs.flush_accessing_bo(bo.handle(), true);
        self.jobs.set_writer(bo.handle(), &self.framebuffer);
        self.jobs
            .current(&self.framebuffer)
            .add_bo(Pipe::Pp, bo, BoAccess::WRITE);
    }
}

pub(crate) fn stage_index(stage: ShaderStage) -> usize {
    match stage {
        ShaderStage::Vertex => 0,
        ShaderStage::Fragment => 1,
    }
}
