//! Draw packing: turns a bound state snapshot plus a draw call into GP and PLBU command words
//! and the records they point at.

use tracing::{debug, trace, warn};

use crate::bo::BoAllocator;
use crate::cmd::{PlbuCmd, VsCmd};
use crate::context::{stage_index, Context, DirtyFlags};
use crate::ctx_buff::CtxBuff;
use crate::error::DrawError;
use crate::index::{scan_min_max, DrawInfo, DrawStartCount, IndexSource};
use crate::job::{BoAccess, ClearBuffers, Pipe};
use crate::rect::clip_scissor_to_viewport;
use crate::rsw::{RenderState, RenderStateInputs};
use crate::state::{attribute_descriptor, ShaderStage};
use crate::texture::{descriptor_table, table_size};
use crate::varying::{varying_types, VaryingLayout};

/// Why a draw produced no hardware work. Skips are not errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    MissingShader,
    ZeroScissor,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrawStatus {
    /// `sub_draws` hardware draws were recorded.
    Emitted { sub_draws: u32 },
    Skipped(SkipReason),
}

/// Vertex range and index address of an indexed (sub-)draw.
#[derive(Clone, Copy, Debug)]
struct IndexedRange {
    min: u32,
    max: u32,
    indices_va: u32,
}

impl<A: BoAllocator> Context<A> {
    /// Record one draw per `(start, count)` pair.
    ///
    /// Each pair is handled on its own: a rejected pair does not prevent the others from being
    /// recorded.
    pub fn draw_vbo(
        &mut self,
        info: &DrawInfo<'_>,
        draws: &[DrawStartCount],
    ) -> Vec<Result<DrawStatus, DrawError>> {
        draws
            .iter()
            .map(|draw| {
                let result = self.draw_one(info, *draw);
                match &result {
                    Ok(DrawStatus::Emitted { .. }) => self.stats.draws += 1,
                    Ok(DrawStatus::Skipped(reason)) => {
                        debug!(?reason, start = draw.start, count = draw.count, "draw skipped");
                        self.stats.skipped += 1;
                    }
                    Err(err) => {
                        debug!(%err, start = draw.start, count = draw.count, "draw rejected");
                        self.stats.rejected += 1;
                    }
                }
                result
            })
            .collect()
    }

    fn draw_one(
        &mut self,
        info: &DrawInfo<'_>,
        draw: DrawStartCount,
    ) -> Result<DrawStatus, DrawError> {
        let count = info
            .mode
            .trim(draw.count)
            .ok_or(DrawError::ModeCountMismatch {
                mode: info.mode,
                count: draw.count,
            })?;
        let draw = DrawStartCount::new(draw.start, count);

        let (Some(vs), Some(fs)) = (&self.vs, &self.fs) else {
            warn!("no shader bound, skipping draw");
            return Ok(DrawStatus::Skipped(SkipReason::MissingShader));
        };
        let (vs_bo, fs_bo, fs_stack) = (vs.bo.clone(), fs.bo.clone(), fs.stack_size);

        self.clipped_scissor = clip_scissor_to_viewport(
            &self.rasterizer,
            &self.scissor,
            &self.viewport,
            &self.framebuffer,
        );
        if self.clipped_scissor.is_zero() {
            return Ok(DrawStatus::Skipped(SkipReason::ZeroScissor));
        }

        self.validate(info)?;

        // Sampled textures must hold the results of whoever rendered them.
        for view in &self.sampler_views {
            self.jobs.flush_previous_write_job(view.bo.handle());
        }

        let job = self.jobs.current(&self.framebuffer);
        job.pp_max_stack_size = job.pp_max_stack_size.max(fs_stack);
        job.add_bo(Pipe::Gp, &vs_bo, BoAccess::READ);
        job.add_bo(Pipe::Pp, &fs_bo, BoAccess::READ);

        if info.is_indexed() {
            self.draw_indexed(info, draw)?;
            Ok(DrawStatus::Emitted { sub_draws: 1 })
        } else {
            self.draw_count(info, draw)
        }
    }

    /// Checks that must pass before anything is recorded into the job.
    fn validate(&self, info: &DrawInfo<'_>) -> Result<(), DrawError> {
        if info.is_indexed() {
            if !matches!(info.index_size, 1 | 2 | 4) {
                return Err(DrawError::UnsupportedIndexSize(info.index_size));
            }
            if info.index.is_none() {
                return Err(DrawError::MissingIndexData);
            }
        }

        for (element, ve) in self.vertex_elements.iter().enumerate() {
            let bound = self
                .vertex_buffers
                .get(ve.vertex_buffer_index as usize)
                .is_some_and(Option::is_some);
            if !bound {
                return Err(DrawError::UnboundVertexBuffer {
                    element,
                    buffer: ve.vertex_buffer_index,
                });
            }
        }

        self.blend.rt.alpha_blend_word()?;
        Ok(())
    }

    fn draw_indexed(&mut self, info: &DrawInfo<'_>, draw: DrawStartCount) -> Result<(), DrawError> {
        let size = info.index_size;
        let source = info.index.ok_or(DrawError::MissingIndexData)?;

        let (range, index_bo, indices_va) = match source {
            IndexSource::Resource(ib) => {
                let data_len = ib.bo.size() as usize;
                let end = (u64::from(draw.start) + u64::from(draw.count)) * u64::from(size);
                if end > data_len as u64 {
                    return Err(DrawError::IndexRangeOutOfBounds {
                        start: draw.start,
                        count: draw.count,
                        len: data_len,
                    });
                }

                let range = if let Some(bounds) = info.index_bounds {
                    bounds
                } else if let Some(cached) = ib.cached(size, draw.start, draw.count) {
                    self.stats.index_cache_hits += 1;
                    cached
                } else {
                    let scanned = scan_min_max(&ib.bo.map(), size, draw.start, draw.count)?;
                    self.stats.index_scans += 1;
                    ib.remember(size, draw.start, draw.count, scanned);
                    scanned
                };
                let va = ib.bo.va() + draw.start * u32::from(size);
                (range, ib.bo.clone(), va)
            }
            IndexSource::User(bytes) => {
                let range = match info.index_bounds {
                    Some(bounds) => bounds,
                    None => {
                        self.stats.index_scans += 1;
                        scan_min_max(bytes, size, draw.start, draw.count)?
                    }
                };
                let begin = draw.start as usize * usize::from(size);
                let end = begin + draw.count as usize * usize::from(size);
                let slice = bytes
                    .get(begin..end)
                    .ok_or(DrawError::IndexRangeOutOfBounds {
                        start: draw.start,
                        count: draw.count,
                        len: bytes.len(),
                    })?;
                let (bo, offset) = self.buffers.upload_raw(&mut self.alloc, slice)?;
                let va = bo.va() + offset;
                (range, bo, va)
            }
        };

        let (min, max) = range;
        if i64::from(min) + i64::from(info.index_bias) < 0 {
            return Err(DrawError::NegativeBaseVertex {
                min_index: min,
                bias: info.index_bias,
            });
        }

        let job = self.jobs.current(&self.framebuffer);
        job.add_bo(Pipe::Gp, &index_bo, BoAccess::READ);
        job.add_bo(Pipe::Pp, &index_bo, BoAccess::READ);

        self.draw_update(
            info,
            draw,
            Some(IndexedRange {
                min,
                max: max.max(min),
                indices_va,
            }),
        )
    }

    fn draw_count(
        &mut self,
        info: &DrawInfo<'_>,
        draw: DrawStartCount,
    ) -> Result<DrawStatus, DrawError> {
        let max_vertices = self.config.max_vertices_per_draw;
        if info.mode.split(max_vertices, draw.count).step == 0 {
            return Err(DrawError::UnsplittableDraw {
                mode: info.mode,
                max_vertices,
            });
        }

        let (mut start, mut count) = (draw.start, draw.count);
        let mut sub_draws = 0;
        while count > 0 {
            let split = info.mode.split(max_vertices, count);
            self.draw_update(info, DrawStartCount::new(start, split.count), None)?;
            count -= split.step;
            start += split.step;
            sub_draws += 1;
        }
        if sub_draws > 1 {
            trace!(sub_draws, mode = ?info.mode, "split draw");
        }
        Ok(DrawStatus::Emitted { sub_draws })
    }

    /// Emit the records and command words of one hardware draw.
    fn draw_update(
        &mut self,
        info: &DrawInfo<'_>,
        draw: DrawStartCount,
        indexed: Option<IndexedRange>,
    ) -> Result<(), DrawError> {
        let mut buffers = ClearBuffers::empty();
        if self.framebuffer.zsbuf.is_some() {
            if self.zsa.depth_enabled {
                buffers |= ClearBuffers::DEPTH;
            }
            if self.zsa.stencil_enabled() {
                buffers |= ClearBuffers::STENCIL;
            }
        }
        if self.framebuffer.cbuf.is_some() {
            buffers |= ClearBuffers::COLOR0;
        }
        self.update_job_wb(buffers);

        let Self {
            alloc,
            dirty,
            framebuffer,
            rasterizer,
            blend,
            blend_color,
            zsa,
            stencil_ref,
            viewport,
            clipped_scissor,
            vs,
            fs,
            vertex_elements,
            vertex_buffers,
            const_buffers,
            sampler_views,
            buffers: ctx_buffers,
            jobs,
            stats,
            ..
        } = self;
        let (Some(vs), Some(fs)) = (vs.as_ref(), fs.as_ref()) else {
            return Ok(());
        };
        let job = jobs.current(framebuffer);

        // Attribute descriptors, addressed from the first vertex the draw reads.
        let first_vertex = match indexed {
            Some(range) => (i64::from(range.min) + i64::from(info.index_bias)) as u32,
            None => draw.start,
        };
        let num_attributes = vertex_elements.len().max(1) as u32;
        let mut attributes = Vec::with_capacity(num_attributes as usize * 2);
        for ve in vertex_elements.iter() {
            let Some(vb) = vertex_buffers
                .get(ve.vertex_buffer_index as usize)
                .and_then(Option::as_ref)
            else {
                continue;
            };
            job.add_bo(Pipe::Gp, &vb.bo, BoAccess::READ);
            let address = vb
                .bo
                .va()
                .wrapping_add(vb.buffer_offset)
                .wrapping_add(ve.src_offset)
                .wrapping_add(first_vertex.wrapping_mul(vb.stride));
            attributes.extend(attribute_descriptor(address, vb.stride, &ve.src_format));
        }
        attributes.resize(num_attributes as usize * 2, 0);
        ctx_buffers.upload(&mut *alloc, CtxBuff::GpAttributeInfo, bytemuck::cast_slice(&attributes))?;

        // Vertex uniforms: constant buffer, viewport transform, shader constants.
        let vs_cb = &mut const_buffers[stage_index(ShaderStage::Vertex)];
        let uniform_size = vs.uniform_size.min(vs_cb.size());
        if (dirty.contains(DirtyFlags::CONST_BUFF) && vs_cb.dirty)
            || dirty.intersects(DirtyFlags::VIEWPORT | DirtyFlags::COMPILED_VS)
        {
            let mut bytes = Vec::with_capacity(uniform_size as usize + 32 + vs.constant.len());
            match &vs_cb.data {
                Some(data) => bytes.extend_from_slice(&data[..uniform_size as usize]),
                None => bytes.resize(uniform_size as usize, 0),
            }
            bytes.extend_from_slice(&viewport.transform.to_bytes());
            bytes.extend_from_slice(&vs.constant);
            ctx_buffers.upload(&mut *alloc, CtxBuff::GpUniform, &bytes)?;
            vs_cb.dirty = false;
            trace!(size = bytes.len(), "gp uniforms");
        }

        // Fragment uniforms, as half floats behind a one-word array.
        let fs_cb = &mut const_buffers[stage_index(ShaderStage::Fragment)];
        if dirty.contains(DirtyFlags::CONST_BUFF) && fs_cb.dirty {
            if let Some(data) = &fs_cb.data {
                let halves: Vec<u8> = data
                    .chunks_exact(4)
                    .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .flat_map(|f| half::f16::from_f32(f).to_bits().to_le_bytes())
                    .collect();
                let uniform_va = ctx_buffers.upload(&mut *alloc, CtxBuff::PpUniform, &halves)?.va();
                ctx_buffers.upload(&mut *alloc, CtxBuff::PpUniformArray, &uniform_va.to_le_bytes())?;
                fs_cb.dirty = false;
            }
        }

        // Varyings and the GP output buffer they are written to.
        let num_vertices = match indexed {
            Some(range) => range.max - range.min + 1,
            None => draw.count,
        };
        let layout = VaryingLayout::new(vs, num_vertices);
        let gp_output = alloc.alloc(layout.output_size).ok_or(DrawError::OutOfMemory {
            size: layout.output_size,
        })?;
        job.add_bo(Pipe::Gp, &gp_output, BoAccess::WRITE);
        job.add_bo(Pipe::Pp, &gp_output, BoAccess::READ);
        let varyings = layout.descriptors(vs, gp_output.va());
        ctx_buffers.upload(&mut *alloc, CtxBuff::GpVaryingInfo, bytemuck::cast_slice(&varyings))?;

        // GP commands.
        let is_indexed = indexed.is_some();
        let uniforms_va = ctx_buffers.va(CtxBuff::GpUniform, job)?;
        let attributes_va = ctx_buffers.va(CtxBuff::GpAttributeInfo, job)?;
        let varyings_va = ctx_buffers.va(CtxBuff::GpVaryingInfo, job)?;
        let vs_cmd = &mut job.vs_cmd;
        if !is_indexed {
            vs_cmd.push(VsCmd::ArraysSemaphoreBegin1);
            vs_cmd.push(VsCmd::ArraysSemaphoreBegin2);
        }
        vs_cmd.push(VsCmd::UniformsAddress {
            va: uniforms_va,
            size: uniform_size + vs.constant.len() as u32 + 32,
        });
        vs_cmd.push(VsCmd::ShaderAddress {
            va: vs.bo.va(),
            size: vs.shader_size,
        });
        vs_cmd.push(VsCmd::ShaderInfo {
            prefetch: vs.prefetch,
            size: vs.shader_size,
        });
        vs_cmd.push(VsCmd::VaryingAttributeCount {
            varyings: vs.num_outputs(),
            attributes: num_attributes,
        });
        vs_cmd.push(VsCmd::Unknown1);
        vs_cmd.push(VsCmd::AttributesAddress {
            va: attributes_va,
            count: num_attributes,
        });
        vs_cmd.push(VsCmd::VaryingsAddress {
            va: varyings_va,
            count: vs.num_outputs(),
        });
        vs_cmd.push(VsCmd::Draw {
            count: num_vertices,
            indexed: is_indexed,
        });
        vs_cmd.push(VsCmd::Unknown2);
        vs_cmd.push(VsCmd::ArraysSemaphoreEnd {
            indexed: is_indexed,
        });

        // Texture descriptors.
        let textures = if sampler_views.is_empty() {
            None
        } else {
            let size = table_size(sampler_views.len());
            let state = ctx_buffers.upload(&mut *alloc, CtxBuff::PpTexDesc, &vec![0; size as usize])?;
            state
                .bo
                .write(state.offset, &descriptor_table(sampler_views, state.va()));
            for view in sampler_views.iter() {
                job.add_bo(Pipe::Pp, &view.bo, BoAccess::READ);
            }
            let va = ctx_buffers.va(CtxBuff::PpTexDesc, job)?;
            Some((va, sampler_views.len() as u32))
        };

        // Render state.
        let uniforms = match fs_cb.data {
            Some(_) => {
                let size = ctx_buffers.state(CtxBuff::PpUniform).map_or(0, |s| s.size);
                ctx_buffers.va(CtxBuff::PpUniform, job)?;
                Some((ctx_buffers.va(CtxBuff::PpUniformArray, job)?, size))
            }
            None => None,
        };
        let varyings = (vs.num_varyings() > 0).then(|| {
            let (types, address_bits) = varying_types(vs);
            let va = gp_output.va() + layout.varyings_offset.unwrap_or(0);
            (va, types, address_bits)
        });
        let rsw = RenderState::pack(&RenderStateInputs {
            mode: info.mode,
            blend,
            blend_color,
            zsa,
            rasterizer,
            stencil_ref,
            viewport,
            multisampled: framebuffer.is_multisampled(),
            fs,
            varying_stride: layout.stride,
            textures,
            uniforms,
            varyings,
        })?;
        ctx_buffers.upload(&mut *alloc, CtxBuff::PpPlbRsw, rsw.as_bytes())?;

        // PLBU commands.
        let rsw_va = ctx_buffers.va(CtxBuff::PpPlbRsw, job)?;
        let force_point_size =
            (info.mode.is_points() && vs.point_size_idx.is_none()) || info.mode.is_lines();
        let scissor = *clipped_scissor;
        let plbu = &mut job.plbu_cmd;
        plbu.push(PlbuCmd::ViewportLeft(viewport.left.to_bits()));
        plbu.push(PlbuCmd::ViewportRight(viewport.right.to_bits()));
        plbu.push(PlbuCmd::ViewportBottom(viewport.bottom.to_bits()));
        plbu.push(PlbuCmd::ViewportTop(viewport.top.to_bits()));
        if !is_indexed {
            plbu.push(PlbuCmd::ArraysSemaphoreBegin);
        }
        plbu.push(PlbuCmd::PrimitiveSetup {
            force_point_size,
            cull: rasterizer.cull_bits(),
            index_u16: info.index_size == 2,
        });
        plbu.push(PlbuCmd::RswVertexArray {
            rsw_va,
            gl_pos_va: gp_output.va(),
        });
        plbu.push(PlbuCmd::Scissors {
            minx: scissor.minx,
            maxx: scissor.maxx,
            miny: scissor.miny,
            maxy: scissor.maxy,
        });
        plbu.push(PlbuCmd::Unknown1);
        plbu.push(PlbuCmd::DepthRangeNear(viewport.near.to_bits()));
        plbu.push(PlbuCmd::DepthRangeFar(viewport.far.to_bits()));
        if force_point_size {
            let size = if info.mode.is_points() {
                rasterizer.point_size
            } else {
                rasterizer.line_width
            };
            plbu.push(PlbuCmd::LowPrimSize(size.to_bits()));
        }
        match indexed {
            Some(range) => {
                plbu.push(PlbuCmd::IndexedDest(gp_output.va()));
                if let Some(offset) = layout.point_size_offset {
                    plbu.push(PlbuCmd::IndexedPtSize(gp_output.va() + offset));
                }
                plbu.push(PlbuCmd::Indices(range.indices_va));
            }
            None => plbu.push(PlbuCmd::DrawArrays {
                mode: info.mode,
                start: draw.start,
                count: draw.count,
            }),
        }
        plbu.push(PlbuCmd::ArraysSemaphoreEnd);
        if let Some(range) = indexed {
            plbu.push(PlbuCmd::DrawElements {
                mode: info.mode,
                start: range.min,
                count: draw.count,
            });
        }

        job.damage.union(&scissor);
        job.draws += 1;
        stats.sub_draws += 1;
        *dirty = DirtyFlags::empty();
        trace!(
            job = job.id().0,
            start = draw.start,
            count = draw.count,
            indexed = is_indexed,
            "draw recorded"
        );
        Ok(())
    }
}
