use std::rc::Rc;

use pretty_assertions::assert_eq;
use proptest::prelude::*;

use tgpu_draw::cmd::{decode_plbu, decode_vs, PlbuCmd, VsCmd, CULL_CW};
use tgpu_draw::state::{
    BlendFactor, BlendState, CompareFunc, CullFace, DepthStencilAlphaState, FramebufferState,
    FsShader, PrimMode, RasterizerState, RtBlendState, ScissorState, ShaderStage, StencilOp,
    StencilRef, StencilState, Surface, SurfaceRef, VaryingInfo, VertexBuffer, VertexElement,
    VertexFormat, ViewportState, VsShader,
};
use tgpu_draw::{
    BoAccess, BoRef, ClearBuffers, Context, ContextConfig, CtxBuff, DrawError, DrawInfo,
    DrawStartCount, DrawStatus, IndexSource, Job, Pipe, Rect, SamplerView, SkipReason,
    VaAllocator,
};

const WIDTH: u32 = 128;
const HEIGHT: u32 = 128;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::TRACE)
        .try_init();
}

struct Fixture {
    ctx: Context,
    cbuf: SurfaceRef,
    vertices: BoRef,
    vs_bo: BoRef,
    fs_bo: BoRef,
}

fn viewport(width: f32, height: f32) -> ViewportState {
    ViewportState {
        scale: [width / 2.0, height / 2.0, 0.5],
        translate: [width / 2.0, height / 2.0, 0.5],
    }
}

fn vec4() -> VaryingInfo {
    VaryingInfo {
        components: 4,
        component_size: 4,
    }
}

fn color_target(ctx: &mut Context, width: u32, height: u32) -> SurfaceRef {
    let bo = ctx.alloc_bo(width * height * 4).unwrap();
    Surface::new(bo, width, height)
}

fn color_framebuffer(cbuf: &SurfaceRef) -> FramebufferState {
    FramebufferState {
        width: cbuf.width,
        height: cbuf.height,
        samples: 1,
        cbuf: Some(cbuf.clone()),
        zsbuf: None,
    }
}

/// A context drawing position + one vec4 varying into a 128x128 colour target, with one
/// float3 attribute read at offset 4 of a 12-byte stride.
fn fixture_with(config: ContextConfig) -> Fixture {
    init_tracing();
    let mut ctx = Context::with_allocator(VaAllocator::default(), config);

    let cbuf = color_target(&mut ctx, WIDTH, HEIGHT);
    ctx.set_framebuffer(color_framebuffer(&cbuf));
    ctx.set_viewport(&viewport(WIDTH as f32, HEIGHT as f32));

    let vs_bo = ctx.alloc_bo(256).unwrap();
    ctx.bind_vs(Some(VsShader {
        bo: vs_bo.clone(),
        shader_size: 256,
        prefetch: 1,
        uniform_size: 16,
        constant: Vec::new(),
        varyings: vec![vec4(), vec4()],
        gl_pos_idx: 0,
        point_size_idx: None,
    }));

    let fs_bo = ctx.alloc_bo(64).unwrap();
    fs_bo.write(0, &0x0000_00e5u32.to_le_bytes());
    ctx.bind_fs(Some(FsShader {
        bo: fs_bo.clone(),
        shader_size: 64,
        stack_size: 2,
        uses_discard: false,
    }));

    let vertices = ctx.alloc_bo(0x1_0000).unwrap();
    ctx.set_vertex_elements(vec![VertexElement {
        src_offset: 4,
        vertex_buffer_index: 0,
        src_format: VertexFormat::RGB32_FLOAT,
    }]);
    ctx.set_vertex_buffers(
        0,
        vec![Some(VertexBuffer {
            bo: vertices.clone(),
            buffer_offset: 16,
            stride: 12,
        })],
    );

    Fixture {
        ctx,
        cbuf,
        vertices,
        vs_bo,
        fs_bo,
    }
}

fn fixture() -> Fixture {
    fixture_with(ContextConfig::default())
}

fn draw_arrays(
    ctx: &mut Context,
    mode: PrimMode,
    start: u32,
    count: u32,
) -> Result<DrawStatus, DrawError> {
    ctx.draw_vbo(&DrawInfo::arrays(mode), &[DrawStartCount::new(start, count)])
        .remove(0)
}

fn flush_one(ctx: &mut Context) -> Job {
    ctx.flush();
    let mut jobs = ctx.take_submitted();
    assert_eq!(jobs.len(), 1);
    jobs.remove(0)
}

fn plbu(job: &Job) -> Vec<PlbuCmd> {
    decode_plbu(&job.plbu_cmd).expect("known PLBU words")
}

fn vs(job: &Job) -> Vec<VsCmd> {
    decode_vs(&job.vs_cmd).expect("known GP words")
}

fn record_va(ctx: &Context, buff: CtxBuff) -> u32 {
    ctx.record(buff).expect("record uploaded").va()
}

/// Word `index` of the last uploaded render state.
fn rsw_word(ctx: &Context, index: u32) -> u32 {
    let rsw = ctx.record(CtxBuff::PpPlbRsw).expect("render state uploaded");
    rsw.bo.read_u32(rsw.offset + 4 * index)
}

const RSW_STENCIL_FRONT: u32 = 5;
const RSW_STENCIL_BACK: u32 = 6;
const RSW_STENCIL_TEST: u32 = 7;
const RSW_SHADER_ADDRESS: u32 = 9;
const RSW_UNIFORMS_ADDRESS: u32 = 11;
const RSW_TEXTURES_ADDRESS: u32 = 12;
const RSW_AUX0: u32 = 13;
const RSW_AUX1: u32 = 14;

#[test]
fn arrays_draw_emits_full_command_sequence() {
    let Fixture {
        mut ctx,
        vertices,
        vs_bo,
        fs_bo,
        ..
    } = fixture();

    let status = draw_arrays(&mut ctx, PrimMode::Triangles, 6, 3);
    assert_eq!(status, Ok(DrawStatus::Emitted { sub_draws: 1 }));

    let uniforms_va = record_va(&ctx, CtxBuff::GpUniform);
    let attributes_va = record_va(&ctx, CtxBuff::GpAttributeInfo);
    let varyings_va = record_va(&ctx, CtxBuff::GpVaryingInfo);
    let rsw_va = record_va(&ctx, CtxBuff::PpPlbRsw);

    let attrs = ctx.record(CtxBuff::GpAttributeInfo).unwrap();
    assert_eq!(
        attrs.bo.read_u32(attrs.offset),
        vertices.va() + 16 + 4 + 6 * 12
    );
    assert_eq!(attrs.bo.read_u32(attrs.offset + 4) >> 11, 12);

    assert_eq!(rsw_word(&ctx, RSW_SHADER_ADDRESS), fs_bo.va() | 0x5);

    let job = flush_one(&mut ctx);
    assert_eq!(job.draws, 1);
    assert_eq!(job.pp_max_stack_size, 2);
    assert_eq!(
        vs(&job),
        vec![
            VsCmd::ArraysSemaphoreBegin1,
            VsCmd::ArraysSemaphoreBegin2,
            VsCmd::UniformsAddress {
                va: uniforms_va,
                size: 32,
            },
            VsCmd::ShaderAddress {
                va: vs_bo.va(),
                size: 256,
            },
            VsCmd::ShaderInfo {
                prefetch: 1,
                size: 256,
            },
            VsCmd::VaryingAttributeCount {
                varyings: 2,
                attributes: 1,
            },
            VsCmd::Unknown1,
            VsCmd::AttributesAddress {
                va: attributes_va,
                count: 1,
            },
            VsCmd::VaryingsAddress {
                va: varyings_va,
                count: 2,
            },
            VsCmd::Draw {
                count: 3,
                indexed: false,
            },
            VsCmd::Unknown2,
            VsCmd::ArraysSemaphoreEnd { indexed: false },
        ]
    );

    let gl_pos_va = job
        .bos(Pipe::Gp)
        .iter()
        .find(|e| e.access.contains(BoAccess::WRITE))
        .map(|e| e.bo.va())
        .unwrap();
    assert_eq!(
        plbu(&job),
        vec![
            PlbuCmd::ViewportLeft(0.0f32.to_bits()),
            PlbuCmd::ViewportRight(128.0f32.to_bits()),
            PlbuCmd::ViewportBottom(0.0f32.to_bits()),
            PlbuCmd::ViewportTop(128.0f32.to_bits()),
            PlbuCmd::ArraysSemaphoreBegin,
            PlbuCmd::PrimitiveSetup {
                force_point_size: false,
                cull: 0,
                index_u16: false,
            },
            PlbuCmd::RswVertexArray { rsw_va, gl_pos_va },
            PlbuCmd::Scissors {
                minx: 0,
                maxx: 128,
                miny: 0,
                maxy: 128,
            },
            PlbuCmd::Unknown1,
            PlbuCmd::DepthRangeNear(0.0f32.to_bits()),
            PlbuCmd::DepthRangeFar(1.0f32.to_bits()),
            PlbuCmd::DrawArrays {
                mode: PrimMode::Triangles,
                start: 6,
                count: 3,
            },
            PlbuCmd::ArraysSemaphoreEnd,
            PlbuCmd::End,
        ]
    );
}

#[test]
fn gp_output_is_owned_by_the_job_only() {
    let Fixture { mut ctx, .. } = fixture();
    draw_arrays(&mut ctx, PrimMode::Triangles, 0, 3).unwrap();
    let job = flush_one(&mut ctx);

    let outputs: Vec<_> = job
        .bos(Pipe::Gp)
        .iter()
        .filter(|e| e.access.contains(BoAccess::WRITE))
        .collect();
    assert_eq!(outputs.len(), 1);
    let output = &outputs[0].bo;
    assert_eq!(Rc::strong_count(output), 2, "gp and pp lists each hold one reference");
    assert_eq!(job.access(output.handle()), BoAccess::READ | BoAccess::WRITE);
    assert!(job
        .bos(Pipe::Pp)
        .iter()
        .any(|e| e.bo.handle() == output.handle() && e.access == BoAccess::READ));
}

#[test]
fn scissor_is_clipped_to_viewport() {
    let Fixture { mut ctx, .. } = fixture();
    ctx.set_viewport(&viewport(100.0, 50.0));
    ctx.set_rasterizer(RasterizerState {
        scissor: true,
        ..RasterizerState::default()
    });
    ctx.set_scissor(ScissorState {
        minx: 10,
        miny: 10,
        maxx: 90,
        maxy: 60,
    });

    draw_arrays(&mut ctx, PrimMode::Triangles, 0, 3).unwrap();
    assert_eq!(ctx.clipped_scissor(), Rect::new(10, 90, 10, 50));

    let job = flush_one(&mut ctx);
    assert!(plbu(&job).contains(&PlbuCmd::Scissors {
        minx: 10,
        maxx: 90,
        miny: 10,
        maxy: 50,
    }));
    assert_eq!(job.damage, Rect::new(10, 90, 10, 50));
}

#[test]
fn empty_scissor_skips_the_draw() {
    let Fixture { mut ctx, .. } = fixture();
    ctx.set_rasterizer(RasterizerState {
        scissor: true,
        ..RasterizerState::default()
    });
    ctx.set_scissor(ScissorState {
        minx: 200,
        miny: 0,
        maxx: 250,
        maxy: 64,
    });

    let status = draw_arrays(&mut ctx, PrimMode::Triangles, 0, 3);
    assert_eq!(status, Ok(DrawStatus::Skipped(SkipReason::ZeroScissor)));
    assert!(ctx.current_job().is_none());
    assert_eq!(ctx.stats().skipped, 1);

    ctx.flush();
    assert!(ctx.take_submitted().is_empty());
}

#[test]
fn missing_shader_skips_without_recording() {
    let Fixture { mut ctx, .. } = fixture();
    ctx.bind_fs(None);

    let status = draw_arrays(&mut ctx, PrimMode::Triangles, 0, 3);
    assert_eq!(status, Ok(DrawStatus::Skipped(SkipReason::MissingShader)));
    assert!(ctx.current_job().is_none());
}

#[test]
fn short_draws_are_rejected_and_others_still_record() {
    let Fixture { mut ctx, .. } = fixture();

    let results = ctx.draw_vbo(
        &DrawInfo::arrays(PrimMode::Triangles),
        &[
            DrawStartCount::new(0, 3),
            DrawStartCount::new(0, 2),
            DrawStartCount::new(3, 5),
        ],
    );
    assert_eq!(
        results,
        vec![
            Ok(DrawStatus::Emitted { sub_draws: 1 }),
            Err(DrawError::ModeCountMismatch {
                mode: PrimMode::Triangles,
                count: 2,
            }),
            Ok(DrawStatus::Emitted { sub_draws: 1 }),
        ]
    );
    let stats = ctx.stats();
    assert_eq!((stats.draws, stats.rejected), (2, 1));

    let job = flush_one(&mut ctx);
    assert_eq!(job.draws, 2);
    let counts: Vec<(u32, u32)> = plbu(&job)
        .into_iter()
        .filter_map(|cmd| match cmd {
            PlbuCmd::DrawArrays { start, count, .. } => Some((start, count)),
            _ => None,
        })
        .collect();
    // The trailing two vertices of the last draw do not form a triangle.
    assert_eq!(counts, vec![(0, 3), (3, 3)]);
}

#[test]
fn large_point_draw_is_split() {
    let Fixture { mut ctx, .. } = fixture();

    let status = draw_arrays(&mut ctx, PrimMode::Points, 0, 200_000);
    assert_eq!(status, Ok(DrawStatus::Emitted { sub_draws: 4 }));
    assert_eq!(ctx.stats().sub_draws, 4);

    let job = flush_one(&mut ctx);
    assert_eq!(job.draws, 4);
    let cmds = plbu(&job);
    let draws: Vec<(u32, u32)> = cmds
        .iter()
        .filter_map(|cmd| match *cmd {
            PlbuCmd::DrawArrays { start, count, .. } => Some((start, count)),
            _ => None,
        })
        .collect();
    assert_eq!(
        draws,
        vec![(0, 65535), (65535, 65535), (131_070, 65535), (196_605, 3395)]
    );

    // Points without a shader-written size use the rasterizer's.
    assert!(cmds.contains(&PlbuCmd::PrimitiveSetup {
        force_point_size: true,
        cull: 0,
        index_u16: false,
    }));
    assert_eq!(
        cmds.iter()
            .filter(|cmd| **cmd == PlbuCmd::LowPrimSize(1.0f32.to_bits()))
            .count(),
        4
    );
}

#[test]
fn unsplittable_draw_is_rejected() {
    let Fixture { mut ctx, .. } = fixture_with(ContextConfig {
        max_vertices_per_draw: 1,
        ..ContextConfig::default()
    });

    let status = draw_arrays(&mut ctx, PrimMode::Lines, 0, 4);
    assert_eq!(
        status,
        Err(DrawError::UnsplittableDraw {
            mode: PrimMode::Lines,
            max_vertices: 1,
        })
    );
}

#[test]
fn back_face_culling_follows_winding() {
    let Fixture { mut ctx, .. } = fixture();
    ctx.set_rasterizer(RasterizerState {
        cull_face: CullFace::BACK,
        front_ccw: true,
        ..RasterizerState::default()
    });
    draw_arrays(&mut ctx, PrimMode::Triangles, 0, 3).unwrap();

    let job = flush_one(&mut ctx);
    assert!(plbu(&job).contains(&PlbuCmd::PrimitiveSetup {
        force_point_size: false,
        cull: CULL_CW,
        index_u16: false,
    }));
}

fn u16_indices(ctx: &mut Context, indices: &[u16]) -> BoRef {
    let bo = ctx.alloc_bo(2 * indices.len() as u32).unwrap();
    let bytes: Vec<u8> = indices.iter().flat_map(|i| i.to_le_bytes()).collect();
    bo.write(0, &bytes);
    bo
}

#[test]
fn indexed_draw_shades_the_referenced_range() {
    let Fixture {
        mut ctx, vertices, ..
    } = fixture();
    let index_bo = u16_indices(&mut ctx, &[5, 9, 7, 6]);
    let ib = ctx.index_buffer(index_bo);
    let info = DrawInfo::indexed(PrimMode::Triangles, 2, IndexSource::Resource(&ib));

    let status = ctx.draw_vbo(&info, &[DrawStartCount::new(0, 4)]).remove(0);
    assert_eq!(status, Ok(DrawStatus::Emitted { sub_draws: 1 }));
    assert_eq!(ctx.stats().index_scans, 1);

    let attrs = ctx.record(CtxBuff::GpAttributeInfo).unwrap();
    assert_eq!(
        attrs.bo.read_u32(attrs.offset),
        vertices.va() + 16 + 4 + 5 * 12
    );

    let job = flush_one(&mut ctx);
    let vs_cmds = vs(&job);
    assert!(!vs_cmds.contains(&VsCmd::ArraysSemaphoreBegin1));
    assert!(vs_cmds.contains(&VsCmd::Draw {
        count: 5,
        indexed: true,
    }));
    assert_eq!(
        vs_cmds.last(),
        Some(&VsCmd::ArraysSemaphoreEnd { indexed: true })
    );

    let gl_pos_va = job
        .bos(Pipe::Gp)
        .iter()
        .find(|e| e.access.contains(BoAccess::WRITE))
        .map(|e| e.bo.va())
        .unwrap();
    let cmds = plbu(&job);
    assert!(!cmds.contains(&PlbuCmd::ArraysSemaphoreBegin));
    assert!(cmds.contains(&PlbuCmd::PrimitiveSetup {
        force_point_size: false,
        cull: 0,
        index_u16: true,
    }));
    assert_eq!(
        &cmds[cmds.len() - 5..],
        &[
            PlbuCmd::IndexedDest(gl_pos_va),
            PlbuCmd::Indices(ib.bo.va()),
            PlbuCmd::ArraysSemaphoreEnd,
            PlbuCmd::DrawElements {
                mode: PrimMode::Triangles,
                start: 5,
                count: 3,
            },
            PlbuCmd::End,
        ]
    );
    assert_eq!(job.access(ib.bo.handle()), BoAccess::READ);
}

#[test]
fn index_range_is_cached_until_invalidated() {
    let Fixture { mut ctx, .. } = fixture();
    let index_bo = u16_indices(&mut ctx, &[5, 9, 7, 6]);
    let ib = ctx.index_buffer(index_bo);
    let info = DrawInfo::indexed(PrimMode::Triangles, 2, IndexSource::Resource(&ib));
    let draw = [DrawStartCount::new(0, 3)];

    ctx.draw_vbo(&info, &draw).remove(0).unwrap();
    ctx.draw_vbo(&info, &draw).remove(0).unwrap();
    let stats = ctx.stats();
    assert_eq!((stats.index_scans, stats.index_cache_hits), (1, 1));
    assert_eq!(ib.cached_ranges(), 1);

    ib.bo.write(0, &[1, 0, 2, 0, 3, 0]);
    ib.invalidate();
    ctx.draw_vbo(&info, &draw).remove(0).unwrap();
    assert_eq!(ctx.stats().index_scans, 2);

    let job = flush_one(&mut ctx);
    let starts: Vec<u32> = plbu(&job)
        .into_iter()
        .filter_map(|cmd| match cmd {
            PlbuCmd::DrawElements { start, .. } => Some(start),
            _ => None,
        })
        .collect();
    assert_eq!(starts, vec![5, 5, 1]);
}

#[test]
fn index_range_past_the_buffer_is_rejected() {
    let Fixture { mut ctx, .. } = fixture();
    let index_bo = u16_indices(&mut ctx, &[0, 1, 2, 3]);
    let ib = ctx.index_buffer(index_bo);
    let info = DrawInfo::indexed(PrimMode::Triangles, 2, IndexSource::Resource(&ib));

    let status = ctx.draw_vbo(&info, &[DrawStartCount::new(2, 3)]).remove(0);
    assert_eq!(
        status,
        Err(DrawError::IndexRangeOutOfBounds {
            start: 2,
            count: 3,
            len: 8,
        })
    );
}

#[test]
fn negative_base_vertex_is_rejected() {
    let Fixture { mut ctx, .. } = fixture();
    let index_bo = u16_indices(&mut ctx, &[5, 9, 7]);
    let ib = ctx.index_buffer(index_bo);
    let mut info = DrawInfo::indexed(PrimMode::Triangles, 2, IndexSource::Resource(&ib));

    info.index_bias = -5;
    assert!(ctx.draw_vbo(&info, &[DrawStartCount::new(0, 3)])[0].is_ok());

    info.index_bias = -6;
    assert_eq!(
        ctx.draw_vbo(&info, &[DrawStartCount::new(0, 3)]).remove(0),
        Err(DrawError::NegativeBaseVertex {
            min_index: 5,
            bias: -6,
        })
    );
}

#[test]
fn user_indices_are_scanned_and_uploaded_every_draw() {
    let Fixture { mut ctx, .. } = fixture();
    let indices = [2u8, 0, 1];
    let info = DrawInfo::indexed(PrimMode::Triangles, 1, IndexSource::User(&indices));

    ctx.draw_vbo(&info, &[DrawStartCount::new(0, 3)]).remove(0).unwrap();
    ctx.draw_vbo(&info, &[DrawStartCount::new(0, 3)]).remove(0).unwrap();
    let stats = ctx.stats();
    assert_eq!((stats.index_scans, stats.index_cache_hits), (2, 0));

    let job = flush_one(&mut ctx);
    let uploaded: Vec<u32> = plbu(&job)
        .into_iter()
        .filter_map(|cmd| match cmd {
            PlbuCmd::Indices(va) => Some(va),
            _ => None,
        })
        .collect();
    assert_eq!(uploaded.len(), 2);
    for va in uploaded {
        let bo = job
            .bos(Pipe::Gp)
            .iter()
            .map(|e| &e.bo)
            .find(|bo| bo.va() <= va && va < bo.va() + bo.size())
            .expect("index upload referenced by the job");
        let at = (va - bo.va()) as usize;
        assert_eq!(&bo.map()[at..at + 3], &indices);
    }
}

#[test]
fn missing_index_data_is_rejected() {
    let Fixture { mut ctx, .. } = fixture();
    let info = DrawInfo {
        index_size: 2,
        ..DrawInfo::arrays(PrimMode::Triangles)
    };
    assert_eq!(
        ctx.draw_vbo(&info, &[DrawStartCount::new(0, 3)]).remove(0),
        Err(DrawError::MissingIndexData)
    );
}

#[test]
fn unbound_vertex_buffer_is_rejected_before_recording() {
    let Fixture { mut ctx, .. } = fixture();
    ctx.set_vertex_elements(vec![
        VertexElement {
            src_offset: 0,
            vertex_buffer_index: 0,
            src_format: VertexFormat::RGBA32_FLOAT,
        },
        VertexElement {
            src_offset: 0,
            vertex_buffer_index: 3,
            src_format: VertexFormat::RGBA8_UNORM,
        },
    ]);

    let status = draw_arrays(&mut ctx, PrimMode::Triangles, 0, 3);
    assert_eq!(
        status,
        Err(DrawError::UnboundVertexBuffer {
            element: 1,
            buffer: 3,
        })
    );
    assert!(ctx.current_job().is_none());
}

#[test]
fn dual_source_blend_is_rejected() {
    let Fixture { mut ctx, .. } = fixture();
    ctx.set_blend(BlendState {
        rt: RtBlendState {
            blend_enable: true,
            rgb_dst_factor: BlendFactor::InvSrc1Color,
            ..RtBlendState::default()
        },
        dither: false,
    });

    let status = draw_arrays(&mut ctx, PrimMode::Triangles, 0, 3);
    assert!(matches!(status, Err(DrawError::UnsupportedBlendFactor(_))));
    assert!(ctx.current_job().is_none());
}

#[test]
fn too_many_sampler_views_are_rejected() {
    let Fixture { mut ctx, .. } = fixture();
    let bo = ctx.alloc_bo(64).unwrap();
    let views = vec![
        SamplerView {
            bo,
            descriptor: [0; 16],
        };
        17
    ];
    assert_eq!(
        ctx.set_sampler_views(views),
        Err(DrawError::TooManySamplerViews(17))
    );
}

#[test]
fn consecutive_clears_share_a_job() {
    let Fixture { mut ctx, cbuf, .. } = fixture();

    ctx.clear(ClearBuffers::COLOR0, [1.0, 0.0, 0.0, 1.0], 1.0, 0);
    ctx.clear(ClearBuffers::COLOR0, [0.0, 0.0, 1.0, 1.0], 1.0, 0);
    assert!(ctx.take_submitted().is_empty());

    draw_arrays(&mut ctx, PrimMode::Triangles, 0, 3).unwrap();
    // A clear after a draw ends the job.
    ctx.clear(ClearBuffers::COLOR0, [0.0, 1.0, 0.0, 1.0], 1.0, 0);

    let first = ctx.take_submitted();
    assert_eq!(first.len(), 1);
    let job = &first[0];
    assert_eq!(job.draws, 1);
    assert_eq!(job.clear.buffers, ClearBuffers::COLOR0);
    assert_eq!(job.clear.color_8pc, 0xffff_0000);
    assert_eq!(job.clear.color_16pc, 0xffff_ffff_0000_0000);
    assert_eq!(job.damage, Rect::new(0, WIDTH, 0, HEIGHT));
    assert_eq!(job.access(cbuf.bo.handle()), BoAccess::WRITE);

    let second = flush_one(&mut ctx);
    assert_eq!(second.draws, 0);
    assert_eq!(second.clear.color_8pc, 0xff00_ff00);
    assert!(second.plbu_cmd.is_empty());
    assert_eq!(ctx.stats().clears, 3);
    assert_eq!(ctx.stats().jobs_submitted, 2);
}

#[test]
fn depth_stencil_clear_packs_values() {
    let Fixture { mut ctx, cbuf, .. } = fixture();
    let zs_bo = ctx.alloc_bo(WIDTH * HEIGHT * 4).unwrap();
    let zsbuf = Surface::new(zs_bo, WIDTH, HEIGHT);
    ctx.set_framebuffer(FramebufferState {
        zsbuf: Some(zsbuf.clone()),
        ..color_framebuffer(&cbuf)
    });

    ctx.clear(ClearBuffers::DEPTH_STENCIL, [0.0; 4], 0.5, 0x80);
    let job = flush_one(&mut ctx);
    assert_eq!(job.clear.depth, 0x007f_ffff);
    assert_eq!(job.clear.stencil, 0x80);
    assert_eq!(job.access(zsbuf.bo.handle()), BoAccess::WRITE);
    assert_eq!(job.access(cbuf.bo.handle()), BoAccess::empty());
    assert_eq!(zsbuf.reload.get(), ClearBuffers::DEPTH_STENCIL);
}

#[test]
fn resolved_color_is_reloaded_unless_cleared() {
    let Fixture { mut ctx, cbuf, .. } = fixture();

    draw_arrays(&mut ctx, PrimMode::Triangles, 0, 3).unwrap();
    let first = flush_one(&mut ctx);
    assert_eq!(first.reload, ClearBuffers::empty());
    assert_eq!(cbuf.reload.get(), ClearBuffers::COLOR0);

    draw_arrays(&mut ctx, PrimMode::Triangles, 0, 3).unwrap();
    let second = flush_one(&mut ctx);
    assert_eq!(second.reload, ClearBuffers::COLOR0);

    ctx.clear(ClearBuffers::COLOR0, [0.0; 4], 1.0, 0);
    draw_arrays(&mut ctx, PrimMode::Triangles, 0, 3).unwrap();
    let third = flush_one(&mut ctx);
    assert_eq!(third.reload, ClearBuffers::empty());
    assert_eq!(third.resolve, ClearBuffers::COLOR0);
}

#[test]
fn sampling_a_render_target_flushes_its_writer() {
    let Fixture { mut ctx, cbuf, .. } = fixture();
    draw_arrays(&mut ctx, PrimMode::Triangles, 0, 3).unwrap();

    let other = color_target(&mut ctx, WIDTH, HEIGHT);
    ctx.set_framebuffer(color_framebuffer(&other));
    ctx.set_sampler_views(vec![SamplerView {
        bo: cbuf.bo.clone(),
        descriptor: [0xabc; 16],
    }])
    .unwrap();
    draw_arrays(&mut ctx, PrimMode::Triangles, 0, 3).unwrap();

    let flushed = ctx.take_submitted();
    assert_eq!(flushed.len(), 1);
    assert_eq!(flushed[0].key().cbuf, Some(cbuf.bo.handle()));

    let tex = ctx.record(CtxBuff::PpTexDesc).unwrap();
    assert_eq!(tex.bo.read_u32(tex.offset), tex.va() + 64);
    assert_eq!(tex.bo.read_u32(tex.offset + 64), 0xabc);
    assert_eq!(rsw_word(&ctx, RSW_TEXTURES_ADDRESS), tex.va());
    assert_eq!(rsw_word(&ctx, RSW_AUX0) & 0x0003_c020, (1 << 14) | 0x20);

    let job = flush_one(&mut ctx);
    assert_eq!(job.key().cbuf, Some(other.bo.handle()));
    assert_eq!(job.access(cbuf.bo.handle()), BoAccess::READ);
}

#[test]
fn rendering_to_a_target_flushes_its_other_users() {
    let Fixture { mut ctx, cbuf, .. } = fixture();
    draw_arrays(&mut ctx, PrimMode::Triangles, 0, 3).unwrap();

    // Same target, different framebuffer key.
    ctx.set_framebuffer(FramebufferState {
        width: 64,
        height: 64,
        ..color_framebuffer(&cbuf)
    });
    ctx.set_viewport(&viewport(64.0, 64.0));
    draw_arrays(&mut ctx, PrimMode::Triangles, 0, 3).unwrap();

    let flushed = ctx.take_submitted();
    assert_eq!(flushed.len(), 1);
    assert_eq!(flushed[0].key().width, WIDTH);
    assert_eq!(flushed[0].damage, Rect::new(0, WIDTH, 0, HEIGHT));
}

#[test]
fn independent_framebuffers_flush_oldest_first() {
    let Fixture { mut ctx, cbuf, .. } = fixture();
    draw_arrays(&mut ctx, PrimMode::Triangles, 0, 3).unwrap();

    let other = color_target(&mut ctx, WIDTH, HEIGHT);
    ctx.set_framebuffer(color_framebuffer(&other));
    draw_arrays(&mut ctx, PrimMode::Triangles, 0, 3).unwrap();
    assert!(ctx.take_submitted().is_empty());

    ctx.flush();
    let jobs = ctx.take_submitted();
    let targets: Vec<_> = jobs.iter().map(|job| job.key().cbuf).collect();
    assert_eq!(
        targets,
        vec![Some(cbuf.bo.handle()), Some(other.bo.handle())]
    );
    assert!(jobs[0].id() < jobs[1].id());
}

#[test]
fn fragment_uniforms_are_uploaded_as_half_floats() {
    let Fixture { mut ctx, .. } = fixture();
    let floats = [1.0f32, 0.5, -2.0, 65504.0];
    let bytes: Vec<u8> = floats.iter().flat_map(|f| f.to_le_bytes()).collect();
    ctx.set_constant_buffer(ShaderStage::Fragment, Some(bytes));

    draw_arrays(&mut ctx, PrimMode::Triangles, 0, 3).unwrap();

    let uniform = ctx.record(CtxBuff::PpUniform).unwrap();
    assert_eq!(uniform.size, 8);
    let halves: Vec<u16> = uniform.bo.map()[uniform.offset as usize..][..8]
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    assert_eq!(halves, vec![0x3c00, 0x3800, 0xc000, 0x7bff]);

    let array = ctx.record(CtxBuff::PpUniformArray).unwrap();
    assert_eq!(array.bo.read_u32(array.offset), uniform.va());
    assert_eq!(rsw_word(&ctx, RSW_UNIFORMS_ADDRESS), array.va());
    assert_ne!(rsw_word(&ctx, RSW_AUX0) & 0x80, 0);
    assert_ne!(rsw_word(&ctx, RSW_AUX1) & 0x1_0000, 0);

    // Uniforms of both stages are streamed before the varying table.
    let uploads: Vec<u32> = [
        CtxBuff::GpAttributeInfo,
        CtxBuff::GpUniform,
        CtxBuff::PpUniform,
        CtxBuff::PpUniformArray,
        CtxBuff::GpVaryingInfo,
        CtxBuff::PpPlbRsw,
    ]
    .into_iter()
    .map(|buff| record_va(&ctx, buff))
    .collect();
    assert!(uploads.windows(2).all(|w| w[0] < w[1]), "{uploads:x?}");
}

#[test]
fn vertex_uniforms_are_reuploaded_only_when_dirty() {
    let Fixture { mut ctx, .. } = fixture();
    ctx.set_constant_buffer(ShaderStage::Vertex, Some(vec![7; 32]));

    draw_arrays(&mut ctx, PrimMode::Triangles, 0, 3).unwrap();
    let first = ctx.record(CtxBuff::GpUniform).unwrap().clone();
    assert_eq!(first.size, 16 + 32);
    assert_eq!(first.bo.read_u32(first.offset), 0x0707_0707);
    assert_eq!(
        first.bo.read_u32(first.offset + 16),
        64.0f32.to_bits(),
        "viewport scale follows the constant buffer"
    );

    draw_arrays(&mut ctx, PrimMode::Triangles, 0, 3).unwrap();
    assert_eq!(record_va(&ctx, CtxBuff::GpUniform), first.va());

    ctx.set_viewport(&viewport(64.0, 64.0));
    draw_arrays(&mut ctx, PrimMode::Triangles, 0, 3).unwrap();
    let third = ctx.record(CtxBuff::GpUniform).unwrap().clone();
    assert_ne!(third.va(), first.va());
    assert_eq!(third.bo.read_u32(third.offset + 16), 32.0f32.to_bits());

    let job = flush_one(&mut ctx);
    let uniform_vas: Vec<u32> = vs(&job)
        .into_iter()
        .filter_map(|cmd| match cmd {
            VsCmd::UniformsAddress { va, .. } => Some(va),
            _ => None,
        })
        .collect();
    assert_eq!(uniform_vas, vec![first.va(), first.va(), third.va()]);
}

#[test]
fn single_sided_stencil_is_mirrored_to_the_back_face() {
    let Fixture { mut ctx, .. } = fixture();
    ctx.set_depth_stencil_alpha(DepthStencilAlphaState {
        stencil: [
            StencilState {
                enabled: true,
                func: CompareFunc::Equal,
                zpass_op: StencilOp::Replace,
                valuemask: 0x0f,
                writemask: 0x3c,
                ..StencilState::default()
            },
            StencilState::default(),
        ],
        ..DepthStencilAlphaState::default()
    });
    ctx.set_stencil_ref(StencilRef { ref_value: [5, 9] });

    draw_arrays(&mut ctx, PrimMode::Triangles, 0, 3).unwrap();
    let front = rsw_word(&ctx, RSW_STENCIL_FRONT);
    assert_eq!(front & 0x7, CompareFunc::Equal as u32);
    assert_eq!((front >> 16) & 0xff, 5);
    assert_eq!(front >> 24, 0x0f);
    assert_eq!(rsw_word(&ctx, RSW_STENCIL_BACK), front);
    assert_eq!(rsw_word(&ctx, RSW_STENCIL_TEST), 0x3c3c);
}

#[test]
fn shader_and_vertex_buffers_are_referenced_for_reading() {
    let Fixture {
        mut ctx,
        vertices,
        vs_bo,
        fs_bo,
        ..
    } = fixture();
    draw_arrays(&mut ctx, PrimMode::Triangles, 0, 3).unwrap();
    let job = flush_one(&mut ctx);

    let reads = |pipe: Pipe, bo: &BoRef| {
        job.bos(pipe)
            .iter()
            .any(|e| e.bo.handle() == bo.handle() && e.access == BoAccess::READ)
    };
    assert!(reads(Pipe::Gp, &vs_bo));
    assert!(reads(Pipe::Gp, &vertices));
    assert!(reads(Pipe::Pp, &fs_bo));
}

fn scissor_strategy() -> impl Strategy<Value = ScissorState> {
    (0u32..120, 1u32..8, 0u32..120, 1u32..8).prop_map(|(minx, w, miny, h)| ScissorState {
        minx,
        miny,
        maxx: minx + w,
        maxy: miny + h,
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn damage_is_the_union_of_drawn_scissors(
        scissors in prop::collection::vec(scissor_strategy(), 1..5),
    ) {
        let Fixture { mut ctx, .. } = fixture();
        ctx.set_rasterizer(RasterizerState {
            scissor: true,
            ..RasterizerState::default()
        });

        let mut expected = Rect::EMPTY;
        for s in &scissors {
            ctx.set_scissor(*s);
            prop_assert!(draw_arrays(&mut ctx, PrimMode::Triangles, 0, 3).is_ok());
            expected.union(&Rect::new(s.minx, s.maxx, s.miny, s.maxy));
        }

        let job = flush_one(&mut ctx);
        prop_assert_eq!(job.damage, expected);
        prop_assert_eq!(job.draws as usize, scissors.len());
    }
}
