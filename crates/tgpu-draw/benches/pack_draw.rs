use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};

use tgpu_draw::state::{
    FramebufferState, FsShader, PrimMode, ShaderStage, Surface, VaryingInfo, VertexBuffer,
    VertexElement, VertexFormat, ViewportState, VsShader,
};
use tgpu_draw::{Context, DrawInfo, DrawStartCount, IndexSource};

fn criterion_config() -> Criterion {
    Criterion::default()
        .warm_up_time(Duration::from_millis(500))
        .measurement_time(Duration::from_secs(2))
}

fn context() -> Context {
    let mut ctx = Context::new();
    let cbuf = Surface::new(ctx.alloc_bo(256 * 256 * 4).unwrap(), 256, 256);
    ctx.set_framebuffer(FramebufferState {
        width: 256,
        height: 256,
        samples: 1,
        cbuf: Some(cbuf),
        zsbuf: None,
    });
    ctx.set_viewport(&ViewportState {
        scale: [128.0, 128.0, 0.5],
        translate: [128.0, 128.0, 0.5],
    });

    let vec4 = VaryingInfo {
        components: 4,
        component_size: 4,
    };
    let vs_bo = ctx.alloc_bo(512).unwrap();
    ctx.bind_vs(Some(VsShader {
        bo: vs_bo,
        shader_size: 512,
        prefetch: 1,
        uniform_size: 64,
        constant: vec![0; 16],
        varyings: vec![vec4, vec4, vec4],
        gl_pos_idx: 0,
        point_size_idx: None,
    }));
    let fs_bo = ctx.alloc_bo(128).unwrap();
    ctx.bind_fs(Some(FsShader {
        bo: fs_bo,
        shader_size: 128,
        stack_size: 4,
        uses_discard: false,
    }));

    let vertices = ctx.alloc_bo(1 << 20).unwrap();
    ctx.set_vertex_elements(vec![
        VertexElement {
            src_offset: 0,
            vertex_buffer_index: 0,
            src_format: VertexFormat::RGB32_FLOAT,
        },
        VertexElement {
            src_offset: 12,
            vertex_buffer_index: 0,
            src_format: VertexFormat::RGBA8_UNORM,
        },
    ]);
    ctx.set_vertex_buffers(
        0,
        vec![Some(VertexBuffer {
            bo: vertices,
            buffer_offset: 0,
            stride: 16,
        })],
    );
    ctx.set_constant_buffer(ShaderStage::Vertex, Some(vec![0; 64]));
    ctx.set_constant_buffer(ShaderStage::Fragment, Some(vec![0; 32]));
    ctx
}

fn bench_draw_arrays(c: &mut Criterion) {
    let mut group = c.benchmark_group("draw_arrays");
    for draws in [1u32, 16, 256] {
        group.throughput(criterion::Throughput::Elements(u64::from(draws)));
        group.bench_with_input(BenchmarkId::new("triangles", draws), &draws, |b, &draws| {
            let pairs: Vec<DrawStartCount> = (0..draws)
                .map(|i| DrawStartCount::new(i * 3, 3))
                .collect();
            b.iter_batched(
                context,
                |mut ctx| {
                    let results = ctx.draw_vbo(&DrawInfo::arrays(PrimMode::Triangles), &pairs);
                    ctx.flush();
                    black_box((results, ctx.take_submitted()))
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_draw_indexed(c: &mut Criterion) {
    let mut group = c.benchmark_group("draw_indexed");
    let indices: Vec<u8> = (0..3 * 1024u32)
        .map(|i| ((i * 7) % 4096) as u16)
        .flat_map(u16::to_le_bytes)
        .collect();

    // Cold scans every range; warm hits the min/max cache after the first draw.
    for (name, repeat) in [("cold", 1usize), ("warm", 8)] {
        group.bench_function(name, |b| {
            b.iter_batched(
                || {
                    let mut ctx = context();
                    let bo = ctx.alloc_bo(indices.len() as u32).unwrap();
                    bo.write(0, &indices);
                    let ib = ctx.index_buffer(bo);
                    (ctx, ib)
                },
                |(mut ctx, ib)| {
                    let info =
                        DrawInfo::indexed(PrimMode::Triangles, 2, IndexSource::Resource(&ib));
                    for _ in 0..repeat {
                        black_box(ctx.draw_vbo(&info, &[DrawStartCount::new(0, 3 * 1024)]));
                    }
                    ctx.flush();
                    black_box(ctx.take_submitted())
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group! {
    name = benches;
    config = criterion_config();
    targets = bench_draw_arrays, bench_draw_indexed
}
criterion_main!(benches);
