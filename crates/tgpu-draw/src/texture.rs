//! Texture descriptor table: a 64-byte list of descriptor addresses followed by one 64-byte
//! descriptor per bound sampler view.

use crate::bo::BoRef;

pub const MAX_SAMPLER_VIEWS: usize = 16;

const LIST_SIZE: u32 = 64;
const DESC_SIZE: u32 = 64;

/// A sampled texture and its prebuilt hardware descriptor.
#[derive(Clone, Debug)]
pub struct SamplerView {
    pub bo: BoRef,
    pub descriptor: [u32; 16],
}

/// Table bytes for `views`, with the address list pointing at `base_va + 64 + 64 * i`.
pub fn descriptor_table(views: &[SamplerView], base_va: u32) -> Vec<u8> {
    let mut words = vec![0u32; ((LIST_SIZE + DESC_SIZE * views.len() as u32) / 4) as usize];
    for (i, view) in views.iter().enumerate() {
        let offset = LIST_SIZE + DESC_SIZE * i as u32;
        words[i] = base_va + offset;
        let at = (offset / 4) as usize;
        words[at..at + 16].copy_from_slice(&view.descriptor);
    }
    bytemuck::cast_slice(&words).to_vec()
}

pub fn table_size(num_views: usize) -> u32 {
    LIST_SIZE + DESC_SIZE * num_views as u32
}
