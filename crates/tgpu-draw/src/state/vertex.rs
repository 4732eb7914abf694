use crate::bo::BoRef;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ChannelType {
    #[default]
    Float,
    Fixed,
    Signed,
    Unsigned,
}

/// Layout of one vertex attribute as read from memory. Only the first channel's type, size and
/// normalization select the hardware attribute type; `components` is the channel count.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VertexFormat {
    pub channel_type: ChannelType,
    /// Bits per channel.
    pub size: u8,
    pub normalized: bool,
    pub components: u8,
}

impl VertexFormat {
    pub const RGBA32_FLOAT: Self = Self::float(4);
    pub const RGB32_FLOAT: Self = Self::float(3);
    pub const RG32_FLOAT: Self = Self::float(2);
    pub const RGBA8_UNORM: Self = Self {
        channel_type: ChannelType::Unsigned,
        size: 8,
        normalized: true,
        components: 4,
    };

    pub const fn float(components: u8) -> Self {
        Self {
            channel_type: ChannelType::Float,
            size: 32,
            normalized: false,
            components,
        }
    }

    /// Hardware attribute type; unknown combinations read as float.
    pub fn attrib_type(&self) -> u32 {
        match (self.channel_type, self.size, self.normalized) {
            (ChannelType::Float, _, _) => 0x000,
            (ChannelType::Fixed, _, _) => 0x101,
            (ChannelType::Signed, 8, false) => 0x006,
            (ChannelType::Signed, 8, true) => 0x008,
            (ChannelType::Signed, 16, false) => 0x004,
            (ChannelType::Signed, 16, true) => 0x00a,
            (ChannelType::Signed, 32, false) => 0x001,
            (ChannelType::Signed, 32, true) => 0x00d,
            (ChannelType::Unsigned, 8, false) => 0x007,
            (ChannelType::Unsigned, 8, true) => 0x009,
            (ChannelType::Unsigned, 16, false) => 0x005,
            (ChannelType::Unsigned, 16, true) => 0x00b,
            (ChannelType::Unsigned, 32, false) => 0x002,
            (ChannelType::Unsigned, 32, true) => 0x00e,
            _ => 0x000,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VertexElement {
    pub src_offset: u32,
    pub vertex_buffer_index: u32,
    pub src_format: VertexFormat,
}

#[derive(Clone, Debug)]
pub struct VertexBuffer {
    pub bo: BoRef,
    pub buffer_offset: u32,
    pub stride: u32,
}

/// Attribute descriptor: `[address, stride << 11 | type << 2 | (components - 1)]`.
pub fn attribute_descriptor(address: u32, stride: u32, format: &VertexFormat) -> [u32; 2] {
    [
        address,
        (stride << 11)
            | (format.attrib_type() << 2)
            | u32::from(format.components.saturating_sub(1)),
    ]
}
