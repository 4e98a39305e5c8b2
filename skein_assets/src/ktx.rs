//! KTX 1.1 containers.
//!
//! Only single face, single layer 2D textures are read. Every stored mip level is kept so the
//! uploader can copy them explicitly instead of generating a chain.

use skein_gpu::ash::vk;
use skein_gpu::transfer::MipRegion;
use skein_gpu::util::format;

use crate::error::{AssetError, Result};

pub const IDENTIFIER: [u8; 12] = [
    0xAB, 0x4B, 0x54, 0x58, 0x20, 0x31, 0x31, 0xBB, 0x0D, 0x0A, 0x1A, 0x0A,
];
const HEADER_SIZE: usize = 64;
const ENDIAN_REFERENCE: u32 = 0x0403_0201;

/// A parsed container, mip data is tightly packed in `data`
#[derive(Debug, Clone, PartialEq)]
pub struct KtxTexture {
    pub format: vk::Format,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub mips: Vec<MipRegion>,
}

pub fn is_ktx(bytes: &[u8]) -> bool {
    bytes.starts_with(&IDENTIFIER)
}

/// Maps a `glInternalFormat` onto the matching Vulkan format
pub fn vk_format(gl_internal_format: u32) -> Option<vk::Format> {
    Some(match gl_internal_format {
        0x8058 => vk::Format::R8G8B8A8_UNORM,
        0x8C43 => vk::Format::R8G8B8A8_SRGB,
        0x83F0 => vk::Format::BC1_RGB_UNORM_BLOCK,
        0x83F1 => vk::Format::BC1_RGBA_UNORM_BLOCK,
        0x83F2 => vk::Format::BC2_UNORM_BLOCK,
        0x83F3 => vk::Format::BC3_UNORM_BLOCK,
        0x8E8C => vk::Format::BC7_UNORM_BLOCK,
        0x8E8D => vk::Format::BC7_SRGB_BLOCK,
        0x9274 => vk::Format::ETC2_R8G8B8_UNORM_BLOCK,
        0x9275 => vk::Format::ETC2_R8G8B8_SRGB_BLOCK,
        0x9278 => vk::Format::ETC2_R8G8B8A8_UNORM_BLOCK,
        0x9279 => vk::Format::ETC2_R8G8B8A8_SRGB_BLOCK,
        0x93B0 => vk::Format::ASTC_4X4_UNORM_BLOCK,
        0x93D0 => vk::Format::ASTC_4X4_SRGB_BLOCK,
        0x93B7 => vk::Format::ASTC_8X8_UNORM_BLOCK,
        0x93D7 => vk::Format::ASTC_8X8_SRGB_BLOCK,
        _ => return None,
    })
}

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
    swap: bool,
}

impl Reader<'_> {
    fn u32(&mut self) -> Result<u32> {
        let end = self.offset + 4;
        let word: [u8; 4] = self
            .bytes
            .get(self.offset..end)
            .and_then(|slice| slice.try_into().ok())
            .ok_or_else(|| AssetError::Ktx(format!("truncated at byte {}", self.offset)))?;
        self.offset = end;
        let value = u32::from_le_bytes(word);
        Ok(if self.swap { value.swap_bytes() } else { value })
    }
}

pub fn parse(bytes: &[u8]) -> Result<KtxTexture> {
    if !is_ktx(bytes) {
        return Err(AssetError::Ktx("missing KTX 1.1 identifier".into()));
    }
    if bytes.len() < HEADER_SIZE {
        return Err(AssetError::Ktx("header is truncated".into()));
    }
    let mut reader = Reader {
        bytes,
        offset: IDENTIFIER.len(),
        swap: false,
    };
    reader.swap = match reader.u32()? {
        ENDIAN_REFERENCE => false,
        value if value.swap_bytes() == ENDIAN_REFERENCE => true,
        value => return Err(AssetError::Ktx(format!("bad endianness marker {value:#x}"))),
    };
    let _gl_type = reader.u32()?;
    let _gl_type_size = reader.u32()?;
    let _gl_format = reader.u32()?;
    let gl_internal_format = reader.u32()?;
    let _gl_base_internal_format = reader.u32()?;
    let width = reader.u32()?;
    let height = reader.u32()?.max(1);
    let depth = reader.u32()?;
    let array_elements = reader.u32()?;
    let faces = reader.u32()?;
    let mip_count = reader.u32()?.max(1);
    let key_value_bytes = reader.u32()? as usize;

    if depth > 1 || array_elements > 1 || faces != 1 {
        return Err(AssetError::Ktx(format!(
            "only 2D textures are supported, got depth {depth}, {array_elements} layers and {faces} faces"
        )));
    }
    let format = vk_format(gl_internal_format).ok_or_else(|| {
        AssetError::Ktx(format!("unsupported internal format {gl_internal_format:#x}"))
    })?;
    reader.offset = HEADER_SIZE + key_value_bytes;

    let mut data = Vec::new();
    let mut mips = Vec::with_capacity(mip_count as usize);
    for level in 0..mip_count {
        let level_width = (width >> level).max(1);
        let level_height = (height >> level).max(1);
        let image_size = reader.u32()? as usize;
        let expected = format::image_level_size(format, level_width, level_height)
            .ok_or_else(|| AssetError::Ktx(format!("no block size for {format:?}")))?
            as usize;
        if image_size < expected {
            return Err(AssetError::Ktx(format!(
                "level {level} holds {image_size} bytes, {expected} are required"
            )));
        }
        let level_data = bytes
            .get(reader.offset..reader.offset + image_size)
            .ok_or_else(|| AssetError::Ktx(format!("level {level} is truncated")))?;
        mips.push(MipRegion {
            offset: data.len() as u64,
            width: level_width,
            height: level_height,
        });
        data.extend_from_slice(&level_data[..expected]);
        // mip padding keeps every level 4 byte aligned
        reader.offset += image_size.next_multiple_of(4);
    }

    Ok(KtxTexture {
        format,
        width,
        height,
        data,
        mips,
    })
}
