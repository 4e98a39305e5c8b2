use std::path::Path;

use base64::Engine;
use skein_gpu::ash::vk;
use skein_gpu::device::{Device, SamplerDesc};
use skein_gpu::resource::Image;
use skein_gpu::transfer::{ImageUpload, MipLevels, MipRegion, StagingUploader};
use tracing::debug;

use crate::error::{AssetError, Result};
use crate::ktx;

/// A texture of the source asset: one image sampled through one sampler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Texture {
    /// Index into the scene graph's images
    pub image: usize,
    /// Index into the scene graph's samplers
    pub sampler: usize,
}

/// Pixels ready for upload
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    pub format: vk::Format,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    /// Empty when the chain should be generated on the GPU
    pub mips: Vec<MipRegion>,
}

impl DecodedImage {
    /// The image bound wherever a material has no texture
    pub fn placeholder() -> Self {
        Self {
            format: vk::Format::R8G8B8A8_UNORM,
            width: 1,
            height: 1,
            data: vec![0u8; 4],
            mips: vec![MipRegion {
                offset: 0,
                width: 1,
                height: 1,
            }],
        }
    }

    /// Decodes either a KTX container or anything the `image` crate understands into RGBA8
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if ktx::is_ktx(bytes) {
            let texture = ktx::parse(bytes)?;
            return Ok(Self {
                format: texture.format,
                width: texture.width,
                height: texture.height,
                data: texture.data,
                mips: texture.mips,
            });
        }
        let rgba = image::load_from_memory(bytes)?.to_rgba8();
        Ok(Self {
            format: vk::Format::R8G8B8A8_UNORM,
            width: rgba.width(),
            height: rgba.height(),
            data: rgba.into_raw(),
            mips: Vec::new(),
        })
    }

    pub fn upload<D: Device>(&self, uploader: &StagingUploader<D>, name: &str) -> Result<Image<D>> {
        let mips = if self.mips.is_empty() {
            MipLevels::Generate
        } else {
            MipLevels::Explicit(&self.mips)
        };
        let image = uploader.upload_image(&ImageUpload {
            name,
            format: self.format,
            width: self.width,
            height: self.height,
            data: &self.data,
            mips,
        })?;
        debug!(
            name,
            width = self.width,
            height = self.height,
            format = ?self.format,
            "Loaded texture"
        );
        Ok(image)
    }
}

/// Reads the bytes behind a URI, either inline base64 data or a file next to the asset
pub fn read_uri(uri: &str, base: Option<&Path>) -> Result<Vec<u8>> {
    if let Some(data) = uri.strip_prefix("data:") {
        let (header, payload) = data.split_once(',').ok_or(AssetError::InvalidDataUri)?;
        if !header.ends_with(";base64") {
            return Err(AssetError::InvalidDataUri);
        }
        return base64::engine::general_purpose::STANDARD
            .decode(payload)
            .map_err(|_| AssetError::InvalidDataUri);
    }
    let path = match base {
        Some(base) => base.join(uri),
        None => Path::new(uri).to_path_buf(),
    };
    Ok(std::fs::read(path)?)
}

pub fn sampler_desc(sampler: &gltf::texture::Sampler) -> SamplerDesc {
    use gltf::texture::{MagFilter, MinFilter};

    let mag_filter = match sampler.mag_filter() {
        Some(MagFilter::Nearest) => vk::Filter::NEAREST,
        Some(MagFilter::Linear) | None => vk::Filter::LINEAR,
    };
    let min_filter = match sampler.min_filter() {
        Some(MinFilter::Nearest)
        | Some(MinFilter::NearestMipmapNearest)
        | Some(MinFilter::NearestMipmapLinear) => vk::Filter::NEAREST,
        _ => vk::Filter::LINEAR,
    };
    SamplerDesc {
        mag_filter,
        min_filter,
        address_mode_u: address_mode(sampler.wrap_s()),
        address_mode_v: address_mode(sampler.wrap_t()),
        address_mode_w: address_mode(sampler.wrap_t()),
        ..Default::default()
    }
}

fn address_mode(mode: gltf::texture::WrappingMode) -> vk::SamplerAddressMode {
    match mode {
        gltf::texture::WrappingMode::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        gltf::texture::WrappingMode::MirroredRepeat => vk::SamplerAddressMode::MIRRORED_REPEAT,
        gltf::texture::WrappingMode::Repeat => vk::SamplerAddressMode::REPEAT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_uri_round_trips() {
        let encoded = base64::engine::general_purpose::STANDARD.encode([1u8, 2, 3]);
        let uri = format!("data:application/octet-stream;base64,{encoded}");
        assert_eq!(read_uri(&uri, None).unwrap(), vec![1, 2, 3]);
        assert!(matches!(
            read_uri("data:text/plain,hello", None),
            Err(AssetError::InvalidDataUri)
        ));
    }

    #[test]
    fn decodes_png_to_rgba() {
        let mut png = Vec::new();
        image::RgbaImage::from_pixel(3, 2, image::Rgba([10, 20, 30, 255]))
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let decoded = DecodedImage::decode(&png).unwrap();
        assert_eq!((decoded.width, decoded.height), (3, 2));
        assert_eq!(decoded.format, vk::Format::R8G8B8A8_UNORM);
        assert_eq!(&decoded.data[..4], &[10, 20, 30, 255]);
        assert!(decoded.mips.is_empty());
    }

    #[test]
    fn decodes_ktx_with_explicit_mips() {
        let bytes = crate::ktx::tests::build(0x8058, 2, 2, &[vec![5u8; 16], vec![6u8; 4]]);
        let decoded = DecodedImage::decode(&bytes).unwrap();
        assert_eq!(decoded.mips.len(), 2);
        assert_eq!(decoded.data.len(), 20);
    }
}
