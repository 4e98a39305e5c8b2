use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use skein_gpu::ash::vk;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AlphaMode {
    Opaque,
    Mask,
    Blend,
}

impl From<gltf::material::AlphaMode> for AlphaMode {
    fn from(value: gltf::material::AlphaMode) -> Self {
        match value {
            gltf::material::AlphaMode::Opaque => AlphaMode::Opaque,
            gltf::material::AlphaMode::Mask => AlphaMode::Mask,
            gltf::material::AlphaMode::Blend => AlphaMode::Blend,
        }
    }
}

/// A material's use of a texture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureRef {
    /// Index into the scene graph's textures
    pub texture: usize,
    /// Which `TEXCOORD_n` set samples it
    pub tex_coord: u32,
}

impl From<gltf::texture::Info<'_>> for TextureRef {
    fn from(info: gltf::texture::Info<'_>) -> Self {
        Self {
            texture: info.texture().index(),
            tex_coord: info.tex_coord(),
        }
    }
}

bitflags! {
    /// Textures a material provides, mirrored into its push constants
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureFlags: u32 {
        const BASE_COLOR = 0b00001;
        const METALLIC_ROUGHNESS = 0b00010;
        const NORMAL = 0b00100;
        const OCCLUSION = 0b01000;
        const EMISSIVE = 0b10000;
    }
}

/// Fragment push constant block carrying a material's factors
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MaterialConstants {
    pub base_color_factor: glam::Vec4,
    pub emissive_factor: glam::Vec4,
    pub metallic_factor: f32,
    pub roughness_factor: f32,
    pub alpha_cutoff: f32,
    pub texture_flags: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    /// Index of the material in the source asset, `None` for the appended default material
    pub index: Option<usize>,
    pub alpha_mode: AlphaMode,
    pub alpha_cutoff: f32,
    pub double_sided: bool,
    pub base_color_factor: glam::Vec4,
    pub metallic_factor: f32,
    pub roughness_factor: f32,
    pub emissive_factor: glam::Vec3,
    pub base_color_texture: Option<TextureRef>,
    pub metallic_roughness_texture: Option<TextureRef>,
    pub normal_texture: Option<TextureRef>,
    pub occlusion_texture: Option<TextureRef>,
    pub emissive_texture: Option<TextureRef>,
    pub descriptor_set: Option<vk::DescriptorSet>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            index: None,
            alpha_mode: AlphaMode::Opaque,
            alpha_cutoff: 0.5,
            double_sided: false,
            base_color_factor: glam::Vec4::ONE,
            metallic_factor: 1.0,
            roughness_factor: 1.0,
            emissive_factor: glam::Vec3::ZERO,
            base_color_texture: None,
            metallic_roughness_texture: None,
            normal_texture: None,
            occlusion_texture: None,
            emissive_texture: None,
            descriptor_set: None,
        }
    }
}

impl Material {
    pub fn from_gltf(material: &gltf::Material) -> Self {
        let pbr = material.pbr_metallic_roughness();
        Self {
            name: material
                .name()
                .map(|name| name.to_string())
                .unwrap_or_else(|| format!("material_{}", material.index().unwrap_or_default())),
            index: material.index(),
            alpha_mode: material.alpha_mode().into(),
            alpha_cutoff: material.alpha_cutoff().unwrap_or(0.5),
            double_sided: material.double_sided(),
            base_color_factor: glam::Vec4::from_array(pbr.base_color_factor()),
            metallic_factor: pbr.metallic_factor(),
            roughness_factor: pbr.roughness_factor(),
            emissive_factor: glam::Vec3::from_array(material.emissive_factor()),
            base_color_texture: pbr.base_color_texture().map(TextureRef::from),
            metallic_roughness_texture: pbr.metallic_roughness_texture().map(TextureRef::from),
            normal_texture: material.normal_texture().map(|info| TextureRef {
                texture: info.texture().index(),
                tex_coord: info.tex_coord(),
            }),
            occlusion_texture: material.occlusion_texture().map(|info| TextureRef {
                texture: info.texture().index(),
                tex_coord: info.tex_coord(),
            }),
            emissive_texture: material.emissive_texture().map(TextureRef::from),
            descriptor_set: None,
        }
    }

    pub fn texture_flags(&self) -> TextureFlags {
        [
            (self.base_color_texture, TextureFlags::BASE_COLOR),
            (self.metallic_roughness_texture, TextureFlags::METALLIC_ROUGHNESS),
            (self.normal_texture, TextureFlags::NORMAL),
            (self.occlusion_texture, TextureFlags::OCCLUSION),
            (self.emissive_texture, TextureFlags::EMISSIVE),
        ]
        .into_iter()
        .filter(|(texture, _)| texture.is_some())
        .fold(TextureFlags::empty(), |flags, (_, flag)| flags | flag)
    }

    pub fn constants(&self) -> MaterialConstants {
        MaterialConstants {
            base_color_factor: self.base_color_factor,
            emissive_factor: self.emissive_factor.extend(1.0),
            metallic_factor: self.metallic_factor,
            roughness_factor: self.roughness_factor,
            alpha_cutoff: match self.alpha_mode {
                AlphaMode::Mask => self.alpha_cutoff,
                _ => 0.0,
            },
            texture_flags: self.texture_flags().bits(),
        }
    }
}
