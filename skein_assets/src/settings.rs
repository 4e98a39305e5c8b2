use bitflags::bitflags;
use skein_gpu::device::MemoryLocation;

bitflags! {
    /// Optional passes run while an asset is loaded
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FileLoadingFlags: u32 {
        /// Bake every node's world matrix into its vertex positions and normals
        const PRE_TRANSFORM_VERTICES = 0b0001;
        /// Multiply vertex colors by the material's base color factor
        const PRE_MULTIPLY_VERTEX_COLORS = 0b0010;
        /// Negate the Y axis of positions and normals
        const FLIP_Y = 0b0100;
        /// Skip image decoding, every texture resolves to the empty placeholder
        const DONT_LOAD_IMAGES = 0b1000;
    }
}

bitflags! {
    /// Images bound in a material's descriptor set, in binding order
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DescriptorBindingFlags: u32 {
        const IMAGE_BASE_COLOR = 0b01;
        const IMAGE_NORMAL_MAP = 0b10;
    }
}

impl DescriptorBindingFlags {
    /// Number of image bindings in a material set
    pub fn binding_count(&self) -> u32 {
        self.bits().count_ones()
    }
}

/// Controls how a scene graph is loaded
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadSettings {
    pub file_flags: FileLoadingFlags,
    pub binding_flags: DescriptorBindingFlags,
    /// Deepest node hierarchy accepted before the asset is rejected
    pub max_node_depth: usize,
    /// Where the vertex and index buffers live
    pub geometry_location: MemoryLocation,
}

impl Default for LoadSettings {
    fn default() -> Self {
        Self {
            file_flags: FileLoadingFlags::empty(),
            binding_flags: DescriptorBindingFlags::IMAGE_BASE_COLOR,
            max_node_depth: 256,
            geometry_location: MemoryLocation::GpuOnly,
        }
    }
}

impl LoadSettings {
    pub fn file_flags(mut self, flags: FileLoadingFlags) -> Self {
        self.file_flags = flags;
        self
    }

    pub fn binding_flags(mut self, flags: DescriptorBindingFlags) -> Self {
        self.binding_flags = flags;
        self
    }

    pub fn max_node_depth(mut self, depth: usize) -> Self {
        self.max_node_depth = depth;
        self
    }

    pub fn geometry_location(mut self, location: MemoryLocation) -> Self {
        self.geometry_location = location;
        self
    }
}
