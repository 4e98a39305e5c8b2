use bytemuck::{Pod, Zeroable};

/// Interleaved vertex shared by every primitive of an asset
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub pos: glam::Vec3,
    pub normal: glam::Vec3,
    pub uv: glam::Vec2,
    pub color: glam::Vec4,
    pub joint0: glam::Vec4,
    pub weight0: glam::Vec4,
    pub tangent: glam::Vec4,
}

impl Default for Vertex {
    fn default() -> Self {
        Self {
            pos: glam::Vec3::ZERO,
            normal: glam::Vec3::ZERO,
            uv: glam::Vec2::ZERO,
            color: glam::Vec4::ONE,
            joint0: glam::Vec4::ZERO,
            weight0: glam::Vec4::X,
            tangent: glam::Vec4::ZERO,
        }
    }
}

impl Vertex {
    /// Offsets of every attribute, for building vertex input state
    pub fn attribute_offsets() -> [(u32, usize); 7] {
        [
            (0, std::mem::offset_of!(Vertex, pos)),
            (1, std::mem::offset_of!(Vertex, normal)),
            (2, std::mem::offset_of!(Vertex, uv)),
            (3, std::mem::offset_of!(Vertex, color)),
            (4, std::mem::offset_of!(Vertex, joint0)),
            (5, std::mem::offset_of!(Vertex, weight0)),
            (6, std::mem::offset_of!(Vertex, tangent)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<Vertex>(), 96);
        let offsets = Vertex::attribute_offsets();
        assert_eq!(offsets[0].1, 0);
        assert_eq!(offsets[3].1, 32);
        assert_eq!(offsets[6].1, 80);
    }

    #[test]
    fn absent_attributes_default() {
        let vertex = Vertex::default();
        assert_eq!(vertex.color, glam::Vec4::ONE);
        assert_eq!(vertex.weight0, glam::Vec4::X);
        assert_eq!(vertex.normal, glam::Vec3::ZERO);
    }
}
