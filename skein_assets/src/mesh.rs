use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use derivative::Derivative;
use skein_gpu::ash::vk;
use skein_gpu::device::{BufferDesc, Device, MemoryLocation};
use skein_gpu::resource::Buffer;

use crate::bounds::BoundingBox;

/// Largest joint count a skinned mesh can upload
pub const MAX_NUM_JOINTS: usize = 128;

/// Contents of a mesh node's uniform buffer
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Derivative)]
#[derivative(Debug)]
pub struct MeshUniform {
    pub matrix: glam::Mat4,
    #[derivative(Debug = "ignore")]
    pub joint_matrix: [glam::Mat4; MAX_NUM_JOINTS],
    pub joint_count: f32,
    _padding: [f32; 3],
}

impl Default for MeshUniform {
    fn default() -> Self {
        let mut uniform = Self::zeroed();
        uniform.matrix = glam::Mat4::IDENTITY;
        uniform
    }
}

impl MeshUniform {
    pub const JOINT_MATRIX_OFFSET: vk::DeviceSize =
        std::mem::offset_of!(MeshUniform, joint_matrix) as vk::DeviceSize;
    pub const JOINT_COUNT_OFFSET: vk::DeviceSize =
        std::mem::offset_of!(MeshUniform, joint_count) as vk::DeviceSize;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Primitive {
    pub first_index: u32,
    pub index_count: u32,
    pub first_vertex: u32,
    pub vertex_count: u32,
    /// Index into the scene graph's materials
    pub material: usize,
    /// Object space bounds of the primitive's positions
    pub bounds: BoundingBox,
}

/// Geometry drawn by exactly one node, with that node's uniform buffer and descriptor set
#[derive(Debug)]
pub struct Mesh<D: Device> {
    pub name: String,
    pub node: usize,
    pub primitives: Vec<Primitive>,
    pub bounds: Option<BoundingBox>,
    uniform: Buffer<D>,
    descriptor_set: vk::DescriptorSet,
}

impl<D: Device> Mesh<D> {
    pub(crate) fn new(
        device: Arc<D>,
        name: String,
        node: usize,
        primitives: Vec<Primitive>,
    ) -> skein_gpu::Result<Self> {
        let uniform = Buffer::new(
            device,
            &BufferDesc {
                name: &format!("{name} uniform"),
                size: std::mem::size_of::<MeshUniform>() as vk::DeviceSize,
                usage: vk::BufferUsageFlags::UNIFORM_BUFFER,
                location: MemoryLocation::CpuToGpu,
            },
        )?;
        uniform.write_pod(0, &MeshUniform::default())?;
        let bounds = primitives
            .iter()
            .map(|primitive| primitive.bounds)
            .reduce(BoundingBox::merge);
        Ok(Self {
            name,
            node,
            primitives,
            bounds,
            uniform,
            descriptor_set: vk::DescriptorSet::null(),
        })
    }

    pub fn uniform(&self) -> &Buffer<D> {
        &self.uniform
    }

    pub fn descriptor_set(&self) -> vk::DescriptorSet {
        self.descriptor_set
    }

    pub(crate) fn set_descriptor_set(&mut self, set: vk::DescriptorSet) {
        self.descriptor_set = set;
    }

    /// Writes only the node matrix, used by unskinned meshes
    pub fn write_matrix(&self, matrix: glam::Mat4) -> skein_gpu::Result<()> {
        self.uniform.write_pod(0, &matrix)
    }

    /// Writes the node matrix, every joint matrix and the joint count
    pub fn write_skinned(
        &self,
        matrix: glam::Mat4,
        joints: &[glam::Mat4],
    ) -> skein_gpu::Result<()> {
        let count = joints.len().min(MAX_NUM_JOINTS);
        let mut uniform = MeshUniform {
            matrix,
            joint_count: count as f32,
            ..MeshUniform::default()
        };
        uniform.joint_matrix[..count].copy_from_slice(&joints[..count]);
        self.uniform.write_pod(0, &uniform)
    }

    /// Reads the uniform buffer back from host memory
    pub fn read_uniform(&self) -> skein_gpu::Result<MeshUniform> {
        let mut bytes = vec![0u8; std::mem::size_of::<MeshUniform>()];
        self.uniform.read(0, &mut bytes)?;
        Ok(bytemuck::pod_read_unaligned(&bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skein_gpu::device::HeadlessDevice;

    fn primitive(min: glam::Vec3, max: glam::Vec3) -> Primitive {
        Primitive {
            first_index: 0,
            index_count: 3,
            first_vertex: 0,
            vertex_count: 3,
            material: 0,
            bounds: BoundingBox::new(min, max),
        }
    }

    #[test]
    fn uniform_layout_matches_shader_block() {
        assert_eq!(MeshUniform::JOINT_MATRIX_OFFSET, 64);
        assert_eq!(MeshUniform::JOINT_COUNT_OFFSET, 64 + 64 * MAX_NUM_JOINTS as u64);
        assert_eq!(std::mem::size_of::<MeshUniform>() % 16, 0);
    }

    #[test]
    fn skinned_write_truncates_to_max_joints() {
        let device = Arc::new(HeadlessDevice::new());
        let mesh = Mesh::new(
            device,
            "mesh".into(),
            0,
            vec![primitive(glam::Vec3::ZERO, glam::Vec3::ONE)],
        )
        .unwrap();
        let joints = vec![glam::Mat4::from_scale(glam::Vec3::splat(2.0)); MAX_NUM_JOINTS + 4];
        mesh.write_skinned(glam::Mat4::IDENTITY, &joints).unwrap();
        let uniform = mesh.read_uniform().unwrap();
        assert_eq!(uniform.joint_count, MAX_NUM_JOINTS as f32);
        assert_eq!(uniform.joint_matrix[MAX_NUM_JOINTS - 1], joints[0]);
    }

    #[test]
    fn bounds_merge_primitives() {
        let device = Arc::new(HeadlessDevice::new());
        let mesh = Mesh::new(
            device,
            "mesh".into(),
            0,
            vec![
                primitive(glam::Vec3::ZERO, glam::Vec3::ONE),
                primitive(glam::Vec3::splat(-2.0), glam::Vec3::ZERO),
            ],
        )
        .unwrap();
        let bounds = mesh.bounds.unwrap();
        assert_eq!(bounds.min, glam::Vec3::splat(-2.0));
        assert_eq!(bounds.max, glam::Vec3::ONE);
    }
}
