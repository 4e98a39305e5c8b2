use skein_gpu::ash::vk;
use skein_gpu::descriptor::DescriptorAllocator;
use skein_gpu::device::Device;
use skein_gpu::resource::{Buffer, Image, Sampler};
use tracing::warn;

use crate::animation::Animation;
use crate::bounds::BoundingBox;
use crate::error::Result;
use crate::material::Material;
use crate::mesh::{Mesh, Primitive};
use crate::node::{self, NodeIndex, SceneNode};
use crate::skin::Skin;
use crate::texture::Texture;

/// Everything loaded from one asset.
///
/// Nodes live in an arena and reference each other, their mesh and their skin by index.
/// Dropping the graph releases the meshes first, then the materials' images and samplers, the
/// geometry and finally the descriptor pool holding every set.
#[derive(Debug)]
pub struct SceneGraph<D: Device> {
    pub(crate) meshes: Vec<Mesh<D>>,
    pub(crate) nodes: Vec<SceneNode>,
    pub(crate) roots: Vec<NodeIndex>,
    pub(crate) materials: Vec<Material>,
    pub(crate) textures: Vec<Texture>,
    pub(crate) skins: Vec<Skin>,
    pub(crate) animations: Vec<Animation>,
    pub(crate) images: Vec<Image<D>>,
    pub(crate) samplers: Vec<Sampler<D>>,
    pub(crate) vertices: Option<Buffer<D>>,
    pub(crate) indices: Option<Buffer<D>>,
    pub(crate) vertex_count: u32,
    pub(crate) index_count: u32,
    pub(crate) descriptors: Option<DescriptorAllocator<D>>,
    pub(crate) dimensions: Option<BoundingBox>,
}

impl<D: Device> SceneGraph<D> {
    pub fn nodes(&self) -> &[SceneNode] {
        &self.nodes
    }

    pub fn node(&self, index: NodeIndex) -> Option<&SceneNode> {
        self.nodes.get(index)
    }

    /// Local transforms and visibility may be edited, call [`SceneGraph::update`] afterwards
    pub fn node_mut(&mut self, index: NodeIndex) -> Option<&mut SceneNode> {
        self.nodes.get_mut(index)
    }

    pub fn roots(&self) -> &[NodeIndex] {
        &self.roots
    }

    pub fn node_by_name(&self, name: &str) -> Option<NodeIndex> {
        self.nodes.iter().position(|node| node.name == name)
    }

    /// Finds a node by its index in the source asset
    pub fn node_by_source_index(&self, index: usize) -> Option<NodeIndex> {
        self.nodes.iter().position(|node| node.index == index)
    }

    pub fn meshes(&self) -> &[Mesh<D>] {
        &self.meshes
    }

    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    pub fn textures(&self) -> &[Texture] {
        &self.textures
    }

    pub fn images(&self) -> &[Image<D>] {
        &self.images
    }

    pub fn skins(&self) -> &[Skin] {
        &self.skins
    }

    pub fn animations(&self) -> &[Animation] {
        &self.animations
    }

    pub fn animation_by_name(&self, name: &str) -> Option<usize> {
        self.animations
            .iter()
            .position(|animation| animation.name == name)
    }

    pub fn vertex_buffer(&self) -> Option<&Buffer<D>> {
        self.vertices.as_ref()
    }

    pub fn index_buffer(&self) -> Option<&Buffer<D>> {
        self.indices.as_ref()
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn descriptor_allocator(&self) -> Option<&DescriptorAllocator<D>> {
        self.descriptors.as_ref()
    }

    /// World space bounds of every primitive as loaded
    pub fn dimensions(&self) -> Option<BoundingBox> {
        self.dimensions
    }

    /// View and sampler a texture binds, the placeholder image when it has none
    pub fn texture_binding(&self, texture: Option<usize>) -> Option<(vk::ImageView, vk::Sampler)> {
        let placeholder = Texture {
            image: self.images.len().checked_sub(1)?,
            sampler: self.samplers.len().checked_sub(1)?,
        };
        let texture = texture
            .and_then(|texture| self.textures.get(texture).copied())
            .unwrap_or(placeholder);
        Some((
            self.images.get(texture.image)?.view(),
            self.samplers.get(texture.sampler)?.handle(),
        ))
    }

    /// Bounds of a mesh's primitive under its node's current world matrix
    pub fn primitive_world_bounds(&self, mesh: &Mesh<D>, primitive: &Primitive) -> BoundingBox {
        primitive
            .bounds
            .transformed(self.nodes[mesh.node].world_matrix())
    }

    /// Propagates world matrices from every root and rewrites every mesh uniform buffer
    pub fn update(&mut self) -> Result<()> {
        node::propagate_world(&mut self.nodes, &self.roots);
        for mesh in &self.meshes {
            self.write_mesh_uniform(mesh)?;
        }
        Ok(())
    }

    /// Rewrites the uniform buffer of `node`'s mesh from the current world matrices
    pub fn update_joints(&self, node: NodeIndex) -> Result<()> {
        let Some(mesh) = self
            .nodes
            .get(node)
            .and_then(|node| node.mesh)
            .and_then(|mesh| self.meshes.get(mesh))
        else {
            return Ok(());
        };
        self.write_mesh_uniform(mesh)
    }

    fn write_mesh_uniform(&self, mesh: &Mesh<D>) -> Result<()> {
        let node = &self.nodes[mesh.node];
        let world = node.world_matrix();
        match node.skin.and_then(|skin| self.skins.get(skin)) {
            Some(skin) => mesh.write_skinned(world, &skin.joint_matrices(&self.nodes, world))?,
            None => mesh.write_matrix(world)?,
        }
        Ok(())
    }

    /// Samples `animation` at `time` into the node transforms, then updates world matrices and
    /// joint matrices.
    ///
    /// Returns how many channels produced a value. Times outside every keyframe interval leave
    /// the affected nodes as they were.
    pub fn advance(&mut self, animation: usize, time: f32) -> Result<usize> {
        let Some(clip) = self.animations.get(animation) else {
            warn!(animation, "Animation does not exist");
            return Ok(0);
        };
        let updated = clip.apply(&mut self.nodes, time);
        self.update()?;
        Ok(updated)
    }
}
