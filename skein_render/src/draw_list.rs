//! Visible primitives of a scene graph, in submission order.

use skein_assets::{AlphaMode, SceneGraph};
use skein_gpu::ash::vk;
use skein_gpu::command::CommandBufferRecording;
use skein_gpu::device::Device;

use crate::pipeline::{MATERIAL_SET, NODE_SET, ScenePipeline};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawItem {
    pub mesh: usize,
    pub primitive: usize,
    pub material: usize,
    pub alpha_mode: AlphaMode,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrawList {
    items: Vec<DrawItem>,
}

impl DrawList {
    /// Culls against `view_projection` and orders opaque, mask then blend, grouped by material
    /// within each mode. Source order is kept inside a group.
    pub fn build<D: Device>(graph: &SceneGraph<D>, view_projection: glam::Mat4) -> Self {
        let materials = graph.materials();
        let mut items: Vec<DrawItem> = Vec::new();
        for (mesh_index, mesh) in graph.meshes().iter().enumerate() {
            let Some(node) = graph.node(mesh.node) else {
                continue;
            };
            if !node.visible {
                continue;
            }
            let world = node.world_matrix();
            for (primitive_index, primitive) in mesh.primitives.iter().enumerate() {
                if primitive.index_count == 0
                    || !primitive.bounds.visible_in_frustum(world, view_projection)
                {
                    continue;
                }
                let alpha_mode = materials
                    .get(primitive.material)
                    .map(|material| material.alpha_mode)
                    .unwrap_or(AlphaMode::Opaque);
                items.push(DrawItem {
                    mesh: mesh_index,
                    primitive: primitive_index,
                    material: primitive.material,
                    alpha_mode,
                });
            }
        }
        items.sort_by_key(|item| (item.alpha_mode, item.material));
        Self { items }
    }

    pub fn items(&self) -> &[DrawItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Records every item, rebinding material and node state only when it changes.
    ///
    /// Expects the camera set, the pipeline and the graph's vertex and index buffers to be
    /// bound already.
    pub fn record<D: Device>(
        &self,
        graph: &SceneGraph<D>,
        pipeline: &ScenePipeline<D>,
        cmd: &CommandBufferRecording<D>,
    ) {
        let layout = pipeline.layout();
        let mut bound_material: Option<usize> = None;
        let mut bound_material_set = vk::DescriptorSet::null();
        let mut bound_node_set = vk::DescriptorSet::null();

        for item in &self.items {
            let (Some(mesh), Some(material)) = (
                graph.meshes().get(item.mesh),
                graph.materials().get(item.material),
            ) else {
                continue;
            };
            let Some(primitive) = mesh.primitives.get(item.primitive) else {
                continue;
            };

            if bound_material != Some(item.material) {
                if let Some(set) = material.descriptor_set
                    && set != bound_material_set
                {
                    cmd.bind_descriptor_set(layout, MATERIAL_SET, set);
                    bound_material_set = set;
                }
                cmd.push_constants(
                    layout,
                    vk::ShaderStageFlags::FRAGMENT,
                    0,
                    bytemuck::bytes_of(&material.constants()),
                );
                bound_material = Some(item.material);
            }
            if mesh.descriptor_set() != bound_node_set {
                cmd.bind_descriptor_set(layout, NODE_SET, mesh.descriptor_set());
                bound_node_set = mesh.descriptor_set();
            }
            cmd.draw_indexed(primitive.index_count, primitive.first_index, 0);
        }
    }
}
