use crate::node::{NodeIndex, SceneNode};

#[derive(Debug, Clone, PartialEq)]
pub struct Skin {
    pub name: String,
    pub skeleton_root: Option<NodeIndex>,
    pub joints: Vec<NodeIndex>,
    /// Parallel to `joints`
    pub inverse_bind_matrices: Vec<glam::Mat4>,
}

impl Skin {
    /// `inverse(world(skinned)) * world(joint) * inverse_bind(joint)` for every joint
    pub fn joint_matrices(
        &self,
        nodes: &[SceneNode],
        skinned_world: glam::Mat4,
    ) -> Vec<glam::Mat4> {
        let inverse_world = skinned_world.inverse();
        self.joints
            .iter()
            .enumerate()
            .map(|(slot, joint)| {
                let inverse_bind = self
                    .inverse_bind_matrices
                    .get(slot)
                    .copied()
                    .unwrap_or(glam::Mat4::IDENTITY);
                inverse_world * nodes[*joint].world_matrix() * inverse_bind
            })
            .collect()
    }
}
