/// Index of a node inside its scene graph's arena
pub type NodeIndex = usize;

/// A node of the scene tree.
///
/// Parent and children are arena indices. The local matrix is
/// `translation * rotation * scale * matrix`, where `matrix` is the raw matrix of the source node
/// or identity when the node was described by translation, rotation and scale.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneNode {
    /// Index of the node in the source asset
    pub index: usize,
    pub name: String,
    pub translation: glam::Vec3,
    pub rotation: glam::Quat,
    pub scale: glam::Vec3,
    pub matrix: glam::Mat4,
    pub parent: Option<NodeIndex>,
    pub children: Vec<NodeIndex>,
    /// Index into the scene graph's meshes
    pub mesh: Option<usize>,
    /// Index into the scene graph's skins
    pub skin: Option<usize>,
    pub visible: bool,
    pub(crate) world: glam::Mat4,
}

impl SceneNode {
    pub fn new(index: usize, name: String) -> Self {
        Self {
            index,
            name,
            translation: glam::Vec3::ZERO,
            rotation: glam::Quat::IDENTITY,
            scale: glam::Vec3::ONE,
            matrix: glam::Mat4::IDENTITY,
            parent: None,
            children: Vec::new(),
            mesh: None,
            skin: None,
            visible: true,
            world: glam::Mat4::IDENTITY,
        }
    }

    pub fn local_matrix(&self) -> glam::Mat4 {
        glam::Mat4::from_translation(self.translation)
            * glam::Mat4::from_quat(self.rotation)
            * glam::Mat4::from_scale(self.scale)
            * self.matrix
    }

    /// World matrix as of the last propagation
    pub fn world_matrix(&self) -> glam::Mat4 {
        self.world
    }
}

/// Recomputes `world(node) = world(parent) * local(node)` top down from every root.
///
/// Walks an explicit stack so deep hierarchies cannot overflow the call stack.
pub fn propagate_world(nodes: &mut [SceneNode], roots: &[NodeIndex]) {
    let mut stack: Vec<(NodeIndex, glam::Mat4)> = roots
        .iter()
        .rev()
        .map(|root| (*root, glam::Mat4::IDENTITY))
        .collect();
    while let Some((index, parent_world)) = stack.pop() {
        let node = &mut nodes[index];
        node.world = parent_world * node.local_matrix();
        let world = node.world;
        stack.extend(node.children.iter().rev().map(|child| (*child, world)));
    }
}
