//! glTF scene graphs for the `skein_gpu` device layer.
//!
//! [`SceneGraphLoader`] parses an asset into an arena [`SceneGraph`] whose nodes reference
//! meshes, materials, skins and animations by index, uploading geometry and textures on the way.

pub mod animation;
pub mod bounds;
pub mod error;
pub mod ktx;
pub mod loader;
pub mod material;
pub mod mesh;
pub mod node;
pub mod scene;
pub mod settings;
pub mod skin;
pub mod texture;
pub mod vertex;

pub use animation::{Animation, AnimationChannel, ChannelPath, Interpolation, KeyframeSampler};
pub use bounds::BoundingBox;
pub use error::{AssetError, Result};
pub use loader::SceneGraphLoader;
pub use material::{AlphaMode, Material, MaterialConstants, TextureFlags, TextureRef};
pub use mesh::{MAX_NUM_JOINTS, Mesh, MeshUniform, Primitive};
pub use node::{NodeIndex, SceneNode};
pub use scene::SceneGraph;
pub use settings::{DescriptorBindingFlags, FileLoadingFlags, LoadSettings};
pub use skin::Skin;
pub use texture::{DecodedImage, Texture};
pub use vertex::Vertex;
