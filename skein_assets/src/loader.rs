use std::borrow::Cow;
use std::collections::HashMap;
use std::path::Path;

use gltf::accessor::{DataType, Dimensions};
use skein_gpu::GraphicsContext;
use skein_gpu::ash::vk;
use skein_gpu::descriptor::{DescriptorAllocator, DescriptorCounts};
use skein_gpu::device::{BufferDesc, Device};
use skein_gpu::resource::{Buffer, Image, Sampler};
use tracing::{debug, error, info, warn};

use crate::animation::{Animation, AnimationChannel, ChannelPath, Interpolation, KeyframeSampler};
use crate::bounds::BoundingBox;
use crate::error::{AssetError, Result};
use crate::material::Material;
use crate::mesh::{MAX_NUM_JOINTS, Mesh, Primitive};
use crate::node::{self, NodeIndex, SceneNode};
use crate::scene::SceneGraph;
use crate::settings::{DescriptorBindingFlags, FileLoadingFlags, LoadSettings};
use crate::skin::Skin;
use crate::texture::{self, DecodedImage, Texture};
use crate::vertex::Vertex;

/// CPU side geometry of the whole asset, shared by every primitive
#[derive(Debug, Default)]
struct Geometry {
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
}

/// A mesh whose GPU resources have not been created yet
#[derive(Debug)]
struct PendingMesh {
    name: String,
    node: NodeIndex,
    primitives: Vec<Primitive>,
}

/// The node tree before any GPU resource exists
struct NodeTree {
    nodes: Vec<SceneNode>,
    roots: Vec<NodeIndex>,
    meshes: Vec<PendingMesh>,
    /// Source node index to arena index
    lookup: HashMap<usize, NodeIndex>,
}

/// Parses glTF assets into [`SceneGraph`]s
#[derive(Debug)]
pub struct SceneGraphLoader<'a, D: Device> {
    context: &'a GraphicsContext<D>,
    settings: LoadSettings,
}

impl<'a, D: Device> SceneGraphLoader<'a, D> {
    pub fn new(context: &'a GraphicsContext<D>, settings: LoadSettings) -> Self {
        Self { context, settings }
    }

    pub fn settings(&self) -> &LoadSettings {
        &self.settings
    }

    /// Loads a `.gltf` or `.glb` file, external buffers and images resolve next to it
    pub fn load(&self, path: &Path) -> Result<SceneGraph<D>> {
        let bytes = std::fs::read(path).inspect_err(|err| {
            error!(path = %path.display(), %err, "Failed to read asset");
        })?;
        info!(path = %path.display(), "Loading scene graph");
        self.load_slice(&bytes, path.parent())
    }

    /// Loads an asset already in memory, relative URIs resolve against `base`
    pub fn load_slice(&self, bytes: &[u8], base: Option<&Path>) -> Result<SceneGraph<D>> {
        self.load_document(bytes, base)
            .inspect_err(|err| error!(%err, "Failed to load scene graph"))
    }

    fn load_document(&self, bytes: &[u8], base: Option<&Path>) -> Result<SceneGraph<D>> {
        let gltf = gltf::Gltf::from_slice_without_validation(bytes)?;
        validate(&gltf)?;
        for extension in gltf.extensions_used() {
            if extension == "KHR_materials_pbrSpecularGlossiness" {
                warn!(
                    "Specular glossiness materials are not supported, \
                     falling back to metallic roughness"
                );
            } else {
                warn!(extension, "glTF extension is not implemented, ignoring it");
            }
        }
        let buffers = load_buffers(&gltf, base)?;

        let images = self.load_images(&gltf, &buffers, base)?;
        let samplers = self.load_samplers(&gltf)?;
        let textures = self.load_textures(&gltf, images.len() - 1, samplers.len() - 1);

        let mut materials: Vec<Material> = gltf
            .materials()
            .map(|material| Material::from_gltf(&material))
            .collect();
        let default_material = materials.len();
        materials.push(Material::default());

        let mut geometry = Geometry::default();
        let mut tree = self.load_nodes(&gltf, &buffers, &mut geometry, default_material)?;
        let skins = load_skins(&gltf, &buffers, &tree.lookup)?;
        let animations = load_animations(&gltf, &buffers, &tree.lookup);

        node::propagate_world(&mut tree.nodes, &tree.roots);
        self.post_process(&mut tree, &materials, &mut geometry);
        let dimensions = self.dimensions(&tree);

        let vertices = self.upload_geometry(
            "vertices",
            bytemuck::cast_slice(&geometry.vertices),
            vk::BufferUsageFlags::VERTEX_BUFFER,
        )?;
        let indices = self.upload_geometry(
            "indices",
            bytemuck::cast_slice(&geometry.indices),
            vk::BufferUsageFlags::INDEX_BUFFER,
        )?;

        let mut meshes = tree
            .meshes
            .into_iter()
            .map(|pending| {
                Mesh::new(
                    self.context.device().clone(),
                    pending.name,
                    pending.node,
                    pending.primitives,
                )
            })
            .collect::<skein_gpu::Result<Vec<_>>>()?;

        let mut graph = SceneGraph {
            meshes: Vec::new(),
            nodes: tree.nodes,
            roots: tree.roots,
            materials: Vec::new(),
            textures,
            skins,
            animations,
            images,
            samplers,
            vertices,
            indices,
            vertex_count: geometry.vertices.len() as u32,
            index_count: geometry.indices.len() as u32,
            descriptors: None,
            dimensions,
        };
        graph.descriptors = Some(self.create_descriptors(&graph, &mut meshes, &mut materials)?);
        graph.meshes = meshes;
        graph.materials = materials;
        graph.update()?;

        info!(
            nodes = graph.nodes.len(),
            meshes = graph.meshes.len(),
            materials = graph.materials.len(),
            textures = graph.textures.len(),
            skins = graph.skins.len(),
            animations = graph.animations.len(),
            vertices = graph.vertex_count,
            indices = graph.index_count,
            "Loaded scene graph"
        );
        Ok(graph)
    }

    fn load_images(
        &self,
        gltf: &gltf::Gltf,
        buffers: &[Vec<u8>],
        base: Option<&Path>,
    ) -> Result<Vec<Image<D>>> {
        let uploader = self.context.uploader();
        let mut images = Vec::new();
        if !self
            .settings
            .file_flags
            .contains(FileLoadingFlags::DONT_LOAD_IMAGES)
        {
            for image in gltf.images() {
                let bytes: Cow<[u8]> = match image.source() {
                    gltf::image::Source::View { view, .. } => {
                        let buffer = view.buffer().index();
                        Cow::Borrowed(
                            buffers
                                .get(buffer)
                                .and_then(|data| {
                                    data.get(view.offset()..view.offset() + view.length())
                                })
                                .ok_or(AssetError::MissingBuffer(buffer))?,
                        )
                    }
                    gltf::image::Source::Uri { uri, .. } => {
                        Cow::Owned(texture::read_uri(uri, base)?)
                    }
                };
                let name = image
                    .name()
                    .map(|name| name.to_string())
                    .unwrap_or_else(|| format!("image_{}", image.index()));
                images.push(DecodedImage::decode(&bytes)?.upload(uploader, &name)?);
            }
        }
        images.push(DecodedImage::placeholder().upload(uploader, "placeholder")?);
        Ok(images)
    }

    /// One sampler per source sampler, followed by the default sampler
    fn load_samplers(&self, gltf: &gltf::Gltf) -> Result<Vec<Sampler<D>>> {
        let device = self.context.device();
        let mut samplers = gltf
            .samplers()
            .map(|sampler| Sampler::new(device.clone(), texture::sampler_desc(&sampler)))
            .collect::<skein_gpu::Result<Vec<_>>>()?;
        samplers.push(Sampler::new(device.clone(), Default::default())?);
        Ok(samplers)
    }

    fn load_textures(
        &self,
        gltf: &gltf::Gltf,
        placeholder: usize,
        default_sampler: usize,
    ) -> Vec<Texture> {
        let skip_images = self
            .settings
            .file_flags
            .contains(FileLoadingFlags::DONT_LOAD_IMAGES);
        gltf.textures()
            .map(|texture| Texture {
                image: if skip_images {
                    placeholder
                } else {
                    texture.source().index()
                },
                sampler: texture.sampler().index().unwrap_or(default_sampler),
            })
            .collect()
    }

    /// Walks the scene's node tree with an explicit stack, decoding every mesh it meets
    fn load_nodes(
        &self,
        gltf: &gltf::Gltf,
        buffers: &[Vec<u8>],
        geometry: &mut Geometry,
        default_material: usize,
    ) -> Result<NodeTree> {
        let scene = gltf
            .default_scene()
            .or_else(|| gltf.scenes().next())
            .ok_or(AssetError::NoScene)?;
        let mut tree = NodeTree {
            nodes: Vec::new(),
            roots: Vec::new(),
            meshes: Vec::new(),
            lookup: HashMap::new(),
        };

        let roots: Vec<gltf::Node> = scene.nodes().collect();
        let mut stack: Vec<(gltf::Node, Option<NodeIndex>, usize)> =
            roots.into_iter().rev().map(|node| (node, None, 1)).collect();
        while let Some((source, parent, depth)) = stack.pop() {
            if depth > self.settings.max_node_depth {
                return Err(AssetError::NodeDepthExceeded(self.settings.max_node_depth));
            }
            if tree.lookup.contains_key(&source.index()) {
                return Err(AssetError::InvalidNodeReference(source.index()));
            }

            let index = tree.nodes.len();
            let name = source
                .name()
                .map(|name| name.to_string())
                .unwrap_or_else(|| format!("node_{}", source.index()));
            let mut node = SceneNode::new(source.index(), name);
            match source.transform() {
                gltf::scene::Transform::Matrix { matrix } => {
                    node.matrix = glam::Mat4::from_cols_array_2d(&matrix);
                }
                gltf::scene::Transform::Decomposed {
                    translation,
                    rotation,
                    scale,
                } => {
                    node.translation = glam::Vec3::from_array(translation);
                    node.rotation = glam::Quat::from_array(rotation);
                    node.scale = glam::Vec3::from_array(scale);
                }
            }
            node.parent = parent;
            node.skin = source.skin().map(|skin| skin.index());

            if let Some(mesh) = source.mesh() {
                let primitives = load_primitives(&mesh, buffers, geometry, default_material)?;
                node.mesh = Some(tree.meshes.len());
                tree.meshes.push(PendingMesh {
                    name: mesh
                        .name()
                        .map(|name| name.to_string())
                        .unwrap_or_else(|| format!("mesh_{}", mesh.index())),
                    node: index,
                    primitives,
                });
            }

            match parent {
                Some(parent) => tree.nodes[parent].children.push(index),
                None => tree.roots.push(index),
            }
            tree.lookup.insert(source.index(), index);
            tree.nodes.push(node);

            let children: Vec<gltf::Node> = source.children().collect();
            stack.extend(
                children
                    .into_iter()
                    .rev()
                    .map(|child| (child, Some(index), depth + 1)),
            );
        }
        Ok(tree)
    }

    /// Runs the optional vertex passes, then refreshes every primitive's bounds from its vertices
    fn post_process(&self, tree: &mut NodeTree, materials: &[Material], geometry: &mut Geometry) {
        let flags = self.settings.file_flags;
        let pre_transform = flags.contains(FileLoadingFlags::PRE_TRANSFORM_VERTICES);
        let flip_y = flags.contains(FileLoadingFlags::FLIP_Y);
        let pre_multiply = flags.contains(FileLoadingFlags::PRE_MULTIPLY_VERTEX_COLORS);
        if !(pre_transform || flip_y || pre_multiply) {
            return;
        }
        for mesh in &mut tree.meshes {
            let world = tree.nodes[mesh.node].world_matrix();
            let normal_matrix = glam::Mat3::from_mat4(world).inverse().transpose();
            for primitive in &mut mesh.primitives {
                let start = primitive.first_vertex as usize;
                let end = start + primitive.vertex_count as usize;
                let color_factor = materials
                    .get(primitive.material)
                    .map(|material| material.base_color_factor)
                    .unwrap_or(glam::Vec4::ONE);
                let vertices = &mut geometry.vertices[start..end];
                for vertex in vertices.iter_mut() {
                    if pre_transform {
                        vertex.pos = world.transform_point3(vertex.pos);
                        vertex.normal = (normal_matrix * vertex.normal).normalize_or_zero();
                    }
                    if flip_y {
                        vertex.pos.y = -vertex.pos.y;
                        vertex.normal.y = -vertex.normal.y;
                    }
                    if pre_multiply {
                        vertex.color *= color_factor;
                    }
                }
                if let Some(bounds) =
                    BoundingBox::from_points(vertices.iter().map(|vertex| vertex.pos))
                {
                    primitive.bounds = bounds;
                }
            }
        }
        debug!(?flags, "Applied vertex passes");
    }

    /// World space bounds of every primitive, vertices already hold world positions once baked
    fn dimensions(&self, tree: &NodeTree) -> Option<BoundingBox> {
        let baked = self
            .settings
            .file_flags
            .contains(FileLoadingFlags::PRE_TRANSFORM_VERTICES);
        tree.meshes
            .iter()
            .flat_map(|mesh| {
                let world = if baked {
                    glam::Mat4::IDENTITY
                } else {
                    tree.nodes[mesh.node].world_matrix()
                };
                mesh.primitives
                    .iter()
                    .map(move |primitive| primitive.bounds.transformed(world))
            })
            .reduce(BoundingBox::merge)
    }

    fn upload_geometry(
        &self,
        name: &str,
        data: &[u8],
        usage: vk::BufferUsageFlags,
    ) -> Result<Option<Buffer<D>>> {
        if data.is_empty() {
            return Ok(None);
        }
        let location = self.settings.geometry_location;
        let buffer = if location.is_host_visible() {
            let buffer = Buffer::new(
                self.context.device().clone(),
                &BufferDesc {
                    name,
                    size: data.len() as vk::DeviceSize,
                    usage,
                    location,
                },
            )?;
            buffer.write(0, data)?;
            buffer
        } else {
            self.context.uploader().upload_buffer(name, data, usage)?
        };
        Ok(Some(buffer))
    }

    /// Sizes one pool for the asset and allocates every node and material set from it
    fn create_descriptors(
        &self,
        graph: &SceneGraph<D>,
        meshes: &mut [Mesh<D>],
        materials: &mut [Material],
    ) -> Result<DescriptorAllocator<D>> {
        let binding_flags = self.settings.binding_flags;
        let image_bindings = binding_flags.binding_count();
        let image_sets = if image_bindings > 0 {
            materials
                .iter()
                .filter(|material| material.base_color_texture.is_some())
                .count() as u32
        } else {
            0
        };
        let counts = DescriptorCounts {
            uniform_buffers: meshes.len() as u32,
            image_sets,
            image_bindings,
        };
        let mut descriptors = DescriptorAllocator::new(self.context, counts)?;

        for mesh in meshes.iter_mut() {
            let set = descriptors.allocate_node_set(mesh.uniform())?;
            mesh.set_descriptor_set(set);
        }
        if image_sets > 0 {
            for material in materials
                .iter_mut()
                .filter(|material| material.base_color_texture.is_some())
            {
                let bindings = binding_flags
                    .iter()
                    .filter_map(|flag| {
                        let texture = if flag == DescriptorBindingFlags::IMAGE_BASE_COLOR {
                            material.base_color_texture
                        } else {
                            material.normal_texture
                        };
                        graph.texture_binding(texture.map(|texture| texture.texture))
                    })
                    .collect::<Vec<_>>();
                material.descriptor_set = Some(descriptors.allocate_material_set(&bindings)?);
            }
        }
        debug!(?counts, allocated = descriptors.allocated(), "Allocated scene descriptor sets");
        Ok(descriptors)
    }
}

/// Validates the document the way `gltf` does, except that required extensions without an
/// implementation are only warned about
fn validate(gltf: &gltf::Gltf) -> Result<()> {
    use gltf::json::validation::{Error, Validate};

    let root = gltf.document.as_json();
    let mut errors = Vec::new();
    root.validate(root, gltf::json::Path::new, &mut |path, error| {
        errors.push((path(), error))
    });
    errors.retain(|(path, error)| {
        let unsupported = matches!(error, Error::Unsupported)
            && path.as_str().starts_with("extensionsRequired");
        if unsupported {
            warn!(%path, "Required glTF extension is not implemented, loading without it");
        }
        !unsupported
    });
    if errors.is_empty() {
        Ok(())
    } else {
        Err(gltf::Error::Validation(errors).into())
    }
}

fn load_buffers(gltf: &gltf::Gltf, base: Option<&Path>) -> Result<Vec<Vec<u8>>> {
    gltf.buffers()
        .map(|buffer| match buffer.source() {
            gltf::buffer::Source::Bin => gltf
                .blob
                .clone()
                .ok_or(AssetError::MissingBuffer(buffer.index())),
            gltf::buffer::Source::Uri(uri) => {
                let data = texture::read_uri(uri, base)?;
                if data.len() < buffer.length() {
                    return Err(AssetError::MissingBuffer(buffer.index()));
                }
                Ok(data)
            }
        })
        .collect()
}

fn load_primitives(
    mesh: &gltf::Mesh,
    buffers: &[Vec<u8>],
    geometry: &mut Geometry,
    default_material: usize,
) -> Result<Vec<Primitive>> {
    let mut primitives = Vec::new();
    for primitive in mesh.primitives() {
        if primitive.mode() != gltf::mesh::Mode::Triangles {
            warn!(
                mesh = mesh.index(),
                primitive = primitive.index(),
                mode = ?primitive.mode(),
                "Primitive is not a triangle list, it will be drawn as one"
            );
        }
        let reader =
            primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| data.as_slice()));
        let positions: Vec<glam::Vec3> = reader
            .read_positions()
            .ok_or(AssetError::MissingPosition {
                mesh: mesh.index(),
                primitive: primitive.index(),
            })?
            .map(glam::Vec3::from_array)
            .collect();

        let mut vertices: Vec<Vertex> = positions
            .iter()
            .map(|pos| Vertex {
                pos: *pos,
                ..Default::default()
            })
            .collect();
        if let Some(normals) = reader.read_normals() {
            for (vertex, normal) in vertices.iter_mut().zip(normals) {
                vertex.normal = glam::Vec3::from_array(normal).normalize_or_zero();
            }
        }
        if let Some(uvs) = reader.read_tex_coords(0) {
            for (vertex, uv) in vertices.iter_mut().zip(uvs.into_f32()) {
                vertex.uv = glam::Vec2::from_array(uv);
            }
        }
        if let Some(colors) = reader.read_colors(0) {
            for (vertex, color) in vertices.iter_mut().zip(colors.into_rgba_f32()) {
                vertex.color = glam::Vec4::from_array(color);
            }
        }
        if let Some(tangents) = reader.read_tangents() {
            for (vertex, tangent) in vertices.iter_mut().zip(tangents) {
                vertex.tangent = glam::Vec4::from_array(tangent);
            }
        }
        if let Some(joints) = reader.read_joints(0) {
            for (vertex, joint) in vertices.iter_mut().zip(joints.into_u16()) {
                vertex.joint0 = glam::Vec4::from_array(joint.map(f32::from));
            }
        }
        if let Some(weights) = reader.read_weights(0) {
            for (vertex, weight) in vertices.iter_mut().zip(weights.into_f32()) {
                vertex.weight0 = glam::Vec4::from_array(weight);
            }
        }

        let first_vertex = geometry.vertices.len() as u32;
        let first_index = geometry.indices.len() as u32;
        match primitive.indices() {
            Some(accessor) => {
                let data_type = accessor.data_type();
                if !matches!(data_type, DataType::U8 | DataType::U16 | DataType::U32) {
                    return Err(AssetError::UnsupportedIndexType {
                        accessor: accessor.index(),
                        data_type,
                    });
                }
                let indices = reader
                    .read_indices()
                    .ok_or(AssetError::AccessorOutOfBounds(accessor.index()))?;
                match indices {
                    gltf::mesh::util::ReadIndices::U8(iter) => geometry
                        .indices
                        .extend(iter.map(|index| index as u32 + first_vertex)),
                    gltf::mesh::util::ReadIndices::U16(iter) => geometry
                        .indices
                        .extend(iter.map(|index| index as u32 + first_vertex)),
                    gltf::mesh::util::ReadIndices::U32(iter) => geometry
                        .indices
                        .extend(iter.map(|index| index + first_vertex)),
                }
            }
            None => geometry
                .indices
                .extend((0..vertices.len() as u32).map(|index| index + first_vertex)),
        }

        primitives.push(Primitive {
            first_index,
            index_count: geometry.indices.len() as u32 - first_index,
            first_vertex,
            vertex_count: vertices.len() as u32,
            material: primitive.material().index().unwrap_or(default_material),
            bounds: BoundingBox::from_points(positions)
                .unwrap_or(BoundingBox::new(glam::Vec3::ZERO, glam::Vec3::ZERO)),
        });
        geometry.vertices.extend(vertices);
    }
    Ok(primitives)
}

/// Skins are read after the node tree so their joints resolve to arena indices
fn load_skins(
    gltf: &gltf::Gltf,
    buffers: &[Vec<u8>],
    lookup: &HashMap<usize, NodeIndex>,
) -> Result<Vec<Skin>> {
    gltf.skins()
        .map(|skin| {
            let joints = skin
                .joints()
                .map(|joint| {
                    lookup
                        .get(&joint.index())
                        .copied()
                        .ok_or(AssetError::InvalidNodeReference(joint.index()))
                })
                .collect::<Result<Vec<_>>>()?;
            let reader =
                skin.reader(|buffer| buffers.get(buffer.index()).map(|data| data.as_slice()));
            let inverse_bind_matrices = match reader.read_inverse_bind_matrices() {
                Some(matrices) => matrices
                    .map(|matrix| glam::Mat4::from_cols_array_2d(&matrix))
                    .collect(),
                None => vec![glam::Mat4::IDENTITY; joints.len()],
            };
            if joints.len() > MAX_NUM_JOINTS {
                warn!(
                    skin = skin.index(),
                    joints = joints.len(),
                    max = MAX_NUM_JOINTS,
                    "Skin has more joints than a mesh uniform holds, extra joints are ignored"
                );
            }
            Ok(Skin {
                name: skin
                    .name()
                    .map(|name| name.to_string())
                    .unwrap_or_else(|| format!("skin_{}", skin.index())),
                skeleton_root: skin
                    .skeleton()
                    .and_then(|root| lookup.get(&root.index()).copied()),
                joints,
                inverse_bind_matrices,
            })
        })
        .collect()
}

/// Reads a sampler's keyframes, three component outputs are padded to four
fn load_keyframes(sampler: &gltf::animation::Sampler, buffers: &[Vec<u8>]) -> KeyframeSampler {
    let get_buffer_data =
        |buffer: gltf::Buffer| buffers.get(buffer.index()).map(|data| data.as_slice());
    let inputs: Vec<f32> = gltf::accessor::Iter::<f32>::new(sampler.input(), get_buffer_data)
        .map(|iter| iter.collect())
        .unwrap_or_default();
    let output = sampler.output();
    let outputs: Vec<glam::Vec4> = match (output.data_type(), output.dimensions()) {
        (DataType::F32, Dimensions::Scalar) => {
            gltf::accessor::Iter::<f32>::new(output, get_buffer_data)
                .map(|iter| iter.map(|value| glam::Vec4::new(value, 0.0, 0.0, 0.0)).collect())
                .unwrap_or_default()
        }
        (DataType::F32, Dimensions::Vec3) => {
            gltf::accessor::Iter::<[f32; 3]>::new(output, get_buffer_data)
                .map(|iter| iter.map(|value| glam::Vec3::from_array(value).extend(0.0)).collect())
                .unwrap_or_default()
        }
        (DataType::F32, Dimensions::Vec4) => {
            gltf::accessor::Iter::<[f32; 4]>::new(output, get_buffer_data)
                .map(|iter| iter.map(glam::Vec4::from_array).collect())
                .unwrap_or_default()
        }
        (DataType::F32, dimensions) => {
            warn!(accessor = output.index(), ?dimensions, "Unsupported animation output type");
            Vec::new()
        }
        (data_type, _) => {
            let err = AssetError::UnsupportedComponentType {
                accessor: output.index(),
                data_type,
            };
            warn!(%err, "Animation output cannot be sampled, dropping it");
            Vec::new()
        }
    };
    KeyframeSampler {
        interpolation: sampler.interpolation().into(),
        inputs,
        outputs,
    }
}

/// Animations are read last, channels that cannot be played are dropped with a warning
fn load_animations(
    gltf: &gltf::Gltf,
    buffers: &[Vec<u8>],
    lookup: &HashMap<usize, NodeIndex>,
) -> Vec<Animation> {
    gltf.animations()
        .map(|animation| {
            let name = animation
                .name()
                .map(|name| name.to_string())
                .unwrap_or_else(|| format!("animation_{}", animation.index()));

            let mut keys: Vec<(usize, usize, Interpolation)> = Vec::new();
            let mut samplers = Vec::new();
            for sampler in animation.samplers() {
                keys.push((
                    sampler.input().index(),
                    sampler.output().index(),
                    sampler.interpolation().into(),
                ));
                let keyframes = load_keyframes(&sampler, buffers);
                if keyframes.outputs.is_empty() {
                    warn!(animation = %name, "Animation sampler has no outputs");
                }
                samplers.push(keyframes);
            }

            let start = samplers
                .iter()
                .filter_map(|sampler: &KeyframeSampler| sampler.inputs.first().copied())
                .reduce(f32::min)
                .unwrap_or(0.0);
            let end = samplers
                .iter()
                .filter_map(|sampler: &KeyframeSampler| sampler.inputs.last().copied())
                .reduce(f32::max)
                .unwrap_or(0.0);

            let mut channels = Vec::new();
            for channel in animation.channels() {
                let target = channel.target();
                let path = match target.property() {
                    gltf::animation::Property::Translation => ChannelPath::Translation,
                    gltf::animation::Property::Rotation => ChannelPath::Rotation,
                    gltf::animation::Property::Scale => ChannelPath::Scale,
                    gltf::animation::Property::MorphTargetWeights => {
                        warn!(
                            animation = %name,
                            "Morph target weight channels are not supported, skipping"
                        );
                        continue;
                    }
                };
                let Some(node) = lookup.get(&target.node().index()).copied() else {
                    warn!(
                        animation = %name,
                        node = target.node().index(),
                        "Channel targets a node outside the scene, skipping"
                    );
                    continue;
                };
                let source = channel.sampler();
                let key = (
                    source.input().index(),
                    source.output().index(),
                    Interpolation::from(source.interpolation()),
                );
                let Some(sampler) = keys.iter().position(|candidate| *candidate == key) else {
                    warn!(animation = %name, "Channel sampler could not be resolved, skipping");
                    continue;
                };
                if !samplers[sampler].is_complete() {
                    warn!(
                        animation = %name,
                        sampler,
                        "Sampler has fewer outputs than keyframes, skipping channel"
                    );
                    continue;
                }
                channels.push(AnimationChannel {
                    path,
                    node,
                    sampler,
                });
            }

            debug!(animation = %name, start, end, channels = channels.len(), "Loaded animation");
            Animation {
                name,
                start,
                end,
                channels,
                samplers,
            }
        })
        .collect()
}
