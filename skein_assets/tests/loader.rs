mod common;

use base64::Engine;
use common::*;
use serde_json::json;
use skein_assets::{
    AlphaMode, AssetError, DescriptorBindingFlags, FileLoadingFlags, LoadSettings, Vertex,
};
use skein_gpu::descriptor::DescriptorCounts;
use skein_gpu::device::{DescriptorResource, MemoryLocation};

fn index_data(
    device: &skein_gpu::device::HeadlessDevice,
    buffer: skein_gpu::ash::vk::Buffer,
) -> Vec<u32> {
    device
        .buffer_contents(buffer)
        .unwrap()
        .chunks_exact(4)
        .map(|bytes| u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        .collect()
}

#[test]
fn primitive_without_material_uses_appended_default() {
    let (device, context) = context();
    let graph = load(&context, &triangle_asset(), LoadSettings::default()).unwrap();

    assert_eq!(graph.materials().len(), 1);
    let default = &graph.materials()[0];
    assert_eq!(default.alpha_mode, AlphaMode::Opaque);
    assert_eq!(default.base_color_factor, glam::Vec4::ONE);

    assert_eq!(graph.nodes().len(), 1);
    assert_eq!(graph.roots(), &[0]);
    assert_eq!(graph.meshes().len(), 1);
    let primitive = &graph.meshes()[0].primitives[0];
    assert_eq!(primitive.material, 0);
    assert_eq!(primitive.index_count, 3);
    assert_eq!((graph.vertex_count(), graph.index_count()), (3, 3));

    let indices = index_data(&device, graph.index_buffer().unwrap().handle());
    assert_eq!(indices, vec![0, 1, 2]);
    let vertices = device
        .buffer_contents(graph.vertex_buffer().unwrap().handle())
        .unwrap();
    assert_eq!(vertices.len(), 3 * std::mem::size_of::<Vertex>());
}

#[test]
fn unimplemented_required_extensions_still_load() {
    let (_device, context) = context();
    let mut document: serde_json::Value = serde_json::from_slice(&triangle_asset()).unwrap();
    let object = document.as_object_mut().unwrap();
    object.insert(
        "extensionsUsed".into(),
        json!(["KHR_materials_pbrSpecularGlossiness", "EXT_meshopt_compression"]),
    );
    object.insert(
        "extensionsRequired".into(),
        json!(["KHR_materials_pbrSpecularGlossiness"]),
    );

    let graph = load(
        &context,
        &serde_json::to_vec(&document).unwrap(),
        LoadSettings::default(),
    )
    .unwrap();
    assert_eq!(graph.meshes().len(), 1);
    assert_eq!(graph.meshes()[0].primitives[0].index_count, 3);
}

#[test]
fn other_validation_errors_still_fail() {
    let (_device, context) = context();
    let mut document: serde_json::Value = serde_json::from_slice(&triangle_asset()).unwrap();
    document["nodes"][0]["mesh"] = json!(4);

    let err = load(
        &context,
        &serde_json::to_vec(&document).unwrap(),
        LoadSettings::default(),
    )
    .err()
    .unwrap();
    assert!(matches!(err, AssetError::Gltf(gltf::Error::Validation(_))), "{err}");
}

#[test]
fn every_index_width_is_rebased() {
    let (device, context) = context();
    let mut builder = AssetBuilder::default();
    let mut primitives = Vec::new();
    for component_type in [UNSIGNED_BYTE, UNSIGNED_SHORT, UNSIGNED_INT] {
        let positions = builder.vec3(&TRIANGLE);
        let indices = builder.indices(component_type, &[2, 1, 0]);
        primitives.push(json!({ "attributes": { "POSITION": positions }, "indices": indices }));
    }
    let positions = builder.vec3(&TRIANGLE);
    primitives.push(json!({ "attributes": { "POSITION": positions } }));
    let asset = builder.build(json!({
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "mesh": 0 }],
        "meshes": [{ "primitives": primitives }],
    }));

    let graph = load(&context, &asset, LoadSettings::default()).unwrap();
    let indices = index_data(&device, graph.index_buffer().unwrap().handle());
    assert_eq!(indices, vec![2, 1, 0, 5, 4, 3, 8, 7, 6, 9, 10, 11]);

    let primitives = &graph.meshes()[0].primitives;
    assert_eq!(primitives.len(), 4);
    for (slot, primitive) in primitives.iter().enumerate() {
        assert_eq!(primitive.first_index, slot as u32 * 3);
        assert_eq!(primitive.first_vertex, slot as u32 * 3);
    }
}

#[test]
fn missing_position_fails_the_load() {
    let (_device, context) = context();
    let mut builder = AssetBuilder::default();
    let normals = builder.vec3(&[[0.0, 0.0, 1.0]; 3]);
    let asset = builder.build(json!({
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "mesh": 0 }],
        "meshes": [{ "primitives": [{ "attributes": { "NORMAL": normals } }] }],
    }));

    let err = load(&context, &asset, LoadSettings::default())
        .err()
        .unwrap();
    assert!(
        matches!(err, AssetError::MissingPosition { .. } | AssetError::Gltf(_)),
        "{err}"
    );
}

#[test]
fn matrix_and_decomposed_nodes_agree() {
    let (_device, context) = context();
    let transform = glam::Mat4::from_scale_rotation_translation(
        glam::Vec3::splat(2.0),
        glam::Quat::from_rotation_z(0.5),
        glam::Vec3::new(1.0, 2.0, 3.0),
    );
    let (scale, rotation, translation) = transform.to_scale_rotation_translation();
    let asset = AssetBuilder::default().build(json!({
        "scenes": [{ "nodes": [0, 1] }],
        "nodes": [
            { "name": "matrix", "matrix": transform.to_cols_array() },
            {
                "name": "decomposed",
                "translation": translation.to_array(),
                "rotation": rotation.to_array(),
                "scale": scale.to_array(),
            },
        ],
    }));

    let graph = load(&context, &asset, LoadSettings::default()).unwrap();
    let matrix = graph.node(graph.node_by_name("matrix").unwrap()).unwrap();
    let decomposed = graph.node(graph.node_by_name("decomposed").unwrap()).unwrap();
    assert_eq!(matrix.translation, glam::Vec3::ZERO);
    assert_eq!(matrix.rotation, glam::Quat::IDENTITY);
    assert!(
        matrix
            .world_matrix()
            .abs_diff_eq(decomposed.world_matrix(), 1e-5)
    );
    assert!(graph.meshes().is_empty());
    assert!(graph.vertex_buffer().is_none());
    assert!(graph.dimensions().is_none());
}

#[test]
fn every_node_has_one_parent_and_composed_world() {
    let (_device, context) = context();
    let asset = AssetBuilder::default().build(json!({
        "scenes": [{ "nodes": [0, 3] }],
        "nodes": [
            { "name": "a", "translation": [1.0, 0.0, 0.0], "children": [1, 2] },
            { "name": "b", "rotation": [0.0, 0.38268343, 0.0, 0.9238795], "children": [4] },
            { "name": "c", "scale": [2.0, 2.0, 2.0] },
            { "name": "d", "translation": [0.0, 0.0, -4.0] },
            { "name": "e", "translation": [0.0, 3.0, 0.0] },
        ],
    }));

    let graph = load(&context, &asset, LoadSettings::default()).unwrap();
    assert_eq!(graph.nodes().len(), 5);
    assert_eq!(graph.roots().len(), 2);
    for (index, node) in graph.nodes().iter().enumerate() {
        match node.parent {
            Some(parent) => {
                let parent = graph.node(parent).unwrap();
                assert_eq!(
                    parent.children.iter().filter(|child| **child == index).count(),
                    1
                );
                assert!(
                    node.world_matrix()
                        .abs_diff_eq(parent.world_matrix() * node.local_matrix(), 1e-5)
                );
            }
            None => {
                assert!(graph.roots().contains(&index));
                assert_eq!(node.world_matrix(), node.local_matrix());
            }
        }
    }
    let e = graph.node(graph.node_by_name("e").unwrap()).unwrap();
    assert_eq!(e.index, 4);
    assert_eq!(graph.node_by_source_index(4), graph.node_by_name("e"));
}

#[test]
fn shared_children_are_rejected() {
    let (_device, context) = context();
    let asset = AssetBuilder::default().build(json!({
        "scenes": [{ "nodes": [0, 1] }],
        "nodes": [{ "children": [1] }, {}],
    }));
    let err = load(&context, &asset, LoadSettings::default())
        .err()
        .unwrap();
    assert!(
        matches!(err, AssetError::InvalidNodeReference(1) | AssetError::Gltf(_)),
        "{err}"
    );
}

#[test]
fn deep_hierarchies_are_capped() {
    let (_device, context) = context();
    let asset = AssetBuilder::default().build(json!({
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "children": [1] }, { "children": [2] }, { "children": [3] }, {}],
    }));
    let err = load(&context, &asset, LoadSettings::default().max_node_depth(2))
        .err()
        .unwrap();
    assert!(matches!(err, AssetError::NodeDepthExceeded(2)), "{err}");
    assert!(load(&context, &asset, LoadSettings::default().max_node_depth(4)).is_ok());
}

#[test]
fn vertex_passes_bake_flip_and_tint() {
    let (_device, context) = context();
    let mut builder = AssetBuilder::default();
    let positions = builder.vec3(&TRIANGLE);
    let normals = builder.vec3(&[[0.0, 1.0, 0.0]; 3]);
    let asset = builder.build(json!({
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "mesh": 0, "translation": [0.0, 5.0, 0.0] }],
        "meshes": [{
            "primitives": [{
                "attributes": { "POSITION": positions, "NORMAL": normals },
                "material": 0,
            }],
        }],
        "materials": [{ "pbrMetallicRoughness": { "baseColorFactor": [0.5, 0.25, 1.0, 1.0] } }],
    }));

    let settings = LoadSettings::default()
        .file_flags(
            FileLoadingFlags::PRE_TRANSFORM_VERTICES
                | FileLoadingFlags::FLIP_Y
                | FileLoadingFlags::PRE_MULTIPLY_VERTEX_COLORS,
        )
        .geometry_location(MemoryLocation::CpuToGpu);
    let graph = load(&context, &asset, settings).unwrap();

    let buffer = graph.vertex_buffer().unwrap();
    let mut bytes = vec![0u8; buffer.size() as usize];
    buffer.read(0, &mut bytes).unwrap();
    let vertices: Vec<Vertex> = bytes
        .chunks_exact(std::mem::size_of::<Vertex>())
        .map(bytemuck::pod_read_unaligned)
        .collect();
    assert_eq!(vertices[1].pos, glam::Vec3::new(1.0, -5.0, 0.0));
    assert_eq!(vertices[2].pos, glam::Vec3::new(0.0, -6.0, 0.0));
    assert_eq!(vertices[0].normal, glam::Vec3::new(0.0, -1.0, 0.0));
    assert_eq!(vertices[0].color, glam::Vec4::new(0.5, 0.25, 1.0, 1.0));

    let dimensions = graph.dimensions().unwrap();
    assert_eq!(dimensions.min, glam::Vec3::new(0.0, -6.0, 0.0));
    assert_eq!(dimensions.max, glam::Vec3::new(1.0, -5.0, 0.0));
}

#[test]
fn descriptor_pool_is_sized_from_meshes_and_textured_materials() {
    let (device, context) = context();
    let mut builder = AssetBuilder::default();
    let positions = builder.vec3(&TRIANGLE);
    let asset = builder.build(json!({
        "scenes": [{ "nodes": [0, 1] }],
        "nodes": [{ "mesh": 0 }, { "mesh": 1 }],
        "meshes": [
            { "primitives": [{ "attributes": { "POSITION": positions }, "material": 0 }] },
            { "primitives": [{ "attributes": { "POSITION": positions }, "material": 1 }] },
        ],
        "materials": [
            { "pbrMetallicRoughness": { "baseColorTexture": { "index": 0 } } },
            { "alphaMode": "BLEND" },
        ],
        "textures": [{ "source": 0 }],
        "images": [{ "uri": "never_read.png" }],
    }));

    let settings = LoadSettings::default()
        .file_flags(FileLoadingFlags::DONT_LOAD_IMAGES)
        .binding_flags(
            DescriptorBindingFlags::IMAGE_BASE_COLOR | DescriptorBindingFlags::IMAGE_NORMAL_MAP,
        );
    let graph = load(&context, &asset, settings).unwrap();

    let allocator = graph.descriptor_allocator().unwrap();
    assert_eq!(
        allocator.counts(),
        DescriptorCounts {
            uniform_buffers: 2,
            image_sets: 1,
            image_bindings: 2,
        }
    );
    assert_eq!(allocator.allocated(), 3);

    let textured = &graph.materials()[0];
    let writes = device
        .descriptor_writes(textured.descriptor_set.unwrap())
        .unwrap();
    assert_eq!(writes.len(), 2);
    let placeholder = graph.images().last().unwrap().view();
    for write in writes {
        assert!(matches!(
            write.resource,
            DescriptorResource::CombinedImageSampler { view, .. } if view == placeholder
        ));
    }
    assert!(graph.materials()[1].descriptor_set.is_none());
    assert_eq!(graph.materials()[1].alpha_mode, AlphaMode::Blend);

    for mesh in graph.meshes() {
        let writes = device.descriptor_writes(mesh.descriptor_set()).unwrap();
        assert!(matches!(
            writes[0].resource,
            DescriptorResource::Buffer { buffer, .. } if buffer == mesh.uniform().handle()
        ));
    }
}

#[test]
fn embedded_png_is_uploaded_with_a_mip_chain() {
    let (device, context) = context();
    let mut png = Vec::new();
    image::RgbaImage::from_pixel(4, 4, image::Rgba([200, 100, 50, 255]))
        .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .unwrap();

    let mut builder = AssetBuilder::default();
    let positions = builder.vec3(&TRIANGLE);
    let mut asset: serde_json::Value = serde_json::from_slice(&builder.build(json!({
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "mesh": 0 }],
        "meshes": [{ "primitives": [{ "attributes": { "POSITION": positions }, "material": 0 }] }],
        "materials": [{ "pbrMetallicRoughness": { "baseColorTexture": { "index": 0 } } }],
        "textures": [{ "source": 0, "sampler": 0 }],
        "samplers": [{ "magFilter": 9728, "wrapS": 33071 }],
    })))
    .unwrap();
    let encoded = base64::engine::general_purpose::STANDARD.encode(&png);
    asset["images"] = json!([{ "uri": format!("data:image/png;base64,{encoded}") }]);
    let asset = serde_json::to_vec(&asset).unwrap();

    let graph = load(&context, &asset, LoadSettings::default()).unwrap();
    assert_eq!(graph.images().len(), 2);
    let image = &graph.images()[0];
    assert_eq!(device.image_mip_levels(image.handle()), Some(3));
    assert_eq!(
        device.image_contents(image.handle(), 0).unwrap()[..4],
        [200, 100, 50, 255]
    );
    assert_eq!(graph.textures()[0].sampler, 0);

    let (view, sampler) = graph.texture_binding(Some(0)).unwrap();
    assert_eq!(view, image.view());
    assert_ne!(sampler, graph.texture_binding(None).unwrap().1);
}

#[test]
fn dropping_the_graph_releases_everything() {
    let (device, context) = context();
    {
        let _graph = load(&context, &triangle_asset(), LoadSettings::default()).unwrap();
        assert!(device.live_objects() > 0);
    }
    drop(context);
    assert_eq!(device.live_objects(), 0);
}
