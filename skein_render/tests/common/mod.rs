#![allow(dead_code)]

use std::sync::Arc;

use base64::Engine;
use serde_json::{Value, json};
use skein_assets::{LoadSettings, SceneGraph, SceneGraphLoader};
use skein_gpu::GraphicsContext;
use skein_gpu::device::HeadlessDevice;
use skein_render::{CameraUniform, FrameScheduler, RendererSettings};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn context() -> (Arc<HeadlessDevice>, GraphicsContext<HeadlessDevice>) {
    init_tracing();
    let device = Arc::new(HeadlessDevice::new());
    let context = GraphicsContext::new(device.clone()).unwrap();
    (device, context)
}

/// Scheduler prepared against the default 1280x720 headless surface
pub fn scheduler(
    context: &GraphicsContext<HeadlessDevice>,
    settings: RendererSettings,
) -> FrameScheduler<HeadlessDevice> {
    let mut scheduler = FrameScheduler::new(context, settings).unwrap();
    scheduler.prepare(1280, 720).unwrap();
    scheduler
}

/// Looking down -Z at the origin from five units away
pub fn camera() -> CameraUniform {
    CameraUniform::look_at(
        glam::Vec3::new(0.0, 0.0, 5.0),
        glam::Vec3::ZERO,
        std::f32::consts::FRAC_PI_3,
        1280.0 / 720.0,
        0.1,
        100.0,
    )
}

pub const TRIANGLE: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];

/// One root node per placement, each with its own single triangle mesh.
///
/// A placement is a translation and the material its primitive uses.
pub fn triangles_asset(placements: &[([f32; 3], Option<usize>)], materials: Value) -> Vec<u8> {
    let mut bin: Vec<u8> = bytemuck::cast_slice(&TRIANGLE).to_vec();
    let index_offset = bin.len();
    bin.extend(
        [0u16, 1, 2, 0]
            .iter()
            .flat_map(|index| index.to_le_bytes()),
    );
    let encoded = base64::engine::general_purpose::STANDARD.encode(&bin);

    let nodes: Vec<Value> = placements
        .iter()
        .enumerate()
        .map(|(index, (translation, _))| {
            json!({ "name": format!("node_{index}"), "mesh": index, "translation": translation })
        })
        .collect();
    let meshes: Vec<Value> = placements
        .iter()
        .map(|(_, material)| {
            let mut primitive = json!({ "attributes": { "POSITION": 0 }, "indices": 1 });
            if let Some(material) = material {
                primitive["material"] = json!(material);
            }
            json!({ "primitives": [primitive] })
        })
        .collect();

    let mut document = json!({
        "asset": { "version": "2.0" },
        "scene": 0,
        "scenes": [{ "nodes": (0..placements.len()).collect::<Vec<_>>() }],
        "nodes": nodes,
        "meshes": meshes,
        "buffers": [{
            "byteLength": bin.len(),
            "uri": format!("data:application/octet-stream;base64,{encoded}"),
        }],
        "bufferViews": [
            { "buffer": 0, "byteOffset": 0, "byteLength": index_offset },
            { "buffer": 0, "byteOffset": index_offset, "byteLength": 6 },
        ],
        "accessors": [
            {
                "bufferView": 0,
                "componentType": 5126,
                "count": 3,
                "type": "VEC3",
                "min": [0.0, 0.0, 0.0],
                "max": [1.0, 1.0, 0.0],
            },
            { "bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR" },
        ],
    });
    if materials.as_array().is_some_and(|materials| !materials.is_empty()) {
        document["materials"] = materials;
    }
    serde_json::to_vec(&document).unwrap()
}

pub fn load(
    context: &GraphicsContext<HeadlessDevice>,
    asset: &[u8],
) -> SceneGraph<HeadlessDevice> {
    SceneGraphLoader::new(context, LoadSettings::default())
        .load_slice(asset, None)
        .unwrap()
}

/// A single triangle at the origin with the default material
pub fn triangle_scene(context: &GraphicsContext<HeadlessDevice>) -> SceneGraph<HeadlessDevice> {
    load(context, &triangles_asset(&[([0.0; 3], None)], json!([])))
}
