#![allow(dead_code)]

use std::sync::Arc;

use base64::Engine;
use serde_json::{Value, json};
use skein_assets::{LoadSettings, SceneGraph, SceneGraphLoader};
use skein_gpu::GraphicsContext;
use skein_gpu::device::HeadlessDevice;

pub const UNSIGNED_BYTE: u32 = 5121;
pub const UNSIGNED_SHORT: u32 = 5123;
pub const UNSIGNED_INT: u32 = 5125;
pub const FLOAT: u32 = 5126;

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

pub fn load(
    context: &GraphicsContext<HeadlessDevice>,
    asset: &[u8],
    settings: LoadSettings,
) -> skein_assets::Result<SceneGraph<HeadlessDevice>> {
    SceneGraphLoader::new(context, settings).load_slice(asset, None)
}

/// Assembles a glTF document whose single buffer is embedded as a data URI
#[derive(Debug, Default)]
pub struct AssetBuilder {
    bin: Vec<u8>,
    views: Vec<Value>,
    accessors: Vec<Value>,
}

impl AssetBuilder {
    fn push_view(&mut self, bytes: &[u8]) -> usize {
        while self.bin.len() % 4 != 0 {
            self.bin.push(0);
        }
        self.views.push(json!({
            "buffer": 0,
            "byteOffset": self.bin.len(),
            "byteLength": bytes.len(),
        }));
        self.bin.extend_from_slice(bytes);
        self.views.len() - 1
    }

    /// Float accessor with its min and max, `ty` is the glTF element type
    pub fn floats(&mut self, ty: &str, components: usize, data: &[f32]) -> usize {
        let view = self.push_view(bytemuck::cast_slice(data));
        let mut min = vec![f32::MAX; components];
        let mut max = vec![f32::MIN; components];
        for element in data.chunks(components) {
            for (component, value) in element.iter().enumerate() {
                min[component] = min[component].min(*value);
                max[component] = max[component].max(*value);
            }
        }
        self.accessors.push(json!({
            "bufferView": view,
            "componentType": FLOAT,
            "count": data.len() / components,
            "type": ty,
            "min": min,
            "max": max,
        }));
        self.accessors.len() - 1
    }

    pub fn vec3(&mut self, data: &[[f32; 3]]) -> usize {
        self.floats("VEC3", 3, bytemuck::cast_slice(data))
    }

    pub fn vec4(&mut self, data: &[[f32; 4]]) -> usize {
        self.floats("VEC4", 4, bytemuck::cast_slice(data))
    }

    pub fn scalars(&mut self, data: &[f32]) -> usize {
        self.floats("SCALAR", 1, data)
    }

    pub fn mat4(&mut self, data: &[glam::Mat4]) -> usize {
        let flat: Vec<f32> = data.iter().flat_map(|matrix| matrix.to_cols_array()).collect();
        self.floats("MAT4", 16, &flat)
    }

    /// Index accessor stored with `component_type`
    pub fn indices(&mut self, component_type: u32, data: &[u32]) -> usize {
        let bytes: Vec<u8> = match component_type {
            UNSIGNED_BYTE => data.iter().map(|index| *index as u8).collect(),
            UNSIGNED_SHORT => data
                .iter()
                .flat_map(|index| (*index as u16).to_le_bytes())
                .collect(),
            _ => data.iter().flat_map(|index| index.to_le_bytes()).collect(),
        };
        let view = self.push_view(&bytes);
        self.accessors.push(json!({
            "bufferView": view,
            "componentType": component_type,
            "count": data.len(),
            "type": "SCALAR",
        }));
        self.accessors.len() - 1
    }

    /// Normalized unsigned short VEC4 accessor, as used for compressed rotations
    pub fn normalized_vec4(&mut self, data: &[[u16; 4]]) -> usize {
        let view = self.push_view(bytemuck::cast_slice(data));
        self.accessors.push(json!({
            "bufferView": view,
            "componentType": UNSIGNED_SHORT,
            "normalized": true,
            "count": data.len(),
            "type": "VEC4",
        }));
        self.accessors.len() - 1
    }

    /// Unsigned byte joint indices
    pub fn joints(&mut self, data: &[[u8; 4]]) -> usize {
        let view = self.push_view(bytemuck::cast_slice(data));
        self.accessors.push(json!({
            "bufferView": view,
            "componentType": UNSIGNED_BYTE,
            "count": data.len(),
            "type": "VEC4",
        }));
        self.accessors.len() - 1
    }

    /// Finishes the document, `document` holds everything but buffers, views and accessors
    pub fn build(self, mut document: Value) -> Vec<u8> {
        let object = document.as_object_mut().unwrap();
        object.insert("asset".into(), json!({ "version": "2.0" }));
        if !self.bin.is_empty() {
            let encoded = base64::engine::general_purpose::STANDARD.encode(&self.bin);
            object.insert(
                "buffers".into(),
                json!([{
                    "byteLength": self.bin.len(),
                    "uri": format!("data:application/octet-stream;base64,{encoded}"),
                }]),
            );
            object.insert("bufferViews".into(), Value::Array(self.views));
            object.insert("accessors".into(), Value::Array(self.accessors));
        }
        serde_json::to_vec(&document).unwrap()
    }
}

pub const TRIANGLE: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];

/// One root node owning one mesh with one indexed triangle and no material
pub fn triangle_asset() -> Vec<u8> {
    let mut builder = AssetBuilder::default();
    let positions = builder.vec3(&TRIANGLE);
    let indices = builder.indices(UNSIGNED_SHORT, &[0, 1, 2]);
    builder.build(json!({
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "name": "triangle", "mesh": 0 }],
        "meshes": [{
            "primitives": [{ "attributes": { "POSITION": positions }, "indices": indices }],
        }],
    }))
}
