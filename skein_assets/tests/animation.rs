mod common;

use common::*;
use serde_json::json;
use skein_assets::{ChannelPath, LoadSettings};

fn spin_asset(q0: glam::Quat, q1: glam::Quat) -> Vec<u8> {
    let mut builder = AssetBuilder::default();
    let positions = builder.vec3(&TRIANGLE);
    let times = builder.scalars(&[0.0, 1.0]);
    let rotations = builder.vec4(&[q0.to_array(), q1.to_array()]);
    let weights = builder.scalars(&[0.0, 1.0]);
    builder.build(json!({
        "scenes": [{ "nodes": [0] }],
        "nodes": [
            { "name": "pivot", "children": [1] },
            { "name": "blade", "translation": [0.0, 2.0, 0.0], "mesh": 0 },
        ],
        "meshes": [{ "primitives": [{ "attributes": { "POSITION": positions } }] }],
        "animations": [{
            "name": "spin",
            "samplers": [
                { "input": times, "output": rotations },
                { "input": times, "output": weights },
            ],
            "channels": [
                { "sampler": 0, "target": { "node": 0, "path": "rotation" } },
                { "sampler": 1, "target": { "node": 1, "path": "weights" } },
            ],
        }],
    }))
}

#[test]
fn rotation_slerps_and_is_not_extrapolated() {
    let (_device, context) = context();
    let q0 = glam::Quat::IDENTITY;
    let q1 = glam::Quat::from_rotation_z(std::f32::consts::FRAC_PI_2);
    let mut graph = load(&context, &spin_asset(q0, q1), LoadSettings::default()).unwrap();

    let spin = graph.animation_by_name("spin").unwrap();
    let animation = &graph.animations()[spin];
    assert_eq!((animation.start, animation.end), (0.0, 1.0));
    assert_eq!(animation.channels.len(), 1);
    assert_eq!(animation.channels[0].path, ChannelPath::Rotation);

    assert_eq!(graph.advance(spin, 0.5).unwrap(), 1);
    let pivot = graph.node_by_name("pivot").unwrap();
    let expected = q0.slerp(q1, 0.5).normalize();
    assert!(graph.node(pivot).unwrap().rotation.abs_diff_eq(expected, 1e-6));

    assert_eq!(graph.advance(spin, 1.5).unwrap(), 0);
    assert!(graph.node(pivot).unwrap().rotation.abs_diff_eq(expected, 1e-6));
    assert_eq!(graph.advance(spin, -0.5).unwrap(), 0);
    assert!(graph.node(pivot).unwrap().rotation.abs_diff_eq(expected, 1e-6));
}

#[test]
fn advancing_propagates_worlds_into_mesh_uniforms() {
    let (_device, context) = context();
    let q1 = glam::Quat::from_rotation_z(std::f32::consts::FRAC_PI_2);
    let mut graph = load(
        &context,
        &spin_asset(glam::Quat::IDENTITY, q1),
        LoadSettings::default(),
    )
    .unwrap();

    graph.advance(0, 1.0).unwrap();
    let blade = graph.node(graph.node_by_name("blade").unwrap()).unwrap();
    let pivot = graph.node(blade.parent.unwrap()).unwrap();
    assert!(
        blade
            .world_matrix()
            .abs_diff_eq(pivot.world_matrix() * blade.local_matrix(), 1e-6)
    );
    let origin = blade.world_matrix().transform_point3(glam::Vec3::ZERO);
    assert!(origin.abs_diff_eq(glam::Vec3::new(-2.0, 0.0, 0.0), 1e-5));

    let uniform = graph.meshes()[0].read_uniform().unwrap();
    assert!(uniform.matrix.abs_diff_eq(blade.world_matrix(), 1e-6));
    assert_eq!(uniform.joint_count, 0.0);
}

#[test]
fn samplers_short_of_outputs_are_dropped() {
    let (_device, context) = context();
    let mut builder = AssetBuilder::default();
    let times = builder.scalars(&[0.0, 1.0, 2.0]);
    let translations = builder.vec3(&[[0.0; 3], [1.0; 3]]);
    let asset = builder.build(json!({
        "scenes": [{ "nodes": [0] }],
        "nodes": [{}],
        "animations": [{
            "samplers": [{ "input": times, "output": translations }],
            "channels": [{ "sampler": 0, "target": { "node": 0, "path": "translation" } }],
        }],
    }));

    let mut graph = load(&context, &asset, LoadSettings::default()).unwrap();
    assert!(graph.animations()[0].channels.is_empty());
    assert!(!graph.animations()[0].samplers[0].is_complete());
    assert_eq!(graph.advance(0, 0.5).unwrap(), 0);
    assert_eq!(graph.node(0).unwrap().translation, glam::Vec3::ZERO);
    assert_eq!(graph.advance(7, 0.5).unwrap(), 0);
}

#[test]
fn integer_outputs_are_dropped_without_failing_the_load() {
    let (_device, context) = context();
    let mut builder = AssetBuilder::default();
    let times = builder.scalars(&[0.0, 1.0]);
    let rotations = builder.normalized_vec4(&[[0, 0, 0, u16::MAX], [0, 0, u16::MAX, 0]]);
    let translations = builder.vec3(&[[0.0; 3], [2.0; 3]]);
    let asset = builder.build(json!({
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "name": "hinge" }],
        "animations": [{
            "samplers": [
                { "input": times, "output": rotations },
                { "input": times, "output": translations },
            ],
            "channels": [
                { "sampler": 0, "target": { "node": 0, "path": "rotation" } },
                { "sampler": 1, "target": { "node": 0, "path": "translation" } },
            ],
        }],
    }));

    let mut graph = load(&context, &asset, LoadSettings::default()).unwrap();
    let animation = &graph.animations()[0];
    assert!(animation.samplers[0].outputs.is_empty());
    assert_eq!(animation.channels.len(), 1);
    assert_eq!(animation.channels[0].path, ChannelPath::Translation);
    assert_eq!(graph.advance(0, 0.5).unwrap(), 1);
    let hinge = graph.node(0).unwrap();
    assert_eq!(hinge.rotation, glam::Quat::IDENTITY);
    assert_eq!(hinge.translation, glam::Vec3::ONE);
}

#[test]
fn step_and_cubic_samplers_load() {
    let (_device, context) = context();
    let mut builder = AssetBuilder::default();
    let times = builder.scalars(&[0.0, 2.0]);
    let steps = builder.vec3(&[[1.0; 3], [3.0; 3]]);
    let cubic = builder.vec3(&[[0.0; 3], [0.0; 3], [0.0; 3], [0.0; 3], [4.0; 3], [0.0; 3]]);
    let asset = builder.build(json!({
        "scenes": [{ "nodes": [0, 1] }],
        "nodes": [{ "name": "stepped" }, { "name": "smooth" }],
        "animations": [{
            "samplers": [
                { "input": times, "output": steps, "interpolation": "STEP" },
                { "input": times, "output": cubic, "interpolation": "CUBICSPLINE" },
            ],
            "channels": [
                { "sampler": 0, "target": { "node": 0, "path": "scale" } },
                { "sampler": 1, "target": { "node": 1, "path": "translation" } },
            ],
        }],
    }));

    let mut graph = load(&context, &asset, LoadSettings::default()).unwrap();
    assert_eq!(graph.advance(0, 1.0).unwrap(), 2);
    let stepped = graph.node(graph.node_by_name("stepped").unwrap()).unwrap();
    assert_eq!(stepped.scale, glam::Vec3::ONE);
    let smooth = graph.node(graph.node_by_name("smooth").unwrap()).unwrap();
    assert_eq!(smooth.translation, glam::Vec3::splat(2.0));
}

/// Mesh node 0 skinned by the joint chain 1 -> 2
fn skinned_asset(inverse_binds: [glam::Mat4; 2]) -> Vec<u8> {
    let mut builder = AssetBuilder::default();
    let positions = builder.vec3(&TRIANGLE);
    let joints = builder.joints(&[[0, 1, 0, 0]; 3]);
    let weights = builder.vec4(&[[0.5, 0.5, 0.0, 0.0]; 3]);
    let inverse_binds = builder.mat4(&inverse_binds);
    let times = builder.scalars(&[0.0, 1.0]);
    let rotations = builder.vec4(&[
        glam::Quat::IDENTITY.to_array(),
        glam::Quat::from_rotation_x(1.0).to_array(),
    ]);
    builder.build(json!({
        "scenes": [{ "nodes": [0, 1] }],
        "nodes": [
            { "name": "body", "mesh": 0, "skin": 0, "translation": [2.0, 0.0, 0.0] },
            { "name": "hip", "translation": [0.0, 1.0, 0.0], "children": [2] },
            { "name": "knee", "translation": [0.0, -0.5, 0.0] },
        ],
        "meshes": [{
            "primitives": [{
                "attributes": { "POSITION": positions, "JOINTS_0": joints, "WEIGHTS_0": weights },
            }],
        }],
        "skins": [{ "joints": [1, 2], "inverseBindMatrices": inverse_binds, "skeleton": 1 }],
        "animations": [{
            "samplers": [{ "input": times, "output": rotations }],
            "channels": [{ "sampler": 0, "target": { "node": 1, "path": "rotation" } }],
        }],
    }))
}

#[test]
fn joint_matrices_follow_the_skeleton() {
    let (_device, context) = context();
    let inverse_binds = [
        glam::Mat4::from_translation(glam::Vec3::new(0.0, -1.0, 0.0)),
        glam::Mat4::from_translation(glam::Vec3::new(0.0, -0.5, 0.0)),
    ];
    let mut graph = load(&context, &skinned_asset(inverse_binds), LoadSettings::default()).unwrap();

    let skin = &graph.skins()[0];
    assert_eq!(skin.joints.len(), 2);
    assert_eq!(skin.skeleton_root, graph.node_by_name("hip"));
    assert_eq!(skin.inverse_bind_matrices, inverse_binds.to_vec());

    let check = |graph: &skein_assets::SceneGraph<skein_gpu::device::HeadlessDevice>| {
        let body = graph.node(graph.node_by_name("body").unwrap()).unwrap();
        let uniform = graph.meshes()[body.mesh.unwrap()].read_uniform().unwrap();
        assert_eq!(uniform.joint_count, 2.0);
        let inverse_world = body.world_matrix().inverse();
        for (slot, name) in ["hip", "knee"].into_iter().enumerate() {
            let joint = graph.node(graph.node_by_name(name).unwrap()).unwrap();
            let expected = inverse_world * joint.world_matrix() * inverse_binds[slot];
            assert!(uniform.joint_matrix[slot].abs_diff_eq(expected, 1e-5));
        }
        assert_eq!(uniform.joint_matrix[2], glam::Mat4::ZERO);
    };

    check(&graph);
    assert_eq!(graph.advance(0, 0.75).unwrap(), 1);
    check(&graph);
}

#[test]
fn inverse_binds_default_to_identity() {
    let (_device, context) = context();
    let mut builder = AssetBuilder::default();
    let positions = builder.vec3(&TRIANGLE);
    let asset = builder.build(json!({
        "scenes": [{ "nodes": [0, 1] }],
        "nodes": [
            { "mesh": 0, "skin": 0 },
            { "translation": [0.0, 3.0, 0.0] },
        ],
        "meshes": [{ "primitives": [{ "attributes": { "POSITION": positions } }] }],
        "skins": [{ "joints": [1] }],
    }));

    let graph = load(&context, &asset, LoadSettings::default()).unwrap();
    assert_eq!(graph.skins()[0].inverse_bind_matrices, vec![glam::Mat4::IDENTITY]);
    let uniform = graph.meshes()[0].read_uniform().unwrap();
    assert_eq!(uniform.joint_count, 1.0);
    assert_eq!(
        uniform.joint_matrix[0],
        glam::Mat4::from_translation(glam::Vec3::new(0.0, 3.0, 0.0))
    );
}
