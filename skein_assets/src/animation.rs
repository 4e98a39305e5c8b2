//! Keyframe animation.
//!
//! Time is never clamped or wrapped: a channel whose keyframes do not bracket the requested
//! time leaves its node untouched, so the node keeps whatever pose it had.

use crate::node::{NodeIndex, SceneNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    Linear,
    Step,
    CubicSpline,
}

impl From<gltf::animation::Interpolation> for Interpolation {
    fn from(value: gltf::animation::Interpolation) -> Self {
        match value {
            gltf::animation::Interpolation::Linear => Interpolation::Linear,
            gltf::animation::Interpolation::Step => Interpolation::Step,
            gltf::animation::Interpolation::CubicSpline => Interpolation::CubicSpline,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelPath {
    Translation,
    Rotation,
    Scale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnimationChannel {
    pub path: ChannelPath,
    pub node: NodeIndex,
    /// Index into the owning animation's samplers
    pub sampler: usize,
}

/// Keyframe times and their values, three values per key for cubic splines
/// (in tangent, value, out tangent)
#[derive(Debug, Clone, PartialEq)]
pub struct KeyframeSampler {
    pub interpolation: Interpolation,
    /// Ascending
    pub inputs: Vec<f32>,
    /// Three component outputs are padded with a zero `w`
    pub outputs: Vec<glam::Vec4>,
}

impl KeyframeSampler {
    fn values_per_key(&self) -> usize {
        match self.interpolation {
            Interpolation::CubicSpline => 3,
            _ => 1,
        }
    }

    /// Whether every input has its outputs
    pub fn is_complete(&self) -> bool {
        !self.inputs.is_empty() && self.outputs.len() >= self.inputs.len() * self.values_per_key()
    }

    /// First keyframe interval containing `time` and the factor inside it
    pub fn interval(&self, time: f32) -> Option<(usize, f32)> {
        self.inputs.windows(2).enumerate().find_map(|(index, keys)| {
            if time < keys[0] || time > keys[1] {
                return None;
            }
            let span = keys[1] - keys[0];
            let u = if span > 0.0 {
                ((time - keys[0]) / span).clamp(0.0, 1.0)
            } else {
                0.0
            };
            Some((index, u))
        })
    }

    /// Key a step sampler holds, the right key once `time` reaches it
    fn step_key(key: usize, u: f32) -> usize {
        if u >= 1.0 { key + 1 } else { key }
    }

    fn value(&self, key: usize) -> glam::Vec4 {
        self.outputs[key * self.values_per_key() + self.values_per_key() / 2]
    }

    fn hermite(&self, key: usize, u: f32) -> glam::Vec4 {
        let span = self.inputs[key + 1] - self.inputs[key];
        let v0 = self.outputs[key * 3 + 1];
        let out_tangent = self.outputs[key * 3 + 2] * span;
        let in_tangent = self.outputs[(key + 1) * 3] * span;
        let v1 = self.outputs[(key + 1) * 3 + 1];

        let u2 = u * u;
        let u3 = u2 * u;
        v0 * (2.0 * u3 - 3.0 * u2 + 1.0)
            + out_tangent * (u3 - 2.0 * u2 + u)
            + v1 * (-2.0 * u3 + 3.0 * u2)
            + in_tangent * (u3 - u2)
    }

    /// Component wise value at `time`, `None` outside every interval
    pub fn sample_vec(&self, time: f32) -> Option<glam::Vec4> {
        let (key, u) = self.interval(time)?;
        Some(match self.interpolation {
            Interpolation::Linear => self.value(key).lerp(self.value(key + 1), u),
            Interpolation::Step => self.value(Self::step_key(key, u)),
            Interpolation::CubicSpline => self.hermite(key, u),
        })
    }

    /// Normalized rotation at `time`, `None` outside every interval
    pub fn sample_rotation(&self, time: f32) -> Option<glam::Quat> {
        let (key, u) = self.interval(time)?;
        let rotation = match self.interpolation {
            Interpolation::Linear => {
                let q0 = glam::Quat::from_vec4(self.value(key));
                let q1 = glam::Quat::from_vec4(self.value(key + 1));
                q0.slerp(q1, u)
            }
            Interpolation::Step => glam::Quat::from_vec4(self.value(Self::step_key(key, u))),
            Interpolation::CubicSpline => glam::Quat::from_vec4(self.hermite(key, u)),
        };
        Some(rotation.normalize())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Animation {
    pub name: String,
    pub start: f32,
    pub end: f32,
    pub channels: Vec<AnimationChannel>,
    pub samplers: Vec<KeyframeSampler>,
}

impl Animation {
    /// Writes every channel's value at `time` into its node's local transform.
    ///
    /// Returns the number of channels that produced a value.
    pub fn apply(&self, nodes: &mut [SceneNode], time: f32) -> usize {
        let mut updated = 0;
        for channel in &self.channels {
            let Some(sampler) = self.samplers.get(channel.sampler) else {
                continue;
            };
            if !sampler.is_complete() {
                continue;
            }
            let node = &mut nodes[channel.node];
            match channel.path {
                ChannelPath::Translation => {
                    let Some(value) = sampler.sample_vec(time) else {
                        continue;
                    };
                    node.translation = value.truncate();
                }
                ChannelPath::Scale => {
                    let Some(value) = sampler.sample_vec(time) else {
                        continue;
                    };
                    node.scale = value.truncate();
                }
                ChannelPath::Rotation => {
                    let Some(rotation) = sampler.sample_rotation(time) else {
                        continue;
                    };
                    node.rotation = rotation;
                }
            }
            updated += 1;
        }
        updated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rotation_animation(q0: glam::Quat, q1: glam::Quat) -> Animation {
        Animation {
            name: "spin".into(),
            start: 0.0,
            end: 1.0,
            channels: vec![AnimationChannel {
                path: ChannelPath::Rotation,
                node: 0,
                sampler: 0,
            }],
            samplers: vec![KeyframeSampler {
                interpolation: Interpolation::Linear,
                inputs: vec![0.0, 1.0],
                outputs: vec![glam::Vec4::from(q0), glam::Vec4::from(q1)],
            }],
        }
    }

    #[test]
    fn linear_rotation_slerps_halfway() {
        let q0 = glam::Quat::IDENTITY;
        let q1 = glam::Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);
        let animation = rotation_animation(q0, q1);
        let mut nodes = vec![SceneNode::new(0, "target".into())];

        assert_eq!(animation.apply(&mut nodes, 0.5), 1);
        let expected = q0.slerp(q1, 0.5).normalize();
        assert!(nodes[0].rotation.abs_diff_eq(expected, 1e-6));
    }

    #[test]
    fn time_past_the_last_key_is_not_extrapolated() {
        let q1 = glam::Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);
        let animation = rotation_animation(glam::Quat::IDENTITY, q1);
        let mut nodes = vec![SceneNode::new(0, "target".into())];
        let prior = glam::Quat::from_rotation_x(0.3);
        nodes[0].rotation = prior;

        assert_eq!(animation.apply(&mut nodes, 1.5), 0);
        assert_eq!(nodes[0].rotation, prior);
        assert_eq!(animation.apply(&mut nodes, -0.5), 0);
        assert_eq!(nodes[0].rotation, prior);
    }

    #[test]
    fn step_holds_the_left_key() {
        let sampler = KeyframeSampler {
            interpolation: Interpolation::Step,
            inputs: vec![0.0, 1.0, 2.0],
            outputs: vec![glam::Vec4::ZERO, glam::Vec4::ONE, glam::Vec4::splat(2.0)],
        };
        assert_eq!(sampler.sample_vec(0.99), Some(glam::Vec4::ZERO));
        assert_eq!(sampler.sample_vec(1.5), Some(glam::Vec4::ONE));
    }

    #[test]
    fn step_takes_the_key_it_lands_on() {
        let sampler = KeyframeSampler {
            interpolation: Interpolation::Step,
            inputs: vec![0.0, 1.0, 2.0],
            outputs: vec![glam::Vec4::ZERO, glam::Vec4::ONE, glam::Vec4::splat(2.0)],
        };
        assert_eq!(sampler.sample_vec(0.0), Some(glam::Vec4::ZERO));
        assert_eq!(sampler.sample_vec(1.0), Some(glam::Vec4::ONE));
        assert_eq!(sampler.sample_vec(2.0), Some(glam::Vec4::splat(2.0)));

        let q1 = glam::Quat::from_rotation_z(1.0);
        let rotations = KeyframeSampler {
            interpolation: Interpolation::Step,
            inputs: vec![0.0, 1.0],
            outputs: vec![glam::Vec4::from(glam::Quat::IDENTITY), glam::Vec4::from(q1)],
        };
        assert!(rotations.sample_rotation(1.0).unwrap().abs_diff_eq(q1, 1e-6));
    }

    #[test]
    fn cubic_spline_hits_keys_and_uses_tangents() {
        let sampler = KeyframeSampler {
            interpolation: Interpolation::CubicSpline,
            inputs: vec![0.0, 2.0],
            outputs: vec![
                glam::Vec4::ZERO,
                glam::Vec4::ZERO,
                glam::Vec4::ZERO,
                glam::Vec4::ZERO,
                glam::Vec4::splat(4.0),
                glam::Vec4::ZERO,
            ],
        };
        assert_eq!(sampler.sample_vec(0.0), Some(glam::Vec4::ZERO));
        assert_eq!(sampler.sample_vec(2.0), Some(glam::Vec4::splat(4.0)));
        // flat tangents give the smoothstep curve
        assert_eq!(sampler.sample_vec(1.0), Some(glam::Vec4::splat(2.0)));
    }

    #[test]
    fn incomplete_samplers_are_ignored() {
        let mut animation = rotation_animation(glam::Quat::IDENTITY, glam::Quat::IDENTITY);
        animation.samplers[0].outputs.truncate(1);
        let mut nodes = vec![SceneNode::new(0, "target".into())];
        assert!(!animation.samplers[0].is_complete());
        assert_eq!(animation.apply(&mut nodes, 0.5), 0);
    }

    #[test]
    fn translation_lerps() {
        let animation = Animation {
            name: "move".into(),
            start: 0.0,
            end: 1.0,
            channels: vec![AnimationChannel {
                path: ChannelPath::Translation,
                node: 0,
                sampler: 0,
            }],
            samplers: vec![KeyframeSampler {
                interpolation: Interpolation::Linear,
                inputs: vec![0.0, 1.0],
                outputs: vec![glam::Vec4::ZERO, glam::Vec4::new(2.0, 4.0, 6.0, 0.0)],
            }],
        };
        let mut nodes = vec![SceneNode::new(0, "target".into())];
        animation.apply(&mut nodes, 0.25);
        assert_eq!(nodes[0].translation, glam::Vec3::new(0.5, 1.0, 1.5));
    }
}
