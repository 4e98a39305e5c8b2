use bytemuck::{Pod, Zeroable};

/// Contents of a frame slot's uniform buffer, bound at set 0
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CameraUniform {
    pub projection: glam::Mat4,
    pub view: glam::Mat4,
    /// World space position, `w` is always 1
    pub position: glam::Vec4,
}

impl Default for CameraUniform {
    fn default() -> Self {
        Self::new(glam::Mat4::IDENTITY, glam::Mat4::IDENTITY)
    }
}

impl CameraUniform {
    /// The camera position is recovered from the view matrix
    pub fn new(projection: glam::Mat4, view: glam::Mat4) -> Self {
        let position = view.inverse().w_axis;
        Self {
            projection,
            view,
            position: position / position.w,
        }
    }

    /// Right handed perspective with Vulkan's downward Y and `[0, 1]` depth
    pub fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> glam::Mat4 {
        let mut projection = glam::Mat4::perspective_rh(fov_y, aspect, near, far);
        projection.y_axis.y *= -1.0;
        projection
    }

    pub fn look_at(
        eye: glam::Vec3,
        target: glam::Vec3,
        fov_y: f32,
        aspect: f32,
        near: f32,
        far: f32,
    ) -> Self {
        Self::new(
            Self::perspective(fov_y, aspect, near, far),
            glam::Mat4::look_at_rh(eye, target, glam::Vec3::Y),
        )
    }

    pub fn view_projection(&self) -> glam::Mat4 {
        self.projection * self.view
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_comes_from_the_view() {
        let eye = glam::Vec3::new(1.0, 2.0, 5.0);
        let camera = CameraUniform::look_at(eye, glam::Vec3::ZERO, 1.0, 1.5, 0.1, 100.0);
        assert!(camera.position.truncate().abs_diff_eq(eye, 1e-5));
        assert_eq!(camera.position.w, 1.0);
        assert_eq!(std::mem::size_of::<CameraUniform>(), 144);
    }

    #[test]
    fn projection_flips_y() {
        let projection = CameraUniform::perspective(1.0, 1.0, 0.1, 10.0);
        let up = projection.project_point3(glam::Vec3::new(0.0, 1.0, -2.0));
        assert!(up.y < 0.0);
        assert!((0.0..=1.0).contains(&up.z));
    }
}
