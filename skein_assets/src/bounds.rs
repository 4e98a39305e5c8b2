use glam::Vec4Swizzles;

/// Axis aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: glam::Vec3,
    pub max: glam::Vec3,
}

impl BoundingBox {
    /// Given 2 vectors, it will automatically determine the bounding boxes of the 2
    pub fn new(v1: glam::Vec3, v2: glam::Vec3) -> Self {
        Self {
            min: v1.min(v2),
            max: v2.max(v1),
        }
    }

    /// Smallest box holding every point, `None` if there are no points
    pub fn from_points<I: IntoIterator<Item = glam::Vec3>>(points: I) -> Option<Self> {
        points.into_iter().fold(None, |bounds: Option<Self>, point| {
            Some(match bounds {
                Some(bounds) => bounds.grow(point),
                None => Self::new(point, point),
            })
        })
    }

    pub fn grow(self, point: glam::Vec3) -> Self {
        Self {
            min: self.min.min(point),
            max: self.max.max(point),
        }
    }

    pub fn merge(self, other: Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn size(&self) -> glam::Vec3 {
        self.max - self.min
    }

    pub fn center(&self) -> glam::Vec3 {
        (self.min + self.max) * 0.5
    }

    fn corners(&self) -> [glam::Vec3; 8] {
        [
            glam::Vec3::new(self.min.x, self.min.y, self.min.z),
            glam::Vec3::new(self.min.x, self.min.y, self.max.z),
            glam::Vec3::new(self.min.x, self.max.y, self.min.z),
            glam::Vec3::new(self.min.x, self.max.y, self.max.z),
            glam::Vec3::new(self.max.x, self.min.y, self.min.z),
            glam::Vec3::new(self.max.x, self.min.y, self.max.z),
            glam::Vec3::new(self.max.x, self.max.y, self.min.z),
            glam::Vec3::new(self.max.x, self.max.y, self.max.z),
        ]
    }

    /// Box around the eight transformed corners
    pub fn transformed(&self, matrix: glam::Mat4) -> Self {
        let corners = self.corners().map(|corner| matrix.transform_point3(corner));
        let mut bounds = Self::new(corners[0], corners[0]);
        for corner in &corners[1..] {
            bounds = bounds.grow(*corner);
        }
        bounds
    }

    /// Conservative clip space test, depth is expected in `[0, 1]`
    pub fn visible_in_frustum(&self, model_transform: glam::Mat4, view_proj: glam::Mat4) -> bool {
        let matrix = view_proj * model_transform;
        let mut min = glam::Vec3::splat(1.5);
        let mut max = glam::Vec3::splat(-1.5);

        for vertex in self.corners() {
            let v = matrix * glam::Vec4::from((vertex, 1.0));
            // behind the eye, the projected point is meaningless
            if v.w <= f32::EPSILON {
                return true;
            }
            let v = v.xyz() / v.w;
            min = min.min(v);
            max = max.max(v);
        }

        !(min.z > 1.0 || max.z < 0.0 || min.x > 1.0 || max.x < -1.0 || min.y > 1.0 || max.y < -1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_orders_corners() {
        let bounds = BoundingBox::new(
            glam::Vec3::new(1.0, -1.0, 2.0),
            glam::Vec3::new(-1.0, 1.0, 0.0),
        );
        assert_eq!(bounds.min, glam::Vec3::new(-1.0, -1.0, 0.0));
        assert_eq!(bounds.max, glam::Vec3::new(1.0, 1.0, 2.0));
    }

    #[test]
    fn translation_moves_box() {
        let bounds = BoundingBox::new(glam::Vec3::ZERO, glam::Vec3::ONE)
            .transformed(glam::Mat4::from_translation(glam::Vec3::X * 5.0));
        assert_eq!(bounds.min, glam::Vec3::new(5.0, 0.0, 0.0));
        assert_eq!(bounds.max, glam::Vec3::new(6.0, 1.0, 1.0));
    }

    #[test]
    fn frustum_culls_box_behind_camera_plane() {
        let projection = glam::Mat4::perspective_rh(1.0, 1.0, 0.1, 100.0);
        let view = glam::Mat4::look_at_rh(
            glam::Vec3::new(0.0, 0.0, 5.0),
            glam::Vec3::ZERO,
            glam::Vec3::Y,
        );
        let bounds = BoundingBox::new(glam::Vec3::splat(-0.5), glam::Vec3::splat(0.5));
        assert!(bounds.visible_in_frustum(glam::Mat4::IDENTITY, projection * view));
        let far_left = glam::Mat4::from_translation(glam::Vec3::new(-50.0, 0.0, 0.0));
        assert!(!bounds.visible_in_frustum(far_left, projection * view));
    }
}
