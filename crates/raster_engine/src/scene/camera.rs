//! Perspective camera producing Vulkan clip-space coordinates

use crate::foundation::math::{look_at, vulkan_perspective, Mat4, Point3, Vec3, Vec4};

/// 3D perspective camera
///
/// Right-handed world space, +Y up. The projection targets Vulkan clip space
/// directly (Y down, depth in `[0, 1]`).
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    position: Point3,
    target: Point3,
    up: Vec3,
    /// Vertical field of view in radians
    fov_y: f32,
    aspect: f32,
    near: f32,
    far: f32,
}

impl Camera {
    /// Create a perspective camera looking from `position` at `target`
    pub fn perspective(position: Point3, target: Point3, fov_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            position,
            target,
            up: Vec3::y(),
            fov_y: fov_degrees.to_radians(),
            aspect,
            near,
            far,
        }
    }

    /// Move the camera, keeping its target
    pub fn set_position(&mut self, position: Point3) {
        self.position = position;
    }

    /// Point the camera at `target`
    pub fn look_at(&mut self, target: Point3, up: Vec3) {
        self.target = target;
        self.up = up;
        log::trace!("Camera look_at updated - target: {:?}, up: {:?}", target, up);
    }

    /// Update aspect ratio, typically after the surface extent changed
    pub fn set_aspect_ratio(&mut self, aspect: f32) {
        if aspect.is_finite() && aspect > 0.0 {
            self.aspect = aspect;
        }
    }

    /// Aspect ratio from a pixel extent; zero extents leave it unchanged
    pub fn fit_extent(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.set_aspect_ratio(width as f32 / height as f32);
        }
    }

    /// Camera position
    pub const fn position(&self) -> Point3 {
        self.position
    }

    /// Current aspect ratio
    pub const fn aspect(&self) -> f32 {
        self.aspect
    }

    /// World to view matrix
    pub fn view_matrix(&self) -> Mat4 {
        look_at(&self.position, &self.target, &self.up)
    }

    /// View to clip matrix
    pub fn projection_matrix(&self) -> Mat4 {
        vulkan_perspective(self.fov_y, self.aspect, self.near, self.far)
    }

    /// World to clip matrix
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Project a world-space point into homogeneous clip space
    pub fn to_clip(&self, point: &Point3) -> Vec4 {
        self.view_projection_matrix() * point.to_homogeneous()
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::perspective(Point3::new(0.0, 0.0, 5.0), Point3::origin(), 45.0, 4.0 / 3.0, 0.1, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_target_projects_to_center() {
        let camera = Camera::default();
        let clip = camera.to_clip(&Point3::origin());
        assert!(clip.w > 0.0);
        assert_relative_eq!(clip.x / clip.w, 0.0, epsilon = 1e-6);
        assert_relative_eq!(clip.y / clip.w, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_point_behind_camera_has_negative_w() {
        let camera = Camera::default();
        let clip = camera.to_clip(&Point3::new(0.0, 0.0, 10.0));
        assert!(clip.w < 0.0);
    }

    #[test]
    fn test_fit_extent_ignores_zero() {
        let mut camera = Camera::default();
        camera.fit_extent(1920, 1080);
        assert_relative_eq!(camera.aspect(), 16.0 / 9.0, epsilon = 1e-6);

        camera.fit_extent(0, 1080);
        assert_relative_eq!(camera.aspect(), 16.0 / 9.0, epsilon = 1e-6);
    }
}
