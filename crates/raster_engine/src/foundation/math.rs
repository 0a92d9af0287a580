//! Math utilities and types
//!
//! Thin aliases over `nalgebra` plus the Vulkan-flavoured projection helpers
//! the camera needs.

pub use nalgebra::{Matrix4, Quaternion, Unit, Vector3, Vector4};

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Transform representing position, rotation, and scale
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    /// Position in 3D space
    pub position: Vec3,

    /// Rotation quaternion
    pub rotation: Quat,

    /// Scale factors
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Create a new identity transform
    pub fn identity() -> Self {
        Self::default()
    }

    /// Create a transform with only position
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Rotate by `angle` radians around `axis`, keeping position and scale
    #[must_use]
    pub fn rotated(mut self, axis: &Unit<Vec3>, angle: f32) -> Self {
        self.rotation = Quat::from_axis_angle(axis, angle) * self.rotation;
        self
    }

    /// Replace the scale with a uniform factor
    #[must_use]
    pub fn scaled(mut self, factor: f32) -> Self {
        self.scale = Vec3::new(factor, factor, factor);
        self
    }

    /// Convert to a transformation matrix
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::new_translation(&self.position)
            * self.rotation.to_homogeneous()
            * Mat4::new_nonuniform_scaling(&self.scale)
    }

    /// Apply this transform to a point
    pub fn transform_point(&self, point: &Point3) -> Point3 {
        self.to_matrix().transform_point(point)
    }
}

/// Right-handed perspective projection into Vulkan clip space
///
/// View space looks down -Z with +Y up. Clip space has +Y pointing down and
/// depth in `[0, 1]`, so no extra flip matrix is needed downstream.
pub fn vulkan_perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
    let focal = 1.0 / (fov_y * 0.5).tan();

    let mut result = Mat4::zeros();
    result[(0, 0)] = focal / aspect;
    result[(1, 1)] = -focal;
    result[(2, 2)] = far / (near - far);
    result[(2, 3)] = (near * far) / (near - far);
    result[(3, 2)] = -1.0;
    result
}

/// Right-handed look-at view matrix
pub fn look_at(eye: &Point3, target: &Point3, up: &Vec3) -> Mat4 {
    nalgebra::Isometry3::look_at_rh(eye, target, up).to_homogeneous()
}
