//! Math utilities and types
//!
//! Provides fundamental math types for 3D rendering, plus the Vulkan-clip-space
//! projection helpers the render passes need (depth range [0, 1], Y down).

pub use nalgebra::{Matrix3, Matrix4, Unit, Vector2, Vector3, Vector4};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Right-handed orthographic projection mapping depth to [0, 1] with the
/// Y flip Vulkan clip space expects.
pub fn orthographic_vk(
    left: f32,
    right: f32,
    bottom: f32,
    top: f32,
    near: f32,
    far: f32,
) -> Mat4 {
    let mut m = Mat4::identity();
    m[(0, 0)] = 2.0 / (right - left);
    m[(0, 3)] = -(right + left) / (right - left);
    m[(1, 1)] = -2.0 / (top - bottom);
    m[(1, 3)] = (top + bottom) / (top - bottom);
    m[(2, 2)] = -1.0 / (far - near);
    m[(2, 3)] = -near / (far - near);
    m
}

/// Right-handed perspective projection mapping depth to [0, 1] with the
/// Y flip Vulkan clip space expects.
pub fn perspective_vk(fovy: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
    let f = 1.0 / (fovy * 0.5).tan();
    let mut m = Mat4::zeros();
    m[(0, 0)] = f / aspect;
    m[(1, 1)] = -f;
    m[(2, 2)] = far / (near - far);
    m[(2, 3)] = near * far / (near - far);
    m[(3, 2)] = -1.0;
    m
}

/// Right-handed view matrix looking from `eye` towards `target`.
pub fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4 {
    Mat4::look_at_rh(&Point3::from(eye), &Point3::from(target), &up)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn orthographic_maps_near_and_far_planes_to_unit_depth() {
        let m = orthographic_vk(-10.0, 10.0, -10.0, 10.0, 1.0, 101.0);

        // A point on the near plane (z = -near in a right-handed view space)
        // lands at depth 0, the far plane at depth 1.
        let near_point = m * Vec4::new(0.0, 0.0, -1.0, 1.0);
        let far_point = m * Vec4::new(0.0, 0.0, -101.0, 1.0);
        assert_relative_eq!(near_point.z, 0.0, epsilon = 1e-6);
        assert_relative_eq!(far_point.z, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn orthographic_flips_y_for_vulkan() {
        let m = orthographic_vk(-1.0, 1.0, -1.0, 1.0, 0.1, 10.0);
        let up = m * Vec4::new(0.0, 1.0, -1.0, 1.0);
        assert!(up.y < 0.0, "world up should map to clip-space down");
    }

    #[test]
    fn perspective_maps_near_and_far_planes_to_unit_depth() {
        let m = perspective_vk(std::f32::consts::FRAC_PI_3, 16.0 / 9.0, 0.5, 200.0);

        let near_point = m * Vec4::new(0.0, 0.0, -0.5, 1.0);
        let far_point = m * Vec4::new(0.0, 0.0, -200.0, 1.0);
        assert_relative_eq!(near_point.z / near_point.w, 0.0, epsilon = 1e-5);
        assert_relative_eq!(far_point.z / far_point.w, 1.0, epsilon = 1e-4);
    }

    #[test]
    fn look_at_places_eye_at_origin() {
        let eye = Vec3::new(3.0, 4.0, 5.0);
        let view = look_at(eye, Vec3::zeros(), Vec3::y());
        let transformed = view * Vec4::new(eye.x, eye.y, eye.z, 1.0);
        assert_relative_eq!(transformed.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(transformed.y, 0.0, epsilon = 1e-5);
        assert_relative_eq!(transformed.z, 0.0, epsilon = 1e-5);
    }
}
