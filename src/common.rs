use glam::{Mat4, Quat, Vec3, Vec4};

use crate::error::MD5Error;

/// Converts from the MD5 authoring coordinate system into render space
// MD5 coordinate system:
// +X is right
// +Y is forwards
// +Z is up

// Render coordinate system:
// -X is right
// +Y is up
// +Z is forwards
pub const BASIS_CONVERSION: Mat4 = Mat4::from_cols(
    Vec4::new(-1.0, 0.0, 0.0, 0.0),
    Vec4::new( 0.0, 0.0, 1.0, 0.0),
    Vec4::new( 0.0, 1.0, 0.0, 0.0),
    Vec4::new( 0.0, 0.0, 0.0, 1.0),
);

pub fn coord_space_transform() -> Mat4 {
    BASIS_CONVERSION
}

/// Rebuild a unit quaternion from the x/y/z part stored in the file.
///
/// The real part is recovered from the unit length constraint. An axis with a magnitude of one or more
/// cannot satisfy it; such axes are normalized and given a zero real part.
pub fn unpack_quat(axis: Vec3) -> Result<Quat, MD5Error> {
    if !axis.is_finite() {
        return Err(MD5Error::InvalidOrientationAxis { x: axis.x, y: axis.y, z: axis.z });
    }

    let t = 1.0 - axis.length_squared();

    if t < 0.0 {
        let axis = axis.normalize();
        return Ok(Quat::from_xyzw(axis.x, axis.y, axis.z, 0.0));
    }

    Ok(Quat::from_xyzw(axis.x, axis.y, axis.z, t.sqrt()))
}

pub fn aabb_aabb_intersects(min_a: Vec3, max_a: Vec3, min_b: Vec3, max_b: Vec3) -> bool {
    return min_a.x <= max_b.x && max_a.x >= min_b.x &&
            min_a.y <= max_b.y && max_a.y >= min_b.y &&
            min_a.z <= max_b.z && max_a.z >= min_b.z;
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn zero_axis_is_identity() {
        let q = unpack_quat(Vec3::ZERO).unwrap();
        assert_eq!(q, Quat::IDENTITY);
    }

    #[test]
    fn partial_axis_has_unit_length() {
        let q = unpack_quat(Vec3::new(0.5, -0.5, 0.1)).unwrap();
        assert_abs_diff_eq!(q.length(), 1.0, epsilon = 1e-6);
        assert!(q.w > 0.0);
    }

    // degenerate branch: zero real part for |axis| >= 1. to be confirmed against the exporter's output
    #[test]
    fn unit_axis_uses_degenerate_branch() {
        let q = unpack_quat(Vec3::new(1.0, 0.0, 0.0)).unwrap();
        assert_eq!(q.w, 0.0);
        assert_abs_diff_eq!(q.length(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn oversized_axis_is_normalized() {
        let q = unpack_quat(Vec3::new(0.0, 3.0, 4.0)).unwrap();
        assert_abs_diff_eq!(q, Quat::from_xyzw(0.0, 0.6, 0.8, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn non_finite_axis_is_rejected() {
        let res = unpack_quat(Vec3::new(f32::NAN, 0.0, 0.0));
        assert!(matches!(res, Err(MD5Error::InvalidOrientationAxis { .. })));
    }

    #[test]
    fn basis_swaps_up_axis() {
        let p = coord_space_transform().transform_point3(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(p, Vec3::new(-1.0, 3.0, 2.0));
    }

    #[test]
    fn aabb_overlap() {
        assert!(aabb_aabb_intersects(Vec3::ZERO, Vec3::ONE, Vec3::splat(0.5), Vec3::splat(2.0)));
        assert!(!aabb_aabb_intersects(Vec3::ZERO, Vec3::ONE, Vec3::splat(1.5), Vec3::splat(2.0)));
    }
}
