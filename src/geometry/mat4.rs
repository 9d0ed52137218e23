use std::ops::Mul;

use super::Point;

/// A homogeneous 4-component vector.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Vec4 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Vec4 {
    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// A 2D point lifted to homogeneous coordinates (z = 0, w = 1).
    pub const fn point(x: f32, y: f32) -> Self {
        Self::new(x, y, 0.0, 1.0)
    }
}

/// A 4x4 transformation matrix stored in row-major order.
///
/// Equality is exact value comparison. Transforms are recomputed
/// deterministically upstream, so "did the transform change" needs no
/// epsilon.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Mat4 {
    /// Matrix data in row-major order: [row0, row1, row2, row3]
    pub data: [f32; 16],
}

impl Mat4 {
    pub const IDENTITY: Self = Self {
        data: [
            1.0, 0.0, 0.0, 0.0, // row 0
            0.0, 1.0, 0.0, 0.0, // row 1
            0.0, 0.0, 1.0, 0.0, // row 2
            0.0, 0.0, 0.0, 1.0, // row 3
        ],
    };

    pub fn identity() -> Self {
        Self::IDENTITY
    }

    pub fn translate(x: f32, y: f32) -> Self {
        Self {
            data: [
                1.0, 0.0, 0.0, x, // row 0
                0.0, 1.0, 0.0, y, // row 1
                0.0, 0.0, 1.0, 0.0, // row 2
                0.0, 0.0, 0.0, 1.0, // row 3
            ],
        }
    }

    /// Rotation around the Z axis.
    pub fn rotate(angle_radians: f32) -> Self {
        let cos = angle_radians.cos();
        let sin = angle_radians.sin();
        Self {
            data: [
                cos, -sin, 0.0, 0.0, // row 0
                sin, cos, 0.0, 0.0, // row 1
                0.0, 0.0, 1.0, 0.0, // row 2
                0.0, 0.0, 0.0, 1.0, // row 3
            ],
        }
    }

    pub fn rotate_degrees(angle_degrees: f32) -> Self {
        Self::rotate(angle_degrees.to_radians())
    }

    pub fn scale(s: f32) -> Self {
        Self::scale_xy(s, s)
    }

    pub fn scale_xy(sx: f32, sy: f32) -> Self {
        Self {
            data: [
                sx, 0.0, 0.0, 0.0, // row 0
                0.0, sy, 0.0, 0.0, // row 1
                0.0, 0.0, 1.0, 0.0, // row 2
                0.0, 0.0, 0.0, 1.0, // row 3
            ],
        }
    }

    /// `self * other`: applies `other` first, then `self`.
    pub fn then(&self, other: &Mat4) -> Mat4 {
        let a = &self.data;
        let b = &other.data;
        let mut result = [0.0f32; 16];

        for i in 0..4 {
            for j in 0..4 {
                let mut sum = 0.0;
                for k in 0..4 {
                    sum += a[i * 4 + k] * b[k * 4 + j];
                }
                result[i * 4 + j] = sum;
            }
        }

        Mat4 { data: result }
    }

    pub fn transform(&self, v: Vec4) -> Vec4 {
        let m = &self.data;
        Vec4 {
            x: m[0] * v.x + m[1] * v.y + m[2] * v.z + m[3] * v.w,
            y: m[4] * v.x + m[5] * v.y + m[6] * v.z + m[7] * v.w,
            z: m[8] * v.x + m[9] * v.y + m[10] * v.z + m[11] * v.w,
            w: m[12] * v.x + m[13] * v.y + m[14] * v.z + m[15] * v.w,
        }
    }

    pub fn transform_point(&self, x: f32, y: f32) -> Point {
        let v = self.transform(Vec4::point(x, y));
        Point::new(v.x, v.y)
    }

    /// Rows of the matrix, for vertex upload.
    pub fn rows(&self) -> [[f32; 4]; 4] {
        [
            [self.data[0], self.data[1], self.data[2], self.data[3]],
            [self.data[4], self.data[5], self.data[6], self.data[7]],
            [self.data[8], self.data[9], self.data[10], self.data[11]],
            [self.data[12], self.data[13], self.data[14], self.data[15]],
        ]
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }
}

impl Default for Mat4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul for Mat4 {
    type Output = Mat4;

    fn mul(self, rhs: Mat4) -> Mat4 {
        self.then(&rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn test_identity() {
        let t = Mat4::identity();
        assert!(t.is_identity());
        assert_eq!(t.transform(Vec4::new(1.0, 2.0, 3.0, 1.0)), Vec4::new(1.0, 2.0, 3.0, 1.0));
    }

    #[test]
    fn test_translate() {
        let p = Mat4::translate(10.0, 20.0).transform_point(5.0, 5.0);
        assert!(approx_eq(p.x, 15.0));
        assert!(approx_eq(p.y, 25.0));
    }

    #[test]
    fn test_rotate() {
        let p = Mat4::rotate_degrees(90.0).transform_point(1.0, 0.0);
        assert!(approx_eq(p.x, 0.0));
        assert!(approx_eq(p.y, 1.0));
    }

    #[test]
    fn test_compose_order() {
        // Point (0,0) -> translate -> (10,0) -> scale -> (20,0)
        let composed = Mat4::scale(2.0) * Mat4::translate(10.0, 0.0);
        let p = composed.transform_point(0.0, 0.0);
        assert!(approx_eq(p.x, 20.0));
        assert!(approx_eq(p.y, 0.0));
    }

    #[test]
    fn test_exact_equality() {
        let a = Mat4::translate(1.0, 2.0);
        let mut b = a;
        assert_eq!(a, b);
        b.data[3] += f32::EPSILON * 4.0;
        assert_ne!(a, b);
    }

    #[test]
    fn test_rows() {
        let rows = Mat4::translate(1.0, 2.0).rows();
        assert_eq!(rows[0], [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(rows[1], [0.0, 1.0, 0.0, 2.0]);
        assert_eq!(rows[3], [0.0, 0.0, 0.0, 1.0]);
    }
}
