//! 2-D affine transforms.
//!
//! `Transform2D` is the 3x2 matrix `[[a, c, tx], [b, d, ty]]`: applying it to
//! a point computes `(a*x + c*y + tx, b*x + d*y + ty)`.

use collision::Point;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform2D {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub tx: f32,
    pub ty: f32,
}

impl Transform2D {
    pub const fn identity() -> Self {
        Self { a: 1.0, b: 0.0, c: 0.0, d: 1.0, tx: 0.0, ty: 0.0 }
    }

    pub const fn translation(x: f32, y: f32) -> Self {
        Self { a: 1.0, b: 0.0, c: 0.0, d: 1.0, tx: x, ty: y }
    }

    pub fn rotation(degrees: f32) -> Self {
        let rad = degrees.to_radians();
        let (sin, cos) = rad.sin_cos();
        Self { a: cos, b: sin, c: -sin, d: cos, tx: 0.0, ty: 0.0 }
    }

    pub const fn scaling(sx: f32, sy: f32) -> Self {
        Self { a: sx, b: 0.0, c: 0.0, d: sy, tx: 0.0, ty: 0.0 }
    }

    pub fn apply_point(&self, p: Point) -> Point {
        Point::new(self.a * p.x + self.c * p.y + self.tx, self.b * p.x + self.d * p.y + self.ty)
    }

    /// Composes `self ∘ other`: applying the result to a point is the same
    /// as applying `other` first, then `self`.
    pub fn compose(&self, other: &Transform2D) -> Transform2D {
        Transform2D {
            a: self.a * other.a + self.c * other.b,
            b: self.b * other.a + self.d * other.b,
            c: self.a * other.c + self.c * other.d,
            d: self.b * other.c + self.d * other.d,
            tx: self.a * other.tx + self.c * other.ty + self.tx,
            ty: self.b * other.tx + self.d * other.ty + self.ty,
        }
    }

    /// `None` if the matrix is singular (degenerate scale).
    pub fn inverse(&self) -> Option<Transform2D> {
        let det = self.a * self.d - self.b * self.c;
        if det.abs() < f32::EPSILON {
            return None;
        }
        let inv_a = self.d / det;
        let inv_b = -self.b / det;
        let inv_c = -self.c / det;
        let inv_d = self.a / det;
        let inv_tx = -(inv_a * self.tx + inv_c * self.ty);
        let inv_ty = -(inv_b * self.tx + inv_d * self.ty);
        Some(Transform2D { a: inv_a, b: inv_b, c: inv_c, d: inv_d, tx: inv_tx, ty: inv_ty })
    }

    /// The translate→rotate→scale pose matrix: scale is applied to points
    /// first, then rotation, then translation — the same composition order
    /// a script builds up by calling translate(), then rotate(), then
    /// scale() in that order.
    pub fn from_pose(x: f32, y: f32, angle_deg: f32, width: f32, height: f32) -> Transform2D {
        Transform2D::translation(x, y).compose(&Transform2D::rotation(angle_deg).compose(&Transform2D::scaling(width, height)))
    }
}
