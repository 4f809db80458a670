use crate::num::Epsilon;
use crate::vec2::Vec2;
use num_traits::Float;
use std::ops::{Add, Div, Mul, Sub};

/// A symmetric 2x2 matrix `[[xx, xy], [xy, yy]]`.
///
/// Used for covariances (structure tensor, Hessian, fitted Gaussian shape).
/// Kept as three scalars rather than a general 2x2 matrix because every use
/// site in this codebase only ever produces symmetric matrices.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Mat2s<T> {
    pub xx: T,
    pub xy: T,
    pub yy: T,
}

/// Eigenvalues (largest first) and their corresponding unit eigenvectors.
#[derive(Debug, Clone, Copy)]
pub struct Eigen2<T> {
    pub w: [T; 2],
    pub v: [Vec2<T>; 2],
}

impl<T: Float> Mat2s<T> {
    pub fn new(xx: T, xy: T, yy: T) -> Self {
        Self { xx, xy, yy }
    }

    pub fn identity() -> Self {
        Self::new(T::one(), T::zero(), T::one())
    }

    pub fn det(&self) -> T {
        self.xx * self.yy - self.xy * self.xy
    }

    pub fn trace(&self) -> T {
        self.xx + self.yy
    }

    /// Quadratic form `v^T M v`.
    pub fn vtmv(&self, v: Vec2<T>) -> T {
        v.x * v.x * self.xx + (v.x * v.y + v.y * v.x) * self.xy + v.y * v.y * self.yy
    }

    /// Inverse, or `None` if `|det| <= eps` (matrix treated as singular).
    pub fn inverse_eps(&self, eps: T) -> Option<Self> {
        let d = self.det();
        if d.abs() <= eps {
            return None;
        }
        Some(Self::new(self.yy / d, -self.xy / d, self.xx / d))
    }

    /// Eigenvalues via the closed-form quadratic `w^2 - trace*w + det = 0`,
    /// ordered largest first. Discriminants that go slightly negative due to
    /// floating point error are clamped to zero rather than producing NaN.
    pub fn eigenvalues(&self) -> [T; 2] {
        let tr = self.trace();
        let d = self.det();
        let disc = (tr * tr - (T::one() + T::one() + T::one() + T::one()) * d)
            .max(T::zero())
            .sqrt();
        let two = T::one() + T::one();
        [(tr + disc) / two, (tr - disc) / two]
    }

    /// Unit eigenvector for a given eigenvalue. Picks whichever of the two
    /// algebraically equivalent expressions has the larger magnitude
    /// denominator, avoiding cancellation and the zero vector.
    pub fn eigenvector(&self, eigenvalue: T) -> Vec2<T> {
        let ev = if (self.xx - eigenvalue).abs() > (self.yy - eigenvalue).abs() {
            Vec2::new(-self.xy, self.xx - eigenvalue)
        } else {
            Vec2::new(self.yy - eigenvalue, -self.xy)
        };

        let n = ev.norm_l2();
        if n <= T::epsilon() {
            // xx == yy and xy == 0: any orthonormal basis works.
            Vec2::new(T::one(), T::zero())
        } else {
            ev / n
        }
    }

    pub fn eigen(&self) -> Eigen2<T> {
        let w = self.eigenvalues();
        Eigen2 {
            w,
            v: [self.eigenvector(w[0]), self.eigenvector(w[1])],
        }
    }

    pub fn cast<S: Float>(&self) -> Mat2s<S> {
        Mat2s::new(
            S::from(self.xx).expect("finite cast"),
            S::from(self.xy).expect("finite cast"),
            S::from(self.yy).expect("finite cast"),
        )
    }
}

impl<T: Float + Epsilon> Mat2s<T> {
    /// Inverse using the type's default epsilon (see [`Epsilon`]).
    pub fn inverse(&self) -> Option<Self> {
        self.inverse_eps(T::EPS)
    }
}

impl<T: Add<Output = T>> Add for Mat2s<T> {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self {
            xx: self.xx + rhs.xx,
            xy: self.xy + rhs.xy,
            yy: self.yy + rhs.yy,
        }
    }
}

impl<T: Sub<Output = T>> Sub for Mat2s<T> {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self {
            xx: self.xx - rhs.xx,
            xy: self.xy - rhs.xy,
            yy: self.yy - rhs.yy,
        }
    }
}

impl<T: Mul<Output = T> + Copy> Mul<T> for Mat2s<T> {
    type Output = Self;
    fn mul(self, rhs: T) -> Self {
        Self {
            xx: self.xx * rhs,
            xy: self.xy * rhs,
            yy: self.yy * rhs,
        }
    }
}

impl<T: Div<Output = T> + Copy> Div<T> for Mat2s<T> {
    type Output = Self;
    fn div(self, rhs: T) -> Self {
        Self {
            xx: self.xx / rhs,
            xy: self.xy / rhs,
            yy: self.yy / rhs,
        }
    }
}
