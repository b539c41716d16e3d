//! Conversions between Cartesian, spherical, polar and cylindrical coordinates.
//!
//! The kernels work with angles in radians, in this axis order:
//!
//! - spherical: `(λ, Ω, R)`, longitude, latitude (from the equatorial plane) and radius;
//! - polar: `(r, θ)`, radius and angle counter-clockwise from the x axis;
//! - cylindrical: `(r, θ, z)`, the polar coordinates plus the unchanged height.

use super::{inverse_kernel, Kernel};
use crate::contextual::{ContextualParameters, ParameterDescriptor};
use crate::double_double::DoubleDouble;
use crate::error::TransformError;
use crate::factory::MathTransformFactory;
use crate::transform::{Kind, Transform};
use nalgebra::DMatrix;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

pub static SPHERICAL_TO_CARTESIAN: ParameterDescriptor = ParameterDescriptor {
    name: "Spherical to Cartesian",
    parameters: &[],
};

pub static CARTESIAN_TO_SPHERICAL: ParameterDescriptor = ParameterDescriptor {
    name: "Cartesian to spherical",
    parameters: &[],
};

pub static POLAR_TO_CARTESIAN: ParameterDescriptor = ParameterDescriptor {
    name: "Polar to Cartesian",
    parameters: &[],
};

pub static CARTESIAN_TO_POLAR: ParameterDescriptor = ParameterDescriptor {
    name: "Cartesian to polar",
    parameters: &[],
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum Conversion {
    SphericalToCartesian,
    CartesianToSpherical,
    PolarToCartesian,
    CartesianToPolar,
}

fn kernel(conversion: Conversion) -> Transform {
    Transform::new(Kind::Kernel(Kernel::Conversion(conversion)))
}

#[cfg(test)]
pub(crate) fn polar_to_cartesian_kernel() -> Transform {
    kernel(Conversion::PolarToCartesian)
}

/// `(longitude°, latitude°, radius)` to `(x, y, z)`, with `z` towards the north pole and `x`
/// towards the prime meridian.
pub fn spherical_to_cartesian(factory: &MathTransformFactory) -> Result<Transform, TransformError> {
    let mut context = ContextualParameters::new(&SPHERICAL_TO_CARTESIAN, 3, 3);
    context.normalize_geographic_inputs(0.);
    context.complete_transform(factory, kernel(Conversion::SphericalToCartesian))
}

/// `(x, y, z)` to `(longitude°, latitude°, radius)`.
pub fn cartesian_to_spherical(factory: &MathTransformFactory) -> Result<Transform, TransformError> {
    let mut context = ContextualParameters::new(&CARTESIAN_TO_SPHERICAL, 3, 3);
    context.denormalize_geographic_outputs(0.);
    context.complete_transform(factory, kernel(Conversion::CartesianToSpherical))
}

/// `(r, θ°)` to `(x, y)`.
pub fn polar_to_cartesian(factory: &MathTransformFactory) -> Result<Transform, TransformError> {
    let mut context = ContextualParameters::new(&POLAR_TO_CARTESIAN, 2, 2);
    context
        .normalization_mut()
        .convert_after(1, DoubleDouble::DEGREES_TO_RADIANS, DoubleDouble::ZERO);
    context.complete_transform(factory, kernel(Conversion::PolarToCartesian))
}

/// `(x, y)` to `(r, θ°)`.
pub fn cartesian_to_polar(factory: &MathTransformFactory) -> Result<Transform, TransformError> {
    let mut context = ContextualParameters::new(&CARTESIAN_TO_POLAR, 2, 2);
    context
        .denormalization_mut()
        .convert_before(1, DoubleDouble::RADIANS_TO_DEGREES, DoubleDouble::ZERO);
    context.complete_transform(factory, kernel(Conversion::CartesianToPolar))
}

/// `(r, θ°, z)` to `(x, y, z)`.
pub fn cylindrical_to_cartesian(factory: &MathTransformFactory) -> Result<Transform, TransformError> {
    factory.create_pass_through(0, &polar_to_cartesian(factory)?, 1)
}

/// `(x, y, z)` to `(r, θ°, z)`.
pub fn cartesian_to_cylindrical(factory: &MathTransformFactory) -> Result<Transform, TransformError> {
    factory.create_pass_through(0, &cartesian_to_polar(factory)?, 1)
}

impl Conversion {
    pub(crate) fn source_dimensions(&self) -> usize {
        match self {
            Conversion::SphericalToCartesian | Conversion::CartesianToSpherical => 3,
            Conversion::PolarToCartesian | Conversion::CartesianToPolar => 2,
        }
    }

    pub(crate) fn target_dimensions(&self) -> usize {
        self.source_dimensions()
    }

    pub(crate) fn transform(
        &self,
        src: &[f64],
        dst: &mut [f64],
        derivate: bool,
    ) -> Result<Option<DMatrix<f64>>, TransformError> {
        let derivative = match self {
            Conversion::SphericalToCartesian => {
                let (lon, lat, r) = (src[0], src[1], src[2]);
                let (sin_lon, cos_lon) = lon.sin_cos();
                let (sin_lat, cos_lat) = lat.sin_cos();
                let x = r * cos_lat * cos_lon;
                let y = r * cos_lat * sin_lon;
                let z = r * sin_lat;
                dst.copy_from_slice(&[x, y, z]);
                #[rustfmt::skip]
                let derivative = derivate.then(|| DMatrix::from_row_slice(3, 3, &[
                    -y, -r * sin_lat * cos_lon, cos_lat * cos_lon,
                     x, -r * sin_lat * sin_lon, cos_lat * sin_lon,
                    0.,  r * cos_lat,           sin_lat,
                ]));
                derivative
            }
            Conversion::CartesianToSpherical => {
                let (x, y, z) = (src[0], src[1], src[2]);
                let p2 = x * x + y * y;
                let p = p2.sqrt();
                let r2 = p2 + z * z;
                let r = r2.sqrt();
                dst.copy_from_slice(&[y.atan2(x), z.atan2(p), r]);
                #[rustfmt::skip]
                let derivative = derivate.then(|| DMatrix::from_row_slice(3, 3, &[
                    -y / p2,            x / p2,            0.,
                    -x * z / (r2 * p), -y * z / (r2 * p),  p / r2,
                     x / r,             y / r,             z / r,
                ]));
                derivative
            }
            Conversion::PolarToCartesian => {
                let (r, theta) = (src[0], src[1]);
                let (sin, cos) = theta.sin_cos();
                dst.copy_from_slice(&[r * cos, r * sin]);
                #[rustfmt::skip]
                let derivative = derivate.then(|| DMatrix::from_row_slice(2, 2, &[
                    cos, -r * sin,
                    sin,  r * cos,
                ]));
                derivative
            }
            Conversion::CartesianToPolar => {
                let (x, y) = (src[0], src[1]);
                let r2 = x * x + y * y;
                let r = r2.sqrt();
                dst.copy_from_slice(&[r, y.atan2(x)]);
                #[rustfmt::skip]
                let derivative = derivate.then(|| DMatrix::from_row_slice(2, 2, &[
                     x / r,  y / r,
                    -y / r2, x / r2,
                ]));
                derivative
            }
        };
        Ok(derivative)
    }

    pub(crate) fn inverse(&self, this: &Transform) -> Result<Transform, TransformError> {
        let (inverse, descriptor) = match self {
            Conversion::SphericalToCartesian => {
                (Conversion::CartesianToSpherical, &CARTESIAN_TO_SPHERICAL)
            }
            Conversion::CartesianToSpherical => {
                (Conversion::SphericalToCartesian, &SPHERICAL_TO_CARTESIAN)
            }
            Conversion::PolarToCartesian => (Conversion::CartesianToPolar, &CARTESIAN_TO_POLAR),
            Conversion::CartesianToPolar => (Conversion::PolarToCartesian, &POLAR_TO_CARTESIAN),
        };
        inverse_kernel(this, Kernel::Conversion(inverse), descriptor, |_, _| None)
    }

    pub(crate) fn hash_bits<H: Hasher>(&self, state: &mut H) {
        self.hash(state);
    }
}

impl Display for Conversion {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(
            match self {
                Conversion::SphericalToCartesian => "SphericalToCartesian",
                Conversion::CartesianToSpherical => "CartesianToSpherical",
                Conversion::PolarToCartesian => "PolarToCartesian",
                Conversion::CartesianToPolar => "CartesianToPolar",
            },
            f,
        )
    }
}
