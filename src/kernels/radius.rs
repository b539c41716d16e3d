//! Adds the radius of the ellipsoid to spherical coordinates on its surface.
//!
//! Given a longitude `λ` and a spherical latitude `Ω`, the kernel appends the distance from the
//! ellipsoid centre to its surface in that direction, in units of the semi-minor axis:
//!
//! ```text
//! r = 1 / √(1 - e²·cos²Ω)
//! ```
//!
//! This is what turns 2-D spherical coordinates on an ellipsoid into 3-D spherical coordinates.
//! The inverse simply drops the radius; it is still kept as a kernel (rather than a linear
//! transform) so that it inverts back into this kernel.

use super::{inverse_kernel, Kernel};
use crate::contextual::{ContextualParameters, ParameterDescriptor};
use crate::double_double::DoubleDouble;
use crate::ellipsoid::Ellipsoid;
use crate::error::TransformError;
use crate::factory::MathTransformFactory;
use crate::transform::{values_equal, Kind, Transform};
use nalgebra::DMatrix;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use uom::si::length::meter;

pub static ELLIPSOID_TO_RADIUS: ParameterDescriptor = ParameterDescriptor {
    name: "Ellipsoid to radius",
    parameters: &["eccentricity"],
};

pub static RADIUS_TO_ELLIPSOID: ParameterDescriptor = ParameterDescriptor {
    name: "Radius to ellipsoid",
    parameters: &["eccentricity"],
};

#[derive(Clone, Debug)]
pub(crate) struct EllipsoidToRadius {
    eccentricity_squared: f64,
}

#[derive(Clone, Debug)]
pub(crate) struct RadiusToEllipsoid {
    eccentricity_squared: f64,
}

pub(crate) fn kernel(eccentricity_squared: f64) -> Transform {
    Transform::new(Kind::Kernel(Kernel::EllipsoidToRadius(EllipsoidToRadius {
        eccentricity_squared,
    })))
}

/// Creates the transform from `(longitude, latitude)` in degrees to `(longitude, latitude,
/// radius)` in degrees and metres, where the latitude is spherical and the radius is the one of
/// `ellipsoid` in that direction.
pub fn create(
    factory: &MathTransformFactory,
    ellipsoid: &Ellipsoid,
) -> Result<Transform, TransformError> {
    let mut context = ContextualParameters::new(&ELLIPSOID_TO_RADIUS, 2, 3);
    context.set("eccentricity", ellipsoid.eccentricity())?;
    context.normalize_geographic_inputs(0.);
    context.denormalize_geographic_outputs(0.).convert_before(
        2,
        DoubleDouble::from(ellipsoid.semi_minor_axis().get::<meter>()),
        DoubleDouble::ZERO,
    );
    context.complete_transform(factory, kernel(ellipsoid.eccentricity_squared()))
}

impl EllipsoidToRadius {
    pub(crate) fn source_dimensions(&self) -> usize {
        2
    }

    pub(crate) fn target_dimensions(&self) -> usize {
        3
    }

    pub(crate) fn transform(
        &self,
        src: &[f64],
        dst: &mut [f64],
        derivate: bool,
    ) -> Result<Option<DMatrix<f64>>, TransformError> {
        let (lon, lat) = (src[0], src[1]);
        let (sin, cos) = lat.sin_cos();
        let r = 1. / (1. - self.eccentricity_squared * (cos * cos)).sqrt();
        dst[0] = lon;
        dst[1] = lat;
        dst[2] = r;
        Ok(derivate.then(|| {
            #[rustfmt::skip]
            let derivative = DMatrix::from_row_slice(3, 2, &[
                1., 0.,
                0., 1.,
                0., -self.eccentricity_squared * cos * sin * (r * r * r),
            ]);
            derivative
        }))
    }

    pub(crate) fn inverse(&self, this: &Transform) -> Result<Transform, TransformError> {
        inverse_kernel(
            this,
            Kernel::RadiusToEllipsoid(RadiusToEllipsoid {
                eccentricity_squared: self.eccentricity_squared,
            }),
            &RADIUS_TO_ELLIPSOID,
            |name, p| p.parameter(name),
        )
    }

    pub(crate) fn equals(&self, other: &Self, tolerance: Option<f64>) -> bool {
        values_equal(self.eccentricity_squared, other.eccentricity_squared, tolerance)
    }

    pub(crate) fn hash_bits<H: Hasher>(&self, state: &mut H) {
        self.eccentricity_squared.to_bits().hash(state);
    }
}

impl RadiusToEllipsoid {
    pub(crate) fn source_dimensions(&self) -> usize {
        3
    }

    pub(crate) fn target_dimensions(&self) -> usize {
        2
    }

    pub(crate) fn transform(
        &self,
        src: &[f64],
        dst: &mut [f64],
        derivate: bool,
    ) -> Result<Option<DMatrix<f64>>, TransformError> {
        dst.copy_from_slice(&src[..2]);
        Ok(derivate.then(|| DMatrix::identity(2, 3)))
    }

    pub(crate) fn inverse(&self, this: &Transform) -> Result<Transform, TransformError> {
        inverse_kernel(
            this,
            Kernel::EllipsoidToRadius(EllipsoidToRadius {
                eccentricity_squared: self.eccentricity_squared,
            }),
            &ELLIPSOID_TO_RADIUS,
            |name, p| p.parameter(name),
        )
    }

    pub(crate) fn equals(&self, other: &Self, tolerance: Option<f64>) -> bool {
        values_equal(self.eccentricity_squared, other.eccentricity_squared, tolerance)
    }

    pub(crate) fn hash_bits<H: Hasher>(&self, state: &mut H) {
        self.eccentricity_squared.to_bits().hash(state);
    }
}

impl Display for EllipsoidToRadius {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "EllipsoidToRadius(e²={})", self.eccentricity_squared)
    }
}

impl Display for RadiusToEllipsoid {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "RadiusToEllipsoid(e²={})", self.eccentricity_squared)
    }
}
