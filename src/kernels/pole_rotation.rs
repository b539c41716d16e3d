//! Rotations of the pole of a geographic coordinate system, as used by rotated latitude-longitude
//! grids.
//!
//! The kernel works on `(λ, φ)` in radians with longitudes relative to the rotated pole. It maps
//! each point to a unit vector, rotates it about the y axis so that the pole `(0, φp)` goes to the
//! south pole, and converts back with `(atan2, asin)`.

use super::{inverse_kernel, Kernel};
use crate::concatenated::concatenate_all;
use crate::contextual::{ContextualParameters, ParameterDescriptor};
use crate::error::TransformError;
use crate::factory::MathTransformFactory;
use crate::linear;
use crate::matrix::Matrix;
use crate::transform::{values_equal, Kind, Transform};
use crate::util::BoundedAngle;
use nalgebra::DMatrix;
use std::f64::consts::PI;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use uom::si::angle::degree;
use uom::si::f64::Angle;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub static SOUTH_POLE_ROTATION: ParameterDescriptor = ParameterDescriptor {
    name: "South pole rotation",
    parameters: &["latitude", "longitude", "angle"],
};

pub static NORTH_POLE_ROTATION: ParameterDescriptor = ParameterDescriptor {
    name: "North pole rotation",
    parameters: &["latitude", "longitude", "angle"],
};

/// Position of the rotated pole, in degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PoleRotationParameters {
    pub pole_latitude: f64,
    pub pole_longitude: f64,
    /// Rotation about the new polar axis.
    #[cfg_attr(feature = "serde", serde(default))]
    pub axis_angle: f64,
}

/// Sign convention of the axis angle of north pole rotations.
///
/// South pole rotations have a single, agreed-upon convention. For north pole rotations, the
/// pole is mapped to its antipode and the axis angle is negated; other conventions are in use and
/// may be added here.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[non_exhaustive]
pub enum NorthPoleConvention {
    #[default]
    V1,
}

#[derive(Clone, Debug)]
pub(crate) struct PoleRotationKernel {
    sin_pole: f64,
    cos_pole: f64,
    /// Half-turn (±π or 0) bracketing the forward-signed kernel in the inverse, chosen so that the
    /// inverse output longitudes are offset by less than 90°.
    inverse_shift: f64,
}

impl PoleRotationParameters {
    fn validate(&self) -> Result<(), TransformError> {
        if !(-90. ..=90.).contains(&self.pole_latitude) {
            return Err(TransformError::invalid(
                "pole_latitude",
                format!("{}° is not a latitude", self.pole_latitude),
            ));
        }
        for (name, value) in [
            ("pole_longitude", self.pole_longitude),
            ("axis_angle", self.axis_angle),
        ] {
            if !value.is_finite() {
                return Err(TransformError::invalid(name, format!("{value}° is not finite")));
            }
        }
        Ok(())
    }
}

/// Creates the rotation moving the south pole to `parameters`' pole, on `(longitude°,
/// latitude°)`.
pub fn rotate_south_pole(
    factory: &MathTransformFactory,
    parameters: &PoleRotationParameters,
) -> Result<Transform, TransformError> {
    parameters.validate()?;
    create(
        factory,
        &SOUTH_POLE_ROTATION,
        parameters,
        parameters.pole_latitude,
        parameters.pole_longitude,
        parameters.axis_angle,
    )
}

/// Creates the rotation moving the north pole to `parameters`' pole, on `(longitude°,
/// latitude°)`.
pub fn rotate_north_pole(
    factory: &MathTransformFactory,
    parameters: &PoleRotationParameters,
    convention: NorthPoleConvention,
) -> Result<Transform, TransformError> {
    parameters.validate()?;
    match convention {
        NorthPoleConvention::V1 => create(
            factory,
            &NORTH_POLE_ROTATION,
            parameters,
            -parameters.pole_latitude,
            parameters.pole_longitude + 180.,
            -parameters.axis_angle,
        ),
    }
}

/// Wraps a longitude in degrees into [-180°, 180°).
fn wrap_longitude(longitude: f64) -> f64 {
    if (-180. ..180.).contains(&longitude) {
        longitude
    } else {
        BoundedAngle::new(Angle::new::<degree>(longitude)).to_signed_range()
    }
}

fn create(
    factory: &MathTransformFactory,
    descriptor: &'static ParameterDescriptor,
    recorded: &PoleRotationParameters,
    pole_latitude: f64,
    pole_longitude: f64,
    axis_angle: f64,
) -> Result<Transform, TransformError> {
    let pole_longitude = wrap_longitude(pole_longitude);
    let mut context = ContextualParameters::new(descriptor, 2, 2);
    context.set("latitude", recorded.pole_latitude)?;
    context.set("longitude", recorded.pole_longitude)?;
    context.set("angle", recorded.axis_angle)?;
    context.normalize_geographic_inputs(pole_longitude);
    context.denormalize_geographic_outputs(-axis_angle);
    let (sin_pole, cos_pole) = pole_latitude.to_radians().sin_cos();
    let inverse_shift = if pole_longitude.abs() > 90. {
        -PI.copysign(pole_longitude)
    } else {
        0.
    };
    let kernel = Transform::new(Kind::Kernel(Kernel::PoleRotation(PoleRotationKernel {
        sin_pole,
        cos_pole,
        inverse_shift,
    })));
    context.complete_transform(factory, kernel)
}

/// `λ + shift` on `(λ, φ)`.
fn longitude_shift(shift: f64) -> Result<Transform, TransformError> {
    let mut m = Matrix::affine_identity(2, 2);
    m.set(0, 2, shift);
    linear::create(m)
}

impl PoleRotationKernel {
    pub(crate) fn source_dimensions(&self) -> usize {
        2
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
        let (s, c) = (self.sin_pole, self.cos_pole);
        let (sin_lon, cos_lon) = src[0].sin_cos();
        let (sin_lat, cos_lat) = src[1].sin_cos();
        let x = cos_lat * cos_lon;
        let y = cos_lat * sin_lon;
        let z = sin_lat;
        let xr = c * z - s * x;
        let zr = -(c * x + s * z);
        dst[0] = y.atan2(xr);
        dst[1] = zr.clamp(-1., 1.).asin();
        if !derivate {
            return Ok(None);
        }
        let p2 = xr * xr + y * y;
        let p = p2.sqrt();
        let dx = [-y, -sin_lat * cos_lon];
        let dy = [x, -sin_lat * sin_lon];
        let dz = [0., cos_lat];
        Ok(Some(DMatrix::from_fn(2, 2, |i, j| {
            let dxr = c * dz[j] - s * dx[j];
            if i == 0 {
                (xr * dy[j] - y * dxr) / p2
            } else {
                -(c * dx[j] + s * dz[j]) / p
            }
        })))
    }

    pub(crate) fn inverse(&self, this: &Transform) -> Result<Transform, TransformError> {
        let descriptor = this
            .contextual_parameters()
            .map_or(&SOUTH_POLE_ROTATION, |c| c.descriptor());
        let value_of = |name: &str, p: &ContextualParameters| match name {
            "latitude" => p.parameter("latitude"),
            "longitude" => p.parameter("angle").map(|a| -a),
            "angle" => p.parameter("longitude").map(|l| -l),
            _ => None,
        };
        if self.inverse_shift == 0. {
            let inverse = Self {
                cos_pole: -self.cos_pole,
                ..self.clone()
            };
            return inverse_kernel(this, Kernel::PoleRotation(inverse), descriptor, value_of);
        }
        // K(s, -c) = K(s, c) between two half-turns about the polar axis
        let forward_signed = Self {
            inverse_shift: 0.,
            ..self.clone()
        };
        let kernel = inverse_kernel(this, Kernel::PoleRotation(forward_signed), descriptor, value_of)?;
        let shift = longitude_shift(self.inverse_shift)?;
        concatenate_all(&[shift.clone(), kernel, shift])
    }

    pub(crate) fn equals(&self, other: &Self, tolerance: Option<f64>) -> bool {
        values_equal(self.sin_pole, other.sin_pole, tolerance)
            && values_equal(self.cos_pole, other.cos_pole, tolerance)
            && values_equal(self.inverse_shift, other.inverse_shift, tolerance)
    }

    pub(crate) fn hash_bits<H: Hasher>(&self, state: &mut H) {
        self.sin_pole.to_bits().hash(state);
        self.cos_pole.to_bits().hash(state);
        self.inverse_shift.to_bits().hash(state);
    }
}

impl Display for PoleRotationKernel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PoleRotation(sin φp={}, cos φp={})",
            self.sin_pole, self.cos_pole
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::tests::assert_derivative_matches;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn south(pole_latitude: f64, pole_longitude: f64, axis_angle: f64) -> Transform {
        rotate_south_pole(
            &MathTransformFactory::default(),
            &PoleRotationParameters {
                pole_latitude,
                pole_longitude,
                axis_angle,
            },
        )
        .unwrap()
    }

    fn kernel_of(t: &Transform) -> Transform {
        t.steps()
            .into_iter()
            .find(|s| matches!(s.kind(), Kind::Kernel(_)))
            .unwrap()
    }

    #[test]
    fn unrotated_south_pole_is_identity() {
        let t = south(-90., 0., 0.);
        let p = t.transform_point(&[30., 40.]).unwrap();
        assert_relative_eq!(p.as_slice(), [30., 40.].as_slice(), epsilon = 1e-12);
    }

    #[test]
    fn pole_goes_to_the_south_pole() {
        let t = south(-30., 15., 25.);
        let p = t.transform_point(&[15., -30.]).unwrap();
        // asin loses half of the digits next to the poles
        assert_relative_eq!(p[1], -90., epsilon = 1e-5);
    }

    #[test]
    fn north_pole_goes_to_the_north_pole() {
        let parameters = PoleRotationParameters {
            pole_latitude: 40.,
            pole_longitude: -170.,
            axis_angle: 0.,
        };
        let t = rotate_north_pole(
            &MathTransformFactory::default(),
            &parameters,
            NorthPoleConvention::default(),
        )
        .unwrap();
        let p = t.transform_point(&[-170., 40.]).unwrap();
        assert_relative_eq!(p[1], 90., epsilon = 1e-5);
        assert_eq!(
            t.steps()[1].contextual_parameters().unwrap().descriptor(),
            &NORTH_POLE_ROTATION
        );
    }

    #[rstest]
    #[case(-30., 15., 25., &[10., 20.])]
    #[case(-45., 150., 0., &[-100., 60.])]
    #[case(10., -120., -5., &[170., -80.])]
    #[case(-89., 200., 0., &[1., 2.])]
    fn inverse_round_trips(
        #[case] latitude: f64,
        #[case] longitude: f64,
        #[case] angle: f64,
        #[case] point: &[f64],
    ) {
        let t = south(latitude, longitude, angle);
        let rotated = t.transform_point(point).unwrap();
        let back = t.inverse().unwrap().transform_point(&rotated).unwrap();
        let wrapped = wrap_longitude(back[0] - point[0]);
        assert_relative_eq!(wrapped, 0., epsilon = 1e-9);
        assert_relative_eq!(back[1], point[1], epsilon = 1e-9);
    }

    #[rstest]
    #[case(0.3, -0.2)]
    #[case(-2.5, 1.1)]
    fn derivatives(#[case] lon: f64, #[case] lat: f64) {
        let kernel = kernel_of(&south(-35., 20., 0.));
        assert_derivative_matches(&kernel, &[lon, lat], 1e-6, 1e-8);
        assert_derivative_matches(&kernel.inverse().unwrap(), &[lon, lat], 1e-6, 1e-8);
    }

    #[test]
    fn far_pole_longitude_brackets_the_inverse() {
        let kernel = kernel_of(&south(-45., 150., 0.));
        let inverse = kernel.inverse().unwrap();
        let steps = inverse.steps();
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].matrix().unwrap().get(0, 2), -PI);
        assert!(inverse.inverse().unwrap().ptr_eq(&kernel));

        let near = kernel_of(&south(-45., 60., 0.));
        assert!(matches!(near.inverse().unwrap().kind(), Kind::Kernel(_)));
    }

    #[test]
    fn inverse_parameters() {
        let t = south(-30., 15., 25.);
        let inverse = kernel_of(&t.inverse().unwrap());
        let context = inverse.contextual_parameters().unwrap();
        assert_eq!(context.parameter("latitude"), Some(-30.));
        assert_eq!(context.parameter("longitude"), Some(-25.));
        assert_eq!(context.parameter("angle"), Some(-15.));
    }

    #[test]
    fn invalid_parameters() {
        let factory = MathTransformFactory::default();
        let mut parameters = PoleRotationParameters {
            pole_latitude: 91.,
            pole_longitude: 0.,
            axis_angle: 0.,
        };
        assert!(rotate_south_pole(&factory, &parameters).is_err());
        parameters.pole_latitude = 0.;
        parameters.axis_angle = f64::NAN;
        assert!(rotate_south_pole(&factory, &parameters).is_err());
    }

    #[test]
    fn parameters_serde() {
        let parameters: PoleRotationParameters =
            serde_yaml::from_str("pole_latitude: -35.0\npole_longitude: 15.0\n").unwrap();
        assert_eq!(parameters.axis_angle, 0.);
        let yaml = serde_yaml::to_string(&parameters).unwrap();
        assert_eq!(serde_yaml::from_str::<PoleRotationParameters>(&yaml).unwrap(), parameters);
    }
}
