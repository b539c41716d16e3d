//! Conversions between geographic coordinates on an ellipsoid and geocentric coordinates.
//!
//! The kernel works on an ellipsoid with a semi-major axis of 1: geographic inputs are
//! `(λ, φ[, h])` with angles in radians and the height divided by the semi-major axis, and the
//! geocentric outputs are `(X, Y, Z)` in units of the semi-major axis. The inverse uses a
//! closed-form first approximation of the latitude, refined by fixed-point iterations.

use super::{cartesian, inverse_kernel, Kernel};
use crate::contextual::{ContextualParameters, ParameterDescriptor};
use crate::double_double::DoubleDouble;
use crate::ellipsoid::Ellipsoid;
use crate::error::TransformError;
use crate::factory::MathTransformFactory;
use crate::matrix::Matrix;
use crate::transform::{values_equal, Kind, Transform};
use nalgebra::DMatrix;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use uom::si::length::meter;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub static GEOGRAPHIC_TO_GEOCENTRIC: ParameterDescriptor = ParameterDescriptor {
    name: "Geographic to geocentric",
    parameters: &["eccentricity", "dim"],
};

pub static GEOCENTRIC_TO_GEOGRAPHIC: ParameterDescriptor = ParameterDescriptor {
    name: "Geocentric to geographic",
    parameters: &["eccentricity", "dim"],
};

/// Maximal number of fixed-point iterations when computing latitudes.
const MAXIMUM_ITERATIONS: usize = 18;

/// Latitude change (in radians) under which the iterations stop.
const ANGULAR_TOLERANCE: f64 = 1e-12;

/// The kind of geocentric coordinates produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TargetType {
    /// `(X, Y, Z)` in metres.
    Cartesian,
    /// `(longitude°, latitude°, radius)`, with the latitude measured from the centre.
    Spherical,
}

#[derive(Clone, Debug)]
pub(crate) struct EllipsoidToCentric {
    eccentricity_squared: f64,
    /// `b/a`
    axis_ratio: f64,
    with_height: bool,
}

#[derive(Clone, Debug)]
pub(crate) struct CentricToEllipsoid {
    forward: EllipsoidToCentric,
}

/// Creates the conversion from geographic `(longitude°, latitude°[, height])` to geocentric
/// coordinates, heights and Cartesian coordinates in metres.
///
/// On a sphere this is a plain spherical to Cartesian conversion.
pub fn create(
    factory: &MathTransformFactory,
    ellipsoid: &Ellipsoid,
    with_height: bool,
    target: TargetType,
) -> Result<Transform, TransformError> {
    let a = ellipsoid.semi_major_axis().get::<meter>();
    let source_dimensions = if with_height { 3 } else { 2 };
    if ellipsoid.is_sphere() {
        // (λ, φ, h) → (λ, φ, a + h)
        let mut to_spherical = Matrix::affine_identity(3, source_dimensions);
        to_spherical.set(2, source_dimensions, a);
        let to_spherical = factory.create_affine(to_spherical)?;
        return match target {
            TargetType::Spherical => Ok(to_spherical),
            TargetType::Cartesian => factory.create_concatenated(
                &to_spherical,
                &cartesian::spherical_to_cartesian(factory)?,
            ),
        };
    }
    let mut context = ContextualParameters::new(&GEOGRAPHIC_TO_GEOCENTRIC, source_dimensions, 3);
    context.set("eccentricity", ellipsoid.eccentricity())?;
    context.set("dim", source_dimensions as f64)?;
    context.normalize_geographic_inputs(0.);
    if with_height {
        context
            .normalization_mut()
            .convert_after(2, DoubleDouble::from(a).inverse(), DoubleDouble::ZERO);
    }
    for dimension in 0..3 {
        context
            .denormalization_mut()
            .convert_before(dimension, DoubleDouble::from(a), DoubleDouble::ZERO);
    }
    let kernel = Transform::new(Kind::Kernel(Kernel::EllipsoidToCentric(EllipsoidToCentric {
        eccentricity_squared: ellipsoid.eccentricity_squared(),
        axis_ratio: ellipsoid.axis_ratio(),
        with_height,
    })));
    let geocentric = context.complete_transform(factory, kernel)?;
    match target {
        TargetType::Cartesian => Ok(geocentric),
        TargetType::Spherical => {
            factory.create_concatenated(&geocentric, &cartesian::cartesian_to_spherical(factory)?)
        }
    }
}

impl EllipsoidToCentric {
    pub(crate) fn source_dimensions(&self) -> usize {
        if self.with_height {
            3
        } else {
            2
        }
    }

    pub(crate) fn target_dimensions(&self) -> usize {
        3
    }

    /// The geocentric coordinates of `(λ, φ, h)`, and the 3×3 Jacobian if asked for.
    fn centric(&self, lon: f64, lat: f64, h: f64, derivate: bool) -> ([f64; 3], Option<DMatrix<f64>>) {
        let (sin_lat, cos_lat) = lat.sin_cos();
        let (sin_lon, cos_lon) = lon.sin_cos();
        // ν is the prime vertical radius of curvature at φ
        let nu2 = 1. / (1. - self.eccentricity_squared * (sin_lat * sin_lat));
        let nu = nu2.sqrt();
        let nu_e = nu * (1. - self.eccentricity_squared);
        let r = nu + h;
        let r_cos = r * cos_lat;
        let point = [r_cos * cos_lon, r_cos * sin_lon, (nu_e + h) * sin_lat];
        if !derivate {
            return (point, None);
        }
        let sdphi = nu_e * nu2 + h;
        let dx_dh = cos_lat * cos_lon;
        let dy_dh = cos_lat * sin_lon;
        #[rustfmt::skip]
        let derivative = DMatrix::from_row_slice(3, 3, &[
            -r * dy_dh, -sdphi * (sin_lat * cos_lon), dx_dh,
             r * dx_dh, -sdphi * (sin_lat * sin_lon), dy_dh,
             0.,         sdphi * cos_lat,             sin_lat,
        ]);
        (point, Some(derivative))
    }

    pub(crate) fn transform(
        &self,
        src: &[f64],
        dst: &mut [f64],
        derivate: bool,
    ) -> Result<Option<DMatrix<f64>>, TransformError> {
        let h = if self.with_height { src[2] } else { 0. };
        let (point, derivative) = self.centric(src[0], src[1], h, derivate);
        dst.copy_from_slice(&point);
        Ok(derivative.map(|d| {
            if self.with_height {
                d
            } else {
                d.remove_column(2)
            }
        }))
    }

    /// `(λ, φ, h)` of geocentric `(X, Y, Z)`.
    fn geographic(&self, x: f64, y: f64, z: f64) -> Result<[f64; 3], TransformError> {
        let e2 = self.eccentricity_squared;
        let p = x.hypot(y);
        let lon = y.atan2(x);
        // q = atan(Z·a / (p·b)), with only sin(q) and cos(q) needed
        let tanq = z / (p * self.axis_ratio);
        let cos2q = 1. / (1. + tanq * tanq);
        let sin2q = 1. - cos2q;
        let mut lat = ((z + (e2 * (sin2q.sqrt() * sin2q)).copysign(tanq) / self.axis_ratio)
            / (p - e2 * (cos2q.sqrt() * cos2q)))
            .atan();
        let mut iterations = 0;
        loop {
            if iterations == MAXIMUM_ITERATIONS {
                return Err(TransformError::NoConvergence(MAXIMUM_ITERATIONS));
            }
            iterations += 1;
            let sin_lat = lat.sin();
            let inv_nu = (1. - e2 * (sin_lat * sin_lat)).sqrt();
            let next = ((z + e2 * sin_lat / inv_nu) / p).atan();
            let delta = lat - next;
            lat = next;
            if !(delta.abs() >= ANGULAR_TOLERANCE) {
                break;
            }
        }
        let sin_lat = lat.sin();
        let inv_nu = (1. - e2 * (sin_lat * sin_lat)).sqrt();
        // p/cos(φ) is 0/0 at the poles, where the height is simply the distance to the pole
        let h = if sin_lat.abs() == 1. {
            z.abs() - self.axis_ratio
        } else {
            p / lat.cos() - 1. / inv_nu
        };
        Ok([lon, lat, h])
    }

    pub(crate) fn inverse(&self, this: &Transform) -> Result<Transform, TransformError> {
        inverse_kernel(
            this,
            Kernel::CentricToEllipsoid(CentricToEllipsoid {
                forward: self.clone(),
            }),
            &GEOCENTRIC_TO_GEOGRAPHIC,
            |name, p| p.parameter(name),
        )
    }

    pub(crate) fn equals(&self, other: &Self, tolerance: Option<f64>) -> bool {
        self.with_height == other.with_height
            && values_equal(self.eccentricity_squared, other.eccentricity_squared, tolerance)
            && values_equal(self.axis_ratio, other.axis_ratio, tolerance)
    }

    pub(crate) fn hash_bits<H: Hasher>(&self, state: &mut H) {
        self.eccentricity_squared.to_bits().hash(state);
        self.axis_ratio.to_bits().hash(state);
        self.with_height.hash(state);
    }
}

impl CentricToEllipsoid {
    pub(crate) fn source_dimensions(&self) -> usize {
        3
    }

    pub(crate) fn target_dimensions(&self) -> usize {
        self.forward.source_dimensions()
    }

    pub(crate) fn transform(
        &self,
        src: &[f64],
        dst: &mut [f64],
        derivate: bool,
    ) -> Result<Option<DMatrix<f64>>, TransformError> {
        let geographic = self.forward.geographic(src[0], src[1], src[2])?;
        let n = self.target_dimensions();
        dst.copy_from_slice(&geographic[..n]);
        if !derivate {
            return Ok(None);
        }
        // the height is needed while inverting even if it is dropped afterwards
        let (_, forward) = self
            .forward
            .centric(geographic[0], geographic[1], geographic[2], true);
        let derivative = forward
            .and_then(|d| d.try_inverse())
            .ok_or_else(|| TransformError::OutsideDomain("singular derivative at a pole".into()))?;
        Ok(Some(if n == 3 {
            derivative
        } else {
            derivative.remove_row(2)
        }))
    }

    pub(crate) fn inverse(&self, this: &Transform) -> Result<Transform, TransformError> {
        inverse_kernel(
            this,
            Kernel::EllipsoidToCentric(self.forward.clone()),
            &GEOGRAPHIC_TO_GEOCENTRIC,
            |name, p| p.parameter(name),
        )
    }

    pub(crate) fn equals(&self, other: &Self, tolerance: Option<f64>) -> bool {
        self.forward.equals(&other.forward, tolerance)
    }

    pub(crate) fn hash_bits<H: Hasher>(&self, state: &mut H) {
        self.forward.hash_bits(state);
    }
}

impl Display for EllipsoidToCentric {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EllipsoidToCentric(e²={}, dim={})",
            self.eccentricity_squared,
            self.source_dimensions()
        )
    }
}

impl Display for CentricToEllipsoid {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CentricToEllipsoid(e²={}, dim={})",
            self.forward.eccentricity_squared,
            self.target_dimensions()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::tests::assert_derivative_matches;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn wgs84(with_height: bool) -> Transform {
        create(
            &MathTransformFactory::default(),
            &Ellipsoid::wgs84(),
            with_height,
            TargetType::Cartesian,
        )
        .unwrap()
    }

    #[rstest]
    #[case(47.9948211, 7.8211606, 1000.)]
    #[case(67.112282, 19.880389, 0.)]
    #[case(84.883074, -29.160550, 2000.)]
    #[case(-35.3619, 138.7280, 2294.)]
    #[case(0., 180., -100.)]
    fn matches_nav_types(#[case] lat: f64, #[case] lon: f64, #[case] alt: f64) {
        let expected = nav_types::ECEF::from(nav_types::WGS84::from_degrees_and_meters(lat, lon, alt));
        let t = wgs84(true);
        let ecef = t.transform_point(&[lon, lat, alt]).unwrap();
        assert_relative_eq!(ecef[0], expected.x(), epsilon = 1e-6);
        assert_relative_eq!(ecef[1], expected.y(), epsilon = 1e-6);
        assert_relative_eq!(ecef[2], expected.z(), epsilon = 1e-6);

        let back = t.inverse().unwrap().transform_point(&ecef).unwrap();
        assert_relative_eq!(back[0], lon, epsilon = 1e-9);
        assert_relative_eq!(back[1], lat, epsilon = 1e-9);
        assert_relative_eq!(back[2], alt, epsilon = 1e-6);
    }

    #[test]
    fn without_height() {
        let t = wgs84(false);
        assert_eq!(t.source_dimensions(), 2);
        let ecef = t.transform_point(&[0., 0.]).unwrap();
        assert_relative_eq!(ecef.as_slice(), [6_378_137., 0., 0.].as_slice(), epsilon = 1e-6);
        let pole = t.inverse().unwrap().transform_point(&[0., 0., 6_356_752.314_245_18]).unwrap();
        assert_relative_eq!(pole[1], 90., epsilon = 1e-12);
    }

    #[test]
    fn height_at_the_pole() {
        let kernel = EllipsoidToCentric {
            eccentricity_squared: Ellipsoid::wgs84().eccentricity_squared(),
            axis_ratio: Ellipsoid::wgs84().axis_ratio(),
            with_height: true,
        };
        let [_, lat, h] = kernel.geographic(0., 0., -(kernel.axis_ratio + 0.25)).unwrap();
        assert_eq!(lat, -std::f64::consts::FRAC_PI_2);
        assert_relative_eq!(h, 0.25, epsilon = 1e-15);
    }

    #[rstest]
    #[case(true, &[0.3, 0.8, 0.001])]
    #[case(false, &[-2.1, -0.4])]
    fn kernel_derivatives(#[case] with_height: bool, #[case] point: &[f64]) {
        let forward = Transform::new(Kind::Kernel(Kernel::EllipsoidToCentric(EllipsoidToCentric {
            eccentricity_squared: 0.0067,
            axis_ratio: (1f64 - 0.0067).sqrt(),
            with_height,
        })));
        assert_derivative_matches(&forward, point, 1e-6, 1e-8);
        let inverse = forward.inverse().unwrap();
        let centric = forward.transform_point(point).unwrap();
        assert_derivative_matches(&inverse, &centric, 1e-6, 1e-6);
    }

    #[test]
    fn sphere_is_spherical_to_cartesian() {
        let sphere = Ellipsoid::sphere(uom::si::f64::Length::new::<meter>(1000.)).unwrap();
        let factory = MathTransformFactory::default();
        let t = create(&factory, &sphere, true, TargetType::Cartesian).unwrap();
        assert!(t
            .steps()
            .iter()
            .all(|s| !matches!(s.kind(), Kind::Kernel(Kernel::EllipsoidToCentric(_)))));
        let p = t.transform_point(&[90., 0., 10.]).unwrap();
        assert_relative_eq!(p.as_slice(), [0., 1010., 0.].as_slice(), epsilon = 1e-9);

        let spherical = create(&factory, &sphere, false, TargetType::Spherical).unwrap();
        assert_eq!(spherical.transform_point(&[12., 34.]).unwrap(), vec![12., 34., 1000.]);
    }

    #[test]
    fn spherical_target() {
        let t = create(
            &MathTransformFactory::default(),
            &Ellipsoid::wgs84(),
            false,
            TargetType::Spherical,
        )
        .unwrap();
        let equator = t.transform_point(&[25., 0.]).unwrap();
        assert_relative_eq!(equator.as_slice(), [25., 0., 6_378_137.].as_slice(), epsilon = 1e-6);
        // geocentric latitudes are closer to the equator than geographic ones
        let p = t.transform_point(&[25., 45.]).unwrap();
        assert!(p[1] < 45. && p[1] > 44.);
    }
}
