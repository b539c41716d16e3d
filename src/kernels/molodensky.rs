//! Datum shifts with the Molodensky formulas.
//!
//! The Molodensky formulas approximate the exact chain "geographic to geocentric on the source
//! ellipsoid, translate the geocentric origin, geocentric to geographic on the target ellipsoid"
//! with a direct correction of `(λ, φ, h)`. The abridged variant drops the height-dependent terms,
//! which makes it slightly less accurate but independent of the height.
//!
//! The kernel works on `(λ, φ[, h])` with angles in radians and heights in metres.

use super::{inverse_kernel, Kernel};
use crate::contextual::{ContextualParameters, ParameterDescriptor};
use crate::ellipsoid::Ellipsoid;
use crate::error::TransformError;
use crate::factory::MathTransformFactory;
use crate::matrix::Matrix;
use crate::transform::{values_equal, Kind, Transform};
use nalgebra::DMatrix;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use uom::si::f64::Length;
use uom::si::length::meter;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

const PARAMETERS: &[&str] = &[
    "dim",
    "tX",
    "tY",
    "tZ",
    "src_semi_major",
    "src_semi_minor",
    "tgt_semi_major",
    "tgt_semi_minor",
];

pub static MOLODENSKY: ParameterDescriptor = ParameterDescriptor {
    name: "Molodensky",
    parameters: PARAMETERS,
};

pub static ABRIDGED_MOLODENSKY: ParameterDescriptor = ParameterDescriptor {
    name: "Abridged Molodensky",
    parameters: PARAMETERS,
};

/// `1/sin(1″)` times the size of an arc-second in radians: the final factor applied to `Δλ` and
/// `Δφ`.
const ANGULAR_SCALE: f64 = 1.000_000_000_003_917_44;

/// Translation between two geodetic datums.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MolodenskyParameters {
    /// Position of the source geocentric origin in the target geocentric system, along X, Y, Z.
    pub translation: [Length; 3],
    /// Whether to use the abridged formulas.
    #[cfg_attr(feature = "serde", serde(default))]
    pub abridged: bool,
}

impl MolodenskyParameters {
    #[must_use]
    pub fn new(x: impl Into<Length>, y: impl Into<Length>, z: impl Into<Length>) -> Self {
        Self {
            translation: [x.into(), y.into(), z.into()],
            abridged: false,
        }
    }

    #[must_use]
    pub fn abridged(self) -> Self {
        Self {
            abridged: true,
            ..self
        }
    }

    fn translation_in_metres(&self) -> Result<[f64; 3], TransformError> {
        let t = self.translation.map(|t| t.get::<meter>());
        for (name, value) in ["tX", "tY", "tZ"].into_iter().zip(t) {
            if !value.is_finite() {
                return Err(TransformError::invalid(name, format!("{value} m is not finite")));
            }
        }
        Ok(t)
    }
}

#[derive(Clone, Debug)]
pub(crate) struct MolodenskyKernel {
    source: Ellipsoid,
    target: Ellipsoid,
    source_3d: bool,
    target_3d: bool,
    abridged: bool,
    translation: [f64; 3],
    semi_major: f64,
    eccentricity_squared: f64,
    /// Semi-major axis of the target minus the one of the source.
    da: f64,
    /// `b·Δf`, or `a·Δf + f·Δa` for the abridged formulas.
    dfmod: f64,
}

/// Creates the datum shift from geographic `(longitude°, latitude°[, height m])` on `source` to
/// the same on `target`.
///
/// Without a source height, the points are taken to be on the ellipsoid. Without a target height,
/// the computed height is dropped.
pub fn create(
    factory: &MathTransformFactory,
    source: &Ellipsoid,
    source_3d: bool,
    target: &Ellipsoid,
    target_3d: bool,
    parameters: &MolodenskyParameters,
) -> Result<Transform, TransformError> {
    let translation = parameters.translation_in_metres()?;
    let (s, t) = (dimension(source_3d), dimension(target_3d));
    if translation == [0.; 3] && source == target {
        return factory.create_affine(Matrix::affine_identity(t, s));
    }
    let descriptor = if parameters.abridged {
        &ABRIDGED_MOLODENSKY
    } else {
        &MOLODENSKY
    };
    let mut context = ContextualParameters::new(descriptor, s, t);
    if s == t {
        context.set("dim", s as f64)?;
    }
    for (name, value) in ["tX", "tY", "tZ"].into_iter().zip(translation) {
        context.set(name, value)?;
    }
    context.set("src_semi_major", source.semi_major_axis().get::<meter>())?;
    context.set("src_semi_minor", source.semi_minor_axis().get::<meter>())?;
    context.set("tgt_semi_major", target.semi_major_axis().get::<meter>())?;
    context.set("tgt_semi_minor", target.semi_minor_axis().get::<meter>())?;
    context.normalize_geographic_inputs(0.);
    context.denormalize_geographic_outputs(0.);
    let kernel = MolodenskyKernel::new(
        *source,
        source_3d,
        *target,
        target_3d,
        translation,
        parameters.abridged,
    );
    context.complete_transform(
        factory,
        Transform::new(Kind::Kernel(Kernel::Molodensky(kernel))),
    )
}

fn dimension(with_height: bool) -> usize {
    if with_height {
        3
    } else {
        2
    }
}

impl MolodenskyKernel {
    fn new(
        source: Ellipsoid,
        source_3d: bool,
        target: Ellipsoid,
        target_3d: bool,
        translation: [f64; 3],
        abridged: bool,
    ) -> Self {
        let a = source.semi_major_axis().get::<meter>();
        let b = source.semi_minor_axis().get::<meter>();
        let da = target.semi_major_axis().get::<meter>() - a;
        let df = target.flattening() - source.flattening();
        let dfmod = if abridged {
            a * df + (a - b) * (da / a)
        } else {
            b * df
        };
        Self {
            source,
            target,
            source_3d,
            target_3d,
            abridged,
            translation,
            semi_major: a,
            eccentricity_squared: source.eccentricity_squared(),
            da,
            dfmod,
        }
    }

    pub(crate) fn source_dimensions(&self) -> usize {
        dimension(self.source_3d)
    }

    pub(crate) fn target_dimensions(&self) -> usize {
        dimension(self.target_3d)
    }

    /// The shifted `(λ, φ, h)`, and the 3×3 Jacobian if asked for.
    fn shift(&self, lon: f64, lat: f64, h: f64, derivate: bool) -> ([f64; 3], Option<DMatrix<f64>>) {
        let [tx, ty, tz] = self.translation;
        let (a, e2, da, dfmod) = (self.semi_major, self.eccentricity_squared, self.da, self.dfmod);
        let (sin_lon, cos_lon) = lon.sin_cos();
        let (sin_lat, cos_lat) = lat.sin_cos();
        let sin2 = sin_lat * sin_lat;
        // w = a/ν, and ρ = a(1 - e²)/w³
        let w2 = 1. - e2 * sin2;
        let w = w2.sqrt();
        let w3 = w2 * w;
        let rho0 = a * (1. - e2) / w3;
        let nu0 = a / w;
        // d ln(ν)/dφ
        let dnu = e2 * sin_lat * cos_lat / w2;
        let (rho, nu, t, dt) = if self.abridged {
            (rho0, nu0, 2. * dfmod, 0.)
        } else {
            (
                rho0 + h,
                nu0 + h,
                dfmod * (1. / w + 1. / w3) + da * e2 / w,
                dfmod * (dnu / w + 3. * dnu / w3) + da * e2 * dnu / w,
            )
        };
        let spc = ty * sin_lon + tx * cos_lon;
        let cms = ty * cos_lon - tx * sin_lon;
        let n = (tz + t * sin_lat) * cos_lat - spc * sin_lat;
        let scale_x = ANGULAR_SCALE / (nu * cos_lat);
        let scale_y = ANGULAR_SCALE / rho;
        let height = if self.abridged {
            h + spc * cos_lat + tz * sin_lat + dfmod * sin2 - da
        } else {
            h + spc * cos_lat + tz * sin_lat + dfmod * sin2 / w - da * w
        };
        let point = [lon + cms * scale_x, lat + n * scale_y, height];
        if !derivate {
            return (point, None);
        }
        let dn = -tz * sin_lat + dt * sin_lat * cos_lat + t * (cos_lat * cos_lat - sin2)
            - spc * cos_lat;
        let mut d = DMatrix::zeros(3, 3);
        d[(0, 0)] = 1. - spc * scale_x;
        d[(0, 1)] = scale_x * cms * (sin_lat / cos_lat - nu0 * dnu / nu);
        d[(1, 0)] = -scale_y * cms * sin_lat;
        d[(1, 1)] = 1. + scale_y * (dn - n * 3. * dnu * rho0 / rho);
        d[(2, 0)] = cms * cos_lat;
        d[(2, 2)] = 1.;
        if self.abridged {
            d[(2, 1)] = -spc * sin_lat + tz * cos_lat + 2. * dfmod * sin_lat * cos_lat;
        } else {
            d[(2, 1)] = -spc * sin_lat
                + tz * cos_lat
                + dfmod * (2. * sin_lat * cos_lat / w + sin2 * dnu / w)
                + da * w * dnu;
            d[(0, 2)] = -cms / nu * scale_x;
            d[(1, 2)] = -n / rho * scale_y;
        }
        (point, Some(d))
    }

    pub(crate) fn transform(
        &self,
        src: &[f64],
        dst: &mut [f64],
        derivate: bool,
    ) -> Result<Option<DMatrix<f64>>, TransformError> {
        let h = if self.source_3d { src[2] } else { 0. };
        let (point, derivative) = self.shift(src[0], src[1], h, derivate);
        let n = self.target_dimensions();
        dst.copy_from_slice(&point[..n]);
        Ok(derivative.map(|mut d| {
            if !self.source_3d {
                d = d.remove_column(2);
            }
            if !self.target_3d {
                d = d.remove_row(2);
            }
            d
        }))
    }

    /// The same formulas from the target datum back to the source one, which is only an
    /// approximate inverse.
    pub(crate) fn inverse(&self, this: &Transform) -> Result<Transform, TransformError> {
        let reverse = Self::new(
            self.target,
            self.target_3d,
            self.source,
            self.source_3d,
            self.translation.map(|t| -t),
            self.abridged,
        );
        let descriptor = if self.abridged {
            &ABRIDGED_MOLODENSKY
        } else {
            &MOLODENSKY
        };
        inverse_kernel(this, Kernel::Molodensky(reverse), descriptor, |name, p| {
            match name {
                "tX" | "tY" | "tZ" => p.parameter(name).map(|t| -t),
                "src_semi_major" => p.parameter("tgt_semi_major"),
                "src_semi_minor" => p.parameter("tgt_semi_minor"),
                "tgt_semi_major" => p.parameter("src_semi_major"),
                "tgt_semi_minor" => p.parameter("src_semi_minor"),
                _ => p.parameter(name),
            }
        })
    }

    pub(crate) fn equals(&self, other: &Self, tolerance: Option<f64>) -> bool {
        self.source_3d == other.source_3d
            && self.target_3d == other.target_3d
            && self.abridged == other.abridged
            && self
                .translation
                .iter()
                .zip(&other.translation)
                .all(|(a, b)| values_equal(*a, *b, tolerance))
            && values_equal(self.semi_major, other.semi_major, tolerance)
            && values_equal(self.eccentricity_squared, other.eccentricity_squared, tolerance)
            && values_equal(self.da, other.da, tolerance)
            && values_equal(self.dfmod, other.dfmod, tolerance)
    }

    pub(crate) fn hash_bits<H: Hasher>(&self, state: &mut H) {
        (self.source_3d, self.target_3d, self.abridged).hash(state);
        for v in self.translation {
            v.to_bits().hash(state);
        }
        for v in [self.semi_major, self.eccentricity_squared, self.da, self.dfmod] {
            v.to_bits().hash(state);
        }
    }
}

impl Display for MolodenskyKernel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let [tx, ty, tz] = self.translation;
        write!(
            f,
            "{}(t=[{tx}, {ty}, {tz}] m, Δa={} m, dim={}→{})",
            if self.abridged {
                "AbridgedMolodensky"
            } else {
                "Molodensky"
            },
            self.da,
            self.source_dimensions(),
            self.target_dimensions()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::centric::{self, TargetType};
    use crate::transform::tests::assert_derivative_matches;
    use crate::ComparisonMode;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn international_1924() -> Ellipsoid {
        Ellipsoid::from_inverse_flattening(Length::new::<meter>(6_378_388.), 297.).unwrap()
    }

    fn wgs84_to_ed50() -> MolodenskyParameters {
        MolodenskyParameters::new(
            Length::new::<meter>(84.87),
            Length::new::<meter>(96.49),
            Length::new::<meter>(116.95),
        )
    }

    /// A point in the North Sea, `(longitude°, latitude°, height m)`.
    const POINT: [f64; 3] = [2.129_55, 53.809_394_44, 73.];

    #[test]
    fn wgs84_to_ed50_height() {
        let factory = MathTransformFactory::default();
        let t = create(
            &factory,
            &Ellipsoid::wgs84(),
            true,
            &international_1924(),
            true,
            &wgs84_to_ed50(),
        )
        .unwrap();
        let shifted = t.transform_point(&POINT).unwrap();
        assert_relative_eq!(shifted[0], 2.130_965_843, epsilon = 1e-8);
        assert_relative_eq!(shifted[1], 53.810_157_056, epsilon = 1e-8);
        assert_relative_eq!(shifted[2], 28.02, epsilon = 0.01);
    }

    #[rstest]
    #[case(false, 1e-7, 0.01)]
    #[case(true, 1e-5, 0.1)]
    fn close_to_geocentric_translation(
        #[case] abridged: bool,
        #[case] angular: f64,
        #[case] linear: f64,
    ) {
        let factory = MathTransformFactory::default();
        let parameters = MolodenskyParameters {
            abridged,
            ..wgs84_to_ed50()
        };
        let to_geocentric =
            centric::create(&factory, &Ellipsoid::wgs84(), true, TargetType::Cartesian).unwrap();
        let from_geocentric =
            centric::create(&factory, &international_1924(), true, TargetType::Cartesian)
                .unwrap()
                .inverse()
                .unwrap();
        let mut xyz = to_geocentric.transform_point(&POINT).unwrap();
        for (x, t) in xyz.iter_mut().zip([84.87, 96.49, 116.95]) {
            *x += t;
        }
        let exact = from_geocentric.transform_point(&xyz).unwrap();
        let t = create(
            &factory,
            &Ellipsoid::wgs84(),
            true,
            &international_1924(),
            true,
            &parameters,
        )
        .unwrap();
        let shifted = t.transform_point(&POINT).unwrap();
        assert_relative_eq!(shifted[0], exact[0], epsilon = angular);
        assert_relative_eq!(shifted[1], exact[1], epsilon = angular);
        assert_relative_eq!(shifted[2], exact[2], epsilon = linear);
    }

    #[rstest]
    #[case(false, true, true)]
    #[case(true, true, true)]
    #[case(false, false, true)]
    #[case(false, true, false)]
    fn derivative(#[case] abridged: bool, #[case] source_3d: bool, #[case] target_3d: bool) {
        let t = create(
            &MathTransformFactory::default(),
            &Ellipsoid::wgs84(),
            source_3d,
            &international_1924(),
            target_3d,
            &MolodenskyParameters {
                abridged,
                ..wgs84_to_ed50()
            },
        )
        .unwrap();
        let point = &POINT[..t.source_dimensions()];
        assert_derivative_matches(&t, point, 1e-6, 1e-6);
    }

    #[test]
    fn inverse_round_trips() {
        let factory = MathTransformFactory::default();
        let t = create(
            &factory,
            &Ellipsoid::wgs84(),
            true,
            &international_1924(),
            true,
            &wgs84_to_ed50(),
        )
        .unwrap();
        let inverse = t.inverse().unwrap();
        let back = inverse
            .transform_point(&t.transform_point(&POINT).unwrap())
            .unwrap();
        assert_relative_eq!(back[0], POINT[0], epsilon = 1e-6);
        assert_relative_eq!(back[1], POINT[1], epsilon = 1e-6);
        assert_relative_eq!(back[2], POINT[2], epsilon = 0.01);
        assert!(inverse.inverse().unwrap().ptr_eq(&t));
    }

    #[test]
    fn inverse_parameters_are_swapped() {
        let factory = MathTransformFactory::default();
        let t = create(
            &factory,
            &Ellipsoid::wgs84(),
            false,
            &international_1924(),
            false,
            &wgs84_to_ed50().abridged(),
        )
        .unwrap();
        let kernel = t.steps()[1].clone();
        let forward = kernel.contextual_parameters().unwrap();
        assert!(std::ptr::eq(forward.descriptor(), &ABRIDGED_MOLODENSKY));
        assert_eq!(forward.parameter("dim"), Some(2.));
        let inverse = kernel.inverse().unwrap();
        let reverse = inverse.contextual_parameters().unwrap();
        assert_eq!(reverse.parameter("tX"), Some(-84.87));
        assert_eq!(reverse.parameter("src_semi_major"), Some(6_378_388.));
        assert_eq!(reverse.parameter("tgt_semi_major"), Some(6_378_137.));
    }

    #[test]
    fn no_shift_is_linear() {
        let factory = MathTransformFactory::default();
        let zero = MolodenskyParameters::new(
            Length::new::<meter>(0.),
            Length::new::<meter>(0.),
            Length::new::<meter>(0.),
        );
        let t = create(&factory, &Ellipsoid::wgs84(), true, &Ellipsoid::wgs84(), false, &zero)
            .unwrap();
        assert!(t.matrix().is_some());
        assert_eq!(t.transform_point(&POINT).unwrap(), POINT[..2].to_vec());
    }

    #[test]
    fn non_finite_translation() {
        let parameters = MolodenskyParameters::new(
            Length::new::<meter>(f64::NAN),
            Length::new::<meter>(0.),
            Length::new::<meter>(0.),
        );
        assert!(matches!(
            create(
                &MathTransformFactory::default(),
                &Ellipsoid::wgs84(),
                true,
                &international_1924(),
                true,
                &parameters,
            ),
            Err(TransformError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn equality_and_display() {
        let build = |abridged| {
            create(
                &MathTransformFactory::new(crate::FactoryOptions { use_cache: false }),
                &Ellipsoid::wgs84(),
                true,
                &international_1924(),
                true,
                &MolodenskyParameters {
                    abridged,
                    ..wgs84_to_ed50()
                },
            )
            .unwrap()
        };
        assert!(build(false).equals(&build(false), ComparisonMode::Strict));
        assert!(!build(false).equals(&build(true), ComparisonMode::Approximate));
        insta::assert_snapshot!(
            build(true).steps()[1],
            @"AbridgedMolodensky(t=[84.87, 96.49, 116.95] m, Δa=251 m, dim=3→3)"
        );
    }
}
