use crate::error::TransformError;
use std::fmt;
use std::fmt::Display;
use uom::si::f64::Length;
use uom::si::length::meter;

#[cfg(any(test, feature = "approx"))]
use approx::{AbsDiffEq, RelativeEq};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// Parameters of the WGS84 ellipsoid
// https://nsgreg.nga.mil/doc/view?i=4085 table 3.1
#[doc(alias = "equatorial radius")]
#[doc(alias = "a")]
const WGS84_SEMI_MAJOR_AXIS: f64 = 6_378_137.0;
#[doc(alias = "1/f")]
const WGS84_INVERSE_FLATTENING: f64 = 298.257_223_563;

/// An ellipsoid of revolution, flattened at the poles.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Ellipsoid {
    semi_major_axis: Length,
    semi_minor_axis: Length,
}

impl Ellipsoid {
    /// Creates an ellipsoid from its equatorial and polar radii.
    ///
    /// Both must be positive and finite, and the polar radius may not exceed the equatorial one.
    pub fn new(
        semi_major_axis: impl Into<Length>,
        semi_minor_axis: impl Into<Length>,
    ) -> Result<Self, TransformError> {
        let (a, b) = (semi_major_axis.into(), semi_minor_axis.into());
        let (am, bm) = (a.get::<meter>(), b.get::<meter>());
        if !(am > 0. && am.is_finite()) {
            return Err(TransformError::invalid(
                "semi_major_axis",
                format!("{am} m is not a positive length"),
            ));
        }
        if !(bm > 0. && bm <= am) {
            return Err(TransformError::invalid(
                "semi_minor_axis",
                format!("{bm} m is not a positive length up to {am} m"),
            ));
        }
        Ok(Self {
            semi_major_axis: a,
            semi_minor_axis: b,
        })
    }

    /// Creates an ellipsoid from its equatorial radius and `1/f`.
    ///
    /// An infinite inverse flattening gives a sphere.
    pub fn from_inverse_flattening(
        semi_major_axis: impl Into<Length>,
        inverse_flattening: f64,
    ) -> Result<Self, TransformError> {
        if !(inverse_flattening >= 1.) {
            return Err(TransformError::invalid(
                "inverse_flattening",
                format!("{inverse_flattening} is not at least 1"),
            ));
        }
        let a = semi_major_axis.into();
        // b = a·(1 - f)
        Self::new(a, a * (1. - 1. / inverse_flattening))
    }

    pub fn sphere(radius: impl Into<Length>) -> Result<Self, TransformError> {
        let radius = radius.into();
        Self::new(radius, radius)
    }

    #[must_use]
    pub fn wgs84() -> Self {
        let a = Length::new::<meter>(WGS84_SEMI_MAJOR_AXIS);
        Self {
            semi_major_axis: a,
            semi_minor_axis: a * (1. - 1. / WGS84_INVERSE_FLATTENING),
        }
    }

    #[must_use]
    #[doc(alias = "a")]
    pub fn semi_major_axis(&self) -> Length {
        self.semi_major_axis
    }

    #[must_use]
    #[doc(alias = "b")]
    pub fn semi_minor_axis(&self) -> Length {
        self.semi_minor_axis
    }

    #[must_use]
    #[doc(alias = "f")]
    pub fn flattening(&self) -> f64 {
        1. - self.axis_ratio()
    }

    /// `b/a`
    #[must_use]
    pub fn axis_ratio(&self) -> f64 {
        self.semi_minor_axis.get::<meter>() / self.semi_major_axis.get::<meter>()
    }

    #[must_use]
    #[doc(alias = "e^2")]
    pub fn eccentricity_squared(&self) -> f64 {
        // e² = 1 - b²/a² = 2f - f², which loses less precision for small f
        let f = self.flattening();
        f * (2. - f)
    }

    #[must_use]
    #[doc(alias = "e")]
    pub fn eccentricity(&self) -> f64 {
        self.eccentricity_squared().sqrt()
    }

    #[must_use]
    pub fn is_sphere(&self) -> bool {
        self.semi_major_axis == self.semi_minor_axis
    }
}

impl Display for Ellipsoid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Ellipsoid(a={} m, b={} m)",
            self.semi_major_axis.get::<meter>(),
            self.semi_minor_axis.get::<meter>()
        )
    }
}

#[cfg(any(test, feature = "approx"))]
impl AbsDiffEq<Self> for Ellipsoid {
    type Epsilon = Length;

    fn default_epsilon() -> Self::Epsilon {
        Length::new::<meter>(f64::default_epsilon())
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        let epsilon = epsilon.get::<meter>();
        self.semi_major_axis
            .get::<meter>()
            .abs_diff_eq(&other.semi_major_axis.get::<meter>(), epsilon)
            && self
                .semi_minor_axis
                .get::<meter>()
                .abs_diff_eq(&other.semi_minor_axis.get::<meter>(), epsilon)
    }
}

#[cfg(any(test, feature = "approx"))]
impl RelativeEq for Ellipsoid {
    fn default_max_relative() -> Self::Epsilon {
        Length::new::<meter>(f64::default_max_relative())
    }

    fn relative_eq(
        &self,
        other: &Self,
        epsilon: Self::Epsilon,
        max_relative: Self::Epsilon,
    ) -> bool {
        let (epsilon, max_relative) = (epsilon.get::<meter>(), max_relative.get::<meter>());
        self.semi_major_axis.get::<meter>().relative_eq(
            &other.semi_major_axis.get::<meter>(),
            epsilon,
            max_relative,
        ) && self.semi_minor_axis.get::<meter>().relative_eq(
            &other.semi_minor_axis.get::<meter>(),
            epsilon,
            max_relative,
        )
    }
}
