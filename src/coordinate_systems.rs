//! Minimal descriptions of coordinate systems: a kind, and axes with a direction and a unit.
//!
//! Every kind of coordinate system has a _canonical_ axis order, direction, and units, which is
//! what the kernels of this crate work with:
//!
//! | kind          | canonical axes                                   |
//! |---------------|--------------------------------------------------|
//! | `Cartesian`   | `(x, y[, z])` in metres                          |
//! | `Ellipsoidal` | `(longitude°, latitude°[, height m])`            |
//! | `Spherical`   | `(longitude°, latitude°[, radius m])`            |
//! | `Polar`       | `(radius m, angle°)`, counter-clockwise          |
//! | `Cylindrical` | `(radius m, angle°, height m)`                   |
//! | `Vertical`    | `(height m)`                                     |
//!
//! [`CoordinateSystem::to_canonical`] gives the affine matrix from the declared axes to the
//! canonical ones.

use crate::error::TransformError;
use crate::matrix::Matrix;
use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use uom::si::angle::{degree, gon, radian, second};
use uom::si::f64::{Angle, Length};
use uom::si::length::{foot, kilometer, meter};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CsKind {
    Cartesian,
    Ellipsoidal,
    Spherical,
    Polar,
    Cylindrical,
    Vertical,
}

/// The direction in which the values of an axis increase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AxisDirection {
    East,
    West,
    North,
    South,
    Up,
    Down,
    /// Towards the intersection of the equator and the prime meridian.
    GeocentricX,
    /// Towards the intersection of the equator and the 90°E meridian.
    GeocentricY,
    /// Towards the north pole.
    GeocentricZ,
    /// Away from the origin, for radii of polar and cylindrical coordinates.
    AwayFrom,
    CounterClockwise,
    Clockwise,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AxisUnit {
    Metre,
    Kilometre,
    Foot,
    Degree,
    Radian,
    Grad,
    ArcSecond,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum UnitFamily {
    Length,
    Angle,
}

impl AxisUnit {
    fn family(self) -> UnitFamily {
        match self {
            AxisUnit::Metre | AxisUnit::Kilometre | AxisUnit::Foot => UnitFamily::Length,
            AxisUnit::Degree | AxisUnit::Radian | AxisUnit::Grad | AxisUnit::ArcSecond => {
                UnitFamily::Angle
            }
        }
    }

    /// How many metres or degrees make one of this unit.
    #[must_use]
    pub fn canonical_factor(self) -> f64 {
        match self {
            AxisUnit::Metre | AxisUnit::Degree => 1.,
            AxisUnit::Kilometre => Length::new::<kilometer>(1.).get::<meter>(),
            AxisUnit::Foot => Length::new::<foot>(1.).get::<meter>(),
            AxisUnit::Radian => Angle::new::<radian>(1.).get::<degree>(),
            AxisUnit::Grad => Angle::new::<gon>(1.).get::<degree>(),
            AxisUnit::ArcSecond => Angle::new::<second>(1.).get::<degree>(),
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            AxisUnit::Metre => "m",
            AxisUnit::Kilometre => "km",
            AxisUnit::Foot => "ft",
            AxisUnit::Degree => "°",
            AxisUnit::Radian => "rad",
            AxisUnit::Grad => "grad",
            AxisUnit::ArcSecond => "″",
        }
    }
}

impl UnitFamily {
    fn canonical(self) -> AxisUnit {
        match self {
            UnitFamily::Length => AxisUnit::Metre,
            UnitFamily::Angle => AxisUnit::Degree,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Axis {
    pub direction: AxisDirection,
    pub unit: AxisUnit,
}

impl Axis {
    #[must_use]
    pub fn new(direction: AxisDirection, unit: AxisUnit) -> Self {
        Self { direction, unit }
    }
}

impl CsKind {
    fn dimensions(self) -> std::ops::RangeInclusive<usize> {
        match self {
            CsKind::Cartesian | CsKind::Ellipsoidal | CsKind::Spherical => 2..=3,
            CsKind::Polar => 2..=2,
            CsKind::Cylindrical => 3..=3,
            CsKind::Vertical => 1..=1,
        }
    }

    /// The canonical position of an axis in this kind of system, and whether it is reversed.
    fn slot(self, direction: AxisDirection) -> Option<(usize, bool)> {
        use AxisDirection::*;
        let slot = match (self, direction) {
            (CsKind::Cartesian, East | GeocentricX) => (0, false),
            (CsKind::Cartesian, West) => (0, true),
            (CsKind::Cartesian, North | GeocentricY) => (1, false),
            (CsKind::Cartesian, South) => (1, true),
            (CsKind::Cartesian, Up | GeocentricZ) => (2, false),
            (CsKind::Cartesian, Down) => (2, true),
            (CsKind::Ellipsoidal | CsKind::Spherical, East) => (0, false),
            (CsKind::Ellipsoidal | CsKind::Spherical, West) => (0, true),
            (CsKind::Ellipsoidal | CsKind::Spherical, North) => (1, false),
            (CsKind::Ellipsoidal | CsKind::Spherical, South) => (1, true),
            (CsKind::Ellipsoidal, Up) | (CsKind::Spherical, Up | AwayFrom) => (2, false),
            (CsKind::Ellipsoidal, Down) => (2, true),
            (CsKind::Polar | CsKind::Cylindrical, AwayFrom) => (0, false),
            (CsKind::Polar | CsKind::Cylindrical, CounterClockwise) => (1, false),
            (CsKind::Polar | CsKind::Cylindrical, Clockwise) => (1, true),
            (CsKind::Cylindrical, Up) => (2, false),
            (CsKind::Cylindrical, Down) => (2, true),
            (CsKind::Vertical, Up) => (0, false),
            (CsKind::Vertical, Down) => (0, true),
            _ => return None,
        };
        Some(slot)
    }

    fn family(self, slot: usize) -> UnitFamily {
        match (self, slot) {
            (CsKind::Ellipsoidal | CsKind::Spherical, 0 | 1)
            | (CsKind::Polar | CsKind::Cylindrical, 1) => UnitFamily::Angle,
            _ => UnitFamily::Length,
        }
    }
}

impl Display for CsKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(self, f)
    }
}

/// A coordinate system: its kind, and its axes in the order coordinates are given.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(try_from = "RawCoordinateSystem")
)]
pub struct CoordinateSystem {
    kind: CsKind,
    axes: Vec<Axis>,
}

#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct RawCoordinateSystem {
    kind: CsKind,
    axes: Vec<Axis>,
}

#[cfg(feature = "serde")]
impl TryFrom<RawCoordinateSystem> for CoordinateSystem {
    type Error = TransformError;

    fn try_from(raw: RawCoordinateSystem) -> Result<Self, Self::Error> {
        Self::new(raw.kind, raw.axes)
    }
}

impl CoordinateSystem {
    /// Creates a coordinate system after checking that its axes make sense for `kind`.
    ///
    /// # Errors
    ///
    /// [`TransformError::InvalidParameter`] if the number or directions of the axes do not fit
    /// `kind`, and [`TransformError::Incommensurable`] if an axis has a length unit where an
    /// angle is expected or the other way around.
    pub fn new(kind: CsKind, axes: Vec<Axis>) -> Result<Self, TransformError> {
        if !kind.dimensions().contains(&axes.len()) {
            return Err(TransformError::invalid(
                "axes",
                format!("{kind} coordinate systems cannot have {} axes", axes.len()),
            ));
        }
        let mut seen = vec![false; axes.len()];
        for axis in &axes {
            let Some((slot, _)) = kind.slot(axis.direction) else {
                return Err(TransformError::invalid(
                    "axes",
                    format!("{:?} is not an axis of {kind} coordinate systems", axis.direction),
                ));
            };
            if slot >= axes.len() || seen[slot] {
                return Err(TransformError::invalid(
                    "axes",
                    format!("{:?} is redundant or misplaced in {kind} coordinate systems", axis.direction),
                ));
            }
            seen[slot] = true;
            let expected = kind.family(slot);
            if axis.unit.family() != expected {
                return Err(TransformError::Incommensurable(
                    axis.unit.symbol().to_owned(),
                    expected.canonical().symbol().to_owned(),
                ));
            }
        }
        Ok(Self { kind, axes })
    }

    fn canonical(kind: CsKind, axes: &[(AxisDirection, AxisUnit)]) -> Self {
        Self {
            kind,
            axes: axes.iter().map(|&(d, u)| Axis::new(d, u)).collect(),
        }
    }

    /// `(longitude°, latitude°)`
    #[must_use]
    pub fn geographic_2d() -> Self {
        use AxisDirection::*;
        Self::canonical(CsKind::Ellipsoidal, &[(East, AxisUnit::Degree), (North, AxisUnit::Degree)])
    }

    /// `(longitude°, latitude°, height m)`
    #[must_use]
    pub fn geographic_3d() -> Self {
        use AxisDirection::*;
        Self::canonical(
            CsKind::Ellipsoidal,
            &[
                (East, AxisUnit::Degree),
                (North, AxisUnit::Degree),
                (Up, AxisUnit::Metre),
            ],
        )
    }

    /// Earth-centred `(X, Y, Z)` in metres.
    #[must_use]
    pub fn geocentric() -> Self {
        use AxisDirection::*;
        Self::canonical(
            CsKind::Cartesian,
            &[
                (GeocentricX, AxisUnit::Metre),
                (GeocentricY, AxisUnit::Metre),
                (GeocentricZ, AxisUnit::Metre),
            ],
        )
    }

    /// `(longitude°, latitude°, radius m)`
    #[must_use]
    pub fn spherical() -> Self {
        use AxisDirection::*;
        Self::canonical(
            CsKind::Spherical,
            &[
                (East, AxisUnit::Degree),
                (North, AxisUnit::Degree),
                (AwayFrom, AxisUnit::Metre),
            ],
        )
    }

    /// `(longitude°, latitude°)` on a sphere or ellipsoid, with a spherical latitude.
    #[must_use]
    pub fn spherical_2d() -> Self {
        use AxisDirection::*;
        Self::canonical(CsKind::Spherical, &[(East, AxisUnit::Degree), (North, AxisUnit::Degree)])
    }

    /// `(east, north)` in metres.
    #[must_use]
    pub fn cartesian_2d() -> Self {
        use AxisDirection::*;
        Self::canonical(CsKind::Cartesian, &[(East, AxisUnit::Metre), (North, AxisUnit::Metre)])
    }

    /// `(radius m, angle°)`
    #[must_use]
    pub fn polar() -> Self {
        use AxisDirection::*;
        Self::canonical(
            CsKind::Polar,
            &[(AwayFrom, AxisUnit::Metre), (CounterClockwise, AxisUnit::Degree)],
        )
    }

    /// `(radius m, angle°, height m)`
    #[must_use]
    pub fn cylindrical() -> Self {
        use AxisDirection::*;
        Self::canonical(
            CsKind::Cylindrical,
            &[
                (AwayFrom, AxisUnit::Metre),
                (CounterClockwise, AxisUnit::Degree),
                (Up, AxisUnit::Metre),
            ],
        )
    }

    /// `(height m)`
    #[must_use]
    pub fn vertical() -> Self {
        Self::canonical(CsKind::Vertical, &[(AxisDirection::Up, AxisUnit::Metre)])
    }

    #[must_use]
    pub fn kind(&self) -> CsKind {
        self.kind
    }

    #[must_use]
    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.axes.len()
    }

    /// The affine matrix from coordinates in this system to canonical ones.
    #[must_use]
    pub fn to_canonical(&self) -> Matrix {
        let n = self.dimension();
        let mut m = Matrix::zeros(n + 1, n + 1);
        for (j, axis) in self.axes.iter().enumerate() {
            if let Some((slot, reversed)) = self.kind.slot(axis.direction) {
                let factor = axis.unit.canonical_factor();
                m.set(slot, j, if reversed { -factor } else { factor });
            }
        }
        m.set(n, n, 1.);
        m
    }

    /// The affine matrix from canonical coordinates to coordinates in this system.
    pub fn from_canonical(&self) -> Result<Matrix, TransformError> {
        self.to_canonical().inverse()
    }

    /// Merges the components of a compound coordinate system into a single system, if they form
    /// one (eg, horizontal geographic coordinates followed by a height).
    #[must_use]
    pub fn merge(components: &[CoordinateSystem]) -> Option<CoordinateSystem> {
        let (first, _) = components.split_first()?;
        if components.len() == 1 {
            return Some(first.clone());
        }
        let axes: Vec<Axis> = components.iter().flat_map(|c| c.axes.iter().copied()).collect();
        let kind = match first.kind {
            CsKind::Polar => CsKind::Cylindrical,
            kind => kind,
        };
        CoordinateSystem::new(kind, axes).ok()
    }
}

impl Display for CoordinateSystem {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}[", self.kind)?;
        for (i, axis) in self.axes.iter().enumerate() {
            if i != 0 {
                write!(f, ", ")?;
            }
            write!(f, "{:?} ({})", axis.direction, axis.unit.symbol())?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[test]
    fn swapped_latitude_and_longitude() {
        let cs = CoordinateSystem::new(
            CsKind::Ellipsoidal,
            vec![
                Axis::new(AxisDirection::North, AxisUnit::Degree),
                Axis::new(AxisDirection::East, AxisUnit::Degree),
            ],
        )
        .unwrap();
        #[rustfmt::skip]
        let expected = Matrix::from_row_slice(3, 3, &[
            0., 1., 0.,
            1., 0., 0.,
            0., 0., 1.,
        ]);
        assert!(cs.to_canonical().equals_strict(&expected));
        assert!(cs.from_canonical().unwrap().equals_approximately(&expected, 0.));
    }

    #[test]
    fn units_and_directions() {
        let cs = CoordinateSystem::new(
            CsKind::Cartesian,
            vec![
                Axis::new(AxisDirection::South, AxisUnit::Kilometre),
                Axis::new(AxisDirection::West, AxisUnit::Foot),
            ],
        )
        .unwrap();
        let m = cs.to_canonical();
        assert_relative_eq!(m.get(0, 1), -0.3048, max_relative = 1e-15);
        assert_relative_eq!(m.get(1, 0), -1000., max_relative = 1e-15);
        assert!(m.is_zero_at(0, 0) && m.is_zero_at(1, 1));
        assert!(m.is_affine());
    }

    #[rstest]
    #[case(AxisUnit::Degree, 1.)]
    #[case(AxisUnit::Radian, 57.295_779_513_082_32)]
    #[case(AxisUnit::Grad, 0.9)]
    #[case(AxisUnit::ArcSecond, 1. / 3600.)]
    #[case(AxisUnit::Metre, 1.)]
    #[case(AxisUnit::Kilometre, 1000.)]
    fn canonical_factors(#[case] unit: AxisUnit, #[case] expected: f64) {
        assert_relative_eq!(unit.canonical_factor(), expected, max_relative = 1e-15);
    }

    #[test]
    fn incommensurable_units() {
        let result = CoordinateSystem::new(
            CsKind::Ellipsoidal,
            vec![
                Axis::new(AxisDirection::East, AxisUnit::Metre),
                Axis::new(AxisDirection::North, AxisUnit::Degree),
            ],
        );
        assert_eq!(
            result,
            Err(TransformError::Incommensurable("m".into(), "°".into()))
        );
    }

    #[rstest]
    #[case(CsKind::Polar, &[(AxisDirection::North, AxisUnit::Metre), (AxisDirection::CounterClockwise, AxisUnit::Degree)])]
    #[case(CsKind::Cartesian, &[(AxisDirection::East, AxisUnit::Metre), (AxisDirection::West, AxisUnit::Metre)])]
    #[case(CsKind::Ellipsoidal, &[(AxisDirection::East, AxisUnit::Degree), (AxisDirection::Up, AxisUnit::Metre)])]
    #[case(CsKind::Vertical, &[(AxisDirection::Up, AxisUnit::Metre), (AxisDirection::Down, AxisUnit::Metre)])]
    fn invalid_axes(#[case] kind: CsKind, #[case] axes: &[(AxisDirection, AxisUnit)]) {
        let axes = axes.iter().map(|&(d, u)| Axis::new(d, u)).collect();
        assert!(matches!(
            CoordinateSystem::new(kind, axes),
            Err(TransformError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn merging_components() {
        let merged =
            CoordinateSystem::merge(&[CoordinateSystem::geographic_2d(), CoordinateSystem::vertical()]);
        assert_eq!(merged, Some(CoordinateSystem::geographic_3d()));
        let merged = CoordinateSystem::merge(&[CoordinateSystem::polar(), CoordinateSystem::vertical()]);
        assert_eq!(merged, Some(CoordinateSystem::cylindrical()));
        assert_eq!(
            CoordinateSystem::merge(&[CoordinateSystem::vertical(), CoordinateSystem::vertical()]),
            None
        );
        assert_eq!(CoordinateSystem::merge(&[]), None);
    }

    #[test]
    fn serde() {
        let cs = CoordinateSystem::cylindrical();
        let yaml = serde_yaml::to_string(&cs).unwrap();
        assert_eq!(serde_yaml::from_str::<CoordinateSystem>(&yaml).unwrap(), cs);
        let invalid = "kind: Polar\naxes:\n- direction: Up\n  unit: Metre\n";
        assert!(serde_yaml::from_str::<CoordinateSystem>(invalid).is_err());
    }

    #[test]
    fn display() {
        insta::assert_snapshot!(CoordinateSystem::geographic_3d(), @"Ellipsoidal[East (°), North (°), Up (m)]");
    }
}
