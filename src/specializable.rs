//! Transforms which behave differently in some areas of their source domain.
//!
//! A global transform is used everywhere, except in a set of areas where another transform
//! overrides it. Areas may be nested within each other but may not partially overlap; a point
//! is transformed by the smallest area that contains it.

use crate::error::TransformError;
use crate::transform::{fmt_values, Kind, Transform};
use nalgebra::DMatrix;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

#[cfg(any(test, feature = "approx"))]
use approx::{AbsDiffEq, RelativeEq};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// An axis-aligned box, bounds included.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Envelope {
    lower: Vec<f64>,
    upper: Vec<f64>,
}

impl Envelope {
    /// Creates the box spanning `lower[i]..=upper[i]` along each dimension `i`.
    pub fn new(lower: Vec<f64>, upper: Vec<f64>) -> Result<Self, TransformError> {
        if lower.len() != upper.len() {
            return Err(TransformError::mismatched(
                "envelope corners",
                lower.len(),
                upper.len(),
            ));
        }
        if let Some(i) = (0..lower.len()).find(|&i| !(lower[i] <= upper[i])) {
            return Err(TransformError::invalid(
                "envelope",
                format!("lower bound {} exceeds upper bound {} in dimension {i}", lower[i], upper[i]),
            ));
        }
        Ok(Self { lower, upper })
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.lower.len()
    }

    #[must_use]
    pub fn lower(&self) -> &[f64] {
        &self.lower
    }

    #[must_use]
    pub fn upper(&self) -> &[f64] {
        &self.upper
    }

    /// Whether the point is inside this box or on its border.
    #[must_use]
    pub fn contains(&self, point: &[f64]) -> bool {
        point.len() == self.dimension()
            && point
                .iter()
                .zip(self.lower.iter().zip(&self.upper))
                .all(|(p, (l, u))| l <= p && p <= u)
    }

    /// Whether `other` lies entirely in this box.
    #[must_use]
    pub fn contains_envelope(&self, other: &Envelope) -> bool {
        self.contains(&other.lower) && self.contains(&other.upper)
    }

    /// Whether the two boxes share some interior. Boxes which only touch do not.
    #[must_use]
    pub fn overlaps(&self, other: &Envelope) -> bool {
        (0..self.dimension()).all(|i| self.lower[i] < other.upper[i] && other.lower[i] < self.upper[i])
    }
}

impl Display for Envelope {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        fmt_values(f, &self.lower)?;
        write!(f, "..")?;
        fmt_values(f, &self.upper)
    }
}

#[cfg(any(test, feature = "approx"))]
impl AbsDiffEq<Self> for Envelope {
    type Epsilon = f64;

    fn default_epsilon() -> Self::Epsilon {
        f64::default_epsilon()
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        self.lower[..].abs_diff_eq(&other.lower[..], epsilon)
            && self.upper[..].abs_diff_eq(&other.upper[..], epsilon)
    }
}

#[cfg(any(test, feature = "approx"))]
impl RelativeEq for Envelope {
    fn default_max_relative() -> Self::Epsilon {
        f64::default_max_relative()
    }

    fn relative_eq(
        &self,
        other: &Self,
        epsilon: Self::Epsilon,
        max_relative: Self::Epsilon,
    ) -> bool {
        self.lower[..].relative_eq(&other.lower[..], epsilon, max_relative)
            && self.upper[..].relative_eq(&other.upper[..], epsilon, max_relative)
    }
}

/// An area together with the transform to use there, and the smaller areas within it.
#[derive(Clone, Debug)]
struct SubArea {
    area: Envelope,
    transform: Transform,
    nested: Vec<SubArea>,
}

impl SubArea {
    /// Adds `candidate` to this level of the tree, or below the area containing it.
    fn insert(level: &mut Vec<SubArea>, mut candidate: SubArea) -> Result<(), TransformError> {
        for existing in level.iter_mut() {
            if existing.area.contains_envelope(&candidate.area) {
                if candidate.area.contains_envelope(&existing.area) {
                    return Err(TransformError::invalid(
                        "areas",
                        format!("{} is given twice", candidate.area),
                    ));
                }
                return Self::insert(&mut existing.nested, candidate);
            }
        }
        let mut i = 0;
        while i < level.len() {
            if candidate.area.contains_envelope(&level[i].area) {
                let inner = level.swap_remove(i);
                candidate.nested.push(inner);
            } else if candidate.area.overlaps(&level[i].area) {
                return Err(TransformError::invalid(
                    "areas",
                    format!("{} partially overlaps {}", candidate.area, level[i].area),
                ));
            } else {
                i += 1;
            }
        }
        level.push(candidate);
        Ok(())
    }

    /// The innermost area containing `point`.
    fn locate<'a>(level: &'a [SubArea], point: &[f64]) -> Option<&'a SubArea> {
        let outer = level.iter().find(|a| a.area.contains(point))?;
        Some(Self::locate(&outer.nested, point).unwrap_or(outer))
    }

    fn inverse(&self) -> Result<SubArea, TransformError> {
        Ok(SubArea {
            area: self.area.clone(),
            transform: self.transform.inverse()?,
            nested: self
                .nested
                .iter()
                .map(SubArea::inverse)
                .collect::<Result<_, _>>()?,
        })
    }

    fn count(level: &[SubArea]) -> usize {
        level.iter().map(|a| 1 + Self::count(&a.nested)).sum()
    }

    fn equals(a: &[SubArea], b: &[SubArea], tolerance: Option<f64>) -> bool {
        a.len() == b.len()
            && a.iter().zip(b).all(|(a, b)| {
                a.area == b.area
                    && a.transform.equals_within(&b.transform, tolerance)
                    && Self::equals(&a.nested, &b.nested, tolerance)
            })
    }

    fn hash_bits<H: Hasher>(level: &[SubArea], state: &mut H) {
        level.len().hash(state);
        for a in level {
            for v in a.area.lower.iter().chain(&a.area.upper) {
                v.to_bits().hash(state);
            }
            a.transform.hash_into(state);
            Self::hash_bits(&a.nested, state);
        }
    }
}

/// Whether the areas are expressed in the source or the target space of the transform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Direction {
    Forward,
    /// Areas are in target space: the area is found from an estimate of the output.
    Inverse,
}

#[derive(Clone, Debug)]
pub(crate) struct SpecializableTransform {
    global: Transform,
    areas: Vec<SubArea>,
    direction: Direction,
}

/// How many times the inverse may refine its guess of which area a point comes from.
const MAX_AREA_REFINEMENTS: usize = 4;

/// Creates a transform using `global` everywhere except in the given areas, which use their own
/// transform.
///
/// Every transform must have the dimensions of `global`, and every area must have its source
/// dimension. Areas may nest but must not partially overlap.
pub fn create(
    global: &Transform,
    specializations: Vec<(Envelope, Transform)>,
) -> Result<Transform, TransformError> {
    if specializations.is_empty() {
        return Ok(global.clone());
    }
    let (s, t) = (global.source_dimensions(), global.target_dimensions());
    let mut areas = Vec::new();
    for (area, transform) in specializations {
        if area.dimension() != s {
            return Err(TransformError::mismatched("area", s, area.dimension()));
        }
        if transform.source_dimensions() != s {
            return Err(TransformError::mismatched(
                "specialized transform source",
                s,
                transform.source_dimensions(),
            ));
        }
        if transform.target_dimensions() != t {
            return Err(TransformError::mismatched(
                "specialized transform target",
                t,
                transform.target_dimensions(),
            ));
        }
        SubArea::insert(
            &mut areas,
            SubArea {
                area,
                transform,
                nested: Vec::new(),
            },
        )?;
    }
    Ok(Transform::new(Kind::Specializable(SpecializableTransform {
        global: global.clone(),
        areas,
        direction: Direction::Forward,
    })))
}

impl SpecializableTransform {
    pub(crate) fn source_dimensions(&self) -> usize {
        self.global.source_dimensions()
    }

    pub(crate) fn target_dimensions(&self) -> usize {
        self.global.target_dimensions()
    }

    /// The transform to use for `src`.
    fn select(&self, src: &[f64]) -> Result<&Transform, TransformError> {
        if self.direction == Direction::Forward {
            return Ok(SubArea::locate(&self.areas, src).map_or(&self.global, |a| &a.transform));
        }
        let mut guess = self.global.transform_point(src)?;
        let mut area = SubArea::locate(&self.areas, &guess);
        for _ in 0..MAX_AREA_REFINEMENTS {
            let Some(current) = area else {
                break;
            };
            guess = current.transform.transform_point(src)?;
            let found = SubArea::locate(&self.areas, &guess);
            if found.is_some_and(|found| std::ptr::eq(found, current)) {
                break;
            }
            area = found;
        }
        Ok(area.map_or(&self.global, |a| &a.transform))
    }

    pub(crate) fn transform(
        &self,
        src: &[f64],
        dst: &mut [f64],
        derivate: bool,
    ) -> Result<Option<DMatrix<f64>>, TransformError> {
        self.select(src)?.transform_into(src, dst, derivate)
    }

    pub(crate) fn inverse(&self, _this: &Transform) -> Result<Transform, TransformError> {
        Ok(Transform::new(Kind::Specializable(SpecializableTransform {
            global: self.global.inverse()?,
            areas: self
                .areas
                .iter()
                .map(SubArea::inverse)
                .collect::<Result<_, _>>()?,
            direction: match self.direction {
                Direction::Forward => Direction::Inverse,
                Direction::Inverse => Direction::Forward,
            },
        })))
    }

    pub(crate) fn equals(&self, other: &Self, tolerance: Option<f64>) -> bool {
        self.direction == other.direction
            && self.global.equals_within(&other.global, tolerance)
            && SubArea::equals(&self.areas, &other.areas, tolerance)
    }

    pub(crate) fn hash_bits<H: Hasher>(&self, state: &mut H) {
        self.direction.hash(state);
        self.global.hash_into(state);
        SubArea::hash_bits(&self.areas, state);
    }
}

impl Display for SpecializableTransform {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Specializable({}, {} areas)",
            self.global,
            SubArea::count(&self.areas)
        )
    }
}
