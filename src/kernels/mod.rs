//! Non-linear kernels working in normalized units.
//!
//! Each kernel is meant to be used between the normalization and denormalization matrices of its
//! [`ContextualParameters`](crate::ContextualParameters); the public `create` functions of the
//! submodules return that complete chain.

use crate::contextual::ParameterDescriptor;
use crate::error::TransformError;
use crate::transform::Transform;
use nalgebra::DMatrix;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

pub mod cartesian;
pub mod centric;
pub mod interpolated;
pub mod molodensky;
pub mod pole_rotation;
pub mod radius;
pub mod wraparound;

/// The descriptors of every kernel of this crate.
pub(crate) static DESCRIPTORS: &[&ParameterDescriptor] = &[
    &radius::ELLIPSOID_TO_RADIUS,
    &radius::RADIUS_TO_ELLIPSOID,
    &centric::GEOGRAPHIC_TO_GEOCENTRIC,
    &centric::GEOCENTRIC_TO_GEOGRAPHIC,
    &cartesian::SPHERICAL_TO_CARTESIAN,
    &cartesian::CARTESIAN_TO_SPHERICAL,
    &cartesian::POLAR_TO_CARTESIAN,
    &cartesian::CARTESIAN_TO_POLAR,
    &interpolated::INTERPOLATION,
    &interpolated::INTERPOLATION_INVERSE,
    &pole_rotation::SOUTH_POLE_ROTATION,
    &pole_rotation::NORTH_POLE_ROTATION,
    &molodensky::MOLODENSKY,
    &molodensky::ABRIDGED_MOLODENSKY,
    &wraparound::WRAPAROUND,
];

#[derive(Clone, Debug)]
pub(crate) enum Kernel {
    EllipsoidToRadius(radius::EllipsoidToRadius),
    RadiusToEllipsoid(radius::RadiusToEllipsoid),
    EllipsoidToCentric(centric::EllipsoidToCentric),
    CentricToEllipsoid(centric::CentricToEllipsoid),
    Conversion(cartesian::Conversion),
    Interpolated(interpolated::InterpolatedKernel),
    PoleRotation(pole_rotation::PoleRotationKernel),
    Molodensky(molodensky::MolodenskyKernel),
    Wraparound(wraparound::WraparoundKernel),
}

macro_rules! dispatch {
    ($kernel:expr, $k:ident => $body:expr) => {
        match $kernel {
            Kernel::EllipsoidToRadius($k) => $body,
            Kernel::RadiusToEllipsoid($k) => $body,
            Kernel::EllipsoidToCentric($k) => $body,
            Kernel::CentricToEllipsoid($k) => $body,
            Kernel::Conversion($k) => $body,
            Kernel::Interpolated($k) => $body,
            Kernel::PoleRotation($k) => $body,
            Kernel::Molodensky($k) => $body,
            Kernel::Wraparound($k) => $body,
        }
    };
}

impl Kernel {
    pub(crate) fn source_dimensions(&self) -> usize {
        dispatch!(self, k => k.source_dimensions())
    }

    pub(crate) fn target_dimensions(&self) -> usize {
        dispatch!(self, k => k.target_dimensions())
    }

    pub(crate) fn transform(
        &self,
        src: &[f64],
        dst: &mut [f64],
        derivate: bool,
    ) -> Result<Option<DMatrix<f64>>, TransformError> {
        dispatch!(self, k => k.transform(src, dst, derivate))
    }

    pub(crate) fn inverse(&self, this: &Transform) -> Result<Transform, TransformError> {
        dispatch!(self, k => k.inverse(this))
    }

    pub(crate) fn equals(&self, other: &Self, tolerance: Option<f64>) -> bool {
        match (self, other) {
            (Kernel::EllipsoidToRadius(a), Kernel::EllipsoidToRadius(b)) => a.equals(b, tolerance),
            (Kernel::RadiusToEllipsoid(a), Kernel::RadiusToEllipsoid(b)) => a.equals(b, tolerance),
            (Kernel::EllipsoidToCentric(a), Kernel::EllipsoidToCentric(b)) => a.equals(b, tolerance),
            (Kernel::CentricToEllipsoid(a), Kernel::CentricToEllipsoid(b)) => a.equals(b, tolerance),
            (Kernel::Conversion(a), Kernel::Conversion(b)) => a == b,
            (Kernel::Interpolated(a), Kernel::Interpolated(b)) => a.equals(b),
            (Kernel::PoleRotation(a), Kernel::PoleRotation(b)) => a.equals(b, tolerance),
            (Kernel::Molodensky(a), Kernel::Molodensky(b)) => a.equals(b, tolerance),
            (Kernel::Wraparound(a), Kernel::Wraparound(b)) => a.equals(b, tolerance),
            _ => false,
        }
    }

    /// Lets `this` absorb `other`, which comes before it if `apply_other_first`.
    pub(crate) fn try_concatenate(
        &self,
        this: &Transform,
        other: &Transform,
        apply_other_first: bool,
    ) -> Result<Option<Transform>, TransformError> {
        match self {
            Kernel::Wraparound(k) => k.try_concatenate(this, other, apply_other_first),
            _ => Ok(None),
        }
    }

    /// Whether this kernel followed by its inverse is the identity.
    pub(crate) fn cancels_with_inverse(&self) -> bool {
        !matches!(self, Kernel::Wraparound(_))
    }

    pub(crate) fn hash_bits<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        dispatch!(self, k => k.hash_bits(state));
    }
}

impl Display for Kernel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        dispatch!(self, k => Display::fmt(k, f))
    }
}

/// Creates a kernel transform carrying the inverse of the parameters of `this`, if it has any.
pub(crate) fn inverse_kernel(
    this: &Transform,
    kernel: Kernel,
    descriptor: &'static ParameterDescriptor,
    value_of: impl Fn(&str, &crate::ContextualParameters) -> Option<f64>,
) -> Result<Transform, TransformError> {
    let context = match this.contextual_parameters() {
        Some(context) => Some(context.inverse(descriptor, value_of)?),
        None => None,
    };
    Ok(Transform::with_context(
        crate::transform::Kind::Kernel(kernel),
        context,
    ))
}
