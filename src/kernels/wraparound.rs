//! Wrapping of periodic coordinates, typically longitudes, into a range of one period.
//!
//! The kernel works on a single coordinate and wraps it into `[-period/2, period/2)`. Other
//! ranges are obtained by translating the coordinate before and after, and other coordinates of
//! a tuple are passed through unchanged.
//!
//! Wrapping loses the number of periods, so the "inverse" of a wraparound is the wraparound back
//! into the range the coordinates came from. This is only known if the source range was given
//! when the transform was created.

use super::{inverse_kernel, Kernel};
use crate::concatenated::concatenate_all;
use crate::contextual::{ContextualParameters, ParameterDescriptor};
use crate::double_double::DoubleDouble;
use crate::error::TransformError;
use crate::factory::MathTransformFactory;
use crate::linear::LinearTransform1D;
use crate::transform::{values_equal, Kind, Transform};
use nalgebra::DMatrix;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

pub static WRAPAROUND: ParameterDescriptor = ParameterDescriptor {
    name: "Wraparound",
    parameters: &["period", "source_median", "target_median"],
};

#[derive(Clone, Debug)]
pub(crate) struct WraparoundKernel {
    period: f64,
    /// Middle of the source range relative to the middle of the target range, `NaN` if unknown.
    source_median: f64,
}

/// Creates the transform wrapping coordinate `wraparound_dimension` of `dimension`-tuples into
/// `target_median ± period/2`.
///
/// `source_median` is the middle of the range the coordinates are expected to come from, which
/// is where the inverse wraps them back to. It may be `NaN` if unknown, in which case the
/// transform has no inverse.
pub fn create(
    factory: &MathTransformFactory,
    dimension: usize,
    wraparound_dimension: usize,
    period: f64,
    source_median: f64,
    target_median: f64,
) -> Result<Transform, TransformError> {
    if wraparound_dimension >= dimension {
        return Err(TransformError::invalid(
            "wraparound_dimension",
            format!("{wraparound_dimension} is out of bounds for {dimension} dimensions"),
        ));
    }
    if !(period > 0. && period.is_finite()) {
        return Err(TransformError::invalid(
            "period",
            format!("{period} is not a positive number"),
        ));
    }
    if !target_median.is_finite() {
        return Err(TransformError::invalid(
            "target_median",
            format!("{target_median} is not finite"),
        ));
    }
    if source_median.is_infinite() {
        return Err(TransformError::invalid(
            "source_median",
            format!("{source_median} is neither finite nor unknown"),
        ));
    }
    let mut context = ContextualParameters::new(&WRAPAROUND, 1, 1);
    context.set("period", period)?;
    context.set("source_median", source_median)?;
    context.set("target_median", target_median)?;
    let median = DoubleDouble::from(target_median);
    context
        .normalization_mut()
        .convert_after(0, DoubleDouble::ONE, -median);
    context
        .denormalization_mut()
        .convert_before(0, DoubleDouble::ONE, median);
    let kernel = Transform::new(Kind::Kernel(Kernel::Wraparound(WraparoundKernel {
        period,
        source_median: source_median - target_median,
    })));
    let wrap = context.complete_transform(factory, kernel)?;
    factory.create_pass_through(
        wraparound_dimension,
        &wrap,
        dimension - wraparound_dimension - 1,
    )
}

impl WraparoundKernel {
    pub(crate) fn source_dimensions(&self) -> usize {
        1
    }

    pub(crate) fn target_dimensions(&self) -> usize {
        1
    }

    fn wrap(&self, x: f64) -> f64 {
        let half = self.period / 2.;
        if (-half..half).contains(&x) {
            return x;
        }
        x - self.period * ((x + half) / self.period).floor()
    }

    pub(crate) fn transform(
        &self,
        src: &[f64],
        dst: &mut [f64],
        derivate: bool,
    ) -> Result<Option<DMatrix<f64>>, TransformError> {
        dst[0] = self.wrap(src[0]);
        Ok(derivate.then(|| DMatrix::identity(1, 1)))
    }

    pub(crate) fn inverse(&self, this: &Transform) -> Result<Transform, TransformError> {
        let s = self.source_median;
        if s.is_nan() {
            return Err(TransformError::NonInvertible(
                "wraparound from an unknown range".into(),
            ));
        }
        if s == 0. {
            return Ok(this.clone());
        }
        let reverse = Self {
            period: self.period,
            source_median: -s,
        };
        let kernel = inverse_kernel(this, Kernel::Wraparound(reverse), &WRAPAROUND, |name, p| {
            match name {
                "source_median" => p.parameter("target_median"),
                "target_median" => p.parameter("source_median"),
                _ => p.parameter(name),
            }
        })?;
        concatenate_all(&[
            LinearTransform1D::create(1., -s),
            kernel,
            LinearTransform1D::create(1., s),
        ])
    }

    /// Wrapping twice with the same period is wrapping once.
    pub(crate) fn try_concatenate(
        &self,
        this: &Transform,
        other: &Transform,
        apply_other_first: bool,
    ) -> Result<Option<Transform>, TransformError> {
        let Kind::Kernel(Kernel::Wraparound(other_kernel)) = other.kind() else {
            return Ok(None);
        };
        if other_kernel.period.to_bits() != self.period.to_bits() {
            return Ok(None);
        }
        // the first one knows the range the coordinates come from
        Ok(Some(if apply_other_first {
            other.clone()
        } else {
            this.clone()
        }))
    }

    pub(crate) fn equals(&self, other: &Self, tolerance: Option<f64>) -> bool {
        values_equal(self.period, other.period, tolerance)
            && values_equal(self.source_median, other.source_median, tolerance)
    }

    pub(crate) fn hash_bits<H: Hasher>(&self, state: &mut H) {
        self.period.to_bits().hash(state);
        self.source_median.to_bits().hash(state);
    }
}

impl Display for WraparoundKernel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Wraparound(period={}, source median={})",
            self.period, self.source_median
        )
    }
}
