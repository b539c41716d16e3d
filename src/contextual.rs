//! Parameters of kernels which work in normalized units.
//!
//! Most non-linear kernels are easier (and cheaper) to write for normalized inputs: angles in
//! radians, lengths in units of some ellipsoid axis, longitudes relative to a central meridian.
//! The conversions from and to the units the user works in are linear, and are kept apart from
//! the kernel as two matrices so that they can merge with neighbouring linear steps when
//! transforms are concatenated.
//!
//! A [`ContextualParameters`] is filled in while a kernel is being created, and is then frozen by
//! [`ContextualParameters::complete_transform`], which returns the full `normalize → kernel →
//! denormalize` chain. After that the parameters are only kept for introspection: kernels copy
//! every number they need when they are created.

use crate::double_double::DoubleDouble;
use crate::error::TransformError;
use crate::factory::MathTransformFactory;
use crate::linear;
use crate::matrix::Matrix;
use crate::transform::Transform;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, OnceLock};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Static description of the parameters of a kind of kernel.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct ParameterDescriptor {
    pub name: &'static str,
    pub parameters: &'static [&'static str],
}

impl ParameterDescriptor {
    /// Finds the descriptor of one of this crate's kernels by name.
    #[must_use]
    pub fn by_name(name: &str) -> Option<&'static ParameterDescriptor> {
        crate::kernels::DESCRIPTORS
            .iter()
            .copied()
            .find(|d| d.name == name)
    }

    fn index_of(&self, parameter: &str) -> Option<usize> {
        self.parameters.iter().position(|p| *p == parameter)
    }
}

/// Parameter values and normalization matrices of a kernel.
#[derive(Clone, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(try_from = "ContextualRecord", into = "ContextualRecord")
)]
pub struct ContextualParameters {
    descriptor: &'static ParameterDescriptor,
    values: Vec<Option<f64>>,
    normalize: Matrix,
    denormalize: Matrix,
    inverse: OnceLock<Arc<ContextualParameters>>,
}

impl ContextualParameters {
    /// Creates parameters with no values and identity normalization, for a kernel with the given
    /// dimensions.
    #[must_use]
    pub fn new(
        descriptor: &'static ParameterDescriptor,
        source_dimensions: usize,
        target_dimensions: usize,
    ) -> Self {
        Self {
            descriptor,
            values: vec![None; descriptor.parameters.len()],
            normalize: Matrix::identity(source_dimensions + 1),
            denormalize: Matrix::identity(target_dimensions + 1),
            inverse: OnceLock::new(),
        }
    }

    #[must_use]
    pub fn descriptor(&self) -> &'static ParameterDescriptor {
        self.descriptor
    }

    /// Sets the value of one of the parameters named by the descriptor.
    pub fn set(&mut self, parameter: &str, value: f64) -> Result<(), TransformError> {
        let index = self.descriptor.index_of(parameter).ok_or_else(|| {
            TransformError::invalid(
                parameter,
                format!("not a parameter of {}", self.descriptor.name),
            )
        })?;
        self.values[index] = Some(value);
        Ok(())
    }

    #[must_use]
    pub fn parameter(&self, parameter: &str) -> Option<f64> {
        self.values[self.descriptor.index_of(parameter)?]
    }

    /// All parameters with their value, in descriptor order.
    pub fn parameters(&self) -> impl Iterator<Item = (&'static str, Option<f64>)> + '_ {
        self.descriptor
            .parameters
            .iter()
            .copied()
            .zip(self.values.iter().copied())
    }

    /// The conversion applied before the kernel.
    #[must_use]
    pub fn normalization(&self) -> &Matrix {
        &self.normalize
    }

    /// The conversion applied after the kernel.
    #[must_use]
    pub fn denormalization(&self) -> &Matrix {
        &self.denormalize
    }

    pub fn normalization_mut(&mut self) -> &mut Matrix {
        &mut self.normalize
    }

    pub fn denormalization_mut(&mut self) -> &mut Matrix {
        &mut self.denormalize
    }

    /// Makes the normalization turn `(λ, φ)` in degrees into radians, with longitudes relative to
    /// `central_meridian` (in degrees).
    pub fn normalize_geographic_inputs(&mut self, central_meridian: f64) -> &mut Matrix {
        let offset = -(DoubleDouble::from(central_meridian) * DoubleDouble::DEGREES_TO_RADIANS);
        self.normalize
            .convert_after(0, DoubleDouble::DEGREES_TO_RADIANS, offset);
        self.normalize
            .convert_after(1, DoubleDouble::DEGREES_TO_RADIANS, DoubleDouble::ZERO);
        &mut self.normalize
    }

    /// Makes the denormalization turn `(λ, φ)` in radians back into degrees, adding
    /// `central_meridian` (in degrees) to longitudes.
    pub fn denormalize_geographic_outputs(&mut self, central_meridian: f64) -> &mut Matrix {
        self.denormalize.convert_before(
            0,
            DoubleDouble::RADIANS_TO_DEGREES,
            DoubleDouble::from(central_meridian),
        );
        self.denormalize
            .convert_before(1, DoubleDouble::RADIANS_TO_DEGREES, DoubleDouble::ZERO);
        &mut self.denormalize
    }

    /// Freezes these parameters and returns `normalize → kernel → denormalize`.
    ///
    /// The kernel keeps a link to these parameters, see [`Transform::contextual_parameters`].
    pub fn complete_transform(
        self,
        factory: &MathTransformFactory,
        kernel: Transform,
    ) -> Result<Transform, TransformError> {
        if kernel.source_dimensions() + 1 != self.normalize.num_row() {
            return Err(TransformError::mismatched(
                "kernel source",
                self.normalize.num_row() - 1,
                kernel.source_dimensions(),
            ));
        }
        if kernel.target_dimensions() + 1 != self.denormalize.num_col() {
            return Err(TransformError::mismatched(
                "kernel target",
                self.denormalize.num_col() - 1,
                kernel.target_dimensions(),
            ));
        }
        let normalize = linear::create(self.normalize.clone())?;
        let denormalize = linear::create(self.denormalize.clone())?;
        kernel.attach_context(Arc::new(self))?;
        factory.create_concatenated_all(&[normalize, kernel, denormalize])
    }

    /// Returns the parameters of the inverse kernel.
    ///
    /// The normalization matrices are swapped and inverted, and `value_of` gives the value of each
    /// parameter of `descriptor` from these parameters. The result is computed once.
    pub fn inverse(
        &self,
        descriptor: &'static ParameterDescriptor,
        value_of: impl Fn(&str, &ContextualParameters) -> Option<f64>,
    ) -> Result<Arc<ContextualParameters>, TransformError> {
        if let Some(known) = self.inverse.get() {
            return Ok(Arc::clone(known));
        }
        let computed = Arc::new(ContextualParameters {
            descriptor,
            values: descriptor
                .parameters
                .iter()
                .map(|p| value_of(p, self))
                .collect(),
            normalize: self.denormalize.inverse()?,
            denormalize: self.normalize.inverse()?,
            inverse: OnceLock::new(),
        });
        Ok(Arc::clone(self.inverse.get_or_init(|| computed)))
    }
}

impl PartialEq for ContextualParameters {
    fn eq(&self, other: &Self) -> bool {
        self.descriptor == other.descriptor
            && self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .zip(&other.values)
                .all(|(a, b)| a.map(f64::to_bits) == b.map(f64::to_bits))
            && self.normalize.equals_strict(&other.normalize)
            && self.denormalize.equals_strict(&other.denormalize)
    }
}

impl Display for ContextualParameters {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}[", self.descriptor.name)?;
        let mut first = true;
        for (name, value) in self.parameters() {
            let Some(value) = value else { continue };
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{name}={value}")?;
        }
        write!(f, "]")
    }
}

/// Persisted form of [`ContextualParameters`], with the descriptor referred to by name.
#[cfg(feature = "serde")]
#[derive(Serialize, Deserialize)]
struct ContextualRecord {
    descriptor: String,
    values: Vec<Option<f64>>,
    normalize: Matrix,
    denormalize: Matrix,
}

#[cfg(feature = "serde")]
impl From<ContextualParameters> for ContextualRecord {
    fn from(p: ContextualParameters) -> Self {
        Self {
            descriptor: p.descriptor.name.to_owned(),
            values: p.values,
            normalize: p.normalize,
            denormalize: p.denormalize,
        }
    }
}

#[cfg(feature = "serde")]
impl TryFrom<ContextualRecord> for ContextualParameters {
    type Error = TransformError;

    fn try_from(record: ContextualRecord) -> Result<Self, Self::Error> {
        let descriptor = ParameterDescriptor::by_name(&record.descriptor).ok_or_else(|| {
            TransformError::invalid("descriptor", format!("unknown kernel {}", record.descriptor))
        })?;
        if record.values.len() != descriptor.parameters.len() {
            return Err(TransformError::mismatched(
                "parameter values",
                descriptor.parameters.len(),
                record.values.len(),
            ));
        }
        Ok(Self {
            descriptor,
            values: record.values,
            normalize: record.normalize,
            denormalize: record.denormalize,
            inverse: OnceLock::new(),
        })
    }
}
