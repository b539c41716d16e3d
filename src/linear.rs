//! Affine and projective transforms defined by a homogeneous [`Matrix`].
//!
//! [`create`] inspects the matrix and picks a specialized representation for the common shapes
//! (identity, 1-D scale and offset, 2-D affine, coordinate copies), which are cheaper to evaluate
//! than the general case. The matrix itself is always kept, in extended precision, so that
//! concatenating many linear steps does not accumulate rounding error.

use crate::double_double::DoubleDouble;
use crate::error::TransformError;
use crate::matrix::Matrix;
use crate::transform::{values_equal, Kind, Transform};
use nalgebra::DMatrix;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The structural shapes a linear transform may take.
#[derive(Clone, Debug, PartialEq)]
enum Form {
    Identity,
    /// `y = x·scale + offset`, or the constant `offset` when `scale` is zero.
    ///
    /// The values are kept as given (rather than read back from the matrix) so that `-0.0` and
    /// `NaN` payloads survive.
    Scale1D { scale: f64, offset: f64 },
    Affine2D { m: [f64; 6] },
    /// Output `j` is input `indices[j]`.
    Copy { indices: Vec<usize> },
    Affine,
    Projective,
}

#[derive(Clone, Debug)]
pub(crate) struct LinearTransform {
    matrix: Matrix,
    form: Form,
}

/// Returns the identity transform of the given dimension.
#[must_use]
pub fn identity(dimension: usize) -> Transform {
    Transform::new(Kind::Linear(LinearTransform {
        matrix: Matrix::identity(dimension + 1),
        form: Form::Identity,
    }))
}

/// Creates a linear transform from an `(n+1)×(m+1)` homogeneous matrix mapping `m` source
/// coordinates to `n` target coordinates.
///
/// The representation is chosen by inspecting the matrix:
///
/// - the identity matrix gives an identity transform;
/// - a `2×2` affine matrix gives a 1-D scale and offset (a constant when the scale is zero);
/// - an affine matrix where every output is exactly one of the inputs gives a coordinate copy
///   (permutation, selection, or duplication of coordinates);
/// - a `3×3` affine matrix gives a 2-D affine transform;
/// - any other affine matrix gives a generic affine transform;
/// - a last row other than `[0 … 0 1]` gives a projective transform.
pub fn create(matrix: Matrix) -> Result<Transform, TransformError> {
    if matrix.num_row() == 0 || matrix.num_col() == 0 {
        return Err(TransformError::invalid(
            "matrix",
            "a homogeneous matrix needs at least one row and one column",
        ));
    }
    let form = if matrix.is_identity(0.) {
        Form::Identity
    } else if !matrix.is_affine() {
        Form::Projective
    } else if matrix.num_row() == 2 && matrix.num_col() == 2 {
        Form::Scale1D {
            scale: matrix.get(0, 0),
            offset: matrix.get(0, 1),
        }
    } else if let Some(indices) = copy_indices(&matrix) {
        Form::Copy { indices }
    } else if matrix.num_row() == 3 && matrix.num_col() == 3 {
        Form::Affine2D {
            m: [
                matrix.get(0, 0),
                matrix.get(0, 1),
                matrix.get(0, 2),
                matrix.get(1, 0),
                matrix.get(1, 1),
                matrix.get(1, 2),
            ],
        }
    } else {
        Form::Affine
    };
    Ok(Transform::new(Kind::Linear(LinearTransform { matrix, form })))
}

/// For an affine matrix with no translation where each row has a single `1` coefficient, returns
/// the column of that coefficient for every row.
fn copy_indices(matrix: &Matrix) -> Option<Vec<usize>> {
    let source_dim = matrix.num_col() - 1;
    let mut indices = Vec::with_capacity(matrix.num_row() - 1);
    for j in 0..matrix.num_row() - 1 {
        if !matrix.is_zero_at(j, source_dim) {
            return None;
        }
        let mut found = None;
        for i in 0..source_dim {
            if matrix.is_zero_at(j, i) {
                continue;
            }
            let e = matrix.get_extended(j, i);
            if found.is_some() || e.value() != 1. || e.error() != 0. {
                return None;
            }
            found = Some(i);
        }
        indices.push(found?);
    }
    Some(indices)
}

/// Parameters of a one-dimensional linear transform `y = x·scale + offset`.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LinearTransform1D {
    pub scale: f64,
    pub offset: f64,
}

impl LinearTransform1D {
    /// Creates the transform `y = x·scale + offset`.
    ///
    /// A zero `scale` gives a constant transform returning `offset` for every input (including
    /// `NaN` and infinities), and `create(1., 0.)` is the identity.
    #[must_use]
    pub fn create(scale: f64, offset: f64) -> Transform {
        if scale == 1. && offset == 0. {
            return identity(1);
        }
        let mut matrix = Matrix::identity(2);
        matrix.set(0, 0, scale);
        matrix.set(0, 1, offset);
        Transform::new(Kind::Linear(LinearTransform {
            matrix,
            form: Form::Scale1D { scale, offset },
        }))
    }

    /// Returns the scale and offset of a one-dimensional affine transform.
    #[must_use]
    pub fn of(transform: &Transform) -> Option<Self> {
        let Kind::Linear(linear) = transform.kind() else {
            return None;
        };
        match &linear.form {
            Form::Scale1D { scale, offset } => Some(Self {
                scale: *scale,
                offset: *offset,
            }),
            Form::Identity if linear.matrix.num_row() == 2 => Some(Self {
                scale: 1.,
                offset: 0.,
            }),
            _ => None,
        }
    }
}

impl LinearTransform {
    pub(crate) fn source_dimensions(&self) -> usize {
        self.matrix.num_col() - 1
    }

    pub(crate) fn target_dimensions(&self) -> usize {
        self.matrix.num_row() - 1
    }

    pub(crate) fn matrix(&self) -> &Matrix {
        &self.matrix
    }

    pub(crate) fn is_identity(&self) -> bool {
        matches!(self.form, Form::Identity)
    }

    pub(crate) fn transform(
        &self,
        src: &[f64],
        dst: &mut [f64],
        derivate: bool,
    ) -> Result<Option<DMatrix<f64>>, TransformError> {
        let (s, t) = (self.source_dimensions(), self.target_dimensions());
        match &self.form {
            Form::Identity => dst.copy_from_slice(src),
            Form::Scale1D { scale, offset } => {
                dst[0] = if *scale == 0. {
                    *offset
                } else {
                    src[0] * scale + offset
                };
            }
            Form::Affine2D { m } => {
                let (x, y) = (src[0], src[1]);
                dst[0] = m[0] * x + m[1] * y + m[2];
                dst[1] = m[3] * x + m[4] * y + m[5];
            }
            Form::Copy { indices } => {
                for (d, &i) in dst.iter_mut().zip(indices) {
                    *d = src[i];
                }
            }
            Form::Affine => {
                for (j, d) in dst.iter_mut().enumerate() {
                    *d = self.row_dot(j, src);
                }
            }
            Form::Projective => {
                let w = self.row_dot(t, src);
                for (j, d) in dst.iter_mut().enumerate() {
                    *d = self.row_dot(j, src) / w;
                }
            }
        }
        if !derivate {
            return Ok(None);
        }
        let mut derivative = DMatrix::from_fn(t, s, |j, i| self.matrix.get(j, i));
        if let Form::Projective = self.form {
            // quotient rule: ∂y_j/∂x_i = (m_ji − y_j·m_wi) / w
            let w = self.row_dot(t, src);
            for j in 0..t {
                for i in 0..s {
                    derivative[(j, i)] = (self.matrix.get(j, i) - dst[j] * self.matrix.get(t, i)) / w;
                }
            }
        }
        Ok(Some(derivative))
    }

    fn row_dot(&self, row: usize, src: &[f64]) -> f64 {
        let s = self.source_dimensions();
        let mut sum = self.matrix.get(row, s);
        for (i, x) in src.iter().enumerate() {
            if !self.matrix.is_zero_at(row, i) {
                sum += self.matrix.get(row, i) * x;
            }
        }
        sum
    }

    pub(crate) fn inverse(&self, this: &Transform) -> Result<Transform, TransformError> {
        match self.form {
            Form::Identity => Ok(this.clone()),
            Form::Scale1D { scale, offset } => {
                if scale == 0. || !scale.is_finite() {
                    return Err(TransformError::NonInvertible(format!(
                        "scale factor is {scale}"
                    )));
                }
                let scale = DoubleDouble::of(scale);
                let inverse = scale.inverse();
                let offset = -(DoubleDouble::of(offset) / scale);
                let mut matrix = Matrix::identity(2);
                matrix.set_extended(0, 0, inverse);
                matrix.set_extended(0, 1, offset);
                create(matrix)
            }
            _ => create(self.matrix.inverse()?),
        }
    }

    pub(crate) fn equals(&self, other: &Self, tolerance: Option<f64>) -> bool {
        match (&self.form, &other.form, tolerance) {
            (
                Form::Scale1D { scale, offset },
                Form::Scale1D {
                    scale: other_scale,
                    offset: other_offset,
                },
                None,
            ) => scale.to_bits() == other_scale.to_bits() && offset.to_bits() == other_offset.to_bits(),
            (_, _, None) => self.matrix.equals_strict(&other.matrix),
            (_, _, Some(tolerance)) => {
                self.matrix.num_row() == other.matrix.num_row()
                    && self.matrix.num_col() == other.matrix.num_col()
                    && (0..self.matrix.num_row()).all(|j| {
                        (0..self.matrix.num_col()).all(|i| {
                            values_equal(self.matrix.get(j, i), other.matrix.get(j, i), Some(tolerance))
                        })
                    })
            }
        }
    }

    pub(crate) fn hash_bits<H: Hasher>(&self, state: &mut H) {
        match self.form {
            Form::Scale1D { scale, offset } => {
                scale.to_bits().hash(state);
                offset.to_bits().hash(state);
            }
            _ => self.matrix.hash_bits(state),
        }
    }
}

impl Display for LinearTransform {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.form {
            Form::Identity => write!(f, "Identity({})", self.source_dimensions()),
            Form::Scale1D { scale, offset } => {
                write!(f, "Linear1D(scale={scale}, offset={offset})")
            }
            Form::Copy { indices } => write!(f, "Copy({indices:?})"),
            Form::Affine2D { .. } | Form::Affine => write_rows(f, "Affine", &self.matrix),
            Form::Projective => write_rows(f, "Projective", &self.matrix),
        }
    }
}

fn write_rows(f: &mut Formatter<'_>, name: &str, matrix: &Matrix) -> fmt::Result {
    write!(f, "{name}(")?;
    for j in 0..matrix.num_row() {
        if j != 0 {
            write!(f, ", ")?;
        }
        let row: Vec<f64> = (0..matrix.num_col()).map(|i| matrix.get(j, i)).collect();
        crate::transform::fmt_values(f, &row)?;
    }
    write!(f, ")")
}
