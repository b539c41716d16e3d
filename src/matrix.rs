//! Matrices of extended-precision coefficients.
//!
//! Affine transforms are represented by a homogeneous `(n+1)×(m+1)` [`Matrix`] mapping `m` source
//! coordinates to `n` target coordinates. The last column holds the translation terms and the
//! last row is `[0 … 0 1]` for affine transforms (anything else makes the transform projective).
//!
//! Every coefficient is either absent (meaning zero) or a [`DoubleDouble`]. Storing zero as an
//! absence lets the multiplication and inversion loops skip it outright, which matters because
//! the matrices built by axis swapping and unit conversion are overwhelmingly sparse.

use crate::double_double::DoubleDouble;
use crate::error::TransformError;
use nalgebra::DMatrix;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

#[cfg(any(test, feature = "approx"))]
use approx::{AbsDiffEq, RelativeEq};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A rectangular matrix stored in row-major order.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Matrix {
    num_row: usize,
    num_col: usize,
    elements: Vec<Option<DoubleDouble>>,
}

impl Matrix {
    /// Creates a matrix of the given size filled with zeros.
    #[must_use]
    pub fn zeros(num_row: usize, num_col: usize) -> Self {
        Self {
            num_row,
            num_col,
            elements: vec![None; num_row * num_col],
        }
    }

    /// Creates a square identity matrix.
    #[must_use]
    pub fn identity(size: usize) -> Self {
        Self::diagonal(size, size)
    }

    /// Creates a matrix with ones on the diagonal and zeros elsewhere.
    ///
    /// Note that for a non-square matrix this is _not_ an affine matrix, as the one in the last
    /// row is not in the last column. See [`Matrix::affine_identity`] for that.
    #[must_use]
    pub fn diagonal(num_row: usize, num_col: usize) -> Self {
        let mut m = Self::zeros(num_row, num_col);
        for i in 0..num_row.min(num_col) {
            m.set(i, i, 1.);
        }
        m
    }

    /// Creates the affine matrix that copies the first `min(target_dim, source_dim)` coordinates,
    /// drops the extra source coordinates and sets any extra target coordinates to zero.
    #[must_use]
    pub fn affine_identity(target_dim: usize, source_dim: usize) -> Self {
        let mut m = Self::zeros(target_dim + 1, source_dim + 1);
        for i in 0..target_dim.min(source_dim) {
            m.set(i, i, 1.);
        }
        m.set(target_dim, source_dim, 1.);
        m
    }

    /// Creates a matrix from values given row by row.
    ///
    /// # Panics
    ///
    /// If `values.len() != num_row * num_col`.
    #[must_use]
    pub fn from_row_slice(num_row: usize, num_col: usize, values: &[f64]) -> Self {
        assert_eq!(
            values.len(),
            num_row * num_col,
            "expected {num_row}×{num_col} values"
        );
        let mut m = Self::zeros(num_row, num_col);
        for (i, &v) in values.iter().enumerate() {
            m.set(i / num_col, i % num_col, v);
        }
        m
    }

    /// Converts a nalgebra matrix, dropping any extended precision (there is none to keep).
    #[must_use]
    pub fn from_dmatrix(matrix: &DMatrix<f64>) -> Self {
        let mut m = Self::zeros(matrix.nrows(), matrix.ncols());
        for j in 0..matrix.nrows() {
            for i in 0..matrix.ncols() {
                m.set(j, i, matrix[(j, i)]);
            }
        }
        m
    }

    /// Converts into a nalgebra matrix of `f64`.
    #[must_use]
    pub fn to_dmatrix(&self) -> DMatrix<f64> {
        DMatrix::from_fn(self.num_row, self.num_col, |j, i| self.get(j, i))
    }

    #[must_use]
    pub fn num_row(&self) -> usize {
        self.num_row
    }

    #[must_use]
    pub fn num_col(&self) -> usize {
        self.num_col
    }

    #[must_use]
    pub fn is_square(&self) -> bool {
        self.num_row == self.num_col
    }

    fn index(&self, row: usize, col: usize) -> usize {
        assert!(
            row < self.num_row && col < self.num_col,
            "({row}, {col}) is outside a {}×{} matrix",
            self.num_row,
            self.num_col
        );
        row * self.num_col + col
    }

    /// Returns the coefficient at the given row and column, rounded to `f64`.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.elements[self.index(row, col)].map_or(0., |e| e.value())
    }

    /// Returns the coefficient at the given row and column in extended precision.
    #[must_use]
    pub fn get_extended(&self, row: usize, col: usize) -> DoubleDouble {
        self.elements[self.index(row, col)].unwrap_or(DoubleDouble::ZERO)
    }

    /// Whether the coefficient is absent (ie, zero).
    #[must_use]
    pub fn is_zero_at(&self, row: usize, col: usize) -> bool {
        self.elements[self.index(row, col)].is_none()
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.set_extended(row, col, DoubleDouble::of(value));
    }

    pub fn set_extended(&mut self, row: usize, col: usize, value: DoubleDouble) {
        let index = self.index(row, col);
        // NOTE: -0.0 is folded into the absent zero like +0.0. Transforms that care about the sign
        // of zero (the 1-D specialization) keep their own copy of the coefficients.
        self.elements[index] = if value.is_zero() { None } else { Some(value) };
    }

    /// Whether the last row is `[0 … 0 1]`.
    #[must_use]
    pub fn is_affine(&self) -> bool {
        let last = self.num_row - 1;
        (0..self.num_col).all(|i| {
            let expected = if i == self.num_col - 1 { 1. } else { 0. };
            self.get(last, i) == expected
        })
    }

    /// Whether this is a square matrix with ones on the diagonal and zeros elsewhere, within
    /// the given tolerance.
    #[must_use]
    pub fn is_identity(&self, tolerance: f64) -> bool {
        if !self.is_square() {
            return false;
        }
        for j in 0..self.num_row {
            for i in 0..self.num_col {
                let expected = if i == j { 1. } else { 0. };
                // written so that NaN fails the check
                if !((self.get(j, i) - expected).abs() <= tolerance) {
                    return false;
                }
            }
        }
        true
    }

    /// Returns `self × other`.
    ///
    /// When used on homogeneous transform matrices, the product applies `other` first and then
    /// `self`.
    pub fn multiply(&self, other: &Matrix) -> Result<Matrix, TransformError> {
        if self.num_col != other.num_row {
            return Err(TransformError::mismatched(
                "matrix multiplication",
                self.num_col,
                other.num_row,
            ));
        }
        let mut result = Matrix::zeros(self.num_row, other.num_col);
        for j in 0..self.num_row {
            for i in 0..other.num_col {
                let mut sum = DoubleDouble::ZERO;
                let mut any = false;
                for k in 0..self.num_col {
                    let (Some(a), Some(b)) = (
                        self.elements[j * self.num_col + k],
                        other.elements[k * other.num_col + i],
                    ) else {
                        continue;
                    };
                    sum = sum + a * b;
                    any = true;
                }
                if any {
                    result.set_extended(j, i, sum);
                }
            }
        }
        Ok(result)
    }

    /// Applies `x[dimension] := x[dimension] * scale + offset` _before_ this matrix.
    ///
    /// This is how normalizations like degrees to radians are prepended to a transform without
    /// creating an additional step.
    pub fn convert_before(&mut self, dimension: usize, scale: DoubleDouble, offset: DoubleDouble) {
        let translation = self.num_col - 1;
        for j in 0..self.num_row {
            let element = self.get_extended(j, dimension);
            if element.is_zero() {
                continue;
            }
            if !offset.is_zero() {
                let t = self.get_extended(j, translation);
                self.set_extended(j, translation, t + element * offset);
            }
            self.set_extended(j, dimension, element * scale);
        }
    }

    /// Applies `y[dimension] := y[dimension] * scale + offset` _after_ this matrix.
    pub fn convert_after(&mut self, dimension: usize, scale: DoubleDouble, offset: DoubleDouble) {
        let last = self.num_row - 1;
        for i in 0..self.num_col {
            let mut element = self.get_extended(dimension, i) * scale;
            if !offset.is_zero() {
                element = element + self.get_extended(last, i) * offset;
            }
            self.set_extended(dimension, i, element);
        }
    }

    /// Returns a copy without the rows in `lower..upper`.
    #[must_use]
    pub fn remove_rows(&self, lower: usize, upper: usize) -> Matrix {
        let rows: Vec<usize> = (0..self.num_row).filter(|j| !(lower..upper).contains(j)).collect();
        self.select(&rows, &(0..self.num_col).collect::<Vec<_>>())
    }

    /// Returns a copy without the columns in `lower..upper`.
    #[must_use]
    pub fn remove_columns(&self, lower: usize, upper: usize) -> Matrix {
        let cols: Vec<usize> = (0..self.num_col).filter(|i| !(lower..upper).contains(i)).collect();
        self.select(&(0..self.num_row).collect::<Vec<_>>(), &cols)
    }

    fn select(&self, rows: &[usize], cols: &[usize]) -> Matrix {
        let mut m = Matrix::zeros(rows.len(), cols.len());
        for (jj, &j) in rows.iter().enumerate() {
            for (ii, &i) in cols.iter().enumerate() {
                m.elements[jj * cols.len() + ii] = self.elements[j * self.num_col + i];
            }
        }
        m
    }

    /// Returns the algebraic inverse of this transform matrix.
    ///
    /// Square matrices are inverted by Gauss-Jordan elimination carried out in extended precision,
    /// which cancels most of the rounding error accumulated by previous concatenations.
    ///
    /// Non-square affine matrices are accepted in two cases:
    ///
    /// - the matrix adds dimensions whose value is constant (all-zero linear row): the inverse drops
    ///   them;
    /// - the matrix drops dimensions that do not contribute to any output (all-zero column): the
    ///   inverse re-creates them with the value `NaN`, the marker for "unknown".
    ///
    /// Everything else, including singular matrices, fails with
    /// [`TransformError::NonInvertible`].
    pub fn inverse(&self) -> Result<Matrix, TransformError> {
        if self.is_square() {
            return self.invert_square();
        }
        if !self.is_affine() {
            return Err(TransformError::NonInvertible(format!(
                "non-square {}×{} matrix is not affine",
                self.num_row, self.num_col
            )));
        }
        let target_dim = self.num_row - 1;
        let source_dim = self.num_col - 1;
        if target_dim > source_dim {
            let constant_rows: Vec<usize> = (0..target_dim)
                .filter(|&j| (0..source_dim).all(|i| self.is_zero_at(j, i)))
                .collect();
            let kept: Vec<usize> = (0..=target_dim).filter(|j| !constant_rows.contains(j)).collect();
            if kept.len() != self.num_col {
                return Err(TransformError::NonInvertible(format!(
                    "{target_dim} dimensions can not be recovered from {source_dim}"
                )));
            }
            let reduced = self.select(&kept, &(0..self.num_col).collect::<Vec<_>>());
            let inverse = reduced.invert_square()?;
            // columns of `inverse` correspond to the kept target dimensions
            let mut result = Matrix::zeros(self.num_col, self.num_row);
            for j in 0..self.num_col {
                for (ii, &i) in kept.iter().enumerate() {
                    result.elements[j * self.num_row + i] = inverse.elements[j * self.num_col + ii];
                }
            }
            Ok(result)
        } else {
            let unused_cols: Vec<usize> = (0..source_dim)
                .filter(|&i| (0..target_dim).all(|j| self.is_zero_at(j, i)))
                .collect();
            let kept: Vec<usize> = (0..=source_dim).filter(|i| !unused_cols.contains(i)).collect();
            if kept.len() != self.num_row {
                return Err(TransformError::NonInvertible(format!(
                    "{source_dim} dimensions can not be recovered from {target_dim}"
                )));
            }
            let reduced = self.select(&(0..self.num_row).collect::<Vec<_>>(), &kept);
            let inverse = reduced.invert_square()?;
            let mut result = Matrix::zeros(self.num_col, self.num_row);
            for (jj, &j) in kept.iter().enumerate() {
                for i in 0..self.num_row {
                    result.elements[j * self.num_row + i] = inverse.elements[jj * self.num_row + i];
                }
            }
            for &j in &unused_cols {
                result.set(j, target_dim, f64::NAN);
            }
            Ok(result)
        }
    }

    fn invert_square(&self) -> Result<Matrix, TransformError> {
        let n = self.num_row;
        let width = 2 * n;
        let mut work: Vec<DoubleDouble> = vec![DoubleDouble::ZERO; n * width];
        for j in 0..n {
            for i in 0..n {
                work[j * width + i] = self.get_extended(j, i);
            }
            work[j * width + n + j] = DoubleDouble::ONE;
        }
        for col in 0..n {
            // partial pivoting on the largest remaining magnitude
            let mut pivot_row = col;
            let mut pivot_abs = work[col * width + col].abs().value();
            for j in col + 1..n {
                let candidate = work[j * width + col].abs().value();
                if candidate > pivot_abs {
                    pivot_abs = candidate;
                    pivot_row = j;
                }
            }
            if pivot_abs == 0. || !pivot_abs.is_finite() {
                return Err(TransformError::NonInvertible(format!(
                    "matrix is singular (column {col} has no usable pivot)"
                )));
            }
            if pivot_row != col {
                for i in 0..width {
                    work.swap(col * width + i, pivot_row * width + i);
                }
            }
            let pivot = work[col * width + col];
            for i in 0..width {
                let e = work[col * width + i];
                if !e.is_zero() {
                    work[col * width + i] = e / pivot;
                }
            }
            for j in 0..n {
                if j == col {
                    continue;
                }
                let factor = work[j * width + col];
                if factor.is_zero() {
                    continue;
                }
                for i in 0..width {
                    let e = work[col * width + i];
                    if !e.is_zero() {
                        work[j * width + i] = work[j * width + i] - factor * e;
                    }
                }
            }
        }
        let mut result = Matrix::zeros(n, n);
        for j in 0..n {
            for i in 0..n {
                result.set_extended(j, i, work[j * width + n + i]);
            }
        }
        if self.is_affine() {
            // the exact answer has an exact last row; don't let rounding noise make it projective
            for i in 0..n {
                result.set(n - 1, i, if i == n - 1 { 1. } else { 0. });
            }
        }
        Ok(result)
    }

    /// Compares coefficients with an absolute tolerance. `NaN` equals `NaN`.
    #[must_use]
    pub fn equals_approximately(&self, other: &Matrix, tolerance: f64) -> bool {
        self.num_row == other.num_row
            && self.num_col == other.num_col
            && self.elements.iter().zip(&other.elements).all(|(a, b)| {
                let a = a.map_or(0., |e| e.value());
                let b = b.map_or(0., |e| e.value());
                (a.is_nan() && b.is_nan()) || (a - b).abs() <= tolerance
            })
    }

    /// Bit-level comparison of all coefficients, including their extended precision terms.
    #[must_use]
    pub fn equals_strict(&self, other: &Matrix) -> bool {
        self.num_row == other.num_row
            && self.num_col == other.num_col
            && self
                .elements
                .iter()
                .zip(&other.elements)
                .all(|(a, b)| match (a, b) {
                    (None, None) => true,
                    (Some(a), Some(b)) => a.bits_eq(b),
                    _ => false,
                })
    }

    pub(crate) fn hash_bits<H: Hasher>(&self, state: &mut H) {
        self.num_row.hash(state);
        self.num_col.hash(state);
        for e in &self.elements {
            e.map_or(0, |e| e.value().to_bits()).hash(state);
        }
    }
}

impl Display for Matrix {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for j in 0..self.num_row {
            write!(f, "[")?;
            for i in 0..self.num_col {
                if i != 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", self.get(j, i))?;
            }
            writeln!(f, "]")?;
        }
        Ok(())
    }
}

#[cfg(any(test, feature = "approx"))]
impl AbsDiffEq<Self> for Matrix {
    type Epsilon = <f64 as AbsDiffEq>::Epsilon;

    fn default_epsilon() -> Self::Epsilon {
        f64::default_epsilon()
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        self.equals_approximately(other, epsilon)
    }
}

#[cfg(any(test, feature = "approx"))]
impl RelativeEq for Matrix {
    fn default_max_relative() -> Self::Epsilon {
        f64::default_max_relative()
    }

    fn relative_eq(
        &self,
        other: &Self,
        epsilon: Self::Epsilon,
        max_relative: Self::Epsilon,
    ) -> bool {
        self.num_row == other.num_row
            && self.num_col == other.num_col
            && (0..self.num_row).all(|j| {
                (0..self.num_col).all(|i| {
                    let (a, b) = (self.get(j, i), other.get(j, i));
                    (a.is_nan() && b.is_nan()) || a.relative_eq(&b, epsilon, max_relative)
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[test]
    fn zero_is_absent() {
        let mut m = Matrix::identity(3);
        m.set(0, 0, 0.);
        assert!(m.is_zero_at(0, 0));
        assert!(!m.is_zero_at(1, 1));
        assert_eq!(m.get(0, 0), 0.);
    }

    #[test]
    fn multiply_applies_right_operand_first() {
        // scale by 2, then translate by 3
        let scale = Matrix::from_row_slice(2, 2, &[2., 0., 0., 1.]);
        let translate = Matrix::from_row_slice(2, 2, &[1., 3., 0., 1.]);
        let product = translate.multiply(&scale).unwrap();
        assert_eq!(product, Matrix::from_row_slice(2, 2, &[2., 3., 0., 1.]));
    }

    #[test]
    fn multiply_rejects_mismatched_sizes() {
        let a = Matrix::identity(3);
        let b = Matrix::identity(4);
        assert!(matches!(
            a.multiply(&b),
            Err(TransformError::MismatchedDimension { .. })
        ));
    }

    #[test]
    fn inverse_of_affine() {
        let m = Matrix::from_row_slice(3, 3, &[10., 0., 500_000., 0., -10., 6_000_000., 0., 0., 1.]);
        let inverse = m.inverse().unwrap();
        let product = inverse.multiply(&m).unwrap();
        assert!(product.is_identity(1e-20));
        assert!(inverse.is_affine());
    }

    #[test]
    fn inverse_cancels_accumulated_rounding() {
        // ten steps of 0.1 are famously not 1.0 in plain f64
        let mut m = Matrix::identity(2);
        for _ in 0..10 {
            m.convert_after(0, DoubleDouble::ONE, DoubleDouble::of(0.1));
        }
        let inverse = m.inverse().unwrap();
        assert!(m.multiply(&inverse).unwrap().is_identity(0.));
    }

    #[test]
    fn singular_matrix_is_not_invertible() {
        let m = Matrix::from_row_slice(3, 3, &[1., 2., 0., 2., 4., 0., 0., 0., 1.]);
        assert!(matches!(m.inverse(), Err(TransformError::NonInvertible(_))));
    }

    #[test]
    fn inverse_of_added_dimension_drops_it() {
        // (x, y) -> (x, y, 7)
        let m = Matrix::from_row_slice(4, 3, &[1., 0., 0., 0., 1., 0., 0., 0., 7., 0., 0., 1.]);
        let inverse = m.inverse().unwrap();
        assert_eq!(inverse.num_row(), 3);
        assert_eq!(inverse.num_col(), 4);
        assert!(inverse.multiply(&m).unwrap().is_identity(0.));
    }

    #[test]
    fn inverse_of_dropped_dimension_recreates_nan() {
        // (x, y, z) -> (2x, y)
        let m = Matrix::from_row_slice(3, 4, &[2., 0., 0., 0., 0., 1., 0., 0., 0., 0., 0., 1.]);
        let inverse = m.inverse().unwrap();
        assert_eq!(inverse.get(0, 0), 0.5);
        assert_eq!(inverse.get(1, 1), 1.);
        assert!(inverse.get(2, 2).is_nan());
    }

    #[test]
    fn dropping_used_dimension_is_not_invertible() {
        // (x, y) -> x + y
        let m = Matrix::from_row_slice(2, 3, &[1., 1., 0., 0., 0., 1.]);
        assert!(m.inverse().is_err());
    }

    #[rstest]
    #[case(DoubleDouble::DEGREES_TO_RADIANS, DoubleDouble::of(0.))]
    #[case(DoubleDouble::of(2.), DoubleDouble::of(-3.5))]
    fn convert_before_matches_multiplication(#[case] scale: DoubleDouble, #[case] offset: DoubleDouble) {
        let original = Matrix::from_row_slice(3, 3, &[1., 2., 3., 4., 5., 6., 0., 0., 1.]);
        let mut converted = original.clone();
        converted.convert_before(1, scale, offset);

        let mut step = Matrix::identity(3);
        step.set_extended(1, 1, scale);
        step.set_extended(1, 2, offset);
        let expected = original.multiply(&step).unwrap();
        assert_relative_eq!(converted, expected);
    }

    #[test]
    fn convert_after_matches_multiplication() {
        let original = Matrix::from_row_slice(3, 3, &[1., 2., 3., 4., 5., 6., 0., 0., 1.]);
        let mut converted = original.clone();
        converted.convert_after(0, DoubleDouble::of(10.), DoubleDouble::of(1.));
        let step = Matrix::from_row_slice(3, 3, &[10., 0., 1., 0., 1., 0., 0., 0., 1.]);
        assert_relative_eq!(converted, step.multiply(&original).unwrap());
    }

    #[test]
    fn remove_rows_and_columns() {
        let m = Matrix::from_row_slice(3, 3, &[1., 2., 3., 4., 5., 6., 7., 8., 9.]);
        assert_eq!(
            m.remove_rows(1, 2),
            Matrix::from_row_slice(2, 3, &[1., 2., 3., 7., 8., 9.])
        );
        assert_eq!(
            m.remove_columns(0, 2),
            Matrix::from_row_slice(3, 1, &[3., 6., 9.])
        );
    }

    #[test]
    fn dmatrix_round_trip() {
        let m = Matrix::from_row_slice(2, 3, &[1., 0., 3., 0., 1., 4.]);
        assert_eq!(Matrix::from_dmatrix(&m.to_dmatrix()), m);
    }

    #[test]
    fn strict_equality_sees_extended_precision() {
        let mut a = Matrix::identity(2);
        let mut b = Matrix::identity(2);
        a.set_extended(0, 1, DoubleDouble::new(0.1, 1e-18));
        b.set(0, 1, 0.1);
        assert!(!a.equals_strict(&b));
        assert!(a.equals_approximately(&b, 0.));
    }

    #[test]
    fn display() {
        let m = Matrix::from_row_slice(2, 2, &[1., 0.5, 0., 1.]);
        insta::assert_snapshot!(m, @r"
        [1, 0.5]
        [0, 1]
        ");
    }
}
