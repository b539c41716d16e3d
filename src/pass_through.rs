//! Transforms applying a sub-transform to a subset of the coordinates only.

use crate::concatenated::{concatenate, concatenate_all};
use crate::error::TransformError;
use crate::linear;
use crate::matrix::Matrix;
use crate::transform::{Kind, Transform};
use nalgebra::DMatrix;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

/// Applies `sub` to the coordinates `first_affected..first_affected + sub.source_dimensions()`
/// and copies the `first_affected` leading and `num_trailing` trailing coordinates unchanged.
#[derive(Clone, Debug)]
pub(crate) struct PassThroughTransform {
    first_affected: usize,
    sub: Transform,
    num_trailing: usize,
}

/// Creates a transform applying `sub` after `first_affected` leading coordinates, followed by
/// `num_trailing` coordinates which are left unchanged.
///
/// Returns `sub` itself when there is nothing to pass through, and folds the common cases into
/// simpler transforms: an identity `sub` gives an identity, a linear `sub` gives a larger linear
/// transform, and a pass-through `sub` is merged into a single pass-through.
pub fn pass_through(
    first_affected: usize,
    sub: &Transform,
    num_trailing: usize,
) -> Result<Transform, TransformError> {
    if first_affected == 0 && num_trailing == 0 {
        return Ok(sub.clone());
    }
    if sub.is_identity() {
        return Ok(linear::identity(
            first_affected + sub.source_dimensions() + num_trailing,
        ));
    }
    if let Kind::PassThrough(inner) = sub.kind() {
        return pass_through(
            first_affected + inner.first_affected,
            &inner.sub,
            num_trailing + inner.num_trailing,
        );
    }
    if let Some(matrix) = sub.matrix() {
        return linear::create(expand(&matrix, first_affected, num_trailing));
    }
    Ok(Transform::new(Kind::PassThrough(PassThroughTransform {
        first_affected,
        sub: sub.clone(),
        num_trailing,
    })))
}

/// Creates a transform applying `sub` to the coordinates at the given indices of
/// `source_dimensions`-tuples.
///
/// `indices` must be strictly increasing. When they are contiguous this is the same as
/// [`pass_through`]; otherwise `sub` must have as many target dimensions as source dimensions,
/// and the affected coordinates are moved in front, transformed, and moved back in place.
pub fn pass_through_indexed(
    indices: &[usize],
    sub: &Transform,
    source_dimensions: usize,
) -> Result<Transform, TransformError> {
    if indices.len() != sub.source_dimensions() {
        return Err(TransformError::mismatched(
            "pass-through indices",
            sub.source_dimensions(),
            indices.len(),
        ));
    }
    if indices.windows(2).any(|w| w[0] >= w[1]) {
        return Err(TransformError::invalid(
            "indices",
            format!("{indices:?} is not strictly increasing"),
        ));
    }
    let Some(&last) = indices.last() else {
        return Ok(linear::identity(source_dimensions));
    };
    if last >= source_dimensions {
        return Err(TransformError::invalid(
            "indices",
            format!("{last} is out of bounds for {source_dimensions} dimensions"),
        ));
    }
    let first = indices[0];
    if last - first + 1 == indices.len() {
        return pass_through(first, sub, source_dimensions - last - 1);
    }
    if sub.source_dimensions() != sub.target_dimensions() {
        return Err(TransformError::invalid(
            "sub",
            "non-contiguous coordinates can only go through a transform preserving dimensions",
        ));
    }
    // order[j] is the source coordinate moved to position j
    let order: Vec<usize> = indices
        .iter()
        .copied()
        .chain((0..source_dimensions).filter(|i| !indices.contains(i)))
        .collect();
    let mut permutation = Matrix::zeros(source_dimensions + 1, source_dimensions + 1);
    for (j, &i) in order.iter().enumerate() {
        permutation.set(j, i, 1.);
    }
    permutation.set(source_dimensions, source_dimensions, 1.);
    let permute = linear::create(permutation)?;
    concatenate_all(&[
        permute.clone(),
        pass_through(0, sub, source_dimensions - indices.len())?,
        permute.inverse()?,
    ])
}

/// Embeds the matrix of a sub-transform into the matrix of the pass-through.
fn expand(sub: &Matrix, first_affected: usize, num_trailing: usize) -> Matrix {
    let (s, t) = (sub.num_col() - 1, sub.num_row() - 1);
    let source_dim = first_affected + s + num_trailing;
    let target_dim = first_affected + t + num_trailing;
    let mut m = Matrix::zeros(target_dim + 1, source_dim + 1);
    for k in 0..first_affected {
        m.set(k, k, 1.);
    }
    for j in 0..=t {
        let row = if j == t { target_dim } else { first_affected + j };
        for i in 0..s {
            m.set_extended(row, first_affected + i, sub.get_extended(j, i));
        }
        m.set_extended(row, source_dim, sub.get_extended(j, s));
    }
    for k in 0..num_trailing {
        m.set(first_affected + t + k, first_affected + s + k, 1.);
    }
    m
}

impl PassThroughTransform {
    pub(crate) fn sub(&self) -> &Transform {
        &self.sub
    }

    pub(crate) fn first_affected(&self) -> usize {
        self.first_affected
    }

    pub(crate) fn num_trailing(&self) -> usize {
        self.num_trailing
    }

    pub(crate) fn source_dimensions(&self) -> usize {
        self.first_affected + self.sub.source_dimensions() + self.num_trailing
    }

    pub(crate) fn target_dimensions(&self) -> usize {
        self.first_affected + self.sub.target_dimensions() + self.num_trailing
    }

    pub(crate) fn transform(
        &self,
        src: &[f64],
        dst: &mut [f64],
        derivate: bool,
    ) -> Result<Option<DMatrix<f64>>, TransformError> {
        let k = self.first_affected;
        let (s, t) = (self.sub.source_dimensions(), self.sub.target_dimensions());
        dst[..k].copy_from_slice(&src[..k]);
        let sub_derivative = self
            .sub
            .transform_into(&src[k..k + s], &mut dst[k..k + t], derivate)?;
        dst[k + t..].copy_from_slice(&src[k + s..]);
        if !derivate {
            return Ok(None);
        }
        let Some(sub_derivative) = sub_derivative else {
            return Ok(None);
        };
        let mut derivative = DMatrix::zeros(self.target_dimensions(), self.source_dimensions());
        for i in 0..k {
            derivative[(i, i)] = 1.;
        }
        derivative
            .view_mut((k, k), (t, s))
            .copy_from(&sub_derivative);
        for i in 0..self.num_trailing {
            derivative[(k + t + i, k + s + i)] = 1.;
        }
        Ok(Some(derivative))
    }

    pub(crate) fn inverse(&self, _this: &Transform) -> Result<Transform, TransformError> {
        pass_through(self.first_affected, &self.sub.inverse()?, self.num_trailing)
    }

    /// Simplifications with the step following this one.
    pub(crate) fn try_concatenate(
        &self,
        other: &Transform,
        apply_other_first: bool,
    ) -> Result<Option<Transform>, TransformError> {
        if apply_other_first {
            return Ok(None);
        }
        if let Kind::PassThrough(next) = other.kind() {
            if next.first_affected == self.first_affected && next.num_trailing == self.num_trailing {
                let sub = concatenate(&self.sub, &next.sub)?;
                return pass_through(self.first_affected, &sub, self.num_trailing).map(Some);
            }
            return Ok(None);
        }
        let Some(matrix) = other.matrix() else {
            return Ok(None);
        };
        // a linear step ignoring every output of the sub-transform makes the sub-transform useless
        let k = self.first_affected;
        let (s, t) = (self.sub.source_dimensions(), self.sub.target_dimensions());
        let ignored = (0..matrix.num_row()).all(|j| (k..k + t).all(|i| matrix.is_zero_at(j, i)));
        if !ignored {
            return Ok(None);
        }
        let source_dim = self.source_dimensions();
        let mut m = Matrix::zeros(matrix.num_row(), source_dim + 1);
        for j in 0..matrix.num_row() {
            for i in 0..k {
                m.set_extended(j, i, matrix.get_extended(j, i));
            }
            for i in 0..self.num_trailing {
                m.set_extended(j, k + s + i, matrix.get_extended(j, k + t + i));
            }
            m.set_extended(j, source_dim, matrix.get_extended(j, matrix.num_col() - 1));
        }
        linear::create(m).map(Some)
    }

    pub(crate) fn equals(&self, other: &Self, tolerance: Option<f64>) -> bool {
        self.first_affected == other.first_affected
            && self.num_trailing == other.num_trailing
            && self.sub.equals_within(&other.sub, tolerance)
    }

    pub(crate) fn hash_bits<H: Hasher>(&self, state: &mut H) {
        self.first_affected.hash(state);
        self.num_trailing.hash(state);
        self.sub.hash_into(state);
    }
}

impl Display for PassThroughTransform {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PassThrough({}, {}, {})",
            self.first_affected, self.sub, self.num_trailing
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exponential::{create_exponential, create_logarithmic};
    use crate::linear::LinearTransform1D;
    use crate::transform::tests::assert_derivative_matches;
    use approx::assert_relative_eq;
    use quickcheck::TestResult;

    fn exp() -> Transform {
        create_exponential(2., 3.).unwrap()
    }

    #[test]
    fn nothing_to_pass_is_sub_itself() {
        let sub = exp();
        assert!(pass_through(0, &sub, 0).unwrap().ptr_eq(&sub));
    }

    #[test]
    fn identity_sub_is_identity() {
        let t = pass_through(2, &Transform::identity(3), 1).unwrap();
        assert!(t.is_identity());
        assert_eq!(t.source_dimensions(), 6);
    }

    #[test]
    fn linear_sub_is_expanded() {
        let t = pass_through(1, &LinearTransform1D::create(2., 5.), 1).unwrap();
        assert!(t.matrix().is_some());
        assert_eq!(t.transform_point(&[1., 2., 3.]).unwrap(), vec![1., 9., 3.]);
    }

    #[test]
    fn nested_pass_throughs_merge() {
        let t = pass_through(1, &pass_through(2, &exp(), 1).unwrap(), 3).unwrap();
        insta::assert_snapshot!(t, @"PassThrough(3, Exponential(base=2, scale=3), 4)");
    }

    #[test]
    fn derivative_is_block_diagonal() {
        let t = pass_through(1, &exp(), 2).unwrap();
        let d = t.derivative(&[5., 1., 6., 7.]).unwrap();
        let mut expected = DMatrix::identity(4, 4);
        expected[(1, 1)] = 6. * 2f64.ln();
        assert_relative_eq!(d, expected, epsilon = 1e-12);
        assert_derivative_matches(&t, &[5., 1., 6., 7.], 1e-6, 1e-7);
    }

    #[test]
    fn inverse_wraps_inverse_of_sub() {
        let t = pass_through(1, &exp(), 1).unwrap();
        let inverse = t.inverse().unwrap();
        assert!(matches!(inverse.kind(), Kind::PassThrough(p) if matches!(p.sub.kind(), Kind::Logarithmic(_))));
        let back = inverse.transform_point(&t.transform_point(&[4., 0.5, -4.]).unwrap()).unwrap();
        assert_relative_eq!(back.as_slice(), [4., 0.5, -4.].as_slice(), epsilon = 1e-12);
    }

    #[test]
    fn consecutive_pass_throughs_merge() {
        let a = pass_through(1, &exp(), 1).unwrap();
        let b = pass_through(1, &create_logarithmic(10., 0.).unwrap(), 1).unwrap();
        let t = concatenate(&a, &b).unwrap();
        // log10(3·2^x) is linear in x
        assert!(t.matrix().is_some());
        let p = t.transform_point(&[1., 2., 3.]).unwrap();
        assert_eq!((p[0], p[2]), (1., 3.));
        assert_relative_eq!(p[1], 12f64.log10(), epsilon = 1e-14);
    }

    #[test]
    fn linear_step_ignoring_sub_outputs_drops_the_sub() {
        let a = pass_through(1, &exp(), 1).unwrap();
        // keeps the first and last coordinate only, swapped
        let drop_middle = linear::create(Matrix::from_row_slice(
            3,
            4,
            &[0., 0., 1., 0., 1., 0., 0., 0., 0., 0., 0., 1.],
        ))
        .unwrap();
        let t = concatenate(&a, &drop_middle).unwrap();
        assert!(t.matrix().is_some());
        assert_eq!(t.transform_point(&[1., 2000., 3.]).unwrap(), vec![3., 1.]);
    }

    #[test]
    fn indexed_contiguous_delegates() {
        let t = pass_through_indexed(&[1], &exp(), 3).unwrap();
        insta::assert_snapshot!(t, @"PassThrough(1, Exponential(base=2, scale=3), 1)");
    }

    #[test]
    fn indexed_non_contiguous() {
        let sub = crate::kernels::cartesian::polar_to_cartesian_kernel();
        let t = pass_through_indexed(&[0, 2], &sub, 3).unwrap();
        let p = t.transform_point(&[2., 7., std::f64::consts::FRAC_PI_2]).unwrap();
        assert_relative_eq!(p.as_slice(), [0., 7., 2.].as_slice(), epsilon = 1e-12);
    }

    #[test]
    fn indexed_rejects_bad_indices() {
        assert!(pass_through_indexed(&[1, 1], &Transform::identity(2), 3).is_err());
        assert!(pass_through_indexed(&[0, 3], &Transform::identity(2), 3).is_err());
        assert!(pass_through_indexed(&[0], &Transform::identity(2), 3).is_err());
    }

    quickcheck::quickcheck! {
        fn layout_is_preserved(k: u8, m: u8, values: Vec<i8>) -> TestResult {
            let (k, m) = (usize::from(k % 4), usize::from(m % 4));
            if values.len() < k + 1 + m {
                return TestResult::discard();
            }
            let point: Vec<f64> = values[..k + 1 + m].iter().map(|v| f64::from(*v) / 32.).collect();
            let sub = exp();
            let t = pass_through(k, &sub, m).unwrap();
            let result = t.transform_point(&point).unwrap();
            let middle = sub.transform_point(&point[k..k + 1]).unwrap();
            TestResult::from_bool(
                result[..k] == point[..k]
                    && result[k] == middle[0]
                    && result[k + 1..] == point[k + 1..],
            )
        }
    }
}
