//! One-dimensional exponential and logarithmic transforms.
//!
//! These show up on sample dimensions (eg, values stored as the logarithm of a physical quantity)
//! rather than on spatial axes, and mostly matter for how they simplify when concatenated with
//! each other or with 1-D linear transforms.

use crate::error::TransformError;
use crate::linear::LinearTransform1D;
use crate::transform::{values_equal, Kind, Transform};
use nalgebra::DMatrix;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

/// `y = scale·base^x`
#[derive(Clone, Debug)]
pub(crate) struct ExponentialTransform1D {
    base: f64,
    ln_base: f64,
    scale: f64,
}

/// `y = log_base(x) + offset`
#[derive(Clone, Debug)]
pub(crate) struct LogarithmicTransform1D {
    base: f64,
    ln_base: f64,
    offset: f64,
}

fn check_base(base: f64) -> Result<(), TransformError> {
    if base > 0. && base.is_finite() && base != 1. {
        Ok(())
    } else {
        Err(TransformError::invalid(
            "base",
            format!("{base} is not a positive number other than 1"),
        ))
    }
}

/// Creates the transform `y = scale·base^x`.
///
/// A base of 1 degenerates into the constant `scale`.
pub fn create_exponential(base: f64, scale: f64) -> Result<Transform, TransformError> {
    if base == 1. {
        return Ok(LinearTransform1D::create(0., scale));
    }
    check_base(base)?;
    Ok(Transform::new(Kind::Exponential(ExponentialTransform1D {
        base,
        ln_base: base.ln(),
        scale,
    })))
}

/// Creates the transform `y = log_base(x) + offset`.
pub fn create_logarithmic(base: f64, offset: f64) -> Result<Transform, TransformError> {
    check_base(base)?;
    Ok(Transform::new(Kind::Logarithmic(LogarithmicTransform1D {
        base,
        ln_base: base.ln(),
        offset,
    })))
}

impl ExponentialTransform1D {
    pub(crate) fn source_dimensions(&self) -> usize {
        1
    }

    pub(crate) fn target_dimensions(&self) -> usize {
        1
    }

    pub(crate) fn transform(
        &self,
        src: &[f64],
        dst: &mut [f64],
        derivate: bool,
    ) -> Result<Option<DMatrix<f64>>, TransformError> {
        let y = self.scale * self.base.powf(src[0]);
        dst[0] = y;
        Ok(derivate.then(|| DMatrix::from_element(1, 1, y * self.ln_base)))
    }

    pub(crate) fn inverse(&self, _this: &Transform) -> Result<Transform, TransformError> {
        // x = log_b(y/scale) = log_b(y) − log_b(scale)
        if !(self.scale > 0.) {
            return Err(TransformError::NonInvertible(format!(
                "exponential with scale {} has no real logarithm",
                self.scale
            )));
        }
        create_logarithmic(self.base, -(self.scale.ln() / self.ln_base))
    }

    /// Simplifications when this transform is concatenated with `other`.
    pub(crate) fn try_concatenate(
        &self,
        other: &Transform,
        apply_other_first: bool,
    ) -> Result<Option<Transform>, TransformError> {
        if apply_other_first {
            // scale·b^(a·x + o) = (scale·b^o)·(b^a)^x
            if let Some(LinearTransform1D { scale, offset }) = LinearTransform1D::of(other) {
                let base = self.base.powf(scale);
                let factor = self.scale * self.base.powf(offset);
                // a base rounding to 1 would turn this into a constant
                if check_base(base).is_err() || !factor.is_finite() {
                    return Ok(None);
                }
                return create_exponential(base, factor).map(Some);
            }
        } else if let Kind::Logarithmic(log) = other.kind() {
            // log_c(scale·b^x) + o = x·ln(b)/ln(c) + log_c(scale) + o
            if self.scale > 0. {
                return Ok(Some(LinearTransform1D::create(
                    self.ln_base / log.ln_base,
                    self.scale.ln() / log.ln_base + log.offset,
                )));
            }
        }
        Ok(None)
    }

    pub(crate) fn equals(&self, other: &Self, tolerance: Option<f64>) -> bool {
        values_equal(self.base, other.base, tolerance)
            && values_equal(self.scale, other.scale, tolerance)
    }

    pub(crate) fn hash_bits<H: Hasher>(&self, state: &mut H) {
        self.base.to_bits().hash(state);
        self.scale.to_bits().hash(state);
    }
}

impl LogarithmicTransform1D {
    pub(crate) fn source_dimensions(&self) -> usize {
        1
    }

    pub(crate) fn target_dimensions(&self) -> usize {
        1
    }

    pub(crate) fn transform(
        &self,
        src: &[f64],
        dst: &mut [f64],
        derivate: bool,
    ) -> Result<Option<DMatrix<f64>>, TransformError> {
        let x = src[0];
        let log = if self.base == 10. {
            x.log10()
        } else {
            x.ln() / self.ln_base
        };
        dst[0] = log + self.offset;
        Ok(derivate.then(|| DMatrix::from_element(1, 1, 1. / (x * self.ln_base))))
    }

    pub(crate) fn inverse(&self, _this: &Transform) -> Result<Transform, TransformError> {
        // x = b^(y − offset) = b^(−offset)·b^y
        create_exponential(self.base, self.base.powf(-self.offset))
    }

    pub(crate) fn try_concatenate(
        &self,
        other: &Transform,
        apply_other_first: bool,
    ) -> Result<Option<Transform>, TransformError> {
        if apply_other_first {
            return Ok(None);
        }
        match other.kind() {
            // scale·b^(log_b(x) + o) = x·scale·b^o
            Kind::Exponential(exp) if exp.base.to_bits() == self.base.to_bits() => Ok(Some(
                LinearTransform1D::create(exp.scale * self.base.powf(self.offset), 0.),
            )),
            _ => match LinearTransform1D::of(other) {
                Some(LinearTransform1D { scale, offset }) if scale == 1. => {
                    create_logarithmic(self.base, self.offset + offset).map(Some)
                }
                _ => Ok(None),
            },
        }
    }

    pub(crate) fn equals(&self, other: &Self, tolerance: Option<f64>) -> bool {
        values_equal(self.base, other.base, tolerance)
            && values_equal(self.offset, other.offset, tolerance)
    }

    pub(crate) fn hash_bits<H: Hasher>(&self, state: &mut H) {
        self.base.to_bits().hash(state);
        self.offset.to_bits().hash(state);
    }
}

impl Display for ExponentialTransform1D {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Exponential(base={}, scale={})", self.base, self.scale)
    }
}

impl Display for LogarithmicTransform1D {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Logarithmic(base={}, offset={})", self.base, self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concatenated::concatenate;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[rstest]
    #[case(10., 2., 3.)]
    #[case(std::f64::consts::E, 0.5, -1.25)]
    #[case(2., 1., 0.75)]
    fn exponential_round_trips(#[case] base: f64, #[case] scale: f64, #[case] x: f64) {
        let t = create_exponential(base, scale).unwrap();
        let y = t.transform_point(&[x]).unwrap();
        assert_relative_eq!(y[0], scale * base.powf(x), max_relative = 1e-14);
        let back = t.inverse().unwrap().transform_point(&y).unwrap();
        assert_relative_eq!(back[0], x, epsilon = 1e-12);
    }

    #[test]
    fn derivatives_match_central_differences() {
        let exp = create_exponential(10., 3.).unwrap();
        crate::transform::tests::assert_derivative_matches(&exp, &[0.3], 1e-6, 1e-6);
        let log = create_logarithmic(2., 1.).unwrap();
        crate::transform::tests::assert_derivative_matches(&log, &[5.], 1e-6, 1e-8);
    }

    #[test]
    fn invalid_base_is_rejected() {
        assert!(create_logarithmic(1., 0.).is_err());
        assert!(create_logarithmic(-2., 0.).is_err());
        assert!(create_exponential(f64::NAN, 1.).is_err());
        // base 1 is a constant
        let constant = create_exponential(1., 4.).unwrap();
        assert_eq!(constant.transform_point(&[123.]).unwrap(), vec![4.]);
    }

    #[test]
    fn exponential_then_logarithm_is_linear() {
        let t = concatenate(
            &create_exponential(10., 100.).unwrap(),
            &create_logarithmic(10., 1.).unwrap(),
        )
        .unwrap();
        let linear = LinearTransform1D::of(&t).unwrap();
        assert_relative_eq!(linear.scale, 1.);
        assert_relative_eq!(linear.offset, 3., epsilon = 1e-15);
    }

    #[test]
    fn logarithm_then_exponential_of_same_base_is_linear() {
        let t = concatenate(
            &create_logarithmic(2., 3.).unwrap(),
            &create_exponential(2., 0.5).unwrap(),
        )
        .unwrap();
        assert_eq!(LinearTransform1D::of(&t), Some(LinearTransform1D { scale: 4., offset: 0. }));
    }

    #[test]
    fn linear_before_exponential_is_absorbed() {
        let linear = LinearTransform1D::create(2., 1.);
        let exp = create_exponential(3., 5.).unwrap();
        let t = concatenate(&linear, &exp).unwrap();
        assert!(matches!(t.kind(), Kind::Exponential(_)));
        for x in [-1., 0., 0.5, 2.] {
            let expected = exp
                .transform_point(&linear.transform_point(&[x]).unwrap())
                .unwrap();
            assert_relative_eq!(t.transform_point(&[x]).unwrap()[0], expected[0], max_relative = 1e-14);
        }
    }

    #[test]
    fn tiny_scale_before_exponential_is_kept_apart() {
        // 2^1e-20 rounds to 1, which must not collapse into a constant
        let linear = LinearTransform1D::create(1e-20, 0.);
        let t = concatenate(&linear, &create_exponential(2., 3.).unwrap()).unwrap();
        assert_eq!(t.steps().len(), 2);
        let y = t.transform_point(&[1e22]).unwrap();
        assert_relative_eq!(y[0], 3. * 2f64.powi(100), max_relative = 1e-12);
        let back = t.inverse().unwrap().transform_point(&y).unwrap();
        assert_relative_eq!(back[0], 1e22, max_relative = 1e-12);
    }

    #[test]
    fn translation_after_logarithm_is_absorbed() {
        let t = concatenate(
            &create_logarithmic(10., 1.).unwrap(),
            &LinearTransform1D::create(1., -4.),
        )
        .unwrap();
        insta::assert_snapshot!(t, @"Logarithmic(base=10, offset=-3)");
    }

    #[test]
    fn exact_inverses_cancel() {
        let exp = create_exponential(10., 1.).unwrap();
        let t = concatenate(&exp, &exp.inverse().unwrap()).unwrap();
        assert!(t.is_identity());
    }
}
