//! Extended precision arithmetic on pairs of `f64`.
//!
//! A [`DoubleDouble`] stores a value as the unevaluated sum of two `f64`: the `value` itself
//! (rounded to nearest) and an `error` term holding what the rounding lost. This roughly doubles
//! the number of significant digits, which is what allows long chains of affine steps to be
//! concatenated (and inverted back) without the cancellation errors that would otherwise leave
//! values like `0.9999999999999998` on the diagonal of what should be an identity matrix.
//!
//! The algorithms are the classical error-free transformations of Dekker and Knuth, see
//! <https://en.wikipedia.org/wiki/2Sum> and <https://en.wikipedia.org/wiki/Floating-point_arithmetic#Error-free_transformations>.

use std::fmt;
use std::fmt::{Display, Formatter};
use std::ops::{Add, Div, Mul, Neg, Sub};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A number represented as `value + error` where `|error| <= ulp(value) / 2`.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DoubleDouble {
    value: f64,
    error: f64,
}

impl DoubleDouble {
    pub const ZERO: DoubleDouble = DoubleDouble {
        value: 0.,
        error: 0.,
    };

    pub const ONE: DoubleDouble = DoubleDouble {
        value: 1.,
        error: 0.,
    };

    /// π/180 with the part that does not fit in a single `f64`.
    pub const DEGREES_TO_RADIANS: DoubleDouble = DoubleDouble {
        value: 0.017_453_292_519_943_295,
        error: 2.948_652_270_870_168_7e-19,
    };

    /// 180/π with the part that does not fit in a single `f64`.
    pub const RADIANS_TO_DEGREES: DoubleDouble = DoubleDouble {
        value: 57.295_779_513_082_32,
        error: -1.987_849_567_057_628_3e-15,
    };

    /// Creates a number from a value and its error term.
    ///
    /// The pair is normalized such that `error` is below half an ulp of `value`.
    #[must_use]
    pub fn new(value: f64, error: f64) -> Self {
        let (value, error) = quick_two_sum(value, error);
        Self { value, error }
    }

    /// Creates a number whose value is exactly representable as a `f64`.
    #[must_use]
    pub const fn of(value: f64) -> Self {
        Self { value, error: 0. }
    }

    /// The value rounded to the nearest `f64`.
    #[must_use]
    pub fn value(&self) -> f64 {
        self.value
    }

    /// The part of the number that is not represented by [`DoubleDouble::value`].
    #[must_use]
    pub fn error(&self) -> f64 {
        self.error
    }

    /// Whether the number is exactly zero (of either sign).
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.value == 0. && self.error == 0.
    }

    #[must_use]
    pub fn is_nan(&self) -> bool {
        self.value.is_nan() || self.error.is_nan()
    }

    #[must_use]
    pub fn abs(self) -> Self {
        if self.value < 0. || (self.value == 0. && self.error < 0.) {
            -self
        } else {
            self
        }
    }

    /// Returns `1 / self`.
    #[must_use]
    pub fn inverse(self) -> Self {
        Self::ONE / self
    }

    /// Returns the square root, correct to roughly twice `f64` precision.
    #[must_use]
    pub fn sqrt(self) -> Self {
        if self.value <= 0. {
            return Self::of(self.value.sqrt());
        }
        // one Newton step from the f64 estimate
        let estimate = self.value.sqrt();
        let (square, square_error) = two_product(estimate, estimate);
        let residual = ((self.value - square) - square_error + self.error) / (2. * estimate);
        Self::new(estimate, residual)
    }

    /// Bit-level equality of both terms.
    ///
    /// Unlike `==`, this distinguishes `0.0` from `-0.0` and different `NaN` payloads.
    #[must_use]
    pub fn bits_eq(&self, other: &Self) -> bool {
        self.value.to_bits() == other.value.to_bits() && self.error.to_bits() == other.error.to_bits()
    }
}

impl Default for DoubleDouble {
    fn default() -> Self {
        Self::ZERO
    }
}

impl From<f64> for DoubleDouble {
    fn from(value: f64) -> Self {
        Self::of(value)
    }
}

impl From<DoubleDouble> for f64 {
    fn from(value: DoubleDouble) -> Self {
        value.value
    }
}

impl Display for DoubleDouble {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.value, f)
    }
}

/// Sum of `a` and `b` together with the rounding error of that sum.
fn two_sum(a: f64, b: f64) -> (f64, f64) {
    let s = a + b;
    let v = s - a;
    let e = (a - (s - v)) + (b - v);
    (s, e)
}

/// Like [`two_sum`], but requires `|a| >= |b|`.
fn quick_two_sum(a: f64, b: f64) -> (f64, f64) {
    let s = a + b;
    if !s.is_finite() {
        return (s, 0.);
    }
    (s, b - (s - a))
}

/// Product of `a` and `b` together with the rounding error of that product.
fn two_product(a: f64, b: f64) -> (f64, f64) {
    let p = a * b;
    (p, a.mul_add(b, -p))
}

impl Add for DoubleDouble {
    type Output = DoubleDouble;

    fn add(self, rhs: Self) -> Self::Output {
        let (s, e) = two_sum(self.value, rhs.value);
        let (value, error) = quick_two_sum(s, e + self.error + rhs.error);
        DoubleDouble { value, error }
    }
}

impl Sub for DoubleDouble {
    type Output = DoubleDouble;

    fn sub(self, rhs: Self) -> Self::Output {
        self + (-rhs)
    }
}

impl Mul for DoubleDouble {
    type Output = DoubleDouble;

    fn mul(self, rhs: Self) -> Self::Output {
        let (p, e) = two_product(self.value, rhs.value);
        let e = e + (self.value * rhs.error + self.error * rhs.value);
        let (value, error) = quick_two_sum(p, e);
        DoubleDouble { value, error }
    }
}

impl Div for DoubleDouble {
    type Output = DoubleDouble;

    fn div(self, rhs: Self) -> Self::Output {
        let q1 = self.value / rhs.value;
        if !q1.is_finite() {
            return DoubleDouble::of(q1);
        }
        let r = self - rhs * DoubleDouble::of(q1);
        let q2 = r.value / rhs.value;
        let r = r - rhs * DoubleDouble::of(q2);
        let q3 = r.value / rhs.value;
        let (value, error) = quick_two_sum(q1, q2);
        DoubleDouble { value, error } + DoubleDouble::of(q3)
    }
}

impl Neg for DoubleDouble {
    type Output = DoubleDouble;

    fn neg(self) -> Self::Output {
        DoubleDouble {
            value: -self.value,
            error: -self.error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::DoubleDouble;
    use rstest::rstest;

    #[test]
    fn one_third_times_three_is_one() {
        let third = DoubleDouble::ONE / DoubleDouble::of(3.);
        let product = third * DoubleDouble::of(3.);
        assert_eq!(product.value(), 1.);
        assert!(product.error().abs() < 1e-30);
    }

    #[test]
    fn keeps_what_f64_loses() {
        let sum = DoubleDouble::of(1.) + DoubleDouble::of(1e-20);
        assert_eq!(sum.value(), 1.);
        assert_eq!(sum.error(), 1e-20);
        let back = sum - DoubleDouble::of(1.);
        assert_eq!(back.value(), 1e-20);
    }

    #[test]
    fn degrees_round_trip_is_exact() {
        let ratio = DoubleDouble::DEGREES_TO_RADIANS * DoubleDouble::RADIANS_TO_DEGREES;
        assert_eq!(ratio.value(), 1.);
        assert!(ratio.error().abs() < 1e-28);
    }

    #[rstest]
    #[case(2.)]
    #[case(10.)]
    #[case(0.25)]
    fn sqrt_squares_back(#[case] x: f64) {
        let root = DoubleDouble::of(x).sqrt();
        let square = root * root;
        assert!((square - DoubleDouble::of(x)).abs().value() < 1e-28);
    }

    #[test]
    fn bits_eq_distinguishes_signed_zero() {
        assert!(DoubleDouble::of(0.).bits_eq(&DoubleDouble::of(0.)));
        assert!(!DoubleDouble::of(0.).bits_eq(&DoubleDouble::of(-0.)));
        assert_eq!(DoubleDouble::of(0.), DoubleDouble::of(-0.));
    }
}
