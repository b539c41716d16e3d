//! Concatenation of transforms, with pairwise simplification of neighbouring steps.
//!
//! [`concatenate`] keeps a flat list of steps: concatenating concatenations appends their steps
//! rather than nesting them. Where the last step of the first operand meets the first step of the
//! second, the two steps get a chance to merge:
//!
//! - identity steps disappear;
//! - two linear steps become their matrix product;
//! - a step followed by its own inverse disappears;
//! - otherwise the first step is asked whether it can absorb its successor, and if not the second
//!   step is asked whether it can absorb its predecessor (see the `try_concatenate` methods of
//!   the exponential, logarithmic and pass-through transforms).
//!
//! A replacement step is then itself concatenated with the remaining neighbours, so merges can
//! cascade along the chain.

use crate::error::TransformError;
use crate::linear;
use crate::transform::{Kind, Transform};
use nalgebra::DMatrix;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

/// A product of linear steps closer than this to identity is treated as identity.
pub const IDENTITY_TOLERANCE: f64 = 1e-16;

#[derive(Clone, Debug)]
pub(crate) struct ConcatenatedTransform {
    /// At least two steps, none of which is a concatenation.
    steps: Vec<Transform>,
}

/// Returns a transform that applies `first` then `second`.
pub fn concatenate(first: &Transform, second: &Transform) -> Result<Transform, TransformError> {
    if first.target_dimensions() != second.source_dimensions() {
        return Err(TransformError::mismatched(
            "concatenated transforms",
            first.target_dimensions(),
            second.source_dimensions(),
        ));
    }
    if first.is_identity() {
        return Ok(second.clone());
    }
    if second.is_identity() {
        return Ok(first.clone());
    }
    let (head, last) = split_last(first);
    let (next, tail) = split_first(second);
    if let Some(joined) = simplify(&last, &next) {
        let mut result = joined;
        if let Some(head) = head {
            result = concatenate(&head, &result)?;
        }
        if let Some(tail) = tail {
            result = concatenate(&result, &tail)?;
        }
        return Ok(result);
    }
    let mut steps = first.steps();
    steps.extend(second.steps());
    Ok(from_steps(steps))
}

/// Concatenates all the given transforms, in order.
pub fn concatenate_all(transforms: &[Transform]) -> Result<Transform, TransformError> {
    let Some((first, rest)) = transforms.split_first() else {
        return Err(TransformError::invalid(
            "transforms",
            "at least one transform is needed",
        ));
    };
    rest.iter()
        .try_fold(first.clone(), |result, next| concatenate(&result, next))
}

/// Wraps already-simplified steps without looking at them again.
fn from_steps(mut steps: Vec<Transform>) -> Transform {
    if steps.len() == 1 {
        return steps.remove(0);
    }
    Transform::new(Kind::Concatenated(ConcatenatedTransform { steps }))
}

fn split_last(transform: &Transform) -> (Option<Transform>, Transform) {
    let mut steps = transform.steps();
    match steps.pop() {
        Some(last) if !steps.is_empty() => (Some(from_steps(steps)), last),
        _ => (None, transform.clone()),
    }
}

fn split_first(transform: &Transform) -> (Transform, Option<Transform>) {
    let mut steps = transform.steps();
    if steps.len() < 2 {
        return (transform.clone(), None);
    }
    let first = steps.remove(0);
    (first, Some(from_steps(steps)))
}

/// Tries to replace `first` followed by `second` by a single step.
///
/// Failures while trying are not errors: the steps are just kept apart.
fn simplify(first: &Transform, second: &Transform) -> Option<Transform> {
    match try_simplify(first, second) {
        Ok(joined) => joined,
        Err(e) => {
            log::debug!("keeping {first} and {second} apart: {e}");
            None
        }
    }
}

fn try_simplify(first: &Transform, second: &Transform) -> Result<Option<Transform>, TransformError> {
    if let (Some(a), Some(b)) = (first.matrix(), second.matrix()) {
        let product = b.multiply(&a)?;
        if product.is_identity(IDENTITY_TOLERANCE) {
            return Ok(Some(linear::identity(product.num_row() - 1)));
        }
        return linear::create(product).map(Some);
    }
    // only a step that keeps all its information can cancel with its inverse
    if first.source_dimensions() <= first.target_dimensions() && first.cancels_with_inverse() {
        if let Ok(inverse) = first.inverse() {
            if inverse.equals_within(second, None) {
                return Ok(Some(linear::identity(first.source_dimensions())));
            }
        }
    }
    if let Some(joined) = try_concatenate(first, second, false)? {
        return Ok(Some(joined));
    }
    try_concatenate(second, first, true)
}

/// Asks `this` whether it can absorb `other`, which comes before it if `apply_other_first` and
/// after it otherwise.
fn try_concatenate(
    this: &Transform,
    other: &Transform,
    apply_other_first: bool,
) -> Result<Option<Transform>, TransformError> {
    match this.kind() {
        Kind::Exponential(exp) => exp.try_concatenate(other, apply_other_first),
        Kind::Logarithmic(log) => log.try_concatenate(other, apply_other_first),
        Kind::PassThrough(pass) => pass.try_concatenate(other, apply_other_first),
        Kind::Kernel(kernel) => kernel.try_concatenate(this, other, apply_other_first),
        _ => Ok(None),
    }
}

impl ConcatenatedTransform {
    pub(crate) fn steps(&self) -> &[Transform] {
        &self.steps
    }

    pub(crate) fn source_dimensions(&self) -> usize {
        self.steps[0].source_dimensions()
    }

    pub(crate) fn target_dimensions(&self) -> usize {
        self.steps[self.steps.len() - 1].target_dimensions()
    }

    pub(crate) fn transform(
        &self,
        src: &[f64],
        dst: &mut [f64],
        derivate: bool,
    ) -> Result<Option<DMatrix<f64>>, TransformError> {
        let mut point = src.to_vec();
        let mut derivative: Option<DMatrix<f64>> = None;
        for step in &self.steps {
            let mut next = vec![0.; step.target_dimensions()];
            let step_derivative = step.transform_into(&point, &mut next, derivate)?;
            if derivate {
                let Some(step_derivative) = step_derivative else {
                    return Ok(None);
                };
                // chain rule: later Jacobians multiply on the left
                derivative = Some(match derivative {
                    Some(so_far) => step_derivative * so_far,
                    None => step_derivative,
                });
            }
            point = next;
        }
        dst.copy_from_slice(&point);
        Ok(derivative)
    }

    pub(crate) fn inverse(&self, _this: &Transform) -> Result<Transform, TransformError> {
        let inverses = self
            .steps
            .iter()
            .rev()
            .map(Transform::inverse)
            .collect::<Result<Vec<_>, _>>()?;
        concatenate_all(&inverses)
    }

    pub(crate) fn equals(&self, other: &Self, tolerance: Option<f64>) -> bool {
        self.steps.len() == other.steps.len()
            && self
                .steps
                .iter()
                .zip(&other.steps)
                .all(|(a, b)| a.equals_within(b, tolerance))
    }

    pub(crate) fn hash_bits<H: Hasher>(&self, state: &mut H) {
        self.steps.len().hash(state);
        for step in &self.steps {
            step.hash_into(state);
        }
    }
}

impl Display for ConcatenatedTransform {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            if i != 0 {
                write!(f, " → ")?;
            }
            write!(f, "{step}")?;
        }
        Ok(())
    }
}
