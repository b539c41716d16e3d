//! The [`Transform`] handle shared by every kind of coordinate operation.

use crate::concatenated::ConcatenatedTransform;
use crate::contextual::ContextualParameters;
use crate::error::TransformError;
use crate::exponential::{ExponentialTransform1D, LogarithmicTransform1D};
use crate::kernels::Kernel;
use crate::linear::LinearTransform;
use crate::matrix::Matrix;
use crate::pass_through::PassThroughTransform;
use crate::specializable::SpecializableTransform;
use crate::util::IterationStrategy;
use nalgebra::DMatrix;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};

#[cfg(any(test, feature = "approx"))]
use approx::AbsDiffEq;

/// Tolerance used by [`ComparisonMode::Approximate`].
pub const COMPARISON_TOLERANCE: f64 = 1e-12;

/// How strictly [`Transform::equals`] compares two transforms.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ComparisonMode {
    /// Bit-level comparison of every parameter.
    ///
    /// Distinguishes `0.0` from `-0.0` and different `NaN` payloads, which matters for transforms
    /// used on sample values where particular `NaN` bit patterns mark missing data.
    Strict,

    /// Comparison with a small tolerance on every coefficient.
    ///
    /// Linear transforms are compared through their matrices regardless of which specialized form
    /// was selected to represent them.
    Approximate,
}

/// A mathematical operation from `source_dimensions()`-tuples to `target_dimensions()`-tuples.
///
/// Transforms are immutable and cheap to clone: a `Transform` is a shared handle, and clones
/// refer to the same instance. They are built by the functions of this crate (see
/// [`MathTransformFactory`](crate::MathTransformFactory), the kernel modules, and
/// [`CoordinateSystemTransformBuilder`](crate::CoordinateSystemTransformBuilder)) and then only
/// evaluated, combined, and inverted.
///
/// The inverse of a transform is computed once and then memoized. The memoized inverse keeps a
/// weak link back to the transform it was computed from, so that as long as the original is
/// alive, `t.inverse()?.inverse()?` is `t` itself (see [`Transform::ptr_eq`]).
#[derive(Clone)]
pub struct Transform(Arc<Node>);

pub(crate) struct Node {
    kind: Kind,
    context: OnceLock<Arc<ContextualParameters>>,
    inverse: Mutex<Option<InverseLink>>,
}

enum InverseLink {
    /// This node computed the inverse, and owns it.
    Owned(Transform),
    /// This node _is_ the inverse of another node.
    Back(Weak<Node>),
}

/// The closed set of transform implementations.
pub(crate) enum Kind {
    Linear(LinearTransform),
    Exponential(ExponentialTransform1D),
    Logarithmic(LogarithmicTransform1D),
    PassThrough(PassThroughTransform),
    Concatenated(ConcatenatedTransform),
    Specializable(SpecializableTransform),
    Kernel(Kernel),
}

/// Runs `$body` with `$t` bound to the implementation behind a [`Kind`].
macro_rules! dispatch {
    ($kind:expr, $t:ident => $body:expr) => {
        match $kind {
            Kind::Linear($t) => $body,
            Kind::Exponential($t) => $body,
            Kind::Logarithmic($t) => $body,
            Kind::PassThrough($t) => $body,
            Kind::Concatenated($t) => $body,
            Kind::Specializable($t) => $body,
            Kind::Kernel($t) => $body,
        }
    };
}

impl Kind {
    fn discriminant(&self) -> u8 {
        match self {
            Kind::Linear(_) => 0,
            Kind::Exponential(_) => 1,
            Kind::Logarithmic(_) => 2,
            Kind::PassThrough(_) => 3,
            Kind::Concatenated(_) => 4,
            Kind::Specializable(_) => 5,
            Kind::Kernel(_) => 6,
        }
    }
}

impl Transform {
    pub(crate) fn new(kind: Kind) -> Self {
        Self(Arc::new(Node {
            kind,
            context: OnceLock::new(),
            inverse: Mutex::new(None),
        }))
    }

    /// Creates a transform carrying the parameters it was created from.
    pub(crate) fn with_context(kind: Kind, context: Option<Arc<ContextualParameters>>) -> Self {
        let transform = Self::new(kind);
        if let Some(context) = context {
            // a fresh node has no context yet
            let _ = transform.0.context.set(context);
        }
        transform
    }

    pub(crate) fn kind(&self) -> &Kind {
        &self.0.kind
    }

    pub(crate) fn downgrade(&self) -> Weak<Node> {
        Arc::downgrade(&self.0)
    }

    pub(crate) fn upgrade(node: &Weak<Node>) -> Option<Self> {
        node.upgrade().map(Self)
    }

    /// Returns the identity transform of the given dimension.
    #[must_use]
    pub fn identity(dimension: usize) -> Self {
        crate::linear::identity(dimension)
    }

    /// Number of values in the tuples this transform accepts.
    #[must_use]
    pub fn source_dimensions(&self) -> usize {
        dispatch!(&self.0.kind, t => t.source_dimensions())
    }

    /// Number of values in the tuples this transform produces.
    #[must_use]
    pub fn target_dimensions(&self) -> usize {
        dispatch!(&self.0.kind, t => t.target_dimensions())
    }

    /// Evaluates `src` into `dst`, optionally computing the Jacobian at `src` too.
    ///
    /// Both slices must have exactly the source and target dimensions respectively.
    pub(crate) fn transform_into(
        &self,
        src: &[f64],
        dst: &mut [f64],
        derivate: bool,
    ) -> Result<Option<DMatrix<f64>>, TransformError> {
        dispatch!(&self.0.kind, t => t.transform(src, dst, derivate))
    }

    fn check_source(&self, actual: usize) -> Result<(), TransformError> {
        let expected = self.source_dimensions();
        if actual == expected {
            Ok(())
        } else {
            Err(TransformError::mismatched("source coordinate tuple", expected, actual))
        }
    }

    /// Transforms a single coordinate tuple.
    pub fn transform_point(&self, point: &[f64]) -> Result<Vec<f64>, TransformError> {
        self.check_source(point.len())?;
        let mut result = vec![0.; self.target_dimensions()];
        self.transform_into(point, &mut result, false)?;
        Ok(result)
    }

    /// Transforms a single coordinate tuple and computes the derivative of the transform there.
    pub fn transform_point_with_derivative(
        &self,
        point: &[f64],
    ) -> Result<(Vec<f64>, DMatrix<f64>), TransformError> {
        self.check_source(point.len())?;
        let mut result = vec![0.; self.target_dimensions()];
        let derivative = self
            .transform_into(point, &mut result, true)?
            .ok_or_else(|| TransformError::OutsideDomain("no derivative at this point".into()))?;
        Ok((result, derivative))
    }

    /// Returns the Jacobian of this transform at the given point.
    ///
    /// The matrix has one row per target dimension and one column per source dimension: the
    /// element at `(j, i)` is the partial derivative of output `j` with respect to input `i`.
    pub fn derivative(&self, point: &[f64]) -> Result<DMatrix<f64>, TransformError> {
        self.transform_point_with_derivative(point)
            .map(|(_, derivative)| derivative)
    }

    /// Transforms `num_pts` tuples stored one after the other in `src` starting at `src_off`, and
    /// writes the results one after the other in `dst` starting at `dst_off`.
    ///
    /// A tuple that cannot be transformed is set to `NaN` in `dst`, and the remaining tuples are
    /// still processed. The error of the first such tuple is returned once all tuples are done.
    pub fn transform_points(
        &self,
        src: &[f64],
        src_off: usize,
        dst: &mut [f64],
        dst_off: usize,
        num_pts: usize,
    ) -> Result<(), TransformError> {
        let (s, t) = (self.source_dimensions(), self.target_dimensions());
        check_range("source array", src.len(), src_off, s * num_pts)?;
        check_range("destination array", dst.len(), dst_off, t * num_pts)?;
        let mut failure = None;
        for i in 0..num_pts {
            let source = &src[src_off + i * s..src_off + (i + 1) * s];
            let target = &mut dst[dst_off + i * t..dst_off + (i + 1) * t];
            if let Err(e) = self.transform_into(source, target, false) {
                target.fill(f64::NAN);
                failure.get_or_insert(e);
            }
        }
        failure.map_or(Ok(()), Err)
    }

    /// Like [`Transform::transform_points`], but with source and destination in the same buffer.
    ///
    /// The ranges may overlap, even with different source and target dimensions: tuples are
    /// visited in whichever order reads every source tuple before it is overwritten, or the
    /// source range is copied aside first when no such order exists.
    pub fn transform_in_place(
        &self,
        buffer: &mut [f64],
        src_off: usize,
        dst_off: usize,
        num_pts: usize,
    ) -> Result<(), TransformError> {
        let (s, t) = (self.source_dimensions(), self.target_dimensions());
        check_range("source array", buffer.len(), src_off, s * num_pts)?;
        check_range("destination array", buffer.len(), dst_off, t * num_pts)?;
        let order: Box<dyn Iterator<Item = usize>> =
            match IterationStrategy::suggest(src_off, s, dst_off, t, num_pts) {
                IterationStrategy::Ascending => Box::new(0..num_pts),
                IterationStrategy::Descending => Box::new((0..num_pts).rev()),
                IterationStrategy::BufferSource => {
                    let source = buffer[src_off..src_off + s * num_pts].to_vec();
                    return self.transform_points(&source, 0, buffer, dst_off, num_pts);
                }
            };
        let mut source = vec![0.; s];
        let mut target = vec![0.; t];
        let mut failure = None;
        for i in order {
            source.copy_from_slice(&buffer[src_off + i * s..src_off + (i + 1) * s]);
            if let Err(e) = self.transform_into(&source, &mut target, false) {
                target.fill(f64::NAN);
                failure.get_or_insert(e);
            }
            buffer[dst_off + i * t..dst_off + (i + 1) * t].copy_from_slice(&target);
        }
        failure.map_or(Ok(()), Err)
    }

    /// Returns the inverse of this transform.
    ///
    /// Fails with [`TransformError::NonInvertible`] if no algebraic inverse exists. The inverse
    /// is computed at most once per instance; concurrent callers racing on the first computation
    /// all receive the instance that was published first.
    pub fn inverse(&self) -> Result<Transform, TransformError> {
        if let Some(known) = self.known_inverse() {
            return Ok(known);
        }
        let computed = dispatch!(&self.0.kind, t => t.inverse(self))?;
        if computed.ptr_eq(self) {
            // self-inverse (eg, identity); storing it would create a cycle
            return Ok(computed);
        }
        {
            let mut cell = self.0.inverse.lock().unwrap_or_else(PoisonError::into_inner);
            match &*cell {
                Some(InverseLink::Owned(published)) => return Ok(published.clone()),
                Some(InverseLink::Back(node)) => {
                    if let Some(published) = Transform::upgrade(node) {
                        return Ok(published);
                    }
                    *cell = Some(InverseLink::Owned(computed.clone()));
                }
                None => *cell = Some(InverseLink::Owned(computed.clone())),
            }
        }
        let mut back = computed.0.inverse.lock().unwrap_or_else(PoisonError::into_inner);
        let stale = match &*back {
            None => true,
            Some(InverseLink::Back(node)) => node.strong_count() == 0,
            Some(InverseLink::Owned(_)) => false,
        };
        if stale {
            *back = Some(InverseLink::Back(self.downgrade()));
        }
        drop(back);
        Ok(computed)
    }

    fn known_inverse(&self) -> Option<Transform> {
        let cell = self.0.inverse.lock().unwrap_or_else(PoisonError::into_inner);
        match &*cell {
            Some(InverseLink::Owned(published)) => Some(published.clone()),
            Some(InverseLink::Back(node)) => Transform::upgrade(node),
            None => None,
        }
    }

    /// Whether this transform maps every tuple to itself.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        match &self.0.kind {
            Kind::Linear(linear) => linear.is_identity(),
            _ => false,
        }
    }

    /// Whether this transform followed by its inverse gives back every tuple.
    ///
    /// False for wraparounds, whose inverse does not restore the number of periods.
    pub(crate) fn cancels_with_inverse(&self) -> bool {
        match &self.0.kind {
            Kind::Kernel(kernel) => kernel.cancels_with_inverse(),
            Kind::PassThrough(pass) => pass.sub().cancels_with_inverse(),
            Kind::Concatenated(chain) => chain.steps().iter().all(Transform::cancels_with_inverse),
            _ => true,
        }
    }

    /// Whether both handles refer to the very same instance.
    #[must_use]
    pub fn ptr_eq(&self, other: &Transform) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Compares two transforms for equality.
    #[must_use]
    pub fn equals(&self, other: &Transform, mode: ComparisonMode) -> bool {
        match mode {
            ComparisonMode::Strict => self.equals_within(other, None),
            ComparisonMode::Approximate => self.equals_within(other, Some(COMPARISON_TOLERANCE)),
        }
    }

    /// Compares two transforms, bit by bit when `tolerance` is `None`.
    pub(crate) fn equals_within(&self, other: &Transform, tolerance: Option<f64>) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        if let Some(tolerance) = tolerance {
            if let (Some(a), Some(b)) = (self.matrix(), other.matrix()) {
                return a.equals_approximately(&b, tolerance);
            }
        }
        match (&self.0.kind, &other.0.kind) {
            (Kind::Linear(a), Kind::Linear(b)) => a.equals(b, tolerance),
            (Kind::Exponential(a), Kind::Exponential(b)) => a.equals(b, tolerance),
            (Kind::Logarithmic(a), Kind::Logarithmic(b)) => a.equals(b, tolerance),
            (Kind::PassThrough(a), Kind::PassThrough(b)) => a.equals(b, tolerance),
            (Kind::Concatenated(a), Kind::Concatenated(b)) => a.equals(b, tolerance),
            (Kind::Specializable(a), Kind::Specializable(b)) => a.equals(b, tolerance),
            (Kind::Kernel(a), Kind::Kernel(b)) => a.equals(b, tolerance),
            _ => false,
        }
    }

    /// Returns the homogeneous matrix of this transform if it is linear.
    ///
    /// Non-linear kernels never expose a matrix, even when their inverse happens to be linear
    /// (eg, the inverse of the ellipsoid-to-radius kernel merely drops a coordinate).
    #[must_use]
    pub fn matrix(&self) -> Option<Matrix> {
        match &self.0.kind {
            Kind::Linear(linear) => Some(linear.matrix().clone()),
            _ => None,
        }
    }

    /// Returns the steps applied by this transform, in order.
    ///
    /// This is a single-element list unless this is a concatenation, whose steps are never
    /// themselves concatenations.
    #[must_use]
    pub fn steps(&self) -> Vec<Transform> {
        match &self.0.kind {
            Kind::Concatenated(c) => c.steps().to_vec(),
            _ => vec![self.clone()],
        }
    }

    /// The first step applied by this transform.
    #[must_use]
    pub fn first_step(&self) -> Transform {
        match &self.0.kind {
            Kind::Concatenated(c) => c.steps()[0].clone(),
            _ => self.clone(),
        }
    }

    /// The last step applied by this transform.
    #[must_use]
    pub fn last_step(&self) -> Transform {
        match &self.0.kind {
            Kind::Concatenated(c) => c.steps()[c.steps().len() - 1].clone(),
            _ => self.clone(),
        }
    }

    /// The parameters this transform was created from, for kernels created through
    /// [`ContextualParameters::complete_transform`].
    #[must_use]
    pub fn contextual_parameters(&self) -> Option<&Arc<ContextualParameters>> {
        self.0.context.get()
    }

    pub(crate) fn attach_context(
        &self,
        context: Arc<ContextualParameters>,
    ) -> Result<(), TransformError> {
        self.0
            .context
            .set(context)
            .map_err(|_| TransformError::AlreadyInitialized("contextual parameters"))
    }

    /// A hash of the structure and parameters of this transform, consistent with
    /// [`ComparisonMode::Strict`] equality.
    #[must_use]
    pub fn structural_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash_into(&mut hasher);
        hasher.finish()
    }

    pub(crate) fn hash_into<H: Hasher>(&self, state: &mut H) {
        self.0.kind.discriminant().hash(state);
        dispatch!(&self.0.kind, t => t.hash_bits(state));
    }
}

fn check_range(
    what: &'static str,
    len: usize,
    offset: usize,
    needed: usize,
) -> Result<(), TransformError> {
    if offset + needed <= len {
        Ok(())
    } else {
        Err(TransformError::mismatched(what, offset + needed, len))
    }
}

impl Display for Transform {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        dispatch!(&self.0.kind, t => Display::fmt(t, f))
    }
}

impl Debug for Transform {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Transform({self})")
    }
}

/// Strict equality, as by [`ComparisonMode::Strict`].
impl PartialEq for Transform {
    fn eq(&self, other: &Self) -> bool {
        self.equals_within(other, None)
    }
}

#[cfg(any(test, feature = "approx"))]
impl AbsDiffEq<Self> for Transform {
    type Epsilon = f64;

    fn default_epsilon() -> Self::Epsilon {
        COMPARISON_TOLERANCE
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        self.equals_within(other, Some(epsilon))
    }
}

/// Formats a slice of numbers as `[a, b, c]`.
pub(crate) fn fmt_values(f: &mut Formatter<'_>, values: &[f64]) -> fmt::Result {
    write!(f, "[")?;
    for (i, v) in values.iter().enumerate() {
        if i != 0 {
            write!(f, ", ")?;
        }
        write!(f, "{v}")?;
    }
    write!(f, "]")
}

/// Compares two numbers bit by bit, or within a tolerance (`NaN` equal to `NaN`).
pub(crate) fn values_equal(a: f64, b: f64, tolerance: Option<f64>) -> bool {
    match tolerance {
        None => a.to_bits() == b.to_bits(),
        Some(tolerance) => (a.is_nan() && b.is_nan()) || (a - b).abs() <= tolerance,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::linear::LinearTransform1D;
    use crate::matrix::Matrix;
    use approx::{assert_abs_diff_eq, assert_abs_diff_ne, assert_relative_eq};

    /// Compares an analytic Jacobian against central differences.
    pub(crate) fn assert_derivative_matches(transform: &Transform, point: &[f64], step: f64, tolerance: f64) {
        let analytic = transform.derivative(point).unwrap();
        for i in 0..transform.source_dimensions() {
            let mut ahead = point.to_vec();
            let mut behind = point.to_vec();
            ahead[i] += step;
            behind[i] -= step;
            let ahead = transform.transform_point(&ahead).unwrap();
            let behind = transform.transform_point(&behind).unwrap();
            for j in 0..transform.target_dimensions() {
                let numeric = (ahead[j] - behind[j]) / (2. * step);
                assert!(
                    (analytic[(j, i)] - numeric).abs() <= tolerance,
                    "∂{j}/∂{i}: analytic {} but numeric {numeric}",
                    analytic[(j, i)]
                );
            }
        }
    }

    fn affine() -> Transform {
        crate::linear::create(Matrix::from_row_slice(
            3,
            3,
            &[2., 0., 10., 0., -3., 5., 0., 0., 1.],
        ))
        .unwrap()
    }

    #[test]
    fn transform_point_checks_dimension() {
        let t = affine();
        assert!(matches!(
            t.transform_point(&[1., 2., 3.]),
            Err(TransformError::MismatchedDimension {
                expected: 2,
                actual: 3,
                ..
            })
        ));
    }

    #[test]
    fn inverse_of_inverse_is_same_instance() {
        let t = affine();
        let inverse = t.inverse().unwrap();
        assert!(!inverse.ptr_eq(&t));
        assert!(inverse.inverse().unwrap().ptr_eq(&t));
        // and the first one computed is the one kept
        assert!(t.inverse().unwrap().ptr_eq(&inverse));
    }

    #[test]
    fn inverse_is_recomputed_once_original_is_gone() {
        let inverse = affine().inverse().unwrap();
        let again = inverse.inverse().unwrap();
        // a fresh instance, equal up to the rounding of two inversions
        assert!(!again.ptr_eq(&inverse));
        assert!(again.equals(&affine(), ComparisonMode::Approximate));
        assert!(again.inverse().unwrap().ptr_eq(&inverse));
    }

    #[test]
    fn identity_is_its_own_inverse() {
        let identity = Transform::identity(3);
        assert!(identity.inverse().unwrap().ptr_eq(&identity));
    }

    #[test]
    fn batch_matches_single_points() {
        let t = affine();
        let src = [0., 0., 1., 1., 2., 4., -1., 3.];
        let mut dst = [0.; 8];
        t.transform_points(&src, 0, &mut dst, 0, 4).unwrap();
        for i in 0..4 {
            let single = t.transform_point(&src[2 * i..2 * i + 2]).unwrap();
            assert_eq!(&dst[2 * i..2 * i + 2], single.as_slice());
        }
    }

    #[test]
    fn batch_rejects_short_arrays() {
        let t = affine();
        let mut dst = [0.; 4];
        assert!(t.transform_points(&[0.; 4], 1, &mut dst, 0, 2).is_err());
    }

    #[test]
    fn in_place_with_overlapping_ranges() {
        // 2-D tuples expanded to 3-D in the same buffer, destination ahead of the source
        let t = crate::linear::create(Matrix::from_row_slice(
            4,
            3,
            &[1., 0., 0., 0., 1., 0., 1., 1., 0., 0., 0., 1.],
        ))
        .unwrap();
        let points = [1., 2., 3., 4., 5., 6.];
        let mut buffer = vec![0.; 12];
        buffer[..6].copy_from_slice(&points);
        t.transform_in_place(&mut buffer, 0, 1, 3).unwrap();
        assert_eq!(&buffer[1..10], &[1., 2., 3., 3., 4., 7., 5., 6., 11.]);
    }

    fn expand_to_3d() -> Transform {
        crate::linear::create(Matrix::from_row_slice(
            4,
            3,
            &[1., 0., 0., 0., 1., 0., 0., 0., 0., 0., 0., 1.],
        ))
        .unwrap()
    }

    #[test]
    fn in_place_shifting_backward() {
        let mut buffer = vec![1., 2., 3., 4., 5., 6., 7., 8., 0., 0., 0., 0.];
        expand_to_3d().transform_in_place(&mut buffer, 4, 0, 2).unwrap();
        assert_eq!(&buffer[..6], &[5., 6., 0., 7., 8., 0.]);
        LinearTransform1D::create(10., 0.)
            .transform_in_place(&mut buffer, 0, 0, 6)
            .unwrap();
        assert_eq!(&buffer[..6], &[50., 60., 0., 70., 80., 0.]);
    }

    #[test]
    fn in_place_with_buffered_source() {
        // destination starts behind the source but grows past it
        let mut buffer: Vec<f64> = (0..30).map(f64::from).collect();
        expand_to_3d().transform_in_place(&mut buffer, 4, 0, 10).unwrap();
        for i in 0..10 {
            let x = f64::from(4 + 2 * i as u32);
            assert_eq!(&buffer[3 * i..3 * i + 3], &[x, x + 1., 0.]);
        }
    }

    #[test]
    fn derivative_of_affine_is_its_linear_part() {
        let derivative = affine().derivative(&[7., -2.]).unwrap();
        assert_relative_eq!(derivative, DMatrix::from_row_slice(2, 2, &[2., 0., 0., -3.]));
    }

    #[test]
    fn strict_and_approximate_equality() {
        let a = LinearTransform1D::create(2., 0.1);
        let b = LinearTransform1D::create(2., 0.1 + 1e-15);
        assert!(!a.equals(&b, ComparisonMode::Strict));
        assert!(a.equals(&b, ComparisonMode::Approximate));
        assert_eq!(a.structural_hash(), LinearTransform1D::create(2., 0.1).structural_hash());
    }

    #[test]
    fn partial_eq_is_strict() {
        let a = LinearTransform1D::create(2., 0.1);
        let b = LinearTransform1D::create(2., 0.1 + 1e-15);
        assert_eq!(a, LinearTransform1D::create(2., 0.1));
        assert_ne!(a, b);
        assert_abs_diff_eq!(a, b);
        assert_abs_diff_ne!(a, LinearTransform1D::create(2., 0.2));
        assert_eq!(affine(), affine());
    }

    #[test]
    fn debug_wraps_display() {
        insta::assert_snapshot!(format!("{:?}", LinearTransform1D::create(2., 3.)), @"Transform(Linear1D(scale=2, offset=3))");
    }
}
