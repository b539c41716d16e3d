//! Construction of transforms, with optional sharing of equal instances.

use crate::concatenated;
use crate::error::TransformError;
use crate::exponential;
use crate::linear;
use crate::matrix::Matrix;
use crate::pass_through;
use crate::specializable::{self, Envelope};
use crate::transform::{ComparisonMode, Node, Transform};
use std::collections::HashMap;
use std::sync::{OnceLock, PoisonError, RwLock, Weak};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FactoryOptions {
    /// Whether transforms equal to one created earlier (and still alive) are replaced by that
    /// earlier instance. Sharing instances also shares their memoized inverses.
    pub use_cache: bool,
}

impl Default for FactoryOptions {
    fn default() -> Self {
        Self { use_cache: true }
    }
}

/// Creates transforms, sharing equal instances if so configured.
///
/// The cache only holds weak references, so it never keeps a transform alive.
#[derive(Debug, Default)]
pub struct MathTransformFactory {
    options: FactoryOptions,
    cache: RwLock<HashMap<u64, Vec<Weak<Node>>>>,
}

impl MathTransformFactory {
    #[must_use]
    pub fn new(options: FactoryOptions) -> Self {
        Self {
            options,
            cache: RwLock::default(),
        }
    }

    /// The process-wide factory, with default options.
    #[must_use]
    pub fn shared() -> &'static MathTransformFactory {
        static SHARED: OnceLock<MathTransformFactory> = OnceLock::new();
        SHARED.get_or_init(MathTransformFactory::default)
    }

    #[must_use]
    pub fn options(&self) -> FactoryOptions {
        self.options
    }

    /// Returns a previously created transform strictly equal to `transform` if there is one
    /// still alive, or `transform` itself otherwise.
    pub fn unique(&self, transform: Transform) -> Transform {
        if !self.options.use_cache {
            return transform;
        }
        let hash = transform.structural_hash();
        let find = |candidates: &[Weak<Node>]| {
            candidates
                .iter()
                .filter_map(Transform::upgrade)
                .find(|c| c.equals(&transform, ComparisonMode::Strict))
        };
        {
            let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(existing) = cache.get(&hash).and_then(|c| find(c)) {
                log::trace!("reusing existing instance of {existing}");
                return existing;
            }
        }
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        let candidates = cache.entry(hash).or_default();
        if let Some(existing) = find(candidates) {
            log::trace!("reusing existing instance of {existing}");
            return existing;
        }
        candidates.retain(|c| c.strong_count() > 0);
        candidates.push(transform.downgrade());
        transform
    }

    #[cfg(test)]
    fn cached(&self) -> usize {
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        cache
            .values()
            .flatten()
            .filter(|c| c.strong_count() > 0)
            .count()
    }

    /// See [`linear::create`].
    pub fn create_affine(&self, matrix: Matrix) -> Result<Transform, TransformError> {
        linear::create(matrix).map(|t| self.unique(t))
    }

    /// See [`exponential::create_exponential`].
    pub fn create_exponential(&self, base: f64, scale: f64) -> Result<Transform, TransformError> {
        exponential::create_exponential(base, scale).map(|t| self.unique(t))
    }

    /// See [`exponential::create_logarithmic`].
    pub fn create_logarithmic(&self, base: f64, offset: f64) -> Result<Transform, TransformError> {
        exponential::create_logarithmic(base, offset).map(|t| self.unique(t))
    }

    /// See [`pass_through::pass_through`].
    pub fn create_pass_through(
        &self,
        first_affected: usize,
        sub: &Transform,
        num_trailing: usize,
    ) -> Result<Transform, TransformError> {
        pass_through::pass_through(first_affected, sub, num_trailing).map(|t| self.unique(t))
    }

    /// See [`pass_through::pass_through_indexed`].
    pub fn create_pass_through_indexed(
        &self,
        indices: &[usize],
        sub: &Transform,
        source_dimensions: usize,
    ) -> Result<Transform, TransformError> {
        pass_through::pass_through_indexed(indices, sub, source_dimensions).map(|t| self.unique(t))
    }

    /// See [`concatenated::concatenate`].
    pub fn create_concatenated(
        &self,
        first: &Transform,
        second: &Transform,
    ) -> Result<Transform, TransformError> {
        concatenated::concatenate(first, second).map(|t| self.unique(t))
    }

    /// See [`concatenated::concatenate_all`].
    pub fn create_concatenated_all(
        &self,
        transforms: &[Transform],
    ) -> Result<Transform, TransformError> {
        concatenated::concatenate_all(transforms).map(|t| self.unique(t))
    }

    /// See [`specializable::create`].
    pub fn create_specializable(
        &self,
        global: &Transform,
        specializations: Vec<(Envelope, Transform)>,
    ) -> Result<Transform, TransformError> {
        specializable::create(global, specializations).map(|t| self.unique(t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linear::LinearTransform1D;

    #[test]
    fn equal_transforms_are_shared() {
        let factory = MathTransformFactory::default();
        let a = factory
            .create_affine(Matrix::from_row_slice(2, 2, &[2., 1., 0., 1.]))
            .unwrap();
        let b = factory
            .create_affine(Matrix::from_row_slice(2, 2, &[2., 1., 0., 1.]))
            .unwrap();
        assert!(a.ptr_eq(&b));
        let c = factory
            .create_affine(Matrix::from_row_slice(2, 2, &[2., 1.5, 0., 1.]))
            .unwrap();
        assert!(!a.ptr_eq(&c));
        assert_eq!(factory.cached(), 2);
    }

    #[test]
    fn cache_can_be_disabled() {
        let factory = MathTransformFactory::new(FactoryOptions { use_cache: false });
        let a = factory.create_exponential(10., 1.).unwrap();
        let b = factory.create_exponential(10., 1.).unwrap();
        assert!(!a.ptr_eq(&b));
        assert!(a.equals(&b, ComparisonMode::Strict));
        assert_eq!(factory.cached(), 0);
    }

    #[test]
    fn cache_does_not_keep_transforms_alive() {
        let factory = MathTransformFactory::default();
        let a = factory.create_logarithmic(2., 0.).unwrap();
        assert_eq!(factory.cached(), 1);
        drop(a);
        assert_eq!(factory.cached(), 0);
        let b = factory.create_logarithmic(2., 0.).unwrap();
        assert_eq!(factory.cached(), 1);
        drop(b);
    }

    #[test]
    fn strict_equality_decides_sharing() {
        let factory = MathTransformFactory::default();
        let positive = factory.unique(LinearTransform1D::create(0., 0.));
        let negative = factory.unique(LinearTransform1D::create(0., -0.));
        assert!(!positive.ptr_eq(&negative));
    }

    #[test]
    fn shared_inverses() {
        let factory = MathTransformFactory::default();
        let a = factory.create_exponential(2., 3.).unwrap();
        let inverse = a.inverse().unwrap();
        let b = factory.create_exponential(2., 3.).unwrap();
        assert!(b.inverse().unwrap().ptr_eq(&inverse));
    }

    #[test]
    fn shared_factory_is_a_singleton() {
        assert!(std::ptr::eq(MathTransformFactory::shared(), MathTransformFactory::shared()));
        assert!(MathTransformFactory::shared().options().use_cache);
    }
}
