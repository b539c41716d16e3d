//! Extraction of a sub-transform working on some of the dimensions only.

use crate::concatenated::{concatenate, concatenate_all};
use crate::double_double::DoubleDouble;
use crate::error::TransformError;
use crate::factory::MathTransformFactory;
use crate::linear;
use crate::matrix::Matrix;
use crate::pass_through::pass_through;
use crate::transform::{Kind, Transform};
use std::ops::Range;

/// Extracts from a transform the part computing some target dimensions from some source
/// dimensions.
///
/// For example, the height of a `(longitude, latitude, height)` conversion that leaves heights
/// alone can be separated from the horizontal part. Only source dimensions, only target
/// dimensions, or both may be requested. Whatever was not requested is inferred by
/// [`separate`](Self::separate) and can be read back afterwards.
///
/// ```
/// use ortelius::{kernels::wraparound, MathTransformFactory, TransformSeparator};
///
/// let factory = MathTransformFactory::default();
/// // longitudes wrapped into [-180, 180), latitudes and heights untouched
/// let wrap = wraparound::create(&factory, 3, 0, 360., 0., 0.)?;
/// let mut separator = TransformSeparator::new(&wrap, &factory);
/// separator.add_source_dimensions(&[0])?;
/// let longitudes = separator.separate()?;
/// assert_eq!(separator.target_dimensions(), Some(&[0][..]));
/// assert_eq!(longitudes.transform_point(&[190.])?, vec![-170.]);
/// # Ok::<(), ortelius::TransformError>(())
/// ```
#[derive(Debug)]
pub struct TransformSeparator<'f> {
    transform: Transform,
    factory: &'f MathTransformFactory,
    source_dimensions: Option<Vec<usize>>,
    target_dimensions: Option<Vec<usize>>,
}

impl<'f> TransformSeparator<'f> {
    pub fn new(transform: &Transform, factory: &'f MathTransformFactory) -> Self {
        Self {
            transform: transform.clone(),
            factory,
            source_dimensions: None,
            target_dimensions: None,
        }
    }

    /// Forgets every requested (or inferred) dimension.
    pub fn clear(&mut self) {
        self.source_dimensions = None;
        self.target_dimensions = None;
    }

    /// Requests the given source dimensions, which must come in increasing order and after any
    /// dimension requested before.
    pub fn add_source_dimensions(&mut self, dimensions: &[usize]) -> Result<(), TransformError> {
        let upper = self.transform.source_dimensions();
        add(&mut self.source_dimensions, dimensions, upper, "source dimension")
    }

    pub fn add_source_dimension_range(&mut self, range: Range<usize>) -> Result<(), TransformError> {
        self.add_source_dimensions(&range.collect::<Vec<_>>())
    }

    /// Requests the given target dimensions, which must come in increasing order and after any
    /// dimension requested before.
    pub fn add_target_dimensions(&mut self, dimensions: &[usize]) -> Result<(), TransformError> {
        let upper = self.transform.target_dimensions();
        add(&mut self.target_dimensions, dimensions, upper, "target dimension")
    }

    pub fn add_target_dimension_range(&mut self, range: Range<usize>) -> Result<(), TransformError> {
        self.add_target_dimensions(&range.collect::<Vec<_>>())
    }

    /// The source dimensions, either requested or inferred by the last call to
    /// [`separate`](Self::separate).
    pub fn source_dimensions(&self) -> Option<&[usize]> {
        self.source_dimensions.as_deref()
    }

    /// The target dimensions, either requested or inferred by the last call to
    /// [`separate`](Self::separate).
    pub fn target_dimensions(&self) -> Option<&[usize]> {
        self.target_dimensions.as_deref()
    }

    /// Creates the transform from the requested source dimensions to the requested target
    /// dimensions.
    ///
    /// Fails with [`TransformError::NotSeparable`] if a requested target dimension depends on a
    /// source dimension that was not requested, or if the transform is not built in a way that
    /// lets us tell.
    pub fn separate(&mut self) -> Result<Transform, TransformError> {
        let (separated, sources, targets) = match (&self.source_dimensions, &self.target_dimensions)
        {
            (None, None) => {
                let all = |n: usize| (0..n).collect::<Vec<_>>();
                (
                    self.transform.clone(),
                    all(self.transform.source_dimensions()),
                    all(self.transform.target_dimensions()),
                )
            }
            (Some(sources), requested) => {
                let (filtered, inferred) = filter_source(&self.transform, sources)?;
                match requested {
                    None => (filtered, sources.clone(), inferred),
                    Some(requested) => {
                        let positions = requested
                            .iter()
                            .map(|d| {
                                inferred.iter().position(|i| i == d).ok_or_else(|| {
                                    TransformError::NotSeparable(format!(
                                        "target dimension {d} depends on source dimensions \
                                         which were not requested"
                                    ))
                                })
                            })
                            .collect::<Result<Vec<_>, _>>()?;
                        let filtered = if positions.len() == inferred.len() {
                            filtered
                        } else {
                            filter_target(&filtered, &positions)?
                        };
                        (filtered, sources.clone(), requested.clone())
                    }
                }
            }
            (None, Some(targets)) => {
                let filtered = filter_target(&self.transform, targets)?;
                let (filtered, sources) = drop_unused_sources(filtered)?;
                (filtered, sources, targets.clone())
            }
        };
        if separated.source_dimensions() != sources.len() {
            return Err(TransformError::mismatched(
                "separated source",
                sources.len(),
                separated.source_dimensions(),
            ));
        }
        if separated.target_dimensions() != targets.len() {
            return Err(TransformError::mismatched(
                "separated target",
                targets.len(),
                separated.target_dimensions(),
            ));
        }
        log::debug!("separated {sources:?} -> {targets:?} of {}", self.transform);
        self.source_dimensions = Some(sources);
        self.target_dimensions = Some(targets);
        Ok(self.factory.unique(separated))
    }
}

fn add(
    selection: &mut Option<Vec<usize>>,
    dimensions: &[usize],
    upper: usize,
    what: &'static str,
) -> Result<(), TransformError> {
    let mut previous = selection.as_ref().and_then(|s| s.last().copied());
    for &d in dimensions {
        if d >= upper {
            return Err(TransformError::invalid(
                what,
                format!("{d} is out of bounds for {upper} dimensions"),
            ));
        }
        if previous.is_some_and(|p| d <= p) {
            return Err(TransformError::invalid(
                what,
                format!("{d} does not come after {}", previous.unwrap_or_default()),
            ));
        }
        previous = Some(d);
    }
    selection.get_or_insert_with(Vec::new).extend_from_slice(dimensions);
    Ok(())
}

/// Keeps the given source dimensions of `step`, and returns the target dimensions that can still
/// be computed from them.
fn filter_source(
    step: &Transform,
    dimensions: &[usize],
) -> Result<(Transform, Vec<usize>), TransformError> {
    let source = step.source_dimensions();
    if dimensions.len() == source {
        return Ok((step.clone(), (0..step.target_dimensions()).collect()));
    }
    if step.is_identity() || dimensions.is_empty() {
        return Ok((linear::identity(dimensions.len()), dimensions.to_vec()));
    }
    if let Some(matrix) = step.matrix() {
        return filter_matrix_source(&matrix, dimensions);
    }
    match step.kind() {
        Kind::Concatenated(chain) => {
            let mut steps = Vec::with_capacity(chain.steps().len());
            let mut kept = dimensions.to_vec();
            for step in chain.steps() {
                let (filtered, targets) = filter_source(step, &kept)?;
                steps.push(filtered);
                kept = targets;
            }
            Ok((concatenate_all(&steps)?, kept))
        }
        Kind::PassThrough(pass) => {
            let k = pass.first_affected();
            let sub = pass.sub();
            let (s, t) = (sub.source_dimensions(), sub.target_dimensions());
            let leading: Vec<usize> = dimensions.iter().copied().filter(|&d| d < k).collect();
            let inside: Vec<usize> = dimensions
                .iter()
                .filter(|&&d| (k..k + s).contains(&d))
                .map(|&d| d - k)
                .collect();
            let trailing: Vec<usize> = dimensions.iter().copied().filter(|&d| d >= k + s).collect();
            if inside.is_empty() {
                let targets = leading
                    .iter()
                    .copied()
                    .chain(trailing.iter().map(|d| d - s + t))
                    .collect();
                return Ok((linear::identity(dimensions.len()), targets));
            }
            let (filtered, sub_targets) = filter_source(sub, &inside)?;
            let separated = pass_through(leading.len(), &filtered, trailing.len())?;
            let targets = leading
                .into_iter()
                .chain(sub_targets.into_iter().map(|d| d + k))
                .chain(trailing.into_iter().map(|d| d - s + t))
                .collect();
            Ok((separated, targets))
        }
        _ => Err(TransformError::NotSeparable(format!(
            "cannot keep source dimensions {dimensions:?} of {step}"
        ))),
    }
}

/// Keeps the columns of the given dimensions, and the rows which do not depend on any other.
fn filter_matrix_source(
    matrix: &Matrix,
    dimensions: &[usize],
) -> Result<(Transform, Vec<usize>), TransformError> {
    let translation = matrix.num_col() - 1;
    let last = matrix.num_row() - 1;
    let dropped: Vec<usize> = (0..translation).filter(|i| !dimensions.contains(i)).collect();
    let independent = |j: usize| dropped.iter().all(|&i| matrix.is_zero_at(j, i));
    if !independent(last) {
        return Err(TransformError::NotSeparable(
            "projective matrix depending on dropped dimensions".into(),
        ));
    }
    let rows: Vec<usize> = (0..last).filter(|&j| independent(j)).collect();
    let mut separated = Matrix::zeros(rows.len() + 1, dimensions.len() + 1);
    for (r, &j) in rows.iter().chain(std::iter::once(&last)).enumerate() {
        for (c, &i) in dimensions.iter().chain(std::iter::once(&translation)).enumerate() {
            separated.set_extended(r, c, matrix.get_extended(j, i));
        }
    }
    Ok((linear::create(separated)?, rows))
}

/// Keeps the given target dimensions of `step`.
fn filter_target(step: &Transform, dimensions: &[usize]) -> Result<Transform, TransformError> {
    let target = step.target_dimensions();
    if dimensions.len() == target {
        return Ok(step.clone());
    }
    if let Kind::PassThrough(pass) = step.kind() {
        let k = pass.first_affected();
        let (s, t) = (pass.sub().source_dimensions(), pass.sub().target_dimensions());
        // none of the outputs of the sub-transform is needed, so neither is the sub-transform
        if dimensions.iter().all(|d| !(k..k + t).contains(d)) {
            let sources: Vec<usize> = dimensions
                .iter()
                .map(|&d| if d < k { d } else { d - t + s })
                .collect();
            return linear::create(selection(&sources, step.source_dimensions()));
        }
    }
    concatenate(step, &linear::create(selection(dimensions, target))?)
}

/// The matrix picking the given coordinates out of `dimension`-tuples.
fn selection(dimensions: &[usize], dimension: usize) -> Matrix {
    let mut matrix = Matrix::zeros(dimensions.len() + 1, dimension + 1);
    for (j, &i) in dimensions.iter().enumerate() {
        matrix.set_extended(j, i, DoubleDouble::ONE);
    }
    matrix.set_extended(dimensions.len(), dimension, DoubleDouble::ONE);
    matrix
}

/// Removes the source dimensions a linear transform ignores, returning those it keeps.
fn drop_unused_sources(transform: Transform) -> Result<(Transform, Vec<usize>), TransformError> {
    let all: Vec<usize> = (0..transform.source_dimensions()).collect();
    let Some(matrix) = transform.matrix() else {
        return Ok((transform, all));
    };
    let used: Vec<usize> = all
        .into_iter()
        .filter(|&i| (0..matrix.num_row()).any(|j| !matrix.is_zero_at(j, i)))
        .collect();
    if used.len() == transform.source_dimensions() {
        return Ok((transform, used));
    }
    filter_matrix_source(&matrix, &used).map(|(separated, _)| (separated, used))
}
