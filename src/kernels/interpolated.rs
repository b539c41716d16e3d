//! Datum shifts interpolated in a grid of translations.
//!
//! The kernel adds to each coordinate tuple the translation interpolated at its position in a
//! [`DatumShiftGrid`]. Grids only need to describe their cells; reading them from files is left
//! to the caller. [`InMemoryGrid`] is a bilinear grid held in memory.

use super::{inverse_kernel, Kernel};
use crate::contextual::{ContextualParameters, ParameterDescriptor};
use crate::error::TransformError;
use crate::factory::MathTransformFactory;
use crate::linear;
use crate::matrix::Matrix;
use crate::transform::{Kind, Transform};
use nalgebra::DMatrix;
use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

pub static INTERPOLATION: ParameterDescriptor = ParameterDescriptor {
    name: "Interpolated datum shift",
    parameters: &["dim"],
};

pub static INTERPOLATION_INVERSE: ParameterDescriptor = ParameterDescriptor {
    name: "Inverse of interpolated datum shift",
    parameters: &["dim"],
};

/// Maximal number of iterations when searching the source of a shifted point.
const MAXIMUM_ITERATIONS: usize = 36;

/// A grid of translations, indexed by fractional cell coordinates.
///
/// Grid indices are computed from the first two coordinates of a tuple by
/// [`coordinate_to_grid`](Self::coordinate_to_grid). Translations are in the units of the
/// coordinates, one value per translated dimension.
pub trait DatumShiftGrid: Send + Sync + Debug {
    /// Conversion from the first two coordinates to grid indices.
    fn coordinate_to_grid(&self) -> &Transform;

    /// Number of translated dimensions, at least 2.
    fn translation_dimensions(&self) -> usize;

    /// Writes the translation at `(gx, gy)` in the first [`translation_dimensions`] values of
    /// `vector`.
    ///
    /// Implementations should extrapolate rather than fail outside the grid.
    ///
    /// [`translation_dimensions`]: Self::translation_dimensions
    fn interpolate_in_cell(&self, gx: f64, gy: f64, vector: &mut [f64]);

    /// Derivative of the translation with respect to the grid indices, a
    /// `translation_dimensions × 2` matrix.
    fn derivative_in_cell(&self, gx: f64, gy: f64) -> DMatrix<f64>;

    /// Accuracy, in coordinate units, at which iterative inverses may stop.
    fn cell_precision(&self) -> f64;

    fn is_cell_in_grid(&self, gx: f64, gy: f64) -> bool;
}

#[derive(Clone, Debug)]
pub(crate) struct InterpolatedKernel {
    grid: Arc<dyn DatumShiftGrid>,
    // grid index = coordinate · scale + offset, or NaN if the conversion is not a diagonal matrix
    scale_x: f64,
    offset_x: f64,
    scale_y: f64,
    offset_y: f64,
    inverse: bool,
}

/// Creates the transform adding the translations interpolated in `grid`.
///
/// # Errors
///
/// If the grid translates fewer than 2 dimensions, has no positive precision, or converts
/// coordinates to indices with something else than a 2-D transform.
pub fn create(
    factory: &MathTransformFactory,
    grid: Arc<dyn DatumShiftGrid>,
) -> Result<Transform, TransformError> {
    let dimension = grid.translation_dimensions();
    if dimension < 2 {
        return Err(TransformError::mismatched(
            "translation dimensions",
            2,
            dimension,
        ));
    }
    let precision = grid.cell_precision();
    if !(precision > 0.) {
        return Err(TransformError::invalid(
            "cell_precision",
            format!("{precision} is not positive"),
        ));
    }
    let to_grid = grid.coordinate_to_grid();
    if to_grid.source_dimensions() != 2 || to_grid.target_dimensions() != 2 {
        return Err(TransformError::mismatched(
            "grid index dimensions",
            2,
            to_grid.source_dimensions(),
        ));
    }
    let (scale_x, offset_x, scale_y, offset_y) = match to_grid.matrix() {
        Some(m) if is_diagonal(&m) => (m.get(0, 0), m.get(0, 2), m.get(1, 1), m.get(1, 2)),
        _ => (f64::NAN, f64::NAN, f64::NAN, f64::NAN),
    };
    let mut context = ContextualParameters::new(&INTERPOLATION, dimension, dimension);
    context.set("dim", dimension as f64)?;
    let kernel = Transform::new(Kind::Kernel(Kernel::Interpolated(InterpolatedKernel {
        grid,
        scale_x,
        offset_x,
        scale_y,
        offset_y,
        inverse: false,
    })));
    context.complete_transform(factory, kernel)
}

fn is_diagonal(m: &Matrix) -> bool {
    m.num_row() == 3 && m.num_col() == 3 && m.is_affine() && m.is_zero_at(0, 1) && m.is_zero_at(1, 0)
}

impl InterpolatedKernel {
    fn dimension(&self) -> usize {
        self.grid.translation_dimensions()
    }

    pub(crate) fn source_dimensions(&self) -> usize {
        self.dimension()
    }

    pub(crate) fn target_dimensions(&self) -> usize {
        self.dimension()
    }

    fn grid_indices(&self, x: f64, y: f64) -> Result<(f64, f64), TransformError> {
        if self.scale_x.is_nan() {
            let g = self.grid.coordinate_to_grid().transform_point(&[x, y])?;
            Ok((g[0], g[1]))
        } else {
            Ok((x * self.scale_x + self.offset_x, y * self.scale_y + self.offset_y))
        }
    }

    /// Derivative of the forward shift at `(x, y)`.
    fn forward_derivative(&self, x: f64, y: f64) -> Result<DMatrix<f64>, TransformError> {
        let (gx, gy) = self.grid_indices(x, y)?;
        let to_grid = if self.scale_x.is_nan() {
            self.grid.coordinate_to_grid().derivative(&[x, y])?
        } else {
            DMatrix::from_row_slice(2, 2, &[self.scale_x, 0., 0., self.scale_y])
        };
        let shift = self.grid.derivative_in_cell(gx, gy) * to_grid;
        let n = self.dimension();
        let mut derivative = DMatrix::identity(n, n);
        for i in 0..n {
            for j in 0..2 {
                derivative[(i, j)] += shift[(i, j)];
            }
        }
        Ok(derivative)
    }

    pub(crate) fn transform(
        &self,
        src: &[f64],
        dst: &mut [f64],
        derivate: bool,
    ) -> Result<Option<DMatrix<f64>>, TransformError> {
        if self.inverse {
            return self.inverse_transform(src, dst, derivate);
        }
        let (x, y) = (src[0], src[1]);
        let (gx, gy) = self.grid_indices(x, y)?;
        let mut shift = vec![0.; self.dimension()];
        self.grid.interpolate_in_cell(gx, gy, &mut shift);
        for ((d, s), t) in dst.iter_mut().zip(src).zip(&shift) {
            *d = s + t;
        }
        if derivate {
            Ok(Some(self.forward_derivative(x, y)?))
        } else {
            Ok(None)
        }
    }

    fn inverse_transform(
        &self,
        src: &[f64],
        dst: &mut [f64],
        derivate: bool,
    ) -> Result<Option<DMatrix<f64>>, TransformError> {
        let (x, y) = (src[0], src[1]);
        let tolerance = self.grid.cell_precision();
        let mut shift = vec![0.; self.dimension()];
        let (mut xi, mut yi) = (x, y);
        for _ in 0..MAXIMUM_ITERATIONS {
            let (gx, gy) = self.grid_indices(xi, yi)?;
            self.grid.interpolate_in_cell(gx, gy, &mut shift);
            let (previous_x, previous_y) = (xi, yi);
            xi = x - shift[0];
            yi = y - shift[1];
            if !((xi - previous_x).abs() > tolerance || (yi - previous_y).abs() > tolerance) {
                for ((d, s), t) in dst.iter_mut().zip(src).zip(&shift).skip(2) {
                    *d = s - t;
                }
                dst[0] = xi;
                dst[1] = yi;
                if !derivate {
                    return Ok(None);
                }
                return self
                    .forward_derivative(xi, yi)?
                    .try_inverse()
                    .map(Some)
                    .ok_or_else(|| {
                        TransformError::NonInvertible(format!("datum shift at ({xi}, {yi})"))
                    });
            }
        }
        let (gx, gy) = self.grid_indices(xi, yi)?;
        if self.grid.is_cell_in_grid(gx, gy) {
            Err(TransformError::NoConvergence(MAXIMUM_ITERATIONS))
        } else {
            Err(TransformError::OutsideDomain(format!(
                "({x}, {y}) has no source inside the datum shift grid"
            )))
        }
    }

    pub(crate) fn inverse(&self, this: &Transform) -> Result<Transform, TransformError> {
        let descriptor = if self.inverse {
            &INTERPOLATION
        } else {
            &INTERPOLATION_INVERSE
        };
        inverse_kernel(
            this,
            Kernel::Interpolated(Self {
                inverse: !self.inverse,
                ..self.clone()
            }),
            descriptor,
            |name, p| p.parameter(name),
        )
    }

    pub(crate) fn equals(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.grid, &other.grid) && self.inverse == other.inverse
    }

    pub(crate) fn hash_bits<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.grid).cast::<()>().hash(state);
        self.inverse.hash(state);
    }
}

impl Display for InterpolatedKernel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = if self.inverse {
            "InterpolatedInverse"
        } else {
            "Interpolated"
        };
        write!(f, "{name}(dim={})", self.dimension())
    }
}

/// A grid of translations held in memory, interpolated bilinearly.
///
/// Node `(col, row)` is at `origin + (col, row) · cell_size`. Outside the grid, translations are
/// extrapolated from the nearest cell.
#[derive(Debug)]
pub struct InMemoryGrid {
    coordinate_to_grid: Transform,
    width: usize,
    height: usize,
    dimensions: usize,
    // row-major, `dimensions` values per node
    values: Vec<f64>,
    precision: f64,
}

impl InMemoryGrid {
    /// Creates a `width × height` grid of `dimensions`-D translations, given row by row.
    ///
    /// The precision of iterative inverses defaults to a billionth of the smallest cell size.
    pub fn new(
        origin: [f64; 2],
        cell_size: [f64; 2],
        [width, height]: [usize; 2],
        dimensions: usize,
        values: Vec<f64>,
    ) -> Result<Self, TransformError> {
        if width < 2 || height < 2 {
            return Err(TransformError::invalid(
                "size",
                format!("{width}×{height} grid needs at least 2×2 nodes"),
            ));
        }
        if dimensions < 2 {
            return Err(TransformError::mismatched("translation dimensions", 2, dimensions));
        }
        let expected = width * height * dimensions;
        if values.len() != expected {
            return Err(TransformError::mismatched("grid values", expected, values.len()));
        }
        if !cell_size.iter().all(|c| c.is_finite() && *c != 0.) {
            return Err(TransformError::invalid(
                "cell_size",
                format!("{cell_size:?} must be finite and non-zero"),
            ));
        }
        #[rustfmt::skip]
        let to_grid = Matrix::from_row_slice(3, 3, &[
            1. / cell_size[0], 0.,                -origin[0] / cell_size[0],
            0.,                1. / cell_size[1], -origin[1] / cell_size[1],
            0.,                0.,                1.,
        ]);
        Ok(Self {
            coordinate_to_grid: linear::create(to_grid)?,
            width,
            height,
            dimensions,
            values,
            precision: cell_size[0].abs().min(cell_size[1].abs()) * 1e-9,
        })
    }

    #[must_use]
    pub fn with_precision(mut self, precision: f64) -> Self {
        self.precision = precision;
        self
    }

    /// The lower-left node of the cell to interpolate in, and the position within it.
    fn cell(&self, gx: f64, gy: f64) -> (usize, usize, f64, f64) {
        let clamp = |g: f64, size: usize| {
            let i = if g.is_nan() {
                0.
            } else {
                g.floor().clamp(0., (size - 2) as f64)
            };
            (i as usize, g - i)
        };
        let (col, fx) = clamp(gx, self.width);
        let (row, fy) = clamp(gy, self.height);
        (col, row, fx, fy)
    }

    fn node(&self, col: usize, row: usize, dimension: usize) -> f64 {
        self.values[(row * self.width + col) * self.dimensions + dimension]
    }
}

impl DatumShiftGrid for InMemoryGrid {
    fn coordinate_to_grid(&self) -> &Transform {
        &self.coordinate_to_grid
    }

    fn translation_dimensions(&self) -> usize {
        self.dimensions
    }

    fn interpolate_in_cell(&self, gx: f64, gy: f64, vector: &mut [f64]) {
        let (col, row, fx, fy) = self.cell(gx, gy);
        for (d, v) in vector.iter_mut().enumerate().take(self.dimensions) {
            *v = self.node(col, row, d) * (1. - fx) * (1. - fy)
                + self.node(col + 1, row, d) * fx * (1. - fy)
                + self.node(col, row + 1, d) * (1. - fx) * fy
                + self.node(col + 1, row + 1, d) * fx * fy;
        }
    }

    fn derivative_in_cell(&self, gx: f64, gy: f64) -> DMatrix<f64> {
        let (col, row, fx, fy) = self.cell(gx, gy);
        DMatrix::from_fn(self.dimensions, 2, |d, j| {
            let v00 = self.node(col, row, d);
            let v10 = self.node(col + 1, row, d);
            let v01 = self.node(col, row + 1, d);
            let v11 = self.node(col + 1, row + 1, d);
            if j == 0 {
                (v10 - v00) * (1. - fy) + (v11 - v01) * fy
            } else {
                (v01 - v00) * (1. - fx) + (v11 - v10) * fx
            }
        })
    }

    fn cell_precision(&self) -> f64 {
        self.precision
    }

    fn is_cell_in_grid(&self, gx: f64, gy: f64) -> bool {
        (0. ..=(self.width - 1) as f64).contains(&gx) && (0. ..=(self.height - 1) as f64).contains(&gy)
    }
}
