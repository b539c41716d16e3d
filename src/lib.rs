//! This library provides composable, invertible and differentiable transforms between coordinate
//! tuples, and the geodesy kernels needed to move between geographic, geocentric, spherical,
//! polar and cylindrical coordinates.
//!
//! Everything revolves around the [`Transform`] handle. A transform maps tuples of
//! [`source_dimensions`](Transform::source_dimensions) values to tuples of
//! [`target_dimensions`](Transform::target_dimensions) values, can tell you its
//! [derivative](Transform::derivative) at any point, and knows its own
//! [inverse](Transform::inverse). Transforms are immutable and cheap to clone, so they can be
//! shared freely between threads.
//!
//! Transforms are built by a [`MathTransformFactory`], which also makes sure that equal
//! transforms are only held once. They come in a few shapes:
//!
//! - affine transforms, given by a [`Matrix`] of extended-precision ([`DoubleDouble`])
//!   coefficients;
//! - exponential and logarithmic transforms of single values;
//! - pass-through transforms, applying another transform to some of the coordinates only;
//! - concatenations of other transforms, which are simplified as they are built (two affine
//!   steps are multiplied together, a step followed by its inverse disappears, etc);
//! - specializable transforms, which use a different transform inside given areas;
//! - non-linear kernels (eg, geographic to geocentric conversion), which are always bracketed by
//!   the affine steps turning degrees into radians and back. Those affine steps and the kernel
//!   parameters are kept as [`ContextualParameters`].
//!
//! The part of a transform working on some of the dimensions only can be pulled out with a
//! [`TransformSeparator`].
//!
//! Most of the time, though, you won't build transforms by hand but rather ask the
//! [`CoordinateSystemTransformBuilder`] for the transform between two [`CoordinateSystem`]s:
//!
//! ```
//! use ortelius::{
//!     Axis, AxisDirection, AxisUnit, CoordinateSystem, CoordinateSystemTransformBuilder, CsKind,
//!     Ellipsoid, MathTransformFactory,
//! };
//!
//! // latitude first, in degrees, with the height in feet
//! let lat_lon_ft = CoordinateSystem::new(
//!     CsKind::Ellipsoidal,
//!     vec![
//!         Axis::new(AxisDirection::North, AxisUnit::Degree),
//!         Axis::new(AxisDirection::East, AxisUnit::Degree),
//!         Axis::new(AxisDirection::Up, AxisUnit::Foot),
//!     ],
//! )?;
//!
//! let factory = MathTransformFactory::default();
//! let mut builder = CoordinateSystemTransformBuilder::new(&factory);
//! builder.set_source_axes(&[lat_lon_ft], Some(Ellipsoid::wgs84()))?;
//! builder.set_target_axes(&[CoordinateSystem::geocentric()], None)?;
//! let to_geocentric = builder.create()?;
//!
//! let xyz = to_geocentric.transform_point(&[0., 90., 0.])?;
//! assert!(xyz[0].abs() < 1e-6);
//! assert!((xyz[1] - 6_378_137.).abs() < 1e-6);
//!
//! // and back again
//! let back = to_geocentric.inverse()?.transform_point(&xyz)?;
//! assert!((back[1] - 90.).abs() < 1e-9);
//! # Ok::<(), ortelius::TransformError>(())
//! ```
//!
//! Transforms can also be combined by hand:
//!
//! ```
//! use ortelius::{Matrix, MathTransformFactory};
//!
//! let factory = MathTransformFactory::default();
//! let scale = factory.create_affine(Matrix::from_row_slice(2, 2, &[2., 0., 0., 1.]))?;
//! let exp = factory.create_exponential(10., 1.)?;
//! // 10^(2x), which is simplified into 100^x
//! let both = factory.create_concatenated(&scale, &exp)?;
//! assert!((both.transform_point(&[1.5])?[0] - 1000.).abs() < 1e-9);
//! assert!((both.inverse()?.transform_point(&[1000.])?[0] - 1.5).abs() < 1e-12);
//! # Ok::<(), ortelius::TransformError>(())
//! ```

mod builder;
mod concatenated;
mod contextual;
mod coordinate_systems;
mod double_double;
mod ellipsoid;
mod error;
mod exponential;
mod factory;
mod linear;
mod matrix;
mod pass_through;
mod separator;
mod specializable;
mod transform;
mod util;

pub mod kernels;

pub use builder::CoordinateSystemTransformBuilder;
pub use contextual::{ContextualParameters, ParameterDescriptor};
pub use coordinate_systems::{Axis, AxisDirection, AxisUnit, CoordinateSystem, CsKind};
pub use double_double::DoubleDouble;
pub use ellipsoid::Ellipsoid;
pub use error::TransformError;
pub use factory::{FactoryOptions, MathTransformFactory};
pub use linear::LinearTransform1D;
pub use matrix::Matrix;
pub use separator::TransformSeparator;
pub use specializable::Envelope;
pub use transform::{ComparisonMode, Transform, COMPARISON_TOLERANCE};
