//! Building transforms between coordinate systems.
//!
//! The [`CoordinateSystemTransformBuilder`] takes the (possibly compound) source and target
//! coordinate systems, picks a kernel for each aligned pair of components, and brackets each
//! kernel with the affine transforms that take the declared axes to the canonical ones and back.

use crate::contextual::ContextualParameters;
use crate::coordinate_systems::{CoordinateSystem, CsKind};
use crate::ellipsoid::Ellipsoid;
use crate::error::TransformError;
use crate::factory::MathTransformFactory;
use crate::kernels::centric::TargetType;
use crate::kernels::molodensky::{self, MolodenskyParameters};
use crate::kernels::{cartesian, centric, radius};
use crate::matrix::Matrix;
use crate::transform::{Kind, Transform};
use std::sync::Arc;
use uom::si::f64::Length;
use uom::si::length::meter;

struct Side {
    components: Vec<CoordinateSystem>,
    ellipsoid: Option<Ellipsoid>,
}

/// Creates the transform between two coordinate systems.
///
/// ```
/// # use ortelius::{CoordinateSystem, CoordinateSystemTransformBuilder, Ellipsoid, MathTransformFactory};
/// let factory = MathTransformFactory::default();
/// let mut builder = CoordinateSystemTransformBuilder::new(&factory);
/// builder.set_source_axes(&[CoordinateSystem::geographic_3d()], Some(Ellipsoid::wgs84()))?;
/// builder.set_target_axes(&[CoordinateSystem::geocentric()], None)?;
/// let transform = builder.create()?;
/// let xyz = transform.transform_point(&[0., 0., 0.])?;
/// assert!((xyz[0] - 6_378_137.).abs() < 1e-6);
/// # Ok::<(), ortelius::TransformError>(())
/// ```
pub struct CoordinateSystemTransformBuilder<'f> {
    factory: &'f MathTransformFactory,
    source: Option<Side>,
    target: Option<Side>,
    datum_shift: Option<MolodenskyParameters>,
    parameters: Option<Arc<ContextualParameters>>,
}

impl<'f> CoordinateSystemTransformBuilder<'f> {
    #[must_use]
    pub fn new(factory: &'f MathTransformFactory) -> Self {
        Self {
            factory,
            source: None,
            target: None,
            datum_shift: None,
            parameters: None,
        }
    }

    /// Sets the components of the source coordinate system, and the ellipsoid its geographic or
    /// spherical coordinates are on (if any).
    pub fn set_source_axes(
        &mut self,
        components: &[CoordinateSystem],
        ellipsoid: Option<Ellipsoid>,
    ) -> Result<(), TransformError> {
        set_once(&mut self.source, "source axes", components, ellipsoid)
    }

    /// Sets the components of the target coordinate system, and the ellipsoid its geographic or
    /// spherical coordinates are on (if any).
    pub fn set_target_axes(
        &mut self,
        components: &[CoordinateSystem],
        ellipsoid: Option<Ellipsoid>,
    ) -> Result<(), TransformError> {
        set_once(&mut self.target, "target axes", components, ellipsoid)
    }

    /// Sets the translation between the geocentric origins of the source and target datums.
    ///
    /// Geographic coordinates are then shifted with the Molodensky formulas. Without this, they
    /// are only shifted when both ellipsoids are known and differ.
    pub fn set_datum_shift(&mut self, shift: MolodenskyParameters) -> Result<(), TransformError> {
        if self.datum_shift.is_some() {
            return Err(TransformError::AlreadyInitialized("datum shift"));
        }
        self.datum_shift = Some(shift);
        Ok(())
    }

    /// The parameters of the kernel used by the last transform created, if it has any.
    #[must_use]
    pub fn parameters(&self) -> Option<Arc<ContextualParameters>> {
        self.parameters.clone()
    }

    /// Creates the transform from the source axes to the target axes.
    ///
    /// Compound systems are first converted component by component. If the number of components
    /// differs, or some pair of components has no known conversion, each side is merged into a
    /// single coordinate system and converted as a whole.
    ///
    /// # Errors
    ///
    /// [`TransformError::MissingParameter`] if either side has not been set, or if an ellipsoid
    /// is needed and none was given, and [`TransformError::OperationNotFound`] if there is no
    /// known conversion between the two sides.
    pub fn create(&mut self) -> Result<Transform, TransformError> {
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| TransformError::MissingParameter("source axes".into()))?;
        let target = self
            .target
            .as_ref()
            .ok_or_else(|| TransformError::MissingParameter("target axes".into()))?;

        let mut transform = None;
        if source.components.len() == target.components.len() {
            transform = self.component_wise(source, target)?;
        }
        if transform.is_none() {
            log::debug!(
                "no component-wise conversion from {} to {}, merging components",
                kinds(&source.components),
                kinds(&target.components)
            );
            let merged = CoordinateSystem::merge(&source.components)
                .zip(CoordinateSystem::merge(&target.components));
            if let Some((s, t)) = merged {
                transform = self.convert(
                    &s,
                    &t,
                    source.ellipsoid.as_ref(),
                    target.ellipsoid.as_ref(),
                )?;
            }
        }
        let transform = transform.ok_or_else(|| TransformError::OperationNotFound {
            from_kind: kinds(&source.components),
            to_kind: kinds(&target.components),
        })?;
        self.parameters = find_parameters(&transform);
        Ok(transform)
    }

    fn component_wise(
        &self,
        source: &Side,
        target: &Side,
    ) -> Result<Option<Transform>, TransformError> {
        let mut steps = Vec::with_capacity(source.components.len());
        let mut leading = 0;
        for (i, (s, t)) in source.components.iter().zip(&target.components).enumerate() {
            let Some(step) =
                self.convert(s, t, source.ellipsoid.as_ref(), target.ellipsoid.as_ref())?
            else {
                return Ok(None);
            };
            let trailing = source.components[i + 1..]
                .iter()
                .map(CoordinateSystem::dimension)
                .sum();
            steps.push(self.factory.create_pass_through(leading, &step, trailing)?);
            leading += t.dimension();
        }
        self.factory.create_concatenated_all(&steps).map(Some)
    }

    fn convert(
        &self,
        source: &CoordinateSystem,
        target: &CoordinateSystem,
        source_ellipsoid: Option<&Ellipsoid>,
        target_ellipsoid: Option<&Ellipsoid>,
    ) -> Result<Option<Transform>, TransformError> {
        let pair = Pair {
            factory: self.factory,
            source,
            target,
            source_ellipsoid,
            target_ellipsoid,
            datum_shift: self.datum_shift.as_ref(),
        };
        let Some((_, kernel)) = KERNELS
            .iter()
            .find(|(kinds, _)| *kinds == (source.kind(), target.kind()))
        else {
            return Ok(None);
        };
        let Some(kernel) = kernel(&pair)? else {
            return Ok(None);
        };
        let steps = [
            self.factory.create_affine(source.to_canonical())?,
            kernel,
            self.factory.create_affine(target.from_canonical()?)?,
        ];
        self.factory.create_concatenated_all(&steps).map(Some)
    }
}

fn set_once(
    side: &mut Option<Side>,
    what: &'static str,
    components: &[CoordinateSystem],
    ellipsoid: Option<Ellipsoid>,
) -> Result<(), TransformError> {
    if side.is_some() {
        return Err(TransformError::AlreadyInitialized(what));
    }
    if components.is_empty() {
        return Err(TransformError::invalid(what, "no coordinate system given"));
    }
    *side = Some(Side {
        components: components.to_vec(),
        ellipsoid,
    });
    Ok(())
}

fn kinds(components: &[CoordinateSystem]) -> String {
    components
        .iter()
        .map(|c| c.kind().to_string())
        .collect::<Vec<_>>()
        .join(" + ")
}

fn find_parameters(transform: &Transform) -> Option<Arc<ContextualParameters>> {
    transform.steps().iter().find_map(|step| {
        if let Some(parameters) = step.contextual_parameters() {
            return Some(Arc::clone(parameters));
        }
        match step.kind() {
            Kind::PassThrough(p) => find_parameters(p.sub()),
            _ => None,
        }
    })
}

/// One source and one target component, in canonical axes.
struct Pair<'a> {
    factory: &'a MathTransformFactory,
    source: &'a CoordinateSystem,
    target: &'a CoordinateSystem,
    source_ellipsoid: Option<&'a Ellipsoid>,
    target_ellipsoid: Option<&'a Ellipsoid>,
    datum_shift: Option<&'a MolodenskyParameters>,
}

impl Pair<'_> {
    fn dimensions(&self) -> (usize, usize) {
        (self.source.dimension(), self.target.dimension())
    }

    /// The ellipsoid of the source, or of the target if the source has none.
    fn ellipsoid(&self) -> Result<&Ellipsoid, TransformError> {
        self.source_ellipsoid
            .or(self.target_ellipsoid)
            .ok_or_else(|| TransformError::MissingParameter("ellipsoid".into()))
    }

    fn geocentric(&self, target: TargetType) -> Result<Option<Transform>, TransformError> {
        if self.target.dimension() != 3 {
            return Ok(None);
        }
        let with_height = self.source.dimension() == 3;
        centric::create(self.factory, self.ellipsoid()?, with_height, target).map(Some)
    }

    /// The Molodensky shift between both ellipsoids, if a shift was asked for or the ellipsoids
    /// differ.
    fn datum_shift(&self) -> Result<Option<Transform>, TransformError> {
        let differ = matches!(
            (self.source_ellipsoid, self.target_ellipsoid),
            (Some(a), Some(b)) if a != b
        );
        if self.datum_shift.is_none() && !differ {
            return Ok(None);
        }
        let (Some(source), Some(target)) = (self.source_ellipsoid, self.target_ellipsoid) else {
            return Err(TransformError::MissingParameter("ellipsoid".into()));
        };
        let zero = Length::new::<meter>(0.);
        let none = MolodenskyParameters::new(zero, zero, zero);
        let (s, t) = self.dimensions();
        molodensky::create(
            self.factory,
            source,
            s == 3,
            target,
            t == 3,
            self.datum_shift.unwrap_or(&none),
        )
        .map(Some)
    }

    fn geographic(&self, source: TargetType) -> Result<Option<Transform>, TransformError> {
        if self.source.dimension() != 3 {
            return Ok(None);
        }
        let with_height = self.target.dimension() == 3;
        centric::create(self.factory, self.ellipsoid()?, with_height, source)?
            .inverse()
            .map(Some)
    }
}

type KernelFn = fn(&Pair<'_>) -> Result<Option<Transform>, TransformError>;

static KERNELS: &[((CsKind, CsKind), KernelFn)] = &[
    ((CsKind::Cartesian, CsKind::Cartesian), same_kind),
    ((CsKind::Ellipsoidal, CsKind::Ellipsoidal), same_kind),
    ((CsKind::Spherical, CsKind::Spherical), same_kind),
    ((CsKind::Polar, CsKind::Polar), same_kind),
    ((CsKind::Cylindrical, CsKind::Cylindrical), same_kind),
    ((CsKind::Vertical, CsKind::Vertical), same_kind),
    ((CsKind::Spherical, CsKind::Cartesian), spherical_to_cartesian),
    ((CsKind::Cartesian, CsKind::Spherical), cartesian_to_spherical),
    ((CsKind::Polar, CsKind::Cartesian), polar_to_cartesian),
    ((CsKind::Cartesian, CsKind::Polar), cartesian_to_polar),
    ((CsKind::Cylindrical, CsKind::Cartesian), cylindrical_to_cartesian),
    ((CsKind::Cartesian, CsKind::Cylindrical), cartesian_to_cylindrical),
    ((CsKind::Ellipsoidal, CsKind::Cartesian), geographic_to_geocentric),
    ((CsKind::Cartesian, CsKind::Ellipsoidal), geocentric_to_geographic),
    ((CsKind::Ellipsoidal, CsKind::Spherical), geographic_to_spherical),
    ((CsKind::Spherical, CsKind::Ellipsoidal), spherical_to_geographic),
];

fn when_dimensions(
    p: &Pair<'_>,
    dimensions: (usize, usize),
    create: fn(&MathTransformFactory) -> Result<Transform, TransformError>,
) -> Result<Option<Transform>, TransformError> {
    if p.dimensions() == dimensions {
        create(p.factory).map(Some)
    } else {
        Ok(None)
    }
}

fn spherical_to_cartesian(p: &Pair<'_>) -> Result<Option<Transform>, TransformError> {
    when_dimensions(p, (3, 3), cartesian::spherical_to_cartesian)
}

fn cartesian_to_spherical(p: &Pair<'_>) -> Result<Option<Transform>, TransformError> {
    when_dimensions(p, (3, 3), cartesian::cartesian_to_spherical)
}

fn polar_to_cartesian(p: &Pair<'_>) -> Result<Option<Transform>, TransformError> {
    when_dimensions(p, (2, 2), cartesian::polar_to_cartesian)
}

fn cartesian_to_polar(p: &Pair<'_>) -> Result<Option<Transform>, TransformError> {
    when_dimensions(p, (2, 2), cartesian::cartesian_to_polar)
}

fn cylindrical_to_cartesian(p: &Pair<'_>) -> Result<Option<Transform>, TransformError> {
    when_dimensions(p, (3, 3), cartesian::cylindrical_to_cartesian)
}

fn cartesian_to_cylindrical(p: &Pair<'_>) -> Result<Option<Transform>, TransformError> {
    when_dimensions(p, (3, 3), cartesian::cartesian_to_cylindrical)
}

fn geographic_to_geocentric(p: &Pair<'_>) -> Result<Option<Transform>, TransformError> {
    p.geocentric(TargetType::Cartesian)
}

fn geocentric_to_geographic(p: &Pair<'_>) -> Result<Option<Transform>, TransformError> {
    p.geographic(TargetType::Cartesian)
}

fn geographic_to_spherical(p: &Pair<'_>) -> Result<Option<Transform>, TransformError> {
    p.geocentric(TargetType::Spherical)
}

fn spherical_to_geographic(p: &Pair<'_>) -> Result<Option<Transform>, TransformError> {
    p.geographic(TargetType::Spherical)
}

/// Axis changes only (unless a datum shift applies), except for geographic heights and spherical radii being added or dropped.
fn same_kind(p: &Pair<'_>) -> Result<Option<Transform>, TransformError> {
    if p.source.kind() == CsKind::Ellipsoidal {
        if let Some(shift) = p.datum_shift()? {
            return Ok(Some(shift));
        }
    }
    let transform = match (p.source.kind(), p.dimensions()) {
        (_, (s, t)) if s == t => Transform::identity(s),
        (CsKind::Ellipsoidal, (2, 3) | (3, 2)) => {
            let (s, t) = p.dimensions();
            p.factory.create_affine(Matrix::affine_identity(t, s))?
        }
        (CsKind::Spherical, (2, 3)) => radius::create(p.factory, p.ellipsoid()?)?,
        (CsKind::Spherical, (3, 2)) => radius::create(p.factory, p.ellipsoid()?)?.inverse()?,
        _ => return Ok(None),
    };
    Ok(Some(transform))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinate_systems::{Axis, AxisDirection, AxisUnit};
    use crate::kernels::centric::GEOGRAPHIC_TO_GEOCENTRIC;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn build(
        factory: &MathTransformFactory,
        source: &[CoordinateSystem],
        source_ellipsoid: Option<Ellipsoid>,
        target: &[CoordinateSystem],
        target_ellipsoid: Option<Ellipsoid>,
    ) -> Result<Transform, TransformError> {
        let mut builder = CoordinateSystemTransformBuilder::new(factory);
        builder.set_source_axes(source, source_ellipsoid)?;
        builder.set_target_axes(target, target_ellipsoid)?;
        builder.create()
    }

    fn latitude_first() -> CoordinateSystem {
        CoordinateSystem::new(
            CsKind::Ellipsoidal,
            vec![
                Axis::new(AxisDirection::North, AxisUnit::Degree),
                Axis::new(AxisDirection::East, AxisUnit::Degree),
            ],
        )
        .unwrap()
    }

    #[test]
    fn axis_swap_is_linear() {
        let factory = MathTransformFactory::default();
        let t = build(
            &factory,
            &[latitude_first()],
            None,
            &[CoordinateSystem::geographic_2d()],
            None,
        )
        .unwrap();
        assert!(t.matrix().is_some());
        assert_eq!(t.transform_point(&[10., 20.]).unwrap(), vec![20., 10.]);
    }

    #[test]
    fn geographic_to_geocentric() {
        let factory = MathTransformFactory::default();
        let mut builder = CoordinateSystemTransformBuilder::new(&factory);
        builder
            .set_source_axes(&[CoordinateSystem::geographic_3d()], Some(Ellipsoid::wgs84()))
            .unwrap();
        builder
            .set_target_axes(&[CoordinateSystem::geocentric()], None)
            .unwrap();
        let t = builder.create().unwrap();
        assert_relative_eq!(
            t.transform_point(&[90., 0., 0.]).unwrap().as_slice(),
            [0., 6_378_137., 0.].as_slice(),
            epsilon = 1e-6
        );
        let parameters = builder.parameters().unwrap();
        assert!(std::ptr::eq(parameters.descriptor(), &GEOGRAPHIC_TO_GEOCENTRIC));

        let back = t
            .inverse()
            .unwrap()
            .transform_point(&t.transform_point(&[12., 55., 300.]).unwrap())
            .unwrap();
        assert_relative_eq!(back.as_slice(), [12., 55., 300.].as_slice(), epsilon = 1e-7);
    }

    #[test]
    fn compound_source_is_merged() {
        let factory = MathTransformFactory::default();
        let compound = build(
            &factory,
            &[CoordinateSystem::geographic_2d(), CoordinateSystem::vertical()],
            Some(Ellipsoid::wgs84()),
            &[CoordinateSystem::geocentric()],
            None,
        )
        .unwrap();
        let single = build(
            &factory,
            &[CoordinateSystem::geographic_3d()],
            Some(Ellipsoid::wgs84()),
            &[CoordinateSystem::geocentric()],
            None,
        )
        .unwrap();
        let point = [-3., 41., 120.];
        assert_relative_eq!(
            compound.transform_point(&point).unwrap().as_slice(),
            single.transform_point(&point).unwrap().as_slice(),
            epsilon = 1e-9
        );
    }

    #[test]
    fn component_wise_conversion() {
        let factory = MathTransformFactory::default();
        let depth_in_feet = CoordinateSystem::new(
            CsKind::Vertical,
            vec![Axis::new(AxisDirection::Down, AxisUnit::Foot)],
        )
        .unwrap();
        let t = build(
            &factory,
            &[CoordinateSystem::polar(), depth_in_feet],
            None,
            &[CoordinateSystem::cartesian_2d(), CoordinateSystem::vertical()],
            None,
        )
        .unwrap();
        assert_eq!(t.source_dimensions(), 3);
        assert_eq!(t.target_dimensions(), 3);
        assert_relative_eq!(
            t.transform_point(&[2., 90., 10.]).unwrap().as_slice(),
            [0., 2., -3.048].as_slice(),
            epsilon = 1e-12
        );
    }

    #[rstest]
    #[case(CoordinateSystem::geographic_2d(), CoordinateSystem::geographic_3d(), &[5., 6.], &[5., 6., 0.])]
    #[case(CoordinateSystem::geographic_3d(), CoordinateSystem::geographic_2d(), &[5., 6., 7.], &[5., 6.])]
    #[case(CoordinateSystem::spherical_2d(), CoordinateSystem::spherical(), &[0., 0.], &[0., 0., 6_378_137.])]
    #[case(CoordinateSystem::cylindrical(), CoordinateSystem::geocentric(), &[1., 180., 4.], &[-1., 0., 4.])]
    fn dimension_changes(
        #[case] source: CoordinateSystem,
        #[case] target: CoordinateSystem,
        #[case] point: &[f64],
        #[case] expected: &[f64],
    ) {
        let t = build(
            &MathTransformFactory::default(),
            &[source],
            Some(Ellipsoid::wgs84()),
            &[target],
            None,
        )
        .unwrap();
        assert_relative_eq!(
            t.transform_point(point).unwrap().as_slice(),
            expected,
            epsilon = 1e-6
        );
    }

    #[test]
    fn missing_ellipsoid() {
        let result = build(
            &MathTransformFactory::default(),
            &[CoordinateSystem::geographic_3d()],
            None,
            &[CoordinateSystem::geocentric()],
            None,
        );
        assert_eq!(
            result.unwrap_err(),
            TransformError::MissingParameter("ellipsoid".into())
        );
    }

    #[test]
    fn operation_not_found() {
        let result = build(
            &MathTransformFactory::default(),
            &[CoordinateSystem::vertical()],
            None,
            &[CoordinateSystem::polar()],
            None,
        );
        assert_eq!(
            result.unwrap_err(),
            TransformError::OperationNotFound {
                from_kind: "Vertical".into(),
                to_kind: "Polar".into(),
            }
        );
    }

    #[test]
    fn datum_shift_between_ellipsoids() {
        let factory = MathTransformFactory::default();
        let international_1924 =
            Ellipsoid::from_inverse_flattening(Length::new::<meter>(6_378_388.), 297.).unwrap();
        let shift = MolodenskyParameters::new(
            Length::new::<meter>(84.87),
            Length::new::<meter>(96.49),
            Length::new::<meter>(116.95),
        );
        let mut builder = CoordinateSystemTransformBuilder::new(&factory);
        builder
            .set_source_axes(&[CoordinateSystem::geographic_3d()], Some(Ellipsoid::wgs84()))
            .unwrap();
        builder
            .set_target_axes(&[CoordinateSystem::geographic_3d()], Some(international_1924))
            .unwrap();
        builder.set_datum_shift(shift).unwrap();
        assert_eq!(
            builder.set_datum_shift(shift),
            Err(TransformError::AlreadyInitialized("datum shift"))
        );
        let t = builder.create().unwrap();
        let shifted = t.transform_point(&[2.129_55, 53.809_394_44, 73.]).unwrap();
        assert_relative_eq!(shifted[0], 2.130_965_843, epsilon = 1e-8);
        assert_relative_eq!(shifted[1], 53.810_157_056, epsilon = 1e-8);
        assert_relative_eq!(shifted[2], 28.02, epsilon = 0.01);
        let parameters = builder.parameters().unwrap();
        assert!(std::ptr::eq(parameters.descriptor(), &molodensky::MOLODENSKY));
    }

    #[test]
    fn datum_shift_needs_both_ellipsoids() {
        let factory = MathTransformFactory::default();
        let mut builder = CoordinateSystemTransformBuilder::new(&factory);
        builder
            .set_source_axes(&[CoordinateSystem::geographic_2d()], Some(Ellipsoid::wgs84()))
            .unwrap();
        builder
            .set_target_axes(&[CoordinateSystem::geographic_2d()], None)
            .unwrap();
        builder
            .set_datum_shift(MolodenskyParameters::new(
                Length::new::<meter>(1.),
                Length::new::<meter>(0.),
                Length::new::<meter>(0.),
            ))
            .unwrap();
        assert_eq!(
            builder.create().unwrap_err(),
            TransformError::MissingParameter("ellipsoid".into())
        );
    }

    #[test]
    fn builder_state() {
        let factory = MathTransformFactory::default();
        let mut builder = CoordinateSystemTransformBuilder::new(&factory);
        assert!(matches!(
            builder.create(),
            Err(TransformError::MissingParameter(_))
        ));
        builder
            .set_source_axes(&[CoordinateSystem::cartesian_2d()], None)
            .unwrap();
        assert_eq!(
            builder.set_source_axes(&[CoordinateSystem::polar()], None),
            Err(TransformError::AlreadyInitialized("source axes"))
        );
        builder
            .set_target_axes(&[CoordinateSystem::polar()], None)
            .unwrap();
        builder.create().unwrap();
        assert_eq!(
            builder.parameters().unwrap().descriptor().name,
            "Cartesian to polar"
        );
    }
}
