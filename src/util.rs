use uom::si::angle::degree;
use uom::si::f64::Angle;

/// Order in which the tuples of a batch are visited when source and destination share storage.
///
/// Tuples are processed one at a time and each source tuple is fully read before its destination
/// tuple is written, so the only hazard is a write clobbering a source tuple that has not been
/// visited yet. Which direction avoids that depends on the offsets and on the number of
/// dimensions of source and target tuples, which may differ.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum IterationStrategy {
    /// Visit tuples from first to last.
    Ascending,
    /// Visit tuples from last to first.
    Descending,
    /// No direction is safe: copy the source range aside first.
    BufferSource,
}

impl IterationStrategy {
    /// Picks an iteration order for `num_pts` tuples read at `src_off` with `src_dim` values each
    /// and written at `dst_off` with `dst_dim` values each, in the same buffer.
    pub(crate) fn suggest(
        src_off: usize,
        src_dim: usize,
        dst_off: usize,
        dst_dim: usize,
        num_pts: usize,
    ) -> Self {
        if num_pts <= 1 {
            return Self::Ascending;
        }
        let (so, s, dof, t) = (src_off as i128, src_dim as i128, dst_off as i128, dst_dim as i128);
        let n = num_pts as i128;
        if dof + n * t <= so || so + n * s <= dof {
            return Self::Ascending;
        }
        // Ascending: after writing tuple k-1, the write end `dof + k·t` must not pass the start of
        // source tuple k. Both sides are linear in k, so checking the two ends is enough.
        let ascending = |k: i128| dof + k * t <= so + k * s;
        if ascending(1) && ascending(n - 1) {
            return Self::Ascending;
        }
        // Descending: the write start of tuple k must not go below the end of source tuple k-1.
        let descending = |k: i128| so + k * s <= dof + k * t;
        if descending(1) && descending(n - 1) {
            return Self::Descending;
        }
        Self::BufferSource
    }
}

/// An angle normalized into one full turn.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct BoundedAngle {
    degrees: f64,
}

impl BoundedAngle {
    pub(crate) fn new(angle: impl Into<Angle>) -> Self {
        Self {
            degrees: angle.into().get::<degree>().rem_euclid(360.),
        }
    }

    /// Returns the angle in [0°, 360°).
    pub(crate) fn get_bounded(self) -> f64 {
        // rem_euclid can round up to the modulus itself for tiny negative inputs
        if self.degrees >= 360. {
            0.
        } else {
            self.degrees
        }
    }

    /// Returns the angle in [-180°, 180°).
    pub(crate) fn to_signed_range(self) -> f64 {
        let angle = self.get_bounded();
        if angle < 180. {
            angle
        } else {
            angle - 360.
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::util::{BoundedAngle, IterationStrategy};
    use approx::assert_relative_eq;
    use rstest::rstest;
    use uom::si::angle::{degree, radian};
    use uom::si::f64::Angle;

    fn d(degrees: f64) -> Angle {
        Angle::new::<degree>(degrees)
    }

    #[rstest]
    // disjoint ranges
    #[case(0, 3, 100, 3, 10, IterationStrategy::Ascending)]
    #[case(100, 2, 0, 3, 10, IterationStrategy::Ascending)]
    // same layout in place
    #[case(0, 3, 0, 3, 10, IterationStrategy::Ascending)]
    // destination lags behind the source
    #[case(6, 3, 0, 3, 10, IterationStrategy::Ascending)]
    // destination runs ahead of the source
    #[case(0, 3, 6, 3, 10, IterationStrategy::Descending)]
    // shrinking tuples in place can go forward
    #[case(0, 3, 0, 2, 10, IterationStrategy::Ascending)]
    // growing tuples in place must go backward
    #[case(0, 2, 0, 3, 10, IterationStrategy::Descending)]
    // destination starts behind but grows past the source
    #[case(4, 2, 0, 3, 10, IterationStrategy::BufferSource)]
    fn iteration_strategy(
        #[case] src_off: usize,
        #[case] src_dim: usize,
        #[case] dst_off: usize,
        #[case] dst_dim: usize,
        #[case] num_pts: usize,
        #[case] expected: IterationStrategy,
    ) {
        assert_eq!(
            IterationStrategy::suggest(src_off, src_dim, dst_off, dst_dim, num_pts),
            expected
        );
    }

    /// Replays the per-tuple read-then-write sequence on a buffer tagging every value with the
    /// index of the tuple it came from, and checks that every tuple reads intact data.
    fn simulate(src_off: usize, s: usize, dst_off: usize, t: usize, n: usize) -> bool {
        let len = (src_off + n * s).max(dst_off + n * t);
        let mut buffer: Vec<Option<usize>> = vec![None; len];
        for i in 0..n {
            for v in &mut buffer[src_off + i * s..src_off + (i + 1) * s] {
                *v = Some(i);
            }
        }
        let order: Vec<usize> = match IterationStrategy::suggest(src_off, s, dst_off, t, n) {
            IterationStrategy::Ascending => (0..n).collect(),
            IterationStrategy::Descending => (0..n).rev().collect(),
            IterationStrategy::BufferSource => return true,
        };
        for i in order {
            if buffer[src_off + i * s..src_off + (i + 1) * s]
                .iter()
                .any(|v| *v != Some(i))
            {
                return false;
            }
            for v in &mut buffer[dst_off + i * t..dst_off + (i + 1) * t] {
                *v = None;
            }
        }
        true
    }

    quickcheck::quickcheck! {
        fn suggested_strategy_never_reads_clobbered_tuples(
            src_off: u8,
            s: u8,
            dst_off: u8,
            t: u8,
            n: u8
        ) -> bool {
            let (s, t, n) = (usize::from(s % 4) + 1, usize::from(t % 4) + 1, usize::from(n % 12));
            simulate(usize::from(src_off % 32), s, usize::from(dst_off % 32), t, n)
        }
    }

    #[rstest]
    #[case(d(0.), 0., 0.)]
    #[case(d(190.), 190., -170.)]
    #[case(d(359.), 359., -1.)]
    #[case(d(-90.), 270., -90.)]
    #[case(d(-390.), 330., -30.)]
    #[case(d(360. + 120.), 120., 120.)]
    #[case(d(360. + 340.), 340., -20.)]
    #[case(d(-1e-20), 0., 0.)]
    fn bounded_angle(#[case] input: Angle, #[case] bounded: f64, #[case] signed: f64) {
        let angle = BoundedAngle::new(input);
        assert_relative_eq!(angle.get_bounded(), bounded, epsilon = 1e-12);
        assert_relative_eq!(angle.to_signed_range(), signed, epsilon = 1e-12);
    }

    #[test]
    fn bounded_angle_from_radians() {
        let angle = BoundedAngle::new(Angle::new::<radian>(-std::f64::consts::FRAC_PI_2));
        assert_relative_eq!(angle.get_bounded(), 270., epsilon = 1e-12);
    }
}
