//! Cosmetic settle-in sequence played after a placement is committed.

use std::time::Duration;

use bastion_core::EntityId;
use glam::Vec3;

/// Durations of the two settle phases.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct SettleTiming {
    pub(crate) rise: Duration,
    pub(crate) drop: Duration,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SettlePhase {
    Rise,
    Drop,
}

/// Continuation that lifts a freshly placed entity and drops it onto its rest height.
#[derive(Clone, Debug)]
pub(crate) struct SettleTask {
    entity: EntityId,
    phase: SettlePhase,
    elapsed: Duration,
    start: Vec3,
    peak: Vec3,
    rest: Vec3,
}

impl SettleTask {
    pub(crate) fn new(entity: EntityId, start: Vec3, rest: Vec3, rise_height: f32) -> Self {
        Self {
            entity,
            phase: SettlePhase::Rise,
            elapsed: Duration::ZERO,
            start,
            peak: rest + Vec3::Y * rise_height,
            rest,
        }
    }

    pub(crate) const fn entity(&self) -> EntityId {
        self.entity
    }

    /// Advances the sequence, returning the new position and whether it finished.
    pub(crate) fn advance(&mut self, dt: Duration, timing: SettleTiming) -> (Vec3, bool) {
        self.elapsed = self.elapsed.saturating_add(dt);

        if self.phase == SettlePhase::Rise {
            if self.elapsed < timing.rise {
                let t = fraction(self.elapsed, timing.rise);
                return (self.start.lerp(self.peak, ease_out(t)), false);
            }
            self.elapsed -= timing.rise;
            self.phase = SettlePhase::Drop;
        }

        if self.elapsed < timing.drop {
            let t = fraction(self.elapsed, timing.drop);
            return (self.peak.lerp(self.rest, ease_in(t)), false);
        }

        (self.rest, true)
    }
}

fn fraction(elapsed: Duration, total: Duration) -> f32 {
    if total.is_zero() {
        return 1.0;
    }
    (elapsed.as_secs_f32() / total.as_secs_f32()).clamp(0.0, 1.0)
}

fn ease_out(t: f32) -> f32 {
    1.0 - (1.0 - t) * (1.0 - t)
}

fn ease_in(t: f32) -> f32 {
    t * t
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMING: SettleTiming = SettleTiming {
        rise: Duration::from_millis(200),
        drop: Duration::from_millis(100),
    };

    #[test]
    fn rises_above_rest_before_dropping() {
        let rest = Vec3::new(2.0, 0.0, 3.0);
        let mut task = SettleTask::new(EntityId::new(1), rest + Vec3::Y * 0.5, rest, 1.0);

        let (mid_rise, done) = task.advance(Duration::from_millis(100), TIMING);
        assert!(!done);
        assert!(mid_rise.y > 0.5 && mid_rise.y < 1.0, "rising: {mid_rise:?}");

        let (peak, done) = task.advance(Duration::from_millis(100), TIMING);
        assert!(!done);
        assert!((peak.y - 1.0).abs() < 1e-5, "drop starts at the peak: {peak:?}");

        let (landed, done) = task.advance(Duration::from_millis(100), TIMING);
        assert!(done);
        assert_eq!(landed, rest);
    }

    #[test]
    fn large_steps_finish_in_one_tick() {
        let rest = Vec3::ZERO;
        let mut task = SettleTask::new(EntityId::new(1), Vec3::ONE, rest, 0.4);

        let (position, done) = task.advance(Duration::from_secs(5), TIMING);

        assert!(done);
        assert_eq!(position, rest);
    }

    #[test]
    fn zero_durations_complete_immediately() {
        let timing = SettleTiming {
            rise: Duration::ZERO,
            drop: Duration::ZERO,
        };
        let mut task = SettleTask::new(EntityId::new(3), Vec3::ONE, Vec3::ZERO, 1.0);

        assert_eq!(task.advance(Duration::ZERO, timing), (Vec3::ZERO, true));
    }
}
