// Copyright (C) 2026 The malletbot authors
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{error::Error, path::Path, time::Duration};

use config::{Config, File};
use duration_string::DurationString;
use serde::Deserialize;

/// The fraction of a note's duration spent moving into the strike pose, unless
/// a timing profile overrides it.
pub const DEFAULT_MOVE_RATIO: f64 = 0.4;
/// The fraction of a note's duration spent lifting away from the bar.
pub const DEFAULT_LIFT_RATIO: f64 = 0.2;
/// Extra wait beyond each commanded transit, covering command latency on the
/// arm's controller.
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(20);

#[derive(Debug, thiserror::Error)]
pub enum TimingError {
    #[error("invalid phase ratio configuration: move={move_ratio}, lift={lift_ratio} (each must be >= 0 and their sum must not exceed 1)")]
    InvalidRatioConfiguration { move_ratio: f64, lift_ratio: f64 },
}

/// The three phase durations for one note. Approach and retreat are the
/// transit times passed to the arm; all three are waited on in turn. They sum
/// to the note's full duration at the score's tempo.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PhasePlan {
    /// Time to move into the strike pose.
    pub approach: Duration,
    /// Time to lift away to the off pose.
    pub retreat: Duration,
    /// Remaining time to let the note ring.
    pub hold: Duration,
}

/// Phase timing configuration for a performance. Validated at construction so
/// a misconfigured profile fails before the arm is ever touched.
#[derive(Clone, Copy, Debug)]
pub struct Timing {
    move_ratio: f64,
    lift_ratio: f64,
    settle: Duration,
}

/// The on-disk shape of a timing profile. All fields are optional; absent
/// fields keep their defaults.
#[derive(Deserialize)]
struct Profile {
    move_ratio: Option<f64>,
    lift_ratio: Option<f64>,
    settle: Option<String>,
}

impl Default for Timing {
    fn default() -> Timing {
        Timing {
            move_ratio: DEFAULT_MOVE_RATIO,
            lift_ratio: DEFAULT_LIFT_RATIO,
            settle: DEFAULT_SETTLE,
        }
    }
}

impl Timing {
    /// Creates a timing configuration, rejecting ratios that would leave a
    /// note with negative hold time.
    pub fn new(move_ratio: f64, lift_ratio: f64, settle: Duration) -> Result<Timing, TimingError> {
        if !(move_ratio >= 0.0) || !(lift_ratio >= 0.0) || move_ratio + lift_ratio > 1.0 {
            return Err(TimingError::InvalidRatioConfiguration {
                move_ratio,
                lift_ratio,
            });
        }

        Ok(Timing {
            move_ratio,
            lift_ratio,
            settle,
        })
    }

    /// Loads a timing profile from a file.
    pub fn load(path: &Path) -> Result<Timing, Box<dyn Error>> {
        let profile: Profile = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize()?;

        let settle = match profile.settle {
            Some(settle) => DurationString::from_string(settle)?.into(),
            None => DEFAULT_SETTLE,
        };

        Ok(Timing::new(
            profile.move_ratio.unwrap_or(DEFAULT_MOVE_RATIO),
            profile.lift_ratio.unwrap_or(DEFAULT_LIFT_RATIO),
            settle,
        )?)
    }

    /// The settle margin added to each commanded wait.
    pub fn settle(&self) -> Duration {
        self.settle
    }

    /// Computes the phase plan for one note. The clamp on hold only absorbs
    /// floating point dust; ratios that would genuinely overrun a note are
    /// rejected in new.
    pub fn plan(&self, bpm: f64, beats: f64) -> PhasePlan {
        let base = 60.0 / bpm * beats;
        let approach = base * self.move_ratio;
        let retreat = base * self.lift_ratio;
        let hold = (base - approach - retreat).max(0.0);

        PhasePlan {
            approach: Duration::from_secs_f64(approach),
            retreat: Duration::from_secs_f64(retreat),
            hold: Duration::from_secs_f64(hold),
        }
    }
}

#[cfg(test)]
mod test {
    use std::{error::Error, io::Write, time::Duration};

    use super::{Timing, TimingError, DEFAULT_SETTLE};

    #[test]
    fn test_plan_splits_note_duration() -> Result<(), Box<dyn Error>> {
        let timing = Timing::new(0.4, 0.2, DEFAULT_SETTLE)?;

        // 120 bpm, one beat: half a second split 0.2/0.1/0.2.
        let plan = timing.plan(120.0, 1.0);
        assert_eq!(plan.approach, Duration::from_secs_f64(0.2));
        assert_eq!(plan.retreat, Duration::from_secs_f64(0.1));
        assert_eq!(plan.hold, Duration::from_secs_f64(0.2));
        Ok(())
    }

    #[test]
    fn test_plan_phases_sum_to_note_duration() -> Result<(), Box<dyn Error>> {
        let cases = [
            (0.4, 0.2, 120.0, 1.0),
            (0.4, 0.2, 93.0, 0.75),
            (0.5, 0.5, 140.0, 2.0),
            (0.0, 0.0, 60.0, 3.0),
            (1.0, 0.0, 200.0, 0.25),
            (0.33, 0.33, 77.7, 1.5),
        ];

        for (move_ratio, lift_ratio, bpm, beats) in cases {
            let timing = Timing::new(move_ratio, lift_ratio, DEFAULT_SETTLE)?;
            let plan = timing.plan(bpm, beats);

            let base = 60.0 / bpm * beats;
            let sum = plan.approach.as_secs_f64()
                + plan.retreat.as_secs_f64()
                + plan.hold.as_secs_f64();
            // Durations are rounded to whole nanoseconds, so allow for that.
            assert!(
                (sum - base).abs() < 1e-6,
                "phases sum to {} instead of {} for ratios ({}, {})",
                sum,
                base,
                move_ratio,
                lift_ratio
            );
        }
        Ok(())
    }

    #[test]
    fn test_invalid_ratios_rejected() {
        assert!(matches!(
            Timing::new(0.9, 0.2, DEFAULT_SETTLE),
            Err(TimingError::InvalidRatioConfiguration { .. })
        ));
        assert!(matches!(
            Timing::new(-0.1, 0.2, DEFAULT_SETTLE),
            Err(TimingError::InvalidRatioConfiguration { .. })
        ));
        assert!(matches!(
            Timing::new(0.4, f64::NAN, DEFAULT_SETTLE),
            Err(TimingError::InvalidRatioConfiguration { .. })
        ));
        assert!(Timing::new(0.5, 0.5, DEFAULT_SETTLE).is_ok());
    }

    #[test]
    fn test_load_profile() -> Result<(), Box<dyn Error>> {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile()?;
        file.write_all(b"move_ratio: 0.5\nsettle: 50ms\n")?;

        let timing = Timing::load(file.path())?;
        assert_eq!(timing.settle(), Duration::from_millis(50));

        // lift_ratio kept its default of 0.2.
        let plan = timing.plan(60.0, 1.0);
        assert_eq!(plan.approach, Duration::from_secs_f64(0.5));
        assert_eq!(plan.retreat, Duration::from_secs_f64(0.2));
        Ok(())
    }

    #[test]
    fn test_load_profile_rejects_overrun() -> Result<(), Box<dyn Error>> {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile()?;
        file.write_all(b"move_ratio: 0.8\nlift_ratio: 0.4\n")?;

        assert!(Timing::load(file.path()).is_err());
        Ok(())
    }
}
