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
use std::{sync::Arc, thread, time::Duration};

use tracing::{debug, info, span, warn, Level, Span};

use crate::{
    arm::{self, ArmError, Session},
    interrupt::CancelHandle,
    poses::{Pose, PoseLibrary},
    score::Score,
    timing::Timing,
    util::duration_minutes_seconds,
};

/// Errors that end a performance run. A note without a strike pose aborts the
/// run rather than skipping it: the mismatch is an authoring error in the
/// score/library pairing, and continuing would produce a glitchy performance.
#[derive(Debug, thiserror::Error)]
pub enum PerformError {
    #[error("no pose defined for note {note} (score event {index})")]
    NoteNotFound { index: usize, note: String },
    #[error(transparent)]
    Arm(#[from] ArmError),
}

/// How a performance run ended.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Outcome {
    /// Every event in the score was performed.
    Complete,
    /// An operator interrupt stopped the run at a phase boundary.
    Cancelled,
}

/// The sequencer's per-run state: where we are in the score and the pose most
/// recently commanded, which decides whether an off command is meaningful.
struct RunState {
    index: usize,
    last_commanded: Option<Pose>,
}

/// Drives an arm through a score, one event at a time.
///
/// Each event runs strike, retreat and hold phases in strict sequence. The
/// transit time given to the arm is the phase duration itself; each wait adds
/// the settle margin so no two commands are ever outstanding at once.
pub struct Performer {
    device: Arc<dyn arm::Device>,
    library: PoseLibrary,
    timing: Timing,
    span: Span,
}

impl Performer {
    /// Creates a new performer.
    pub fn new(device: Arc<dyn arm::Device>, library: PoseLibrary, timing: Timing) -> Performer {
        Performer {
            device,
            library,
            timing,
            span: span!(Level::INFO, "performer"),
        }
    }

    /// Performs the score from start to finish. The arm connection is held for
    /// the whole run and released on every exit path. Cancellation is honored
    /// at phase boundaries only.
    pub fn perform(
        &self,
        score: &Score,
        cancel_handle: CancelHandle,
    ) -> Result<Outcome, PerformError> {
        let _enter = self.span.enter();

        let session = Session::open(Arc::clone(&self.device))?;
        let device = session.device();

        // One observation up front as a connectivity and calibration check.
        let start_pose = device.read_pose()?;
        info!(
            device = %device,
            joints = start_pose.len(),
            "Connected to arm."
        );
        info!(
            bpm = score.bpm,
            events = score.notes.len(),
            duration = duration_minutes_seconds(score.duration()),
            "Starting performance."
        );

        let mut state = RunState {
            index: 0,
            last_commanded: None,
        };

        for (index, event) in score.notes.iter().enumerate() {
            state.index = index;

            if cancel_handle.is_cancelled() {
                info!(index = state.index, "Performance cancelled.");
                return Ok(Outcome::Cancelled);
            }

            let strike =
                self.library
                    .resolve(&event.note)
                    .ok_or_else(|| PerformError::NoteNotFound {
                        index,
                        note: event.note.clone(),
                    })?;

            let plan = self.timing.plan(score.bpm, event.length);
            info!(
                note = event.note,
                beats = event.length,
                approach = ?plan.approach,
                retreat = ?plan.retreat,
                hold = ?plan.hold,
                "Striking note."
            );

            device.command(strike, plan.approach)?;
            state.last_commanded = Some(strike.clone());
            wait(plan.approach + self.timing.settle());

            // The retreat phase is cosmetic; a note without an off pose just
            // leaves the mallet on the bar through its hold.
            match self.library.resolve_off(&event.note) {
                Some(off) if state.last_commanded.as_ref() == Some(off) => {
                    debug!(note = event.note, "Arm already at off pose.");
                    wait(plan.retreat + self.timing.settle());
                }
                Some(off) => {
                    if cancel_handle.is_cancelled() {
                        info!(index = state.index, "Performance cancelled.");
                        return Ok(Outcome::Cancelled);
                    }
                    device.command(off, plan.retreat)?;
                    state.last_commanded = Some(off.clone());
                    wait(plan.retreat + self.timing.settle());
                }
                None => {
                    warn!(note = event.note, "No off pose defined, skipping retreat.");
                }
            }

            wait(plan.hold);
        }

        info!("Performance complete.");
        Ok(Outcome::Complete)
    }
}

fn wait(duration: Duration) {
    thread::sleep(duration);
}
