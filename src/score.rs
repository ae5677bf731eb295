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
use std::{fmt, fs, path::Path, time::Duration};

use serde::Deserialize;

use crate::util::duration_minutes_seconds;

/// Typed error for score load failures so callers can distinguish I/O and
/// syntax problems from musical validation problems.
#[derive(Debug, thiserror::Error)]
pub enum ScoreError {
    #[error("error reading score file: {0}")]
    Io(#[from] std::io::Error),
    #[error("error parsing score file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("score tempo must be positive, got {0}")]
    InvalidTempo(f64),
    #[error("score event {index} ({note}) has a non-positive length of {length} beats")]
    InvalidLength {
        index: usize,
        note: String,
        length: f64,
    },
    #[error("score contains no events")]
    Empty,
}

/// A single note event: which note to strike and for how many beats.
#[derive(Clone, Debug, Deserialize)]
pub struct Event {
    /// The note to strike.
    pub note: String,
    /// The duration of the note, in beats.
    pub length: f64,
}

/// An ordered sequence of note events at a fixed tempo. Immutable once loaded;
/// whether every note actually has a pose is checked at performance time, since
/// scores and pose libraries are authored independently.
#[derive(Debug, Deserialize)]
pub struct Score {
    /// The tempo, in beats per minute.
    pub bpm: f64,
    /// The note events, in playback order.
    pub notes: Vec<Event>,
}

impl Score {
    /// Loads and validates a score from a JSON file.
    pub fn load(path: &Path) -> Result<Score, ScoreError> {
        let score: Score = serde_json::from_str(&fs::read_to_string(path)?)?;
        score.validate()?;
        Ok(score)
    }

    fn validate(&self) -> Result<(), ScoreError> {
        // The negated comparison also rejects a NaN tempo.
        if !(self.bpm > 0.0) {
            return Err(ScoreError::InvalidTempo(self.bpm));
        }
        if self.notes.is_empty() {
            return Err(ScoreError::Empty);
        }
        for (index, event) in self.notes.iter().enumerate() {
            if !(event.length > 0.0) {
                return Err(ScoreError::InvalidLength {
                    index,
                    note: event.note.clone(),
                    length: event.length,
                });
            }
        }
        Ok(())
    }

    /// The total wall-clock duration of the score at its tempo.
    pub fn duration(&self) -> Duration {
        let beats: f64 = self.notes.iter().map(|event| event.length).sum();
        Duration::from_secs_f64(60.0 / self.bpm * beats)
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Score ({} bpm, {} events, {}):",
            self.bpm,
            self.notes.len(),
            duration_minutes_seconds(self.duration())
        )?;
        for event in self.notes.iter() {
            writeln!(f, "  - {} ({} beats)", event.note, event.length)?;
        }

        Ok(())
    }
}
