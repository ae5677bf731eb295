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
use std::{
    collections::{BTreeMap, HashMap},
    fmt, fs,
    path::Path,
};

use serde::{Deserialize, Serialize};

/// A joint-target pose: joint name to target position. The position unit is
/// whatever the arm's calibration was captured in.
pub type Pose = BTreeMap<String, f64>;

/// Typed error for pose library construction failures.
#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    #[error("error reading pose file: {0}")]
    Io(#[from] std::io::Error),
    #[error("error parsing pose file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("pose entry {index} has an empty note name")]
    UnnamedEntry { index: usize },
    #[error("pose entry {index} ({note}) has no joint targets")]
    EmptyPose { index: usize, note: String },
    #[error("duplicate pose entries for note {note} disagree")]
    ConflictingDuplicate { note: String },
}

/// The on-disk shape of one pose: a note name and its joint targets. Pose
/// capture tools write extra bookkeeping fields alongside these; they are
/// ignored here.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Entry {
    /// The note this pose strikes.
    pub note: String,
    /// The joint targets for this pose.
    pub motors: Pose,
}

/// An immutable lookup from note name to strike pose, with an optional second
/// lookup for off poses. A note with no off pose is valid; it means the arm
/// stays on the bar for that note's retreat phase.
pub struct PoseLibrary {
    strikes: HashMap<String, Pose>,
    offs: HashMap<String, Pose>,
}

impl PoseLibrary {
    /// Builds a library from strike entries and off entries, validating each.
    /// Duplicate entries for the same note are rejected if their poses
    /// disagree; a last-wins policy would make the performance silently
    /// ambiguous.
    pub fn new(strikes: Vec<Entry>, offs: Vec<Entry>) -> Result<PoseLibrary, LibraryError> {
        Ok(PoseLibrary {
            strikes: build_table(strikes)?,
            offs: build_table(offs)?,
        })
    }

    /// Loads a library from a strike pose file and an optional off pose file.
    pub fn load(strike_path: &Path, off_path: Option<&Path>) -> Result<PoseLibrary, LibraryError> {
        let strikes = parse_entries(strike_path)?;
        let offs = match off_path {
            Some(off_path) => parse_entries(off_path)?,
            None => Vec::new(),
        };
        PoseLibrary::new(strikes, offs)
    }

    /// Resolves a note to its strike pose.
    pub fn resolve(&self, note: &str) -> Option<&Pose> {
        self.strikes.get(note)
    }

    /// Resolves a note to its off pose. None is not an error; it signals that
    /// the note has no retreat phase.
    pub fn resolve_off(&self, note: &str) -> Option<&Pose> {
        self.offs.get(note)
    }

    /// The notes with strike poses, alphabetized for consistent output.
    pub fn notes(&self) -> Vec<&str> {
        let mut notes: Vec<&str> = self.strikes.keys().map(String::as_str).collect();
        notes.sort_unstable();
        notes
    }

    /// Builds an off-pose table from the strike poses by applying per-joint
    /// offsets. Joints absent from the offset table are carried over
    /// unchanged, so the derived pose stays commandable.
    pub fn lift_table(&self, offsets: &Pose) -> Vec<Entry> {
        self.notes()
            .into_iter()
            .map(|note| {
                let strike = &self.strikes[note];
                let motors = strike
                    .iter()
                    .map(|(joint, position)| {
                        let offset = offsets.get(joint).copied().unwrap_or(0.0);
                        (joint.clone(), position + offset)
                    })
                    .collect();
                Entry {
                    note: note.to_string(),
                    motors,
                }
            })
            .collect()
    }
}

impl fmt::Display for PoseLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Pose library ({} notes):", self.strikes.len())?;
        for note in self.notes() {
            let joints = self.strikes[note].len();
            match self.offs.get(note) {
                Some(_) => writeln!(f, "  - {} ({} joints, has off pose)", note, joints)?,
                None => writeln!(f, "  - {} ({} joints)", note, joints)?,
            };
        }

        Ok(())
    }
}

fn parse_entries(path: &Path) -> Result<Vec<Entry>, LibraryError> {
    Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
}

fn build_table(entries: Vec<Entry>) -> Result<HashMap<String, Pose>, LibraryError> {
    let mut table: HashMap<String, Pose> = HashMap::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        if entry.note.is_empty() {
            return Err(LibraryError::UnnamedEntry { index });
        }
        if entry.motors.is_empty() {
            return Err(LibraryError::EmptyPose {
                index,
                note: entry.note,
            });
        }
        if let Some(existing) = table.get(&entry.note) {
            if *existing != entry.motors {
                return Err(LibraryError::ConflictingDuplicate { note: entry.note });
            }
            // An exact duplicate is harmless.
            continue;
        }
        table.insert(entry.note, entry.motors);
    }

    Ok(table)
}

#[cfg(test)]
mod test {
    use std::{error::Error, io::Write};

    use super::{Entry, LibraryError, Pose, PoseLibrary};

    pub fn entry(note: &str, joints: &[(&str, f64)]) -> Entry {
        Entry {
            note: note.to_string(),
            motors: pose(joints),
        }
    }

    pub fn pose(joints: &[(&str, f64)]) -> Pose {
        joints
            .iter()
            .map(|(joint, position)| (joint.to_string(), *position))
            .collect()
    }

    #[test]
    fn test_resolve() -> Result<(), Box<dyn Error>> {
        let library = PoseLibrary::new(
            vec![
                entry("A", &[("shoulder_pan", 10.0), ("elbow_flex", -5.0)]),
                entry("B", &[("shoulder_pan", 20.0), ("elbow_flex", -2.5)]),
            ],
            vec![entry("A", &[("shoulder_pan", 10.0), ("elbow_flex", 5.0)])],
        )?;

        assert_eq!(
            library.resolve("A"),
            Some(&pose(&[("shoulder_pan", 10.0), ("elbow_flex", -5.0)]))
        );
        assert_eq!(library.resolve("C"), None);
        assert!(library.resolve_off("A").is_some());
        assert_eq!(library.resolve_off("B"), None);

        // Resolution is stable for an unmodified library.
        assert_eq!(library.resolve("A"), library.resolve("A"));
        assert_eq!(library.notes(), vec!["A", "B"]);
        Ok(())
    }

    #[test]
    fn test_conflicting_duplicates_rejected() {
        let result = PoseLibrary::new(
            vec![
                entry("A", &[("shoulder_pan", 10.0)]),
                entry("A", &[("shoulder_pan", 12.0)]),
            ],
            vec![],
        );
        match result {
            Err(LibraryError::ConflictingDuplicate { note }) => assert_eq!(note, "A"),
            other => panic!(
                "expected ConflictingDuplicate, got {:?}",
                other.map(|_| "library")
            ),
        }
    }

    #[test]
    fn test_identical_duplicates_tolerated() -> Result<(), Box<dyn Error>> {
        let library = PoseLibrary::new(
            vec![
                entry("A", &[("shoulder_pan", 10.0)]),
                entry("A", &[("shoulder_pan", 10.0)]),
            ],
            vec![],
        )?;
        assert_eq!(library.notes(), vec!["A"]);
        Ok(())
    }

    #[test]
    fn test_malformed_entries_rejected() {
        assert!(matches!(
            PoseLibrary::new(vec![entry("", &[("shoulder_pan", 10.0)])], vec![]),
            Err(LibraryError::UnnamedEntry { index: 0 })
        ));
        assert!(matches!(
            PoseLibrary::new(
                vec![entry("A", &[("shoulder_pan", 1.0)]), entry("B", &[])],
                vec![]
            ),
            Err(LibraryError::EmptyPose { index: 1, .. })
        ));
    }

    #[test]
    fn test_load_ignores_capture_bookkeeping() -> Result<(), Box<dyn Error>> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(
            r#"[
              {"i": 1, "note": "A", "timestamp": 1700000000.0, "motors": {"shoulder_pan": 10.0}},
              {"i": 2, "note": "B", "timestamp": 1700000010.0, "motors": {"shoulder_pan": 20.0}}
            ]"#
            .as_bytes(),
        )?;

        let library = PoseLibrary::load(file.path(), None)?;
        assert_eq!(library.notes(), vec!["A", "B"]);
        assert_eq!(library.resolve_off("A"), None);
        Ok(())
    }

    #[test]
    fn test_lift_table() -> Result<(), Box<dyn Error>> {
        let library = PoseLibrary::new(
            vec![entry(
                "A",
                &[("shoulder_lift", 40.0), ("elbow_flex", -20.0), ("gripper", 1.0)],
            )],
            vec![],
        )?;

        let offsets = pose(&[("shoulder_lift", -10.0), ("elbow_flex", 10.0)]);
        let lifted = library.lift_table(&offsets);
        assert_eq!(lifted.len(), 1);
        assert_eq!(lifted[0].note, "A");
        assert_eq!(
            lifted[0].motors,
            pose(&[
                ("shoulder_lift", 30.0),
                ("elbow_flex", -10.0),
                ("gripper", 1.0)
            ])
        );
        Ok(())
    }
}
