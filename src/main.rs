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
mod arm;
mod interrupt;
mod performer;
mod poses;
mod score;
mod timing;
mod util;

use std::error::Error;
use std::fs;
use std::path::PathBuf;

use clap::{crate_version, Parser, Subcommand};
use tracing::info;

use crate::interrupt::CancelHandle;
use crate::performer::{Outcome, Performer};
use crate::poses::{Pose, PoseLibrary};
use crate::score::Score;
use crate::timing::Timing;

#[derive(Clone, clap::ValueEnum)]
enum TorqueState {
    On,
    Off,
}

#[derive(Parser)]
#[clap(
    author = "The malletbot authors",
    version = crate_version!(),
    about = "A robotic arm music performer."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Loads and verifies a score file.
    Score {
        /// The path to the score file.
        path: PathBuf,
    },
    /// Loads and verifies a pose library.
    Poses {
        /// The path to the strike pose file.
        path: PathBuf,
        /// The path to the off pose file.
        #[arg(short, long)]
        off_poses: Option<PathBuf>,
    },
    /// Verifies that every note in a score has a pose in a library, without
    /// touching the arm.
    Check {
        /// The path to the score file.
        score_path: PathBuf,
        /// The path to the strike pose file.
        poses_path: PathBuf,
        /// The path to the off pose file.
        #[arg(short, long)]
        off_poses: Option<PathBuf>,
    },
    /// Derives an off pose file from strike poses and per-joint lift offsets.
    LiftPoses {
        /// The path to the strike pose file.
        poses_path: PathBuf,
        /// The path to a JSON mapping of joint name to lift offset.
        offsets_path: PathBuf,
        /// Where to write the derived off pose file.
        out_path: PathBuf,
    },
    /// Enables or disables joint torque, freeing the arm for manual posing.
    Torque {
        /// Whether torque should hold the arm in place.
        state: TorqueState,
        /// The arm transport address.
        #[arg(short, long, default_value = "127.0.0.1:9030")]
        address: String,
        /// The calibration identity of the arm.
        #[arg(short, long, default_value = "follower")]
        id: String,
    },
    /// Performs a score on the arm.
    Play {
        /// The path to the score file.
        score_path: PathBuf,
        /// The path to the strike pose file.
        poses_path: PathBuf,
        /// The path to the off pose file.
        #[arg(short, long)]
        off_poses: Option<PathBuf>,
        /// The arm transport address.
        #[arg(short, long, default_value = "127.0.0.1:9030")]
        address: String,
        /// The calibration identity of the arm.
        #[arg(short, long, default_value = "follower")]
        id: String,
        /// The path to a timing profile.
        #[arg(short, long)]
        timing: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Score { path } => {
            let score = Score::load(&path)?;
            println!("{}", score);
        }
        Commands::Poses { path, off_poses } => {
            let library = PoseLibrary::load(&path, off_poses.as_deref())?;
            println!("{}", library);
        }
        Commands::Check {
            score_path,
            poses_path,
            off_poses,
        } => {
            let score = Score::load(&score_path)?;
            let library = PoseLibrary::load(&poses_path, off_poses.as_deref())?;

            let mut missing = 0;
            for (index, event) in score.notes.iter().enumerate() {
                if library.resolve(&event.note).is_none() {
                    println!("- event {} ({}): no pose defined", index, event.note);
                    missing += 1;
                } else if library.resolve_off(&event.note).is_none() {
                    println!(
                        "- event {} ({}): no off pose, retreat will be skipped",
                        index, event.note
                    );
                }
            }

            if missing > 0 {
                return Err(format!("{} score events have no pose defined", missing).into());
            }
            println!("All {} events resolve.", score.notes.len());
        }
        Commands::LiftPoses {
            poses_path,
            offsets_path,
            out_path,
        } => {
            let library = PoseLibrary::load(&poses_path, None)?;
            let offsets: Pose = serde_json::from_str(&fs::read_to_string(&offsets_path)?)?;
            let lifted = library.lift_table(&offsets);
            fs::write(&out_path, serde_json::to_string_pretty(&lifted)?)?;
            println!("Wrote {} off poses to {}.", lifted.len(), out_path.display());
        }
        Commands::Torque { state, address, id } => {
            let device = arm::get_device(&address, &id)?;
            let session = arm::Session::open(device)?;

            let enabled = matches!(state, TorqueState::On);
            session.device().set_torque(enabled)?;
            println!(
                "Torque {}.",
                if enabled { "enabled" } else { "disabled" }
            );
        }
        Commands::Play {
            score_path,
            poses_path,
            off_poses,
            address,
            id,
            timing,
        } => {
            // Everything that can fail without the arm fails here, before any
            // connection is attempted.
            let score = Score::load(&score_path)?;
            let library = PoseLibrary::load(&poses_path, off_poses.as_deref())?;
            let timing = match timing {
                Some(path) => Timing::load(&path)?,
                None => Timing::default(),
            };
            let device = arm::get_device(&address, &id)?;
            info!(device = device.name(), "Performing on arm.");

            let performer = Performer::new(device, library, timing);
            let cancel_handle = CancelHandle::new();

            {
                let cancel_handle = cancel_handle.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        info!("Interrupt received; stopping at the next phase boundary.");
                        cancel_handle.cancel();
                    }
                });
            }

            let outcome =
                tokio::task::spawn_blocking(move || performer.perform(&score, cancel_handle))
                    .await??;
            match outcome {
                Outcome::Complete => info!("Performance finished."),
                Outcome::Cancelled => info!("Performance stopped by operator."),
            }
        }
    }

    Ok(())
}
