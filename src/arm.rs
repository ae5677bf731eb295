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
use std::{error::Error, fmt, sync::Arc, time::Duration};

use crate::poses::Pose;

mod bridge;
mod mock;

/// Errors from the arm transport layer. All of these are fatal to a
/// performance run; a failed physical command is never retried against an arm
/// in an unknown state.
#[derive(Debug, thiserror::Error)]
pub enum ArmError {
    #[error("error connecting to arm: {0}")]
    Connect(String),
    #[error("error commanding arm: {0}")]
    Command(String),
    #[error("error reading arm pose: {0}")]
    Read(String),
}

/// An arm that can be driven through joint-target poses.
pub trait Device: fmt::Display + Send + Sync {
    /// Returns the name of the device.
    fn name(&self) -> String;

    /// Connects to the arm and applies the persisted calibration for the
    /// configured identity.
    fn connect(&self) -> Result<(), ArmError>;

    /// Starts a motion toward the given pose over the given transit time.
    /// Returns once the command is acknowledged; it does not wait for the
    /// motion to finish.
    fn command(&self, pose: &Pose, transit: Duration) -> Result<(), ArmError>;

    /// Reads the current joint positions.
    fn read_pose(&self) -> Result<Pose, ArmError>;

    /// Enables or disables joint torque.
    fn set_torque(&self, enabled: bool) -> Result<(), ArmError>;

    /// Disconnects from the arm. Idempotent, best-effort.
    fn disconnect(&self);
}

/// Gets a device for the given transport address and calibration identity.
pub fn get_device(address: &str, id: &str) -> Result<Arc<dyn Device>, Box<dyn Error>> {
    if address.starts_with("mock") {
        return Ok(Arc::new(mock::Device::get(address)));
    };

    Ok(Arc::new(bridge::Device::new(address, id)))
}

/// Holds the exclusively-owned arm connection for one performance run.
/// Dropping the session releases the connection, so every exit path out of a
/// run disconnects, success or failure.
pub struct Session {
    device: Arc<dyn Device>,
}

impl Session {
    /// Connects to the arm and hands back the session guard.
    pub fn open(device: Arc<dyn Device>) -> Result<Session, ArmError> {
        device.connect()?;
        Ok(Session { device })
    }

    /// The connected device.
    pub fn device(&self) -> &dyn Device {
        self.device.as_ref()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.device.disconnect();
    }
}

#[cfg(test)]
pub mod test {
    pub use super::mock::{Command, Device};
}
