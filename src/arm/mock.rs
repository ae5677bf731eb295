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
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use super::ArmError;
use crate::poses::Pose;

/// A command the mock arm received: the pose and its requested transit time.
#[derive(Clone, Debug, PartialEq)]
pub struct Command {
    pub pose: Pose,
    pub transit: Duration,
}

/// A mock arm. Doesn't move anything; records what it was asked to do.
#[derive(Clone)]
pub struct Device {
    name: String,
    commands: Arc<Mutex<Vec<Command>>>,
    current_pose: Arc<Mutex<Pose>>,
    torque: Arc<Mutex<Option<bool>>>,
    connects: Arc<AtomicUsize>,
    disconnects: Arc<AtomicUsize>,
    fail_connect: Arc<AtomicBool>,
    fail_command_at: Arc<Mutex<Option<usize>>>,
}

impl Device {
    /// Gets the given mock device.
    pub fn get(name: &str) -> Device {
        Device {
            name: name.to_string(),
            commands: Arc::new(Mutex::new(Vec::new())),
            current_pose: Arc::new(Mutex::new(Pose::new())),
            torque: Arc::new(Mutex::new(None)),
            connects: Arc::new(AtomicUsize::new(0)),
            disconnects: Arc::new(AtomicUsize::new(0)),
            fail_connect: Arc::new(AtomicBool::new(false)),
            fail_command_at: Arc::new(Mutex::new(None)),
        }
    }

    #[cfg(test)]
    /// The commands received so far, in order.
    pub fn commands(&self) -> Vec<Command> {
        self.commands
            .lock()
            .expect("unable to get commands lock")
            .clone()
    }

    #[cfg(test)]
    /// How many times connect was called.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    /// How many times disconnect was called.
    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    /// The last torque state set, if any.
    pub fn torque(&self) -> Option<bool> {
        *self.torque.lock().expect("unable to get torque lock")
    }

    #[cfg(test)]
    /// Sets the pose reported by read_pose.
    pub fn set_current_pose(&self, pose: Pose) {
        *self
            .current_pose
            .lock()
            .expect("unable to get current pose lock") = pose;
    }

    #[cfg(test)]
    /// Makes connect fail.
    pub fn fail_connect(&self) {
        self.fail_connect.store(true, Ordering::Relaxed);
    }

    #[cfg(test)]
    /// Makes the nth command (zero-based) fail.
    pub fn fail_command_at(&self, index: usize) {
        *self
            .fail_command_at
            .lock()
            .expect("unable to get failure lock") = Some(index);
    }
}

impl super::Device for Device {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn connect(&self) -> Result<(), ArmError> {
        if self.fail_connect.load(Ordering::Relaxed) {
            return Err(ArmError::Connect("mock connect failure".to_string()));
        }
        self.connects.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn command(&self, pose: &Pose, transit: Duration) -> Result<(), ArmError> {
        let mut commands = self.commands.lock().expect("unable to get commands lock");

        let fail_at = *self
            .fail_command_at
            .lock()
            .expect("unable to get failure lock");
        if fail_at == Some(commands.len()) {
            return Err(ArmError::Command("mock command failure".to_string()));
        }

        commands.push(Command {
            pose: pose.clone(),
            transit,
        });
        *self
            .current_pose
            .lock()
            .expect("unable to get current pose lock") = pose.clone();
        Ok(())
    }

    fn read_pose(&self) -> Result<Pose, ArmError> {
        Ok(self
            .current_pose
            .lock()
            .expect("unable to get current pose lock")
            .clone())
    }

    fn set_torque(&self, enabled: bool) -> Result<(), ArmError> {
        *self.torque.lock().expect("unable to get torque lock") = Some(enabled);
        Ok(())
    }

    fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::Relaxed);
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}
