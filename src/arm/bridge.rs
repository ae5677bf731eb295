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
    io::{BufRead, BufReader, Write},
    net::TcpStream,
    sync::Mutex,
};

use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use super::ArmError;
use crate::poses::Pose;

/// A driver for an arm transport daemon reachable over TCP. Each request is a
/// newline-delimited JSON object answered by a single response line. The
/// daemon owns the serial bus and the persisted calibrations; this driver
/// selects a calibration by identity at connect time.
pub struct Device {
    address: String,
    id: String,
    conn: Mutex<Option<Conn>>,
}

struct Conn {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

#[derive(Deserialize)]
struct Response {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    joints: Option<Pose>,
}

impl Device {
    /// Creates a driver for the daemon at the given address. No connection is
    /// made until connect is called.
    pub fn new(address: &str, id: &str) -> Device {
        Device {
            address: address.to_string(),
            id: id.to_string(),
            conn: Mutex::new(None),
        }
    }

    /// Sends one request line and reads one response line. Returns the error
    /// string reported by the daemon, or the transport failure, as a plain
    /// message for the caller to classify.
    fn request(&self, body: serde_json::Value) -> Result<Response, String> {
        let mut conn = self.conn.lock().expect("unable to get connection lock");
        let conn = conn.as_mut().ok_or_else(|| "not connected".to_string())?;

        let mut line = body.to_string();
        line.push('\n');
        conn.writer
            .write_all(line.as_bytes())
            .map_err(|e| e.to_string())?;

        let mut response = String::new();
        conn.reader
            .read_line(&mut response)
            .map_err(|e| e.to_string())?;
        if response.is_empty() {
            return Err("bridge closed the connection".to_string());
        }

        let response: Response = serde_json::from_str(&response).map_err(|e| e.to_string())?;
        if !response.ok {
            return Err(response
                .error
                .unwrap_or_else(|| "unspecified bridge error".to_string()));
        }

        Ok(response)
    }
}

impl super::Device for Device {
    fn name(&self) -> String {
        self.address.clone()
    }

    fn connect(&self) -> Result<(), ArmError> {
        {
            let mut conn = self.conn.lock().expect("unable to get connection lock");
            if conn.is_some() {
                return Ok(());
            }

            let stream = TcpStream::connect(&self.address)
                .map_err(|e| ArmError::Connect(e.to_string()))?;
            let writer = stream
                .try_clone()
                .map_err(|e| ArmError::Connect(e.to_string()))?;
            *conn = Some(Conn {
                reader: BufReader::new(stream),
                writer,
            });
        }

        // The handshake selects the persisted calibration for our identity.
        // A refused handshake leaves the driver disconnected.
        if let Err(e) = self.request(json!({"op": "connect", "id": self.id})) {
            self.conn
                .lock()
                .expect("unable to get connection lock")
                .take();
            return Err(ArmError::Connect(e));
        }

        info!(address = self.address, id = self.id, "Connected to arm bridge.");
        Ok(())
    }

    fn command(&self, pose: &Pose, transit: std::time::Duration) -> Result<(), ArmError> {
        self.request(json!({
            "op": "move",
            "joints": pose,
            "seconds": transit.as_secs_f64(),
        }))
        .map_err(ArmError::Command)?;
        Ok(())
    }

    fn read_pose(&self) -> Result<Pose, ArmError> {
        let response = self
            .request(json!({"op": "observe"}))
            .map_err(ArmError::Read)?;
        response
            .joints
            .ok_or_else(|| ArmError::Read("bridge returned no joints".to_string()))
    }

    fn set_torque(&self, enabled: bool) -> Result<(), ArmError> {
        self.request(json!({"op": "torque", "enabled": enabled}))
            .map_err(ArmError::Command)?;
        Ok(())
    }

    fn disconnect(&self) {
        let had_conn = {
            let conn = self.conn.lock().expect("unable to get connection lock");
            conn.is_some()
        };
        if !had_conn {
            return;
        }

        if let Err(e) = self.request(json!({"op": "disconnect"})) {
            warn!(err = e, "Error disconnecting from arm bridge.");
        }
        self.conn
            .lock()
            .expect("unable to get connection lock")
            .take();
        info!(address = self.address, "Disconnected from arm bridge.");
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Bridge)", self.address)
    }
}

#[cfg(test)]
mod test {
    use std::{
        error::Error,
        io::{BufRead, BufReader, Write},
        net::TcpListener,
        thread,
        time::Duration,
    };

    use serde_json::{json, Value};

    use crate::arm::Device as _;
    use crate::poses::Pose;

    use super::Device;

    /// Runs a single-connection fake daemon that answers every request and
    /// returns the requests it saw.
    fn fake_daemon(listener: TcpListener) -> thread::JoinHandle<Vec<Value>> {
        thread::spawn(move || {
            let (stream, _) = listener.accept().expect("error accepting connection");
            let mut writer = stream.try_clone().expect("error cloning stream");
            let reader = BufReader::new(stream);

            let mut requests = Vec::new();
            for line in reader.lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(_) => break,
                };
                let request: Value = serde_json::from_str(&line).expect("malformed request");
                let op = request["op"].as_str().expect("request without op").to_string();
                requests.push(request);

                let response = match op.as_str() {
                    "observe" => json!({"ok": true, "joints": {"shoulder_pan": 12.5}}),
                    "torque" => json!({"ok": false, "error": "torque bus fault"}),
                    _ => json!({"ok": true}),
                };
                let mut line = response.to_string();
                line.push('\n');
                writer
                    .write_all(line.as_bytes())
                    .expect("error writing response");

                if op == "disconnect" {
                    break;
                }
            }
            requests
        })
    }

    #[test]
    fn test_bridge_round_trip() -> Result<(), Box<dyn Error>> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let address = listener.local_addr()?.to_string();
        let daemon = fake_daemon(listener);

        let device = Device::new(&address, "follower-1");
        device.connect()?;

        let mut pose = Pose::new();
        pose.insert("shoulder_pan".to_string(), 10.0);
        device.command(&pose, Duration::from_millis(200))?;

        let observed = device.read_pose()?;
        assert_eq!(observed.get("shoulder_pan"), Some(&12.5));

        // The fake daemon faults on torque requests.
        assert!(device.set_torque(true).is_err());

        device.disconnect();
        // A second disconnect is a no-op.
        device.disconnect();

        let requests = daemon.join().expect("error joining daemon thread");
        let ops: Vec<&str> = requests
            .iter()
            .map(|request| request["op"].as_str().unwrap_or_default())
            .collect();
        assert_eq!(ops, vec!["connect", "move", "observe", "torque", "disconnect"]);

        assert_eq!(requests[0]["id"], "follower-1");
        assert_eq!(requests[1]["seconds"], 0.2);
        assert_eq!(requests[1]["joints"]["shoulder_pan"], 10.0);
        Ok(())
    }

    #[test]
    fn test_bridge_requires_connection() {
        let device = Device::new("127.0.0.1:1", "follower-1");
        let mut pose = Pose::new();
        pose.insert("shoulder_pan".to_string(), 10.0);
        assert!(device.command(&pose, Duration::from_millis(100)).is_err());
    }
}
