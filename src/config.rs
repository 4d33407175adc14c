use std::{env, path::PathBuf, str::FromStr, time::Duration};

use crate::{
    client::SessionOptions,
    packet::{PacketType, ProtocolVariant},
};

#[derive(Debug, Clone)]
pub struct Config {
    pub targets_file: PathBuf,

    // Scheduling
    pub poll_interval_secs: u64,
    pub max_concurrent_polls: usize,

    // Timeouts
    pub probe_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub command_timeout_secs: u64,

    /// Extra sessions opened after a malformed or truncated frame.
    pub frame_retries: u32,

    // Protocol
    pub auth_type: i32,
    pub exec_type: i32,
    pub auth_preamble: bool,
    pub status_command: String,
    pub map_command: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            targets_file: PathBuf::from("targets.json"),
            poll_interval_secs: 30,
            max_concurrent_polls: 3,
            probe_timeout_secs: 5,
            connect_timeout_secs: 10,
            command_timeout_secs: 30,
            frame_retries: 1,
            auth_type: PacketType::AUTH.0,
            exec_type: PacketType::EXEC.0,
            auth_preamble: true,
            status_command: "status".to_owned(),
            map_command: "changelevel".to_owned(),
        }
    }
}

impl Config {
    /// Defaults overridden by `RCONWATCH_*` variables. Values that do not
    /// parse are ignored.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            targets_file: env_or("RCONWATCH_TARGETS", defaults.targets_file),
            poll_interval_secs: env_or("RCONWATCH_POLL_INTERVAL_SECS", defaults.poll_interval_secs),
            max_concurrent_polls: env_or(
                "RCONWATCH_MAX_CONCURRENT_POLLS",
                defaults.max_concurrent_polls,
            ),
            probe_timeout_secs: env_or("RCONWATCH_PROBE_TIMEOUT_SECS", defaults.probe_timeout_secs),
            connect_timeout_secs: env_or(
                "RCONWATCH_CONNECT_TIMEOUT_SECS",
                defaults.connect_timeout_secs,
            ),
            command_timeout_secs: env_or(
                "RCONWATCH_COMMAND_TIMEOUT_SECS",
                defaults.command_timeout_secs,
            ),
            frame_retries: env_or("RCONWATCH_FRAME_RETRIES", defaults.frame_retries),
            auth_type: env_or("RCONWATCH_AUTH_TYPE", defaults.auth_type),
            exec_type: env_or("RCONWATCH_EXEC_TYPE", defaults.exec_type),
            auth_preamble: env_or("RCONWATCH_AUTH_PREAMBLE", defaults.auth_preamble),
            status_command: env_or("RCONWATCH_STATUS_COMMAND", defaults.status_command),
            map_command: env_or("RCONWATCH_MAP_COMMAND", defaults.map_command),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        // a zero period would make tokio's interval panic
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            io_timeout: Duration::from_secs(self.command_timeout_secs),
            protocol: ProtocolVariant {
                auth: PacketType(self.auth_type),
                exec: PacketType(self.exec_type),
                auth_preamble: self.auth_preamble,
            },
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
