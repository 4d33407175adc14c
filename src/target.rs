use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

pub type TargetId = u64;

pub const UNKNOWN_MAP: &str = "unknown";

/// One managed game server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub id: TargetId,
    pub name: String,
    pub host: String,
    /// Client-facing game port, used for the reachability probe.
    pub port: u16,
    pub rcon_port: u16,
    pub rcon_password: String,
}

/// What happened on the rcon side of a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RconStatus {
    /// The game port was unreachable so rcon was skipped.
    NotAttempted,
    Authenticated,
    /// The server refused the password. Fix the credential, not the network.
    AuthRejected,
    /// The rcon port could not be connected to.
    Unavailable,
    /// Connected, but the exchange broke down (bad frames, timeouts).
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollResult {
    pub target_id: TargetId,
    pub reachable: bool,
    pub rcon: RconStatus,
    pub players: u32,
    pub max_players: u32,
    pub map_name: String,
    /// Unix seconds.
    pub polled_at: u64,
}

impl PollResult {
    /// Result for a target whose game port did not answer.
    pub fn offline(target_id: TargetId) -> Self {
        Self {
            target_id,
            reachable: false,
            rcon: RconStatus::NotAttempted,
            players: 0,
            max_players: 0,
            map_name: UNKNOWN_MAP.to_owned(),
            polled_at: unix_now(),
        }
    }
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_load_from_json() {
        let json = r#"[{"id": 1, "name": "TTT", "host": "10.0.0.5", "port": 27015,
                        "rcon_port": 27015, "rcon_password": "pw"}]"#;
        let targets: Vec<Target> = serde_json::from_str(json).unwrap();

        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].host, "10.0.0.5");
        assert_eq!(targets[0].rcon_port, 27015);
    }

    #[test]
    fn status_serializes_snake_case() {
        let result = PollResult {
            rcon: RconStatus::AuthRejected,
            ..PollResult::offline(3)
        };
        let value = serde_json::to_value(&result).unwrap();

        assert_eq!(value["rcon"], "auth_rejected");
        assert_eq!(value["map_name"], UNKNOWN_MAP);
        assert_eq!(value["reachable"], false);
    }
}
