//! Plain TCP reachability check, independent of rcon.

use std::time::Duration;

use log::trace;
use tokio::{net::TcpStream, time};

/// Connects to `host:port` and closes again without sending anything.
/// Refused connections, resolution failures and timeouts all count as
/// unreachable.
pub async fn is_reachable(host: &str, port: u16, timeout: Duration) -> bool {
    match time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => {
            drop(stream);
            true
        }
        Ok(Err(e)) => {
            trace!("probe {}:{} failed: {}", host, port, e);
            false
        }
        Err(_) => {
            trace!("probe {}:{} timed out", host, port);
            false
        }
    }
}
