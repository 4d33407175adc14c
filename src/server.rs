//! Minimal rcon responder. Good enough to develop and test against without a
//! real game server: it checks the password, answers every command through a
//! handler and splits long answers over several packets the way srcds does.

use std::{net::SocketAddr, sync::Arc};

use log::{debug, error, info};
use tokio::{
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};

use crate::{
    error::RconError,
    packet::{Packet, PacketType},
};

/// Longest body put into one response packet.
pub const MAX_RESPONSE_BODY: usize = 4096 - Packet::BASE_PACKET_SIZE as usize;

/// A running responder. Dropping it stops accepting connections.
pub struct Server {
    local_addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl Server {
    pub async fn start<F>(addr: &str, password: &str, handler: F) -> Result<Self, RconError>
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(RconError::BindError)?;
        let local_addr = listener.local_addr().map_err(RconError::BindError)?;

        let password: Arc<str> = Arc::from(password);
        let handler = Arc::new(handler);

        let handle: JoinHandle<()> = tokio::spawn(async move {
            info!("rcon responder running on {}", local_addr);
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        let password = Arc::clone(&password);
                        let handler = Arc::clone(&handler);
                        tokio::spawn(async move {
                            if let Err(e) = Server::process(stream, &password, handler.as_ref()).await {
                                debug!("connection from {} ended: {}", peer, e);
                            }
                        });
                    }
                    Err(e) => error!("{:?}", e),
                }
            }
        });

        Ok(Server { local_addr, handle })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    async fn process<F>(mut stream: TcpStream, password: &str, handler: &F) -> Result<(), RconError>
    where
        F: Fn(&str) -> String,
    {
        let mut authenticated = false;

        loop {
            let packet = match Packet::read_from(&mut stream).await {
                Ok(packet) => packet,
                // hung up between packets
                Err(RconError::TruncatedFrame { received: 0, expected: 4 }) => return Ok(()),
                Err(e) => return Err(e),
            };

            if !authenticated || packet.packet_type() == PacketType::AUTH {
                authenticated = packet.body() == password;
                let id = if authenticated { packet.id() } else { -1 };
                Packet::new(packet.id(), PacketType::RESPONSE, "")
                    .write_to(&mut stream)
                    .await?;
                Packet::new(id, PacketType::AUTH_RESPONSE, "")
                    .write_to(&mut stream)
                    .await?;
                continue;
            }

            let body = if packet.body().is_empty() {
                String::new()
            } else {
                handler(packet.body())
            };

            for chunk in split_body(&body, MAX_RESPONSE_BODY) {
                Packet::new(packet.id(), PacketType::RESPONSE, chunk)
                    .write_to(&mut stream)
                    .await?;
            }
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Splits on char boundaries; always yields at least one (possibly empty) piece.
fn split_body(body: &str, max: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut rest = body;
    while rest.len() > max {
        let mut cut = max;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        let (head, tail) = rest.split_at(cut);
        pieces.push(head);
        rest = tail;
    }
    pieces.push(rest);
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_respects_char_boundaries() {
        let body = "ä".repeat(5);
        let pieces = split_body(&body, 3);

        assert_eq!(pieces.concat(), body);
        assert!(pieces.iter().all(|p| p.len() <= 3));
        assert_eq!(split_body("", 3), vec![""]);
    }
}
