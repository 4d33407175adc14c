use std::io;
use std::time::Duration;

use log::{debug, trace};
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt},
    net::TcpStream,
    time,
};

use crate::{
    error::RconError,
    packet::{Packet, PacketType, ProtocolVariant},
};

/// Where a session is in its lifecycle. A `Failed` session is never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Authenticating,
    Ready,
    Failed,
}

/// Timeouts and wire discriminants for one session.
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub connect_timeout: Duration,
    /// Bounds a whole auth or command exchange, not a single read.
    pub io_timeout: Duration,
    pub protocol: ProtocolVariant,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            io_timeout: Duration::from_secs(30),
            protocol: ProtocolVariant::default(),
        }
    }
}

/// Simple asynchronous rcon client owning at most one connection. Create it
/// with `new()`, call `connect()` to open the socket, then `authenticate()`.
/// The client should be `mut` as it keeps a counter used for [Packet] IDs.
///
/// ## Example
/// ```no_run
/// use rconwatch::client::{Client, SessionOptions};
/// use std::error::Error;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn Error>> {
///     let mut client = Client::new(SessionOptions::default());
///     client.connect("127.0.0.1", 27015).await?;
///     client.authenticate("<put rcon password here>").await?;
///     let response = client.command("echo hi").await?;
///
///     assert_eq!(response.body(), "hi");
///     client.close().await;
///     Ok(())
/// }
/// ```
pub struct Client<S = TcpStream> {
    next_packet_id: i32,
    stream: Option<S>,
    state: SessionState,
    options: SessionOptions,
}

/// Container struct for a response that can be glued together from multiple [Packet]s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    body: String,
}

impl Response {
    pub fn body(&self) -> &str {
        self.body.as_ref()
    }

    pub fn into_body(self) -> String {
        self.body
    }
}

impl Client<TcpStream> {
    /// A session with no connection yet.
    pub fn new(options: SessionOptions) -> Self {
        Client {
            next_packet_id: 1,
            stream: None,
            state: SessionState::Disconnected,
            options,
        }
    }

    /// Opens the socket. On failure the session ends up `Failed`.
    pub async fn connect(&mut self, host: &str, port: u16) -> Result<(), RconError> {
        if self.state != SessionState::Disconnected {
            return Err(RconError::NotReady(self.state));
        }

        self.state = SessionState::Connecting;
        debug!("connecting to {}:{}", host, port);

        let connected = match time::timeout(
            self.options.connect_timeout,
            TcpStream::connect((host, port)),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "connect timed out")),
        };

        match connected {
            Ok(stream) => {
                trace!("opened tcp stream to {}:{}", host, port);
                self.stream = Some(stream);
                self.next_packet_id = 1;
                self.state = SessionState::Authenticating;
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Failed;
                Err(RconError::Connect(e))
            }
        }
    }
}

impl<S> Client<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps an already connected stream. The session waits for `authenticate()`.
    pub fn from_stream(stream: S, options: SessionOptions) -> Self {
        Client {
            next_packet_id: 1,
            stream: Some(stream),
            state: SessionState::Authenticating,
            options,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub async fn authenticate(&mut self, password: &str) -> Result<(), RconError> {
        if self.state != SessionState::Authenticating {
            return Err(RconError::NotReady(self.state));
        }

        let result = match time::timeout(self.options.io_timeout, self.auth_exchange(password)).await {
            Ok(result) => result,
            Err(elapsed) => Err(elapsed.into()),
        };

        self.state = match result {
            Ok(()) => SessionState::Ready,
            Err(_) => SessionState::Failed,
        };
        debug!("auth finished, session is {:?}", self.state);
        result
    }

    /// Run a rcon command asynchronously. In case of a response being split
    /// between multiple packets, they will be joined together afterwards.
    pub async fn command(&mut self, command: &str) -> Result<Response, RconError> {
        if self.state != SessionState::Ready {
            return Err(RconError::NotReady(self.state));
        }

        let result = match time::timeout(self.options.io_timeout, self.command_exchange(command)).await {
            Ok(result) => result,
            Err(elapsed) => Err(elapsed.into()),
        };

        if result.is_err() {
            self.state = SessionState::Failed;
        }
        result
    }

    /// Shuts the socket down, if there is one. Errors are irrelevant at this point.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
            trace!("session closed");
        }
        self.state = SessionState::Disconnected;
    }

    fn create_packet(&mut self, packet_type: PacketType, body: &str) -> Packet {
        let id = self.next_packet_id;
        // -1 is how the server signals a failed auth, so never hand it out
        self.next_packet_id = match self.next_packet_id.checked_add(1) {
            Some(next) => next,
            None => 1,
        };

        Packet::new(id, packet_type, body)
    }

    fn stream_mut(&mut self) -> Result<&mut S, RconError> {
        match self.stream.as_mut() {
            Some(stream) => Ok(stream),
            None => Err(RconError::NotReady(SessionState::Disconnected)),
        }
    }

    async fn auth_exchange(&mut self, password: &str) -> Result<(), RconError> {
        let protocol = self.options.protocol;
        let auth_packet = self.create_packet(protocol.auth, password);
        let stream = self.stream_mut()?;

        trace!("sending auth packet to server");
        auth_packet.write_to(stream).await?;
        stream.flush().await.map_err(RconError::SendError)?;

        loop {
            let response = Packet::read_from(stream).await?;
            trace!("receive response for packet id {}", response.id());
            if response.id() == -1 {
                return Err(RconError::AuthRejected);
            }

            // srcds sends an empty RESPONSE_VALUE ahead of the real answer
            if protocol.auth_preamble && response.packet_type() == PacketType::RESPONSE {
                continue;
            }

            if response.id() == auth_packet.id() {
                return Ok(());
            }
        }
    }

    async fn command_exchange(&mut self, command: &str) -> Result<Response, RconError> {
        let exec = self.options.protocol.exec;
        let command_packet = self.create_packet(exec, command);
        // since srcds can split up the response but it won't tell us how many
        // packets to expect, we send a second packet immediately afterwards
        // with a blank command so that we can get a confirmation that there are
        // no more packets in response to our command.
        let tracking_packet = self.create_packet(exec, "");
        let stream = self.stream_mut()?;

        trace!("sending main packet to server");
        command_packet.write_to(stream).await?;
        trace!("sending tracking (blank) packet to server");
        tracking_packet.write_to(stream).await?;
        stream.flush().await.map_err(RconError::SendError)?;

        let mut body = String::new();

        loop {
            let response = Packet::read_from(stream).await?;
            trace!("receive response for packet id {}", response.id());
            if response.id() == tracking_packet.id() {
                trace!("that was the tracking packet, completing response");
                break;
            } else if response.id() == command_packet.id() {
                body.push_str(response.body());
            } else {
                trace!("ignoring packet id {} not part of this exchange", response.id());
            }
        }

        Ok(Response { body })
    }
}

/// Opens a fresh session, runs one command and closes the socket again.
pub async fn execute(
    host: &str,
    port: u16,
    password: &str,
    command: &str,
    options: SessionOptions,
) -> Result<String, RconError> {
    let mut client = Client::new(options);
    client.connect(host, port).await?;

    let result = match client.authenticate(password).await {
        Ok(()) => client.command(command).await,
        Err(e) => Err(e),
    };

    client.close().await;
    result.map(Response::into_body)
}
