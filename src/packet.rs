use std::fmt;

use log::trace;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::RconError;

/// Type discriminant carried in every frame.
///
/// Values are plain integers on the wire and some of them overlap
/// (`EXEC` and `AUTH_RESPONSE` are both 2), so this is a newtype rather
/// than an enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PacketType(pub i32);

impl PacketType {
    // SERVERDATA_AUTH
    pub const AUTH: PacketType = PacketType(3);
    // SERVERDATA_EXECCOMMAND
    pub const EXEC: PacketType = PacketType(2);
    // SERVERDATA_AUTH_RESPONSE
    pub const AUTH_RESPONSE: PacketType = PacketType(2);
    // SERVERDATA_RESPONSE_VALUE
    pub const RESPONSE: PacketType = PacketType(0);

    pub fn to_le_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The discriminants a particular server family expects for the auth and
/// command frames. Source servers want 3 and 2; some derivatives accept 2
/// for both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolVariant {
    pub auth: PacketType,
    pub exec: PacketType,
    /// The server sends an empty RESPONSE_VALUE before the auth response.
    /// When unset, the first frame echoing the auth id completes auth,
    /// whatever its type.
    pub auth_preamble: bool,
}

impl Default for ProtocolVariant {
    fn default() -> Self {
        Self {
            auth: PacketType::AUTH,
            exec: PacketType::EXEC,
            auth_preamble: true,
        }
    }
}

/// One frame of the rcon wire protocol:
/// `i32 length | i32 id | i32 type | body | 0x00 0x00`, all little-endian.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    id: i32,
    packet_type: PacketType,
    body: String,
}

impl Packet {
    /// id + type + the two trailing nulls.
    pub const BASE_PACKET_SIZE: i32 = 10;
    /// Upper bound on a declared frame length. Anything above is treated as
    /// garbage instead of allocated.
    pub const MAX_FRAME_LEN: i32 = 64 * 1024;

    pub fn new(id: i32, packet_type: PacketType, body: impl Into<String>) -> Self {
        Packet {
            id,
            packet_type,
            body: body.into(),
        }
    }

    // Since the only one of these values that can change in length is the body,
    // an easy way to calculate the size of a packet is to find the byte-length
    // of the packet body, then add 10 to it.
    pub fn size(&self) -> i32 {
        i32::try_from(self.body.len())
            .ok()
            .and_then(|len| len.checked_add(Self::BASE_PACKET_SIZE))
            .unwrap_or(i32::MAX)
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    pub fn body(&self) -> &str {
        self.body.as_ref()
    }

    pub fn into_body(self) -> String {
        self.body
    }

    pub fn pack(&self) -> Vec<u8> {
        // Size, ID, Type, Body, Terminator
        let mut payload = Vec::<u8>::with_capacity(self.size() as usize + 4);
        payload.extend_from_slice(&self.size().to_le_bytes());
        payload.extend_from_slice(&self.id.to_le_bytes());
        payload.extend_from_slice(&self.packet_type.to_le_bytes());
        payload.extend_from_slice(self.body.as_bytes());
        // null terminate the body, then null terminate the entire packet
        payload.extend_from_slice(&[0u8, 0u8]);
        payload
    }

    /// Decodes everything that follows the length prefix. The body is
    /// decoded lossily so a bad byte sequence never fails the frame.
    pub fn unpack(frame: &[u8]) -> Result<Self, RconError> {
        if frame.len() < Self::BASE_PACKET_SIZE as usize {
            return Err(RconError::MalformedFrame {
                length: frame.len() as i32,
            });
        }

        let id = le_i32(&frame[0..4]);
        let packet_type = PacketType(le_i32(&frame[4..8]));
        let body = String::from_utf8_lossy(&frame[8..frame.len() - 2]).into_owned();

        Ok(Packet {
            id,
            packet_type,
            body,
        })
    }

    /// Reads exactly one frame, across as many socket reads as it takes.
    pub async fn read_from<R>(reader: &mut R) -> Result<Self, RconError>
    where
        R: AsyncRead + Unpin,
    {
        let mut prefix = [0u8; 4];
        read_full(reader, &mut prefix).await?;

        let length = i32::from_le_bytes(prefix);
        if !(Self::BASE_PACKET_SIZE..=Self::MAX_FRAME_LEN).contains(&length) {
            return Err(RconError::MalformedFrame { length });
        }

        let mut frame = vec![0u8; length as usize];
        read_full(reader, &mut frame).await?;

        let packet = Self::unpack(&frame)?;
        trace!(
            "read frame id {} type {} ({} bytes)",
            packet.id,
            packet.packet_type,
            length
        );
        Ok(packet)
    }

    /// Refuses frames a peer would have to reject as oversized.
    pub async fn write_to<W>(&self, writer: &mut W) -> Result<(), RconError>
    where
        W: AsyncWrite + Unpin,
    {
        let length = self.size();
        if length > Self::MAX_FRAME_LEN {
            return Err(RconError::MalformedFrame { length });
        }

        writer
            .write_all(&self.pack())
            .await
            .map_err(RconError::SendError)
    }
}

fn le_i32(bytes: &[u8]) -> i32 {
    i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> Result<(), RconError>
where
    R: AsyncRead + Unpin,
{
    let mut received = 0;
    while received < buf.len() {
        let n = reader
            .read(&mut buf[received..])
            .await
            .map_err(RconError::ReceiveError)?;
        if n == 0 {
            return Err(RconError::TruncatedFrame {
                expected: buf.len(),
                received,
            });
        }
        received += n;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[test]
    fn pack_layout() {
        let packet = Packet::new(7, PacketType::EXEC, "status");
        let bytes = packet.pack();

        assert_eq!(&bytes[0..4], &16i32.to_le_bytes());
        assert_eq!(&bytes[4..8], &7i32.to_le_bytes());
        assert_eq!(&bytes[8..12], &2i32.to_le_bytes());
        assert_eq!(&bytes[12..18], b"status");
        assert_eq!(&bytes[18..], &[0, 0]);
        assert_eq!(bytes.len() as i32, packet.size() + 4);
    }

    #[tokio::test]
    async fn round_trip() {
        for packet in [
            Packet::new(1, PacketType::AUTH, "hunter2"),
            Packet::new(-1, PacketType::AUTH_RESPONSE, ""),
            Packet::new(42, PacketType::RESPONSE, "map: ttt_minecraft_b5 ünïcödé"),
        ] {
            let bytes = packet.pack();
            let decoded = Packet::read_from(&mut bytes.as_slice()).await.unwrap();
            assert_eq!(decoded, packet);
        }
    }

    #[tokio::test]
    async fn reads_frame_split_across_reads() {
        let bytes = Packet::new(3, PacketType::RESPONSE, "hello world").pack();
        let mut mock = Builder::new()
            .read(&bytes[..2])
            .read(&bytes[2..9])
            .read(&bytes[9..])
            .build();

        let packet = Packet::read_from(&mut mock).await.unwrap();
        assert_eq!(packet.id(), 3);
        assert_eq!(packet.body(), "hello world");
    }

    #[tokio::test]
    async fn short_stream_is_truncated() {
        let bytes = Packet::new(3, PacketType::RESPONSE, "hello world").pack();
        let mut mock = Builder::new().read(&bytes[..12]).build();

        match Packet::read_from(&mut mock).await {
            Err(RconError::TruncatedFrame { expected, received }) => {
                assert_eq!(expected, 21);
                assert_eq!(received, 8);
            }
            other => panic!("expected truncated frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn closed_before_prefix_is_truncated() {
        let mut empty: &[u8] = &[];
        assert!(matches!(
            Packet::read_from(&mut empty).await,
            Err(RconError::TruncatedFrame { expected: 4, received: 0 })
        ));
    }

    #[tokio::test]
    async fn rejects_out_of_bounds_lengths() {
        for length in [-5i32, 0, 9, Packet::MAX_FRAME_LEN + 1] {
            let bytes = length.to_le_bytes();
            let result = Packet::read_from(&mut bytes.as_slice()).await;
            assert!(
                matches!(result, Err(RconError::MalformedFrame { length: l }) if l == length),
                "length {length} accepted"
            );
        }
    }

    #[tokio::test]
    async fn oversized_frame_is_not_written() {
        let fits = Packet::new(1, PacketType::EXEC, "a".repeat(Packet::MAX_FRAME_LEN as usize - 10));
        let mut out = Vec::new();
        fits.write_to(&mut out).await.unwrap();
        assert_eq!(out.len(), Packet::MAX_FRAME_LEN as usize + 4);

        let too_big = Packet::new(1, PacketType::EXEC, "a".repeat(Packet::MAX_FRAME_LEN as usize));
        let mut out = Vec::new();
        assert!(matches!(
            too_big.write_to(&mut out).await,
            Err(RconError::MalformedFrame { length }) if length == Packet::MAX_FRAME_LEN + 10
        ));
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn invalid_utf8_is_replaced() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&13i32.to_le_bytes());
        bytes.extend_from_slice(&5i32.to_le_bytes());
        bytes.extend_from_slice(&0i32.to_le_bytes());
        bytes.extend_from_slice(&[b'o', 0xff, b'k', 0, 0]);

        let packet = Packet::read_from(&mut bytes.as_slice()).await.unwrap();
        assert_eq!(packet.body(), "o\u{fffd}k");
    }
}
