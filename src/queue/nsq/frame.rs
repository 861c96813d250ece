//! nsqd TCP protocol framing.
//!
//! Every frame from nsqd is `size: u32 BE | frame_type: u32 BE | data`, where
//! `size` counts the type field and the data. A message frame carries
//! `timestamp: i64 BE | attempts: u16 BE | id: [u8; 16] | body`.
//! Commands are newline-terminated text lines, optionally followed by a
//! length-prefixed body.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::config::NSQ_MAX_FRAME_SIZE;
use crate::error_handling::QueueError;
use crate::queue::{Delivery, MessageId};

/// Protocol magic sent right after connecting.
pub const MAGIC_V2: &[u8] = b"  V2";

/// Frame type of a reply to a command or a heartbeat
pub const FRAME_TYPE_RESPONSE: u32 = 0;
/// Frame type of an error reply
pub const FRAME_TYPE_ERROR: u32 = 1;
/// Frame type of a delivered message
pub const FRAME_TYPE_MESSAGE: u32 = 2;

/// Reply to IDENTIFY and SUB
pub const RESPONSE_OK: &[u8] = b"OK";
/// Heartbeat; the client must answer with NOP
pub const HEARTBEAT: &[u8] = b"_heartbeat_";
/// Reply to CLS
pub const CLOSE_WAIT: &[u8] = b"CLOSE_WAIT";

const MESSAGE_HEADER_LEN: usize = 8 + 2 + 16;

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Response payload
    Response(Vec<u8>),
    /// Error code and text
    Error(Vec<u8>),
    /// A delivered message
    Message(Delivery),
}

/// Reads one frame.
///
/// # Errors
///
/// Returns `QueueError::Closed` if the connection ends between frames,
/// `QueueError::Io` if it ends mid-frame and `QueueError::Protocol` for an
/// out-of-range size or unknown frame type.
pub async fn read_frame<R>(reader: &mut R) -> Result<Frame, QueueError>
where
    R: AsyncRead + Unpin,
{
    let size = match reader.read_u32().await {
        Ok(size) => size as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Err(QueueError::Closed),
        Err(e) => return Err(e.into()),
    };
    if !(4..=NSQ_MAX_FRAME_SIZE).contains(&size) {
        return Err(QueueError::Protocol(format!("frame size {size} out of range")));
    }
    let frame_type = reader.read_u32().await?;
    let mut data = vec![0u8; size - 4];
    reader.read_exact(&mut data).await?;
    parse_frame(frame_type, data)
}

/// Interprets the payload of a frame of the given type.
pub fn parse_frame(frame_type: u32, data: Vec<u8>) -> Result<Frame, QueueError> {
    match frame_type {
        FRAME_TYPE_RESPONSE => Ok(Frame::Response(data)),
        FRAME_TYPE_ERROR => Ok(Frame::Error(data)),
        FRAME_TYPE_MESSAGE => decode_message(&data).map(Frame::Message),
        other => Err(QueueError::Protocol(format!("unknown frame type {other}"))),
    }
}

fn decode_message(data: &[u8]) -> Result<Delivery, QueueError> {
    if data.len() < MESSAGE_HEADER_LEN {
        return Err(QueueError::Protocol(format!(
            "message frame of {} bytes is shorter than its header",
            data.len()
        )));
    }
    let mut timestamp = [0u8; 8];
    timestamp.copy_from_slice(&data[0..8]);
    let mut attempts = [0u8; 2];
    attempts.copy_from_slice(&data[8..10]);
    let mut id = [0u8; 16];
    id.copy_from_slice(&data[10..26]);

    Ok(Delivery {
        id: MessageId::new(id),
        attempts: u16::from_be_bytes(attempts),
        timestamp_ns: i64::from_be_bytes(timestamp),
        body: data[MESSAGE_HEADER_LEN..].to_vec(),
    })
}

/// Builds a complete frame as nsqd would send it.
pub fn encode_frame(frame_type: u32, data: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(8 + data.len());
    frame.extend_from_slice(&((data.len() + 4) as u32).to_be_bytes());
    frame.extend_from_slice(&frame_type.to_be_bytes());
    frame.extend_from_slice(data);
    frame
}

/// Builds a complete message frame.
pub fn encode_message(delivery: &Delivery) -> Vec<u8> {
    let mut data = Vec::with_capacity(MESSAGE_HEADER_LEN + delivery.body.len());
    data.extend_from_slice(&delivery.timestamp_ns.to_be_bytes());
    data.extend_from_slice(&delivery.attempts.to_be_bytes());
    data.extend_from_slice(delivery.id.as_bytes());
    data.extend_from_slice(&delivery.body);
    encode_frame(FRAME_TYPE_MESSAGE, &data)
}

/// Client commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    /// Client metadata as a JSON object
    Identify(&'a [u8]),
    /// Subscribe to a topic through a channel
    Sub {
        /// Topic name
        topic: &'a str,
        /// Channel name
        channel: &'a str,
    },
    /// Maximum messages in flight
    Rdy(u32),
    /// Acknowledge a message
    Fin(&'a MessageId),
    /// Requeue with a delay in milliseconds
    Req(&'a MessageId, u64),
    /// Heartbeat answer
    Nop,
    /// Start a clean close
    Cls,
}

impl Command<'_> {
    /// Wire bytes of the command.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Command::Identify(body) => {
                let mut out = b"IDENTIFY\n".to_vec();
                out.extend_from_slice(&(body.len() as u32).to_be_bytes());
                out.extend_from_slice(body);
                out
            }
            Command::Sub { topic, channel } => format!("SUB {topic} {channel}\n").into_bytes(),
            Command::Rdy(count) => format!("RDY {count}\n").into_bytes(),
            Command::Fin(id) => with_id("FIN", id, None),
            Command::Req(id, delay_ms) => with_id("REQ", id, Some(*delay_ms)),
            Command::Nop => b"NOP\n".to_vec(),
            Command::Cls => b"CLS\n".to_vec(),
        }
    }
}

fn with_id(verb: &str, id: &MessageId, arg: Option<u64>) -> Vec<u8> {
    let mut out = Vec::with_capacity(verb.len() + 24);
    out.extend_from_slice(verb.as_bytes());
    out.push(b' ');
    out.extend_from_slice(id.as_bytes());
    if let Some(arg) = arg {
        out.extend_from_slice(format!(" {arg}").as_bytes());
    }
    out.push(b'\n');
    out
}
