//! Steadfast Proto: the framed message channel
//!
//! Agents and the bridge exchange discrete JSON messages over byte streams
//! with no message boundaries of their own (stdin/stdout of a native-messaging
//! host, a Unix socket, an in-memory duplex in tests). Each message is framed
//! as a native-endian `u32` length followed by the UTF-8 JSON body.
//!
//! A zero or oversized length is a framing violation: the channel must be torn
//! down. A frame whose body fails to parse is reported but the stream stays
//! usable, since its boundaries are still known. See
//! [`ProtocolError::is_fatal`].

pub mod channel;
pub mod codec;
pub mod error;
pub mod message;

pub use channel::{split, stdio, FrameReader, FrameSender};
pub use codec::{parse_body, to_body, FrameCodec, DEFAULT_MAX_FRAME_BYTES};
pub use error::{ProtocolError, Result};
pub use message::{BlockedDomainsUpdate, ErrorPayload, Heartbeat, HeartbeatAck, Message, STATUS_OK};
