//! Control socket protocol for the busylight daemon.
//!
//! Messages are length-prefixed JSON:
//! - 4 bytes: payload length (u32, big-endian)
//! - N bytes: JSON payload
//!
//! Every message is wrapped in an [`Envelope`] carrying the protocol version
//! and a request id used to correlate the response.
//!
//! ```rust
//! use busylight_core::Event;
//! use busylight_protocol::{Envelope, Request, decode_message, encode_message};
//!
//! let request = Envelope::request("req-1", Request::notify(Event::ToggleUrgent));
//! let bytes = encode_message(&request).unwrap();
//! let decoded: Envelope<Request> = decode_message(&bytes).unwrap();
//! assert_eq!(decoded, request);
//! ```

mod error;
mod framing;
mod types;

pub use error::{ProtocolError, ProtocolResult};
pub use framing::{decode_message, encode_message, read_message, write_message};
pub use types::{Envelope, ErrorCode, ErrorResponse, Request, Response, StatusInfo};

/// Protocol version constant.
pub const PROTOCOL_VERSION: &str = "1";

/// Maximum message size (64 KiB).
pub const MAX_MESSAGE_SIZE: u32 = 64 * 1024;
