//! # kite-protocol
//!
//! Wire payloads exchanged between the Kite relay and its connectors.
//!
//! Every payload travels as one MessagePack array whose first element is a
//! small integer type tag:
//!
//! | tag | payload        | fields after the tag                                   |
//! |-----|----------------|--------------------------------------------------------|
//! | 0   | `Join`         | member id, member name or nil, channel name            |
//! | 1   | `Ack`          | message id, destination message id, delivered at       |
//! | 2   | `Error`        | reason, code                                           |
//! | 3   | `Plaintext`    | message id, text, timestamp, in reply to or nil        |
//! | 4   | `Binary`       | message id, uri, file name, file type, file size, timestamp, in reply to or nil |
//! | 5   | `Notification` | text, severity                                         |
//!
//! Timestamps use the MessagePack timestamp extension (type -1).
//!
//! ## Example
//!
//! ```rust
//! use kite_protocol::{codec, Payload};
//!
//! let payload = Payload::plaintext("m-1", "Hello, host!");
//!
//! let encoded = codec::encode(&payload).unwrap();
//! let decoded = codec::decode(&encoded).unwrap();
//! assert_eq!(payload, decoded);
//! ```

pub mod codec;
pub mod payload;

pub use codec::{decode, encode, PayloadCodec, ProtocolError};
pub use payload::{
    BinaryMessage, ErrorResponse, JoinChannel, MessageAck, MessagePayload, Notification, Payload,
    PayloadType, PlaintextMessage, Severity,
};
