//! Codec for encoding and decoding Kite payloads.
//!
//! Payloads are encoded as positional MessagePack arrays with the type tag
//! first. Decoding is strict: every payload type has an exact field count and
//! any deviation is reported instead of being patched over.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::de::{self, IgnoredAny, SeqAccess, Visitor};
use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

use crate::payload::{
    BinaryMessage, ErrorResponse, JoinChannel, MessageAck, Notification, Payload, PayloadType,
    PlaintextMessage, Severity,
};

/// Maximum encoded payload size (1 MiB).
pub const MAX_PAYLOAD_SIZE: usize = 1024 * 1024;

/// MessagePack extension type reserved for timestamps.
const TIMESTAMP_EXT_TYPE: i8 = -1;

/// Largest second count the 64-bit timestamp form can hold.
const TIMESTAMP64_MAX_SECS: i64 = (1 << 34) - 1;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Payload exceeds maximum size.
    #[error("Payload size {0} exceeds maximum {MAX_PAYLOAD_SIZE}")]
    TooLarge(usize),

    /// MessagePack encoding error.
    #[error("Encoding error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// MessagePack decoding error, including fields of the wrong type.
    #[error("Decoding error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// The array is empty, so there is no type tag to dispatch on.
    #[error("Encoded payload has no type tag")]
    MissingType,

    /// The integer type tag is not one of the known payload types.
    #[error("Unsupported payload type: {0}")]
    UnknownType(i128),

    /// The array length does not match the declared payload type.
    #[error("Expected {expected} fields in encoded {payload_type:?} payload but got {actual} instead")]
    FieldCount {
        payload_type: PayloadType,
        expected: usize,
        actual: usize,
    },

    /// Bytes left over after a complete payload.
    #[error("{0} trailing bytes after payload")]
    TrailingBytes(usize),
}

/// Encode a payload to bytes.
///
/// Size is not checked here. Oversize messages are refused when they enter
/// the router, and readers enforce [`MAX_PAYLOAD_SIZE`] in [`decode`].
///
/// # Errors
///
/// Returns an error only if the underlying writer fails.
pub fn encode(payload: &Payload) -> Result<Bytes, ProtocolError> {
    let buf = rmp_serde::to_vec(&Wire(payload))?;
    Ok(Bytes::from(buf))
}

/// Decode a payload from bytes.
///
/// # Errors
///
/// Returns an error if the data is too large, malformed, carries an unknown
/// type tag or the wrong number of fields for its type.
pub fn decode(data: &[u8]) -> Result<Payload, ProtocolError> {
    if data.len() > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::TooLarge(data.len()));
    }

    let mut rest = data;
    let decoded = {
        let mut de = rmp_serde::Deserializer::new(&mut rest);
        Decoded::deserialize(&mut de)?
    };

    if !rest.is_empty() {
        return Err(ProtocolError::TrailingBytes(rest.len()));
    }

    match decoded {
        Decoded::Payload(payload) => Ok(payload),
        Decoded::Rejected(err) => Err(err),
    }
}

/// Codec for payload encoding/decoding.
#[derive(Debug, Default)]
pub struct PayloadCodec {
    max_size: Option<usize>,
}

impl PayloadCodec {
    /// Create a new codec instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a codec that refuses to decode inputs above `max_size` bytes.
    ///
    /// Limits above [`MAX_PAYLOAD_SIZE`] have no effect.
    #[must_use]
    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            max_size: Some(max_size.min(MAX_PAYLOAD_SIZE)),
        }
    }

    /// Encode a payload to bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the writer fails.
    pub fn encode(&self, payload: &Payload) -> Result<Bytes, ProtocolError> {
        encode(payload)
    }

    /// Decode a payload from bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if decoding fails or the input exceeds the limit.
    pub fn decode(&self, data: &[u8]) -> Result<Payload, ProtocolError> {
        self.check_size(data.len())?;
        decode(data)
    }

    fn check_size(&self, len: usize) -> Result<(), ProtocolError> {
        match self.max_size {
            Some(max) if len > max => Err(ProtocolError::TooLarge(len)),
            _ => Ok(()),
        }
    }
}

/// rmp-serde maps this newtype name onto MessagePack extension values.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename = "_ExtStruct")]
struct ExtStruct((i8, serde_bytes::ByteBuf));

fn timestamp_to_ext(ts: &DateTime<Utc>) -> ExtStruct {
    let secs = ts.timestamp();
    let nanos = ts.timestamp_subsec_nanos();

    let data = if (0..=TIMESTAMP64_MAX_SECS).contains(&secs) && nanos < 1_000_000_000 {
        let packed = (u64::from(nanos) << 34) | secs as u64;
        if packed >> 32 == 0 {
            (packed as u32).to_be_bytes().to_vec()
        } else {
            packed.to_be_bytes().to_vec()
        }
    } else {
        let mut buf = Vec::with_capacity(12);
        buf.extend_from_slice(&nanos.to_be_bytes());
        buf.extend_from_slice(&secs.to_be_bytes());
        buf
    };

    ExtStruct((TIMESTAMP_EXT_TYPE, serde_bytes::ByteBuf::from(data)))
}

fn timestamp_from_ext(ext: ExtStruct) -> Result<DateTime<Utc>, String> {
    let ExtStruct((ext_type, data)) = ext;
    if ext_type != TIMESTAMP_EXT_TYPE {
        return Err(format!("expected timestamp extension, got type {ext_type}"));
    }

    let (secs, nanos) = match data.len() {
        4 => {
            let mut raw = [0u8; 4];
            raw.copy_from_slice(&data);
            (i64::from(u32::from_be_bytes(raw)), 0)
        }
        8 => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&data);
            let packed = u64::from_be_bytes(raw);
            ((packed & TIMESTAMP64_MAX_SECS as u64) as i64, (packed >> 34) as u32)
        }
        12 => {
            let mut nanos = [0u8; 4];
            let mut secs = [0u8; 8];
            nanos.copy_from_slice(&data[..4]);
            secs.copy_from_slice(&data[4..]);
            (i64::from_be_bytes(secs), u32::from_be_bytes(nanos))
        }
        len => return Err(format!("invalid timestamp length {len}")),
    };

    DateTime::from_timestamp(secs, nanos)
        .ok_or_else(|| format!("timestamp {secs}.{nanos:09} out of range"))
}

struct WireTime<'a>(&'a DateTime<Utc>);

impl Serialize for WireTime<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        timestamp_to_ext(self.0).serialize(serializer)
    }
}

/// Positional wire form of a payload.
struct Wire<'a>(&'a Payload);

impl Serialize for Wire<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let payload_type = self.0.payload_type();
        let mut fields = serializer.serialize_tuple(payload_type.field_count())?;
        fields.serialize_element(&u8::from(payload_type))?;

        match self.0 {
            Payload::Join(j) => {
                fields.serialize_element(&j.member_id)?;
                fields.serialize_element(&j.member_name)?;
                fields.serialize_element(&j.channel_name)?;
            }
            Payload::Ack(a) => {
                fields.serialize_element(&a.message_id)?;
                fields.serialize_element(&a.destination_message_id)?;
                fields.serialize_element(&WireTime(&a.delivered_at))?;
            }
            Payload::Error(e) => {
                fields.serialize_element(&e.reason)?;
                fields.serialize_element(&e.code)?;
            }
            Payload::Plaintext(m) => {
                fields.serialize_element(&m.message_id)?;
                fields.serialize_element(&m.text)?;
                fields.serialize_element(&WireTime(&m.timestamp))?;
                fields.serialize_element(&m.in_reply_to)?;
            }
            Payload::Binary(b) => {
                fields.serialize_element(&b.message_id)?;
                fields.serialize_element(&b.uri)?;
                fields.serialize_element(&b.file_name)?;
                fields.serialize_element(&b.file_type)?;
                fields.serialize_element(&b.file_size)?;
                fields.serialize_element(&WireTime(&b.timestamp))?;
                fields.serialize_element(&b.in_reply_to)?;
            }
            Payload::Notification(n) => {
                fields.serialize_element(&n.text)?;
                fields.serialize_element(&u8::from(n.severity))?;
            }
        }

        fields.end()
    }
}

/// Outcome of reading one wire array.
///
/// Structural problems (unknown tag, wrong length) are reported as values so
/// they keep their own error variants instead of collapsing into a serde
/// message.
enum Decoded {
    Payload(Payload),
    Rejected(ProtocolError),
}

impl<'de> Deserialize<'de> for Decoded {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_seq(WireVisitor)
    }
}

struct WireVisitor;

/// A type tag of any integer width or sign.
struct Tag(i128);

impl<'de> Deserialize<'de> for Tag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TagVisitor;

        impl Visitor<'_> for TagVisitor {
            type Value = Tag;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an integer type tag")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Tag, E> {
                Ok(Tag(i128::from(v)))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Tag, E> {
                Ok(Tag(i128::from(v)))
            }
        }

        deserializer.deserialize_i64(TagVisitor)
    }
}

fn field<'de, A, T>(seq: &mut A, index: usize) -> Result<T, A::Error>
where
    A: SeqAccess<'de>,
    T: Deserialize<'de>,
{
    seq.next_element()?
        .ok_or_else(|| de::Error::invalid_length(index, &"a complete payload"))
}

fn timestamp<'de, A: SeqAccess<'de>>(seq: &mut A, index: usize) -> Result<DateTime<Utc>, A::Error> {
    let ext: ExtStruct = field(seq, index)?;
    timestamp_from_ext(ext).map_err(de::Error::custom)
}

fn drain<'de, A: SeqAccess<'de>>(seq: &mut A) -> Result<usize, A::Error> {
    let mut skipped = 0;
    while seq.next_element::<IgnoredAny>()?.is_some() {
        skipped += 1;
    }
    Ok(skipped)
}

impl<'de> Visitor<'de> for WireVisitor {
    type Value = Decoded;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a payload array starting with a type tag")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Decoded, A::Error> {
        let total = seq.size_hint();

        let Some(Tag(tag)) = seq.next_element::<Tag>()? else {
            return Ok(Decoded::Rejected(ProtocolError::MissingType));
        };

        let payload_type = match u8::try_from(tag).ok().map(PayloadType::try_from) {
            Some(Ok(pt)) => pt,
            _ => {
                drain(&mut seq)?;
                return Ok(Decoded::Rejected(ProtocolError::UnknownType(tag)));
            }
        };
        let expected = payload_type.field_count();

        if let Some(actual) = total.filter(|&n| n != expected) {
            drain(&mut seq)?;
            return Ok(Decoded::Rejected(ProtocolError::FieldCount {
                payload_type,
                expected,
                actual,
            }));
        }

        let payload = match payload_type {
            PayloadType::Join => Payload::Join(JoinChannel {
                member_id: field(&mut seq, 1)?,
                member_name: field(&mut seq, 2)?,
                channel_name: field(&mut seq, 3)?,
            }),
            PayloadType::Ack => Payload::Ack(MessageAck {
                message_id: field(&mut seq, 1)?,
                destination_message_id: field(&mut seq, 2)?,
                delivered_at: timestamp(&mut seq, 3)?,
            }),
            PayloadType::Error => Payload::Error(ErrorResponse {
                reason: field(&mut seq, 1)?,
                code: field(&mut seq, 2)?,
            }),
            PayloadType::Plaintext => Payload::Plaintext(PlaintextMessage {
                message_id: field(&mut seq, 1)?,
                text: field(&mut seq, 2)?,
                timestamp: timestamp(&mut seq, 3)?,
                in_reply_to: field(&mut seq, 4)?,
            }),
            PayloadType::Binary => Payload::Binary(BinaryMessage {
                message_id: field(&mut seq, 1)?,
                uri: field(&mut seq, 2)?,
                file_name: field(&mut seq, 3)?,
                file_type: field(&mut seq, 4)?,
                file_size: field(&mut seq, 5)?,
                timestamp: timestamp(&mut seq, 6)?,
                in_reply_to: field(&mut seq, 7)?,
            }),
            PayloadType::Notification => {
                let text = field(&mut seq, 1)?;
                let severity: u8 = field(&mut seq, 2)?;
                Payload::Notification(Notification {
                    text,
                    severity: Severity::try_from(severity).map_err(de::Error::custom)?,
                })
            }
        };

        // Only reachable for sequences that did not announce their length.
        let extra = drain(&mut seq)?;
        if extra > 0 {
            return Ok(Decoded::Rejected(ProtocolError::FieldCount {
                payload_type,
                expected,
                actual: expected + extra,
            }));
        }

        Ok(Decoded::Payload(payload))
    }
}
