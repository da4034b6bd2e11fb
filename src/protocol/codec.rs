//! Envelope codec
//!
//! Translates between raw transport frames and validated [`Envelope`]
//! values. Wire fields are all optional, as on the actual wire; the codec
//! is the single place where the envelope invariants are enforced:
//! a header must be present with both uuid and kind, and exactly the
//! payload variant named by the kind must be populated. A frame violating
//! any of these is rejected before it can reach a service.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::{Envelope, ErrorInfo, Image, MessageHeader, MessageKind, Op, Payload};

/// Errors produced while encoding or decoding envelopes.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The frame could not be parsed at all
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A required header field is absent
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// The header names a kind this codec does not know
    #[error("unknown message kind: {0:?}")]
    UnknownKind(String),

    /// The populated payload variant disagrees with the header kind
    #[error("payload does not match header kind {kind}: {detail}")]
    KindMismatch {
        /// Kind declared by the header
        kind: MessageKind,
        /// What was actually populated
        detail: String,
    },
}

/// Encodes and decodes wire envelopes.
///
/// The engine only depends on this trait; the wire format itself is
/// swappable.
pub trait Codec {
    /// Decode a raw frame into a validated envelope.
    fn decode(&self, raw: &[u8]) -> Result<Envelope, CodecError>;

    /// Encode an envelope into a raw frame.
    fn encode(&self, envelope: &Envelope) -> Result<Vec<u8>, CodecError>;
}

/// Wire-level header: every field optional, validated on decode.
#[derive(Debug, Default, Serialize, Deserialize)]
struct WireHeader {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    uuid: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
}

/// Wire-level envelope: header plus one optional slot per payload variant.
#[derive(Debug, Default, Serialize, Deserialize)]
struct WireEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    header: Option<WireHeader>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    image: Option<Image>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<ErrorInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    op: Option<Op>,
}

fn parse_kind(kind: &str) -> Result<MessageKind, CodecError> {
    match kind {
        "image" => Ok(MessageKind::Image),
        "error" => Ok(MessageKind::Error),
        "op" => Ok(MessageKind::Op),
        other => Err(CodecError::UnknownKind(other.to_string())),
    }
}

fn kind_tag(kind: MessageKind) -> &'static str {
    match kind {
        MessageKind::Image => "image",
        MessageKind::Error => "error",
        MessageKind::Op => "op",
    }
}

impl WireEnvelope {
    fn into_envelope(self) -> Result<Envelope, CodecError> {
        let WireEnvelope {
            header,
            image,
            error,
            op,
        } = self;
        let header = header.ok_or(CodecError::MissingField("header"))?;
        let uuid = header.uuid.ok_or(CodecError::MissingField("header.uuid"))?;
        let kind_str = header.kind.ok_or(CodecError::MissingField("header.kind"))?;
        let kind = parse_kind(&kind_str)?;

        // Exactly the slot named by the kind, and only that slot.
        let payload = match (kind, image, error, op) {
            (MessageKind::Image, Some(image), None, None) => Payload::Image(image),
            (MessageKind::Error, None, Some(error), None) => Payload::Error(error),
            (MessageKind::Op, None, None, Some(op)) => Payload::Op(op),
            (kind, image, error, op) => {
                let mut slots = Vec::new();
                if image.is_some() {
                    slots.push("image");
                }
                if error.is_some() {
                    slots.push("error");
                }
                if op.is_some() {
                    slots.push("op");
                }
                return Err(CodecError::KindMismatch {
                    kind,
                    detail: if slots.is_empty() {
                        "no payload populated".to_string()
                    } else {
                        format!("populated: {}", slots.join(", "))
                    },
                });
            }
        };
        Ok(Envelope {
            header: MessageHeader { uuid, kind },
            payload,
        })
    }

    fn from_envelope(envelope: &Envelope) -> Self {
        let mut wire = WireEnvelope {
            header: Some(WireHeader {
                uuid: Some(envelope.header.uuid),
                kind: Some(kind_tag(envelope.header.kind).to_string()),
            }),
            ..Default::default()
        };
        match &envelope.payload {
            Payload::Image(image) => wire.image = Some(image.clone()),
            Payload::Error(error) => wire.error = Some(error.clone()),
            Payload::Op(op) => wire.op = Some(op.clone()),
        }
        wire
    }
}

/// JSON envelope codec, the in-crate wire format.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn decode(&self, raw: &[u8]) -> Result<Envelope, CodecError> {
        let wire: WireEnvelope = serde_json::from_slice(raw)?;
        wire.into_envelope()
    }

    fn encode(&self, envelope: &Envelope) -> Result<Vec<u8>, CodecError> {
        let wire = WireEnvelope::from_envelope(envelope);
        Ok(serde_json::to_vec(&wire)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ErrorCode, OpCode};
    use serde_json::json;

    fn decode(value: serde_json::Value) -> Result<Envelope, CodecError> {
        JsonCodec.decode(&serde_json::to_vec(&value).unwrap())
    }

    #[test]
    fn decodes_a_well_formed_op_response() {
        let env = decode(json!({
            "header": {"uuid": Uuid::now_v7(), "kind": "op"},
            "op": {
                "header": {"direction": "response", "code": "start_acquisition"},
                "status": {"code": "success", "description": "acquisition started"},
            },
        }))
        .unwrap();
        assert_eq!(env.header.kind, MessageKind::Op);
        let Payload::Op(op) = env.payload else {
            panic!("expected op payload");
        };
        assert_eq!(op.header.code, OpCode::StartAcquisition);
        assert_eq!(op.status.unwrap().code, ErrorCode::Success);
    }

    #[test]
    fn rejects_missing_uuid() {
        let err = decode(json!({
            "header": {"kind": "error"},
            "error": {"code": "fail", "description": "x"},
        }))
        .unwrap_err();
        assert!(matches!(err, CodecError::MissingField("header.uuid")));
    }

    #[test]
    fn rejects_missing_kind() {
        let err = decode(json!({
            "header": {"uuid": Uuid::now_v7()},
            "error": {"code": "fail", "description": "x"},
        }))
        .unwrap_err();
        assert!(matches!(err, CodecError::MissingField("header.kind")));
    }

    #[test]
    fn rejects_missing_header() {
        let err = decode(json!({
            "error": {"code": "fail", "description": "x"},
        }))
        .unwrap_err();
        assert!(matches!(err, CodecError::MissingField("header")));
    }

    #[test]
    fn rejects_kind_variant_mismatch() {
        let err = decode(json!({
            "header": {"uuid": Uuid::now_v7(), "kind": "image"},
            "error": {"code": "fail", "description": "x"},
        }))
        .unwrap_err();
        assert!(matches!(err, CodecError::KindMismatch { .. }));
    }

    #[test]
    fn rejects_multiple_populated_variants() {
        let err = decode(json!({
            "header": {"uuid": Uuid::now_v7(), "kind": "error"},
            "error": {"code": "fail", "description": "x"},
            "image": {"raw": [1, 2], "mime": "image/png", "source": "cam0"},
        }))
        .unwrap_err();
        assert!(matches!(err, CodecError::KindMismatch { .. }));
    }

    #[test]
    fn rejects_extra_variants_beside_the_named_one() {
        // The kind's own slot is populated, but so is another.
        let err = decode(json!({
            "header": {"uuid": Uuid::now_v7(), "kind": "op"},
            "op": {
                "header": {"direction": "response", "code": "stop_acquisition"},
                "status": {"code": "success", "description": "ok"},
            },
            "image": {"raw": [1, 2], "mime": "image/png", "source": "cam0"},
        }))
        .unwrap_err();
        assert!(
            matches!(&err, CodecError::KindMismatch { detail, .. } if detail.contains("image")),
            "got {err:?}"
        );
    }

    #[test]
    fn surfaces_unknown_kinds_distinctly() {
        let err = decode(json!({
            "header": {"uuid": Uuid::now_v7(), "kind": "telemetry"},
        }))
        .unwrap_err();
        assert!(matches!(err, CodecError::UnknownKind(k) if k == "telemetry"));
    }

    #[test]
    fn encoded_requests_decode_to_the_same_envelope() {
        let env = Envelope::request(OpCode::StopAcquisition, Some(json!({"grace_ms": 100})));
        let raw = JsonCodec.encode(&env).unwrap();
        assert_eq!(JsonCodec.decode(&raw).unwrap(), env);
    }
}
