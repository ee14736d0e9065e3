// SPDX-License-Identifier: MIT

//! MessagePack frame codec.
//!
//! Every frame is a tagged array: `[opcode, field, field, …]`. Absent
//! optional fields encode as nil so arity stays fixed per opcode. State
//! values encode structurally (maps in sorted key order), which keeps the
//! output byte-deterministic for identical inputs and slot state.
//!
//! Patch paths encode as either a single 32-bit hash (static, registered
//! paths) or an array of segments:
//!
//! - field name  → string
//! - list index  → non-negative integer
//! - dynamic key → `[slot, "full-key"]` on first use, then `-(slot + 1)`
//!
//! The negative form cannot collide with list indices, so the decoder
//! needs no lookahead.

use crate::frame::{ActionFrame, ClientEventFrame, ClientFrame, JoinFrame, ServerFrame};
use crate::opcode::{Opcode, UnknownOpcode};
use crate::pathhash::PathTable;
use crate::slot::SlotTable;
use land_core::{ClientError, LandId, Patch, PatchOp, Path, PathSegment, StateValue};
use rmpv::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Codec failures. Inbound failures surface as `INVALID_FRAME` closes.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("encode failed: {0}")]
    Encode(String),

    #[error("decode failed: {0}")]
    Decode(String),

    #[error(transparent)]
    UnknownOpcode(#[from] UnknownOpcode),

    #[error("malformed {frame} frame: {reason}")]
    Malformed { frame: &'static str, reason: String },

    #[error("unknown path hash {0:#010x}")]
    UnknownPathHash(u32),

    #[error("unknown or inconsistent slot reference {0}")]
    BadSlot(u32),
}

fn malformed(frame: &'static str, reason: impl Into<String>) -> CodecError {
    CodecError::Malformed { frame, reason: reason.into() }
}

// ── value conversion ────────────────────────────────────────────────────

fn to_wire(value: &StateValue) -> Value {
    match value {
        StateValue::Null => Value::Nil,
        StateValue::Bool(b) => Value::from(*b),
        StateValue::Int(n) => Value::from(*n),
        StateValue::Float(f) => Value::from(*f),
        StateValue::Str(s) => Value::from(s.as_str()),
        StateValue::List(items) => Value::Array(items.iter().map(to_wire).collect()),
        StateValue::Map(map) => Value::Map(
            map.iter().map(|(k, v)| (Value::from(k.as_str()), to_wire(v))).collect(),
        ),
    }
}

fn from_wire(value: Value) -> Result<StateValue, CodecError> {
    match value {
        Value::Nil => Ok(StateValue::Null),
        Value::Boolean(b) => Ok(StateValue::Bool(b)),
        Value::Integer(n) => n
            .as_i64()
            .map(StateValue::Int)
            .ok_or_else(|| CodecError::Decode(format!("integer out of range: {n}"))),
        Value::F32(f) => Ok(StateValue::Float(f64::from(f))),
        Value::F64(f) => Ok(StateValue::Float(f)),
        Value::String(s) => match s.into_str() {
            Some(s) => Ok(StateValue::Str(s)),
            None => Err(CodecError::Decode("non-UTF-8 string".to_string())),
        },
        Value::Array(items) => Ok(StateValue::List(
            items.into_iter().map(from_wire).collect::<Result<_, _>>()?,
        )),
        Value::Map(entries) => {
            let mut map = BTreeMap::new();
            for (key, entry) in entries {
                let key = match key {
                    Value::String(s) => s
                        .into_str()
                        .ok_or_else(|| CodecError::Decode("non-UTF-8 map key".to_string()))?,
                    other => {
                        return Err(CodecError::Decode(format!("non-string map key: {other}")))
                    }
                };
                map.insert(key, from_wire(entry)?);
            }
            Ok(StateValue::Map(map))
        }
        other => Err(CodecError::Decode(format!("unsupported value: {other}"))),
    }
}

// ── primitive readers ───────────────────────────────────────────────────

fn write_frame(fields: Vec<Value>) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::new();
    rmpv::encode::write_value(&mut buf, &Value::Array(fields))
        .map_err(|e| CodecError::Encode(e.to_string()))?;
    Ok(buf)
}

fn read_frame(bytes: &[u8]) -> Result<Vec<Value>, CodecError> {
    let mut cursor = bytes;
    let value = rmpv::decode::read_value(&mut cursor)
        .map_err(|e| CodecError::Decode(e.to_string()))?;
    match value {
        Value::Array(fields) if !fields.is_empty() => Ok(fields),
        Value::Array(_) => Err(CodecError::Decode("empty frame".to_string())),
        other => Err(CodecError::Decode(format!("frame is not an array: {other}"))),
    }
}

fn as_u64(value: &Value, frame: &'static str, what: &str) -> Result<u64, CodecError> {
    value.as_u64().ok_or_else(|| malformed(frame, format!("{what} is not an unsigned integer")))
}

fn as_str(value: &Value, frame: &'static str, what: &str) -> Result<String, CodecError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| malformed(frame, format!("{what} is not a string")))
}

fn as_opt_str(value: &Value, frame: &'static str, what: &str) -> Result<Option<String>, CodecError> {
    if value.is_nil() {
        return Ok(None);
    }
    as_str(value, frame, what).map(Some)
}

fn as_bool(value: &Value, frame: &'static str, what: &str) -> Result<bool, CodecError> {
    value.as_bool().ok_or_else(|| malformed(frame, format!("{what} is not a bool")))
}

fn field<'a>(
    fields: &'a [Value],
    index: usize,
    frame: &'static str,
) -> Result<&'a Value, CodecError> {
    fields.get(index).ok_or_else(|| malformed(frame, format!("missing field {index}")))
}

fn land_id(value: &Value, frame: &'static str) -> Result<LandId, CodecError> {
    let text = as_str(value, frame, "land id")?;
    LandId::parse(&text).map_err(|e| malformed(frame, e.to_string()))
}

fn error_fields(error: &ClientError) -> (Value, Value, Value) {
    (
        Value::from(error.code.as_str()),
        Value::from(error.message.as_str()),
        to_wire(&StateValue::Map(error.details.clone())),
    )
}

fn read_error(
    fields: &[Value],
    at: usize,
    frame: &'static str,
) -> Result<ClientError, CodecError> {
    let code = as_str(field(fields, at, frame)?, frame, "error code")?;
    let message = as_str(field(fields, at + 1, frame)?, frame, "error message")?;
    let details = match fields.get(at + 2) {
        Some(value) if !value.is_nil() => match from_wire(value.clone())? {
            StateValue::Map(map) => map,
            _ => return Err(malformed(frame, "error details is not a map")),
        },
        _ => BTreeMap::new(),
    };
    Ok(ClientError { code, message, details })
}

// ── patch paths ─────────────────────────────────────────────────────────

fn encode_path(path: &Path, paths: &PathTable, slots: &mut SlotTable) -> Value {
    if let Some(hash) = paths.hash_of(path) {
        return Value::from(hash);
    }
    let segments = path
        .segments()
        .iter()
        .map(|segment| match segment {
            PathSegment::Field(name) => Value::from(name.as_str()),
            PathSegment::Index(index) => Value::from(*index as u64),
            PathSegment::Key(key) => {
                let slot = slots.intern(key);
                if slot.announced {
                    Value::Array(vec![Value::from(slot.id), Value::from(key.as_str())])
                } else {
                    Value::from(-(i64::from(slot.id) + 1))
                }
            }
        })
        .collect();
    Value::Array(segments)
}

fn decode_path(
    value: &Value,
    paths: &PathTable,
    slots: &mut SlotTable,
) -> Result<Path, CodecError> {
    match value {
        Value::Integer(n) => {
            let hash = n
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| CodecError::Decode(format!("bad path hash: {n}")))?;
            paths.path_of(hash).cloned().ok_or(CodecError::UnknownPathHash(hash))
        }
        Value::Array(segments) => {
            let mut path = Path::root();
            for segment in segments {
                path.push(decode_segment(segment, slots)?);
            }
            Ok(path)
        }
        other => Err(CodecError::Decode(format!("bad path encoding: {other}"))),
    }
}

fn decode_segment(value: &Value, slots: &mut SlotTable) -> Result<PathSegment, CodecError> {
    match value {
        Value::String(s) => s
            .as_str()
            .map(|s| PathSegment::Field(s.to_string()))
            .ok_or_else(|| CodecError::Decode("non-UTF-8 path segment".to_string())),
        Value::Integer(n) => {
            if let Some(index) = n.as_u64() {
                return Ok(PathSegment::Index(index as usize));
            }
            // Negative: slot back-reference.
            let raw = n
                .as_i64()
                .ok_or_else(|| CodecError::Decode(format!("bad segment: {n}")))?;
            let id = u32::try_from(-raw - 1)
                .map_err(|_| CodecError::Decode(format!("bad slot reference: {raw}")))?;
            let key = slots.resolve(id).ok_or(CodecError::BadSlot(id))?;
            Ok(PathSegment::Key(key.to_string()))
        }
        Value::Array(pair) => {
            let [id, key] = pair.as_slice() else {
                return Err(CodecError::Decode("slot announcement is not a pair".to_string()));
            };
            let id = id
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| CodecError::Decode("bad slot id".to_string()))?;
            let key = key
                .as_str()
                .ok_or_else(|| CodecError::Decode("bad slot key".to_string()))?;
            if !slots.learn(id, key) {
                return Err(CodecError::BadSlot(id));
            }
            Ok(PathSegment::Key(key.to_string()))
        }
        other => Err(CodecError::Decode(format!("bad path segment: {other}"))),
    }
}

fn encode_patch(patch: &Patch, paths: &PathTable, slots: &mut SlotTable) -> Value {
    let op = match patch.op {
        PatchOp::Set => 0u64,
        PatchOp::Delete => 1,
        PatchOp::Add => 2,
    };
    let value = match &patch.value {
        Some(value) => to_wire(value),
        None => Value::Nil,
    };
    Value::Array(vec![encode_path(&patch.path, paths, slots), Value::from(op), value])
}

fn decode_patch(
    value: &Value,
    paths: &PathTable,
    slots: &mut SlotTable,
) -> Result<Patch, CodecError> {
    let fields = match value {
        Value::Array(fields) => fields,
        _ => return Err(CodecError::Decode("patch is not an array".to_string())),
    };
    let [path, op, patch_value] = fields.as_slice() else {
        return Err(CodecError::Decode(format!("patch arity {} != 3", fields.len())));
    };
    let path = decode_path(path, paths, slots)?;
    let op = match as_u64(op, "patch", "op")? {
        0 => PatchOp::Set,
        1 => PatchOp::Delete,
        2 => PatchOp::Add,
        other => return Err(CodecError::Decode(format!("unknown patch op {other}"))),
    };
    let value = if patch_value.is_nil() && op == PatchOp::Delete {
        None
    } else {
        Some(from_wire(patch_value.clone())?)
    };
    Ok(Patch { path, op, value })
}

// ── client frames ───────────────────────────────────────────────────────

/// Encode a client→server frame (used by SDKs and the spec suite).
pub fn encode_client_frame(frame: &ClientFrame) -> Result<Vec<u8>, CodecError> {
    let fields = match frame {
        ClientFrame::Join(join) => vec![
            Value::from(Opcode::Join as u8),
            Value::from(join.request_id),
            Value::from(join.land_type.as_str()),
            join.instance_id.as_deref().map(Value::from).unwrap_or(Value::Nil),
            join.player_id.as_deref().map(Value::from).unwrap_or(Value::Nil),
            join.client_id.as_deref().map(Value::from).unwrap_or(Value::Nil),
            to_wire(&join.metadata),
        ],
        ClientFrame::Action(action) => vec![
            Value::from(Opcode::Action as u8),
            Value::from(action.request_id),
            Value::from(action.land_id.to_string()),
            Value::from(action.type_id.as_str()),
            to_wire(&action.payload),
        ],
        ClientFrame::ClientEvent(event) => vec![
            Value::from(Opcode::ClientEvent as u8),
            Value::from(event.land_id.to_string()),
            Value::from(event.type_id.as_str()),
            to_wire(&event.payload),
        ],
    };
    write_frame(fields)
}

/// Decode a client→server frame (server inbound path).
pub fn decode_client_frame(bytes: &[u8]) -> Result<ClientFrame, CodecError> {
    let fields = read_frame(bytes)?;
    let opcode = Opcode::try_from(as_u64(&fields[0], "client", "opcode")?)?;
    match opcode {
        Opcode::Join => {
            let frame = "join";
            Ok(ClientFrame::Join(JoinFrame {
                request_id: as_u64(field(&fields, 1, frame)?, frame, "request id")?,
                land_type: as_str(field(&fields, 2, frame)?, frame, "land type")?,
                instance_id: as_opt_str(field(&fields, 3, frame)?, frame, "instance id")?,
                player_id: as_opt_str(field(&fields, 4, frame)?, frame, "player id")?,
                client_id: as_opt_str(field(&fields, 5, frame)?, frame, "client id")?,
                metadata: from_wire(field(&fields, 6, frame)?.clone())?,
            }))
        }
        Opcode::Action => {
            let frame = "action";
            Ok(ClientFrame::Action(ActionFrame {
                request_id: as_u64(field(&fields, 1, frame)?, frame, "request id")?,
                land_id: land_id(field(&fields, 2, frame)?, frame)?,
                type_id: as_str(field(&fields, 3, frame)?, frame, "type id")?,
                payload: from_wire(field(&fields, 4, frame)?.clone())?,
            }))
        }
        Opcode::ClientEvent => {
            let frame = "client_event";
            Ok(ClientFrame::ClientEvent(ClientEventFrame {
                land_id: land_id(field(&fields, 1, frame)?, frame)?,
                type_id: as_str(field(&fields, 2, frame)?, frame, "type id")?,
                payload: from_wire(field(&fields, 3, frame)?.clone())?,
            }))
        }
        other => Err(malformed("client", format!("server-only opcode {other:?}"))),
    }
}

// ── server frames ───────────────────────────────────────────────────────

/// Encode a server→client frame against one session's slot table.
pub fn encode_server_frame(
    frame: &ServerFrame,
    paths: &PathTable,
    slots: &mut SlotTable,
) -> Result<Vec<u8>, CodecError> {
    let fields = match frame {
        ServerFrame::JoinAck { request_id, land_id, player_id, session_id, tick_id, snapshot } => {
            vec![
                Value::from(Opcode::JoinAck as u8),
                Value::from(*request_id),
                Value::from(land_id.to_string()),
                Value::from(player_id.as_str()),
                Value::from(session_id.as_str()),
                Value::from(*tick_id),
                to_wire(snapshot),
            ]
        }
        ServerFrame::JoinError { request_id, error } => {
            let (code, message, details) = error_fields(error);
            vec![
                Value::from(Opcode::JoinError as u8),
                Value::from(*request_id),
                code,
                message,
                details,
            ]
        }
        ServerFrame::ActionResponse { request_id, ok, payload, error } => {
            let (code, message, details) = match error {
                Some(error) => error_fields(error),
                None => (Value::Nil, Value::Nil, Value::Nil),
            };
            vec![
                Value::from(Opcode::ActionResponse as u8),
                Value::from(*request_id),
                Value::from(*ok),
                payload.as_ref().map(to_wire).unwrap_or(Value::Nil),
                code,
                message,
                details,
            ]
        }
        ServerFrame::ServerEvent { type_id, payload } => vec![
            Value::from(Opcode::ServerEvent as u8),
            Value::from(type_id.as_str()),
            to_wire(payload),
        ],
        ServerFrame::StateFirst { tick_id, snapshot } => vec![
            Value::from(Opcode::StateFirst as u8),
            Value::from(*tick_id),
            to_wire(snapshot),
        ],
        ServerFrame::StateDiff { tick_id, patches } => vec![
            Value::from(Opcode::StateDiff as u8),
            Value::from(*tick_id),
            Value::Array(patches.iter().map(|p| encode_patch(p, paths, slots)).collect()),
        ],
        ServerFrame::BroadcastUpdate { tick_id, patches } => {
            // Shared frames are replicated byte-for-byte to every session,
            // so their paths never touch the per-session slot table.
            let mut shared = SlotTable::new();
            vec![
                Value::from(Opcode::BroadcastUpdate as u8),
                Value::from(*tick_id),
                Value::Array(
                    patches.iter().map(|p| encode_patch(p, paths, &mut shared)).collect(),
                ),
            ]
        }
        ServerFrame::Close { error } => {
            let (code, message, details) = error_fields(error);
            vec![Value::from(Opcode::Close as u8), code, message, details]
        }
    };
    write_frame(fields)
}

/// Decode a server→client frame (client side of the protocol).
pub fn decode_server_frame(
    bytes: &[u8],
    paths: &PathTable,
    slots: &mut SlotTable,
) -> Result<ServerFrame, CodecError> {
    let fields = read_frame(bytes)?;
    let opcode = Opcode::try_from(as_u64(&fields[0], "server", "opcode")?)?;
    match opcode {
        Opcode::JoinAck => {
            let frame = "join_ack";
            Ok(ServerFrame::JoinAck {
                request_id: as_u64(field(&fields, 1, frame)?, frame, "request id")?,
                land_id: land_id(field(&fields, 2, frame)?, frame)?,
                player_id: as_str(field(&fields, 3, frame)?, frame, "player id")?.into(),
                session_id: as_str(field(&fields, 4, frame)?, frame, "session id")?
                    .as_str()
                    .into(),
                tick_id: as_u64(field(&fields, 5, frame)?, frame, "tick id")?,
                snapshot: from_wire(field(&fields, 6, frame)?.clone())?,
            })
        }
        Opcode::JoinError => {
            let frame = "join_error";
            Ok(ServerFrame::JoinError {
                request_id: as_u64(field(&fields, 1, frame)?, frame, "request id")?,
                error: read_error(&fields, 2, frame)?,
            })
        }
        Opcode::ActionResponse => {
            let frame = "action_response";
            let ok = as_bool(field(&fields, 2, frame)?, frame, "ok")?;
            let payload = field(&fields, 3, frame)?;
            let payload =
                if payload.is_nil() { None } else { Some(from_wire(payload.clone())?) };
            let error = if ok { None } else { Some(read_error(&fields, 4, frame)?) };
            Ok(ServerFrame::ActionResponse {
                request_id: as_u64(field(&fields, 1, frame)?, frame, "request id")?,
                ok,
                payload,
                error,
            })
        }
        Opcode::ServerEvent => {
            let frame = "server_event";
            Ok(ServerFrame::ServerEvent {
                type_id: as_str(field(&fields, 1, frame)?, frame, "type id")?,
                payload: from_wire(field(&fields, 2, frame)?.clone())?,
            })
        }
        Opcode::StateFirst => {
            let frame = "state_first";
            Ok(ServerFrame::StateFirst {
                tick_id: as_u64(field(&fields, 1, frame)?, frame, "tick id")?,
                snapshot: from_wire(field(&fields, 2, frame)?.clone())?,
            })
        }
        Opcode::StateDiff => {
            let frame = "state_diff";
            let entries = match field(&fields, 2, frame)? {
                Value::Array(entries) => entries,
                _ => return Err(malformed(frame, "patches is not an array")),
            };
            let patches = entries
                .iter()
                .map(|entry| decode_patch(entry, paths, slots))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ServerFrame::StateDiff {
                tick_id: as_u64(field(&fields, 1, frame)?, frame, "tick id")?,
                patches,
            })
        }
        Opcode::BroadcastUpdate => {
            let frame = "broadcast_update";
            let entries = match field(&fields, 2, frame)? {
                Value::Array(entries) => entries,
                _ => return Err(malformed(frame, "patches is not an array")),
            };
            let mut shared = SlotTable::new();
            let patches = entries
                .iter()
                .map(|entry| decode_patch(entry, paths, &mut shared))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ServerFrame::BroadcastUpdate {
                tick_id: as_u64(field(&fields, 1, frame)?, frame, "tick id")?,
                patches,
            })
        }
        Opcode::Close => {
            let frame = "close";
            Ok(ServerFrame::Close { error: read_error(&fields, 1, frame)? })
        }
        other => Err(malformed("server", format!("client-only opcode {other:?}"))),
    }
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;
