//! Single-topic encoding: one `/`-delimited topic path plus one scalar payload
//!
//! Node topics are headerless (`f/1/r/2/u/0`); cloud topics carry the
//! `<site>/<namespace>/` prefix (`ELEC520/security/f/1/r/2/u/0`).

use super::scalar::{parse_byte, parse_id, parse_timestamp, BoolLiterals};
use crate::error::DecodeError;
use crate::model::{ArmState, KeypadState, StateModel, Update};
use crate::types::{CloudNamespace, MAX_TOPIC_SEGMENTS};
use tracing::debug;

/// Topic header variant
#[derive(Debug, Clone, Copy)]
pub enum Header<'a> {
    /// No prefix
    Node,
    /// `<site>/<namespace>/` prefix, rejected when absent or different
    Cloud(&'a CloudNamespace),
}

impl Header<'_> {
    fn wrap(&self, path: String) -> String {
        match self {
            Header::Node => path,
            Header::Cloud(ns) => format!("{}{}", ns.prefix(), path),
        }
    }
}

/// Split a topic on `/`, rejecting empty input and overlong paths
pub fn split_topic(topic: &str) -> Result<Vec<&str>, DecodeError> {
    if topic.is_empty() {
        return Err(DecodeError::Empty);
    }
    let segments: Vec<&str> = topic.split('/').collect();
    if segments.len() > MAX_TOPIC_SEGMENTS {
        return Err(DecodeError::TooManySegments(MAX_TOPIC_SEGMENTS));
    }
    Ok(segments)
}

/// Parse a topic/payload pair into the update it describes.
///
/// Exactly one dispatch rule can match a given (segment count, literal
/// markers) shape; anything else is [`DecodeError::NoRule`].
pub fn parse_update(
    topic: &str,
    payload: &str,
    header: Header<'_>,
    literals: BoolLiterals,
) -> Result<Update, DecodeError> {
    let segments = split_topic(topic)?;

    let rest = match header {
        Header::Node => &segments[..],
        Header::Cloud(ns) => {
            if segments.len() < 3 || segments[0] != ns.site || segments[1] != ns.namespace {
                return Err(DecodeError::BadPrefix);
            }
            &segments[2..]
        }
    };

    let update = match *rest {
        ["s", "st"] => Update::ArmState(ArmState::from_byte(parse_byte(payload)?)),
        ["s", "ke"] => {
            let v = parse_byte(payload)?;
            Update::Keypad(KeypadState::from_byte(v).ok_or(DecodeError::InvalidKeypad(v))?)
        }
        ["n", "st"] => Update::Network(parse_byte(payload)?),
        ["n", "mc"] => Update::ControllerAddress(payload.to_string()),

        ["f", f, "cs"] => Update::FloorConnected {
            floor: parse_id(f)?,
            connected: literals.parse(payload)?,
        },
        ["f", f, "id"] => Update::FloorIdByte {
            floor: parse_id(f)?,
            value: parse_byte(payload)?,
        },
        ["f", f, "rsi"] => Update::FloorSignal {
            floor: parse_id(f)?,
            rssi: parse_byte(payload)?,
        },
        ["f", f, "ts"] => Update::FloorTimestamp {
            floor: parse_id(f)?,
            ts: parse_timestamp(payload)?,
        },

        ["f", f, "r", r, "cs"] => Update::RoomConnected {
            floor: parse_id(f)?,
            room: parse_id(r)?,
            connected: literals.parse(payload)?,
        },
        ["f", f, "r", r, "id"] => Update::RoomIdByte {
            floor: parse_id(f)?,
            room: parse_id(r)?,
            value: parse_byte(payload)?,
        },
        ["f", f, "r", r, "ts"] => Update::RoomTimestamp {
            floor: parse_id(f)?,
            room: parse_id(r)?,
            ts: parse_timestamp(payload)?,
        },
        ["f", f, "r", r, "u", u] => Update::Ultra {
            floor: parse_id(f)?,
            room: parse_id(r)?,
            sensor: parse_id(u)?,
            value: parse_byte(payload)?,
        },
        ["f", f, "r", r, "h", h] => Update::Hall {
            floor: parse_id(f)?,
            room: parse_id(r)?,
            sensor: parse_id(h)?,
            open: literals.parse(payload)?,
        },

        _ => return Err(DecodeError::NoRule(topic.to_string())),
    };

    Ok(update)
}

/// Decode one topic/payload pair into the model.
///
/// On any failure the model is left untouched.
pub fn decode(
    model: &mut StateModel,
    topic: &str,
    payload: &str,
    header: Header<'_>,
    literals: BoolLiterals,
) -> Result<(), DecodeError> {
    let update = parse_update(topic, payload, header, literals).map_err(|e| {
        debug!("Topic '{}' rejected: {}", topic, e);
        e
    })?;
    model.apply(&update)?;
    Ok(())
}

/// Headerless topic path for an update; `None` for bare presence
pub fn node_topic(update: &Update) -> Option<String> {
    let path = match update {
        Update::ArmState(_) => "s/st".to_string(),
        Update::Keypad(_) => "s/ke".to_string(),
        Update::Network(_) => "n/st".to_string(),
        Update::ControllerAddress(_) => "n/mc".to_string(),
        Update::Floor { .. } | Update::Room { .. } => return None,
        Update::FloorConnected { floor, .. } => format!("f/{}/cs", floor),
        Update::FloorIdByte { floor, .. } => format!("f/{}/id", floor),
        Update::FloorSignal { floor, .. } => format!("f/{}/rsi", floor),
        Update::FloorTimestamp { floor, .. } => format!("f/{}/ts", floor),
        Update::RoomConnected { floor, room, .. } => format!("f/{}/r/{}/cs", floor, room),
        Update::RoomIdByte { floor, room, .. } => format!("f/{}/r/{}/id", floor, room),
        Update::RoomTimestamp { floor, room, .. } => format!("f/{}/r/{}/ts", floor, room),
        Update::Ultra { floor, room, sensor, .. } => format!("f/{}/r/{}/u/{}", floor, room, sensor),
        Update::Hall { floor, room, sensor, .. } => format!("f/{}/r/{}/h/{}", floor, room, sensor),
    };
    Some(path)
}

/// Scalar payload of an update; `None` for bare presence
pub fn payload(update: &Update, literals: BoolLiterals) -> Option<String> {
    let value = match update {
        Update::ArmState(s) => s.to_byte().to_string(),
        Update::Keypad(k) => k.to_byte().to_string(),
        Update::Network(n) => n.to_string(),
        Update::ControllerAddress(mac) => mac.clone(),
        Update::Floor { .. } | Update::Room { .. } => return None,
        Update::FloorConnected { connected, .. } | Update::RoomConnected { connected, .. } => {
            literals.format(*connected).to_string()
        }
        Update::FloorIdByte { value, .. } | Update::RoomIdByte { value, .. } => value.to_string(),
        Update::FloorSignal { rssi, .. } => rssi.to_string(),
        Update::FloorTimestamp { ts, .. } | Update::RoomTimestamp { ts, .. } => ts.to_string(),
        Update::Ultra { value, .. } => value.to_string(),
        Update::Hall { open, .. } => literals.format(*open).to_string(),
    };
    Some(value)
}

/// Encode one update as a (topic, payload) pair
pub fn encode_update(
    update: &Update,
    header: Header<'_>,
    literals: BoolLiterals,
) -> Option<(String, String)> {
    let topic = node_topic(update)?;
    let value = payload(update, literals)?;
    Some((header.wrap(topic), value))
}

/// Every scalar of the model as single-topic updates, in canonical order
pub fn model_updates(model: &StateModel) -> Vec<Update> {
    let system = model.system();
    let mut out = vec![
        Update::ArmState(system.arm_state),
        Update::Keypad(system.keypad_state),
        Update::Network(system.network_state),
        Update::ControllerAddress(system.controller_address.clone()),
    ];

    for (floor, f) in model.floors() {
        out.push(Update::FloorConnected { floor, connected: f.connected });
        out.push(Update::FloorIdByte { floor, value: f.id_byte });
        if let Some(rssi) = f.signal_strength {
            out.push(Update::FloorSignal { floor, rssi });
        }
        if let Some(ts) = f.last_update {
            out.push(Update::FloorTimestamp { floor, ts });
        }
        for (room, r) in f.rooms() {
            out.push(Update::RoomConnected { floor, room, connected: r.connected });
            out.push(Update::RoomIdByte { floor, room, value: r.id_byte });
            if let Some(ts) = r.last_update {
                out.push(Update::RoomTimestamp { floor, room, ts });
            }
            for (sensor, u) in r.ultras() {
                out.push(Update::Ultra { floor, room, sensor, value: u.value });
            }
            for (sensor, h) in r.halls() {
                out.push(Update::Hall { floor, room, sensor, open: h.open });
            }
        }
    }
    out
}

/// Encode the whole model as a list of single-topic messages
pub fn encode_topics(
    model: &StateModel,
    header: Header<'_>,
    literals: BoolLiterals,
) -> Vec<(String, String)> {
    model_updates(model)
        .iter()
        .filter_map(|u| encode_update(u, header, literals))
        .collect()
}

/// Cloud topic a floor summary is published on: `<site>/<namespace>/f/<f>`
pub fn floor_summary_topic(ns: &CloudNamespace, floor: u8) -> String {
    format!("{}f/{}", ns.prefix(), floor)
}
