//! Per-room compact string
//!
//! `f/<f>/r/<r>/cs:<0|1>;u/<id>:<0..255>;...;h/<id>:<0|1>;...`
//!
//! This is what room sensor boards emit and what floor nodes flood to each
//! other. The header is mandatory; after it every token stands on its own,
//! and unknown keys are skipped so newer boards can add fields.

use super::scalar::{parse_byte, parse_id, parse_timestamp, BoolLiterals};
use crate::error::DecodeError;
use crate::model::{StateModel, Update};
use tracing::{debug, trace};

/// Floor and room addressed by a compact room string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoomKey {
    pub floor: u8,
    pub room: u8,
}

/// Encode one room. `None` if the room is not present.
pub fn encode_room(model: &StateModel, floor: u8, room: u8, literals: BoolLiterals) -> Option<String> {
    let r = model.room(floor, room)?;

    let mut out = format!("f/{}/r/{}/cs:{}", floor, room, literals.format(r.connected));
    for (id, u) in r.ultras() {
        out.push_str(&format!(";u/{}:{}", id, u.value));
    }
    for (id, h) in r.halls() {
        out.push_str(&format!(";h/{}:{}", id, literals.format(h.open)));
    }
    Some(out)
}

/// Split `key:value`; the value may itself be empty
fn split_pair(token: &str) -> Option<(&str, &str)> {
    token.split_once(':')
}

/// `f/<f>/r/<r>[/...]` → ids plus the remaining key segments
fn parse_header(key: &str) -> Option<(RoomKey, Vec<&str>)> {
    let segments: Vec<&str> = key.split('/').collect();
    match segments.as_slice() {
        ["f", f, "r", r, rest @ ..] => {
            let floor = parse_id(f).ok()?;
            let room = parse_id(r).ok()?;
            Some((RoomKey { floor, room }, rest.to_vec()))
        }
        _ => None,
    }
}

/// Map a room-relative key to an update. `Ok(None)` means the key is unknown.
pub(crate) fn room_key_update(
    at: RoomKey,
    key: &[&str],
    value: &str,
    literals: BoolLiterals,
) -> Result<Option<Update>, DecodeError> {
    let RoomKey { floor, room } = at;
    let update = match *key {
        ["cs"] => Update::RoomConnected { floor, room, connected: literals.parse(value)? },
        ["ts"] => Update::RoomTimestamp { floor, room, ts: parse_timestamp(value)? },
        ["id"] => Update::RoomIdByte { floor, room, value: parse_byte(value)? },
        ["u", id] => Update::Ultra { floor, room, sensor: parse_id(id)?, value: parse_byte(value)? },
        ["h", id] => Update::Hall { floor, room, sensor: parse_id(id)?, open: literals.parse(value)? },
        _ => return Ok(None),
    };
    Ok(Some(update))
}

/// Decode a compact room string into the model.
///
/// A missing or malformed header fails without touching the model. Once the
/// header is found the room is created, and each token is applied on its
/// own: a bad token is skipped, it does not void the rest.
pub fn decode_room(model: &mut StateModel, line: &str, literals: BoolLiterals) -> Result<RoomKey, DecodeError> {
    if line.is_empty() {
        return Err(DecodeError::Empty);
    }

    let tokens: Vec<&str> = line.split(';').collect();
    let header = tokens
        .iter()
        .find_map(|t| {
            let key = split_pair(t).map(|(k, _)| k).unwrap_or(t);
            parse_header(key)
        })
        .map(|(at, _)| at)
        .ok_or(DecodeError::MissingHeader)?;

    model.add_room(header.floor, header.room)?;

    for token in tokens {
        if token.is_empty() {
            continue;
        }
        let Some((key, value)) = split_pair(token) else {
            if parse_header(token).is_none() {
                debug!("Room {:?}: token '{}' has no value, skipped", header, token);
            }
            continue;
        };

        let segments: Vec<&str> = match parse_header(key) {
            Some((at, rest)) if at == header => rest,
            Some(_) => {
                trace!("Room {:?}: token '{}' addresses another room, ignored", header, token);
                continue;
            }
            None => key.split('/').collect(),
        };

        match room_key_update(header, &segments, value, literals) {
            Ok(Some(update)) => {
                if let Err(e) = model.apply(&update) {
                    debug!("Room {:?}: token '{}' skipped: {}", header, token, e);
                }
            }
            Ok(None) => trace!("Room {:?}: unknown key '{}' ignored", header, key),
            Err(e) => debug!("Room {:?}: token '{}' skipped: {}", header, token, e),
        }
    }

    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;

    const D: BoolLiterals = BoolLiterals::Digits;

    #[test]
    fn test_encode_room_layout() {
        let mut model = StateModel::default();
        model.set_room_connected(0, 1, true).unwrap();
        model.set_hall_open(0, 1, 1, false).unwrap();
        model.set_ultra_value(0, 1, 0, 87).unwrap();
        model.set_ultra_value(0, 1, 2, 3).unwrap();

        assert_eq!(
            encode_room(&model, 0, 1, D).unwrap(),
            "f/0/r/1/cs:1;u/0:87;u/2:3;h/1:0"
        );
        assert_eq!(encode_room(&model, 0, 2, D), None);
    }

    #[test]
    fn test_encode_room_without_sensors_has_no_trailing_separator() {
        let mut model = StateModel::default();
        model.add_room(3, 4).unwrap();
        assert_eq!(encode_room(&model, 3, 4, D).unwrap(), "f/3/r/4/cs:0");
    }

    #[test]
    fn test_decode_room_line() {
        let mut model = StateModel::default();
        let at = decode_room(&mut model, "f/0/r/1/cs:1;u/0:87;h/1:0", D).unwrap();
        assert_eq!(at, RoomKey { floor: 0, room: 1 });

        let room = model.room(0, 1).unwrap();
        assert!(room.connected);
        assert_eq!(room.ultra(0).unwrap().value, 87);
        assert!(!room.hall(1).unwrap().open);
    }

    #[test]
    fn test_missing_header_is_hard_failure() {
        let mut model = StateModel::default();
        assert_eq!(decode_room(&mut model, "cs:1;u/0:87", D), Err(DecodeError::MissingHeader));
        assert_eq!(decode_room(&mut model, "f/x/r/1/cs:1", D), Err(DecodeError::MissingHeader));
        assert_eq!(decode_room(&mut model, "", D), Err(DecodeError::Empty));
        assert!(matches!(decode_room(&mut model, "f/0/r/9/cs:1", D), Err(DecodeError::Model(_))));
        assert!(model.is_empty());
    }

    #[test]
    fn test_unknown_keys_and_bad_tokens_are_skipped() {
        let mut model = StateModel::default();
        decode_room(&mut model, "f/2/r/3/cs:1;tmp:22;u/0:999;u/1:5;h/0:true;h/9:1;garbage", D).unwrap();

        let room = model.room(2, 3).unwrap();
        assert!(room.connected);
        assert!(room.ultra(0).is_none());
        assert_eq!(room.ultra(1).unwrap().value, 5);
        assert!(room.hall(0).is_none());
        assert_eq!(room.halls().count(), 0);
    }

    #[test]
    fn test_header_without_value_creates_room() {
        let mut model = StateModel::default();
        decode_room(&mut model, "f/1/r/1;u/3:40", D).unwrap();
        assert_eq!(model.ultra(1, 1, 3).unwrap().value, 40);
    }

    #[test]
    fn test_optional_room_fields() {
        let mut model = StateModel::default();
        decode_room(&mut model, "f/1/r/2/cs:0;ts:1700000000;id:9", D).unwrap();
        let room = model.room(1, 2).unwrap();
        assert_eq!(room.last_update, Some(1_700_000_000));
        assert_eq!(room.id_byte, 9);
    }
}
