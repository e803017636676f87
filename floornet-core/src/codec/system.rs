//! Whole-system compact string
//!
//! ```text
//! <site>/<namespace>/f/0/cs:1;f/0/ts:100;/r/0/cs:1;u/0:87;h/0:1;f/1/cs:0
//! ```
//!
//! Tokens are walked left to right with a selection cursor:
//! - `f/<id>...` selects a floor and clears the selected room
//! - `/r/<id>...` selects a room on the current floor
//! - bare `key:value` applies to the selected room, else the selected floor
//!
//! Selection only resets at message start. Decoding is all-or-nothing: the
//! message is staged into updates and applied only if every token is valid.

use super::room::{room_key_update, RoomKey};
use super::scalar::{parse_byte, parse_id, parse_timestamp, BoolLiterals};
use crate::error::DecodeError;
use crate::model::{StateModel, Update};
use crate::types::CloudNamespace;
use tracing::trace;

fn floor_tokens(model: &StateModel, floor: u8, literals: BoolLiterals, out: &mut Vec<String>) {
    let Some(f) = model.floor(floor) else {
        return;
    };

    out.push(format!("f/{}/cs:{}", floor, literals.format(f.connected)));
    if f.id_byte != 0 {
        out.push(format!("f/{}/id:{}", floor, f.id_byte));
    }
    if let Some(rssi) = f.signal_strength {
        out.push(format!("f/{}/rsi:{}", floor, rssi));
    }
    if let Some(ts) = f.last_update {
        out.push(format!("f/{}/ts:{}", floor, ts));
    }

    for (room, r) in f.rooms() {
        out.push(format!("/r/{}/cs:{}", room, literals.format(r.connected)));
        if r.id_byte != 0 {
            out.push(format!("/r/{}/id:{}", room, r.id_byte));
        }
        if let Some(ts) = r.last_update {
            out.push(format!("/r/{}/ts:{}", room, ts));
        }
        for (id, u) in r.ultras() {
            out.push(format!("u/{}:{}", id, u.value));
        }
        for (id, h) in r.halls() {
            out.push(format!("h/{}:{}", id, literals.format(h.open)));
        }
    }
}

/// Encode every present floor, ascending by id
pub fn encode_system(model: &StateModel, ns: &CloudNamespace, literals: BoolLiterals) -> String {
    let mut tokens = Vec::new();
    for (floor, _) in model.floors() {
        floor_tokens(model, floor, literals, &mut tokens);
    }
    format!("{}{}", ns.prefix(), tokens.join(";"))
}

/// Encode a single floor in the whole-system grammar. `None` if the floor
/// is not present.
pub fn encode_floor(model: &StateModel, ns: &CloudNamespace, floor: u8, literals: BoolLiterals) -> Option<String> {
    model.floor(floor)?;
    let mut tokens = Vec::new();
    floor_tokens(model, floor, literals, &mut tokens);
    Some(format!("{}{}", ns.prefix(), tokens.join(";")))
}

fn floor_key_update(floor: u8, key: &[&str], value: &str, literals: BoolLiterals) -> Result<Option<Update>, DecodeError> {
    let update = match *key {
        ["cs"] => Update::FloorConnected { floor, connected: literals.parse(value)? },
        ["id"] => Update::FloorIdByte { floor, value: parse_byte(value)? },
        ["rsi"] => Update::FloorSignal { floor, rssi: parse_byte(value)? },
        ["ts"] => Update::FloorTimestamp { floor, ts: parse_timestamp(value)? },
        _ => return Ok(None),
    };
    Ok(Some(update))
}

/// Selection cursor for the token walk
#[derive(Debug, Default)]
struct Cursor {
    floor: Option<u8>,
    room: Option<u8>,
}

impl Cursor {
    fn select_floor(&mut self, id: &str, staged: &mut Vec<Update>) -> Result<u8, DecodeError> {
        let floor = parse_id(id)?;
        self.floor = Some(floor);
        self.room = None;
        staged.push(Update::Floor { floor });
        Ok(floor)
    }

    fn select_room(&mut self, id: &str, token: &str, staged: &mut Vec<Update>) -> Result<RoomKey, DecodeError> {
        let floor = self
            .floor
            .ok_or_else(|| DecodeError::NoFloorSelected(token.to_string()))?;
        let room = parse_id(id)?;
        self.room = Some(room);
        staged.push(Update::Room { floor, room });
        Ok(RoomKey { floor, room })
    }
}

fn stage(update: Option<Update>, key: &str, staged: &mut Vec<Update>) {
    match update {
        Some(u) => staged.push(u),
        None => trace!("System string: unknown key '{}' ignored", key),
    }
}

/// Walk the tokens of a prefix-stripped message into staged updates
fn stage_tokens(rest: &str, literals: BoolLiterals) -> Result<Vec<Update>, DecodeError> {
    let mut cursor = Cursor::default();
    let mut staged = Vec::new();

    for token in rest.split(';') {
        if token.is_empty() {
            continue;
        }
        let (key, value) = token
            .split_once(':')
            .ok_or_else(|| DecodeError::MalformedToken(token.to_string()))?;

        let absolute = key.strip_prefix('/').filter(|k| k.starts_with("f/")).unwrap_or(key);

        if absolute.starts_with("f/") {
            let segments: Vec<&str> = absolute.split('/').collect();
            let floor = match segments.as_slice() {
                ["f", id, ..] => cursor.select_floor(id, &mut staged)?,
                _ => return Err(DecodeError::MalformedToken(token.to_string())),
            };
            match &segments[2..] {
                [] => {}
                ["r", id, more @ ..] => {
                    let at = cursor.select_room(id, token, &mut staged)?;
                    if !more.is_empty() {
                        stage(room_key_update(at, more, value, literals)?, key, &mut staged);
                    }
                }
                more => stage(floor_key_update(floor, more, value, literals)?, key, &mut staged),
            }
        } else if let Some(relative) = key.strip_prefix("/r/") {
            let segments: Vec<&str> = relative.split('/').collect();
            let at = cursor.select_room(segments[0], token, &mut staged)?;
            if segments.len() > 1 {
                stage(room_key_update(at, &segments[1..], value, literals)?, key, &mut staged);
            }
        } else {
            let segments: Vec<&str> = key.split('/').collect();
            let floor = cursor
                .floor
                .ok_or_else(|| DecodeError::NoFloorSelected(token.to_string()))?;

            let update = match (cursor.room, segments.as_slice()) {
                (_, ["rsi"]) => floor_key_update(floor, &segments, value, literals)?,
                (Some(room), _) => room_key_update(RoomKey { floor, room }, &segments, value, literals)?,
                (None, ["u", ..]) | (None, ["h", ..]) => {
                    return Err(DecodeError::NoRoomSelected(token.to_string()))
                }
                (None, _) => floor_key_update(floor, &segments, value, literals)?,
            };
            stage(update, key, &mut staged);
        }
    }

    Ok(staged)
}

/// Decode a whole-system compact string into the model.
///
/// The message must start with the cloud prefix. Any malformed token, bad
/// value or out-of-range id rejects the whole message and leaves the model
/// untouched.
pub fn decode_system(
    model: &mut StateModel,
    message: &str,
    ns: &CloudNamespace,
    literals: BoolLiterals,
) -> Result<(), DecodeError> {
    if message.is_empty() {
        return Err(DecodeError::Empty);
    }
    let prefix = ns.prefix();
    let rest = message.strip_prefix(prefix.as_str()).ok_or(DecodeError::BadPrefix)?;

    let staged = stage_tokens(rest, literals)?;
    model.apply_all(&staged)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const D: BoolLiterals = BoolLiterals::Digits;

    fn ns() -> CloudNamespace {
        CloudNamespace::default()
    }

    #[test]
    fn test_decode_reference_message() {
        let mut model = StateModel::default();
        decode_system(
            &mut model,
            "ELEC520/security/f/0/cs:1;f/0/ts:100;/r/0/cs:1;u/0:87;h/0:1;f/1/cs:0",
            &ns(),
            D,
        )
        .unwrap();

        let f0 = model.floor(0).unwrap();
        assert!(f0.connected);
        assert_eq!(f0.last_update, Some(100));
        let r0 = model.room(0, 0).unwrap();
        assert!(r0.connected);
        assert_eq!(r0.ultra(0).unwrap().value, 87);
        assert!(r0.hall(0).unwrap().open);

        let f1 = model.floor(1).unwrap();
        assert!(!f1.connected);
        assert_eq!(f1.rooms().count(), 0);
    }

    #[test]
    fn test_floor_token_resets_room_selection() {
        let mut model = StateModel::default();
        decode_system(&mut model, "ELEC520/security/f/0/cs:0;/r/2/cs:0;f/1/cs:0;cs:1", &ns(), D).unwrap();

        assert!(model.floor(1).unwrap().connected);
        assert!(!model.room(0, 2).unwrap().connected);
        assert!(model.room(1, 2).is_none());
    }

    #[test]
    fn test_bare_cs_targets_room_when_selected() {
        let mut model = StateModel::default();
        decode_system(&mut model, "ELEC520/security/f/3/cs:0;cs:1;/r/4/cs:0;cs:1", &ns(), D).unwrap();

        assert!(model.floor(3).unwrap().connected);
        assert!(model.room(3, 4).unwrap().connected);
    }

    #[test]
    fn test_structural_errors_reject_whole_message() {
        let cases = [
            "ELEC520/security//r/0/cs:1",
            "ELEC520/security/f/0/cs:1;u/0:5",
            "ELEC520/security/f/0/cs:1;/r/0/cs:1;u/0:300",
            "ELEC520/security/f/0/cs:1;novalue",
            "ELEC520/security/f/0/cs:true",
            "ELEC520/security/f/0/cs:1;f/8/cs:1",
            "other/security/f/0/cs:1",
        ];
        for case in cases {
            let mut model = StateModel::default();
            assert!(decode_system(&mut model, case, &ns(), D).is_err(), "{}", case);
            assert!(model.is_empty(), "{}", case);
        }
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let mut model = StateModel::default();
        decode_system(&mut model, "ELEC520/security/f/0/cs:1;f/0/temp:20;/r/1/cs:1;lux:9", &ns(), D).unwrap();
        assert!(model.room(0, 1).unwrap().connected);
    }

    #[test]
    fn test_legacy_absolute_floor_token() {
        let mut model = StateModel::default();
        decode_system(&mut model, "ELEC520/security/f/1/cs:1;/r/0/u/2:40;/f/2/id:5", &ns(), D).unwrap();
        assert_eq!(model.ultra(1, 0, 2).unwrap().value, 40);
        assert_eq!(model.floor(2).unwrap().id_byte, 5);
    }

    #[test]
    fn test_encode_system_layout() {
        let mut model = StateModel::default();
        model.set_floor_connected(0, true).unwrap();
        model.set_floor_timestamp(0, 100).unwrap();
        model.set_room_connected(0, 0, true).unwrap();
        model.set_ultra_value(0, 0, 0, 87).unwrap();
        model.set_hall_open(0, 0, 0, true).unwrap();
        model.add_floor(1).unwrap();

        assert_eq!(
            encode_system(&model, &ns(), D),
            "ELEC520/security/f/0/cs:1;f/0/ts:100;/r/0/cs:1;u/0:87;h/0:1;f/1/cs:0"
        );
    }

    #[test]
    fn test_encode_floor_scoped() {
        let mut model = StateModel::default();
        model.set_floor_signal(2, 180).unwrap();
        model.add_room(4, 0).unwrap();

        assert_eq!(
            encode_floor(&model, &ns(), 2, D).unwrap(),
            "ELEC520/security/f/2/cs:0;f/2/rsi:180"
        );
        assert_eq!(encode_floor(&model, &ns(), 3, D), None);
    }

    #[test]
    fn test_empty_model_roundtrip() {
        let model = StateModel::default();
        let encoded = encode_system(&model, &ns(), D);
        assert_eq!(encoded, "ELEC520/security/");

        let mut decoded = StateModel::default();
        decode_system(&mut decoded, &encoded, &ns(), D).unwrap();
        assert_eq!(decoded, model);
    }
}
