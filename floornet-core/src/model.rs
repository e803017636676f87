//! Hierarchical state model: system → floors → rooms → sensors
//!
//! Storage is a sparse, capacity-bounded array at each level. An id is used
//! directly as the slot index, so ids outside `[0, capacity)` are rejected
//! with [`ModelError::CapacityExceeded`]. Writing to a descendant creates any
//! missing ancestors first; creating a present entity is a no-op.
//!
//! Every id is range-checked before anything is created, so a failing call
//! never leaves a half-built ancestor chain behind.

use crate::error::{Level, ModelError};
use crate::types::{Capacity, UnixSeconds};
use serde::Serialize;

// ============================================================================
// System-level scalars
// ============================================================================

/// Alarm arming state (one byte on the wire)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ArmState {
    #[default]
    Disarmed,
    Armed,
    Alarm,
    Other,
}

impl ArmState {
    /// Bytes past the known states collapse into `Other`
    pub fn from_byte(v: u8) -> Self {
        match v {
            0 => ArmState::Disarmed,
            1 => ArmState::Armed,
            2 => ArmState::Alarm,
            _ => ArmState::Other,
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            ArmState::Disarmed => 0,
            ArmState::Armed => 1,
            ArmState::Alarm => 2,
            ArmState::Other => 3,
        }
    }
}

/// Last keypad outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum KeypadState {
    #[default]
    NoInput,
    Accepted,
    Declined,
}

impl KeypadState {
    pub fn from_byte(v: u8) -> Option<Self> {
        match v {
            0 => Some(KeypadState::NoInput),
            1 => Some(KeypadState::Accepted),
            2 => Some(KeypadState::Declined),
            _ => None,
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            KeypadState::NoInput => 0,
            KeypadState::Accepted => 1,
            KeypadState::Declined => 2,
        }
    }
}

/// Deployment-wide state
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SystemState {
    pub arm_state: ArmState,
    pub keypad_state: KeypadState,
    pub network_state: u8,
    /// Opaque identity string, e.g. `"24:6F:28:01:02:03"`
    pub controller_address: String,
}

// ============================================================================
// Hierarchy
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct UltraSensor {
    pub value: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct HallSensor {
    pub open: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Room {
    pub connected: bool,
    pub id_byte: u8,
    pub last_update: Option<UnixSeconds>,
    ultra: Vec<Option<UltraSensor>>,
    hall: Vec<Option<HallSensor>>,
}

impl Room {
    fn new(sensors: usize) -> Self {
        Self {
            connected: false,
            id_byte: 0,
            last_update: None,
            ultra: vec![None; sensors],
            hall: vec![None; sensors],
        }
    }

    pub fn ultra(&self, id: u8) -> Option<&UltraSensor> {
        self.ultra.get(id as usize).and_then(Option::as_ref)
    }

    pub fn hall(&self, id: u8) -> Option<&HallSensor> {
        self.hall.get(id as usize).and_then(Option::as_ref)
    }

    /// Present ultrasonic sensors in ascending id order
    pub fn ultras(&self) -> impl Iterator<Item = (u8, &UltraSensor)> {
        present(&self.ultra)
    }

    /// Present hall sensors in ascending id order
    pub fn halls(&self) -> impl Iterator<Item = (u8, &HallSensor)> {
        present(&self.hall)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Floor {
    pub connected: bool,
    pub id_byte: u8,
    pub signal_strength: Option<u8>,
    pub last_update: Option<UnixSeconds>,
    rooms: Vec<Option<Room>>,
}

impl Floor {
    fn new(rooms: usize) -> Self {
        Self {
            connected: false,
            id_byte: 0,
            signal_strength: None,
            last_update: None,
            rooms: vec![None; rooms],
        }
    }

    pub fn room(&self, id: u8) -> Option<&Room> {
        self.rooms.get(id as usize).and_then(Option::as_ref)
    }

    /// Present rooms in ascending id order
    pub fn rooms(&self) -> impl Iterator<Item = (u8, &Room)> {
        present(&self.rooms)
    }
}

fn present<T>(slots: &[Option<T>]) -> impl Iterator<Item = (u8, &T)> {
    slots
        .iter()
        .enumerate()
        .filter_map(|(i, slot)| slot.as_ref().map(|v| (i as u8, v)))
}

// ============================================================================
// Updates
// ============================================================================

/// A single scalar write (or bare presence) against the model.
///
/// Decoders produce these and apply them only once a whole message has been
/// validated; encoders produce them from the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    ArmState(ArmState),
    Keypad(KeypadState),
    Network(u8),
    ControllerAddress(String),
    Floor { floor: u8 },
    FloorConnected { floor: u8, connected: bool },
    FloorIdByte { floor: u8, value: u8 },
    FloorSignal { floor: u8, rssi: u8 },
    FloorTimestamp { floor: u8, ts: UnixSeconds },
    Room { floor: u8, room: u8 },
    RoomConnected { floor: u8, room: u8, connected: bool },
    RoomIdByte { floor: u8, room: u8, value: u8 },
    RoomTimestamp { floor: u8, room: u8, ts: UnixSeconds },
    Ultra { floor: u8, room: u8, sensor: u8, value: u8 },
    Hall { floor: u8, room: u8, sensor: u8, open: bool },
}

// ============================================================================
// State Model
// ============================================================================

/// The node's in-memory view of the building
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateModel {
    #[serde(skip)]
    capacity: Capacity,
    system: SystemState,
    floors: Vec<Option<Floor>>,
}

impl Default for StateModel {
    fn default() -> Self {
        Self::new(Capacity::default())
    }
}

impl StateModel {
    pub fn new(capacity: Capacity) -> Self {
        Self {
            capacity,
            system: SystemState::default(),
            floors: vec![None; capacity.floors],
        }
    }

    pub fn capacity(&self) -> Capacity {
        self.capacity
    }

    /// Restore every entity to not-present and every scalar to its default
    pub fn reset(&mut self) {
        *self = Self::new(self.capacity);
    }

    pub fn system(&self) -> &SystemState {
        &self.system
    }

    pub fn floor(&self, id: u8) -> Option<&Floor> {
        self.floors.get(id as usize).and_then(Option::as_ref)
    }

    pub fn room(&self, floor: u8, room: u8) -> Option<&Room> {
        self.floor(floor).and_then(|f| f.room(room))
    }

    pub fn ultra(&self, floor: u8, room: u8, sensor: u8) -> Option<&UltraSensor> {
        self.room(floor, room).and_then(|r| r.ultra(sensor))
    }

    pub fn hall(&self, floor: u8, room: u8, sensor: u8) -> Option<&HallSensor> {
        self.room(floor, room).and_then(|r| r.hall(sensor))
    }

    /// Present floors in ascending id order
    pub fn floors(&self) -> impl Iterator<Item = (u8, &Floor)> {
        present(&self.floors)
    }

    pub fn is_empty(&self) -> bool {
        self.floors().next().is_none()
    }

    // ------------------------------------------------------------------------
    // Range checks
    // ------------------------------------------------------------------------

    fn check(level: Level, id: u8, capacity: usize) -> Result<(), ModelError> {
        if (id as usize) < capacity {
            Ok(())
        } else {
            Err(ModelError::CapacityExceeded { level, id, capacity })
        }
    }

    fn check_floor(&self, floor: u8) -> Result<(), ModelError> {
        Self::check(Level::Floor, floor, self.capacity.floors)
    }

    fn check_room(&self, floor: u8, room: u8) -> Result<(), ModelError> {
        self.check_floor(floor)?;
        Self::check(Level::Room, room, self.capacity.rooms)
    }

    fn check_sensor(&self, floor: u8, room: u8, level: Level, sensor: u8) -> Result<(), ModelError> {
        self.check_room(floor, room)?;
        Self::check(level, sensor, self.capacity.sensors)
    }

    /// Range-check every id an update touches, without writing anything
    pub fn validate(&self, update: &Update) -> Result<(), ModelError> {
        match *update {
            Update::ArmState(_)
            | Update::Keypad(_)
            | Update::Network(_)
            | Update::ControllerAddress(_) => Ok(()),
            Update::Floor { floor }
            | Update::FloorConnected { floor, .. }
            | Update::FloorIdByte { floor, .. }
            | Update::FloorSignal { floor, .. }
            | Update::FloorTimestamp { floor, .. } => self.check_floor(floor),
            Update::Room { floor, room }
            | Update::RoomConnected { floor, room, .. }
            | Update::RoomIdByte { floor, room, .. }
            | Update::RoomTimestamp { floor, room, .. } => self.check_room(floor, room),
            Update::Ultra { floor, room, sensor, .. } => {
                self.check_sensor(floor, room, Level::Ultra, sensor)
            }
            Update::Hall { floor, room, sensor, .. } => {
                self.check_sensor(floor, room, Level::Hall, sensor)
            }
        }
    }

    // ------------------------------------------------------------------------
    // Auto-creating accessors (callers have already range-checked)
    // ------------------------------------------------------------------------

    fn floor_entry(&mut self, floor: u8) -> &mut Floor {
        let rooms = self.capacity.rooms;
        self.floors[floor as usize].get_or_insert_with(|| Floor::new(rooms))
    }

    fn room_entry(&mut self, floor: u8, room: u8) -> &mut Room {
        let sensors = self.capacity.sensors;
        self.floor_entry(floor).rooms[room as usize].get_or_insert_with(|| Room::new(sensors))
    }

    fn ultra_entry(&mut self, floor: u8, room: u8, sensor: u8) -> &mut UltraSensor {
        self.room_entry(floor, room).ultra[sensor as usize].get_or_insert_with(Default::default)
    }

    fn hall_entry(&mut self, floor: u8, room: u8, sensor: u8) -> &mut HallSensor {
        self.room_entry(floor, room).hall[sensor as usize].get_or_insert_with(Default::default)
    }

    // ------------------------------------------------------------------------
    // Add (idempotent)
    // ------------------------------------------------------------------------

    pub fn add_floor(&mut self, floor: u8) -> Result<(), ModelError> {
        self.check_floor(floor)?;
        self.floor_entry(floor);
        Ok(())
    }

    pub fn add_room(&mut self, floor: u8, room: u8) -> Result<(), ModelError> {
        self.check_room(floor, room)?;
        self.room_entry(floor, room);
        Ok(())
    }

    pub fn add_ultra(&mut self, floor: u8, room: u8, sensor: u8) -> Result<(), ModelError> {
        self.check_sensor(floor, room, Level::Ultra, sensor)?;
        self.ultra_entry(floor, room, sensor);
        Ok(())
    }

    pub fn add_hall(&mut self, floor: u8, room: u8, sensor: u8) -> Result<(), ModelError> {
        self.check_sensor(floor, room, Level::Hall, sensor)?;
        self.hall_entry(floor, room, sensor);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Setters
    // ------------------------------------------------------------------------

    pub fn set_arm_state(&mut self, state: ArmState) {
        self.system.arm_state = state;
    }

    pub fn set_keypad_state(&mut self, state: KeypadState) {
        self.system.keypad_state = state;
    }

    pub fn set_network_state(&mut self, state: u8) {
        self.system.network_state = state;
    }

    pub fn set_controller_address(&mut self, address: impl Into<String>) {
        self.system.controller_address = address.into();
    }

    pub fn set_floor_connected(&mut self, floor: u8, connected: bool) -> Result<(), ModelError> {
        self.check_floor(floor)?;
        self.floor_entry(floor).connected = connected;
        Ok(())
    }

    pub fn set_floor_id_byte(&mut self, floor: u8, value: u8) -> Result<(), ModelError> {
        self.check_floor(floor)?;
        self.floor_entry(floor).id_byte = value;
        Ok(())
    }

    pub fn set_floor_signal(&mut self, floor: u8, rssi: u8) -> Result<(), ModelError> {
        self.check_floor(floor)?;
        self.floor_entry(floor).signal_strength = Some(rssi);
        Ok(())
    }

    pub fn set_floor_timestamp(&mut self, floor: u8, ts: UnixSeconds) -> Result<(), ModelError> {
        self.check_floor(floor)?;
        self.floor_entry(floor).last_update = Some(ts);
        Ok(())
    }

    pub fn set_room_connected(&mut self, floor: u8, room: u8, connected: bool) -> Result<(), ModelError> {
        self.check_room(floor, room)?;
        self.room_entry(floor, room).connected = connected;
        Ok(())
    }

    pub fn set_room_id_byte(&mut self, floor: u8, room: u8, value: u8) -> Result<(), ModelError> {
        self.check_room(floor, room)?;
        self.room_entry(floor, room).id_byte = value;
        Ok(())
    }

    pub fn set_room_timestamp(&mut self, floor: u8, room: u8, ts: UnixSeconds) -> Result<(), ModelError> {
        self.check_room(floor, room)?;
        self.room_entry(floor, room).last_update = Some(ts);
        Ok(())
    }

    pub fn set_ultra_value(&mut self, floor: u8, room: u8, sensor: u8, value: u8) -> Result<(), ModelError> {
        self.check_sensor(floor, room, Level::Ultra, sensor)?;
        self.ultra_entry(floor, room, sensor).value = value;
        Ok(())
    }

    pub fn set_hall_open(&mut self, floor: u8, room: u8, sensor: u8, open: bool) -> Result<(), ModelError> {
        self.check_sensor(floor, room, Level::Hall, sensor)?;
        self.hall_entry(floor, room, sensor).open = open;
        Ok(())
    }

    /// Apply one update through the matching setter
    pub fn apply(&mut self, update: &Update) -> Result<(), ModelError> {
        match update {
            Update::ArmState(s) => {
                self.set_arm_state(*s);
                Ok(())
            }
            Update::Keypad(k) => {
                self.set_keypad_state(*k);
                Ok(())
            }
            Update::Network(n) => {
                self.set_network_state(*n);
                Ok(())
            }
            Update::ControllerAddress(mac) => {
                self.set_controller_address(mac.clone());
                Ok(())
            }
            Update::Floor { floor } => self.add_floor(*floor),
            Update::FloorConnected { floor, connected } => self.set_floor_connected(*floor, *connected),
            Update::FloorIdByte { floor, value } => self.set_floor_id_byte(*floor, *value),
            Update::FloorSignal { floor, rssi } => self.set_floor_signal(*floor, *rssi),
            Update::FloorTimestamp { floor, ts } => self.set_floor_timestamp(*floor, *ts),
            Update::Room { floor, room } => self.add_room(*floor, *room),
            Update::RoomConnected { floor, room, connected } => {
                self.set_room_connected(*floor, *room, *connected)
            }
            Update::RoomIdByte { floor, room, value } => self.set_room_id_byte(*floor, *room, *value),
            Update::RoomTimestamp { floor, room, ts } => self.set_room_timestamp(*floor, *room, *ts),
            Update::Ultra { floor, room, sensor, value } => {
                self.set_ultra_value(*floor, *room, *sensor, *value)
            }
            Update::Hall { floor, room, sensor, open } => self.set_hall_open(*floor, *room, *sensor, *open),
        }
    }

    /// Validate every update, then apply them in order. Nothing is written
    /// unless all of them are in range.
    pub fn apply_all(&mut self, updates: &[Update]) -> Result<(), ModelError> {
        for update in updates {
            self.validate(update)?;
        }
        for update in updates {
            self.apply(update)?;
        }
        Ok(())
    }
}
