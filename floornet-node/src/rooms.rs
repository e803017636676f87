//! Simulated room sensor boards
//!
//! Each configured endpoint behaves like one room board: it answers a read
//! with a compact room line carrying a random ultrasonic distance and door
//! state, or occasionally with nothing. A board clocks out exactly the
//! requested number of bytes, NUL-padded past the end of its line.

use floornet_core::hal::SensorBus;
use rand::Rng;
use tracing::trace;

/// Probability a board has a fresh reading on a given poll
const READY_PROBABILITY: f64 = 0.2;

pub struct SimulatedRooms {
    floor: u8,
    endpoints: Vec<u8>,
}

impl SimulatedRooms {
    pub fn new(floor: u8, endpoints: &[u8]) -> Self {
        Self {
            floor,
            endpoints: endpoints.to_vec(),
        }
    }

    /// Room number a board reports: its slot in the endpoint table
    fn room_for(&self, endpoint: u8) -> Option<usize> {
        self.endpoints.iter().position(|e| *e == endpoint && endpoint != 0)
    }
}

impl SensorBus for SimulatedRooms {
    fn read_line(&mut self, endpoint: u8, request_len: usize, max_len: usize) -> Vec<u8> {
        let Some(room) = self.room_for(endpoint) else {
            return Vec::new();
        };
        let mut rng = rand::thread_rng();
        if !rng.gen_bool(READY_PROBABILITY) {
            return Vec::new();
        }

        let line = format!(
            "f/{}/r/{}/cs:1;u/0:{};h/0:{}",
            self.floor,
            room,
            rng.gen_range(20..=250u8),
            u8::from(rng.gen_bool(0.1))
        );
        trace!("Board 0x{:02X} -> {}", endpoint, line);

        let mut bytes = line.into_bytes();
        bytes.resize(request_len, 0);
        bytes.truncate(max_len);
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_target_configured_room() {
        let mut rooms = SimulatedRooms::new(2, &[0x21, 0x22, 0x23]);
        let mut seen = 0;
        for _ in 0..200 {
            let line = rooms.read_line(0x22, 64, 128);
            if line.is_empty() {
                continue;
            }
            seen += 1;
            assert_eq!(line.len(), 64);
            let text = String::from_utf8(line).unwrap();
            assert!(text.starts_with("f/2/r/1/cs:1;u/0:"), "{}", text);
            assert!(text.ends_with('\0'));
        }
        assert!(seen > 0);
    }

    #[test]
    fn test_unknown_endpoint_silent() {
        let mut rooms = SimulatedRooms::new(1, &[0x21]);
        assert!(rooms.read_line(0x40, 64, 128).is_empty());
        assert!(rooms.read_line(0, 64, 128).is_empty());
    }
}
