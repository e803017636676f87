//! Textual wire encodings of the state model
//!
//! - [`topic`]: one topic path plus one scalar payload (node and cloud variants)
//! - [`room`]: one room per message, flooded between floor nodes
//! - [`system`]: every floor in one message, published to the broker
//!
//! The accepted boolean literal set is an explicit argument of every decoder
//! entry point. [`TOPIC_LITERALS`] and [`COMPACT_LITERALS`] are the sets the
//! deployed firmware speaks.

pub mod room;
pub mod scalar;
pub mod system;
pub mod topic;

pub use room::{decode_room, encode_room, RoomKey};
pub use scalar::BoolLiterals;
pub use system::{decode_system, encode_floor, encode_system};
pub use topic::{encode_topics, floor_summary_topic, Header};

/// Boolean literals used by single-topic messages
pub const TOPIC_LITERALS: BoolLiterals = BoolLiterals::Words;

/// Boolean literals used by both compact string formats
pub const COMPACT_LITERALS: BoolLiterals = BoolLiterals::Digits;
