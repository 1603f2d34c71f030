//! Session logic for the punch-out trainer: combination generation, coaching
//! messages, welcome speech and per-session scoring.

pub mod coach;
pub mod error;
pub mod protocol;
pub mod punch;
pub mod session_state;
pub mod speech;

pub use error::{CollaboratorError, SynthesisError, TrainingError};
pub use protocol::Trainer;
