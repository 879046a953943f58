//! Capture sessions: the state machine, its validation rules, and the
//! in-memory stores the HTTP layer keeps them in.

pub mod clock;
pub mod controller;
pub mod registry;
pub mod status;
pub mod validation;
