//! Mneme Role-Play Core
//!
//! Domain logic for interactive role-play sessions with a simulated patient
//! or caregiver: building the case brief from a patient record, the wire
//! records exchanged with the counterpart, and the session state machine.
//! Nothing in this crate performs I/O.

pub mod patient;
pub mod protocol;
pub mod scenario;
pub mod session;
