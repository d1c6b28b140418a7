//! Mneme Role-Play Service Library Crate
//!
//! This library contains the runtime for interactive role-play sessions:
//! configuration, the transport to the remote counterpart, the session client
//! that drives the core state machine, and the patient-record source used to
//! build scenarios. The `roleplay` binary is a thin terminal front end.

pub mod client;
pub mod config;
pub mod patient_source;
pub mod transport;
