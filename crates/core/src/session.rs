//! Role-Play Session State Machine
//!
//! `RolePlaySession` owns the lifecycle of one role-play: the transcript, the
//! current phase, and the single current error. It performs no I/O. Callers
//! feed it UI operations and [`TransportEvent`]s in arrival order, and it
//! answers with the [`Effect`]s the runtime must carry out on the transport.
//!
//! ```text
//! idle -> connecting -> awaiting_reply <-> open -> closed
//!              \
//!               -> failed
//! ```
//!
//! The peer owns the first turn, so a freshly opened session starts out
//! waiting. Exactly one reply may be outstanding at a time.

use crate::protocol::{ClientRecord, ServerRecord};
use crate::scenario::ScenarioDescriptor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Connecting,
    Open,
    AwaitingReply,
    Closed,
    Failed,
}

impl SessionPhase {
    /// True while a transport is (or is about to be) held for this session.
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            SessionPhase::Connecting | SessionPhase::Open | SessionPhase::AwaitingReply
        )
    }

    fn is_connected(&self) -> bool {
        matches!(self, SessionPhase::Open | SessionPhase::AwaitingReply)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Connecting => "connecting",
            SessionPhase::Open => "open",
            SessionPhase::AwaitingReply => "awaiting_reply",
            SessionPhase::Closed => "closed",
            SessionPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    /// The local caller, e.g. the clinician in training.
    Primary,
    /// The remote peer portraying the persona.
    Counterpart,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speaker::Primary => write!(f, "primary"),
            Speaker::Counterpart => write!(f, "counterpart"),
        }
    }
}

/// One transcript entry. `id` increases monotonically within a session.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub id: u64,
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Read-only projection of a session for presentation code.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SessionView {
    pub phase: SessionPhase,
    pub transcript: Vec<ChatMessage>,
    pub connected: bool,
    pub connecting: bool,
    pub waiting: bool,
    pub error: Option<String>,
}

impl Default for SessionView {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Idle,
            transcript: Vec::new(),
            connected: false,
            connecting: false,
            waiting: false,
            error: None,
        }
    }
}

/// Inputs delivered by the transport, one at a time, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The handshake completed.
    Opened,
    /// A text frame from the peer, not yet decoded.
    Frame(String),
    /// Establishment failed or the transport broke.
    Fault(String),
    /// The transport closed or the stream ended.
    Closed,
}

/// Work the runtime must perform on behalf of the session.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    OpenTransport,
    Send(ClientRecord),
    CloseTransport,
}

pub struct RolePlaySession {
    role: String,
    phase: SessionPhase,
    scenario: Option<ScenarioDescriptor>,
    transcript: Vec<ChatMessage>,
    error: Option<String>,
    next_id: u64,
}

impl RolePlaySession {
    /// Creates an idle session; `role` is the caller's role tag sent at init.
    pub fn new(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            phase: SessionPhase::Idle,
            scenario: None,
            transcript: Vec::new(),
            error: None,
            next_id: 0,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_connected(&self) -> bool {
        self.phase.is_connected()
    }

    pub fn is_connecting(&self) -> bool {
        self.phase == SessionPhase::Connecting
    }

    pub fn is_waiting(&self) -> bool {
        self.phase == SessionPhase::AwaitingReply
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            phase: self.phase,
            transcript: self.transcript.clone(),
            connected: self.is_connected(),
            connecting: self.is_connecting(),
            waiting: self.is_waiting(),
            error: self.error.clone(),
        }
    }

    /// Starts a fresh session. A no-op while a session is already live.
    pub fn connect(&mut self, scenario: ScenarioDescriptor) -> Vec<Effect> {
        if self.phase.is_live() {
            debug!(phase = %self.phase, "Ignoring connect: session already live.");
            return vec![];
        }
        info!(topic = %scenario.topic, persona = %scenario.counterpart.style, "Connecting role-play session.");
        self.transcript.clear();
        self.next_id = 0;
        self.error = None;
        self.scenario = Some(scenario);
        self.phase = SessionPhase::Connecting;
        vec![Effect::OpenTransport]
    }

    /// Submits a caller turn. Ignored unless the session is open and not waiting.
    pub fn send_turn(&mut self, text: &str) -> Vec<Effect> {
        if self.phase != SessionPhase::Open {
            debug!(phase = %self.phase, "Ignoring turn: session is not accepting input.");
            return vec![];
        }
        if text.trim().is_empty() {
            debug!("Ignoring empty turn.");
            return vec![];
        }
        self.append(Speaker::Primary, text.to_string());
        self.phase = SessionPhase::AwaitingReply;
        vec![Effect::Send(ClientRecord::Message {
            text: text.to_string(),
        })]
    }

    /// Ends the session. Safe to call in any phase, any number of times.
    pub fn disconnect(&mut self) -> Vec<Effect> {
        if !self.phase.is_live() {
            return vec![];
        }
        info!(phase = %self.phase, "Disconnecting role-play session.");
        self.phase = SessionPhase::Closed;
        vec![Effect::CloseTransport]
    }

    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    /// Applies one transport event.
    pub fn handle(&mut self, event: TransportEvent) -> Vec<Effect> {
        match event {
            TransportEvent::Opened => self.on_opened(),
            TransportEvent::Frame(text) => self.on_frame(&text),
            TransportEvent::Fault(message) => {
                self.on_fault(message);
                vec![]
            }
            TransportEvent::Closed => {
                self.on_closed();
                vec![]
            }
        }
    }

    fn on_opened(&mut self) -> Vec<Effect> {
        if self.phase != SessionPhase::Connecting {
            warn!(phase = %self.phase, "Transport opened outside of connecting; closing it.");
            return vec![Effect::CloseTransport];
        }
        let Some(scenario) = self.scenario.clone() else {
            warn!("Transport opened without a scenario; closing it.");
            self.phase = SessionPhase::Closed;
            return vec![Effect::CloseTransport];
        };
        info!("Role-play transport open; sending init.");
        self.phase = SessionPhase::AwaitingReply;
        vec![Effect::Send(ClientRecord::Init {
            role: self.role.clone(),
            scenario,
        })]
    }

    fn on_frame(&mut self, text: &str) -> Vec<Effect> {
        if !self.phase.is_connected() {
            debug!(phase = %self.phase, "Dropping frame received while not connected.");
            return vec![];
        }
        let record = match ServerRecord::decode(text) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, payload = %text, "Dropping malformed record from counterpart.");
                return vec![];
            }
        };
        match record {
            ServerRecord::Connected => {
                info!("Counterpart acknowledged the connection.");
                vec![]
            }
            ServerRecord::Message { text } => {
                if self.phase != SessionPhase::AwaitingReply {
                    debug!("Counterpart message arrived with no turn outstanding; appending.");
                }
                self.append(Speaker::Counterpart, text);
                self.phase = SessionPhase::Open;
                vec![]
            }
            ServerRecord::Error { error } => {
                warn!(%error, "Counterpart reported an error.");
                self.error = Some(error);
                self.phase = SessionPhase::Open;
                vec![]
            }
            ServerRecord::End => {
                info!("Counterpart ended the session.");
                self.phase = SessionPhase::Closed;
                vec![Effect::CloseTransport]
            }
        }
    }

    fn on_fault(&mut self, message: String) {
        match self.phase {
            SessionPhase::Connecting => {
                warn!(error = %message, "Role-play transport failed to open.");
                self.error = Some(message);
                self.phase = SessionPhase::Failed;
            }
            SessionPhase::Open | SessionPhase::AwaitingReply => {
                warn!(error = %message, "Role-play transport fault.");
                self.error = Some(message);
                self.phase = SessionPhase::Open;
            }
            _ => debug!(phase = %self.phase, error = %message, "Ignoring fault on inactive session."),
        }
    }

    fn on_closed(&mut self) {
        match self.phase {
            SessionPhase::Connecting => {
                if self.error.is_none() {
                    self.error = Some("Connection closed before it was established".to_string());
                }
                self.phase = SessionPhase::Failed;
            }
            SessionPhase::Open | SessionPhase::AwaitingReply => {
                info!("Role-play transport closed.");
                self.phase = SessionPhase::Closed;
            }
            _ => {}
        }
    }

    fn append(&mut self, speaker: Speaker, text: String) {
        self.next_id += 1;
        self.transcript.push(ChatMessage {
            id: self.next_id,
            speaker,
            text,
            timestamp: Utc::now(),
        });
    }
}
