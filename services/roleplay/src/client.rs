//! Role-Play Session Client
//!
//! `SessionClient` is the owned-connection runtime around
//! [`RolePlaySession`]. It spawns one driver task that holds the session and
//! at most one transport. UI operations are queued to the driver and never
//! block; results are observed through the [`SessionView`] watch channel.
//!
//! The driver consumes commands, connect completions, and inbound frames as a
//! single ordered stream, so no two handlers ever run concurrently. Dropping
//! the client stops the driver, which closes any live transport first.

use crate::transport::{Connector, Transport};
use anyhow::{Context, Result};
use mneme_core::{
    scenario::ScenarioDescriptor,
    session::{Effect, RolePlaySession, SessionView, TransportEvent},
};
use std::{collections::VecDeque, future::Future, pin::Pin, sync::Arc};
use tokio::{
    sync::{mpsc, watch},
    task::{JoinHandle, JoinSet},
};
use tracing::{Instrument, debug, error, info, warn};
use uuid::Uuid;

type PendingConnect = Pin<Box<dyn Future<Output = Result<Box<dyn Transport>>> + Send>>;

#[derive(Debug)]
enum Command {
    Connect(ScenarioDescriptor),
    SendTurn(String),
    Disconnect,
    DismissError,
}

/// One unit of input to the driver.
enum Step {
    Command(Command),
    Connected(Result<Box<dyn Transport>>),
    Inbound(Option<Result<String>>),
}

/// Handle to a running role-play session.
pub struct SessionClient {
    session_id: Uuid,
    commands: mpsc::UnboundedSender<Command>,
    view: watch::Receiver<SessionView>,
    driver: JoinHandle<()>,
}

impl SessionClient {
    /// Spawns the session driver. Must be called from within a Tokio runtime.
    pub fn spawn(connector: Arc<dyn Connector>, role: impl Into<String>) -> Self {
        let session_id = Uuid::new_v4();
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (view_tx, view) = watch::channel(SessionView::default());

        let driver = Driver {
            session: RolePlaySession::new(role),
            connector,
            transport: None,
            pending_connect: None,
            closing: JoinSet::new(),
            view_tx,
        };
        let span = tracing::info_span!("roleplay_session", %session_id);
        let driver = tokio::spawn(driver.run(command_rx).instrument(span));

        Self {
            session_id,
            commands,
            view,
            driver,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn connect(&self, scenario: ScenarioDescriptor) {
        self.submit(Command::Connect(scenario));
    }

    pub fn send_turn(&self, text: impl Into<String>) {
        self.submit(Command::SendTurn(text.into()));
    }

    pub fn disconnect(&self) {
        self.submit(Command::Disconnect);
    }

    pub fn dismiss_error(&self) {
        self.submit(Command::DismissError);
    }

    /// Snapshot of the current session state.
    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }

    /// A receiver that is notified after every state transition.
    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    /// Disconnects and waits for the driver to release the transport.
    pub async fn shutdown(self) -> Result<()> {
        let SessionClient {
            commands, driver, ..
        } = self;
        let _ = commands.send(Command::Disconnect);
        drop(commands);
        driver.await.context("Session driver task failed")?;
        Ok(())
    }

    fn submit(&self, command: Command) {
        if let Err(e) = self.commands.send(command) {
            warn!(session_id = %self.session_id, command = ?e.0, "Session driver has stopped; dropping command.");
        }
    }
}

struct Driver {
    session: RolePlaySession,
    connector: Arc<dyn Connector>,
    transport: Option<Box<dyn Transport>>,
    pending_connect: Option<PendingConnect>,
    /// Transports being closed; awaited before the driver exits.
    closing: JoinSet<()>,
    view_tx: watch::Sender<SessionView>,
}

impl Driver {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        info!("Role-play session driver started.");
        loop {
            let step = tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => Step::Command(command),
                    None => break,
                },
                result = finish_connect(&mut self.pending_connect) => Step::Connected(result),
                inbound = next_inbound(&mut self.transport) => Step::Inbound(inbound),
            };
            self.step(step).await;
            self.publish();
        }

        // The owning handle is gone: never leave a transport open behind it.
        let effects = self.session.disconnect();
        self.apply(effects).await;
        self.pending_connect = None;
        self.release_transport();
        self.publish();
        while self.closing.join_next().await.is_some() {}
        info!("Role-play session driver stopped.");
    }

    async fn step(&mut self, step: Step) {
        let effects = match step {
            Step::Command(Command::Connect(scenario)) => self.session.connect(scenario),
            Step::Command(Command::SendTurn(text)) => self.session.send_turn(&text),
            Step::Command(Command::Disconnect) => self.session.disconnect(),
            Step::Command(Command::DismissError) => {
                self.session.dismiss_error();
                vec![]
            }
            Step::Connected(Ok(transport)) => {
                self.pending_connect = None;
                self.transport = Some(transport);
                self.session.handle(TransportEvent::Opened)
            }
            Step::Connected(Err(e)) => {
                self.pending_connect = None;
                self.session.handle(TransportEvent::Fault(format!("{:#}", e)))
            }
            Step::Inbound(Some(Ok(text))) => self.session.handle(TransportEvent::Frame(text)),
            Step::Inbound(Some(Err(e))) => {
                error!(error = ?e, "Error receiving from counterpart.");
                self.release_transport();
                let mut effects = self.session.handle(TransportEvent::Fault(e.to_string()));
                effects.extend(self.session.handle(TransportEvent::Closed));
                effects
            }
            Step::Inbound(None) => {
                info!("Counterpart closed the connection.");
                self.transport = None;
                self.session.handle(TransportEvent::Closed)
            }
        };
        self.apply(effects).await;
    }

    async fn apply(&mut self, effects: Vec<Effect>) {
        let mut queue = VecDeque::from(effects);
        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::OpenTransport => {
                    let connector = self.connector.clone();
                    self.pending_connect = Some(Box::pin(async move { connector.connect().await }));
                }
                Effect::Send(record) => {
                    let Some(transport) = self.transport.as_mut() else {
                        warn!(?record, "No transport to send on; dropping record.");
                        continue;
                    };
                    let sent = match record.encode() {
                        Ok(text) => transport.send(text).await,
                        Err(e) => Err(e.into()),
                    };
                    if let Err(e) = sent {
                        error!(error = ?e, "Failed to send record to counterpart.");
                        self.release_transport();
                        queue.extend(self.session.handle(TransportEvent::Fault(e.to_string())));
                        queue.extend(self.session.handle(TransportEvent::Closed));
                    }
                }
                Effect::CloseTransport => {
                    self.pending_connect = None;
                    self.release_transport();
                }
            }
        }
    }

    /// Hands the transport to a close task so the driver keeps serving
    /// commands while the peer acknowledges the close.
    fn release_transport(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            self.closing.spawn(
                async move {
                    if let Err(e) = transport.close().await {
                        debug!(error = %e, "Transport reported an error while closing.");
                    }
                }
                .in_current_span(),
            );
        }
    }

    fn publish(&self) {
        self.view_tx.send_replace(self.session.view());
    }
}

async fn finish_connect(pending: &mut Option<PendingConnect>) -> Result<Box<dyn Transport>> {
    match pending {
        Some(connect) => connect.await,
        None => std::future::pending().await,
    }
}

async fn next_inbound(transport: &mut Option<Box<dyn Transport>>) -> Option<Result<String>> {
    match transport {
        Some(transport) => transport.recv().await,
        None => std::future::pending().await,
    }
}
