//! Terminal Front End for Role-Play Sessions
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Loading the patient record and building the scenario.
//! 3. Connecting a session client to the counterpart.
//! 4. Rendering the transcript and forwarding typed turns until the session ends.

use anyhow::Context;
use clap::Parser;
use mneme_core::{
    scenario::{PersonaStyle, build_scenario},
    session::{SessionPhase, SessionView, Speaker},
};
use mneme_roleplay::{
    client::SessionClient,
    config::Config,
    patient_source::{JsonFilePatientSource, PatientSource},
    transport::WsConnector,
};
use std::{path::PathBuf, sync::Arc};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

#[derive(Parser, Debug)]
#[command(version, about = "Interview a simulated patient or caregiver")]
struct Args {
    /// Directory of exported patient-detail JSON records.
    #[arg(long, default_value = "./patients")]
    patient_dir: PathBuf,
    #[arg(long)]
    patient_id: String,
    /// The presenting complaint the counterpart will portray.
    #[arg(long)]
    complaint: String,
    #[arg(long, default_value = "cooperative")]
    persona: PersonaStyle,
}

/// Listens for the `Ctrl+C` signal to end the session.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Received shutdown signal. Ending session...");
}

/// Tracks what has already been written to the terminal.
#[derive(Default)]
struct Renderer {
    printed: usize,
    shown_error: Option<String>,
}

impl Renderer {
    fn render(&mut self, view: &SessionView) {
        if view.transcript.len() < self.printed {
            self.printed = 0;
        }
        for message in &view.transcript[self.printed..] {
            let label = match message.speaker {
                Speaker::Primary => "you",
                Speaker::Counterpart => "counterpart",
            };
            println!("[{}] {}: {}", message.timestamp.format("%H:%M:%S"), label, message.text);
        }
        self.printed = view.transcript.len();

        if view.error != self.shown_error {
            if let Some(error) = &view.error {
                println!("! {} (type /dismiss to clear)", error);
            }
            self.shown_error = view.error.clone();
        }
    }
}

fn handle_input(client: &SessionClient, line: &str) {
    match line.trim() {
        "" => {}
        "/quit" => client.disconnect(),
        "/dismiss" => client.dismiss_error(),
        text => {
            let view = client.view();
            if view.waiting {
                println!("(waiting for the counterpart to reply)");
            } else if view.phase != SessionPhase::Open {
                println!("(session is {}; input ignored)", view.phase);
            } else {
                client.send_turn(text);
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    // --- 2. Build Scenario ---
    let source = JsonFilePatientSource::new(&args.patient_dir);
    let detail = source.load(&args.patient_id).await?;
    let scenario = build_scenario(&detail, &args.complaint, args.persona);
    info!(
        patient_id = %args.patient_id,
        persona = %args.persona,
        role = %config.role,
        "Scenario built. Connecting..."
    );
    println!("{}", scenario.description);

    // --- 3. Connect ---
    let connector = Arc::new(WsConnector::new(
        config.counterpart_url.clone(),
        config.api_key.clone(),
    ));
    let client = SessionClient::spawn(connector, config.role.clone());
    let mut updates = client.subscribe();
    client.connect(scenario);

    // --- 4. Interact ---
    let mut renderer = Renderer::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = shutdown_signal();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = updates.borrow_and_update().clone();
                renderer.render(&view);
                if matches!(view.phase, SessionPhase::Closed | SessionPhase::Failed) {
                    println!("Session {}.", view.phase);
                    break;
                }
            },
            line = lines.next_line() => match line? {
                Some(line) => handle_input(&client, &line),
                None => break,
            },
            _ = &mut ctrl_c => break,
        }
    }

    client.shutdown().await?;
    info!("Session client shut down.");
    Ok(())
}
