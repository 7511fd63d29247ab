//! tonegate host - runs one detection session without a UI.
//!
//! Stands in for the application shell: answers the permission prompt from
//! the command line, plays a detector script, resolves every delivered tone
//! to its action, and prints the final session status as JSON.

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tonegate_detect::{DetectorScript, ScriptedDetector};
use tonegate_events::{resolve_action, ActionTarget, ActionTemplates, TracingNoticeSink};
use tonegate_permission::{Capability, PermissionPrompter};
use tonegate_router::{ChannelListener, EventRouter, SequencedEvent};
use tonegate_session::{
    default_config_path, Collaborators, SessionConfig, SessionController, SessionHandle,
};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

/// Run a tone detection session against a scripted detector
#[derive(Parser, Debug)]
#[command(name = "tonegate-host")]
#[command(about = "Run a tone detection session against a scripted detector", long_about = None)]
struct Args {
    /// Detector script (JSON)
    #[arg(value_name = "SCRIPT")]
    script: PathBuf,

    /// Session config file; defaults to the user config directory
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Answer the permission prompt with a denial
    #[arg(long)]
    deny: bool,

    /// Tear the session down after this many milliseconds
    #[arg(long, value_name = "MS")]
    duration_ms: Option<u64>,
}

/// Answers every prompt immediately, the way a user tapping through would.
struct CommandLinePrompter {
    grant: bool,
    session: OnceLock<SessionHandle>,
}

impl PermissionPrompter for CommandLinePrompter {
    fn request(&self, request_code: i32, capability: &Capability) {
        tracing::info!(
            request_code,
            capability = %capability.name,
            grant = self.grant,
            "answering permission prompt"
        );
        match self.session.get() {
            Some(session) => {
                let granted = vec![self.grant; capability.expected_grants()];
                session.on_permission_result(request_code, granted);
            }
            None => tracing::warn!("prompt raised before session attached"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tonegate=debug")),
        )
        .init();

    let args = Args::parse();

    let config_path = args.config.unwrap_or_else(default_config_path);
    let config = SessionConfig::load_or_default(&config_path)?;
    let script = DetectorScript::load(&args.script)
        .with_context(|| format!("failed to load detector script {}", args.script.display()))?;

    let run_for = args
        .duration_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| script_duration(&script));

    tracing::info!(
        script = %args.script.display(),
        tones = script.tones.len(),
        ?run_for,
        "starting tonegate host"
    );

    let router = Arc::new(EventRouter::with_config(config.router_config()));
    let (listener, tones) = ChannelListener::new();
    let prompter = Arc::new(CommandLinePrompter {
        grant: !args.deny,
        session: OnceLock::new(),
    });

    let templates = config.actions.clone();
    let (controller, session) = SessionController::new(
        config,
        router,
        Collaborators {
            prompter: prompter.clone(),
            service: Arc::new(ScriptedDetector::new(script)),
            listener,
            notices: Arc::new(TracingNoticeSink),
        },
    );
    let _ = prompter.session.set(session.clone());

    let consumer = tokio::spawn(consume_tones(tones, templates));
    let controller = tokio::spawn(controller.run());

    session.on_session_ready();

    tokio::select! {
        _ = tokio::time::sleep(run_for) => {}
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for ctrl-c")?;
            tracing::info!("interrupted");
        }
    }

    session.on_session_teardown();
    let status = controller.await.context("session task panicked")?;
    let handled = consumer.await.context("tone consumer panicked")?;

    tracing::info!(handled, "tonegate host finished");
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

/// Resolve and log every routed tone until the listener goes away.
async fn consume_tones(
    mut tones: mpsc::UnboundedReceiver<SequencedEvent>,
    templates: ActionTemplates,
) -> usize {
    let mut handled = 0;
    while let Some(tone) = tones.recv().await {
        handled += 1;
        match resolve_action(&tone.event, &templates) {
            Some(ActionTarget::ShowImage(url)) => {
                tracing::info!(seq = tone.seq, %url, "show image");
            }
            Some(ActionTarget::OpenUrl(uri)) => {
                tracing::info!(seq = tone.seq, %uri, "open");
            }
            None => {
                tracing::warn!(
                    seq = tone.seq,
                    action = %tone.event.action_type,
                    "no handler for tone action"
                );
            }
        }
    }
    handled
}

/// Long enough for the whole script to play, plus some slack.
fn script_duration(script: &DetectorScript) -> Duration {
    let tones = script.tones.len() as u64;
    let ms = script
        .interval_ms
        .saturating_mul(tones)
        .saturating_add(script.start_delay_ms)
        .saturating_add(500);
    Duration::from_millis(ms)
}
