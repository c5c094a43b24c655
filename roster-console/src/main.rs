//! roster-console: open a user record for editing and watch who else
//! has it open.
//!
//! ```text
//! roster-console alice 42 --url ws://127.0.0.1:8080
//! ```
//!
//! Commands on stdin: `clear` hides the notice, `status` prints the
//! connection state, `quit` (or Ctrl-C / EOF) leaves edit mode.

mod presence;

use std::sync::Arc;

use clap::Parser;
use log::{error, info};
use tokio::io::{AsyncBufReadExt, BufReader};

use presence::TerminalNotice;
use roster_collab::config::ENV_URL;
use roster_collab::{
    ClientConfig, ConfigError, ConnectionEvent, ConnectionManager, EditingSession, PresenceCoordinator,
    RecordId, Session,
};

#[derive(Parser, Debug)]
#[command(name = "roster-console")]
#[command(about = "Edit a user record with live presence from the collaboration server")]
struct Args {
    /// Name announced to other editors
    user: String,

    /// Record to open
    record_id: RecordId,

    /// Collaboration endpoint (overrides ROSTER_WS_URL)
    #[arg(long)]
    url: Option<String>,

    /// Text in front of the other editors' names
    #[arg(long, default_value = roster_collab::DEFAULT_NOTICE_PREFIX)]
    notice_prefix: String,
}

/// Environment configuration with `--url` taking the place of
/// `ROSTER_WS_URL` before anything is validated.
fn load_config(
    url: Option<String>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<ClientConfig, ConfigError> {
    ClientConfig::from_lookup(|key| match (&url, key) {
        (Some(url), ENV_URL) => Some(url.clone()),
        _ => lookup(key),
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let config = load_config(args.url, |key| std::env::var(key).ok())?;
    info!("Starting roster console against {}", config.url);

    let session = Session::new();
    session.login(args.user);

    let (manager, mut events) = ConnectionManager::init(config);
    let manager = Arc::new(manager);
    let notice = Arc::new(TerminalNotice::new());
    let coordinator = PresenceCoordinator::for_manager(
        manager.clone(),
        Arc::new(session.clone()),
        notice.clone(),
    )
    .with_notice_prefix(args.notice_prefix);

    manager.connect();

    let mut editing: Option<EditingSession> = None;
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(ConnectionEvent::Opened) => {
                    println!("[status] connected");
                    // Announce once, on the first successful open.
                    if editing.is_none() {
                        editing = Some(coordinator.begin_editing_with(args.record_id, |users| {
                            log::debug!("Remote editors now {users:?}");
                        }));
                    }
                }
                Some(ConnectionEvent::Closed) => println!("[status] offline"),
                Some(ConnectionEvent::ReconnectScheduled { attempt, delay }) => {
                    println!("[status] reconnecting in {delay:?} (attempt {})", attempt + 1);
                }
                Some(ConnectionEvent::ReconnectExhausted) => {
                    error!("Could not reach {}", manager.url());
                    println!("[status] gave up reconnecting; type `connect` to retry");
                }
                None => break,
            },
            line = stdin.next_line() => match line?.as_deref().map(str::trim) {
                Some("clear") => {
                    if let Some(editing) = &editing {
                        editing.clear_notification();
                    }
                }
                Some("status") => {
                    let stats = manager.stats();
                    println!(
                        "[status] {} ({} opens, {} sent, {} received, {} dropped)",
                        manager.state().label(),
                        stats.opens,
                        stats.frames_sent,
                        stats.frames_received,
                        stats.frames_dropped,
                    );
                    if let Some(text) = notice.current() {
                        println!("[notice] {text}");
                    }
                }
                Some("connect") => manager.connect(),
                Some("quit") | None => break,
                Some("") => {}
                Some(other) => println!("unknown command {other:?} (clear, status, connect, quit)"),
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    if let Some(mut editing) = editing.take() {
        editing.close();
    }
    session.logout();
    manager.teardown();
    // Let the close frame go out before the runtime stops.
    let _ = tokio::time::timeout(std::time::Duration::from_millis(500), async {
        while events.recv().await.is_some() {}
    })
    .await;

    info!("Roster console stopped");
    Ok(())
}
