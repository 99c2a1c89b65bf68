//! Math tutor console client
//!
//! Talks to the tutoring backend's chat endpoint, keeps the mode-aware
//! conversation state locally and persists sessions and learner progress
//! in SQLite.

mod config;
mod console;
mod conversation;
mod coordinator;
mod db;
mod runtime;
mod transport;

use chrono::Utc;
use config::ClientConfig;
use console::{ConsoleInput, Printer};
use coordinator::{SessionCoordinator, Snapshot};
use db::Database;
use runtime::{
    Base64ImageOptimizer, CmarkRenderer, Command, DatabaseStore, SessionHandle, SessionRuntime,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transport::{
    HttpTransport, LoggingTransport, RequestEngine, StaticTokenProvider, TokenProvider,
};

const RECENT_SESSIONS: usize = 10;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so they stay out of the conversation
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mathtutor=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = ClientConfig::from_env()?;

    tracing::info!(path = %config.db_path.display(), "Opening database");
    let db = Database::open(&config.db_path)?;
    let store = DatabaseStore::new(db.clone());

    let tokens = config
        .token
        .clone()
        .map(|token| Arc::new(StaticTokenProvider::new(token)) as Arc<dyn TokenProvider>);
    let http = Arc::new(HttpTransport::new(
        config.api_url.clone(),
        config.health_url.clone(),
        tokens,
    )?);
    tracing::info!(api = %config.api_url, retries = config.max_retries, "Transport configured");

    let engine = RequestEngine::new(
        LoggingTransport::new(Arc::clone(&http)),
        config.retry_policy(),
        config.timeout_policy(),
    );
    let coordinator = SessionCoordinator::new(
        uuid::Uuid::new_v4().to_string(),
        Utc::now(),
        config.preferences(),
        Arc::new(CmarkRenderer),
    );
    let (runtime, handle) =
        SessionRuntime::new(coordinator, engine, store, Arc::new(Base64ImageOptimizer));
    let runtime_task = tokio::spawn(runtime.run());

    // Health probe runs alongside the console; its advisory shows up once
    let health_task = {
        let handle = handle.clone();
        tokio::spawn(async move {
            if let Some(advisory) = http.check_health().await.advisory() {
                tracing::warn!(advisory = %advisory, "Health probe failed");
                let _ = handle.execute(Command::Advisory(advisory)).await;
            }
        })
    };

    let printer_task = tokio::spawn(print_updates(handle.subscribe()));

    println!("Math tutor ready. Type /help for commands.");
    run_console(&handle, &db).await?;

    // The runtime stops once every handle is gone
    health_task.abort();
    let _ = health_task.await;
    drop(handle);
    let _ = runtime_task.await;
    printer_task.abort();
    Ok(())
}

async fn run_console(handle: &SessionHandle, db: &Database) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match console::parse_line(&line) {
            Ok(ConsoleInput::Quit) => break,
            Ok(ConsoleInput::Nothing) => {}
            Ok(ConsoleInput::Help) => println!("{}", console::HELP),
            Ok(ConsoleInput::Progress) => {
                println!("{}", console::describe_progress(&handle.snapshot()));
            }
            Ok(ConsoleInput::Sessions) => match db.list_sessions(RECENT_SESSIONS) {
                Ok(records) => println!("{}", console::describe_sessions(&records)),
                Err(e) => println!("error: {e}"),
            },
            Ok(ConsoleInput::Open(index)) => {
                let listed = db.list_sessions(RECENT_SESSIONS);
                match listed.as_ref().map(|records| records.get(index)) {
                    Ok(Some(record)) => {
                        let command = Command::OpenSession(record.id.clone());
                        match handle.execute(command).await {
                            Ok(()) => println!("Opened \"{}\".", record.title),
                            Err(e) => println!("error: {e}"),
                        }
                    }
                    Ok(None) => println!("No session {} (see /sessions).", index + 1),
                    Err(e) => println!("error: {e}"),
                }
            }
            Ok(ConsoleInput::Command(command)) => {
                let mode_switch = matches!(command, Command::SwitchMode(_));
                match handle.execute(command).await {
                    Ok(()) if mode_switch => {
                        let mode = handle.snapshot().mode;
                        println!("Mode: {mode} ({})", mode.description());
                    }
                    Ok(()) => {}
                    Err(e) => println!("error: {e}"),
                }
            }
            Err(e) => println!("{e}"),
        }
    }
    Ok(())
}

async fn print_updates(mut snapshots: watch::Receiver<Snapshot>) {
    // First publish carries the restored session
    if snapshots.changed().await.is_err() {
        return;
    }
    let mut printer = {
        let snapshot = snapshots.borrow_and_update();
        if !snapshot.messages.is_empty() {
            println!(
                "Resumed \"{}\" in {} mode ({} messages).",
                snapshot.title,
                snapshot.mode,
                snapshot.messages.len()
            );
        }
        Printer::caught_up(&snapshot)
    };

    while snapshots.changed().await.is_ok() {
        let snapshot = snapshots.borrow_and_update().clone();
        for line in printer.update(&snapshot) {
            println!("{line}");
        }
    }
}
