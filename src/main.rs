mod error;
mod grades;
mod grading;
mod ipc;
mod roster;
mod shapes;
mod store;
mod templates;

use std::io::{self, BufRead, Write};
use std::path::Path;

use serde_json::json;
use tracing_subscriber::EnvFilter;

fn main() {
    // Logs go to stderr; stdout is the protocol channel.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("--migrate-roster") => {
            let Some(workspace) = args.get(1) else {
                eprintln!("usage: beurteilungd --migrate-roster <workspace>");
                std::process::exit(2);
            };
            match run_roster_migration(Path::new(workspace)) {
                Ok(outcome) => println!("{}", outcome),
                Err(e) => {
                    eprintln!("migration failed: {e:#}");
                    std::process::exit(1);
                }
            }
        }
        Some(other) => {
            eprintln!("unknown argument: {other}");
            std::process::exit(2);
        }
        None => serve(),
    }
}

/// The one-shot CLI form of the legacy roster migration. The same
/// procedure also runs at every workspace.select, so this exists for
/// operators who want to migrate without starting a client.
fn run_roster_migration(workspace: &Path) -> anyhow::Result<serde_json::Value> {
    let store = store::SqliteStore::open(workspace)?;
    let outcome = roster::migrate_legacy_roster(&store)?;
    Ok(match outcome {
        roster::MigrationOutcome::AlreadyCurrent => {
            json!({ "status": "noop", "reason": "students collection already exists" })
        }
        roster::MigrationOutcome::NothingToMigrate => {
            json!({ "status": "noop", "reason": "no legacy roster found" })
        }
        roster::MigrationOutcome::Migrated(n) => {
            json!({ "status": "migrated", "students": n })
        }
    })
}

fn serve() {
    let mut state = ipc::AppState::new();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply with an id we never parsed.
                let _ = writeln!(
                    stdout,
                    "{{\"ok\":false,\"error\":{{\"code\":\"bad_json\",\"message\":\"{}\"}}}}",
                    e
                );
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
}
