mod assign;
mod attendance;
mod config;
mod db;
mod error;
mod ipc;
mod logging;
mod report;
mod retry;
mod roster;
mod session;

use std::io::{self, BufRead, Write};
use tracing::{info, warn};

fn main() -> anyhow::Result<()> {
    let config = config::AppConfig::load().unwrap_or_else(|e| {
        eprintln!("attendanced: ignoring unreadable configuration: {e}");
        config::AppConfig::default()
    });
    logging::init_logger(&config.log_filter);

    let mut state = ipc::AppState::new(&config);
    if let Some(path) = config.workspace.as_deref() {
        if let Err(e) = ipc::select_workspace(&mut state, path) {
            warn!(workspace = %path.display(), error = %e, "configured workspace could not be opened");
        }
    }
    info!(version = env!("CARGO_PKG_VERSION"), "attendanced ready");

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
                // Can't reply without id.
                let _ = writeln!(
                    stdout,
                    "{}",
                    serde_json::json!({
                        "ok": false,
                        "error": { "code": "bad_json", "message": e.to_string() }
                    })
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
    info!("stdin closed, shutting down");
    Ok(())
}
