mod blocks;
mod config;
mod db;
mod error;
mod guard;
mod hours;
mod ipc;
mod lessons;
mod logging;
mod paging;
mod periods;
mod roster;
mod scope;
mod settings;

use std::io::{self, BufRead, Write};
use tracing::{error, info};

fn main() {
    let cfg = config::DaemonConfig::from_env();
    logging::init(&cfg.log_filter);

    let mut state = ipc::AppState {
        workspace: None,
        db: None,
        db_file: cfg.db_file.clone(),
    };
    if let Some(path) = &cfg.workspace {
        // A bad startup workspace leaves the daemon usable via workspace.select.
        if let Err(e) = ipc::select_workspace(&mut state, path) {
            error!(workspace = %path.display(), "failed to open startup workspace: {e:?}");
        }
    }
    info!(version = env!("CARGO_PKG_VERSION"), "timetabled ready");

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
                // No id to echo back.
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{resp}");
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
    info!("stdin closed, exiting");
}
