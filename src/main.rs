mod auth;
mod config;
mod db;
mod ipc;
mod logging;
mod report;

use anyhow::Context;
use serde_json::json;
use std::io::{self, BufRead, Write};
use std::path::Path;

use config::{Command, Config};

fn bootstrap(
    workspace: &Path,
    school: &str,
    admin_name: &str,
    admin_email: &str,
) -> anyhow::Result<()> {
    let mut conn = db::open_db(workspace)?;
    let created = ipc::bootstrap_school(&mut conn, school, admin_name, admin_email)?;
    tracing::info!(school_id = %created.school_id, "school bootstrapped");
    println!(
        "{}",
        json!({
            "schoolId": created.school_id,
            "userId": created.user_id,
            "token": created.token,
        })
    );
    Ok(())
}

fn serve(mut state: ipc::AppState) -> anyhow::Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = line.context("read request line")?;
        if line.trim().is_empty() {
            continue;
        }

        let resp = match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => ipc::handle_request(&mut state, req),
            Err(e) => {
                tracing::debug!(error = %e, "unparseable request line");
                ipc::err("", "bad_json", e.to_string(), None)
            }
        };
        writeln!(stdout, "{}", resp).context("write response")?;
        stdout.flush().context("flush response")?;
    }
    Ok(())
}

fn run(cfg: Config) -> anyhow::Result<()> {
    match cfg.command {
        Some(Command::Bootstrap {
            school,
            admin_name,
            admin_email,
        }) => {
            let workspace = cfg
                .workspace
                .context("bootstrap needs --workspace or SCHOOLD_WORKSPACE")?;
            bootstrap(&workspace, &school, &admin_name, &admin_email)
        }
        None => {
            let mut state = ipc::AppState::empty();
            if let Some(ws) = cfg.workspace {
                ipc::select_workspace(&mut state, ws)?;
            }
            serve(state)
        }
    }
}

fn main() {
    let cfg = Config::load();
    logging::init_logging(&cfg.log);

    if let Err(e) = run(cfg) {
        tracing::error!(error = %format!("{e:#}"), "schoold exiting");
        eprintln!("schoold: {e:#}");
        std::process::exit(1);
    }
}
