use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create a school and its first admin user, then print an admin token
    Bootstrap {
        /// Display name of the school
        #[arg(long)]
        school: String,
        /// Name of the first admin user
        #[arg(long)]
        admin_name: String,
        /// Email of the first admin user (unique within the school)
        #[arg(long)]
        admin_email: String,
    },
}

#[derive(Parser, Debug, Clone)]
#[command(name = "schoold")]
#[command(about = "School records and term report card daemon (line-delimited JSON over stdio)")]
#[command(version)]
pub struct Config {
    /// Workspace directory holding school.sqlite3; selected before the first request
    #[arg(short, long, global = true, env = "SCHOOLD_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// tracing filter directive for stderr logs
    #[arg(long, global = true, env = "SCHOOLD_LOG", default_value = "schoold=info")]
    pub log: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Config {
    pub fn load() -> Self {
        Self::parse()
    }
}
