//! route-control: database-backed dynamic routing configuration.
//!
//! # Architecture Overview
//!
//! ```text
//!   operator ──▶ admin API ──▶ services ──▶ SQLite entity store
//!                                 │                 │
//!                                 │ on-demand       │ two read passes
//!                                 ▼                 ▼
//!   scheduler ─── tick ───▶ ConfigProvider ◀── SnapshotBuilder
//!                                 │
//!                                 │ get_config() / change token
//!                                 ▼
//!                           proxy engine
//! ```

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(name = "route-control", version)]
#[command(about = "Control plane serving hot-reloadable routing config from a database")]
struct Args {
    /// Settings file (TOML). Defaults apply when omitted.
    #[arg(short, long, env = "ROUTE_CONTROL_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    route_control::lifecycle::bootstrap(args.config.as_deref()).await?;
    Ok(())
}
