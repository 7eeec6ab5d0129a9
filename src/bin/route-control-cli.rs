use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "route-control-cli")]
#[command(about = "Management CLI for the route-control admin API", long_about = None)]
struct Cli {
    #[arg(short, long, env = "ROUTE_CONTROL_ADMIN_URL", default_value = "http://127.0.0.1:8081")]
    url: String,

    /// Recorded as the actor on writes.
    #[arg(short, long)]
    actor: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show revision, counts and the last refresh failure
    Status,
    /// Print the live routing snapshot
    Config,
    /// Force a rebuild of the routing snapshot
    Refresh,
    /// Inspect or deactivate clusters
    Clusters {
        #[command(subcommand)]
        action: Option<EntityAction>,
    },
    /// Inspect or deactivate routes
    Routes {
        #[command(subcommand)]
        action: Option<EntityAction>,
    },
}

#[derive(Subcommand)]
enum EntityAction {
    /// List one page
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 10)]
        size: u32,
    },
    /// Show one entity by id
    Get { id: String },
    /// Soft-delete one entity by id
    Delete { id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let request = match cli.command {
        Commands::Status => client.get(format!("{base}/admin/status")),
        Commands::Config => client.get(format!("{base}/admin/config")),
        Commands::Refresh => client.post(format!("{base}/admin/config/refresh")),
        Commands::Clusters { action } => entity_request(&client, base, "clusters", action),
        Commands::Routes { action } => entity_request(&client, base, "routes", action),
    };

    let request = match &cli.actor {
        Some(actor) => request.header("x-actor", actor),
        None => request,
    };

    let res = request.send().await.context("admin API unreachable")?;
    print_response(res).await
}

fn entity_request(
    client: &reqwest::Client,
    base: &str,
    collection: &str,
    action: Option<EntityAction>,
) -> reqwest::RequestBuilder {
    match action.unwrap_or(EntityAction::List { page: 1, size: 10 }) {
        EntityAction::List { page, size } => client
            .get(format!("{base}/admin/{collection}"))
            .query(&[("page_number", page), ("page_size", size)]),
        EntityAction::Get { id } => client.get(format!("{base}/admin/{collection}/{id}")),
        EntityAction::Delete { id } => client.delete(format!("{base}/admin/{collection}/{id}")),
    }
}

async fn print_response(res: reqwest::Response) -> anyhow::Result<()> {
    let status = res.status();
    let refresh = res
        .headers()
        .get("x-config-refresh")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let text = res.text().await?;

    if !status.is_success() {
        eprintln!("Response: {text}");
        bail!("admin API returned status {status}");
    }

    if !text.is_empty() {
        let json: Value = serde_json::from_str(&text)?;
        println!("{}", serde_json::to_string_pretty(&json)?);
    }
    if let Some(refresh) = refresh {
        eprintln!("config refresh: {refresh}");
    }
    Ok(())
}
