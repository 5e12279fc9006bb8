use adpulse_server::app;
use adpulse_server::config::ServerConfig;
use adpulse_server::seed;
use adpulse_server::state::AppState;
use anyhow::Result;
use std::net::SocketAddr;
use tokio::signal;
use tracing_subscriber::EnvFilter;

#[allow(clippy::print_stderr)]
fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  adpulse-server [config.toml]                             Start the server");
    eprintln!("  adpulse-server init-campaigns <config.toml> <seed.json>  Enable monitoring for seeded campaigns");
    eprintln!("  adpulse-server evaluate <config.toml> <campaign_id>      Evaluate a campaign once and print JSON");
}

#[tokio::main]
async fn main() -> Result<()> {
    adpulse_common::id::init(1, 1);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("adpulse=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("init-campaigns") => {
            let (config_path, seed_path) = two_args(&args, "init-campaigns", "<seed.json>")?;
            run_init_campaigns(config_path, seed_path)
        }
        Some("evaluate") => {
            let (config_path, campaign_id) = two_args(&args, "evaluate", "<campaign_id>")?;
            run_evaluate(config_path, campaign_id).await
        }
        Some("--help" | "-h") => {
            print_usage();
            Ok(())
        }
        _ => {
            let config_path = args
                .get(1)
                .map(|s| s.as_str())
                .unwrap_or("config/server.toml");
            run_server(config_path).await
        }
    }
}

fn two_args<'a>(args: &'a [String], command: &str, second: &str) -> Result<(&'a str, &'a str)> {
    match (args.get(2), args.get(3)) {
        (Some(a), Some(b)) => Ok((a.as_str(), b.as_str())),
        _ => {
            print_usage();
            anyhow::bail!("{command} requires <config.toml> and {second} arguments")
        }
    }
}

fn run_init_campaigns(config_path: &str, seed_path: &str) -> Result<()> {
    let config = ServerConfig::load(config_path)?;
    let state = AppState::open(config)?;
    let seed_file = seed::load_seed_file(seed_path)?;

    let report = seed::init_campaigns(&state.store, &seed_file)?;
    tracing::info!(
        campaigns = report.campaigns_upserted,
        skipped = report.campaigns_skipped,
        monitors_created = report.monitors_created,
        "Campaign seeding finished"
    );
    Ok(())
}

#[allow(clippy::print_stdout)]
async fn run_evaluate(config_path: &str, campaign_id: &str) -> Result<()> {
    let config = ServerConfig::load(config_path)?;
    let state = AppState::open(config)?;

    let campaign = state
        .store
        .get_campaign(campaign_id)?
        .ok_or_else(|| anyhow::anyhow!("campaign '{campaign_id}' not found"))?;
    let monitors = state.store.list_monitors(campaign_id)?;

    let result = state.engine.evaluate_all(&campaign, &monitors);
    println!("{}", serde_json::to_string_pretty(&result)?);

    // let in-flight insight generation finish before the runtime shuts down
    if !result.new_alarms.is_empty() {
        let wait = std::time::Duration::from_secs(state.config.engine.insight_timeout_secs);
        tokio::time::sleep(wait.min(std::time::Duration::from_secs(5))).await;
    }
    Ok(())
}

async fn run_server(config_path: &str) -> Result<()> {
    let config = ServerConfig::load(config_path)?;

    tracing::info!(
        http_port = config.http_port,
        data_dir = %config.data_dir,
        insights = %config.insights.provider,
        "adpulse-server starting"
    );

    let http_addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    let state = AppState::open(config)?;
    let app = app::build_http_app(state);

    let listener = tokio::net::TcpListener::bind(http_addr).await?;
    tracing::info!(addr = %http_addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            signal::ctrl_c().await.ok();
            tracing::info!("Shutting down gracefully");
        })
        .await?;
    Ok(())
}
