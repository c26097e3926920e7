//! chartsync - headless dashboard coordination engine
//!
//! Runs a configured set of chart widgets against a metrics server,
//! keeping their time viewports and refresh cycles synchronized.

use anyhow::Result;
use chartsync::config::{ConfigManager, WidgetConfig};
use chartsync::dashboard::Dashboard;
use chartsync::widget::DisplayState;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

/// chartsync dashboard engine CLI
#[derive(Parser)]
#[command(name = "chartsync")]
#[command(about = "Multi-chart dashboard coordination engine")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the refresher loop over the configured widgets until Ctrl-C
    Run {
        /// Replay from a snapshot file instead of fetching
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },

    /// Write a default configuration file
    Init {
        /// Target configuration file path
        #[arg(default_value = "chartsync.toml")]
        path: PathBuf,
    },

    /// Show the effective configuration
    Config,

    /// Fetch and render one chart once, then print it
    Show {
        /// Chart id, e.g. system.cpu
        chart: String,

        /// Window start in seconds (<= 0 is relative to before)
        #[arg(long, default_value_t = -600)]
        after: i64,

        /// Window end in seconds (<= 0 is relative to now)
        #[arg(long, default_value_t = 0)]
        before: i64,

        /// Rendering library
        #[arg(long, default_value = "table")]
        library: String,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.log_level.as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };
    tracing_subscriber::fmt().with_max_level(log_level).init();

    let config_manager = ConfigManager::new(cli.config)
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    match cli.command {
        Some(Commands::Run { snapshot }) => run(config_manager, snapshot).await,
        Some(Commands::Init { path }) => init(path),
        Some(Commands::Config) => {
            let text = toml::to_string_pretty(config_manager.config())
                .map_err(|e| anyhow::anyhow!("Failed to serialize config: {}", e))?;
            println!("{}", text);
            Ok(())
        }
        Some(Commands::Show { chart, after, before, library }) => {
            show(config_manager, chart, after, before, library).await
        }
        Some(Commands::Version) => {
            println!("chartsync v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        None => run(config_manager, None).await,
    }
}

async fn run(config_manager: ConfigManager, snapshot: Option<PathBuf>) -> Result<()> {
    let dashboard = Dashboard::new(config_manager.config().clone())
        .map_err(|e| anyhow::anyhow!("Failed to build dashboard: {}", e))?;
    dashboard.init().await?;
    if let Some(path) = snapshot {
        dashboard.load_snapshot(&path).await?;
    }

    let widgets = dashboard.widgets().await;
    if widgets.is_empty() {
        anyhow::bail!("No widgets configured; add [[widgets]] entries or run `chartsync init`");
    }
    info!(widgets = widgets.len(), "dashboard started");

    tokio::select! {
        _ = dashboard.run() => {}
        result = tokio::signal::ctrl_c() => {
            result.map_err(|e| anyhow::anyhow!("Failed to listen for Ctrl-C: {}", e))?;
            info!("shutting down");
            dashboard.shutdown();
        }
    }
    Ok(())
}

fn init(path: PathBuf) -> Result<()> {
    if path.exists() {
        anyhow::bail!("{} already exists", path.display());
    }
    let mut config = chartsync::DashboardConfig::default();
    config.widgets.push(WidgetConfig {
        id: "cpu".to_string(),
        chart: "system.cpu".to_string(),
        library: "table".to_string(),
        ..WidgetConfig::default()
    });
    let text = toml::to_string_pretty(&config)
        .map_err(|e| anyhow::anyhow!("Failed to serialize config: {}", e))?;
    std::fs::write(&path, text)?;
    println!("Wrote {}", path.display());
    Ok(())
}

async fn show(
    config_manager: ConfigManager,
    chart: String,
    after: i64,
    before: i64,
    library: String,
) -> Result<()> {
    let dashboard = Dashboard::new(config_manager.config().clone())
        .map_err(|e| anyhow::anyhow!("Failed to build dashboard: {}", e))?;
    let widget = dashboard
        .create_widget(WidgetConfig {
            chart: chart.clone(),
            library,
            after,
            before,
            ..WidgetConfig::default()
        })
        .await;

    widget.update_chart().await;
    match widget.display().await {
        DisplayState::Rendered => {
            if let Some(frame) = widget.frame().await {
                for line in &frame.lines {
                    println!("{}", line);
                }
            }
            if let Some(legend) = widget.legend().await {
                let labels: Vec<&str> = legend.labels();
                println!("-- {} [{}]: {}", legend.title, legend.units, labels.join(", "));
            }
            Ok(())
        }
        DisplayState::Empty => {
            println!("{}: no data in the requested window", chart);
            Ok(())
        }
        DisplayState::Failed(message) => anyhow::bail!("{}: {}", chart, message),
        DisplayState::Loading => anyhow::bail!("{}: update did not complete", chart),
    }
}
