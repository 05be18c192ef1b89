use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod analyst;
mod app;
mod chart;
mod config;
mod dataset;
mod error;
mod handler;
mod render;
mod session;
mod store;
mod tui;
mod ui;

use analyst::AnalystClient;
use app::App;
use config::Config;
use dataset::DatasetFile;
use error::SessionError;
use session::Session;

#[derive(Parser)]
#[command(name = "analyst")]
#[command(about = "Chat with an autonomous data analyst about your datasets")]
#[command(version)]
struct Cli {
    /// Analyst backend base URL
    #[arg(long, env = "ANALYST_API_URL", global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat (default)
    Chat {
        /// Dataset to preselect
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Write every chart reply as JSON into this directory
        #[arg(long)]
        chart_dir: Option<PathBuf>,
    },
    /// Upload a dataset and exit
    Upload {
        /// Dataset file (csv, xlsx, xls, json, pdf)
        file: PathBuf,
    },
    /// Ask a single question and print the reply
    Ask {
        /// Your question
        question: String,
        /// Upload this dataset before asking
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Write the chart, if any, to this JSON file
        #[arg(long)]
        save_chart: Option<PathBuf>,
    },
    /// Show or change the saved configuration
    Config {
        /// Persist a new backend URL
        #[arg(long = "set-api-url")]
        set_api_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // A broken config file should not keep the client from starting
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Ignoring unreadable config: {e}");
        Config::new()
    });
    let api_url = config.resolve_api_url(cli.api_url.as_deref());

    match cli.command.unwrap_or(Commands::Chat { file: None, chart_dir: None }) {
        Commands::Chat { file, chart_dir } => {
            init_file_logging(&config)?;
            run_chat(&api_url, file, chart_dir).await
        }
        Commands::Upload { file } => {
            init_stderr_logging(&config);
            upload_once(&api_url, file).await
        }
        Commands::Ask { question, file, save_chart } => {
            init_stderr_logging(&config);
            ask_once(&api_url, &question, file, save_chart).await
        }
        Commands::Config { set_api_url } => show_or_set_config(&config, &api_url, set_api_url),
    }
}

fn env_filter(config: &Config) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_filter()))
}

fn init_stderr_logging(config: &Config) {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(config))
        .with_writer(std::io::stderr)
        .init();
}

/// The terminal owns stderr while the TUI runs, so logs go to a file
fn init_file_logging(config: &Config) -> Result<()> {
    let log_path = Config::get_log_path()?;
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let log_file = File::options()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("opening log file {}", log_path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(config))
        .with_writer(Mutex::new(log_file))
        .with_ansi(false)
        .init();
    Ok(())
}

async fn run_chat(api_url: &str, file: Option<PathBuf>, chart_dir: Option<PathBuf>) -> Result<()> {
    let transport = Arc::new(AnalystClient::new(api_url));
    tracing::info!(api_url = transport.base_url(), "starting chat session");

    let mut app = App::new(transport, api_url).with_chart_dir(chart_dir);
    if let Some(path) = file {
        app.select_file(&path.to_string_lossy());
    }

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = tui::EventHandler::new();

    let result = async {
        while !app.should_quit {
            terminal.draw(|frame| ui::render(&mut app, frame))?;

            let Some(event) = events.next().await else {
                break;
            };
            handler::handle_event(&mut app, event);
            app.poll_tasks().await;
        }
        anyhow::Ok(())
    }
    .await;

    tui::restore()?;
    if app.has_running_tasks() {
        tracing::info!(
            pending = app.session.in_flight(),
            "quitting with requests still in flight"
        );
    }
    tracing::info!(messages = app.session.messages().len(), "chat session ended");
    result
}

async fn upload_once(api_url: &str, path: PathBuf) -> Result<()> {
    let client = AnalystClient::new(api_url);
    let mut session = Session::new();
    session.select_file(DatasetFile::new(path));

    let result = session.upload(&client).await;
    println!("{}", session.upload_status());
    result.context("upload failed")
}

async fn ask_once(
    api_url: &str,
    question: &str,
    file: Option<PathBuf>,
    save_chart: Option<PathBuf>,
) -> Result<()> {
    let client = AnalystClient::new(api_url);
    let mut session = Session::new();

    if let Some(path) = file {
        session.select_file(DatasetFile::new(path));
        let result = session.upload(&client).await;
        eprintln!("{}", session.upload_status());
        if let Err(SessionError::Transport(e)) = result {
            anyhow::bail!("upload failed: {e}");
        }
    }

    if !session.ask(&client, question).await {
        anyhow::bail!("question is empty");
    }

    let reply = session.last_message().context("no reply recorded")?;
    println!("{}", reply.text());

    if let Some(chart) = reply.chart() {
        let title = chart.title().unwrap_or_else(|| "Chart".to_string());
        eprintln!("\n{title}");
        for trace in chart.traces() {
            let name = trace.name.map(|n| format!(" \"{n}\"")).unwrap_or_default();
            eprintln!("  {}{} · {} points", trace.kind, name, trace.points);
        }
        if let Some(path) = save_chart {
            chart.save(&path)?;
            eprintln!("Chart saved to {}", path.display());
        }
    }

    Ok(())
}

fn show_or_set_config(config: &Config, api_url: &str, set_api_url: Option<String>) -> Result<()> {
    if let Some(url) = set_api_url {
        let path = Config::save_api_url(&url)?;
        println!("Saved api_url = {url} to {}", path.display());
        return Ok(());
    }

    println!("config file: {}", Config::get_config_path()?.display());
    println!("api_url:     {api_url}");
    println!("log filter:  {}", config.log_filter());
    println!("log file:    {}", Config::get_log_path()?.display());
    Ok(())
}
