use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use robotlink::config::{self, Config};
use robotlink::console::{ConsoleCommand, Outcome, HELP};
use robotlink::link::{InboundMessage, LatencySample, LinkHandle, LinkStatus, RxDispatcher};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "robotlink", version, about = "Operator console for a UDP robot link")]
struct Cli {
    /// Config file (default: <config dir>/robotlink/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Robot address, overrides the config file
    #[arg(long)]
    host: Option<String>,

    /// Robot port, overrides the config file
    #[arg(long)]
    port: Option<u16>,

    /// Start without connecting
    #[arg(long)]
    no_connect: bool,

    /// Write a default config file if none exists, then exit
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(config::default_path);

    if cli.init_config {
        setup(&Config::default())?;
        if config::ensure_default_config(&config_path).await? {
            println!("Wrote {}", config_path.display());
        } else {
            println!("{} already exists", config_path.display());
        }
        return Ok(());
    }

    let mut config = Config::load(&config_path).await?;
    if let Some(host) = cli.host {
        config.link.host = host;
    }
    if let Some(port) = cli.port {
        config.link.port = port;
    }
    setup(&config)?;
    info!("Using config {}", config_path.display());

    let (inbound_tx, inbound_rx) = mpsc::channel(100);
    let (chart_tx, chart_rx) = mpsc::channel(16);
    let mut dispatcher = RxDispatcher::new();
    dispatcher.forward_all(inbound_tx);

    let (link, link_task) = LinkHandle::builder(config)
        .dispatcher(dispatcher)
        .chart(chart_tx)
        .spawn()?;

    tokio::spawn(print_inbound(inbound_rx));
    tokio::spawn(log_latency(chart_rx));
    tokio::spawn(log_status(link.subscribe()));

    if !cli.no_connect {
        if let Err(e) = link.connect_default().await {
            error!("Initial connect failed: {}", e);
        }
    }

    println!("{}", HELP);
    tokio::select! {
        result = run_console(&link) => result?,
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    link.shutdown()
        .await
        .map_err(|e| eyre!("Failed to stop link: {}", e))?;
    if let Err(e) = link_task.await {
        warn!("Link task ended abnormally: {}", e);
    }
    Ok(())
}

fn setup(config: &Config) -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    setup_logging(config);
    Ok(())
}

fn setup_logging(config: &Config) {
    let parsed = config.logging.level.parse::<Level>();
    let level = parsed.as_ref().copied().unwrap_or(Level::INFO);

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_file(true)
        .with_line_number(true);

    if config.logging.pretty {
        builder.pretty().init();
    } else {
        builder.init();
    }

    if let Err(e) = parsed {
        warn!("Log level {:?} not recognised ({}), using info", config.logging.level, e);
    }
}

async fn run_console(link: &LinkHandle) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let command = match ConsoleCommand::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };

        match command.execute(link).await {
            Ok(Outcome::Continue(Some(message))) => println!("{}", message),
            Ok(Outcome::Continue(None)) => {}
            Ok(Outcome::Quit) => break,
            Err(e) => println!("Error: {}", e),
        }
    }
    Ok(())
}

async fn print_inbound(mut inbound: mpsc::Receiver<InboundMessage>) {
    while let Some(message) = inbound.recv().await {
        match message {
            InboundMessage::Print(text) => println!("[robot] {}", text),
            InboundMessage::Dashboard(payload) => debug!("Dashboard bundle, {} bytes", payload.len()),
            InboundMessage::Status(payload) => debug!("Status frame, {} bytes", payload.len()),
            InboundMessage::Parameter(payload) => debug!("Parameter frame, {} bytes", payload.len()),
        }
    }
}

async fn log_latency(mut chart: mpsc::Receiver<LatencySample>) {
    while let Some(sample) = chart.recv().await {
        debug!(
            "Latency {} ms at {}",
            sample.latency_ms,
            sample.at.format("%H:%M:%S")
        );
    }
}

async fn log_status(mut status: watch::Receiver<LinkStatus>) {
    let mut last_state = status.borrow().state;
    while status.changed().await.is_ok() {
        let current = status.borrow_and_update().clone();
        if current.state != last_state {
            info!("Link {} -> {}", last_state, current.state);
            last_state = current.state;
        }
    }
}
