use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::{LevelFilter, info};
use std::fs;
use std::str::FromStr;

mod cli;

use cli::Cli;
use cli::commands::{ClientCommands, Commands};
use diskmon::client::render;
use diskmon::client::DiskHealthClient;
use diskmon::config::Config;
use diskmon::executor::DiskExecutor;
use diskmon::tools::ToolRegistry;
use diskmon::transport::{DiskServer, ServerState};

fn setup_logging(config: &Config) -> Result<()> {
    let level = LevelFilter::from_str(&config.effective_log_level()).unwrap_or(LevelFilter::Info);
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level).parse_default_env();

    if config.log.stderr {
        builder.target(env_logger::Target::Stderr).init();
        info!("Logging initialized at {} to stderr", level);
        return Ok(());
    }

    fs::create_dir_all(&config.log.dir).context("Failed to create log directory")?;
    let log_file = config.log.dir.join("diskmon.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );
    builder.target(env_logger::Target::Pipe(target)).init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

async fn run_application(cli: &Cli, config: Config) -> Result<()> {
    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Serve { host, port } => handle_serve_command(host.clone(), *port, config).await,
        Commands::Client { url, command } => handle_client_command(url.clone(), command, config).await,
    }
}

async fn handle_serve_command(host: Option<String>, port: Option<u16>, mut config: Config) -> Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let executor = DiskExecutor::system(config.executor.clone());
    let registry = ToolRegistry::standard(executor).context("Failed to register tools")?;
    let state = ServerState::from_config(registry, &config);

    let addr = config.server.bind_addr();
    let server = DiskServer::bind(&addr, state).await.context("Failed to start server")?;
    let url = server.sse_url()?;
    println!("{} {} on {}", "Serving".green(), config.server.name.bold(), url);

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("Server failed")?;

    println!("{}", "Server stopped".cyan());
    Ok(())
}

async fn handle_client_command(url: Option<String>, command: &ClientCommands, mut config: Config) -> Result<()> {
    if let Some(url) = url {
        config.client.url = url;
    }
    info!("Client command {:?} against {}", command, config.client.url);

    let mut client = DiskHealthClient::from_config(&config.client);
    client
        .ensure_ready()
        .await
        .with_context(|| format!("Failed to reach {}", config.client.url))?;

    let outcome = match command {
        ClientCommands::Tools => {
            for line in render::render_catalog(client.catalog()) {
                println!("{}", line);
            }
            Ok(true)
        }
        ClientCommands::Disks => client.list_disks().await.map(|forest| {
            for line in render::render_forest(&forest) {
                println!("{}", line);
            }
            true
        }),
        ClientCommands::Smart { device } => client.check_disk_smart(device).await.map(|result| {
            for line in render::render_smart(&result) {
                println!("{}", line);
            }
            result.is_healthy()
        }),
        ClientCommands::Ping => {
            let name = client
                .server_info()
                .and_then(|info| info.get("name"))
                .and_then(|name| name.as_str())
                .unwrap_or("unknown server")
                .to_string();
            println!(
                "{} {} ({} tools)",
                "Connected to".green(),
                name.bold(),
                client.catalog().len()
            );
            Ok(true)
        }
    };

    client.disconnect().await;
    let healthy = outcome.context("Tool call failed")?;
    if !healthy {
        std::process::exit(1);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    setup_logging(&config).context("Failed to setup logging")?;
    info!("Starting with config from: {:?}", cli.config);

    run_application(&cli, config).await.context("Application failed")?;

    Ok(())
}
