use anyhow::Result;
use clap::{CommandFactory, Parser};
use narrator::cli::{Cli, Commands, ConfigAction};
use narrator::config::Config;
use narrator::daemon::{rodio_launcher, run_daemon};
use narrator::ipc::client::send_command;
use narrator::ipc::protocol::{Command, Response};
use narrator::ipc::server::IpcServer;
use narrator::logging::init_logging;
use narrator::playback::rodio_device::list_output_devices;
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);

    match cli.command {
        Commands::Daemon { server, device } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(server) = server {
                config.server.base_url = server;
            }
            if device.is_some() {
                config.playback.device = device;
            }
            let launcher = rodio_launcher(&config);
            run_daemon(config, cli.socket, launcher).await?;
        }
        Commands::PlayPause => handle_ipc_command(cli.socket, Command::PlayPause).await?,
        Commands::Stop => handle_ipc_command(cli.socket, Command::Stop).await?,
        Commands::Next => handle_ipc_command(cli.socket, Command::Next).await?,
        Commands::ToggleFront => handle_ipc_command(cli.socket, Command::ToggleFront).await?,
        Commands::ToggleBack => handle_ipc_command(cli.socket, Command::ToggleBack).await?,
        Commands::Clear => handle_ipc_command(cli.socket, Command::Clear).await?,
        Commands::Status => handle_ipc_command(cli.socket, Command::Status).await?,
        Commands::Shutdown => handle_ipc_command(cli.socket, Command::Shutdown).await?,
        Commands::Follow => handle_follow(cli.socket).await?,
        Commands::Speed { value, up, down } => {
            // The "change" argument group admits exactly one of the three.
            let command = match value {
                Some(speed) => Command::SetSpeed { speed },
                None if up => Command::SpeedUp,
                None => {
                    debug_assert!(down);
                    Command::SpeedDown
                }
            };
            handle_ipc_command(cli.socket, command).await?;
        }
        Commands::Devices => list_devices()?,
        Commands::Config { action } => handle_config_command(action, cli.config.as_deref())?,
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "narrator", &mut std::io::stdout());
        }
    }

    Ok(())
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config)
/// 2. Default config path (~/.config/narrator/config.toml)
/// 3. Built-in defaults with environment variable overrides
fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path)?
    } else {
        Config::load_or_default(&Config::default_path())?
    };
    Ok(config.with_env_overrides())
}

/// List available audio output devices.
fn list_devices() -> Result<()> {
    let devices = list_output_devices()?;

    if devices.is_empty() {
        eprintln!("No audio output devices found");
        std::process::exit(1);
    }

    println!("Available audio output devices:");
    for (idx, device) in devices.iter().enumerate() {
        println!("  [{}] {}", idx, device);
    }

    Ok(())
}

/// Handle configuration commands.
fn handle_config_command(action: ConfigAction, custom_path: Option<&Path>) -> Result<()> {
    let config_path = custom_path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path);

    match action {
        ConfigAction::Show => {
            let config = Config::load_or_default(&config_path)?.with_env_overrides();
            print!("{}", config.to_toml()?);
        }
        ConfigAction::Path => {
            println!("{}", config_path.display());
        }
        ConfigAction::Init { force } => {
            if config_path.exists() && !force {
                eprintln!(
                    "{}",
                    format!(
                        "Config already exists at {} (use --force to overwrite)",
                        config_path.display()
                    )
                    .yellow()
                );
                std::process::exit(1);
            }
            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&config_path, Config::default().to_toml()?)?;
            println!("Wrote {}", config_path.display());
        }
    }
    Ok(())
}

/// Send IPC command to daemon and handle response.
async fn handle_ipc_command(socket: Option<PathBuf>, command: Command) -> Result<()> {
    let socket_path = socket.unwrap_or_else(IpcServer::default_socket_path);

    match send_command(&socket_path, command).await {
        Ok(response) => match response {
            Response::Ok => {
                println!("{}", "ok".green());
            }
            Response::Speed { speed } => {
                println!("Speed: {:.1}x", speed);
            }
            Response::Status(snapshot) => {
                println!("Status:");
                println!(
                    "  {}    {}",
                    "Client:".dimmed(),
                    narrator::version_string()
                );
                println!("{}", narrator::output::format_status(&snapshot));
            }
            Response::Event { event } => {
                narrator::output::render_event(&event);
            }
            Response::Error { message } => {
                eprintln!("{}", format!("Error: {}", message).red());
                std::process::exit(1);
            }
        },
        Err(e) => {
            eprintln!(
                "{}",
                format!("Failed to communicate with daemon: {}", e).red()
            );
            eprintln!("Is the daemon running? Start it with: narrator daemon");
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Follow daemon events and render live output.
async fn handle_follow(socket: Option<PathBuf>) -> Result<()> {
    let socket_path = socket.unwrap_or_else(IpcServer::default_socket_path);

    println!("Following session events... (Ctrl+C to stop)");

    match narrator::ipc::client::follow(&socket_path, |event| {
        narrator::output::render_event(&event);
    })
    .await
    {
        Ok(()) => {
            println!("Daemon connection closed");
        }
        Err(e) => {
            eprintln!("Failed to follow daemon: {}", e);
            eprintln!("Is the daemon running? Start it with: narrator daemon");
            std::process::exit(1);
        }
    }

    Ok(())
}
