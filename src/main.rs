//! labd - Lab hardware adapter supervisor.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use labd::client::{self, AdapterClient, SupervisorClient};
use labd::config::{ConfigLoader, LabdConfig};
use labd::devices::DeviceKind;
use labd::display::{self, BodyFormat};
use labd::supervisor::{AdapterId, ModulePath, SupervisorServer};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Auto,
    Text,
    Hex,
    Bool,
    Int,
    Float,
}

impl From<FormatArg> for BodyFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Auto => BodyFormat::Auto,
            FormatArg::Text => BodyFormat::Text,
            FormatArg::Hex => BodyFormat::Hex,
            FormatArg::Bool => BodyFormat::Bool,
            FormatArg::Int => BodyFormat::Int,
            FormatArg::Float => BodyFormat::Float,
        }
    }
}

#[derive(Parser)]
#[command(
    name = "labd",
    about = "Lab hardware adapter supervisor",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to a config file (default: .labd.toml, then the user config dir).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Supervisor address (host:port).
    #[arg(long, global = true, env = "LABD_SUPERVISOR")]
    supervisor: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the supervisor.
    Serve {
        /// Control port to listen on.
        #[arg(long)]
        port: Option<u16>,
        /// Interface to bind.
        #[arg(long)]
        bind: Option<String>,
        /// Directory adapter module paths are resolved against.
        #[arg(long)]
        root: Option<PathBuf>,
        /// Program and leading arguments used to run adapter modules.
        #[arg(long, num_args = 1.., allow_hyphen_values = true)]
        launcher: Option<Vec<String>>,
    },
    /// Run a built-in adapter (normally spawned by the supervisor).
    Adapter {
        /// Module path; its file stem selects the device.
        module: PathBuf,
        /// Identifier assigned by the supervisor. Omit to run standalone.
        id: Option<String>,
    },
    /// Start a fresh adapter and print its port.
    Start {
        /// Module path segments, e.g. `devs test_psu.py`.
        #[arg(required = true)]
        module: Vec<String>,
    },
    /// Start the adapter unless it is already running, and print its port.
    Ensure {
        /// Module path segments, e.g. `devs test_psu.py`.
        #[arg(required = true)]
        module: Vec<String>,
    },
    /// Stop the adapter listening on a port.
    Stop {
        port: u16,
    },
    /// Send one request straight to an adapter.
    Call {
        /// Adapter data port.
        port: u16,
        /// Action token, e.g. `output_getattr`.
        action: String,
        /// Argument text.
        args: Option<String>,
        /// Adapter host (default: the supervisor's host).
        #[arg(long)]
        host: Option<String>,
        /// How to render the response body.
        #[arg(long = "as", value_enum, default_value_t = FormatArg::Auto)]
        format: FormatArg,
        /// Print the full body without truncation.
        #[arg(long)]
        raw: bool,
    },
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cannot listen for SIGTERM");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

fn load_config(cli: &Cli) -> Result<LabdConfig, String> {
    let loader = cli
        .config
        .clone()
        .map_or_else(ConfigLoader::new, ConfigLoader::with_path);
    let mut config = loader.load().map_err(|e| e.to_string())?;
    if let Some(addr) = &cli.supervisor {
        config.adapter.supervisor.clone_from(addr);
        config.client.supervisor.clone_from(addr);
    }
    Ok(config)
}

fn module_path(segments: &[String]) -> Result<ModulePath, String> {
    ModulePath::new(segments.iter().flat_map(|s| s.split_whitespace())).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load config");
            return ExitCode::FAILURE;
        }
    };

    match run(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "labd failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands, mut config: LabdConfig) -> Result<(), String> {
    match command {
        Commands::Serve {
            port,
            bind,
            root,
            launcher,
        } => {
            let supervisor = &mut config.supervisor;
            if let Some(port) = port {
                supervisor.port = port;
            }
            if let Some(bind) = bind {
                supervisor.bind = bind;
            }
            if let Some(root) = root {
                supervisor.adapter_root = root;
            }
            if let Some(launcher) = launcher {
                supervisor.launcher = launcher;
            }
            tracing::info!(
                port = supervisor.port,
                root = %supervisor.adapter_root.display(),
                launcher = ?supervisor.launcher,
                "Starting supervisor"
            );

            let server = SupervisorServer::bind(config.supervisor)
                .await
                .map_err(|e| format!("Failed to bind control port: {e}"))?;
            let handle = server.start().map_err(|e| e.to_string())?;
            shutdown_signal().await;
            tracing::info!("Shutdown requested");
            handle.shutdown_and_wait().await;
            Ok(())
        }
        Commands::Adapter { module, id } => {
            let kind = DeviceKind::from_module(&module)
                .ok_or_else(|| format!("No built-in device for {}", module.display()))?;
            let id = id
                .map(|id| id.parse::<AdapterId>())
                .transpose()
                .map_err(|e| e.to_string())?;

            let mut device = kind.open(&config.adapter).map_err(|e| e.to_string())?;

            let shutdown = CancellationToken::new();
            let token = shutdown.clone();
            tokio::spawn(async move {
                shutdown_signal().await;
                token.cancel();
            });

            labd::adapter::run(&config.adapter, id, device.as_mut(), shutdown)
                .await
                .map_err(|e| e.to_string())
        }
        Commands::Start { module } => {
            let module = module_path(&module)?;
            let client = SupervisorClient::from_config(&config.client);
            let port = client.start(&module).await.map_err(|e| e.to_string())?;
            display::print_port("START", &module.to_string(), port);
            Ok(())
        }
        Commands::Ensure { module } => {
            let module = module_path(&module)?;
            let client = SupervisorClient::from_config(&config.client);
            let port = client.ensure(&module).await.map_err(|e| e.to_string())?;
            display::print_port("ENSURE", &module.to_string(), port);
            Ok(())
        }
        Commands::Stop { port } => {
            let client = SupervisorClient::from_config(&config.client);
            client.stop(port).await.map_err(|e| e.to_string())?;
            display::print_stopped(port);
            Ok(())
        }
        Commands::Call {
            port,
            action,
            args,
            host,
            format,
            raw,
        } => {
            let host =
                host.unwrap_or_else(|| client::host_of(&config.client.supervisor).to_string());
            let client = AdapterClient::new(host, port).with_config(&config.client);
            let body = client
                .call(&action, args.unwrap_or_default())
                .await
                .map_err(|e| e.to_string())?;
            display::print_response(&action, &body, format.into(), raw);
            Ok(())
        }
    }
}
