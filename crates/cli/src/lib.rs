mod inspect;
mod serve;

use clap::{Parser, Subcommand};
use portico_core::config::{DEFAULT_SETTINGS_FILE, PortSetting};
use portico_core::{ConfigurationError, HostConfig, RawSettings, SettingsBuilder};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "portico",
    version,
    about = "A web API host assembled from plugin modules",
    long_about = "Portico discovers plugin packages and modules under a plugin root, registers \
                  the endpoint definitions they export and serves their routes over HTTP."
)]
pub struct Cli {
    /// Settings file. Defaults to appsettings.json in the working directory, if present.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory holding plugin packages and modules (overrides PluginPath)
    #[arg(long, global = true, value_name = "DIR")]
    pub plugin_path: Option<PathBuf>,

    /// Host name or address to listen on (overrides Domain)
    #[arg(long, global = true)]
    pub domain: Option<String>,

    /// Port to listen on (overrides Port)
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Hosting environment, e.g. Development (overrides Environment)
    #[arg(long, global = true)]
    pub environment: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Discover plugins and serve their endpoints (default)
    Serve,
    /// Discover plugins and print what was registered, without serving
    #[command(
        long_about = "Runs the full discovery pipeline (extraction, loading, scanning, \
                            registration and route activation) and prints the resulting \
                            definitions and routes."
    )]
    Inspect {
        /// Print JSON instead of tables
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    fn overrides(&self) -> RawSettings {
        RawSettings {
            plugin_path: self.plugin_path.clone(),
            domain: self.domain.clone(),
            port: self.port.map(PortSetting::Number),
            environment: self.environment.clone(),
            ..Default::default()
        }
    }

    /// Settings file, then `PORTICO_*` variables, then command-line flags.
    pub fn load_config(&self) -> Result<HostConfig, ConfigurationError> {
        let builder = match &self.config {
            Some(path) => SettingsBuilder::new().with_json_file(path)?,
            None => SettingsBuilder::new().with_optional_json_file(DEFAULT_SETTINGS_FILE)?,
        };
        builder
            .with_process_environment()
            .with_overrides(self.overrides())
            .build()
    }
}

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let (component, to_stderr) = match &cli.command {
        Some(Commands::Inspect { .. }) => ("inspect", false),
        _ => ("serve", true),
    };
    let _guard = portico_runtime::init_logging(component, to_stderr);

    let config = cli.load_config().inspect_err(|e| tracing::error!("{}", e))?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(serve::run(config))
        }
        Commands::Inspect { json } => inspect::run(config, json),
    }
}
