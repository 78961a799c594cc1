mod app;
mod camera;
mod config;
mod error;
mod feedback;
mod input;
mod link;
mod messages;
mod opener;
mod screen;
mod session;
mod store;
#[cfg(test)]
mod testing;

use app::{App, Screen};
use camera::{DevicePermission, ZbarDecoder};
use config::Config;
use feedback::AudioFeedback;
use opener::SystemOpener;
use session::SessionController;
use store::{Configuration, ConfigurationStore, FileStore, KeyValueStore, MemoryStore};

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "qr2wa", version)]
#[command(about = "Scan QR codes with a camera and send the text to WhatsApp")]
struct Args {
    /// Application config file (default: ~/.config/qr2wa/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Open the scanner screen (default)
    Scan,

    /// Set or show the default WhatsApp number or group id
    Config {
        /// New destination; an empty string clears it
        #[arg(long, conflicts_with = "show")]
        destination: Option<String>,

        /// Print the current destination
        #[arg(long)]
        show: bool,
    },

    /// Print the WhatsApp link that scanning TEXT would open
    Link { text: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr, the screens own stdout
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "qr2wa=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    config.validate()?;

    let configuration = Arc::new(ConfigurationStore::new(open_storage(&config)));

    match args.command.unwrap_or(Commands::Scan) {
        Commands::Scan => run_app(config, configuration, Screen::Scanner).await,
        Commands::Config {
            destination: Some(destination),
            ..
        } => configuration.save(&Configuration::new(destination)),
        Commands::Config { show: true, .. } => {
            println!("{}", configuration.load().destination);
            Ok(())
        }
        Commands::Config { .. } => run_app(config, configuration, Screen::Configuration).await,
        Commands::Link { text } => {
            let destination = configuration.load().destination;
            println!("{}", link::whatsapp_link(&text, &destination));
            Ok(())
        }
    }
}

fn open_storage(config: &Config) -> Box<dyn KeyValueStore> {
    match config.storage_path() {
        Ok(path) => {
            tracing::debug!("Using storage at {:?}", path);
            Box::new(FileStore::new(path))
        }
        Err(e) => {
            tracing::warn!("No storage location, destination will not persist: {:#}", e);
            Box::new(MemoryStore::new())
        }
    }
}

async fn run_app(
    config: Config,
    configuration: Arc<ConfigurationStore>,
    initial: Screen,
) -> Result<()> {
    tracing::info!("Starting qr2wa on {}", config.video_device);

    let permission =
        DevicePermission::new(&config.video_device, config.permission_poll_interval());
    let decoder = ZbarDecoder::new(
        config.decoder_program.clone(),
        config.decoder_args.clone(),
        config.startup_grace(),
    );
    let opener = SystemOpener::new(config.opener_program.clone());

    let controller = SessionController::new(
        permission,
        decoder,
        opener,
        configuration.clone(),
        config.scan_options(),
    );

    let (input_tx, input_rx) = mpsc::channel(10);
    input::spawn_stdin_reader(input_tx);

    App::new(
        controller,
        configuration,
        AudioFeedback::from_config(&config),
        input_rx,
    )
    .run(initial)
    .await;

    Ok(())
}
