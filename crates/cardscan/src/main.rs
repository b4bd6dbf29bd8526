use std::path::PathBuf;

use crate::prelude::*;
use cardscan_core::config::Config;
use clap::Parser;

mod canvas;
mod cards;
mod config;
mod error;
mod pages;
mod prelude;
mod recognize;
mod scan;

/// Config file picked up from the working directory when `--config` is not set.
const DEFAULT_CONFIG_FILE: &str = "cardscan.toml";

#[derive(Debug, clap::Parser)]
#[command(
    author,
    version,
    about,
    long_about = "Detect title bands in scanned pages and split them into one image per card"
)]
pub struct App {
    #[command(subcommand)]
    pub command: SubCommands,

    #[clap(flatten)]
    global: Global,
}

#[derive(Debug, Clone, clap::Args)]
pub struct Global {
    /// Path to a cardscan.toml configuration file
    #[clap(long, env = "CARDSCAN_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Whether to display additional information.
    #[clap(long, env = "CARDSCAN_VERBOSE", global = true, default_value = "false")]
    verbose: bool,
}

impl Global {
    /// Effective configuration: `--config`, else `./cardscan.toml`, else defaults.
    pub fn load_config(&self) -> Result<Config> {
        let path = match &self.config {
            Some(path) => path.clone(),
            None => {
                let local = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !local.is_file() {
                    log::debug!("no {DEFAULT_CONFIG_FILE} found, using defaults");
                    return Ok(Config::default());
                }
                local
            }
        };
        log::debug!("loading configuration from {}", path.display());
        Config::load(&path).wrap_err_with(|| f!("Failed to load config {}", path.display()))
    }
}

#[derive(Debug, clap::Parser)]
pub enum SubCommands {
    /// Build and inspect page canvases
    Canvas(crate::canvas::App),

    /// Detect title bands on a canvas
    Scan(crate::scan::Options),

    /// Split a canvas into one image per card
    Cards(crate::cards::Options),

    /// Prepare scanned pages (crop, clean, classify)
    Pages(crate::pages::App),

    /// Inspect the effective configuration
    Config(crate::config::App),
}

#[tokio::main]
async fn main() -> Result<()> {
    let app = App::parse();

    let default_filter = if app.global.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
    color_eyre::install()?;

    match app.command {
        SubCommands::Canvas(sub_app) => crate::canvas::run(sub_app, app.global).await,
        SubCommands::Scan(options) => crate::scan::run(options, app.global).await,
        SubCommands::Cards(options) => crate::cards::run(options, app.global).await,
        SubCommands::Pages(sub_app) => crate::pages::run(sub_app, app.global).await,
        SubCommands::Config(sub_app) => crate::config::run(sub_app, app.global).await,
    }
    .map_err(|err: color_eyre::eyre::Report| eyre!(err))
}
