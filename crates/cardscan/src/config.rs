use crate::prelude::{println, *};

#[derive(Debug, clap::Parser)]
#[command(name = "config")]
#[command(about = "Inspect the effective configuration")]
pub struct App {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, clap::Subcommand)]
pub enum Commands {
    /// Print the effective configuration as TOML
    Show,
}

pub async fn run(app: App, global: crate::Global) -> Result<()> {
    match app.command {
        Commands::Show => {
            let config = global.load_config()?;
            println!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}
