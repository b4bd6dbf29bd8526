use std::path::{Path, PathBuf};

use crate::prelude::{eprintln, println, *};
use cardscan_core::canvas::CanvasDescriptor;
use colored::Colorize;
use raster::{DirectoryPageSource, PagedCanvas};

#[derive(Debug, clap::Parser)]
#[command(name = "canvas")]
#[command(about = "Build and inspect page canvases")]
pub struct App {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, clap::Subcommand)]
pub enum Commands {
    /// Validate a page range and write its canvas descriptor
    Build(BuildOptions),

    /// Print a canvas descriptor
    Info {
        /// Path to the canvas descriptor
        canvas: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write the pixels of a global row range to an image file
    Slice(SliceOptions),
}

#[derive(Debug, clap::Args, Clone)]
pub struct BuildOptions {
    /// Directory holding `{index}.{ext}` pages
    #[arg(long)]
    pages: PathBuf,

    /// First page index (inclusive)
    #[arg(long)]
    start: u32,

    /// Last page index (inclusive)
    #[arg(long)]
    end: u32,

    /// Page file extension
    #[arg(long, env = "CARDSCAN_PAGE_EXT", default_value = "png")]
    ext: String,

    /// Where to write the descriptor
    #[arg(short, long, default_value = "canvas.json")]
    output: PathBuf,
}

#[derive(Debug, clap::Args, Clone)]
pub struct SliceOptions {
    /// Path to the canvas descriptor
    canvas: PathBuf,

    /// First global row (inclusive)
    #[arg(long)]
    from: u32,

    /// Last global row (exclusive)
    #[arg(long)]
    to: u32,

    /// Image file to write
    #[arg(short, long)]
    output: PathBuf,

    /// Page file extension
    #[arg(long, env = "CARDSCAN_PAGE_EXT", default_value = "png")]
    ext: String,
}

pub async fn run(app: App, global: crate::Global) -> Result<()> {
    match app.command {
        Commands::Build(options) => build(options).await,
        Commands::Info { canvas, json } => info(&canvas, json),
        Commands::Slice(options) => slice(options, global).await,
    }
}

/// Reopen a persisted canvas over its page directory.
pub fn open_canvas(
    path: &Path,
    ext: &str,
    cache_pages: usize,
) -> Result<PagedCanvas<DirectoryPageSource>> {
    let descriptor = CanvasDescriptor::load(path)
        .wrap_err_with(|| f!("Failed to read canvas {}", path.display()))?;
    let source = DirectoryPageSource::with_extension(&descriptor.source_locator, ext);
    Ok(PagedCanvas::open(source, descriptor)?.with_cache_capacity(cache_pages))
}

async fn build(options: BuildOptions) -> Result<()> {
    let spinner = new_spinner(f!(
        "Checking pages {}..={} in {}",
        options.start,
        options.end,
        options.pages.display()
    ))?;

    let descriptor = tokio::task::spawn_blocking({
        let options = options.clone();
        move || -> Result<CanvasDescriptor> {
            let source = DirectoryPageSource::with_extension(&options.pages, &options.ext);
            let canvas = PagedCanvas::build(source, options.start, options.end)?;
            Ok(canvas.descriptor().clone())
        }
    })
    .await??;

    spinner.finish_and_clear();

    descriptor
        .save(&options.output)
        .wrap_err_with(|| f!("Failed to write {}", options.output.display()))?;

    print_descriptor(&descriptor);
    eprintln!(
        "\n{} {}",
        "Canvas written to".green(),
        options.output.display().to_string().cyan()
    );
    Ok(())
}

fn info(path: &Path, json: bool) -> Result<()> {
    let descriptor = CanvasDescriptor::load(path)
        .wrap_err_with(|| f!("Failed to read canvas {}", path.display()))?;
    if json {
        println!("{}", descriptor.to_json()?);
    } else {
        print_descriptor(&descriptor);
    }
    Ok(())
}

async fn slice(options: SliceOptions, global: crate::Global) -> Result<()> {
    let config = global.load_config()?;

    tokio::task::spawn_blocking(move || -> Result<()> {
        let canvas = open_canvas(&options.canvas, &options.ext, config.cache.pages)?;
        let img = canvas.materialize(options.from, options.to)?;
        img.save(&options.output)
            .wrap_err_with(|| f!("Failed to write {}", options.output.display()))?;
        log::debug!("slice cache stats: {:?}", canvas.cache_stats());
        eprintln!(
            "{} rows {}..{} ({}x{}) to {}",
            "Wrote".green(),
            options.from,
            options.to,
            img.width(),
            img.height(),
            options.output.display().to_string().cyan()
        );
        Ok(())
    })
    .await?
}

fn print_descriptor(descriptor: &CanvasDescriptor) {
    let mut table = new_table();
    table.add_row(prettytable::row![
        "Source".bold().cyan(),
        descriptor.source_locator
    ]);
    table.add_row(prettytable::row![
        "Pages".bold().cyan(),
        f!(
            "{}..={} ({})",
            descriptor.start_index,
            descriptor.end_index,
            descriptor.page_count()
        )
    ]);
    table.add_row(prettytable::row![
        "Page size".bold().cyan(),
        f!("{}x{}", descriptor.page_width, descriptor.page_height)
    ]);
    table.add_row(prettytable::row![
        "Total height".bold().cyan(),
        descriptor.total_height.to_string().bright_yellow()
    ]);
    table.printstd();
}
