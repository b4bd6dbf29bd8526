use std::path::PathBuf;

use crate::prelude::{eprintln, *};
use cardscan_core::rows::label;
use colored::Colorize;
use raster::crop::prepare_page;
use raster::Classifier;

#[derive(Debug, clap::Parser)]
#[command(name = "pages")]
#[command(about = "Prepare scanned pages for a canvas")]
pub struct App {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, clap::Subcommand)]
pub enum Commands {
    /// Crop a page range by parity and flatten near-white to white
    Crop(CropOptions),

    /// Render one image with exact palette colors
    Classify {
        /// Image to classify
        input: PathBuf,

        /// Where to write the palette rendering
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[derive(Debug, clap::Args, Clone)]
pub struct CropOptions {
    /// Directory holding scanned `{index}.{ext}` pages
    #[arg(long)]
    input: PathBuf,

    /// Directory to write cropped clean pages to
    #[arg(long)]
    output: PathBuf,

    /// First page index (inclusive)
    #[arg(long)]
    start: u32,

    /// Last page index (inclusive)
    #[arg(long)]
    end: u32,

    /// Also write palette renderings of each cropped page here
    #[arg(long)]
    tricolor: Option<PathBuf>,

    /// Scanned page file extension
    #[arg(long, env = "CARDSCAN_PAGE_EXT", default_value = "png")]
    ext: String,
}

pub async fn run(app: App, global: crate::Global) -> Result<()> {
    let config = global.load_config()?;
    match app.command {
        Commands::Crop(options) => {
            tokio::task::spawn_blocking(move || crop(&options, &config)).await?
        }
        Commands::Classify { input, output } => {
            tokio::task::spawn_blocking(move || classify(&input, &output, &config)).await?
        }
    }
}

fn crop(options: &CropOptions, config: &cardscan_core::config::Config) -> Result<()> {
    if options.end < options.start {
        return Err(Error::Generic(f!(
            "end page {} is before start page {}",
            options.end,
            options.start
        ))
        .into());
    }

    std::fs::create_dir_all(&options.output)
        .wrap_err_with(|| f!("Failed to create {}", options.output.display()))?;
    if let Some(dir) = &options.tricolor {
        std::fs::create_dir_all(dir).wrap_err_with(|| f!("Failed to create {}", dir.display()))?;
    }

    let classifier = Classifier::new(&config.palette)?;
    let progress = new_progress(
        (options.end - options.start + 1) as u64,
        "Cropping pages",
    )?;

    let mut written = 0;
    let mut skipped = Vec::new();
    for index in options.start..=options.end {
        let path = options.input.join(f!("{index}.{}", options.ext));
        if !path.is_file() {
            log::warn!("page {} not found, skipping", path.display());
            skipped.push(index);
            progress.inc(1);
            continue;
        }

        let page = image::open(&path).wrap_err_with(|| f!("Failed to read {}", path.display()))?;
        let prepared = prepare_page(
            index,
            &page,
            &config.crop,
            &classifier,
            config.palette.clean_threshold,
            options.tricolor.is_some(),
        )?;

        prepared.clean.save(options.output.join(f!("{index}.png")))?;
        if let (Some(dir), Some(tricolor)) = (&options.tricolor, &prepared.tricolor) {
            tricolor.save(dir.join(f!("{index}.png")))?;
        }
        written += 1;
        progress.inc(1);
    }
    progress.finish_and_clear();

    eprintln!(
        "{} {} pages to {}",
        "Wrote".green(),
        written.to_string().bright_yellow(),
        options.output.display().to_string().cyan()
    );
    if !skipped.is_empty() {
        eprintln!(
            "{} {:?}",
            "Missing pages (a canvas cannot span these):".yellow(),
            skipped
        );
    }
    Ok(())
}

fn classify(
    input: &std::path::Path,
    output: &std::path::Path,
    config: &cardscan_core::config::Config,
) -> Result<()> {
    let classifier = Classifier::new(&config.palette)?;
    let img = raster::open_rgb(input)?;
    let labels = classifier.classify(&img);
    classifier
        .render(&labels)
        .save(output)
        .wrap_err_with(|| f!("Failed to write {}", output.display()))?;

    let mut table = new_table();
    table.add_row(prettytable::row![
        "Label".bold().cyan(),
        "Pixels".bold().cyan()
    ]);
    for (i, named) in config.palette.colors.iter().enumerate() {
        table.add_row(prettytable::row![
            f!("{} ({})", named.name, named.color.to_hex()),
            labels.count(i as u8)
        ]);
    }
    table.add_row(prettytable::row![
        "background",
        labels.count(label::BACKGROUND)
    ]);
    table.add_row(prettytable::row!["other", labels.count(label::OTHER)]);
    table.printstd();
    Ok(())
}
