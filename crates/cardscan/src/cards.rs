use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::prelude::{eprintln, *};
use crate::recognize::{CommandRecognizer, NoopRecognizer, Recognizer, ResponsesRecognizer};
use cardscan_core::config::{Config, RecognizerKind};
use cardscan_core::labels::{card_file_name, label_or_unknown, UNKNOWN_LABEL};
use cardscan_core::partition::{partition, Segment};
use colored::Colorize;
use futures::stream::{self, StreamExt};
use raster::profile::detect_titles;
use raster::title::prepare_title;
use raster::{encode_png, Classifier};
use serde::{Deserialize, Serialize};

const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum RecognizerArg {
    None,
    Command,
    Responses,
}

impl From<RecognizerArg> for RecognizerKind {
    fn from(arg: RecognizerArg) -> Self {
        match arg {
            RecognizerArg::None => RecognizerKind::None,
            RecognizerArg::Command => RecognizerKind::Command,
            RecognizerArg::Responses => RecognizerKind::Responses,
        }
    }
}

#[derive(Debug, clap::Args, Clone)]
pub struct Options {
    /// Path to the canvas descriptor
    canvas: PathBuf,

    /// Directory to write card images and the manifest to
    #[arg(short, long)]
    output: PathBuf,

    /// Title recognizer (defaults to the configured one)
    #[arg(long, env = "CARDSCAN_RECOGNIZER", value_enum)]
    recognizer: Option<RecognizerArg>,

    /// Recognition calls in flight at once (defaults to the configured value)
    #[arg(long, env = "CARDSCAN_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Detect and recognize, but write nothing
    #[arg(long)]
    dry_run: bool,

    /// Page file extension
    #[arg(long, env = "CARDSCAN_PAGE_EXT", default_value = "png")]
    ext: String,
}

/// One line of `manifest.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardEntry {
    pub label: String,
    pub start_y: u32,
    pub end_y: u32,
    pub title_end_y: u32,
    pub file: String,
}

impl CardEntry {
    pub fn new(segment: &Segment, label: String) -> Self {
        let (_, title_end_y) = segment.title_range();
        Self {
            file: card_file_name(&label, segment.start_y),
            label,
            start_y: segment.start_y,
            end_y: segment.end_y,
            title_end_y,
        }
    }
}

/// A segment with its prepared title, waiting for recognition.
struct PendingCard {
    segment: Segment,
    title_png: Option<Vec<u8>>,
}

pub async fn run(options: Options, global: crate::Global) -> Result<()> {
    let mut config = global.load_config()?;
    if let Some(kind) = options.recognizer {
        config.recognizer.kind = kind.into();
    }
    if let Some(concurrency) = options.concurrency {
        config.recognizer.concurrency = concurrency.max(1);
    }

    let pending = tokio::task::spawn_blocking({
        let options = options.clone();
        let config = config.clone();
        move || detect_cards(&options, &config)
    })
    .await??;

    if pending.is_empty() {
        eprintln!("{}", "No title bands found; nothing to split.".yellow());
        return Ok(());
    }

    let labels = match config.recognizer.kind {
        RecognizerKind::None => recognize_all(&NoopRecognizer, &pending, 1).await?,
        RecognizerKind::Command => {
            let recognizer = CommandRecognizer::new(
                &config.recognizer.command,
                Duration::from_secs(config.recognizer.timeout_secs),
            )?;
            recognize_all(&recognizer, &pending, config.recognizer.concurrency).await?
        }
        RecognizerKind::Responses => {
            let recognizer = ResponsesRecognizer::new(&config.recognizer)?;
            recognize_all(&recognizer, &pending, config.recognizer.concurrency).await?
        }
    };

    let entries: Vec<CardEntry> = pending
        .iter()
        .zip(labels)
        .map(|(card, label)| CardEntry::new(&card.segment, label))
        .collect();

    if options.dry_run {
        print_entries(&entries);
        eprintln!("\n{}", "Dry run: nothing written.".yellow());
        return Ok(());
    }

    let segments: Vec<Segment> = pending.into_iter().map(|card| card.segment).collect();
    tokio::task::spawn_blocking({
        let options = options.clone();
        let entries = entries.clone();
        move || write_cards(&options, &config, &segments, &entries)
    })
    .await??;

    print_entries(&entries);
    eprintln!(
        "\n{} {} cards to {}",
        "Wrote".green(),
        entries.len().to_string().bright_yellow(),
        options.output.display().to_string().cyan()
    );
    Ok(())
}

/// Profile, scan and partition the canvas, and prepare every title crop.
fn detect_cards(options: &Options, config: &Config) -> Result<Vec<PendingCard>> {
    let canvas = crate::canvas::open_canvas(&options.canvas, &options.ext, config.cache.pages)?;
    let classifier = Classifier::new(&config.palette)?;

    let progress = new_progress(canvas.page_count() as u64, "Scanning pages")?;
    let report = detect_titles(&canvas, &classifier, &config.scan, |done| {
        progress.set_position(done as u64)
    })?;
    progress.finish_and_clear();

    let segments = partition(&report.candidates, canvas.total_height())?;
    log::debug!(
        "{} segments, cache stats {:?}",
        segments.len(),
        canvas.cache_stats()
    );

    segments
        .into_iter()
        .map(|segment| -> Result<PendingCard> {
            let (top, bottom) = segment.title_range();
            let crop = canvas.materialize(top, bottom)?;
            let title_png = prepare_title(&crop, &config.title)
                .map(encode_png)
                .transpose()?;
            Ok(PendingCard { segment, title_png })
        })
        .collect()
}

/// Recognize every title with at most `concurrency` calls in flight.
/// Labels come back in segment order.
async fn recognize_all<R: Recognizer>(
    recognizer: &R,
    pending: &[PendingCard],
    concurrency: usize,
) -> Result<Vec<String>> {
    let progress = new_progress(pending.len() as u64, "Recognizing titles")?;

    let labels = stream::iter(pending)
        .map(|card| {
            let progress = &progress;
            async move {
                let label = match &card.title_png {
                    None => UNKNOWN_LABEL.to_string(),
                    Some(png) => match recognizer.recognize(png).await {
                        Ok(text) => label_or_unknown(Some(&text)),
                        Err(err) => {
                            log::warn!(
                                "recognition failed for card at row {}: {err:#}",
                                card.segment.start_y
                            );
                            UNKNOWN_LABEL.to_string()
                        }
                    },
                };
                progress.inc(1);
                label
            }
        })
        .buffered(concurrency.max(1))
        .collect::<Vec<String>>()
        .await;

    progress.finish_and_clear();
    Ok(labels)
}

fn write_cards(
    options: &Options,
    config: &Config,
    segments: &[Segment],
    entries: &[CardEntry],
) -> Result<()> {
    std::fs::create_dir_all(&options.output)
        .wrap_err_with(|| f!("Failed to create {}", options.output.display()))?;
    let canvas = crate::canvas::open_canvas(&options.canvas, &options.ext, config.cache.pages)?;

    let progress = new_progress(entries.len() as u64, "Writing cards")?;
    for (segment, entry) in segments.iter().zip(entries) {
        let img = canvas.materialize(segment.start_y, segment.end_y)?;
        let path = options.output.join(&entry.file);
        img.save(&path)
            .wrap_err_with(|| f!("Failed to write {}", path.display()))?;
        progress.inc(1);
    }
    progress.finish_and_clear();

    write_manifest(&options.output, entries)
}

pub fn write_manifest(dir: &Path, entries: &[CardEntry]) -> Result<()> {
    let path = dir.join(MANIFEST_FILE);
    std::fs::write(&path, serde_json::to_string_pretty(entries)?)
        .wrap_err_with(|| f!("Failed to write {}", path.display()))
}

fn print_entries(entries: &[CardEntry]) {
    let mut table = new_table();
    table.add_row(prettytable::row![
        "Label".bold().cyan(),
        "Rows".bold().cyan(),
        "File".bold().cyan()
    ]);
    for entry in entries {
        let label = if entry.label == UNKNOWN_LABEL {
            entry.label.dimmed()
        } else {
            entry.label.bright_white()
        };
        table.add_row(prettytable::row![
            label,
            f!("{}..{}", entry.start_y, entry.end_y),
            entry.file
        ]);
    }
    table.printstd();
}
