use std::io::IsTerminal;
use std::path::PathBuf;

use crate::prelude::{eprintln, println, *};
use cardscan_core::partition::{partition, Segment};
use cardscan_core::scanner::{Candidate, RejectionCounts, ScanReport};
use colored::Colorize;
use raster::profile::detect_titles;
use raster::title::prepare_title;
use raster::Classifier;
use serde::Serialize;

#[derive(Debug, clap::Args, Clone)]
pub struct Options {
    /// Path to the canvas descriptor
    canvas: PathBuf,

    /// Output as JSON
    #[arg(long)]
    json: bool,

    /// Write each prepared title crop to this directory
    #[arg(long)]
    titles_dir: Option<PathBuf>,

    /// Page file extension
    #[arg(long, env = "CARDSCAN_PAGE_EXT", default_value = "png")]
    ext: String,
}

#[derive(Debug, Serialize)]
pub struct ScanOutput {
    pub total_height: u32,
    pub rows_scanned: usize,
    pub candidates: Vec<Candidate>,
    pub segments: Vec<Segment>,
    pub rejections: RejectionCounts,
}

pub async fn run(options: Options, global: crate::Global) -> Result<()> {
    let config = global.load_config()?;

    let output = tokio::task::spawn_blocking({
        let options = options.clone();
        move || -> Result<ScanOutput> {
            let canvas =
                crate::canvas::open_canvas(&options.canvas, &options.ext, config.cache.pages)?;
            let classifier = Classifier::new(&config.palette)?;

            let progress = new_progress(canvas.page_count() as u64, "Scanning pages")?;
            let ScanReport {
                candidates,
                rejections,
                rows_scanned,
            } = detect_titles(&canvas, &classifier, &config.scan, |done| {
                progress.set_position(done as u64)
            })?;
            progress.finish_and_clear();

            let segments = partition(&candidates, canvas.total_height())?;

            if let Some(dir) = &options.titles_dir {
                std::fs::create_dir_all(dir)
                    .wrap_err_with(|| f!("Failed to create {}", dir.display()))?;
                for candidate in &candidates {
                    let crop = canvas.materialize(candidate.start_y, candidate.end_y)?;
                    let path = dir.join(f!("title_{}.png", candidate.start_y));
                    match prepare_title(&crop, &config.title) {
                        Some(title) => title.save(&path)?,
                        None => crop.save(&path)?,
                    }
                }
            }

            Ok(ScanOutput {
                total_height: canvas.total_height(),
                rows_scanned,
                candidates,
                segments,
                rejections,
            })
        }
    })
    .await??;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        output_formatted(&output);
    }

    Ok(())
}

fn output_formatted(output: &ScanOutput) {
    if std::io::stdout().is_terminal() {
        eprintln!("\n{}", "== Title bands ==".bold().cyan());
    }

    if output.segments.is_empty() {
        println!("{}", "No title bands found.".yellow());
    } else {
        let mut table = new_table();
        table.add_row(prettytable::row![
            "#".bold().cyan(),
            "Title rows".bold().cyan(),
            "Band rows".bold().cyan(),
            "Card rows".bold().cyan(),
            "Card height".bold().cyan()
        ]);
        for (i, segment) in output.segments.iter().enumerate() {
            let title = segment.title;
            table.add_row(prettytable::row![
                (i + 1).to_string().bright_yellow(),
                f!("{}..{}", title.start_y, title.end_y),
                f!("{}..{}", title.band_start, title.band_end),
                f!("{}..{}", segment.start_y, segment.end_y),
                segment.height()
            ]);
        }
        table.printstd();
    }

    let r = &output.rejections;
    eprintln!(
        "\n{} {} rows, {} candidates, {} rejected",
        "Scanned".green(),
        output.rows_scanned,
        output.candidates.len().to_string().bright_yellow(),
        r.total()
    );
    if r.total() > 0 {
        let mut table = new_table();
        for (reason, count) in [
            ("top gap", r.top_gap),
            ("band height", r.band_height),
            ("bottom gap", r.bottom_gap),
            ("contiguous run", r.contiguous_run),
            ("too narrow", r.too_narrow),
            ("touches edge", r.touches_edge),
            ("off center", r.off_center),
        ] {
            if count > 0 {
                table.add_row(prettytable::row![reason.dimmed(), count]);
            }
        }
        table.printstd();
    }
}
