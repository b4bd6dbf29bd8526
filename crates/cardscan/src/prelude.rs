pub use crate::error::Error;

pub use anstream::eprintln;
pub use anstream::println;
pub use color_eyre::eyre::{eyre, Context, OptionExt, Result};
pub use std::format as f;

pub fn new_table() -> prettytable::Table {
    let mut table = prettytable::Table::new();

    let format = prettytable::format::FormatBuilder::new()
        .padding(1, 1)
        .build();

    table.set_format(format);

    table
}

/// Spinner on stderr for work of unknown length.
pub fn new_spinner(msg: impl Into<String>) -> Result<indicatif::ProgressBar> {
    let spinner = indicatif::ProgressBar::new_spinner();
    spinner.set_style(
        indicatif::ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?,
    );
    spinner.set_message(msg.into());
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));
    Ok(spinner)
}

/// Progress bar on stderr counting `len` steps.
pub fn new_progress(len: u64, msg: impl Into<String>) -> Result<indicatif::ProgressBar> {
    let bar = indicatif::ProgressBar::new(len);
    bar.set_style(
        indicatif::ProgressStyle::default_bar()
            .template("{spinner:.cyan} {msg} [{bar:30.cyan/blue}] {pos}/{len}")?
            .progress_chars("=> "),
    );
    bar.set_message(msg.into());
    Ok(bar)
}
