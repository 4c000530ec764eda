use std::io::Write;
use std::num::NonZeroUsize;
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use firstlight_core::config::{CurateOverrides, ProjectConfig, resolve_curate};
use firstlight_core::manifest::Manifest;
use firstlight_core::pipeline::run;
use firstlight_core::sink::DirSink;
use firstlight_core::timing::StageTimer;
use serde::Serialize;

use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

/// Arguments for `fl curate`.
///
/// Every path may also come from `firstlight.toml`; flags win.
#[derive(Args, Debug, Default)]
pub struct CurateArgs {
    /// Review events, one JSON object per line.
    #[arg(long, value_name = "PATH")]
    pub reviews: Option<PathBuf>,

    /// Product metadata, one JSON object per line.
    #[arg(long, value_name = "PATH")]
    pub meta: Option<PathBuf>,

    /// Output directory. Must not exist unless `--force` is given.
    #[arg(long, value_name = "DIR")]
    pub out: Option<PathBuf>,

    /// Worker threads for window aggregation [default: available cores].
    #[arg(long, value_name = "N")]
    pub partitions: Option<NonZeroUsize>,

    /// Replace an existing output directory once the new one is complete.
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
struct CurateSummary<'a> {
    out: String,
    events: usize,
    metadata_rows: usize,
    elapsed_ms: u64,
    manifest: &'a Manifest,
}

/// Run a full curation and print the QC report.
///
/// # Errors
///
/// Returns an error if configuration is incomplete, an input cannot be
/// read or labeled, or the output cannot be written.
pub fn run_curate(
    args: CurateArgs,
    project: &ProjectConfig,
    output: OutputMode,
    timer: &mut StageTimer,
) -> Result<()> {
    let settings = resolve_curate(
        project,
        CurateOverrides {
            reviews: args.reviews,
            meta: args.meta,
            out: args.out,
            partitions: args.partitions,
            force: args.force,
        },
    )?;

    let mut sink = DirSink::create(settings.out.clone(), settings.force)?;
    let report = run(&settings.inputs, &mut sink, settings.options, timer)?;

    let summary = CurateSummary {
        out: settings.out.display().to_string(),
        events: report.events,
        metadata_rows: report.metadata_rows,
        elapsed_ms: u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
        manifest: &report.manifest,
    };
    render_mode(output, &summary, render_text, render_pretty)
}

fn render_text(s: &CurateSummary<'_>, w: &mut dyn Write) -> std::io::Result<()> {
    writeln!(w, "out: {}", s.out)?;
    writeln!(w, "events: {}", s.events)?;
    writeln!(w, "metadata_rows: {}", s.metadata_rows)?;
    writeln!(w, "dataset_end: {}", s.manifest.dataset_end)?;
    writeln!(w, "cutoff_date: {}", s.manifest.cutoff_date)?;
    write!(w, "{}", s.manifest.qc.render_text())
}

fn render_pretty(s: &CurateSummary<'_>, w: &mut dyn Write) -> std::io::Result<()> {
    pretty_section(w, "Curation")?;
    pretty_kv(w, "Output", &s.out)?;
    pretty_kv(w, "Review events", s.events.to_string())?;
    pretty_kv(w, "Metadata rows", s.metadata_rows.to_string())?;
    pretty_kv(w, "Dataset end", s.manifest.dataset_end.to_string())?;
    pretty_kv(w, "Observable if launched", format!("at or before {} 00:00", s.manifest.cutoff_date))?;
    pretty_kv(w, "Elapsed", format!("{} ms", s.elapsed_ms))?;
    writeln!(w)?;

    pretty_section(w, "Quality control")?;
    write!(w, "{}", s.manifest.qc.render_text())?;
    writeln!(w)?;

    pretty_section(w, "Artifacts")?;
    for entry in &s.manifest.artifacts {
        writeln!(w, "{:<27} {:>9} rows  {}", entry.file_name, entry.rows, entry.file_hash)?;
    }
    Ok(())
}
