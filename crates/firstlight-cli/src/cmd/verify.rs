use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use firstlight_core::manifest::ArtifactEntry;
use firstlight_core::timing::StageTimer;
use firstlight_core::verify::QcReport;
use firstlight_core::verify::artifacts::verify_output_dir;
use serde::Serialize;

use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

/// Arguments for `fl verify`.
#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Output directory written by `fl curate`.
    #[arg(value_name = "DIR")]
    pub dir: PathBuf,
}

#[derive(Debug, Serialize)]
struct VerifySummary<'a> {
    dir: String,
    ok: bool,
    artifacts: &'a [ArtifactEntry],
    qc: &'a QcReport,
}

/// Re-check an output directory against its manifest.
///
/// # Errors
///
/// Returns an error for the first failed check: unreadable files, hash or
/// row-count drift, duplicate keys, or filtered outputs that disagree with
/// the kept set.
pub fn run_verify(args: &VerifyArgs, output: OutputMode, timer: &mut StageTimer) -> Result<()> {
    let report = timer.time("verify", || verify_output_dir(&args.dir))?;

    let summary = VerifySummary {
        dir: report.dir.display().to_string(),
        ok: true,
        artifacts: &report.manifest.artifacts,
        qc: &report.manifest.qc,
    };
    render_mode(output, &summary, render_text, render_pretty)
}

fn render_text(s: &VerifySummary<'_>, w: &mut dyn Write) -> std::io::Result<()> {
    for entry in s.artifacts {
        writeln!(w, "OK   {}", entry.file_name)?;
    }
    writeln!(w, "OK   product keys unique")?;
    writeln!(w, "OK   filtered outputs match keep set")?;
    writeln!(w, "verify: success")
}

fn render_pretty(s: &VerifySummary<'_>, w: &mut dyn Write) -> std::io::Result<()> {
    pretty_section(w, "Verify")?;
    pretty_kv(w, "Directory", &s.dir)?;
    for entry in s.artifacts {
        pretty_kv(w, &entry.file_name, format!("ok ({} rows)", entry.rows))?;
    }
    pretty_kv(w, "Products", s.qc.total_products.to_string())?;
    pretty_kv(w, "Kept", s.qc.kept_products.to_string())?;
    writeln!(w, "verify: success")
}
