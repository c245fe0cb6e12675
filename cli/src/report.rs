use std::io::{self, Stderr, Stdout, Write};

use engine::{
    batch::{BatchOutcome, BatchReport},
    image_model::{ModelSummary, models::SUPPORTED},
    prompt_file::ValidationReport,
    work::{DryRunReport, ItemReport, ItemStatus},
};
use serde::Serialize;
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    /// one JSON object per line on stdout
    Json,
    /// errors only
    Quiet,
}

impl OutputMode {
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        match (json, quiet) {
            (true, _) => Self::Json,
            (false, true) => Self::Quiet,
            (false, false) => Self::Human,
        }
    }
}

const SEARCH_RESULTS_SHOWN: usize = 10;
const DESCRIPTION_WIDTH: usize = 80;

fn shorten(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let kept: String = text.chars().take(width - 3).collect();
    format!("{kept}...")
}

#[derive(Serialize)]
struct SummaryRecord {
    outcome: BatchOutcome,
    generated: usize,
    cached: usize,
    failed: usize,
}

/// Writes user facing output. Human output goes to `out`, failures to `err`, and in JSON mode
/// every record (failures included) goes to `out`.
pub struct Reporter<O, E> {
    mode: OutputMode,
    out: O,
    err: E,
}

impl Reporter<Stdout, Stderr> {
    pub fn stdio(mode: OutputMode) -> Self {
        Self::new(mode, io::stdout(), io::stderr())
    }
}

impl<O: Write, E: Write> Reporter<O, E> {
    pub fn new(mode: OutputMode, out: O, err: E) -> Self {
        Self { mode, out, err }
    }

    fn json(&mut self, value: &impl Serialize) -> io::Result<()> {
        serde_json::to_writer(&mut self.out, value)?;
        writeln!(self.out)
    }

    fn human(&self) -> bool {
        self.mode == OutputMode::Human
    }

    /// Printed in every mode, for output that is the command's only result.
    pub fn raw(&mut self, text: impl AsRef<str>) -> io::Result<()> {
        writeln!(self.out, "{}", text.as_ref())
    }

    /// Free text for humans, dropped in JSON and quiet mode.
    pub fn message(&mut self, msg: impl AsRef<str>) -> io::Result<()> {
        if self.human() {
            writeln!(self.out, "{}", msg.as_ref())?;
        }
        Ok(())
    }

    pub fn item(&mut self, item: &ItemReport) -> io::Result<()> {
        if self.mode == OutputMode::Json {
            return self.json(item);
        }
        let file = item
            .output_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        match item.status {
            ItemStatus::Error => writeln!(
                self.err,
                "Error [{}]: {}",
                item.prompt,
                item.error.as_deref().unwrap_or("unknown error")
            ),
            _ if !self.human() => Ok(()),
            ItemStatus::Cached => writeln!(self.out, "Cached: {} -> {file}", item.prompt),
            ItemStatus::Generated => writeln!(self.out, "Generated: {} -> {file}", item.prompt),
            ItemStatus::Pending => writeln!(self.out, "Pending: {}", item.prompt),
        }
    }

    pub fn summary(&mut self, report: &BatchReport) -> io::Result<()> {
        if self.mode == OutputMode::Json {
            return self.json(&SummaryRecord {
                outcome: report.outcome(),
                generated: report.generated,
                cached: report.cached,
                failed: report.failed,
            });
        }
        if report.failed > 0 {
            return writeln!(self.err, "{} generation(s) failed", report.failed);
        }
        self.message(format!(
            "\nDone. Generated {} images, {} cached.",
            report.generated, report.cached
        ))
    }

    pub fn dry_run(&mut self, report: &DryRunReport) -> io::Result<()> {
        match self.mode {
            OutputMode::Json => return self.json(report),
            OutputMode::Quiet => return Ok(()),
            OutputMode::Human => {}
        }
        let out = &mut self.out;
        writeln!(out, "Dry run summary:")?;
        writeln!(out, "  To generate: {}", report.to_generate)?;
        writeln!(out, "  Cached:      {}", report.cached)?;
        writeln!(out, "  Total:       {}\n", report.prompts.len())?;
        for p in &report.prompts {
            writeln!(out, "  [{}] {}", p.status, p.prompt)?;
            writeln!(out, "         Model: {}", p.model)?;
            writeln!(out, "         Hash:  {}", p.fingerprint)?;
            if let Some(file) = &p.output_file {
                writeln!(out, "         File:  {}", file.display())?;
            }
        }
        Ok(())
    }

    pub fn validation(&mut self, report: &ValidationReport) -> io::Result<()> {
        match self.mode {
            OutputMode::Json => return self.json(report),
            OutputMode::Quiet => {
                for e in &report.errors {
                    writeln!(self.err, "{e}")?;
                }
                return Ok(());
            }
            OutputMode::Human => {}
        }

        let out = &mut self.out;
        writeln!(out, "{}", if report.valid { "✓ Valid" } else { "✗ Invalid" })?;
        let s = &report.summary;
        writeln!(out, "\nSummary:")?;
        writeln!(out, "  Total prompts:  {}", s.total_prompts)?;
        writeln!(out, "  Unique prompts: {}", s.unique_prompts)?;
        if s.duplicates > 0 {
            writeln!(out, "  Duplicates:     {}", s.duplicates)?;
        }
        if s.empty_prompts > 0 {
            writeln!(out, "  Empty prompts:  {}", s.empty_prompts)?;
        }
        for (title, lines) in [("Errors", &report.errors), ("Warnings", &report.warnings)] {
            if !lines.is_empty() {
                writeln!(out, "\n{title}:")?;
                for l in lines {
                    writeln!(out, "  • {l}")?;
                }
            }
        }
        Ok(())
    }

    pub fn models(&mut self) -> io::Result<()> {
        if self.mode == OutputMode::Json {
            for m in SUPPORTED {
                self.json(&json!({
                    "id": m.id,
                    "name": m.name,
                    "description": m.description,
                }))?;
            }
            return Ok(());
        }
        // listing is the whole point of the command, so quiet still prints it
        writeln!(self.out, "Models with built-in defaults:\n")?;
        for m in SUPPORTED {
            writeln!(self.out, "  {}", m.id)?;
            writeln!(self.out, "    {}: {}\n", m.name, m.description)?;
        }
        Ok(())
    }

    /// The most popular search hits, most run first.
    pub fn model_search(&mut self, query: &str, found: &[ModelSummary]) -> io::Result<()> {
        let top = &found[..found.len().min(SEARCH_RESULTS_SHOWN)];
        if self.mode == OutputMode::Json {
            for m in top {
                self.json(m)?;
            }
            return Ok(());
        }
        writeln!(self.out, "Popular models for {query:?}:\n")?;
        for m in top {
            writeln!(self.out, "  {}", m.full_name())?;
            writeln!(self.out, "    Runs: {}", m.run_count)?;
            if let Some(desc) = m.description.as_deref().filter(|d| !d.is_empty()) {
                writeln!(self.out, "    {}", shorten(desc, DESCRIPTION_WIDTH))?;
            }
            writeln!(self.out)?;
        }
        Ok(())
    }

    /// A failure that ends the command.
    pub fn fatal(&mut self, error: &color_eyre::Report) -> io::Result<()> {
        match self.mode {
            OutputMode::Json => self.json(&json!({
                "status": "error",
                "error": format!("{error:#}"),
            })),
            _ => writeln!(self.err, "Error: {error:#}"),
        }
    }
}
