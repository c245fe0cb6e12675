use std::{io::Write, path::Path, process::ExitCode};

use color_eyre::{Result, eyre::WrapErr as _};
use engine::{
    Error,
    batch::{BatchExecutor, BatchOutcome, BatchReport},
    cache::CACHE_FILE_NAME,
    prompt_file::{PromptFile, ValidationReport},
    work::{self, ItemReport, ItemStatus},
};
use log::warn;

use crate::{
    cli::{Cli, Command, ConfigCommand, GlobalArgs},
    config::{Config, Settings, config_path, load_config},
    report::{OutputMode, Reporter},
};

pub mod cli;
pub mod config;
pub mod report;

/// Process exit status, distinguishable by automated callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Exit {
    Success = 0,
    /// some generations failed, or any other runtime error
    PartialFailure = 1,
    TotalFailure = 2,
    /// bad YAML, missing file, no prompts, empty prompt
    InvalidInput = 3,
}

impl Exit {
    pub fn for_error(error: &color_eyre::Report) -> Self {
        let invalid_input = error
            .chain()
            .any(|e| matches!(e.downcast_ref::<Error>(), Some(Error::InvalidInput(_))));
        if invalid_input {
            Self::InvalidInput
        } else {
            Self::PartialFailure
        }
    }
}

impl From<BatchOutcome> for Exit {
    fn from(outcome: BatchOutcome) -> Self {
        match outcome {
            BatchOutcome::Success => Self::Success,
            BatchOutcome::PartialFailure => Self::PartialFailure,
            BatchOutcome::TotalFailure => Self::TotalFailure,
        }
    }
}

impl From<Exit> for ExitCode {
    fn from(exit: Exit) -> Self {
        ExitCode::from(exit as u8)
    }
}

pub async fn run(cli: Cli) -> Exit {
    let mut reporter = Reporter::stdio(OutputMode::from_flags(cli.global.json, cli.global.quiet));
    let result = match load_config() {
        Ok(config) => dispatch(cli, config.unwrap_or_default(), &mut reporter).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(exit) => exit,
        Err(e) => {
            if let Err(io) = reporter.fatal(&e) {
                warn!("Couldn't report error: {io}");
            }
            Exit::for_error(&e)
        }
    }
}

pub async fn dispatch<O: Write, E: Write>(
    cli: Cli,
    config: Config,
    reporter: &mut Reporter<O, E>,
) -> Result<Exit> {
    let Cli { global, command } = cli;
    match command {
        Command::Generate(cmd) => {
            let settings = Settings::resolve(&global, config, cmd.model, None)?;
            generate(&settings, &global, cmd.prompt, reporter).await
        }
        Command::Batch(cmd) => {
            let settings = Settings::resolve(&global, config, cmd.model, cmd.concurrency)?;
            batch(&settings, &global, &cmd.file, reporter).await
        }
        Command::Validate(cmd) => {
            let settings = Settings::resolve(&global, config, cmd.model, None)?;
            validate(&settings, &cmd.file, reporter)
        }
        Command::Models(cmd) => {
            let settings = Settings::resolve(&global, config, None, None)?;
            models(&settings, cmd.query, reporter).await
        }
        Command::Config(ConfigCommand::Path) => {
            reporter.raw(config_path()?.display().to_string())?;
            Ok(Exit::Success)
        }
        Command::Config(ConfigCommand::Show) => {
            let settings = Settings::resolve(&global, config, None, None)?;
            reporter.raw(settings.display_config()?)?;
            Ok(Exit::Success)
        }
    }
}

async fn generate<O: Write, E: Write>(
    settings: &Settings,
    global: &GlobalArgs,
    prompt: String,
    reporter: &mut Reporter<O, E>,
) -> Result<Exit> {
    let opts = &settings.options;
    if prompt.trim().is_empty() {
        return Err(Error::InvalidInput("empty prompt text".into()).into());
    }
    let item = opts.work_item(prompt, &settings.model);

    let preview = work::dry_run(vec![item.clone()], opts)?;
    if global.dry_run {
        reporter.dry_run(&preview)?;
        return Ok(Exit::Success);
    }
    if let Some(cached) = preview
        .prompts
        .iter()
        .find(|p| p.status == ItemStatus::Cached)
    {
        reporter.item(cached)?;
        return Ok(Exit::Success);
    }

    let imgmod = settings.image_model()?;
    reporter.message(format!("Generating image with {}...", item.model))?;
    match work::generate_one(imgmod.as_ref(), &item, opts).await {
        Ok(report) => {
            reporter.item(&report)?;
            Ok(Exit::Success)
        }
        Err(e @ Error::Generate(_)) => {
            reporter.item(&ItemReport::failed(&item, &e))?;
            Ok(Exit::TotalFailure)
        }
        Err(e) => Err(e.into()),
    }
}

async fn batch<O: Write, E: Write>(
    settings: &Settings,
    global: &GlobalArgs,
    file: &Path,
    reporter: &mut Reporter<O, E>,
) -> Result<Exit> {
    let opts = &settings.options;
    let items = PromptFile::load(file)?.work_items(&settings.model, opts)?;

    let preview = work::dry_run(items.clone(), opts)?;
    if global.dry_run {
        reporter.dry_run(&preview)?;
        return Ok(Exit::Success);
    }
    if preview.to_generate == 0 {
        for p in &preview.prompts {
            reporter.item(p)?;
        }
        reporter.message("All images already cached.")?;
        return Ok(Exit::Success);
    }

    let executor = BatchExecutor::new(settings.image_model()?, opts.clone());
    reporter.message(format!(
        "Generating {} images (concurrency: {})...\n",
        preview.to_generate, opts.concurrency
    ))?;

    let result = executor
        .run(items, |item| {
            if let Err(e) = reporter.item(item) {
                warn!("Couldn't report {}: {e}", item.fingerprint);
            }
        })
        .await;
    let report = explain_batch_error(result)?;

    reporter.summary(&report)?;
    Ok(report.outcome().into())
}

/// A failed cache save happens after every image was written and reported.
fn explain_batch_error(result: engine::Result<BatchReport>) -> Result<BatchReport> {
    match result {
        Err(e)
            if matches!(&e, Error::PersistFailed { path, .. } if path.ends_with(CACHE_FILE_NAME)) =>
        {
            Err(e).wrap_err("Images were written, but the cache could not be saved")
        }
        other => Ok(other?),
    }
}

async fn models<O: Write, E: Write>(
    settings: &Settings,
    query: Option<String>,
    reporter: &mut Reporter<O, E>,
) -> Result<Exit> {
    let Some(query) = query else {
        reporter.models()?;
        return Ok(Exit::Success);
    };
    if !settings.has_token() {
        warn!("No API token, can't search for {query:?}");
        reporter.message("Searching needs a Replicate API token, showing built-in models instead.\n")?;
        reporter.models()?;
        return Ok(Exit::Success);
    }

    let found = settings
        .replicate_client()?
        .search_models(&query)
        .await
        .wrap_err("Model search failed")?;
    reporter.model_search(&query, &found)?;
    Ok(Exit::Success)
}

fn validate<O: Write, E: Write>(
    settings: &Settings,
    file: &Path,
    reporter: &mut Reporter<O, E>,
) -> Result<Exit> {
    let report = match PromptFile::load(file) {
        Ok(prompts) => prompts.validate(&settings.model),
        Err(e) => ValidationReport::unreadable(&e),
    };
    reporter.validation(&report)?;
    Ok(if report.valid {
        Exit::Success
    } else {
        Exit::InvalidInput
    })
}
