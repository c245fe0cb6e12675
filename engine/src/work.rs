use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use log::{info, warn};
use serde::Serialize;
use strum::Display;

use crate::{
    DEFAULT_CONCURRENCY, DEFAULT_IMAGE_EXTENSION,
    cache::CacheStore,
    error::{Error, Result},
    fingerprint::Fingerprint,
    image_model::ImageModel,
};

/// Everything a run needs to know that is not part of an individual prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub output_dir: PathBuf,
    /// Upper bound on simultaneous model invocations in a batch, at least 1
    pub concurrency: usize,
    /// When false, cached images are regenerated
    pub use_cache: bool,
    pub image_extension: String,
}

impl RunOptions {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            concurrency: DEFAULT_CONCURRENCY,
            use_cache: true,
            image_extension: DEFAULT_IMAGE_EXTENSION.into(),
        }
    }

    pub fn work_item(&self, prompt: impl Into<String>, model: impl Into<String>) -> WorkItem {
        WorkItem::new(prompt, model, &self.image_extension)
    }
}

/// A (prompt, model) pair with its identity and output name fixed before anything runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub prompt: String,
    pub model: String,
    pub fingerprint: Fingerprint,
    /// relative to the output directory
    pub output_file: String,
}

impl WorkItem {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>, extension: &str) -> Self {
        let prompt = prompt.into();
        let model = model.into();
        let fingerprint = Fingerprint::of(&prompt, &model);
        let output_file = fingerprint.file_name(extension);
        Self {
            prompt,
            model,
            fingerprint,
            output_file,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ItemStatus {
    Generated,
    Cached,
    /// only reported by dry runs
    Pending,
    Error,
}

/// Outcome of one work item, carrying enough identity to be matched up in any order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemReport {
    pub status: ItemStatus,
    pub prompt: String,
    pub model: String,
    pub fingerprint: Fingerprint,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_file: Option<PathBuf>,
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ItemReport {
    fn new(item: &WorkItem, status: ItemStatus) -> Self {
        Self {
            status,
            prompt: item.prompt.clone(),
            model: item.model.clone(),
            fingerprint: item.fingerprint.clone(),
            output_file: None,
            cached: status == ItemStatus::Cached,
            error: None,
        }
    }

    pub fn cached(item: &WorkItem, path: PathBuf) -> Self {
        Self {
            output_file: Some(path),
            ..Self::new(item, ItemStatus::Cached)
        }
    }

    pub fn generated(item: &WorkItem, path: PathBuf) -> Self {
        Self {
            output_file: Some(path),
            ..Self::new(item, ItemStatus::Generated)
        }
    }

    pub fn pending(item: &WorkItem) -> Self {
        Self::new(item, ItemStatus::Pending)
    }

    pub fn failed(item: &WorkItem, error: &Error) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::new(item, ItemStatus::Error)
        }
    }
}

/// Work items split into those the cache already satisfies and those that must run.
#[derive(Debug, Default)]
pub struct Plan {
    pub cached: Vec<ItemReport>,
    pub pending: Vec<WorkItem>,
}

/// Partitions `items` against the cache. Repeated (prompt, model) pairs are dropped after their
/// first occurrence so no two workers ever write the same file.
pub fn plan(items: Vec<WorkItem>, store: &CacheStore, use_cache: bool) -> Plan {
    let mut seen = HashSet::new();
    let mut plan = Plan::default();

    for item in items {
        if !seen.insert(item.fingerprint.clone()) {
            warn!("Skipping duplicate prompt {:?} for {}", item.prompt, item.model);
            continue;
        }

        match store
            .cached_output(&item.fingerprint)
            .filter(|_| use_cache)
        {
            Some(path) => plan.cached.push(ItemReport::cached(&item, path)),
            None => plan.pending.push(item),
        }
    }
    plan
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DryRunReport {
    pub to_generate: usize,
    pub cached: usize,
    pub prompts: Vec<ItemReport>,
}

/// Reports what a run would do without touching the model or the disk.
pub fn dry_run(items: Vec<WorkItem>, options: &RunOptions) -> Result<DryRunReport> {
    let store = CacheStore::load(&options.output_dir)?;
    let order: Vec<_> = items.iter().map(|i| i.fingerprint.clone()).collect();
    let Plan { cached, pending } = plan(items, &store, options.use_cache);

    let to_generate = pending.len();
    let n_cached = cached.len();
    let mut prompts: Vec<_> = cached
        .into_iter()
        .chain(pending.iter().map(ItemReport::pending))
        .collect();
    prompts.sort_by_key(|r| order.iter().position(|fp| *fp == r.fingerprint));

    Ok(DryRunReport {
        to_generate,
        cached: n_cached,
        prompts,
    })
}

pub(crate) fn ensure_output_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| Error::persist(dir, e))
}

/// Single-prompt path: cache check, invoke, write, register, save. Strictly sequential, every
/// failure is returned to the caller.
pub async fn generate_one(
    imgmod: &(dyn ImageModel + Send + Sync),
    item: &WorkItem,
    options: &RunOptions,
) -> Result<ItemReport> {
    ensure_output_dir(&options.output_dir)?;
    let mut store = CacheStore::load(&options.output_dir)?;

    if options.use_cache
        && let Some(path) = store.cached_output(&item.fingerprint)
    {
        info!("Using cached image {}", path.display());
        return Ok(ItemReport::cached(item, path));
    }

    info!("Generating {} with {}", item.fingerprint, item.model);
    let image = imgmod.generate(&item.model, &item.prompt).await?;
    info!("Downloaded from {}", image.source);

    let path = options.output_dir.join(&item.output_file);
    fs::write(&path, &image.data).map_err(|e| Error::persist(&path, e))?;

    store.upsert(&item.prompt, &item.model, &item.output_file);
    store.save()?;
    Ok(ItemReport::generated(item, path))
}
