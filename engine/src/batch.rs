//! Bounded-concurrency execution of many work items.
//!
//! The cache is partitioned once, up front. Pending items are then dispatched in input order,
//! at most `concurrency` at a time, and may complete in any order. Every cache mutation goes
//! through [`SharedCache`], and the cache is written back exactly once, after the last item.
//! A failing item never affects its siblings.

use std::{
    collections::{HashMap, VecDeque},
    path::PathBuf,
    sync::Arc,
};

use log::{debug, error, info, warn};
use serde::Serialize;
use strum::Display;
use tokio::{
    sync::{Mutex, Semaphore},
    task::{self, JoinSet},
};

use crate::{
    ImgModBox,
    cache::CacheStore,
    error::{Error, Result},
    work::{self, ItemReport, ItemStatus, Plan, RunOptions, WorkItem},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BatchOutcome {
    /// No pending item failed (including "nothing was pending").
    Success,
    /// Some, but not all, pending items failed.
    PartialFailure,
    /// Every pending item failed.
    TotalFailure,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    /// In reporting order: cached items first, then completions as they arrived.
    pub items: Vec<ItemReport>,
    pub generated: usize,
    pub cached: usize,
    pub failed: usize,
}

impl BatchReport {
    fn record(&mut self, report: ItemReport) {
        match report.status {
            ItemStatus::Generated => self.generated += 1,
            ItemStatus::Cached => self.cached += 1,
            ItemStatus::Error => self.failed += 1,
            ItemStatus::Pending => {}
        }
        self.items.push(report);
    }

    pub fn outcome(&self) -> BatchOutcome {
        match (self.generated, self.failed) {
            (_, 0) => BatchOutcome::Success,
            (0, _) => BatchOutcome::TotalFailure,
            _ => BatchOutcome::PartialFailure,
        }
    }
}

/// The single point through which workers touch the cache.
#[derive(Clone)]
struct SharedCache(Arc<Mutex<CacheStore>>);

impl SharedCache {
    fn new(store: CacheStore) -> Self {
        Self(Arc::new(Mutex::new(store)))
    }

    async fn register(&self, item: &WorkItem) {
        self.0
            .lock()
            .await
            .upsert(&item.prompt, &item.model, &item.output_file);
    }

    async fn save(&self) -> Result<()> {
        self.0.lock().await.save()
    }
}

pub struct BatchExecutor {
    imgmod: ImgModBox,
    options: RunOptions,
}

impl BatchExecutor {
    pub fn new(imgmod: ImgModBox, options: RunOptions) -> Self {
        Self { imgmod, options }
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Runs `items` and calls `on_item` once per outcome, as it happens. Only structural problems
    /// (unreadable cache, failing final save) are returned as `Err`; per-item failures end up in
    /// the report.
    pub async fn run(
        &self,
        items: Vec<WorkItem>,
        mut on_item: impl FnMut(&ItemReport),
    ) -> Result<BatchReport> {
        let opts = &self.options;
        work::ensure_output_dir(&opts.output_dir)?;
        let store = CacheStore::load(&opts.output_dir)?;
        let Plan { cached, pending } = work::plan(items, &store, opts.use_cache);

        let mut report = BatchReport::default();
        for item in cached {
            on_item(&item);
            report.record(item);
        }
        if pending.is_empty() {
            info!("All images already cached");
            return Ok(report);
        }

        let concurrency = opts.concurrency.max(1);
        info!(
            "Generating {} images (concurrency: {concurrency})",
            pending.len()
        );
        let cache = SharedCache::new(store);
        let sem = Arc::new(Semaphore::new(concurrency));
        let mut queue = VecDeque::from(pending);
        let mut join_set = JoinSet::new();
        let mut running: HashMap<task::Id, WorkItem> = HashMap::new();

        // Completions are drained while dispatching, so reports arrive as items finish.
        loop {
            tokio::select! {
                biased;

                Some(res) = join_set.join_next_with_id() => {
                    let done = match res {
                        Ok((id, done)) => {
                            running.remove(&id);
                            done
                        }
                        Err(e) => match running.remove(&e.id()) {
                            Some(item) => {
                                error!("Worker for {} died: {e}", item.fingerprint);
                                ItemReport::failed(&item, &Error::Worker(e))
                            }
                            None => {
                                error!("Unknown worker task died: {e}");
                                report.failed += 1;
                                continue;
                            }
                        },
                    };
                    on_item(&done);
                    report.record(done);
                }

                permit = sem.clone().acquire_owned(), if !queue.is_empty() => {
                    let permit = permit.expect("the semaphore is never closed");
                    let Some(item) = queue.pop_front() else {
                        continue;
                    };
                    let imgmod = self.imgmod.clone();
                    let cache = cache.clone();
                    let output_dir = opts.output_dir.clone();
                    let task_item = item.clone();
                    debug!("Dispatching {}", item.fingerprint);

                    let handle = join_set.spawn(async move {
                        let _permit = permit;
                        let item = task_item;
                        match execute(&imgmod, &item, output_dir, &cache).await {
                            Ok(path) => ItemReport::generated(&item, path),
                            Err(e) => {
                                warn!("{} failed: {e}", item.fingerprint);
                                ItemReport::failed(&item, &e)
                            }
                        }
                    });
                    running.insert(handle.id(), item);
                }

                else => break,
            }
        }

        cache.save().await?;
        info!(
            "Batch done: {} generated, {} cached, {} failed",
            report.generated, report.cached, report.failed
        );
        Ok(report)
    }
}

/// invoke -> write -> register. The cache only learns about an item once its file is on disk.
async fn execute(
    imgmod: &ImgModBox,
    item: &WorkItem,
    output_dir: PathBuf,
    cache: &SharedCache,
) -> Result<PathBuf> {
    let image = imgmod.generate(&item.model, &item.prompt).await?;
    let path = output_dir.join(&item.output_file);
    tokio::fs::write(&path, &image.data)
        .await
        .map_err(|e| Error::persist(&path, e))?;
    cache.register(item).await;
    Ok(path)
}
