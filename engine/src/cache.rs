//! # Cache Module
//!
//! Maps a [`Fingerprint`] to the image file that was generated for it. One cache
//! file lives in every output directory, next to the images it describes:
//!
//! ```text
//! <output-dir>/
//!   cache.json              {"entries": [{fingerprint, prompt, model, output_file, created_at}, ...]}
//!   <fingerprint>.<ext>     one file per generated image
//! ```
//!
//! ## Key Features
//! - `output_file` is stored relative to the output directory, so a directory can be moved as a
//!   whole.
//! - There is at most one entry per fingerprint. [`CacheStore::upsert`] overwrites in place and
//!   refreshes `created_at`, which therefore records when the referenced file was produced.
//! - An entry only counts as a hit while its file is on disk, see [`CacheStore::cached_output`].
//! - [`CacheStore::save`] writes to a temp file in the same directory and renames it over the
//!   old cache file, so an interrupted save leaves the previous state intact.

use std::{
    collections::HashMap,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::{
    error::{Error, Result},
    fingerprint::Fingerprint,
};

pub const CACHE_FILE_NAME: &str = "cache.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// older cache files call this `hash`
    #[serde(alias = "hash")]
    pub fingerprint: Fingerprint,
    pub prompt: String,
    pub model: String,
    pub output_file: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct CacheFile {
    entries: Vec<CacheEntry>,
}

#[derive(Debug)]
pub struct CacheStore {
    path: PathBuf,
    entries: Vec<CacheEntry>,
    /// fingerprint -> position in `entries`
    index: HashMap<Fingerprint, usize>,
}

impl CacheStore {
    /// Empty store bound to `<dir>/cache.json`. Nothing is written until [`Self::save`].
    pub fn empty(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(CACHE_FILE_NAME),
            entries: vec![],
            index: HashMap::new(),
        }
    }

    /// Loads the cache file of `dir`. A missing file (or missing directory) yields an empty store.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let mut store = Self::empty(dir);
        let src = match fs::read_to_string(&store.path) {
            Ok(src) => src,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No cache at {}, starting empty", store.path.display());
                return Ok(store);
            }
            Err(source) => {
                return Err(Error::ReadFailed {
                    path: store.path.clone(),
                    source,
                });
            }
        };

        let file: CacheFile =
            serde_json::from_str(&src).map_err(|source| Error::CacheCorrupt {
                path: store.path.clone(),
                source,
            })?;

        for entry in file.entries {
            if let Some(&pos) = store.index.get(&entry.fingerprint) {
                warn!(
                    "Cache contains {} more than once, keeping the later entry",
                    entry.fingerprint
                );
                store.entries[pos] = entry;
            } else {
                store.index.insert(entry.fingerprint.clone(), store.entries.len());
                store.entries.push(entry);
            }
        }
        debug!(
            "Loaded {} cache entries from {}",
            store.entries.len(),
            store.path.display()
        );
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The directory the cache file and the images live in.
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or(Path::new("."))
    }

    pub fn entries(&self) -> &[CacheEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lookup(&self, fingerprint: &Fingerprint) -> Option<&CacheEntry> {
        self.index.get(fingerprint).map(|&pos| &self.entries[pos])
    }

    /// Absolute path of the cached image, if there is an entry AND its file still exists.
    /// A stale entry is a miss, not an error.
    pub fn cached_output(&self, fingerprint: &Fingerprint) -> Option<PathBuf> {
        let entry = self.lookup(fingerprint)?;
        let path = self.dir().join(&entry.output_file);
        if path.is_file() {
            Some(path)
        } else {
            debug!(
                "Cache entry {fingerprint} points to missing file {}",
                path.display()
            );
            None
        }
    }

    /// Registers `output_file` for (prompt, model). An existing entry for the same fingerprint is
    /// replaced in place, with a fresh `created_at`.
    pub fn upsert(&mut self, prompt: &str, model: &str, output_file: &str) -> &CacheEntry {
        let fingerprint = Fingerprint::of(prompt, model);
        let entry = CacheEntry {
            fingerprint: fingerprint.clone(),
            prompt: prompt.to_string(),
            model: model.to_string(),
            output_file: output_file.to_string(),
            created_at: Utc::now(),
        };

        let pos = match self.index.get(&fingerprint) {
            Some(&pos) => {
                self.entries[pos] = entry;
                pos
            }
            None => {
                self.index.insert(fingerprint, self.entries.len());
                self.entries.push(entry);
                self.entries.len() - 1
            }
        };
        &self.entries[pos]
    }

    pub fn save(&self) -> Result<()> {
        let persist_err = |e| Error::persist(&self.path, e);
        let json = serde_json::to_string_pretty(&CacheFileRef {
            entries: &self.entries,
        })
        .map_err(io::Error::from)
        .map_err(persist_err)?;

        let mut tmp = NamedTempFile::new_in(self.dir()).map_err(persist_err)?;
        tmp.write_all(json.as_bytes()).map_err(persist_err)?;
        tmp.as_file().sync_all().map_err(persist_err)?;
        tmp.persist(&self.path).map_err(|e| persist_err(e.error))?;

        debug!(
            "Saved {} cache entries to {}",
            self.entries.len(),
            self.path.display()
        );
        Ok(())
    }
}

#[derive(Serialize)]
struct CacheFileRef<'a> {
    entries: &'a [CacheEntry],
}

#[cfg(test)]
mod tests {
    use std::{thread::sleep, time::Duration};

    use expect_test::expect;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn missing_file_is_empty_store() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::load(dir.path())?;
        assert!(store.is_empty());
        assert_eq!(store.path(), dir.path().join(CACHE_FILE_NAME));
        Ok(())
    }

    #[test]
    fn missing_dir_is_empty_store() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::load(dir.path().join("not-there"))?;
        assert!(store.is_empty());
        Ok(())
    }

    #[test]
    fn malformed_file_is_corrupt() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CACHE_FILE_NAME), "{ entries: nope").unwrap();
        let err = CacheStore::load(dir.path()).unwrap_err();
        assert!(matches!(err, Error::CacheCorrupt { .. }), "{err:?}");
    }

    #[test]
    fn unreadable_file_is_not_invalid_input() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join(CACHE_FILE_NAME)).unwrap();
        let err = CacheStore::load(dir.path()).unwrap_err();
        assert!(matches!(err, Error::ReadFailed { .. }), "{err:?}");
    }

    #[test]
    fn loads_hash_keyed_files_with_offset_timestamps() -> Result<()> {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(CACHE_FILE_NAME),
            r#"{"entries":[{"hash":"abcdef0123456789","prompt":"a cat","model":"m","output_file":"abcdef0123456789.webp","created_at":"2025-01-01T10:00:00.123456789-05:00"}]}"#,
        )
        .unwrap();

        let store = CacheStore::load(dir.path())?;
        let entry = &store.entries()[0];
        assert_eq!(entry.fingerprint.as_str(), "abcdef0123456789");
        assert_eq!(entry.created_at.to_rfc3339(), "2025-01-01T15:00:00.123456789+00:00");
        assert!(store.lookup(&entry.fingerprint).is_some());

        store.save()?;
        let saved = fs::read_to_string(dir.path().join(CACHE_FILE_NAME)).unwrap();
        assert!(saved.contains(r#""fingerprint": "abcdef0123456789""#));
        Ok(())
    }

    #[test]
    fn upsert_twice_keeps_one_entry_with_latest_file() {
        let dir = TempDir::new().unwrap();
        let mut store = CacheStore::empty(dir.path());
        store.upsert("a cat", "m", "first.webp");
        let first_created = store.entries()[0].created_at;
        sleep(Duration::from_millis(5));
        store.upsert("a cat", "m", "second.webp");

        assert_eq!(store.len(), 1);
        let entry = store.lookup(&Fingerprint::of("a cat", "m")).unwrap();
        assert_eq!(entry.output_file, "second.webp");
        assert!(entry.created_at > first_created);
    }

    #[test]
    fn lookup_sees_unsaved_upserts() {
        let dir = TempDir::new().unwrap();
        let mut store = CacheStore::empty(dir.path());
        let fp = Fingerprint::of("p", "m");
        assert!(store.lookup(&fp).is_none());
        store.upsert("p", "m", "x.webp");
        assert_eq!(store.lookup(&fp).unwrap().prompt, "p");
    }

    #[test]
    fn hit_requires_live_file() {
        let dir = TempDir::new().unwrap();
        let mut store = CacheStore::empty(dir.path());
        let fp = Fingerprint::of("p", "m");
        let name = fp.file_name("webp");
        store.upsert("p", "m", &name);
        assert!(store.cached_output(&fp).is_none());

        fs::write(dir.path().join(&name), b"img").unwrap();
        assert_eq!(store.cached_output(&fp), Some(dir.path().join(&name)));

        fs::remove_file(dir.path().join(&name)).unwrap();
        assert!(store.lookup(&fp).is_some());
        assert!(store.cached_output(&fp).is_none());
    }

    #[test]
    fn save_and_reload() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let mut store = CacheStore::empty(dir.path());
        for i in 0..5 {
            store.upsert(&format!("prompt {i}"), "m", &format!("{i}.webp"));
        }
        store.save()?;

        let reloaded = CacheStore::load(dir.path())?;
        assert_eq!(reloaded.entries(), store.entries());
        for entry in store.entries() {
            assert_eq!(reloaded.lookup(&entry.fingerprint), Some(entry));
        }
        Ok(())
    }

    #[test]
    fn save_replaces_previous_file() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let mut store = CacheStore::empty(dir.path());
        store.upsert("a", "m", "a.webp");
        store.save()?;
        store.upsert("b", "m", "b.webp");
        store.save()?;

        assert_eq!(CacheStore::load(dir.path())?.len(), 2);
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from(CACHE_FILE_NAME)]);
        Ok(())
    }

    #[test]
    fn legacy_duplicates_collapse_to_last() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let fp = Fingerprint::of("p", "m");
        let src = format!(
            r#"{{"entries": [
                {{"fingerprint": "{fp}", "prompt": "p", "model": "m", "output_file": "old.webp", "created_at": "2025-01-01T00:00:00Z"}},
                {{"fingerprint": "{fp}", "prompt": "p", "model": "m", "output_file": "new.webp", "created_at": "2025-02-01T00:00:00Z"}}
            ]}}"#
        );
        fs::write(dir.path().join(CACHE_FILE_NAME), src).unwrap();

        let store = CacheStore::load(dir.path())?;
        assert_eq!(store.len(), 1);
        assert_eq!(store.lookup(&fp).unwrap().output_file, "new.webp");
        Ok(())
    }

    #[test]
    fn file_format() {
        let dir = TempDir::new().unwrap();
        let mut store = CacheStore::empty(dir.path());
        store.upsert("a cat", "m", "x.webp");
        store.entries[0].created_at = "2025-06-01T12:00:00Z".parse().unwrap();
        store.save().unwrap();

        let src = fs::read_to_string(store.path()).unwrap();
        let expect = expect![[r#"
            {
              "entries": [
                {
                  "fingerprint": "27f7d04bd8fa8698",
                  "prompt": "a cat",
                  "model": "m",
                  "output_file": "x.webp",
                  "created_at": "2025-06-01T12:00:00Z"
                }
              ]
            }"#]];
        expect.assert_eq(&src);
    }
}
