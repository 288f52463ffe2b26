//! Index-addressed cache of synthesized clips on disk.
//!
//! Contract:
//! * one clip per chunk index, stored as `<dir>/<index>.wav` (32-bit float,
//!   so a cached clip decodes to exactly the samples that were stored);
//! * at most one synthesis per index at a time ([`ClipCache::get_or_synthesize`]
//!   serializes callers on the same index, across every `ClipCache` opened on
//!   the same directory in this process);
//! * clips survive a failed run so it can resume, and are deleted by
//!   [`ClipCache::cleanup`] once the track has been produced.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, OnceLock,
    },
};

use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, warn};

use crate::audio::AudioBuffer;
use crate::error::Result;
use crate::wav::{read_wav_file, write_wav_file, WavEncoding};

/// Where a clip came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheOutcome {
    Hit,
    Synthesized,
}

/// (canonical cache dir, index) -> lock held while the clip is produced.
type ClipLocks = DashMap<(PathBuf, usize), Arc<Mutex<()>>>;

fn clip_locks() -> &'static ClipLocks {
    static LOCKS: OnceLock<ClipLocks> = OnceLock::new();
    LOCKS.get_or_init(DashMap::new)
}

static PART_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug)]
pub struct ClipCache {
    dir: PathBuf,
    // lock namespace; equal for every handle on the same directory
    lock_dir: PathBuf,
}

impl ClipCache {
    /// Open (and create if needed) a cache directory.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        fs::create_dir_all(dir.as_ref())?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
            lock_dir: fs::canonicalize(dir.as_ref())?,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{index}.wav"))
    }

    pub fn contains(&self, index: usize) -> bool {
        self.path_for(index).is_file()
    }

    pub fn load(&self, index: usize) -> Result<Option<AudioBuffer>> {
        let path = self.path_for(index);
        if !path.is_file() {
            return Ok(None);
        }
        read_wav_file(path).map(Some)
    }

    /// Store a clip, replacing any previous one for `index`.
    ///
    /// Written to a temporary file unique to this writer first, so an
    /// interrupted run never leaves a truncated clip behind.
    pub fn store(&self, index: usize, clip: &AudioBuffer) -> Result<()> {
        let path = self.path_for(index);
        let tmp = self.dir.join(format!(
            "{index}.wav.{}-{}.part",
            std::process::id(),
            PART_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        if let Err(e) = write_wav_file(&tmp, clip, WavEncoding::Float32) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn lock_for(&self, index: usize) -> Arc<Mutex<()>> {
        clip_locks()
            .entry((self.lock_dir.clone(), index))
            .or_default()
            .clone()
    }

    /// Return the cached clip for `index`, producing and storing it first if
    /// absent.
    ///
    /// The returned clip is always the one read back from disk, so a fresh
    /// clip and a cached one are indistinguishable to the caller.
    pub fn get_or_synthesize<F>(&self, index: usize, synthesize: F) -> Result<(AudioBuffer, CacheOutcome)>
    where
        F: FnOnce() -> Result<AudioBuffer>,
    {
        let lock = self.lock_for(index);
        // The guarded value is `()`, so a poisoned lock carries no broken state.
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(clip) = self.load(index)? {
            debug!(index, "Clip cache hit");
            return Ok((clip, CacheOutcome::Hit));
        }

        let clip = synthesize()?;
        self.store(index, &clip)?;
        let stored = read_wav_file(self.path_for(index))?;
        debug!(index, frames = stored.frames(), "Clip synthesized and cached");
        Ok((stored, CacheOutcome::Synthesized))
    }

    /// Best-effort removal of the clips for `indices`, then of the directory
    /// itself if it is left empty. Returns the number of clips removed.
    pub fn cleanup<I: IntoIterator<Item = usize>>(&self, indices: I) -> usize {
        let mut removed = 0;
        for index in indices {
            let path = self.path_for(index);
            if !path.exists() {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %path.display(), "Failed to remove cached clip: {e}"),
            }
            clip_locks().remove_if(&(self.lock_dir.clone(), index), |_, lock| {
                Arc::strong_count(lock) == 1
            });
        }

        let is_empty = fs::read_dir(&self.dir)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if is_empty {
            if let Err(e) = fs::remove_dir(&self.dir) {
                warn!(dir = %self.dir.display(), "Failed to remove clip cache directory: {e}");
            }
        }
        removed
    }
}
