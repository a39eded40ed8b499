//! Output path planning with collision handling.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;

use vbatch_models::OutputFormat;

/// Plans output paths for a batch.
///
/// A candidate collides when it already exists on disk or was planned for
/// another job in the same batch; collisions get a numeric suffix instead
/// of being silently overwritten. Overwrite mode skips both checks.
pub struct OutputPlanner {
    reserved: Mutex<HashSet<PathBuf>>,
    overwrite: bool,
}

impl OutputPlanner {
    pub fn new(overwrite: bool) -> Self {
        Self {
            reserved: Mutex::new(HashSet::new()),
            overwrite,
        }
    }

    /// Resolve `dir/stem.ext`, disambiguating with `_1`, `_2`, ... until
    /// the candidate is free.
    pub async fn plan(&self, dir: &Path, stem: &str, format: OutputFormat) -> PathBuf {
        let ext = format.extension();
        let mut candidate = dir.join(format!("{stem}.{ext}"));

        let mut reserved = self.reserved.lock().await;
        if !self.overwrite {
            let mut counter = 1u32;
            while candidate.exists() || reserved.contains(&candidate) {
                candidate = dir.join(format!("{stem}_{counter}.{ext}"));
                counter += 1;
            }
        }
        reserved.insert(candidate.clone());
        candidate
    }
}
