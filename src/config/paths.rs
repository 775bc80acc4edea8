//! Canonical paths under the state directory.
//!
//! Single source of truth - import this instead of hardcoding paths.
//!
//! | Path | Purpose |
//! |------|---------|
//! | `<home>/space_law.db` | default SQLite database |
//! | `<home>/rulesets/*.yaml` | named marker rulesets |
//! | `<home>/batches/<id>/events.jsonl` | orchestrator batch logs |

use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Directory holding the config file, searched upward from the cwd
pub const CONFIG_DIR: &str = ".spacelaw";

pub const CONFIG_FILE: &str = "config.yaml";

pub const DATABASE_FILE: &str = "space_law.db";

pub const RULESETS_DIR: &str = "rulesets";

pub const BATCHES_DIR: &str = "batches";

pub const BATCH_LOG_FILE: &str = "events.jsonl";

pub fn database_path(home: &Path) -> PathBuf {
    home.join(DATABASE_FILE)
}

pub fn rulesets_dir(home: &Path) -> PathBuf {
    home.join(RULESETS_DIR)
}

pub fn batches_dir(home: &Path) -> PathBuf {
    home.join(BATCHES_DIR)
}

/// Directory of a single batch
pub fn batch_dir(batches: &Path, batch_id: &Uuid) -> PathBuf {
    batches.join(batch_id.to_string())
}

/// Event log of a single batch
pub fn batch_log(batches: &Path, batch_id: &Uuid) -> PathBuf {
    batch_dir(batches, batch_id).join(BATCH_LOG_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_log_layout() {
        let id = Uuid::new_v4();
        let home = PathBuf::from("/tmp/spacelaw");
        let path = batch_log(&batches_dir(&home), &id);
        assert_eq!(
            path,
            PathBuf::from(format!("/tmp/spacelaw/batches/{}/events.jsonl", id))
        );
    }
}
