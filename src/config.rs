//! Tunables for the document substrate.
//!
//! A serde-derived struct with per-field default functions so partial JSON
//! can be merged over defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

fn default_arena_initial_size() -> usize {
    4 * 1024
}

fn default_arena_max_size() -> usize {
    1024 * 1024
}

fn default_autosave_edit_threshold() -> u32 {
    300
}

fn default_autosave_idle_secs() -> u64 {
    30
}

/// Depth of the recent-points stack (§3.1, §9 Open Question #2).
///
/// The source varies between 4 and 16 across revisions; this
/// implementation settles on 8 as a fixed middle ground (see DESIGN.md).
fn default_recent_points_depth() -> usize {
    8
}

/// Configuration for a [`crate::document::Document`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocConfig {
    /// Initial size of a freshly allocated arena.
    #[serde(default = "default_arena_initial_size")]
    pub arena_initial_size: usize,

    /// Arenas double in size on each new allocation up to this cap.
    #[serde(default = "default_arena_max_size")]
    pub arena_max_size: usize,

    /// Flush autosave after this many edits since the last flush.
    #[serde(default = "default_autosave_edit_threshold")]
    pub autosave_edit_threshold: u32,

    /// Flush autosave after this much idle time since the last edit.
    #[serde(
        default = "default_autosave_idle",
        with = "duration_secs",
        rename = "autosave_idle_secs"
    )]
    pub autosave_idle: Duration,

    /// Depth of the recent-points stack (`doc:push-point` / `doc:pop-point`).
    #[serde(default = "default_recent_points_depth")]
    pub recent_points_depth: usize,

    /// Directory holding autosave index symlinks. Resolved at construction
    /// time from `EDLIB_AUTOSAVE`, falling back to `$HOME/.edlib_autosave`.
    #[serde(skip)]
    pub autosave_index_dir: Option<PathBuf>,
}

fn default_autosave_idle() -> Duration {
    Duration::from_secs(default_autosave_idle_secs())
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

impl Default for DocConfig {
    fn default() -> Self {
        DocConfig {
            arena_initial_size: default_arena_initial_size(),
            arena_max_size: default_arena_max_size(),
            autosave_edit_threshold: default_autosave_edit_threshold(),
            autosave_idle: default_autosave_idle(),
            recent_points_depth: default_recent_points_depth(),
            autosave_index_dir: resolve_autosave_index_dir(),
        }
    }
}

/// Resolves the autosave index directory from `EDLIB_AUTOSAVE`, falling back
/// to `$HOME/.edlib_autosave` via the `dirs` crate.
fn resolve_autosave_index_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("EDLIB_AUTOSAVE") {
        if !dir.is_empty() {
            return Some(PathBuf::from(dir));
        }
    }
    dirs::home_dir().map(|home| home.join(".edlib_autosave"))
}
