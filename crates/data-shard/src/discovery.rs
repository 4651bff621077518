//! Shard discovery on the root rank
//!
//! Shard files are named `part-<ordinal>` with a plain decimal ordinal.
//! Discovery sorts by the parsed ordinal, so the resulting partition does not
//! depend on the order in which the filesystem lists entries.

use std::fs;
use std::path::Path;

use runtime_core::{Error, Result, ShardOrdinal};
use tracing::{debug, warn};

/// File name prefix of every shard
pub const SHARD_PREFIX: &str = "part-";

/// File name of shard `ordinal`
pub fn shard_file_name(ordinal: ShardOrdinal) -> String {
    format!("{}{}", SHARD_PREFIX, ordinal)
}

/// Parse the ordinal of a canonical shard file name
///
/// Only names that [`shard_file_name`] would produce are accepted: no sign,
/// no leading zeros, no suffix.
pub fn parse_shard_ordinal(name: &str) -> Option<ShardOrdinal> {
    let digits = name.strip_prefix(SHARD_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if digits.len() > 1 && digits.starts_with('0') {
        return None;
    }
    digits.parse().ok()
}

/// List the shard ordinals present in `dir`, ascending
///
/// Only regular, non-hidden files count. Regular files that are not named
/// like shards are skipped.
pub fn discover_shards(dir: &Path) -> Result<Vec<ShardOrdinal>> {
    let entries = fs::read_dir(dir).map_err(|e| Error::DirectoryUnreadable {
        path: dir.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut ordinals = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "Skipping unreadable directory entry");
                continue;
            }
        };

        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        if !is_file {
            continue;
        }

        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }

        match parse_shard_ordinal(name) {
            Some(ordinal) => ordinals.push(ordinal),
            None => debug!(file = name, "Ignoring file not named like a shard"),
        }
    }

    ordinals.sort_unstable();
    debug!(path = %dir.display(), count = ordinals.len(), "Discovered shards");
    Ok(ordinals)
}
