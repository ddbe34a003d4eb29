//! Path canonicalization and content hashing.
//!
//! Every cache key in this crate is a canonical path: forward slashes only, no
//! repeated separators, and a non-empty trailing extension. The content hash is
//! derived from that canonical string with fixed seeds, so it is stable for the
//! whole process.

use std::sync::{Mutex, MutexGuard, PoisonError};

use ahash::{HashMap, RandomState};

const HASH_SEEDS: [u64; 4] = [
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
];

/// Replaces backslashes with forward slashes and collapses repeated separators.
pub fn normalize_separators(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_was_separator = false;
    for c in raw.chars() {
        let c = if c == '\\' { '/' } else { c };
        if c == '/' {
            if last_was_separator {
                continue;
            }
            last_was_separator = true;
        } else {
            last_was_separator = false;
        }
        out.push(c);
    }
    out
}

/// Returns the extension of the last path component including its leading dot,
/// or `None` when there is none. Dotfiles such as `.png` have no extension and
/// a trailing dot is an extension of its own (`x.` -> `.`).
pub fn extension_of(path: &str) -> Option<&str> {
    let name = path.rsplit('/').next()?;
    match name.rfind('.') {
        _ if name == ".." => None,
        Some(0) | None => None,
        Some(dot) => Some(&name[dot..]),
    }
}

/// Swaps between the two supported image formats.
pub fn alternate_image_extension(extension: &str) -> &'static str {
    if extension == ".png" { ".bmp" } else { ".png" }
}

/// Builds the on-disk name of an animation frame: `walk.png`, 2 -> `walk002.png`.
pub fn frame_path(path_without_extension: &str, frame: usize, extension: &str) -> String {
    format!("{path_without_extension}{frame:03}{extension}")
}

pub fn content_hash(path: &str) -> u64 {
    let [k0, k1, k2, k3] = HASH_SEEDS;
    RandomState::with_seeds(k0, k1, k2, k3).hash_one(path)
}

/// Append-only reverse lookup from content hash to canonical path.
#[derive(Default)]
pub struct PathHashes {
    entries: Mutex<HashMap<u64, String>>,
}

impl PathHashes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, hash: u64, path: &str) {
        let mut entries = self.lock();
        if entries.get(&hash).is_none_or(|known| known != path) {
            entries.insert(hash, path.to_owned());
        }
    }

    pub fn lookup(&self, hash: u64) -> Option<String> {
        self.lock().get(&hash).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
