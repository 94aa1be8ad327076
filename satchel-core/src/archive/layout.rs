use std::path::{Component, Path};

use crate::domain::MediaKind;

pub const DATA_ENTRY: &str = "data.json";
pub const IMAGES_PREFIX: &str = "images/";
pub const VOICES_PREFIX: &str = "voices/";

/// Base name of a stored media path, accepting both separators since records
/// may come from another platform.
pub fn base_name(stored: &str) -> Option<&str> {
    let name = stored
        .rsplit(['/', '\\'])
        .next()
        .map(str::trim)
        .unwrap_or("");
    if name.is_empty() || name == "." || name == ".." {
        None
    } else {
        Some(name)
    }
}

pub fn entry_name(kind: MediaKind, stored: &str) -> Option<String> {
    base_name(stored).map(|n| format!("{}{}", kind.prefix(), n))
}

/// Reverse of `entry_name`: which media kind and file name an entry holds.
pub fn split_media_entry(entry: &str) -> Option<(MediaKind, &str)> {
    let (kind, rest) = if let Some(rest) = entry.strip_prefix(IMAGES_PREFIX) {
        (MediaKind::Image, rest)
    } else if let Some(rest) = entry.strip_prefix(VOICES_PREFIX) {
        (MediaKind::Voice, rest)
    } else {
        return None;
    };
    if rest.is_empty() || rest.contains('/') {
        return None;
    }
    Some((kind, rest))
}

pub fn is_safe_entry(name: &str) -> bool {
    if name.is_empty() || name.contains('\\') {
        return false;
    }
    let p = Path::new(name);
    !p.is_absolute() && p.components().all(|c| matches!(c, Component::Normal(_)))
}
