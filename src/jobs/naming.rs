//! Pure parsing helpers for track paths and album catalogue names.
//!
//! The manifest carries media paths like `/abc123.mp4` and album names in the
//! catalogue's combined form `Album（AlbumArtist）`. Both are decomposed here
//! with fixed patterns so the pipeline stays free of string plumbing.

use std::sync::OnceLock;

use regex::Regex;

/// Captures the segment between the last path separator and the `.mp4`
/// extension.
fn media_path_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"/([^/]+)\.mp4").expect("invalid media path pattern"))
}

/// Matches `<album title>（<album artist>）`. The parentheses are the
/// full-width U+FF08 / U+FF09 forms used by the source catalogue.
fn catalogue_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(.*)（(.*)）").expect("invalid catalogue name pattern"))
}

/// Derive the output filename for a track's media path.
///
/// `/foo/abc123.mp4` becomes `abc123.m4a`. Returns `None` when the path does
/// not contain a `/<name>.mp4` segment; callers treat that as a skippable
/// track, not a job failure.
pub fn track_filename(media_path: &str) -> Option<String> {
    media_path_pattern()
        .captures(media_path)
        .map(|caps| format!("{}.m4a", &caps[1]))
}

/// Split a combined catalogue name into `(album_title, album_artist)`.
///
/// A name without the full-width bracket pair is a malformed manifest entry
/// and returns `None`; callers treat that as fatal for the whole job.
pub fn split_catalogue_name(catalogue_name: &str) -> Option<(String, String)> {
    catalogue_name_pattern()
        .captures(catalogue_name)
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
}
