//! Metadata-addressed output paths.
//!
//! The final path of a track is derived from its metadata alone, so the
//! existence of that file is the cache: there is no index, TTL or eviction.

use std::path::{Path, PathBuf};

use catalog_parser::TrackMetadata;

/// Characters that are invalid in Windows filenames
const WINDOWS_INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Windows reserved filenames (case-insensitive)
const WINDOWS_RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Sanitize one path component for use on Windows, Linux and macOS.
///
/// Control and reserved characters collapse into a single `_`, leading and
/// trailing spaces and dots are trimmed, reserved device names get a `_`
/// prefix and an empty result becomes `unnamed`.
pub fn sanitize_filename(input: &str) -> String {
    if input.is_empty() {
        return "unnamed".to_string();
    }

    let mut result = String::with_capacity(input.len());
    let mut last_was_replacement = false;

    for c in input.chars() {
        if c.is_control() || WINDOWS_INVALID_CHARS.contains(&c) {
            if !last_was_replacement {
                result.push('_');
                last_was_replacement = true;
            }
        } else {
            result.push(c);
            last_was_replacement = false;
        }
    }

    let trimmed = result.trim_matches(|c| c == ' ' || c == '.');
    if trimmed.is_empty() {
        return "unnamed".to_string();
    }

    let upper = trimmed.to_uppercase();
    for reserved in WINDOWS_RESERVED_NAMES {
        if upper == *reserved || upper.starts_with(&format!("{reserved}.")) {
            return format!("_{trimmed}");
        }
    }

    trimmed.to_string()
}

/// Canonical location of a track: `<root>/<artist>/<album>/<NN> <title><ext>`.
///
/// `extension` includes the leading dot. Pure; equal inputs give equal paths.
pub fn final_path(output_root: &Path, metadata: &TrackMetadata, extension: &str) -> PathBuf {
    let file_name = sanitize_filename(&format!("{:02} {}", metadata.track_number, metadata.title));
    output_root
        .join(sanitize_filename(&metadata.artist))
        .join(sanitize_filename(&metadata.album))
        .join(format!("{file_name}{extension}"))
}

/// Whether a completed artifact already sits at `path`.
pub async fn is_cached(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(title: &str, artist: &str, album: &str, n: u32) -> TrackMetadata {
        TrackMetadata::from_parts(
            Some(title.into()),
            Some(artist.into()),
            Some(album.into()),
            Some(n),
        )
    }

    #[test]
    fn path_layout() {
        let path = final_path(Path::new("/out"), &meta("Song", "Artist", "Album", 3), ".m4a");
        assert_eq!(path, PathBuf::from("/out/Artist/Album/03 Song.m4a"));
    }

    #[test]
    fn path_is_deterministic() {
        let m = meta("Same", "Band", "Record", 12);
        let a = final_path(Path::new("/root"), &m, ".m4a");
        let b = final_path(Path::new("/root"), &m.clone(), ".m4a");
        assert_eq!(a, b);
        assert!(a.ends_with("Band/Record/12 Same.m4a"));
    }

    #[test]
    fn unsafe_components_stay_inside_root() {
        let path = final_path(
            Path::new("/out"),
            &meta("a/b?", "../..", "AC/DC: Live", 1),
            ".m4a",
        );
        assert!(path.starts_with("/out"));
        assert_eq!(path, PathBuf::from("/out/_/AC_DC_ Live/01 a_b_.m4a"));
    }

    #[test]
    fn unknown_metadata_path() {
        let path = final_path(Path::new("/out"), &TrackMetadata::default(), ".m4a");
        assert_eq!(path, PathBuf::from("/out/Unknown/Unknown/01 Unknown.m4a"));
    }

    #[test]
    fn sanitize_reserved_and_empty() {
        assert_eq!(sanitize_filename(""), "unnamed");
        assert_eq!(sanitize_filename("CON"), "_CON");
        assert_eq!(sanitize_filename("  ..  "), "unnamed");
        assert_eq!(sanitize_filename("観覧車?"), "観覧車_");
        assert_eq!(sanitize_filename("a<>:\"b"), "a_b");
    }

    #[test]
    fn sanitize_is_idempotent() {
        for input in ["hello?world", "CON", "  test  ", "...dots...", "x\x00y"] {
            let once = sanitize_filename(input);
            assert_eq!(once, sanitize_filename(&once), "input: {input}");
        }
    }

    #[tokio::test]
    async fn cache_hit_requires_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("x.m4a");
        assert!(!is_cached(&file).await);
        tokio::fs::write(&file, b"data").await.unwrap();
        assert!(is_cached(&file).await);
        assert!(!is_cached(dir.path()).await);
    }
}
