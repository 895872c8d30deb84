//! Metadata tagging of M4A files.
//!
//! Writes the iTunes-style atoms (title, artist, album, album artist, track
//! number, cover art) in place on a local file.

use std::path::Path;

use serde::Serialize;

/// Cover image encoding. Inferred from the album-art URL's file extension,
/// not from the image bytes; a URL without a `.png` suffix is treated as
/// JPEG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Jpeg,
    Png,
}

impl ImageKind {
    pub fn from_url(url: &str) -> Self {
        if url.to_lowercase().ends_with(".png") {
            ImageKind::Png
        } else {
            ImageKind::Jpeg
        }
    }
}

/// Fetched album-art bytes with their inferred encoding.
#[derive(Debug, Clone)]
pub struct CoverArt {
    pub kind: ImageKind,
    pub data: Vec<u8>,
}

/// Full tag set applied to one track.
#[derive(Debug, Clone)]
pub struct TrackTags {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub album_artist: String,
    /// 1-based position in the manifest.
    pub track_number: u16,
    pub total_tracks: u16,
    pub cover: Option<CoverArt>,
}

#[derive(Debug, thiserror::Error)]
pub enum TagError {
    #[error("Failed to read MP4 container: {0}")]
    Read(String),
    #[error("Failed to write tags: {0}")]
    Write(String),
}

/// Tag-editing seam. Production uses [`Mp4TagWriter`]; pipeline tests plug
/// in a no-op.
pub trait TagWriter: Send + Sync {
    fn write(&self, path: &Path, tags: &TrackTags) -> Result<(), TagError>;
}

/// mp4ameta-backed writer for real MP4/M4A containers.
pub struct Mp4TagWriter;

impl TagWriter for Mp4TagWriter {
    fn write(&self, path: &Path, tags: &TrackTags) -> Result<(), TagError> {
        let mut tag =
            mp4ameta::Tag::read_from_path(path).map_err(|e| TagError::Read(e.to_string()))?;

        tag.set_title(tags.title.as_str());
        tag.set_artist(tags.artist.as_str());
        tag.set_album(tags.album.as_str());
        tag.set_album_artist(tags.album_artist.as_str());
        tag.set_track_number(tags.track_number);
        tag.set_total_tracks(tags.total_tracks);

        if let Some(cover) = &tags.cover {
            let artwork = match cover.kind {
                ImageKind::Jpeg => mp4ameta::Img::jpeg(cover.data.clone()),
                ImageKind::Png => mp4ameta::Img::png(cover.data.clone()),
            };
            tag.set_artwork(artwork);
        }

        tag.write_to_path(path)
            .map_err(|e| TagError::Write(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn png_extension_infers_png() {
        assert_eq!(ImageKind::from_url("https://x/cover.png"), ImageKind::Png);
        assert_eq!(ImageKind::from_url("https://x/COVER.PNG"), ImageKind::Png);
    }

    #[test]
    fn anything_else_defaults_to_jpeg() {
        assert_eq!(ImageKind::from_url("https://x/cover.jpg"), ImageKind::Jpeg);
        assert_eq!(ImageKind::from_url("https://x/cover.webp"), ImageKind::Jpeg);
        assert_eq!(ImageKind::from_url("https://x/cover"), ImageKind::Jpeg);
        // Query strings defeat the suffix check; only the raw URL string
        // is inspected.
        assert_eq!(
            ImageKind::from_url("https://x/cover.png?size=600"),
            ImageKind::Jpeg
        );
    }

    #[test]
    fn reading_a_non_mp4_file_is_a_read_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"not an mp4").unwrap();

        let tags = TrackTags {
            title: "t".into(),
            artist: "a".into(),
            album: "al".into(),
            album_artist: "aa".into(),
            track_number: 1,
            total_tracks: 1,
            cover: None,
        };

        let result = Mp4TagWriter.write(file.path(), &tags);
        assert!(matches!(result, Err(TagError::Read(_))));
    }
}
