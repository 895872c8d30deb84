//! Delivery strategies for tagged files.
//!
//! A deployment runs in exactly one of two modes: hand each file to the
//! upload client, or collect everything into one downloadable zip.

mod archive;
mod uploader;

pub use archive::{ArchiveBuilder, ArchiveError};
pub use uploader::{UploadClient, YtMusicUploader};
