//! Hooks for moving finished videos to and from a hosting service.
//!
//! Nothing here talks to a network; callers bring their own implementations. The codec
//! never depends on these, they only run after an encode or before a decode.

use std::path::{Path, PathBuf};

use crate::error::Result;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Visibility {
    Public,
    #[default]
    Unlisted,
    Private,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadRequest {
    pub path: PathBuf,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub visibility: Visibility,
}

impl UploadRequest {
    pub fn new(path: &Path, title: impl Into<String>) -> Self {
        Self {
            path: path.to_path_buf(),
            title: title.into(),
            description: String::new(),
            tags: vec![],
            visibility: Visibility::default(),
        }
    }
}

pub trait Uploader {
    /// Uploads the video and returns the service's identifier for it.
    fn upload(&mut self, request: &UploadRequest) -> Result<String>;
}

pub trait Downloader {
    /// Fetches the video at `url` and returns where it landed locally.
    fn download(&mut self, url: &str) -> Result<PathBuf>;
}
