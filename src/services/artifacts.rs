//! Local storage for generated images.

use crate::core::config::ArtifactConfig;
use std::io;
use std::path::{Path, PathBuf};

/// Writes image bytes to a directory under random names and hands back the
/// URL they are served from.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
    url_prefix: String,
    public_base_url: Option<String>,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            url_prefix: normalize_prefix(&url_prefix.into()),
            public_base_url: None,
        }
    }

    /// Build the store when artifacts are enabled.
    pub fn from_config(config: &ArtifactConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        let mut store = Self::new(config.dir.clone(), config.url_prefix.clone());
        store.public_base_url = config
            .public_base_url
            .as_deref()
            .map(|base| base.trim_end_matches('/').to_string())
            .filter(|base| !base.is_empty());
        Some(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn url_prefix(&self) -> &str {
        &self.url_prefix
    }

    /// Write `data` as `<dir>/<uuid>.<ext>` and return its URL.
    ///
    /// The extension is sniffed from the bytes; unknown formats are saved
    /// as `.png`.
    pub async fn persist(&self, data: &[u8]) -> io::Result<String> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let extension = infer::get(data)
            .filter(|kind| kind.mime_type().starts_with("image/"))
            .map(|kind| kind.extension())
            .unwrap_or("png");
        let file_name = format!("{}.{}", uuid::Uuid::new_v4(), extension);

        tokio::fs::write(self.dir.join(&file_name), data).await?;
        Ok(self.url_for(&file_name))
    }

    /// URL a stored file is served from.
    pub fn url_for(&self, file_name: &str) -> String {
        let path = format!("{}/{}", self.url_prefix, file_name);
        match &self.public_base_url {
            Some(base) => format!("{}{}", base, path),
            None => path,
        }
    }
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}
