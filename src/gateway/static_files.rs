//! Static asset serving for the web form.
//!
//! Any GET path maps into the static directory. `/`, missing files and paths that would
//! leave the directory are answered with the default document.

use std::path::{Component, Path, PathBuf};
use tracing::debug;

use crate::core::config::ServerConfig;

/// A file read from the static directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticAsset {
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
    default_document: String,
}

impl StaticFiles {
    pub fn new(root: impl Into<PathBuf>, default_document: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            default_document: default_document.into(),
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(&config.static_dir, &config.default_document)
    }

    fn default_path(&self) -> PathBuf {
        self.root.join(&self.default_document)
    }

    /// File a request path maps to, without touching the filesystem
    ///
    /// Only plain path segments are accepted; `..`, absolute and prefixed components fall
    /// back to the default document.
    pub fn resolve(&self, request_path: &str) -> PathBuf {
        let relative = Path::new(request_path.trim_start_matches('/'));

        if relative.as_os_str().is_empty() {
            return self.default_path();
        }

        let safe = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));

        if safe {
            self.root.join(relative)
        } else {
            debug!(request_path, "Path leaves the static directory");
            self.default_path()
        }
    }

    /// Read the asset for `request_path`; `None` when even the default document is missing
    pub async fn load(&self, request_path: &str) -> Option<StaticAsset> {
        let path = self.resolve(request_path);

        let path = match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => path,
            _ => self.default_path(),
        };

        match tokio::fs::read(&path).await {
            Ok(body) => Some(StaticAsset {
                content_type: content_type_for(&path),
                body,
            }),
            Err(err) => {
                debug!(path = %path.display(), error = %err, "Static file unavailable");
                None
            }
        }
    }
}

/// Stylesheets and scripts get their own type; everything else is served as HTML
pub fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("css") => "text/css",
        Some("js") => "text/javascript",
        _ => "text/html",
    }
}
