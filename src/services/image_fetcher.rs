use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::services::http::HttpSource;
use crate::utils::sanitize_file_stem;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Player,
    Team,
}

impl EntityKind {
    fn extension(self) -> &'static str {
        match self {
            EntityKind::Player => "png",
            EntityKind::Team => "svg",
        }
    }

    fn label(self) -> &'static str {
        match self {
            EntityKind::Player => "headshot",
            EntityKind::Team => "logo",
        }
    }

    fn fallback_stem(self) -> &'static str {
        match self {
            EntityKind::Player => "player",
            EntityKind::Team => "team",
        }
    }
}

/// Downloads player headshots and team logos into a local cache.
///
/// A file already on disk is always a hit; there is no expiry.
pub struct ImageFetcher {
    http: Arc<dyn HttpSource>,
    player_dir: PathBuf,
    team_dir: PathBuf,
    headshot_url_template: String,
    logo_url_template: String,
}

impl ImageFetcher {
    pub fn new(http: Arc<dyn HttpSource>, config: &Config) -> Self {
        Self {
            http,
            player_dir: config.player_images_dir(),
            team_dir: config.team_logos_dir(),
            headshot_url_template: config.headshot_url_template.clone(),
            logo_url_template: config.logo_url_template.clone(),
        }
    }

    /// `{dir}/{id}_{sanitized_name}.{ext}`
    pub fn local_path(&self, kind: EntityKind, entity_id: &str, display_name: &str) -> PathBuf {
        let dir = match kind {
            EntityKind::Player => &self.player_dir,
            EntityKind::Team => &self.team_dir,
        };
        let stem = sanitize_file_stem(display_name, kind.fallback_stem());
        dir.join(format!("{}_{}.{}", entity_id, stem, kind.extension()))
    }

    pub fn remote_url(&self, kind: EntityKind, entity_id: &str) -> String {
        let template = match kind {
            EntityKind::Player => &self.headshot_url_template,
            EntityKind::Team => &self.logo_url_template,
        };
        template.replace("{id}", entity_id)
    }

    /// Returns the cached path, downloading first when needed. `None` means
    /// the image could not be obtained; callers leave their path unset.
    pub async fn fetch(&self, kind: EntityKind, entity_id: &str, display_name: &str) -> Option<PathBuf> {
        let path = self.local_path(kind, entity_id, display_name);

        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tracing::debug!("Using cached {} for {}", kind.label(), display_name);
            return Some(path);
        }

        let url = self.remote_url(kind, entity_id);
        let bytes = match self.http.get_bytes(&url).await {
            Ok(bytes) if bytes.is_empty() => {
                tracing::warn!("Empty {} body for {}, treating as not found", kind.label(), display_name);
                return None;
            }
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Failed to download {} for {}: {}", kind.label(), display_name, e);
                return None;
            }
        };

        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                tracing::warn!("Cannot create {}: {}", parent.display(), e);
                return None;
            }
        }

        // only a complete file may appear at the cache path
        let partial = path.with_extension(format!("{}.part", kind.extension()));
        if let Err(e) = Self::write_atomically(&partial, &path, &bytes).await {
            tracing::warn!("Failed to write {}: {}", path.display(), e);
            tokio::fs::remove_file(&partial).await.ok();
            return None;
        }

        tracing::info!("Downloaded {} for {}", kind.label(), display_name);
        Some(path)
    }

    async fn write_atomically(partial: &Path, dest: &Path, bytes: &[u8]) -> std::io::Result<()> {
        tokio::fs::write(partial, bytes).await?;
        tokio::fs::rename(partial, dest).await
    }
}
