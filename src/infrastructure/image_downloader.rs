//! Image candidate download and on-disk storage under the media directory

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::domain::errors::FetchError;
use crate::domain::services::{PageFetcher, slugify};
use crate::infrastructure::config::ImageConfig;

const DEFAULT_EXTENSION: &str = "jpg";
const FALLBACK_STEM: &str = "image";
const KNOWN_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "webp", "gif", "avif"];

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Image {url} exceeds {limit} bytes")]
    TooLarge { url: String, limit: u64 },

    #[error("Image {url} has non-image content type {content_type:?}")]
    NotAnImage {
        url: String,
        content_type: Option<String>,
    },

    #[error("Image fetch failed: {0}")]
    Fetch(FetchError),

    #[error("Image storage failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No image candidate could be downloaded")]
    NoCandidates,
}

impl From<FetchError> for ImageError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::BodyTooLarge { url, limit, .. } => Self::TooLarge { url, limit },
            other => Self::Fetch(other),
        }
    }
}

/// An image written to the media directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub source_url: String,
    /// Absolute location on disk, used for rollback
    pub absolute_path: PathBuf,
    /// Path relative to the media root, stored in the catalog (`products/<file>`)
    pub catalog_path: String,
    pub bytes: usize,
}

/// Files under `<media_dir>/<subdirectory>`
#[derive(Debug, Clone)]
pub struct ImageStore {
    media_dir: PathBuf,
    subdirectory: String,
}

impl ImageStore {
    pub fn new(media_dir: impl Into<PathBuf>, subdirectory: impl Into<String>) -> Self {
        Self {
            media_dir: media_dir.into(),
            subdirectory: subdirectory.into(),
        }
    }

    pub fn directory(&self) -> PathBuf {
        self.media_dir.join(&self.subdirectory)
    }

    /// First free `<slug>_<index>.<ext>`, then `<slug>_<index>_<n>.<ext>`.
    /// The slug is re-slugified so the name never leaves the directory.
    pub fn available_file_name(&self, slug: &str, index: usize, extension: &str) -> String {
        let dir = self.directory();
        let stem = match slugify(slug) {
            stem if stem.is_empty() => FALLBACK_STEM.to_string(),
            stem => stem,
        };
        let base = format!("{stem}_{index}");
        let mut candidate = format!("{base}.{extension}");
        let mut counter = 1;
        while dir.join(&candidate).exists() {
            candidate = format!("{base}_{counter}.{extension}");
            counter += 1;
        }
        candidate
    }

    pub async fn save(
        &self,
        slug: &str,
        index: usize,
        extension: &str,
        bytes: &[u8],
        source_url: &str,
    ) -> Result<StoredImage, ImageError> {
        let dir = self.directory();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| ImageError::Io {
                path: dir.clone(),
                source,
            })?;

        let file_name = self.available_file_name(slug, index, extension);
        let absolute_path = dir.join(&file_name);
        tokio::fs::write(&absolute_path, bytes)
            .await
            .map_err(|source| ImageError::Io {
                path: absolute_path.clone(),
                source,
            })?;

        Ok(StoredImage {
            source_url: source_url.to_string(),
            absolute_path,
            catalog_path: format!("{}/{}", self.subdirectory, file_name),
            bytes: bytes.len(),
        })
    }

    /// Delete a stored file; a file that is already gone is not an error
    pub async fn remove(&self, image: &StoredImage) -> Result<(), ImageError> {
        match tokio::fs::remove_file(&image.absolute_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(ImageError::Io {
                path: image.absolute_path.clone(),
                source,
            }),
        }
    }
}

/// Result of one candidate attempt, reported to the audit log
#[derive(Debug)]
pub struct CandidateAttempt {
    pub url: String,
    pub error: Option<String>,
}

#[derive(Debug)]
pub struct ImageDownload {
    pub stored: Result<StoredImage, ImageError>,
    pub attempts: Vec<CandidateAttempt>,
}

pub struct ImageDownloader {
    fetcher: Arc<dyn PageFetcher>,
    store: ImageStore,
    max_bytes: u64,
}

impl ImageDownloader {
    pub fn new(fetcher: Arc<dyn PageFetcher>, store: ImageStore, max_bytes: u64) -> Self {
        Self {
            fetcher,
            store,
            max_bytes,
        }
    }

    pub fn from_config(fetcher: Arc<dyn PageFetcher>, config: &ImageConfig) -> Self {
        Self::new(
            fetcher,
            ImageStore::new(&config.media_dir, &config.subdirectory),
            config.max_bytes,
        )
    }

    pub fn store(&self) -> &ImageStore {
        &self.store
    }

    /// Try candidates in order until one downloads and is stored
    pub async fn download_first(
        &self,
        candidates: &[String],
        referer: &str,
        slug: &str,
    ) -> ImageDownload {
        let mut attempts = Vec::with_capacity(candidates.len());
        let mut last_error = ImageError::NoCandidates;

        for (index, url) in candidates.iter().enumerate() {
            match self.download_one(url, referer, slug, index).await {
                Ok(stored) => {
                    info!("🖼️ Stored image {} ({} bytes)", stored.catalog_path, stored.bytes);
                    attempts.push(CandidateAttempt {
                        url: url.clone(),
                        error: None,
                    });
                    return ImageDownload {
                        stored: Ok(stored),
                        attempts,
                    };
                }
                Err(e) => {
                    warn!("Image candidate {} rejected: {}", url, e);
                    attempts.push(CandidateAttempt {
                        url: url.clone(),
                        error: Some(e.to_string()),
                    });
                    last_error = e;
                }
            }
        }

        ImageDownload {
            stored: Err(last_error),
            attempts,
        }
    }

    async fn download_one(
        &self,
        url: &str,
        referer: &str,
        slug: &str,
        index: usize,
    ) -> Result<StoredImage, ImageError> {
        let fetched = self.fetcher.fetch_binary(url, referer, self.max_bytes).await?;

        if fetched.bytes.len() as u64 > self.max_bytes {
            return Err(ImageError::TooLarge {
                url: url.to_string(),
                limit: self.max_bytes,
            });
        }

        let content_type = fetched
            .content_type
            .as_deref()
            .map(|ct| ct.split(';').next().unwrap_or(ct).trim().to_ascii_lowercase());
        if !content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("image/"))
        {
            return Err(ImageError::NotAnImage {
                url: url.to_string(),
                content_type: fetched.content_type,
            });
        }

        let extension = image_extension(&fetched.final_url, content_type.as_deref());
        debug!("Saving {} as .{} for {}", url, extension, slug);
        self.store
            .save(slug, index, &extension, &fetched.bytes, url)
            .await
    }
}

/// Extension from the URL path when it names a known image type, else from the MIME type
pub fn image_extension(url: &str, content_type: Option<&str>) -> String {
    let from_url = Url::parse(url).ok().and_then(|u| {
        Path::new(u.path())
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .filter(|e| KNOWN_EXTENSIONS.contains(&e.as_str()))
    });
    if let Some(ext) = from_url {
        return ext;
    }

    let from_mime = match content_type {
        Some("image/png") => "png",
        Some("image/webp") => "webp",
        Some("image/gif") => "gif",
        Some("image/avif") => "avif",
        Some("image/svg+xml") => "svg",
        _ => DEFAULT_EXTENSION,
    };
    from_mime.to_string()
}
