//! Storage for uploaded images, audio tracks and message attachments.

use crate::config::{MediaConfig, SocialenzPaths};
use crate::error::{SocialError, SocialResult};
use anyhow::{anyhow, Context};
use bytes::Bytes;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

pub const MEDIA_ROUTE_PREFIX: &str = "/media/";
/// Post images are bounded to 800x800 and recompressed by the media host.
const POST_IMAGE_TRANSFORMATION: &str = "c_limit,w_800,h_800,q_80";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    PostImage,
    Music,
    ProfilePicture,
    Attachment,
}

impl MediaKind {
    fn folder(&self) -> &'static str {
        match self {
            MediaKind::PostImage => "posts",
            MediaKind::Music => "music",
            MediaKind::ProfilePicture => "profiles",
            MediaKind::Attachment => "messages",
        }
    }
}

#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub kind: MediaKind,
    pub file_name: Option<String>,
    pub data: Bytes,
}

/// Type information sniffed from the upload's leading bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SniffedType {
    pub mime: String,
    pub extension: String,
}

/// Rejects uploads whose content does not match what `kind` requires.
pub fn sniff(upload: &MediaUpload) -> SocialResult<SniffedType> {
    if upload.data.is_empty() {
        return Err(SocialError::bad_request("Uploaded file is empty"));
    }
    let detected = infer::get(&upload.data);
    let accepted = match (upload.kind, detected.as_ref().map(|t| t.matcher_type())) {
        (MediaKind::PostImage | MediaKind::ProfilePicture, Some(infer::MatcherType::Image)) => true,
        (MediaKind::Music, Some(infer::MatcherType::Audio)) => true,
        (MediaKind::Attachment, _) => true,
        _ => false,
    };
    if !accepted {
        let expected = match upload.kind {
            MediaKind::Music => "an audio file",
            _ => "an image",
        };
        return Err(SocialError::bad_request(format!("Uploaded file must be {expected}")));
    }
    Ok(match detected {
        Some(kind) => SniffedType {
            mime: kind.mime_type().to_string(),
            extension: kind.extension().to_string(),
        },
        None => SniffedType {
            mime: "application/octet-stream".to_string(),
            extension: upload
                .file_name
                .as_deref()
                .and_then(|name| Path::new(name).extension())
                .and_then(|ext| ext.to_str())
                .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
                .unwrap_or("bin")
                .to_ascii_lowercase(),
        },
    })
}

/// Where uploads end up. Local storage serves files from `media/`; the hosted
/// variant hands them to an external media host and keeps only the returned URL.
#[derive(Clone)]
pub enum MediaStore {
    Local(LocalMediaStore),
    Hosted(HostedMediaStore),
}

impl MediaStore {
    pub fn from_config(paths: &SocialenzPaths, config: &MediaConfig) -> anyhow::Result<Self> {
        match config.upload_url.as_deref() {
            Some(url) => Ok(MediaStore::Hosted(HostedMediaStore::new(
                url.to_string(),
                config.upload_preset.clone(),
            )?)),
            None => Ok(MediaStore::Local(LocalMediaStore::new(paths.media_dir.clone()))),
        }
    }

    /// Returns the public URL of the stored file.
    pub async fn upload(&self, upload: MediaUpload) -> SocialResult<String> {
        let sniffed = sniff(&upload)?;
        match self {
            MediaStore::Local(store) => store.store(&upload, &sniffed).await,
            MediaStore::Hosted(store) => store.store(&upload, &sniffed).await,
        }
    }

    /// Best-effort removal of media that never got attached to a record.
    pub async fn discard(&self, url: &str) {
        match self {
            MediaStore::Local(store) => {
                if let Err(err) = store.remove(url).await {
                    tracing::warn!(error = ?err, url, "failed to remove orphaned media");
                }
            }
            MediaStore::Hosted(_) => {
                tracing::warn!(url, "orphaned media left on media host");
            }
        }
    }

    /// Whether `url` points at a file this store can remove. Hosted uploads are never removable
    /// from here, and external or default picture URLs belong to nobody.
    pub fn is_managed(&self, url: &str) -> bool {
        match self {
            MediaStore::Local(_) => url
                .strip_prefix(MEDIA_ROUTE_PREFIX)
                .and_then(safe_media_name)
                .is_some(),
            MediaStore::Hosted(_) => false,
        }
    }

    pub fn local_dir(&self) -> Option<&Path> {
        match self {
            MediaStore::Local(store) => Some(&store.root),
            MediaStore::Hosted(_) => None,
        }
    }
}

#[derive(Clone)]
pub struct LocalMediaStore {
    root: PathBuf,
}

impl LocalMediaStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    async fn store(&self, upload: &MediaUpload, sniffed: &SniffedType) -> SocialResult<String> {
        fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("failed to create media directory {}", self.root.display()))?;
        let name = format!(
            "{}-{}.{}",
            upload.kind.folder(),
            Uuid::new_v4(),
            sniffed.extension
        );
        let path = self.root.join(&name);
        fs::write(&path, &upload.data)
            .await
            .with_context(|| format!("failed to write media to {}", path.display()))?;
        tracing::debug!(path = %path.display(), mime = %sniffed.mime, "stored media locally");
        Ok(format!("{MEDIA_ROUTE_PREFIX}{name}"))
    }

    async fn remove(&self, url: &str) -> anyhow::Result<()> {
        let name = url
            .strip_prefix(MEDIA_ROUTE_PREFIX)
            .and_then(safe_media_name)
            .ok_or_else(|| anyhow!("not a local media url: {url}"))?;
        fs::remove_file(self.root.join(name)).await?;
        Ok(())
    }
}

/// Accepts only flat file names made of `[A-Za-z0-9._-]`.
pub fn safe_media_name(name: &str) -> Option<&str> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
    valid.then_some(name)
}

#[derive(Clone)]
pub struct HostedMediaStore {
    client: reqwest::Client,
    upload_url: String,
    upload_preset: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HostedUploadReply {
    secure_url: String,
}

impl HostedMediaStore {
    pub fn new(upload_url: String, upload_preset: Option<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("socialenz_backend/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build media host client")?;
        Ok(Self {
            client,
            upload_url,
            upload_preset,
        })
    }

    async fn store(&self, upload: &MediaUpload, sniffed: &SniffedType) -> SocialResult<String> {
        let file_name = format!("upload.{}", sniffed.extension);
        let part = reqwest::multipart::Part::bytes(upload.data.to_vec())
            .file_name(file_name)
            .mime_str(&sniffed.mime)
            .context("invalid media type")?;
        let mut form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("folder", upload.kind.folder());
        if let Some(preset) = &self.upload_preset {
            form = form.text("upload_preset", preset.clone());
        }
        if upload.kind == MediaKind::PostImage {
            form = form.text("transformation", POST_IMAGE_TRANSFORMATION);
        }
        if upload.kind == MediaKind::Music {
            form = form.text("resource_type", "video");
        }

        let reply = self
            .client
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .await
            .context("media host request failed")?
            .error_for_status()
            .context("media host rejected upload")?
            .json::<HostedUploadReply>()
            .await
            .context("media host reply missing secure_url")?;
        Ok(reply.secure_url)
    }
}
