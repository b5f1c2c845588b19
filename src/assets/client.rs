//! Asset client: collection resolution plus load/upload for every locator kind.
//!
//! Local files, remote URLs and inline data URIs are first turned into a
//! [`LoadedAsset`] (bytes, filename, content type) and then all go through
//! the same [`AssetClient::upload_bytes`] path. Splitting *load* from
//! *upload* lets the migrator describe an image from the bytes it already
//! holds instead of fetching it twice.
//!
//! Every per-reference operation returns [`ItemError`]; only
//! [`AssetClient::ensure_collection`] can fail fatally.

use crate::assets::store::{AssetStore, Collection, LoadedAsset, UploadResult};
use crate::error::{ItemError, MigrateError};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Url;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::{Uuid, Variant, Version};

/// Front door to an [`AssetStore`] plus the HTTP client used for remote images.
pub struct AssetClient {
    store: Arc<dyn AssetStore>,
    http: reqwest::Client,
}

impl AssetClient {
    pub fn new(store: Arc<dyn AssetStore>, timeout_secs: u64) -> Result<Self, MigrateError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| MigrateError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self { store, http })
    }

    /// Find the collection named `name`, creating it if absent.
    ///
    /// The returned id must be a well-formed UUIDv4; anything else is fatal.
    pub async fn ensure_collection(&self, name: &str) -> Result<Collection, MigrateError> {
        let unavailable =
            |e: crate::assets::store::StoreError| MigrateError::CollectionUnavailable {
                name: name.to_string(),
                detail: e.to_string(),
            };

        let record = match self.store.find_collection(name).await.map_err(unavailable)? {
            Some(existing) => {
                debug!("Using existing collection '{}' ({})", name, existing.id);
                existing
            }
            None => {
                info!("Creating collection '{}'", name);
                self.store.create_collection(name).await.map_err(unavailable)?
            }
        };

        let id = parse_uuid_v4(&record.id).ok_or_else(|| MigrateError::InvalidCollectionId {
            id: record.id.clone(),
        })?;

        Ok(Collection {
            id,
            name: record.name,
        })
    }

    /// Whether `url` already points into the store.
    pub fn is_hosted(&self, url: &str) -> bool {
        self.store.owns_url(url)
    }

    // ── Load ─────────────────────────────────────────────────────────────

    /// Map a local locator to a file-system path.
    ///
    /// A `file://` prefix is stripped; relative paths resolve against the
    /// document's directory, not the process working directory.
    pub fn resolve_local_path(locator: &str, base_dir: &Path) -> PathBuf {
        let stripped = locator.strip_prefix("file://").unwrap_or(locator);
        let path = Path::new(stripped);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    pub async fn load_local(
        &self,
        locator: &str,
        base_dir: &Path,
    ) -> Result<LoadedAsset, ItemError> {
        let path = Self::resolve_local_path(locator, base_dir);
        if !path.is_file() {
            return Err(ItemError::FileNotFound { path });
        }

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| ItemError::ReadFailed {
                path: path.clone(),
                detail: e.to_string(),
            })?;

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        let content_type = path
            .extension()
            .and_then(|e| e.to_str())
            .map(mime_for_extension)
            .unwrap_or("application/octet-stream")
            .to_string();

        Ok(LoadedAsset {
            bytes,
            filename,
            content_type,
        })
    }

    pub async fn load_remote(&self, url: &str) -> Result<LoadedAsset, ItemError> {
        let fetch_failed = |detail: String| ItemError::FetchFailed {
            url: url.to_string(),
            detail,
        };

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_failed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(fetch_failed(format!("HTTP {}", response.status())));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .filter(|v| !v.is_empty());

        let bytes = response
            .bytes()
            .await
            .map_err(|e| fetch_failed(e.to_string()))?;

        let filename = filename_from_url(url, content_type.as_deref());
        let content_type = content_type.unwrap_or_else(|| {
            Path::new(&filename)
                .extension()
                .and_then(|e| e.to_str())
                .map(mime_for_extension)
                .unwrap_or("application/octet-stream")
                .to_string()
        });

        Ok(LoadedAsset {
            bytes: bytes.to_vec(),
            filename,
            content_type,
        })
    }

    pub fn load_base64(&self, data_uri: &str) -> Result<LoadedAsset, ItemError> {
        let parsed = DataUri::parse(data_uri)?;
        Ok(LoadedAsset {
            filename: format!("image.{}", extension_for_mime(&parsed.mime)),
            content_type: parsed.mime,
            bytes: parsed.bytes,
        })
    }

    // ── Upload ───────────────────────────────────────────────────────────

    /// The single upload path every locator kind converges on.
    pub async fn upload_bytes(
        &self,
        asset: &LoadedAsset,
        collection: &Collection,
    ) -> Result<UploadResult, ItemError> {
        let result = self
            .store
            .upload(collection.id, asset)
            .await
            .map_err(|e| ItemError::UploadRejected {
                filename: asset.filename.clone(),
                detail: e.to_string(),
            })?;
        debug!(
            "Uploaded '{}' ({} bytes) → {}",
            asset.filename,
            asset.bytes.len(),
            result.hosted_url
        );
        Ok(result)
    }

    pub async fn upload_local(
        &self,
        locator: &str,
        base_dir: &Path,
        collection: &Collection,
    ) -> Result<UploadResult, ItemError> {
        let asset = self.load_local(locator, base_dir).await?;
        self.upload_bytes(&asset, collection).await
    }

    pub async fn upload_remote(
        &self,
        url: &str,
        collection: &Collection,
    ) -> Result<UploadResult, ItemError> {
        let asset = self.load_remote(url).await?;
        self.upload_bytes(&asset, collection).await
    }

    pub async fn upload_base64(
        &self,
        data_uri: &str,
        collection: &Collection,
    ) -> Result<UploadResult, ItemError> {
        let asset = self.load_base64(data_uri)?;
        self.upload_bytes(&asset, collection).await
    }

    /// Read an uploaded asset back from the store.
    pub async fn fetch_asset(
        &self,
        collection: &Collection,
        asset_id: &str,
    ) -> Result<Vec<u8>, ItemError> {
        self.store
            .fetch(collection.id, asset_id)
            .await
            .map_err(|e| ItemError::VerificationFailed {
                asset_id: asset_id.to_string(),
                detail: e.to_string(),
            })
    }
}

fn parse_uuid_v4(id: &str) -> Option<Uuid> {
    let uuid = Uuid::parse_str(id.trim()).ok()?;
    (uuid.get_version() == Some(Version::Random) && uuid.get_variant() == Variant::RFC4122)
        .then_some(uuid)
}

// ── Data URIs ────────────────────────────────────────────────────────────

/// A decoded `data:<mime>;base64,<payload>` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl DataUri {
    /// Strictly parse an inline image payload.
    ///
    /// Requires the `data:` scheme, a `type/subtype` media type, a `;base64`
    /// marker, a `,` separator, a non-empty standard-alphabet payload, and
    /// decoded bytes that look like the declared image type.
    pub fn parse(uri: &str) -> Result<Self, ItemError> {
        let malformed = |detail: &str| ItemError::MalformedDataUri {
            detail: detail.to_string(),
        };

        let rest = uri
            .get(..5)
            .filter(|scheme| scheme.eq_ignore_ascii_case("data:"))
            .map(|_| &uri[5..])
            .ok_or_else(|| malformed("missing 'data:' scheme"))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| malformed("missing ',' between header and payload"))?;

        let mut params = header.split(';');
        let mime = params.next().unwrap_or_default().trim().to_ascii_lowercase();
        if !mime.contains('/') || mime.starts_with('/') || mime.ends_with('/') {
            return Err(malformed("media type must be 'type/subtype'"));
        }
        if !params
            .last()
            .is_some_and(|p| p.trim().eq_ignore_ascii_case("base64"))
        {
            return Err(malformed("missing ';base64' marker"));
        }

        let payload: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        if payload.is_empty() {
            return Err(malformed("empty payload"));
        }
        let bytes = STANDARD
            .decode(payload.as_bytes())
            .map_err(|e| malformed(&format!("invalid base64: {e}")))?;

        if !looks_like_image(&mime, &bytes) {
            return Err(malformed(&format!("payload is not a {mime} image")));
        }

        Ok(Self { mime, bytes })
    }
}

fn looks_like_image(mime: &str, bytes: &[u8]) -> bool {
    if mime == "image/svg+xml" {
        let head = String::from_utf8_lossy(&bytes[..bytes.len().min(256)]);
        return head.trim_start().starts_with('<');
    }
    image::guess_format(bytes).is_ok()
}

// ── Names and media types ────────────────────────────────────────────────

/// Filename for a downloaded image.
///
/// Uses the URL's last path segment; falls back to `image` when the path is
/// empty, and appends an extension inferred from `content_type` when the
/// segment has none.
pub fn filename_from_url(url: &str, content_type: Option<&str>) -> String {
    let segment = Url::parse(url).ok().and_then(|parsed| {
        parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back().map(str::to_string))
            .filter(|last| !last.is_empty())
    });

    let stem = segment.unwrap_or_else(|| "image".to_string());
    if Path::new(&stem).extension().is_some() {
        return stem;
    }
    match content_type {
        Some(ct) => format!("{}.{}", stem, extension_for_mime(ct)),
        None => stem,
    }
}

/// File extension for an image media type.
pub fn extension_for_mime(mime: &str) -> &'static str {
    match mime.trim().to_ascii_lowercase().as_str() {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" | "image/pjpeg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        "image/bmp" | "image/x-ms-bmp" => "bmp",
        "image/tiff" => "tiff",
        "image/avif" => "avif",
        "image/x-icon" | "image/vnd.microsoft.icon" => "ico",
        _ => "bin",
    }
}

/// Media type for a file extension.
pub fn mime_for_extension(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "avif" => "image/avif",
        "ico" => "image/x-icon",
        _ => "application/octet-stream",
    }
}
