//! REST implementation of [`AssetStore`].
//!
//! Routes, relative to the store's base URL:
//!
//! ```text
//! GET  /api/collections?name=<name>               → [{"id","name"}]
//! POST /api/collections            {"name"}       → {"id","name"}
//! POST /api/collections/<cid>/assets  multipart   → {"asset_id","file_extension","url"}
//! GET  /api/collections/<cid>/assets/<aid>        → raw bytes
//! ```
//!
//! Every request carries the configured credentials. A relative `url` in an
//! upload response is resolved against the base URL.

use crate::assets::store::{AssetStore, CollectionRecord, LoadedAsset, StoreError, UploadResult};
use crate::config::StoreCredentials;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, Url};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

#[derive(Deserialize)]
struct UploadRecord {
    #[serde(alias = "id")]
    asset_id: String,
    #[serde(alias = "extension")]
    file_extension: String,
    #[serde(alias = "hosted_url")]
    url: String,
}

/// Asset store reached over HTTP.
pub struct HttpAssetStore {
    http: reqwest::Client,
    base: Url,
    credentials: StoreCredentials,
}

impl HttpAssetStore {
    pub fn new(
        base_url: &str,
        credentials: StoreCredentials,
        timeout_secs: u64,
    ) -> Result<Self, StoreError> {
        let mut base = Url::parse(base_url)
            .map_err(|e| StoreError::Transport(format!("invalid store URL '{base_url}': {e}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base,
            credentials,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, StoreError> {
        self.base
            .join(path)
            .map_err(|e| StoreError::Transport(format!("bad endpoint '{path}': {e}")))
    }

    fn authorise(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            StoreCredentials::Token(token) => request.bearer_auth(token),
            StoreCredentials::Basic { username, password } => {
                request.basic_auth(username, Some(password))
            }
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, StoreError> {
        let response = self
            .authorise(request)
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(StoreError::Http {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[async_trait]
impl AssetStore for HttpAssetStore {
    async fn find_collection(&self, name: &str) -> Result<Option<CollectionRecord>, StoreError> {
        let url = self.endpoint("api/collections")?;
        let response = self
            .send(self.http.get(url).query(&[("name", name)]))
            .await?;
        let records: Vec<CollectionRecord> = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        debug!("Store lists {} collection(s) for '{}'", records.len(), name);
        Ok(records.into_iter().find(|c| c.name == name))
    }

    async fn create_collection(&self, name: &str) -> Result<CollectionRecord, StoreError> {
        let url = self.endpoint("api/collections")?;
        let response = self
            .send(self.http.post(url).json(&serde_json::json!({ "name": name })))
            .await?;
        response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }

    async fn upload(
        &self,
        collection_id: Uuid,
        asset: &LoadedAsset,
    ) -> Result<UploadResult, StoreError> {
        let url = self.endpoint(&format!("api/collections/{collection_id}/assets"))?;
        let part = Part::bytes(asset.bytes.clone())
            .file_name(asset.filename.clone())
            .mime_str(&asset.content_type)
            .map_err(|e| StoreError::Decode(format!("content type: {e}")))?;
        let form = Form::new().part("file", part);

        let response = self.send(self.http.post(url).multipart(form)).await?;
        let record: UploadRecord = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        Ok(UploadResult {
            asset_id: record.asset_id,
            file_extension: record.file_extension,
            hosted_url: absolutize(&self.base, &record.url)?,
        })
    }

    async fn fetch(&self, collection_id: Uuid, asset_id: &str) -> Result<Vec<u8>, StoreError> {
        let url = self.endpoint(&format!("api/collections/{collection_id}/assets/{asset_id}"))?;
        let response = self.send(self.http.get(url)).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    fn owns_url(&self, url: &str) -> bool {
        url.starts_with(self.base.as_str())
    }
}

/// Resolve a server-returned URL against the store's base URL.
fn absolutize(base: &Url, url: &str) -> Result<String, StoreError> {
    if Url::parse(url).is_ok() {
        return Ok(url.to_string());
    }
    base.join(url)
        .map(String::from)
        .map_err(|e| StoreError::Decode(format!("hosted url '{url}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(base: &str) -> HttpAssetStore {
        HttpAssetStore::new(base, StoreCredentials::Token("t".into()), 30).unwrap()
    }

    #[test]
    fn endpoints_respect_base_path() {
        let s = store("https://assets.example.com/tenant");
        assert_eq!(
            s.endpoint("api/collections").unwrap().as_str(),
            "https://assets.example.com/tenant/api/collections"
        );
        let s = store("https://assets.example.com");
        assert_eq!(
            s.endpoint("api/collections").unwrap().as_str(),
            "https://assets.example.com/api/collections"
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        assert!(HttpAssetStore::new("not a url", StoreCredentials::Token("t".into()), 30).is_err());
    }

    #[test]
    fn relative_hosted_urls_are_resolved() {
        let base = Url::parse("https://assets.example.com/").unwrap();
        assert_eq!(
            absolutize(&base, "/files/abc.png").unwrap(),
            "https://assets.example.com/files/abc.png"
        );
        assert_eq!(
            absolutize(&base, "https://cdn.example.com/abc.png").unwrap(),
            "https://cdn.example.com/abc.png"
        );
    }

    #[test]
    fn urls_under_the_base_are_owned() {
        let s = store("https://assets.example.com/tenant");
        assert!(s.owns_url("https://assets.example.com/tenant/files/a.png"));
        assert!(!s.owns_url("https://assets.example.com/other/a.png"));
    }

    #[test]
    fn upload_record_accepts_aliases() {
        let r: UploadRecord =
            serde_json::from_str(r#"{"id":"a1","extension":"png","hosted_url":"/x/a1.png"}"#)
                .unwrap();
        assert_eq!(r.asset_id, "a1");
        assert_eq!(r.file_extension, "png");
        assert_eq!(r.url, "/x/a1.png");
    }
}
