//! The asset store collaborator and the values that cross its boundary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Failure reported by an [`AssetStore`].
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The store answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The request never got a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body did not have the expected shape.
    #[error("unexpected response: {0}")]
    Decode(String),
}

/// A collection as the store reports it, before id validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionRecord {
    pub id: String,
    pub name: String,
}

/// A validated destination collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub id: Uuid,
    pub name: String,
}

/// What the store returns for one uploaded asset.
///
/// `hosted_url` always comes from the store; it is never assembled on the
/// client side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    pub asset_id: String,
    pub file_extension: String,
    pub hosted_url: String,
}

/// Image bytes ready for upload, whatever their origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedAsset {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub content_type: String,
}

/// Remote storage for collections and binary assets.
///
/// [`crate::assets::HttpAssetStore`] talks to the REST API; tests plug in
/// in-memory doubles.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Look up a collection by exact name.
    async fn find_collection(&self, name: &str) -> Result<Option<CollectionRecord>, StoreError>;

    /// Create a collection and return the store's record of it.
    async fn create_collection(&self, name: &str) -> Result<CollectionRecord, StoreError>;

    /// Upload one asset into `collection_id`.
    async fn upload(
        &self,
        collection_id: Uuid,
        asset: &LoadedAsset,
    ) -> Result<UploadResult, StoreError>;

    /// Fetch the stored bytes of one asset.
    async fn fetch(&self, collection_id: Uuid, asset_id: &str) -> Result<Vec<u8>, StoreError>;

    /// Whether `url` already points into this store. Such references are not
    /// migrated again.
    fn owns_url(&self, url: &str) -> bool {
        let _ = url;
        false
    }
}
