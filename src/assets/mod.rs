//! Asset store integration.
//!
//! - [`store`]  — the [`AssetStore`] collaborator trait and boundary types
//! - [`http`]   — [`HttpAssetStore`], the REST implementation
//! - [`client`] — [`AssetClient`], collection resolution and per-kind load/upload

pub mod client;
pub mod http;
pub mod store;

pub use client::{AssetClient, DataUri};
pub use http::HttpAssetStore;
pub use store::{AssetStore, Collection, CollectionRecord, LoadedAsset, StoreError, UploadResult};
