//! Dataset catalog client.
//!
//! [`DatasetCatalog`] is the seam between the fetcher and the catalog
//! service. [`KaggleClient`] talks to the Kaggle public API with HTTP basic
//! auth built from explicitly passed credentials.

use async_trait::async_trait;
use bytes::Bytes;
use movieflow_protocol::SortBy;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::credentials::Connection;

pub const DEFAULT_CATALOG_URL: &str = "https://www.kaggle.com/api/v1";
const REQUEST_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("{0}")]
    Authentication(String),

    #[error("request to {url} failed")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("catalog returned {status} for {url}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },
}

/// One catalog entry. `reference` is the `owner/slug` identifier.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DatasetInfo {
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(default)]
    pub title: Option<String>,
}

impl DatasetInfo {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            title: None,
        }
    }
}

#[async_trait]
pub trait DatasetCatalog: Send + Sync {
    /// Datasets matching `search`, in catalog order for `sort_by`.
    async fn list_datasets(
        &self,
        search: &str,
        sort_by: SortBy,
    ) -> Result<Vec<DatasetInfo>, CatalogError>;

    /// The dataset's files as a zip archive.
    async fn download(&self, dataset: &DatasetInfo) -> Result<Bytes, CatalogError>;
}

/// Catalog API credentials.
#[derive(Clone)]
pub struct KaggleCredentials {
    pub username: String,
    pub key: String,
}

impl std::fmt::Debug for KaggleCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KaggleCredentials")
            .field("username", &self.username)
            .field("key", &"***")
            .finish()
    }
}

impl KaggleCredentials {
    /// Username from `login`, API key from `password`.
    pub fn from_connection(conn: &Connection) -> Result<Self, CatalogError> {
        let username = conn.login.clone().unwrap_or_default();
        let key = conn.password.clone().unwrap_or_default();
        if username.is_empty() || key.is_empty() {
            return Err(CatalogError::Authentication(
                "catalog connection is missing login or key".to_string(),
            ));
        }
        Ok(Self { username, key })
    }
}

pub struct KaggleClient {
    client: Client,
    base_url: String,
    credentials: KaggleCredentials,
}

impl KaggleClient {
    pub fn new(credentials: KaggleCredentials, base_url: impl Into<String>) -> Result<Self, CatalogError> {
        if credentials.username.is_empty() || credentials.key.is_empty() {
            return Err(CatalogError::Authentication(
                "empty catalog credentials".to_string(),
            ));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| {
                CatalogError::Authentication(format!("failed to build catalog client: {}", e))
            })?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
        })
    }

    async fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<reqwest::Response, CatalogError> {
        debug!(url, "catalog request");
        let response = self
            .client
            .get(url)
            .query(query)
            .basic_auth(&self.credentials.username, Some(&self.credentials.key))
            .send()
            .await
            .map_err(|source| CatalogError::Http {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(CatalogError::Authentication(format!(
                "catalog rejected credentials for '{}' ({})",
                self.credentials.username, status
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl DatasetCatalog for KaggleClient {
    async fn list_datasets(
        &self,
        search: &str,
        sort_by: SortBy,
    ) -> Result<Vec<DatasetInfo>, CatalogError> {
        let url = format!("{}/datasets/list", self.base_url);
        let response = self
            .get(&url, &[("search", search), ("sortBy", sort_by.as_str())])
            .await?;
        response
            .json::<Vec<DatasetInfo>>()
            .await
            .map_err(|source| CatalogError::Http { url, source })
    }

    async fn download(&self, dataset: &DatasetInfo) -> Result<Bytes, CatalogError> {
        let url = format!("{}/datasets/download/{}", self.base_url, dataset.reference);
        let response = self.get(&url, &[]).await?;
        response
            .bytes()
            .await
            .map_err(|source| CatalogError::Http { url, source })
    }
}
