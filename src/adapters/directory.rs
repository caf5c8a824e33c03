//! Upstream directory adapter.
//!
//! Lists group members and groups page by page from the Admin SDK
//! Directory REST API. Items are returned as raw JSON so the caller decides
//! what to do with a record that does not decode.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Hard ceiling the directory imposes on `maxResults`
pub const MAX_PAGE_SIZE: u32 = 200;

/// Errors returned by the directory
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The parent (group, domain) does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Directory request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Directory returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid directory response: {0}")]
    Decode(String),
}

impl DirectoryError {
    /// Whether this is the terminal "no such parent" outcome
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// A paged list call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListRequest {
    /// Members of one group, by id or email
    Members { group_key: String },

    /// Groups of a domain matching a query, ordered by email
    Groups {
        customer_id: String,
        domain: String,
        query: String,
    },
}

impl ListRequest {
    /// Name of the array holding the items in a response page
    pub fn items_field(&self) -> &'static str {
        match self {
            Self::Members { .. } => "members",
            Self::Groups { .. } => "groups",
        }
    }
}

/// One page of raw records
#[derive(Debug, Clone, Default)]
pub struct RawPage {
    pub items: Vec<Value>,
    /// None on the last page
    pub next_page_token: Option<String>,
}

impl RawPage {
    /// Parse a response body into a page
    pub fn from_response(body: Value, items_field: &str) -> Result<Self, DirectoryError> {
        let items = match body.get(items_field) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items.clone(),
            Some(other) => {
                return Err(DirectoryError::Decode(format!(
                    "'{}' is not an array: {}",
                    items_field, other
                )))
            }
        };

        let next_page_token = body
            .get("nextPageToken")
            .and_then(|t| t.as_str())
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        Ok(Self {
            items,
            next_page_token,
        })
    }
}

/// Trait for the upstream directory
#[async_trait]
pub trait DirectoryApi: Send + Sync {
    /// Fetch one page of `request`
    async fn list_page(
        &self,
        request: &ListRequest,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<RawPage, DirectoryError>;

    /// Domain names of a customer
    async fn list_domains(&self, customer_id: &str) -> Result<Vec<String>, DirectoryError>;
}

/// Map a failed response to an error, recognising "no such parent"
pub fn classify_failure(status: u16, body: String) -> DirectoryError {
    if status == 404 || body.contains("Domain not found") || body.contains("Resource Not Found") {
        DirectoryError::NotFound(body)
    } else {
        DirectoryError::Status { status, body }
    }
}

/// Admin SDK Directory client over HTTP
pub struct AdminDirectoryClient {
    /// e.g. https://admin.googleapis.com
    api_base: String,
    access_token: String,
    client: reqwest::Client,
}

impl AdminDirectoryClient {
    /// Create a new client
    pub fn new(api_base: impl Into<String>, access_token: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("Failed to build directory HTTP client")?;

        Ok(Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/admin/directory/v1/{}", self.api_base, path)
    }

    async fn get_json(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Value, DirectoryError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status.as_u16(), body));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| DirectoryError::Decode(e.to_string()))
    }
}

#[async_trait]
impl DirectoryApi for AdminDirectoryClient {
    async fn list_page(
        &self,
        request: &ListRequest,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<RawPage, DirectoryError> {
        let mut query = vec![("maxResults", page_size.min(MAX_PAGE_SIZE).to_string())];
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }

        let url = match request {
            ListRequest::Members { group_key } => self.url(&format!("groups/{}/members", group_key)),
            ListRequest::Groups {
                customer_id,
                domain,
                query: filter,
            } => {
                query.push(("customer", customer_id.clone()));
                query.push(("domain", domain.clone()));
                query.push(("query", filter.clone()));
                query.push(("orderBy", "email".to_string()));
                self.url("groups")
            }
        };

        debug!(%url, has_token = page_token.is_some(), "Listing directory page");
        let body = self.get_json(&url, &query).await?;
        RawPage::from_response(body, request.items_field())
    }

    async fn list_domains(&self, customer_id: &str) -> Result<Vec<String>, DirectoryError> {
        let url = self.url(&format!("customer/{}/domains", customer_id));
        let body = self.get_json(&url, &[]).await?;

        let domains = body
            .get("domains")
            .and_then(|d| d.as_array())
            .map(|domains| {
                domains
                    .iter()
                    .filter_map(|d| d.get("domainName").and_then(|n| n.as_str()))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(domains)
    }
}
