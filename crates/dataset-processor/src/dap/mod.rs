//! Minimal DAP2 (OPeNDAP) client.
//!
//! Only what server-side subsetting needs: the structure (`.dds`), the
//! attributes (`.das`) and constrained binary data (`.dods`).

mod das;
mod dds;
mod lexer;
mod xdr;

pub use das::{AttrTable, AttrValue, Das};
pub use dds::{split_dods, ArrayDecl, DapType, Decl, Dds, Dim};
pub use xdr::{decode, DecodedArray, DecodedVar, Values};

use reqwest::Client;
use tracing::{debug, instrument};

use crate::error::{ProcessorError, ProcessorResult};

/// Session against one remote dataset URL.
#[derive(Debug, Clone)]
pub struct DapClient {
    http: Client,
    url: String,
}

impl DapClient {
    /// `url` is the dataset URL without a response suffix.
    pub fn new(http: Client, url: impl Into<String>) -> Self {
        let url = url.into();
        let url = url
            .strip_suffix(".html")
            .map(String::from)
            .unwrap_or(url);
        Self { http, url }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn get(&self, suffix: &str, constraint: Option<&str>) -> ProcessorResult<bytes::Bytes> {
        let mut url = format!("{}.{}", self.url, suffix);
        if let Some(ce) = constraint.filter(|c| !c.is_empty()) {
            url.push('?');
            url.push_str(ce);
        }
        debug!(url = %url, "DAP request");

        let response = self.http.get(&url).send().await?.error_for_status()?;
        Ok(response.bytes().await?)
    }

    #[instrument(skip(self), fields(url = %self.url))]
    pub async fn dds(&self) -> ProcessorResult<Dds> {
        let body = self.get("dds", None).await?;
        Dds::parse(&text(&body)?)
    }

    #[instrument(skip(self), fields(url = %self.url))]
    pub async fn das(&self) -> ProcessorResult<Das> {
        let body = self.get("das", None).await?;
        Das::parse(&text(&body)?)
    }

    /// Fetch and decode constrained data.
    #[instrument(skip(self), fields(url = %self.url))]
    pub async fn data(&self, constraint: &str) -> ProcessorResult<Vec<DecodedVar>> {
        let body = self.get("dods", Some(constraint)).await?;
        let (dds, payload) = split_dods(&body)?;
        decode(&dds, payload)
    }
}

fn text(body: &[u8]) -> ProcessorResult<String> {
    String::from_utf8(body.to_vec())
        .map_err(|e| ProcessorError::Dap(format!("response is not UTF-8: {}", e)))
}
