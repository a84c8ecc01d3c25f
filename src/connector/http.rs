//! The HTTP client shared by connectors and the remote validator.

use log::{debug, error};
use reqwest::{Client, ClientBuilder, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use crate::config::Config;
use crate::error::{Error, Failed};
use crate::meta::{IngestReport, MetaIndex};


//------------ HttpClient ----------------------------------------------------

/// An HTTP client for fetching VRP lists and talking to remote validators.
///
/// The client is cheap to clone. All clones share the same connection pool.
#[derive(Clone, Debug)]
pub struct HttpClient {
    /// The reqwest client.
    client: Client,

    /// The client identifier added to requests that ask for it.
    client_id: String,
}

impl HttpClient {
    /// Creates a new client based on the config.
    pub fn new(config: &Config) -> Result<Self, Failed> {

        // Deal with the reqwest’s TLS features by defining a creator
        // function for the two cases.
        #[cfg(not(feature = "native-tls"))]
        fn create_builder() -> ClientBuilder {
            Client::builder().use_rustls_tls()
        }

        #[cfg(feature = "native-tls")]
        fn create_builder() -> ClientBuilder {
            Client::builder().use_native_tls()
        }

        let mut builder = create_builder();
        builder = builder.user_agent(&config.user_agent);
        builder = builder.gzip(true);
        if let Some(timeout) = config.http_timeout {
            builder = builder.timeout(timeout);
        }
        match builder.build() {
            Ok(client) => {
                Ok(HttpClient {
                    client,
                    client_id: config.client_id.clone(),
                })
            }
            Err(err) => {
                error!("Failed to initialize HTTP client: {}.", err);
                Err(Failed)
            }
        }
    }

    /// Fetches and decodes a JSON document.
    ///
    /// If `with_client` is true, the client identifier is added as the
    /// `client` query parameter.
    pub async fn get_json<T: DeserializeOwned>(
        &self, url: &str, query: &[(&str, &str)], with_client: bool,
    ) -> Result<T, Error> {
        let request = self.with_query(self.client.get(url), query, with_client);
        Ok(self.send(url, request).await?.json().await?)
    }

    /// Posts a JSON document and decodes the JSON response.
    pub async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self, url: &str, body: &B, with_client: bool,
    ) -> Result<T, Error> {
        let request = self.with_query(
            self.client.post(url).json(body), &[], with_client
        );
        Ok(self.send(url, request).await?.json().await?)
    }

    /// Fetches a JSON lines metadata dump into a new index.
    ///
    /// The response body is processed chunk by chunk and never held in
    /// memory as a whole.
    pub async fn get_meta(&self, url: &str) -> Result<MetaIndex, Error> {
        let mut response = self.send(url, self.client.get(url)).await?;
        let mut index = MetaIndex::new();
        let mut report = IngestReport::default();
        let mut buf = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            buf.extend_from_slice(&chunk);
            let mut start = 0;
            while let Some(pos) = buf[start..].iter().position(|&ch| {
                ch == b'\n'
            }) {
                index.ingest_line(&buf[start..start + pos], &mut report);
                start += pos + 1;
            }
            buf.drain(..start);
        }
        index.ingest_line(&buf, &mut report);
        debug!(
            "Metadata from {}: added {} records, skipped {} lines.",
            url, report.added, report.skipped
        );
        Ok(index)
    }

    fn with_query(
        &self,
        mut request: RequestBuilder,
        query: &[(&str, &str)],
        with_client: bool,
    ) -> RequestBuilder {
        if !query.is_empty() {
            request = request.query(query);
        }
        if with_client {
            request = request.query(&[("client", self.client_id.as_str())]);
        }
        request
    }

    async fn send(
        &self, url: &str, request: RequestBuilder
    ) -> Result<Response, Error> {
        debug!("Requesting {}", url);
        Ok(request.send().await?.error_for_status()?)
    }
}
