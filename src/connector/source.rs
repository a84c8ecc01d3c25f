//! Connectors fetching VRP documents via HTTP.

use log::{debug, error, warn};
use serde_json::{Map, Value};
use crate::error::{Error, Failed};
use crate::meta::MetaIndex;
use crate::payload::{VrpList, VrpRecord};
use crate::utils::date::timestamp_from_json;
use super::ConnectorKind;
use super::http::HttpClient;


//------------ HttpConnector -------------------------------------------------

/// A connector that fetches a VRP document from a URL.
///
/// All the public sources publish more or less the same JSON document: an
/// object with the VRPs in a `roas` array and optional `metadata`. RIPEstat
/// wraps this in a `data` object.
#[derive(Debug)]
pub struct HttpConnector {
    /// The kind of connector.
    kind: ConnectorKind,

    /// The HTTP client.
    client: HttpClient,

    /// The URL of the VRP document.
    url: String,

    /// The URL of the object metadata dump if available.
    meta_url: Option<String>,
}

impl HttpConnector {
    /// Creates a new connector.
    ///
    /// If `url` is `None`, the default URL of the connector kind is used.
    /// Fails if there is none.
    pub fn new(
        kind: ConnectorKind,
        client: HttpClient,
        url: Option<String>,
        meta_url: Option<String>,
    ) -> Result<Self, Failed> {
        let url = match url.or_else(|| kind.default_url().map(Into::into)) {
            Some(url) => url,
            None => {
                error!("The '{}' connector requires a URL.", kind);
                return Err(Failed)
            }
        };
        let meta_url = match meta_url {
            Some(meta_url) if !kind.has_advanced_stats() => {
                warn!(
                    "The '{}' connector doesn’t provide object metadata. \
                     Ignoring meta URL {}.",
                    kind, meta_url
                );
                None
            }
            meta_url => meta_url,
        };
        Ok(HttpConnector { kind, client, url, meta_url })
    }

    pub fn kind(&self) -> ConnectorKind {
        self.kind
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn has_advanced_stats(&self) -> bool {
        self.meta_url.is_some()
    }

    /// Fetches the VRP document.
    pub async fn get_vrps(&self) -> Result<Option<VrpList>, Error> {
        let query: &[(&str, &str)] = match self.kind {
            ConnectorKind::Ripe => &[("validator", "ripenccv3")],
            _ => &[],
        };
        let doc: Value = self.client.get_json(
            &self.url, query, self.kind != ConnectorKind::Api
        ).await?;
        let res = decode_document(doc);
        match res {
            Some(ref list) => {
                debug!(
                    "Fetched {} VRPs from {}.", list.vrps.len(), self.url
                );
            }
            None => {
                warn!("No VRP list in document from {}.", self.url);
            }
        }
        Ok(res)
    }

    /// Fetches the object metadata dump.
    pub async fn get_advanced_stats(&self) -> Result<MetaIndex, Error> {
        match self.meta_url.as_ref() {
            Some(url) => self.client.get_meta(url).await,
            None => Err(Error::NotSupported("Advanced stats")),
        }
    }
}


//------------ decode_document -----------------------------------------------

/// Decodes a VRP document.
///
/// Returns `None` if the document doesn’t contain a VRP list. Entries of
/// the list that cannot be decoded at all are skipped.
fn decode_document(doc: Value) -> Option<VrpList> {
    let mut doc = match doc {
        Value::Object(doc) => doc,
        _ => return None
    };
    let roas = match doc.remove("roas") {
        Some(roas) => roas,
        None => {
            doc.get_mut("data")?.get_mut("roas")?.take()
        }
    };
    let roas = match roas {
        Value::Array(roas) => roas,
        _ => return None
    };
    let metadata = match doc.remove("metadata") {
        Some(Value::Object(metadata)) => metadata,
        _ => Map::new(),
    };
    let build_time = metadata.get("buildtime").or_else(|| {
        metadata.get("generated")
    }).and_then(timestamp_from_json);
    let vrps = roas.into_iter().filter_map(|item| {
        match serde_json::from_value::<VrpRecord>(item) {
            Ok(record) => Some(record),
            Err(err) => {
                debug!("Skipping undecodable VRP entry: {}", err);
                None
            }
        }
    }).collect();
    Some(VrpList { vrps, build_time, metadata })
}


//============ Tests =========================================================
