//! Validation of route announcements by a remote service.
//!
//! Before a local VRP snapshot is available, validation requests are
//! answered by a remote validator. Requests are collected and sent as a
//! single batch. The remote side only supplies the covering VRPs for each
//! request; the decision itself is always made locally.

use std::fmt;
use std::collections::HashMap;
use futures::future::BoxFuture;
use ipnet::IpNet;
use log::debug;
use serde::Deserialize;
use serde_json::Value;
use crate::connector::HttpClient;
use crate::error::Error;
use crate::payload::{Asn, Vrp, VrpRecord};


//------------ RequestKey ----------------------------------------------------

/// The key identifying a validation request.
///
/// Requests with equal keys are answered by a single remote query.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct RequestKey {
    pub prefix: IpNet,
    pub origin: Asn,
}

impl RequestKey {
    pub fn new(prefix: IpNet, origin: Asn) -> Self {
        RequestKey { prefix: prefix.trunc(), origin }
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} => {}", self.prefix, self.origin)
    }
}


//------------ RemoteAnswer --------------------------------------------------

/// The remote answer for a single request.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RemoteAnswer {
    /// The state reported by the remote side.
    ///
    /// This is informational only.
    pub state: Option<String>,

    /// The VRPs covering the requested prefix.
    pub covering: Vec<Vrp>,
}

impl RemoteAnswer {
    pub fn new(covering: Vec<Vrp>) -> Self {
        RemoteAnswer { state: None, covering }
    }
}


//------------ BatchValidator ------------------------------------------------

/// A service that can validate a batch of requests in one go.
pub trait BatchValidator: Send + Sync + 'static {
    /// Validates a batch of requests.
    ///
    /// Returns the answers by request key. A request missing from the
    /// result has not been answered. An error fails the whole batch.
    fn validate_batch(
        &self, batch: Vec<RequestKey>
    ) -> BoxFuture<'_, Result<HashMap<RequestKey, RemoteAnswer>, Error>>;
}


//------------ GraphqlValidator ----------------------------------------------

/// A remote validator speaking Cloudflare’s GraphQL validation API.
#[derive(Clone, Debug)]
pub struct GraphqlValidator {
    client: HttpClient,
    url: String,
}

impl GraphqlValidator {
    pub fn new(client: HttpClient, url: String) -> Self {
        GraphqlValidator { client, url }
    }

    /// Creates the GraphQL query for a batch.
    ///
    /// Each request becomes an aliased `validation` selection. The alias is
    /// `q` followed by the index of the request in the batch.
    fn query(batch: &[RequestKey]) -> String {
        let mut res = String::from("query {");
        for (idx, key) in batch.iter().enumerate() {
            res.push_str(&format!(
                "q{}:validation(prefix:\"{}\", asn:{}) \
                 {{state, covering {{ asn, prefix {{ prefix, maxLength }} }}}}",
                idx, key.prefix, key.origin.into_u32()
            ));
        }
        res.push('}');
        res
    }

    async fn validate(
        &self, batch: Vec<RequestKey>
    ) -> Result<HashMap<RequestKey, RemoteAnswer>, Error> {
        let body = serde_json::json!({ "query": Self::query(&batch) });
        let response: GraphqlResponse = self.client.post_json(
            &self.url, &body, true
        ).await?;
        let mut data = match response.data {
            Some(data) => data,
            None => {
                return Err(Error::Transport(
                    response.errors.into_iter().next().and_then(|err| {
                        err.get("message").and_then(|msg| {
                            msg.as_str().map(Into::into)
                        })
                    }).unwrap_or_else(|| "empty GraphQL response".into())
                ))
            }
        };
        let mut res = HashMap::new();
        for (idx, key) in batch.into_iter().enumerate() {
            let answer = match data.remove(&format!("q{}", idx)) {
                Some(Some(answer)) => answer,
                _ => continue
            };
            res.insert(key, answer.into_answer(key));
        }
        Ok(res)
    }
}

impl BatchValidator for GraphqlValidator {
    fn validate_batch(
        &self, batch: Vec<RequestKey>
    ) -> BoxFuture<'_, Result<HashMap<RequestKey, RemoteAnswer>, Error>> {
        Box::pin(self.validate(batch))
    }
}


//------------ GraphQL Response Types ----------------------------------------

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    #[serde(default)]
    data: Option<HashMap<String, Option<GraphqlValidation>>>,

    #[serde(default)]
    errors: Vec<serde_json::Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct GraphqlValidation {
    #[serde(default)]
    state: Option<String>,

    #[serde(default)]
    covering: Vec<GraphqlCovering>,
}

#[derive(Debug, Deserialize)]
struct GraphqlCovering {
    #[serde(default)]
    asn: Option<Value>,

    #[serde(default)]
    prefix: Option<GraphqlPrefix>,
}

#[derive(Debug, Deserialize)]
struct GraphqlPrefix {
    #[serde(default)]
    prefix: Option<String>,

    #[serde(default, rename = "maxLength")]
    max_length: Option<Value>,
}

impl GraphqlValidation {
    /// Converts the response into an answer.
    ///
    /// Covering VRPs that aren’t well-formed or don’t actually cover the
    /// requested prefix are skipped.
    fn into_answer(self, key: RequestKey) -> RemoteAnswer {
        let covering = self.covering.into_iter().filter_map(|item| {
            let prefix = item.prefix.unwrap_or(GraphqlPrefix {
                prefix: None, max_length: None
            });
            let record = VrpRecord {
                prefix: prefix.prefix,
                max_length: prefix.max_length,
                asn: item.asn,
                .. Default::default()
            };
            match Vrp::check(&record) {
                Ok(vrp) if vrp.covers(key.prefix) => Some(vrp),
                Ok(vrp) => {
                    debug!("Remote VRP {} does not cover {}", vrp, key);
                    None
                }
                Err(err) => {
                    debug!("Skipping malformed remote VRP for {}: {}", key, err);
                    None
                }
            }
        }).collect();
        RemoteAnswer { state: self.state, covering }
    }
}


//============ Tests =========================================================
