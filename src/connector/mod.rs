//! Sources of VRP data.
//!
//! A connector provides the list of VRPs the cache is built from and,
//! optionally, the object metadata for the relationship index. Which
//! connector is used is selected via [`ConnectorKind`].

pub use self::external::ExternalConnector;
pub use self::http::HttpClient;
pub use self::source::HttpConnector;

mod external;
mod http;
mod source;

use std::fmt;
use std::str::FromStr;
use crate::config::Config;
use crate::error::{Error, Failed};
use crate::meta::MetaIndex;
use crate::payload::VrpList;


//------------ ConnectorKind -------------------------------------------------

/// The kind of connector to use.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ConnectorKind {
    /// RIPE NCC’s RIPEstat.
    Ripe,

    /// NTT’s RPKI export.
    Ntt,

    /// Cloudflare’s RPKI export.
    Cloudflare,

    /// The rpki-client console.
    RpkiClient,

    /// PacketVis.
    PacketVis,

    /// VRPs provided by the user of the library.
    External,

    /// A configured URL serving an rpki-client style VRP document.
    Api,
}

impl ConnectorKind {
    /// All connector kinds.
    pub const ALL: &'static [ConnectorKind] = &[
        ConnectorKind::Ripe,
        ConnectorKind::Ntt,
        ConnectorKind::Cloudflare,
        ConnectorKind::RpkiClient,
        ConnectorKind::PacketVis,
        ConnectorKind::External,
        ConnectorKind::Api,
    ];

    /// Returns the minimum allowed refresh interval in minutes.
    pub fn minimum_refresh_minutes(self) -> u64 {
        match self {
            ConnectorKind::External => 0,
            ConnectorKind::Api => 5,
            _ => 15,
        }
    }

    /// Returns the URL VRPs are fetched from unless configured.
    pub fn default_url(self) -> Option<&'static str> {
        match self {
            ConnectorKind::Ripe => {
                Some("https://stat.ripe.net/data/rpki-roas/data.json")
            }
            ConnectorKind::Ntt => {
                Some("https://rpki.gin.ntt.net/api/export.json")
            }
            ConnectorKind::Cloudflare => {
                Some("https://rpki.cloudflare.com/rpki.json")
            }
            ConnectorKind::RpkiClient => {
                Some("https://console.rpki-client.org/vrps.json")
            }
            ConnectorKind::PacketVis => {
                Some("https://api.packetvis.com/v1/rpki/meta/vrps.json")
            }
            ConnectorKind::External | ConnectorKind::Api => None,
        }
    }

    /// Returns whether the connector can provide object metadata.
    ///
    /// It still needs a metadata URL to actually do so.
    pub fn has_advanced_stats(self) -> bool {
        matches!(
            self,
            ConnectorKind::RpkiClient | ConnectorKind::PacketVis
                | ConnectorKind::Api
        )
    }

    fn as_str(self) -> &'static str {
        match self {
            ConnectorKind::Ripe => "ripe",
            ConnectorKind::Ntt => "ntt",
            ConnectorKind::Cloudflare => "cloudflare",
            ConnectorKind::RpkiClient => "rpkiclient",
            ConnectorKind::PacketVis => "packetvis",
            ConnectorKind::External => "external",
            ConnectorKind::Api => "api",
        }
    }
}

impl FromStr for ConnectorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.iter().copied().find(|kind| {
            kind.as_str().eq_ignore_ascii_case(s)
        }).ok_or_else(|| format!("unknown connector '{}'", s))
    }
}

impl fmt::Display for ConnectorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}


//------------ Connector -----------------------------------------------------

/// A source of VRP data.
#[derive(Debug)]
pub enum Connector {
    /// A connector fetching VRPs via HTTP.
    Http(HttpConnector),

    /// A connector holding VRPs set by the library user.
    External(ExternalConnector),
}

impl Connector {
    /// Creates the connector selected in the config.
    pub fn from_config(
        config: &Config, client: &HttpClient
    ) -> Result<Self, Failed> {
        match config.connector {
            ConnectorKind::External => {
                Ok(Connector::External(ExternalConnector::new()))
            }
            kind => {
                HttpConnector::new(
                    kind, client.clone(),
                    config.url.clone(), config.meta_url.clone()
                ).map(Connector::Http)
            }
        }
    }

    /// Returns the kind of the connector.
    pub fn kind(&self) -> ConnectorKind {
        match *self {
            Connector::Http(ref conn) => conn.kind(),
            Connector::External(_) => ConnectorKind::External,
        }
    }

    /// Returns the minimum allowed refresh interval in minutes.
    pub fn minimum_refresh_minutes(&self) -> u64 {
        self.kind().minimum_refresh_minutes()
    }

    /// Fetches the current VRP list.
    ///
    /// Returns `Ok(None)` if the source delivered a document that doesn’t
    /// contain a VRP list.
    pub async fn get_vrps(&self) -> Result<Option<VrpList>, Error> {
        match *self {
            Connector::Http(ref conn) => conn.get_vrps().await,
            Connector::External(ref conn) => Ok(conn.get_vrps()),
        }
    }

    /// Replaces the VRP list of a connector that allows doing so.
    pub fn set_vrps(&self, list: VrpList) -> Result<(), Error> {
        match *self {
            Connector::External(ref conn) => {
                conn.set_vrps(list);
                Ok(())
            }
            Connector::Http(_) => Err(Error::NotSupported("Setting VRPs")),
        }
    }

    /// Returns whether the connector can provide object metadata.
    pub fn has_advanced_stats(&self) -> bool {
        match *self {
            Connector::Http(ref conn) => conn.has_advanced_stats(),
            Connector::External(_) => false,
        }
    }

    /// Fetches the object metadata and builds a new index from it.
    pub async fn get_advanced_stats(&self) -> Result<MetaIndex, Error> {
        match *self {
            Connector::Http(ref conn) if conn.has_advanced_stats() => {
                conn.get_advanced_stats().await
            }
            _ => Err(Error::NotSupported("Advanced stats")),
        }
    }
}

impl From<ExternalConnector> for Connector {
    fn from(conn: ExternalConnector) -> Self {
        Connector::External(conn)
    }
}

impl From<HttpConnector> for Connector {
    fn from(conn: HttpConnector) -> Self {
        Connector::Http(conn)
    }
}


//============ Tests =========================================================
