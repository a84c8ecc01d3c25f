//! VRP data and the structures holding it.
//!
//! This module contains the types describing validated ROA payloads, the
//! prefix store that allows finding the VRPs covering a route, and the
//! snapshot types that hold the currently installed data set.

pub use self::snapshot::{CacheMetadata, SharedSnapshot, VrpList, VrpSnapshot};
pub use self::store::PrefixStore;
pub use self::vrp::{
    Asn, ParseAsnError, Vrp, VrpError, VrpKey, VrpRecord,
    parse_origin, parse_prefix,
};

mod snapshot;
mod store;
mod vrp;

