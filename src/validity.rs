//! Checking for validity of route announcements.

use std::fmt;
use ipnet::IpNet;
use serde::Serialize;
use crate::payload::{Asn, Vrp, VrpSnapshot};


//------------ RouteValidity -------------------------------------------------

/// Information about the RPKI validity of a route announcement.
///
/// The announcement is valid if at least one covering VRP has the
/// announcement’s origin AS and a maximum length of at least the length of
/// the announced prefix. Note that these two conditions are checked for the
/// set of same-origin VRPs as a whole: any one of them allowing the prefix
/// length is enough.
#[derive(Clone, Debug)]
pub struct RouteValidity {
    /// The address prefix of the route announcement.
    prefix: IpNet,

    /// The origin AS number of the route announcement.
    origin: Asn,

    /// All VRPs covering the prefix, in lookup order.
    covering: Vec<Vrp>,

    /// Is there a covering VRP for the origin AS?
    same_origin: bool,

    /// Does any VRP for the origin AS allow the prefix length?
    valid_length: bool,
}

impl RouteValidity {
    /// Decides on validity given the covering VRPs.
    ///
    /// It is the caller’s responsibility to only provide VRPs that actually
    /// cover `prefix`.
    pub fn new(
        prefix: IpNet,
        origin: Asn,
        covering: impl IntoIterator<Item = Vrp>,
    ) -> Self {
        let covering: Vec<_> = covering.into_iter().collect();
        let mut same_origin = false;
        let mut valid_length = false;
        for vrp in covering.iter().filter(|vrp| vrp.asn() == origin) {
            same_origin = true;
            if prefix.prefix_len() <= vrp.max_length() {
                valid_length = true;
            }
        }
        RouteValidity { prefix, origin, covering, same_origin, valid_length }
    }

    /// Decides on validity using the VRPs of a snapshot.
    pub fn from_snapshot(
        prefix: IpNet, origin: Asn, snapshot: &VrpSnapshot
    ) -> Self {
        Self::new(
            prefix, origin,
            snapshot.store().covering(prefix).into_iter().cloned()
        )
    }

    pub fn prefix(&self) -> IpNet {
        self.prefix
    }

    pub fn origin(&self) -> Asn {
        self.origin
    }

    pub fn state(&self) -> RouteState {
        if self.covering.is_empty() {
            RouteState::NotFound
        }
        else if self.same_origin && self.valid_length {
            RouteState::Valid
        }
        else {
            RouteState::Invalid
        }
    }

    /// Returns the tri-state validity.
    ///
    /// This is `None` if there is no covering VRP at all.
    pub fn valid(&self) -> Option<bool> {
        match self.state() {
            RouteState::Valid => Some(true),
            RouteState::Invalid => Some(false),
            RouteState::NotFound => None,
        }
    }

    pub fn reason(&self) -> Option<&'static str> {
        if self.covering.is_empty() {
            Some(REASON_NOT_FOUND)
        }
        else if !self.same_origin {
            Some(REASON_BAD_ORIGIN)
        }
        else if !self.valid_length {
            Some(REASON_BAD_LENGTH)
        }
        else {
            None
        }
    }

    /// Returns all covering VRPs, whatever their origin AS.
    pub fn covering(&self) -> &[Vrp] {
        &self.covering
    }

    /// Converts the validity into the output format requested.
    pub fn into_validation(self, verbose: bool) -> Validation {
        if verbose {
            Validation::Verbose(ValidityReport {
                valid: self.valid(),
                reason: self.reason(),
                covering: self.covering,
            })
        }
        else {
            Validation::Terse(self.valid())
        }
    }

    /// Produces the output format requested without consuming the value.
    pub fn to_validation(&self, verbose: bool) -> Validation {
        if verbose {
            self.clone().into_validation(true)
        }
        else {
            Validation::Terse(self.valid())
        }
    }
}


//------------ RouteState ----------------------------------------------------

/// The RPKI state of a route announcement.
///
/// A VRP is said to _cover_ an announcement if its prefix is equal to or
/// less specific than the announced prefix.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RouteState {
    /// RPKI Valid.
    ///
    /// A covering VRP has the announcement’s origin AS and allows its
    /// prefix length.
    Valid,

    /// RPKI Invalid.
    ///
    /// At least one VRP covers the announcement but none has both the
    /// right origin and a long enough maximum length.
    Invalid,

    /// RPKI Not Found.
    ///
    /// No VRP covers the announcement.
    NotFound
}

impl fmt::Display for RouteState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            RouteState::Valid => "valid",
            RouteState::Invalid => "invalid",
            RouteState::NotFound => "not-found",
        })
    }
}


//------------ Validation ----------------------------------------------------

/// The result of a validation as handed to callers.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Validation {
    /// Just the tri-state validity.
    Terse(Option<bool>),

    /// Validity with reason and evidence.
    Verbose(ValidityReport),
}

impl Validation {
    /// Returns the tri-state validity.
    pub fn valid(&self) -> Option<bool> {
        match *self {
            Validation::Terse(valid) => valid,
            Validation::Verbose(ref report) => report.valid,
        }
    }

    /// Returns the detailed report if this is a verbose result.
    pub fn report(&self) -> Option<&ValidityReport> {
        match *self {
            Validation::Terse(_) => None,
            Validation::Verbose(ref report) => Some(report),
        }
    }
}


//------------ ValidityReport ------------------------------------------------

/// The verbose validation result.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ValidityReport {
    /// The tri-state validity.
    pub valid: Option<bool>,

    /// Why the route isn’t valid.
    pub reason: Option<&'static str>,

    /// All VRPs covering the route.
    pub covering: Vec<Vrp>,
}


//------------ Constants -----------------------------------------------------

pub const REASON_NOT_FOUND: &str = "No ROA available for this prefix";
pub const REASON_BAD_ORIGIN: &str = "Not valid origin";
pub const REASON_BAD_LENGTH: &str = "Not valid prefix length";


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use std::str::FromStr;
    use super::*;

    fn vrp(prefix: &str, max_len: u8, asn: u32) -> Vrp {
        Vrp::new(IpNet::from_str(prefix).unwrap(), max_len, asn.into())
            .unwrap()
    }

    fn check(prefix: &str, origin: u32, covering: Vec<Vrp>) -> RouteValidity {
        RouteValidity::new(
            IpNet::from_str(prefix).unwrap(), origin.into(), covering
        )
    }

    #[test]
    fn not_found() {
        let res = check("203.126.124.0/24", 9404, Vec::new());
        assert_eq!(res.state(), RouteState::NotFound);
        assert_eq!(res.valid(), None);
        assert_eq!(
            res.into_validation(true),
            Validation::Verbose(ValidityReport {
                valid: None,
                reason: Some("No ROA available for this prefix"),
                covering: Vec::new()
            })
        );
        assert_eq!(
            check("203.126.124.0/24", 9404, Vec::new())
                .into_validation(false),
            Validation::Terse(None)
        );
    }

    #[test]
    fn valid() {
        let res = check(
            "218.103.58.0/24", 4515, vec![vrp("218.103.58.0/23", 24, 4515)]
        );
        assert_eq!(res.valid(), Some(true));
        assert_eq!(res.reason(), None);
    }

    #[test]
    fn bad_length() {
        let res = check(
            "218.103.58.0/25", 4515, vec![vrp("218.103.58.0/23", 24, 4515)]
        );
        assert_eq!(res.valid(), Some(false));
        assert_eq!(res.reason(), Some("Not valid prefix length"));
    }

    #[test]
    fn bad_origin() {
        let res = check(
            "218.103.58.0/23", 9999, vec![vrp("218.103.58.0/23", 24, 4515)]
        );
        assert_eq!(res.valid(), Some(false));
        assert_eq!(res.reason(), Some("Not valid origin"));
    }

    #[test]
    fn any_same_origin_vrp_may_allow_length() {
        // The more specific VRP doesn’t allow /24 but the less specific
        // one does. That is enough.
        let res = check(
            "10.1.2.0/24", 65000,
            vec![vrp("10.0.0.0/8", 24, 65000), vrp("10.1.0.0/16", 16, 65000)]
        );
        assert_eq!(res.valid(), Some(true));
    }

    #[test]
    fn evidence_contains_all_covering() {
        let covering = vec![
            vrp("10.0.0.0/8", 8, 1),
            vrp("10.1.0.0/16", 24, 2),
            vrp("10.1.0.0/16", 16, 3),
        ];
        let res = check("10.1.0.0/24", 3, covering.clone());
        assert_eq!(res.reason(), Some("Not valid prefix length"));
        match res.into_validation(true) {
            Validation::Verbose(report) => {
                assert_eq!(report.valid, Some(false));
                assert_eq!(report.covering, covering);
            }
            Validation::Terse(_) => panic!("expected verbose output")
        }
    }

    #[test]
    fn serialize_outputs() {
        assert_eq!(
            serde_json::to_string(&Validation::Terse(None)).unwrap(),
            "null"
        );
        assert_eq!(
            serde_json::to_string(&Validation::Terse(Some(true))).unwrap(),
            "true"
        );
        let res = check("1.2.3.0/24", 64501, vec![vrp("1.2.3.0/24", 24, 64500)]);
        assert_eq!(
            serde_json::to_value(res.into_validation(true)).unwrap(),
            serde_json::json!({
                "valid": false,
                "reason": "Not valid origin",
                "covering": [
                    { "prefix": "1.2.3.0/24", "maxLength": 24,
                      "asn": 64500, "ta": "" }
                ]
            })
        );
    }
}
