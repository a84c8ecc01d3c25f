//! Validated ROA payloads and their building blocks.
//!
//! This is a private module. Its public types are re-exported by the parent.

use std::{error, fmt};
use std::str::FromStr;
use chrono::{DateTime, Utc};
use ipnet::IpNet;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use crate::error::Error;
use crate::utils::date::deserialize_timestamp;


//------------ Asn -----------------------------------------------------------

/// An autonomous system number.
///
/// When parsed from a string, an optional `AS` prefix is accepted in any
/// case. When displayed, the prefix is always included.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Asn(u32);

impl Asn {
    pub const fn from_u32(value: u32) -> Self {
        Asn(value)
    }

    pub fn into_u32(self) -> u32 {
        self.0
    }

    /// Converts a JSON value into an AS number.
    ///
    /// Both numbers and strings are accepted since sources publish either.
    fn from_json(value: &Value) -> Option<Self> {
        match *value {
            Value::Number(ref num) => {
                num.as_u64().and_then(|num| u32::try_from(num).ok()).map(Asn)
            }
            Value::String(ref s) => Asn::from_str(s).ok(),
            _ => None
        }
    }
}

impl From<u32> for Asn {
    fn from(value: u32) -> Self {
        Asn(value)
    }
}

impl From<Asn> for u32 {
    fn from(asn: Asn) -> Self {
        asn.0
    }
}

impl FromStr for Asn {
    type Err = ParseAsnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let digits = match s.get(..2) {
            Some(start) if start.eq_ignore_ascii_case("as") => &s[2..],
            _ => s
        };
        u32::from_str(digits).map(Asn).map_err(|_| ParseAsnError)
    }
}

impl fmt::Display for Asn {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "AS{}", self.0)
    }
}

impl Serialize for Asn {
    fn serialize<S: Serializer>(
        &self, serializer: S
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.0)
    }
}

impl<'de> Deserialize<'de> for Asn {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D
    ) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Asn::from_json(&value).ok_or_else(|| {
            serde::de::Error::custom(format!("invalid AS number {}", value))
        })
    }
}


//------------ ParseAsnError -------------------------------------------------

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ParseAsnError;

impl fmt::Display for ParseAsnError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("invalid AS number")
    }
}

impl error::Error for ParseAsnError { }


//------------ parse_prefix and parse_origin ---------------------------------

/// Parses a prefix given by a caller.
///
/// Host bits beyond the prefix length are cleared rather than rejected.
pub fn parse_prefix(prefix: &str) -> Result<IpNet, Error> {
    IpNet::from_str(prefix.trim()).map(|net| net.trunc()).map_err(|_| {
        Error::InvalidPrefix(prefix.into())
    })
}

/// Parses an origin AS number given by a caller.
pub fn parse_origin(origin: &str) -> Result<Asn, Error> {
    if origin.trim().is_empty() {
        return Err(Error::MissingOrigin)
    }
    Asn::from_str(origin).map_err(|_| Error::InvalidOrigin(origin.into()))
}


//------------ VrpRecord -----------------------------------------------------

/// A VRP as delivered by a data source, before any checking.
///
/// Sources are rather creative with their field names and value types, so
/// this type accepts a number of aliases and keeps the AS number and
/// maximum length as raw JSON values. Use [`Vrp::check`] to turn it into a
/// proper VRP.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct VrpRecord {
    #[serde(default)]
    pub prefix: Option<String>,

    #[serde(
        default, rename = "maxLength",
        alias = "max_length", alias = "maxlen",
    )]
    pub max_length: Option<Value>,

    #[serde(default, alias = "asid", alias = "origin")]
    pub asn: Option<Value>,

    #[serde(
        default, rename = "ta",
        alias = "trustAnchor", alias = "trust_anchor",
        skip_serializing_if = "Option::is_none",
    )]
    pub trust_anchor: Option<String>,

    #[serde(
        default, deserialize_with = "deserialize_timestamp",
        skip_serializing_if = "Option::is_none",
    )]
    pub expires: Option<DateTime<Utc>>,

    #[serde(
        default, rename = "notBefore", alias = "not_before",
        deserialize_with = "deserialize_timestamp",
        skip_serializing_if = "Option::is_none",
    )]
    pub not_before: Option<DateTime<Utc>>,
}

impl VrpRecord {
    /// Creates a record from its essential parts.
    pub fn new(prefix: &str, max_length: u8, asn: u32) -> Self {
        VrpRecord {
            prefix: Some(prefix.into()),
            max_length: Some(max_length.into()),
            asn: Some(asn.into()),
            .. Default::default()
        }
    }

    pub fn with_trust_anchor(mut self, ta: &str) -> Self {
        self.trust_anchor = Some(ta.into());
        self
    }

    pub fn with_expires(mut self, expires: DateTime<Utc>) -> Self {
        self.expires = Some(expires);
        self
    }
}

impl From<&Vrp> for VrpRecord {
    fn from(vrp: &Vrp) -> Self {
        VrpRecord {
            prefix: Some(vrp.prefix.to_string()),
            max_length: Some(vrp.max_length.into()),
            asn: Some(vrp.asn.0.into()),
            trust_anchor: Some(vrp.trust_anchor.clone()),
            expires: vrp.expires,
            not_before: vrp.not_before,
        }
    }
}


//------------ Vrp -----------------------------------------------------------

/// A validated ROA payload.
///
/// A VRP states that the holder of `prefix` allows `asn` to originate
/// routes for the prefix and any of its more specifics up to a prefix
/// length of `max_length`.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize)]
pub struct Vrp {
    prefix: IpNet,

    #[serde(rename = "maxLength")]
    max_length: u8,

    asn: Asn,

    #[serde(rename = "ta")]
    trust_anchor: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    expires: Option<DateTime<Utc>>,

    #[serde(rename = "notBefore", skip_serializing_if = "Option::is_none")]
    not_before: Option<DateTime<Utc>>,
}

impl Vrp {
    /// Creates a new VRP.
    ///
    /// Fails if the maximum length is shorter than the prefix length or
    /// longer than the address family allows.
    pub fn new(
        prefix: IpNet, max_length: u8, asn: Asn
    ) -> Result<Self, VrpError> {
        if max_length < prefix.prefix_len() {
            return Err(VrpError::MaxLengthTooShort)
        }
        if max_length > prefix.max_prefix_len() {
            return Err(VrpError::MaxLengthTooLong)
        }
        Ok(Vrp {
            prefix: prefix.trunc(),
            max_length,
            asn,
            trust_anchor: String::new(),
            expires: None,
            not_before: None,
        })
    }

    /// Checks a source record for structural well-formedness.
    pub fn check(record: &VrpRecord) -> Result<Self, VrpError> {
        let prefix = record.prefix.as_ref().ok_or(VrpError::MissingPrefix)?;
        let prefix = IpNet::from_str(prefix.trim()).map_err(|_| {
            VrpError::InvalidPrefix
        })?;
        let asn = record.asn.as_ref().and_then(Asn::from_json).ok_or(
            VrpError::InvalidAsn
        )?;
        let max_length = match record.max_length.as_ref() {
            Some(Value::Number(num)) => {
                num.as_u64().and_then(|num| u8::try_from(num).ok())
            }
            Some(Value::String(s)) => u8::from_str(s.trim()).ok(),
            _ => None
        }.ok_or(VrpError::InvalidMaxLength)?;
        let mut res = Self::new(prefix, max_length, asn)?;
        res.trust_anchor = record.trust_anchor.clone().unwrap_or_default();
        res.expires = record.expires;
        res.not_before = record.not_before;
        Ok(res)
    }

    pub fn with_trust_anchor(mut self, ta: impl Into<String>) -> Self {
        self.trust_anchor = ta.into();
        self
    }

    pub fn prefix(&self) -> IpNet {
        self.prefix
    }

    pub fn max_length(&self) -> u8 {
        self.max_length
    }

    pub fn asn(&self) -> Asn {
        self.asn
    }

    pub fn trust_anchor(&self) -> &str {
        &self.trust_anchor
    }

    pub fn expires(&self) -> Option<DateTime<Utc>> {
        self.expires
    }

    pub fn not_before(&self) -> Option<DateTime<Utc>> {
        self.not_before
    }

    /// Returns whether the VRP’s prefix covers the given prefix.
    pub fn covers(&self, prefix: IpNet) -> bool {
        self.prefix.contains(&prefix)
    }

    /// Returns the composite key identifying this VRP.
    pub fn key(&self) -> VrpKey {
        VrpKey::new(self.prefix, self.asn, self.max_length)
    }
}

impl fmt::Display for Vrp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}-{} => {}", self.prefix, self.max_length, self.asn)
    }
}


//------------ VrpKey --------------------------------------------------------

/// The identity of a VRP: prefix, origin AS, and maximum length.
///
/// This is used to look up the objects a VRP was derived from.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct VrpKey {
    pub prefix: IpNet,
    pub asn: Asn,
    pub max_length: u8,
}

impl VrpKey {
    pub fn new(prefix: IpNet, asn: Asn, max_length: u8) -> Self {
        VrpKey { prefix: prefix.trunc(), asn, max_length }
    }
}

impl From<&Vrp> for VrpKey {
    fn from(vrp: &Vrp) -> Self {
        vrp.key()
    }
}

impl fmt::Display for VrpKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}-{}-{}", self.prefix, self.asn.0, self.max_length)
    }
}


//------------ VrpError ------------------------------------------------------

/// A source record does not describe a well-formed VRP.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VrpError {
    MissingPrefix,
    InvalidPrefix,
    InvalidAsn,
    InvalidMaxLength,
    MaxLengthTooShort,
    MaxLengthTooLong,
}

impl fmt::Display for VrpError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            VrpError::MissingPrefix => "missing prefix",
            VrpError::InvalidPrefix => "invalid prefix",
            VrpError::InvalidAsn => "invalid AS number",
            VrpError::InvalidMaxLength => "invalid max length",
            VrpError::MaxLengthTooShort => {
                "max length shorter than prefix length"
            }
            VrpError::MaxLengthTooLong => {
                "max length exceeds address length"
            }
        })
    }
}

impl error::Error for VrpError { }


//============ Tests =========================================================
