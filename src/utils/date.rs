//! Utilities for dealing with dates and times.

use std::fmt;
use chrono::{DateTime, Local, TimeZone, Utc};
use chrono::format::{Item, Numeric, Pad};
use serde::{Deserialize, Deserializer};


//------------ Parsing Timestamps --------------------------------------------

/// Parses a timestamp as found in VRP and object metadata documents.
///
/// Sources disagree on the format, so this accepts RFC 3339 strings as well
/// as strings containing Unix seconds. Returns `None` if the string is
/// neither.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<i64>() {
        return timestamp_from_secs(secs)
    }
    DateTime::parse_from_rfc3339(s).ok().map(|date| date.with_timezone(&Utc))
}

/// Converts Unix seconds into a timestamp.
pub fn timestamp_from_secs(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

/// Converts a JSON value into a timestamp.
///
/// Accepts Unix seconds as a number or string and RFC 3339 strings.
pub fn timestamp_from_json(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    match *value {
        serde_json::Value::Number(ref num) => {
            num.as_i64().and_then(timestamp_from_secs)
        }
        serde_json::Value::String(ref s) => parse_timestamp(s),
        _ => None,
    }
}

/// Deserializes an optional, leniently formatted timestamp.
///
/// Accepts Unix seconds as a number or string, RFC 3339 strings, and null.
/// Anything else deserializes to `None` rather than failing the whole
/// document.
pub fn deserialize_timestamp<'de, D>(
    deserializer: D
) -> Result<Option<DateTime<Utc>>, D::Error>
where D: Deserializer<'de> {
    serde_json::Value::deserialize(deserializer).map(|value| {
        timestamp_from_json(&value)
    })
}


//------------ Constructing ISO Dates ----------------------------------------

pub fn format_iso_date(date: DateTime<Utc>) -> impl fmt::Display {
    const UTC_ISO_DATE: &[Item<'static>] = &[
        Item::Numeric(Numeric::Year, Pad::Zero),
        Item::Literal("-"),
        Item::Numeric(Numeric::Month, Pad::Zero),
        Item::Literal("-"),
        Item::Numeric(Numeric::Day, Pad::Zero),
        Item::Literal("T"),
        Item::Numeric(Numeric::Hour, Pad::Zero),
        Item::Literal(":"),
        Item::Numeric(Numeric::Minute, Pad::Zero),
        Item::Literal(":"),
        Item::Numeric(Numeric::Second, Pad::Zero),
        Item::Literal("Z"),
    ];

    date.format_with_items(UTC_ISO_DATE.iter())
}

pub fn format_local_iso_date(date: DateTime<Local>) -> impl fmt::Display {
    const LOCAL_ISO_DATE: &[Item<'static>] = &[
        Item::Numeric(Numeric::Year, Pad::Zero),
        Item::Literal("-"),
        Item::Numeric(Numeric::Month, Pad::Zero),
        Item::Literal("-"),
        Item::Numeric(Numeric::Day, Pad::Zero),
        Item::Literal("T"),
        Item::Numeric(Numeric::Hour, Pad::Zero),
        Item::Literal(":"),
        Item::Numeric(Numeric::Minute, Pad::Zero),
        Item::Literal(":"),
        Item::Numeric(Numeric::Second, Pad::Zero),
    ];

    date.format_with_items(LOCAL_ISO_DATE.iter())
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_timestamp() {
        let date = Utc.with_ymd_and_hms(2023, 10, 11, 0, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2023-10-11T00:00:00Z"), Some(date));
        assert_eq!(parse_timestamp("2023-10-11T02:00:00+02:00"), Some(date));
        assert_eq!(parse_timestamp("1696982400"), Some(date));
        assert_eq!(parse_timestamp(" 1696982400 "), Some(date));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_deserialize_timestamp() {
        #[derive(Deserialize)]
        struct Doc {
            #[serde(default, deserialize_with = "deserialize_timestamp")]
            at: Option<DateTime<Utc>>,
        }

        let date = Utc.with_ymd_and_hms(2023, 10, 11, 0, 0, 0).unwrap();
        let doc: Doc = serde_json::from_str(r#"{"at": 1696982400}"#).unwrap();
        assert_eq!(doc.at, Some(date));
        let doc: Doc = serde_json::from_str(
            r#"{"at": "2023-10-11T00:00:00Z"}"#
        ).unwrap();
        assert_eq!(doc.at, Some(date));
        let doc: Doc = serde_json::from_str(r#"{"at": null}"#).unwrap();
        assert_eq!(doc.at, None);
        let doc: Doc = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(doc.at, None);
        let doc: Doc = serde_json::from_str(r#"{"at": [1]}"#).unwrap();
        assert_eq!(doc.at, None);
    }

    #[test]
    fn test_format_iso_date() {
        let date = Utc.with_ymd_and_hms(2023, 10, 11, 8, 5, 3).unwrap();
        assert_eq!(
            format_iso_date(date).to_string(), "2023-10-11T08:05:03Z"
        );
    }
}
