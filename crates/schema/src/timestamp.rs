//! Serde helpers for ClickHouse `DateTime64(3)` text
//!
//! JSONEachRow expects `YYYY-MM-DD hh:mm:ss.sss`; chrono's default RFC 3339 output
//! is not accepted by the default `date_time_input_format`.
//!
//! ```
//! use chrono::{DateTime, Utc};
//! use serde::Serialize;
//!
//! #[derive(Serialize)]
//! struct Seen {
//!     #[serde(with = "whsync_schema::timestamp::datetime64")]
//!     at: DateTime<Utc>,
//! }
//! ```

use chrono::{DateTime, NaiveDateTime, Utc};

/// Text form of a `DateTime64(3)` value
pub const DATETIME64_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Render a timestamp the way ClickHouse parses it
pub fn format(ts: &DateTime<Utc>) -> String {
    ts.format(DATETIME64_FORMAT).to_string()
}

/// Parse `DateTime64(3)` text (fractional part optional) as UTC
pub fn parse(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// `#[serde(with = ...)]` for `DateTime<Utc>`
pub mod datetime64 {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format(ts))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        super::parse(&s).ok_or_else(|| D::Error::custom(format!("invalid DateTime64: {}", s)))
    }
}

/// `#[serde(with = ...)]` for `Option<DateTime<Utc>>`
pub mod datetime64_option {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S>(ts: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match ts {
            Some(ts) => serializer.serialize_str(&super::format(ts)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(s) => super::parse(&s)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("invalid DateTime64: {}", s))),
            None => Ok(None),
        }
    }
}
