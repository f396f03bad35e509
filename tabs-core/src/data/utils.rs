use std::sync::Arc;

use serde::{Deserialize, Deserializer};
use time::{macros::format_description, OffsetDateTime};

pub fn default_str() -> Arc<str> {
    "".into()
}

pub fn deserialize_null_arc_str<'de, D>(deserializer: D) -> Result<Arc<str>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::deserialize(deserializer)?;
    Ok(opt.unwrap_or_else(default_str))
}

/// Catalog payloads are not consistent about quoting numbers.
pub fn deserialize_num_or_str<'de, D>(deserializer: D) -> Result<Arc<str>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrStr {
        Int(i64),
        Float(f64),
        Str(String),
    }

    Ok(match Option::<NumOrStr>::deserialize(deserializer)? {
        Some(NumOrStr::Int(n)) => n.to_string().into(),
        Some(NumOrStr::Float(n)) => n.to_string().into(),
        Some(NumOrStr::Str(s)) => s.into(),
        None => default_str(),
    })
}

/// Integer that may arrive as a quoted string, as dates do.
pub fn deserialize_lenient_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = deserialize_num_or_str(deserializer)?;
    if value.is_empty() {
        return Ok(0);
    }
    value
        .parse::<f64>()
        .map(|n| n as i64)
        .map_err(|_err| serde::de::Error::custom("Invalid number"))
}

pub fn format_date(unix_secs: i64) -> Option<String> {
    let date = OffsetDateTime::from_unix_timestamp(unix_secs).ok()?;
    date.format(format_description!("[year]-[month]-[day]")).ok()
}
