//! Column codecs shared by the repositories.

use std::str::FromStr;

use convoflow_domain::time::Timestamp;
use serde::de::DeserializeOwned;

pub(crate) fn decode_err<E>(err: E) -> sqlx::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    sqlx::Error::Decode(Box::new(err))
}

pub(crate) fn parse<T>(value: &str) -> Result<T, sqlx::Error>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    T::from_str(value).map_err(decode_err)
}

pub(crate) fn json<T: DeserializeOwned>(value: &str) -> Result<T, sqlx::Error> {
    serde_json::from_str(value).map_err(decode_err)
}

pub(crate) fn timestamp(value: &str) -> Result<Timestamp, sqlx::Error> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.to_utc())
        .map_err(decode_err)
}

pub(crate) fn maybe_timestamp(value: Option<String>) -> Result<Option<Timestamp>, sqlx::Error> {
    value.as_deref().map(timestamp).transpose()
}
