use std::{
    fmt::{
        self,
        Display,
    },
    str::FromStr,
    sync::LazyLock,
};

use anyhow::Result;
use regex::Regex;
use serde::{
    Deserialize,
    Serialize,
    de::Visitor,
};
use thiserror::Error;

/// An error resulting from an invalid URI.
#[derive(Debug, Error)]
#[error("invalid uri")]
pub struct InvalidUri;

fn validate_strict_uri<S>(uri: S) -> Result<(), InvalidUri>
where
    S: AsRef<str>,
{
    static PATTERN: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^([0-9a-z_]+\.)*([0-9a-z_]+)$").unwrap());
    if PATTERN.is_match(uri.as_ref()) {
        Ok(())
    } else {
        Err(InvalidUri)
    }
}

/// A URI, which identifies realms, procedures, and error reasons.
///
/// URIs are sequences of lowercase alphanumeric components separated by dots.
#[derive(Debug, Default, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Uri(String);

impl Uri {
    /// Constructs a URI from a string known to be valid at compile time.
    pub(crate) fn from_known<S>(uri: S) -> Self
    where
        S: Into<String>,
    {
        Self(uri.into())
    }

    /// The URI as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Uri {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for Uri {
    type Error = InvalidUri;
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        validate_strict_uri(value)?;
        Ok(Self(value.to_owned()))
    }
}

impl TryFrom<String> for Uri {
    type Error = InvalidUri;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate_strict_uri(&value)?;
        Ok(Self(value))
    }
}

impl FromStr for Uri {
    type Err = InvalidUri;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s)
    }
}

impl From<Uri> for String {
    fn from(value: Uri) -> Self {
        value.0
    }
}

struct UriVisitor;

impl<'de> Visitor<'de> for UriVisitor {
    type Value = Uri;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "a valid uri")
    }

    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Uri::try_from(value).map_err(|_| E::custom(format!("invalid uri: {value}")))
    }
}

impl<'de> Deserialize<'de> for Uri {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_str(UriVisitor)
    }
}
