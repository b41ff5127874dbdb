//! String keyed parameters used for module initialisation and per-action configuration.
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::Error;
use crate::Result;

/// Pipe used by actions that do not name one.
pub const DEFAULT_PIPE: &str = "1";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Params(BTreeMap<String, String>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|v| v.as_str())
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn set(&mut self, key: &str, value: impl ToString) {
        self.0.insert(key.to_string(), value.to_string());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parses a value with [`FromStr`]. A missing key is `Ok(None)`.
    pub fn parse<T: FromStr>(&self, key: &str) -> Result<Option<T>>
    where
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            None => Ok(None),
            Some(value) => value
                .trim()
                .parse()
                .map(Some)
                .map_err(|e| Error::InvalidArgument(format!("{}={}: {}", key, value, e))),
        }
    }

    /// Integer value, accepting a `0x` prefix for hex.
    pub fn get_int(&self, key: &str) -> Result<Option<i64>> {
        self.get(key).map(parse_int).transpose()
    }

    /// Boolean flag. `False`, `false`, `0` and `-1` are false, `True`, `true` and `1` are true, anything else is `default`.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key).map(str::trim) {
            Some("False" | "false" | "0" | "-1") => false,
            Some("True" | "true" | "1") => true,
            _ => default,
        }
    }

    pub fn pipe(&self) -> &str {
        self.get_or("pipe", DEFAULT_PIPE)
    }

    /// Fills in defaults every action relies on.
    pub fn validated(mut self) -> Self {
        if !self.contains("pipe") {
            self.set("pipe", DEFAULT_PIPE);
        }
        self
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for Params {
    fn from(items: [(K, V); N]) -> Self {
        items.into_iter().collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Params(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Parses a decimal or `0x` prefixed hex integer.
pub fn parse_int(value: &str) -> Result<i64> {
    let value = value.trim();
    let (negative, digits) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value),
    };

    let parsed = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16),
        None => digits.parse(),
    }
    .map_err(|e| Error::InvalidArgument(format!("{}: {}", value, e)))?;

    Ok(if negative { -parsed } else { parsed })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pipe() {
        let params = Params::from([("action", "read")]).validated();
        assert_eq!(params.pipe(), "1");

        let params = Params::from([("pipe", "2")]).validated();
        assert_eq!(params.pipe(), "2");
    }

    #[test]
    fn integers() {
        assert_eq!(parse_int("0x7e0").unwrap(), 0x7e0);
        assert_eq!(parse_int(" 42 ").unwrap(), 42);
        assert_eq!(parse_int("-1").unwrap(), -1);
        assert!(parse_int("zz").is_err());

        let params = Params::from([("shift", "0x10")]);
        assert_eq!(params.get_int("shift").unwrap(), Some(16));
        assert_eq!(params.get_int("missing").unwrap(), None);
    }

    #[test]
    fn flags() {
        let params = Params::from([("active", "False"), ("output_screen", "1"), ("debug", "yes")]);
        assert!(!params.get_bool("active", true));
        assert!(params.get_bool("output_screen", false));
        assert!(params.get_bool("debug", true));
        assert!(!params.get_bool("missing", false));
    }

    #[test]
    fn parse_float() {
        let params = Params::from([("settle", "0.5"), ("bad", "x")]);
        assert_eq!(params.parse::<f64>("settle").unwrap(), Some(0.5));
        assert!(params.parse::<f64>("bad").is_err());
    }
}
