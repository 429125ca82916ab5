//! Query-string parameters with repeated keys and range checks.

use std::ops::RangeInclusive;

use further_core::check_range;
use further_shared::{FurtherError, Result};

/// Decoded query string, keys kept in order and possibly repeated
/// (`?sources=a&sources=b`).
#[derive(Debug, Default)]
pub struct Params(Vec<(String, String)>);

impl Params {
    pub fn parse(raw: Option<&str>) -> Self {
        Self(
            raw.map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect()
            })
            .unwrap_or_default(),
        )
    }

    fn first(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Every value given for `name`.
    pub fn all(&self, name: &str) -> Vec<String> {
        self.0
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
            .collect()
    }

    /// A required string of at least `min_chars` characters.
    pub fn required(&self, name: &str, min_chars: usize) -> Result<String> {
        let value = self
            .first(name)
            .ok_or_else(|| FurtherError::validation(format!("missing query parameter: {name}")))?;
        if value.chars().count() < min_chars {
            return Err(FurtherError::validation(format!(
                "{name} must be at least {min_chars} characters"
            )));
        }
        Ok(value.to_string())
    }

    /// An optional integer in `range`, `default` when absent.
    pub fn bounded(&self, name: &str, default: usize, range: RangeInclusive<usize>) -> Result<usize> {
        let value = match self.first(name) {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .map_err(|_| FurtherError::validation(format!("{name} must be an integer")))?,
            None => default,
        };
        check_range(name, value, &range)?;
        Ok(value)
    }
}
