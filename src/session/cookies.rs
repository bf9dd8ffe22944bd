//! Browser session cookies.
//!
//! Overleaf has no token API; requests are authenticated with the cookies of
//! a logged-in browser (`overleaf_session2`, `GCLB`). Extracting them from a
//! browser profile is left to other tools. This module reads what those tools
//! produce: a `Cookie:` header value, a Netscape `cookies.txt` export, or the
//! JSON written by [`Cookies::save`].

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{OverleafError, Result};

/// Name to value map of the cookies sent with every request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cookies {
    values: BTreeMap<String, String>,
}

impl Cookies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `Cookie:` header value (`name=value; name2=value2`).
    pub fn parse_header(header: &str) -> Self {
        let values = header
            .split(';')
            .filter_map(|pair| {
                let (name, value) = pair.split_once('=')?;
                let name = name.trim();
                (!name.is_empty()).then(|| (name.to_string(), value.trim().to_string()))
            })
            .collect();
        Self { values }
    }

    /// Parse a Netscape `cookies.txt` export, keeping cookies sent to `host`.
    pub fn from_netscape(text: &str, host: &str) -> Self {
        let mut values = BTreeMap::new();
        for line in text.lines() {
            // curl and browser extensions mark HttpOnly cookies with this prefix.
            let line = line.strip_prefix("#HttpOnly_").unwrap_or(line);
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 7 {
                continue;
            }
            if domain_matches(fields[0], host) {
                values.insert(fields[5].to_string(), fields[6].trim_end().to_string());
            }
        }
        Self { values }
    }

    /// Load cookies from a file, detecting its format.
    ///
    /// # Arguments
    /// * `path` - JSON map, Netscape `cookies.txt`, or a raw header line
    /// * `host` - Host the cookies are for (used for Netscape files)
    pub fn load<P: AsRef<Path>>(path: P, host: &str) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text, host)
    }

    /// Parse cookie file content; see [`load`](Self::load).
    pub fn parse(text: &str, host: &str) -> Result<Self> {
        let trimmed = text.trim();
        if trimmed.starts_with('{') {
            return Ok(serde_json::from_str(trimmed)?);
        }
        if trimmed.lines().any(|l| l.split('\t').count() >= 7) {
            return Ok(Self::from_netscape(text, host));
        }
        Ok(Self::parse_header(trimmed.trim_start_matches("Cookie:")))
    }

    /// Write the cookies as a JSON map.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| OverleafError::Custom(format!("Serialization error: {}", e)))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Value for the `Cookie` request header.
    pub fn to_header(&self) -> String {
        self.values
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn domain_matches(domain: &str, host: &str) -> bool {
    let domain = domain.trim_start_matches('.');
    host == domain || host.ends_with(&format!(".{}", domain))
}
