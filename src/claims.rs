//! Claim renaming for providers whose id_token does not use the claim names the
//! host expects (for OpenID Connect the user id is the `sub` claim).
//!
//! A [`TokenMap`] is written by the host as space separated `from:to` pairs,
//! e.g. `"sub:user_id upn:email"`. Applying it only ever fills in missing
//! targets, so applying it twice gives the same claims as applying it once.

use crate::errors::ConfigError;
use serde_derive::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// A decoded claim set, keyed by claim name.
pub type Claims = Map<String, Value>;

/// One `from:to` pair of a [`TokenMap`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameRule {
    pub from: String,
    pub to: String,
}

impl FromStr for RenameRule {
    type Err = ConfigError;

    fn from_str(pair: &str) -> Result<Self, Self::Err> {
        match pair.split_once(':') {
            Some((from, to)) if !from.is_empty() && !to.is_empty() && !to.contains(':') => {
                Ok(RenameRule {
                    from: from.to_string(),
                    to: to.to_string(),
                })
            }
            _ => Err(ConfigError::MalformedRule(pair.to_string())),
        }
    }
}

impl fmt::Display for RenameRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.from, self.to)
    }
}

/// Ordered rename rules taken from a provider's `token_map` setting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TokenMap {
    rules: Vec<RenameRule>,
}

impl TokenMap {
    pub fn new(rules: Vec<RenameRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[RenameRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Applies the rules to `claims`, see [`map_claims`].
    pub fn apply(&self, claims: Claims) -> Claims {
        map_claims(claims, self)
    }
}

impl FromStr for TokenMap {
    type Err = ConfigError;

    /// Parses space separated `from:to` pairs. Any pair without exactly one
    /// `:` separating two non-empty names rejects the whole map.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rules = s
            .split_whitespace()
            .map(RenameRule::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }
}

impl TryFrom<String> for TokenMap {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TokenMap> for String {
    fn from(map: TokenMap) -> String {
        map.to_string()
    }
}

impl fmt::Display for TokenMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, rule) in self.rules.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}", rule)?;
        }
        Ok(())
    }
}

/// For each rule in order, sets `to` when it is absent: to the value of
/// `from`, or to an empty string when `from` is absent too. Existing values
/// are never overwritten and source claims are kept.
pub fn map_claims(mut claims: Claims, rules: &TokenMap) -> Claims {
    for rule in &rules.rules {
        if !claims.contains_key(&rule.to) {
            let value = claims
                .get(&rule.from)
                .cloned()
                .unwrap_or_else(|| Value::String(String::new()));
            claims.insert(rule.to.clone(), value);
        }
    }
    claims
}
