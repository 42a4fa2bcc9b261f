//! Variable sets used by rule evaluation and key expansion.

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// An ordered set of CI variables. Later inserts win.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Variables {
    values: BTreeMap<String, String>,
}

impl Variables {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a variable.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Inserts every pair, replacing existing keys.
    pub fn extend<K, V>(&mut self, pairs: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in pairs {
            self.insert(k, v);
        }
    }

    /// Returns a variable's value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Returns the number of variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if there are no variables.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Expands `$VAR` and `${VAR}` references. Unknown variables expand to
    /// the empty string.
    #[must_use]
    pub fn expand(&self, input: &str) -> String {
        static REFERENCE: OnceLock<Option<Regex>> = OnceLock::new();

        let Some(re) = REFERENCE
            .get_or_init(|| {
                Regex::new(r"\$(?:\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*))").ok()
            })
            .as_ref()
        else {
            return input.to_string();
        };

        re.replace_all(input, |caps: &Captures<'_>| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map_or("", |m| m.as_str());
            self.get(name).unwrap_or_default().to_string()
        })
        .into_owned()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Variables {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut vars = Self::new();
        vars.extend(iter);
        vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_later_insert_wins() {
        let mut vars = Variables::new();
        vars.insert("A", "1");
        vars.extend([("A", "2"), ("B", "3")]);
        assert_eq!(vars.get("A"), Some("2"));
        assert_eq!(vars.len(), 2);
    }

    #[test]
    fn test_expand() {
        let vars: Variables = [("CI_COMMIT_REF_NAME", "main"), ("APP", "web")]
            .into_iter()
            .collect();

        assert_eq!(vars.expand("review/$CI_COMMIT_REF_NAME"), "review/main");
        assert_eq!(vars.expand("${APP}-${CI_COMMIT_REF_NAME}"), "web-main");
        assert_eq!(vars.expand("deploy-$MISSING"), "deploy-");
        assert_eq!(vars.expand("plain"), "plain");
    }
}
