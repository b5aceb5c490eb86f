//! Analysis feature lists.

use std::fmt;

/// Features requested when the caller asks for none.
pub const DEFAULT_FEATURES: &[&str] = &["TABLES", "FORMS"];

/// Ordered, deduplicated list of provider feature names (TABLES, FORMS,
/// LAYOUT, SIGNATURES, QUERIES, ...).
///
/// Names are trimmed and blank entries dropped. Case is kept as given; the
/// provider decides whether it accepts it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureSet(Vec<String>);

impl FeatureSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut features: Vec<String> = Vec::new();
        for name in names {
            let name = name.as_ref().trim();
            if !name.is_empty() && !features.iter().any(|f| f == name) {
                features.push(name.to_string());
            }
        }
        Self(features)
    }

    /// Parse a comma-separated list such as `"TABLES, forms ,"`.
    pub fn parse(list: &str) -> Self {
        Self::new(list.split(','))
    }

    /// The default set: TABLES, FORMS.
    pub fn default_set() -> Self {
        Self::new(DEFAULT_FEATURES.iter().copied())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// This set, or the default set when empty.
    pub fn or_default(&self) -> Self {
        if self.is_empty() {
            Self::default_set()
        } else {
            self.clone()
        }
    }
}

impl fmt::Display for FeatureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(","))
    }
}
