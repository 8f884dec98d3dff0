use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Hierarchical namespace identifier: an ordered, non-empty sequence of
/// non-empty name segments. Persisted dot-joined; reconstructed by splitting
/// on `.`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NamespaceIdent(Vec<String>);

impl NamespaceIdent {
    pub fn new(name: impl Into<String>) -> Self {
        Self(vec![name.into()])
    }

    pub fn from_parts(parts: Vec<String>) -> Result<Self> {
        if parts.is_empty() {
            return Err(Error::invalid_identifier("namespace has no segments"));
        }
        if parts.iter().any(|p| p.is_empty()) {
            return Err(Error::invalid_identifier("namespace contains an empty segment"));
        }
        Ok(Self(parts))
    }

    pub fn from_strs<I, S>(parts: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_parts(parts.into_iter().map(Into::into).collect())
    }

    /// Parses a dot-joined namespace string back into segments.
    pub fn parse(joined: &str) -> Result<Self> {
        Self::from_parts(joined.split('.').map(str::to_string).collect())
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }

    pub fn join(&self, separator: &str) -> String {
        self.0.join(separator)
    }

    /// The dot-joined form used by the catalog store.
    pub fn encode(&self) -> String {
        self.join(".")
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when `self` is a strict descendant of `parent`: strictly longer,
    /// with `parent` as a prefix.
    pub fn is_descendant_of(&self, parent: &NamespaceIdent) -> bool {
        self.0.len() > parent.0.len() && self.0.starts_with(&parent.0)
    }
}

impl fmt::Display for NamespaceIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

/// Table identifier: a namespace plus a final table-name segment. Uniqueness
/// is enforced over the full sequence within a catalog.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableIdent {
    pub namespace: NamespaceIdent,
    pub name: String,
}

impl TableIdent {
    pub fn new(namespace: NamespaceIdent, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::invalid_identifier("table name is empty"));
        }
        Ok(Self { namespace, name })
    }

    /// Builds an identifier from an ordered segment sequence; the prefix is
    /// the namespace and the last segment the table name.
    pub fn from_strs<I, S>(parts: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut parts: Vec<String> = parts.into_iter().map(Into::into).collect();
        if parts.len() < 2 {
            return Err(Error::invalid_identifier(
                "table identifier needs at least a namespace and a name",
            ));
        }
        let name = parts.pop().expect("len checked above");
        Ok(Self {
            namespace: NamespaceIdent::from_parts(parts)?,
            name,
        })
    }

    /// Parses a dotted path such as `analytics.trips`.
    pub fn parse(path: &str) -> Result<Self> {
        Self::from_strs(path.split('.'))
    }

    pub fn namespace(&self) -> &NamespaceIdent {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for TableIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.name)
    }
}
