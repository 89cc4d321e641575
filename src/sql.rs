//! Identifier composition
//!
//! Schema, table and column names are only ever turned into SQL text through
//! [`Ident`], which delegates to the driver's identifier escaping. Literal
//! values never go through here; they are bound as `$n` parameters.

use std::fmt;

use postgres_protocol::escape::escape_identifier;

/// A quoted SQL identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident(String);

impl Ident {
    pub fn new(name: &str) -> Self {
        Self(escape_identifier(name))
    }

    /// `schema.relation`, each part quoted separately
    pub fn qualified(schema: &str, relation: &str) -> Self {
        Self(format!(
            "{}.{}",
            escape_identifier(schema),
            escape_identifier(relation)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
