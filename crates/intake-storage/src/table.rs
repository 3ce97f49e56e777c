// Table name validation
//
// The events table comes from configuration and is spliced into SQL text
// (identifiers cannot be bound as parameters), so it is checked up front.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

const MAX_IDENTIFIER_LEN: usize = 63;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TableNameError {
    #[error("table name is empty")]
    Empty,

    #[error("invalid identifier {0:?}: use letters, digits and underscores, not starting with a digit")]
    InvalidIdentifier(String),

    #[error("identifier {0:?} exceeds {MAX_IDENTIFIER_LEN} characters")]
    TooLong(String),
}

/// `table` or `schema.table`, each part a plain SQL identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName {
    schema: Option<String>,
    table: String,
}

impl TableName {
    pub fn parse(s: &str) -> Result<Self, TableNameError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(TableNameError::Empty);
        }

        match s.split_once('.') {
            Some((schema, table)) => Ok(Self {
                schema: Some(validate_identifier(schema)?),
                table: validate_identifier(table)?,
            }),
            None => Ok(Self {
                schema: None,
                table: validate_identifier(s)?,
            }),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// Quoted form for use in SQL text
    pub fn quoted(&self) -> String {
        match &self.schema {
            Some(schema) => format!("\"{}\".\"{}\"", schema, self.table),
            None => format!("\"{}\"", self.table),
        }
    }
}

impl FromStr for TableName {
    type Err = TableNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.table),
            None => write!(f, "{}", self.table),
        }
    }
}

fn validate_identifier(part: &str) -> Result<String, TableNameError> {
    let mut chars = part.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };

    if !valid {
        return Err(TableNameError::InvalidIdentifier(part.to_string()));
    }
    if part.len() > MAX_IDENTIFIER_LEN {
        return Err(TableNameError::TooLong(part.to_string()));
    }
    Ok(part.to_string())
}
