use std::fmt;

use serde::{Deserialize, Serialize};
use sqlparser::ast::{Ident, Value};

/// Identifier quoting style.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStyle {
    /// `"name"`, standard SQL and `PostgreSQL`.
    #[default]
    Double,
    /// `` `name` ``
    Backtick,
}

impl QuoteStyle {
    /// The quote character.
    pub fn as_char(self) -> char {
        match self {
            QuoteStyle::Double => '"',
            QuoteStyle::Backtick => '`',
        }
    }
}

impl fmt::Display for QuoteStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuoteStyle::Double => write!(f, "double"),
            QuoteStyle::Backtick => write!(f, "backtick"),
        }
    }
}

impl std::str::FromStr for QuoteStyle {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "double" | "\"" => Ok(QuoteStyle::Double),
            "backtick" | "`" => Ok(QuoteStyle::Backtick),
            _ => Err(format!("Invalid quote style: {s}")),
        }
    }
}

/// Lexical conventions of the generated text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dialect {
    /// Identifier quoting.
    pub quote: QuoteStyle,
}

impl Dialect {
    /// Dialect with the given quoting.
    pub fn new(quote: QuoteStyle) -> Self {
        Self { quote }
    }

    /// Quote an identifier, doubling embedded quote characters.
    pub fn ident(&self, name: &str) -> String {
        Ident::with_quote(self.quote.as_char(), name).to_string()
    }

    /// Single-quote a string literal, doubling embedded single quotes.
    pub fn string(&self, value: &str) -> String {
        Value::SingleQuotedString(value.to_string()).to_string()
    }
}
