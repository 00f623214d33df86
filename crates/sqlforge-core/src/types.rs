//! Small shared types used across the transformation façade.

use serde::{Deserialize, Serialize};

/// SQL dialect used to parse and print a statement.
///
/// Dialect selection only affects the external parser/printer contract
/// (`sqlparser`); the rewriters in this crate are dialect-agnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Generic,
    Postgres,
    Snowflake,
    Bigquery,
    Mysql,
    Sqlite,
}

impl Dialect {
    pub fn to_sqlparser_dialect(self) -> Box<dyn sqlparser::dialect::Dialect> {
        use sqlparser::dialect::{
            BigQueryDialect, GenericDialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect,
            SnowflakeDialect,
        };
        match self {
            Self::Generic => Box::new(GenericDialect {}),
            Self::Postgres => Box::new(PostgreSqlDialect {}),
            Self::Snowflake => Box::new(SnowflakeDialect {}),
            Self::Bigquery => Box::new(BigQueryDialect {}),
            Self::Mysql => Box::new(MySqlDialect {}),
            Self::Sqlite => Box::new(SQLiteDialect {}),
        }
    }
}

/// A 1-based source position, as used by the alias renamer's caller-facing API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

/// A half-open byte range `[start, end)` into the original SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, other: Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}
