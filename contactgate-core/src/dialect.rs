//! SQL dialects and the dialect detector.
//!
//! The engine speaks two dialects: PostgreSQL on the primary backend and
//! Oracle on the configuration backend, which reaches per-client dialing and
//! reporting databases through database links. A [`Dialect`] is chosen once
//! per request by [`detect_dialect`] and then drives every syntax decision in
//! the SQL builder.

use crate::backends::BackendRole;
use crate::config::EngineConfig;
use crate::error::ContactGateError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Target SQL dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// PostgreSQL: `$n` placeholders, lowercase quoted identifiers,
    /// `LIMIT/OFFSET` paging.
    Postgres,
    /// Oracle: `:n` placeholders, uppercase quoted identifiers,
    /// `OFFSET ... ROWS FETCH NEXT ... ROWS ONLY` paging, `@LINK` addressing.
    Oracle,
}

impl Dialect {
    /// Backend that executes statements written in this dialect.
    pub const fn backend(self) -> BackendRole {
        match self {
            Self::Postgres => BackendRole::Primary,
            Self::Oracle => BackendRole::Configuration,
        }
    }

    /// Renders the placeholder for the 1-based parameter `index`.
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Self::Postgres => format!("${index}"),
            Self::Oracle => format!(":{index}"),
        }
    }

    /// Quotes an allow-listed identifier.
    ///
    /// PostgreSQL folds unquoted names to lowercase and Oracle to uppercase,
    /// so quoting in the folded case keeps the reference exact.
    pub fn quote_identifier(self, identifier: &str) -> String {
        let folded = match self {
            Self::Postgres => identifier.to_lowercase(),
            Self::Oracle => identifier.to_uppercase(),
        };
        format!("\"{}\"", folded.replace('"', "\"\""))
    }

    /// Renders a table reference, adding the link suffix when present.
    pub fn render_table(self, table: &TableRef) -> String {
        let base = format!(
            "{}.{}",
            self.quote_identifier(&table.schema),
            self.quote_identifier(&table.name)
        );
        match (&table.link, self) {
            (Some(link), Self::Oracle) => format!("{base}@{}", link.as_str()),
            _ => base,
        }
    }

    /// Renders the paging clause, binding `limit` and `offset` through
    /// `bind` in the order they appear in the clause.
    ///
    /// Oracle matches positional binds to placeholders by position in the
    /// text, not by the number after the colon.
    pub fn render_pagination(
        self,
        limit: u32,
        offset: u32,
        mut bind: impl FnMut(i64) -> String,
    ) -> String {
        match self {
            Self::Postgres => {
                let limit = bind(i64::from(limit));
                let offset = bind(i64::from(offset));
                format!(" LIMIT {limit} OFFSET {offset}")
            }
            Self::Oracle => {
                let offset = bind(i64::from(offset));
                let limit = bind(i64::from(limit));
                format!(" OFFSET {offset} ROWS FETCH NEXT {limit} ROWS ONLY")
            }
        }
    }

    /// Case-insensitive pattern match; Oracle has no `ILIKE`.
    pub fn render_case_insensitive_like(self, column: &str, placeholder: &str, negated: bool) -> String {
        let not = if negated { "NOT " } else { "" };
        match self {
            Self::Postgres => format!("{column} {not}ILIKE {placeholder}"),
            Self::Oracle => format!("LOWER({column}) {not}LIKE LOWER({placeholder})"),
        }
    }

    /// Returning clause for a generated key. Oracle needs an out bind.
    pub fn render_returning(self, key_column: &str, out_placeholder: &str) -> String {
        let key = self.quote_identifier(key_column);
        match self {
            Self::Postgres => format!(" RETURNING {key}"),
            Self::Oracle => format!(" RETURNING {key} INTO {out_placeholder}"),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Postgres => f.write_str("postgres"),
            Self::Oracle => f.write_str("oracle"),
        }
    }
}

impl std::str::FromStr for Dialect {
    type Err = ContactGateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            "oracle" | "ora" => Ok(Self::Oracle),
            other => Err(ContactGateError::configuration(format!(
                "unknown dialect '{other}' (expected postgres or oracle)"
            ))),
        }
    }
}

fn link_name_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_$#]*(\.[A-Za-z0-9_$#]+)*$").ok())
        .as_ref()
}

/// Name of a database link, as stored in the client table.
///
/// Link names end up in SQL text after `@`, where they cannot be bound, so
/// construction rejects anything that is not a plain (optionally
/// domain-qualified) identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DbLink(String);

impl DbLink {
    /// Validates and canonicalises (uppercases) a link name.
    ///
    /// # Errors
    /// Returns a configuration error for names that are not identifiers.
    pub fn new(name: &str) -> crate::Result<Self> {
        let trimmed = name.trim();
        if link_name_pattern().is_some_and(|re| re.is_match(trimmed)) {
            Ok(Self(trimmed.to_uppercase()))
        } else {
            Err(ContactGateError::configuration(format!(
                "database link name '{trimmed}' is not a valid identifier"
            )))
        }
    }

    /// The canonical link name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DbLink {
    type Error = ContactGateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<DbLink> for String {
    fn from(link: DbLink) -> Self {
        link.0
    }
}

impl fmt::Display for DbLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Physical location of a table: schema, name and optional link.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    /// Owning schema
    pub schema: String,
    /// Table name
    pub name: String,
    /// Database link the table is reached through, if any
    pub link: Option<DbLink>,
}

impl TableRef {
    /// A table in the session's own database.
    pub fn local(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            link: None,
        }
    }

    /// A table reached through `link`.
    pub fn linked(schema: impl Into<String>, name: impl Into<String>, link: DbLink) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            link: Some(link),
        }
    }

    /// Splits a validated `schema.table` name.
    ///
    /// # Errors
    /// Returns a configuration error when there is no schema part.
    pub fn from_qualified(qualified: &str) -> crate::Result<Self> {
        qualified
            .split_once('.')
            .map(|(schema, name)| Self::local(schema, name))
            .ok_or_else(|| {
                ContactGateError::configuration(format!(
                    "table '{qualified}' must be qualified as schema.table"
                ))
            })
    }

    /// Attaches a link when the dialect addresses tables through links.
    #[must_use]
    pub fn via(self, dialect: Dialect, link: &DbLink) -> Self {
        match dialect {
            Dialect::Oracle => Self {
                link: Some(link.clone()),
                ..self
            },
            Dialect::Postgres => self,
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}",
            self.schema.to_uppercase(),
            self.name.to_uppercase()
        )?;
        if let Some(link) = &self.link {
            write!(f, "@{link}")?;
        }
        Ok(())
    }
}

/// Chooses the dialect used to reach a client's dialing database.
///
/// A configured override wins. Otherwise a link matching any of the
/// PostgreSQL glob patterns (compared case-insensitively) is served by the
/// primary PostgreSQL backend, and every other link is an Oracle database
/// link reached from the configuration backend.
pub fn detect_dialect(link: &DbLink, config: &EngineConfig) -> Dialect {
    if let Some(dialect) = config.dialect_override {
        return dialect;
    }
    let name = link.as_str();
    let is_postgres = config
        .postgres_link_patterns
        .iter()
        .filter_map(|pattern| glob_regex(pattern))
        .any(|re| re.is_match(name));

    let dialect = if is_postgres {
        Dialect::Postgres
    } else {
        Dialect::Oracle
    };
    tracing::debug!("Dialing link {} resolved to {} dialect", name, dialect);
    dialect
}

/// Translates a glob with `*` and `?` into an anchored, case-insensitive
/// regex. Every other character matches literally.
fn glob_regex(pattern: &str) -> Option<Regex> {
    let body: String = pattern
        .chars()
        .map(|c| match c {
            '*' => ".*".to_string(),
            '?' => ".".to_string(),
            c => regex::escape(c.encode_utf8(&mut [0; 4])),
        })
        .collect();
    Regex::new(&format!("(?i)^{body}$")).ok()
}
