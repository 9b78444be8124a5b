//! Desired-schema model and introspected column state.
//!
//! [`Table`], [`Column`] and [`Index`] describe the schema a database should
//! end up with. They are dialect-agnostic: the semantic [`ColumnType`] is only
//! turned into SQL by a [`Generator`](crate::Generator). [`LiveColumn`] is the
//! other side of the diff, produced by an
//! [`Introspector`](crate::Introspector) from the live database.
//!
//! The types serialize with [`serde`], so a schema can be kept in YAML or JSON
//! next to the code that owns it.
//!
//! # Examples
//!
//! ```
//! use schema_upgrade_core::{Column, ColumnType, Table};
//!
//! let users = Table::new("users")
//!     .column(Column::new("id", ColumnType::Integer))
//!     .column(Column::new("email", ColumnType::Text))
//!     .primary_key(["id"])
//!     .unique_index("users_email", ["email"]);
//!
//! assert_eq!(users.columns.len(), 2);
//! assert!(users.indexes[0].unique);
//! assert_eq!(users.indexes[0].table, "users");
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Fieldless discriminant of [`ColumnType`].
///
/// Used as the key of a dialect's type override map, so an override applies
/// to every parameterization of a type (all `Varchar` lengths, both timestamp
/// flavours).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ColumnKind {
    Identifier,
    Integer,
    Boolean,
    Text,
    Varchar,
    Json,
    Binary,
    Timestamp,
    Decimal,
}

/// Semantic column type.
///
/// Serialized as a compact type string (`"varchar(64)"`, `"timestamptz"`,
/// `"decimal(10,2)"`) that round-trips through [`FromStr`] and [`Display`](fmt::Display).
///
/// # Examples
///
/// ```
/// use schema_upgrade_core::{ColumnKind, ColumnType};
///
/// let ty: ColumnType = "decimal(10,2)".parse().unwrap();
/// assert_eq!(ty, ColumnType::Decimal { precision: 10, scale: 2 });
/// assert_eq!(ty.kind(), ColumnKind::Decimal);
/// assert_eq!(ColumnType::Timestamp { timezone: true }.to_string(), "timestamptz");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ColumnType {
    /// 64-bit record identifier.
    Identifier,
    Integer,
    Boolean,
    /// Unbounded text.
    Text,
    /// Bounded text.
    Varchar(u32),
    Json,
    /// Binary large object.
    Binary,
    Timestamp {
        timezone: bool,
    },
    Decimal {
        precision: u8,
        scale: u8,
    },
}

impl ColumnType {
    /// Returns the discriminant used for override lookups.
    pub fn kind(&self) -> ColumnKind {
        match self {
            Self::Identifier => ColumnKind::Identifier,
            Self::Integer => ColumnKind::Integer,
            Self::Boolean => ColumnKind::Boolean,
            Self::Text => ColumnKind::Text,
            Self::Varchar(_) => ColumnKind::Varchar,
            Self::Json => ColumnKind::Json,
            Self::Binary => ColumnKind::Binary,
            Self::Timestamp { .. } => ColumnKind::Timestamp,
            Self::Decimal { .. } => ColumnKind::Decimal,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identifier => f.write_str("identifier"),
            Self::Integer => f.write_str("integer"),
            Self::Boolean => f.write_str("boolean"),
            Self::Text => f.write_str("text"),
            Self::Varchar(len) => write!(f, "varchar({len})"),
            Self::Json => f.write_str("json"),
            Self::Binary => f.write_str("binary"),
            Self::Timestamp { timezone: true } => f.write_str("timestamptz"),
            Self::Timestamp { timezone: false } => f.write_str("timestamp"),
            Self::Decimal { precision, scale } => write!(f, "decimal({precision},{scale})"),
        }
    }
}

/// Error returned when a type string does not name a [`ColumnType`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown column type '{0}'")]
pub struct ParseColumnTypeError(pub String);

impl FromStr for ColumnType {
    type Err = ParseColumnTypeError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase().replace(' ', "");
        let err = || ParseColumnTypeError(raw.to_string());

        let (head, args) = match normalized.split_once('(') {
            Some((head, rest)) => {
                let args = rest.strip_suffix(')').ok_or_else(err)?;
                (head, Some(args))
            }
            None => (normalized.as_str(), None),
        };

        let ty = match (head, args) {
            ("identifier" | "id", None) => Self::Identifier,
            ("integer" | "int", None) => Self::Integer,
            ("boolean" | "bool", None) => Self::Boolean,
            ("text", None) => Self::Text,
            ("json", None) => Self::Json,
            ("binary" | "blob", None) => Self::Binary,
            ("timestamp", None) => Self::Timestamp { timezone: false },
            ("timestamptz", None) => Self::Timestamp { timezone: true },
            ("varchar", Some(len)) => Self::Varchar(len.parse().map_err(|_| err())?),
            ("decimal", Some(args)) => {
                let (precision, scale) = args.split_once(',').ok_or_else(err)?;
                Self::Decimal {
                    precision: precision.parse().map_err(|_| err())?,
                    scale: scale.parse().map_err(|_| err())?,
                }
            }
            _ => return Err(err()),
        };
        Ok(ty)
    }
}

impl TryFrom<String> for ColumnType {
    type Error = ParseColumnTypeError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        raw.parse()
    }
}

impl From<ColumnType> for String {
    fn from(ty: ColumnType) -> Self {
        ty.to_string()
    }
}

/// A desired column.
///
/// Columns compare by name during diffing; a type or nullability change on an
/// existing column is never migrated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    /// Whether `NULL` is allowed. Columns are `NOT NULL` unless stated.
    #[serde(default)]
    pub nullable: bool,
    /// Raw SQL expression rendered after `DEFAULT`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl Column {
    /// Creates a `NOT NULL` column without a default.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: false,
            default: None,
        }
    }

    /// Allows `NULL` values.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Sets the default expression, rendered verbatim.
    pub fn with_default(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }
}

/// A desired index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    pub name: String,
    /// Owning table. Filled in from the owner when a schema document omits it.
    #[serde(default)]
    pub table: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

impl Index {
    pub fn new<I, S>(name: impl Into<String>, table: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            table: table.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// A desired table: ordered columns, indexes in declaration order and an
/// optional primary key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<Index>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<Vec<String>>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            indexes: Vec::new(),
            primary_key: None,
        }
    }

    /// Appends a column.
    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Sets the primary key columns.
    pub fn primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Appends a non-unique index owned by this table.
    pub fn index<I, S>(mut self, name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let index = Index::new(name, self.name.clone(), columns);
        self.indexes.push(index);
        self
    }

    /// Appends a unique index owned by this table.
    pub fn unique_index<I, S>(mut self, name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let index = Index::new(name, self.name.clone(), columns).unique();
        self.indexes.push(index);
        self
    }

    /// Looks up a desired column by name.
    pub fn find_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Sets the owner of indexes that do not name one.
    pub(crate) fn adopt_indexes(&mut self) {
        for index in &mut self.indexes {
            if index.table.is_empty() {
                index.table = self.name.clone();
            }
        }
    }
}

/// A column as it currently exists in the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveColumn {
    pub name: String,
    pub nullable: bool,
    /// Type as reported by the engine, unnormalized.
    pub raw_type: String,
    pub has_default: bool,
    /// Whether the column is part of the table's primary key.
    pub primary_key: bool,
}
