//! Dialect-aware DDL generation.
//!
//! [`Generator`] turns model elements into SQL text. It is pure: the same
//! input always yields byte-identical SQL, which keeps generated statements
//! comparable across runs and in tests.
//!
//! Column types go through a [`TypeMap`]: the dialect's explicit override map
//! is checked first, and anything it does not intercept falls back to
//! [`default_column_type`].
//!
//! # Examples
//!
//! ```
//! use schema_upgrade_core::{ColumnKind, ColumnType, Generator, TypeMap, TypeOverride};
//!
//! let generator = Generator::new("custom")
//!     .with_types(TypeMap::new().with_override(ColumnKind::Binary, TypeOverride::Fixed("IMAGE")));
//!
//! assert_eq!(generator.column_type(&ColumnType::Binary), "IMAGE");
//! assert_eq!(generator.column_type(&ColumnType::Text), "TEXT");
//! ```

use std::collections::BTreeMap;

use crate::model::{Column, ColumnKind, ColumnType, Index, Table};

/// Renders a [`ColumnType`] with the shared, dialect-neutral mapping.
pub fn default_column_type(ty: &ColumnType) -> String {
    match ty {
        ColumnType::Identifier => "BIGINT".to_string(),
        ColumnType::Integer => "INTEGER".to_string(),
        ColumnType::Boolean => "BOOLEAN".to_string(),
        ColumnType::Text => "TEXT".to_string(),
        ColumnType::Varchar(len) => format!("VARCHAR({len})"),
        ColumnType::Json => "JSON".to_string(),
        ColumnType::Binary => "BLOB".to_string(),
        ColumnType::Timestamp { timezone: true } => "TIMESTAMP WITH TIME ZONE".to_string(),
        ColumnType::Timestamp { timezone: false } => "TIMESTAMP".to_string(),
        ColumnType::Decimal { precision, scale } => format!("DECIMAL({precision},{scale})"),
    }
}

/// How a dialect renders one [`ColumnKind`] instead of the default.
#[derive(Debug, Clone, Copy)]
pub enum TypeOverride {
    /// Always render this fragment, whatever the type's parameters.
    Fixed(&'static str),
    /// Render through a function that sees the full type.
    Render(fn(&ColumnType) -> String),
}

impl TypeOverride {
    fn render(&self, ty: &ColumnType) -> String {
        match self {
            Self::Fixed(fragment) => (*fragment).to_string(),
            Self::Render(render) => render(ty),
        }
    }
}

/// Lookup table from semantic type to a dialect's SQL type fragment.
#[derive(Debug, Clone, Default)]
pub struct TypeMap {
    overrides: BTreeMap<ColumnKind, TypeOverride>,
}

impl TypeMap {
    /// Creates a map with no overrides; every type renders with the default.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_override(mut self, kind: ColumnKind, rendering: TypeOverride) -> Self {
        self.overrides.insert(kind, rendering);
        self
    }

    /// Returns `true` if the dialect intercepts `kind`.
    pub fn overrides(&self, kind: ColumnKind) -> bool {
        self.overrides.contains_key(&kind)
    }

    pub fn render(&self, ty: &ColumnType) -> String {
        match self.overrides.get(&ty.kind()) {
            Some(rendering) => rendering.render(ty),
            None => default_column_type(ty),
        }
    }
}

/// Identifier quoting convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuoteStyle {
    /// ANSI `"name"`.
    #[default]
    DoubleQuote,
    /// MySQL `` `name` ``.
    Backtick,
}

impl QuoteStyle {
    /// Quotes `ident`, doubling any embedded quote character.
    pub fn quote(&self, ident: &str) -> String {
        match self {
            Self::DoubleQuote => format!("\"{}\"", ident.replace('"', "\"\"")),
            Self::Backtick => format!("`{}`", ident.replace('`', "``")),
        }
    }
}

/// SQL generator for one dialect.
#[derive(Debug, Clone)]
pub struct Generator {
    dialect: String,
    quote: QuoteStyle,
    types: TypeMap,
    table_options: Option<String>,
    add_primary_key: bool,
    transactional_ddl: bool,
    numbered_placeholders: bool,
    index_prefix: Option<u32>,
}

impl Generator {
    /// Creates a generator with ANSI quoting, default types, primary-key
    /// alteration support and transactional DDL.
    pub fn new(dialect: impl Into<String>) -> Self {
        Self {
            dialect: dialect.into(),
            quote: QuoteStyle::DoubleQuote,
            types: TypeMap::new(),
            table_options: None,
            add_primary_key: true,
            transactional_ddl: true,
            numbered_placeholders: false,
            index_prefix: None,
        }
    }

    pub fn with_quote_style(mut self, quote: QuoteStyle) -> Self {
        self.quote = quote;
        self
    }

    pub fn with_types(mut self, types: TypeMap) -> Self {
        self.types = types;
        self
    }

    /// Appends `options` after the closing parenthesis of `CREATE TABLE`.
    pub fn with_table_options(mut self, options: impl Into<String>) -> Self {
        self.table_options = Some(options.into());
        self
    }

    /// Marks the dialect as unable to add a primary key to an existing table.
    pub fn without_add_primary_key(mut self) -> Self {
        self.add_primary_key = false;
        self
    }

    /// Declares whether DDL statements can share a transaction.
    pub fn with_transactional_ddl(mut self, transactional: bool) -> Self {
        self.transactional_ddl = transactional;
        self
    }

    /// Binds parameters as `$1, $2, ...` instead of `?`.
    pub fn with_numbered_placeholders(mut self) -> Self {
        self.numbered_placeholders = true;
        self
    }

    /// Indexes text and binary columns on their first `len` characters.
    ///
    /// For engines that cannot index unbounded columns in full.
    pub fn with_index_prefix(mut self, len: u32) -> Self {
        self.index_prefix = Some(len);
        self
    }

    pub fn dialect(&self) -> &str {
        &self.dialect
    }

    pub fn supports_add_primary_key(&self) -> bool {
        self.add_primary_key
    }

    pub fn transactional_ddl(&self) -> bool {
        self.transactional_ddl
    }

    /// Bind marker for the 1-based parameter `position`.
    pub fn placeholder(&self, position: usize) -> String {
        if self.numbered_placeholders {
            format!("${position}")
        } else {
            "?".to_string()
        }
    }

    pub fn quote_ident(&self, ident: &str) -> String {
        self.quote.quote(ident)
    }

    pub fn column_type(&self, ty: &ColumnType) -> String {
        self.types.render(ty)
    }

    /// Renders `"name" TYPE[ NOT NULL][ DEFAULT expr]`.
    pub fn column_definition(&self, column: &Column) -> String {
        let mut def = format!(
            "{} {}",
            self.quote_ident(&column.name),
            self.column_type(&column.column_type)
        );
        if !column.nullable {
            def.push_str(" NOT NULL");
        }
        if let Some(default) = &column.default {
            def.push_str(" DEFAULT ");
            def.push_str(default);
        }
        def
    }

    /// Renders `CREATE TABLE` with inline column definitions and primary key.
    ///
    /// Indexes are not included; they are separate statements.
    pub fn create_table(&self, table: &Table) -> String {
        let mut defs: Vec<String> = table
            .columns
            .iter()
            .map(|c| self.column_definition(c))
            .collect();

        if let Some(pk) = table.primary_key.as_deref().filter(|pk| !pk.is_empty()) {
            defs.push(format!("PRIMARY KEY ({})", self.column_list(pk)));
        }

        let mut sql = format!(
            "CREATE TABLE {} (\n    {}\n)",
            self.quote_ident(&table.name),
            defs.join(",\n    ")
        );
        if let Some(options) = &self.table_options {
            sql.push(' ');
            sql.push_str(options);
        }
        sql
    }

    /// Renders `CREATE INDEX`; `table` supplies the indexed columns' types.
    pub fn create_index(&self, table: &Table, index: &Index) -> String {
        let unique = if index.unique { "UNIQUE " } else { "" };
        let columns: Vec<String> = index
            .columns
            .iter()
            .map(|name| {
                let quoted = self.quote_ident(name);
                let unbounded = table.find_column(name).is_some_and(|c| {
                    matches!(c.column_type, ColumnType::Text | ColumnType::Binary)
                });
                match self.index_prefix {
                    Some(len) if unbounded => format!("{quoted}({len})"),
                    _ => quoted,
                }
            })
            .collect();
        format!(
            "CREATE {}INDEX {} ON {} ({})",
            unique,
            self.quote_ident(&index.name),
            self.quote_ident(&index.table),
            columns.join(", ")
        )
    }

    pub fn drop_table(&self, table: &str) -> String {
        format!("DROP TABLE {}", self.quote_ident(table))
    }

    pub fn add_column(&self, table: &str, column: &Column) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.quote_ident(table),
            self.column_definition(column)
        )
    }

    pub fn drop_column(&self, table: &str, column: &str) -> String {
        format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.quote_ident(table),
            self.quote_ident(column)
        )
    }

    pub fn rename_column(&self, table: &str, old: &str, new: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            self.quote_ident(table),
            self.quote_ident(old),
            self.quote_ident(new)
        )
    }

    /// Renders `ALTER TABLE .. ADD PRIMARY KEY`, or `None` when the dialect
    /// cannot alter an existing table's primary key.
    pub fn add_primary_key(&self, table: &str, columns: &[String]) -> Option<String> {
        if !self.add_primary_key {
            return None;
        }
        Some(format!(
            "ALTER TABLE {} ADD PRIMARY KEY ({})",
            self.quote_ident(table),
            self.column_list(columns)
        ))
    }

    /// Counts the rows of `table` whose `column` equals the first parameter.
    pub fn count_where(&self, table: &str, column: &str) -> String {
        format!(
            "SELECT COUNT(*) FROM {} WHERE {} = {}",
            self.quote_ident(table),
            self.quote_ident(column),
            self.placeholder(1)
        )
    }

    pub fn insert(&self, table: &str, columns: &[String]) -> String {
        let markers = (1..=columns.len())
            .map(|i| self.placeholder(i))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.quote_ident(table),
            self.column_list(columns),
            markers
        )
    }

    fn column_list(&self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ")
    }
}
