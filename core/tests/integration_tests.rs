//! Integration tests for the schema-upgrade-core crate.
//!
//! The upgrader runs against an in-memory catalog that applies the generated
//! DDL, so every test observes the statements a real engine would receive and
//! the schema it would end up with.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use regex::Regex;
use schema_upgrade_core::{
    Column, ColumnType, Connection, Dialect, GenericHooks, Hook, Introspector, LegacyColumnRename,
    LiveColumn, Operation, Phase, PortError, Result, Row, SchemaOps, Step, Table, TableOutcome,
    UpgradeError, UpgradeInstructions, Upgrader, Value,
};

#[derive(Debug, Clone, Default)]
struct FakeTable {
    columns: Vec<String>,
    primary_key: Vec<String>,
    indexes: BTreeSet<String>,
}

#[derive(Debug, Clone, Default)]
struct Catalog {
    tables: BTreeMap<String, FakeTable>,
}

/// Applies the DDL shapes the generators emit, with either quoting style.
struct CatalogConnection {
    catalog: Arc<Mutex<Catalog>>,
    snapshot: Option<Catalog>,
    statements: Vec<String>,
    fail_on: Option<String>,
    begins: usize,
}

impl CatalogConnection {
    fn new(catalog: Arc<Mutex<Catalog>>) -> Self {
        Self {
            catalog,
            snapshot: None,
            statements: Vec::new(),
            fail_on: None,
            begins: 0,
        }
    }

    fn failing_on(mut self, fragment: &str) -> Self {
        self.fail_on = Some(fragment.to_string());
        self
    }

    fn apply(&self, sql: &str) -> std::result::Result<(), PortError> {
        let mut catalog = self.catalog.lock().unwrap();

        let create_table =
            Regex::new(r#"(?s)^CREATE TABLE ["`]([^"`]+)["`] \((.*)\)(?: [^)]*)?$"#).unwrap();
        let create_index =
            Regex::new(r#"^CREATE (?:UNIQUE )?INDEX ["`]([^"`]+)["`] ON ["`]([^"`]+)["`]"#).unwrap();
        let alter = Regex::new(r#"^ALTER TABLE ["`]([^"`]+)["`] (.*)$"#).unwrap();
        let quoted = Regex::new(r#"["`]([^"`]+)["`]"#).unwrap();

        if let Some(caps) = create_table.captures(sql) {
            let mut table = FakeTable::default();
            for def in caps[2].split(",\n") {
                let def = def.trim();
                let names: Vec<String> = quoted
                    .captures_iter(def)
                    .map(|c| c[1].to_string())
                    .collect();
                if def.starts_with("PRIMARY KEY") {
                    table.primary_key = names;
                } else {
                    table.columns.push(names[0].clone());
                }
            }
            catalog.tables.insert(caps[1].to_string(), table);
            return Ok(());
        }

        if let Some(caps) = create_index.captures(sql) {
            let table = catalog
                .tables
                .get_mut(&caps[2])
                .ok_or_else(|| format!("no such table: {}", &caps[2]))?;
            if !table.indexes.insert(caps[1].to_string()) {
                return Err(format!("index {} already exists", &caps[1]).into());
            }
            return Ok(());
        }

        if let Some(name) = sql.strip_prefix("DROP TABLE ") {
            catalog.tables.remove(name.trim_matches(['"', '`']));
            return Ok(());
        }

        let caps = alter
            .captures(sql)
            .ok_or_else(|| format!("unsupported statement: {sql}"))?;
        let table = catalog
            .tables
            .get_mut(&caps[1])
            .ok_or_else(|| format!("no such table: {}", &caps[1]))?;
        let names: Vec<String> = quoted
            .captures_iter(&caps[2])
            .map(|c| c[1].to_string())
            .collect();
        let action = &caps[2];

        if action.starts_with("ADD COLUMN") {
            if table.columns.contains(&names[0]) {
                return Err(format!("duplicate column name: {}", names[0]).into());
            }
            table.columns.push(names[0].clone());
        } else if action.starts_with("DROP COLUMN") {
            table.columns.retain(|c| c != &names[0]);
        } else if action.starts_with("RENAME COLUMN") {
            if table.columns.contains(&names[1]) {
                return Err(format!("duplicate column name: {}", names[1]).into());
            }
            for column in &mut table.columns {
                if *column == names[0] {
                    *column = names[1].clone();
                }
            }
        } else if action.starts_with("ADD PRIMARY KEY") {
            table.primary_key = names;
        } else {
            return Err(format!("unsupported statement: {sql}").into());
        }
        Ok(())
    }
}

impl Connection for CatalogConnection {
    fn execute(&mut self, sql: &str, _params: &[Value]) -> std::result::Result<u64, PortError> {
        if let Some(fragment) = &self.fail_on {
            if sql.contains(fragment.as_str()) {
                return Err(format!("injected failure: {sql}").into());
            }
        }
        self.apply(sql)?;
        self.statements.push(sql.to_string());
        Ok(0)
    }

    fn query(&mut self, _sql: &str, _params: &[Value]) -> std::result::Result<Vec<Row>, PortError> {
        Ok(vec![Row::from_pairs([("count", Value::Integer(0))])])
    }

    fn begin(&mut self) -> std::result::Result<(), PortError> {
        self.begins += 1;
        self.snapshot = Some(self.catalog.lock().unwrap().clone());
        Ok(())
    }

    fn commit(&mut self) -> std::result::Result<(), PortError> {
        self.snapshot = None;
        Ok(())
    }

    fn rollback(&mut self) -> std::result::Result<(), PortError> {
        if let Some(snapshot) = self.snapshot.take() {
            *self.catalog.lock().unwrap() = snapshot;
        }
        Ok(())
    }
}

/// Reads the shared catalog directly.
struct CatalogIntrospector(Arc<Mutex<Catalog>>);

impl Introspector for CatalogIntrospector {
    fn dialect(&self) -> &str {
        "catalog"
    }

    fn table_exists(&self, _conn: &mut dyn Connection, table: &str) -> Result<bool> {
        Ok(self.0.lock().unwrap().tables.contains_key(table))
    }

    fn columns(&self, _conn: &mut dyn Connection, table: &str) -> Result<Vec<LiveColumn>> {
        let catalog = self.0.lock().unwrap();
        let Some(t) = catalog.tables.get(table) else {
            return Ok(Vec::new());
        };
        Ok(t.columns
            .iter()
            .map(|name| LiveColumn {
                name: name.clone(),
                nullable: false,
                raw_type: "TEXT".to_string(),
                has_default: false,
                primary_key: t.primary_key.contains(name),
            })
            .collect())
    }

    fn indexes(&self, _conn: &mut dyn Connection, table: &str) -> Result<BTreeSet<String>> {
        let catalog = self.0.lock().unwrap();
        Ok(catalog
            .tables
            .get(table)
            .map(|t| t.indexes.clone())
            .unwrap_or_default())
    }
}

fn setup(dialect: Dialect) -> (Upgrader, Arc<Mutex<Catalog>>) {
    let catalog = Arc::new(Mutex::new(Catalog::default()));
    let upgrader = Upgrader::new(
        dialect.generator(),
        Box::new(CatalogIntrospector(catalog.clone())),
    );
    (upgrader, catalog)
}

fn users() -> Table {
    Table::new("users")
        .column(Column::new("id", ColumnType::Integer))
        .column(Column::new("email", ColumnType::Text))
        .unique_index("users_email", ["email"])
}

fn blog_schema() -> Vec<Table> {
    vec![
        users(),
        Table::new("posts")
            .column(Column::new("id", ColumnType::Identifier))
            .column(Column::new("author_id", ColumnType::Identifier))
            .column(Column::new("body", ColumnType::Text))
            .primary_key(["id"])
            .index("posts_author", ["author_id"])
            .index("posts_body", ["body"]),
        Table::new("tags").column(Column::new("name", ColumnType::Varchar(64))),
    ]
}

fn columns(catalog: &Arc<Mutex<Catalog>>, table: &str) -> Vec<String> {
    catalog.lock().unwrap().tables[table].columns.clone()
}

#[test]
fn test_users_scenario_create_then_rerun_is_noop() {
    let (upgrader, catalog) = setup(Dialect::Sqlite);
    let mut conn = CatalogConnection::new(catalog.clone());
    let instructions = UpgradeInstructions::new();

    let report = upgrader.run(&mut conn, &[users()], &instructions).unwrap();
    assert_eq!(
        conn.statements,
        vec![
            "CREATE TABLE \"users\" (\n    \"id\" INTEGER NOT NULL,\n    \"email\" TEXT NOT NULL\n)"
                .to_string(),
            "CREATE UNIQUE INDEX \"users_email\" ON \"users\" (\"email\")".to_string(),
        ]
    );
    assert_eq!(report.tables[0].outcome, TableOutcome::Created);

    let mut rerun = CatalogConnection::new(catalog);
    let report = upgrader.run(&mut rerun, &[users()], &instructions).unwrap();
    assert!(rerun.statements.is_empty());
    assert!(report.is_noop());
    assert_eq!(report.tables[0].outcome, TableOutcome::Unchanged);
}

#[test]
fn test_create_from_empty_issues_tables_then_their_indexes() {
    let (upgrader, catalog) = setup(Dialect::Postgres);
    let mut conn = CatalogConnection::new(catalog);
    let tables = blog_schema();

    let report = upgrader
        .run(&mut conn, &tables, &UpgradeInstructions::new())
        .unwrap();

    let index_count: usize = tables.iter().map(|t| t.indexes.len()).sum();
    assert_eq!(conn.statements.len(), tables.len() + index_count);
    assert!(conn.statements[0].starts_with("CREATE TABLE \"users\""));
    assert!(conn.statements[1].starts_with("CREATE UNIQUE INDEX \"users_email\""));
    assert!(conn.statements[2].starts_with("CREATE TABLE \"posts\""));
    assert!(conn.statements[3].starts_with("CREATE INDEX \"posts_author\""));
    assert!(conn.statements[4].starts_with("CREATE INDEX \"posts_body\""));
    assert!(conn.statements[5].starts_with("CREATE TABLE \"tags\""));
    assert_eq!(report.count(TableOutcome::Created), 3);
    assert_eq!(report.statement_count(), conn.statements.len());
}

#[test]
fn test_upgrade_is_idempotent_across_every_dialect() {
    for dialect in [Dialect::Sqlite, Dialect::Postgres, Dialect::Mysql] {
        let (upgrader, catalog) = setup(dialect);
        let instructions = UpgradeInstructions::new().rename("users", "mail", "email");

        let mut conn = CatalogConnection::new(catalog.clone());
        conn.execute("CREATE TABLE \"users\" (\n    \"id\" INTEGER NOT NULL,\n    \"mail\" TEXT NOT NULL\n)", &[])
            .unwrap();
        upgrader.run(&mut conn, &blog_schema(), &instructions).unwrap();

        let mut rerun = CatalogConnection::new(catalog);
        upgrader.run(&mut rerun, &blog_schema(), &instructions).unwrap();
        assert!(rerun.statements.is_empty(), "{dialect}: {:?}", rerun.statements);
    }
}

#[test]
fn test_failure_without_transactional_ddl_keeps_earlier_statements() {
    let existing = "CREATE TABLE `users` (\n    `id` INTEGER NOT NULL\n)";
    let extended = users().column(Column::new("nickname", ColumnType::Varchar(32)).nullable());

    let (upgrader, catalog) = setup(Dialect::Mysql);
    let mut conn = CatalogConnection::new(catalog.clone()).failing_on("ADD COLUMN `nickname`");
    conn.execute(existing, &[]).unwrap();
    let err = upgrader
        .run(&mut conn, &[extended.clone()], &UpgradeInstructions::new())
        .unwrap_err();

    assert!(matches!(
        err,
        UpgradeError::Execution { operation: Operation::AddColumn, ref object, .. }
            if object.as_deref() == Some("nickname")
    ));
    assert_eq!(conn.begins, 0);
    assert_eq!(columns(&catalog, "users"), ["id", "email"]);

    // The same failure under transactional DDL leaves the table untouched.
    let (upgrader, catalog) = setup(Dialect::Postgres);
    let mut conn = CatalogConnection::new(catalog.clone()).failing_on("ADD COLUMN \"nickname\"");
    conn.execute(existing, &[]).unwrap();
    upgrader
        .run(&mut conn, &[extended], &UpgradeInstructions::new())
        .unwrap_err();
    assert_eq!(conn.begins, 1);
    assert_eq!(columns(&catalog, "users"), ["id"]);
}

#[test]
fn test_rename_chain_applies_once() {
    let (upgrader, catalog) = setup(Dialect::Postgres);
    let mut conn = CatalogConnection::new(catalog.clone());
    conn.execute("CREATE TABLE \"t\" (\n    \"id\" INTEGER NOT NULL,\n    \"a\" TEXT NOT NULL\n)", &[])
        .unwrap();
    let t = Table::new("t")
        .column(Column::new("id", ColumnType::Integer))
        .column(Column::new("c", ColumnType::Text));
    let instructions = UpgradeInstructions::new().rename("t", "a", "b").rename("t", "b", "c");

    upgrader.run(&mut conn, std::slice::from_ref(&t), &instructions).unwrap();
    assert_eq!(columns(&catalog, "t"), ["id", "c"]);

    let mut rerun = CatalogConnection::new(catalog);
    let report = upgrader.run(&mut rerun, &[t], &instructions).unwrap();
    assert!(report.is_noop());
}

#[test]
fn test_single_missing_column_is_added() {
    let (upgrader, catalog) = setup(Dialect::Sqlite);
    let mut conn = CatalogConnection::new(catalog.clone());
    upgrader
        .run(&mut conn, &[users()], &UpgradeInstructions::new())
        .unwrap();

    let extended = users().column(Column::new("nickname", ColumnType::Varchar(32)).nullable());
    let mut conn = CatalogConnection::new(catalog.clone());
    let report = upgrader
        .run(&mut conn, &[extended], &UpgradeInstructions::new())
        .unwrap();

    assert_eq!(
        conn.statements,
        vec!["ALTER TABLE \"users\" ADD COLUMN \"nickname\" VARCHAR(32)".to_string()]
    );
    assert_eq!(
        report.tables[0].changes,
        vec![Step::AddColumn {
            column: "nickname".into()
        }]
    );
    assert_eq!(columns(&catalog, "users"), ["id", "email", "nickname"]);
}

#[test]
fn test_undeclared_columns_survive_without_drop_instruction() {
    let (upgrader, catalog) = setup(Dialect::Sqlite);
    let mut conn = CatalogConnection::new(catalog.clone());
    conn.execute(
        "CREATE TABLE \"users\" (\n    \"id\" INTEGER NOT NULL,\n    \"email\" TEXT NOT NULL,\n    \"legacy\" TEXT NOT NULL\n)",
        &[],
    )
    .unwrap();

    upgrader
        .run(&mut conn, &[users()], &UpgradeInstructions::new())
        .unwrap();
    assert!(columns(&catalog, "users").contains(&"legacy".to_string()));

    let drop = UpgradeInstructions::new().drop_column("users", "legacy");
    upgrader.run(&mut conn, &[users()], &drop).unwrap();
    assert_eq!(columns(&catalog, "users"), ["id", "email"]);
}

#[test]
fn test_rename_cases() {
    let instructions = UpgradeInstructions::new().rename("users", "mail", "email");
    let create = |cols: &[&str]| {
        let defs: Vec<String> = cols.iter().map(|c| format!("\"{c}\" TEXT NOT NULL")).collect();
        format!("CREATE TABLE \"users\" (\n    {}\n)", defs.join(",\n    "))
    };

    // old present, new absent
    let (upgrader, catalog) = setup(Dialect::Sqlite);
    let mut conn = CatalogConnection::new(catalog.clone());
    conn.execute(&create(&["id", "mail"]), &[]).unwrap();
    upgrader.run(&mut conn, &[users()], &instructions).unwrap();
    assert_eq!(columns(&catalog, "users"), ["id", "email"]);
    assert!(conn.statements.iter().any(|s| s.contains("RENAME COLUMN \"mail\" TO \"email\"")));
    assert!(!conn.statements.iter().any(|s| s.contains("ADD COLUMN")));

    // already renamed
    let mut conn = CatalogConnection::new(catalog.clone());
    upgrader.run(&mut conn, &[users()], &instructions).unwrap();
    assert!(conn.statements.is_empty());

    // both missing
    let (upgrader, catalog) = setup(Dialect::Sqlite);
    let mut conn = CatalogConnection::new(catalog.clone());
    conn.execute(&create(&["id"]), &[]).unwrap();
    let err = upgrader.run(&mut conn, &[users()], &instructions).unwrap_err();
    assert!(matches!(err, UpgradeError::SchemaDrift { ref table, .. } if table == "users"));

    // both present
    let (upgrader, catalog) = setup(Dialect::Sqlite);
    let mut conn = CatalogConnection::new(catalog.clone());
    conn.execute(&create(&["id", "mail", "email"]), &[]).unwrap();
    let err = upgrader.run(&mut conn, &[users()], &instructions).unwrap_err();
    assert!(matches!(err, UpgradeError::NameCollision { ref new, .. } if new == "email"));
    assert_eq!(columns(&catalog, "users"), ["id", "mail", "email"]);
}

struct CountingHook {
    phase: Phase,
    runs: Arc<AtomicUsize>,
}

impl Hook for CountingHook {
    fn name(&self) -> String {
        format!("count {}", self.phase)
    }

    fn phase(&self) -> Phase {
        self.phase
    }

    fn apply(&self, _ops: &mut SchemaOps<'_>) -> Result<bool> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(false)
    }
}

#[test]
fn test_failing_table_stops_run_and_skips_after_hooks() {
    let before = Arc::new(AtomicUsize::new(0));
    let after = Arc::new(AtomicUsize::new(0));
    let (upgrader, catalog) = setup(Dialect::Sqlite);
    let upgrader = upgrader.with_hooks(
        GenericHooks::new()
            .with(CountingHook {
                phase: Phase::Before,
                runs: before.clone(),
            })
            .with(CountingHook {
                phase: Phase::After,
                runs: after.clone(),
            }),
    );

    let mut conn = CatalogConnection::new(catalog.clone()).failing_on("INDEX \"posts_body\"");
    let err = upgrader
        .run(&mut conn, &blog_schema(), &UpgradeInstructions::new())
        .unwrap_err();

    match &err {
        UpgradeError::Execution {
            operation,
            table,
            object,
            ..
        } => {
            assert_eq!(*operation, Operation::CreateIndex);
            assert_eq!(table, "posts");
            assert_eq!(object.as_deref(), Some("posts_body"));
        }
        other => panic!("unexpected error: {other}"),
    }

    let catalog = catalog.lock().unwrap();
    assert!(catalog.tables.contains_key("users"));
    // The failed table's transaction was rolled back.
    assert!(!catalog.tables.contains_key("posts"));
    assert!(!catalog.tables.contains_key("tags"));
    assert_eq!(before.load(Ordering::SeqCst), 1);
    assert_eq!(after.load(Ordering::SeqCst), 0);
}

#[test]
fn test_missing_primary_key_is_added_on_postgres_and_rejected_on_sqlite() {
    let existing = "CREATE TABLE \"posts\" (\n    \"id\" BIGINT NOT NULL,\n    \"author_id\" BIGINT NOT NULL,\n    \"body\" TEXT NOT NULL\n)";
    let posts = blog_schema().remove(1);

    let (upgrader, catalog) = setup(Dialect::Postgres);
    let mut conn = CatalogConnection::new(catalog.clone());
    conn.execute(existing, &[]).unwrap();
    upgrader
        .run(&mut conn, std::slice::from_ref(&posts), &UpgradeInstructions::new())
        .unwrap();
    assert_eq!(conn.statements[1], "ALTER TABLE \"posts\" ADD PRIMARY KEY (\"id\")");
    assert_eq!(catalog.lock().unwrap().tables["posts"].primary_key, ["id"]);

    let (upgrader, catalog) = setup(Dialect::Sqlite);
    let mut conn = CatalogConnection::new(catalog);
    conn.execute(existing, &[]).unwrap();
    let err = upgrader
        .run(&mut conn, &[posts], &UpgradeInstructions::new())
        .unwrap_err();
    assert!(matches!(
        err,
        UpgradeError::UnsupportedOperation {
            operation: Operation::AddPrimaryKey,
            ..
        }
    ));
    assert_eq!(conn.statements.len(), 1);
}

#[test]
fn test_failed_before_hook_prevents_table_processing() {
    let (upgrader, catalog) = setup(Dialect::Sqlite);
    let mut conn = CatalogConnection::new(catalog.clone());
    conn.execute("CREATE TABLE \"posts\" (\n    \"id\" TEXT NOT NULL\n)", &[])
        .unwrap();

    // Neither the old nor the new column exists: the hook reports drift.
    let upgrader = upgrader.with_hooks(
        GenericHooks::new().with(LegacyColumnRename::new("posts", "auther_id", "author_id")),
    );
    let err = upgrader
        .run(&mut conn, &[users()], &UpgradeInstructions::new())
        .unwrap_err();

    assert!(matches!(err, UpgradeError::Hooks { phase: Phase::Before, .. }));
    assert!(!catalog.lock().unwrap().tables.contains_key("users"));
}

#[test]
fn test_plan_matches_applied_statements() {
    let (upgrader, catalog) = setup(Dialect::Postgres);
    let mut conn = CatalogConnection::new(catalog);
    let tables = blog_schema();

    let planned: Vec<String> = upgrader
        .plan(&mut conn, &tables, &UpgradeInstructions::new())
        .unwrap()
        .into_iter()
        .flat_map(|plan| plan.statements.into_iter().map(|s| s.sql))
        .collect();
    assert!(conn.statements.is_empty());

    upgrader
        .run(&mut conn, &tables, &UpgradeInstructions::new())
        .unwrap();
    assert_eq!(planned, conn.statements);
}
