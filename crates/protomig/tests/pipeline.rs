//! End-to-end pipeline tests against an in-memory database.

use camino::{Utf8Path, Utf8PathBuf};
use protomig::{
    Database, Error, MigrateOptions, Outcome, Result, Schema, check_plan, load_declared,
    migrate_source, reconcile,
};

/// Serves a fixed schema and records what it was asked to execute.
#[derive(Default)]
struct MemoryDatabase {
    schema: Schema,
    executed: Vec<Vec<String>>,
    introspections: usize,
    fail_with: Option<String>,
}

impl Database for MemoryDatabase {
    async fn introspect(&mut self) -> Result<Schema> {
        self.introspections += 1;
        Ok(self.schema.clone())
    }

    async fn execute(&mut self, statements: &[String]) -> Result<()> {
        if let Some(message) = &self.fail_with {
            return Err(Error::Execution {
                statement: statements[0].clone(),
                source: message.clone().into(),
            });
        }
        self.executed.push(statements.to_vec());
        Ok(())
    }
}

struct Workspace {
    _tmp: tempfile::TempDir,
    root: Utf8PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(tmp.path()).unwrap().to_owned();
        Self { _tmp: tmp, root }
    }

    fn write(&self, name: &str, source: &str) -> Utf8PathBuf {
        let path = self.root.join(name);
        std::fs::write(&path, source).unwrap();
        path
    }

    fn sql_dir(&self) -> Utf8PathBuf {
        self.root.join("sql")
    }

    fn transcripts(&self) -> Vec<Utf8PathBuf> {
        let Ok(entries) = self.sql_dir().read_dir_utf8() else {
            return Vec::new();
        };
        let mut paths: Vec<_> = entries.map(|e| e.unwrap().into_path()).collect();
        paths.sort();
        paths
    }

    fn options(&self) -> MigrateOptions {
        MigrateOptions {
            sql_dir: Some(self.sql_dir()),
            ..Default::default()
        }
    }
}

/// Put `db` in the state the statements it just ran would have produced.
fn settle(db: &mut MemoryDatabase, path: &Utf8Path) {
    let declared = load_declared(path, false).unwrap();
    let diff = reconcile(&declared, &db.schema);
    db.schema = check_plan(&db.schema, &diff).unwrap();
}

const WIDGET: &str = "message Root {\n  string name = 1;\n  repeated string tags = 2;\n}\n";

#[tokio::test]
async fn test_new_source_creates_tables_and_transcript() {
    let ws = Workspace::new();
    let path = ws.write("widget.proto", WIDGET);
    let mut db = MemoryDatabase::default();

    let outcome = migrate_source(&mut db, &path, &ws.options()).await.unwrap();

    let (transcript, statements) = match outcome {
        Outcome::Applied {
            transcript,
            statements,
        } => (transcript, statements),
        other => panic!("expected the plan to be applied, got {other:?}"),
    };
    assert_eq!(statements.len(), 3);
    assert!(statements[0].starts_with(r#"CREATE TABLE "widget""#));
    assert!(statements[1].starts_with(r#"CREATE TABLE "widget_tags""#));
    assert!(statements[2].contains("FOREIGN KEY"));
    assert_eq!(db.executed, vec![statements.clone()]);

    let transcript = transcript.unwrap();
    assert_eq!(ws.transcripts(), vec![transcript.clone()]);
    assert!(transcript.as_str().ends_with("_widget_migration.sql"));
    let text = std::fs::read_to_string(&transcript).unwrap();
    assert!(text.starts_with("-- Auto-generated migration from protobuf\n-- Proto: widget\n"));
    assert!(text.contains(&statements[1]));
}

#[tokio::test]
async fn test_up_to_date_source_executes_nothing() {
    let ws = Workspace::new();
    let path = ws.write("widget.proto", WIDGET);
    let mut db = MemoryDatabase::default();

    migrate_source(&mut db, &path, &ws.options()).await.unwrap();
    settle(&mut db, &path);

    let outcome = migrate_source(&mut db, &path, &ws.options()).await.unwrap();
    assert!(matches!(outcome, Outcome::UpToDate));
    assert_eq!(db.executed.len(), 1, "second run must not execute anything");
    assert_eq!(ws.transcripts().len(), 1, "second run must not write a transcript");
    assert_eq!(db.introspections, 2, "every run introspects afresh");
}

#[tokio::test]
async fn test_new_field_adds_exactly_one_column() {
    let ws = Workspace::new();
    let path = ws.write("widget.proto", WIDGET);
    let mut db = MemoryDatabase::default();
    migrate_source(&mut db, &path, &ws.options()).await.unwrap();
    settle(&mut db, &path);

    ws.write(
        "widget.proto",
        "message Root {\n  string name = 1;\n  repeated string tags = 2;\n  int32 age = 3;\n}\n",
    );
    let outcome = migrate_source(&mut db, &path, &ws.options()).await.unwrap();

    let statements = match outcome {
        Outcome::Applied { statements, .. } => statements,
        other => panic!("expected the plan to be applied, got {other:?}"),
    };
    assert_eq!(
        statements,
        vec![r#"ALTER TABLE "widget" ADD COLUMN "age" INTEGER NULL;"#.to_string()]
    );
}

#[tokio::test]
async fn test_dry_run_writes_and_executes_nothing() {
    let ws = Workspace::new();
    let path = ws.write("widget.proto", WIDGET);
    let mut db = MemoryDatabase::default();

    let options = MigrateOptions {
        dry_run: true,
        ..ws.options()
    };
    let outcome = migrate_source(&mut db, &path, &options).await.unwrap();

    let diff = match outcome {
        Outcome::Planned(diff) => diff,
        other => panic!("expected a plan, got {other:?}"),
    };
    assert_eq!(diff.table_diffs.len(), 2);
    assert!(db.executed.is_empty());
    assert!(ws.transcripts().is_empty());
}

#[tokio::test]
async fn test_execution_failure_is_reported_after_transcript() {
    let ws = Workspace::new();
    let path = ws.write("widget.proto", WIDGET);
    let mut db = MemoryDatabase {
        fail_with: Some("relation already exists".to_string()),
        ..Default::default()
    };

    let err = migrate_source(&mut db, &path, &ws.options())
        .await
        .unwrap_err();

    match err {
        Error::Execution { statement, source } => {
            assert!(statement.starts_with(r#"CREATE TABLE "widget""#));
            assert_eq!(source.to_string(), "relation already exists");
        }
        other => panic!("expected an execution error, got {other:?}"),
    }
    assert_eq!(ws.transcripts().len(), 1, "the attempt is still recorded");
}

#[tokio::test]
async fn test_strict_mode_rejects_malformed_lines() {
    let ws = Workspace::new();
    let path = ws.write(
        "widget.proto",
        "message Root {\n  string name = 1;\n  map<string, int32> counts = 2;\n}\n",
    );
    let mut db = MemoryDatabase::default();

    let options = MigrateOptions {
        strict: true,
        ..ws.options()
    };
    let err = migrate_source(&mut db, &path, &options).await.unwrap_err();
    match err {
        Error::Parse {
            source_name,
            skipped,
        } => {
            assert_eq!(source_name, "widget");
            assert_eq!(skipped.len(), 1);
            assert_eq!(skipped[0].line, 3);
        }
        other => panic!("expected a parse error, got {other:?}"),
    }
    assert_eq!(db.introspections, 0);

    // Lenient by default: the map field is skipped and the rest applies.
    let outcome = migrate_source(&mut db, &path, &ws.options()).await.unwrap();
    assert!(matches!(outcome, Outcome::Applied { .. }));
}

#[tokio::test]
async fn test_missing_source_is_an_io_error() {
    let ws = Workspace::new();
    let mut db = MemoryDatabase::default();

    let err = migrate_source(&mut db, &ws.root.join("nope.proto"), &ws.options())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Io { path, .. } if path.as_str().ends_with("nope.proto")));
}

#[tokio::test]
async fn test_table_name_collision_aborts_before_introspection() {
    let ws = Workspace::new();
    let path = ws.write(
        "shop.proto",
        "message Order { repeated string tags = 1; }\nmessage Order_Tags { }\n",
    );
    let mut db = MemoryDatabase::default();

    let err = migrate_source(&mut db, &path, &ws.options()).await.unwrap_err();
    assert!(matches!(err, Error::Translate(_)));
    assert_eq!(db.introspections, 0);
}
