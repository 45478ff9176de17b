use std::sync::{Arc, Mutex};

use chrono::Local;
use clickhouse_middleware::prelude::*;
use clickhouse_middleware::test_utils::{MockReply, MockTransport, server_error_reply, tsv_response};
use futures_util::FutureExt;

type History = Arc<Mutex<Vec<(String, String)>>>;

/// A server that keeps the migration history in memory and fails any `SELECT broken`.
fn migration_server(history: &History) -> MockTransport {
    let history = Arc::clone(history);
    MockTransport::with_probe(move |request| {
        let body = request.body_text();
        if body.starts_with("SELECT module_name FROM `shop`.`clickhouse_orm_migrations`") {
            let package = body
                .split("package_name = '")
                .nth(1)
                .and_then(|rest| rest.split('\'').next())
                .unwrap_or_default()
                .to_string();
            let rows: Vec<Vec<String>> = history
                .lock()
                .unwrap()
                .iter()
                .filter(|(pkg, _)| *pkg == package)
                .map(|(_, module)| vec![module.clone()])
                .collect();
            return Ok(MockReply::ok(tsv_response(&[("module_name", "String")], &rows)));
        }
        if body.starts_with("INSERT INTO `shop`.`clickhouse_orm_migrations`") {
            let mut history = history.lock().unwrap();
            for line in body.lines().skip(1) {
                let fields: Vec<&str> = line.split('\t').collect();
                history.push((fields[0].to_string(), fields[1].to_string()));
            }
            return Ok(MockReply::ok(""));
        }
        if body.contains("SELECT broken") {
            return Ok(server_error_reply(47, "UNKNOWN_IDENTIFIER", "Missing columns: 'broken'"));
        }
        Ok(MockReply::ok(""))
    })
}

fn people() -> Arc<ModelSchema> {
    Arc::new(
        ModelSchema::new("people")
            .field(FieldDef::new("id", FieldType::UInt64))
            .field(FieldDef::new("name", FieldType::String))
            .engine(TableEngine::MergeTree(MergeTreeSpec::new(["id"]))),
    )
}

fn package(third: &str) -> MigrationPackage {
    MigrationPackage::new("app")
        .migration(Migration::new("0002_seed").operation(RunSql::new([
            "INSERT INTO $db.people VALUES (1, 'ada')",
        ])))
        .migration(Migration::new("0001_initial").operation(CreateTable(people())))
        .migration(Migration::new("0003_report").operation(RunSql::new([third.to_string()])))
}

fn applied(history: &History) -> Vec<String> {
    history
        .lock()
        .unwrap()
        .iter()
        .map(|(_, module)| module.clone())
        .collect()
}

fn database(mock: &MockTransport) -> Result<Database, ClickhouseDbError> {
    Database::with_transport(DatabaseConfig::new("shop"), Arc::new(mock.clone()))
}

#[tokio::test]
async fn running_twice_applies_once() -> Result<(), ClickhouseDbError> {
    let history = History::default();
    let mock = migration_server(&history);
    let db = database(&mock)?;
    let package = package("SELECT 1");

    let first = db.migrate(&package, DEFAULT_UP_TO).await?;
    assert_eq!(first, vec!["0001_initial", "0002_seed", "0003_report"]);
    let second = db.migrate(&package, DEFAULT_UP_TO).await?;
    assert!(second.is_empty());
    assert_eq!(applied(&history), vec!["0001_initial", "0002_seed", "0003_report"]);

    let bodies: Vec<String> = mock.statements().iter().map(|r| r.body_text()).collect();
    assert_eq!(
        bodies
            .iter()
            .filter(|body| body.starts_with("CREATE TABLE IF NOT EXISTS `shop`.`people`"))
            .count(),
        1
    );
    assert!(bodies.contains(&"INSERT INTO `shop`.people VALUES (1, 'ada')".to_string()));
    Ok(())
}

#[tokio::test]
async fn failure_keeps_earlier_units_and_retries_later() -> Result<(), ClickhouseDbError> {
    let history = History::default();
    let mock = migration_server(&history);
    let db = database(&mock)?;

    let err = db
        .migrate(&package("SELECT broken"), DEFAULT_UP_TO)
        .await
        .unwrap_err();
    match &err {
        ClickhouseDbError::MigrationError { migration, .. } => assert_eq!(migration, "0003_report"),
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(err.as_server_error().map(|e| e.code), Some(47));
    assert_eq!(applied(&history), vec!["0001_initial", "0002_seed"]);

    let retried = db.migrate(&package("SELECT 1"), DEFAULT_UP_TO).await?;
    assert_eq!(retried, vec!["0003_report"]);
    Ok(())
}

#[tokio::test]
async fn up_to_includes_the_boundary() -> Result<(), ClickhouseDbError> {
    let history = History::default();
    let mock = migration_server(&history);
    let db = database(&mock)?;

    let done = db.migrate(&package("SELECT 1"), 2).await?;
    assert_eq!(done, vec!["0001_initial", "0002_seed"]);
    assert_eq!(applied(&history), vec!["0001_initial", "0002_seed"]);
    Ok(())
}

#[tokio::test]
async fn history_rows_name_the_package() -> Result<(), ClickhouseDbError> {
    let history = History::default();
    let mock = migration_server(&history);
    let db = database(&mock)?;
    let other = MigrationPackage::new("billing").migration(
        Migration::new("0001_initial").operation(RunFn::new(|db| {
            async move {
                db.raw("SELECT 1", &QueryOptions::default())
                    .await
                    .map(|_| ())
            }
            .boxed()
        })),
    );

    db.migrate(&package("SELECT 1"), DEFAULT_UP_TO).await?;
    let done = db.migrate(&other, DEFAULT_UP_TO).await?;
    assert_eq!(done, vec!["0001_initial"]);
    let packages: Vec<String> = history.lock().unwrap().iter().map(|(p, _)| p.clone()).collect();
    assert_eq!(packages, vec!["app", "app", "app", "billing"]);
    Ok(())
}

#[tokio::test]
async fn history_rows_carry_the_local_date() -> Result<(), ClickhouseDbError> {
    let history = History::default();
    let mock = migration_server(&history);
    let db = database(&mock)?;
    let before = Local::now().date_naive();
    db.migrate(&package("SELECT 1"), 1).await?;
    let after = Local::now().date_naive();

    let insert = mock
        .statements()
        .into_iter()
        .find(|request| {
            request
                .body_text()
                .starts_with("INSERT INTO `shop`.`clickhouse_orm_migrations`")
        })
        .expect("history row inserted");
    let body = insert.body_text();
    let line = body.lines().nth(1).unwrap_or_default();
    let applied = line.split('\t').nth(2).unwrap_or_default();
    let expected: Vec<String> = [before, after]
        .iter()
        .map(|day| day.format("%Y-%m-%d").to_string())
        .collect();
    assert!(expected.iter().any(|day| day == applied), "{line:?}");
    Ok(())
}

#[tokio::test]
async fn alter_table_diffs_live_columns() -> Result<(), ClickhouseDbError> {
    let mock = MockTransport::with_probe(|request| {
        let body = request.body_text();
        if body.starts_with("DESCRIBE TABLE `shop`.`people`") {
            return Ok(MockReply::ok(
                "id\tUInt32\t\t\t\t\t\nlegacy\tString\t\t\t\t\t\n",
            ));
        }
        Ok(MockReply::ok(""))
    });
    let db = database(&mock)?;
    let package = MigrationPackage::new("app")
        .migration(Migration::new("0004_reshape").operation(AlterTable(people())));

    db.migrate(&package, DEFAULT_UP_TO).await?;

    let alters: Vec<String> = mock
        .statements()
        .iter()
        .map(|r| r.body_text())
        .filter(|body| body.starts_with("ALTER TABLE"))
        .collect();
    assert_eq!(
        alters,
        vec![
            "ALTER TABLE `shop`.`people` MODIFY COLUMN `id` UInt64",
            "ALTER TABLE `shop`.`people` ADD COLUMN `name` String AFTER `id`",
            "ALTER TABLE `shop`.`people` DROP COLUMN `legacy`",
        ]
    );
    Ok(())
}
