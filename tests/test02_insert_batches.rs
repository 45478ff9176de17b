use std::sync::Arc;

use async_trait::async_trait;
use bytes::BytesMut;
use chrono::NaiveDate;
use clickhouse_middleware::prelude::*;
use clickhouse_middleware::test_utils::{MockReply, MockTransport};
use clickhouse_middleware::transport::{HttpRequest, RequestBody};
use futures_util::StreamExt;

#[derive(Debug, Clone, PartialEq)]
struct Event {
    id: u64,
    name: String,
}

lazy_static::lazy_static! {
    static ref EVENT_SCHEMA: Arc<ModelSchema> = Arc::new(
        ModelSchema::new("events")
            .field(FieldDef::new("id", FieldType::UInt64))
            .field(FieldDef::new("name", FieldType::String))
            .engine(TableEngine::MergeTree(MergeTreeSpec::new(["id"]))),
    );
}

impl Model for Event {
    fn schema() -> Arc<ModelSchema> {
        Arc::clone(&EVENT_SCHEMA)
    }

    fn to_values(&self) -> Vec<FieldValue> {
        vec![FieldValue::UInt(self.id), FieldValue::from(self.name.as_str())]
    }

    fn from_row(row: Row) -> Result<Self, ClickhouseDbError> {
        Ok(Self {
            id: row.get("id").and_then(FieldValue::as_uint).unwrap_or_default(),
            name: row
                .get("name")
                .and_then(FieldValue::as_text)
                .unwrap_or_default()
                .to_string(),
        })
    }
}

fn events(count: u64) -> impl Iterator<Item = Event> + Send + 'static {
    (0..count).map(|id| Event {
        id,
        name: format!("event {id}"),
    })
}

fn database(mock: &MockTransport) -> Result<Database, ClickhouseDbError> {
    Database::with_transport(DatabaseConfig::new("shop"), Arc::new(mock.clone()))
}

#[tokio::test]
async fn large_insert_is_streamed_in_batches() -> Result<(), ClickhouseDbError> {
    let mock = MockTransport::with_probe(|_| Ok(MockReply::ok("")));
    let db = database(&mock)?;

    db.insert_with(events(2500), 1000, &QueryOptions::default()).await?;

    let statements = mock.statements();
    assert_eq!(statements.len(), 1);
    let chunks: Vec<String> = statements[0]
        .chunks
        .iter()
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect();
    assert_eq!(chunks.len(), 3);

    let header = "INSERT INTO `shop`.`events` (`id`,`name`) FORMAT TabSeparated\n";
    assert!(chunks[0].starts_with(header));
    assert_eq!(chunks[0][header.len()..].lines().count(), 1000);
    assert!(chunks[0][header.len()..].starts_with("0\tevent 0\n"));
    assert_eq!(chunks[1].lines().count(), 1000);
    assert!(chunks[1].starts_with("1000\tevent 1000\n"));
    assert_eq!(chunks[2].lines().count(), 500);
    assert!(chunks[2].ends_with("2499\tevent 2499\n"));
    assert_eq!(statements[0].param("database"), Some("shop"));
    Ok(())
}

#[tokio::test]
async fn empty_insert_sends_nothing() -> Result<(), ClickhouseDbError> {
    let mock = MockTransport::with_probe(|_| Ok(MockReply::ok("")));
    let db = database(&mock)?;
    db.insert(Vec::<Event>::new()).await?;
    assert!(mock.requests().is_empty());
    Ok(())
}

#[tokio::test]
async fn read_only_and_system_kinds_are_refused_before_sending() -> Result<(), ClickhouseDbError> {
    let mock = MockTransport::with_probe(|_| Ok(MockReply::ok("")));
    let db = database(&mock)?;
    for schema in [
        ModelSchema::new("parts").field(FieldDef::new("a", FieldType::Int8)).system(),
        ModelSchema::new("view").field(FieldDef::new("a", FieldType::Int8)).read_only(),
    ] {
        let row = Row::new(Arc::new(schema));
        let err = db.insert(vec![row]).await.unwrap_err();
        assert!(matches!(err, ClickhouseDbError::ValidationError(ref msg)
            if msg == "You can't insert into read only and system tables"));
    }
    assert!(mock.requests().is_empty());
    Ok(())
}

#[tokio::test]
async fn computed_defaults_use_tskv() -> Result<(), ClickhouseDbError> {
    let mock = MockTransport::with_probe(|_| Ok(MockReply::ok("")));
    let db = database(&mock)?;
    let schema = Arc::new(
        ModelSchema::new("visits")
            .field(FieldDef::new("user", FieldType::String))
            .field(FieldDef::new("day", FieldType::Date).with_default_expr("today()"))
            .field(FieldDef::new("month", FieldType::UInt32).materialized("toYYYYMM(day)")),
    );
    let mut with_day = Row::new(Arc::clone(&schema));
    with_day.set("user", "ada")?;
    with_day.set("day", NaiveDate::from_ymd_opt(2024, 5, 1).unwrap())?;
    let mut without_day = Row::new(Arc::clone(&schema));
    without_day.set("user", "bob")?;
    without_day.set("day", FieldValue::Null)?;

    db.insert(vec![with_day, without_day]).await?;

    let body = mock.statements()[0].body_text();
    assert_eq!(
        body,
        "INSERT INTO `shop`.`visits` (`user`,`day`) FORMAT TSKV\n\
         user=ada\tday=2024-05-01\n\
         user=bob\n"
    );
    Ok(())
}

#[tokio::test]
async fn mixed_kinds_fail_the_insert() -> Result<(), ClickhouseDbError> {
    let mock = MockTransport::with_probe(|_| Ok(MockReply::ok("")));
    let db = database(&mock)?;
    let other = Arc::new(ModelSchema::new("other").field(FieldDef::new("id", FieldType::UInt64)));
    let rows = vec![
        Row::from_values(Event::schema(), vec![FieldValue::UInt(1), "a".into()])?,
        Row::from_values(other, vec![FieldValue::UInt(2)])?,
    ];
    let err = db.insert(rows).await.unwrap_err();
    assert!(matches!(err, ClickhouseDbError::ValidationError(_)));
    Ok(())
}

#[tokio::test]
async fn zero_batch_size_is_a_config_error() -> Result<(), ClickhouseDbError> {
    let mock = MockTransport::with_probe(|_| Ok(MockReply::ok("")));
    let db = database(&mock)?;
    let err = db
        .insert_with(events(3), 0, &QueryOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ClickhouseDbError::ConfigError(_)));
    Ok(())
}

/// Hides body-stream errors behind its own connectivity error, as HTTP clients do.
#[derive(Debug)]
struct WrappingTransport {
    inner: MockTransport,
}

#[async_trait]
impl Transport for WrappingTransport {
    async fn post(&self, request: HttpRequest) -> Result<HttpResponse, ClickhouseDbError> {
        let body = match request.body {
            RequestBody::Full(bytes) => bytes,
            RequestBody::Streamed(mut chunks) => {
                let mut buf = BytesMut::new();
                while let Some(chunk) = chunks.next().await {
                    match chunk {
                        Ok(chunk) => buf.extend_from_slice(&chunk),
                        Err(err) => {
                            return Err(ClickhouseDbError::ConnectionError(format!(
                                "error sending request: {err}"
                            )));
                        }
                    }
                }
                buf.freeze()
            }
        };
        self.inner
            .post(HttpRequest {
                params: request.params,
                body: RequestBody::Full(body),
            })
            .await
    }
}

fn wrapping_database(mock: &MockTransport) -> Result<Database, ClickhouseDbError> {
    let transport = WrappingTransport {
        inner: mock.clone(),
    };
    Database::with_transport(DatabaseConfig::new("shop"), Arc::new(transport))
}

#[tokio::test]
async fn mixed_kinds_are_not_reported_as_connectivity() -> Result<(), ClickhouseDbError> {
    let mock = MockTransport::with_probe(|_| Ok(MockReply::ok("")));
    let db = wrapping_database(&mock)?;
    let other = Arc::new(ModelSchema::new("other").field(FieldDef::new("id", FieldType::UInt64)));
    let rows = vec![
        Row::from_values(Event::schema(), vec![FieldValue::UInt(1), "a".into()])?,
        Row::from_values(other, vec![FieldValue::UInt(2)])?,
    ];
    let err = db
        .insert_with(rows, 1, &QueryOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ClickhouseDbError::ValidationError(ref msg)
        if msg == "cannot mix events and other records in one insert"));
    assert!(!err.is_connectivity());
    assert!(mock.statements().is_empty());
    Ok(())
}

#[tokio::test]
async fn out_of_range_values_are_not_reported_as_connectivity() -> Result<(), ClickhouseDbError> {
    let mock = MockTransport::with_probe(|_| Ok(MockReply::ok("")));
    let db = wrapping_database(&mock)?;
    let schema = Arc::new(ModelSchema::new("levels").field(FieldDef::new("level", FieldType::UInt8)));
    let rows = vec![
        Row::from_values(Arc::clone(&schema), vec![FieldValue::UInt(7)])?,
        Row::from_values(schema, vec![FieldValue::UInt(999)])?,
    ];
    let err = db
        .insert_with(rows, 1, &QueryOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ClickhouseDbError::ValidationError(_)));
    assert!(!err.is_connectivity());
    Ok(())
}
