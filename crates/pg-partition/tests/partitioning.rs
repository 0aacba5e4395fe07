//! End-to-end partitioning scenarios against an in-memory engine.
//!
//! The mock engine keeps real tables keyed by qualified name, applies the
//! DDL the manager generates, and fails DML against unknown tables the way
//! a relational engine reports a missing relation. This exercises the full
//! provision-then-route flow without a database.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use pg_partition::catalog::TableIdentity;
use pg_partition::engine::{
    AttributeMap, ColumnDescriptor, DdlExecutor, DmlExecutor, Predicate, Row, SchemaInspector,
    SequenceProvider,
};
use pg_partition::{
    PartitionCatalog, PartitionError, PartitionManager, PartitionRange, PartitionSpec,
    ProvisionOptions, Result, SqlValue, StatementRouter, TimeGranularity,
};

#[derive(Default)]
struct MockEngine {
    schemas: Mutex<HashSet<String>>,
    tables: Mutex<HashMap<String, Vec<Row>>>,
    executed: Mutex<Vec<String>>,
    next_id: AtomicI64,
    prefetch: bool,
    sequence_calls: Mutex<Vec<String>>,
}

impl MockEngine {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicI64::new(1),
            ..Default::default()
        })
    }

    fn with_prefetch() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicI64::new(1),
            prefetch: true,
            ..Default::default()
        })
    }

    fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    fn rows_in(&self, qualified: &str) -> Vec<Row> {
        self.tables
            .lock()
            .unwrap()
            .get(qualified)
            .cloned()
            .unwrap_or_default()
    }

    fn add_table(&self, qualified: &str) {
        self.tables
            .lock()
            .unwrap()
            .insert(qualified.to_string(), Vec::new());
    }

    fn executed_ddl(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    /// Pull the `"quoted"` identifier segments out of a statement.
    fn quoted_parts(sql: &str) -> Vec<String> {
        sql.split('"')
            .enumerate()
            .filter(|(i, _)| i % 2 == 1)
            .map(|(_, s)| s.to_string())
            .collect()
    }
}

#[async_trait]
impl DdlExecutor for MockEngine {
    async fn execute(&self, sql: &str) -> Result<()> {
        self.executed.lock().unwrap().push(sql.to_string());
        let parts = Self::quoted_parts(sql);

        if sql.starts_with("CREATE SCHEMA IF NOT EXISTS") {
            self.schemas.lock().unwrap().insert(parts[0].clone());
        } else if sql.starts_with("DROP SCHEMA") {
            let schema = parts[0].clone();
            self.schemas.lock().unwrap().remove(&schema);
            self.tables
                .lock()
                .unwrap()
                .retain(|name, _| !name.starts_with(&format!("{}.", schema)));
        } else if sql.starts_with("CREATE TABLE") {
            let (schema, table) = (parts[0].clone(), parts[1].clone());
            if !self.schemas.lock().unwrap().contains(&schema) {
                return Err(PartitionError::engine(
                    format!("schema \"{}\" does not exist", schema),
                    sql,
                ));
            }
            let qualified = format!("{}.{}", schema, table);
            let mut tables = self.tables.lock().unwrap();
            if tables.contains_key(&qualified) {
                return Err(PartitionError::engine(
                    format!("relation \"{}\" already exists", qualified),
                    sql,
                ));
            }
            tables.insert(qualified, Vec::new());
        } else if sql.starts_with("DROP TABLE") {
            let qualified = format!("{}.{}", parts[0], parts[1]);
            if self.tables.lock().unwrap().remove(&qualified).is_none() {
                return Err(PartitionError::engine(
                    format!("relation \"{}\" does not exist", qualified),
                    sql,
                ));
            }
        } else if sql.starts_with("ALTER TABLE") && sql.contains("RENAME TO") {
            let qualified = format!("{}.{}", parts[0], parts[1]);
            let renamed = format!("{}.{}", parts[0], parts[2]);
            let mut tables = self.tables.lock().unwrap();
            match tables.remove(&qualified) {
                Some(rows) => {
                    tables.insert(renamed, rows);
                }
                None => {
                    return Err(PartitionError::engine(
                        format!("relation \"{}\" does not exist", qualified),
                        sql,
                    ))
                }
            }
        }
        // index, foreign key, and rule statements are recorded only
        Ok(())
    }
}

#[async_trait]
impl DmlExecutor for MockEngine {
    async fn insert(
        &self,
        table: &TableIdentity,
        columns: &[(String, SqlValue)],
    ) -> Result<Option<i64>> {
        let mut tables = self.tables.lock().unwrap();
        let rows = tables.get_mut(&table.qualified_name()).ok_or_else(|| {
            PartitionError::NoSuchPartition {
                table: table.qualified_name(),
                key: table.key.clone(),
            }
        })?;

        let mut row: Row = columns.iter().cloned().collect();
        let assigned = if row.contains_key("id") {
            None
        } else {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            row.insert("id".to_string(), SqlValue::Int(id));
            Some(id)
        };
        rows.push(row);
        Ok(assigned)
    }

    async fn update(
        &self,
        table: &TableIdentity,
        predicate: &Predicate,
        assignments: &[(String, SqlValue)],
    ) -> Result<u64> {
        let mut tables = self.tables.lock().unwrap();
        let rows = tables.get_mut(&table.qualified_name()).ok_or_else(|| {
            PartitionError::NoSuchPartition {
                table: table.qualified_name(),
                key: table.key.clone(),
            }
        })?;

        let mut affected = 0;
        for row in rows.iter_mut() {
            if matches(row, predicate) {
                for (name, value) in assignments {
                    row.insert(name.clone(), value.clone());
                }
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn delete(&self, table: &TableIdentity, predicate: &Predicate) -> Result<u64> {
        let mut tables = self.tables.lock().unwrap();
        let rows = tables.get_mut(&table.qualified_name()).ok_or_else(|| {
            PartitionError::NoSuchPartition {
                table: table.qualified_name(),
                key: table.key.clone(),
            }
        })?;

        let before = rows.len();
        rows.retain(|row| !matches(row, predicate));
        Ok((before - rows.len()) as u64)
    }

    async fn select(
        &self,
        table: &TableIdentity,
        predicate: &Predicate,
        projection: &[String],
    ) -> Result<Vec<Row>> {
        let tables = self.tables.lock().unwrap();
        let rows = tables.get(&table.qualified_name()).ok_or_else(|| {
            PartitionError::NoSuchPartition {
                table: table.qualified_name(),
                key: table.key.clone(),
            }
        })?;

        Ok(rows
            .iter()
            .filter(|row| matches(row, predicate))
            .map(|row| {
                if projection.is_empty() {
                    row.clone()
                } else {
                    row.iter()
                        .filter(|(name, _)| projection.contains(name))
                        .map(|(name, value)| (name.clone(), value.clone()))
                        .collect()
                }
            })
            .collect())
    }
}

fn matches(row: &Row, predicate: &Predicate) -> bool {
    predicate
        .conditions
        .iter()
        .all(|(column, value)| row.get(column) == Some(value))
}

#[async_trait]
impl SequenceProvider for MockEngine {
    async fn next_value(&self, sequence: &str) -> Result<i64> {
        self.sequence_calls.lock().unwrap().push(sequence.to_string());
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl SchemaInspector for MockEngine {
    async fn prefetch_required(&self, _table: &str) -> Result<bool> {
        Ok(self.prefetch)
    }

    async fn columns_of(&self, _table: &str) -> Result<Vec<ColumnDescriptor>> {
        Ok(Vec::new())
    }

    async fn table_exists(&self, schema: &str, table: &str) -> Result<bool> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .contains_key(&format!("{}.{}", schema, table)))
    }

    async fn partition_tables(&self, schema: &str) -> Result<Vec<String>> {
        let prefix = format!("{}.", schema);
        Ok(self
            .tables
            .lock()
            .unwrap()
            .keys()
            .filter_map(|name| name.strip_prefix(&prefix).map(String::from))
            .collect())
    }
}

fn modulo_spec(modulus: u32) -> Arc<PartitionSpec> {
    Arc::new(
        PartitionSpec::builder("employees")
            .on("integer_field")
            .modulo(modulus)
            .build()
            .unwrap(),
    )
}

fn text_spec() -> Arc<PartitionSpec> {
    Arc::new(
        PartitionSpec::builder("employees")
            .on("text_field")
            .text_buckets(["a", "b", "c", "d"])
            .build()
            .unwrap(),
    )
}

fn manager(spec: &Arc<PartitionSpec>, engine: &Arc<MockEngine>) -> PartitionManager {
    PartitionManager::new(
        Arc::clone(spec),
        Arc::clone(engine) as Arc<dyn DdlExecutor>,
        Arc::clone(engine) as Arc<dyn SchemaInspector>,
    )
}

fn router(spec: &Arc<PartitionSpec>, engine: &Arc<MockEngine>) -> StatementRouter {
    StatementRouter::new(
        Arc::clone(spec),
        Arc::new(PartitionCatalog::new()),
        Arc::clone(engine) as Arc<dyn DmlExecutor>,
        Arc::clone(engine) as Arc<dyn SequenceProvider>,
        Arc::clone(engine) as Arc<dyn SchemaInspector>,
    )
}

fn attrs<const N: usize>(pairs: [(&str, SqlValue); N]) -> AttributeMap {
    pairs
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect::<BTreeMap<_, _>>()
}

#[tokio::test]
async fn create_new_partitions_creates_each_key_once() {
    let engine = MockEngine::new();
    let spec = modulo_spec(2);

    let report = manager(&spec, &engine)
        .create_new_partitions(None, ProvisionOptions::default())
        .await
        .unwrap();

    assert_eq!(report.created, vec!["p0", "p1"]);
    assert_eq!(
        engine.table_names(),
        vec!["employees_partitions.p0", "employees_partitions.p1"]
    );

    // each child carries its own check predicate
    let ddl = engine.executed_ddl();
    assert!(ddl
        .iter()
        .any(|sql| sql.contains("\"p0\"") && sql.contains("(integer_field::integer % 2) = 0::integer")));
    assert!(ddl
        .iter()
        .any(|sql| sql.contains("\"p1\"") && sql.contains("(integer_field::integer % 2) = 1::integer")));
    // indexed and registered with the parent after creation
    assert!(ddl.iter().any(|sql| sql.starts_with("CREATE INDEX \"index_p1_on_integer_field\"")));
    assert!(ddl.iter().any(|sql| sql.contains("\"p1_insert_redirector\"")));
}

#[tokio::test]
async fn insert_routes_by_normalized_key() {
    let engine = MockEngine::new();
    let spec = modulo_spec(2);
    manager(&spec, &engine)
        .create_new_partitions(None, ProvisionOptions::default())
        .await
        .unwrap();

    let router = router(&spec, &engine);
    router
        .insert(attrs([
            ("integer_field", SqlValue::Int(1)),
            ("name", SqlValue::from("Keith")),
        ]))
        .await
        .unwrap();

    // 3 mod 2 = 1: same partition as key 1
    router
        .insert(attrs([
            ("integer_field", SqlValue::Int(3)),
            ("name", SqlValue::from("Robert")),
        ]))
        .await
        .unwrap();

    assert_eq!(engine.rows_in("employees_partitions.p1").len(), 2);
    assert!(engine.rows_in("employees_partitions.p0").is_empty());
}

#[tokio::test]
async fn insert_outside_provisioned_range_surfaces_no_such_partition() {
    let engine = MockEngine::new();
    let spec = modulo_spec(96);
    manager(&spec, &engine)
        .create_new_partitions(
            Some(PartitionRange::Ints {
                start: 0,
                end: 4,
                step: 1,
            }),
            ProvisionOptions::default(),
        )
        .await
        .unwrap();

    let err = router(&spec, &engine)
        .insert(attrs([("integer_field", SqlValue::Int(5))]))
        .await
        .unwrap_err();

    match err {
        PartitionError::NoSuchPartition { table, key } => {
            assert_eq!(table, "employees_partitions.p5");
            assert_eq!(key, "5");
        }
        other => panic!("expected NoSuchPartition, got {:?}", other),
    }
}

#[tokio::test]
async fn text_routing_normalizes_and_rejects_unknown_buckets() {
    let engine = MockEngine::new();
    let spec = text_spec();
    manager(&spec, &engine)
        .create_new_partitions(None, ProvisionOptions::default())
        .await
        .unwrap();
    assert_eq!(engine.table_names().len(), 4);

    let router = router(&spec, &engine);
    // 'A' normalizes to bucket a
    router
        .insert(attrs([
            ("text_field", SqlValue::from("A")),
            ("name", SqlValue::from("Keith")),
        ]))
        .await
        .unwrap();
    assert_eq!(engine.rows_in("employees_partitions.pa").len(), 1);

    // a value outside the provisioned bucket set routes to a table that was
    // never created
    let err = router
        .insert(attrs([("text_field", SqlValue::from("zebra"))]))
        .await
        .unwrap_err();
    assert!(err.is_no_such_partition());
}

#[tokio::test]
async fn update_routes_by_stored_key_values() {
    let engine = MockEngine::new();
    let spec = modulo_spec(2);
    manager(&spec, &engine)
        .create_new_partitions(None, ProvisionOptions::default())
        .await
        .unwrap();

    let router = router(&spec, &engine);
    let id = router
        .insert(attrs([
            ("integer_field", SqlValue::Int(0)),
            ("name", SqlValue::from("Keith")),
        ]))
        .await
        .unwrap()
        .unwrap();

    // the persisted row still has integer_field = 0; an unsaved in-memory
    // change to the key must not move the row
    let stored = attrs([
        ("id", SqlValue::Int(id)),
        ("integer_field", SqlValue::Int(0)),
        ("name", SqlValue::from("Keith")),
    ]);
    let changes = attrs([
        ("name", SqlValue::from("Kevin")),
        ("integer_field", SqlValue::Int(1)),
    ]);

    let affected = router.update(&stored, &changes).await.unwrap();
    assert_eq!(affected, 1);

    let rows = engine.rows_in("employees_partitions.p0");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("name"), Some(&SqlValue::from("Kevin")));
    assert!(engine.rows_in("employees_partitions.p1").is_empty());
}

#[tokio::test]
async fn delete_routes_by_stored_key_values() {
    let engine = MockEngine::new();
    let spec = modulo_spec(2);
    manager(&spec, &engine)
        .create_new_partitions(None, ProvisionOptions::default())
        .await
        .unwrap();

    let router = router(&spec, &engine);
    let id = router
        .insert(attrs([
            ("integer_field", SqlValue::Int(1)),
            ("name", SqlValue::from("Keith")),
        ]))
        .await
        .unwrap()
        .unwrap();

    let stored = attrs([("id", SqlValue::Int(id)), ("integer_field", SqlValue::Int(1))]);
    assert_eq!(router.delete(&stored).await.unwrap(), 1);
    assert!(engine.rows_in("employees_partitions.p1").is_empty());
}

#[tokio::test]
async fn select_targets_one_partition() {
    let engine = MockEngine::new();
    let spec = modulo_spec(2);
    manager(&spec, &engine)
        .create_new_partitions(None, ProvisionOptions::default())
        .await
        .unwrap();

    let router = router(&spec, &engine);
    let id = router
        .insert(attrs([
            ("integer_field", SqlValue::Int(1)),
            ("name", SqlValue::from("Keith")),
        ]))
        .await
        .unwrap()
        .unwrap();

    let rows = router
        .select_rows(
            &attrs([("integer_field", SqlValue::Int(1))]),
            &Predicate::eq("id", id),
            &[],
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("name"), Some(&SqlValue::from("Keith")));

    // selecting from an unprovisioned partition fails like the engine would
    let err = router
        .select_rows(
            &attrs([("integer_field", SqlValue::Int(13))]),
            &Predicate::all(),
            &[],
        )
        .await
        .unwrap_err();
    assert!(err.is_no_such_partition());
}

#[tokio::test]
async fn insert_prefetches_primary_key_when_required() {
    let engine = MockEngine::with_prefetch();
    let spec = modulo_spec(2);
    manager(&spec, &engine)
        .create_new_partitions(None, ProvisionOptions::default())
        .await
        .unwrap();

    let id = router(&spec, &engine)
        .insert(attrs([
            ("integer_field", SqlValue::Int(0)),
            ("name", SqlValue::from("Mike")),
        ]))
        .await
        .unwrap();

    // sequence consulted before the insert was constructed
    assert_eq!(
        engine.sequence_calls.lock().unwrap().clone(),
        vec!["employees_id_seq"]
    );
    let rows = engine.rows_in("employees_partitions.p0");
    assert_eq!(rows.len(), 1);
    // the prefetched key and the partition key both made it into the row
    assert_eq!(rows[0].get("id"), Some(&SqlValue::Int(id.unwrap())));
    assert_eq!(rows[0].get("integer_field"), Some(&SqlValue::Int(0)));
}

#[tokio::test]
async fn insert_with_wrong_key_shape_fails_without_coercion() {
    let engine = MockEngine::new();
    let spec = modulo_spec(2);
    manager(&spec, &engine)
        .create_new_partitions(None, ProvisionOptions::default())
        .await
        .unwrap();

    let err = router(&spec, &engine)
        .insert(attrs([("integer_field", SqlValue::from("7"))]))
        .await
        .unwrap_err();
    assert!(matches!(err, PartitionError::InvalidKeyValue { .. }));

    // missing key attribute is a routing error
    let err = router(&spec, &engine)
        .insert(attrs([("name", SqlValue::from("Keith"))]))
        .await
        .unwrap_err();
    assert!(matches!(err, PartitionError::Routing { .. }));
}

#[tokio::test]
async fn reprovisioning_fails_fast_unless_skipping_existing() {
    let engine = MockEngine::new();
    let spec = modulo_spec(2);
    let manager = manager(&spec, &engine);

    manager
        .create_new_partitions(None, ProvisionOptions::default())
        .await
        .unwrap();

    // default policy: stop at the first AlreadyExists, identify the key
    let err = manager
        .create_new_partitions(None, ProvisionOptions::default())
        .await
        .unwrap_err();
    match err {
        PartitionError::Provision { report } => {
            assert_eq!(report.failed_names(), vec!["p0"]);
            assert!(report.created.is_empty());
        }
        other => panic!("expected Provision, got {:?}", other),
    }

    // idempotent policy: skip and keep going
    let report = manager
        .create_new_partitions(None, ProvisionOptions::idempotent())
        .await
        .unwrap();
    assert_eq!(report.skipped, vec!["p0", "p1"]);
    assert!(report.created.is_empty());
}

#[tokio::test]
async fn list_partitions_orders_integer_base_names_numerically() {
    let engine = MockEngine::new();
    let spec = modulo_spec(96);
    for part in ["p1", "p2", "p10", "archived_p7"] {
        engine.add_table(&format!("employees_partitions.{}", part));
    }

    let names = manager(&spec, &engine).list_partitions().await.unwrap();
    assert_eq!(names, vec!["p10", "p2", "p1"]);
}

#[tokio::test]
async fn provisioning_rejects_non_positive_range_step() {
    let engine = MockEngine::new();
    let spec = modulo_spec(96);

    let err = manager(&spec, &engine)
        .create_new_partitions(
            Some(PartitionRange::Ints {
                start: 0,
                end: 4,
                step: 0,
            }),
            ProvisionOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PartitionError::Config(_)));
}

#[tokio::test]
async fn drop_and_archive_partitions() {
    let engine = MockEngine::new();
    let spec = modulo_spec(2);
    let manager = manager(&spec, &engine);
    manager
        .create_new_partitions(None, ProvisionOptions::default())
        .await
        .unwrap();

    manager.drop_partition_table(&SqlValue::Int(0)).await.unwrap();
    assert!(!manager.partition_exists(&SqlValue::Int(0)).await.unwrap());

    manager.archive_partition(&SqlValue::Int(1)).await.unwrap();
    assert_eq!(
        engine.table_names(),
        vec!["employees_partitions.archived_p1"]
    );
}

#[tokio::test]
async fn retention_sweep_archives_only_expired_buckets() {
    let engine = MockEngine::new();
    let spec = Arc::new(
        PartitionSpec::builder("employees")
            .on("created_at")
            .time(TimeGranularity::Week, 1, 2)
            .retention(2)
            .build()
            .unwrap(),
    );
    let manager = manager(&spec, &engine);
    manager.create_schema().await.unwrap();

    // one ancient bucket and the current week's bucket
    let current = TimeGranularity::Week.bucket_start(Utc::now().date_naive());
    let current_part = format!("p{}", current.format("%Y%m%d"));
    engine.add_table("employees_partitions.p20000103");
    engine.add_table(&format!("employees_partitions.{}", current_part));

    let report = manager.archive_old_partitions().await.unwrap();
    assert_eq!(report.processed, vec!["p20000103"]);
    assert!(report.failed.is_empty());

    let names = engine.table_names();
    assert!(names.contains(&"employees_partitions.archived_p20000103".to_string()));
    assert!(names.contains(&format!("employees_partitions.{}", current_part)));
}

#[tokio::test]
async fn time_provisioning_creates_weekly_buckets() {
    let engine = MockEngine::new();
    let spec = Arc::new(
        PartitionSpec::builder("employees")
            .on("created_at")
            .time(TimeGranularity::Week, 0, 2)
            .build()
            .unwrap(),
    );

    let start = Utc.with_ymd_and_hms(2014, 2, 17, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2014, 3, 3, 0, 0, 0).unwrap();
    let report = manager(&spec, &engine)
        .create_new_partitions(
            Some(PartitionRange::Times {
                start: start.date_naive(),
                end: end.date_naive(),
                granularity: TimeGranularity::Week,
            }),
            ProvisionOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(report.created, vec!["p20140217", "p20140224", "p20140303"]);

    // a mid-week timestamp routes into its week's bucket
    let router = router(&spec, &engine);
    router
        .insert(attrs([
            ("created_at", SqlValue::Timestamp(
                Utc.with_ymd_and_hms(2014, 2, 20, 9, 0, 0).unwrap(),
            )),
            ("name", SqlValue::from("Keith")),
        ]))
        .await
        .unwrap();
    assert_eq!(engine.rows_in("employees_partitions.p20140217").len(), 1);
}

#[tokio::test]
async fn hashed_modulo_routes_uuid_like_keys() {
    let engine = MockEngine::new();
    let spec = Arc::new(
        PartitionSpec::builder("events")
            .on("external_id")
            .hashed_modulo(96)
            .build()
            .unwrap(),
    );
    manager(&spec, &engine)
        .create_new_partitions(None, ProvisionOptions::default())
        .await
        .unwrap();
    assert_eq!(engine.table_names().len(), 96);

    // md5("some-uuid-like-value") ends 0x98763e0e; 2557885966 % 96 = 46
    router(&spec, &engine)
        .insert(attrs([
            ("external_id", SqlValue::from("some-uuid-like-value")),
            ("payload", SqlValue::from("x")),
        ]))
        .await
        .unwrap();
    assert_eq!(engine.rows_in("events_partitions.p46").len(), 1);
}
