//! Integration tests for the versioned-table loader and the full pipeline
//!
//! These tests run against in-memory SQLite pools to exercise the loader
//! state machine end to end: catalog probing, schema comparison, and the
//! append / create-fresh / create-versioned decisions.

#[cfg(test)]
mod tests {
    use crate::{
        db::Store,
        db::store::SchemaFetchFault,
        loader::{LoadOutcome, TableVersionLoader},
        runner::{LoadRequest, run_load},
        types::{Batch, Column, SemanticType, TypeMap, Value},
    };

    // ============ Test Helpers ============

    fn people_type_map() -> TypeMap {
        TypeMap::from_pairs([
            ("id", SemanticType::Integer),
            ("name", SemanticType::Text),
            ("score", SemanticType::Float),
        ])
    }

    /// id/name/score batch with `rows` rows, already well typed.
    fn people_batch(rows: usize) -> Batch {
        Batch::new(vec![
            Column::new("id", (0..rows).map(|i| Value::Int(i as i64)).collect()),
            Column::new(
                "name",
                (0..rows).map(|i| Value::Text(format!("name_{i}"))).collect(),
            ),
            Column::new(
                "score",
                (0..rows).map(|i| Value::Float(i as f64 * 1.5)).collect(),
            ),
        ])
        .unwrap()
    }

    async fn loader() -> (TableVersionLoader, Store) {
        let store = Store::sqlite_in_memory().await.unwrap();
        (TableVersionLoader::new(store.clone()), store)
    }

    // ============ Loader State Machine ============

    #[tokio::test]
    async fn test_load_into_absent_table_creates_it() {
        let (loader, store) = loader().await;

        let outcome = loader
            .load(&people_batch(4), &people_type_map(), "clean_data")
            .await
            .unwrap();

        assert_eq!(outcome, LoadOutcome::Created("clean_data".to_string()));
        assert!(store.table_exists("clean_data").await.unwrap());
        assert_eq!(store.count_rows("clean_data").await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_identical_schema_appends() {
        let (loader, store) = loader().await;
        let type_map = people_type_map();

        loader
            .load(&people_batch(4), &type_map, "clean_data")
            .await
            .unwrap();
        let outcome = loader
            .load(&people_batch(3), &type_map, "clean_data")
            .await
            .unwrap();

        assert_eq!(outcome, LoadOutcome::Appended("clean_data".to_string()));
        assert_eq!(store.count_rows("clean_data").await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_extra_column_creates_versioned_table() {
        let (loader, store) = loader().await;

        loader
            .load(&people_batch(4), &people_type_map(), "clean_data")
            .await
            .unwrap();

        // Second batch carries an extra column the persisted table lacks.
        let mut type_map = people_type_map();
        type_map.insert("category".to_string(), SemanticType::Text);
        let mut columns = people_batch(2).columns().to_vec();
        columns.push(Column::new(
            "category",
            vec![Value::Text("a".into()), Value::Text("b".into())],
        ));
        let drifted = Batch::new(columns).unwrap();

        let outcome = loader.load(&drifted, &type_map, "clean_data").await.unwrap();

        let LoadOutcome::Created(versioned) = outcome else {
            panic!("expected a versioned table, got {outcome:?}");
        };
        assert!(versioned.starts_with("clean_data_"));
        let suffix = versioned.strip_prefix("clean_data_").unwrap();
        assert_eq!(suffix.len(), 20);
        assert!(suffix.chars().all(|c| c.is_ascii_digit()));

        // The original table is left untouched.
        assert_eq!(store.count_rows("clean_data").await.unwrap(), 4);
        assert_eq!(store.count_rows(&versioned).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_reordered_columns_create_versioned_table() {
        let (loader, store) = loader().await;
        let type_map = people_type_map();

        loader
            .load(&people_batch(2), &type_map, "ordered")
            .await
            .unwrap();

        // Same columns and types, different order.
        let batch = people_batch(2);
        let mut columns = batch.columns().to_vec();
        columns.reverse();
        let reordered = Batch::new(columns).unwrap();

        let outcome = loader.load(&reordered, &type_map, "ordered").await.unwrap();

        assert!(matches!(outcome, LoadOutcome::Created(ref name) if name.starts_with("ordered_")));
        assert_eq!(store.count_rows("ordered").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_category_compatible_schema_appends() {
        let (loader, store) = loader().await;

        // Pre-existing table uses a bounded character type and a narrower
        // integer than the target schema materializes.
        store
            .execute_raw("CREATE TABLE legacy (id INTEGER, name VARCHAR(50), score REAL)")
            .await
            .unwrap();

        let outcome = loader
            .load(&people_batch(3), &people_type_map(), "legacy")
            .await
            .unwrap();

        assert_eq!(outcome, LoadOutcome::Appended("legacy".to_string()));
        assert_eq!(store.count_rows("legacy").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_incompatible_type_creates_versioned_table() {
        let (loader, store) = loader().await;

        // Same column names, but score is textual in the store and numeric
        // in the incoming batch.
        store
            .execute_raw("CREATE TABLE clean_data (id BIGINT, name TEXT, score TEXT)")
            .await
            .unwrap();
        store
            .execute_raw("INSERT INTO clean_data VALUES (1, 'seed', 'high')")
            .await
            .unwrap();

        let outcome = loader
            .load(&people_batch(2), &people_type_map(), "clean_data")
            .await
            .unwrap();

        assert!(
            matches!(outcome, LoadOutcome::Created(ref name) if name.starts_with("clean_data_"))
        );
        assert_eq!(store.count_rows("clean_data").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop_without_store_interaction() {
        let (loader, store) = loader().await;

        let empty_rows = Batch::new(vec![
            Column::new("id", vec![]),
            Column::new("name", vec![]),
        ])
        .unwrap();
        let outcome = loader
            .load(&empty_rows, &people_type_map(), "clean_data")
            .await
            .unwrap();
        assert_eq!(outcome, LoadOutcome::NoOp);

        let no_columns = Batch::empty();
        let outcome = loader
            .load(&no_columns, &people_type_map(), "clean_data")
            .await
            .unwrap();
        assert_eq!(outcome, LoadOutcome::NoOp);

        assert!(!store.table_exists("clean_data").await.unwrap());
    }

    #[tokio::test]
    async fn test_null_cells_round_trip_through_append() {
        let (loader, store) = loader().await;
        let type_map = people_type_map();

        let batch = Batch::new(vec![
            Column::new("id", vec![Value::Int(1), Value::Null]),
            Column::new("name", vec![Value::Null, Value::Text("b".into())]),
            Column::new("score", vec![Value::Float(0.5), Value::Null]),
        ])
        .unwrap();

        loader.load(&batch, &type_map, "nullable").await.unwrap();

        assert_eq!(store.count_rows("nullable").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_create_table_fails_if_table_exists() {
        let (_, store) = loader().await;
        store
            .execute_raw("CREATE TABLE taken (id BIGINT)")
            .await
            .unwrap();

        let schema = vec![crate::db::schema::ColumnSchema {
            name: "id".to_string(),
            sql_type: crate::db::schema::SqlType::BigInt,
        }];
        let result = store.create_table("taken", &schema).await;
        assert!(result.is_err(), "creation over an existing table must fail");
    }

    #[tokio::test]
    async fn test_schema_fetch_failure_isolates_batch_in_versioned_table() {
        let (loader, store) = loader().await;
        let type_map = people_type_map();

        loader
            .load(&people_batch(3), &type_map, "clean_data")
            .await
            .unwrap();

        // The table exists but its layout cannot be retrieved; the batch
        // must land in a versioned table, never in the unverified one.
        store.set_schema_fetch_fault(Some(SchemaFetchFault::Failure));
        let outcome = loader
            .load(&people_batch(2), &type_map, "clean_data")
            .await
            .unwrap();
        store.set_schema_fetch_fault(None);

        let LoadOutcome::Created(versioned) = outcome else {
            panic!("expected a versioned table, got {outcome:?}");
        };
        assert!(versioned.starts_with("clean_data_"));
        assert_eq!(store.count_rows("clean_data").await.unwrap(), 3);
        assert_eq!(store.count_rows(&versioned).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_empty_schema_listing_isolates_batch_in_versioned_table() {
        let (loader, store) = loader().await;
        let type_map = people_type_map();

        loader
            .load(&people_batch(3), &type_map, "clean_data")
            .await
            .unwrap();

        // The catalog answers, but claims the existing table has no columns.
        store.set_schema_fetch_fault(Some(SchemaFetchFault::EmptyListing));
        let outcome = loader
            .load(&people_batch(2), &type_map, "clean_data")
            .await
            .unwrap();
        store.set_schema_fetch_fault(None);

        let LoadOutcome::Created(versioned) = outcome else {
            panic!("expected a versioned table, got {outcome:?}");
        };
        assert!(versioned.starts_with("clean_data_"));
        assert_eq!(store.count_rows("clean_data").await.unwrap(), 3);
        assert_eq!(store.count_rows(&versioned).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_failed_append_leaves_no_partial_rows() {
        let (_, store) = loader().await;
        store
            .execute_raw("CREATE TABLE strict (id BIGINT NOT NULL)")
            .await
            .unwrap();

        // The offending null sits in the second chunk; rows from the first
        // chunk must be rolled back with it.
        let rows = crate::config::INSERT_CHUNK_ROWS + 50;
        let values: Vec<Value> = (0..rows)
            .map(|i| {
                if i == rows - 10 {
                    Value::Null
                } else {
                    Value::Int(i as i64)
                }
            })
            .collect();
        let batch = Batch::new(vec![Column::new("id", values)]).unwrap();
        let schema = vec![crate::db::schema::ColumnSchema {
            name: "id".to_string(),
            sql_type: crate::db::schema::SqlType::BigInt,
        }];

        let result = store.append_rows("strict", &schema, &batch).await;
        assert!(result.is_err(), "null in a NOT NULL column must fail");
        assert_eq!(store.count_rows("strict").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_large_batch_chunks_across_statements() {
        let (loader, store) = loader().await;

        // More rows than one INSERT chunk holds.
        let rows = crate::config::INSERT_CHUNK_ROWS * 2 + 17;
        let outcome = loader
            .load(&people_batch(rows), &people_type_map(), "big")
            .await
            .unwrap();

        assert_eq!(outcome, LoadOutcome::Created("big".to_string()));
        assert_eq!(store.count_rows("big").await.unwrap(), rows as i64);
    }

    // ============ Pipeline (runner) ============

    #[tokio::test]
    async fn test_pipeline_reports_diagnostics_and_still_writes() {
        let (loader, store) = loader().await;

        // Raw text batch; row 2 holds an unparseable float.
        let batch = Batch::new(vec![
            Column::new(
                "id",
                (0..5).map(|i| Value::Text(i.to_string())).collect(),
            ),
            Column::new(
                "score",
                vec![
                    Value::Text("1.0".into()),
                    Value::Text("2.0".into()),
                    Value::Text("oops".into()),
                    Value::Text("4.0".into()),
                    Value::Text("5.0".into()),
                ],
            ),
        ])
        .unwrap();
        let type_map = TypeMap::from_pairs([
            ("id", SemanticType::Integer),
            ("score", SemanticType::Float),
        ]);

        let report = run_load(
            &loader,
            LoadRequest {
                base_table: "clean_data".to_string(),
                batch,
                type_map,
            },
        )
        .await
        .unwrap();

        assert_eq!(report.outcome, LoadOutcome::Created("clean_data".to_string()));
        assert_eq!(report.rows_in_batch, 5);
        assert!(report.cast_errors.is_empty());
        assert_eq!(report.row_errors.len(), 1);
        assert_eq!(report.row_errors[0].row_index, 2);

        // All five rows were written, the bad cell as null.
        assert_eq!(store.count_rows("clean_data").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_pipeline_surfaces_missing_mapped_column() {
        let (loader, _) = loader().await;

        let batch = Batch::new(vec![Column::new("id", vec![Value::Text("1".into())])]).unwrap();
        let type_map = TypeMap::from_pairs([
            ("id", SemanticType::Integer),
            ("phantom", SemanticType::Float),
        ]);

        let report = run_load(
            &loader,
            LoadRequest {
                base_table: "partial".to_string(),
                batch,
                type_map,
            },
        )
        .await
        .unwrap();

        assert_eq!(report.cast_errors.len(), 1);
        assert_eq!(report.cast_errors[0].column, "phantom");
        assert_eq!(report.outcome, LoadOutcome::Created("partial".to_string()));
    }

    #[tokio::test]
    async fn test_pipeline_drift_sequence() {
        // Full drift story: create, append, drift to a versioned table,
        // append to the original again.
        let (loader, store) = loader().await;
        let type_map = people_type_map();

        let first = run_load(
            &loader,
            LoadRequest {
                base_table: "events".to_string(),
                batch: people_batch(10),
                type_map: type_map.clone(),
            },
        )
        .await
        .unwrap();
        assert_eq!(first.outcome, LoadOutcome::Created("events".to_string()));

        let second = run_load(
            &loader,
            LoadRequest {
                base_table: "events".to_string(),
                batch: people_batch(5),
                type_map: type_map.clone(),
            },
        )
        .await
        .unwrap();
        assert_eq!(second.outcome, LoadOutcome::Appended("events".to_string()));

        // Drifted: score becomes textual.
        let drifted_map = TypeMap::from_pairs([
            ("id", SemanticType::Integer),
            ("name", SemanticType::Text),
            ("score", SemanticType::Text),
        ]);
        let drifted_batch = Batch::new(vec![
            Column::new("id", vec![Value::Int(1)]),
            Column::new("name", vec![Value::Text("x".into())]),
            Column::new("score", vec![Value::Text("high".into())]),
        ])
        .unwrap();

        let third = run_load(
            &loader,
            LoadRequest {
                base_table: "events".to_string(),
                batch: drifted_batch,
                type_map: drifted_map,
            },
        )
        .await
        .unwrap();
        let LoadOutcome::Created(versioned) = &third.outcome else {
            panic!("expected versioned creation, got {:?}", third.outcome);
        };
        assert!(versioned.starts_with("events_"));

        let fourth = run_load(
            &loader,
            LoadRequest {
                base_table: "events".to_string(),
                batch: people_batch(2),
                type_map,
            },
        )
        .await
        .unwrap();
        assert_eq!(fourth.outcome, LoadOutcome::Appended("events".to_string()));

        assert_eq!(store.count_rows("events").await.unwrap(), 17);
        assert_eq!(store.count_rows(versioned).await.unwrap(), 1);
    }
}
