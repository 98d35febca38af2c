use std::time::Duration;

use futures::TryStreamExt;
use serde_json::json;
use tempfile::{tempdir, TempDir};

use gps_route_reader::{
    database::{Database, InsertMode, TableName},
    errors::GpsReaderError,
    models::{DateRange, FixFrame, NewGpsFix, SearchFilter, COLUMN_NAMES},
    validation::parse_search_args,
};

#[allow(clippy::too_many_arguments)]
fn fix(
    dt: &str,
    vehicle: &str,
    driver: &str,
    position: &str,
    country: &str,
    speed: i64,
    mileage: f64,
    ignition: bool,
    engine: bool,
    longitude: f64,
    latitude: f64,
) -> NewGpsFix {
    NewGpsFix {
        dt: dt.to_string(),
        vehicle: Some(vehicle.to_string()),
        driver: Some(driver.to_string()),
        position: Some(position.to_string()),
        country: Some(country.to_string()),
        speed: Some(speed),
        mileage: Some(mileage),
        ignition_status: Some(ignition),
        engine_status: Some(engine),
        longitude: Some(longitude),
        latitude: Some(latitude),
    }
}

/// Five fixes, the 3rd and 4th are duplicates
fn test_values() -> Vec<NewGpsFix> {
    vec![
        fix("2021-11-11 01:43:00", "PL55555", "John Smith", "Chernobyl 1234", "UKR", 88, 500533.0, true, false, 11.490252, 52.179932),
        fix("2021-11-11 05:50:00", "PL55555", "John Smith", "Chernobyl 1234", "UKR", 20, 500533.0, false, false, 11.490252, 52.179932),
        fix("2021-08-05 12:50:00", "GB06666", "Jan Kowalski", "Warszawa, Mokotów 1234", "PL", 50, 121121.0, true, true, 5.881000, 12.124566),
        fix("2021-08-05 12:50:00", "GB06666", "Jan Kowalski", "Warszawa, Mokotów 1234", "PL", 50, 121121.0, true, true, 5.881000, 12.124566),
        fix("2020-09-05 19:23:00", "BI122", "Elon Musk", "Gdańsk 8", "PL", 0, 521121.0, true, true, 7.450903, 52.306171),
    ]
}

async fn setup_test_db() -> (TempDir, Database, TableName) {
    let temp_dir = tempdir().unwrap();
    let db = Database::open(
        &temp_dir.path().join("test_company.db"),
        Duration::from_secs(10),
    )
    .await
    .expect("Failed to open database");
    let table = TableName::default();
    db.create_table(&table)
        .await
        .expect("Failed to create table");
    (temp_dir, db, table)
}

async fn search(db: &Database, table: &TableName, filter: SearchFilter) -> Vec<i64> {
    db.search(table, &filter)
        .fetch_all()
        .await
        .expect("Failed to search")
        .into_iter()
        .map(|fix| fix.id)
        .collect()
}

#[tokio::test]
async fn test_create_table_is_idempotent() {
    let (_dir, db, table) = setup_test_db().await;
    db.insert_rows(&table, &test_values()).await.unwrap();

    db.create_table(&table).await.unwrap();

    assert_eq!(db.row_count(&table).await.unwrap(), 5);
    assert_eq!(db.table_names().await.unwrap(), vec!["gps".to_string()]);
}

#[tokio::test]
async fn test_drop_table_surfaces_engine_error() {
    let (_dir, db, table) = setup_test_db().await;
    db.drop_table(&table).await.unwrap();

    assert!(!db.table_exists(&table).await.unwrap());
    assert!(matches!(
        db.row_count(&table).await,
        Err(GpsReaderError::DatabaseError(_))
    ));
    assert!(matches!(
        db.column_names(&table).await,
        Err(GpsReaderError::DatabaseError(_))
    ));
    // Dropping again is a no-op
    db.drop_table(&table).await.unwrap();
}

#[tokio::test]
async fn test_insert_rows() {
    let (_dir, db, table) = setup_test_db().await;

    let inserted = db.insert_rows(&table, &test_values()).await.unwrap();
    assert_eq!(inserted, 5);

    let stored = db.search(&table, &SearchFilter::new()).fetch_all().await.unwrap();
    assert_eq!(stored.len(), 5);
    for (i, (stored, expected)) in stored.into_iter().zip(test_values()).enumerate() {
        assert_eq!(stored.id, i as i64 + 1);
        assert_eq!(NewGpsFix::from(stored), expected);
    }
}

#[tokio::test]
async fn test_ids_are_unique_and_increasing() {
    let (_dir, db, table) = setup_test_db().await;

    for _ in 0..3 {
        db.insert_rows(&table, &test_values()).await.unwrap();
    }

    let ids = search(&db, &table, SearchFilter::new()).await;
    assert_eq!(ids.len(), 15);
    assert!(ids.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(*ids.last().unwrap(), 15);
}

#[tokio::test]
async fn test_row_count_grows_by_inserted_rows() {
    let (_dir, db, table) = setup_test_db().await;

    for batch in [1usize, 3, 5] {
        let before = db.row_count(&table).await.unwrap();
        let inserted = db
            .insert_rows(&table, &test_values()[..batch])
            .await
            .unwrap();
        assert_eq!(db.row_count(&table).await.unwrap(), before + inserted);
    }
    assert_eq!(db.row_count(&table).await.unwrap(), 9);
}

#[tokio::test]
async fn test_insert_frame_modes() {
    let (_dir, db, table) = setup_test_db().await;
    let frame = FixFrame::from_new_fixes(test_values());

    assert_eq!(db.insert_frame(&table, &frame, InsertMode::Append).await.unwrap(), 5);
    assert_eq!(db.insert_frame(&table, &frame, InsertMode::Append).await.unwrap(), 5);
    assert_eq!(db.row_count(&table).await.unwrap(), 10);

    db.insert_frame(&table, &frame, InsertMode::Replace).await.unwrap();
    assert_eq!(db.row_count(&table).await.unwrap(), 5);
    assert_eq!(search(&db, &table, SearchFilter::new()).await, vec![1, 2, 3, 4, 5]);

    assert!(matches!(
        db.insert_frame(&table, &frame, InsertMode::Fail).await,
        Err(GpsReaderError::TableExists(_))
    ));

    let other = TableName::new("gps_archive").unwrap();
    db.insert_frame(&other, &frame, InsertMode::Fail).await.unwrap();
    assert_eq!(db.row_count(&other).await.unwrap(), 5);
}

#[tokio::test]
async fn test_insert_frame_rejects_misaligned_columns() {
    let (_dir, db, table) = setup_test_db().await;
    db.insert_rows(&table, &test_values()).await.unwrap();

    let mut frame = FixFrame::from_new_fixes(test_values());
    frame.latitude.pop();

    for mode in [InsertMode::Append, InsertMode::Replace] {
        assert!(matches!(
            db.insert_frame(&table, &frame, mode).await,
            Err(GpsReaderError::MisalignedFrame { column: "latitude", .. })
        ));
    }
    // Nothing was dropped or added
    assert_eq!(db.row_count(&table).await.unwrap(), 5);
}

#[tokio::test]
async fn test_keyword_table_names() {
    let (_dir, db, _) = setup_test_db().await;

    for name in ["order", "select", "table"] {
        let table = TableName::new(name).unwrap();
        db.create_table(&table).await.unwrap();
        db.insert_rows(&table, &test_values()).await.unwrap();
        assert_eq!(db.row_count(&table).await.unwrap(), 5);
        assert_eq!(db.find_duplicates(&table).await.unwrap().len(), 1);
        assert_eq!(db.drop_duplicates(&table).await.unwrap(), 1);
        assert_eq!(search(&db, &table, SearchFilter::new()).await.len(), 4);
        assert_eq!(db.column_names(&table).await.unwrap(), COLUMN_NAMES.to_vec());
        db.drop_table(&table).await.unwrap();
        assert!(!db.table_exists(&table).await.unwrap());
    }
}

#[tokio::test]
async fn test_explicit_transactions() {
    let (_dir, db, table) = setup_test_db().await;

    let mut batch = db.begin_transaction().await.unwrap();
    assert_eq!(batch.insert_rows(&table, &test_values()[..2]).await.unwrap(), 2);
    assert_eq!(batch.insert_rows(&table, &test_values()[2..]).await.unwrap(), 3);
    assert_eq!(batch.commit().await.unwrap(), 5);
    assert_eq!(db.row_count(&table).await.unwrap(), 5);

    let mut batch = db.begin_transaction().await.unwrap();
    batch.insert_rows(&table, &test_values()).await.unwrap();
    batch.rollback().await.unwrap();
    assert_eq!(db.row_count(&table).await.unwrap(), 5);

    // A dropped batch is rolled back as well
    {
        let mut batch = db.begin_transaction().await.unwrap();
        batch.insert_rows(&table, &test_values()).await.unwrap();
    }
    assert_eq!(db.row_count(&table).await.unwrap(), 5);
}

#[tokio::test]
async fn test_total_changes() {
    let (_dir, db, table) = setup_test_db().await;
    assert_eq!(db.total_changes().await.unwrap(), 0);

    db.insert_rows(&table, &test_values()).await.unwrap();
    assert_eq!(db.total_changes().await.unwrap(), 5);

    db.drop_duplicates(&table).await.unwrap();
    assert_eq!(db.total_changes().await.unwrap(), 6);
}

#[tokio::test]
async fn test_insert_frame_reassigns_ids() {
    let (_dir, db, table) = setup_test_db().await;
    db.insert_rows(&table, &test_values()).await.unwrap();

    // A frame read back from the store keeps its old ids, the copy gets new ones
    let stored = db.search(&table, &SearchFilter::new()).fetch_all().await.unwrap();
    let frame = FixFrame::from_fixes(stored);
    db.insert_frame(&table, &frame, InsertMode::Append).await.unwrap();

    assert_eq!(search(&db, &table, SearchFilter::new()).await, (1..=10).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_find_duplicates() {
    let (_dir, db, table) = setup_test_db().await;
    db.insert_rows(&table, &test_values()).await.unwrap();
    db.insert_rows(&table, &test_values()[2..3]).await.unwrap();
    db.insert_rows(&table, &test_values()[..1]).await.unwrap();

    let duplicates = db.find_duplicates(&table).await.unwrap();

    assert_eq!(duplicates.len(), 2);
    assert_eq!(duplicates[0].dt, "2021-08-05 12:50:00");
    assert_eq!(duplicates[0].count, 3);
    assert_eq!(duplicates[0].keep_id, 3);
    assert_eq!(duplicates[0].speed, Some(50));
    assert_eq!(duplicates[1].dt, "2021-11-11 01:43:00");
    assert_eq!(duplicates[1].count, 2);
    assert_eq!(duplicates[1].keep_id, 1);
}

#[tokio::test]
async fn test_drop_duplicates_keeps_lowest_id() {
    let (_dir, db, table) = setup_test_db().await;
    db.insert_rows(&table, &test_values()).await.unwrap();
    db.insert_rows(&table, &test_values()).await.unwrap();

    let expected: u64 = db
        .find_duplicates(&table)
        .await
        .unwrap()
        .iter()
        .map(|group| group.count as u64 - 1)
        .sum();
    let dropped = db.drop_duplicates(&table).await.unwrap();

    assert_eq!(dropped, expected);
    assert_eq!(dropped, 6);
    assert_eq!(search(&db, &table, SearchFilter::new()).await, vec![1, 2, 3, 5]);
    assert!(db.find_duplicates(&table).await.unwrap().is_empty());
    assert_eq!(db.drop_duplicates(&table).await.unwrap(), 0);
}

#[tokio::test]
async fn test_search_without_filter_returns_all_rows() {
    let (_dir, db, table) = setup_test_db().await;
    db.insert_rows(&table, &test_values()).await.unwrap();
    db.insert_rows(
        &table,
        &[NewGpsFix {
            dt: "2021-01-01 00:00:00".to_string(),
            ..Default::default()
        }],
    )
    .await
    .unwrap();

    assert_eq!(
        search(&db, &table, SearchFilter::new()).await,
        vec![1, 2, 3, 4, 5, 6]
    );
}

#[tokio::test]
async fn test_search_by_vehicle_substring() {
    let (_dir, db, table) = setup_test_db().await;
    db.insert_rows(&table, &test_values()).await.unwrap();

    let filter = SearchFilter::new().vehicle("PL5");
    let found = db.search(&table, &filter).fetch_all().await.unwrap();
    assert_eq!(found.len(), 2);
    assert!(found
        .iter()
        .all(|fix| fix.vehicle.as_deref().unwrap().contains("PL5")));

    // Matching is case sensitive
    assert!(search(&db, &table, SearchFilter::new().vehicle("pl5")).await.is_empty());
}

#[tokio::test]
async fn test_search_by_driver_and_vehicle() {
    let (_dir, db, table) = setup_test_db().await;
    db.insert_rows(&table, &test_values()).await.unwrap();

    assert_eq!(
        search(&db, &table, SearchFilter::new().driver("Kowalski")).await,
        vec![3, 4]
    );
    assert!(search(&db, &table, SearchFilter::new().driver("Kowalski").vehicle("PL"))
        .await
        .is_empty());
}

#[tokio::test]
async fn test_search_by_date_range() {
    let (_dir, db, table) = setup_test_db().await;
    db.insert_rows(&table, &test_values()).await.unwrap();

    let august = DateRange::between("2021-08-01", "2021-08-31");
    assert_eq!(search(&db, &table, SearchFilter::new().between(august)).await, vec![3, 4]);

    let until_2021 = DateRange::new(vec![None, Some("2021-01-01".to_string())]).unwrap();
    assert_eq!(search(&db, &table, SearchFilter::new().between(until_2021)).await, vec![5]);

    let since_november = DateRange::new(vec![Some("2021-11-11".to_string()), None]).unwrap();
    assert_eq!(
        search(&db, &table, SearchFilter::new().between(since_november)).await,
        vec![1, 2]
    );

    // Inclusive on both ends
    let exact = DateRange::between("2021-11-11 01:43:00", "2021-11-11 05:50:00");
    assert_eq!(search(&db, &table, SearchFilter::new().between(exact)).await, vec![1, 2]);
}

#[tokio::test]
async fn test_search_stream_is_lazy() {
    let (_dir, db, table) = setup_test_db().await;
    db.insert_rows(&table, &test_values()).await.unwrap();

    let search = db.search(&table, &SearchFilter::new().vehicle("GB"));
    let mut rows = search.fetch();
    let first = rows.try_next().await.unwrap().unwrap();
    assert_eq!(first.id, 3);
    assert_eq!(first.position.as_deref(), Some("Warszawa, Mokotów 1234"));
}

#[tokio::test]
async fn test_validation_fails_before_storage() {
    // No table exists, validation errors must come first
    let temp_dir = tempdir().unwrap();
    let db = Database::open(&temp_dir.path().join("empty.db"), Duration::from_secs(10))
        .await
        .unwrap();

    for args in [
        json!({ "vehicle": 1 }),
        json!({ "driver": true }),
        json!({ "between": "2021-01-01" }),
        json!({ "between": [1, 2] }),
    ] {
        assert!(matches!(
            parse_search_args(&args),
            Err(GpsReaderError::InvalidArgumentType { .. })
        ));
    }
    assert!(matches!(
        parse_search_args(&json!({ "between": ["2021-01-01"] })),
        Err(GpsReaderError::InvalidDateRange(_))
    ));

    let filter = parse_search_args(&json!({ "vehicle": "PL" })).unwrap();
    assert!(matches!(
        db.search(&TableName::default(), &filter).fetch_all().await,
        Err(GpsReaderError::DatabaseError(_))
    ));
}

#[tokio::test]
async fn test_column_names() {
    let (_dir, db, table) = setup_test_db().await;

    let columns = db.column_names(&table).await.unwrap();
    assert_eq!(columns, COLUMN_NAMES.to_vec());
}

#[tokio::test]
async fn test_delete_database() {
    let (dir, db, _table) = setup_test_db().await;
    let path = dir.path().join("test_company.db");
    assert!(path.exists());

    db.delete().await.unwrap();

    assert!(!path.exists());
    assert!(!dir.path().join("test_company.db-wal").exists());
}
