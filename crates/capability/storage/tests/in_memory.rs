use chrono::Utc;
use domain::{FieldSet, MeasurementPoint};
use pmon_storage::{InMemoryPointStore, PointStore, StorageError};

fn point(machine: &str) -> MeasurementPoint {
    let mut fields = FieldSet::new();
    fields.insert("energy".to_string(), 1.0);
    MeasurementPoint::new(machine, "total", fields, Utc::now()).expect("point")
}

#[tokio::test]
async fn in_memory_keeps_write_order() {
    let store = InMemoryPointStore::new();
    store.write_point(&point("a")).await.expect("write");
    store.write_point(&point("b")).await.expect("write");

    let machines: Vec<String> = store
        .points()
        .iter()
        .map(|point| point.machine().to_string())
        .collect();
    assert_eq!(machines, vec!["a", "b"]);
    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn in_memory_rejects_after_close() {
    let store = InMemoryPointStore::new();
    store.close().await.expect("close");
    assert!(store.is_closed());
    let err = store.write_point(&point("a")).await.expect_err("closed");
    assert!(matches!(err, StorageError::Closed));
    assert!(store.is_empty());
}
