use chrono::{Local, TimeZone};
use redis_backup::backup::{self, FILE_PREFIX};
use redis_backup::snapshot::Snapshot;
use redis_backup::types::{KeyRecord, StringValue, Value};

fn sample() -> Snapshot {
    vec![
        KeyRecord::new("sessao", Value::String(StringValue::Raw("abc".into())), 120),
        KeyRecord::persistent("fila", Value::List(vec!["a".into(), "b".into()])),
    ]
    .into_iter()
    .collect()
}

#[tokio::test]
async fn snapshot_file_is_timestamped_and_readable() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("backups").join("redis");
    let at = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();

    let path = backup::write_snapshot(&sample(), &dir, at).await.unwrap();
    assert_eq!(path, dir.join("redis_backup_20240309_140507.json"));

    let bytes = backup::read_snapshot(&path).await.unwrap();
    assert_eq!(Snapshot::decode(&bytes).unwrap(), sample());

    // nothing but the snapshot is left behind
    let names: Vec<_> = std::fs::read_dir(&dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(names, vec!["redis_backup_20240309_140507.json"]);
}

#[tokio::test]
async fn snapshot_file_uses_the_documented_fields() {
    let tmp = tempfile::tempdir().unwrap();
    let at = Local.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let path = backup::write_snapshot(&sample(), tmp.path(), at).await.unwrap();

    let json: serde_json::Value = serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
    assert_eq!(json["sessao"]["tipo"], "string");
    assert_eq!(json["sessao"]["valor"], "abc");
    assert_eq!(json["sessao"]["ttl"], 120);
    assert_eq!(json["fila"]["tipo"], "list");
    assert_eq!(json["fila"]["ttl"], -1);
}

#[tokio::test]
async fn prune_keeps_the_newest_files() {
    let tmp = tempfile::tempdir().unwrap();
    for day in 1..=5 {
        let at = Local.with_ymd_and_hms(2024, 5, day, 3, 0, 0).unwrap();
        backup::write_snapshot(&sample(), tmp.path(), at).await.unwrap();
    }
    std::fs::write(tmp.path().join("notes.txt"), "keep me").unwrap();

    let removed = backup::prune(tmp.path(), 2).await.unwrap();
    assert_eq!(removed.len(), 3);

    let mut names: Vec<_> = std::fs::read_dir(tmp.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            "notes.txt",
            "redis_backup_20240504_030000.json",
            "redis_backup_20240505_030000.json",
        ]
    );
    assert!(removed.iter().all(|p| p.file_name().unwrap().to_string_lossy().starts_with(FILE_PREFIX)));
}

#[tokio::test]
async fn prune_with_room_to_spare_removes_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let at = Local.with_ymd_and_hms(2024, 5, 1, 3, 0, 0).unwrap();
    backup::write_snapshot(&sample(), tmp.path(), at).await.unwrap();
    assert!(backup::prune(tmp.path(), 7).await.unwrap().is_empty());
}

#[tokio::test]
async fn reading_a_missing_file_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let err = backup::read_snapshot(&tmp.path().join("nope.json")).await.unwrap_err();
    assert!(err.is_fatal());
}
