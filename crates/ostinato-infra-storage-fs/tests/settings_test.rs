use ostinato_infra_storage_fs::FsStorage;
use ostinato_ports::storage::{PlayerSettings, StorageError, StoragePort, TransportMode};
use pretty_assertions::assert_eq;
use std::fs;

#[test]
fn missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FsStorage::new(dir.path().join("absent"));
    assert_eq!(storage.load_settings().unwrap(), PlayerSettings::default());
}

#[test]
fn saved_settings_load_back() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FsStorage::new(dir.path().join("nested"));
    let settings = PlayerSettings {
        port: "/dev/ttyACM1".to_string(),
        baud_rate: 57_600,
        transport_mode: TransportMode::FixedDelay,
        ack_timeout_ms: 250,
        settle_delay_ms: 0,
        line_delay_ms: 20,
        max_consecutive_unacked: Some(5),
    };

    storage.save_settings(&settings).unwrap();
    assert_eq!(storage.load_settings().unwrap(), settings);
    assert!(!storage.settings_path().with_extension("json.tmp").exists());

    let raw = fs::read_to_string(storage.settings_path()).unwrap();
    assert!(raw.contains("\"transport_mode\": \"fixed_delay\""));
}

#[test]
fn partial_documents_fill_in_defaults() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("settings.json"), r#"{ "port": "COM7" }"#).unwrap();

    let loaded = FsStorage::new(dir.path().to_path_buf())
        .load_settings()
        .unwrap();
    assert_eq!(
        loaded,
        PlayerSettings {
            port: "COM7".to_string(),
            ..PlayerSettings::default()
        }
    );
}

#[test]
fn corrupt_documents_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("settings.json"), b"{ not json").unwrap();

    let err = FsStorage::new(dir.path().to_path_buf())
        .load_settings()
        .unwrap_err();
    assert!(matches!(err, StorageError::Serde(_)));
}
