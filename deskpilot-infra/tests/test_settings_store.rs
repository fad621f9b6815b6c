use deskpilot_infra::infra::settings_store::SettingsStore;
use std::collections::BTreeMap;
use tempfile::TempDir;

#[test]
fn test_missing_file_is_empty() {
    let temp = TempDir::new().unwrap();
    let store = SettingsStore::new(temp.path().join("settings.yaml"));
    assert!(store.load().unwrap().is_empty());
}

#[test]
fn test_save_and_load() {
    let temp = TempDir::new().unwrap();
    let store = SettingsStore::new(temp.path().join("nested/settings.yaml"));

    let mut values = BTreeMap::new();
    values.insert("VOICE".to_string(), "sage".to_string());
    values.insert("INCLUDE_DATE".to_string(), "false".to_string());
    store.save(&values).unwrap();

    assert_eq!(store.load().unwrap(), values);
    assert!(!temp.path().join("nested/settings.tmp").exists());
}

#[test]
fn test_scalars_are_read_as_strings() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("settings.yaml");
    std::fs::write(&path, "COMMAND_TIMEOUT_MS: 5000\nFUNCTION_CALLING: true\nNESTED: [1, 2]\n").unwrap();

    let values = SettingsStore::new(&path).load().unwrap();
    assert_eq!(values["COMMAND_TIMEOUT_MS"], "5000");
    assert_eq!(values["FUNCTION_CALLING"], "true");
    assert!(!values.contains_key("NESTED"));
}

#[test]
fn test_reset_removes_file() {
    let temp = TempDir::new().unwrap();
    let store = SettingsStore::new(temp.path().join("settings.yaml"));
    store.save(&BTreeMap::new()).unwrap();
    store.reset().unwrap();
    store.reset().unwrap();
    assert!(!store.path().exists());
}
