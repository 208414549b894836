use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::PathBuf;

/// Raw-string slot holding the id of the last open project.
pub const ACTIVE_PROJECT_KEY: &str = "active_project";
/// JSON slot holding the full project list.
pub const PROJECTS_KEY: &str = "projects";
/// JSON slot holding the GitHub export settings.
pub const GITHUB_CONFIG_KEY: &str = "github_config";

/// Durable key-value store over one directory, one file per key. Writes
/// are whole-value replacements; reads substitute the caller's default on
/// any failure. No transactions across keys.
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    pub fn open_default() -> Self {
        let base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            root: base.join("maquette"),
        }
    }

    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn json_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }

    fn raw_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.txt"))
    }

    /// Load a JSON slot. Missing files and malformed contents both yield
    /// the supplied default; this never fails.
    pub fn load<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        let path = self.json_path(key);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(err) => {
                tracing::debug!(key, error = %err, "store slot unreadable, using default");
                return default;
            }
        };
        match serde_json::from_slice(&data) {
            Ok(value) => value,
            Err(err) => {
                tracing::debug!(key, error = %err, "store slot malformed, using default");
                default
            }
        }
    }

    pub fn save<T: Serialize>(&self, key: &str, value: &T) -> io::Result<()> {
        let bytes = serde_json::to_vec_pretty(value)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))?;
        self.write_slot(self.json_path(key), &bytes)
    }

    pub fn load_raw(&self, key: &str, default: &str) -> String {
        match fs::read_to_string(self.raw_path(key)) {
            Ok(value) if !value.trim().is_empty() => value.trim().to_string(),
            _ => default.to_string(),
        }
    }

    pub fn save_raw(&self, key: &str, value: &str) -> io::Result<()> {
        self.write_slot(self.raw_path(key), value.as_bytes())
    }

    fn write_slot(&self, final_path: PathBuf, bytes: &[u8]) -> io::Result<()> {
        fs::create_dir_all(&self.root)?;
        let tmp_path = final_path.with_extension("tmp");
        fs::write(&tmp_path, bytes)?;
        match fs::rename(&tmp_path, &final_path) {
            Ok(()) => Ok(()),
            Err(rename_err) => {
                if final_path.exists() {
                    fs::remove_file(&final_path)?;
                    fs::rename(&tmp_path, &final_path)?;
                    Ok(())
                } else {
                    Err(rename_err)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::{GeneratedComponent, Message, Project};

    #[test]
    fn load_returns_default_for_missing_slot() {
        let dir = tempfile::tempdir().expect("temp dir should create");
        let store = Store::at(dir.path());
        let projects: Vec<Project> = store.load(PROJECTS_KEY, Vec::new());
        assert!(projects.is_empty());
    }

    #[test]
    fn load_returns_default_for_malformed_slot() {
        let dir = tempfile::tempdir().expect("temp dir should create");
        let store = Store::at(dir.path());
        fs::create_dir_all(dir.path()).expect("root should create");
        fs::write(dir.path().join("projects.json"), b"{not json").expect("fixture should write");
        let projects: Vec<Project> = store.load(PROJECTS_KEY, Vec::new());
        assert!(projects.is_empty());
    }

    #[test]
    fn project_list_round_trip_is_lossless() {
        let dir = tempfile::tempdir().expect("temp dir should create");
        let store = Store::at(dir.path());

        let mut project = Project::new("p1");
        project.messages.push(Message::user("Build a button", None));
        project.history.push(GeneratedComponent {
            id: "c1".to_string(),
            prompt: "Build a button".to_string(),
            code: "{\"schema_version\":1,\"definitions\":[]}".to_string(),
            description: "A button".to_string(),
            version: 1,
            timestamp: 7,
        });
        project.current_index = Some(0);
        project.refresh_derived(9);

        store
            .save(PROJECTS_KEY, &vec![project.clone()])
            .expect("save should succeed");
        let loaded: Vec<Project> = store.load(PROJECTS_KEY, Vec::new());
        assert_eq!(loaded, vec![project]);
    }

    #[test]
    fn raw_slot_round_trip() {
        let dir = tempfile::tempdir().expect("temp dir should create");
        let store = Store::at(dir.path());
        assert_eq!(store.load_raw(ACTIVE_PROJECT_KEY, "fallback"), "fallback");
        store
            .save_raw(ACTIVE_PROJECT_KEY, "p-42")
            .expect("save should succeed");
        assert_eq!(store.load_raw(ACTIVE_PROJECT_KEY, "fallback"), "p-42");
    }

    #[test]
    fn save_replaces_previous_value_whole() {
        let dir = tempfile::tempdir().expect("temp dir should create");
        let store = Store::at(dir.path());
        store
            .save(GITHUB_CONFIG_KEY, &serde_json::json!({"token": "a"}))
            .expect("first save should succeed");
        store
            .save(GITHUB_CONFIG_KEY, &serde_json::json!({"token": "b"}))
            .expect("second save should succeed");
        let value: serde_json::Value =
            store.load(GITHUB_CONFIG_KEY, serde_json::Value::Null);
        assert_eq!(value["token"], "b");
    }
}
