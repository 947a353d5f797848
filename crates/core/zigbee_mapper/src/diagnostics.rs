//! Retained diagnostics: debug-level persistence of bridge snapshots and a
//! capped append log of payloads this bridge didn't otherwise act on.
//! Grounded on `plugin_sm::operation_logs::OperationLogs`'s bounded-log
//! idiom (write-and-forget, cap enforced on append, failures logged not
//! raised).

use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

const MAX_LOG_LINES: usize = 10_000;

/// Persists retained bridge state and append-only payload logs under a data
/// directory, the way the upstream bridge's debug mode does. Disabled
/// entirely unless `debug` is set.
pub struct Diagnostics {
    data_path: PathBuf,
    enabled: bool,
}

impl Diagnostics {
    pub fn new(data_path: PathBuf, enabled: bool) -> Self {
        Diagnostics { data_path, enabled }
    }

    fn write_json_file<T: Serialize>(&self, file_name: &str, value: &T) {
        if !self.enabled {
            return;
        }
        match serde_json::to_string_pretty(value) {
            Ok(text) => self.write_file(file_name, &text),
            Err(err) => tracing::warn!("failed to serialize {file_name}: {err}"),
        }
    }

    fn write_file(&self, file_name: &str, contents: &str) {
        if !self.enabled {
            return;
        }
        let path = self.data_path.join(file_name);
        if let Err(err) = std::fs::write(&path, contents) {
            tracing::warn!("failed to persist {}: {err}", path.display());
        }
    }

    pub fn persist_bridge_info(&self, info: &serde_json::Value) {
        self.write_json_file("bridge-info.json", info);
    }

    pub fn persist_bridge_devices(&self, devices: &serde_json::Value) {
        self.write_json_file("bridge-devices.json", devices);
    }

    pub fn persist_bridge_groups(&self, groups: &serde_json::Value) {
        self.write_json_file("bridge-groups.json", groups);
    }

    pub fn persist_networkmap_graphviz(&self, raw_text: &str) {
        self.write_file("networkmap_graphviz.txt", raw_text);
    }

    pub fn persist_networkmap_plantuml(&self, raw_text: &str) {
        self.write_file("networkmap_plantuml.txt", raw_text);
    }

    pub fn persist_networkmap_raw(&self, value: &serde_json::Value) {
        self.write_json_file("networkmap_raw.json", value);
    }

    /// Append one JSON object to `bridge-payloads.txt`, capping the file at
    /// `MAX_LOG_LINES` entries by trimming the oldest.
    pub fn log_unknown_payload(&self, entity_name: &str, payload: &serde_json::Value) {
        self.append_capped(
            "bridge-payloads.txt",
            &serde_json::json!({"entity": entity_name, "payload": payload}),
        );
    }

    /// Mirror an outbound publish to `bridge-publish-payloads.txt`, under
    /// the same cap.
    pub fn log_outbound_publish(&self, topic: &str, payload: &serde_json::Value) {
        self.append_capped(
            "bridge-publish-payloads.txt",
            &serde_json::json!({"topic": topic, "payload": payload}),
        );
    }

    fn append_capped(&self, file_name: &str, value: &serde_json::Value) {
        if !self.enabled {
            return;
        }
        let path = self.data_path.join(file_name);
        if let Err(err) = append_capped_line(&path, value) {
            tracing::warn!("failed to append to {}: {err}", path.display());
        }
    }
}

fn append_capped_line(path: &Path, value: &serde_json::Value) -> std::io::Result<()> {
    let mut lines = match std::fs::read_to_string(path) {
        Ok(text) => text.lines().map(str::to_string).collect::<Vec<_>>(),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(err) => return Err(err),
    };
    lines.push(serde_json::to_string(value)?);
    if lines.len() > MAX_LOG_LINES {
        let overflow = lines.len() - MAX_LOG_LINES;
        lines.drain(0..overflow);
    }
    let mut file = std::fs::File::create(path)?;
    for line in &lines {
        writeln!(file, "{line}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn disabled_diagnostics_writes_nothing() {
        let dir = tempdir().unwrap();
        let diagnostics = Diagnostics::new(dir.path().to_path_buf(), false);
        diagnostics.persist_bridge_info(&serde_json::json!({"version": "1.0"}));
        assert!(!dir.path().join("bridge-info.json").exists());
    }

    #[test]
    fn enabled_diagnostics_persists_json_snapshot() {
        let dir = tempdir().unwrap();
        let diagnostics = Diagnostics::new(dir.path().to_path_buf(), true);
        diagnostics.persist_bridge_info(&serde_json::json!({"version": "1.0"}));
        let text = std::fs::read_to_string(dir.path().join("bridge-info.json")).unwrap();
        assert!(text.contains("1.0"));
    }

    #[test]
    fn append_capped_log_trims_oldest_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bridge-payloads.txt");
        for i in 0..3 {
            append_capped_line(&path, &serde_json::json!({"i": i})).unwrap();
        }
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn unknown_payload_log_respects_cap() {
        let dir = tempdir().unwrap();
        let diagnostics = Diagnostics::new(dir.path().to_path_buf(), true);
        for i in 0..3 {
            diagnostics.log_unknown_payload("Lamp1", &serde_json::json!({"i": i}));
        }
        let text = std::fs::read_to_string(dir.path().join("bridge-payloads.txt")).unwrap();
        assert_eq!(text.lines().count(), 3);
    }
}
