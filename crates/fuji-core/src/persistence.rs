use std::collections::HashMap;
use std::fs;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use tracing::warn;

use super::error::StorageError;
use super::models::find_best_matching_model;
use super::models::AgentMode;
use super::models::SupportedModel;
use super::rules::dedupe_rule_ids;
use super::rules::CheckpointRule;
use super::state::AppState;
use super::state::CustomKnowledgeBase;

pub const STORAGE_KEY: &str = "app-state";

/// Envelope version. Matches the layout `{ "state": .., "version": 0 }` written
/// by earlier browser builds, so their stored values still load.
pub const PERSIST_VERSION: u32 = 0;

/// Every field that survives a restart, by slice, in wire names.
pub const PERSISTED_FIELDS: &[(&str, &[&str])] = &[
    ("ui", &["instructions"]),
    (
        "settings",
        &[
            "openAIKey",
            "anthropicKey",
            "geminiKey",
            "openAIBaseUrl",
            "anthropicBaseUrl",
            "agentMode",
            "selectedModel",
            "voiceMode",
            "customKnowledgeBase",
            "hitlRules",
        ],
    ),
];

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedUi {
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PersistedSettings {
    #[serde(rename = "openAIKey")]
    pub openai_key: String,
    pub anthropic_key: String,
    pub gemini_key: String,
    #[serde(rename = "openAIBaseUrl")]
    pub openai_base_url: Option<String>,
    pub anthropic_base_url: Option<String>,
    pub agent_mode: AgentMode,
    pub selected_model: Option<SupportedModel>,
    pub voice_mode: bool,
    pub custom_knowledge_base: CustomKnowledgeBase,
    pub hitl_rules: Vec<CheckpointRule>,
}

/// The persisted subset of [`AppState`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedState {
    pub ui: PersistedUi,
    pub settings: PersistedSettings,
}

impl PersistedState {
    pub fn apply_to(self, state: &mut AppState) {
        let PersistedState { ui, settings } = self;
        state.ui.instructions = ui.instructions;

        let target = &mut state.settings;
        target.openai_key = settings.openai_key;
        target.anthropic_key = settings.anthropic_key;
        target.gemini_key = settings.gemini_key;
        target.openai_base_url = settings.openai_base_url;
        target.anthropic_base_url = settings.anthropic_base_url;
        target.agent_mode = settings.agent_mode;
        target.selected_model = settings.selected_model;
        target.voice_mode = settings.voice_mode;
        target.custom_knowledge_base = settings.custom_knowledge_base;
        target.hitl_rules = settings.hitl_rules;
    }
}

pub fn partialize(state: &AppState) -> PersistedState {
    let settings = &state.settings;
    PersistedState {
        ui: PersistedUi {
            instructions: state.ui.instructions.clone(),
        },
        settings: PersistedSettings {
            openai_key: settings.openai_key.clone(),
            anthropic_key: settings.anthropic_key.clone(),
            gemini_key: settings.gemini_key.clone(),
            openai_base_url: settings.openai_base_url.clone(),
            anthropic_base_url: settings.anthropic_base_url.clone(),
            agent_mode: settings.agent_mode,
            selected_model: settings.selected_model,
            voice_mode: settings.voice_mode,
            custom_knowledge_base: settings.custom_knowledge_base.clone(),
            hitl_rules: settings.hitl_rules.clone(),
        },
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedEnvelope {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub seq: u64,
    pub state: Value,
}

/// Recursive merge of `overlay` into `base`.
///
/// Objects merge key by key. Anything else in `overlay`, arrays included,
/// replaces the value in `base` outright.
pub fn merge_json_value(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_obj), Value::Object(overlay_obj)) => {
            for (key, overlay_value) in overlay_obj {
                if let Some(base_value) = base_obj.get_mut(key) {
                    merge_json_value(base_value, overlay_value);
                } else {
                    base_obj.insert(key.clone(), overlay_value.clone());
                }
            }
        }
        (base_slot, overlay_value) => {
            *base_slot = overlay_value.clone();
        }
    }
}

/// Merges a stored state value into `defaults`, one persisted field at a time.
///
/// Fields outside [`PERSISTED_FIELDS`] are ignored. A field whose merged value
/// does not decode keeps its default; its siblings are unaffected.
pub fn merge_persisted(defaults: &PersistedState, persisted: &Value) -> PersistedState {
    let Some(stored) = persisted.as_object() else {
        if !persisted.is_null() {
            warn!("stored app state is not an object; using defaults");
        }
        return defaults.clone();
    };
    let mut accepted = match serde_json::to_value(defaults) {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %err, "could not encode default state; skipping rehydration");
            return defaults.clone();
        }
    };

    for &(slice, fields) in PERSISTED_FIELDS {
        let Some(stored_slice) = stored.get(slice) else {
            continue;
        };
        if !stored_slice.is_object() {
            warn!(slice, "stored slice is not an object; keeping defaults");
            continue;
        }
        for &field in fields {
            let Some(stored_value) = stored_slice.get(field) else {
                continue;
            };
            let stored_value = if field == "hitlRules" {
                keep_readable_rules(stored_value)
            } else {
                stored_value.clone()
            };

            let mut candidate = accepted.clone();
            let Some(slot) = candidate
                .get_mut(slice)
                .and_then(|slice_value| slice_value.get_mut(field))
            else {
                continue;
            };
            merge_json_value(slot, &stored_value);

            match serde_json::from_value::<PersistedState>(candidate.clone()) {
                Ok(_) => accepted = candidate,
                Err(err) => warn!(
                    slice,
                    field,
                    error = %err,
                    "dropping unreadable persisted field"
                ),
            }
        }
    }

    serde_json::from_value(accepted).unwrap_or_else(|err| {
        warn!(error = %err, "merged state did not decode; using defaults");
        defaults.clone()
    })
}

fn keep_readable_rules(value: &Value) -> Value {
    let Some(items) = value.as_array() else {
        return value.clone();
    };
    let readable: Vec<Value> = items
        .iter()
        .filter(|item| serde_json::from_value::<CheckpointRule>((*item).clone()).is_ok())
        .cloned()
        .collect();
    if readable.len() != items.len() {
        warn!(
            dropped = items.len() - readable.len(),
            "dropping unreadable checkpoint rules"
        );
    }
    Value::Array(readable)
}

/// Builds the live state from compiled-in defaults and a stored state value.
///
/// After the merge the selected model is re-validated against the merged agent
/// mode and keys.
pub fn rehydrate(mut state: AppState, persisted: &Value) -> AppState {
    let mut merged = merge_persisted(&partialize(&state), persisted);

    let stored_rules = merged.settings.hitl_rules.len();
    merged.settings.hitl_rules = dedupe_rule_ids(merged.settings.hitl_rules);
    if merged.settings.hitl_rules.len() != stored_rules {
        warn!(
            dropped = stored_rules - merged.settings.hitl_rules.len(),
            "dropping stored checkpoint rules with duplicate ids"
        );
    }
    merged.apply_to(&mut state);

    let settings = &mut state.settings;
    let resolved = find_best_matching_model(
        settings.selected_model,
        settings.agent_mode,
        &settings.openai_key,
        &settings.anthropic_key,
        &settings.gemini_key,
    );
    if resolved != settings.selected_model {
        match settings.selected_model {
            Some(stale) => warn!(
                stale = %stale,
                resolved = ?resolved.map(SupportedModel::id),
                "stored model is no longer usable; replacing it"
            ),
            None => debug!(resolved = ?resolved.map(SupportedModel::id), "selected a model"),
        }
        settings.selected_model = resolved;
    }
    state
}

/// Reads and decodes the stored envelope under `key`.
///
/// Absent, unreadable and undecodable values all come back as `None`.
pub fn load_envelope<S: KeyValueStorage + ?Sized>(storage: &S, key: &str) -> Option<PersistedEnvelope> {
    let raw = match storage.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(err) => {
            warn!(key, error = %err, "could not read stored app state; starting from defaults");
            return None;
        }
    };
    match serde_json::from_str::<PersistedEnvelope>(&raw) {
        Ok(envelope) => {
            if envelope.version > PERSIST_VERSION {
                warn!(
                    key,
                    version = envelope.version,
                    "stored app state is from a newer version; reading what is understood"
                );
            }
            Some(envelope)
        }
        Err(err) => {
            warn!(key, error = %err, "stored app state is malformed; starting from defaults");
            None
        }
    }
}

/// Durable string key-value storage.
pub trait KeyValueStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: HashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    pub fn entry(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One JSON file per key inside a directory.
#[derive(Debug)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn open(dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File for `key`. Bytes outside `[A-Za-z0-9._-]` are written as `%XX`,
    /// so distinct keys never share a file and none escape the directory.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let mut file_stem = String::with_capacity(key.len());
        for byte in key.bytes() {
            if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.') {
                file_stem.push(char::from(byte));
            } else {
                file_stem.push_str(&format!("%{byte:02X}"));
            }
        }
        self.dir.join(format!("{file_stem}.json"))
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path)?))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        write_replacing(self.path_for(key).as_path(), value)?;
        Ok(())
    }
}

// Write to a sibling temp file, then rename over the target. The temp file
// is removed again if any step fails.
fn write_replacing(path: &Path, contents: &str) -> std::io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    let written = write_owner_only(&tmp, contents).and_then(|()| fs::rename(&tmp, path));
    if written.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    written
}

fn write_owner_only(path: &Path, contents: &str) -> std::io::Result<()> {
    let mut opts = OpenOptions::new();
    opts.create(true).write(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }
    opts.open(path)?.write_all(contents.as_bytes())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn merge_recurses_into_objects_and_replaces_arrays() {
        let mut base = json!({
            "a": { "keep": 1, "list": [1, 2, 3], "nested": { "list": ["x", "y"] } },
            "b": "default",
        });
        let overlay = json!({
            "a": { "list": [9], "nested": { "list": [] }, "extra": true },
            "b": null,
        });

        merge_json_value(&mut base, &overlay);

        assert_eq!(
            base,
            json!({
                "a": { "keep": 1, "list": [9], "nested": { "list": [] }, "extra": true },
                "b": null,
            })
        );
    }

    fn json_tree() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "[a-z]{0,4}".prop_map(Value::from),
        ];
        leaf.prop_recursive(3, 32, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-c]{1,2}", inner, 0..4)
                    .prop_map(|entries| Value::Object(entries.into_iter().collect())),
            ]
        })
    }

    /// Overlay values win at every leaf and array; base keys the overlay does
    /// not mention survive.
    fn merged_as_expected(base: &Value, overlay: &Value, merged: &Value) -> bool {
        let (Value::Object(base_obj), Value::Object(overlay_obj)) = (base, overlay) else {
            return merged == overlay;
        };
        let Some(merged_obj) = merged.as_object() else {
            return false;
        };
        let overlaid = overlay_obj.iter().all(|(key, overlay_value)| {
            match (base_obj.get(key), merged_obj.get(key)) {
                (Some(base_value), Some(merged_value)) => {
                    merged_as_expected(base_value, overlay_value, merged_value)
                }
                (None, Some(merged_value)) => merged_value == overlay_value,
                (_, None) => false,
            }
        });
        let kept = base_obj
            .iter()
            .filter(|(key, _)| !overlay_obj.contains_key(*key))
            .all(|(key, base_value)| merged_obj.get(key) == Some(base_value));
        let added = overlay_obj
            .keys()
            .filter(|key| !base_obj.contains_key(*key))
            .count();
        overlaid && kept && merged_obj.len() == base_obj.len() + added
    }

    proptest! {
        #[test]
        fn merge_replaces_arrays_and_keeps_unmentioned_keys(
            base in json_tree(),
            overlay in json_tree(),
        ) {
            let mut merged = base.clone();
            merge_json_value(&mut merged, &overlay);
            prop_assert!(merged_as_expected(&base, &overlay, &merged));

            let once = merged.clone();
            merge_json_value(&mut merged, &overlay);
            prop_assert_eq!(merged, once);
        }
    }

    #[test]
    fn partialized_subset_has_exactly_the_persisted_fields() {
        let encoded = serde_json::to_value(partialize(&AppState::default())).expect("encode");
        let object = encoded.as_object().expect("object");
        let mut slices: Vec<&str> = object.keys().map(String::as_str).collect();
        slices.sort_unstable();
        assert_eq!(slices, vec!["settings", "ui"]);

        for &(slice, fields) in PERSISTED_FIELDS {
            let mut stored: Vec<&str> = object[slice]
                .as_object()
                .expect("slice object")
                .keys()
                .map(String::as_str)
                .collect();
            stored.sort_unstable();
            let mut expected = fields.to_vec();
            expected.sort_unstable();
            assert_eq!(stored, expected);
        }
    }

    #[test]
    fn unreadable_field_keeps_default_while_siblings_load() {
        let stored = json!({
            "settings": {
                "anthropicKey": "ant-key",
                "voiceMode": "loud",
                "selectedModel": "modelX",
                "agentMode": "TextOnly",
            },
            "currentTask": { "status": "running" },
        });

        let merged = merge_persisted(&PersistedState::default(), &stored);

        assert_eq!(merged.settings.anthropic_key, "ant-key");
        assert_eq!(merged.settings.agent_mode, AgentMode::TextOnly);
        assert!(!merged.settings.voice_mode);
        assert_eq!(merged.settings.selected_model, None);
    }

    #[test]
    fn unreadable_rules_are_dropped_one_by_one() {
        let stored = json!({
            "settings": {
                "hitlRules": [
                    { "id": "r1", "action": "delete-file" },
                    { "action": "missing-id" },
                    { "id": "r2", "action": "send-email", "target": "mail.example.com" },
                ],
            },
        });

        let merged = merge_persisted(&PersistedState::default(), &stored);
        let ids: Vec<&str> = merged
            .settings
            .hitl_rules
            .iter()
            .map(|rule| rule.id().as_str())
            .collect();
        assert_eq!(ids, vec!["r1", "r2"]);
    }

    #[test]
    fn non_object_state_falls_back_to_defaults() {
        let defaults = PersistedState::default();
        assert_eq!(merge_persisted(&defaults, &json!([1, 2])), defaults);
        assert_eq!(merge_persisted(&defaults, &json!({ "settings": 7 })), defaults);
    }

    #[test]
    fn stale_model_is_resolved_after_merge() {
        let stored = json!({
            "settings": {
                "selectedModel": "gpt-4o",
                "openAIKey": "",
                "anthropicKey": "key",
            },
        });
        let state = rehydrate(AppState::default(), &stored);
        assert_eq!(state.settings.selected_model, Some(SupportedModel::Claude35Sonnet));
    }

    #[test]
    fn envelope_reads_the_legacy_layout() {
        let storage = MemoryStorage::new().with_entry(
            STORAGE_KEY,
            r#"{"state":{"ui":{"instructions":"hi"}},"version":0}"#,
        );
        let envelope = load_envelope(&storage, STORAGE_KEY).expect("envelope");
        assert_eq!(envelope.seq, 0);
        assert_eq!(envelope.state, json!({ "ui": { "instructions": "hi" } }));
    }

    #[test]
    fn malformed_envelope_is_ignored() {
        let storage = MemoryStorage::new().with_entry(STORAGE_KEY, "{not json");
        assert_eq!(load_envelope(&storage, STORAGE_KEY), None);
        assert_eq!(load_envelope(&MemoryStorage::new(), STORAGE_KEY), None);
    }

    #[test]
    fn file_storage_replaces_values() {
        let dir = tempdir().expect("tmpdir");
        let mut storage = FileStorage::open(dir.path().join("state")).expect("open");

        assert_eq!(storage.get(STORAGE_KEY).expect("get"), None);
        storage.set(STORAGE_KEY, "first").expect("set");
        storage.set(STORAGE_KEY, "second").expect("set");

        assert_eq!(storage.get(STORAGE_KEY).expect("get").as_deref(), Some("second"));
        assert!(!storage.path_for(STORAGE_KEY).with_extension("json.tmp").exists());
    }

    #[test]
    fn file_storage_keeps_keys_inside_its_directory() {
        let dir = tempdir().expect("tmpdir");
        let storage = FileStorage::open(dir.path()).expect("open");
        let path = storage.path_for("../escape/key");
        assert_eq!(path.parent(), Some(dir.path()));
    }

    #[test]
    fn distinct_keys_get_distinct_files() {
        let dir = tempdir().expect("tmpdir");
        let mut storage = FileStorage::open(dir.path()).expect("open");
        assert_ne!(storage.path_for("a/b"), storage.path_for("a_b"));
        assert_ne!(storage.path_for("a%2Fb"), storage.path_for("a/b"));
        assert_eq!(storage.path_for(STORAGE_KEY), dir.path().join("app-state.json"));

        storage.set("a/b", "slash").expect("set");
        storage.set("a_b", "underscore").expect("set");
        assert_eq!(storage.get("a/b").expect("get").as_deref(), Some("slash"));
        assert_eq!(storage.get("a_b").expect("get").as_deref(), Some("underscore"));
    }

    #[test]
    fn failed_write_leaves_no_temp_file() {
        let dir = tempdir().expect("tmpdir");
        let mut storage = FileStorage::open(dir.path()).expect("open");
        let target = storage.path_for(STORAGE_KEY);
        fs::create_dir(&target).expect("block the target with a directory");

        assert!(storage.set(STORAGE_KEY, "{}").is_err());
        assert!(!target.with_extension("json.tmp").exists());
    }

    #[cfg(unix)]
    #[test]
    fn file_storage_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().expect("tmpdir");
        let mut storage = FileStorage::open(dir.path()).expect("open");
        storage.set(STORAGE_KEY, "{}").expect("set");
        let mode = std::fs::metadata(storage.path_for(STORAGE_KEY))
            .expect("metadata")
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
