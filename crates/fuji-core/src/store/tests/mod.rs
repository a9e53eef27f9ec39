use std::cell::RefCell;
use std::rc::Rc;

use serde_json::json;
use serde_json::Value;

pub(super) use super::AppStore;
pub(super) use crate::actions::SettingsCommand;
pub(super) use crate::actions::SettingsPatch;
pub(super) use crate::actions::StoreAction;
pub(super) use crate::actions::TaskCommand;
pub(super) use crate::error::StorageError;
pub(super) use crate::models::AgentMode;
pub(super) use crate::models::Provider;
pub(super) use crate::models::SupportedModel;
pub(super) use crate::persistence::KeyValueStorage;
pub(super) use crate::persistence::MemoryStorage;
pub(super) use crate::persistence::PersistedEnvelope;
pub(super) use crate::persistence::STORAGE_KEY;
pub(super) use crate::rules::RuleDraft;
pub(super) use crate::rules::RuleId;
pub(super) use crate::rules::SaveMode;
pub(super) use crate::state::AppState;
pub(super) use crate::state::HitlDecision;
pub(super) use crate::state::HostKnowledge;


fn store_with(stored: Value) -> AppStore<MemoryStorage> {
    let envelope = json!({ "state": stored, "version": 0 });
    AppStore::open(MemoryStorage::new().with_entry(STORAGE_KEY, envelope.to_string()))
}

fn empty_store() -> AppStore<MemoryStorage> {
    AppStore::open(MemoryStorage::new())
}

fn stored_envelope(store: &AppStore<MemoryStorage>) -> PersistedEnvelope {
    let raw = store
        .storage()
        .entry(STORAGE_KEY)
        .expect("stored app state");
    serde_json::from_str(raw).expect("decode envelope")
}

/// Storage whose reads and writes can be made to fail.
#[derive(Debug, Default)]
struct FlakyStorage {
    inner: MemoryStorage,
    fail_reads: bool,
    fail_writes: bool,
    writes: Rc<RefCell<Vec<u64>>>,
}

impl KeyValueStorage for FlakyStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        if self.fail_reads {
            return Err(StorageError::Io(std::io::Error::other("storage disabled")));
        }
        self.inner.get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::Io(std::io::Error::other("quota exceeded")));
        }
        let envelope: PersistedEnvelope = serde_json::from_str(value)?;
        self.writes.borrow_mut().push(envelope.seq);
        self.inner.set(key, value)
    }
}
