//! The application store.
//!
//! One [`AppStore`] exists per running application and is handed to whoever
//! needs it. It is rehydrated from storage exactly once, inside
//! [`AppStore::open`], and writes the persisted subset back after every
//! command that changes it. Every mutation produces a fresh [`AppState`]
//! snapshot; snapshots taken earlier through [`AppStore::state`] never change.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;
use tracing::warn;

use super::actions::HitlCommand;
use super::actions::SettingsCommand;
use super::actions::SettingsPatch;
use super::actions::StoreAction;
use super::actions::UiCommand;
use super::error::StorageError;
use super::persistence::load_envelope;
use super::persistence::partialize;
use super::persistence::rehydrate;
use super::persistence::KeyValueStorage;
use super::persistence::PersistedEnvelope;
use super::persistence::PERSIST_VERSION;
use super::persistence::STORAGE_KEY;
use super::reducer::reduce;
use super::reducer::StoreEffect;
use super::rules::delete_rule;
use super::rules::find_rule;
use super::rules::save_rule;
use super::rules::CheckpointRule;
use super::rules::RuleDraft;
use super::rules::RuleId;
use super::rules::SaveMode;
use super::state::AppState;
use super::state::HitlDecision;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: SubscriptionId,
    poll: Box<dyn FnMut(&AppState)>,
}

pub struct AppStore<S: KeyValueStorage> {
    state: Arc<AppState>,
    storage: S,
    key: String,
    seq: u64,
    subscribers: Vec<Subscriber>,
    next_subscription: u64,
}

impl<S: KeyValueStorage> AppStore<S> {
    /// Builds the store under the default `"app-state"` key.
    pub fn open(storage: S) -> Self {
        Self::open_with_key(storage, STORAGE_KEY)
    }

    pub fn open_with_key(storage: S, key: impl Into<String>) -> Self {
        let key = key.into();
        let (stored, seq) = match load_envelope(&storage, &key) {
            Some(envelope) => (envelope.state, envelope.seq),
            None => (Value::Null, 0),
        };
        let state = rehydrate(AppState::default(), &stored);
        debug!(key = %key, seq, rules = state.settings.hitl_rules.len(), "app state rehydrated");
        Self {
            state: Arc::new(state),
            storage,
            key,
            seq,
            subscribers: Vec::new(),
            next_subscription: 1,
        }
    }

    /// Current snapshot. Later mutations never alter it.
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    pub fn select<T>(&self, selector: impl FnOnce(&AppState) -> T) -> T {
        selector(&self.state)
    }

    pub fn hitl_rules(&self) -> &[CheckpointRule] {
        &self.state.settings.hitl_rules
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Sequence number of the last write (or of the value loaded at start).
    pub fn persist_seq(&self) -> u64 {
        self.seq
    }

    /// Full live state as JSON, for inspection only.
    pub fn debug_state(&self) -> Value {
        serde_json::to_value(&*self.state).unwrap_or_else(|err| {
            warn!(error = %err, "could not encode app state for debugging");
            Value::Null
        })
    }

    /// Calls `listener` with the selected projection whenever it changes.
    pub fn subscribe<T, F, L>(&mut self, selector: F, mut listener: L) -> SubscriptionId
    where
        T: PartialEq + 'static,
        F: Fn(&AppState) -> T + 'static,
        L: FnMut(&T) + 'static,
    {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription = self.next_subscription.saturating_add(1);

        let mut last = selector(&self.state);
        let poll = move |state: &AppState| {
            let next = selector(state);
            if next != last {
                listener(&next);
                last = next;
            }
        };
        self.subscribers.push(Subscriber {
            id,
            poll: Box::new(poll),
        });
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|subscriber| subscriber.id != id);
        self.subscribers.len() != before
    }

    pub fn dispatch(&mut self, action: StoreAction) {
        self.apply([action]);
    }

    /// Applies every field of `patch` as one transition: subscribers run and
    /// the persisted subset is written at most once.
    pub fn update_settings(&mut self, patch: SettingsPatch) {
        self.apply(patch.into_commands().into_iter().map(StoreAction::Settings));
    }

    fn apply(&mut self, actions: impl IntoIterator<Item = StoreAction>) {
        let state = Arc::make_mut(&mut self.state);
        let mut effects = Vec::new();
        for action in actions {
            let label = action.label();
            let step = reduce(state, action);
            debug!(action = label, effects = ?step, "dispatched");
            effects.extend(step);
        }

        if effects.contains(&StoreEffect::Persist) {
            self.persist();
        }
        if effects.contains(&StoreEffect::Notify) {
            self.notify();
        }
    }

    /// Saves a rule from the editor and returns the id it ended up with.
    ///
    /// Returns `None` when editing an id that is not in the collection.
    pub fn save_hitl_rule(&mut self, mode: SaveMode, draft: RuleDraft) -> Option<RuleId> {
        let rules = save_rule(self.hitl_rules(), &mode, draft);
        let saved = match mode {
            SaveMode::Edit(id) => find_rule(&rules, &id).map(|rule| rule.id().clone()),
            SaveMode::Create => rules.last().map(|rule| rule.id().clone()),
        };
        self.dispatch(StoreAction::Settings(SettingsCommand::ReplaceHitlRules(rules)));
        saved
    }

    pub fn delete_hitl_rule(&mut self, id: &RuleId) {
        let rules = delete_rule(self.hitl_rules(), id);
        self.dispatch(StoreAction::Settings(SettingsCommand::ReplaceHitlRules(rules)));
    }

    pub fn set_instructions(&mut self, instructions: Option<String>) {
        self.dispatch(StoreAction::Ui(UiCommand::SetInstructions(instructions)));
    }

    pub fn request_approval(&mut self, rule_id: RuleId, preview: impl Into<String>) {
        self.dispatch(StoreAction::Hitl(HitlCommand::RequestApproval {
            rule_id,
            preview: preview.into(),
        }));
    }

    pub fn resolve_approval(&mut self, decision: HitlDecision) {
        self.dispatch(StoreAction::Hitl(HitlCommand::Resolve(decision)));
    }

    fn notify(&mut self) {
        for subscriber in &mut self.subscribers {
            (subscriber.poll)(&self.state);
        }
    }

    fn persist(&mut self) {
        let seq = self.seq.saturating_add(1);
        match self.write_snapshot(seq) {
            Ok(()) => {
                self.seq = seq;
                debug!(key = %self.key, seq, "app state persisted");
            }
            Err(err) => {
                warn!(key = %self.key, seq, error = %err, "persisting app state failed; keeping it in memory");
            }
        }
    }

    fn write_snapshot(&mut self, seq: u64) -> Result<(), StorageError> {
        let envelope = PersistedEnvelope {
            version: PERSIST_VERSION,
            seq,
            state: serde_json::to_value(partialize(&self.state))?,
        };
        let raw = serde_json::to_string(&envelope)?;
        self.storage.set(&self.key, &raw)
    }
}

#[cfg(test)]
mod tests;
