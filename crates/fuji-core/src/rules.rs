//! Human-in-the-loop checkpoint rules.
//!
//! A rule names an action the agent must not take without asking first. The
//! store only cares about the rule id; the condition fields are carried as-is
//! for whatever matches them against live agent actions.

use std::collections::HashSet;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(String);

impl RuleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Rule content as supplied by the editor: everything except the id.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RuleDraft {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl RuleDraft {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            target: None,
            description: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRule {
    id: RuleId,
    #[serde(flatten)]
    draft: RuleDraft,
}

impl CheckpointRule {
    pub fn id(&self) -> &RuleId {
        &self.id
    }

    pub fn draft(&self) -> &RuleDraft {
        &self.draft
    }

    pub fn action(&self) -> &str {
        &self.draft.action
    }

    pub fn target(&self) -> Option<&str> {
        self.draft.target.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.draft.description.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveMode {
    Create,
    Edit(RuleId),
}

/// Returns the collection with `draft` saved according to `mode`.
///
/// Edit replaces the content of the rule carrying that id in place; an unknown
/// id leaves the collection as it was. Create appends a rule with a fresh id.
pub fn save_rule(rules: &[CheckpointRule], mode: &SaveMode, draft: RuleDraft) -> Vec<CheckpointRule> {
    save_rule_with(rules, mode, draft, RuleId::generate)
}

/// [`save_rule`] with a caller-supplied id source. Ids already present in the
/// collection are skipped, so the source must eventually yield an unused one.
pub fn save_rule_with(
    rules: &[CheckpointRule],
    mode: &SaveMode,
    draft: RuleDraft,
    mut next_id: impl FnMut() -> RuleId,
) -> Vec<CheckpointRule> {
    match mode {
        SaveMode::Edit(target) => rules
            .iter()
            .map(|rule| {
                if &rule.id == target {
                    CheckpointRule {
                        id: rule.id.clone(),
                        draft: draft.clone(),
                    }
                } else {
                    rule.clone()
                }
            })
            .collect(),
        SaveMode::Create => {
            let id = loop {
                let candidate = next_id();
                if !rules.iter().any(|rule| rule.id == candidate) {
                    break candidate;
                }
            };
            let mut next = Vec::with_capacity(rules.len() + 1);
            next.extend_from_slice(rules);
            next.push(CheckpointRule { id, draft });
            next
        }
    }
}

pub fn delete_rule(rules: &[CheckpointRule], id: &RuleId) -> Vec<CheckpointRule> {
    rules.iter().filter(|rule| &rule.id != id).cloned().collect()
}

pub fn find_rule<'a>(rules: &'a [CheckpointRule], id: &RuleId) -> Option<&'a CheckpointRule> {
    rules.iter().find(|rule| &rule.id == id)
}

/// Keeps the first rule for every id and drops later duplicates.
pub fn dedupe_rule_ids(rules: Vec<CheckpointRule>) -> Vec<CheckpointRule> {
    let mut seen = HashSet::new();
    rules
        .into_iter()
        .filter(|rule| seen.insert(rule.id.clone()))
        .collect()
}
