use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use super::models::AgentMode;
use super::models::SupportedModel;
use super::rules::CheckpointRule;
use super::rules::RuleId;

pub const TASK_HISTORY_CAP: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    #[default]
    Idle,
    Running,
    Success,
    Error,
    Interrupted,
}

impl TaskStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Success => "success",
            Self::Error => "error",
            Self::Interrupted => "interrupted",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Error | Self::Interrupted)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskHistoryEntry {
    pub task_id: String,
    pub status: TaskStatus,
    pub ts_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentTaskState {
    pub task_id: Option<String>,
    pub instructions: Option<String>,
    pub status: TaskStatus,
    pub history: VecDeque<TaskHistoryEntry>,
}

impl Default for CurrentTaskState {
    fn default() -> Self {
        Self {
            task_id: None,
            instructions: None,
            status: TaskStatus::Idle,
            history: VecDeque::with_capacity(TASK_HISTORY_CAP),
        }
    }
}

impl CurrentTaskState {
    pub fn record(&mut self, entry: TaskHistoryEntry) {
        if self.history.len() == TASK_HISTORY_CAP {
            self.history.pop_front();
        }
        self.history.push_back(entry);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UiState {
    pub instructions: Option<String>,
    pub is_settings_open: bool,
}

/// Free-form notes the agent is given when it works on a particular host.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostKnowledge {
    pub notes: Vec<String>,
}

pub type CustomKnowledgeBase = BTreeMap<String, HostKnowledge>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsState {
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
    pub debug_mode: bool,
}

impl Default for SettingsState {
    fn default() -> Self {
        Self {
            openai_key: String::new(),
            anthropic_key: String::new(),
            gemini_key: String::new(),
            openai_base_url: None,
            anthropic_base_url: None,
            agent_mode: AgentMode::default(),
            selected_model: None,
            voice_mode: false,
            custom_knowledge_base: CustomKnowledgeBase::new(),
            hitl_rules: Vec::new(),
            debug_mode: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum HitlDecision {
    Approved,
    Rejected,
}

impl HitlDecision {
    pub fn label(self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovalRequest {
    pub sequence: u64,
    pub rule_id: RuleId,
    pub preview: Arc<str>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HitlDecisionRecord {
    pub request: ApprovalRequest,
    pub decision: HitlDecision,
    pub decided_at_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum HitlStatus {
    #[default]
    Idle,
    AwaitingApproval {
        request: ApprovalRequest,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HitlState {
    pub status: HitlStatus,
    pub last_decision: Option<HitlDecisionRecord>,
    pub next_request_seq: u64,
}

impl Default for HitlState {
    fn default() -> Self {
        Self {
            status: HitlStatus::Idle,
            last_decision: None,
            next_request_seq: 1,
        }
    }
}

impl HitlState {
    pub fn pending(&self) -> Option<&ApprovalRequest> {
        match &self.status {
            HitlStatus::AwaitingApproval { request } => Some(request),
            HitlStatus::Idle => None,
        }
    }
}

/// The whole application state tree. Each field is owned by one slice.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    pub current_task: CurrentTaskState,
    pub ui: UiState,
    pub settings: SettingsState,
    pub hitl: HitlState,
}
