use tracing::warn;

use super::actions::HitlCommand;
use super::actions::SettingsCommand;
use super::actions::StoreAction;
use super::actions::TaskCommand;
use super::actions::UiCommand;
use super::models::Provider;
use super::rules::dedupe_rule_ids;
use super::state::AppState;
use super::state::ApprovalRequest;
use super::state::CurrentTaskState;
use super::state::HitlDecisionRecord;
use super::state::HitlState;
use super::state::HitlStatus;
use super::state::SettingsState;
use super::state::TaskHistoryEntry;
use super::state::TaskStatus;
use super::state::UiState;

/// What the store has to do after a reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEffect {
    /// Some part of the state changed; subscribers must re-run their selectors.
    Notify,
    /// A persisted field changed; the persisted subset must be written.
    Persist,
}

pub fn reduce(state: &mut AppState, action: StoreAction) -> Vec<StoreEffect> {
    match action {
        StoreAction::CurrentTask(cmd) => notify_if(reduce_task(&mut state.current_task, cmd)),
        StoreAction::Ui(cmd) => reduce_ui(&mut state.ui, cmd),
        StoreAction::Settings(cmd) => reduce_settings(&mut state.settings, cmd),
        StoreAction::Hitl(cmd) => notify_if(reduce_hitl(&mut state.hitl, cmd)),
    }
}

fn notify_if(changed: bool) -> Vec<StoreEffect> {
    if changed {
        vec![StoreEffect::Notify]
    } else {
        Vec::new()
    }
}

fn persist_if(changed: bool) -> Vec<StoreEffect> {
    if changed {
        vec![StoreEffect::Notify, StoreEffect::Persist]
    } else {
        Vec::new()
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn reduce_task(task: &mut CurrentTaskState, cmd: TaskCommand) -> bool {
    match cmd {
        TaskCommand::Start {
            task_id,
            instructions,
        } => {
            task.task_id = Some(task_id.clone());
            task.instructions = Some(instructions);
            task.status = TaskStatus::Running;
            task.record(TaskHistoryEntry {
                task_id,
                status: TaskStatus::Running,
                ts_ms: now_ms(),
            });
            true
        }
        TaskCommand::SetStatus(status) => {
            let Some(task_id) = task.task_id.clone() else {
                return false;
            };
            if !replace(&mut task.status, status) {
                return false;
            }
            if status.is_terminal() {
                task.record(TaskHistoryEntry {
                    task_id,
                    status,
                    ts_ms: now_ms(),
                });
            }
            true
        }
        TaskCommand::Interrupt => {
            if task.status != TaskStatus::Running {
                return false;
            }
            task.status = TaskStatus::Interrupted;
            if let Some(task_id) = task.task_id.clone() {
                task.record(TaskHistoryEntry {
                    task_id,
                    status: TaskStatus::Interrupted,
                    ts_ms: now_ms(),
                });
            }
            true
        }
        TaskCommand::ClearHistory => {
            if task.history.is_empty() {
                return false;
            }
            task.history.clear();
            true
        }
    }
}

fn reduce_ui(ui: &mut UiState, cmd: UiCommand) -> Vec<StoreEffect> {
    match cmd {
        UiCommand::SetInstructions(instructions) => {
            persist_if(replace(&mut ui.instructions, instructions))
        }
        UiCommand::SetSettingsOpen(open) => notify_if(replace(&mut ui.is_settings_open, open)),
    }
}

fn reduce_settings(settings: &mut SettingsState, cmd: SettingsCommand) -> Vec<StoreEffect> {
    match cmd {
        SettingsCommand::SetApiKey { provider, key } => {
            let slot = match provider {
                Provider::OpenAi => &mut settings.openai_key,
                Provider::Anthropic => &mut settings.anthropic_key,
                Provider::Gemini => &mut settings.gemini_key,
            };
            persist_if(replace(slot, key))
        }
        SettingsCommand::SetOpenAiBaseUrl(url) => {
            persist_if(replace(&mut settings.openai_base_url, url))
        }
        SettingsCommand::SetAnthropicBaseUrl(url) => {
            persist_if(replace(&mut settings.anthropic_base_url, url))
        }
        SettingsCommand::SetAgentMode(mode) => persist_if(replace(&mut settings.agent_mode, mode)),
        SettingsCommand::SetSelectedModel(model) => {
            persist_if(replace(&mut settings.selected_model, model))
        }
        SettingsCommand::SetVoiceMode(on) => persist_if(replace(&mut settings.voice_mode, on)),
        SettingsCommand::SetCustomKnowledgeBase(kb) => {
            persist_if(replace(&mut settings.custom_knowledge_base, kb))
        }
        SettingsCommand::ReplaceHitlRules(rules) => {
            let incoming = rules.len();
            let rules = dedupe_rule_ids(rules);
            if rules.len() != incoming {
                warn!(
                    dropped = incoming - rules.len(),
                    "dropping checkpoint rules with duplicate ids"
                );
            }
            persist_if(replace(&mut settings.hitl_rules, rules))
        }
        SettingsCommand::SetDebugMode(on) => notify_if(replace(&mut settings.debug_mode, on)),
    }
}

fn reduce_hitl(hitl: &mut HitlState, cmd: HitlCommand) -> bool {
    match cmd {
        HitlCommand::RequestApproval { rule_id, preview } => {
            if let Some(pending) = hitl.pending() {
                warn!(
                    pending = pending.sequence,
                    rule_id = %rule_id,
                    "ignoring approval request while another is pending"
                );
                return false;
            }
            let sequence = hitl.next_request_seq;
            hitl.next_request_seq = hitl.next_request_seq.saturating_add(1);
            hitl.status = HitlStatus::AwaitingApproval {
                request: ApprovalRequest {
                    sequence,
                    rule_id,
                    preview: preview.into(),
                },
            };
            true
        }
        HitlCommand::Resolve(decision) => {
            let HitlStatus::AwaitingApproval { request } = std::mem::take(&mut hitl.status) else {
                return false;
            };
            hitl.last_decision = Some(HitlDecisionRecord {
                request,
                decision,
                decided_at_ms: now_ms(),
            });
            true
        }
        HitlCommand::Reset => {
            let changed = hitl.pending().is_some() || hitl.last_decision.is_some();
            hitl.status = HitlStatus::Idle;
            hitl.last_decision = None;
            changed
        }
    }
}

#[cfg(test)]
mod tests;
