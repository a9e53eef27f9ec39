use pretty_assertions::assert_eq;

pub(super) use super::reduce;
pub(super) use super::StoreEffect;
pub(super) use crate::actions::HitlCommand;
pub(super) use crate::actions::SettingsCommand;
pub(super) use crate::actions::StoreAction;
pub(super) use crate::actions::TaskCommand;
pub(super) use crate::actions::UiCommand;
pub(super) use crate::models::AgentMode;
pub(super) use crate::models::Provider;
pub(super) use crate::models::SupportedModel;
pub(super) use crate::rules::save_rule;
pub(super) use crate::rules::RuleDraft;
pub(super) use crate::rules::RuleId;
pub(super) use crate::rules::SaveMode;
pub(super) use crate::state::AppState;
pub(super) use crate::state::HitlDecision;
pub(super) use crate::state::HitlStatus;
pub(super) use crate::state::TaskStatus;

mod task_lifecycle;

fn state() -> AppState {
    AppState::default()
}

fn run(state: &mut AppState, action: StoreAction) -> Vec<StoreEffect> {
    reduce(state, action)
}

fn run_settings(state: &mut AppState, cmd: SettingsCommand) -> Vec<StoreEffect> {
    reduce(state, StoreAction::Settings(cmd))
}

fn assert_persisted(effects: &[StoreEffect]) {
    assert_eq!(effects, &[StoreEffect::Notify, StoreEffect::Persist]);
}

fn assert_unchanged(effects: &[StoreEffect]) {
    assert!(effects.is_empty(), "expected no effects, got {effects:?}");
}
