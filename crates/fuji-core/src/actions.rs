use super::models::AgentMode;
use super::models::Provider;
use super::models::SupportedModel;
use super::rules::CheckpointRule;
use super::rules::RuleId;
use super::state::CustomKnowledgeBase;
use super::state::HitlDecision;
use super::state::TaskStatus;

/// A mutation addressed to exactly one slice.
#[derive(Debug, Clone)]
pub enum StoreAction {
    CurrentTask(TaskCommand),
    Ui(UiCommand),
    Settings(SettingsCommand),
    Hitl(HitlCommand),
}

impl StoreAction {
    /// Short name for logs. Never includes payloads, which may carry keys.
    pub fn label(&self) -> &'static str {
        match self {
            Self::CurrentTask(cmd) => cmd.label(),
            Self::Ui(cmd) => cmd.label(),
            Self::Settings(cmd) => cmd.label(),
            Self::Hitl(cmd) => cmd.label(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum TaskCommand {
    Start { task_id: String, instructions: String },
    SetStatus(TaskStatus),
    Interrupt,
    ClearHistory,
}

impl TaskCommand {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Start { .. } => "task.start",
            Self::SetStatus(_) => "task.set-status",
            Self::Interrupt => "task.interrupt",
            Self::ClearHistory => "task.clear-history",
        }
    }
}

#[derive(Debug, Clone)]
pub enum UiCommand {
    SetInstructions(Option<String>),
    SetSettingsOpen(bool),
}

impl UiCommand {
    pub fn label(&self) -> &'static str {
        match self {
            Self::SetInstructions(_) => "ui.set-instructions",
            Self::SetSettingsOpen(_) => "ui.set-settings-open",
        }
    }
}

#[derive(Debug, Clone)]
pub enum SettingsCommand {
    SetApiKey { provider: Provider, key: String },
    SetOpenAiBaseUrl(Option<String>),
    SetAnthropicBaseUrl(Option<String>),
    SetAgentMode(AgentMode),
    SetSelectedModel(Option<SupportedModel>),
    SetVoiceMode(bool),
    SetCustomKnowledgeBase(CustomKnowledgeBase),
    ReplaceHitlRules(Vec<CheckpointRule>),
    SetDebugMode(bool),
}

impl SettingsCommand {
    pub fn label(&self) -> &'static str {
        match self {
            Self::SetApiKey { .. } => "settings.set-api-key",
            Self::SetOpenAiBaseUrl(_) => "settings.set-openai-base-url",
            Self::SetAnthropicBaseUrl(_) => "settings.set-anthropic-base-url",
            Self::SetAgentMode(_) => "settings.set-agent-mode",
            Self::SetSelectedModel(_) => "settings.set-selected-model",
            Self::SetVoiceMode(_) => "settings.set-voice-mode",
            Self::SetCustomKnowledgeBase(_) => "settings.set-custom-knowledge-base",
            Self::ReplaceHitlRules(_) => "settings.replace-hitl-rules",
            Self::SetDebugMode(_) => "settings.set-debug-mode",
        }
    }
}

#[derive(Debug, Clone)]
pub enum HitlCommand {
    RequestApproval { rule_id: RuleId, preview: String },
    Resolve(HitlDecision),
    Reset,
}

impl HitlCommand {
    pub fn label(&self) -> &'static str {
        match self {
            Self::RequestApproval { .. } => "hitl.request-approval",
            Self::Resolve(_) => "hitl.resolve",
            Self::Reset => "hitl.reset",
        }
    }
}

/// Partial settings update. Unset fields are left alone.
///
/// Base URLs are doubly optional: `Some(None)` clears the override.
#[derive(Debug, Clone, Default)]
pub struct SettingsPatch {
    pub openai_key: Option<String>,
    pub anthropic_key: Option<String>,
    pub gemini_key: Option<String>,
    pub openai_base_url: Option<Option<String>>,
    pub anthropic_base_url: Option<Option<String>>,
    pub agent_mode: Option<AgentMode>,
    pub selected_model: Option<Option<SupportedModel>>,
    pub voice_mode: Option<bool>,
    pub custom_knowledge_base: Option<CustomKnowledgeBase>,
    pub hitl_rules: Option<Vec<CheckpointRule>>,
    pub debug_mode: Option<bool>,
}

impl SettingsPatch {
    /// Expands the patch into commands, in field declaration order.
    pub fn into_commands(self) -> Vec<SettingsCommand> {
        let keys = [
            (Provider::OpenAi, self.openai_key),
            (Provider::Anthropic, self.anthropic_key),
            (Provider::Gemini, self.gemini_key),
        ];
        let mut commands: Vec<SettingsCommand> = keys
            .into_iter()
            .filter_map(|(provider, key)| key.map(|key| SettingsCommand::SetApiKey { provider, key }))
            .collect();
        commands.extend(self.openai_base_url.map(SettingsCommand::SetOpenAiBaseUrl));
        commands.extend(self.anthropic_base_url.map(SettingsCommand::SetAnthropicBaseUrl));
        commands.extend(self.agent_mode.map(SettingsCommand::SetAgentMode));
        commands.extend(self.selected_model.map(SettingsCommand::SetSelectedModel));
        commands.extend(self.voice_mode.map(SettingsCommand::SetVoiceMode));
        commands.extend(
            self.custom_knowledge_base
                .map(SettingsCommand::SetCustomKnowledgeBase),
        );
        commands.extend(self.hitl_rules.map(SettingsCommand::ReplaceHitlRules));
        commands.extend(self.debug_mode.map(SettingsCommand::SetDebugMode));
        commands
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn empty_patch_expands_to_nothing() {
        assert!(SettingsPatch::default().into_commands().is_empty());
    }

    #[test]
    fn patch_expands_in_field_order() {
        let patch = SettingsPatch {
            gemini_key: Some("gm".to_string()),
            openai_key: Some("oa".to_string()),
            anthropic_base_url: Some(None),
            voice_mode: Some(true),
            ..SettingsPatch::default()
        };
        let labels: Vec<&'static str> = patch
            .into_commands()
            .iter()
            .map(SettingsCommand::label)
            .collect();
        assert_eq!(
            labels,
            vec![
                "settings.set-api-key",
                "settings.set-api-key",
                "settings.set-anthropic-base-url",
                "settings.set-voice-mode",
            ]
        );
    }

    #[test]
    fn action_labels_do_not_leak_payloads() {
        let action = StoreAction::Settings(SettingsCommand::SetApiKey {
            provider: Provider::OpenAi,
            key: "sk-secret".to_string(),
        });
        assert!(!action.label().contains("sk-secret"));
    }
}
