mod config;
mod logging;

use std::env;
use std::io;
use std::io::Write;

use fuji_core::find_best_matching_model;
use fuji_core::AgentMode;
use fuji_core::AppStore;
use fuji_core::FileStorage;
use fuji_core::KeyValueStorage;
use fuji_core::RuleDraft;
use fuji_core::RuleId;
use fuji_core::SaveMode;
use fuji_core::SettingsPatch;
use fuji_core::SupportedModel;
use tracing::debug;
use tracing::warn;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> CliResult<()> {
    let mut args = env::args().skip(1);
    let Some(command) = args.next() else {
        print_help();
        return Ok(());
    };

    match command.as_str() {
        "--help" | "-h" | "help" => {
            print_help();
            Ok(())
        }
        "--version" | "-V" | "version" => {
            println!("fuji {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "state" | "rules" | "settings" | "instructions" | "models" => {
            let config_path = config::config_path();
            let loaded = config::load(config_path.as_deref());
            let filter = loaded
                .as_ref()
                .map(|config| config.log.filter.clone())
                .unwrap_or_else(|_| "warn".to_string());
            logging::init(&filter);
            let config = loaded.unwrap_or_else(|err| {
                warn!(error = %err, "falling back to default config");
                fuji_core::config::Config::default()
            });

            let data_dir = config::data_dir(&config);
            debug!(data_dir = %data_dir.display(), "opening app state storage");
            let storage = FileStorage::open(&data_dir)?;
            let mut store = AppStore::open_with_key(storage, config.storage.namespace);

            let rest: Vec<String> = args.collect();
            let stdout = io::stdout();
            execute(&mut store, &command, &rest, &mut stdout.lock())
        }
        _ => {
            print_help();
            Err(format!("unknown command: {command}").into())
        }
    }
}

fn execute<S: KeyValueStorage>(
    store: &mut AppStore<S>,
    command: &str,
    args: &[String],
    out: &mut impl Write,
) -> CliResult<()> {
    match command {
        "state" => {
            if !args.is_empty() {
                return Err("state takes no arguments".into());
            }
            writeln!(out, "{}", serde_json::to_string_pretty(&store.debug_state())?)?;
            Ok(())
        }
        "rules" => run_rules(store, args, out),
        "settings" => run_settings(store, args, out),
        "instructions" => {
            let text = args.join(" ");
            store.set_instructions((!text.trim().is_empty()).then_some(text));
            Ok(())
        }
        "models" => print_models(store, out),
        other => Err(format!("unknown command: {other}").into()),
    }
}

fn run_rules<S: KeyValueStorage>(
    store: &mut AppStore<S>,
    args: &[String],
    out: &mut impl Write,
) -> CliResult<()> {
    let Some(sub) = args.first() else {
        return Err("rules requires a subcommand: list, add, edit, delete".into());
    };
    match sub.as_str() {
        "list" => {
            for rule in store.hitl_rules() {
                writeln!(
                    out,
                    "{}\t{}\t{}",
                    rule.id(),
                    rule.action(),
                    rule.target().unwrap_or("-")
                )?;
            }
            Ok(())
        }
        "add" => {
            let draft = parse_rule_draft(&args[1..])?;
            if let Some(id) = store.save_hitl_rule(SaveMode::Create, draft) {
                writeln!(out, "{id}")?;
            }
            Ok(())
        }
        "edit" => {
            let Some(id) = args.get(1) else {
                return Err("rules edit requires a rule id".into());
            };
            let draft = parse_rule_draft(&args[2..])?;
            match store.save_hitl_rule(SaveMode::Edit(RuleId::new(id.as_str())), draft) {
                Some(id) => {
                    writeln!(out, "{id}")?;
                    Ok(())
                }
                None => Err(format!("no rule with id {id}").into()),
            }
        }
        "delete" => {
            let Some(id) = args.get(1) else {
                return Err("rules delete requires a rule id".into());
            };
            store.delete_hitl_rule(&RuleId::new(id.as_str()));
            Ok(())
        }
        other => Err(format!("unknown rules subcommand: {other}").into()),
    }
}

fn parse_rule_draft(args: &[String]) -> CliResult<RuleDraft> {
    let mut action = None;
    let mut target = None;
    let mut description = None;
    let mut i = 0;
    while i < args.len() {
        let flag = args[i].as_str();
        let slot = match flag {
            "--action" => &mut action,
            "--target" => &mut target,
            "--description" => &mut description,
            other => {
                return Err(format!("unsupported argument: {other}").into());
            }
        };
        let Some(value) = args.get(i + 1) else {
            return Err(format!("{flag} requires a value").into());
        };
        *slot = Some(value.clone());
        i += 2;
    }

    let Some(action) = action.filter(|action| !action.trim().is_empty()) else {
        return Err("--action is required".into());
    };
    let mut draft = RuleDraft::new(action);
    if let Some(target) = target {
        draft = draft.with_target(target);
    }
    if let Some(description) = description {
        draft = draft.with_description(description);
    }
    Ok(draft)
}

fn run_settings<S: KeyValueStorage>(
    store: &mut AppStore<S>,
    args: &[String],
    out: &mut impl Write,
) -> CliResult<()> {
    match args {
        [sub, field, value] if sub == "set" => {
            let patch = parse_setting(field, value)?;
            store.update_settings(patch);
            writeln!(out, "{field} updated")?;
            Ok(())
        }
        _ => Err("usage: fuji settings set <field> <value>".into()),
    }
}

/// Empty strings and `none` clear optional fields.
fn optional(value: &str) -> Option<String> {
    match value.trim() {
        "" | "none" => None,
        trimmed => Some(trimmed.to_string()),
    }
}

fn parse_setting(field: &str, value: &str) -> CliResult<SettingsPatch> {
    let mut patch = SettingsPatch::default();
    match field {
        "openai-key" => patch.openai_key = Some(value.to_string()),
        "anthropic-key" => patch.anthropic_key = Some(value.to_string()),
        "gemini-key" => patch.gemini_key = Some(value.to_string()),
        "openai-base-url" => patch.openai_base_url = Some(optional(value)),
        "anthropic-base-url" => patch.anthropic_base_url = Some(optional(value)),
        "agent-mode" => patch.agent_mode = Some(value.parse::<AgentMode>()?),
        "model" => {
            let model = optional(value)
                .map(|id| id.parse::<SupportedModel>())
                .transpose()?;
            patch.selected_model = Some(model);
        }
        "voice-mode" => {
            let on = match value {
                "on" | "true" | "yes" | "1" => true,
                "off" | "false" | "no" | "0" => false,
                other => return Err(format!("voice-mode expects on or off, got {other}").into()),
            };
            patch.voice_mode = Some(on);
        }
        other => return Err(format!("unknown settings field: {other}").into()),
    }
    Ok(patch)
}

fn print_models<S: KeyValueStorage>(store: &AppStore<S>, out: &mut impl Write) -> CliResult<()> {
    let state = store.state();
    let settings = &state.settings;
    for model in SupportedModel::ALL {
        let marker = if settings.selected_model == Some(model) { "*" } else { " " };
        let kind = if model.has_vision() { "vision" } else { "text" };
        writeln!(out, "{marker} {}\t{}\t{kind}", model.id(), model.provider())?;
    }

    let best = find_best_matching_model(
        settings.selected_model,
        settings.agent_mode,
        &settings.openai_key,
        &settings.anthropic_key,
        &settings.gemini_key,
    );
    writeln!(out, "mode: {}", settings.agent_mode.label())?;
    writeln!(out, "resolved: {}", best.map_or("none", SupportedModel::id))?;
    Ok(())
}

fn print_help() {
    println!("fuji {}", env!("CARGO_PKG_VERSION"));
    println!("Usage:");
    println!("  fuji state");
    println!("  fuji rules list");
    println!("  fuji rules add --action ACTION [--target TARGET] [--description TEXT]");
    println!("  fuji rules edit ID --action ACTION [--target TARGET] [--description TEXT]");
    println!("  fuji rules delete ID");
    println!("  fuji settings set FIELD VALUE");
    println!("      fields: openai-key anthropic-key gemini-key openai-base-url");
    println!("              anthropic-base-url agent-mode model voice-mode");
    println!("  fuji instructions TEXT");
    println!("  fuji models");
    println!("  fuji --help");
    println!("  fuji --version");
}
