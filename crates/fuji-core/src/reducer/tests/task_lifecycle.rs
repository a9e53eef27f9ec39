use super::*;
use pretty_assertions::assert_eq;

fn start(state: &mut AppState, task_id: &str) {
    run(
        state,
        StoreAction::CurrentTask(TaskCommand::Start {
            task_id: task_id.to_string(),
            instructions: "fill the form".to_string(),
        }),
    );
}

#[test]
fn start_then_finish_records_history() {
    let mut state = state();
    start(&mut state, "t1");
    assert_eq!(state.current_task.status, TaskStatus::Running);

    run(
        &mut state,
        StoreAction::CurrentTask(TaskCommand::SetStatus(TaskStatus::Success)),
    );

    let statuses: Vec<TaskStatus> = state
        .current_task
        .history
        .iter()
        .map(|entry| entry.status)
        .collect();
    assert_eq!(statuses, vec![TaskStatus::Running, TaskStatus::Success]);
}

#[test]
fn status_without_task_is_ignored() {
    let mut state = state();
    let effects = run(
        &mut state,
        StoreAction::CurrentTask(TaskCommand::SetStatus(TaskStatus::Error)),
    );
    assert_unchanged(&effects);
    assert_eq!(state.current_task.status, TaskStatus::Idle);
}

#[test]
fn interrupt_only_applies_to_running_tasks() {
    let mut state = state();
    assert_unchanged(&run(&mut state, StoreAction::CurrentTask(TaskCommand::Interrupt)));

    start(&mut state, "t1");
    run(&mut state, StoreAction::CurrentTask(TaskCommand::Interrupt));
    assert_eq!(state.current_task.status, TaskStatus::Interrupted);

    assert_unchanged(&run(&mut state, StoreAction::CurrentTask(TaskCommand::Interrupt)));
}

#[test]
fn clear_history_empties_the_log() {
    let mut state = state();
    start(&mut state, "t1");
    run(&mut state, StoreAction::CurrentTask(TaskCommand::ClearHistory));
    assert!(state.current_task.history.is_empty());
    assert_eq!(state.current_task.task_id.as_deref(), Some("t1"));
}
