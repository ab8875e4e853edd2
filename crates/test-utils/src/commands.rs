use std::sync::{Arc, Mutex};

use stepwise::dag::Step;
use stepwise::exec::{sync_func, Command, FunctionCommand};

/// Shared record of which commands ran, in order.
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Snapshot of the log.
pub fn calls(log: &CallLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// A command that appends `label` to `log` and succeeds.
pub fn recording_command(log: &CallLog, label: &str) -> Command {
    let log = Arc::clone(log);
    let label = label.to_string();
    FunctionCommand::new(vec![sync_func(move || {
        log.lock().unwrap().push(label.clone());
        Ok(())
    })])
    .unwrap()
    .into()
}

/// A command that always fails with `message`.
pub fn failing_command(message: &str) -> Command {
    let message = message.to_string();
    FunctionCommand::new(vec![sync_func(move || Err(anyhow::anyhow!(message.clone())))])
        .unwrap()
        .into()
}

/// A step named `name` whose single command records `name` in `log`.
pub fn recording_step(name: &str, log: &CallLog) -> Step {
    Step::new(name, vec![recording_command(log, name)]).unwrap()
}

/// A step named `name` whose single command fails.
pub fn failing_step(name: &str) -> Step {
    Step::new(name, vec![failing_command(&format!("{name} failed"))]).unwrap()
}
