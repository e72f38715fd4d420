//! Built-in message tables for the `loc` compartment.

use std::collections::BTreeMap;

use crate::error::{OrchestraError, Result};
use crate::shared::Value;

pub const SUPPORTED_LANGUAGES: [&str; 2] = ["en", "de"];

const EN: &[(&str, &str, &str)] = &[
    ("orchestrator", "interrupt_prompt", "Run paused after a {level} record. Type '{yes}' to quit, anything else to resume: "),
    ("orchestrator", "yes_quit", "y"),
    ("orchestrator", "exit_summary", "Run finished after {duration}: {total} events ({levels})"),
    ("orchestrator", "worker_lost", "Worker {slot} was lost while running task {task}"),
    ("orchestrator", "task_dropped", "Task '{callable}' dropped after {retries} recoveries"),
    ("worker", "task_failed", "Task '{callable}' failed: {reason}"),
    ("log", "sink_failure", "SEVERE: log sink failure ({sink}): {reason}"),
];

const DE: &[(&str, &str, &str)] = &[
    ("orchestrator", "interrupt_prompt", "Lauf nach einem {level}-Eintrag angehalten. '{yes}' zum Beenden, sonst weiter: "),
    ("orchestrator", "yes_quit", "j"),
    ("orchestrator", "exit_summary", "Lauf nach {duration} beendet: {total} Ereignisse ({levels})"),
    ("orchestrator", "worker_lost", "Worker {slot} ging bei Aufgabe {task} verloren"),
    ("orchestrator", "task_dropped", "Aufgabe '{callable}' nach {retries} Wiederholungen verworfen"),
    ("worker", "task_failed", "Aufgabe '{callable}' fehlgeschlagen: {reason}"),
    ("log", "sink_failure", "SCHWER: Fehler im Log-Ziel ({sink}): {reason}"),
];

/// Table for `language` as `{subsystem: {key: text}}`
pub fn table(language: &str) -> Result<BTreeMap<String, Value>> {
    let entries = match language.trim().to_ascii_lowercase().as_str() {
        "en" => EN,
        "de" => DE,
        other => {
            return Err(OrchestraError::init(
                "localization",
                format!(
                    "unknown language '{other}', expected one of {}",
                    SUPPORTED_LANGUAGES.join(", ")
                ),
            ))
        }
    };

    let mut subsystems: BTreeMap<String, BTreeMap<String, Value>> = BTreeMap::new();
    for (subsystem, key, text) in entries {
        subsystems
            .entry(subsystem.to_string())
            .or_default()
            .insert(key.to_string(), Value::from(*text));
    }
    Ok(subsystems
        .into_iter()
        .map(|(name, keys)| (name, Value::Map(keys)))
        .collect())
}

/// Substitute `{name}` placeholders
pub fn render(template: &str, args: &[(&str, String)]) -> String {
    args.iter().fold(template.to_string(), |text, (name, value)| {
        text.replace(&format!("{{{name}}}"), value)
    })
}
