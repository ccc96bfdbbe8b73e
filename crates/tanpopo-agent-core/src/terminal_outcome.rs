use serde_json::Value;

/// Prefix the model uses to report a failed task in the plain-text contract.
pub const ERROR_SENTINEL: &str = "ERROR:";

#[derive(Debug, Clone, PartialEq, Eq)]
/// How a text-only model turn ends the loop.
pub enum TerminalOutcome {
    Succeeded(String),
    Failed(String),
}

/// Interprets a terminal model text.
///
/// A JSON object carrying a `message` string and a boolean `failed` (or
/// `error`) flag is read as the structured contract. Anything else falls back
/// to the `ERROR:` sentinel contract.
pub fn parse_terminal_outcome(text: &str) -> TerminalOutcome {
    let trimmed = text.trim();
    if let Some(outcome) = parse_structured_outcome(trimmed) {
        return outcome;
    }

    if trimmed.starts_with(ERROR_SENTINEL) {
        TerminalOutcome::Failed(trimmed.to_string())
    } else {
        TerminalOutcome::Succeeded(trimmed.to_string())
    }
}

fn parse_structured_outcome(text: &str) -> Option<TerminalOutcome> {
    let Ok(Value::Object(object)) = serde_json::from_str::<Value>(text) else {
        return None;
    };
    let message = object.get("message")?.as_str()?.trim().to_string();
    let failed = object
        .get("failed")
        .or_else(|| object.get("error"))
        .and_then(Value::as_bool)?;
    Some(if failed {
        TerminalOutcome::Failed(message)
    } else {
        TerminalOutcome::Succeeded(message)
    })
}
