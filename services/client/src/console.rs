//! Line-oriented terminal front end: what the user types, what gets printed.

use serde_json::Value;
use shoplive_core::SessionEvent;
use shoplive_core::envelope::is_truthy;
use std::path::PathBuf;

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Message(String),
    /// `/audio` or `/text`.
    SetAudio(bool),
    /// `/image <product id>`.
    GenerateImage(String),
    /// `/upload <path to jpeg>`.
    Upload(PathBuf),
    /// `/location <json>`, e.g. `/location {"lat": 37.77, "lng": -122.42}`.
    SetLocation(Value),
    Quit,
    Empty,
}

pub fn parse_line(line: &str) -> ConsoleCommand {
    let line = line.trim();
    if line.is_empty() {
        return ConsoleCommand::Empty;
    }
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };
    match head {
        "/audio" => ConsoleCommand::SetAudio(true),
        "/text" => ConsoleCommand::SetAudio(false),
        "/quit" | "/exit" => ConsoleCommand::Quit,
        "/image" if !rest.is_empty() => ConsoleCommand::GenerateImage(rest.to_string()),
        "/upload" if !rest.is_empty() => ConsoleCommand::Upload(PathBuf::from(rest)),
        "/location" => match serde_json::from_str::<Value>(rest) {
            Ok(location) => ConsoleCommand::SetLocation(location),
            Err(_) => ConsoleCommand::Message(line.to_string()),
        },
        _ => ConsoleCommand::Message(line.to_string()),
    }
}

/// The line to print for an event, if it is worth showing.
pub fn render_event(event: &SessionEvent) -> Option<String> {
    match event {
        SessionEvent::Open => Some("[connected]".to_string()),
        SessionEvent::Close => Some("[disconnected]".to_string()),
        SessionEvent::AgentMessage(text) => Some(format!("agent: {}", text_of(text))),
        SessionEvent::AgentMessageInterrupted => Some("[agent interrupted]".to_string()),
        SessionEvent::UserMessage(text) => Some(format!("you: {}", text_of(text))),
        SessionEvent::ImageUploaded => Some("[image uploaded]".to_string()),
        SessionEvent::PresentItems(items) => Some(match items.as_array() {
            Some(items) => format!("[items] {} products", items.len()),
            None => format!("[items] {}", items),
        }),
        SessionEvent::ShowQueryMsg(query) => {
            let text = query
                .get("user_intent")
                .map(text_of)
                .unwrap_or_else(|| text_of(query));
            Some(format!("[searching] {}", text))
        }
        SessionEvent::SetSessionId(id) => Some(format!("[session {}]", text_of(id))),
        SessionEvent::ShowSpinner(on) if is_truthy(on) => Some("[working...]".to_string()),
        _ => None,
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
