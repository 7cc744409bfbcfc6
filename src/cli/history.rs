//! History commands: list, show, pick and context export

use anyhow::{Context, Result};
use serde::Serialize;

use crate::selection::Selection;
use crate::store::{ChatHistoryEntry, HistoryQuery, HistoryStore, DEFAULT_ROLE};

const PROBLEM_PREVIEW_CHARS: usize = 50;

pub fn list(
    store: &HistoryStore,
    role: Option<String>,
    limit: usize,
    oldest_first: bool,
    json: bool,
) -> Result<()> {
    let mut query = HistoryQuery::default().limit(limit);
    if let Some(role) = role {
        query = query.role(role);
    }
    if !oldest_first {
        query = query.newest_first();
    }

    let history = store.get_history(query);
    let entries = history.iter().collect::<Result<Vec<_>, _>>()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        println!("{}", format_history_list(&entries));
    }
    Ok(())
}

pub fn show(store: &HistoryStore, id: i64, json: bool) -> Result<()> {
    let entry = store
        .get_entry(id)?
        .ok_or_else(|| anyhow::anyhow!("Entry not found: {}", id))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
        return Ok(());
    }

    println!("{}", "=".repeat(80));
    println!(
        "Entry {} [{}] ({})",
        entry.id,
        entry.role,
        entry
            .timestamp
            .map(|ts| ts.to_rfc3339())
            .unwrap_or_else(|| "?".to_string())
    );
    println!("{}", "=".repeat(80));
    println!("\n[PROBLEM]\n{}", entry.problem);
    if let Some(answer) = &entry.answer {
        println!("\n[ANSWER]\n{}", answer);
    }
    if let Some(output) = &entry.output {
        println!("\n[OUTPUT]\n{}", output);
    }
    Ok(())
}

pub fn pick(store: &HistoryStore, selection: &str) -> Result<()> {
    let selection: Selection = selection.parse()?;
    let entries = store.select(&selection)?;

    if entries.is_empty() {
        println!("No entries match selection '{}'.", selection);
        return Ok(());
    }

    // Listing reads newest first, selections resolve oldest first
    let newest_first: Vec<ChatHistoryEntry> = entries.into_iter().rev().collect();
    println!("{}", format_history_list(&newest_first));
    Ok(())
}

/// Print the JSON context list for a selection, or for the active session
/// when no selection is given.
pub fn context(store: &HistoryStore, selection: Option<String>, ask: Option<String>) -> Result<()> {
    let entries = match selection {
        Some(raw) => {
            let selection: Selection = raw.parse()?;
            store.select(&selection)?
        }
        None => {
            let session = store.active_session()?.context(
                "No active session; start one with 'chatlog session start' or pass a selection",
            )?;
            store.get_session_messages(session.id)?
        }
    };

    let params = context_params(&entries, ask.as_deref());
    println!("{}", serde_json::to_string(&params)?);
    Ok(())
}

/// One prior exchange handed to a chat backend as context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextParam {
    pub problem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// Build the context list from entries, optionally appending a new question.
pub fn context_params(entries: &[ChatHistoryEntry], ask: Option<&str>) -> Vec<ContextParam> {
    let mut params: Vec<ContextParam> = entries
        .iter()
        .map(|entry| ContextParam {
            problem: entry.problem.clone(),
            output: entry.output.clone().filter(|o| !o.is_empty()),
        })
        .collect();

    if let Some(question) = ask {
        params.push(ContextParam {
            problem: question.to_string(),
            output: None,
        });
    }
    params
}

/// Render entries (already newest first) as a numbered list.
pub fn format_history_list(entries: &[ChatHistoryEntry]) -> String {
    if entries.is_empty() {
        return "No chat history available.".to_string();
    }

    entries
        .iter()
        .enumerate()
        .map(|(idx, entry)| {
            let role_display = if entry.role != DEFAULT_ROLE {
                format!("[{}]", entry.role)
            } else {
                String::new()
            };

            let mut problem = if entry.problem.chars().count() > PROBLEM_PREVIEW_CHARS {
                let head: String = entry.problem.chars().take(PROBLEM_PREVIEW_CHARS).collect();
                format!("{}...", head)
            } else {
                entry.problem.clone()
            };
            if entry.role == "code" {
                // Show the suggested command next to the question
                problem = format!("{} | {}", problem, entry.answer.as_deref().unwrap_or(""));
            }

            format!("{}. {} {} {}", idx + 1, entry.id, role_display, problem)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: i64, problem: &str, role: &str, answer: Option<&str>) -> ChatHistoryEntry {
        ChatHistoryEntry {
            id,
            timestamp: None,
            problem: problem.to_string(),
            answer: answer.map(str::to_string),
            output: None,
            role: role.to_string(),
        }
    }

    #[test]
    fn test_format_empty() {
        assert_eq!(format_history_list(&[]), "No chat history available.");
    }

    #[test]
    fn test_format_roles_and_commands() {
        let entries = vec![
            entry(9, "list files", "code", Some("ls -la")),
            entry(7, "hello", "default", None),
            entry(4, "poem", "poet", None),
        ];
        let rendered = format_history_list(&entries);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "1. 9 [code] list files | ls -la");
        assert_eq!(lines[1], "2. 7  hello");
        assert_eq!(lines[2], "3. 4 [poet] poem");
    }

    #[test]
    fn test_format_truncates_long_problems() {
        let long = "é".repeat(60);
        let rendered = format_history_list(&[entry(1, &long, "default", None)]);
        let expected = format!("1. 1  {}...", "é".repeat(50));
        assert_eq!(rendered, expected);
    }

    #[test]
    fn test_context_params() {
        let mut with_output = entry(1, "2+2?", "default", Some("4"));
        with_output.output = Some("4".to_string());
        let mut empty_output = entry(2, "noop", "default", None);
        empty_output.output = Some(String::new());

        let params = context_params(&[with_output, empty_output], Some("and 3+3?"));
        let json = serde_json::to_string(&params).unwrap();
        assert_eq!(
            json,
            r#"[{"problem":"2+2?","output":"4"},{"problem":"noop"},{"problem":"and 3+3?"}]"#
        );
    }
}
