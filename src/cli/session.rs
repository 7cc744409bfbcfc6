use crate::store::{HistoryStore, SessionRow};
use anyhow::Result;

/// Start a session. Without an identifier the previous active sessions are
/// ended and a fresh one is opened under a generated id.
pub fn start(store: &HistoryStore, session_id: Option<String>) -> Result<()> {
    match session_id {
        Some(session_id) => {
            let id = store.start_session(&session_id)?;
            println!("Started session {} ({})", id, session_id);
        }
        None => {
            let session = store.begin_session()?;
            println!("Started new session {} ({})", session.id, session.session_id);
        }
    }
    Ok(())
}

pub fn end(store: &HistoryStore, id: i64) -> Result<()> {
    store.end_session(id)?;
    println!("Ended session {}", id);
    Ok(())
}

pub fn list(store: &HistoryStore) -> Result<()> {
    let sessions = store.list_sessions()?;
    if sessions.is_empty() {
        println!("No sessions found. Start one with 'chatlog session start'.");
        return Ok(());
    }

    println!("{:<6} {:<38} {:<20} {}", "ID", "Session", "Started", "State");
    println!("{}", "-".repeat(75));
    for session in sessions {
        print_row(&session);
    }
    Ok(())
}

pub fn current(store: &HistoryStore) -> Result<()> {
    match store.active_session()? {
        Some(session) => print_row(&session),
        None => println!("No active session."),
    }
    Ok(())
}

pub fn link(store: &HistoryStore, session: i64, message: i64) -> Result<()> {
    let id = store.link_message(session, message)?;
    println!("Linked message {} to session {} (link {})", message, session, id);
    Ok(())
}

pub fn messages(store: &HistoryStore, session: i64) -> Result<()> {
    let session = store
        .get_session(session)?
        .ok_or_else(|| anyhow::anyhow!("Session not found: {}", session))?;

    let messages = store.get_session_messages(session.id)?;
    if messages.is_empty() {
        println!("Session {} has no messages.", session.id);
        return Ok(());
    }

    for msg in messages {
        println!("\n[{}] #{} {}", msg.role.to_uppercase(), msg.id, msg.problem);
        if let Some(answer) = &msg.answer {
            println!("  -> {}", answer);
        }
        println!("{}", "-".repeat(40));
    }
    Ok(())
}

fn print_row(session: &SessionRow) {
    let started = session
        .start_time
        .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string());
    let state = if session.is_active { "active" } else { "ended" };
    println!(
        "{:<6} {:<38} {:<20} {}",
        session.id, session.session_id, started, state
    );
}
