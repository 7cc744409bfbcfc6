//! Record command implementation

use anyhow::Result;

use crate::store::{HistoryStore, NewEntry};

pub fn run(
    store: &HistoryStore,
    problem: String,
    answer: Option<String>,
    output: Option<String>,
    role: Option<String>,
    no_link: bool,
) -> Result<()> {
    let entry = NewEntry {
        problem,
        answer,
        output,
        role,
        timestamp: None,
    };

    if no_link {
        let id = store.record_interaction(&entry)?;
        println!("Recorded entry {}", id);
        return Ok(());
    }

    let recorded = store.record_in_active_session(&entry)?;
    match recorded.session_id {
        Some(session) => println!(
            "Recorded entry {} in session {}",
            recorded.entry_id, session
        ),
        None => println!("Recorded entry {}", recorded.entry_id),
    }
    Ok(())
}
