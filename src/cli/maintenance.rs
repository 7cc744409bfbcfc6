//! Maintenance commands: deletions, orphaned links and counts

use anyhow::Result;

use crate::store::HistoryStore;

pub fn delete_entry(store: &HistoryStore, id: i64) -> Result<()> {
    store.delete_entry(id)?;
    println!(
        "Deleted entry {} (orphan policy: {})",
        id,
        store.options().orphan_policy.as_str()
    );
    Ok(())
}

pub fn delete_session(store: &HistoryStore, id: i64) -> Result<()> {
    store.delete_session(id)?;
    println!(
        "Deleted session {} (orphan policy: {})",
        id,
        store.options().orphan_policy.as_str()
    );
    Ok(())
}

pub fn orphans(store: &HistoryStore, prune: bool) -> Result<()> {
    let links = store.orphaned_links()?;
    if links.is_empty() {
        println!("No orphaned links.");
        return Ok(());
    }

    println!("{:<8} {:<10} {}", "Link", "Session", "Message");
    println!("{}", "-".repeat(30));
    for link in &links {
        println!(
            "{:<8} {:<10} {}",
            link.id,
            link.session_id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string()),
            link.message_id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string()),
        );
    }

    if prune {
        let removed = store.prune_orphans()?;
        println!("\nPruned {} orphaned link(s).", removed);
    }
    Ok(())
}

pub fn stats(store: &HistoryStore) -> Result<()> {
    let stats = store.stats()?;
    println!("Entries:         {}", stats.entries);
    println!("Sessions:        {}", stats.sessions);
    println!("Active sessions: {}", stats.active_sessions);
    println!("Links:           {}", stats.links);
    println!("Orphaned links:  {}", stats.orphaned_links);
    Ok(())
}
