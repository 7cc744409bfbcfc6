pub mod cli;
pub mod config;
pub mod error;
pub mod selection;
pub mod store;

pub use config::Config;
pub use error::StoreError;
pub use selection::Selection;
pub use store::{ChatHistoryEntry, HistoryQuery, HistoryStore, NewEntry, OrphanPolicy};
