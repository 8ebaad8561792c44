// Durable commit history and aggregate statistics.

pub mod history_db;

pub use history_db::HistoryStore;
