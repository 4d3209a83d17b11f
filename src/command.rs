use std::sync::Arc;

use crate::history::{HistoryDataset, HistoryError};
use crate::row::Row;

#[derive(Debug, Clone)]
pub enum Command {
    /// `None` when the server could not provide a hash.
    PasswordHash(Option<String>),
    /// Rows tagged with the realtime generation that produced them.
    RealtimeRows(u64, Vec<Row>),
    /// Window state change; the generation becomes the only one accepted.
    RealtimeActive(u64, bool),
    HistoryLoaded(u64, Result<Arc<HistoryDataset>, HistoryError>),
    /// Carries the generation of the timer that fired it.
    PlaybackTick(u64),
    Error(String),
    Exit,
}
