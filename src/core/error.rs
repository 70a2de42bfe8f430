use std::fmt;

#[derive(Debug)]
pub enum QueueError {
    /// Ledger is at capacity; admission refused.
    Full,
    /// No item carries the given id.
    NotFound(String),
}

impl std::error::Error for QueueError {}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueError::Full => write!(f, "Queue is full"),
            QueueError::NotFound(id) => write!(f, "No queue item with id {id}"),
        }
    }
}
