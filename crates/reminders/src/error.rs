#[derive(Debug, thiserror::Error)]
pub enum ReminderError {
    #[error("unknown reminder kind: {0}")]
    UnknownKind(String),
    #[error("unknown weekday: {0}")]
    UnknownDay(String),
    #[error("invalid time of day '{0}', expected HH:MM")]
    InvalidTime(String),
    #[error("reminder store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("reminder config is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}
