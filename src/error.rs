use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("API error: {0}")]
    ApiError(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("malformed API response: {0}")]
    MalformedResponse(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("overlap mismatch at open_time {open_time} in {field}: store={store_value} api={api_value}")]
    OverlapMismatch {
        open_time: i64,
        field: &'static str,
        store_value: String,
        api_value: String,
    },

    #[error("gap detected: expected open_time {expected}, found {found}")]
    GapDetected { expected: i64, found: i64 },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Time parsing error: {0}")]
    TimeParseError(#[from] chrono::ParseError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;
