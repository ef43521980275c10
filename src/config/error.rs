use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("end_date cannot be earlier than start_date")]
    DateOrder,
    #[error("date window is empty: end_date equals start_date but end_inclusive is false")]
    EmptyDateWindow,
    #[error("month {0} is outside 1..=12")]
    MonthOutOfRange(u32),
    #[error("month range {start}-{end} wraps across the year boundary, which is not supported")]
    MonthRangeWrap { start: u32, end: u32 },
    #[error("batch_size must be a positive integer")]
    BatchSize,
    #[error("at least one dataset must be configured")]
    NoDatasets,
    #[error("scale for dataset {0} must be a positive number")]
    Scale(String),
    #[error("max_pixels for dataset {0} must be positive")]
    MaxPixels(String),
    #[error("Invalid bbox: {0}")]
    Bbox(String),
    #[error("dataset {0} is not available from the backend")]
    UnknownDataset(String),
    #[error("column {column} is not produced by the {pipeline} pipeline")]
    UnknownColumn { column: String, pipeline: String },
    #[error("selector list must not be empty")]
    NoSelectors,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),
}
