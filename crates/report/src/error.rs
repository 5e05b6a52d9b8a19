use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Report has no format_version field")]
    MissingVersion,

    #[error("Unsupported report format version {found} (this build reads version {expected})")]
    UnsupportedVersion { found: u64, expected: u32 },
}
