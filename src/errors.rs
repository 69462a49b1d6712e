use thiserror::Error;

/// Failure to turn one article's extraction payload into records.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("malformed job payload in article '{article}': {source}")]
    MalformedPayload {
        article: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Failure to write one report artifact.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Spreadsheet error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
}
