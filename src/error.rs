use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("upload is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    #[error("malformed table: {0}")]
    Csv(#[from] csv::Error),

    #[error("table has no header row")]
    MissingHeader,
}

pub type IngestResult<T> = Result<T, IngestError>;
