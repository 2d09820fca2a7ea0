/// Errors from HTTP interpretation of a response payload.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// Nothing to parse.
    #[error("empty HTTP response")]
    Empty,

    /// Neither "\r\n\r\n" nor "\n\n" separates headers from body.
    #[error("incomplete HTTP response: no header/body separator")]
    MissingSeparator,

    /// A chunk-size line is not hexadecimal.
    #[error("invalid chunk size {0:?}")]
    InvalidChunkSize(String),

    /// Chunked data without a terminated size line.
    #[error("invalid chunked encoding: chunk size line not terminated")]
    MissingChunkLine,
}

pub type Result<T> = std::result::Result<T, ExtractError>;
