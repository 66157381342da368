use std::io;

/// Longest error message handed to a callback, in bytes
pub const MAX_ERROR_LEN: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    Open,
    OutOfMemory,
    Read,
    Decode,
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("can't open file: {0}")]
    Open(#[source] io::Error),

    #[error("can't open file: not enough memory")]
    OutOfMemory,

    #[error("can't read file: {0}")]
    Read(#[source] io::Error),

    #[error("can't decode file: unknown image format")]
    Decode,
}

impl LoadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LoadError::Open(_) => ErrorKind::Open,
            LoadError::OutOfMemory => ErrorKind::OutOfMemory,
            LoadError::Read(_) => ErrorKind::Read,
            LoadError::Decode => ErrorKind::Decode,
        }
    }

    /// Display text cut to [`MAX_ERROR_LEN`] bytes on a char boundary
    pub fn bounded_message(&self) -> String {
        truncate(self.to_string(), MAX_ERROR_LEN)
    }
}

fn truncate(mut message: String, max: usize) -> String {
    if message.len() > max {
        let mut end = max;
        while !message.is_char_boundary(end) {
            end -= 1;
        }
        message.truncate(end);
    }
    message
}
