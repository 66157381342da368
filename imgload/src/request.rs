//! Per-request state carried through every stage of a load

use std::path::{Path, PathBuf};

use imageproc::image::DynamicImage;

use crate::buffer::SmartBuffer;
use crate::error::{ErrorKind, LoadError};

/// Outcome of one load, handed to the callback by value.
///
/// On success `data` is set and `error` is empty. On failure `data` is `None`
/// and `error` holds a message starting with `can't open file`,
/// `can't read file` or `can't decode file`.
#[derive(Debug)]
pub struct LoadResult<T> {
    pub filename: PathBuf,
    pub data: Option<DynamicImage>,
    pub error: String,
    pub user_token: T,
    cause: Option<LoadError>,
}

impl<T> LoadResult<T> {
    fn new(filename: PathBuf, user_token: T) -> Self {
        Self {
            filename,
            data: None,
            error: String::new(),
            user_token,
            cause: None,
        }
    }

    pub fn filename(&self) -> &Path {
        &self.filename
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_empty() && self.data.is_some()
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        self.cause.as_ref().map(LoadError::kind)
    }

    /// First error wins, later ones are dropped
    fn set_error(&mut self, err: LoadError) {
        if self.cause.is_some() {
            log::debug!("{}: dropping secondary error: {err}", self.filename.display());
            return;
        }
        self.error = err.bounded_message();
        self.cause = Some(err);
    }

    pub fn into_result(self) -> Result<DynamicImage, LoadError> {
        match (self.data, self.cause) {
            (_, Some(err)) => Err(err),
            (Some(img), None) => Ok(img),
            (None, None) => Err(LoadError::Decode),
        }
    }

    /// Split off the token, e.g. to route the outcome somewhere else
    pub fn into_parts(self) -> (T, Result<DynamicImage, LoadError>) {
        let LoadResult {
            filename,
            data,
            error,
            user_token,
            cause,
        } = self;
        let rest = LoadResult {
            filename,
            data,
            error,
            user_token: (),
            cause,
        };
        (user_token, rest.into_result())
    }
}

pub type Callback<T> = Box<dyn FnOnce(LoadResult<T>)>;

/// Owned by exactly one stage at a time, consumed by [`RequestContext::done`]
pub(crate) struct RequestContext<T> {
    pub result: LoadResult<T>,
    callback: Callback<T>,
    /// One chunk, allocated once the file is open
    pub scratch: Vec<u8>,
    pub buffer: SmartBuffer,
}

impl<T> RequestContext<T> {
    pub fn new(filename: PathBuf, user_token: T, callback: Callback<T>) -> Self {
        Self {
            result: LoadResult::new(filename, user_token),
            callback,
            scratch: Vec::new(),
            buffer: SmartBuffer::new(),
        }
    }

    pub fn filename(&self) -> &Path {
        &self.result.filename
    }

    pub fn fail(&mut self, err: LoadError) {
        log::debug!("{}: {err}", self.filename().display());
        self.result.set_error(err);
    }

    pub fn has_failed(&self) -> bool {
        self.result.cause.is_some()
    }

    /// Release the request's memory and hand the result to the callback.
    pub fn done(self) {
        let RequestContext {
            result,
            callback,
            scratch,
            buffer,
        } = self;
        drop(scratch);
        drop(buffer);

        if result.error.is_empty() {
            log::debug!("{}: loaded", result.filename.display());
        }
        callback(result);
    }
}
