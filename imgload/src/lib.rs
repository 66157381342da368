pub mod buffer;
pub mod config;
pub mod decoder;
pub mod error;
pub mod fs;
mod io;
pub mod loader;
pub mod request;
mod worker;

// Re-export commonly used types
pub use buffer::{SmartBuffer, CHUNK_SIZE};
pub use config::{DecodeMode, LoaderConfig};
pub use decoder::{initialize, Decoder, RawImage, StandardDecoder};
pub use error::{ErrorKind, LoadError};
pub use fs::{BlockingFs, FileIo};
pub use imageproc::image;
pub use loader::Loader;
pub use request::LoadResult;
