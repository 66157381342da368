#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::TryReserveError;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use imgload::image::{DynamicImage, GrayImage};
use imgload::{BlockingFs, Decoder, FileIo, RawImage};

/// Everything a [`RecordingFs`] saw
#[derive(Debug, Default)]
pub struct IoLog {
    pub opens: usize,
    /// (offset, bytes returned) for every successful read
    pub reads: Vec<(u64, usize)>,
    pub closes: usize,
}

/// Real file access with every call recorded, and optional injected failures
#[derive(Clone, Default)]
pub struct RecordingFs {
    pub log: Rc<RefCell<IoLog>>,
    /// fail the read with this index (0-based)
    pub fail_read: Option<usize>,
    pub fail_close: bool,
    /// refuse the scratch allocation after open
    pub fail_alloc: bool,
}

impl RecordingFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read_sizes(&self) -> Vec<usize> {
        self.log.borrow().reads.iter().map(|&(_, n)| n).collect()
    }
}

impl FileIo for RecordingFs {
    type Handle = <BlockingFs as FileIo>::Handle;

    async fn open(&self, path: &Path) -> io::Result<Self::Handle> {
        let handle = BlockingFs.open(path).await?;
        self.log.borrow_mut().opens += 1;
        Ok(handle)
    }

    async fn read(
        &self,
        handle: &Self::Handle,
        buf: Vec<u8>,
        offset: u64,
    ) -> (Vec<u8>, io::Result<usize>) {
        let attempt = self.log.borrow().reads.len();
        if self.fail_read == Some(attempt) {
            return (buf, Err(io::Error::other("injected read failure")));
        }

        let (buf, n) = BlockingFs.read(handle, buf, offset).await;
        if let Ok(n) = n {
            self.log.borrow_mut().reads.push((offset, n));
        }
        (buf, n)
    }

    fn close(&self, handle: Self::Handle) -> io::Result<()> {
        self.log.borrow_mut().closes += 1;
        BlockingFs.close(handle)?;
        if self.fail_close {
            return Err(io::Error::other("injected close failure"));
        }
        Ok(())
    }

    fn alloc_scratch(&self, len: usize) -> Result<Vec<u8>, TryReserveError> {
        if self.fail_alloc {
            return Err(Vec::<u8>::new().try_reserve(usize::MAX).unwrap_err());
        }
        BlockingFs.alloc_scratch(len)
    }
}

/// Accepts any non-empty input and remembers how many bytes it was given
#[derive(Clone, Default)]
pub struct AnyBytesDecoder {
    pub seen: Arc<Mutex<Vec<usize>>>,
    pub by_path: bool,
}

impl AnyBytesDecoder {
    pub fn seen(&self) -> Vec<usize> {
        self.seen.lock().unwrap().clone()
    }
}

impl Decoder for AnyBytesDecoder {
    fn decode_from_memory(&self, bytes: &[u8]) -> Option<RawImage> {
        self.seen.lock().unwrap().push(bytes.len());
        if bytes.is_empty() {
            return None;
        }
        Some(RawImage::Direct(DynamicImage::ImageLuma8(GrayImage::new(1, 1))))
    }

    fn decode_from_path(&self, path: &Path) -> Option<RawImage> {
        let bytes = std::fs::read(path).ok()?;
        self.decode_from_memory(&bytes)
    }

    fn reads_from_memory(&self) -> bool {
        !self.by_path
    }
}

/// Deterministic noise, never starts with a known image signature
pub fn noise(len: usize, seed: u32) -> Vec<u8> {
    let mut state = seed.wrapping_mul(2_654_435_761).max(1);
    (0..len)
        .map(|i| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            if i < 4 {
                b'#'
            } else {
                state as u8
            }
        })
        .collect()
}

pub fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}
