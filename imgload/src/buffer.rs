//! Chunked append-only byte buffer

use std::borrow::Cow;

/// Size of one chunk, and of every read issued against a file
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Growable byte buffer made of fixed-size heap chunks.
///
/// Appending never moves bytes that were already stored: a full chunk is left
/// alone and a new one is allocated next to it. Decoders want a single slice,
/// so flattening is deferred to [`SmartBuffer::contiguous`].
#[derive(Default)]
pub struct SmartBuffer {
    chunks: Vec<Box<[u8]>>,
    len: usize,
}

impl SmartBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append at most one chunk worth of bytes
    ///
    /// # Panics
    ///
    /// Panics if `slab` is longer than [`CHUNK_SIZE`].
    pub fn append(&mut self, slab: &[u8]) {
        assert!(
            slab.len() <= CHUNK_SIZE,
            "slab of {} bytes exceeds chunk size {}",
            slab.len(),
            CHUNK_SIZE
        );

        let mut rest = slab;
        while !rest.is_empty() {
            if self.len == self.chunks.len() * CHUNK_SIZE {
                self.chunks.push(vec![0u8; CHUNK_SIZE].into_boxed_slice());
            }

            let offset = self.len % CHUNK_SIZE;
            let take = rest.len().min(CHUNK_SIZE - offset);
            // the push above guarantees a last chunk with room in it
            let chunk = self.chunks.last_mut().expect("buffer has a chunk");
            chunk[offset..offset + take].copy_from_slice(&rest[..take]);

            self.len += take;
            rest = &rest[take..];
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Filled part of every chunk, in order
    pub fn chunks(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.chunks.iter().enumerate().map(move |(i, chunk)| {
            let filled = (self.len - i * CHUNK_SIZE).min(CHUNK_SIZE);
            &chunk[..filled]
        })
    }

    /// All bytes as one slice. Borrows when a single chunk holds everything.
    pub fn contiguous(&self) -> Cow<'_, [u8]> {
        match self.chunks.as_slice() {
            [] => Cow::Borrowed(&[]),
            [only] => Cow::Borrowed(&only[..self.len]),
            _ => {
                let mut flat = Vec::with_capacity(self.len);
                for chunk in self.chunks() {
                    flat.extend_from_slice(chunk);
                }
                Cow::Owned(flat)
            }
        }
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.contiguous().into_owned()
    }
}

impl std::fmt::Debug for SmartBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmartBuffer")
            .field("len", &self.len)
            .field("chunks", &self.chunks.len())
            .finish()
    }
}
