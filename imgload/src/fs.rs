//! Non-blocking file access used by the read stage

use std::collections::TryReserveError;
use std::fs::File;
use std::future::Future;
use std::io;
use std::path::Path;
use std::sync::Arc;

/// Asynchronous positional file I/O.
///
/// Reads take the buffer by value and hand it back with the result, so an
/// implementation can move it to another thread while the read is in flight.
pub trait FileIo {
    type Handle;

    fn open(&self, path: &Path) -> impl Future<Output = io::Result<Self::Handle>>;

    fn read(
        &self,
        handle: &Self::Handle,
        buf: Vec<u8>,
        offset: u64,
    ) -> impl Future<Output = (Vec<u8>, io::Result<usize>)>;

    /// Synchronous, closing is cheap enough to not need a round trip
    fn close(&self, handle: Self::Handle) -> io::Result<()>;

    /// Zeroed scratch buffer for reads, allocated once a file is open
    fn alloc_scratch(&self, len: usize) -> Result<Vec<u8>, TryReserveError> {
        let mut scratch = Vec::new();
        scratch.try_reserve_exact(len)?;
        scratch.resize(len, 0);
        Ok(scratch)
    }
}

/// [`FileIo`] over `std::fs`, every syscall runs on smol's blocking pool
#[derive(Debug, Default, Clone, Copy)]
pub struct BlockingFs;

impl FileIo for BlockingFs {
    type Handle = Arc<File>;

    async fn open(&self, path: &Path) -> io::Result<Arc<File>> {
        let path = path.to_owned();
        smol::unblock(move || File::open(path)).await.map(Arc::new)
    }

    async fn read(
        &self,
        handle: &Arc<File>,
        mut buf: Vec<u8>,
        offset: u64,
    ) -> (Vec<u8>, io::Result<usize>) {
        let file = Arc::clone(handle);
        smol::unblock(move || {
            let n = read_at(&file, &mut buf, offset);
            (buf, n)
        })
        .await
    }

    fn close(&self, handle: Arc<File>) -> io::Result<()> {
        // std reports nothing on close, dropping the last reference is all there is
        drop(handle);
        Ok(())
    }
}

fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    loop {
        match read_at_once(file, buf, offset) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            result => return result,
        }
    }
}

#[cfg(unix)]
fn read_at_once(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    std::os::unix::fs::FileExt::read_at(file, buf, offset)
}

#[cfg(windows)]
fn read_at_once(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    std::os::windows::fs::FileExt::seek_read(file, buf, offset)
}

#[cfg(not(any(unix, windows)))]
fn read_at_once(mut file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::io::{Read, Seek, SeekFrom};

    file.seek(SeekFrom::Start(offset))?;
    file.read(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_at_offsets() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"0123456789").unwrap();

        smol::block_on(async {
            let fs = BlockingFs;
            let handle = fs.open(file.path()).await.unwrap();

            let (buf, n) = fs.read(&handle, vec![0; 4], 0).await;
            assert_eq!(n.unwrap(), 4);
            assert_eq!(&buf, b"0123");

            let (buf, n) = fs.read(&handle, buf, 8).await;
            assert_eq!(n.unwrap(), 2);
            assert_eq!(&buf[..2], b"89");

            let (_, n) = fs.read(&handle, buf, 10).await;
            assert_eq!(n.unwrap(), 0);

            fs.close(handle).unwrap();
        });
    }

    #[test]
    fn scratch_is_zeroed_to_length() {
        let scratch = BlockingFs.alloc_scratch(16).unwrap();
        assert_eq!(scratch, vec![0; 16]);
        assert!(BlockingFs.alloc_scratch(usize::MAX).is_err());
    }

    #[test]
    fn open_missing_file_fails() {
        let err = smol::block_on(BlockingFs.open(Path::new("/no/such/file"))).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
