//! Read stage: open, read in chunks until a short read, close

use std::mem;

use crate::buffer::CHUNK_SIZE;
use crate::error::LoadError;
use crate::fs::FileIo;
use crate::request::RequestContext;

enum IoState<H> {
    Opening,
    Reading(H),
    ClosingOk(H),
    ClosingErr(H, LoadError),
    ReadyToDecode,
    Failed(LoadError),
}

/// Fill `ctx.buffer` with the whole file.
///
/// A read shorter than one chunk, including an empty one, ends the file. The
/// handle is closed on every path once it has been opened; close failures are
/// logged and otherwise ignored.
pub(crate) async fn read_file<F: FileIo, T>(
    fs: &F,
    ctx: &mut RequestContext<T>,
) -> Result<(), LoadError> {
    let mut state = IoState::Opening;
    let mut reads = 0usize;

    loop {
        state = match state {
            IoState::Opening => match fs.open(ctx.filename()).await {
                Ok(handle) => match fs.alloc_scratch(CHUNK_SIZE) {
                    Ok(scratch) => {
                        ctx.scratch = scratch;
                        IoState::Reading(handle)
                    }
                    Err(_) => IoState::ClosingErr(handle, LoadError::OutOfMemory),
                },
                Err(e) => IoState::Failed(LoadError::Open(e)),
            },

            IoState::Reading(handle) => {
                let offset = ctx.buffer.len() as u64;
                let scratch = mem::take(&mut ctx.scratch);
                let (scratch, read) = fs.read(&handle, scratch, offset).await;
                ctx.scratch = scratch;
                reads += 1;

                match read {
                    Ok(n) => {
                        let n = n.min(ctx.scratch.len());
                        ctx.buffer.append(&ctx.scratch[..n]);
                        if n == CHUNK_SIZE {
                            IoState::Reading(handle)
                        } else {
                            IoState::ClosingOk(handle)
                        }
                    }
                    Err(e) => IoState::ClosingErr(handle, LoadError::Read(e)),
                }
            }

            IoState::ClosingOk(handle) => {
                close(fs, handle, ctx);
                log::debug!(
                    "{}: read {} bytes in {reads} reads",
                    ctx.filename().display(),
                    ctx.buffer.len()
                );
                IoState::ReadyToDecode
            }

            IoState::ClosingErr(handle, e) => {
                close(fs, handle, ctx);
                IoState::Failed(e)
            }

            IoState::ReadyToDecode => return Ok(()),
            IoState::Failed(e) => return Err(e),
        };
    }
}

fn close<F: FileIo, T>(fs: &F, handle: F::Handle, ctx: &RequestContext<T>) {
    if let Err(e) = fs.close(handle) {
        log::warn!("failed to close {}: {e}", ctx.filename().display());
    }
}
