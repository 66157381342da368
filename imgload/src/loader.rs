//! Public entry point: submit loads, drive them to completion

use std::cell::{Cell, RefCell};
use std::mem;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

use imageproc::image::DynamicImage;
use smol::{LocalExecutor, Task};

use crate::config::{DecodeMode, LoaderConfig};
use crate::decoder::{self, Decoder, StandardDecoder};
use crate::error::LoadError;
use crate::fs::{BlockingFs, FileIo};
use crate::io;
use crate::request::{LoadResult, RequestContext};
use crate::worker::{self, DecodeJob};

/// Asynchronous image loader.
///
/// I/O completions and callbacks run on the thread that drives the loader
/// ([`Loader::run_until_idle`] or [`Loader::tick`]); decoding runs on the
/// global rayon pool. Callbacks therefore don't need to be `Send`.
///
/// ```no_run
/// let loader = imgload::Loader::new();
/// loader.decode("cover.png", 1, |result| {
///     println!("{}: {:?}", result.user_token, result.data.map(|img| img.color()));
/// });
/// loader.run_until_idle();
/// ```
pub struct Loader<F = BlockingFs> {
    executor: LocalExecutor<'static>,
    tasks: RefCell<Vec<Task<()>>>,
    /// Loads whose callback hasn't run yet
    pending: Rc<Cell<usize>>,
    fs: Rc<F>,
    decoder: Arc<dyn Decoder>,
    from_memory: bool,
}

impl Loader<BlockingFs> {
    pub fn new() -> Self {
        Self::with_config(&LoaderConfig::default())
    }

    pub fn with_config(config: &LoaderConfig) -> Self {
        Self::with_parts(BlockingFs, StandardDecoder, config)
    }
}

impl Default for Loader<BlockingFs> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: FileIo + 'static> Loader<F> {
    pub fn with_parts(fs: F, decoder: impl Decoder, config: &LoaderConfig) -> Self {
        decoder::initialize();
        config.configure_pool();

        let from_memory = match config.decode_mode {
            DecodeMode::Memory if decoder.reads_from_memory() => true,
            DecodeMode::Memory => {
                log::debug!("decoder can't read from memory, decoding by path");
                false
            }
            DecodeMode::Path => false,
        };

        Self {
            executor: LocalExecutor::new(),
            tasks: RefCell::new(Vec::new()),
            pending: Rc::new(Cell::new(0)),
            fs: Rc::new(fs),
            decoder: Arc::new(decoder),
            from_memory,
        }
    }

    /// Start loading `filename`. Returns immediately.
    ///
    /// `callback` runs exactly once, from the thread driving the loader, with
    /// either a decoded image or an error message.
    pub fn decode<T, C>(&self, filename: impl Into<PathBuf>, user_token: T, callback: C)
    where
        T: 'static,
        C: FnOnce(LoadResult<T>) + 'static,
    {
        let ctx = RequestContext::new(filename.into(), user_token, Box::new(callback));
        log::debug!("{}: load requested", ctx.filename().display());

        self.pending.set(self.pending.get() + 1);
        let task = self.executor.spawn(run_request(
            Rc::clone(&self.pending),
            Rc::clone(&self.fs),
            Arc::clone(&self.decoder),
            self.from_memory,
            ctx,
        ));
        let mut tasks = self.tasks.borrow_mut();
        tasks.retain(|task| !task.is_finished());
        tasks.push(task);
    }

    /// Load one file, blocking the calling thread until it is decoded
    pub fn load(&self, filename: impl Into<PathBuf>) -> Result<DynamicImage, LoadError> {
        let (tx, rx) = smol::channel::bounded(1);
        self.decode(filename, (), move |result| {
            let _ = tx.try_send(result.into_result());
        });
        self.run_until_idle();

        rx.try_recv()
            .expect("callback runs before the loader goes idle")
    }
}

impl<F> Loader<F> {
    /// Number of submitted loads whose callback hasn't run yet
    pub fn in_flight(&self) -> usize {
        self.pending.get()
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight() == 0
    }

    /// Run one ready step without blocking. Returns whether anything ran.
    pub fn tick(&self) -> bool {
        self.executor.try_tick()
    }

    /// Drive every submitted load, including ones submitted meanwhile, to
    /// completion.
    pub fn run_until_idle(&self) {
        smol::block_on(self.executor.run(async {
            loop {
                let tasks = mem::take(&mut *self.tasks.borrow_mut());
                if tasks.is_empty() {
                    break;
                }
                for task in tasks {
                    task.await;
                }
            }
        }));
    }
}

impl<F> Drop for Loader<F> {
    fn drop(&mut self) {
        // dropping a task cancels it, and every load owes its caller a callback
        if !self.is_idle() {
            log::debug!("loader dropped with {} loads in flight", self.in_flight());
            self.run_until_idle();
        }
    }
}

async fn run_request<F: FileIo, T>(
    pending: Rc<Cell<usize>>,
    fs: Rc<F>,
    decoder: Arc<dyn Decoder>,
    from_memory: bool,
    mut ctx: RequestContext<T>,
) {
    let job = if from_memory {
        match io::read_file(fs.as_ref(), &mut ctx).await {
            Ok(()) => Some(DecodeJob::Memory(mem::take(&mut ctx.buffer))),
            Err(e) => {
                ctx.fail(e);
                None
            }
        }
    } else {
        Some(DecodeJob::Path(ctx.filename().to_owned()))
    };

    if let Some(job) = job {
        let image = worker::submit_decode(decoder, job).await;
        worker::on_decoded(&mut ctx, image);
    }

    // counted out before the callback, which may ask the loader
    pending.set(pending.get() - 1);
    ctx.done();
}
