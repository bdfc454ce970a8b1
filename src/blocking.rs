//! Synchronous entry point for code that cannot be async, such as a plain
//! `#[test]` function or a REPL-style script.
//!
//! The runner owns its own current-thread runtime. Tasks spawned while a
//! future runs on it (the CDP handler of a browser launched through
//! [`BlockingRunner::run`], for instance) make progress during later `run`
//! calls. Calling `run` from inside another runtime is refused rather than
//! risking a stalled executor.

use std::future::Future;

use tokio::runtime::{Builder, Handle, Runtime};

use crate::error::{Error, Result};

pub struct BlockingRunner {
    runtime: Runtime,
}

impl BlockingRunner {
    pub fn new() -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self { runtime })
    }

    /// Drive `future` to completion on the calling thread.
    pub fn run<F: Future>(&self, future: F) -> Result<F::Output> {
        if Handle::try_current().is_ok() {
            return Err(Error::BlockingInAsync);
        }
        Ok(self.runtime.block_on(future))
    }

    /// `run` for futures that already return this crate's `Result`.
    pub fn call<T, F>(&self, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.run(future)?
    }
}
