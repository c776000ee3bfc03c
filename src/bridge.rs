//! Execution Bridge
//!
//! Turns a program and an optional input into the engine's calling
//! convention, runs the call on the dispatch worker, and hands back an owned
//! [`ExecutionResult`].
//!
//! The native call, the copy out of engine memory, and the matching free all
//! happen inside one job on the worker thread. A caller that stops waiting
//! therefore never leaves engine memory behind.

use std::ffi::CString;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::handle::NativeHandle;
use crate::worker::{CancelToken, DispatchWorker, Pending, WorkerSnapshot};

/// Default name of the dispatch thread
pub const DEFAULT_WORKER_NAME: &str = "bfbridge-worker";

/// Owned outcome of one engine call.
///
/// A failed result never carries output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    success: bool,
    output: Vec<u8>,
}

impl ExecutionResult {
    pub fn succeeded(output: Vec<u8>) -> Self {
        Self {
            success: true,
            output,
        }
    }

    pub fn failed() -> Self {
        Self {
            success: false,
            output: Vec::new(),
        }
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn output(&self) -> &[u8] {
        &self.output
    }

    /// Output bytes, or `ExecutionFailure` if the engine reported failure
    pub fn into_output(self) -> BridgeResult<Vec<u8>> {
        if self.success {
            Ok(self.output)
        } else {
            Err(BridgeError::ExecutionFailure)
        }
    }
}

/// Execution bridge over one loaded engine and its dispatch worker
pub struct Bridge {
    handle: Arc<NativeHandle>,
    worker: DispatchWorker,
    poll_interval: Duration,
}

impl Bridge {
    /// Wrap a bound handle with its own dispatch worker
    pub fn new(handle: NativeHandle) -> BridgeResult<Self> {
        Self::with_worker_name(handle, DEFAULT_WORKER_NAME)
    }

    pub fn with_worker_name(handle: NativeHandle, name: &str) -> BridgeResult<Self> {
        Ok(Self {
            handle: Arc::new(handle),
            worker: DispatchWorker::spawn(name)?,
            poll_interval: Duration::from_millis(50),
        })
    }

    /// Locate and load the engine described by `config`.
    ///
    /// A missing artifact is reported here, before any call can be made.
    pub fn from_config(config: &BridgeConfig) -> BridgeResult<Self> {
        let handle = NativeHandle::locate(config)?;
        let mut bridge = Self::with_worker_name(handle, &config.worker.thread_name)?;
        bridge.poll_interval = config.worker.poll_interval();
        Ok(bridge)
    }

    pub fn handle(&self) -> &NativeHandle {
        &self.handle
    }

    /// Queue a call and return without waiting for it
    pub fn submit(&self, program: &[u8], input: &[u8]) -> BridgeResult<Pending<ExecutionResult>> {
        let program = program_cstring(program)?;
        let input = input.to_vec();
        let handle = Arc::clone(&self.handle);

        self.worker.submit(move || {
            trace!(
                program_len = program.as_bytes().len(),
                input_len = input.len(),
                "engine call"
            );
            match handle.call(&program, &input) {
                Some(output) => {
                    trace!(output_len = output.len(), "engine call succeeded");
                    ExecutionResult::succeeded(output.into_vec())
                }
                None => {
                    debug!("engine reported failure");
                    ExecutionResult::failed()
                }
            }
        })
    }

    /// Run `program` over `input` and wait for the result. An empty `input`
    /// means the program gets no input.
    pub fn execute(&self, program: &[u8], input: &[u8]) -> BridgeResult<ExecutionResult> {
        self.submit(program, input)?.wait()
    }

    /// Run `program` with no input
    pub fn execute_program(&self, program: &[u8]) -> BridgeResult<ExecutionResult> {
        self.execute(program, &[])
    }

    /// Wait at most `timeout`; the native call itself is not interrupted
    pub fn execute_timeout(
        &self,
        program: &[u8],
        input: &[u8],
        timeout: Duration,
    ) -> BridgeResult<ExecutionResult> {
        self.submit(program, input)?.wait_timeout(timeout)
    }

    /// Wait until the call finishes or `token` is tripped
    pub fn execute_cancellable(
        &self,
        program: &[u8],
        input: &[u8],
        token: &CancelToken,
    ) -> BridgeResult<ExecutionResult> {
        self.submit(program, input)?
            .wait_cancellable(token, self.poll_interval)
    }

    /// Run and return the output, treating engine failure as an error
    pub fn run(&self, program: &[u8], input: &[u8]) -> BridgeResult<Vec<u8>> {
        self.execute(program, input)?.into_output()
    }

    /// Run `program` `iterations` times on the worker without releasing
    /// any output. Only the leak diagnostic calls this.
    pub(crate) fn leak_batch(&self, program: &[u8], iterations: usize) -> BridgeResult<()> {
        let program = program_cstring(program)?;
        let handle = Arc::clone(&self.handle);
        self.worker
            .submit(move || {
                for _ in 0..iterations {
                    let _ = handle.call_raw(&program, &[]);
                }
            })?
            .wait()
    }

    pub fn worker_stats(&self) -> WorkerSnapshot {
        self.worker.stats()
    }

    /// Stop the worker after queued calls finish
    pub fn shutdown(&self) {
        self.worker.shutdown();
    }
}

pub(crate) fn program_cstring(program: &[u8]) -> BridgeResult<CString> {
    CString::new(program).map_err(|e| BridgeError::InvalidProgram {
        position: e.nul_position(),
    })
}
