//! bfbridge - Execution Bridge for a Native Tape-Machine Engine
//!
//! Loads a natively compiled engine at runtime, runs programs on it, and
//! brings the results back as owned byte vectors. The engine allocates every
//! output buffer with its own allocator, so each successful result has to be
//! handed back through the engine's free entry point. This crate makes that
//! handoff impossible to get wrong from the outside.
//!
//! # Architecture
//!
//! ```text
//! caller
//!   │  Bridge::execute(program, input)
//!   ▼
//! ┌─────────────────┐
//! │ Execution Bridge│  NUL-terminated program, counted input
//! └────────┬────────┘
//!          │ submit
//!          ▼
//! ┌─────────────────┐
//! │ Dispatch Worker │  one thread, FIFO, one call in flight
//! └────────┬────────┘
//!          │ exec → copy → free
//!          ▼
//! ┌─────────────────┐
//! │  Native Handle  │  libloading, bf_exec / bf_free
//! └─────────────────┘
//! ```
//!
//! # Ownership
//!
//! An engine output pointer/length pair is released at most once, only for
//! successful calls, and only with the pair that call returned. Inside the
//! crate the pair lives in a single-owner token whose `Drop` is the one
//! place `free` is called; callers only ever see [`ExecutionResult`], which
//! owns a copy.
//!
//! # Example
//!
//! ```no_run
//! use bfbridge::{Bridge, BridgeConfig};
//!
//! let config = BridgeConfig::load_from_cwd().unwrap();
//! let bridge = Bridge::from_config(&config).unwrap();
//! let result = bridge.execute(b",>,<[->+<]>.", &[3, 4]).unwrap();
//! assert!(result.success());
//! assert_eq!(result.output(), &[7]);
//! ```

#![warn(clippy::all)]

pub mod adapter;
pub mod bridge;
pub mod codec;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod handle;
pub mod worker;

pub use adapter::{programs, AdapterError, U8Adder};
pub use bridge::{Bridge, ExecutionResult};
pub use config::{BridgeConfig, ConfigError};
pub use error::{BridgeError, BridgeResult};
pub use handle::{EntryPoints, ExecFn, FreeFn, NativeHandle, NativeResult};
pub use worker::{CancelToken, DispatchWorker, Pending, WorkerSnapshot};
