//! bfbridge engine
//!
//! Reference native engine for the bfbridge execution bridge. Compiled as a
//! `cdylib`, it exports exactly two entry points:
//!
//! ```text
//! bf_exec(program: *const c_char, input: *const u8, input_length: usize) -> BfExecResult
//! bf_free(output: *mut u8, output_length: usize)
//! ```
//!
//! A successful `bf_exec` hands ownership of its output buffer to the caller.
//! The buffer was allocated by this library's allocator and must come back
//! through `bf_free`, exactly once, with the same pointer and length.
//!
//! # Example
//!
//! ```rust
//! let output = bfbridge_engine::execute(",>,<[->+<]>.", &[3, 4]).unwrap();
//! assert_eq!(output, vec![7]);
//! ```

use std::ffi::CStr;
use std::mem;
use std::panic;
use std::slice;

use libc::{c_char, c_uchar, size_t};
use thiserror::Error;

pub mod machine;
pub mod token;

pub use machine::Machine;
pub use token::Token;

/// Errors raised while running a program
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("'[' at program position {0} has no matching ']'")]
    UnmatchedLoopStart(usize),
    #[error("']' at program position {0} has no matching '['")]
    UnmatchedLoopEnd(usize),
    #[error("program is not valid UTF-8")]
    InvalidEncoding,
}

/// Run a program over `input` and return everything it emitted
pub fn execute(program: &str, input: &[u8]) -> Result<Vec<u8>, EngineError> {
    Ok(Machine::new(program, input)?.run())
}

/// Like [`execute`], for program text that has not been checked as UTF-8 yet
pub fn execute_bytes(program: &[u8], input: &[u8]) -> Result<Vec<u8>, EngineError> {
    let source = std::str::from_utf8(program).map_err(|_| EngineError::InvalidEncoding)?;
    execute(source, input)
}

/// Result of `bf_exec`, laid out for foreign callers
#[repr(C)]
#[derive(Debug)]
pub struct BfExecResult {
    /// 1 on success, 0 on failure
    pub success: c_uchar,
    /// Start of the output buffer; null on failure
    pub output: *mut c_uchar,
    /// Output length. Explicit because programs routinely emit zero bytes.
    pub output_length: size_t,
}

impl BfExecResult {
    fn failure() -> Self {
        Self {
            success: 0,
            output: std::ptr::null_mut(),
            output_length: 0,
        }
    }
}

/// Execute a NUL-terminated program over a counted input buffer.
///
/// # Safety
///
/// `program` must point to a NUL-terminated string and `input` must be valid
/// for reads of `input_length` bytes (it may dangle when `input_length` is 0).
#[no_mangle]
pub unsafe extern "C" fn bf_exec(
    program: *const c_char,
    input: *const c_uchar,
    input_length: size_t,
) -> BfExecResult {
    if program.is_null() {
        return BfExecResult::failure();
    }
    let source = CStr::from_ptr(program).to_bytes();
    let input: &[u8] = if input_length == 0 || input.is_null() {
        &[]
    } else {
        slice::from_raw_parts(input, input_length)
    };

    // Never unwind into the caller
    let outcome = panic::catch_unwind(|| execute_bytes(source, input));
    match outcome {
        Ok(Ok(output)) => {
            // len == capacity, so bf_free can rebuild the Vec from (ptr, len)
            let mut output = mem::ManuallyDrop::new(output.into_boxed_slice().into_vec());
            BfExecResult {
                success: 1,
                output: output.as_mut_ptr(),
                output_length: output.len(),
            }
        }
        Ok(Err(_)) | Err(_) => BfExecResult::failure(),
    }
}

/// Release an output buffer previously returned by `bf_exec`.
///
/// # Safety
///
/// `output` and `output_length` must be exactly the pair returned by one
/// successful `bf_exec` call, and must not have been released before.
#[no_mangle]
pub unsafe extern "C" fn bf_free(output: *mut c_uchar, output_length: size_t) {
    if output.is_null() {
        return;
    }
    drop(Vec::from_raw_parts(output, output_length, output_length));
}
