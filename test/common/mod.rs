//! Shared helpers for bfbridge integration tests
//!
//! The reference engine is linked into the test binary and handed to the
//! bridge through thin `extern "C"` shims. Loader tests use the engine
//! cdylib that cargo builds next to the test binaries instead.

#![allow(dead_code, unused_macros)]

use std::path::PathBuf;

use bfbridge::handle::library_filename;
use bfbridge::{Bridge, NativeHandle, NativeResult};
use libc::{c_char, c_uchar, size_t};

/// `bf_exec` of the linked engine, returning the bridge's result layout
pub unsafe extern "C" fn engine_exec(
    program: *const c_char,
    input: *const c_uchar,
    input_length: size_t,
) -> NativeResult {
    let result = bfbridge_engine::bf_exec(program, input, input_length);
    NativeResult {
        success: result.success,
        output: result.output,
        output_length: result.output_length,
    }
}

/// `bf_free` of the linked engine
pub unsafe extern "C" fn engine_free(output: *mut c_uchar, output_length: size_t) {
    bfbridge_engine::bf_free(output, output_length)
}

/// Bridge over the linked engine with no instrumentation
pub fn engine_bridge() -> Bridge {
    let handle = unsafe { NativeHandle::from_entry_points(engine_exec, engine_free) };
    Bridge::with_worker_name(handle, "test-worker").unwrap()
}

/// The engine cdylib cargo builds alongside the test binaries.
///
/// Test executables live in `target/<profile>/deps`, next to the
/// dependency artifacts; a workspace build also copies it one level up.
pub fn built_engine_path() -> PathBuf {
    let filename = library_filename("bfbridge_engine", None);
    let exe = std::env::current_exe().expect("test executable path");
    let deps = exe.parent().expect("test executable directory");
    let path = [Some(deps), deps.parent()]
        .into_iter()
        .flatten()
        .map(|dir| dir.join(&filename))
        .find(|path| path.exists())
        .unwrap_or_else(|| panic!("{} not found next to {}", filename, exe.display()));
    path
}

/// Define a module wrapping the linked engine with its own counters.
///
/// Every invocation gets separate statics, so tests running in parallel
/// never see each other's calls. `HOLD` parks the engine inside `exec`
/// until it is cleared.
macro_rules! counting_engine {
    ($name:ident) => {
        #[allow(dead_code)]
        mod $name {
            use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
            use std::time::{Duration, Instant};

            use bfbridge::{Bridge, NativeHandle, NativeResult};
            use libc::{c_char, c_uchar, size_t};
            use parking_lot::Mutex;

            pub static CALLS: AtomicUsize = AtomicUsize::new(0);
            pub static SUCCESSES: AtomicUsize = AtomicUsize::new(0);
            pub static FREES: AtomicUsize = AtomicUsize::new(0);
            pub static BAD_FREES: AtomicUsize = AtomicUsize::new(0);
            pub static IN_FLIGHT: AtomicUsize = AtomicUsize::new(0);
            pub static MAX_IN_FLIGHT: AtomicUsize = AtomicUsize::new(0);
            pub static HOLD: AtomicBool = AtomicBool::new(false);

            /// Pairs handed out by `exec` and not yet freed
            static LIVE: Mutex<Vec<(usize, usize)>> = parking_lot::const_mutex(Vec::new());
            /// First input byte of every call, in call order
            static ORDER: Mutex<Vec<u8>> = parking_lot::const_mutex(Vec::new());

            pub unsafe extern "C" fn exec(
                program: *const c_char,
                input: *const c_uchar,
                input_length: size_t,
            ) -> NativeResult {
                let depth = IN_FLIGHT.fetch_add(1, Ordering::SeqCst) + 1;
                MAX_IN_FLIGHT.fetch_max(depth, Ordering::SeqCst);
                CALLS.fetch_add(1, Ordering::SeqCst);
                if input_length > 0 {
                    ORDER.lock().push(*input);
                }
                while HOLD.load(Ordering::SeqCst) {
                    std::thread::sleep(Duration::from_millis(1));
                }

                let result = $crate::common::engine_exec(program, input, input_length);
                if result.success == 1 {
                    SUCCESSES.fetch_add(1, Ordering::SeqCst);
                    LIVE.lock()
                        .push((result.output as usize, result.output_length));
                }
                IN_FLIGHT.fetch_sub(1, Ordering::SeqCst);
                result
            }

            pub unsafe extern "C" fn free(output: *mut c_uchar, output_length: size_t) {
                FREES.fetch_add(1, Ordering::SeqCst);
                let known = {
                    let mut live = LIVE.lock();
                    match live
                        .iter()
                        .position(|&pair| pair == (output as usize, output_length))
                    {
                        Some(index) => {
                            live.swap_remove(index);
                            true
                        }
                        None => false,
                    }
                };
                if known {
                    $crate::common::engine_free(output, output_length);
                } else {
                    BAD_FREES.fetch_add(1, Ordering::SeqCst);
                }
            }

            pub fn bridge() -> Bridge {
                let handle = unsafe { NativeHandle::from_entry_points(exec, free) };
                Bridge::with_worker_name(handle, stringify!($name)).unwrap()
            }

            /// Successful outputs that have not been freed
            pub fn outstanding() -> usize {
                LIVE.lock().len()
            }

            pub fn order() -> Vec<u8> {
                ORDER.lock().clone()
            }

            pub fn calls() -> usize {
                CALLS.load(Ordering::SeqCst)
            }

            pub fn successes() -> usize {
                SUCCESSES.load(Ordering::SeqCst)
            }

            pub fn frees() -> usize {
                FREES.load(Ordering::SeqCst)
            }

            pub fn bad_frees() -> usize {
                BAD_FREES.load(Ordering::SeqCst)
            }

            pub fn max_in_flight() -> usize {
                MAX_IN_FLIGHT.load(Ordering::SeqCst)
            }

            pub fn hold() {
                HOLD.store(true, Ordering::SeqCst);
            }

            pub fn release() {
                HOLD.store(false, Ordering::SeqCst);
            }

            /// Wait until `exec` has been entered `n` times
            pub fn wait_for_calls(n: usize) {
                let deadline = Instant::now() + Duration::from_secs(10);
                while calls() < n {
                    assert!(Instant::now() < deadline, "engine was never called");
                    std::thread::sleep(Duration::from_millis(1));
                }
            }
        }
    };
}
