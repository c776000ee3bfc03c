//! Native Handle
//!
//! Loads the engine library, binds its two entry points with fixed
//! signatures, and owns the token type that guards the engine's output
//! buffers.
//!
//! ```text
//! bf_exec(program: *const c_char, input: *const u8, input_length: usize) -> NativeResult
//! bf_free(output: *mut u8, output_length: usize)
//! ```

use std::ffi::CString;
use std::fmt;
use std::path::{Path, PathBuf};

use libc::{c_char, c_uchar, size_t};
use libloading::Library;
use tracing::{debug, warn};

use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};

/// Raw result struct returned by the engine's execute entry point
#[repr(C)]
#[derive(Debug)]
pub struct NativeResult {
    /// 1 on success, 0 on failure
    pub success: c_uchar,
    /// Output buffer owned by the engine's allocator
    pub output: *mut c_uchar,
    /// Output length in bytes
    pub output_length: size_t,
}

/// Signature of the execute entry point
pub type ExecFn = unsafe extern "C" fn(
    program: *const c_char,
    input: *const c_uchar,
    input_length: size_t,
) -> NativeResult;

/// Signature of the free entry point
pub type FreeFn = unsafe extern "C" fn(output: *mut c_uchar, output_length: size_t);

/// Names of the two entry points to bind
#[derive(Debug, Clone, Copy)]
pub struct EntryPoints<'a> {
    pub exec: &'a str,
    pub free: &'a str,
}

impl Default for EntryPoints<'static> {
    fn default() -> Self {
        Self {
            exec: "bf_exec",
            free: "bf_free",
        }
    }
}

/// A loaded engine with both entry points bound
pub struct NativeHandle {
    exec: ExecFn,
    free: FreeFn,
    path: Option<PathBuf>,
    /// Keeps the code behind `exec`/`free` mapped; dropped last
    _library: Option<Library>,
}

impl NativeHandle {
    /// Load an engine library from `path` and bind its entry points.
    ///
    /// Fails with `MissingArtifact` before touching the dynamic loader when
    /// the file does not exist.
    pub fn load(path: impl AsRef<Path>, entry_points: EntryPoints<'_>) -> BridgeResult<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(BridgeError::MissingArtifact { path });
        }

        // Safety: loading a library runs its initialisers. The path is the
        // engine artifact the caller configured.
        let library = unsafe {
            Library::new(&path).map_err(|e| BridgeError::LoadFailed {
                path: path.clone(),
                reason: e.to_string(),
            })?
        };

        // Safety: the symbols are declared with the engine ABI; a library that
        // exports them under a different signature is a build mismatch.
        let exec = unsafe { bind::<ExecFn>(&library, entry_points.exec, &path)? };
        let free = unsafe { bind::<FreeFn>(&library, entry_points.free, &path)? };

        debug!(path = %path.display(), "engine loaded");
        Ok(Self {
            exec,
            free,
            path: Some(path),
            _library: Some(library),
        })
    }

    /// Resolve the artifact path from configuration and load it
    pub fn locate(config: &BridgeConfig) -> BridgeResult<Self> {
        let entry_points = EntryPoints {
            exec: &config.engine.exec_symbol,
            free: &config.engine.free_symbol,
        };
        Self::load(config.engine_path(), entry_points)
    }

    /// Bind entry points that are already linked into this process.
    ///
    /// # Safety
    ///
    /// `exec` and `free` must honour the engine contract: every successful
    /// `exec` result is released by exactly one `free` with the same pointer
    /// and length, and `free` accepts nothing else.
    pub unsafe fn from_entry_points(exec: ExecFn, free: FreeFn) -> Self {
        Self {
            exec,
            free,
            path: None,
            _library: None,
        }
    }

    /// Path of the loaded library, `None` for in-process entry points
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Call the engine and wrap a successful output in a [`NativeOutput`].
    ///
    /// Returns `None` when the engine reports failure; nothing is freed in
    /// that case. Only a flag of exactly 1 counts as success.
    pub(crate) fn call(&self, program: &CString, input: &[u8]) -> Option<NativeOutput<'_>> {
        let raw = self.call_raw(program, input);
        match raw.success {
            1 => {}
            0 => return None,
            flag => {
                warn!(flag, "engine returned an unknown success flag, treating as failure");
                return None;
            }
        }
        if raw.output.is_null() {
            if raw.output_length != 0 {
                warn!(
                    length = raw.output_length,
                    "engine reported success with a null output buffer"
                );
                return None;
            }
            return Some(NativeOutput::empty(self));
        }
        Some(NativeOutput {
            ptr: raw.output,
            len: raw.output_length,
            handle: self,
        })
    }

    /// Call the engine and return the raw result untouched. Whatever it
    /// returns is never released; only the leak diagnostic uses this.
    pub(crate) fn call_raw(&self, program: &CString, input: &[u8]) -> NativeResult {
        // Safety: `program` is NUL-terminated and `input` is valid for
        // `input.len()` bytes for the duration of the call.
        unsafe { (self.exec)(program.as_ptr(), input.as_ptr(), input.len()) }
    }
}

impl fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeHandle")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

unsafe fn bind<T: Copy>(library: &Library, name: &str, path: &Path) -> BridgeResult<T> {
    let symbol = library
        .get::<T>(name.as_bytes())
        .map_err(|e| BridgeError::SymbolNotFound {
            symbol: name.to_string(),
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    Ok(*symbol)
}

/// Ownership token for one successful engine output.
///
/// Holds the exact pointer/length pair returned by one `exec` call. The pair
/// is released through the engine's `free` exactly once: when the token is
/// consumed by [`NativeOutput::into_vec`], or when it is dropped unconsumed.
pub(crate) struct NativeOutput<'h> {
    ptr: *mut c_uchar,
    len: usize,
    handle: &'h NativeHandle,
}

impl<'h> NativeOutput<'h> {
    fn empty(handle: &'h NativeHandle) -> Self {
        Self {
            ptr: std::ptr::null_mut(),
            len: 0,
            handle,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Copy the output into runtime-owned memory, then release the original
    pub(crate) fn into_vec(self) -> Vec<u8> {
        if self.ptr.is_null() || self.len == 0 {
            return Vec::new();
        }
        // Safety: the engine guarantees `ptr` is valid for `len` bytes until
        // it is freed, which only happens when `self` drops below.
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }.to_vec()
    }
}

impl Drop for NativeOutput<'_> {
    fn drop(&mut self) {
        if self.ptr.is_null() {
            return;
        }
        // Safety: this is the only place the pair is released, and `Drop`
        // runs once per token.
        unsafe { (self.handle.free)(self.ptr, self.len) };
    }
}

/// Construct the platform-specific library filename
pub fn library_filename(stem: &str, extension: Option<&str>) -> String {
    let extension = extension.unwrap_or(default_extension());
    if extension == "dll" {
        format!("{}.{}", stem, extension)
    } else {
        format!("lib{}.{}", stem, extension)
    }
}

fn default_extension() -> &'static str {
    #[cfg(target_os = "macos")]
    {
        "dylib"
    }

    #[cfg(target_os = "windows")]
    {
        "dll"
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        "so"
    }
}
