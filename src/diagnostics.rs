//! Memory Diagnostics
//!
//! Demonstrates that the free handshake works: the same program is run many
//! times through the bridge, then many times through the raw entry point
//! with every result deliberately left unfreed, and peak resident memory is
//! compared. The first batch should stay flat; the second grows with
//! `iterations * output size`.

use tracing::debug;

use crate::bridge::Bridge;
use crate::error::BridgeResult;

/// Peak resident set size of this process in kilobytes.
///
/// Linux reports `ru_maxrss` in kilobytes, macOS in bytes; both are
/// normalised to kilobytes. `None` where `getrusage` is unavailable.
pub fn max_resident_kb() -> Option<u64> {
    #[cfg(unix)]
    {
        let mut usage = std::mem::MaybeUninit::<libc::rusage>::zeroed();
        // Safety: getrusage fills the struct on success
        let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, usage.as_mut_ptr()) };
        if rc != 0 {
            return None;
        }
        let max_rss = unsafe { usage.assume_init() }.ru_maxrss as u64;
        if cfg!(target_os = "macos") {
            Some(max_rss / 1024)
        } else {
            Some(max_rss)
        }
    }

    #[cfg(not(unix))]
    {
        None
    }
}

/// Peak resident memory before and after one batch of calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryReport {
    pub before_kb: u64,
    pub after_kb: u64,
    /// Growth expected if nothing were freed
    pub expected_kb: u64,
}

impl MemoryReport {
    pub fn growth_kb(&self) -> u64 {
        self.after_kb.saturating_sub(self.before_kb)
    }
}

/// Results of [`memory_check`]
#[derive(Debug, Clone, Copy)]
pub struct MemoryCheck {
    pub iterations: usize,
    /// Bytes emitted by one run of the program
    pub output_len: usize,
    /// Batch run through the bridge, releasing every result
    pub freed: MemoryReport,
    /// Batch run through the raw entry point, releasing nothing
    pub leaked: MemoryReport,
}

/// Run `program` `iterations` times with and without freeing.
///
/// The leaking batch really leaks: its memory stays allocated until the
/// process exits. Memory figures are zero where `getrusage` is unavailable.
pub fn memory_check(
    bridge: &Bridge,
    program: &[u8],
    iterations: usize,
) -> BridgeResult<MemoryCheck> {
    let output_len = bridge.run(program, &[])?.len();
    let expected_kb = (iterations * output_len / 1024) as u64;

    let before_kb = max_resident_kb().unwrap_or(0);
    for _ in 0..iterations {
        bridge.execute_program(program)?;
    }
    let freed = MemoryReport {
        before_kb,
        after_kb: max_resident_kb().unwrap_or(0),
        expected_kb,
    };
    debug!(?freed, "freeing batch finished");

    let before_kb = max_resident_kb().unwrap_or(0);
    bridge.leak_batch(program, iterations)?;
    let leaked = MemoryReport {
        before_kb,
        after_kb: max_resident_kb().unwrap_or(0),
        expected_kb,
    };
    debug!(?leaked, "leaking batch finished");

    Ok(MemoryCheck {
        iterations,
        output_len,
        freed,
        leaked,
    })
}
