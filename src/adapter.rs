//! Program Adapters
//!
//! Application-level wrappers that give a stored program a typed interface.
//! Domain validation (argument ranges, output decoding) lives here; the
//! bridge below stays payload-agnostic.

use thiserror::Error;

use crate::bridge::Bridge;
use crate::error::BridgeError;

/// Well-known programs
pub mod programs {
    /// Reads two bytes and emits their sum (mod 256)
    pub const ADD: &[u8] = b",>,<[->+<]>.";

    /// Copies input to output until a zero byte or end of input
    pub const ECHO: &[u8] = b",[.[-],]";

    /// Emits `Hello, World!`
    pub const HELLO_WORLD: &[u8] =
        b"+[-->-[>>+>-----<<]<--<---]>-.>>>+.>>..+++[.>]<<<<.+++.------.<<-.>>>>+.";

    /// Emits a 32-row Sierpinski triangle
    pub const SIERPINSKI: &[u8] = b"
        ++++++++[>+>++++<<-]>++>>+<[-[>>+<<-]+>>]>+[
            -<<<[
                ->[+[-]+>++>>>-<<]<[<]>>++++++[<<+++++>>-]+<<++.[-]<<
            ]>.>+[>>]>+
        ]";

    /// Nested countdown from 255, emitting 255 * 255 bytes
    pub const COUNTDOWN: &[u8] = b"-[->-[-.]<]";

    /// Output size of [`COUNTDOWN`]
    pub const COUNTDOWN_OUTPUT_LEN: usize = 255 * 255;
}

/// Errors raised by adapters
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("argument {0} does not fit in u8")]
    OutOfRange(u32),

    #[error("engine output was empty")]
    EmptyOutput,

    #[error("engine output is not valid UTF-8")]
    InvalidText(#[from] std::string::FromUtf8Error),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

/// Adds two 8-bit values on the engine.
///
/// Arguments above 255 are rejected before the engine is called. Sums wrap
/// modulo 256, matching the engine's cell arithmetic: `add(200, 100) == 44`.
pub struct U8Adder<'b> {
    bridge: &'b Bridge,
}

impl<'b> U8Adder<'b> {
    pub fn new(bridge: &'b Bridge) -> Self {
        Self { bridge }
    }

    pub fn add(&self, a: u32, b: u32) -> Result<u8, AdapterError> {
        let a = u8::try_from(a).map_err(|_| AdapterError::OutOfRange(a))?;
        let b = u8::try_from(b).map_err(|_| AdapterError::OutOfRange(b))?;
        let output = self.bridge.run(programs::ADD, &[a, b])?;
        output.first().copied().ok_or(AdapterError::EmptyOutput)
    }
}

/// Render the Sierpinski triangle on the engine
pub fn sierpinski(bridge: &Bridge) -> Result<String, AdapterError> {
    let output = bridge.run(programs::SIERPINSKI, &[])?;
    Ok(String::from_utf8(output)?)
}

/// Render an order-`n` Sierpinski triangle directly, one line per row, each
/// line newline-terminated. Order 5 matches [`programs::SIERPINSKI`].
pub fn sierpinski_native(n: u32) -> String {
    let mut rendered = sierpinski_rows(n).join("\n");
    rendered.push('\n');
    rendered
}

fn sierpinski_rows(n: u32) -> Vec<String> {
    if n == 0 {
        return vec!["*".to_string()];
    }
    let prev = sierpinski_rows(n - 1);
    let prev_width = prev.last().map_or(0, String::len);
    let gap = prev_width + 1;

    let mut rows = Vec::with_capacity(prev.len() * 2);
    for row in &prev {
        rows.push(format!("{:>w$}", row, w = row.len() + gap / 2));
    }
    for row in &prev {
        rows.push(format!("{}{:>w$}", row, row, w = gap));
    }
    rows
}
