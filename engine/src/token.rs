//! Program Tokens
//!
//! The eight tape-machine commands and their source characters.

use std::fmt;

/// A single machine command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    /// `>` move the head right
    Right,
    /// `<` move the head left
    Left,
    /// `+` increment the current cell
    Inc,
    /// `-` decrement the current cell
    Dec,
    /// `.` emit the current cell
    Output,
    /// `,` read one input byte into the current cell
    Input,
    /// `[` jump past the matching `]` if the current cell is zero
    LoopStart,
    /// `]` jump back to the matching `[` if the current cell is non-zero
    LoopEnd,
}

impl Token {
    /// Decode a source character, `None` for anything that is not a command
    pub fn decode(c: char) -> Option<Self> {
        match c {
            '>' => Some(Token::Right),
            '<' => Some(Token::Left),
            '+' => Some(Token::Inc),
            '-' => Some(Token::Dec),
            '.' => Some(Token::Output),
            ',' => Some(Token::Input),
            '[' => Some(Token::LoopStart),
            ']' => Some(Token::LoopEnd),
            _ => None,
        }
    }

    /// Source character for this command
    pub fn encode(self) -> char {
        match self {
            Token::Right => '>',
            Token::Left => '<',
            Token::Inc => '+',
            Token::Dec => '-',
            Token::Output => '.',
            Token::Input => ',',
            Token::LoopStart => '[',
            Token::LoopEnd => ']',
        }
    }

    /// Tokenize a program, skipping every non-command character
    pub fn parse(source: &str) -> Vec<Token> {
        source.chars().filter_map(Token::decode).collect()
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}
