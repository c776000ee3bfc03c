//! Tape Machine
//!
//! Executes a tokenized program against an in-memory input buffer and
//! collects everything the program emits.

use crate::token::Token;
use crate::EngineError;

/// Interpreter state for a single run
pub struct Machine<'a> {
    program: Vec<Token>,
    /// Matching bracket index for every `[` and `]`
    jumps: Vec<usize>,
    tape: Vec<u8>,
    head: usize,
    input: &'a [u8],
    output: Vec<u8>,
}

impl<'a> Machine<'a> {
    /// Prepare a program for execution, validating bracket structure up front
    pub fn new(source: &str, input: &'a [u8]) -> Result<Self, EngineError> {
        let program = Token::parse(source);
        let jumps = match_brackets(&program)?;
        Ok(Self {
            program,
            jumps,
            tape: vec![0],
            head: 0,
            input,
            output: Vec::new(),
        })
    }

    /// Run to completion and return the emitted bytes
    pub fn run(mut self) -> Vec<u8> {
        let mut pc = 0;
        while let Some(&token) = self.program.get(pc) {
            match token {
                Token::Right => {
                    self.head += 1;
                    if self.head == self.tape.len() {
                        self.tape.push(0);
                    }
                }
                Token::Left => {
                    // Tape is unbounded to the left as well
                    if self.head == 0 {
                        self.tape.insert(0, 0);
                    } else {
                        self.head -= 1;
                    }
                }
                Token::Inc => self.tape[self.head] = self.tape[self.head].wrapping_add(1),
                Token::Dec => self.tape[self.head] = self.tape[self.head].wrapping_sub(1),
                Token::Output => self.output.push(self.tape[self.head]),
                Token::Input => {
                    // End of input leaves the cell untouched
                    if let Some((&byte, rest)) = self.input.split_first() {
                        self.tape[self.head] = byte;
                        self.input = rest;
                    }
                }
                Token::LoopStart => {
                    if self.tape[self.head] == 0 {
                        pc = self.jumps[pc];
                    }
                }
                Token::LoopEnd => {
                    if self.tape[self.head] != 0 {
                        pc = self.jumps[pc];
                    }
                }
            }
            pc += 1;
        }
        self.output
    }
}

fn match_brackets(program: &[Token]) -> Result<Vec<usize>, EngineError> {
    let mut jumps = vec![0; program.len()];
    let mut open = Vec::new();
    for (pc, token) in program.iter().enumerate() {
        match token {
            Token::LoopStart => open.push(pc),
            Token::LoopEnd => {
                let start = open.pop().ok_or(EngineError::UnmatchedLoopEnd(pc))?;
                jumps[start] = pc;
                jumps[pc] = start;
            }
            _ => {}
        }
    }
    match open.pop() {
        Some(start) => Err(EngineError::UnmatchedLoopStart(start)),
        None => Ok(jumps),
    }
}
