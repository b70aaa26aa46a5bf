//! Error taxonomy (spec.md §7). Three kinds, matching the teacher's
//! `ImplementationError` / `ParseError` / `ProductionError` split: grammar
//! construction/analysis errors throw, scan errors report a position,
//! parse errors report a position plus the active rule stack.

use crate::position::Position;
use std::fmt::{Display, Formatter};

/// A construction-time or analysis-time grammar assertion failure: invalid
/// name, duplicate symbol, bad token pattern, left recursion, unreachable
/// non-terminal, ambiguous alternative, and so on. These are programmer
/// errors in the grammar text and are always fatal to `check()`/`expect()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrammarError {
    pub what: String,
    pub message: String,
}

impl GrammarError {
    pub fn new(what: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            what: what.into(),
            message: message.into(),
        }
    }
}

impl Display for GrammarError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "GrammarError: {} - {}", self.what, self.message)
    }
}

impl std::error::Error for GrammarError {}

/// A scanner failure: the master regular expression matched nothing at the
/// current offset (an illegal character) or the input ended mid-pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanError {
    pub pointer: usize,
    pub position: Position,
    pub message: String,
}

impl ScanError {
    pub fn new(pointer: usize, position: Position, message: impl Into<String>) -> Self {
        Self {
            pointer,
            position,
            message: message.into(),
        }
    }
}

impl Display for ScanError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ScanError at {}: {}", self.position, self.message)
    }
}

impl std::error::Error for ScanError {}

/// An LL(1)/LR(0)/SLR(1) parse-time failure: unexpected lookahead, an
/// action that raised a fatal error, or (LR) an unrecoverable panic-mode
/// pop of the empty state stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub pointer: usize,
    pub position: Position,
    pub message: String,
    pub rule_stack: Vec<&'static str>,
}

impl ParseError {
    pub fn new(
        pointer: usize,
        position: Position,
        message: impl Into<String>,
        rule_stack: Vec<&'static str>,
    ) -> Self {
        Self {
            pointer,
            position,
            message: message.into(),
            rule_stack,
        }
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SyntaxError: {} at {}", self.message, self.position)?;
        if !self.rule_stack.is_empty() {
            write!(f, " (in {})", self.rule_stack.join(" > "))?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

/// An error raised by a user-supplied semantic action. `Recoverable`
/// increments the grammar's error counter and lets parsing continue;
/// `Fatal` unwinds the parse immediately (spec.md §6 "Parser -> action
/// contract").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    Recoverable(String),
    Fatal(String),
}

impl Display for ActionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionError::Recoverable(m) => write!(f, "{}", m),
            ActionError::Fatal(m) => write!(f, "{}", m),
        }
    }
}

impl std::error::Error for ActionError {}
