//! C2: scanner builder. Assembles one master regular expression from a
//! grammar's literals and tokens and uses it to tokenize an input buffer
//! into `(line, terminal, value)` tuples.
//!
//! Grounded on the teacher crate's `Tokenizer::tokenize` loop (`src/tokenization.rs`):
//! walk forward from `pointer`, try each lexeme, emit a `Lex` on success, and
//! stop with a synthesized end-of-file lex when the pointer reaches the end
//! of the buffer. Here the "try each lexeme in turn" linear scan is replaced
//! by one alternation-compiled `regex::bytes::Regex`, per spec.md §4.2.

use regex::bytes::Regex;
use std::collections::HashMap;

use crate::error::GrammarError;
use crate::position::{Code, Position};
use crate::symbol::{LitId, SymbolTable, TokId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanTerminal {
    Lit(LitId),
    Tok(TokId),
    Eof,
}

#[derive(Debug, Clone)]
pub struct ScanTuple {
    pub lineno: usize,
    pub terminal: Option<ScanTerminal>,
    pub value: String,
    pub start: usize,
    pub position: Position,
}

/// The compiled master pattern plus enough bookkeeping to recover which
/// terminal a given capture group stands for, and to promote token matches
/// to a screened literal.
pub struct Scanner {
    master: Regex,
    skip_group: usize,
    /// index (capture-group offset from `skip_group + 1`) -> resolved terminal
    group_terminal: Vec<ScanTerminal>,
    /// token ordinal -> literal it screens, when the token's pattern
    /// matched text equals the literal's own value exactly.
    screen: HashMap<TokId, LitId>,
}

impl Scanner {
    /// Build the scanner per spec.md §4.2:
    /// 1. filter used, non-empty literals/tokens
    /// 2. sort literals by decreasing value length; tokens by ascending name
    /// 3. detect screening (a token whose pattern exactly matches a literal's value)
    /// 4. compile `/^(skip) | (tok1) | .. | (litk)/`
    pub fn build(table: &SymbolTable, skip_pattern: &str) -> Result<Self, GrammarError> {
        let mut lits: Vec<(LitId, String)> = table
            .lits()
            .iter()
            .enumerate()
            .filter(|(i, l)| *i != table.eof().0 && l.used && !l.value.is_empty())
            .map(|(i, l)| (LitId(i), l.value.clone()))
            .collect();
        lits.sort_by(|a, b| b.1.len().cmp(&a.1.len()));

        let mut toks: Vec<(TokId, String, String)> = table
            .toks()
            .iter()
            .enumerate()
            .filter(|(_, t)| t.used && !t.name.is_empty())
            .map(|(i, t)| (TokId(i), t.name.clone(), t.pattern.clone()))
            .collect();
        toks.sort_by(|a, b| a.1.cmp(&b.1));

        // Screening: a token whose pattern matches exactly (and only) one
        // literal's value promotes that literal under the token.
        let mut screen: HashMap<TokId, LitId> = HashMap::new();
        let mut screened_by: HashMap<LitId, usize> = HashMap::new();
        for (tok_id, _name, pattern) in &toks {
            let re = Regex::new(pattern).map_err(|e| {
                GrammarError::new("invalid-pattern", format!("bad token pattern: {}", e))
            })?;
            for (lit_id, value) in &lits {
                if let Some(m) = re.find(value.as_bytes()) {
                    if m.start() == 0 && m.end() == value.len() {
                        screen.insert(*tok_id, *lit_id);
                        *screened_by.entry(*lit_id).or_insert(0) += 1;
                    }
                }
            }
        }
        for (lit_id, count) in &screened_by {
            if *count > 1 {
                return Err(GrammarError::new(
                    "ambiguous-screen",
                    format!(
                        "literal {:?} is screened by more than one token pattern",
                        lit_id
                    ),
                ));
            }
        }
        let screened_lits: std::collections::HashSet<LitId> = screen.values().copied().collect();
        let non_screened_lits: Vec<&(LitId, String)> =
            lits.iter().filter(|(id, _)| !screened_lits.contains(id)).collect();

        let mut pattern = String::new();
        pattern.push_str("^(?:(");
        pattern.push_str(skip_pattern);
        pattern.push(')');
        let skip_group = 1;
        let mut group_terminal = Vec::new();

        for (tok_id, _name, tok_pattern) in &toks {
            pattern.push_str("|(");
            pattern.push_str(&strip_anchor(tok_pattern));
            pattern.push(')');
            group_terminal.push(ScanTerminal::Tok(*tok_id));
        }
        for (lit_id, value) in &non_screened_lits {
            pattern.push_str("|(");
            pattern.push_str(&regex::escape(value));
            pattern.push(')');
            group_terminal.push(ScanTerminal::Lit(*lit_id));
        }
        pattern.push(')');

        let master = Regex::new(&pattern)
            .map_err(|e| GrammarError::new("invalid-pattern", format!("master pattern: {}", e)))?;

        Ok(Self {
            master,
            skip_group,
            group_terminal,
            screen,
        })
    }

    /// Tokenize `code` into a tuple stream. Every returned tuple carries
    /// either a resolved terminal or `None` (illegal character); consecutive
    /// illegal bytes are coalesced into a single tuple covering the gap.
    /// Ignored (skip) spans never produce a tuple. The stream always ends
    /// with one `ScanTerminal::Eof` tuple.
    pub fn scan(&self, code: &Code) -> Vec<ScanTuple> {
        let mut out = Vec::new();
        let mut pointer = 0usize;
        let len = code.len();
        let mut illegal_start: Option<usize> = None;

        while pointer < len {
            match self.master.captures(&code.value[pointer..]) {
                Some(caps) if caps.get(0).map_or(false, |m| m.start() == 0) => {
                    if let Some(start) = illegal_start.take() {
                        out.push(self.illegal_tuple(code, start, pointer));
                    }
                    let whole = caps.get(0).unwrap();
                    let end = pointer + whole.end();
                    if caps.get(self.skip_group).is_some() {
                        pointer = end;
                        continue;
                    }
                    let group_index = (self.skip_group + 1..=self.skip_group + self.group_terminal.len())
                        .find(|&i| caps.get(i).is_some())
                        .expect("master pattern matched but no alternative group captured");
                    let terminal = self.group_terminal[group_index - self.skip_group - 1];
                    let resolved = self.resolve_screen(terminal);
                    let value = String::from_utf8_lossy(&code.value[pointer..end]).into_owned();
                    out.push(ScanTuple {
                        lineno: code.position(pointer).line,
                        terminal: Some(resolved),
                        value,
                        start: pointer,
                        position: code.position(pointer),
                    });
                    pointer = end;
                }
                _ => {
                    if illegal_start.is_none() {
                        illegal_start = Some(pointer);
                    }
                    pointer += 1;
                }
            }
        }
        if let Some(start) = illegal_start.take() {
            out.push(self.illegal_tuple(code, start, pointer));
        }
        out.push(ScanTuple {
            lineno: code.position(len).line,
            terminal: Some(ScanTerminal::Eof),
            value: String::new(),
            start: len,
            position: code.position(len),
        });
        out
    }

    fn resolve_screen(&self, terminal: ScanTerminal) -> ScanTerminal {
        match terminal {
            ScanTerminal::Tok(t) => match self.screen.get(&t) {
                Some(lit) => ScanTerminal::Lit(*lit),
                None => terminal,
            },
            other => other,
        }
    }

    fn illegal_tuple(&self, code: &Code, start: usize, end: usize) -> ScanTuple {
        ScanTuple {
            lineno: code.position(start).line,
            terminal: None,
            value: String::from_utf8_lossy(&code.value[start..end]).into_owned(),
            start,
            position: code.position(start),
        }
    }
}

/// Token patterns are typically written anchor-free by grammar authors; if
/// one was written with a leading `^` (common when lifted from a teacher-style
/// `Pattern::new` call) strip it since the master pattern supplies its own.
fn strip_anchor(pattern: &str) -> String {
    pattern.strip_prefix('^').unwrap_or(pattern).to_string()
}
