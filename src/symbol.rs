//! C1: symbol inventory. Uniquely names and registers every literal, token
//! and non-terminal in a grammar, and the precedence groups terminals can
//! belong to.
//!
//! Grounded on the teacher crate's lexeme factories (`Pattern::new`,
//! `Punctuations::new`) which validate a pattern/text and register it once;
//! here the "already known -> return existing" memoization the teacher
//! achieves with a `FieldTree` is done with a `HashMap<String, _>` index
//! since names (not byte-tries of constant text) are the lookup key.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;

use crate::error::GrammarError;

static DEFAULT_LIT_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^'(?:[^'\\]|\\.)+'$").unwrap());
static DEFAULT_TOKEN_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LitId(pub usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokId(pub usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NtId(pub usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LevelId(pub usize);

/// A terminal is either a self-representing literal or a pattern-backed
/// token. Ordinals are assigned literals-first, then tokens, so that a
/// single flat `Vec` indexed by ordinal can hold per-terminal analysis data
/// (first/follow sets) for both kinds at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Terminal {
    Lit(LitId),
    Tok(TokId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assoc {
    Left,
    Right,
    NonAssoc,
}

#[derive(Debug, Clone)]
pub struct PrecedenceLevel {
    pub id: LevelId,
    pub assoc: Assoc,
    pub terminals: Vec<Terminal>,
}

#[derive(Debug, Clone)]
pub struct LiteralData {
    pub value: String,
    pub precedence: Option<LevelId>,
    pub used: bool,
    pub screened: bool,
}

#[derive(Debug, Clone)]
pub struct TokenData {
    pub name: String,
    pub pattern: String,
    pub used: bool,
    pub precedence: Option<LevelId>,
}

#[derive(Debug, Clone)]
pub struct NonTerminalData {
    pub name: String,
}

/// The reserved end-of-input literal: always ordinal 0, created eagerly so
/// every grammar shares the same `$eof` identity.
pub const EOF_NAME: &str = "";
/// The reserved LR recovery token, created lazily by [`SymbolTable::error_token`]
/// the first time an LR grammar needs panic-mode recovery.
pub const ERROR_NAME: &str = "";

#[derive(Debug, Clone)]
pub struct SymbolTable {
    lits: Vec<LiteralData>,
    toks: Vec<TokenData>,
    nts: Vec<NonTerminalData>,
    levels: Vec<PrecedenceLevel>,
    lit_by_value: HashMap<String, LitId>,
    tok_by_name: HashMap<String, TokId>,
    nt_by_name: HashMap<String, NtId>,
    lit_name_rx: Regex,
    tok_name_rx: Regex,
    nt_name_rx: Regex,
    error_tok: Option<TokId>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        let mut table = Self {
            lits: Vec::new(),
            toks: Vec::new(),
            nts: Vec::new(),
            levels: Vec::new(),
            lit_by_value: HashMap::new(),
            tok_by_name: HashMap::new(),
            nt_by_name: HashMap::new(),
            lit_name_rx: DEFAULT_LIT_NAME.clone(),
            tok_name_rx: DEFAULT_TOKEN_NAME.clone(),
            nt_name_rx: DEFAULT_TOKEN_NAME.clone(),
            error_tok: None,
        };
        let eof = LitId(table.lits.len());
        table.lits.push(LiteralData {
            value: EOF_NAME.to_string(),
            precedence: None,
            used: true,
            screened: false,
        });
        table.lit_by_value.insert(EOF_NAME.to_string(), eof);
        table
    }

    pub fn with_name_patterns(mut self, lits: Regex, tokens: Regex, nts: Regex) -> Self {
        self.lit_name_rx = lits;
        self.tok_name_rx = tokens;
        self.nt_name_rx = nts;
        self
    }

    pub fn eof(&self) -> LitId {
        LitId(0)
    }

    /// Register (or look up) the literal with exact text `value` (already
    /// unescaped by the caller per spec.md §6's escape table).
    pub fn lit(&mut self, value: &str) -> Result<LitId, GrammarError> {
        if let Some(id) = self.lit_by_value.get(value) {
            return Ok(*id);
        }
        let quoted = format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"));
        if !self.lit_name_rx.is_match(&quoted) && !value.is_empty() {
            return Err(GrammarError::new(
                "invalid-name",
                format!("literal '{}' does not match the configured literal pattern", value),
            ));
        }
        if self.tok_by_name.contains_key(value) || self.nt_by_name.contains_key(value) {
            return Err(GrammarError::new(
                "name-clash",
                format!("'{}' is already registered as a token or non-terminal", value),
            ));
        }
        let id = LitId(self.lits.len());
        self.lits.push(LiteralData {
            value: value.to_string(),
            precedence: None,
            used: true,
            screened: false,
        });
        self.lit_by_value.insert(value.to_string(), id);
        Ok(id)
    }

    pub fn token(&mut self, name: &str, pattern: &str) -> Result<TokId, GrammarError> {
        if let Some(id) = self.tok_by_name.get(name) {
            return Ok(*id);
        }
        if !self.tok_name_rx.is_match(name) {
            return Err(GrammarError::new(
                "invalid-name",
                format!("token name '{}' does not match the configured token pattern", name),
            ));
        }
        if self.lit_by_value.contains_key(name) || self.nt_by_name.contains_key(name) {
            return Err(GrammarError::new(
                "name-clash",
                format!("'{}' is already registered as a literal or non-terminal", name),
            ));
        }
        let regexp = Regex::new(pattern).map_err(|err| {
            GrammarError::new(
                "invalid-pattern",
                format!("token '{}' pattern is not a valid regex: {}", name, err),
            )
        })?;
        if regexp.is_match("") {
            return Err(GrammarError::new(
                "empty-match",
                format!("token '{}' pattern must not match the empty string", name),
            ));
        }
        let id = TokId(self.toks.len());
        self.toks.push(TokenData {
            name: name.to_string(),
            pattern: pattern.to_string(),
            used: true,
            precedence: None,
        });
        self.tok_by_name.insert(name.to_string(), id);
        Ok(id)
    }

    /// The reserved `$error` token used only by the LR engine for panic
    /// mode recovery (spec.md §3 "Symbol universe").
    pub fn error_token(&mut self) -> TokId {
        if let Some(id) = self.error_tok {
            return id;
        }
        let id = TokId(self.toks.len());
        self.toks.push(TokenData {
            name: ERROR_NAME.to_string(),
            pattern: String::new(),
            used: true,
            precedence: None,
        });
        self.error_tok = Some(id);
        id
    }

    pub fn is_error_token(&self, id: TokId) -> bool {
        self.error_tok == Some(id)
    }

    /// The `$error` token if some rule has already registered it via
    /// [`SymbolTable::error_token`], without creating it on demand. Used by
    /// the LR parser's panic-mode recovery, which only needs a read-only
    /// view of the symbol table.
    pub fn error_token_id(&self) -> Option<TokId> {
        self.error_tok
    }

    pub fn nt(&mut self, name: &str) -> Result<NtId, GrammarError> {
        if let Some(id) = self.nt_by_name.get(name) {
            return Ok(*id);
        }
        if !self.nt_name_rx.is_match(name) {
            return Err(GrammarError::new(
                "invalid-name",
                format!("non-terminal name '{}' does not match the configured nt pattern", name),
            ));
        }
        if self.lit_by_value.contains_key(name) || self.tok_by_name.contains_key(name) {
            return Err(GrammarError::new(
                "name-clash",
                format!("'{}' is already registered as a literal or token", name),
            ));
        }
        let id = NtId(self.nts.len());
        self.nts.push(NonTerminalData {
            name: name.to_string(),
        });
        self.nt_by_name.insert(name.to_string(), id);
        Ok(id)
    }

    /// Register a non-terminal bypassing the configured name pattern, for
    /// grammar-internal names that are never typed by a grammar author:
    /// the synthesized `$accept` start symbol (C5) and the lowerer's
    /// `uniq`-prefixed auxiliary non-terminals (C8).
    pub fn synth_nt(&mut self, name: &str) -> NtId {
        if let Some(id) = self.nt_by_name.get(name) {
            return *id;
        }
        let id = NtId(self.nts.len());
        self.nts.push(NonTerminalData {
            name: name.to_string(),
        });
        self.nt_by_name.insert(name.to_string(), id);
        id
    }

    pub fn precedence(&mut self, assoc: Assoc, terminals: Vec<Terminal>) -> Result<LevelId, GrammarError> {
        if terminals.is_empty() {
            return Err(GrammarError::new(
                "empty-precedence",
                "a precedence group must reference at least one terminal",
            ));
        }
        let id = LevelId(self.levels.len() + 1);
        for t in &terminals {
            let existing = match t {
                Terminal::Lit(l) => self.lits[l.0].precedence,
                Terminal::Tok(tk) => self.toks[tk.0].precedence,
            };
            if existing.is_some() {
                return Err(GrammarError::new(
                    "duplicate-precedence",
                    "a terminal may appear in at most one precedence group",
                ));
            }
            match t {
                Terminal::Lit(l) => self.lits[l.0].precedence = Some(id),
                Terminal::Tok(tk) => self.toks[tk.0].precedence = Some(id),
            }
        }
        self.levels.push(PrecedenceLevel {
            id,
            assoc,
            terminals,
        });
        Ok(id)
    }

    pub fn literal(&self, id: LitId) -> &LiteralData {
        &self.lits[id.0]
    }
    pub fn token_data(&self, id: TokId) -> &TokenData {
        &self.toks[id.0]
    }
    pub fn non_terminal(&self, id: NtId) -> &NonTerminalData {
        &self.nts[id.0]
    }
    pub fn level(&self, id: LevelId) -> &PrecedenceLevel {
        &self.levels[id.0 - 1]
    }
    pub fn levels(&self) -> &[PrecedenceLevel] {
        &self.levels
    }
    pub fn lits(&self) -> &[LiteralData] {
        &self.lits
    }
    pub fn toks(&self) -> &[TokenData] {
        &self.toks
    }
    pub fn nts(&self) -> &[NonTerminalData] {
        &self.nts
    }

    pub fn mark_used(&mut self, t: Terminal) {
        match t {
            Terminal::Lit(l) => self.lits[l.0].used = true,
            Terminal::Tok(tk) => self.toks[tk.0].used = true,
        }
    }

    /// Global ordinal: literals first by creation order, then tokens
    /// (spec.md §3 invariant: "every terminal has a unique ordinal...").
    pub fn ordinal(&self, t: Terminal) -> usize {
        match t {
            Terminal::Lit(l) => l.0,
            Terminal::Tok(tk) => self.lits.len() + tk.0,
        }
    }

    pub fn terminal_count(&self) -> usize {
        self.lits.len() + self.toks.len()
    }

    pub fn precedence_of(&self, t: Terminal) -> Option<(LevelId, Assoc)> {
        let lv = match t {
            Terminal::Lit(l) => self.lits[l.0].precedence,
            Terminal::Tok(tk) => self.toks[tk.0].precedence,
        };
        lv.map(|lv| (lv, self.level(lv).assoc))
    }
}

impl fmt::Display for Terminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Terminal::Lit(l) => write!(f, "Lit({})", l.0),
            Terminal::Tok(t) => write!(f, "Tok({})", t.0),
        }
    }
}
