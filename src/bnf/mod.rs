//! C5: BNF grammar model. Ordered-pair rules (`NT -> [symbol...]`), BNF-style
//! `first`/`follow` computation, and the flags (`reached`, `finite`, `empty`,
//! `reduced`) the LR item-set builder (C6) needs.
//!
//! Grounded on the same first/reachability fixpoint shape as the teacher's
//! `IProduction::impl_first_set` / `obtain_nullability`, generalized from a
//! recursive-descent combinator tree to ordered-pair rules over a flat
//! `Vec<BnfRule>` arena, as called for by the LR engine's "canonical
//! collection of item sets" (spec.md §4.6) which needs random-access
//! indexing into rules by number.

pub mod lr;
pub mod parser;

use std::collections::{HashMap, HashSet};

use crate::error::GrammarError;
use crate::symbol::{Assoc, LevelId, NtId, SymbolTable, Terminal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BnfRuleId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Symbol {
    Term(Terminal),
    Nt(NtId),
}

pub type Action = Box<dyn Fn(Vec<crate::ll::Value>) -> Result<crate::ll::Value, crate::error::ActionError>>;

/// Marks a rule synthesized by [`crate::lower::Lowerer`] for `[...]`/`{...}`
/// whose reduction needs to flatten its value instead of taking a named
/// user action or the bare `Value::List(args)` default (spec.md §4.8): the
/// lowerer installs one of these so a synthesized rule's result keeps the
/// same shape an EBNF-mode action would see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthAction {
    /// First repetition of a `{...}`: wrap the matched symbols as the sole
    /// element of a new flat list.
    ManyBase,
    /// Later repetitions of a `{...}`: extend the left operand's flat list
    /// with one more element for the symbols just matched.
    ManyRepeat,
    /// The empty alternative of a `[...]`: yield the null value rather than
    /// an empty `Value::List`.
    OptEmpty,
}

pub struct BnfRule {
    pub index: usize,
    pub lhs: NtId,
    pub rhs: Vec<Symbol>,
    pub action_name: Option<&'static str>,
    pub synthetic: Option<SynthAction>,
    pub precedence: Option<(LevelId, Assoc, Terminal)>,
    pub first: HashSet<Terminal>,
    pub follow_contrib: HashSet<Terminal>,
    pub empty: bool,
    pub reached: bool,
    pub finite: bool,
    pub reduced: bool,
}

impl BnfRule {
    pub fn is_complete_at(&self, position: usize) -> bool {
        position == self.rhs.len()
    }
}

pub const ACCEPT_NAME: &str = "$accept";

/// Owns the rule arena and the synthesized `$accept -> start $eof` rule 0
/// (spec.md §3 invariant: "Rule 0 of a BNF grammar is the synthesized
/// `$accept -> start $eof`").
pub struct BnfGrammar {
    pub symbols: SymbolTable,
    rules: Vec<BnfRule>,
    nt_rules: HashMap<NtId, Vec<BnfRuleId>>,
    pub start_nt: NtId,
    pub accept_nt: NtId,
    follow: Vec<HashSet<Terminal>>,
}

impl BnfGrammar {
    pub fn new(mut symbols: SymbolTable, start_nt: NtId) -> Self {
        let accept_nt = symbols.synth_nt(ACCEPT_NAME);
        let eof = Terminal::Lit(symbols.eof());
        let mut grammar = Self {
            symbols,
            rules: Vec::new(),
            nt_rules: HashMap::new(),
            start_nt,
            accept_nt,
            follow: Vec::new(),
        };
        grammar.add_rule(accept_nt, vec![Symbol::Nt(start_nt), Symbol::Term(eof)], None, None);
        grammar
    }

    pub fn add_rule(
        &mut self,
        lhs: NtId,
        rhs: Vec<Symbol>,
        action_name: Option<&'static str>,
        explicit_prec: Option<(LevelId, Assoc, Terminal)>,
    ) -> BnfRuleId {
        let index = self.rules.len();
        let precedence = explicit_prec.or_else(|| self.rightmost_terminal_precedence(&rhs));
        let rule = BnfRule {
            index,
            lhs,
            rhs,
            action_name,
            synthetic: None,
            precedence,
            first: HashSet::new(),
            follow_contrib: HashSet::new(),
            empty: false,
            reached: false,
            finite: false,
            reduced: false,
        };
        let id = BnfRuleId(index);
        self.rules.push(rule);
        self.nt_rules.entry(lhs).or_default().push(id);
        id
    }

    /// Like [`Self::add_rule`] but tags the rule with a [`SynthAction`]
    /// instead of a named user action; used only by the EBNF->BNF lowerer
    /// for rules synthesized out of `[...]`/`{...}` constructs.
    pub fn add_synth_rule(
        &mut self,
        lhs: NtId,
        rhs: Vec<Symbol>,
        synthetic: SynthAction,
        explicit_prec: Option<(LevelId, Assoc, Terminal)>,
    ) -> BnfRuleId {
        let id = self.add_rule(lhs, rhs, None, explicit_prec);
        self.rule_mut(id).synthetic = Some(synthetic);
        id
    }

    fn rightmost_terminal_precedence(&self, rhs: &[Symbol]) -> Option<(LevelId, Assoc, Terminal)> {
        rhs.iter().rev().find_map(|s| match s {
            Symbol::Term(t) => self
                .symbols
                .precedence_of(*t)
                .map(|(level, assoc)| (level, assoc, *t)),
            Symbol::Nt(_) => None,
        })
    }

    pub fn rule(&self, id: BnfRuleId) -> &BnfRule {
        &self.rules[id.0]
    }
    pub fn rule_mut(&mut self, id: BnfRuleId) -> &mut BnfRule {
        &mut self.rules[id.0]
    }
    pub fn rules(&self) -> &[BnfRule] {
        &self.rules
    }
    pub fn rules_of(&self, nt: NtId) -> &[BnfRuleId] {
        self.nt_rules.get(&nt).map(|v| v.as_slice()).unwrap_or(&[])
    }
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
    pub fn follow_of(&self, nt: NtId) -> &HashSet<Terminal> {
        &self.follow[nt.0]
    }

    /// Runs `reached`, `finite`, `empty`, `first`, `follow` in that order
    /// (spec.md §4.5). Each is a monotone fixpoint over the rule set.
    pub fn analyze(&mut self) -> Result<(), Vec<GrammarError>> {
        self.compute_reached();
        self.compute_finite();
        self.compute_empty();
        self.compute_first();
        self.compute_follow();

        let mut errors = Vec::new();
        for rule_idx in 0..self.rules.len() {
            let rule = &self.rules[rule_idx];
            if !rule.reached {
                errors.push(GrammarError::new(
                    "unreachable-rule",
                    format!(
                        "rule {} ('{}') is never reached from the start symbol",
                        rule.index,
                        self.symbols.non_terminal(rule.lhs).name
                    ),
                ));
            }
            if !rule.finite {
                errors.push(GrammarError::new(
                    "non-finite-rule",
                    format!(
                        "non-terminal '{}' cannot be derived in a finite number of steps",
                        self.symbols.non_terminal(rule.lhs).name
                    ),
                ));
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn compute_reached(&mut self) {
        let mut reached_nts: HashSet<NtId> = HashSet::new();
        reached_nts.insert(self.accept_nt);
        let mut stack = vec![self.accept_nt];
        while let Some(nt) = stack.pop() {
            for rid in self.rules_of(nt).to_vec() {
                for sym in self.rule(rid).rhs.clone() {
                    if let Symbol::Nt(child) = sym {
                        if reached_nts.insert(child) {
                            stack.push(child);
                        }
                    }
                }
            }
        }
        for rule in self.rules.iter_mut() {
            rule.reached = reached_nts.contains(&rule.lhs);
        }
    }

    fn compute_finite(&mut self) {
        loop {
            let mut changed = false;
            for idx in 0..self.rules.len() {
                if self.rules[idx].finite {
                    continue;
                }
                let is_finite = self.rules[idx].rhs.iter().all(|s| match s {
                    Symbol::Term(_) => true,
                    Symbol::Nt(nt) => self.rules_of(*nt).iter().any(|r| self.rules[r.0].finite),
                });
                if is_finite {
                    self.rules[idx].finite = true;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
    }

    fn compute_empty(&mut self) {
        loop {
            let mut changed = false;
            for idx in 0..self.rules.len() {
                if self.rules[idx].empty {
                    continue;
                }
                if self.rules[idx].rhs.is_empty() {
                    self.rules[idx].empty = true;
                    changed = true;
                    continue;
                }
                let is_empty = self.rules[idx].rhs.iter().all(|s| match s {
                    Symbol::Term(_) => false,
                    Symbol::Nt(nt) => self.rules_of(*nt).iter().any(|r| self.rules[r.0].empty),
                });
                if is_empty {
                    self.rules[idx].empty = true;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
    }

    fn nt_is_empty(&self, nt: NtId) -> bool {
        self.rules_of(nt).iter().any(|r| self.rules[r.0].empty)
    }

    fn nt_first(&self, nt: NtId) -> HashSet<Terminal> {
        let mut acc = HashSet::new();
        for rid in self.rules_of(nt) {
            acc.extend(self.rules[rid.0].first.iter().copied());
        }
        acc
    }

    fn compute_first(&mut self) {
        loop {
            let mut changed = false;
            for idx in 0..self.rules.len() {
                let rhs = self.rules[idx].rhs.clone();
                let mut acc = HashSet::new();
                for sym in &rhs {
                    match sym {
                        Symbol::Term(t) => {
                            acc.insert(*t);
                            break;
                        }
                        Symbol::Nt(nt) => {
                            acc.extend(self.nt_first(*nt));
                            if !self.nt_is_empty(*nt) {
                                break;
                            }
                        }
                    }
                }
                let before = self.rules[idx].first.len();
                self.rules[idx].first.extend(acc);
                if self.rules[idx].first.len() != before {
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
    }

    fn compute_follow(&mut self) {
        self.follow = vec![HashSet::new(); self.symbols.nts().len()];
        let eof = Terminal::Lit(self.symbols.eof());
        self.follow[self.accept_nt.0].insert(eof);
        loop {
            let mut changed = false;
            for idx in 0..self.rules.len() {
                let lhs = self.rules[idx].lhs;
                let rhs = self.rules[idx].rhs.clone();
                for (pos, sym) in rhs.iter().enumerate() {
                    if let Symbol::Nt(nt) = sym {
                        let suffix = &rhs[pos + 1..];
                        let mut add = HashSet::new();
                        let mut suffix_empty = true;
                        for s in suffix {
                            match s {
                                Symbol::Term(t) => {
                                    add.insert(*t);
                                    suffix_empty = false;
                                    break;
                                }
                                Symbol::Nt(snt) => {
                                    add.extend(self.nt_first(*snt));
                                    if !self.nt_is_empty(*snt) {
                                        suffix_empty = false;
                                        break;
                                    }
                                }
                            }
                        }
                        if suffix_empty {
                            add.extend(self.follow[lhs.0].iter().copied());
                        }
                        let before = self.follow[nt.0].len();
                        self.follow[nt.0].extend(add);
                        if self.follow[nt.0].len() != before {
                            changed = true;
                        }
                    }
                }
            }
            if !changed {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::SymbolTable;

    fn arith_grammar() -> BnfGrammar {
        let mut symbols = SymbolTable::new();
        let plus = Terminal::Lit(symbols.lit("+").unwrap());
        let star = Terminal::Lit(symbols.lit("*").unwrap());
        let number = Terminal::Tok(symbols.token("Number", "[0-9]+").unwrap());
        symbols.precedence(Assoc::Left, vec![plus]).unwrap();
        symbols.precedence(Assoc::Left, vec![star]).unwrap();
        let expr = symbols.nt("expr").unwrap();
        let mut g = BnfGrammar::new(symbols, expr);
        g.add_rule(expr, vec![Symbol::Nt(expr), Symbol::Term(plus), Symbol::Nt(expr)], None, None);
        g.add_rule(expr, vec![Symbol::Nt(expr), Symbol::Term(star), Symbol::Nt(expr)], None, None);
        g.add_rule(expr, vec![Symbol::Term(number)], None, None);
        g
    }

    #[test]
    fn every_rule_is_reached_and_finite() {
        let mut g = arith_grammar();
        g.analyze().unwrap();
        for rule in g.rules() {
            assert!(rule.reached, "rule {} should be reached", rule.index);
            assert!(rule.finite, "rule {} should be finite", rule.index);
        }
    }

    #[test]
    fn rule_precedence_defaults_to_rightmost_terminal() {
        let g = arith_grammar();
        let plus_rule = g.rule(BnfRuleId(1));
        assert!(plus_rule.precedence.is_some());
    }

    #[test]
    fn unreachable_nonterminal_is_reported() {
        let mut symbols = SymbolTable::new();
        let a = Terminal::Lit(symbols.lit("a").unwrap());
        let start = symbols.nt("start").unwrap();
        let orphan = symbols.nt("orphan").unwrap();
        let mut g = BnfGrammar::new(symbols, start);
        g.add_rule(start, vec![Symbol::Term(a)], None, None);
        g.add_rule(orphan, vec![Symbol::Term(a)], None, None);
        let err = g.analyze().unwrap_err();
        assert!(err.iter().any(|e| e.what == "unreachable-rule"));
    }
}
