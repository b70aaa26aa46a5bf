//! C6: LR item-set builder. Marked rules, state closure, the canonical
//! collection of item sets (advance), and the shift/reduce/goto/accept
//! message table with precedence-based conflict resolution (spec.md §4.6).

use std::collections::HashMap;

use super::{BnfGrammar, BnfRuleId, Symbol};
use crate::symbol::{Assoc, Terminal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Mark {
    pub rule: BnfRuleId,
    pub position: usize,
}

impl Mark {
    pub fn complete(&self, grammar: &BnfGrammar) -> bool {
        self.position == grammar.rule(self.rule).rhs.len()
    }
    pub fn symbol_at(&self, grammar: &BnfGrammar) -> Option<Symbol> {
        grammar.rule(self.rule).rhs.get(self.position).copied()
    }
    pub fn advance(&self) -> Mark {
        Mark {
            rule: self.rule,
            position: self.position + 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(pub usize);

#[derive(Clone)]
pub enum Message {
    Shift(StateId),
    Goto(StateId),
    Reduce(BnfRuleId),
    Accept,
    Error(String),
}

#[derive(Debug, Clone)]
pub struct LrState {
    pub core_len: usize,
    pub marks: Vec<Mark>,
    pub messages: HashMap<usize, Message>,
}

impl LrState {
    pub fn core(&self) -> &[Mark] {
        &self.marks[..self.core_len]
    }
}

#[derive(Clone)]
enum Slot {
    Pending(Symbol),
    Final(Message),
}

pub struct LrTables {
    pub states: Vec<LrState>,
    pub sr_conflicts: u32,
    pub rr_conflicts: u32,
}

pub fn symbol_key(sym: Symbol, grammar: &BnfGrammar) -> usize {
    match sym {
        Symbol::Term(t) => grammar.symbols.ordinal(t),
        Symbol::Nt(nt) => grammar.symbols.terminal_count() + nt.0,
    }
}

/// Build the canonical LR(0) collection and fill every state's message map,
/// resolving shift/reduce and reduce/reduce conflicts via precedence
/// (spec.md §4.6). `grammar.analyze()` must already have been run so that
/// `follow_of` is populated. Flips `BnfRule::reduced` on for every rule that
/// ends up installed behind a `reduce` or `accept` entry in the finished
/// tables.
pub fn build(grammar: &mut BnfGrammar) -> LrTables {
    let mut states: Vec<LrState> = Vec::new();
    let mut core_index: HashMap<Vec<Mark>, StateId> = HashMap::new();
    let mut sr_conflicts = 0u32;
    let mut rr_conflicts = 0u32;

    let root_core = vec![Mark {
        rule: BnfRuleId(0),
        position: 0,
    }];
    let root_id = StateId(0);
    core_index.insert(normalize(&root_core), root_id);
    states.push(LrState {
        core_len: root_core.len(),
        marks: closure(grammar, root_core),
        messages: HashMap::new(),
    });

    let mut queue = vec![root_id];
    while let Some(state_id) = queue.pop() {
        let marks = states[state_id.0].marks.clone();

        // Group incomplete marks by the symbol right after the dot.
        let mut by_symbol: HashMap<usize, (Symbol, Vec<Mark>)> = HashMap::new();
        for mark in &marks {
            if !mark.complete(grammar) {
                let sym = mark.symbol_at(grammar).unwrap();
                let key = symbol_key(sym, grammar);
                by_symbol.entry(key).or_insert((sym, Vec::new())).1.push(mark.advance());
            }
        }

        let mut slots: HashMap<usize, Slot> = HashMap::new();
        for (key, (sym, _)) in &by_symbol {
            slots.insert(*key, Slot::Pending(*sym));
        }

        // Step 1: complete marks reduce on their lhs's follow set.
        for mark in marks.iter().filter(|m| m.complete(grammar)) {
            let rule = grammar.rule(mark.rule);
            for t in grammar.follow_of(rule.lhs).iter().copied() {
                let key = grammar.symbols.ordinal(t);
                let entry = slots.get(&key).cloned();
                match entry {
                    None => {
                        slots.insert(key, Slot::Final(Message::Reduce(mark.rule)));
                    }
                    Some(Slot::Pending(_)) => {
                        let resolved = resolve_shift_reduce(grammar, mark.rule, t);
                        match resolved {
                            Resolution::Reduce => {
                                slots.insert(key, Slot::Final(Message::Reduce(mark.rule)));
                            }
                            Resolution::Shift => {
                                // leave pending; step 2 fills the shift.
                            }
                            Resolution::Delete(msg) => {
                                slots.insert(key, Slot::Final(Message::Error(msg)));
                            }
                            Resolution::Unresolved => {
                                sr_conflicts += 1;
                                // default to shift (leave pending).
                            }
                        }
                    }
                    Some(Slot::Final(Message::Reduce(other))) => {
                        rr_conflicts += 1;
                        if mark.rule.0 < other.0 {
                            slots.insert(key, Slot::Final(Message::Reduce(mark.rule)));
                        }
                    }
                    Some(Slot::Final(_)) => {}
                }
            }
        }

        // Step 2: remaining pending slots become shift/goto/accept.
        let mut messages: HashMap<usize, Message> = HashMap::new();
        let eof_key = grammar.symbols.ordinal(Terminal::Lit(grammar.symbols.eof()));
        for (key, slot) in slots {
            match slot {
                Slot::Final(msg) => {
                    messages.insert(key, msg);
                }
                Slot::Pending(sym) => {
                    let targets = &by_symbol.get(&key).unwrap().1;
                    let successor_core = normalize(targets);
                    let target = *core_index.entry(successor_core.clone()).or_insert_with(|| {
                        let id = StateId(states.len());
                        states.push(LrState {
                            core_len: successor_core.len(),
                            marks: closure(grammar, successor_core.clone()),
                            messages: HashMap::new(),
                        });
                        queue.push(id);
                        id
                    });
                    let msg = match sym {
                        Symbol::Term(_) => Message::Shift(target),
                        Symbol::Nt(_) => Message::Goto(target),
                    };
                    messages.insert(key, msg);
                }
            }
        }
        // $accept -> start $eof . completing means the whole input parsed;
        // that always overrides whatever step 1 put at the eof slot.
        if marks.iter().any(|m| m.rule == BnfRuleId(0) && m.complete(grammar)) {
            messages.insert(eof_key, Message::Accept);
        }

        for msg in messages.values() {
            match msg {
                Message::Reduce(rule_id) => grammar.rule_mut(*rule_id).reduced = true,
                Message::Accept => grammar.rule_mut(BnfRuleId(0)).reduced = true,
                _ => {}
            }
        }

        states[state_id.0].messages = messages;
    }

    LrTables {
        states,
        sr_conflicts,
        rr_conflicts,
    }
}

enum Resolution {
    Reduce,
    Shift,
    Delete(String),
    Unresolved,
}

fn resolve_shift_reduce(grammar: &BnfGrammar, rule: BnfRuleId, terminal: Terminal) -> Resolution {
    let rule_prec = grammar.rule(rule).precedence;
    let term_prec = grammar.symbols.precedence_of(terminal);
    match (rule_prec, term_prec) {
        (Some((rl, _, _)), Some((tl, tassoc))) => {
            if rl.0 > tl.0 {
                Resolution::Reduce
            } else if rl.0 < tl.0 {
                Resolution::Shift
            } else {
                match tassoc {
                    Assoc::Left => Resolution::Reduce,
                    Assoc::Right => Resolution::Shift,
                    Assoc::NonAssoc => Resolution::Delete(
                        "non-associative operator used associatively".to_string(),
                    ),
                }
            }
        }
        _ => Resolution::Unresolved,
    }
}

fn closure(grammar: &BnfGrammar, core: Vec<Mark>) -> Vec<Mark> {
    let mut marks = core;
    let mut seen: std::collections::HashSet<Mark> = marks.iter().copied().collect();
    let mut i = 0;
    while i < marks.len() {
        let mark = marks[i];
        if let Some(Symbol::Nt(nt)) = mark.symbol_at(grammar) {
            for rid in grammar.rules_of(nt) {
                let new_mark = Mark {
                    rule: *rid,
                    position: 0,
                };
                if seen.insert(new_mark) {
                    marks.push(new_mark);
                }
            }
        }
        i += 1;
    }
    marks
}

fn normalize(marks: &[Mark]) -> Vec<Mark> {
    let mut v: Vec<Mark> = marks.to_vec();
    v.sort();
    v.dedup();
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bnf::BnfGrammar;
    use crate::symbol::{Assoc, SymbolTable};

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
    fn state0_core_is_rule0_at_position0() {
        let mut g = arith_grammar();
        g.analyze().unwrap();
        let tables = build(&mut g);
        assert_eq!(tables.states[0].core(), &[Mark { rule: BnfRuleId(0), position: 0 }]);
    }

    #[test]
    fn precedence_resolves_all_conflicts() {
        let mut g = arith_grammar();
        g.analyze().unwrap();
        let tables = build(&mut g);
        assert_eq!(tables.sr_conflicts, 0);
        assert_eq!(tables.rr_conflicts, 0);
    }

    #[test]
    fn every_symbol_after_a_dot_has_a_message() {
        let mut g = arith_grammar();
        g.analyze().unwrap();
        let tables = build(&mut g);
        for state in &tables.states {
            for mark in &state.marks {
                if !mark.complete(&g) {
                    let sym = mark.symbol_at(&g).unwrap();
                    let key = symbol_key(sym, &g);
                    assert!(state.messages.contains_key(&key));
                }
            }
        }
    }

    #[test]
    fn every_reached_rule_ends_up_reduced() {
        let mut g = arith_grammar();
        g.analyze().unwrap();
        build(&mut g);
        for rule in g.rules() {
            assert!(rule.reduced, "rule {} should be marked reduced", rule.index);
        }
    }

    #[test]
    fn accept_marks_rule_zero_reduced_without_a_reduce_entry() {
        let mut g = arith_grammar();
        g.analyze().unwrap();
        build(&mut g);
        // Rule 0 ($accept -> expr $eof) never appears behind a `reduce`
        // message of its own; it is only ever completed by `accept`.
        assert!(g.rule(BnfRuleId(0)).reduced);
    }
}
