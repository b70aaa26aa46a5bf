//! C7: LR parser. A table-driven shift/reduce/goto stack machine over the
//! message table built by [`super::lr`], with panic-mode `$error` recovery
//! (spec.md §4.7) and chunked-input resumption.

use std::collections::HashMap;

use super::lr::{self, LrTables, Message, StateId};
use super::{BnfGrammar, BnfRule, BnfRuleId, Symbol, SynthAction};
use crate::error::{ActionError, ParseError};
use crate::ll::{Action, Value};
use crate::log::TraceConfig;
use crate::position::Position;
use crate::scanner::{ScanTerminal, ScanTuple};
use crate::symbol::Terminal;

/// Maps a BNF rule's action name to its semantic action. Keyed per rule
/// (not per non-terminal) since a non-terminal's several productions can
/// each carry a distinct action.
#[derive(Default)]
pub struct LrActionTable {
    actions: HashMap<&'static str, Action>,
}

impl LrActionTable {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set(&mut self, rule_name: &'static str, action: Action) {
        self.actions.insert(rule_name, action);
    }
    pub fn get(&self, rule_name: &str) -> Option<&Action> {
        self.actions.get(rule_name)
    }
}

/// Outcome of feeding a batch of tuples to an in-progress parse (spec.md
/// §4.7 "chunked input"). `NeedMore` means every tuple supplied so far was
/// consumed without reaching `$eof`; call [`LrSession::feed`] again once
/// more tuples are available.
pub enum LrOutcome {
    Accepted(Value),
    NeedMore,
    Error(ParseError),
}

pub struct LrParser<'g> {
    grammar: &'g BnfGrammar,
    tables: LrTables,
    actions: LrActionTable,
    trace: TraceConfig,
}

impl<'g> LrParser<'g> {
    /// Builds the canonical LR(0)/SLR(1) collection via [`lr::build`]. Does
    /// not fail on unresolved shift/reduce conflicts (they default to
    /// shift); callers that want a hard failure should inspect
    /// [`LrParser::sr_conflicts`]/[`LrParser::rr_conflicts`] themselves.
    pub fn new(grammar: &'g mut BnfGrammar, actions: LrActionTable, trace: TraceConfig) -> Self {
        let tables = lr::build(grammar);
        let grammar: &'g BnfGrammar = grammar;
        Self {
            grammar,
            tables,
            actions,
            trace,
        }
    }

    pub fn sr_conflicts(&self) -> u32 {
        self.tables.sr_conflicts
    }
    pub fn rr_conflicts(&self) -> u32 {
        self.tables.rr_conflicts
    }

    /// Parse a fully buffered tuple stream in one call; a convenience
    /// wrapper over [`LrSession`] for callers with no chunking needs.
    pub fn parse(&self, tuples: &[ScanTuple]) -> Result<Value, ParseError> {
        let mut session = LrSession::new(self);
        match session.feed(tuples) {
            LrOutcome::Accepted(v) => Ok(v),
            LrOutcome::Error(e) => Err(e),
            LrOutcome::NeedMore => Err(ParseError::new(
                tuples.last().map(|t| t.start).unwrap_or(0),
                tuples.last().map(|t| t.position).unwrap_or_default(),
                "input ended before the parse completed",
                vec![],
            )),
        }
    }

    fn run_action(
        &self,
        rule: &BnfRule,
        args: Vec<Value>,
        pointer: usize,
        position: Position,
    ) -> Result<Value, ParseError> {
        if let Some(synthetic) = rule.synthetic {
            return Ok(run_synth_action(synthetic, args));
        }
        match rule.action_name.and_then(|name| self.actions.get(name)) {
            Some(action) => action(args).map_err(|err| match err {
                ActionError::Fatal(m) | ActionError::Recoverable(m) => {
                    ParseError::new(pointer, position, m, vec![])
                }
            }),
            None => Ok(Value::List(args)),
        }
    }
}

/// Reduction convention for a synthesized `[...]`/`{...}` rule (spec.md
/// §4.8): a `{...}` repetition builds a flat `Value::List` of one element
/// per iteration, and a `[...]` empty alternative yields `Value::Null`,
/// matching the shape the same construct would produce under the EBNF
/// interpreter ([`crate::ll::LLParser`]).
fn run_synth_action(synthetic: SynthAction, mut args: Vec<Value>) -> Value {
    match synthetic {
        SynthAction::ManyBase => Value::List(vec![Value::List(args)]),
        SynthAction::ManyRepeat => {
            let tail = Value::List(args.split_off(1));
            let mut items = args.into_iter().next().unwrap_or(Value::Null).as_list();
            items.push(tail);
            Value::List(items)
        }
        SynthAction::OptEmpty => Value::Null,
    }
}

fn tuple_terminal(grammar: &BnfGrammar, tuple: &ScanTuple) -> Option<Terminal> {
    tuple.terminal.map(|t| match t {
        ScanTerminal::Lit(l) => Terminal::Lit(l),
        ScanTerminal::Tok(t) => Terminal::Tok(t),
        ScanTerminal::Eof => Terminal::Lit(grammar.symbols.eof()),
    })
}

/// Resumable parse state: the state/value stacks survive across calls to
/// [`LrSession::feed`], so a caller can hand over tuples as they become
/// available instead of buffering the whole input up front.
pub struct LrSession<'p, 'g> {
    parser: &'p LrParser<'g>,
    state_stack: Vec<StateId>,
    value_stack: Vec<Value>,
    error_count: u32,
}

impl<'p, 'g> LrSession<'p, 'g> {
    pub fn new(parser: &'p LrParser<'g>) -> Self {
        Self {
            parser,
            state_stack: vec![StateId(0)],
            value_stack: Vec::new(),
            error_count: 0,
        }
    }

    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    pub fn feed(&mut self, tuples: &[ScanTuple]) -> LrOutcome {
        let mut idx = 0usize;
        loop {
            if idx >= tuples.len() {
                return LrOutcome::NeedMore;
            }
            let tuple = &tuples[idx];
            let is_eof = tuple.terminal == Some(ScanTerminal::Eof);
            let key = match tuple_terminal(self.parser.grammar, tuple) {
                Some(t) => self.parser.grammar.symbols.ordinal(t),
                None => usize::MAX,
            };
            let top = *self.state_stack.last().unwrap();
            let message = self.parser.tables.states[top.0].messages.get(&key).cloned();

            if self.parser.trace.parse {
                eprintln!(
                    "state={} tuple={:?} verb={:?}",
                    top.0, tuple.value, message
                );
            }

            match message {
                Some(Message::Shift(next)) => {
                    self.state_stack.push(next);
                    self.value_stack.push(Value::Leaf(tuple.value.clone()));
                    if !is_eof {
                        idx += 1;
                    }
                }
                Some(Message::Reduce(rule_id)) => {
                    if let Err(e) = self.reduce(rule_id, tuple.start, tuple.position) {
                        return LrOutcome::Error(e);
                    }
                }
                Some(Message::Accept) => {
                    return LrOutcome::Accepted(self.value_stack.pop().unwrap_or(Value::Null));
                }
                Some(Message::Error(msg)) => {
                    if let Err(outcome) = self.panic_recover(tuples, &mut idx, msg) {
                        return outcome;
                    }
                }
                Some(Message::Goto(_)) | None => {
                    if let Err(outcome) =
                        self.panic_recover(tuples, &mut idx, "unexpected token".to_string())
                    {
                        return outcome;
                    }
                }
            }
        }
    }

    fn reduce(&mut self, rule_id: BnfRuleId, pointer: usize, position: Position) -> Result<(), ParseError> {
        let rule = self.parser.grammar.rule(rule_id);
        let n = rule.rhs.len();
        let split_at = self.value_stack.len() - n;
        let args = self.value_stack.split_off(split_at);
        self.state_stack.truncate(self.state_stack.len() - n);

        let value = self.parser.run_action(rule, args, pointer, position)?;

        let top = *self.state_stack.last().unwrap();
        let goto_key = lr::symbol_key(Symbol::Nt(rule.lhs), self.parser.grammar);
        let goto = match self.parser.tables.states[top.0].messages.get(&goto_key) {
            Some(Message::Goto(s)) => *s,
            _ => {
                return Err(ParseError::new(
                    pointer,
                    position,
                    format!(
                        "no goto entry for non-terminal '{}' after reducing rule {}",
                        self.parser.grammar.symbols.non_terminal(rule.lhs).name,
                        rule_id.0
                    ),
                    vec![],
                ))
            }
        };
        self.state_stack.push(goto);
        self.value_stack.push(value);
        Ok(())
    }

    /// Panic-mode recovery (spec.md §4.7): pop states until one can shift
    /// `$error`, shift it, then discard input until the lookahead
    /// synchronizes with the resulting state. Returns `Ok(())` to resume
    /// the main loop, or `Err(outcome)` when recovery is impossible.
    fn panic_recover(
        &mut self,
        tuples: &[ScanTuple],
        idx: &mut usize,
        msg: String,
    ) -> Result<(), LrOutcome> {
        self.error_count += 1;
        let tuple = &tuples[*idx];
        let error_tok = match self.parser.grammar.symbols.error_token_id() {
            Some(t) => Terminal::Tok(t),
            None => {
                return Err(LrOutcome::Error(ParseError::new(
                    tuple.start,
                    tuple.position,
                    msg,
                    vec![],
                )))
            }
        };
        let error_key = self.parser.grammar.symbols.ordinal(error_tok);

        loop {
            let top = *self.state_stack.last().unwrap();
            if let Some(Message::Shift(next)) =
                self.parser.tables.states[top.0].messages.get(&error_key)
            {
                self.state_stack.push(*next);
                self.value_stack.push(Value::Null);
                break;
            }
            if self.state_stack.len() <= 1 {
                return Err(LrOutcome::Error(ParseError::new(
                    tuple.start,
                    tuple.position,
                    msg,
                    vec![],
                )));
            }
            self.state_stack.pop();
            self.value_stack.pop();
        }

        loop {
            if *idx >= tuples.len() {
                return Err(LrOutcome::NeedMore);
            }
            let tuple = &tuples[*idx];
            let key = match tuple_terminal(self.parser.grammar, tuple) {
                Some(t) => self.parser.grammar.symbols.ordinal(t),
                None => {
                    *idx += 1;
                    continue;
                }
            };
            let top = *self.state_stack.last().unwrap();
            match self.parser.tables.states[top.0].messages.get(&key) {
                Some(Message::Shift(_)) | Some(Message::Reduce(_)) | Some(Message::Accept) => {
                    return Ok(());
                }
                _ => {
                    if tuple.terminal == Some(ScanTerminal::Eof) {
                        return Err(LrOutcome::Error(ParseError::new(
                            tuple.start,
                            tuple.position,
                            "unexpected end of input during error recovery",
                            vec![],
                        )));
                    }
                    *idx += 1;
                }
            }
        }
    }
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Message::Shift(s) => write!(f, "shift({})", s.0),
            Message::Goto(s) => write!(f, "goto({})", s.0),
            Message::Reduce(r) => write!(f, "reduce({})", r.0),
            Message::Accept => write!(f, "accept"),
            Message::Error(m) => write!(f, "error({})", m),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::Code;
    use crate::scanner::Scanner;
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
        g.add_rule(
            expr,
            vec![Symbol::Nt(expr), Symbol::Term(plus), Symbol::Nt(expr)],
            Some("add"),
            None,
        );
        g.add_rule(
            expr,
            vec![Symbol::Nt(expr), Symbol::Term(star), Symbol::Nt(expr)],
            Some("mul"),
            None,
        );
        g.add_rule(expr, vec![Symbol::Term(number)], Some("num"), None);
        g
    }

    fn leaf_num(v: &Value) -> i64 {
        match v {
            Value::Leaf(s) => s.parse().unwrap(),
            _ => panic!("expected leaf"),
        }
    }

    fn arithmetic_actions() -> LrActionTable {
        let mut actions = LrActionTable::new();
        actions.set(
            "add",
            Box::new(|args| {
                let lhs = leaf_num(&args[0]);
                let rhs = leaf_num(&args[2]);
                Ok(Value::Leaf((lhs + rhs).to_string()))
            }),
        );
        actions.set(
            "mul",
            Box::new(|args| {
                let lhs = leaf_num(&args[0]);
                let rhs = leaf_num(&args[2]);
                Ok(Value::Leaf((lhs * rhs).to_string()))
            }),
        );
        actions.set("num", Box::new(|args| Ok(args.into_iter().next().unwrap())));
        actions
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let mut g = arith_grammar();
        g.analyze().unwrap();
        let scanner = Scanner::build(&g.symbols, r"\s+").unwrap();

        let parser = LrParser::new(&mut g, arithmetic_actions(), TraceConfig::default());
        assert_eq!(parser.sr_conflicts(), 0);
        assert_eq!(parser.rr_conflicts(), 0);

        let code = Code::new(b"2+3*4");
        let tuples = scanner.scan(&code);
        let result = parser.parse(&tuples).unwrap();
        assert_eq!(leaf_num(&result), 14);

        let code2 = Code::new(b"2*3+4");
        let tuples2 = scanner.scan(&code2);
        let result2 = parser.parse(&tuples2).unwrap();
        assert_eq!(leaf_num(&result2), 10);
    }

    fn stmt_list_grammar() -> BnfGrammar {
        let mut symbols = SymbolTable::new();
        let number = Terminal::Tok(symbols.token("Number", "[0-9]+").unwrap());
        let semi = Terminal::Lit(symbols.lit(";").unwrap());
        let error_tok = Terminal::Tok(symbols.error_token());
        let stmt = symbols.nt("stmt").unwrap();
        let stmts = symbols.nt("stmts").unwrap();
        let mut g = BnfGrammar::new(symbols, stmts);
        g.add_rule(
            stmts,
            vec![Symbol::Nt(stmts), Symbol::Term(semi), Symbol::Nt(stmt)],
            Some("append"),
            None,
        );
        g.add_rule(stmts, vec![Symbol::Nt(stmt)], Some("single"), None);
        g.add_rule(stmt, vec![Symbol::Term(number)], Some("num"), None);
        g.add_rule(stmt, vec![Symbol::Term(error_tok)], Some("err"), None);
        g
    }

    fn stmt_list_actions() -> LrActionTable {
        let mut actions = LrActionTable::new();
        actions.set(
            "append",
            Box::new(|args| {
                let mut items = args[0].clone().as_list();
                items.push(args[2].clone());
                Ok(Value::List(items))
            }),
        );
        actions.set(
            "single",
            Box::new(|args| Ok(Value::List(vec![args[0].clone()]))),
        );
        actions.set("num", Box::new(|args| Ok(args.into_iter().next().unwrap())));
        actions.set("err", Box::new(|_args| Ok(Value::Leaf("ERR".to_string()))));
        actions
    }

    #[test]
    fn a_malformed_statement_recovers_via_the_error_token() {
        let mut g = stmt_list_grammar();
        g.analyze().unwrap();
        let scanner = Scanner::build(&g.symbols, r"\s+").unwrap();
        let parser = LrParser::new(&mut g, stmt_list_actions(), TraceConfig::default());
        assert_eq!(parser.sr_conflicts(), 0);
        assert_eq!(parser.rr_conflicts(), 0);

        let code = Code::new(b"1;@;2");
        let tuples = scanner.scan(&code);

        let mut session = LrSession::new(&parser);
        let outcome = session.feed(&tuples);
        let result = match outcome {
            LrOutcome::Accepted(v) => v,
            LrOutcome::Error(e) => panic!("expected recovery, got error: {}", e),
            LrOutcome::NeedMore => panic!("expected recovery to reach $eof"),
        };
        assert_eq!(session.error_count(), 1);
        assert_eq!(
            result,
            Value::List(vec![
                Value::Leaf("1".to_string()),
                Value::Leaf("ERR".to_string()),
                Value::Leaf("2".to_string()),
            ])
        );
    }

    #[test]
    fn chunked_input_reports_need_more_until_eof_arrives() {
        let mut g = arith_grammar();
        g.analyze().unwrap();
        let scanner = Scanner::build(&g.symbols, r"\s+").unwrap();
        let parser = LrParser::new(&mut g, arithmetic_actions(), TraceConfig::default());

        let code = Code::new(b"2+3");
        let mut tuples = scanner.scan(&code);
        tuples.pop(); // withhold the eof tuple to simulate a partial chunk

        let mut session = LrSession::new(&parser);
        match session.feed(&tuples) {
            LrOutcome::NeedMore => {}
            _ => panic!("expected NeedMore without an eof tuple"),
        }
    }
}
