//! C10: grammar bootstrap. A hand-built EBNF meta-grammar describing the
//! grammar text syntax from spec.md §6 (rules, alternation, `[...]`/`{...}`,
//! `%left`/`%right`/`%nonassoc` precedence groups, `%prec` overrides),
//! constructed once behind a `once_cell::sync::Lazy` exactly as Design Notes
//! §9 "Grammar bootstrap circularity" requires: built with the same C1/C3
//! factory calls a grammar author would use, never self-parsed.
//!
//! The materializing actions follow the same `Rc<RefCell<_>>`-shared-builder
//! shape the teacher uses for its parser-wide mutable bookkeeping (error
//! counters, filter-pointer cursors); here the shared cell is the
//! in-progress [`EbnfGrammar`] being assembled by the meta-grammar's own
//! [`crate::ll::LLParser`] run.

use std::cell::RefCell;
use std::rc::Rc;

use once_cell::sync::Lazy;

use crate::ebnf::sets::Analyzer;
use crate::ebnf::{EbnfGrammar, NodeId};
use crate::error::{ActionError, GrammarError, ParseError};
use crate::ll::{Action, ActionTable, LLParser, Value};
use crate::log::TraceConfig;
use crate::position::Code;
use crate::scanner::Scanner;
use crate::symbol::{Assoc, SymbolTable, Terminal, TokId};

const TAG_SEP: char = '\u{0}';

#[derive(Debug)]
pub enum BootstrapError {
    Grammar(Vec<GrammarError>),
    Parse(ParseError),
}

impl std::fmt::Display for BootstrapError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BootstrapError::Grammar(errs) => {
                for (i, e) in errs.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}", e)?;
                }
                Ok(())
            }
            BootstrapError::Parse(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for BootstrapError {}

/// Parses grammar text per spec.md §6 into a fresh [`EbnfGrammar`] built on
/// top of `symbols`. `symbols` should already carry any lexical tokens
/// (named via [`SymbolTable::token`]) the grammar text's `ref`s are allowed
/// to resolve to; any `ref` naming an identifier with no such token becomes
/// a non-terminal, created (or reused) on first mention, exactly as a hand
/// call to [`SymbolTable::nt`] would.
pub struct Bootstrap;

impl Bootstrap {
    pub fn parse(symbols: SymbolTable, text: &str) -> Result<EbnfGrammar, BootstrapError> {
        let code = Code::new(text.as_bytes());
        let tuples = META_SCANNER.scan(&code);

        let builder = Rc::new(RefCell::new(Builder {
            grammar: EbnfGrammar::new(symbols),
        }));
        let actions = make_actions(builder.clone());

        let analyzer = Analyzer::new(&META, TraceConfig::default());
        let parser = LLParser::new(&META, analyzer, actions, TraceConfig::default(), false)
            .map_err(BootstrapError::Grammar)?;
        parser.parse(&tuples).map_err(BootstrapError::Parse)?;

        drop(parser);
        let builder = Rc::try_unwrap(builder)
            .unwrap_or_else(|_| panic!("bootstrap actions outlived the parse"));
        Ok(builder.into_inner().grammar)
    }
}

struct Builder {
    grammar: EbnfGrammar,
}

static META: Lazy<EbnfGrammar> = Lazy::new(build_meta_grammar);
static META_SCANNER: Lazy<Scanner> =
    Lazy::new(|| Scanner::build(&META.symbols, r"[ \t\r\n]+").expect("meta grammar scanner"));

/// Hand-builds the EBNF tree for:
/// ```text
/// grammar: [{ level }] { rule };
/// level:   ('%left'|'%right'|'%nonassoc') { term } ';';
/// rule:    Token ':' alt ';';
/// alt:     seq [{ '|' seq }];
/// seq:     { lit | ref | opt | some } [ '%prec' term ];
/// term:    lit | ref;
/// lit:     Lit;
/// ref:     Token;
/// opt:     '[' alt ']';
/// some:    '{' alt '}';
/// ```
fn build_meta_grammar() -> EbnfGrammar {
    let mut symbols = SymbolTable::new();
    let lit_tok = symbols.token("Lit", r"'(?:[^'\\]|\\.)+'").unwrap();
    let ident_tok = symbols
        .token("Token", r"[A-Za-z][A-Za-z0-9_]*|\$error")
        .unwrap();
    let kw_left = symbols.lit("%left").unwrap();
    let kw_right = symbols.lit("%right").unwrap();
    let kw_nonassoc = symbols.lit("%nonassoc").unwrap();
    let colon = symbols.lit(":").unwrap();
    let semi = symbols.lit(";").unwrap();
    let pipe = symbols.lit("|").unwrap();
    let lbrack = symbols.lit("[").unwrap();
    let rbrack = symbols.lit("]").unwrap();
    let lbrace = symbols.lit("{").unwrap();
    let rbrace = symbols.lit("}").unwrap();
    let kw_prec = symbols.lit("%prec").unwrap();

    let nt_grammar = symbols.nt("grammar").unwrap();
    let nt_level = symbols.nt("level").unwrap();
    let nt_rule = symbols.nt("rule").unwrap();
    let nt_alt = symbols.nt("alt").unwrap();
    let nt_seq = symbols.nt("seq").unwrap();
    let nt_term = symbols.nt("term").unwrap();
    let nt_lit = symbols.nt("lit").unwrap();
    let nt_ref = symbols.nt("ref").unwrap();
    let nt_opt = symbols.nt("opt").unwrap();
    let nt_some = symbols.nt("some").unwrap();

    let mut g = EbnfGrammar::new(symbols);

    // lit: Lit;
    let lit_leaf = g.token_node(lit_tok);
    let lit_seq = g.seq(vec![lit_leaf], None).unwrap();
    let lit_alt = g.alt(vec![lit_seq]);
    g.rule(nt_lit, lit_alt).unwrap();

    // ref: Token;
    let ref_leaf = g.token_node(ident_tok);
    let ref_seq = g.seq(vec![ref_leaf], None).unwrap();
    let ref_alt = g.alt(vec![ref_seq]);
    g.rule(nt_ref, ref_alt).unwrap();

    // term: lit | ref;
    let term_lit = g.nt_node(nt_lit);
    let term_lit_seq = g.seq(vec![term_lit], None).unwrap();
    let term_ref = g.nt_node(nt_ref);
    let term_ref_seq = g.seq(vec![term_ref], None).unwrap();
    let term_alt = g.alt(vec![term_lit_seq, term_ref_seq]);
    g.rule(nt_term, term_alt).unwrap();

    // opt: '[' alt ']';
    let opt_lb = g.lit_node(lbrack);
    let opt_alt_ref = g.nt_node(nt_alt);
    let opt_rb = g.lit_node(rbrack);
    let opt_seq = g.seq(vec![opt_lb, opt_alt_ref, opt_rb], None).unwrap();
    let opt_alt = g.alt(vec![opt_seq]);
    g.rule(nt_opt, opt_alt).unwrap();

    // some: '{' alt '}';
    let some_lb = g.lit_node(lbrace);
    let some_alt_ref = g.nt_node(nt_alt);
    let some_rb = g.lit_node(rbrace);
    let some_seq = g.seq(vec![some_lb, some_alt_ref, some_rb], None).unwrap();
    let some_alt = g.alt(vec![some_seq]);
    g.rule(nt_some, some_alt).unwrap();

    // seq: { lit | ref | opt | some } [ '%prec' term ];
    let elem_lit = g.nt_node(nt_lit);
    let elem_lit_seq = g.seq(vec![elem_lit], None).unwrap();
    let elem_ref = g.nt_node(nt_ref);
    let elem_ref_seq = g.seq(vec![elem_ref], None).unwrap();
    let elem_opt = g.nt_node(nt_opt);
    let elem_opt_seq = g.seq(vec![elem_opt], None).unwrap();
    let elem_some = g.nt_node(nt_some);
    let elem_some_seq = g.seq(vec![elem_some], None).unwrap();
    let elem_seqs = vec![elem_lit_seq, elem_ref_seq, elem_opt_seq, elem_some_seq];
    let first_elem = g.alt(elem_seqs.clone());
    let more_elems = g.many(elem_seqs);
    let prec_lit = g.lit_node(kw_prec);
    let prec_term = g.nt_node(nt_term);
    let prec_inner = g.seq(vec![prec_lit, prec_term], None).unwrap();
    let prec_opt = g.opt(vec![prec_inner]);
    let seq_top = g.seq(vec![first_elem, more_elems, prec_opt], None).unwrap();
    let seq_alt = g.alt(vec![seq_top]);
    g.rule(nt_seq, seq_alt).unwrap();

    // alt: seq [{ '|' seq }];
    let alt_first = g.nt_node(nt_seq);
    let pipe_lit = g.lit_node(pipe);
    let alt_more_seq = g.nt_node(nt_seq);
    let pipe_pair = g.seq(vec![pipe_lit, alt_more_seq], None).unwrap();
    let pipe_many = g.many(vec![pipe_pair]);
    let pipe_many_seq = g.seq(vec![pipe_many], None).unwrap();
    let pipe_opt = g.opt(vec![pipe_many_seq]);
    let alt_top = g.seq(vec![alt_first, pipe_opt], None).unwrap();
    let alt_alt = g.alt(vec![alt_top]);
    g.rule(nt_alt, alt_alt).unwrap();

    // rule: Token ':' alt ';';
    let rule_token = g.token_node(ident_tok);
    let rule_colon = g.lit_node(colon);
    let rule_alt_ref = g.nt_node(nt_alt);
    let rule_semi = g.lit_node(semi);
    let rule_top = g
        .seq(vec![rule_token, rule_colon, rule_alt_ref, rule_semi], None)
        .unwrap();
    let rule_alt_node = g.alt(vec![rule_top]);
    g.rule(nt_rule, rule_alt_node).unwrap();

    // level: ('%left'|'%right'|'%nonassoc') { term } ';';
    let left_leaf = g.lit_node(kw_left);
    let left_seq = g.seq(vec![left_leaf], None).unwrap();
    let right_leaf = g.lit_node(kw_right);
    let right_seq = g.seq(vec![right_leaf], None).unwrap();
    let nonassoc_leaf = g.lit_node(kw_nonassoc);
    let nonassoc_seq = g.seq(vec![nonassoc_leaf], None).unwrap();
    let assoc_alt = g.alt(vec![left_seq, right_seq, nonassoc_seq]);
    let term_first = g.nt_node(nt_term);
    let term_more_ref = g.nt_node(nt_term);
    let term_more_seq = g.seq(vec![term_more_ref], None).unwrap();
    let term_more_many = g.many(vec![term_more_seq]);
    let level_semi = g.lit_node(semi);
    let level_top = g
        .seq(vec![assoc_alt, term_first, term_more_many, level_semi], None)
        .unwrap();
    let level_alt = g.alt(vec![level_top]);
    g.rule(nt_level, level_alt).unwrap();

    // grammar: [{ level }] { rule };
    let level_ref = g.nt_node(nt_level);
    let level_ref_seq = g.seq(vec![level_ref], None).unwrap();
    let levels_many = g.many(vec![level_ref_seq]);
    let levels_many_seq = g.seq(vec![levels_many], None).unwrap();
    let levels_opt = g.opt(vec![levels_many_seq]);
    let rule_first = g.nt_node(nt_rule);
    let rule_more_ref = g.nt_node(nt_rule);
    let rule_more_seq = g.seq(vec![rule_more_ref], None).unwrap();
    let rules_many = g.many(vec![rule_more_seq]);
    let grammar_top = g
        .seq(vec![levels_opt, rule_first, rules_many], None)
        .unwrap();
    let grammar_alt = g.alt(vec![grammar_top]);
    let grammar_rule = g.rule(nt_grammar, grammar_alt).unwrap();
    g.start = Some(grammar_rule);

    g
}

fn as_leaf(v: &Value) -> &str {
    match v {
        Value::Leaf(s) => s.as_str(),
        _ => panic!("bootstrap: expected a tagged leaf value"),
    }
}

fn unwrap_single(v: &Value) -> &Value {
    match v {
        Value::List(items) if items.len() == 1 => &items[0],
        other => other,
    }
}

fn find_token(symbols: &SymbolTable, name: &str) -> Option<TokId> {
    symbols
        .toks()
        .iter()
        .position(|t| t.name == name)
        .map(TokId)
}

/// Backslash escapes per spec.md §6: `\' \\ \b \f \n \r \t \v \xHH \uHHHH`;
/// any other `\c` yields `c` literally.
fn unescape_literal(raw: &str) -> String {
    let inner = &raw[1..raw.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\'') => out.push('\''),
            Some('\\') => out.push('\\'),
            Some('b') => out.push('\u{8}'),
            Some('f') => out.push('\u{c}'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('v') => out.push('\u{b}'),
            Some('x') => {
                let hex: String = chars.by_ref().take(2).collect();
                if let Some(ch) = u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    out.push(ch);
                }
            }
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                if let Some(ch) = u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    out.push(ch);
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

fn resolve_ref_node(grammar: &mut EbnfGrammar, name: &str) -> Result<NodeId, GrammarError> {
    if name == "$error" {
        let tok = grammar.symbols.error_token();
        return Ok(grammar.token_node(tok));
    }
    if let Some(tok) = find_token(&grammar.symbols, name) {
        return Ok(grammar.token_node(tok));
    }
    let nt = grammar.symbols.nt(name)?;
    Ok(grammar.nt_node(nt))
}

fn resolve_seq_child(grammar: &mut EbnfGrammar, v: &Value) -> Result<NodeId, ActionError> {
    let s = as_leaf(v);
    let mut parts = s.splitn(2, TAG_SEP);
    match parts.next() {
        Some("L") => {
            let raw = parts.next().unwrap_or_default();
            let text = unescape_literal(raw);
            let id = grammar
                .symbols
                .lit(&text)
                .map_err(|e| ActionError::Fatal(e.to_string()))?;
            Ok(grammar.lit_node(id))
        }
        Some("R") => {
            let raw = parts.next().unwrap_or_default();
            resolve_ref_node(grammar, raw).map_err(|e| ActionError::Fatal(e.to_string()))
        }
        Some("N") => {
            let raw = parts.next().unwrap_or_default();
            let id: usize = raw
                .parse()
                .map_err(|_| ActionError::Fatal("malformed node tag".to_string()))?;
            Ok(NodeId(id))
        }
        _ => Err(ActionError::Fatal("malformed sequence element".to_string())),
    }
}

fn resolve_term(grammar: &mut EbnfGrammar, v: &Value) -> Result<Terminal, ActionError> {
    let s = as_leaf(v);
    let mut parts = s.splitn(2, TAG_SEP);
    match parts.next() {
        Some("L") => {
            let raw = parts.next().unwrap_or_default();
            let text = unescape_literal(raw);
            let id = grammar
                .symbols
                .lit(&text)
                .map_err(|e| ActionError::Fatal(e.to_string()))?;
            Ok(Terminal::Lit(id))
        }
        Some("R") => {
            let raw = parts.next().unwrap_or_default();
            if raw == "$error" {
                return Ok(Terminal::Tok(grammar.symbols.error_token()));
            }
            find_token(&grammar.symbols, raw).map(Terminal::Tok).ok_or_else(|| {
                ActionError::Fatal(format!(
                    "'{}' is used as a precedence terminal but is not a declared token",
                    raw
                ))
            })
        }
        _ => Err(ActionError::Fatal("malformed precedence term".to_string())),
    }
}

fn node_id_tag(v: &Value) -> Result<NodeId, ActionError> {
    let s = as_leaf(v);
    let rest = s
        .splitn(2, TAG_SEP)
        .nth(1)
        .ok_or_else(|| ActionError::Fatal("malformed sequence tag".to_string()))?;
    rest.parse()
        .map(NodeId)
        .map_err(|_| ActionError::Fatal("malformed sequence tag".to_string()))
}

fn make_actions(builder: Rc<RefCell<Builder>>) -> ActionTable {
    let mut actions = ActionTable::new();

    actions.set(
        "lit",
        action(builder.clone(), |_g, args| {
            let raw = as_leaf(&args[0]);
            Ok(Value::Leaf(format!("L{}{}", TAG_SEP, raw)))
        }),
    );

    actions.set(
        "ref",
        action(builder.clone(), |_g, args| {
            let raw = as_leaf(&args[0]);
            Ok(Value::Leaf(format!("R{}{}", TAG_SEP, raw)))
        }),
    );

    actions.set(
        "term",
        action(builder.clone(), |g, args| {
            let inner = &args[0];
            let terminal = resolve_term(g, inner)?;
            let (kind, ord) = match terminal {
                Terminal::Lit(l) => ("TL", l.0),
                Terminal::Tok(t) => ("TT", t.0),
            };
            Ok(Value::Leaf(format!("{}{}{}", kind, TAG_SEP, ord)))
        }),
    );

    actions.set(
        "opt",
        action(builder.clone(), |g, args| {
            // args = ['[' literal, alt, ']' literal]
            let seqs = decode_seq_list(&args[1])?;
            let id = g.opt(seqs);
            Ok(Value::Leaf(format!("N{}{}", TAG_SEP, id.0)))
        }),
    );

    actions.set(
        "some",
        action(builder.clone(), |g, args| {
            // args = ['{' literal, alt, '}' literal]
            let seqs = decode_seq_list(&args[1])?;
            let id = g.many(seqs);
            Ok(Value::Leaf(format!("N{}{}", TAG_SEP, id.0)))
        }),
    );

    actions.set(
        "seq",
        action(builder.clone(), |g, args| {
            let mut children = vec![resolve_seq_child(g, unwrap_single(&args[0]))?];
            if let Value::List(items) = &args[1] {
                for item in items {
                    children.push(resolve_seq_child(g, unwrap_single(item))?);
                }
            }
            let prec = match &args[2] {
                Value::List(items) if items.len() == 2 => Some(resolve_term(g, &items[1])?),
                _ => None,
            };
            let id = g
                .seq(children, prec)
                .map_err(|e| ActionError::Fatal(e.to_string()))?;
            Ok(Value::Leaf(format!("S{}{}", TAG_SEP, id.0)))
        }),
    );

    actions.set(
        "alt",
        action(builder.clone(), |_g, args| {
            let mut seqs = vec![args[0].clone()];
            if let Value::List(outer) = &args[1] {
                if let Some(Value::List(pairs)) = outer.first() {
                    for pair in pairs {
                        if let Value::List(items) = pair {
                            if let Some(seq_val) = items.get(1) {
                                seqs.push(seq_val.clone());
                            }
                        }
                    }
                }
            }
            Ok(Value::List(seqs))
        }),
    );

    actions.set(
        "rule",
        action(builder.clone(), |g, args| {
            // args = [Token name, ':' literal, alt, ';' literal]
            let name = as_leaf(&args[0]).to_string();
            let nt = g
                .symbols
                .nt(&name)
                .map_err(|e| ActionError::Fatal(e.to_string()))?;
            let seqs = decode_seq_list(&args[2])?;
            let alt_node = g.alt(seqs);
            g.rule(nt, alt_node).map_err(|e| ActionError::Fatal(e.to_string()))?;
            Ok(Value::Null)
        }),
    );

    actions.set(
        "level",
        action(builder.clone(), |g, args| {
            let assoc_text = match unwrap_single(&args[0]) {
                Value::Leaf(s) => s.clone(),
                _ => return Err(ActionError::Fatal("malformed precedence keyword".to_string())),
            };
            let assoc = match assoc_text.as_str() {
                "%left" => Assoc::Left,
                "%right" => Assoc::Right,
                "%nonassoc" => Assoc::NonAssoc,
                other => {
                    return Err(ActionError::Fatal(format!(
                        "unknown associativity keyword '{}'",
                        other
                    )))
                }
            };
            let mut terminals = vec![resolve_term(g, &args[1])?];
            if let Value::List(items) = &args[2] {
                for item in items {
                    terminals.push(resolve_term(g, unwrap_single(item))?);
                }
            }
            g.symbols
                .precedence(assoc, terminals)
                .map_err(|e| ActionError::Fatal(e.to_string()))?;
            Ok(Value::Null)
        }),
    );

    actions.set("grammar", action(builder, |_g, _args| Ok(Value::Null)));

    actions
}

fn decode_seq_list(v: &Value) -> Result<Vec<NodeId>, ActionError> {
    match v {
        Value::List(items) => items.iter().map(node_id_tag).collect(),
        other => Ok(vec![node_id_tag(other)?]),
    }
}

/// Wraps a closure taking `(&mut EbnfGrammar, &[Value]) -> Result<Value, ActionError>`
/// into the `Fn(Vec<Value>) -> Result<Value, ActionError>` shape [`ActionTable`]
/// expects, borrowing the shared builder for the closure's duration.
fn action(
    builder: Rc<RefCell<Builder>>,
    f: impl Fn(&mut EbnfGrammar, &[Value]) -> Result<Value, ActionError> + 'static,
) -> Action {
    Box::new(move |args: Vec<Value>| {
        let mut b = builder.borrow_mut();
        f(&mut b.grammar, &args)
    })
}
