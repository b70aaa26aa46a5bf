//! End-to-end scenarios driving whole grammars (and the stack machine)
//! through the crate's public API, one test per concrete walkthrough.

use grammarcraft::bnf::parser::{LrActionTable, LrOutcome, LrParser, LrSession};
use grammarcraft::bnf::{BnfGrammar, Symbol};
use grammarcraft::bootstrap::Bootstrap;
use grammarcraft::ebnf::sets::Analyzer;
use grammarcraft::ebnf::EbnfGrammar;
use grammarcraft::ll::{ActionTable, LLParser, Value};
use grammarcraft::log::TraceConfig;
use grammarcraft::lower::{LowerOptions, Lowerer};
use grammarcraft::position::Code;
use grammarcraft::scanner::Scanner;
use grammarcraft::symbol::{SymbolTable, Terminal};
use grammarcraft::vm::instr::Instr;
use grammarcraft::vm::{Machine, RunOutcome};

fn leaf_num(v: &Value) -> i64 {
    match v {
        Value::Leaf(s) => s.parse().unwrap(),
        _ => panic!("expected a leaf value, got {:?}", v),
    }
}

fn collect_numbers(v: &Value, out: &mut Vec<i64>) {
    match v {
        Value::Leaf(s) => {
            if let Ok(n) = s.parse::<i64>() {
                out.push(n);
            }
        }
        Value::List(items) => items.iter().for_each(|item| collect_numbers(item, out)),
        Value::Null => {}
    }
}

/// list: sum [{ ',' sum }];
/// sum: Number [{ '+' Number }];
/// "1+2, 3" with a summing action sums each `sum` to `[3, 3]`.
#[test]
fn simple_ll_expression_sums_and_lists() {
    let mut symbols = SymbolTable::new();
    symbols.token("Number", "[0-9]+").unwrap();

    let grammar = Bootstrap::parse(
        symbols,
        "list: sum [{ ',' sum }];\nsum: Number [{ '+' Number }];\n",
    )
    .unwrap();

    let scanner = Scanner::build(&grammar.symbols, r"[ \t]+").unwrap();
    let code = Code::new(b"1+2, 3");
    let tuples = scanner.scan(&code);

    let mut actions = ActionTable::new();
    actions.set(
        "sum",
        Box::new(|values| {
            let mut numbers = Vec::new();
            collect_numbers(&Value::List(values), &mut numbers);
            Ok(Value::Leaf(numbers.into_iter().sum::<i64>().to_string()))
        }),
    );
    actions.set(
        "list",
        Box::new(|values| {
            let mut results = Vec::new();
            collect_numbers(&Value::List(values), &mut results);
            Ok(Value::List(results.into_iter().map(|n| Value::Leaf(n.to_string())).collect()))
        }),
    );

    let analyzer = Analyzer::new(&grammar, TraceConfig::default());
    let parser = LLParser::new(&grammar, analyzer, actions, TraceConfig::default(), false).unwrap();
    let result = parser.parse(&tuples).unwrap();
    assert_eq!(
        result,
        Value::List(vec![Value::Leaf("3".to_string()), Value::Leaf("3".to_string())])
    );
}

/// `%left '+' '-'; %left '*' '/'; expr: expr '+' expr | expr '-' expr |
/// expr '*' expr | expr '/' expr | Number;`
/// "2+3*4" reduces to 14, "2*3+4" to 10, with zero shift/reduce or
/// reduce/reduce conflicts in the built tables.
#[test]
fn lr_precedence_resolves_multiplication_before_addition() {
    let mut symbols = SymbolTable::new();
    symbols.token("Number", "[0-9]+").unwrap();

    let grammar = Bootstrap::parse(
        symbols,
        "%left '+' '-';\n%left '*' '/';\nexpr: expr '+' expr | expr '-' expr | expr '*' expr | expr '/' expr | Number;\n",
    )
    .unwrap();

    let mut bnf = Lowerer::new(&grammar, LowerOptions::default()).lower().unwrap();
    let scanner = Scanner::build(&bnf.symbols, r"\s+").unwrap();

    let mut actions = LrActionTable::new();
    actions.set(
        "expr",
        Box::new(|args| match args.as_slice() {
            [lhs, op, rhs] => {
                let a = leaf_num(lhs);
                let b = leaf_num(rhs);
                let op = match op {
                    Value::Leaf(s) => s.as_str(),
                    _ => panic!("expected operator leaf"),
                };
                let result = match op {
                    "+" => a + b,
                    "-" => a - b,
                    "*" => a * b,
                    "/" => a / b,
                    other => panic!("unexpected operator {}", other),
                };
                Ok(Value::Leaf(result.to_string()))
            }
            [leaf] => Ok(leaf.clone()),
            _ => unreachable!(),
        }),
    );

    let parser = LrParser::new(&mut bnf, actions, TraceConfig::default());
    assert_eq!(parser.sr_conflicts(), 0);
    assert_eq!(parser.rr_conflicts(), 0);

    let code = Code::new(b"2+3*4");
    let tuples = scanner.scan(&code);
    assert_eq!(leaf_num(&parser.parse(&tuples).unwrap()), 14);

    let code2 = Code::new(b"2*3+4");
    let tuples2 = scanner.scan(&code2);
    assert_eq!(leaf_num(&parser.parse(&tuples2).unwrap()), 10);
}

/// list: Number [{ ',' Number }]; lowers to exactly two synthesized `$-`
/// non-terminals (one for the repeated `',' Number` pair, one for the
/// surrounding optional repetition), and the lowered BNF grammar parses
/// "1,2,3" into the same three numbers the EBNF source describes.
#[test]
fn ebnf_to_bnf_translation_synthesizes_two_auxiliaries() {
    let mut symbols = SymbolTable::new();
    let number = symbols.token("Number", "[0-9]+").unwrap();
    let comma = symbols.lit(",").unwrap();
    let list_nt = symbols.nt("list").unwrap();
    let mut g = EbnfGrammar::new(symbols);

    let n1 = g.token_node(number);
    let comma_leaf = g.lit_node(comma);
    let n2 = g.token_node(number);
    let inner_seq = g.seq(vec![comma_leaf, n2], None).unwrap();
    let many = g.many(vec![inner_seq]);
    let opt_seq = g.seq(vec![many], None).unwrap();
    let opt = g.opt(vec![opt_seq]);
    let list_seq = g.seq(vec![n1, opt], None).unwrap();
    let list_alt = g.alt(vec![list_seq]);
    g.rule(list_nt, list_alt).unwrap();

    let mut bnf = Lowerer::new(&g, LowerOptions::default()).lower().unwrap();
    let synthesized: Vec<_> = bnf
        .symbols
        .nts()
        .iter()
        .filter(|nt| nt.name.starts_with("$-"))
        .collect();
    assert_eq!(synthesized.len(), 2);

    let scanner = Scanner::build(&bnf.symbols, r"\s+").unwrap();
    let mut actions = LrActionTable::new();
    actions.set(
        "list",
        Box::new(|args| {
            // args[1] is the lowered `[{ ',' Number }]`'s value: `Value::Null`
            // when absent, or a one-element wrapper around the repetition
            // aux's own flat list of `[',', Number]` pairs when present --
            // the exact shape the EBNF interpreter gives the same construct,
            // not an arbitrarily-nested tree.
            let first = match &args[0] {
                Value::Leaf(s) => s.clone(),
                _ => panic!("expected a leaf value for the first number"),
            };
            let mut numbers = vec![first];
            if let Value::List(wrapped) = &args[1] {
                if let [Value::List(iterations)] = wrapped.as_slice() {
                    for iteration in iterations {
                        if let Value::List(pair) = iteration {
                            if let Value::Leaf(s) = &pair[1] {
                                numbers.push(s.clone());
                            }
                        }
                    }
                }
            }
            Ok(Value::List(numbers.into_iter().map(Value::Leaf).collect()))
        }),
    );

    let parser = LrParser::new(&mut bnf, actions, TraceConfig::default());
    assert_eq!(parser.sr_conflicts(), 0);
    assert_eq!(parser.rr_conflicts(), 0);

    let code = Code::new(b"1,2,3");
    let tuples = scanner.scan(&code);
    let result = parser.parse(&tuples).unwrap();
    assert_eq!(
        result,
        Value::List(vec![
            Value::Leaf("1".to_string()),
            Value::Leaf("2".to_string()),
            Value::Leaf("3".to_string()),
        ])
    );
}

/// s: 'a' | 'a' 'b'; fails `check()` because the two alternatives share a
/// lookahead symbol.
#[test]
fn ll_ambiguity_is_detected() {
    let symbols = SymbolTable::new();
    let grammar = Bootstrap::parse(symbols, "s: 'a' | 'a' 'b';\n").unwrap();
    let mut analyzer = Analyzer::new(&grammar, TraceConfig::default());
    let errors = analyzer.check().unwrap_err();
    assert!(errors.iter().any(|e| e.what == "ambiguous-alt"));
}

/// stmt: 'let' Name '=' Number ';' | $error ';'; program: stmt | program stmt;
/// "let = 1; let x = 2;" fails at '=' in the first statement, recovers by
/// discarding through the next ';', and still parses the second statement.
#[test]
fn lr_error_recovery_skips_a_malformed_let_statement() {
    let mut symbols = SymbolTable::new();
    let let_kw = Terminal::Lit(symbols.lit("let").unwrap());
    let eq = Terminal::Lit(symbols.lit("=").unwrap());
    let semi = Terminal::Lit(symbols.lit(";").unwrap());
    let name = Terminal::Tok(symbols.token("Name", "[a-z][a-z0-9]*").unwrap());
    let number = Terminal::Tok(symbols.token("Number", "[0-9]+").unwrap());
    let error_tok = Terminal::Tok(symbols.error_token());

    let stmt = symbols.nt("stmt").unwrap();
    let program = symbols.nt("program").unwrap();
    let mut g = BnfGrammar::new(symbols, program);

    g.add_rule(program, vec![Symbol::Nt(program), Symbol::Nt(stmt)], Some("append"), None);
    g.add_rule(program, vec![Symbol::Nt(stmt)], Some("single"), None);
    g.add_rule(
        stmt,
        vec![
            Symbol::Term(let_kw),
            Symbol::Term(name),
            Symbol::Term(eq),
            Symbol::Term(number),
            Symbol::Term(semi),
        ],
        Some("let_stmt"),
        None,
    );
    g.add_rule(stmt, vec![Symbol::Term(error_tok), Symbol::Term(semi)], Some("err_stmt"), None);
    g.analyze().unwrap();

    let scanner = Scanner::build(&g.symbols, r"\s+").unwrap();

    let mut actions = LrActionTable::new();
    actions.set(
        "append",
        Box::new(|args| {
            let mut items = args[0].clone().as_list();
            items.push(args[1].clone());
            Ok(Value::List(items))
        }),
    );
    actions.set("single", Box::new(|args| Ok(Value::List(vec![args[0].clone()]))));
    actions.set(
        "let_stmt",
        Box::new(|args| {
            let name = match &args[1] {
                Value::Leaf(s) => s.clone(),
                _ => panic!("expected name leaf"),
            };
            let value = match &args[3] {
                Value::Leaf(s) => s.clone(),
                _ => panic!("expected number leaf"),
            };
            Ok(Value::Leaf(format!("{}={}", name, value)))
        }),
    );
    actions.set("err_stmt", Box::new(|_args| Ok(Value::Leaf("ERR".to_string()))));

    let parser = LrParser::new(&mut g, actions, TraceConfig::default());
    assert_eq!(parser.sr_conflicts(), 0);
    assert_eq!(parser.rr_conflicts(), 0);

    let code = Code::new(b"let = 1; let x = 2;");
    let tuples = scanner.scan(&code);

    let mut session = LrSession::new(&parser);
    let result = match session.feed(&tuples) {
        LrOutcome::Accepted(v) => v,
        LrOutcome::Error(e) => panic!("expected recovery, got a hard error: {}", e),
        LrOutcome::NeedMore => panic!("expected the parse to reach $eof"),
    };
    assert_eq!(session.error_count(), 1);
    assert_eq!(
        result,
        Value::List(vec![Value::Leaf("ERR".to_string()), Value::Leaf("x=2".to_string())])
    );
}

/// `Push 3; Push 4; Add; Print; Halt;` run from address 0 prints 7.
/// Stepping the same program with a two-instruction budget halts right
/// after the two pushes, with the operand stack holding `[3, 4]` and the
/// run ready to continue.
#[test]
fn vm_executes_and_can_be_stepped() {
    let program = vec![Instr::Push(3), Instr::Push(4), Instr::Add, Instr::Print, Instr::Halt];
    let mut printed = Vec::new();
    let mut machine = Machine::new(program, 16, || 0, |v| printed.push(v));
    let outcome = machine.run(0, None, None).unwrap();
    assert_eq!(outcome, RunOutcome::Halted);
    assert_eq!(printed, vec![7]);

    let program2 = vec![Instr::Push(3), Instr::Push(4), Instr::Add, Instr::Print, Instr::Halt];
    let mut printed2 = Vec::new();
    let mut stepped = Machine::new(program2, 16, || 0, |v| printed2.push(v));
    let outcome = stepped.run(0, None, Some(2)).unwrap();
    assert_eq!(outcome, RunOutcome::StepBudgetExhausted);
    assert_eq!(stepped.stack(), &[3, 4]);
    assert!(!stepped.is_halted());

    let outcome = stepped.run(0, None, None).unwrap();
    assert_eq!(outcome, RunOutcome::Halted);
    assert_eq!(printed2, vec![7]);
}
