//! A small compiler-construction toolkit: grammars are built from plain
//! data (no `Rc<dyn Trait>` production trees), analyzed, and handed to
//! either an LL(1) recursive-descent interpreter or a table-driven
//! LR(0)/SLR(1) stack machine. A separate EBNF->BNF lowerer and a
//! hand-built grammar-text bootstrap sit on top so a grammar can be
//! authored as text instead of built one factory call at a time, and a
//! minimal stack VM rounds out the toolkit for programs that want to
//! compile down to something runnable rather than just parse.
//!
//! # Example
//!
//! Bootstrapping a grammar from its EBNF text, lowering it to BNF, and
//! running it through the LR(0)/SLR(1) engine:
//!
//! ```
//! use grammarcraft::bnf::parser::{LrActionTable, LrParser};
//! use grammarcraft::bootstrap::Bootstrap;
//! use grammarcraft::ll::Value;
//! use grammarcraft::log::TraceConfig;
//! use grammarcraft::lower::{LowerOptions, Lowerer};
//! use grammarcraft::position::Code;
//! use grammarcraft::scanner::Scanner;
//! use grammarcraft::symbol::{Assoc, SymbolTable};
//!
//! let mut symbols = SymbolTable::new();
//! symbols.token("Number", "[0-9]+").unwrap();
//!
//! let ebnf = Bootstrap::parse(
//!     symbols,
//!     "%left '+';\nexpr: expr '+' expr | Number;\n",
//! )
//! .unwrap();
//!
//! let mut bnf = Lowerer::new(&ebnf, LowerOptions::default()).lower().unwrap();
//! let scanner = Scanner::build(&bnf.symbols, r"\s+").unwrap();
//!
//! let mut actions = LrActionTable::new();
//! actions.set(
//!     "expr",
//!     Box::new(|args| match args.as_slice() {
//!         [Value::Leaf(lhs), _, Value::Leaf(rhs)] => {
//!             let sum: i64 = lhs.parse::<i64>().unwrap() + rhs.parse::<i64>().unwrap();
//!             Ok(Value::Leaf(sum.to_string()))
//!         }
//!         [leaf] => Ok(leaf.clone()),
//!         _ => unreachable!(),
//!     }),
//! );
//!
//! let parser = LrParser::new(&mut bnf, actions, TraceConfig::default());
//! let code = Code::new(b"1+2+3");
//! let tuples = scanner.scan(&code);
//! assert_eq!(parser.parse(&tuples).unwrap(), Value::Leaf("6".to_string()));
//! ```
//!
//! # Modules
//!
//! - [`symbol`] (C1): the literal/token/non-terminal/precedence inventory
//!   every other module builds on.
//! - [`scanner`] (C2): compiles a grammar's terminals into one master
//!   regular expression and tokenizes an input buffer with it.
//! - [`ebnf`] (C3, with analysis in [`ebnf::sets`]): the EBNF grammar
//!   model (`Seq`/`Alt`/`Opt`/`Many`) and its `expect`/`follow` analysis.
//! - [`ll`] (C4): the LL(1) recursive-descent parser over an analyzed
//!   [`ebnf::EbnfGrammar`].
//! - [`bnf`] (C5, item sets in [`bnf::lr`], the runtime parser in
//!   [`bnf::parser`]): the ordered-pair BNF grammar model and the
//!   LR(0)/SLR(1) parser built on it.
//! - [`lower`] (C8): translates an [`ebnf::EbnfGrammar`] into a
//!   [`bnf::BnfGrammar`], synthesizing auxiliary non-terminals for every
//!   `[...]`/`{...}` construct.
//! - [`vm`] (C9, instruction set in [`vm::instr`]): a flat-memory stack
//!   machine with framed, nested and indirect call shapes.
//! - [`bootstrap`] (C10): parses grammar text per the EBNF syntax itself
//!   describes, via a meta-grammar built once from the same factory calls
//!   a grammar author would use.
//! - [`error`]: the three error kinds ([`error::GrammarError`],
//!   [`error::ScanError`], [`error::ParseError`]) plus
//!   [`error::ActionError`] for semantic actions.
//! - [`log`]: graduated trace levels shared by every analysis and parsing
//!   pass.
//! - [`position`]: line/column tracking over a source buffer.

pub mod bnf;
pub mod bootstrap;
pub mod ebnf;
pub mod error;
pub mod ll;
pub mod log;
pub mod lower;
pub mod position;
pub mod scanner;
pub mod symbol;
pub mod vm;
