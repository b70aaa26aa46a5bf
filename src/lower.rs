//! C8: EBNF -> BNF lowerer. Synthesizes auxiliary non-terminals under a
//! reserved prefix for every `[...]`/`{...}` construct (spec.md §4.8), then
//! hands the result to [`crate::bnf::BnfGrammar::analyze`].
//!
//! Grounded on the same node-by-node translation shape the teacher's own
//! wrapper productions use to desugar `SeparatedList`/`Nullable` into plain
//! `Concat`/`Union` trees, generalized from building another `IProduction`
//! tree to emitting ordered-pair BNF rules.

use crate::bnf::{BnfGrammar, SynthAction, Symbol};
use crate::ebnf::{EbnfGrammar, EbnfNode, NodeId, Rule};
use crate::error::GrammarError;
use crate::symbol::{Assoc, LevelId, NtId, Terminal};

pub struct LowerOptions {
    /// Prefix for synthesized non-terminal names; spec.md §4.8 reserves
    /// `$-` followed by a sequential counter.
    pub uniq_prefix: String,
    /// When set, every synthesized `Many` auxiliary also accepts
    /// `aux $error` so one malformed repetition can be discarded and
    /// parsing resumed, the common yacc `list: list error | ...` idiom.
    pub with_error_recovery: bool,
}

impl Default for LowerOptions {
    fn default() -> Self {
        Self {
            uniq_prefix: "$-".to_string(),
            with_error_recovery: false,
        }
    }
}

pub struct Lowerer<'e> {
    ebnf: &'e EbnfGrammar,
    options: LowerOptions,
    counter: usize,
}

impl<'e> Lowerer<'e> {
    pub fn new(ebnf: &'e EbnfGrammar, options: LowerOptions) -> Self {
        Self {
            ebnf,
            options,
            counter: 0,
        }
    }

    pub fn lower(mut self) -> Result<BnfGrammar, Vec<GrammarError>> {
        let start_rule = self.ebnf.start.ok_or_else(|| {
            vec![GrammarError::new(
                "no-start-rule",
                "grammar has no start rule to lower",
            )]
        })?;
        let start_nt = self.ebnf.get_rule(start_rule).nt;
        let symbols = self.ebnf.symbols.clone();
        let mut bnf = BnfGrammar::new(symbols, start_nt);
        for rule in self.ebnf.rules().to_vec() {
            self.lower_rule(&mut bnf, &rule);
        }
        match bnf.analyze() {
            Ok(()) => Ok(bnf),
            Err(errors) => Err(errors),
        }
    }

    fn lower_rule(&mut self, bnf: &mut BnfGrammar, rule: &Rule) {
        let seqs = match self.ebnf.node(rule.root) {
            EbnfNode::Alt(seqs) => seqs.clone(),
            _ => vec![rule.root],
        };
        let action = leak_name(&bnf.symbols.non_terminal(rule.nt).name);
        for seq_id in seqs {
            let (rhs, prec) = self.flatten(bnf, seq_id);
            bnf.add_rule(rule.nt, rhs, Some(action), prec);
        }
    }

    fn flatten(
        &mut self,
        bnf: &mut BnfGrammar,
        id: NodeId,
    ) -> (Vec<Symbol>, Option<(LevelId, Assoc, Terminal)>) {
        match self.ebnf.node(id).clone() {
            EbnfNode::Seq { children, prec } => {
                let rhs = children
                    .into_iter()
                    .map(|child| self.lower_child(bnf, child))
                    .collect();
                let explicit = prec.and_then(|t| {
                    bnf.symbols
                        .precedence_of(t)
                        .map(|(level, assoc)| (level, assoc, t))
                });
                (rhs, explicit)
            }
            _ => (vec![self.lower_child(bnf, id)], None),
        }
    }

    fn lower_child(&mut self, bnf: &mut BnfGrammar, id: NodeId) -> Symbol {
        match self.ebnf.node(id).clone() {
            EbnfNode::Lit(l) => Symbol::Term(Terminal::Lit(l)),
            EbnfNode::Token(t) => Symbol::Term(Terminal::Tok(t)),
            EbnfNode::Nt(nt) => Symbol::Nt(nt),
            EbnfNode::Opt(seqs) => {
                let aux = self.synth(bnf);
                for seq_id in &seqs {
                    let (rhs, prec) = self.flatten(bnf, *seq_id);
                    bnf.add_rule(aux, rhs, None, prec);
                }
                bnf.add_synth_rule(aux, Vec::new(), SynthAction::OptEmpty, None);
                Symbol::Nt(aux)
            }
            EbnfNode::Many(seqs) => {
                let aux = self.synth(bnf);
                for seq_id in &seqs {
                    let (rhs, prec) = self.flatten(bnf, *seq_id);
                    let mut repeated = vec![Symbol::Nt(aux)];
                    repeated.extend(rhs.iter().copied());
                    bnf.add_synth_rule(aux, repeated, SynthAction::ManyRepeat, prec);
                    bnf.add_synth_rule(aux, rhs, SynthAction::ManyBase, prec);
                }
                if self.options.with_error_recovery {
                    let error_tok = Terminal::Tok(bnf.symbols.error_token());
                    bnf.add_synth_rule(
                        aux,
                        vec![Symbol::Nt(aux), Symbol::Term(error_tok)],
                        SynthAction::ManyRepeat,
                        None,
                    );
                }
                Symbol::Nt(aux)
            }
            EbnfNode::Alt(seqs) => {
                let aux = self.synth(bnf);
                for seq_id in &seqs {
                    let (rhs, prec) = self.flatten(bnf, *seq_id);
                    bnf.add_rule(aux, rhs, None, prec);
                }
                Symbol::Nt(aux)
            }
        }
    }

    fn synth(&mut self, bnf: &mut BnfGrammar) -> NtId {
        self.counter += 1;
        let name = format!("{}{}", self.options.uniq_prefix, self.counter);
        bnf.symbols.synth_nt(&name)
    }
}

/// Non-terminal names outlive the borrowed [`EbnfGrammar`] but a
/// [`crate::bnf::BnfRule`] stores its action name as `&'static str`; the
/// number of distinct non-terminals in a grammar is small and fixed at
/// lowering time, so this leak is bounded the same way [`crate::ll::LLParser`]'s is.
fn leak_name(name: &str) -> &'static str {
    Box::leak(name.to_string().into_boxed_str())
}
