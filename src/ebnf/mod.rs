//! C3: EBNF grammar model. Rules, sequences, alternation, optional (`[...]`)
//! and iterated (`{...}`) constructs, plus the `expect`/`follow` analysis
//! that the LL(1) parser (C4) and the EBNF->BNF lowerer (C8) depend on.
//!
//! Grounded on the teacher's `IProduction` hierarchy (`Concat`, `Union`,
//! wrappers like `SeparatedList`/`Nullable`): where the teacher attaches a
//! `first_set`/`nullability` method to each `Rc<dyn IProduction>` node, this
//! model holds the same tree as a flat arena of `EbnfNode`s (per spec.md §9
//! "Polymorphic tree nodes") and drives `expect`/`follow` from one
//! `Analyzer` (see `sets.rs`) instead of per-node virtual dispatch.

pub mod sets;

use std::collections::HashMap;
use std::fmt;

use crate::error::GrammarError;
use crate::symbol::{LitId, NtId, SymbolTable, Terminal, TokId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(pub usize);

/// One EBNF tree node. `Seq` is an ordered concatenation; `Alt` picks one of
/// several `Seq` alternatives; `Opt`/`Many` reuse the `Alt` shape for
/// zero-or-one / one-or-more repetition (spec.md §3: "`Opt` ⊂ `Alt`, `Some`
/// ⊂ `Alt`: same structure, different semantics"). `Many` is this crate's
/// name for the spec's "Some" (one-or-more) construct.
#[derive(Debug, Clone)]
pub enum EbnfNode {
    Lit(LitId),
    Token(TokId),
    Nt(NtId),
    Seq {
        children: Vec<NodeId>,
        prec: Option<Terminal>,
    },
    Alt(Vec<NodeId>),
    Opt(Vec<NodeId>),
    Many(Vec<NodeId>),
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub nt: NtId,
    pub root: NodeId,
}

/// Arena-owning grammar: nodes and rules are flat, index-addressed plain
/// data (spec.md §9 "Cyclic references") so the tree can be built, analyzed
/// and serialized without `Rc`/`RefCell`.
pub struct EbnfGrammar {
    pub symbols: SymbolTable,
    nodes: Vec<EbnfNode>,
    rules: Vec<Rule>,
    nt_rule: HashMap<NtId, RuleId>,
    pub start: Option<RuleId>,
}

impl EbnfGrammar {
    pub fn new(symbols: SymbolTable) -> Self {
        Self {
            symbols,
            nodes: Vec::new(),
            rules: Vec::new(),
            nt_rule: HashMap::new(),
            start: None,
        }
    }

    fn push(&mut self, node: EbnfNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    pub fn lit_node(&mut self, id: LitId) -> NodeId {
        self.push(EbnfNode::Lit(id))
    }
    pub fn token_node(&mut self, id: TokId) -> NodeId {
        self.push(EbnfNode::Token(id))
    }
    pub fn nt_node(&mut self, id: NtId) -> NodeId {
        self.push(EbnfNode::Nt(id))
    }

    /// `children` must contain at least one non-optional element per
    /// spec.md §3's `Seq` invariant; `Opt`/`Many` are optional, everything
    /// else is mandatory.
    pub fn seq(&mut self, children: Vec<NodeId>, prec: Option<Terminal>) -> Result<NodeId, GrammarError> {
        if !children.iter().any(|c| !self.is_optional(*c)) {
            return Err(GrammarError::new(
                "empty-seq",
                "a sequence must contain at least one non-optional element",
            ));
        }
        Ok(self.push(EbnfNode::Seq { children, prec }))
    }

    pub fn alt(&mut self, seqs: Vec<NodeId>) -> NodeId {
        self.push(EbnfNode::Alt(seqs))
    }
    pub fn opt(&mut self, seqs: Vec<NodeId>) -> NodeId {
        self.push(EbnfNode::Opt(seqs))
    }
    pub fn many(&mut self, seqs: Vec<NodeId>) -> NodeId {
        self.push(EbnfNode::Many(seqs))
    }

    fn is_optional(&self, id: NodeId) -> bool {
        matches!(self.node(id), EbnfNode::Opt(_) | EbnfNode::Many(_))
    }

    /// Attach `root` (an `Alt`/`Opt`/`Many`/`Seq` node) as the defining rule
    /// of `nt`. A non-terminal may own at most one rule (spec.md §3).
    pub fn rule(&mut self, nt: NtId, root: NodeId) -> Result<RuleId, GrammarError> {
        if self.nt_rule.contains_key(&nt) {
            return Err(GrammarError::new(
                "duplicate-rule",
                format!("non-terminal {:?} already has a defining rule", nt),
            ));
        }
        let id = RuleId(self.rules.len());
        self.rules.push(Rule { nt, root });
        self.nt_rule.insert(nt, id);
        if self.start.is_none() {
            self.start = Some(id);
        }
        Ok(id)
    }

    pub fn node(&self, id: NodeId) -> &EbnfNode {
        &self.nodes[id.0]
    }
    pub fn rule_of(&self, nt: NtId) -> Option<RuleId> {
        self.nt_rule.get(&nt).copied()
    }
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }
    pub fn get_rule(&self, id: RuleId) -> &Rule {
        &self.rules[id.0]
    }
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Every non-terminal referenced anywhere in the tree must own exactly
    /// one rule (spec.md §3 invariant); this walks every node checking `Nt`
    /// references resolve via `nt_rule`.
    pub fn check_defined(&self) -> Result<(), Vec<GrammarError>> {
        let mut errors = Vec::new();
        for node in &self.nodes {
            if let EbnfNode::Nt(nt) = node {
                if !self.nt_rule.contains_key(nt) {
                    errors.push(GrammarError::new(
                        "undefined-non-terminal",
                        format!(
                            "non-terminal '{}' is referenced but never defined",
                            self.symbols.non_terminal(*nt).name
                        ),
                    ));
                }
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            errors.sort_by(|a, b| a.message.cmp(&b.message));
            errors.dedup();
            Err(errors)
        }
    }
}

impl fmt::Debug for EbnfGrammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EbnfGrammar")
            .field("nodes", &self.nodes.len())
            .field("rules", &self.rules.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::SymbolTable;

    #[test]
    fn seq_requires_a_mandatory_child() {
        let mut g = EbnfGrammar::new(SymbolTable::new());
        let opt = g.opt(vec![]);
        let err = g.seq(vec![opt], None).unwrap_err();
        assert_eq!(err.what, "empty-seq");
    }

    #[test]
    fn rule_cannot_be_redefined() {
        let mut symbols = SymbolTable::new();
        let nt = symbols.nt("start").unwrap();
        let mut g = EbnfGrammar::new(symbols);
        let lit = g.symbols.lit("x").unwrap();
        let leaf = g.lit_node(lit);
        let seq = g.seq(vec![leaf], None).unwrap();
        let alt = g.alt(vec![seq]);
        g.rule(nt, alt).unwrap();
        let leaf2 = g.lit_node(lit);
        let seq2 = g.seq(vec![leaf2], None).unwrap();
        let alt2 = g.alt(vec![seq2]);
        let err = g.rule(nt, alt2).unwrap_err();
        assert_eq!(err.what, "duplicate-rule");
    }
}
