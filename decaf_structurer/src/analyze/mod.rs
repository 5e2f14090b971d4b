//! Control flow analysis over flat instruction lists.
//!
//! [`analyze_list`] runs the three recognizers over one list (loops from the back, then
//! switches, then conditionals) and each recognizer recurses into the bodies it extracts with an
//! updated [`Scope`]. Loops must run first (a backward branch outranks any forward shape),
//! switches must run before conditionals (the string-switch shape contains forward conditionals
//! that must not be structured as `if`s).

pub(crate) mod conditional;
pub(crate) mod foreach;
pub(crate) mod loops;
pub(crate) mod switches;

use crate::error::Result;
use crate::node::{Node, NodeKind};
use ahash::{AHashMap, AHashSet};
use decaf_classfile::{ConstantPool, LocalVariableTable};
use indexmap::IndexMap;

/// The escape offsets of the list currently being analyzed, passed top-down; nested bodies get
/// fresh values, never references back into the parent.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct Scope {
    /// Backward continue target: the body start of the enclosing infinite loop, −1 otherwise.
    pub loop_entry: i32,
    /// Forward continue target: the test or update offset of the enclosing loop, −1 otherwise.
    pub continue_offset: i32,
    /// Secondary forward continue target (the test of a `for` whose primary is the update), −1
    /// otherwise.
    pub continue_alt: i32,
    /// Break target of the enclosing loop or switch, −1 otherwise.
    pub break_offset: i32,
    /// Offset just past the current list.
    pub after_list: i32,
}

impl Scope {
    /// The scope of a method's top level list.
    pub(crate) fn method(after_list: i32) -> Self {
        Scope {
            loop_entry: -1,
            continue_offset: -1,
            continue_alt: -1,
            break_offset: -1,
            after_list,
        }
    }

    /// Returns true if a jump to `target` is a `continue` of the enclosing loop. The entry of an
    /// infinite loop is compared as an upper bound: branch targets land on the first operand byte
    /// of the entry statement, not its opcode.
    pub(crate) fn is_continue(&self, target: i32) -> bool {
        (self.loop_entry >= 0 && target <= self.loop_entry)
            || (self.continue_offset >= 0 && target == self.continue_offset)
            || (self.continue_alt >= 0 && target == self.continue_alt)
    }
}

/// The return statements a forward jump may be folded into: the method's trailing bare `return`
/// and every `load; return` pair, indexed by offset.
#[derive(Clone, Debug)]
pub(crate) struct ReturnSites {
    /// Offset of the method's final bare `return`, −1 when the method does not end with one.
    pub bare_return: i32,
    sites: Vec<(i32, i32, Node)>,
}

impl Default for ReturnSites {
    fn default() -> Self {
        ReturnSites {
            bare_return: -1,
            sites: Vec::new(),
        }
    }
}

impl ReturnSites {
    /// Snapshot the return sites of a freshly decoded list.
    pub(crate) fn collect(list: &[Node]) -> Self {
        let bare_return = match list.last() {
            Some(node) if matches!(node.kind, NodeKind::Return) => node.offset,
            _ => -1,
        };
        let mut sites = Vec::new();
        for node in list {
            if let NodeKind::ValueReturn { value } = &node.kind {
                if value.load_slot().is_some() {
                    sites.push((value.offset, node.offset, node.clone()));
                }
            }
        }
        ReturnSites { bare_return, sites }
    }

    /// The `load; return` pair covering `target`, if any.
    pub(crate) fn value_return_at(&self, target: i32) -> Option<&Node> {
        self.sites
            .iter()
            .find(|(from, to, _)| target >= *from && target <= *to)
            .map(|(_, _, node)| node)
    }
}

/// Shared state of the per-method analysis.
pub(crate) struct AnalyzeContext<'a> {
    pub constant_pool: &'a mut ConstantPool,
    pub local_variables: &'a mut LocalVariableTable,
    pub switch_maps: &'a AHashMap<u16, IndexMap<i32, i32>>,
    pub major_version: u16,
    pub returns: ReturnSites,
    /// Offsets that could not be rewritten as break/continue; labels are inserted for them at the
    /// end of the pipeline.
    pub labels: AHashSet<i32>,
}

/// Analyze one list: loops, then switches, then conditionals. Recursion into extracted bodies
/// happens inside the recognizers, each with an updated scope; the bodies of `try` and
/// `synchronized` blocks, which were built before this analysis, are descended into afterwards.
pub(crate) fn analyze_list(
    list: &mut Vec<Node>,
    scope: &Scope,
    context: &mut AnalyzeContext,
) -> Result<()> {
    loops::analyze(list, scope, context)?;
    switches::analyze(list, scope, context)?;
    conditional::analyze(list, scope, context)?;

    for index in 0..list.len() {
        let next_offset = if index + 1 < list.len() {
            list[index + 1].offset
        } else {
            scope.after_list
        };
        let child = Scope {
            after_list: next_offset,
            ..*scope
        };
        match &mut list[index].kind {
            NodeKind::Try(try_block) => {
                analyze_list(&mut try_block.body, &child, context)?;
                for catch in &mut try_block.catches {
                    analyze_list(&mut catch.body, &child, context)?;
                }
                if let Some(finally_body) = &mut try_block.finally_body {
                    analyze_list(finally_body, &child, context)?;
                }
            }
            NodeKind::Synchronized { body, .. } => {
                analyze_list(body, &child, context)?;
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::node::TypeKind;

    #[test]
    fn test_scope_is_continue() {
        let scope = Scope {
            loop_entry: -1,
            continue_offset: 12,
            continue_alt: 8,
            break_offset: 20,
            after_list: 20,
        };
        assert!(scope.is_continue(12));
        assert!(scope.is_continue(8));
        assert!(!scope.is_continue(20));
        assert!(!scope.is_continue(-1));
    }

    #[test]
    fn test_return_sites() {
        let list = vec![
            Node::new(
                3,
                -1,
                NodeKind::ValueReturn {
                    value: Box::new(Node::new(
                        2,
                        -1,
                        NodeKind::Load {
                            kind: TypeKind::Int,
                            index: 1,
                        },
                    )),
                },
            ),
            Node::new(4, -1, NodeKind::Return),
        ];
        let returns = ReturnSites::collect(&list);
        assert_eq!(4, returns.bare_return);
        assert!(returns.value_return_at(2).is_some());
        assert!(returns.value_return_at(3).is_some());
        assert!(returns.value_return_at(4).is_none());
    }
}
