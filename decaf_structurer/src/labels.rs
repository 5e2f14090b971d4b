//! Jump rewriting and label insertion.
//!
//! After structuring, the remaining `goto`s are rewritten top-down with fresh scope bounds per
//! nesting level: jumps into the control region of the enclosing loop become `GOTO_CONTINUE`
//! (dropped entirely at a loop body's tail), jumps to the enclosing break target become
//! `GOTO_BREAK`, jumps to the method's trailing `return` are inlined, jumps to a `load; return`
//! pair duplicate the return, and everything else registers its target and becomes
//! `GOTO_LABELED_BREAK`. Registered targets are then resolved by descending to the deepest block
//! containing a node at the offset and wrapping it in a `LABEL`.

use crate::analyze::ReturnSites;
use crate::node::{
    Node, NodeKind, first_offset, index_at_or_after, last_offset, tree_min_offset,
};
use ahash::AHashSet;

/// The jump targets of the enclosing loop and switch, recomputed per nesting level from the node
/// shapes.
#[derive(Clone, Copy, Debug)]
pub(crate) struct JumpScope {
    /// Entry region of the enclosing infinite loop (backward continue): the first statement's
    /// operand bytes through its opcode, disabled when low > high.
    entry_low: i32,
    entry_high: i32,
    /// Continue region of the enclosing loop: the folded test/update offsets, disabled when
    /// low > high.
    continue_low: i32,
    continue_high: i32,
    break_offset: i32,
}

impl JumpScope {
    pub(crate) fn method() -> Self {
        JumpScope {
            entry_low: 0,
            entry_high: -1,
            continue_low: 0,
            continue_high: -1,
            break_offset: -1,
        }
    }

    fn is_continue(&self, target: i32) -> bool {
        (target >= self.entry_low && target <= self.entry_high)
            || (target >= self.continue_low && target <= self.continue_high)
    }
}

/// Rewrite the remaining raw jumps of `list` and collect unresolvable targets into `labels`.
pub(crate) fn rewrite_jumps(
    list: &mut Vec<Node>,
    scope: &JumpScope,
    after_list: i32,
    returns: &ReturnSites,
    labels: &mut AHashSet<i32>,
) {
    let mut index = 0;
    while index < list.len() {
        let next_offset = list
            .get(index + 1)
            .map_or(after_list, |next| next.offset);
        rewrite_nested(&mut list[index], scope, next_offset, returns, labels);

        if list[index].is_goto() {
            if let Some(target) = list[index].jump_target() {
                let offset = list[index].offset;
                let line = list[index].line;
                let is_break = scope.break_offset >= 0
                    && target <= scope.break_offset
                    && target > last_offset(list);
                if scope.is_continue(target) {
                    list[index].kind = NodeKind::GotoContinue;
                } else if is_break {
                    list[index].kind = NodeKind::GotoBreak;
                } else if returns.bare_return >= 0 && target == returns.bare_return {
                    list[index].kind = NodeKind::Return;
                } else if let Some(site) = returns.value_return_at(target) {
                    list[index] = Node::new(offset, line, site.kind.clone());
                } else {
                    labels.insert(target);
                    list[index].kind = NodeKind::GotoLabeledBreak { target };
                }
            }
        }
        index += 1;
    }
}

/// Recurse into the bodies of a structured node with the scope its shape defines.
fn rewrite_nested(
    node: &mut Node,
    scope: &JumpScope,
    next_offset: i32,
    returns: &ReturnSites,
    labels: &mut AHashSet<i32>,
) {
    let node_offset = node.offset;
    match &mut node.kind {
        NodeKind::While { test, body } | NodeKind::DoWhile { test, body } => {
            let child = loop_scope(test_low(test), node_offset, body, next_offset);
            rewrite_jumps(body, &child, node_offset, returns, labels);
            drop_tail_continue(body);
        }
        NodeKind::For {
            test, update, body, ..
        } => {
            let low = update
                .as_deref_mut()
                .map(tree_min_offset)
                .or_else(|| test.as_deref_mut().map(test_low))
                .unwrap_or(node_offset);
            let child = loop_scope(low, node_offset, body, next_offset);
            rewrite_jumps(body, &child, node_offset, returns, labels);
            drop_tail_continue(body);
        }
        NodeKind::ForEach { body, .. } => {
            let low = last_offset(body) + 1;
            let child = loop_scope(low, node_offset, body, next_offset);
            rewrite_jumps(body, &child, node_offset, returns, labels);
            drop_tail_continue(body);
        }
        NodeKind::InfiniteLoop { body } => {
            let entry_low = body.first_mut().map_or(0, tree_min_offset);
            let child = JumpScope {
                entry_low,
                entry_high: first_offset(body),
                continue_low: last_offset(body) + 1,
                continue_high: node_offset,
                break_offset: next_offset,
            };
            rewrite_jumps(body, &child, node_offset, returns, labels);
            drop_tail_continue(body);
        }
        NodeKind::SwitchBlock(switch_block) => {
            let child = JumpScope {
                break_offset: next_offset,
                ..*scope
            };
            for case in &mut switch_block.cases {
                rewrite_jumps(&mut case.body, &child, next_offset, returns, labels);
            }
        }
        NodeKind::Try(try_block) => {
            rewrite_jumps(&mut try_block.body, scope, next_offset, returns, labels);
            for catch in &mut try_block.catches {
                rewrite_jumps(&mut catch.body, scope, next_offset, returns, labels);
            }
            if let Some(finally_body) = &mut try_block.finally_body {
                rewrite_jumps(finally_body, scope, next_offset, returns, labels);
            }
        }
        NodeKind::Synchronized { body, .. } => {
            rewrite_jumps(body, scope, next_offset, returns, labels);
        }
        NodeKind::IfSimple { body, .. } => {
            rewrite_jumps(body, scope, next_offset, returns, labels);
        }
        NodeKind::IfElse {
            body, else_body, ..
        } => {
            rewrite_jumps(body, scope, next_offset, returns, labels);
            rewrite_jumps(else_body, scope, next_offset, returns, labels);
        }
        NodeKind::Label { inner, .. } => {
            if let Some(inner) = inner {
                rewrite_nested(inner, scope, next_offset, returns, labels);
            }
        }
        _ => {}
    }
}

/// Scope of a test-first or bottom-test loop body: continues land anywhere in the folded
/// test/update region `[low, node_offset]` or after the last body statement.
fn loop_scope(low: i32, node_offset: i32, body: &[Node], break_offset: i32) -> JumpScope {
    let tail = last_offset(body) + 1;
    let continue_low = if body.is_empty() { low } else { low.min(tail) };
    JumpScope {
        entry_low: 0,
        entry_high: -1,
        continue_low,
        continue_high: node_offset,
        break_offset,
    }
}

/// A `continue` as the last statement of a loop body is implicit.
fn drop_tail_continue(body: &mut Vec<Node>) {
    if matches!(
        body.last().map(|node| &node.kind),
        Some(NodeKind::GotoContinue)
    ) {
        body.pop();
    }
}

/// The smallest offset in the expression tree of a loop test, covering the operand loads emitted
/// before the branch opcode.
fn test_low(test: &mut Node) -> i32 {
    tree_min_offset(test)
}

/// Wrap the node at each registered offset in a `LABEL`, descending to the deepest block that
/// contains it.
pub(crate) fn insert_labels(list: &mut Vec<Node>, labels: &AHashSet<i32>) {
    let mut targets: Vec<i32> = labels.iter().copied().collect();
    targets.sort_unstable();
    for target in targets {
        wrap_label(list, target);
    }
}

fn wrap_label(list: &mut Vec<Node>, target: i32) -> bool {
    let index = index_at_or_after(list, target);
    if index >= list.len() {
        return false;
    }

    // Prefer a deeper block containing the offset.
    for body in list[index].bodies_mut() {
        if first_offset(body) <= target && target <= last_offset(body) && wrap_label(body, target)
        {
            return true;
        }
    }
    if matches!(list[index].kind, NodeKind::Label { target: existing, .. } if existing == target) {
        return true;
    }
    let inner = list.remove(index);
    let offset = inner.offset;
    let line = inner.line;
    list.insert(
        index,
        Node::new(
            offset,
            line,
            NodeKind::Label {
                target,
                inner: Some(Box::new(inner)),
            },
        ),
    );
    true
}
