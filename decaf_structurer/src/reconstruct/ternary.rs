//! Folding of `cond ? a : b` shapes.
//!
//! The decoder parks the true arm in a [`NodeKind::TernaryStore`] when it crosses the bridging
//! `goto` with a live stack value; the false arm ends up folded into the converging consumer
//! statement. The pattern at list level is therefore:
//!
//! ```text
//! if COND -> ELSE
//! ternarystore A
//! goto JOIN
//! consumer(... B ...)        with B the first operand in [ELSE, JOIN)
//! ```
//!
//! which folds into `consumer(... !COND ? A : B ...)`.

use crate::node::{Node, NodeKind, count_in_expressions};

pub(crate) fn apply(list: &mut Vec<Node>) {
    let mut index = 1;
    while index + 2 < list.len() {
        if !matches!(list[index].kind, NodeKind::TernaryStore { .. })
            || !list[index - 1].is_conditional_branch()
            || !list[index + 1].is_goto()
        {
            index += 1;
            continue;
        }
        let Some(else_offset) = list[index - 1].jump_target() else {
            index += 1;
            continue;
        };
        let Some(join_offset) = list[index + 1].jump_target() else {
            index += 1;
            continue;
        };
        if else_offset <= list[index].offset || join_offset <= else_offset {
            index += 1;
            continue;
        }
        let in_false_arm = move |candidate: &Node| {
            candidate.offset >= else_offset && candidate.offset < join_offset
        };
        if count_in_expressions(&mut list[index + 2], &in_false_arm) == 0 {
            index += 1;
            continue;
        }

        let NodeKind::TernaryStore { value: if_true } = list.remove(index).kind else {
            continue;
        };
        let mut branch = list.remove(index - 1);
        list.remove(index - 1);
        branch.invert_condition();
        let offset = branch.offset;
        let line = branch.line;
        let mut parts = Some((branch.into_test(), *if_true));
        fold_first(&mut list[index - 1], &in_false_arm, &mut parts, offset, line);
    }
}

/// Replace the first operand satisfying `predicate` with a ternary whose false arm is that
/// operand; `parts` holds the test and the true arm and is taken on the first match.
fn fold_first(
    node: &mut Node,
    predicate: &impl Fn(&Node) -> bool,
    parts: &mut Option<(Node, Node)>,
    offset: i32,
    line: i32,
) -> bool {
    for child in node.children_mut() {
        if predicate(child) {
            if let Some((test, if_true)) = parts.take() {
                let if_false = std::mem::replace(child, Node::new(offset, line, NodeKind::Return));
                *child = Node::new(
                    offset,
                    line,
                    NodeKind::Ternary {
                        test: Box::new(test),
                        if_true: Box::new(if_true),
                        if_false: Box::new(if_false),
                    },
                );
            }
            return true;
        }
        if fold_first(child, predicate, parts, offset, line) {
            return true;
        }
    }
    false
}
