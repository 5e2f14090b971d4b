//! Reconstruction of `assert` statements.
//!
//! `assert cond : message;` compiles to a guard over the synthetic `$assertionsDisabled` field:
//!
//! ```text
//! getstatic $assertionsDisabled
//! ifne END
//! <cond> ifXX END
//! new AssertionError; dup; [message]; invokespecial <init>; athrow
//! END:
//! ```
//!
//! The guard, the condition branch and the throw fold into a single `assert` node whose test is
//! the condition branch itself (the branch skips the throw when the asserted condition holds).

use crate::node::{Condition, InvokeKind, Node, NodeKind};
use decaf_classfile::ConstantPool;

pub(crate) fn apply(list: &mut Vec<Node>, constant_pool: &ConstantPool) {
    let mut index = 0;
    while index + 2 < list.len() {
        let Some(end) = match_disabled_guard(&list[index], constant_pool) else {
            index += 1;
            continue;
        };
        if list[index + 1].jump_target() != Some(end) || !list[index + 1].is_conditional_branch() {
            index += 1;
            continue;
        }
        let NodeKind::Throw { value } = &list[index + 2].kind else {
            index += 1;
            continue;
        };
        let NodeKind::Invoke(invoke) = &value.kind else {
            index += 1;
            continue;
        };
        let is_assertion_error = invoke.kind == InvokeKind::Constructor
            && matches!(
                constant_pool.method_class_name(invoke.method_index),
                Ok("java/lang/AssertionError")
            );
        if !is_assertion_error || list[index + 2].offset >= end {
            index += 1;
            continue;
        }
        let message = invoke.args.first().cloned().map(Box::new);
        let offset = list[index + 2].offset;
        let line = list[index].line;
        let test = list.remove(index + 1).into_test();
        list.drain(index..=index + 1);
        list.insert(
            index,
            Node::new(
                offset,
                line,
                NodeKind::Assert {
                    test: Box::new(test),
                    message,
                },
            ),
        );
        index += 1;
    }
}

/// Match `getstatic $assertionsDisabled; ifne END` and return `END`.
fn match_disabled_guard(node: &Node, constant_pool: &ConstantPool) -> Option<i32> {
    let NodeKind::If {
        condition: Condition::Ne,
        value,
        delta,
    } = &node.kind
    else {
        return None;
    };
    if *delta <= 0 {
        return None;
    }
    let NodeKind::GetStatic { field_index } = &value.kind else {
        return None;
    };
    if constant_pool.field_name(*field_index).ok()? != "$assertionsDisabled" {
        return None;
    }
    Some(node.offset + *delta)
}
