//! Specialization of `for` loops into `for-each`.
//!
//! Four lowerings are recognized: the iterator form of class file version 49+, and three array
//! forms that differ by compiler vintage:
//!
//! - Sun javac 1.5: `int j = (tmp = arr).length; for (int i = 0; i < j; i++) v = tmp[i];`
//! - Sun javac 1.6: `tmp = arr; int len = tmp.length; for (int i = 0; i < len; i++) v = tmp[i];`
//! - IBM: `tmp = arr; int i = 0; for (int len = tmp.length; i < len; i++) v = tmp[i];`
//!
//! Every synthetic slot (iterator, cursor, length, array temporary) is purged from the local
//! variable table, keyed on the offset of its original store; the loop variable is marked
//! declared by the rewritten header.

use crate::analyze::AnalyzeContext;
use crate::node::{Condition, Node, NodeKind};
use decaf_classfile::{DeclarationState, JAVA_5};

/// Rewrite `node` into a `FOREACH` when it matches one of the known lowerings; preceding header
/// statements are removed from `list` and `insert` is adjusted accordingly.
pub(crate) fn try_rewrite(
    list: &mut Vec<Node>,
    insert: usize,
    node: Node,
    context: &mut AnalyzeContext,
) -> (usize, Node) {
    if !matches!(node.kind, NodeKind::For { .. }) {
        return (insert, node);
    }
    if let Some(rewrite) = match_iterator(&node, context) {
        return apply(list, insert, node, rewrite, context);
    }
    if let Some(rewrite) = match_sun_15(list, insert, &node) {
        return apply(list, insert, node, rewrite, context);
    }
    if let Some(rewrite) = match_sun_16(list, insert, &node) {
        return apply(list, insert, node, rewrite, context);
    }
    if let Some(rewrite) = match_ibm(list, insert, &node) {
        return apply(list, insert, node, rewrite, context);
    }
    (insert, node)
}

struct Rewrite {
    /// The iterated expression.
    values: Node,
    /// Slot of the loop variable declared by the header.
    variable_slot: u16,
    /// Synthetic slots to purge, each keyed on the offset of its original store.
    purged_slots: Vec<(u16, i32)>,
    /// Header statements to remove before the loop.
    removed_before: usize,
}

fn apply(
    list: &mut Vec<Node>,
    insert: usize,
    node: Node,
    rewrite: Rewrite,
    context: &mut AnalyzeContext,
) -> (usize, Node) {
    let Node { offset, line, kind } = node;
    let (test, mut body) = match kind {
        NodeKind::For { test, body, .. } => (test, body),
        other => {
            return (
                insert,
                Node {
                    offset,
                    line,
                    kind: other,
                },
            );
        }
    };
    let probe = test.as_ref().map_or(offset, |test| test.offset);

    let declaration_store = body.remove(0);
    let store_offset = declaration_store.offset;
    let declaration = Node::new(
        declaration_store.offset,
        declaration_store.line,
        NodeKind::Declare {
            index: rewrite.variable_slot,
            store: Some(Box::new(declaration_store)),
        },
    );
    let variable = context.local_variables.variables_mut().find(|variable| {
        variable.index == rewrite.variable_slot
            && variable.start_pc > store_offset
            && variable.start_pc <= probe
    });
    if let Some(variable) = variable {
        variable.state = DeclarationState::Declared;
    }
    for (slot, slot_store_offset) in rewrite.purged_slots {
        purge_slot(context.local_variables, slot, slot_store_offset);
    }

    let insert = insert - rewrite.removed_before;
    drop(list.drain(insert..insert + rewrite.removed_before));
    let node = Node::new(
        offset,
        line,
        NodeKind::ForEach {
            declaration: Box::new(declaration),
            values: Box::new(rewrite.values),
            body,
        },
    );
    (insert, node)
}

/// `for (V v : values)` over an iterator: `it = values.iterator(); while (it.hasNext())
/// { v = (V) it.next(); ... }`.
fn match_iterator(node: &Node, context: &AnalyzeContext) -> Option<Rewrite> {
    if context.major_version < JAVA_5 {
        return None;
    }
    let NodeKind::For {
        init: Some(init),
        test: Some(test),
        update: None,
        body,
    } = &node.kind
    else {
        return None;
    };

    let NodeKind::Store {
        index: iterator_slot,
        value: iterator_value,
        ..
    } = &init.kind
    else {
        return None;
    };
    let NodeKind::Invoke(iterator_invoke) = &iterator_value.kind else {
        return None;
    };
    let iterator_name = context
        .constant_pool
        .method_name(iterator_invoke.method_index)
        .ok()?;
    if iterator_name != "iterator" {
        return None;
    }
    let values = iterator_invoke.target.as_deref()?.clone();

    // while (it.hasNext())
    let NodeKind::If {
        condition: Condition::Ne,
        value: test_value,
        ..
    } = &test.kind
    else {
        return None;
    };
    let NodeKind::Invoke(has_next) = &test_value.kind else {
        return None;
    };
    if context.constant_pool.method_name(has_next.method_index).ok()? != "hasNext"
        || has_next.target.as_deref().and_then(Node::load_slot) != Some(*iterator_slot)
    {
        return None;
    }

    // v = (V) it.next()
    let first = body.first()?;
    let NodeKind::Store {
        index: variable_slot,
        value: next_value,
        ..
    } = &first.kind
    else {
        return None;
    };
    let next_invoke = match &next_value.kind {
        NodeKind::CheckCast { value, .. } => match &value.kind {
            NodeKind::Invoke(invoke) => invoke,
            _ => return None,
        },
        NodeKind::Invoke(invoke) => invoke,
        _ => return None,
    };
    if context.constant_pool.method_name(next_invoke.method_index).ok()? != "next"
        || next_invoke.target.as_deref().and_then(Node::load_slot) != Some(*iterator_slot)
    {
        return None;
    }

    Some(Rewrite {
        values,
        variable_slot: *variable_slot,
        purged_slots: vec![(*iterator_slot, init.offset)],
        removed_before: 0,
    })
}

/// Remove the synthetic variable of `slot`; it becomes live within the store's 1 to 3 byte
/// encoding, so the first containing range past the store wins.
fn purge_slot(
    local_variables: &mut decaf_classfile::LocalVariableTable,
    slot: u16,
    store_offset: i32,
) {
    for probe in 1..=3 {
        if local_variables.remove_with_index_and_offset(slot, store_offset + probe) {
            return;
        }
    }
}

/// Sun javac 1.5: the array and its length captured through a duplicated store before the loop.
fn match_sun_15(list: &[Node], insert: usize, node: &Node) -> Option<Rewrite> {
    if insert < 3 {
        return None;
    }
    let NodeKind::DupStore { value: array_value } = &list[insert - 3].kind else {
        return None;
    };
    let dup_offset = list[insert - 3].offset;
    let NodeKind::Store {
        index: array_slot,
        value: parked,
        ..
    } = &list[insert - 2].kind
    else {
        return None;
    };
    if !matches!(&parked.kind, NodeKind::DupLoad { store_offset } if *store_offset == dup_offset) {
        return None;
    }
    let NodeKind::Store {
        index: length_slot,
        value: length_value,
        ..
    } = &list[insert - 1].kind
    else {
        return None;
    };
    let NodeKind::ArrayLength { array } = &length_value.kind else {
        return None;
    };
    if !matches!(&array.kind, NodeKind::DupLoad { store_offset } if *store_offset == dup_offset) {
        return None;
    }

    let parts = array_loop_parts(node, *array_slot, *length_slot)?;
    Some(Rewrite {
        values: array_value.as_ref().clone(),
        variable_slot: parts.variable_slot,
        purged_slots: vec![
            (*array_slot, list[insert - 2].offset),
            (*length_slot, list[insert - 1].offset),
            (parts.cursor_slot, parts.cursor_store_offset),
        ],
        removed_before: 3,
    })
}

/// Sun javac 1.6: plain stores of the array and its length before the loop.
fn match_sun_16(list: &[Node], insert: usize, node: &Node) -> Option<Rewrite> {
    if insert < 2 {
        return None;
    }
    let NodeKind::Store {
        index: array_slot,
        value: array_value,
        ..
    } = &list[insert - 2].kind
    else {
        return None;
    };
    let NodeKind::Store {
        index: length_slot,
        value: length_value,
        ..
    } = &list[insert - 1].kind
    else {
        return None;
    };
    let NodeKind::ArrayLength { array } = &length_value.kind else {
        return None;
    };
    if array.load_slot() != Some(*array_slot) {
        return None;
    }

    let parts = array_loop_parts(node, *array_slot, *length_slot)?;
    Some(Rewrite {
        values: array_value.as_ref().clone(),
        variable_slot: parts.variable_slot,
        purged_slots: vec![
            (*array_slot, list[insert - 2].offset),
            (*length_slot, list[insert - 1].offset),
            (parts.cursor_slot, parts.cursor_store_offset),
        ],
        removed_before: 2,
    })
}

/// IBM: array and cursor stored before the loop, the length store serving as the `for` init.
fn match_ibm(list: &[Node], insert: usize, node: &Node) -> Option<Rewrite> {
    if insert < 2 {
        return None;
    }
    let NodeKind::Store {
        index: array_slot,
        value: array_value,
        ..
    } = &list[insert - 2].kind
    else {
        return None;
    };
    if matches!(array_value.kind, NodeKind::DupLoad { .. }) {
        return None;
    }
    let NodeKind::Store {
        index: cursor_slot,
        value: cursor_value,
        ..
    } = &list[insert - 1].kind
    else {
        return None;
    };
    if !matches!(
        cursor_value.kind,
        NodeKind::Const(crate::node::ConstValue::Int(0))
    ) {
        return None;
    }

    let NodeKind::For {
        init: Some(init),
        test: Some(test),
        update: Some(update),
        body,
    } = &node.kind
    else {
        return None;
    };
    let NodeKind::Store {
        index: length_slot,
        value: length_value,
        ..
    } = &init.kind
    else {
        return None;
    };
    let NodeKind::ArrayLength { array } = &length_value.kind else {
        return None;
    };
    if array.load_slot() != Some(*array_slot) {
        return None;
    }
    check_array_header(test, update, body, *array_slot, *cursor_slot, *length_slot).map(
        |variable_slot| Rewrite {
            values: array_value.as_ref().clone(),
            variable_slot,
            purged_slots: vec![
                (*array_slot, list[insert - 2].offset),
                (*cursor_slot, list[insert - 1].offset),
                (*length_slot, init.offset),
            ],
            removed_before: 2,
        },
    )
}

struct ArrayLoopParts {
    variable_slot: u16,
    cursor_slot: u16,
    cursor_store_offset: i32,
}

/// The Sun shapes: `for (cursor = 0; cursor < length; cursor++) v = tmp[cursor];`.
fn array_loop_parts(node: &Node, array_slot: u16, length_slot: u16) -> Option<ArrayLoopParts> {
    let NodeKind::For {
        init: Some(init),
        test: Some(test),
        update: Some(update),
        body,
    } = &node.kind
    else {
        return None;
    };
    let NodeKind::Store {
        index: cursor_slot,
        value: cursor_value,
        ..
    } = &init.kind
    else {
        return None;
    };
    if !matches!(
        cursor_value.kind,
        NodeKind::Const(crate::node::ConstValue::Int(0))
    ) {
        return None;
    }
    let variable_slot =
        check_array_header(test, update, body, array_slot, *cursor_slot, length_slot)?;
    Some(ArrayLoopParts {
        variable_slot,
        cursor_slot: *cursor_slot,
        cursor_store_offset: init.offset,
    })
}

/// Verify `cursor < length`, `cursor++`, and a body leading with `v = tmp[cursor]`; returns the
/// loop variable slot.
fn check_array_header(
    test: &Node,
    update: &Node,
    body: &[Node],
    array_slot: u16,
    cursor_slot: u16,
    length_slot: u16,
) -> Option<u16> {
    let NodeKind::IfCmp {
        condition: Condition::Lt,
        left,
        right,
        ..
    } = &test.kind
    else {
        return None;
    };
    if left.load_slot() != Some(cursor_slot) || right.load_slot() != Some(length_slot) {
        return None;
    }
    if !matches!(update.kind, NodeKind::Iinc { index, increment: 1 } if index == cursor_slot) {
        return None;
    }
    let first = body.first()?;
    let NodeKind::Store {
        index: variable_slot,
        value,
        ..
    } = &first.kind
    else {
        return None;
    };
    let NodeKind::ArrayLoad { array, index } = &value.kind else {
        return None;
    };
    if array.load_slot() != Some(array_slot) || index.load_slot() != Some(cursor_slot) {
        return None;
    }
    Some(*variable_slot)
}
