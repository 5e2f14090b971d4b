//! Recognition of `x = x OP expr` as `x OP= expr`.
//!
//! Applies to local variables, instance fields, static fields and array elements. Field and array
//! forms read their target through the `DupLoad`s the decoder parked for the duplicated
//! receiver; the dup cleanup pass that follows resolves those.

use crate::node::{BinaryOperator, Node, NodeKind};

pub(crate) fn apply(list: &mut [Node]) {
    for node in list.iter_mut() {
        if let Some((operator, target, value)) = match_compound(node) {
            node.kind = NodeKind::CompoundAssign {
                operator,
                target: Box::new(target),
                value: Box::new(value),
            };
        }
    }
}

fn match_compound(node: &Node) -> Option<(BinaryOperator, Node, Node)> {
    match &node.kind {
        NodeKind::Store {
            index, value: stored, ..
        } => {
            let (operator, left, right) = binary_parts(stored)?;
            if left.load_slot() == Some(*index) {
                Some((operator, left.clone(), right.clone()))
            } else {
                None
            }
        }
        NodeKind::PutStatic {
            field_index,
            value: stored,
        } => {
            let (operator, left, right) = binary_parts(stored)?;
            if matches!(left.kind, NodeKind::GetStatic { field_index: read }
                if read == *field_index)
            {
                Some((operator, left.clone(), right.clone()))
            } else {
                None
            }
        }
        NodeKind::PutField {
            field_index,
            target,
            value: stored,
        } => {
            let (operator, left, right) = binary_parts(stored)?;
            let NodeKind::GetField {
                field_index: read,
                target: read_target,
            } = &left.kind
            else {
                return None;
            };
            if read == field_index && same_reference(target, read_target) {
                Some((operator, left.clone(), right.clone()))
            } else {
                None
            }
        }
        NodeKind::ArrayStore {
            array,
            index,
            value: stored,
        } => {
            let (operator, left, right) = binary_parts(stored)?;
            let NodeKind::ArrayLoad {
                array: read_array,
                index: read_index,
            } = &left.kind
            else {
                return None;
            };
            if same_reference(array, read_array) && same_reference(index, read_index) {
                Some((operator, left.clone(), right.clone()))
            } else {
                None
            }
        }
        _ => None,
    }
}

fn binary_parts(node: &Node) -> Option<(BinaryOperator, &Node, &Node)> {
    let NodeKind::BinaryOp {
        operator,
        left,
        right,
    } = &node.kind
    else {
        return None;
    };
    Some((*operator, left, right))
}

/// Structural identity of assignment targets: the same slot, the same parked duplicate, or the
/// same static field.
fn same_reference(first: &Node, second: &Node) -> bool {
    match (&first.kind, &second.kind) {
        (
            NodeKind::Load { index: first_slot, .. },
            NodeKind::Load { index: second_slot, .. },
        ) => first_slot == second_slot,
        (
            NodeKind::DupLoad { store_offset: first_offset },
            NodeKind::DupLoad { store_offset: second_offset },
        ) => first_offset == second_offset,
        (
            NodeKind::GetStatic { field_index: first_field },
            NodeKind::GetStatic { field_index: second_field },
        ) => first_field == second_field,
        _ => false,
    }
}
