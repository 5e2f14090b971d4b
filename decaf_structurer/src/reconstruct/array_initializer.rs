//! Folding of array initializers.
//!
//! `new int[] {a, b, c}` compiles to a `newarray` duplicated once per element store:
//!
//! ```text
//! newarray int; dup; iconst_0; A; iastore; dup; iconst_1; B; iastore; ...
//! ```
//!
//! which the decoder renders as a `DupStore` of the allocation followed by element stores through
//! `DupLoad`s. The allocation and the stores collapse into a single initialized-array node spliced
//! into the final consumer of the array value.

use crate::node::{ConstValue, Node, NodeKind, count_in_expressions};

pub(crate) fn apply(list: &mut Vec<Node>) {
    let mut index = 0;
    while index < list.len() {
        let Some(folded) = try_fold(list, index) else {
            index += 1;
            continue;
        };
        let element_count = folded.values.len();
        let store_offset = list[index].offset;
        let NodeKind::DupStore { value: array } = list.remove(index).kind else {
            continue;
        };
        list.drain(index..index + element_count);

        let initializer = Node::new(
            array.offset,
            array.line,
            NodeKind::InitArray {
                array,
                values: folded.values,
            },
        );
        let is_reference = move |candidate: &Node| {
            matches!(candidate.kind, NodeKind::DupLoad { store_offset: candidate_offset }
                if candidate_offset == store_offset)
        };
        let mut replacement = Some(initializer);
        for consumer in list.iter_mut().skip(index) {
            if crate::node::replace_in_expressions(consumer, &is_reference, &mut replacement) {
                break;
            }
        }
    }
}

struct FoldedInitializer {
    values: Vec<Node>,
}

/// Match a `DupStore` of an array allocation at `index` followed by consecutive constant-index
/// element stores through its `DupLoad`s, with exactly one array use remaining afterwards.
fn try_fold(list: &mut [Node], index: usize) -> Option<FoldedInitializer> {
    let store_offset = list[index].offset;
    let NodeKind::DupStore { value: array } = &list[index].kind else {
        return None;
    };
    if !matches!(
        array.kind,
        NodeKind::NewArray { .. } | NodeKind::ANewArray { .. }
    ) {
        return None;
    }

    let references_store = move |candidate: &Node| {
        matches!(candidate.kind, NodeKind::DupLoad { store_offset: candidate_offset }
            if candidate_offset == store_offset)
    };
    let mut values = Vec::new();
    let mut cursor = index + 1;
    while cursor < list.len() {
        let NodeKind::ArrayStore {
            array: stored_array,
            index: element_index,
            value,
        } = &list[cursor].kind
        else {
            break;
        };
        if !references_store(stored_array) {
            break;
        }
        let expected = i32::try_from(values.len()).ok()?;
        let NodeKind::Const(ConstValue::Int(element)) = &element_index.kind else {
            break;
        };
        if *element != expected {
            break;
        }
        values.push(value.as_ref().clone());
        cursor += 1;
    }
    if values.is_empty() {
        return None;
    }

    // Exactly one use of the array must remain: its real consumer.
    let mut remaining = 0;
    for node in list.iter_mut().skip(cursor) {
        remaining += count_in_expressions(node, &references_store);
        if matches!(node.kind, NodeKind::DupLoad { store_offset: candidate } if candidate == store_offset)
        {
            remaining += 1;
        }
    }
    if remaining != 1 {
        return None;
    }
    Some(FoldedInitializer { values })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::node::TypeKind;

    fn dup_load(offset: i32, store_offset: i32) -> Node {
        Node::new(offset, -1, NodeKind::DupLoad { store_offset })
    }

    fn element_store(offset: i32, store_offset: i32, index: i32, value: i32) -> Node {
        Node::new(
            offset,
            -1,
            NodeKind::ArrayStore {
                array: Box::new(dup_load(offset, store_offset)),
                index: Box::new(Node::new(offset, -1, NodeKind::Const(ConstValue::Int(index)))),
                value: Box::new(Node::new(offset, -1, NodeKind::Const(ConstValue::Int(value)))),
            },
        )
    }

    #[test]
    fn test_folds_initializer_into_store() {
        let mut list = vec![
            Node::new(
                2,
                -1,
                NodeKind::DupStore {
                    value: Box::new(Node::new(
                        2,
                        -1,
                        NodeKind::NewArray {
                            kind: TypeKind::Int,
                            count: Box::new(Node::new(1, -1, NodeKind::Const(ConstValue::Int(2)))),
                        },
                    )),
                },
            ),
            element_store(5, 2, 0, 7),
            element_store(9, 2, 1, 8),
            Node::new(
                13,
                -1,
                NodeKind::Store {
                    kind: TypeKind::Reference,
                    index: 1,
                    value: Box::new(dup_load(12, 2)),
                },
            ),
        ];
        apply(&mut list);
        assert_eq!(1, list.len());
        let NodeKind::Store { value, .. } = &list[0].kind else {
            panic!("expected store, found {}", list[0]);
        };
        let NodeKind::InitArray { values, .. } = &value.kind else {
            panic!("expected initarray");
        };
        assert_eq!(2, values.len());
        assert!(matches!(values[0].kind, NodeKind::Const(ConstValue::Int(7))));
        assert!(matches!(values[1].kind, NodeKind::Const(ConstValue::Int(8))));
    }

    #[test]
    fn test_leaves_sparse_stores() {
        // Element index 1 is skipped, so this is not an initializer shape.
        let mut list = vec![
            Node::new(
                2,
                -1,
                NodeKind::DupStore {
                    value: Box::new(Node::new(
                        2,
                        -1,
                        NodeKind::NewArray {
                            kind: TypeKind::Int,
                            count: Box::new(Node::new(1, -1, NodeKind::Const(ConstValue::Int(4)))),
                        },
                    )),
                },
            ),
            element_store(5, 2, 2, 7),
            Node::new(
                13,
                -1,
                NodeKind::Store {
                    kind: TypeKind::Reference,
                    index: 1,
                    value: Box::new(dup_load(12, 2)),
                },
            ),
        ];
        let before = list.clone();
        apply(&mut list);
        assert_eq!(before, list);
    }
}
