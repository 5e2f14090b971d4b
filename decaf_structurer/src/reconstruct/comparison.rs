//! Aggregation of `lcmp`/`fcmpl`/`fcmpg`/`dcmpl`/`dcmpg` with the integer branch consuming them.
//!
//! A `long`/`float`/`double` comparison compiles to a three-way compare pushing −1/0/1 followed by
//! an `ifeq`-family branch against zero. The pair is merged into a single three-operand
//! compare-and-branch node so the recognizers downstream see one condition.

use crate::node::{Node, NodeKind};

pub(crate) fn apply(list: &mut [Node]) {
    for node in list.iter_mut() {
        let NodeKind::If {
            condition,
            value,
            delta,
        } = &mut node.kind
        else {
            continue;
        };
        let condition = *condition;
        let delta = *delta;
        let NodeKind::Compare { left, right, .. } = &mut value.kind else {
            continue;
        };
        let left = std::mem::replace(left, Box::new(Node::new(0, -1, NodeKind::Return)));
        let right = std::mem::replace(right, Box::new(Node::new(0, -1, NodeKind::Return)));
        node.kind = NodeKind::IfCmp {
            condition,
            left,
            right,
            delta,
        };
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::node::{CompareKind, Condition, TypeKind};

    #[test]
    fn test_merges_compare_and_branch() {
        let load = |offset: i32, index: u16, kind: TypeKind| {
            Node::new(offset, -1, NodeKind::Load { kind, index })
        };
        let mut list = vec![Node::new(
            3,
            -1,
            NodeKind::If {
                condition: Condition::Le,
                value: Box::new(Node::new(
                    2,
                    -1,
                    NodeKind::Compare {
                        kind: CompareKind::Long,
                        left: Box::new(load(0, 1, TypeKind::Long)),
                        right: Box::new(load(1, 3, TypeKind::Long)),
                    },
                )),
                delta: 10,
            },
        )];
        apply(&mut list);
        let NodeKind::IfCmp {
            condition: Condition::Le,
            left,
            right,
            delta: 10,
        } = &list[0].kind
        else {
            panic!("expected ifcmp, found {}", list[0]);
        };
        assert_eq!(Some(1), left.load_slot());
        assert_eq!(Some(3), right.load_slot());
    }

    #[test]
    fn test_leaves_plain_branch() {
        let mut list = vec![Node::new(
            1,
            -1,
            NodeKind::If {
                condition: Condition::Eq,
                value: Box::new(Node::new(
                    0,
                    -1,
                    NodeKind::Load {
                        kind: TypeKind::Int,
                        index: 1,
                    },
                )),
                delta: 4,
            },
        )];
        let before = list.to_vec();
        apply(&mut list);
        assert_eq!(before, list);
    }
}
