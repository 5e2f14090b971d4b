//! The ordered battery of expression reconstructors.
//!
//! Each pass is a single left-to-right scan over an instruction list that deletes or replaces
//! nodes in place. The order is load-bearing: every pass assumes the normal forms produced by its
//! predecessors (comparison aggregation sees the output of the if+goto collapse, ternary folding
//! sees aggregated comparisons, dup cleanup runs last over whatever the other folds left behind).
//! The battery is applied to the top level list of a method and again to every body extracted by
//! the block builders.

mod array_initializer;
mod assertion;
mod class_literal;
mod comparison;
mod compound_assignment;
mod dup_cleanup;
mod empty_synchronized;
mod if_goto;
mod ternary;

use crate::error::Result;
use crate::node::Node;
use decaf_classfile::{ConstantPool, LocalVariableTable};

/// Apply every reconstructor to `list`, in the fixed battery order.
///
/// # Errors
///
/// Returns an error when a recognized pattern has inconsistent constant pool references.
pub(crate) fn run(
    list: &mut Vec<Node>,
    constant_pool: &mut ConstantPool,
    local_variables: &mut LocalVariableTable,
) -> Result<()> {
    empty_synchronized::apply(list, local_variables);
    class_literal::apply(list, constant_pool)?;
    if_goto::apply(list);
    comparison::apply(list);
    assertion::apply(list, constant_pool);
    ternary::apply(list);
    array_initializer::apply(list);
    compound_assignment::apply(list);
    dup_cleanup::apply(list);
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::node::{
        BinaryOperator, CompareKind, Condition, ConstValue, NodeKind, TypeKind,
    };

    fn load(offset: i32, index: u16, kind: TypeKind) -> Node {
        Node::new(offset, -1, NodeKind::Load { kind, index })
    }

    /// Comparison aggregation depends on the if+goto collapse having run first: the collapsed
    /// branch is the one that carries the compare operand.
    #[test]
    fn test_if_goto_feeds_comparison_aggregation() -> Result<()> {
        let mut constant_pool = ConstantPool::new();
        let mut local_variables = LocalVariableTable::new();
        // lcmp; ifle L1; goto L2; L1: ...
        let mut list = vec![
            Node::new(
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
                    delta: 6,
                },
            ),
            Node::new(6, -1, NodeKind::Goto { delta: 14 }),
            Node::new(9, -1, NodeKind::Return),
        ];
        run(&mut list, &mut constant_pool, &mut local_variables)?;
        assert_eq!(2, list.len());
        let NodeKind::IfCmp {
            condition: Condition::Gt,
            ..
        } = &list[0].kind
        else {
            panic!("expected aggregated, inverted comparison, found {}", list[0]);
        };
        assert_eq!(Some(20), list[0].jump_target());
        Ok(())
    }

    /// Dup cleanup must run after compound assignment: the compound fold keeps its target behind
    /// a parked duplicate that the cleanup then resolves.
    #[test]
    fn test_compound_assignment_feeds_dup_cleanup() -> Result<()> {
        let mut constant_pool = ConstantPool::new();
        let mut local_variables = LocalVariableTable::new();
        let dup = |offset: i32| Node::new(offset, -1, NodeKind::DupLoad { store_offset: 0 });
        let mut list = vec![
            Node::new(
                0,
                -1,
                NodeKind::DupStore {
                    value: Box::new(load(0, 0, TypeKind::Reference)),
                },
            ),
            Node::new(
                8,
                -1,
                NodeKind::PutField {
                    field_index: 5,
                    target: Box::new(dup(1)),
                    value: Box::new(Node::new(
                        7,
                        -1,
                        NodeKind::BinaryOp {
                            operator: BinaryOperator::Add,
                            left: Box::new(Node::new(
                                3,
                                -1,
                                NodeKind::GetField {
                                    field_index: 5,
                                    target: Box::new(dup(2)),
                                },
                            )),
                            right: Box::new(Node::new(5, -1, NodeKind::Const(ConstValue::Int(1)))),
                        },
                    )),
                },
            ),
        ];
        run(&mut list, &mut constant_pool, &mut local_variables)?;
        assert_eq!(1, list.len());
        let NodeKind::CompoundAssign { target, .. } = &list[0].kind else {
            panic!("expected compound assignment, found {}", list[0]);
        };
        // the parked duplicate was substituted by the real receiver
        let NodeKind::GetField { target: receiver, .. } = &target.kind else {
            panic!("expected field target");
        };
        assert_eq!(Some(0), receiver.load_slot());
        Ok(())
    }

    /// The battery is idempotent on its own output.
    #[test]
    fn test_battery_idempotent() -> Result<()> {
        let mut constant_pool = ConstantPool::new();
        let mut local_variables = LocalVariableTable::new();
        let mut list = vec![
            Node::new(
                1,
                -1,
                NodeKind::If {
                    condition: Condition::Eq,
                    value: Box::new(load(0, 1, TypeKind::Int)),
                    delta: 6,
                },
            ),
            Node::new(4, -1, NodeKind::Goto { delta: 10 }),
            Node::new(7, -1, NodeKind::Return),
        ];
        run(&mut list, &mut constant_pool, &mut local_variables)?;
        let once = list.clone();
        run(&mut list, &mut constant_pool, &mut local_variables)?;
        assert_eq!(once, list);
        Ok(())
    }
}
