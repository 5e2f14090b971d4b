//! Conditional recognition.
//!
//! Forward conditional branches whose target stays in the current list become
//! `IF_SIMPLE`/`IF_ELSE` (the bridging `goto` dropped, the test inverted); branches escaping the
//! list become `IF_BREAK`/`IF_CONTINUE`, a duplicated method-ending `return`, or a registered
//! labeled break. Break and continue outrank the if/else bridge so `if (c) continue;` at the end
//! of a loop body does not swallow the rest of the body as an else branch.

use crate::analyze::{AnalyzeContext, Scope};
use crate::error::Result;
use crate::node::{Node, NodeKind, index_at_or_after, last_offset};
use decaf_classfile::DeclarationState;

pub(crate) fn analyze(
    list: &mut Vec<Node>,
    scope: &Scope,
    context: &mut AnalyzeContext,
) -> Result<()> {
    let mut index = 0;
    while index < list.len() {
        if !list[index].is_conditional_branch() {
            index += 1;
            continue;
        }
        let Some(target) = list[index].jump_target() else {
            index += 1;
            continue;
        };
        if target <= list[index].offset {
            rewrite_backward(list, index, target, scope, context);
        } else if target <= last_offset(list) {
            build_if(list, index, target, scope, context)?;
        } else {
            index = rewrite_escape(list, index, target, scope, context);
        }
        index += 1;
    }
    Ok(())
}

/// A forward conditional with an in-list target: `if` or `if`/`else`.
fn build_if(
    list: &mut Vec<Node>,
    index: usize,
    else_offset: i32,
    scope: &Scope,
    context: &mut AnalyzeContext,
) -> Result<()> {
    let body_end = index_at_or_after(list, else_offset);
    let mut body: Vec<Node> = list.drain(index + 1..body_end).collect();
    let mut test = list.remove(index);
    test.invert_condition();

    // An if/else bridges the else block with a trailing goto; break and continue win over the
    // bridge shape.
    let mut bridge = None;
    if let Some(last) = body.last() {
        if last.is_goto() {
            if let Some(bridge_target) = last.jump_target() {
                let bridges_else = bridge_target > else_offset
                    && bridge_target <= scope.after_list
                    && !scope.is_continue(bridge_target)
                    && bridge_target != scope.break_offset;
                if bridges_else {
                    bridge = Some(bridge_target);
                }
            }
        }
    }

    let offset = test.offset;
    let line = test.line;
    let node = if let Some(bridge_target) = bridge {
        body.pop();
        let else_end = index_at_or_after(list, bridge_target);
        let mut else_body: Vec<Node> = list.drain(index..else_end).collect();

        let then_scope = Scope {
            after_list: else_offset,
            ..*scope
        };
        crate::analyze::analyze_list(&mut body, &then_scope, context)?;
        let else_scope = Scope {
            after_list: bridge_target,
            ..*scope
        };
        crate::analyze::analyze_list(&mut else_body, &else_scope, context)?;
        Node::new(
            offset,
            line,
            NodeKind::IfElse {
                test: Box::new(test.into_test()),
                body,
                else_body,
            },
        )
    } else {
        let then_scope = Scope {
            after_list: else_offset,
            ..*scope
        };
        crate::analyze::analyze_list(&mut body, &then_scope, context)?;
        Node::new(
            offset,
            line,
            NodeKind::IfSimple {
                test: Box::new(test.into_test()),
                body,
            },
        )
    };
    list.insert(index, node);
    Ok(())
}

/// A backward conditional that escaped loop recognition: a continue of the enclosing loop, or a
/// labeled jump.
fn rewrite_backward(
    list: &mut [Node],
    index: usize,
    target: i32,
    scope: &Scope,
    context: &mut AnalyzeContext,
) {
    let test = list[index].clone().into_test();
    let kind = if scope.is_continue(target) {
        NodeKind::IfContinue {
            test: Box::new(test),
        }
    } else {
        context.labels.insert(target);
        NodeKind::IfLabeledBreak {
            test: Box::new(test),
            target,
        }
    };
    list[index].kind = kind;
}

/// A forward conditional escaping the current list. Returns the index of the rewritten node,
/// which may shift when a store is fused into a duplicated return.
fn rewrite_escape(
    list: &mut Vec<Node>,
    index: usize,
    target: i32,
    scope: &Scope,
    context: &mut AnalyzeContext,
) -> usize {
    if scope.is_continue(target) {
        let test = list[index].clone().into_test();
        list[index].kind = NodeKind::IfContinue {
            test: Box::new(test),
        };
        return index;
    }
    // The break target is the operand start of the statement after the loop, which may precede
    // that statement's own offset; everything past the list up to it is the break.
    if scope.break_offset >= 0 && target <= scope.break_offset {
        let test = list[index].clone().into_test();
        list[index].kind = NodeKind::IfBreak {
            test: Box::new(test),
        };
        return index;
    }
    if let Some(site) = context.returns.value_return_at(target) {
        return duplicate_return(list, index, site.clone(), context);
    }
    if target == context.returns.bare_return {
        let test = list[index].clone().into_test();
        let offset = list[index].offset;
        let line = list[index].line;
        list[index].kind = NodeKind::IfSimple {
            test: Box::new(test),
            body: vec![Node::new(offset, line, NodeKind::Return)],
        };
        return index;
    }
    context.labels.insert(target);
    let test = list[index].clone().into_test();
    list[index].kind = NodeKind::IfLabeledBreak {
        test: Box::new(test),
        target,
    };
    index
}

/// Duplicate a method-ending `load; return` into the if body instead of a labeled break, fusing
/// an immediately preceding same-line store of the returned slot.
fn duplicate_return(
    list: &mut Vec<Node>,
    index: usize,
    site: Node,
    context: &mut AnalyzeContext,
) -> usize {
    let mut index = index;
    let mut returned = site;
    let returned_slot = match &returned.kind {
        NodeKind::ValueReturn { value } => value.load_slot(),
        _ => None,
    };
    if let Some(slot) = returned_slot {
        let fuse = index > 0
            && list[index - 1].line == list[index].line
            && matches!(&list[index - 1].kind, NodeKind::Store { index: stored, .. }
                if *stored == slot);
        if fuse {
            let store = list.remove(index - 1);
            index -= 1;
            let probe = list[index].offset;
            if let Some(variable) = context.local_variables.find_mut(slot, probe) {
                variable.state = DeclarationState::ToBeRemoved;
            }
            if let NodeKind::Store { value, .. } = store.kind {
                returned = Node::new(
                    returned.offset,
                    store.line,
                    NodeKind::ValueReturn { value },
                );
            }
        }
    }
    let test = list[index].clone().into_test();
    list[index].kind = NodeKind::IfSimple {
        test: Box::new(test),
        body: vec![returned],
    };
    index
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::analyze::ReturnSites;
    use crate::node::{Condition, TypeKind};
    use ahash::{AHashMap, AHashSet};
    use decaf_classfile::{ConstantPool, LocalVariableTable};

    fn node(offset: i32, kind: NodeKind) -> Node {
        Node::new(offset, -1, kind)
    }

    fn int_load(offset: i32, index: u16) -> Node {
        node(
            offset,
            NodeKind::Load {
                kind: TypeKind::Int,
                index,
            },
        )
    }

    fn statement(offset: i32) -> Node {
        node(
            offset,
            NodeKind::Pop {
                value: Box::new(int_load(offset, 9)),
            },
        )
    }

    fn conditional(offset: i32, delta: i32) -> Node {
        node(
            offset,
            NodeKind::If {
                condition: Condition::Eq,
                value: Box::new(int_load(offset - 1, 1)),
                delta,
            },
        )
    }

    fn run(list: &mut Vec<Node>, scope: &Scope) -> Result<AHashSet<i32>> {
        let mut constant_pool = ConstantPool::new();
        let mut local_variables = LocalVariableTable::new();
        let switch_maps = AHashMap::new();
        let mut context = AnalyzeContext {
            constant_pool: &mut constant_pool,
            local_variables: &mut local_variables,
            switch_maps: &switch_maps,
            major_version: decaf_classfile::JAVA_7,
            returns: ReturnSites::collect(list),
            labels: AHashSet::new(),
        };
        analyze(list, scope, &mut context)?;
        Ok(context.labels)
    }

    #[test]
    fn test_simple_if() -> Result<()> {
        let mut list = vec![
            conditional(1, 9),
            statement(4),
            statement(7),
            node(10, NodeKind::Return),
        ];
        let scope = Scope::method(11);
        run(&mut list, &scope)?;
        assert_eq!(2, list.len());
        let NodeKind::IfSimple { test, body } = &list[0].kind else {
            panic!("expected if, found {}", list[0]);
        };
        // ifeq skips the body, so the displayed condition is inverted
        assert!(matches!(
            test.kind,
            NodeKind::If {
                condition: Condition::Ne,
                ..
            }
        ));
        assert_eq!(2, body.len());
        Ok(())
    }

    #[test]
    fn test_if_else() -> Result<()> {
        let mut list = vec![
            conditional(1, 9),
            statement(4),
            node(7, NodeKind::Goto { delta: 7 }),
            statement(10),
            node(14, NodeKind::Return),
        ];
        let scope = Scope::method(15);
        run(&mut list, &scope)?;
        assert_eq!(2, list.len());
        let NodeKind::IfElse {
            body, else_body, ..
        } = &list[0].kind
        else {
            panic!("expected if/else, found {}", list[0]);
        };
        assert_eq!(1, body.len());
        assert_eq!(1, else_body.len());
        Ok(())
    }

    #[test]
    fn test_if_break_continue_and_label() -> Result<()> {
        let scope = Scope {
            loop_entry: -1,
            continue_offset: 20,
            continue_alt: -1,
            break_offset: 24,
            after_list: 12,
        };
        // targets outside the list: 24 is the break, 20 the continue, 30 needs a label
        let mut list = vec![
            conditional(1, 23),
            conditional(5, 15),
            conditional(9, 21),
        ];
        let labels = run(&mut list, &scope)?;
        assert!(matches!(list[0].kind, NodeKind::IfBreak { .. }));
        assert!(matches!(list[1].kind, NodeKind::IfContinue { .. }));
        assert!(matches!(
            list[2].kind,
            NodeKind::IfLabeledBreak { target: 30, .. }
        ));
        assert!(labels.contains(&30));
        Ok(())
    }

    #[test]
    fn test_duplicated_return_with_store_fusion() -> Result<()> {
        // x = e; if (c) goto RET; ...  with RET a `load x; return`
        let mut list = vec![
            node(
                1,
                NodeKind::Store {
                    kind: TypeKind::Int,
                    index: 2,
                    value: Box::new(int_load(0, 3)),
                },
            ),
            conditional(4, 16),
            statement(8),
        ];
        let mut constant_pool = ConstantPool::new();
        let mut local_variables = LocalVariableTable::new();
        local_variables.add(decaf_classfile::LocalVariable::new(2, 3, 20));
        let switch_maps = AHashMap::new();
        let returns = ReturnSites::collect(&[node(
            20,
            NodeKind::ValueReturn {
                value: Box::new(int_load(19, 2)),
            },
        )]);
        let mut context = AnalyzeContext {
            constant_pool: &mut constant_pool,
            local_variables: &mut local_variables,
            switch_maps: &switch_maps,
            major_version: decaf_classfile::JAVA_7,
            returns,
            labels: AHashSet::new(),
        };
        let scope = Scope::method(12);
        analyze(&mut list, &scope, &mut context)?;
        assert_eq!(2, list.len());
        let NodeKind::IfSimple { body, .. } = &list[0].kind else {
            panic!("expected if, found {}", list[0]);
        };
        let NodeKind::ValueReturn { value } = &body[0].kind else {
            panic!("expected return");
        };
        assert_eq!(Some(3), value.load_slot());
        assert_eq!(
            DeclarationState::ToBeRemoved,
            context.local_variables.find(2, 4).expect("variable").state
        );
        Ok(())
    }
}
