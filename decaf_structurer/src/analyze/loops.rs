//! Loop recognition.
//!
//! The list is scanned from the back: conditional branches, `goto`s, and finished
//! `TRY`/`SYNCHRONIZED` blocks whose escape delta is negative all start loop recognition when
//! their target lies within the current list. Targets before the list belong to an enclosing
//! scope, and a branch back to the entry of the enclosing infinite loop is a `continue`, not a
//! loop; that scope check is what keeps a nested do-while sharing the entry of an enclosing
//! test-first loop distinct from a continue, in place of the literal goto-splitting of older
//! decompilers.
//!
//! Shapes: a bottom conditional with a preceding goto-to-test is a `while`/`for` (classified by
//! the init/test/update table, with line numbers breaking ties); a bare bottom conditional is a
//! `do-while` (degenerating to `while` when the body is empty); a back `goto` whose body leads
//! with an escaping conditional is a pre-test `while`; anything else is an infinite loop,
//! upgraded to `for(init;;update)` when the statement before the loop and the last body statement
//! agree on a slot.

use crate::analyze::{AnalyzeContext, Scope, analyze_list, foreach};
use crate::error::Result;
use crate::node::{Node, NodeKind, first_offset, index_at_or_after, tree_min_offset, walk_mut};

pub(crate) fn analyze(
    list: &mut Vec<Node>,
    scope: &Scope,
    context: &mut AnalyzeContext,
) -> Result<()> {
    let mut index = list.len();
    while index > 0 {
        index -= 1;
        if index >= list.len() {
            index = list.len();
            continue;
        }
        let Some(target) = list[index].jump_target() else {
            continue;
        };
        let offset = list[index].offset;
        if target > offset {
            continue;
        }
        // Targets before the first statement's operand bytes belong to an enclosing scope.
        let list_start = match list.first_mut() {
            Some(first) => tree_min_offset(first),
            None => continue,
        };
        if target < list_start {
            continue;
        }
        if scope.loop_entry >= 0
            && scope.loop_entry == first_offset(list)
            && target <= scope.loop_entry
        {
            // A branch back to the entry of the enclosing infinite loop is a continue.
            continue;
        }
        let target_index = index_at_or_after(list, target);
        if target_index >= index {
            if target_index == index {
                // The branch targets its own operand tree: an empty loop.
                index = build_self_loop(list, index);
            }
            continue;
        }
        let insert = if list[index].is_conditional_branch() {
            build_back_conditional(list, index, target_index, scope, context)?
        } else {
            build_back_jump(list, index, target_index, scope, context)?
        };
        index = insert.min(list.len());
    }
    Ok(())
}

/// A branch targeting itself: an empty `while` (conditional) or an empty infinite loop.
fn build_self_loop(list: &mut Vec<Node>, index: usize) -> usize {
    let node = list.remove(index);
    let offset = node.offset;
    let line = node.line;
    let kind = if node.is_conditional_branch() {
        NodeKind::While {
            test: Box::new(node.into_test()),
            body: Vec::new(),
        }
    } else {
        NodeKind::InfiniteLoop { body: Vec::new() }
    };
    list.insert(index, Node::new(offset, line, kind));
    index
}

/// A negative conditional branch: goto-to-test form becomes `while`/`for`, bare form becomes
/// `do-while` (`while` with a trivial body when the body is empty).
fn build_back_conditional(
    list: &mut Vec<Node>,
    index: usize,
    target_index: usize,
    scope: &Scope,
    context: &mut AnalyzeContext,
) -> Result<usize> {
    let mut test = list.remove(index);
    let mut body: Vec<Node> = list.drain(target_index..index).collect();
    let mut insert = target_index;

    // A goto into the test's operand range right before the loop means the test runs first.
    let test_low = tree_min_offset(&mut test);
    let top_test = insert > 0
        && list[insert - 1].is_goto()
        && list[insert - 1]
            .jump_target()
            .is_some_and(|target| target >= test_low && target <= test.offset);
    if top_test {
        insert -= 1;
        list.remove(insert);
        return build_pre_test_loop(list, insert, test.offset, test, body, true, scope, context);
    }

    let offset = test.offset;
    let line = test.line;
    if body.is_empty() {
        // Do-while degeneration.
        list.insert(
            insert,
            Node::new(
                offset,
                line,
                NodeKind::While {
                    test: Box::new(test.into_test()),
                    body,
                },
            ),
        );
        return Ok(insert);
    }
    let child = Scope {
        loop_entry: -1,
        continue_offset: test.offset,
        continue_alt: -1,
        break_offset: next_offset(list, insert, scope),
        after_list: test.offset,
    };
    analyze_list(&mut body, &child, context)?;
    list.insert(
        insert,
        Node::new(
            offset,
            line,
            NodeKind::DoWhile {
                test: Box::new(test.into_test()),
                body,
            },
        ),
    );
    Ok(insert)
}

/// A negative `goto` (or a finished block with a negative escape delta): a pre-test `while` when
/// the body leads with an escaping conditional, an infinite loop or `for(init;;update)`
/// otherwise.
fn build_back_jump(
    list: &mut Vec<Node>,
    index: usize,
    target_index: usize,
    scope: &Scope,
    context: &mut AnalyzeContext,
) -> Result<usize> {
    let anchor = list[index].offset;
    let line = list[index].line;
    let insert = target_index;
    let mut body: Vec<Node>;
    if list[index].is_goto() {
        list.remove(index);
        body = list.drain(target_index..index).collect();
    } else {
        body = list.drain(target_index..=index).collect();
        if let Some(last) = body.last_mut() {
            clear_block_delta(last);
        }
    }

    // The moved test: a leading conditional escaping past the back jump.
    let leading_test = body.first().is_some_and(|first| {
        first.is_conditional_branch() && first.jump_target().is_some_and(|target| target > anchor)
    });
    if leading_test {
        let mut test = body.remove(0);
        test.invert_condition();
        return build_pre_test_loop(list, insert, anchor, test, body, false, scope, context);
    }

    // for(init;;update) when the statement before the loop and the last body statement agree.
    let init = if insert > 0 {
        init_candidate(&list[insert - 1])
    } else {
        None
    };
    let update_slot = body
        .last()
        .filter(|node| is_update(node))
        .and_then(Node::store_slot);
    let for_shape =
        matches!((init, update_slot), (Some((slot, _)), Some(update)) if slot == update);

    let break_offset = next_offset(list, insert, scope);
    if for_shape {
        let update = body.pop().map(Box::new);
        let continue_offset = update.as_ref().map_or(anchor, |update| update.offset);
        let child = Scope {
            loop_entry: -1,
            continue_offset,
            continue_alt: -1,
            break_offset,
            after_list: continue_offset,
        };
        analyze_list(&mut body, &child, context)?;
        let init = Some(Box::new(list.remove(insert - 1)));
        let node = Node::new(
            anchor,
            line,
            NodeKind::For {
                init,
                test: None,
                update,
                body,
            },
        );
        list.insert(insert - 1, node);
        return Ok(insert - 1);
    }

    let child = Scope {
        loop_entry: first_offset(&body),
        continue_offset: -1,
        continue_alt: -1,
        break_offset,
        after_list: anchor,
    };
    analyze_list(&mut body, &child, context)?;
    list.insert(insert, Node::new(anchor, line, NodeKind::InfiniteLoop { body }));
    Ok(insert)
}

/// Classify and build a loop whose test runs first.
///
/// `bottom_test` is true for the goto-to-test layout modern compilers emit; only that layout is
/// considered for the `for` shapes, the old top-test layout is always a plain `while`.
#[expect(clippy::too_many_arguments)]
fn build_pre_test_loop(
    list: &mut Vec<Node>,
    mut insert: usize,
    anchor: i32,
    test: Node,
    mut body: Vec<Node>,
    bottom_test: bool,
    scope: &Scope,
    context: &mut AnalyzeContext,
) -> Result<usize> {
    let break_offset = next_offset(list, insert, scope);
    let mut test = test;
    let test_line = test.line;
    let test_slots = load_slots(&mut test);

    let mut with_init = false;
    let mut with_update = false;
    if bottom_test {
        let init = if insert > 0 {
            init_candidate(&list[insert - 1])
        } else {
            None
        };
        let has_update = body.last().is_some_and(|node| is_update(node));
        match (init, has_update) {
            (None, true) => {
                let update_line = body.last().map_or(-1, |node| node.line);
                with_update = update_line == test_line;
            }
            (Some((_slot, init_line)), false) => {
                with_init = init_line == test_line;
            }
            (Some((slot, init_line)), true) => {
                let update_slot = body.last().and_then(Node::store_slot);
                if init_line == test_line
                    || test_slots.contains(&slot)
                    || update_slot == Some(slot)
                {
                    with_init = true;
                    with_update = true;
                }
            }
            (None, false) => {}
        }
    }

    let update = if with_update { body.pop().map(Box::new) } else { None };
    let continue_offset = update
        .as_ref()
        .map_or(test.offset, |update| update.offset);
    let child = Scope {
        loop_entry: -1,
        continue_offset,
        continue_alt: test.offset,
        break_offset,
        after_list: if bottom_test { continue_offset } else { anchor },
    };
    analyze_list(&mut body, &child, context)?;

    let init = if with_init {
        insert -= 1;
        Some(Box::new(list.remove(insert)))
    } else {
        None
    };

    let line = test.line;
    let node = if with_init || update.is_some() {
        Node::new(
            anchor,
            line,
            NodeKind::For {
                init,
                test: Some(Box::new(test.into_test())),
                update,
                body,
            },
        )
    } else {
        Node::new(
            anchor,
            line,
            NodeKind::While {
                test: Box::new(test.into_test()),
                body,
            },
        )
    };
    let (insert, node) = foreach::try_rewrite(list, insert, node, context);
    list.insert(insert, node);
    Ok(insert)
}

/// The offset of the node following the loop, used as the break target.
fn next_offset(list: &[Node], insert: usize, scope: &Scope) -> i32 {
    list.get(insert).map_or(scope.after_list, |node| node.offset)
}

/// A statement that can serve as a `for` initializer: a plain store.
fn init_candidate(node: &Node) -> Option<(u16, i32)> {
    match &node.kind {
        NodeKind::Store { index, .. } => Some((*index, node.line)),
        _ => None,
    }
}

/// A statement that can serve as a `for` update: an increment or a self-referencing store.
fn is_update(node: &Node) -> bool {
    match &node.kind {
        NodeKind::Iinc { .. } => true,
        NodeKind::CompoundAssign { target, .. } => target.load_slot().is_some(),
        NodeKind::Store { index, value, .. } => {
            matches!(&value.kind, NodeKind::BinaryOp { left, .. }
                if left.load_slot() == Some(*index))
        }
        _ => false,
    }
}

/// Every slot loaded anywhere in the expression tree of `node`.
fn load_slots(node: &mut Node) -> Vec<u16> {
    let mut slots = Vec::new();
    walk_mut(node, &mut |candidate| {
        if let Some(slot) = candidate.load_slot() {
            slots.push(slot);
        }
    });
    slots
}

/// Clear the escape delta of a finished block so it does not re-trigger loop recognition.
fn clear_block_delta(node: &mut Node) {
    match &mut node.kind {
        NodeKind::Try(try_block) => try_block.jump_delta = 1,
        NodeKind::Synchronized { jump_delta, .. } => *jump_delta = 1,
        _ => {}
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::analyze::ReturnSites;
    use crate::node::{Condition, ConstValue, TypeKind, last_offset};
    use ahash::{AHashMap, AHashSet};
    use decaf_classfile::{ConstantPool, LocalVariableTable};

    fn context<'a>(
        constant_pool: &'a mut ConstantPool,
        local_variables: &'a mut LocalVariableTable,
        switch_maps: &'a AHashMap<u16, indexmap::IndexMap<i32, i32>>,
    ) -> AnalyzeContext<'a> {
        AnalyzeContext {
            constant_pool,
            local_variables,
            switch_maps,
            major_version: decaf_classfile::JAVA_7,
            returns: ReturnSites::default(),
            labels: AHashSet::new(),
        }
    }

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

    #[test]
    fn test_do_while() -> Result<()> {
        let mut constant_pool = ConstantPool::new();
        let mut local_variables = LocalVariableTable::new();
        let switch_maps = AHashMap::new();
        let mut context = context(&mut constant_pool, &mut local_variables, &switch_maps);
        // L: body; if cond goto L; return
        let mut list = vec![
            statement(0),
            node(
                5,
                NodeKind::If {
                    condition: Condition::Ne,
                    value: Box::new(int_load(4, 1)),
                    delta: -5,
                },
            ),
            node(8, NodeKind::Return),
        ];
        let scope = Scope::method(last_offset(&list) + 1);
        analyze(&mut list, &scope, &mut context)?;
        assert_eq!(2, list.len());
        let NodeKind::DoWhile { test, body } = &list[0].kind else {
            panic!("expected do-while, found {}", list[0]);
        };
        assert_eq!(1, body.len());
        assert!(matches!(
            test.kind,
            NodeKind::If {
                condition: Condition::Ne,
                ..
            }
        ));
        Ok(())
    }

    #[test]
    fn test_empty_do_while_degenerates_to_while() -> Result<()> {
        let mut constant_pool = ConstantPool::new();
        let mut local_variables = LocalVariableTable::new();
        let switch_maps = AHashMap::new();
        let mut context = context(&mut constant_pool, &mut local_variables, &switch_maps);
        let mut list = vec![
            node(
                2,
                NodeKind::If {
                    condition: Condition::Ne,
                    value: Box::new(int_load(0, 1)),
                    delta: -2,
                },
            ),
            node(5, NodeKind::Return),
        ];
        let scope = Scope::method(6);
        analyze(&mut list, &scope, &mut context)?;
        let NodeKind::While { body, .. } = &list[0].kind else {
            panic!("expected while, found {}", list[0]);
        };
        assert!(body.is_empty());
        Ok(())
    }

    #[test]
    fn test_goto_to_test_while() -> Result<()> {
        let mut constant_pool = ConstantPool::new();
        let mut local_variables = LocalVariableTable::new();
        let switch_maps = AHashMap::new();
        let mut context = context(&mut constant_pool, &mut local_variables, &switch_maps);
        // goto TEST; BODY; TEST: if cond goto BODY; return
        let mut list = vec![
            node(0, NodeKind::Goto { delta: 8 }),
            statement(3),
            node(
                8,
                NodeKind::IfCmp {
                    condition: Condition::Lt,
                    left: Box::new(int_load(6, 1)),
                    right: Box::new(int_load(7, 2)),
                    delta: -5,
                },
            ),
            node(11, NodeKind::Return),
        ];
        let scope = Scope::method(12);
        analyze(&mut list, &scope, &mut context)?;
        assert_eq!(2, list.len());
        let NodeKind::While { test, body } = &list[0].kind else {
            panic!("expected while, found {}", list[0]);
        };
        assert_eq!(1, body.len());
        assert!(matches!(
            test.kind,
            NodeKind::IfCmp {
                condition: Condition::Lt,
                ..
            }
        ));
        Ok(())
    }

    #[test]
    fn test_for_loop_classification() -> Result<()> {
        let mut constant_pool = ConstantPool::new();
        let mut local_variables = LocalVariableTable::new();
        let switch_maps = AHashMap::new();
        let mut context = context(&mut constant_pool, &mut local_variables, &switch_maps);
        // istore_1 0; goto TEST; BODY; iinc 1; TEST: if i < n goto BODY; return
        let mut list = vec![
            node(
                1,
                NodeKind::Store {
                    kind: TypeKind::Int,
                    index: 1,
                    value: Box::new(node(0, NodeKind::Const(ConstValue::Int(0)))),
                },
            ),
            node(2, NodeKind::Goto { delta: 10 }),
            statement(5),
            node(9, NodeKind::Iinc { index: 1, increment: 1 }),
            node(
                12,
                NodeKind::IfCmp {
                    condition: Condition::Lt,
                    left: Box::new(int_load(11, 1)),
                    right: Box::new(int_load(11, 2)),
                    delta: -7,
                },
            ),
            node(15, NodeKind::Return),
        ];
        let scope = Scope::method(16);
        analyze(&mut list, &scope, &mut context)?;
        assert_eq!(2, list.len());
        let NodeKind::For {
            init,
            test,
            update,
            body,
        } = &list[0].kind
        else {
            panic!("expected for, found {}", list[0]);
        };
        assert!(init.is_some());
        assert!(test.is_some());
        assert!(matches!(
            update.as_deref().map(|node| &node.kind),
            Some(NodeKind::Iinc { index: 1, .. })
        ));
        assert_eq!(1, body.len());
        Ok(())
    }

    #[test]
    fn test_infinite_loop() -> Result<()> {
        let mut constant_pool = ConstantPool::new();
        let mut local_variables = LocalVariableTable::new();
        let switch_maps = AHashMap::new();
        let mut context = context(&mut constant_pool, &mut local_variables, &switch_maps);
        let mut list = vec![
            statement(0),
            node(4, NodeKind::Goto { delta: -4 }),
            node(7, NodeKind::Return),
        ];
        let scope = Scope::method(8);
        analyze(&mut list, &scope, &mut context)?;
        let NodeKind::InfiniteLoop { body } = &list[0].kind else {
            panic!("expected infinite loop, found {}", list[0]);
        };
        assert_eq!(1, body.len());
        Ok(())
    }

    #[test]
    fn test_nested_do_while_in_test_first_loop() -> Result<()> {
        let mut constant_pool = ConstantPool::new();
        let mut local_variables = LocalVariableTable::new();
        let switch_maps = AHashMap::new();
        let mut context = context(&mut constant_pool, &mut local_variables, &switch_maps);
        // goto TA; TX: X; if B goto TX; TA: if A goto TX
        let mut list = vec![
            node(0, NodeKind::Goto { delta: 12 }),
            statement(3),
            node(
                7,
                NodeKind::If {
                    condition: Condition::Ne,
                    value: Box::new(int_load(6, 2)),
                    delta: -4,
                },
            ),
            node(
                12,
                NodeKind::If {
                    condition: Condition::Ne,
                    value: Box::new(int_load(11, 1)),
                    delta: -9,
                },
            ),
            node(15, NodeKind::Return),
        ];
        let scope = Scope::method(16);
        analyze(&mut list, &scope, &mut context)?;
        assert_eq!(2, list.len());
        let NodeKind::While { body, .. } = &list[0].kind else {
            panic!("expected while, found {}", list[0]);
        };
        assert_eq!(1, body.len());
        let NodeKind::DoWhile { body: inner, .. } = &body[0].kind else {
            panic!("expected nested do-while, found {}", body[0]);
        };
        assert_eq!(1, inner.len());
        Ok(())
    }
}
