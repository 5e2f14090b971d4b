//! Declaration placement.
//!
//! Nested blocks claim their variables first, so a declaration lands in the narrowest enclosing
//! block whose offsets contain the variable's live range. A store to an undeclared variable whose
//! range fits the current block becomes a `DECLARE` carrying the store; a store immediately
//! followed by a same-line `return` of the same slot fuses into the return and retires the
//! variable. Variables that never got a store at the current level (claimed by no nested block)
//! receive a bare `DECLARE` at the index matching their range start.

use crate::node::{Node, NodeKind, first_offset, index_at_or_after, last_offset};
use decaf_classfile::{DeclarationState, LocalVariableTable};

/// Place declarations in `list`, whose instructions span `[before_offset, after_offset]`.
pub(crate) fn place(
    list: &mut Vec<Node>,
    before_offset: i32,
    after_offset: i32,
    local_variables: &mut LocalVariableTable,
) {
    for node in list.iter_mut() {
        place_nested(node, local_variables);
    }

    // store + return fusion, then per-store declarations
    let mut index = 0;
    while index < list.len() {
        if fuse_store_return(list, index, local_variables) {
            continue;
        }
        if let NodeKind::Store { index: slot, .. } = &list[index].kind {
            let slot = *slot;
            let store_offset = list[index].offset;
            let claimed = match variable_for_store(local_variables, slot, store_offset) {
                Some(variable)
                    if !variable.is_declared()
                        && !variable.exception_or_return_address
                        && variable.contained_in(before_offset, after_offset) =>
                {
                    variable.state = DeclarationState::Declared;
                    true
                }
                _ => false,
            };
            if claimed {
                let store = list.remove(index);
                let offset = store.offset;
                let line = store.line;
                list.insert(
                    index,
                    Node::new(
                        offset,
                        line,
                        NodeKind::Declare {
                            index: slot,
                            store: Some(Box::new(store)),
                        },
                    ),
                );
            }
        }
        index += 1;
    }

    // orphaned declarations
    let mut orphans: Vec<(u16, i32)> = Vec::new();
    for variable in local_variables.variables_mut() {
        if !variable.is_declared()
            && !variable.exception_or_return_address
            && variable.contained_in(before_offset, after_offset)
        {
            variable.state = DeclarationState::Declared;
            orphans.push((variable.index, variable.start_pc));
        }
    }
    for (slot, start_pc) in orphans {
        // A block whose body covers the range start gets the declaration in front of it.
        let mut position = index_at_or_after(list, start_pc);
        while position > 0 && body_covers(&mut list[position - 1], start_pc) {
            position -= 1;
        }
        let offset = list
            .get(position)
            .map_or(start_pc, |node| node.offset.min(start_pc));
        list.insert(
            position,
            Node::new(
                offset,
                -1,
                NodeKind::Declare {
                    index: slot,
                    store: None,
                },
            ),
        );
    }
}

/// The variable a store declares: the one whose live range begins within the store's 1 to 4 byte
/// encoding. A store into a range that began earlier is a reassignment and declares nothing.
fn variable_for_store<'a>(
    local_variables: &'a mut LocalVariableTable,
    slot: u16,
    store_offset: i32,
) -> Option<&'a mut decaf_classfile::LocalVariable> {
    local_variables.variables_mut().find(|variable| {
        variable.index == slot
            && variable.start_pc > store_offset
            && variable.start_pc <= store_offset + 4
    })
}

/// Returns true if a nested body of `node` reaches past `offset`.
fn body_covers(node: &mut Node, offset: i32) -> bool {
    node.offset < offset
        && node
            .bodies_mut()
            .into_iter()
            .any(|body| last_offset(body) >= offset)
}

/// Recurse into the bodies of a structured node; a `for` initializer declares its variable in the
/// loop header.
fn place_nested(node: &mut Node, local_variables: &mut LocalVariableTable) {
    let node_offset = node.offset;
    if let NodeKind::For {
        init: Some(init), ..
    } = &mut node.kind
    {
        if let NodeKind::Store { index: slot, .. } = &init.kind {
            let slot = *slot;
            let claimed = match local_variables.find_mut(slot, node_offset) {
                Some(variable) if !variable.is_declared() => {
                    variable.state = DeclarationState::Declared;
                    true
                }
                _ => false,
            };
            if claimed {
                let offset = init.offset;
                let line = init.line;
                let store = std::mem::replace(
                    init.as_mut(),
                    Node::new(offset, line, NodeKind::Return),
                );
                *init.as_mut() = Node::new(
                    offset,
                    line,
                    NodeKind::Declare {
                        index: slot,
                        store: Some(Box::new(store)),
                    },
                );
            }
        }
    }
    for body in node.bodies_mut() {
        let before = first_offset(body);
        let after = last_offset(body).max(node_offset);
        place(body, before, after, local_variables);
    }
}

/// Fuse `x = e; return x;` into `return e;` when both sit on one line and `x` was never
/// declared; the variable is retired.
fn fuse_store_return(
    list: &mut Vec<Node>,
    index: usize,
    local_variables: &mut LocalVariableTable,
) -> bool {
    if index + 1 >= list.len() || list[index].line != list[index + 1].line {
        return false;
    }
    let NodeKind::Store { index: slot, .. } = &list[index].kind else {
        return false;
    };
    let slot = *slot;
    let NodeKind::ValueReturn { value } = &list[index + 1].kind else {
        return false;
    };
    if value.load_slot() != Some(slot) {
        return false;
    }
    let probe = list[index + 1].offset;
    let Some(variable) = local_variables.find_mut(slot, probe) else {
        return false;
    };
    if variable.is_declared() {
        return false;
    }
    variable.state = DeclarationState::ToBeRemoved;

    let store = list.remove(index);
    let NodeKind::Store { value, .. } = store.kind else {
        return false;
    };
    let return_offset = list[index].offset;
    list[index] = Node::new(return_offset, store.line, NodeKind::ValueReturn { value });
    true
}
