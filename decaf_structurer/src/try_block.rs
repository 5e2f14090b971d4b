//! Construction of `TRY` nodes from aggregated regions.
//!
//! Bodies are extracted from the end towards the front so earlier extraction indexes stay valid:
//! the finally handler first (and, for the `jsr` forms, the shared subroutine), then each catch in
//! reverse order, then the try body. Every body runs through the expression reconstructor battery
//! independently; declaration placement later treats each body as its own scope.

use crate::error::Error::{EmptyCatchBlock, UnexpectedInstruction};
use crate::error::Result;
use crate::exception::{ProtectedRegion, RegionKind};
use crate::node::{
    CatchClause, Node, NodeKind, TryBlock, index_at_or_after, last_offset,
};
use crate::reconstruct;
use decaf_classfile::{ConstantPool, DeclarationState, LocalVariableTable};

pub(crate) fn build(
    list: &mut Vec<Node>,
    region: &ProtectedRegion,
    constant_pool: &mut ConstantPool,
    local_variables: &mut LocalVariableTable,
) -> Result<()> {
    let mut after_list = clamp_after(list, region.after);
    let anchor_index = index_at_or_after(list, region.try_from);
    let anchor_offset = last_consumed_offset(list, region.try_from, after_list);
    let anchor_line = list.get(anchor_index).map_or(-1, |node| node.line);

    // Finally first.
    let mut finally_body = None;
    if region.finally_from >= 0 {
        let body = match region.kind {
            RegionKind::TryFinallyJsr | RegionKind::TryFinallyJikes => {
                let body = extract_subroutine(list, region, after_list, local_variables)?;
                after_list = after_list.min(region.finally_from).min(region.subroutine);
                body
            }
            _ => {
                let body = extract_finally_handler(list, region, after_list, local_variables)?;
                after_list = after_list.min(region.finally_from);
                body
            }
        };
        finally_body = Some(body);
    }
    let finally_length = finally_body.as_ref().map_or(0, Vec::len);

    // Catches in reverse order.
    let mut escapes: Vec<i32> = Vec::new();
    let mut catches: Vec<CatchClause> = Vec::new();
    let mut current_end = after_list;
    let mut ordered = region.catches.clone();
    ordered.sort_by_key(|catch| catch.from);
    for catch in ordered.iter().rev() {
        let to = if catch.to >= 0 { catch.to.min(current_end) } else { current_end };
        let from_index = index_at_or_after(list, catch.from);
        let to_index = index_at_or_after(list, to);
        if from_index >= to_index {
            return Err(EmptyCatchBlock(catch.from));
        }
        let mut body: Vec<Node> = list.drain(from_index..to_index).collect();
        current_end = catch.from;

        let variable_index = take_exception_store(&mut body, catch.from, local_variables)?;
        strip_jsr(&mut body, region);
        let stripped_goto = strip_escape(&mut body, &mut escapes);
        if stripped_goto && region.kind == RegionKind::TryFinally {
            strip_finally_copy(&mut body, finally_length);
        }
        reconstruct::run(&mut body, constant_pool, local_variables)?;
        catches.push(CatchClause {
            class_index: catch.type_index,
            other_class_indexes: catch.other_type_indexes.clone(),
            variable_index,
            body,
        });
    }
    catches.reverse();

    // The try body, up to the first handler; it carries the escape goto and, for the inlined
    // finally form, the duplicated finally statements.
    let from_index = index_at_or_after(list, region.try_from);
    let to_index = index_at_or_after(list, current_end);
    let mut body: Vec<Node> = list.drain(from_index..to_index).collect();
    strip_jsr(&mut body, region);
    let stripped_goto = strip_escape(&mut body, &mut escapes);
    if stripped_goto && region.kind == RegionKind::TryFinally {
        strip_finally_copy(&mut body, finally_length);
    }
    reconstruct::run(&mut body, constant_pool, local_variables)?;
    if let Some(finally_body) = &mut finally_body {
        reconstruct::run(finally_body, constant_pool, local_variables)?;
    }

    let jump_delta = escapes
        .iter()
        .copied()
        .min()
        .map_or(1, |target| target - anchor_offset);

    list.insert(
        from_index,
        Node::new(
            anchor_offset,
            anchor_line,
            NodeKind::Try(Box::new(TryBlock {
                body,
                catches,
                finally_body,
                jump_delta,
            })),
        ),
    );
    Ok(())
}

/// Extract a modern finally handler (`astore e; <body>; aload e; athrow`) and return its body.
fn extract_finally_handler(
    list: &mut Vec<Node>,
    region: &ProtectedRegion,
    after_list: i32,
    local_variables: &mut LocalVariableTable,
) -> Result<Vec<Node>> {
    let from_index = index_at_or_after(list, region.finally_from);
    let to_index = index_at_or_after(list, after_list);
    if from_index >= to_index {
        return Err(UnexpectedInstruction {
            name: "finally",
            offset: region.finally_from,
        });
    }
    let mut body: Vec<Node> = list.drain(from_index..to_index).collect();
    let slot = take_exception_store(&mut body, region.finally_from, local_variables)?;
    if let Some(last) = body.last() {
        if matches!(&last.kind, NodeKind::Throw { value } if value.load_slot() == Some(slot)) {
            body.pop();
        }
    }
    remove_slot(local_variables, slot, region.finally_from, &body);
    Ok(body)
}

/// Extract the shared `jsr` subroutine (`astore ret; <body>; ret`) and discard the handler that
/// calls it.
fn extract_subroutine(
    list: &mut Vec<Node>,
    region: &ProtectedRegion,
    after_list: i32,
    local_variables: &mut LocalVariableTable,
) -> Result<Vec<Node>> {
    let subroutine_end = subroutine_end(list, region.subroutine, after_list);
    let mut ranges = [
        (region.finally_from, subroutine_or_after(region, after_list)),
        (region.subroutine, subroutine_end),
    ];
    ranges.sort_by_key(|(from, _)| std::cmp::Reverse(*from));

    let mut subroutine_body = Vec::new();
    for (from, to) in ranges {
        let from_index = index_at_or_after(list, from);
        let to_index = index_at_or_after(list, to);
        let drained: Vec<Node> = list.drain(from_index..to_index).collect();
        if from == region.subroutine {
            subroutine_body = drained;
        }
    }

    let slot = take_exception_store(&mut subroutine_body, region.subroutine, local_variables)
        .map_err(|_| UnexpectedInstruction {
            name: "jsr",
            offset: region.subroutine,
        })?;
    if matches!(
        subroutine_body.last().map(|node| &node.kind),
        Some(NodeKind::Ret { .. })
    ) {
        subroutine_body.pop();
    }
    remove_slot(local_variables, slot, region.subroutine, &subroutine_body);
    Ok(subroutine_body)
}

/// The end of the subroutine starting at `from`: just past its `ret`.
fn subroutine_end(list: &[Node], from: i32, after_list: i32) -> i32 {
    let mut index = index_at_or_after(list, from);
    while let Some(node) = list.get(index) {
        if node.offset >= after_list {
            break;
        }
        if matches!(node.kind, NodeKind::Ret { .. }) {
            return list
                .get(index + 1)
                .map_or(last_offset(list) + 1, |next| next.offset);
        }
        index += 1;
    }
    after_list
}

fn subroutine_or_after(region: &ProtectedRegion, after_list: i32) -> i32 {
    if region.subroutine > region.finally_from {
        region.subroutine.min(after_list)
    } else {
        after_list
    }
}

/// Remove the leading exception store of a handler body and return the exception slot. The slot
/// is marked declared: the catch clause itself is its declaration.
fn take_exception_store(
    body: &mut Vec<Node>,
    handler_offset: i32,
    local_variables: &mut LocalVariableTable,
) -> Result<u16> {
    let Some(first) = body.first() else {
        return Err(EmptyCatchBlock(handler_offset));
    };
    let NodeKind::Store { index, value, .. } = &first.kind else {
        return Err(UnexpectedInstruction {
            name: first.name(),
            offset: first.offset,
        });
    };
    if !matches!(
        value.kind,
        NodeKind::ExceptionLoad { .. } | NodeKind::ReturnAddressLoad
    ) {
        return Err(UnexpectedInstruction {
            name: first.name(),
            offset: first.offset,
        });
    }
    let slot = *index;
    let store_offset = first.offset;
    body.remove(0);
    if let Some(variable) = local_variables.find_mut(slot, store_offset + 1) {
        variable.state = DeclarationState::Declared;
    }
    Ok(slot)
}

/// Drop `jsr` calls into the shared subroutine of a 1.1-era region.
fn strip_jsr(body: &mut Vec<Node>, region: &ProtectedRegion) {
    if region.subroutine < 0 {
        return;
    }
    let subroutine = region.subroutine;
    body.retain(|node| {
        !matches!(node.kind, NodeKind::Jsr { .. }) || node.jump_target() != Some(subroutine)
    });
}

/// Strip a trailing escape `goto`, recording its target. Returns true when one was stripped.
fn strip_escape(body: &mut Vec<Node>, escapes: &mut Vec<i32>) -> bool {
    let Some(last) = body.last() else {
        return false;
    };
    if !last.is_goto() {
        return false;
    }
    if let Some(target) = last.jump_target() {
        escapes.push(target);
    }
    body.pop();
    true
}

/// Remove the inlined copy of the finally body from the tail of a normal exit path.
fn strip_finally_copy(body: &mut Vec<Node>, finally_length: usize) {
    if finally_length == 0 || body.len() < finally_length {
        return;
    }
    body.truncate(body.len() - finally_length);
}

/// Purge the synthetic exception/return-address slot captured at `handler_offset`.
fn remove_slot(
    local_variables: &mut LocalVariableTable,
    slot: u16,
    handler_offset: i32,
    body: &[Node],
) {
    let probe = body.first().map_or(handler_offset + 1, |node| node.offset);
    local_variables.remove_with_index_and_offset(slot, probe);
}

fn clamp_after(list: &[Node], after: i32) -> i32 {
    let end = last_offset(list) + 1;
    if after < 0 || after > end { end } else { after }
}

/// The offset of the last node inside `[from, to)`.
fn last_consumed_offset(list: &[Node], from: i32, to: i32) -> i32 {
    let from_index = index_at_or_after(list, from);
    let to_index = index_at_or_after(list, to);
    if to_index > from_index {
        list[to_index - 1].offset
    } else {
        from
    }
}
