//! Construction of `SYNCHRONIZED` nodes from aggregated monitor regions.
//!
//! The builder locates the `monitorenter` and the store that parked the monitor reference,
//! splices the protected body out of the list, strips the monitor plumbing (`monitorexit`
//! sentinels at every nesting depth, `jsr`s into a shared cleanup subroutine, the cleanup handler
//! itself), purges the parked slot from the local variable table, and replaces the whole range
//! with one `SYNCHRONIZED` node. The node keeps the smallest escape jump of the body as its
//! branch delta so a loop whose back edge ended inside the block is still recognized.

use crate::error::Error::UnexpectedInstruction;
use crate::error::Result;
use crate::exception::{ProtectedRegion, RegionKind};
use crate::node::{Node, NodeKind, index_at_or_after, last_offset};
use crate::reconstruct;
use decaf_classfile::{ConstantPool, LocalVariableTable};

pub(crate) fn build(
    list: &mut Vec<Node>,
    region: &ProtectedRegion,
    constant_pool: &mut ConstantPool,
    local_variables: &mut LocalVariableTable,
) -> Result<()> {
    let after = clamp_after(list, region.after);
    let body_end_offset = if region.subroutine >= 0 {
        region.subroutine.min(region.finally_from)
    } else {
        region.finally_from
    };

    let body_start = index_at_or_after(list, region.try_from);
    if body_start == 0 {
        return Err(UnexpectedInstruction {
            name: "monitorenter",
            offset: region.try_from,
        });
    }
    let enter_index = body_start - 1;
    let enter_offset = list[enter_index].offset;
    let enter_line = list[enter_index].line;
    let (prelude_start, monitor, slot) = match_monitor(list, enter_index)?;

    // Splice out the plumbing above the body first, then the body itself.
    let after_index = index_at_or_after(list, after);
    let handler_index = index_at_or_after(list, body_end_offset);
    drop(list.drain(handler_index..after_index));
    let mut body: Vec<Node> = list.drain(body_start..handler_index).collect();

    // The normal exit: monitorexit (purged below) followed by a goto over the handler.
    if let Some(last) = body.last() {
        if last.is_goto() && last.jump_target() == Some(after) {
            body.pop();
        }
    }
    if region.subroutine >= 0 {
        let subroutine = region.subroutine;
        body.retain(|node| {
            !matches!(node.kind, NodeKind::Jsr { .. }) || node.jump_target() != Some(subroutine)
        });
    }
    purge_monitor_exits(&mut body, slot);
    if region.kind == RegionKind::SynchronizedDouble {
        purge_double_monitor(&mut body, slot);
    }

    local_variables.remove_with_index_and_offset(slot, enter_offset);

    let jump_delta = escape_delta(&body, region.try_from, after, enter_offset);
    reconstruct::run(&mut body, constant_pool, local_variables)?;

    let anchor_offset = last_offset(&body).max(enter_offset);
    drop(list.drain(prelude_start..body_start));
    list.insert(
        prelude_start,
        Node::new(
            anchor_offset,
            enter_line,
            NodeKind::Synchronized {
                monitor: Box::new(monitor),
                body,
                jump_delta,
            },
        ),
    );
    Ok(())
}

/// Recognize the monitor capture preceding the `monitorenter` at `enter_index`. Returns the index
/// of the first prelude node, the monitor expression, and the parked slot.
fn match_monitor(list: &[Node], enter_index: usize) -> Result<(usize, Node, u16)> {
    let enter = &list[enter_index];
    let NodeKind::MonitorEnter { value } = &enter.kind else {
        return Err(UnexpectedInstruction {
            name: "monitorenter",
            offset: enter.offset,
        });
    };
    match &value.kind {
        // aload x; dup; astore t; monitorenter
        NodeKind::DupLoad { store_offset } if enter_index >= 2 => {
            let NodeKind::DupStore { value: monitor } = &list[enter_index - 2].kind else {
                return Err(UnexpectedInstruction {
                    name: "monitorenter",
                    offset: enter.offset,
                });
            };
            if list[enter_index - 2].offset != *store_offset {
                return Err(UnexpectedInstruction {
                    name: "monitorenter",
                    offset: enter.offset,
                });
            }
            let NodeKind::Store { index: slot, .. } = &list[enter_index - 1].kind else {
                return Err(UnexpectedInstruction {
                    name: "monitorenter",
                    offset: enter.offset,
                });
            };
            Ok((enter_index - 2, monitor.as_ref().clone(), *slot))
        }
        // astore t = x; monitorenter (aload t)
        NodeKind::Load { index: slot, .. } if enter_index >= 1 => {
            let NodeKind::Store {
                index: stored_slot,
                value: monitor,
                ..
            } = &list[enter_index - 1].kind
            else {
                return Err(UnexpectedInstruction {
                    name: "monitorenter",
                    offset: enter.offset,
                });
            };
            if stored_slot != slot {
                return Err(UnexpectedInstruction {
                    name: "monitorenter",
                    offset: enter.offset,
                });
            }
            Ok((enter_index - 1, monitor.as_ref().clone(), *slot))
        }
        _ => Err(UnexpectedInstruction {
            name: "monitorenter",
            offset: enter.offset,
        }),
    }
}

/// Remove every `monitorexit` of `slot`, descending into nested statement bodies.
fn purge_monitor_exits(body: &mut Vec<Node>, slot: u16) {
    body.retain(|node| {
        !matches!(&node.kind, NodeKind::MonitorExit { value } if value.load_slot() == Some(slot))
    });
    for node in body.iter_mut() {
        for nested in node.bodies_mut() {
            purge_monitor_exits(nested, slot);
        }
    }
}

/// Remove the duplicated inner `monitorenter` of the JDK 1.1.8 doubled layout.
fn purge_double_monitor(body: &mut Vec<Node>, slot: u16) {
    body.retain(|node| {
        !matches!(&node.kind, NodeKind::MonitorEnter { value } if value.load_slot() == Some(slot))
    });
    for node in body.iter_mut() {
        for nested in node.bodies_mut() {
            purge_double_monitor(nested, slot);
        }
    }
}

/// The smallest jump target leaving `[from, after)`, as a delta from `last`, or 1 when the body
/// never escapes.
fn escape_delta(body: &[Node], from: i32, after: i32, enter_offset: i32) -> i32 {
    let last = last_offset(body).max(enter_offset);
    body.iter()
        .filter_map(Node::jump_target)
        .filter(|target| *target < from || *target >= after)
        .min()
        .map_or(1, |target| target - last)
}

fn clamp_after(list: &[Node], after: i32) -> i32 {
    let end = last_offset(list) + 1;
    if after < 0 || after > end { end } else { after }
}
