//! Removal of `monitorenter`/`monitorexit` pairs bracketing no instructions.
//!
//! An empty `synchronized (x) {}` block protects nothing, so some compilers (Jikes 1.2.2 among
//! them) emit the monitor pair without an exception table entry; the region aggregator never sees
//! it. The pair is collapsed here into a `SYNCHRONIZED` node with an empty body, and the slot that
//! parked the monitor reference is purged.

use crate::node::{Node, NodeKind};
use decaf_classfile::LocalVariableTable;

pub(crate) fn apply(list: &mut Vec<Node>, local_variables: &mut LocalVariableTable) {
    let mut index = 0;
    while index + 1 < list.len() {
        if !matches!(list[index].kind, NodeKind::MonitorEnter { .. })
            || !matches!(list[index + 1].kind, NodeKind::MonitorExit { .. })
        {
            index += 1;
            continue;
        }

        let enter_offset = list[index].offset;
        let exit_offset = list[index + 1].offset;
        let line = list[index].line;
        let (first, monitor, slot) = match_monitor_prelude(list, index);
        let Some(monitor) = monitor else {
            index += 1;
            continue;
        };
        if let Some(slot) = slot {
            local_variables.remove_with_index_and_offset(slot, enter_offset);
        }
        list.drain(first..=index + 1);
        list.insert(
            first,
            Node::new(
                exit_offset,
                line,
                NodeKind::Synchronized {
                    monitor: Box::new(monitor),
                    body: Vec::new(),
                    jump_delta: 1,
                },
            ),
        );
        index = first + 1;
    }
}

/// Recognize the store prelude of a `monitorenter` at `index`. Returns the index of the first
/// node belonging to the construct, the monitor expression, and the parked slot.
fn match_monitor_prelude(list: &[Node], index: usize) -> (usize, Option<Node>, Option<u16>) {
    let NodeKind::MonitorEnter { value } = &list[index].kind else {
        return (index, None, None);
    };
    match &value.kind {
        // aload x; dup; astore t; monitorenter
        NodeKind::DupLoad { store_offset } if index >= 2 => {
            let NodeKind::DupStore { value: monitor } = &list[index - 2].kind else {
                return (index, None, None);
            };
            if list[index - 2].offset != *store_offset {
                return (index, None, None);
            }
            let NodeKind::Store {
                index: slot,
                value: stored,
                ..
            } = &list[index - 1].kind
            else {
                return (index, None, None);
            };
            if !matches!(&stored.kind, NodeKind::DupLoad { store_offset: stored_offset }
                if stored_offset == store_offset)
            {
                return (index, None, None);
            }
            (index - 2, Some(monitor.as_ref().clone()), Some(*slot))
        }
        // astore t = x; monitorenter (aload t)
        NodeKind::Load { index: slot, .. } if index >= 1 => {
            let NodeKind::Store {
                index: stored_slot,
                value: monitor,
                ..
            } = &list[index - 1].kind
            else {
                return (index, Some(value.as_ref().clone()), None);
            };
            if stored_slot == slot {
                (index - 1, Some(monitor.as_ref().clone()), Some(*slot))
            } else {
                (index, Some(value.as_ref().clone()), None)
            }
        }
        _ => (index, Some(value.as_ref().clone()), None),
    }
}
