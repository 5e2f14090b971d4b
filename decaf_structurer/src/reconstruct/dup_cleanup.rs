//! Cleanup of `DupStore`/`DupLoad` pseudo-nodes left behind by expression folding.
//!
//! A parked duplicate with a single remaining reference is substituted into that reference; one
//! with no remaining references is dropped (keeping its value as a statement when it has side
//! effects). Multi-use duplicates are left in place: the for-each recognizer matches the Sun 1.5
//! array pattern on exactly that shape, and the renderer prints the rest as assignment chains.

use crate::node::{Node, NodeKind, count_in_expressions, replace_in_expressions};

pub(crate) fn apply(list: &mut Vec<Node>) {
    let mut index = 0;
    while index < list.len() {
        let NodeKind::DupStore { .. } = &list[index].kind else {
            index += 1;
            continue;
        };
        let store_offset = list[index].offset;
        let references_store = move |candidate: &Node| {
            matches!(candidate.kind, NodeKind::DupLoad { store_offset: candidate_offset }
                if candidate_offset == store_offset)
        };
        let mut uses = 0;
        for node in list.iter_mut().skip(index + 1) {
            uses += count_in_expressions(node, &references_store);
        }
        match uses {
            0 => {
                let NodeKind::DupStore { value } = list.remove(index).kind else {
                    continue;
                };
                if matches!(value.kind, NodeKind::Invoke(_)) {
                    list.insert(index, *value);
                    index += 1;
                }
            }
            1 => {
                let NodeKind::DupStore { value } = list.remove(index).kind else {
                    continue;
                };
                let mut replacement = Some(*value);
                for node in list.iter_mut().skip(index) {
                    if replace_in_expressions(node, &references_store, &mut replacement) {
                        break;
                    }
                }
            }
            _ => index += 1,
        }
    }
}
