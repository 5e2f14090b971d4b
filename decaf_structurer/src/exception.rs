//! Aggregation of raw exception table entries into logical protected regions.
//!
//! Raw entries sharing a protected range collapse into a single `try` with multiple catches, and
//! entries sharing a handler collapse into one multi-catch clause. Catch-all entries are
//! classified by the shape of their handler code: a handler rethrowing the caught value around a
//! shared body is a `finally`, a handler doing `monitorexit` before the rethrow over a region
//! entered by `monitorenter` is a `synchronized` block. The JDK 1.1 `jsr` subroutine form and the
//! Jikes 1.2 variant are sub-typed so the builders can strip the subroutine plumbing; a doubled
//! monitor region sharing one subroutine collapses into a single synchronized region. Handlers
//! with none of the known shapes degrade to a plain catch-all `try`/`catch`.
//!
//! Regions are returned innermost-first so the driver processes outermost-last.

use crate::node::{Node, NodeKind, index_at_or_after, last_offset};
use decaf_classfile::ExceptionTableEntry;

/// The classified shape of a protected region.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum RegionKind {
    TryCatch,
    TryFinally,
    /// `try`/`finally` sharing the finally body through a `jsr` subroutine (JDK 1.1 .. 1.3).
    TryFinallyJsr,
    /// The Jikes 1.2 layout: the handler falls through into the subroutine it shares.
    TryFinallyJikes,
    Synchronized,
    /// Two nested monitor regions sharing one cleanup subroutine (JDK 1.1.8 layout).
    SynchronizedDouble,
}

/// One catch clause of an aggregated region.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct CatchEntry {
    pub from: i32,
    pub to: i32,
    pub type_index: u16,
    pub other_type_indexes: Vec<u16>,
}

/// An aggregated protected region.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct ProtectedRegion {
    pub kind: RegionKind,
    pub try_from: i32,
    pub try_to: i32,
    /// Offset of the catch-all handler providing the `finally` (or the monitor cleanup), −1 when
    /// there is none.
    pub finally_from: i32,
    /// Offset of the shared `jsr` subroutine for the 1.1-era forms, −1 otherwise.
    pub subroutine: i32,
    /// Offset of the first instruction after the whole construct.
    pub after: i32,
    pub catches: Vec<CatchEntry>,
    pub synchronized: bool,
}

/// Aggregate the raw exception table into protected regions, innermost-first.
pub(crate) fn aggregate(
    list: &[Node],
    exception_table: &[ExceptionTableEntry],
) -> Vec<ProtectedRegion> {
    let mut regions: Vec<ProtectedRegion> = Vec::new();

    // Typed entries grouped by protected range; entries sharing a handler merge into multi-catch.
    for entry in exception_table {
        if entry.is_catch_all() || entry.start() >= entry.end() {
            continue;
        }
        let position = regions
            .iter()
            .position(|region| region.try_from == entry.start() && region.try_to == entry.end())
            .unwrap_or_else(|| {
                regions.push(ProtectedRegion {
                    kind: RegionKind::TryCatch,
                    try_from: entry.start(),
                    try_to: entry.end(),
                    finally_from: -1,
                    subroutine: -1,
                    after: -1,
                    catches: Vec::new(),
                    synchronized: false,
                });
                regions.len() - 1
            });
        let region = &mut regions[position];
        let handler = entry.handler();
        let existing = region.catches.iter().position(|catch| catch.from == handler);
        if let Some(existing) = existing {
            region.catches[existing]
                .other_type_indexes
                .push(entry.catch_type);
        } else {
            region.catches.push(CatchEntry {
                from: handler,
                to: -1,
                type_index: entry.catch_type,
                other_type_indexes: Vec::new(),
            });
        }
    }

    // Catch-all entries grouped by handler; the entry protecting its own handler is dropped.
    let mut catch_alls: Vec<(i32, i32, i32)> = Vec::new();
    for entry in exception_table {
        if !entry.is_catch_all() || entry.start() >= entry.handler() {
            continue;
        }
        let existing = catch_alls
            .iter()
            .position(|(_, _, handler)| *handler == entry.handler());
        if let Some(existing) = existing {
            let group = &mut catch_alls[existing];
            group.0 = group.0.min(entry.start());
            group.1 = group.1.max(entry.end());
        } else {
            catch_alls.push((entry.start(), entry.end(), entry.handler()));
        }
    }

    for (start, end, handler) in catch_alls {
        let shape = classify_handler(list, handler);
        let attached = regions.iter().position(|region| {
            region.try_from == start && region.finally_from == -1 && region.try_to <= end
        });
        if let Some(position) = attached {
            let region = &mut regions[position];
            match shape {
                HandlerShape::Finally => {
                    region.kind = RegionKind::TryFinally;
                    region.finally_from = handler;
                }
                HandlerShape::FinallyJsr { subroutine } => {
                    region.kind = RegionKind::TryFinallyJsr;
                    region.finally_from = handler;
                    region.subroutine = subroutine;
                }
                HandlerShape::FinallyJikes { subroutine } => {
                    region.kind = RegionKind::TryFinallyJikes;
                    region.finally_from = handler;
                    region.subroutine = subroutine;
                }
                HandlerShape::Unknown | HandlerShape::Synchronized => {
                    // Unknown catch-all shapes degrade to a plain catch clause.
                    region.catches.push(CatchEntry {
                        from: handler,
                        to: -1,
                        type_index: 0,
                        other_type_indexes: Vec::new(),
                    });
                }
            }
            continue;
        }

        let entered = entered_by_monitor(list, start);
        let (kind, subroutine, synchronized) = match shape {
            HandlerShape::Synchronized if entered => (RegionKind::Synchronized, -1, true),
            HandlerShape::FinallyJsr { subroutine } if entered => {
                (RegionKind::Synchronized, subroutine, true)
            }
            HandlerShape::Finally => (RegionKind::TryFinally, -1, false),
            HandlerShape::FinallyJsr { subroutine } => {
                (RegionKind::TryFinallyJsr, subroutine, false)
            }
            HandlerShape::FinallyJikes { subroutine } => {
                (RegionKind::TryFinallyJikes, subroutine, false)
            }
            HandlerShape::Synchronized | HandlerShape::Unknown => {
                (RegionKind::TryCatch, -1, false)
            }
        };
        if kind == RegionKind::TryCatch {
            regions.push(ProtectedRegion {
                kind,
                try_from: start,
                try_to: end,
                finally_from: -1,
                subroutine: -1,
                after: -1,
                catches: vec![CatchEntry {
                    from: handler,
                    to: -1,
                    type_index: 0,
                    other_type_indexes: Vec::new(),
                }],
                synchronized: false,
            });
        } else {
            regions.push(ProtectedRegion {
                kind,
                try_from: start,
                try_to: end,
                finally_from: handler,
                subroutine,
                after: -1,
                catches: Vec::new(),
                synchronized,
            });
        }
    }

    merge_double_synchronized(&mut regions);

    for region in &mut regions {
        finish_region(list, region);
    }

    // Innermost first, so the driver processes outermost-last.
    regions.sort_by(|left, right| {
        let left_size = left.after.max(left.try_to) - left.try_from;
        let right_size = right.after.max(right.try_to) - right.try_from;
        left_size.cmp(&right_size).then(right.try_from.cmp(&left.try_from))
    });
    regions
}

/// The recognized shapes of a catch-all handler.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum HandlerShape {
    Synchronized,
    Finally,
    FinallyJsr { subroutine: i32 },
    FinallyJikes { subroutine: i32 },
    Unknown,
}

/// Classify the code at `handler` by shape.
fn classify_handler(list: &[Node], handler: i32) -> HandlerShape {
    let index = index_at_or_after(list, handler);
    let Some(first) = list.get(index) else {
        return HandlerShape::Unknown;
    };

    // Every known shape stores the caught exception first.
    let NodeKind::Store {
        index: exception_slot,
        value,
        ..
    } = &first.kind
    else {
        return HandlerShape::Unknown;
    };
    if !matches!(value.kind, NodeKind::ExceptionLoad { .. }) {
        return HandlerShape::Unknown;
    }
    let exception_slot = *exception_slot;

    match list.get(index + 1).map(|node| &node.kind) {
        // astore e; aload lock; monitorexit; aload e; athrow
        Some(NodeKind::MonitorExit { .. }) => {
            if rethrows(list.get(index + 2), exception_slot) {
                HandlerShape::Synchronized
            } else {
                HandlerShape::Unknown
            }
        }
        // astore e; jsr sub; aload e; athrow
        Some(NodeKind::Jsr { delta }) => {
            let subroutine = list[index + 1].offset + *delta;
            if rethrows(list.get(index + 2), exception_slot) {
                if subroutine < handler {
                    HandlerShape::FinallyJikes { subroutine }
                } else {
                    HandlerShape::FinallyJsr { subroutine }
                }
            } else {
                HandlerShape::Unknown
            }
        }
        // astore e; <body>; aload e; athrow
        Some(_) => {
            let mut cursor = index + 1;
            while let Some(node) = list.get(cursor) {
                if rethrows(Some(node), exception_slot) {
                    return HandlerShape::Finally;
                }
                if matches!(
                    node.kind,
                    NodeKind::Return | NodeKind::ValueReturn { .. } | NodeKind::Goto { .. }
                ) {
                    break;
                }
                cursor += 1;
            }
            HandlerShape::Unknown
        }
        None => HandlerShape::Unknown,
    }
}

fn rethrows(node: Option<&Node>, exception_slot: u16) -> bool {
    let Some(node) = node else {
        return false;
    };
    let NodeKind::Throw { value } = &node.kind else {
        return false;
    };
    value.load_slot() == Some(exception_slot)
}

/// Returns true if the node immediately preceding `start` is a `monitorenter`.
fn entered_by_monitor(list: &[Node], start: i32) -> bool {
    let index = index_at_or_after(list, start);
    index > 0 && matches!(list[index - 1].kind, NodeKind::MonitorEnter { .. })
}

/// Collapse two nested monitor regions sharing one cleanup subroutine into a single region.
fn merge_double_synchronized(regions: &mut Vec<ProtectedRegion>) {
    let mut index = 0;
    while index < regions.len() {
        let outer = regions[index].clone();
        if !outer.synchronized || outer.subroutine < 0 {
            index += 1;
            continue;
        }
        let inner = regions.iter().position(|candidate| {
            candidate.synchronized
                && candidate.subroutine == outer.subroutine
                && candidate.try_from >= outer.try_from
                && candidate.try_to <= outer.try_to
                && (candidate.try_from, candidate.try_to) != (outer.try_from, outer.try_to)
        });
        if let Some(inner) = inner {
            regions.remove(inner);
            let outer = regions
                .iter_mut()
                .find(|candidate| {
                    candidate.try_from == outer.try_from && candidate.try_to == outer.try_to
                });
            if let Some(outer) = outer {
                outer.kind = RegionKind::SynchronizedDouble;
            }
        } else {
            index += 1;
        }
    }
}

/// Compute handler extents and the offset after the whole construct.
fn finish_region(list: &[Node], region: &mut ProtectedRegion) {
    let mut handler_starts: Vec<i32> = region.catches.iter().map(|catch| catch.from).collect();
    if region.finally_from >= 0 {
        handler_starts.push(region.finally_from);
    }
    handler_starts.sort_unstable();

    // A forward goto just before the first handler is the escape over the handlers.
    let mut after = -1;
    if let Some(first_handler) = handler_starts.first() {
        let index = index_at_or_after(list, *first_handler);
        if index > 0 {
            if let NodeKind::Goto { delta } = &list[index - 1].kind {
                let target = list[index - 1].offset + delta;
                if target > *first_handler {
                    after = target;
                }
            }
        }
    }
    if after < 0 {
        if let Some(last_handler) = handler_starts.last() {
            after = end_of_handler(list, *last_handler);
        } else {
            after = region.try_to;
        }
    }
    region.after = after;

    for position in 0..region.catches.len() {
        let from = region.catches[position].from;
        let to = handler_starts
            .iter()
            .copied()
            .filter(|start| *start > from)
            .min()
            .unwrap_or(after);
        region.catches[position].to = to;
    }
    region.catches.sort_by_key(|catch| catch.from);
}

/// The offset just after the last instruction of the handler starting at `from`: the instruction
/// after its rethrow, or the end of the list.
fn end_of_handler(list: &[Node], from: i32) -> i32 {
    let mut index = index_at_or_after(list, from);
    while let Some(node) = list.get(index) {
        if matches!(
            node.kind,
            NodeKind::Throw { .. }
                | NodeKind::Return
                | NodeKind::ValueReturn { .. }
                | NodeKind::Ret { .. }
        ) {
            return list
                .get(index + 1)
                .map_or(last_offset(list) + 1, |next| next.offset);
        }
        index += 1;
    }
    last_offset(list) + 1
}
