//! Switch recognition.
//!
//! A raw `tableswitch`/`lookupswitch` becomes a structured switch: case pairs ordered by target
//! with the default interleaved at its position, keys sharing a target falling through to the
//! last of the group, bodies extracted up to the next case target, trailing `goto`s replaced by
//! `GOTO_BREAK`, and the last case bounded by the smallest escape offset of any case body.
//!
//! Two compiler lowerings are undone first:
//!
//! - **Enum switch**: a switch over `$SwitchMap$…[e.ordinal()]` is retagged `SWITCH_ENUM`; the
//!   class's switch-map registry translates the case keys back to ordinals and the scrutinee
//!   reverts to the enum expression.
//! - **String switch** (class file version 51+, javac shape only): the `hashCode` switch with
//!   `equals` guards assigning a relay variable collapses into the relay switch, retagged
//!   `SWITCH_STRING` with string constant pool indices as keys; both synthetic locals are
//!   deleted. Other compilers' string lowerings pass through as integer switches.

use crate::analyze::{AnalyzeContext, Scope, analyze_list};
use crate::error::Result;
use crate::node::{
    Condition, ConstValue, Node, NodeKind, SwitchBlock, SwitchCase, SwitchKind, index_at_or_after,
    last_offset,
};
use decaf_classfile::JAVA_7;

pub(crate) fn analyze(
    list: &mut Vec<Node>,
    scope: &Scope,
    context: &mut AnalyzeContext,
) -> Result<()> {
    let mut index = 0;
    while index < list.len() {
        if !matches!(list[index].kind, NodeKind::Switch(_)) {
            index += 1;
            continue;
        }
        if context.major_version >= JAVA_7 {
            if let Some(relay) = collapse_string_switch(list, index, context) {
                index = relay;
            }
        }
        build_switch(list, index, scope, context)?;
        index += 1;
    }
    Ok(())
}

/// Collapse the javac string-switch apparatus around the hash switch at `index`; returns the
/// index of the relay switch on success.
fn collapse_string_switch(
    list: &mut Vec<Node>,
    index: usize,
    context: &mut AnalyzeContext,
) -> Option<usize> {
    if index < 2 {
        return None;
    }
    let NodeKind::Switch(hash_switch) = &list[index].kind else {
        return None;
    };

    // switch (s.hashCode())
    let NodeKind::Invoke(hash_invoke) = &hash_switch.key.kind else {
        return None;
    };
    if context
        .constant_pool
        .method_name(hash_invoke.method_index)
        .ok()?
        != "hashCode"
    {
        return None;
    }
    let scrutinee_slot = hash_invoke.target.as_deref()?.load_slot()?;

    // String s2 = s; int relay = -1;
    let NodeKind::Store {
        index: relay_slot,
        value: relay_init,
        ..
    } = &list[index - 1].kind
    else {
        return None;
    };
    if !matches!(relay_init.kind, NodeKind::Const(ConstValue::Int(-1))) {
        return None;
    }
    let relay_slot = *relay_slot;
    let NodeKind::Store {
        index: stored_slot,
        value: scrutinee,
        ..
    } = &list[index - 2].kind
    else {
        return None;
    };
    if *stored_slot != scrutinee_slot {
        return None;
    }
    let scrutinee = scrutinee.as_ref().clone();

    // the relay switch
    let relay_index = (index + 1..list.len()).find(|position| {
        matches!(&list[*position].kind, NodeKind::Switch(raw)
            if raw.key.load_slot() == Some(relay_slot))
    })?;

    // the equals guards between the two switches
    let mut mapping: Vec<(i32, u16)> = Vec::new();
    let mut pending: Option<u16> = None;
    for node in &list[index + 1..relay_index] {
        match &node.kind {
            NodeKind::If {
                condition: Condition::Eq | Condition::Ne,
                value,
                ..
            } => {
                let NodeKind::Invoke(equals) = &value.kind else {
                    return None;
                };
                if context.constant_pool.method_name(equals.method_index).ok()? != "equals"
                    || equals.target.as_deref().and_then(Node::load_slot) != Some(scrutinee_slot)
                {
                    return None;
                }
                let NodeKind::Const(ConstValue::String(string_index)) =
                    &equals.args.first()?.kind
                else {
                    return None;
                };
                pending = Some(*string_index);
            }
            NodeKind::Store {
                index: stored,
                value,
                ..
            } => {
                if *stored != relay_slot {
                    return None;
                }
                let NodeKind::Const(ConstValue::Int(case_value)) = &value.kind else {
                    return None;
                };
                mapping.push((*case_value, pending.take()?));
            }
            NodeKind::Goto { .. } => {}
            _ => return None,
        }
    }
    if mapping.is_empty() {
        return None;
    }

    // every relay key must have a guard
    {
        let NodeKind::Switch(relay) = &list[relay_index].kind else {
            return None;
        };
        for pair in &relay.pairs {
            mapping
                .iter()
                .find(|(case_value, _)| *case_value == pair.key)?;
        }
    }

    let scrutinee_probe = list[index - 1].offset;
    let relay_probe = list[index].offset;
    let NodeKind::Switch(relay) = &mut list[relay_index].kind else {
        return None;
    };
    relay.kind = SwitchKind::String;
    relay.key = scrutinee;
    for pair in &mut relay.pairs {
        if let Some((_, string_index)) = mapping
            .iter()
            .find(|(case_value, _)| *case_value == pair.key)
        {
            pair.key = i32::from(*string_index);
        }
    }
    context
        .local_variables
        .remove_with_index_and_offset(scrutinee_slot, scrutinee_probe);
    context
        .local_variables
        .remove_with_index_and_offset(relay_slot, relay_probe);
    drop(list.drain(index - 2..relay_index));
    Some(index - 2)
}

/// Structure the raw switch at `index`.
fn build_switch(
    list: &mut Vec<Node>,
    index: usize,
    scope: &Scope,
    context: &mut AnalyzeContext,
) -> Result<()> {
    let switch_offset = list[index].offset;
    let line = list[index].line;
    let NodeKind::Switch(raw) = &list[index].kind else {
        return Ok(());
    };
    let mut kind = raw.kind;
    let mut key = raw.key.clone();
    let mut entries: Vec<(bool, i32, i32)> = raw
        .pairs
        .iter()
        .map(|pair| (false, pair.key, switch_offset + pair.delta))
        .collect();
    entries.push((true, 0, switch_offset + raw.default_delta));
    entries.sort_by_key(|(default, _, target)| (*target, *default));

    // enum lowering: $SwitchMap$…[e.ordinal()]
    if kind == SwitchKind::Int {
        if let Some((scrutinee, name_index)) = match_enum_lowering(&raw.key, context) {
            kind = SwitchKind::Enum;
            key = scrutinee;
            if let Some(map) = context.switch_maps.get(&name_index) {
                for entry in &mut entries {
                    if entry.0 {
                        continue;
                    }
                    let ordinal = map
                        .iter()
                        .find(|(_, case_key)| **case_key == entry.1)
                        .map(|(ordinal, _)| *ordinal);
                    if let Some(ordinal) = ordinal {
                        entry.1 = ordinal;
                    }
                }
            }
        }
    }

    // the smallest escape of any case body bounds the last case
    let mut breaks: Vec<i32> = Vec::new();
    for window in 0..entries.len().saturating_sub(1) {
        let from = entries[window].2;
        let to = entries[window + 1].2;
        if to <= from {
            continue;
        }
        let end_index = index_at_or_after(list, to);
        if end_index == 0 {
            continue;
        }
        let candidate = &list[end_index - 1];
        if candidate.offset >= from && candidate.is_goto() {
            if let Some(target) = candidate.jump_target() {
                if target > candidate.offset {
                    breaks.push(target);
                }
            }
        }
    }
    let switch_end = breaks
        .iter()
        .copied()
        .min()
        .unwrap_or(scope.after_list)
        .min(scope.after_list.max(last_offset(list) + 1));

    // extract bodies back to front; keys sharing a target leave the body on the last of the group
    let mut cases: Vec<SwitchCase> = Vec::new();
    let mut bound = switch_end;
    let mut anchor = switch_offset;
    for entry in entries.iter().rev() {
        let (default, case_key, target) = *entry;
        let case_end = bound;
        let from_index = index_at_or_after(list, target);
        let to_index = index_at_or_after(list, case_end);
        let mut body: Vec<Node> = if from_index < to_index {
            list.drain(from_index..to_index).collect()
        } else {
            Vec::new()
        };
        bound = target;
        anchor = anchor.max(last_offset(&body));

        if let Some(last) = body.last_mut() {
            if last.is_goto() && last.jump_target() == Some(switch_end) {
                last.kind = NodeKind::GotoBreak;
            }
        }
        let child = Scope {
            break_offset: switch_end,
            after_list: case_end,
            ..*scope
        };
        analyze_list(&mut body, &child, context)?;
        cases.push(SwitchCase {
            default,
            key: case_key,
            offset: target,
            body,
        });
    }
    cases.reverse();

    // a trailing default with no body was synthesized by the compiler
    if let Some(last) = cases.last() {
        if last.default && last.body.is_empty() {
            cases.pop();
        }
    }

    list[index] = Node::new(
        anchor,
        line,
        NodeKind::SwitchBlock(Box::new(SwitchBlock { kind, key, cases })),
    );
    Ok(())
}

/// Match `$SwitchMap$…[scrutinee.ordinal()]`; returns the scrutinee and the map field's name
/// index.
fn match_enum_lowering(key: &Node, context: &AnalyzeContext) -> Option<(Node, u16)> {
    let NodeKind::ArrayLoad { array, index } = &key.kind else {
        return None;
    };
    let NodeKind::GetStatic { field_index } = &array.kind else {
        return None;
    };
    let field_name = context.constant_pool.field_name(*field_index).ok()?;
    if !field_name.starts_with("$SwitchMap$") {
        return None;
    }
    let (_class_index, name_and_type_index) = context
        .constant_pool
        .try_get_field_ref(*field_index)
        .ok()?;
    let (name_index, _descriptor_index) = context
        .constant_pool
        .try_get_name_and_type(name_and_type_index)
        .ok()?;
    if !context.switch_maps.contains_key(&name_index) {
        return None;
    }
    let NodeKind::Invoke(ordinal) = &index.kind else {
        return None;
    };
    if context.constant_pool.method_name(ordinal.method_index).ok()? != "ordinal" {
        return None;
    }
    let scrutinee = ordinal.target.as_deref()?.clone();
    Some((scrutinee, name_index))
}
