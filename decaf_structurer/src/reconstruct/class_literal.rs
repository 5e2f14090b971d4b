//! Recognition of the pre-Java 5 `.class` literal idiom.
//!
//! Before class constants could be loaded with `ldc`, compilers cached `Foo.class` in a synthetic
//! `class$Foo` field guarded by a null check and initialized through a synthetic
//! `class$(String)` helper:
//!
//! ```text
//! getstatic class$Foo
//! ifnonnull L
//! ldc "Foo"
//! invokestatic class$ (Ljava/lang/String;)Ljava/lang/Class;
//! dup
//! putstatic class$Foo
//! goto M
//! L: getstatic class$Foo
//! M: ...
//! ```
//!
//! The whole construct collapses into a class constant; a `Class` entry for the dotted name is
//! appended to the pool. The Eclipse compiler wraps the helper call in a `ClassNotFoundException`
//! handler inside the synthetic method, so its use sites have this same shape.

use crate::error::Result;
use crate::node::{
    Condition, ConstValue, InvokeKind, Node, NodeKind, count_in_expressions, replace_in_expressions,
};
use decaf_classfile::ConstantPool;

pub(crate) fn apply(list: &mut Vec<Node>, constant_pool: &mut ConstantPool) -> Result<()> {
    let mut index = 0;
    while index + 5 < list.len() {
        let Some(rewrite) = match_class_literal(list, index, constant_pool) else {
            index += 1;
            continue;
        };
        let class_name = rewrite.class_name.replace('.', "/");
        let class_index = constant_pool.add_class(class_name)?;
        let field_index = rewrite.field_index;
        let literal = Node::new(
            list[index].offset,
            list[index].line,
            NodeKind::Const(ConstValue::Class(class_index)),
        );
        list.drain(index..index + 5);
        let consumer = &mut list[index];
        let mut replacement = Some(literal);
        replace_in_expressions(
            consumer,
            &|candidate| {
                matches!(candidate.kind, NodeKind::GetStatic { field_index: candidate_field }
                    if candidate_field == field_index)
            },
            &mut replacement,
        );
        index += 1;
    }
    Ok(())
}

struct ClassLiteral {
    field_index: u16,
    class_name: String,
}

fn match_class_literal(
    list: &mut [Node],
    index: usize,
    constant_pool: &ConstantPool,
) -> Option<ClassLiteral> {
    // ifnonnull over the synthetic cache field
    let NodeKind::IfCmp {
        condition: Condition::Ne,
        left,
        right,
        delta,
    } = &list[index].kind
    else {
        return None;
    };
    if *delta <= 0 || !matches!(right.kind, NodeKind::Const(ConstValue::Null)) {
        return None;
    }
    let NodeKind::GetStatic { field_index } = &left.kind else {
        return None;
    };
    let field_index = *field_index;
    let field_name = constant_pool.field_name(field_index).ok()?;
    if !field_name.starts_with("class$") && !field_name.starts_with("array$") {
        return None;
    }

    // dup of the class$("name") helper call
    let NodeKind::DupStore { value: helper } = &list[index + 1].kind else {
        return None;
    };
    let NodeKind::Invoke(invoke) = &helper.kind else {
        return None;
    };
    if invoke.kind != InvokeKind::Static
        || !constant_pool.method_name(invoke.method_index).ok()?.starts_with("class$")
    {
        return None;
    }
    let NodeKind::Const(ConstValue::String(string_index)) = &invoke.args.first()?.kind else {
        return None;
    };
    let class_name = constant_pool.try_get_string(*string_index).ok()?.to_string();

    // putstatic of the cache, the parked value, and the bridge over the reload
    let NodeKind::PutStatic {
        field_index: stored_field,
        ..
    } = &list[index + 2].kind
    else {
        return None;
    };
    if *stored_field != field_index
        || !matches!(list[index + 3].kind, NodeKind::TernaryStore { .. })
        || !matches!(list[index + 4].kind, NodeKind::Goto { .. })
    {
        return None;
    }

    // the consumer must reload the cache field
    let uses = count_in_expressions(&mut list[index + 5], &|candidate| {
        matches!(candidate.kind, NodeKind::GetStatic { field_index: candidate_field }
            if candidate_field == field_index)
    });
    if uses == 0 {
        return None;
    }
    Some(ClassLiteral {
        field_index,
        class_name,
    })
}
