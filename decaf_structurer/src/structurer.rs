//! The per-class driver.
//!
//! For each method: decode, aggregate exception regions and build their blocks innermost-first,
//! run the expression reconstructor battery, recognize loops/switches/conditionals, place
//! declarations, rewrite the remaining jumps, insert labels, and run the final cleanups. Errors
//! never cross a method boundary: a failing method is marked `contains_error`, its partial node
//! list is kept, and analysis continues with the next method.

use crate::analyze::{AnalyzeContext, ReturnSites, Scope, analyze_list};
use crate::decode;
use crate::declaration;
use crate::error::Result;
use crate::exception;
use crate::labels::{JumpScope, insert_labels, rewrite_jumps};
use crate::node::{Node, NodeKind, last_offset, walk_list_mut};
use crate::reconstruct;
use crate::synchronized_block;
use crate::try_block;
use ahash::AHashSet;
use decaf_classfile::{
    ClassFile, ConstantPool, LocalVariableTable, Method, MethodDescriptor, ReferenceMap,
};
use tracing::debug;

/// The structured statement tree of one method.
#[derive(Clone, Debug)]
pub struct MethodStructure {
    /// Index of the method in [`ClassFile::methods`].
    pub method_index: usize,
    /// The structured node list; partial when the method is marked `contains_error`.
    pub nodes: Vec<Node>,
}

/// Structure every method of a class.
///
/// Failures are contained per method: the method is marked `contains_error`, its partial node
/// list is kept, and the remaining methods are still analyzed.
pub fn structure_class(
    class_file: &mut ClassFile,
    references: &mut ReferenceMap,
) -> Vec<MethodStructure> {
    let mut methods = std::mem::take(&mut class_file.methods);
    let mut structures = Vec::new();
    for (method_index, method) in methods.iter_mut().enumerate() {
        if method.code.is_empty() {
            continue;
        }
        let mut nodes = Vec::new();
        if let Err(error) = structure_method_into(class_file, method, references, &mut nodes) {
            method.contains_error = true;
            debug!("Structural analysis of method {method_index} failed: {error}");
        }
        structures.push(MethodStructure {
            method_index,
            nodes,
        });
    }
    class_file.methods = methods;
    structures
}

/// Structure a single method.
///
/// # Errors
///
/// Returns an error when the bytecode is malformed or an instruction pattern does not have a
/// recognized shape; the spine of the error taxonomy is in [`crate::Error`].
pub fn structure_method(
    class_file: &mut ClassFile,
    method: &mut Method,
    references: &mut ReferenceMap,
) -> Result<Vec<Node>> {
    let mut nodes = Vec::new();
    structure_method_into(class_file, method, references, &mut nodes)?;
    Ok(nodes)
}

fn structure_method_into(
    class_file: &mut ClassFile,
    method: &mut Method,
    references: &mut ReferenceMap,
    nodes: &mut Vec<Node>,
) -> Result<()> {
    let descriptor = MethodDescriptor::parse(
        class_file
            .constant_pool
            .try_get_utf8(method.descriptor_index)?,
    )?;
    let mut parameter_slots = descriptor.parameter_slots();
    if method.has_this() {
        parameter_slots += 1;
    }
    // Slots missing from the class file's table still need entries so `this` and the parameters
    // never receive declarations.
    for slot in 0..parameter_slots {
        method.local_variables.find_or_create(slot, 0);
    }
    method.local_variables.mark_parameters_declared(parameter_slots);

    *nodes = decode::decode(
        &class_file.constant_pool,
        &method.code,
        &method.exception_table,
        &method.line_numbers,
        &mut method.local_variables,
    )?;
    let returns = ReturnSites::collect(nodes);

    // Protected regions, innermost first.
    let regions = exception::aggregate(nodes, &method.exception_table);
    for region in &regions {
        if region.synchronized {
            synchronized_block::build(
                nodes,
                region,
                &mut class_file.constant_pool,
                &mut method.local_variables,
            )?;
        } else {
            try_block::build(
                nodes,
                region,
                &mut class_file.constant_pool,
                &mut method.local_variables,
            )?;
        }
    }

    reconstruct::run(
        nodes,
        &mut class_file.constant_pool,
        &mut method.local_variables,
    )?;

    let after_list = last_offset(nodes) + 1;
    let mut context = AnalyzeContext {
        constant_pool: &mut class_file.constant_pool,
        local_variables: &mut method.local_variables,
        switch_maps: &class_file.switch_maps,
        major_version: class_file.major_version,
        returns,
        labels: AHashSet::new(),
    };
    analyze_list(nodes, &Scope::method(after_list), &mut context)?;
    let AnalyzeContext {
        returns,
        labels: mut label_set,
        ..
    } = context;

    declaration::place(nodes, 0, after_list, &mut method.local_variables);
    rewrite_jumps(
        nodes,
        &JumpScope::method(),
        after_list,
        &returns,
        &mut label_set,
    );
    insert_labels(nodes, &label_set);

    remove_trailing_return(nodes);
    insert_return_casts(
        nodes,
        &descriptor,
        &mut class_file.constant_pool,
        &method.local_variables,
    )?;
    register_references(nodes, &class_file.constant_pool, references);
    Ok(())
}

/// Drop the synthetic `return` the compiler appends to a void method; a nested trailing `return`
/// is dropped when its line number precedes its predecessor's.
fn remove_trailing_return(nodes: &mut Vec<Node>) {
    let drop_last = match nodes.as_slice() {
        [.., previous, last] => {
            matches!(last.kind, NodeKind::Return)
                && (last.line < 0 || previous.line < 0 || last.line <= previous.line)
        }
        [only] => matches!(only.kind, NodeKind::Return),
        [] => false,
    };
    if drop_last {
        nodes.pop();
    }
}

/// Add an explicit cast on a `return` whose reconstructed value is `Object` while the method
/// returns something more specific; the class constant is appended to the pool.
fn insert_return_casts(
    nodes: &mut [Node],
    descriptor: &MethodDescriptor,
    constant_pool: &mut ConstantPool,
    local_variables: &LocalVariableTable,
) -> Result<()> {
    let return_type = descriptor.return_type.as_str();
    if !return_type.starts_with('L')
        || !return_type.ends_with(';')
        || return_type == "Ljava/lang/Object;"
    {
        return Ok(());
    }

    let mut needs_cast: Vec<(i32, u16)> = Vec::new();
    {
        let locals = &local_variables;
        let pool = &*constant_pool;
        walk_list_mut(nodes, &mut |node| {
            let NodeKind::ValueReturn { value } = &node.kind else {
                return;
            };
            let Some(slot) = value.load_slot() else {
                return;
            };
            let Some(variable) = locals.find(slot, value.offset) else {
                return;
            };
            if matches!(
                pool.try_get_utf8(variable.descriptor_index),
                Ok("Ljava/lang/Object;")
            ) {
                needs_cast.push((node.offset, slot));
            }
        });
    }
    if needs_cast.is_empty() {
        return Ok(());
    }

    let class_name = &return_type[1..return_type.len() - 1];
    let class_index = constant_pool.add_class(class_name)?;
    walk_list_mut(nodes, &mut |node| {
        let offset = node.offset;
        let NodeKind::ValueReturn { value } = &mut node.kind else {
            return;
        };
        if !needs_cast
            .iter()
            .any(|(cast_offset, _)| *cast_offset == offset)
        {
            return;
        }
        if matches!(value.kind, NodeKind::CheckCast { .. }) {
            return;
        }
        let inner = std::mem::replace(
            value.as_mut(),
            Node::new(offset, -1, NodeKind::Return),
        );
        let value_offset = inner.offset;
        let value_line = inner.line;
        *value.as_mut() = Node::new(
            value_offset,
            value_line,
            NodeKind::CheckCast {
                class_index,
                value: Box::new(inner),
            },
        );
    });
    Ok(())
}

/// Register every class the structured tree references.
fn register_references(
    nodes: &mut [Node],
    constant_pool: &ConstantPool,
    references: &mut ReferenceMap,
) {
    walk_list_mut(nodes, &mut |node| {
        let mut register = |class_index: u16| {
            if let Ok(name) = constant_pool.try_get_class(class_index) {
                references.add(name);
            }
        };
        match &node.kind {
            NodeKind::CheckCast { class_index, .. }
            | NodeKind::InstanceOf { class_index, .. }
            | NodeKind::New { class_index }
            | NodeKind::ANewArray { class_index, .. }
            | NodeKind::MultiANewArray { class_index, .. } => register(*class_index),
            NodeKind::Const(crate::node::ConstValue::Class(class_index)) => {
                register(*class_index);
            }
            NodeKind::Try(try_block) => {
                for catch in &try_block.catches {
                    if catch.class_index != 0 {
                        register(catch.class_index);
                    }
                }
            }
            _ => {}
        }
    });
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::node::{Condition, ConstValue, SwitchKind};
    use crate::test::{assert_structured, class_file_with_version, method_with_code};
    use decaf_classfile::{ExceptionTableEntry, JAVA_5, JAVA_7};
    use indexmap::IndexMap;

    #[test]
    fn test_simple_while_scenario() -> Result<()> {
        // iconst_0; istore_1; iload_1; bipush 10; if_icmpge END; iinc 1 1; goto TEST; END: return
        let code = vec![
            0x03, 0x3c, 0x1b, 0x10, 0x0a, 0xa2, 0x00, 0x09, 0x84, 0x01, 0x01, 0xa7, 0xff, 0xf7,
            0xb1,
        ];
        let mut class_file = class_file_with_version(JAVA_5);
        let mut method = method_with_code(&mut class_file, "()V", code)?;
        let mut references = ReferenceMap::new();
        let mut nodes = structure_method(&mut class_file, &mut method, &mut references)?;
        assert_structured(&mut nodes);

        assert_eq!(2, nodes.len());
        let NodeKind::Declare {
            index: 1,
            store: Some(store),
        } = &nodes[0].kind
        else {
            panic!("expected declaration, found {}", nodes[0]);
        };
        assert!(matches!(
            store.kind,
            NodeKind::Store {
                index: 1,
                ..
            }
        ));
        let NodeKind::While { test, body } = &nodes[1].kind else {
            panic!("expected while, found {}", nodes[1]);
        };
        let NodeKind::IfCmp {
            condition: Condition::Lt,
            right,
            ..
        } = &test.kind
        else {
            panic!("expected i < 10 test");
        };
        assert!(matches!(right.kind, NodeKind::Const(ConstValue::Int(10))));
        assert_eq!(1, body.len());
        assert!(matches!(body[0].kind, NodeKind::Iinc { index: 1, .. }));
        Ok(())
    }

    #[test]
    fn test_iterator_foreach_scenario() -> Result<()> {
        let mut class_file = class_file_with_version(JAVA_5);
        let iterator_index = class_file.constant_pool.add_method_ref(
            "java/util/List",
            "iterator",
            "()Ljava/util/Iterator;",
        )?;
        let next_index = class_file.constant_pool.add_method_ref(
            "java/util/Iterator",
            "next",
            "()Ljava/lang/Object;",
        )?;
        let string_class = class_file.constant_pool.add_class("java/lang/String")?;
        let has_next_index =
            class_file
                .constant_pool
                .add_method_ref("java/util/Iterator", "hasNext", "()Z")?;
        let [it_lo, nx_lo, cc_lo, hn_lo] = [
            u8::try_from(iterator_index).expect("index"),
            u8::try_from(next_index).expect("index"),
            u8::try_from(string_class).expect("index"),
            u8::try_from(has_next_index).expect("index"),
        ];
        // aload_1; invokeinterface iterator; astore_2; goto TEST;
        // BODY: aload_2; invokeinterface next; checkcast String; astore_3; aload_3; pop;
        // TEST: aload_2; invokeinterface hasNext; ifne BODY; return
        let code = vec![
            0x2b, 0xb9, 0x00, it_lo, 0x01, 0x00, 0x4d, 0xa7, 0x00, 0x0f, 0x2c, 0xb9, 0x00, nx_lo,
            0x01, 0x00, 0xc0, 0x00, cc_lo, 0x4e, 0x2d, 0x57, 0x2c, 0xb9, 0x00, hn_lo, 0x01, 0x00,
            0x9a, 0xff, 0xee, 0xb1,
        ];
        let mut method = method_with_code(&mut class_file, "()V", code)?;
        let mut references = ReferenceMap::new();
        let mut nodes = structure_method(&mut class_file, &mut method, &mut references)?;
        assert_structured(&mut nodes);

        assert_eq!(1, nodes.len());
        let NodeKind::ForEach {
            declaration,
            values,
            body,
        } = &nodes[0].kind
        else {
            panic!("expected foreach, found {}", nodes[0]);
        };
        assert!(matches!(declaration.kind, NodeKind::Declare { index: 3, .. }));
        assert_eq!(Some(1), values.load_slot());
        assert_eq!(1, body.len());
        // the synthetic iterator slot is purged
        assert!(method.local_variables.find(2, 10).is_none());
        Ok(())
    }

    #[test]
    fn test_jsr_try_finally_scenario() -> Result<()> {
        // TRY: bipush 7; istore_1; jsr SUB; goto END;
        // HANDLER: astore_2; jsr SUB; aload_2; athrow;
        // SUB: astore_3; iinc 1 1; ret 3; END: return
        let code = vec![
            0x10, 0x07, 0x3c, 0xa8, 0x00, 0x0d, 0xa7, 0x00, 0x10, 0x4d, 0xa8, 0x00, 0x06, 0x2c,
            0xbf, 0x00, 0x4e, 0x84, 0x01, 0x01, 0xa9, 0x03, 0xb1,
        ];
        let mut class_file = class_file_with_version(JAVA_5);
        let mut method = method_with_code(&mut class_file, "()V", code)?;
        method.exception_table = vec![ExceptionTableEntry::new(0, 6, 9, 0)];
        let mut references = ReferenceMap::new();
        let mut nodes = structure_method(&mut class_file, &mut method, &mut references)?;
        assert_structured(&mut nodes);

        assert_eq!(1, nodes.len());
        let NodeKind::Try(try_node) = &nodes[0].kind else {
            panic!("expected try, found {}", nodes[0]);
        };
        assert!(try_node.catches.is_empty());
        let finally_body = try_node.finally_body.as_ref().expect("finally body");
        assert_eq!(1, finally_body.len());
        assert!(matches!(finally_body[0].kind, NodeKind::Iinc { index: 1, .. }));
        assert_eq!(1, try_node.body.len());
        Ok(())
    }

    #[test]
    fn test_enum_switch_scenario() -> Result<()> {
        let mut class_file = class_file_with_version(JAVA_7);
        let field_index = class_file.constant_pool.add_field_ref(
            "Foo$1",
            "$SwitchMap$com$example$Color",
            "[I",
        )?;
        let ordinal_index =
            class_file
                .constant_pool
                .add_method_ref("com/example/Color", "ordinal", "()I")?;
        let (_class, name_and_type) = class_file.constant_pool.try_get_field_ref(field_index)?;
        let (name_index, _descriptor) =
            class_file.constant_pool.try_get_name_and_type(name_and_type)?;
        let mut map = IndexMap::new();
        map.insert(0, 1);
        map.insert(1, 2);
        class_file.switch_maps.insert(name_index, map);

        let field_lo = u8::try_from(field_index).expect("index");
        let ordinal_lo = u8::try_from(ordinal_index).expect("index");
        // getstatic $SwitchMap$...; aload_1; invokevirtual ordinal; iaload; tableswitch;
        // case bodies storing 2/3, default storing 4; return
        let code = vec![
            0xb2, 0x00, field_lo, // 0: getstatic
            0x2b, // 3: aload_1
            0xb6, 0x00, ordinal_lo, // 4: invokevirtual
            0x2e, // 7: iaload
            0xaa, // 8: tableswitch
            0x00, 0x00, 0x00, // padding to 12
            0x00, 0x00, 0x00, 0x22, // default -> 42
            0x00, 0x00, 0x00, 0x01, // low 1
            0x00, 0x00, 0x00, 0x02, // high 2
            0x00, 0x00, 0x00, 0x18, // case 1 -> 32
            0x00, 0x00, 0x00, 0x1d, // case 2 -> 37
            0x05, 0x3d, // 32: iconst_2; istore_2
            0xa7, 0x00, 0x0a, // 34: goto 44
            0x06, 0x3d, // 37: iconst_3; istore_2
            0xa7, 0x00, 0x05, // 39: goto 44
            0x07, 0x3d, // 42: iconst_4; istore_2
            0xb1, // 44: return
        ];
        let mut method = method_with_code(&mut class_file, "()V", code)?;
        let mut references = ReferenceMap::new();
        let mut nodes = structure_method(&mut class_file, &mut method, &mut references)?;
        assert_structured(&mut nodes);

        let switch_node = nodes
            .iter()
            .find_map(|node| match &node.kind {
                NodeKind::SwitchBlock(switch_block) => Some(switch_block),
                _ => None,
            })
            .expect("switch block");
        assert_eq!(SwitchKind::Enum, switch_node.kind);
        assert_eq!(Some(1), switch_node.key.load_slot());
        // case keys are ordinals
        assert_eq!(0, switch_node.cases[0].key);
        assert_eq!(1, switch_node.cases[1].key);
        assert!(switch_node.cases[2].default);
        Ok(())
    }

    #[test]
    fn test_string_switch_scenario() -> Result<()> {
        let mut class_file = class_file_with_version(JAVA_7);
        let hash_index =
            class_file
                .constant_pool
                .add_method_ref("java/lang/String", "hashCode", "()I")?;
        let equals_index = class_file.constant_pool.add_method_ref(
            "java/lang/String",
            "equals",
            "(Ljava/lang/Object;)Z",
        )?;
        let string_a = class_file.constant_pool.add_string("a")?;
        let string_b = class_file.constant_pool.add_string("b")?;
        let hash_lo = u8::try_from(hash_index).expect("index");
        let equals_lo = u8::try_from(equals_index).expect("index");
        let a_lo = u8::try_from(string_a).expect("index");
        let b_lo = u8::try_from(string_b).expect("index");

        let code = vec![
            0x2b, // 0: aload_1
            0x4d, // 1: astore_2
            0x02, // 2: iconst_m1
            0x3e, // 3: istore_3
            0x2c, // 4: aload_2
            0xb6, 0x00, hash_lo, // 5: invokevirtual hashCode
            0xab, // 8: lookupswitch
            0x00, 0x00, 0x00, // padding to 12
            0x00, 0x00, 0x00, 0x35, // default -> 61
            0x00, 0x00, 0x00, 0x02, // 2 pairs
            0x00, 0x00, 0x00, 0x61, // 'a'
            0x00, 0x00, 0x00, 0x1c, // -> 36
            0x00, 0x00, 0x00, 0x62, // 'b'
            0x00, 0x00, 0x00, 0x2a, // -> 50
            0x2c, // 36: aload_2
            0x12, a_lo, // 37: ldc "a"
            0xb6, 0x00, equals_lo, // 39: invokevirtual equals
            0x99, 0x00, 0x13, // 42: ifeq -> 61
            0x03, // 45: iconst_0
            0x3e, // 46: istore_3
            0xa7, 0x00, 0x0e, // 47: goto 61
            0x2c, // 50: aload_2
            0x12, b_lo, // 51: ldc "b"
            0xb6, 0x00, equals_lo, // 53: invokevirtual equals
            0x99, 0x00, 0x05, // 56: ifeq -> 61
            0x04, // 59: iconst_1
            0x3e, // 60: istore_3
            0x1d, // 61: iload_3
            0xaa, // 62: tableswitch
            0x00, // padding to 64
            0x00, 0x00, 0x00, 0x1f, // default -> 93
            0x00, 0x00, 0x00, 0x00, // low 0
            0x00, 0x00, 0x00, 0x01, // high 1
            0x00, 0x00, 0x00, 0x16, // case 0 -> 84
            0x00, 0x00, 0x00, 0x1c, // case 1 -> 90
            0x05, // 84: iconst_2
            0x36, 0x04, // 85: istore 4
            0xa7, 0x00, 0x06, // 87: goto 93
            0x06, // 90: iconst_3
            0x36, 0x04, // 91: istore 4
            0xb1, // 93: return
        ];
        let mut method = method_with_code(&mut class_file, "()V", code)?;
        let mut references = ReferenceMap::new();
        let mut nodes = structure_method(&mut class_file, &mut method, &mut references)?;
        assert_structured(&mut nodes);

        let switch_node = nodes
            .iter()
            .find_map(|node| match &node.kind {
                NodeKind::SwitchBlock(switch_block) => Some(switch_block),
                _ => None,
            })
            .expect("switch block");
        assert_eq!(SwitchKind::String, switch_node.kind);
        assert_eq!(Some(1), switch_node.key.load_slot());
        assert_eq!(i32::from(string_a), switch_node.cases[0].key);
        assert_eq!(i32::from(string_b), switch_node.cases[1].key);
        // both synthetic locals are eliminated
        assert!(method.local_variables.find(2, 6).is_none());
        assert!(method.local_variables.find(3, 6).is_none());
        Ok(())
    }

    #[test]
    fn test_do_while_scenario() -> Result<()> {
        // BODY: iinc 1 1; iload_1; bipush 10; if_icmplt BODY; return
        let code = vec![0x84, 0x01, 0x01, 0x1b, 0x10, 0x0a, 0xa1, 0xff, 0xfa, 0xb1];
        let mut class_file = class_file_with_version(JAVA_5);
        let mut method = method_with_code(&mut class_file, "()V", code)?;
        let mut references = ReferenceMap::new();
        let mut nodes = structure_method(&mut class_file, &mut method, &mut references)?;
        assert_structured(&mut nodes);

        assert_eq!(1, nodes.len());
        let NodeKind::DoWhile { test, body } = &nodes[0].kind else {
            panic!("expected do-while, found {}", nodes[0]);
        };
        assert!(matches!(
            test.kind,
            NodeKind::IfCmp {
                condition: Condition::Lt,
                ..
            }
        ));
        assert_eq!(1, body.len());
        Ok(())
    }

    #[test]
    fn test_empty_do_while_becomes_while() -> Result<()> {
        // TEST: iload_1; ifne TEST; return
        let code = vec![0x1b, 0x9a, 0xff, 0xff, 0xb1];
        let mut class_file = class_file_with_version(JAVA_5);
        let mut method = method_with_code(&mut class_file, "()V", code)?;
        let mut references = ReferenceMap::new();
        let mut nodes = structure_method(&mut class_file, &mut method, &mut references)?;
        assert_structured(&mut nodes);

        assert_eq!(1, nodes.len());
        let NodeKind::While { body, .. } = &nodes[0].kind else {
            panic!("expected while, found {}", nodes[0]);
        };
        assert!(body.is_empty());
        Ok(())
    }

    #[test]
    fn test_error_is_contained_per_method() -> Result<()> {
        let mut class_file = class_file_with_version(JAVA_5);
        // monitorenter on a constant: the synchronized builder rejects the shape
        let code = vec![
            0x01, // 0: aconst_null
            0xc2, // 1: monitorenter
            0x01, // 2: aconst_null
            0xbf, // 3: athrow
        ];
        let mut method = method_with_code(&mut class_file, "()V", code)?;
        method.exception_table = vec![ExceptionTableEntry::new(2, 3, 3, 0)];
        class_file.methods.push(method);
        let good = method_with_code(&mut class_file, "()V", vec![0xb1])?;
        class_file.methods.push(good);

        let mut references = ReferenceMap::new();
        let structures = structure_class(&mut class_file, &mut references);
        assert_eq!(2, structures.len());
        assert!(class_file.methods[0].contains_error);
        assert!(!class_file.methods[1].contains_error);
        Ok(())
    }

    #[test]
    fn test_synchronized_block_end_to_end() -> Result<()> {
        // aload_1; dup; astore_2; monitorenter; aload_1; pop; aload_2; monitorexit; goto END;
        // astore_3; aload_2; monitorexit; aload_3; athrow; END: return
        let code = vec![
            0x2b, 0x59, 0x4d, 0xc2, // 0..3: capture + enter
            0x2b, 0x57, // 4: aload_1; 5: pop
            0x2c, 0xc3, // 6: aload_2; 7: monitorexit
            0xa7, 0x00, 0x08, // 8: goto 16
            0x4e, // 11: astore_3
            0x2c, 0xc3, // 12: aload_2; 13: monitorexit
            0x2d, 0xbf, // 14: aload_3; 15: athrow
            0xb1, // 16: return
        ];
        let mut class_file = class_file_with_version(JAVA_5);
        let mut method = method_with_code(&mut class_file, "()V", code)?;
        method.exception_table = vec![ExceptionTableEntry::new(4, 8, 11, 0)];
        let mut references = ReferenceMap::new();
        let mut nodes = structure_method(&mut class_file, &mut method, &mut references)?;
        assert_structured(&mut nodes);

        assert_eq!(1, nodes.len());
        let NodeKind::Synchronized { monitor, body, .. } = &nodes[0].kind else {
            panic!("expected synchronized, found {}", nodes[0]);
        };
        assert_eq!(Some(1), monitor.load_slot());
        assert_eq!(1, body.len());
        // the monitor slot is purged
        assert!(method.local_variables.find(2, 5).is_none());
        Ok(())
    }

    #[test]
    fn test_if_else_end_to_end() -> Result<()> {
        // iload_1; ifeq ELSE; iload_1; istore_2; goto END; ELSE: iconst_0; istore_2; END: return
        let code = vec![
            0x1b, 0x99, 0x00, 0x07, 0x1b, 0x3d, 0xa7, 0x00, 0x05, 0x03, 0x3d, 0xb1,
        ];
        let mut class_file = class_file_with_version(JAVA_5);
        let mut method = method_with_code(&mut class_file, "(I)V", code)?;
        let mut references = ReferenceMap::new();
        let mut nodes = structure_method(&mut class_file, &mut method, &mut references)?;
        assert_structured(&mut nodes);

        // var 2 is live across both branches, so it is declared before the if
        let position = nodes
            .iter()
            .position(|node| matches!(node.kind, NodeKind::IfElse { .. }))
            .expect("if/else");
        let NodeKind::IfElse {
            test,
            body,
            else_body,
        } = &nodes[position].kind
        else {
            panic!("expected if/else");
        };
        assert!(matches!(
            test.kind,
            NodeKind::If {
                condition: Condition::Ne,
                ..
            }
        ));
        assert_eq!(1, body.len());
        assert_eq!(1, else_body.len());
        Ok(())
    }

    #[test]
    fn test_ternary_end_to_end() -> Result<()> {
        // istore_2 = (iload_1 != 0) ? 1 : 0
        let code = vec![
            0x1b, 0x99, 0x00, 0x07, 0x04, 0xa7, 0x00, 0x04, 0x03, 0x3d, 0xb1,
        ];
        let mut class_file = class_file_with_version(JAVA_5);
        let mut method = method_with_code(&mut class_file, "(I)V", code)?;
        let mut references = ReferenceMap::new();
        let mut nodes = structure_method(&mut class_file, &mut method, &mut references)?;
        assert_structured(&mut nodes);

        assert_eq!(1, nodes.len());
        let NodeKind::Declare { store: Some(store), .. } = &nodes[0].kind else {
            panic!("expected declaration, found {}", nodes[0]);
        };
        let NodeKind::Store { value, .. } = &store.kind else {
            panic!("expected store");
        };
        assert!(matches!(value.kind, NodeKind::Ternary { .. }));
        Ok(())
    }

    #[test]
    fn test_goto_to_shared_return_duplicated() -> Result<()> {
        // iload_1; ifeq SKIP; iload_2; ireturn; SKIP: iload_3; ireturn
        let code = vec![0x1b, 0x99, 0x00, 0x05, 0x1c, 0xac, 0x1d, 0xac];
        let mut class_file = class_file_with_version(JAVA_5);
        let mut method = method_with_code(&mut class_file, "(III)I", code)?;
        let mut references = ReferenceMap::new();
        let mut nodes = structure_method(&mut class_file, &mut method, &mut references)?;
        assert_structured(&mut nodes);

        assert_eq!(2, nodes.len());
        let NodeKind::IfSimple { body, .. } = &nodes[0].kind else {
            panic!("expected if, found {}", nodes[0]);
        };
        assert!(matches!(body[0].kind, NodeKind::ValueReturn { .. }));
        assert!(matches!(nodes[1].kind, NodeKind::ValueReturn { .. }));
        Ok(())
    }
}
