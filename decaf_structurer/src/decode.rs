//! Bytecode decoding.
//!
//! Decodes the bytes of a `Code` attribute into a flat, offset-ordered list of [`Node`]s with a
//! simulated operand stack: expression opcodes stay on the stack and are folded into the operands
//! of the instruction that consumes them, so every list element is a statement. The offset of a
//! statement is the offset of its consuming opcode; branch targets may therefore point into the
//! middle of a statement's expression tree, which [`crate::node::index_at_or_after`] resolves to
//! the statement itself.
//!
//! `dup*` opcodes park the duplicated value in the list as a [`NodeKind::DupStore`] referenced by
//! [`NodeKind::DupLoad`] pseudo-nodes; exception handler entries push a
//! [`NodeKind::ExceptionLoad`]; `jsr` targets push a [`NodeKind::ReturnAddressLoad`]; an
//! unconditional branch taken with a live stack value parks it as a [`NodeKind::TernaryStore`].
//! The expression reconstructor battery later erases these pseudo-nodes.

use crate::error::Error::{InvalidOpcode, OperandStackUnderflow, UnexpectedInstruction};
use crate::error::Result;
use crate::node::{
    CompareKind, Condition, ConstValue, InvokeKind, InvokeNode, Node, NodeKind, RawSwitch,
    SwitchKind, SwitchPair, TypeKind,
};
use ahash::{AHashMap, AHashSet};
use byteorder::{BigEndian, ReadBytesExt};
use decaf_classfile::{
    Constant, ConstantPool, ExceptionTableEntry, LineNumberTable, LocalVariableTable,
    MethodDescriptor,
};
use std::io::Cursor;

/// Operand kinds of the `*load`/`*store` opcode families, in opcode order.
const LOAD_STORE_KINDS: [TypeKind; 5] = [
    TypeKind::Int,
    TypeKind::Long,
    TypeKind::Float,
    TypeKind::Double,
    TypeKind::Reference,
];

/// Conditions of the `ifeq`..`ifle` and `if_icmpeq`..`if_icmple` opcode families, in opcode order.
const BRANCH_CONDITIONS: [Condition; 6] = [
    Condition::Eq,
    Condition::Ne,
    Condition::Lt,
    Condition::Ge,
    Condition::Gt,
    Condition::Le,
];

/// Decode the bytes of a `Code` attribute into a flat statement list.
///
/// Synthetic local variable entries are created for slots the class file's table omits, and the
/// live ranges of synthetic entries grow as uses appear.
///
/// # Errors
///
/// Returns an error for invalid opcodes, malformed operands, or an out-of-balance operand stack.
pub(crate) fn decode(
    constant_pool: &ConstantPool,
    code: &[u8],
    exception_table: &[ExceptionTableEntry],
    line_numbers: &LineNumberTable,
    local_variables: &mut LocalVariableTable,
) -> Result<Vec<Node>> {
    let mut handler_types: AHashMap<i32, u16> = AHashMap::new();
    for entry in exception_table {
        handler_types
            .entry(entry.handler())
            .or_insert(entry.catch_type);
    }
    let jsr_targets = collect_jsr_targets(code)?;

    let mut decoder = Decoder {
        constant_pool,
        local_variables,
        list: Vec::new(),
        stack: Vec::new(),
    };
    let mut cursor = Cursor::new(code);
    while usize::try_from(cursor.position())? < code.len() {
        let offset = i32::try_from(cursor.position())?;
        let line = line_numbers.line_for_offset(offset);
        if let Some(type_index) = handler_types.get(&offset) {
            decoder.stack.push(Node::new(
                offset,
                line,
                NodeKind::ExceptionLoad {
                    type_index: *type_index,
                },
            ));
        }
        if jsr_targets.contains(&offset) {
            decoder
                .stack
                .push(Node::new(offset, line, NodeKind::ReturnAddressLoad));
        }
        let opcode = cursor.read_u8()?;
        decoder.decode_opcode(&mut cursor, opcode, offset, line)?;
    }
    Ok(decoder.list)
}

struct Decoder<'a> {
    constant_pool: &'a ConstantPool,
    local_variables: &'a mut LocalVariableTable,
    list: Vec<Node>,
    stack: Vec<Node>,
}

impl Decoder<'_> {
    fn pop(&mut self, offset: i32) -> Result<Node> {
        self.stack.pop().ok_or(OperandStackUnderflow(offset))
    }

    #[expect(clippy::too_many_lines)]
    fn decode_opcode(
        &mut self,
        cursor: &mut Cursor<&[u8]>,
        opcode: u8,
        offset: i32,
        line: i32,
    ) -> Result<()> {
        match opcode {
            // nop
            0 => {}
            // aconst_null
            1 => self.push_const(offset, line, ConstValue::Null),
            // iconst_m1 .. iconst_5
            2..=8 => self.push_const(offset, line, ConstValue::Int(i32::from(opcode) - 3)),
            // lconst_0, lconst_1
            9 | 10 => self.push_const(offset, line, ConstValue::Long(i64::from(opcode) - 9)),
            // fconst_0 .. fconst_2
            11..=13 => {
                let value = f32::from(opcode - 11);
                self.push_const(offset, line, ConstValue::Float(value));
            }
            // dconst_0, dconst_1
            14 | 15 => {
                let value = f64::from(opcode - 14);
                self.push_const(offset, line, ConstValue::Double(value));
            }
            // bipush
            16 => {
                let value = i32::from(cursor.read_i8()?);
                self.push_const(offset, line, ConstValue::Int(value));
            }
            // sipush
            17 => {
                let value = i32::from(cursor.read_i16::<BigEndian>()?);
                self.push_const(offset, line, ConstValue::Int(value));
            }
            // ldc
            18 => {
                let index = u16::from(cursor.read_u8()?);
                self.push_loaded_constant(offset, line, index)?;
            }
            // ldc_w, ldc2_w
            19 | 20 => {
                let index = cursor.read_u16::<BigEndian>()?;
                self.push_loaded_constant(offset, line, index)?;
            }
            // iload, lload, fload, dload, aload
            21..=25 => {
                let index = u16::from(cursor.read_u8()?);
                self.push_load(offset, line, LOAD_STORE_KINDS[usize::from(opcode - 21)], index);
            }
            // iload_0 .. aload_3
            26..=45 => {
                let kind = LOAD_STORE_KINDS[usize::from(opcode - 26) / 4];
                let index = u16::from((opcode - 26) % 4);
                self.push_load(offset, line, kind, index);
            }
            // iaload .. saload
            46..=53 => {
                let index = self.pop(offset)?;
                let array = self.pop(offset)?;
                self.stack.push(Node::new(
                    offset,
                    line,
                    NodeKind::ArrayLoad {
                        array: Box::new(array),
                        index: Box::new(index),
                    },
                ));
            }
            // istore, lstore, fstore, dstore, astore
            54..=58 => {
                let index = u16::from(cursor.read_u8()?);
                let kind = LOAD_STORE_KINDS[usize::from(opcode - 54)];
                self.append_store(cursor, offset, line, kind, index)?;
            }
            // istore_0 .. astore_3
            59..=78 => {
                let kind = LOAD_STORE_KINDS[usize::from(opcode - 59) / 4];
                let index = u16::from((opcode - 59) % 4);
                self.append_store(cursor, offset, line, kind, index)?;
            }
            // iastore .. sastore
            79..=86 => {
                let value = self.pop(offset)?;
                let index = self.pop(offset)?;
                let array = self.pop(offset)?;
                self.list.push(Node::new(
                    offset,
                    line,
                    NodeKind::ArrayStore {
                        array: Box::new(array),
                        index: Box::new(index),
                        value: Box::new(value),
                    },
                ));
            }
            // pop
            87 => {
                let value = self.pop(offset)?;
                self.list.push(Node::new(
                    offset,
                    line,
                    NodeKind::Pop {
                        value: Box::new(value),
                    },
                ));
            }
            // pop2
            88 => {
                let value = self.pop(offset)?;
                let category_2 = self.is_category_2(&value);
                self.list.push(Node::new(
                    offset,
                    line,
                    NodeKind::Pop {
                        value: Box::new(value),
                    },
                ));
                if !category_2 {
                    let value = self.pop(offset)?;
                    self.list.push(Node::new(
                        offset,
                        line,
                        NodeKind::Pop {
                            value: Box::new(value),
                        },
                    ));
                }
            }
            // dup
            89 => {
                let value = self.pop(offset)?;
                if matches!(value.kind, NodeKind::New { .. }) {
                    // new/dup/<init> idiom: keep both copies; the constructor call resolves them.
                    self.stack.push(value.clone());
                    self.stack.push(value);
                } else {
                    let dup_load = self.park_dup(offset, line, value);
                    self.stack.push(dup_load.clone());
                    self.stack.push(dup_load);
                }
            }
            // dup_x1
            90 => {
                let value_1 = self.pop(offset)?;
                let value_2 = self.pop(offset)?;
                let dup_load = self.park_dup(offset, line, value_1);
                self.stack.push(dup_load.clone());
                self.stack.push(value_2);
                self.stack.push(dup_load);
            }
            // dup_x2
            91 => {
                let value_1 = self.pop(offset)?;
                let value_2 = self.pop(offset)?;
                let dup_load = self.park_dup(offset, line, value_1);
                if self.is_category_2(&value_2) {
                    self.stack.push(dup_load.clone());
                    self.stack.push(value_2);
                } else {
                    let value_3 = self.pop(offset)?;
                    self.stack.push(dup_load.clone());
                    self.stack.push(value_3);
                    self.stack.push(value_2);
                }
                self.stack.push(dup_load);
            }
            // dup2
            92 => {
                let value_1 = self.pop(offset)?;
                if self.is_category_2(&value_1) {
                    let dup_load = self.park_dup(offset, line, value_1);
                    self.stack.push(dup_load.clone());
                    self.stack.push(dup_load);
                } else {
                    let value_2 = self.pop(offset)?;
                    let dup_load_2 = self.park_dup(offset, line, value_2);
                    let dup_load_1 = self.park_dup(offset, line, value_1);
                    self.stack.push(dup_load_2.clone());
                    self.stack.push(dup_load_1.clone());
                    self.stack.push(dup_load_2);
                    self.stack.push(dup_load_1);
                }
            }
            // dup2_x1, dup2_x2: only the long/double shuffle forms are produced by compilers
            93 | 94 => {
                let value_1 = self.pop(offset)?;
                let value_2 = self.pop(offset)?;
                let dup_load = self.park_dup(offset, line, value_1);
                if opcode == 94 && !self.is_category_2(&value_2) {
                    let value_3 = self.pop(offset)?;
                    self.stack.push(dup_load.clone());
                    self.stack.push(value_3);
                } else {
                    self.stack.push(dup_load.clone());
                }
                self.stack.push(value_2);
                self.stack.push(dup_load);
            }
            // swap
            95 => {
                let value_1 = self.pop(offset)?;
                let value_2 = self.pop(offset)?;
                self.stack.push(value_1);
                self.stack.push(value_2);
            }
            // iadd .. drem
            96..=115 => {
                let operator = match (opcode - 96) / 4 {
                    0 => crate::node::BinaryOperator::Add,
                    1 => crate::node::BinaryOperator::Sub,
                    2 => crate::node::BinaryOperator::Mul,
                    3 => crate::node::BinaryOperator::Div,
                    _ => crate::node::BinaryOperator::Rem,
                };
                self.push_binary(offset, line, operator)?;
            }
            // ineg .. dneg
            116..=119 => {
                let value = self.pop(offset)?;
                self.stack.push(Node::new(
                    offset,
                    line,
                    NodeKind::Neg {
                        value: Box::new(value),
                    },
                ));
            }
            // ishl .. lxor
            120..=131 => {
                let operator = match (opcode - 120) / 2 {
                    0 => crate::node::BinaryOperator::Shl,
                    1 => crate::node::BinaryOperator::Shr,
                    2 => crate::node::BinaryOperator::Ushr,
                    3 => crate::node::BinaryOperator::And,
                    4 => crate::node::BinaryOperator::Or,
                    _ => crate::node::BinaryOperator::Xor,
                };
                self.push_binary(offset, line, operator)?;
            }
            // iinc
            132 => {
                let index = u16::from(cursor.read_u8()?);
                let increment = i16::from(cursor.read_i8()?);
                self.append_iinc(cursor, offset, line, index, increment)?;
            }
            // i2l .. i2s
            133..=147 => {
                let target = match opcode {
                    133 | 143 => TypeKind::Long,
                    134 | 137 => TypeKind::Float,
                    135 | 138 | 141 => TypeKind::Double,
                    136 | 139 | 142 => TypeKind::Int,
                    140 => TypeKind::Long,
                    144 => TypeKind::Float,
                    145 => TypeKind::Byte,
                    146 => TypeKind::Char,
                    _ => TypeKind::Short,
                };
                let value = self.pop(offset)?;
                self.stack.push(Node::new(
                    offset,
                    line,
                    NodeKind::Convert {
                        target,
                        value: Box::new(value),
                    },
                ));
            }
            // lcmp, fcmpl, fcmpg, dcmpl, dcmpg
            148..=152 => {
                let kind = match opcode {
                    148 => CompareKind::Long,
                    149 => CompareKind::FloatL,
                    150 => CompareKind::FloatG,
                    151 => CompareKind::DoubleL,
                    _ => CompareKind::DoubleG,
                };
                let right = self.pop(offset)?;
                let left = self.pop(offset)?;
                self.stack.push(Node::new(
                    offset,
                    line,
                    NodeKind::Compare {
                        kind,
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                ));
            }
            // ifeq .. ifle
            153..=158 => {
                let delta = i32::from(cursor.read_i16::<BigEndian>()?);
                let value = self.pop(offset)?;
                self.list.push(Node::new(
                    offset,
                    line,
                    NodeKind::If {
                        condition: BRANCH_CONDITIONS[usize::from(opcode - 153)],
                        value: Box::new(value),
                        delta,
                    },
                ));
            }
            // if_icmpeq .. if_icmple, if_acmpeq, if_acmpne
            159..=166 => {
                let condition = if opcode <= 164 {
                    BRANCH_CONDITIONS[usize::from(opcode - 159)]
                } else if opcode == 165 {
                    Condition::Eq
                } else {
                    Condition::Ne
                };
                let delta = i32::from(cursor.read_i16::<BigEndian>()?);
                let right = self.pop(offset)?;
                let left = self.pop(offset)?;
                self.list.push(Node::new(
                    offset,
                    line,
                    NodeKind::IfCmp {
                        condition,
                        left: Box::new(left),
                        right: Box::new(right),
                        delta,
                    },
                ));
            }
            // goto
            167 => {
                let delta = i32::from(cursor.read_i16::<BigEndian>()?);
                self.append_goto(offset, line, delta);
            }
            // jsr
            168 => {
                let delta = i32::from(cursor.read_i16::<BigEndian>()?);
                self.list.push(Node::new(offset, line, NodeKind::Jsr { delta }));
            }
            // ret
            169 => {
                let index = u16::from(cursor.read_u8()?);
                self.append_ret(offset, line, index);
            }
            // tableswitch
            170 => {
                skip_switch_padding(cursor)?;
                let default_delta = cursor.read_i32::<BigEndian>()?;
                let low = cursor.read_i32::<BigEndian>()?;
                let high = cursor.read_i32::<BigEndian>()?;
                let mut pairs = Vec::new();
                for key in low..=high {
                    let delta = cursor.read_i32::<BigEndian>()?;
                    pairs.push(SwitchPair { key, delta });
                }
                let key = self.pop(offset)?;
                self.list.push(Node::new(
                    offset,
                    line,
                    NodeKind::Switch(Box::new(RawSwitch {
                        kind: SwitchKind::Int,
                        key,
                        default_delta,
                        pairs,
                    })),
                ));
            }
            // lookupswitch
            171 => {
                skip_switch_padding(cursor)?;
                let default_delta = cursor.read_i32::<BigEndian>()?;
                let pair_count = cursor.read_i32::<BigEndian>()?;
                let mut pairs = Vec::new();
                for _ in 0..pair_count {
                    let key = cursor.read_i32::<BigEndian>()?;
                    let delta = cursor.read_i32::<BigEndian>()?;
                    pairs.push(SwitchPair { key, delta });
                }
                let key = self.pop(offset)?;
                self.list.push(Node::new(
                    offset,
                    line,
                    NodeKind::Switch(Box::new(RawSwitch {
                        kind: SwitchKind::Int,
                        key,
                        default_delta,
                        pairs,
                    })),
                ));
            }
            // ireturn .. areturn
            172..=176 => {
                let value = self.pop(offset)?;
                self.list.push(Node::new(
                    offset,
                    line,
                    NodeKind::ValueReturn {
                        value: Box::new(value),
                    },
                ));
            }
            // return
            177 => self.list.push(Node::new(offset, line, NodeKind::Return)),
            // getstatic
            178 => {
                let field_index = cursor.read_u16::<BigEndian>()?;
                self.stack
                    .push(Node::new(offset, line, NodeKind::GetStatic { field_index }));
            }
            // putstatic
            179 => {
                let field_index = cursor.read_u16::<BigEndian>()?;
                let value = self.pop(offset)?;
                self.list.push(Node::new(
                    offset,
                    line,
                    NodeKind::PutStatic {
                        field_index,
                        value: Box::new(value),
                    },
                ));
            }
            // getfield
            180 => {
                let field_index = cursor.read_u16::<BigEndian>()?;
                let target = self.pop(offset)?;
                self.stack.push(Node::new(
                    offset,
                    line,
                    NodeKind::GetField {
                        field_index,
                        target: Box::new(target),
                    },
                ));
            }
            // putfield
            181 => {
                let field_index = cursor.read_u16::<BigEndian>()?;
                let value = self.pop(offset)?;
                let target = self.pop(offset)?;
                self.list.push(Node::new(
                    offset,
                    line,
                    NodeKind::PutField {
                        field_index,
                        target: Box::new(target),
                        value: Box::new(value),
                    },
                ));
            }
            // invokevirtual, invokespecial, invokestatic
            182..=184 => {
                let method_index = cursor.read_u16::<BigEndian>()?;
                let kind = match opcode {
                    182 => InvokeKind::Virtual,
                    183 => InvokeKind::Special,
                    _ => InvokeKind::Static,
                };
                self.append_invoke(offset, line, kind, method_index)?;
            }
            // invokeinterface
            185 => {
                let method_index = cursor.read_u16::<BigEndian>()?;
                let _count = cursor.read_u8()?;
                let _zero = cursor.read_u8()?;
                self.append_invoke(offset, line, InvokeKind::Interface, method_index)?;
            }
            // invokedynamic
            186 => {
                let method_index = cursor.read_u16::<BigEndian>()?;
                let _zero = cursor.read_u16::<BigEndian>()?;
                self.append_invoke(offset, line, InvokeKind::Dynamic, method_index)?;
            }
            // new
            187 => {
                let class_index = cursor.read_u16::<BigEndian>()?;
                self.stack
                    .push(Node::new(offset, line, NodeKind::New { class_index }));
            }
            // newarray
            188 => {
                let array_type = cursor.read_u8()?;
                let kind = match array_type {
                    4 => TypeKind::Boolean,
                    5 => TypeKind::Char,
                    6 => TypeKind::Float,
                    7 => TypeKind::Double,
                    8 => TypeKind::Byte,
                    9 => TypeKind::Short,
                    10 => TypeKind::Int,
                    11 => TypeKind::Long,
                    _ => {
                        return Err(InvalidOpcode {
                            opcode: array_type,
                            offset,
                        });
                    }
                };
                let count = self.pop(offset)?;
                self.stack.push(Node::new(
                    offset,
                    line,
                    NodeKind::NewArray {
                        kind,
                        count: Box::new(count),
                    },
                ));
            }
            // anewarray
            189 => {
                let class_index = cursor.read_u16::<BigEndian>()?;
                let count = self.pop(offset)?;
                self.stack.push(Node::new(
                    offset,
                    line,
                    NodeKind::ANewArray {
                        class_index,
                        count: Box::new(count),
                    },
                ));
            }
            // arraylength
            190 => {
                let array = self.pop(offset)?;
                self.stack.push(Node::new(
                    offset,
                    line,
                    NodeKind::ArrayLength {
                        array: Box::new(array),
                    },
                ));
            }
            // athrow
            191 => {
                let value = self.pop(offset)?;
                self.stack.clear();
                self.list.push(Node::new(
                    offset,
                    line,
                    NodeKind::Throw {
                        value: Box::new(value),
                    },
                ));
            }
            // checkcast
            192 => {
                let class_index = cursor.read_u16::<BigEndian>()?;
                let value = self.pop(offset)?;
                self.stack.push(Node::new(
                    offset,
                    line,
                    NodeKind::CheckCast {
                        class_index,
                        value: Box::new(value),
                    },
                ));
            }
            // instanceof
            193 => {
                let class_index = cursor.read_u16::<BigEndian>()?;
                let value = self.pop(offset)?;
                self.stack.push(Node::new(
                    offset,
                    line,
                    NodeKind::InstanceOf {
                        class_index,
                        value: Box::new(value),
                    },
                ));
            }
            // monitorenter
            194 => {
                let value = self.pop(offset)?;
                self.list.push(Node::new(
                    offset,
                    line,
                    NodeKind::MonitorEnter {
                        value: Box::new(value),
                    },
                ));
            }
            // monitorexit
            195 => {
                let value = self.pop(offset)?;
                self.list.push(Node::new(
                    offset,
                    line,
                    NodeKind::MonitorExit {
                        value: Box::new(value),
                    },
                ));
            }
            // wide
            196 => {
                let wide_opcode = cursor.read_u8()?;
                match wide_opcode {
                    21..=25 => {
                        let index = cursor.read_u16::<BigEndian>()?;
                        let kind = LOAD_STORE_KINDS[usize::from(wide_opcode - 21)];
                        self.push_load(offset, line, kind, index);
                    }
                    54..=58 => {
                        let index = cursor.read_u16::<BigEndian>()?;
                        let kind = LOAD_STORE_KINDS[usize::from(wide_opcode - 54)];
                        self.append_store(cursor, offset, line, kind, index)?;
                    }
                    132 => {
                        let index = cursor.read_u16::<BigEndian>()?;
                        let increment = cursor.read_i16::<BigEndian>()?;
                        self.append_iinc(cursor, offset, line, index, increment)?;
                    }
                    169 => {
                        let index = cursor.read_u16::<BigEndian>()?;
                        self.append_ret(offset, line, index);
                    }
                    _ => {
                        return Err(InvalidOpcode {
                            opcode: wide_opcode,
                            offset,
                        });
                    }
                }
            }
            // multianewarray
            197 => {
                let class_index = cursor.read_u16::<BigEndian>()?;
                let dimension_count = cursor.read_u8()?;
                let mut dimensions = Vec::new();
                for _ in 0..dimension_count {
                    dimensions.push(self.pop(offset)?);
                }
                dimensions.reverse();
                self.stack.push(Node::new(
                    offset,
                    line,
                    NodeKind::MultiANewArray {
                        class_index,
                        dimensions,
                    },
                ));
            }
            // ifnull, ifnonnull
            198 | 199 => {
                let condition = if opcode == 198 {
                    Condition::Eq
                } else {
                    Condition::Ne
                };
                let delta = i32::from(cursor.read_i16::<BigEndian>()?);
                let value = self.pop(offset)?;
                self.list.push(Node::new(
                    offset,
                    line,
                    NodeKind::IfCmp {
                        condition,
                        left: Box::new(value),
                        right: Box::new(Node::new(offset, line, NodeKind::Const(ConstValue::Null))),
                        delta,
                    },
                ));
            }
            // goto_w
            200 => {
                let delta = cursor.read_i32::<BigEndian>()?;
                self.append_goto(offset, line, delta);
            }
            // jsr_w
            201 => {
                let delta = cursor.read_i32::<BigEndian>()?;
                self.list.push(Node::new(offset, line, NodeKind::Jsr { delta }));
            }
            _ => return Err(InvalidOpcode { opcode, offset }),
        }
        Ok(())
    }

    fn push_const(&mut self, offset: i32, line: i32, value: ConstValue) {
        self.stack.push(Node::new(offset, line, NodeKind::Const(value)));
    }

    fn push_load(&mut self, offset: i32, line: i32, kind: TypeKind, index: u16) {
        self.local_variables.find_or_create(index, offset);
        self.stack
            .push(Node::new(offset, line, NodeKind::Load { kind, index }));
    }

    fn push_loaded_constant(&mut self, offset: i32, line: i32, index: u16) -> Result<()> {
        let value = match self.constant_pool.try_get(index)? {
            Constant::Integer(value) => ConstValue::Int(*value),
            Constant::Float(value) => ConstValue::Float(*value),
            Constant::Long(value) => ConstValue::Long(*value),
            Constant::Double(value) => ConstValue::Double(*value),
            Constant::String(_) => ConstValue::String(index),
            Constant::Class(_) => ConstValue::Class(index),
            _ => {
                return Err(UnexpectedInstruction {
                    name: "ldc",
                    offset,
                });
            }
        };
        self.push_const(offset, line, value);
        Ok(())
    }

    fn push_binary(
        &mut self,
        offset: i32,
        line: i32,
        operator: crate::node::BinaryOperator,
    ) -> Result<()> {
        let right = self.pop(offset)?;
        let left = self.pop(offset)?;
        self.stack.push(Node::new(
            offset,
            line,
            NodeKind::BinaryOp {
                operator,
                left: Box::new(left),
                right: Box::new(right),
            },
        ));
        Ok(())
    }

    /// Park a duplicated value in the list and return the `DupLoad` referencing it.
    fn park_dup(&mut self, offset: i32, line: i32, value: Node) -> Node {
        self.list.push(Node::new(
            offset,
            line,
            NodeKind::DupStore {
                value: Box::new(value),
            },
        ));
        Node::new(offset, line, NodeKind::DupLoad { store_offset: offset })
    }

    fn append_store(
        &mut self,
        cursor: &Cursor<&[u8]>,
        offset: i32,
        line: i32,
        kind: TypeKind,
        index: u16,
    ) -> Result<()> {
        let value = self.pop(offset)?;
        // The stored variable becomes live at the next instruction.
        let next_offset = i32::try_from(cursor.position())?;
        let variable = self.local_variables.find_or_create(index, next_offset);
        if matches!(value.kind, NodeKind::ExceptionLoad { .. } | NodeKind::ReturnAddressLoad) {
            variable.exception_or_return_address = true;
        }
        self.list.push(Node::new(
            offset,
            line,
            NodeKind::Store {
                kind,
                index,
                value: Box::new(value),
            },
        ));
        Ok(())
    }

    fn append_iinc(
        &mut self,
        cursor: &Cursor<&[u8]>,
        offset: i32,
        line: i32,
        index: u16,
        increment: i16,
    ) -> Result<()> {
        let next_offset = i32::try_from(cursor.position())?;
        self.local_variables.find_or_create(index, next_offset);
        self.list
            .push(Node::new(offset, line, NodeKind::Iinc { index, increment }));
        Ok(())
    }

    fn append_ret(&mut self, offset: i32, line: i32, index: u16) {
        let variable = self.local_variables.find_or_create(index, offset);
        variable.exception_or_return_address = true;
        self.list.push(Node::new(offset, line, NodeKind::Ret { index }));
    }

    fn append_goto(&mut self, offset: i32, line: i32, delta: i32) {
        // A live stack value across an unconditional branch is one arm of a ternary.
        if let Some(value) = self.stack.pop() {
            let value_offset = value.offset;
            let value_line = value.line;
            self.list.push(Node::new(
                value_offset,
                value_line,
                NodeKind::TernaryStore {
                    value: Box::new(value),
                },
            ));
        }
        self.list.push(Node::new(offset, line, NodeKind::Goto { delta }));
    }

    fn append_invoke(
        &mut self,
        offset: i32,
        line: i32,
        kind: InvokeKind,
        method_index: u16,
    ) -> Result<()> {
        let descriptor_text = match self.constant_pool.try_get(method_index)? {
            Constant::InvokeDynamic {
                name_and_type_index,
                ..
            } => {
                let (_name_index, descriptor_index) = self
                    .constant_pool
                    .try_get_name_and_type(*name_and_type_index)?;
                self.constant_pool.try_get_utf8(descriptor_index)?
            }
            _ => self.constant_pool.method_descriptor(method_index)?,
        };
        let descriptor = MethodDescriptor::parse(descriptor_text)?;
        let mut args = Vec::with_capacity(descriptor.parameters.len());
        for _ in 0..descriptor.parameters.len() {
            args.push(self.pop(offset)?);
        }
        args.reverse();
        let target = match kind {
            InvokeKind::Static | InvokeKind::Dynamic => None,
            _ => Some(Box::new(self.pop(offset)?)),
        };

        if kind == InvokeKind::Special {
            if let Some(target_node) = &target {
                if matches!(target_node.kind, NodeKind::New { .. })
                    && self.constant_pool.method_name(method_index)? == "<init>"
                {
                    let new_offset = target_node.offset;
                    let invoke = Node::new(
                        offset,
                        line,
                        NodeKind::Invoke(Box::new(InvokeNode {
                            kind: InvokeKind::Constructor,
                            method_index,
                            target,
                            args,
                        })),
                    );
                    // Resolve the duplicated `new` still on the stack, if any.
                    let duplicate = self.stack.iter_mut().rev().find(|node| {
                        node.offset == new_offset && matches!(node.kind, NodeKind::New { .. })
                    });
                    if let Some(duplicate) = duplicate {
                        *duplicate = invoke;
                    } else {
                        self.list.push(invoke);
                    }
                    return Ok(());
                }
            }
        }

        let invoke = Node::new(
            offset,
            line,
            NodeKind::Invoke(Box::new(InvokeNode {
                kind,
                method_index,
                target,
                args,
            })),
        );
        if descriptor.returns_void() {
            self.list.push(invoke);
        } else {
            self.stack.push(invoke);
        }
        Ok(())
    }

    /// Shallow operand category classification; used only to disambiguate the `dup2` family.
    fn is_category_2(&self, node: &Node) -> bool {
        match &node.kind {
            NodeKind::Const(ConstValue::Long(_) | ConstValue::Double(_)) => true,
            NodeKind::Load { kind, .. } | NodeKind::Convert { target: kind, .. } => {
                kind.is_category_2()
            }
            NodeKind::BinaryOp { left, .. } => self.is_category_2(left),
            NodeKind::Neg { value } => self.is_category_2(value),
            NodeKind::GetField { field_index, .. } | NodeKind::GetStatic { field_index } => {
                matches!(
                    self.constant_pool.field_descriptor(*field_index),
                    Ok("J" | "D")
                )
            }
            NodeKind::Invoke(invoke) => {
                let Ok(descriptor) = self.constant_pool.method_descriptor(invoke.method_index)
                else {
                    return false;
                };
                descriptor.ends_with(")J") || descriptor.ends_with(")D")
            }
            _ => false,
        }
    }
}

/// Skip the 0..=3 alignment padding bytes after a `tableswitch`/`lookupswitch` opcode.
fn skip_switch_padding(cursor: &mut Cursor<&[u8]>) -> Result<()> {
    while cursor.position() % 4 != 0 {
        let _padding = cursor.read_u8()?;
    }
    Ok(())
}

/// Collect the target offsets of every `jsr`/`jsr_w` in `code`; the decoder pushes a return
/// address when it reaches one of them.
fn collect_jsr_targets(code: &[u8]) -> Result<AHashSet<i32>> {
    let mut targets = AHashSet::new();
    let mut cursor = Cursor::new(code);
    while usize::try_from(cursor.position())? < code.len() {
        let offset = i32::try_from(cursor.position())?;
        let opcode = cursor.read_u8()?;
        match opcode {
            // jsr
            168 => {
                let delta = i32::from(cursor.read_i16::<BigEndian>()?);
                targets.insert(offset + delta);
            }
            // jsr_w
            201 => {
                let delta = cursor.read_i32::<BigEndian>()?;
                targets.insert(offset + delta);
            }
            // single byte operand
            16 | 18 | 21..=25 | 54..=58 | 169 | 188 => {
                let _operand = cursor.read_u8()?;
            }
            // two byte operand
            17 | 19 | 20 | 132 | 153..=167 | 178..=184 | 187 | 189 | 192 | 193 | 198 | 199 => {
                let _operand = cursor.read_u16::<BigEndian>()?;
            }
            // three byte operand
            197 => {
                let _operand = cursor.read_u16::<BigEndian>()?;
                let _dimensions = cursor.read_u8()?;
            }
            // four byte operand
            185 | 186 | 200 => {
                let _operand = cursor.read_u32::<BigEndian>()?;
            }
            // wide
            196 => {
                let wide_opcode = cursor.read_u8()?;
                let _index = cursor.read_u16::<BigEndian>()?;
                if wide_opcode == 132 {
                    let _increment = cursor.read_i16::<BigEndian>()?;
                }
            }
            // tableswitch
            170 => {
                skip_switch_padding(&mut cursor)?;
                let _default = cursor.read_i32::<BigEndian>()?;
                let low = cursor.read_i32::<BigEndian>()?;
                let high = cursor.read_i32::<BigEndian>()?;
                for _ in low..=high {
                    let _delta = cursor.read_i32::<BigEndian>()?;
                }
            }
            // lookupswitch
            171 => {
                skip_switch_padding(&mut cursor)?;
                let _default = cursor.read_i32::<BigEndian>()?;
                let pair_count = cursor.read_i32::<BigEndian>()?;
                for _ in 0..pair_count {
                    let _key = cursor.read_i32::<BigEndian>()?;
                    let _delta = cursor.read_i32::<BigEndian>()?;
                }
            }
            _ => {}
        }
    }
    Ok(targets)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::node::BinaryOperator;
    use decaf_classfile::LineNumberTable;

    fn decode_bytes(code: &[u8]) -> Result<Vec<Node>> {
        let constant_pool = ConstantPool::new();
        let mut local_variables = LocalVariableTable::new();
        decode(
            &constant_pool,
            code,
            &[],
            &LineNumberTable::new(),
            &mut local_variables,
        )
    }

    #[test]
    fn test_decode_store_and_branch() -> Result<()> {
        // iconst_0; istore_1; iload_1; bipush 10; if_icmpge +9; iinc 1 1; goto -9; return
        let code = [
            0x03, 0x3c, 0x1b, 0x10, 0x0a, 0xa2, 0x00, 0x09, 0x84, 0x01, 0x01, 0xa7, 0xff, 0xf7,
            0xb1,
        ];
        let list = decode_bytes(&code)?;
        assert_eq!(5, list.len());
        assert!(matches!(
            list[0].kind,
            NodeKind::Store {
                kind: TypeKind::Int,
                index: 1,
                ..
            }
        ));
        // iload_1 and bipush fold into the comparison
        assert_eq!(5, list[1].offset);
        let NodeKind::IfCmp {
            condition: Condition::Ge,
            ..
        } = &list[1].kind
        else {
            panic!("expected ifcmp, found {}", list[1]);
        };
        assert_eq!(Some(14), list[1].jump_target());
        assert!(matches!(
            list[2].kind,
            NodeKind::Iinc {
                index: 1,
                increment: 1
            }
        ));
        assert_eq!(Some(2), list[3].jump_target());
        assert!(matches!(list[4].kind, NodeKind::Return));
        Ok(())
    }

    #[test]
    fn test_decode_arithmetic_folds() -> Result<()> {
        // iload_1; iload_2; iadd; istore_3; return
        let code = [0x1b, 0x1c, 0x60, 0x3e, 0xb1];
        let list = decode_bytes(&code)?;
        assert_eq!(2, list.len());
        let NodeKind::Store { index: 3, value, .. } = &list[0].kind else {
            panic!("expected store, found {}", list[0]);
        };
        assert!(matches!(
            value.kind,
            NodeKind::BinaryOp {
                operator: BinaryOperator::Add,
                ..
            }
        ));
        Ok(())
    }

    #[test]
    fn test_decode_dup_parks_value() -> Result<()> {
        // iconst_1; dup; istore_1; istore_2; return
        let code = [0x04, 0x59, 0x3c, 0x3d, 0xb1];
        let list = decode_bytes(&code)?;
        assert_eq!(4, list.len());
        assert!(matches!(list[0].kind, NodeKind::DupStore { .. }));
        let NodeKind::Store { index: 1, value, .. } = &list[1].kind else {
            panic!("expected store, found {}", list[1]);
        };
        assert!(matches!(value.kind, NodeKind::DupLoad { store_offset: 1 }));
        Ok(())
    }

    #[test]
    fn test_decode_invoke_pops_descriptor_arguments() -> Result<()> {
        let mut constant_pool = ConstantPool::new();
        let method_index = constant_pool.add_method_ref("Foo", "bar", "(II)I")?;
        // aload_0; iconst_1; iconst_2; invokevirtual #m; pop; return
        let code = [
            0x2a,
            0x04,
            0x05,
            0xb6,
            0x00,
            u8::try_from(method_index).expect("method index"),
            0x57,
            0xb1,
        ];
        let mut local_variables = LocalVariableTable::new();
        let list = decode(
            &constant_pool,
            &code,
            &[],
            &LineNumberTable::new(),
            &mut local_variables,
        )?;
        assert_eq!(2, list.len());
        let NodeKind::Pop { value } = &list[0].kind else {
            panic!("expected pop, found {}", list[0]);
        };
        let NodeKind::Invoke(invoke) = &value.kind else {
            panic!("expected invoke");
        };
        assert_eq!(2, invoke.args.len());
        assert!(invoke.target.is_some());
        Ok(())
    }

    #[test]
    fn test_decode_ternary_parks_stack_value() -> Result<()> {
        // iload_1; ifeq +7; iconst_1; goto +4; iconst_0; istore_2; return
        let code = [
            0x1b, 0x99, 0x00, 0x07, 0x04, 0xa7, 0x00, 0x04, 0x03, 0x3d, 0xb1,
        ];
        let list = decode_bytes(&code)?;
        assert_eq!(5, list.len());
        assert!(matches!(list[0].kind, NodeKind::If { .. }));
        assert!(matches!(list[1].kind, NodeKind::TernaryStore { .. }));
        assert!(matches!(list[2].kind, NodeKind::Goto { .. }));
        assert!(matches!(list[3].kind, NodeKind::Store { index: 2, .. }));
        Ok(())
    }

    #[test]
    fn test_decode_invalid_opcode() {
        let result = decode_bytes(&[0xca]);
        assert_eq!(
            Err(InvalidOpcode {
                opcode: 0xca,
                offset: 0
            }),
            result
        );
    }

    #[test]
    fn test_collect_jsr_targets() -> Result<()> {
        // jsr +5; return; ...; astore_1; ret 1
        let code = [0xa8, 0x00, 0x05, 0xb1, 0x00, 0x4c, 0xa9, 0x01];
        let targets = collect_jsr_targets(&code)?;
        assert!(targets.contains(&5));
        assert_eq!(1, targets.len());
        Ok(())
    }
}
