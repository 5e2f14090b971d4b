//! # decaf classfile
//!
//! Decoded class file entity model for the decaf decompiler: the constant pool, method
//! descriptors, access flags, and the attribute tables (`LocalVariableTable`, `LineNumberTable`,
//! exception table) the structural reconstruction core consumes and mutates.
//!
//! Byte-level class file parsing is an upstream collaborator; these types model already decoded
//! entities. The constant pool is append-only so the analysis can introduce the UTF-8, class and
//! field reference entries it needs for inserted casts while keeping existing indices stable.
#![forbid(unsafe_code)]
#![allow(dead_code)]
#![deny(clippy::pedantic)]
#![deny(clippy::unwrap_in_result)]
#![deny(clippy::unwrap_used)]

mod class_file;
mod constant;
mod constant_pool;
mod descriptor;
mod error;
mod exception_table;
mod line_number;
mod local_variable;
mod method;
mod method_access_flags;
mod reference_map;

pub use class_file::{ClassFile, JAVA_1_1, JAVA_5, JAVA_7};
pub use constant::Constant;
pub use constant_pool::ConstantPool;
pub use descriptor::MethodDescriptor;
pub use error::{Error, Result};
pub use exception_table::ExceptionTableEntry;
pub use line_number::{LineNumberEntry, LineNumberTable};
pub use local_variable::{
    DeclarationState, LocalVariable, LocalVariableTable, UNKNOWN_LINE_NUMBER,
};
pub use method::Method;
pub use method_access_flags::MethodAccessFlags;
pub use reference_map::ReferenceMap;
