//! # decaf structurer
//!
//! Structural reconstruction core of the decaf decompiler: converts the flat bytecode of a method
//! into a nested tree of control flow statements (`if`/`if-else`, `while`/`do-while`/`for`,
//! for-each over arrays and iterators, infinite loops, integer/enum/string `switch`,
//! `try`/`catch`/`finally` including the 1.1-era `jsr` subroutine form, and `synchronized`
//! blocks) with break/continue/labeled-break generation, local variable declaration placement
//! and redundant instruction elimination.
//!
//! The pipeline per method: decode the `Code` bytes into an operand-folded statement list,
//! aggregate the exception table into protected regions and build their blocks innermost-first,
//! run the ordered battery of expression reconstructors, recognize loops, switches and
//! conditionals, place declarations, rewrite the remaining jumps and insert labels. Analysis is
//! single threaded per method and errors never escape a method: failed methods are marked and
//! their partial result kept.
#![forbid(unsafe_code)]
#![allow(dead_code)]
#![deny(clippy::pedantic)]
#![deny(clippy::unwrap_in_result)]
#![deny(clippy::unwrap_used)]

mod analyze;
mod declaration;
mod decode;
mod error;
mod exception;
mod labels;
mod node;
mod reconstruct;
mod structurer;
mod synchronized_block;
mod try_block;

pub use error::{Error, Result};
pub use node::{
    BinaryOperator, CatchClause, CompareKind, Condition, ConstValue, InvokeKind, InvokeNode, Node,
    NodeKind, RawSwitch, SwitchBlock, SwitchCase, SwitchKind, SwitchPair, TryBlock, TypeKind,
    first_offset, index_at_or_after, last_offset, walk_list_mut, walk_mut,
};
pub use structurer::{MethodStructure, structure_class, structure_method};
