use std::fmt;
use std::ops::Range;

/// A decoded `ExceptionTable` entry.
///
/// `catch_type` is the constant pool index of the caught class, or 0 for a catch-all entry
/// (`finally` handlers and `synchronized` cleanup handlers).
///
/// # References
///
/// See: <https://docs.oracle.com/javase/specs/jvms/se25/html/jvms-4.html#jvms-4.7.3>
#[derive(Clone, Debug, PartialEq)]
pub struct ExceptionTableEntry {
    pub range_pc: Range<u16>,
    pub handler_pc: u16,
    pub catch_type: u16,
}

impl ExceptionTableEntry {
    /// Create a new exception table entry.
    #[must_use]
    pub fn new(start_pc: u16, end_pc: u16, handler_pc: u16, catch_type: u16) -> Self {
        ExceptionTableEntry {
            range_pc: start_pc..end_pc,
            handler_pc,
            catch_type,
        }
    }

    /// The protected range start as a signed offset.
    #[must_use]
    pub fn start(&self) -> i32 {
        i32::from(self.range_pc.start)
    }

    /// The protected range end (exclusive) as a signed offset.
    #[must_use]
    pub fn end(&self) -> i32 {
        i32::from(self.range_pc.end)
    }

    /// The handler offset as a signed offset.
    #[must_use]
    pub fn handler(&self) -> i32 {
        i32::from(self.handler_pc)
    }

    /// Returns true for catch-all entries (`catch_type` 0).
    #[must_use]
    pub fn is_catch_all(&self) -> bool {
        self.catch_type == 0
    }
}

impl fmt::Display for ExceptionTableEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "start_pc: {}, end_pc: {}, handler_pc: {}, catch_type: {}",
            self.range_pc.start, self.range_pc.end, self.handler_pc, self.catch_type
        )
    }
}
