use crate::exception_table::ExceptionTableEntry;
use crate::line_number::LineNumberTable;
use crate::local_variable::LocalVariableTable;
use crate::method_access_flags::MethodAccessFlags;

/// A decoded method.
///
/// Carries the subset of the class file `method_info` structure the structural analysis consumes:
/// the `Code` attribute bytes together with its exception table and the decoded
/// `LineNumberTable`/`LocalVariableTable` attributes. Methods without a `Code` attribute
/// (`abstract`, `native`) have an empty `code`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Method {
    pub access_flags: MethodAccessFlags,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionTableEntry>,
    pub line_numbers: LineNumberTable,
    pub local_variables: LocalVariableTable,
    /// Set when the structural analysis of this method failed; any partially analyzed nodes are
    /// kept by the caller.
    pub contains_error: bool,
}

impl Method {
    /// Returns true if slot 0 holds `this` rather than the first parameter.
    #[must_use]
    pub fn has_this(&self) -> bool {
        !self.access_flags.contains(MethodAccessFlags::STATIC)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_has_this() {
        let mut method = Method::default();
        assert!(method.has_this());
        method.access_flags = MethodAccessFlags::STATIC;
        assert!(!method.has_this());
    }
}
