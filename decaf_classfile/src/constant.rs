use std::fmt;

/// A decoded constant pool entry.
///
/// Only the constant kinds the decompiler core consumes are modeled; the upstream class file
/// reader is responsible for decoding the raw pool. Reference kinds hold the indices of their
/// component entries, exactly as they appear in the class file.
///
/// # References
///
/// See: <https://docs.oracle.com/javase/specs/jvms/se25/html/jvms-4.html#jvms-4.4>
#[derive(Clone, Debug, PartialEq)]
pub enum Constant {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    /// Name index of the class
    Class(u16),
    /// Utf8 index of the string value
    String(u16),
    FieldRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    MethodRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    InterfaceMethodRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    NameAndType {
        name_index: u16,
        descriptor_index: u16,
    },
    InvokeDynamic {
        bootstrap_method_attr_index: u16,
        name_and_type_index: u16,
    },
}

impl Constant {
    /// Returns true for constants that occupy two constant pool slots (`long` and `double`).
    #[must_use]
    pub fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Constant::Utf8(value) => write!(f, "Utf8 {value}"),
            Constant::Integer(value) => write!(f, "Integer {value}"),
            Constant::Float(value) => write!(f, "Float {value}"),
            Constant::Long(value) => write!(f, "Long {value}"),
            Constant::Double(value) => write!(f, "Double {value}"),
            Constant::Class(index) => write!(f, "Class #{index}"),
            Constant::String(index) => write!(f, "String #{index}"),
            Constant::FieldRef {
                class_index,
                name_and_type_index,
            } => write!(f, "FieldRef #{class_index}.#{name_and_type_index}"),
            Constant::MethodRef {
                class_index,
                name_and_type_index,
            } => write!(f, "MethodRef #{class_index}.#{name_and_type_index}"),
            Constant::InterfaceMethodRef {
                class_index,
                name_and_type_index,
            } => write!(
                f,
                "InterfaceMethodRef #{class_index}.#{name_and_type_index}"
            ),
            Constant::NameAndType {
                name_index,
                descriptor_index,
            } => write!(f, "NameAndType #{name_index}:#{descriptor_index}"),
            Constant::InvokeDynamic {
                bootstrap_method_attr_index,
                name_and_type_index,
            } => write!(
                f,
                "InvokeDynamic #{bootstrap_method_attr_index}:#{name_and_type_index}"
            ),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_is_wide() {
        assert!(Constant::Long(42).is_wide());
        assert!(Constant::Double(42.1).is_wide());
        assert!(!Constant::Integer(42).is_wide());
        assert!(!Constant::Utf8("foo".to_string()).is_wide());
    }

    #[test]
    fn test_to_string() {
        assert_eq!("Utf8 foo", Constant::Utf8("foo".to_string()).to_string());
        assert_eq!("Integer 42", Constant::Integer(42).to_string());
        assert_eq!("Class #3", Constant::Class(3).to_string());
        assert_eq!(
            "FieldRef #1.#2",
            Constant::FieldRef {
                class_index: 1,
                name_and_type_index: 2
            }
            .to_string()
        );
    }
}
