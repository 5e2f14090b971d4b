use crate::Error::{ConstantPoolOverflow, InvalidConstantPoolIndex, InvalidConstantPoolIndexType};
use crate::constant::Constant;
use crate::error::Result;
use std::fmt;

/// Constant pool.
///
/// The pool is 1-based with a placeholder at index 0; `long` and `double` constants occupy two
/// slots. The pool is append-only: the structural analysis appends new UTF-8, `NameAndType`,
/// `Class` and `FieldRef` entries for inserted casts and rewritten accessors, and indices handed
/// out earlier remain stable.
///
/// # Examples
///
/// ```rust
/// use decaf_classfile::ConstantPool;
///
/// let mut constant_pool = ConstantPool::new();
/// let index = constant_pool.add_utf8("Hello")?;
/// assert_eq!("Hello", constant_pool.try_get_utf8(index)?);
/// # Ok::<(), decaf_classfile::Error>(())
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConstantPool {
    constants: Vec<ConstantEntry>,
}

/// A constant pool entry; the placeholder occupies index 0 and the second slot of `long` and
/// `double` constants.
#[derive(Clone, Debug, PartialEq)]
enum ConstantEntry {
    Constant(Constant),
    Placeholder,
}

impl ConstantPool {
    /// Create a new constant pool.
    #[must_use]
    pub fn new() -> Self {
        // The constant pool is 1-based, so the first entry is a placeholder.
        Self {
            constants: vec![ConstantEntry::Placeholder],
        }
    }

    /// The number of slots in the pool, including the leading placeholder.
    #[must_use]
    pub fn len(&self) -> usize {
        self.constants.len()
    }

    /// Returns true if the pool contains no constants.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.constants.len() <= 1
    }

    /// Add a constant to the pool, reusing an existing equal entry when one is present.
    ///
    /// # Errors
    ///
    /// If there are more than 65,534 slots in the pool.
    pub fn add(&mut self, constant: Constant) -> Result<u16> {
        for (index, entry) in self.constants.iter().enumerate() {
            if let ConstantEntry::Constant(existing) = entry {
                if *existing == constant {
                    return u16::try_from(index).map_err(|_| ConstantPoolOverflow);
                }
            }
        }
        let index = u16::try_from(self.constants.len()).map_err(|_| ConstantPoolOverflow)?;
        let wide = constant.is_wide();
        self.constants.push(ConstantEntry::Constant(constant));
        if wide {
            self.constants.push(ConstantEntry::Placeholder);
        }
        Ok(index)
    }

    /// Get a constant from the pool by index; indexes are 1-based.
    ///
    /// # Errors
    ///
    /// Returns an error if the index is out of bounds or refers to a placeholder slot.
    pub fn try_get(&self, index: u16) -> Result<&Constant> {
        match self.constants.get(index as usize) {
            Some(ConstantEntry::Constant(constant)) => Ok(constant),
            _ => Err(InvalidConstantPoolIndex(index)),
        }
    }

    /// Add a UTF-8 constant to the pool.
    ///
    /// # Errors
    ///
    /// If there are more than 65,534 slots in the pool.
    pub fn add_utf8<S: AsRef<str>>(&mut self, value: S) -> Result<u16> {
        self.add(Constant::Utf8(value.as_ref().to_string()))
    }

    /// Get a UTF-8 constant from the pool by index.
    ///
    /// # Errors
    ///
    /// Returns an error if the index is out of bounds or the constant is not a UTF-8 constant.
    pub fn try_get_utf8(&self, index: u16) -> Result<&str> {
        match self.try_get(index)? {
            Constant::Utf8(value) => Ok(value),
            _ => Err(InvalidConstantPoolIndexType(index)),
        }
    }

    /// Add an integer constant to the pool.
    ///
    /// # Errors
    ///
    /// If there are more than 65,534 slots in the pool.
    pub fn add_integer(&mut self, value: i32) -> Result<u16> {
        self.add(Constant::Integer(value))
    }

    /// Get an integer constant from the pool by index.
    ///
    /// # Errors
    ///
    /// Returns an error if the index is out of bounds or the constant is not an integer constant.
    pub fn try_get_integer(&self, index: u16) -> Result<i32> {
        match self.try_get(index)? {
            Constant::Integer(value) => Ok(*value),
            _ => Err(InvalidConstantPoolIndexType(index)),
        }
    }

    /// Add a class constant to the pool, adding the UTF-8 name entry as needed.
    ///
    /// # Errors
    ///
    /// If there are more than 65,534 slots in the pool.
    pub fn add_class<S: AsRef<str>>(&mut self, name: S) -> Result<u16> {
        let name_index = self.add_utf8(name)?;
        self.add(Constant::Class(name_index))
    }

    /// Get the name of a class constant from the pool by index.
    ///
    /// # Errors
    ///
    /// Returns an error if the index is out of bounds or the constant is not a class constant.
    pub fn try_get_class(&self, index: u16) -> Result<&str> {
        match self.try_get(index)? {
            Constant::Class(name_index) => self.try_get_utf8(*name_index),
            _ => Err(InvalidConstantPoolIndexType(index)),
        }
    }

    /// Add a string constant to the pool, adding the UTF-8 value entry as needed.
    ///
    /// # Errors
    ///
    /// If there are more than 65,534 slots in the pool.
    pub fn add_string<S: AsRef<str>>(&mut self, value: S) -> Result<u16> {
        let value_index = self.add_utf8(value)?;
        self.add(Constant::String(value_index))
    }

    /// Get the value of a string constant from the pool by index.
    ///
    /// # Errors
    ///
    /// Returns an error if the index is out of bounds or the constant is not a string constant.
    pub fn try_get_string(&self, index: u16) -> Result<&str> {
        match self.try_get(index)? {
            Constant::String(value_index) => self.try_get_utf8(*value_index),
            _ => Err(InvalidConstantPoolIndexType(index)),
        }
    }

    /// Add a name and type constant to the pool, adding the UTF-8 entries as needed.
    ///
    /// # Errors
    ///
    /// If there are more than 65,534 slots in the pool.
    pub fn add_name_and_type<S: AsRef<str>>(&mut self, name: S, descriptor: S) -> Result<u16> {
        let name_index = self.add_utf8(name)?;
        let descriptor_index = self.add_utf8(descriptor)?;
        self.add(Constant::NameAndType {
            name_index,
            descriptor_index,
        })
    }

    /// Get a name and type constant from the pool by index.
    ///
    /// # Errors
    ///
    /// Returns an error if the index is out of bounds or the constant is not a name and type
    /// constant.
    pub fn try_get_name_and_type(&self, index: u16) -> Result<(u16, u16)> {
        match self.try_get(index)? {
            Constant::NameAndType {
                name_index,
                descriptor_index,
            } => Ok((*name_index, *descriptor_index)),
            _ => Err(InvalidConstantPoolIndexType(index)),
        }
    }

    /// Add a field reference to the pool, adding the class and name and type entries as needed.
    ///
    /// # Errors
    ///
    /// If there are more than 65,534 slots in the pool.
    pub fn add_field_ref<S: AsRef<str>>(
        &mut self,
        class_name: S,
        field_name: S,
        field_type: S,
    ) -> Result<u16> {
        let class_index = self.add_class(class_name)?;
        let name_and_type_index = self.add_name_and_type(field_name, field_type)?;
        self.add(Constant::FieldRef {
            class_index,
            name_and_type_index,
        })
    }

    /// Get a field reference from the pool by index.
    ///
    /// # Errors
    ///
    /// Returns an error if the index is out of bounds or the constant is not a field reference.
    pub fn try_get_field_ref(&self, index: u16) -> Result<(u16, u16)> {
        match self.try_get(index)? {
            Constant::FieldRef {
                class_index,
                name_and_type_index,
            } => Ok((*class_index, *name_and_type_index)),
            _ => Err(InvalidConstantPoolIndexType(index)),
        }
    }

    /// Add a method reference to the pool, adding the class and name and type entries as needed.
    ///
    /// # Errors
    ///
    /// If there are more than 65,534 slots in the pool.
    pub fn add_method_ref<S: AsRef<str>>(
        &mut self,
        class_name: S,
        method_name: S,
        method_descriptor: S,
    ) -> Result<u16> {
        let class_index = self.add_class(class_name)?;
        let name_and_type_index = self.add_name_and_type(method_name, method_descriptor)?;
        self.add(Constant::MethodRef {
            class_index,
            name_and_type_index,
        })
    }

    /// Get a method or interface method reference from the pool by index.
    ///
    /// # Errors
    ///
    /// Returns an error if the index is out of bounds or the constant is not a method reference.
    pub fn try_get_method_ref(&self, index: u16) -> Result<(u16, u16)> {
        match self.try_get(index)? {
            Constant::MethodRef {
                class_index,
                name_and_type_index,
            }
            | Constant::InterfaceMethodRef {
                class_index,
                name_and_type_index,
            } => Ok((*class_index, *name_and_type_index)),
            _ => Err(InvalidConstantPoolIndexType(index)),
        }
    }

    /// Resolve the name of the field referenced by a field reference constant.
    ///
    /// # Errors
    ///
    /// Returns an error if the index chain does not resolve to a field reference.
    pub fn field_name(&self, field_ref_index: u16) -> Result<&str> {
        let (_class_index, name_and_type_index) = self.try_get_field_ref(field_ref_index)?;
        let (name_index, _descriptor_index) = self.try_get_name_and_type(name_and_type_index)?;
        self.try_get_utf8(name_index)
    }

    /// Resolve the descriptor of the field referenced by a field reference constant.
    ///
    /// # Errors
    ///
    /// Returns an error if the index chain does not resolve to a field reference.
    pub fn field_descriptor(&self, field_ref_index: u16) -> Result<&str> {
        let (_class_index, name_and_type_index) = self.try_get_field_ref(field_ref_index)?;
        let (_name_index, descriptor_index) = self.try_get_name_and_type(name_and_type_index)?;
        self.try_get_utf8(descriptor_index)
    }

    /// Resolve the name of the method referenced by a method reference constant.
    ///
    /// # Errors
    ///
    /// Returns an error if the index chain does not resolve to a method reference.
    pub fn method_name(&self, method_ref_index: u16) -> Result<&str> {
        let (_class_index, name_and_type_index) = self.try_get_method_ref(method_ref_index)?;
        let (name_index, _descriptor_index) = self.try_get_name_and_type(name_and_type_index)?;
        self.try_get_utf8(name_index)
    }

    /// Resolve the descriptor of the method referenced by a method reference constant.
    ///
    /// # Errors
    ///
    /// Returns an error if the index chain does not resolve to a method reference.
    pub fn method_descriptor(&self, method_ref_index: u16) -> Result<&str> {
        let (_class_index, name_and_type_index) = self.try_get_method_ref(method_ref_index)?;
        let (_name_index, descriptor_index) = self.try_get_name_and_type(name_and_type_index)?;
        self.try_get_utf8(descriptor_index)
    }

    /// Resolve the class name of the method referenced by a method reference constant.
    ///
    /// # Errors
    ///
    /// Returns an error if the index chain does not resolve to a method reference.
    pub fn method_class_name(&self, method_ref_index: u16) -> Result<&str> {
        let (class_index, _name_and_type_index) = self.try_get_method_ref(method_ref_index)?;
        self.try_get_class(class_index)
    }
}

impl fmt::Display for ConstantPool {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (index, entry) in self.constants.iter().enumerate() {
            if let ConstantEntry::Constant(constant) = entry {
                writeln!(f, "#{index} = {constant}")?;
            }
        }
        Ok(())
    }
}
