use crate::constant_pool::ConstantPool;
use crate::method::Method;
use ahash::AHashMap;
use indexmap::IndexMap;

/// Class file major version of Java 1.1.
pub const JAVA_1_1: u16 = 45;
/// Class file major version of Java 5; the first version with `ldc` of class constants and the
/// iterator based for-each lowering.
pub const JAVA_5: u16 = 49;
/// Class file major version of Java 7; the first version with the string switch lowering.
pub const JAVA_7: u16 = 51;

/// The decoded view of a class the structural analysis works against.
///
/// The constant pool is append-only during analysis. `switch_maps` is the registry of synthetic
/// `$SwitchMap$…` arrays: for each map field (keyed by the field name index) it records which enum
/// ordinal was assigned which case key in the initializer of the synthetic holder class.
#[derive(Clone, Debug, Default)]
pub struct ClassFile {
    pub major_version: u16,
    pub constant_pool: ConstantPool,
    pub methods: Vec<Method>,
    pub switch_maps: AHashMap<u16, IndexMap<i32, i32>>,
}

impl ClassFile {
    /// Create a class file view with the given major version.
    #[must_use]
    pub fn new(major_version: u16) -> Self {
        ClassFile {
            major_version,
            constant_pool: ConstantPool::new(),
            methods: Vec::new(),
            switch_maps: AHashMap::new(),
        }
    }

    /// Look up the ordinal a switch-map field maps to `case_key`.
    #[must_use]
    pub fn switch_map_ordinal(&self, field_name_index: u16, case_key: i32) -> Option<i32> {
        let map = self.switch_maps.get(&field_name_index)?;
        map.iter()
            .find(|(_ordinal, key)| **key == case_key)
            .map(|(ordinal, _key)| *ordinal)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_switch_map_ordinal() {
        let mut class_file = ClassFile::new(JAVA_7);
        let mut map = IndexMap::new();
        map.insert(0, 1);
        map.insert(2, 2);
        class_file.switch_maps.insert(7, map);
        assert_eq!(Some(0), class_file.switch_map_ordinal(7, 1));
        assert_eq!(Some(2), class_file.switch_map_ordinal(7, 2));
        assert_eq!(None, class_file.switch_map_ordinal(7, 3));
        assert_eq!(None, class_file.switch_map_ordinal(8, 1));
    }
}
