use ahash::AHashSet;

/// Sink for class names referenced during structural analysis.
///
/// The downstream renderer uses the collected names for import management; the analysis registers
/// every type it touches (caught exception classes, cast targets, allocated classes).
#[derive(Clone, Debug, Default)]
pub struct ReferenceMap {
    names: AHashSet<String>,
}

impl ReferenceMap {
    /// Create an empty reference map.
    #[must_use]
    pub fn new() -> Self {
        ReferenceMap {
            names: AHashSet::new(),
        }
    }

    /// Register an internal class name (`java/lang/String` form).
    pub fn add<S: AsRef<str>>(&mut self, name: S) {
        self.names.insert(name.as_ref().to_string());
    }

    /// Returns true if `name` has been registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// The number of registered names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns true if no names have been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Iterate over the registered names.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}
