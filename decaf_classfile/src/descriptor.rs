use crate::Error::InvalidMethodDescriptor;
use crate::error::Result;

/// A parsed method descriptor.
///
/// Parameters and the return type are kept as raw field descriptors (`I`, `J`,
/// `Ljava/lang/String;`, `[I`, ...); the structural analysis only needs counts, slot widths and a
/// few exact comparisons, so no further decoding is performed.
///
/// # Examples
///
/// ```rust
/// use decaf_classfile::MethodDescriptor;
///
/// let descriptor = MethodDescriptor::parse("(ILjava/lang/String;)V")?;
/// assert_eq!(2, descriptor.parameters.len());
/// assert!(descriptor.returns_void());
/// # Ok::<(), decaf_classfile::Error>(())
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct MethodDescriptor {
    pub parameters: Vec<String>,
    pub return_type: String,
}

impl MethodDescriptor {
    /// Parse a method descriptor.
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptor is not a valid method descriptor.
    pub fn parse(descriptor: &str) -> Result<MethodDescriptor> {
        let Some(parameters_descriptor) = descriptor.strip_prefix('(') else {
            return Err(InvalidMethodDescriptor(descriptor.to_string()));
        };
        let Some(end) = parameters_descriptor.find(')') else {
            return Err(InvalidMethodDescriptor(descriptor.to_string()));
        };
        let return_type = parameters_descriptor[end + 1..].to_string();
        if return_type.is_empty() {
            return Err(InvalidMethodDescriptor(descriptor.to_string()));
        }

        let mut parameters = Vec::new();
        let mut remaining = &parameters_descriptor[..end];
        while !remaining.is_empty() {
            let length = field_descriptor_length(remaining)
                .ok_or_else(|| InvalidMethodDescriptor(descriptor.to_string()))?;
            parameters.push(remaining[..length].to_string());
            remaining = &remaining[length..];
        }

        Ok(MethodDescriptor {
            parameters,
            return_type,
        })
    }

    /// Returns true if the method returns `void`.
    #[must_use]
    pub fn returns_void(&self) -> bool {
        self.return_type == "V"
    }

    /// The number of local variable slots occupied by the parameters; `long` and `double`
    /// parameters occupy two slots.
    #[must_use]
    pub fn parameter_slots(&self) -> u16 {
        let mut slots = 0;
        for parameter in &self.parameters {
            slots += if parameter == "J" || parameter == "D" {
                2
            } else {
                1
            };
        }
        slots
    }
}

/// Length in characters of the first field descriptor in `descriptor`, or `None` if it does not
/// start with a valid field descriptor.
fn field_descriptor_length(descriptor: &str) -> Option<usize> {
    let mut chars = descriptor.char_indices();
    loop {
        let (index, value) = chars.next()?;
        match value {
            'B' | 'C' | 'D' | 'F' | 'I' | 'J' | 'S' | 'Z' => return Some(index + 1),
            'L' => {
                let end = descriptor[index..].find(';')?;
                return Some(index + end + 1);
            }
            '[' => {}
            _ => return None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_empty() -> Result<()> {
        let descriptor = MethodDescriptor::parse("()V")?;
        assert!(descriptor.parameters.is_empty());
        assert!(descriptor.returns_void());
        assert_eq!(0, descriptor.parameter_slots());
        Ok(())
    }

    #[test]
    fn test_parse_parameters() -> Result<()> {
        let descriptor = MethodDescriptor::parse("(IJLjava/lang/String;[[D)Ljava/lang/Object;")?;
        assert_eq!(
            vec!["I", "J", "Ljava/lang/String;", "[[D"],
            descriptor.parameters
        );
        assert_eq!("Ljava/lang/Object;", descriptor.return_type);
        assert!(!descriptor.returns_void());
        // I=1, J=2, reference=1, array=1
        assert_eq!(5, descriptor.parameter_slots());
        Ok(())
    }

    #[test]
    fn test_parse_invalid() {
        for descriptor in ["", "()", "I)V", "(Q)V", "(Ljava/lang/String)V"] {
            assert!(
                MethodDescriptor::parse(descriptor).is_err(),
                "{descriptor} should not parse"
            );
        }
    }
}
