use crate::local_variable::UNKNOWN_LINE_NUMBER;

/// An entry of a decoded `LineNumberTable` attribute.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LineNumberEntry {
    pub start_pc: i32,
    pub line_number: i32,
}

/// The line number table of a method.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LineNumberTable {
    entries: Vec<LineNumberEntry>,
}

impl LineNumberTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        LineNumberTable {
            entries: Vec::new(),
        }
    }

    /// Create a table from `(start_pc, line_number)` pairs.
    #[must_use]
    pub fn from_pairs(pairs: &[(i32, i32)]) -> Self {
        let entries = pairs
            .iter()
            .map(|&(start_pc, line_number)| LineNumberEntry {
                start_pc,
                line_number,
            })
            .collect();
        LineNumberTable { entries }
    }

    /// Returns true if the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The line number of the entry with the greatest `start_pc` at or before `offset`, or
    /// [`UNKNOWN_LINE_NUMBER`] when there is none.
    #[must_use]
    pub fn line_for_offset(&self, offset: i32) -> i32 {
        let mut line_number = UNKNOWN_LINE_NUMBER;
        let mut best_start_pc = -1;
        for entry in &self.entries {
            if entry.start_pc <= offset && entry.start_pc >= best_start_pc {
                best_start_pc = entry.start_pc;
                line_number = entry.line_number;
            }
        }
        line_number
    }

    /// The greatest line number in the table, or [`UNKNOWN_LINE_NUMBER`] when the table is empty.
    #[must_use]
    pub fn max_line_number(&self) -> i32 {
        self.entries
            .iter()
            .map(|entry| entry.line_number)
            .max()
            .unwrap_or(UNKNOWN_LINE_NUMBER)
    }
}
