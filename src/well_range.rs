//! Well labels such as `A1` or `l20` and the rectangular range between two
//! of them.

use std::fmt;
use std::str::FromStr;

use crate::spots::{row_name, row_number};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WellRangeError {
    #[error("invalid well label `{0}`, expected a row letter followed by a column number (e.g. A1)")]
    InvalidLabel(String),

    #[error("last well {last} comes before first well {first}")]
    Inverted { first: Well, last: Well },
}

/// A single well: 1-based row and column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Well {
    pub row: u32,
    pub column: u32,
}

impl fmt::Display for Well {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", row_name(self.row).to_ascii_uppercase(), self.column)
    }
}

impl FromStr for Well {
    type Err = WellRangeError;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        let invalid = || WellRangeError::InvalidLabel(label.to_string());
        let trimmed = label.trim();
        let split = trimmed
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(invalid)?;
        let (letters, digits) = trimmed.split_at(split);
        let row = row_number(letters).ok_or_else(invalid)?;
        let column: u32 = digits.parse().map_err(|_| invalid())?;
        if column == 0 {
            return Err(invalid());
        }
        Ok(Self { row, column })
    }
}

/// Rectangular block of wells from `first` to `last`, both included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WellRange {
    pub first: Well,
    pub last: Well,
}

impl WellRange {
    pub fn parse(first: &str, last: &str) -> Result<Self, WellRangeError> {
        let first: Well = first.parse()?;
        let last: Well = last.parse()?;
        if last.row < first.row || last.column < first.column {
            return Err(WellRangeError::Inverted { first, last });
        }
        Ok(Self { first, last })
    }

    pub fn row_count(&self) -> u32 {
        self.last.row - self.first.row + 1
    }

    pub fn column_count(&self) -> u32 {
        self.last.column - self.first.column + 1
    }

    /// Number of spots the detector should look for.
    pub fn spot_count(&self) -> usize {
        self.row_count() as usize * self.column_count() as usize
    }

    pub fn first_row_index(&self) -> u32 {
        self.first.row
    }

    pub fn first_column_index(&self) -> u32 {
        self.first.column
    }

    pub fn row_names(&self) -> Vec<String> {
        (self.first.row..=self.last.row).map(row_name).collect()
    }

    pub fn columns(&self) -> Vec<u32> {
        (self.first.column..=self.last.column).collect()
    }
}

impl fmt::Display for WellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.first, self.last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plate_range_counts() {
        let range = WellRange::parse("A1", "L20").unwrap();
        assert_eq!(range.row_count(), 12);
        assert_eq!(range.column_count(), 20);
        assert_eq!(range.spot_count(), 240);
        assert_eq!((range.first_row_index(), range.first_column_index()), (1, 1));
        assert_eq!(range.to_string(), "A1:L20");
    }

    #[test]
    fn offset_range_lists_labels() {
        let range = WellRange::parse("c5", " E7 ").unwrap();
        assert_eq!(range.row_names(), vec!["c", "d", "e"]);
        assert_eq!(range.columns(), vec![5, 6, 7]);
        assert_eq!((range.first_row_index(), range.first_column_index()), (3, 5));
    }

    #[test]
    fn malformed_labels_are_rejected() {
        for label in ["", "A", "12", "A0", "1A", "Ä3", "A1x"] {
            assert!(
                matches!(label.parse::<Well>(), Err(WellRangeError::InvalidLabel(_))),
                "{label}"
            );
        }
        assert_eq!("AA3".parse::<Well>().unwrap(), Well { row: 27, column: 3 });
    }

    #[test]
    fn inverted_range_is_rejected() {
        assert!(matches!(
            WellRange::parse("B4", "A6"),
            Err(WellRangeError::Inverted { .. })
        ));
        assert!(WellRange::parse("B4", "B3").is_err());
    }
}
