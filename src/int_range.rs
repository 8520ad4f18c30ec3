use std::fmt;

use serde::{Deserialize, Serialize};

/// A simple type for integer ranges
///
/// All ranges follow the bed file range convention: 0-indexed, half-closed, [start,end)
///
#[derive(Clone, Deserialize, Eq, PartialEq, Ord, PartialOrd, Serialize)]
pub struct IntRange {
    pub start: i64,
    pub end: i64,
}

impl IntRange {
    pub fn from_pair(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    pub fn size(&self) -> i64 {
        self.end - self.start
    }

    pub fn center(&self) -> i64 {
        (self.start + self.end) / 2
    }

    /// Return true if pos intersects range (adjacency does not count)
    ///
    pub fn intersect_pos(&self, pos: i64) -> bool {
        pos >= self.start && pos < self.end
    }

    /// Return true if the ranges intersect (adjacency does not count)
    ///
    pub fn intersect_range(&self, other: &IntRange) -> bool {
        other.end > self.start && other.start < self.end
    }
}

impl fmt::Debug for IntRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}-{})", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intersect() {
        let r1 = IntRange::from_pair(1, 4);
        let r2 = IntRange::from_pair(4, 8);
        let r3 = IntRange::from_pair(3, 9);

        assert!(!r1.intersect_range(&r2));
        assert!(r1.intersect_range(&r3));
        assert!(r3.intersect_pos(3));
        assert!(!r3.intersect_pos(9));
    }
}
