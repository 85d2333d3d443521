//! Byte-offset intervals over the source text

use serde::{Deserialize, Serialize};

/// Half-open `[start, end)` byte range
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Interval {
    pub start: usize,
    pub end: usize,
}

impl Interval {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "interval start {start} past end {end}");
        Self {
            start,
            end: end.max(start),
        }
    }

    /// Zero-length interval at `offset`
    pub fn empty_at(offset: usize) -> Self {
        Self {
            start: offset,
            end: offset,
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// `start <= offset < end`
    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }

    /// `start <= offset <= end`; a cursor right after the last character
    /// still touches the interval
    pub fn touches(&self, offset: usize) -> bool {
        self.start <= offset && offset <= self.end
    }

    /// Whether `other` lies entirely inside this interval
    pub fn covers(&self, other: &Interval) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Smallest interval spanning both
    pub fn hull(&self, other: &Interval) -> Interval {
        Interval::new(self.start.min(other.start), self.end.max(other.end))
    }

    /// Text covered by the interval, empty when out of range
    pub fn slice<'a>(&self, text: &'a str) -> &'a str {
        text.get(self.start..self.end).unwrap_or("")
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn containment_is_half_open() {
        let interval = Interval::new(3, 6);
        assert!(!interval.contains(2));
        assert!(interval.contains(3));
        assert!(interval.contains(5));
        assert!(!interval.contains(6));
        assert!(interval.touches(6));
        assert!(!interval.touches(7));
    }

    #[test]
    fn hull_and_cover() {
        let a = Interval::new(0, 4);
        let b = Interval::new(6, 9);
        let hull = a.hull(&b);
        assert_eq!(hull, Interval::new(0, 9));
        assert!(hull.covers(&a));
        assert!(hull.covers(&b));
        assert!(!a.overlaps(&b));
        assert_eq!(Interval::new(9, 14).slice("SELECT a FROM t"), "FROM ");
        assert_eq!(Interval::new(7, 99).slice("short"), "");
    }
}
