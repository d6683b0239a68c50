use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Storage id: the stable identity of a device inside a device graph.
///
/// A device keeps its sid across graph copies and mutations; resizing or
/// reformatting a device never changes it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Sid(pub u32);

impl Display for Sid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sid:{}", self.0)
    }
}

/// Identifier of a planned device, used to map it back to the real device
/// once it has been created.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PlannedId(pub u32);

impl Display for PlannedId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "planned:{}", self.0)
    }
}

/// Hands out unique planned ids.
#[derive(Debug, Default)]
pub struct PlannedIdGenerator {
    next: u32,
}

impl PlannedIdGenerator {
    /// Creates a generator whose first id is `first`. Useful to avoid clashes
    /// with ids handed out by another generator.
    pub fn starting_at(first: u32) -> Self {
        Self { next: first }
    }

    pub fn next_id(&mut self) -> PlannedId {
        let id = PlannedId(self.next);
        self.next += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generator() {
        let mut ids = PlannedIdGenerator::default();
        assert_eq!(ids.next_id(), PlannedId(0));
        assert_eq!(ids.next_id(), PlannedId(1));

        let mut ids = PlannedIdGenerator::starting_at(1000);
        assert_eq!(ids.next_id(), PlannedId(1000));
    }

    #[test]
    fn test_display() {
        assert_eq!(Sid(42).to_string(), "sid:42");
        assert_eq!(PlannedId(7).to_string(), "planned:7");
    }
}
