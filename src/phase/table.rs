use std::collections::HashSet;
use std::ops::BitOr;

use crate::foundation::{
    core::PhaseId,
    error::{FrameplanError, FrameplanResult},
};

/// A single named trait a phase can carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseTrait {
    /// Tasks are stable-sorted by ascending priority before execution.
    Sorted,
}

impl PhaseTrait {
    const ALL: [PhaseTrait; 1] = [PhaseTrait::Sorted];

    fn bit(self) -> u32 {
        match self {
            PhaseTrait::Sorted => 1 << 0,
        }
    }
}

/// Bitset of [`PhaseTrait`] values.
///
/// Serialized as a list of trait names, e.g. `["sorted"]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(from = "Vec<PhaseTrait>", into = "Vec<PhaseTrait>")]
pub struct PhaseTraits(u32);

impl PhaseTraits {
    /// No traits.
    pub const NONE: Self = Self(0);
    /// See [`PhaseTrait::Sorted`].
    pub const SORTED: Self = Self(1 << 0);

    /// Raw bits.
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Return `true` when every bit in `other` is set in `self`.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Set every bit of `other`.
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Shorthand for `contains(PhaseTraits::SORTED)`.
    pub fn is_sorted(self) -> bool {
        self.contains(Self::SORTED)
    }
}

impl BitOr for PhaseTraits {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl From<PhaseTrait> for PhaseTraits {
    fn from(t: PhaseTrait) -> Self {
        Self(t.bit())
    }
}

impl From<Vec<PhaseTrait>> for PhaseTraits {
    fn from(list: Vec<PhaseTrait>) -> Self {
        list.into_iter().fold(Self::NONE, |acc, t| acc | Self::from(t))
    }
}

impl From<PhaseTraits> for Vec<PhaseTrait> {
    fn from(traits: PhaseTraits) -> Self {
        PhaseTrait::ALL
            .into_iter()
            .filter(|t| traits.contains(PhaseTraits::from(*t)))
            .collect()
    }
}

/// Static description of one execution phase.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PhaseDesc {
    /// Human-readable phase name, unique within a table.
    pub name: String,
    /// Traits controlling consolidation of this phase.
    #[serde(default)]
    pub traits: PhaseTraits,
}

impl PhaseDesc {
    /// Create a descriptor with explicit traits.
    pub fn new(name: impl Into<String>, traits: PhaseTraits) -> Self {
        Self {
            name: name.into(),
            traits,
        }
    }

    /// Create a phase whose tasks run in submission order.
    pub fn unsorted(name: impl Into<String>) -> Self {
        Self::new(name, PhaseTraits::NONE)
    }

    /// Create a phase whose tasks run in ascending priority order.
    pub fn sorted(name: impl Into<String>) -> Self {
        Self::new(name, PhaseTraits::SORTED)
    }
}

/// Ordered, validated list of phases.
///
/// The position of a descriptor is its [`PhaseId`]; `execute_all` visits phases in this order.
/// A table is never empty and phase names are unique.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "Vec<PhaseDesc>", into = "Vec<PhaseDesc>")]
pub struct PhaseTable {
    phases: Vec<PhaseDesc>,
}

impl PhaseTable {
    /// Build and validate a table.
    pub fn new(phases: Vec<PhaseDesc>) -> FrameplanResult<Self> {
        if phases.is_empty() {
            return Err(FrameplanError::validation(
                "phase table must contain at least one phase",
            ));
        }
        if u32::try_from(phases.len()).is_err() {
            return Err(FrameplanError::validation("phase table is too large"));
        }

        let mut seen = HashSet::with_capacity(phases.len());
        for p in &phases {
            if p.name.trim().is_empty() {
                return Err(FrameplanError::validation("phase name must be non-empty"));
            }
            if !seen.insert(p.name.as_str()) {
                return Err(FrameplanError::validation(format!(
                    "duplicate phase name '{}'",
                    p.name
                )));
            }
        }

        Ok(Self { phases })
    }

    /// Parse a table from a JSON array of descriptors.
    pub fn from_json_str(s: &str) -> FrameplanResult<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// Number of phases.
    pub fn len(&self) -> usize {
        self.phases.len()
    }

    /// Always `false` for a validated table.
    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    /// Descriptor for `id`, if it exists.
    pub fn get(&self, id: PhaseId) -> Option<&PhaseDesc> {
        self.phases.get(id.index())
    }

    /// Return `true` when `id` names a phase of this table.
    pub fn contains(&self, id: PhaseId) -> bool {
        id.index() < self.phases.len()
    }

    /// Look up a phase by name.
    pub fn id_of(&self, name: &str) -> Option<PhaseId> {
        self.phases
            .iter()
            .position(|p| p.name == name)
            .map(|i| PhaseId(i as u32))
    }

    /// Phase ids in execution order.
    pub fn ids(&self) -> impl Iterator<Item = PhaseId> + '_ {
        (0..self.phases.len()).map(|i| PhaseId(i as u32))
    }

    /// `(id, descriptor)` pairs in execution order.
    pub fn iter(&self) -> impl Iterator<Item = (PhaseId, &PhaseDesc)> + '_ {
        self.phases
            .iter()
            .enumerate()
            .map(|(i, p)| (PhaseId(i as u32), p))
    }
}

impl TryFrom<Vec<PhaseDesc>> for PhaseTable {
    type Error = FrameplanError;

    fn try_from(phases: Vec<PhaseDesc>) -> FrameplanResult<Self> {
        Self::new(phases)
    }
}

impl From<PhaseTable> for Vec<PhaseDesc> {
    fn from(table: PhaseTable) -> Self {
        table.phases
    }
}

#[cfg(test)]
#[path = "../../tests/unit/phase/table.rs"]
mod tests;
