//! Bus access cycle costs.

use crate::AccessWidth;

/// Access forms with a fixed cycle cost on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessCostKind {
    /// One byte cycle, either a byte access or one lane of a decomposed access.
    ByteCycle,
    /// One atomic 16-bit device cycle.
    WordAtomic,
    /// One atomic 32-bit device cycle.
    DwordAtomic,
    /// Debugger or side-effect-free access.
    Debug,
}

impl AccessCostKind {
    /// Cost kind of a single atomic device cycle of `width`.
    #[must_use]
    pub const fn atomic(width: AccessWidth) -> Self {
        match width {
            AccessWidth::Byte => Self::ByteCycle,
            AccessWidth::Word => Self::WordAtomic,
            AccessWidth::Dword => Self::DwordAtomic,
        }
    }
}

/// Single source-of-truth cycle-cost table for bus access forms.
pub const ACCESS_COST_TABLE: &[(AccessCostKind, u16)] = &[
    (AccessCostKind::ByteCycle, 1),
    (AccessCostKind::WordAtomic, 1),
    (AccessCostKind::DwordAtomic, 2),
    (AccessCostKind::Debug, 0),
];

/// Looks up the cycle cost for an access-cost kind.
#[must_use]
pub fn cycle_cost(kind: AccessCostKind) -> Option<u16> {
    ACCESS_COST_TABLE
        .iter()
        .find_map(|(entry_kind, cycles)| (*entry_kind == kind).then_some(*cycles))
}

/// Cycle cost as the bus accumulates it; kinds missing from the table cost nothing.
#[must_use]
pub fn access_cycles(kind: AccessCostKind) -> u32 {
    cycle_cost(kind).map_or(0, u32::from)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::{access_cycles, cycle_cost, AccessCostKind, ACCESS_COST_TABLE};
    use crate::AccessWidth;

    #[test]
    fn table_contains_unique_kinds() {
        let kinds: HashSet<_> = ACCESS_COST_TABLE.iter().map(|(kind, _)| *kind).collect();
        assert_eq!(kinds.len(), ACCESS_COST_TABLE.len());
    }

    #[test]
    fn table_values_match_canonical_costs() {
        assert_eq!(cycle_cost(AccessCostKind::ByteCycle), Some(1));
        assert_eq!(cycle_cost(AccessCostKind::WordAtomic), Some(1));
        assert_eq!(cycle_cost(AccessCostKind::DwordAtomic), Some(2));
        assert_eq!(access_cycles(AccessCostKind::Debug), 0);
    }

    #[test]
    fn atomic_kind_follows_width() {
        assert_eq!(AccessCostKind::atomic(AccessWidth::Byte), AccessCostKind::ByteCycle);
        assert_eq!(AccessCostKind::atomic(AccessWidth::Word), AccessCostKind::WordAtomic);
        assert_eq!(AccessCostKind::atomic(AccessWidth::Dword), AccessCostKind::DwordAtomic);
    }

    #[test]
    fn every_table_entry_resolves_via_lookup() {
        for (kind, expected_cycles) in ACCESS_COST_TABLE {
            assert_eq!(cycle_cost(*kind), Some(*expected_cycles));
        }
    }
}
