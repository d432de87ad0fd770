// src/control/phases.rs
//
// Signal phase identities. Emergency phases clear a whole corridor
// (both directions of the emergency approach) and are conflict-free by
// construction. Mapping a phase onto per-head signal symbols belongs to
// the signal-mapping layer, not here.

use crate::types::Approach;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PhaseType {
    NsThrough,
    EwThrough,
    EmergencyNs,
    EmergencyEw,
}

impl PhaseType {
    /// The corridor-clearing phase for an emergency on this approach.
    pub fn emergency_for(approach: Approach) -> PhaseType {
        match approach {
            Approach::North | Approach::South => PhaseType::EmergencyNs,
            Approach::East | Approach::West => PhaseType::EmergencyEw,
        }
    }

    pub fn is_emergency(&self) -> bool {
        matches!(self, PhaseType::EmergencyNs | PhaseType::EmergencyEw)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseType::NsThrough => "NS_THROUGH",
            PhaseType::EwThrough => "EW_THROUGH",
            PhaseType::EmergencyNs => "EMERGENCY_NS",
            PhaseType::EmergencyEw => "EMERGENCY_EW",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emergency_phase_per_approach() {
        assert_eq!(
            PhaseType::emergency_for(Approach::North),
            PhaseType::EmergencyNs
        );
        assert_eq!(
            PhaseType::emergency_for(Approach::South),
            PhaseType::EmergencyNs
        );
        assert_eq!(
            PhaseType::emergency_for(Approach::East),
            PhaseType::EmergencyEw
        );
        assert_eq!(
            PhaseType::emergency_for(Approach::West),
            PhaseType::EmergencyEw
        );
    }

    #[test]
    fn test_emergency_predicate() {
        assert!(PhaseType::EmergencyNs.is_emergency());
        assert!(!PhaseType::NsThrough.is_emergency());
    }
}
