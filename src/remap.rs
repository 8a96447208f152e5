use crate::record::{Role, RoleUtterance};
use crate::store::Utterance;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// How the A/B direction is chosen for each record.
#[derive(Debug, Deserialize, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoleMappingPolicy {
    /// A is always `speaker_a`.
    #[default]
    Fixed,
    /// Direction drawn from the build RNG, once per record.
    Random,
}

/// A bijection {A, B} -> {speaker_a, speaker_b}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleMapping {
    /// A -> speaker_a, B -> speaker_b
    Direct,
    /// A -> speaker_b, B -> speaker_a
    Swapped,
}

impl RoleMapping {
    pub fn choose<R: Rng + ?Sized>(policy: RoleMappingPolicy, rng: &mut R) -> Self {
        match policy {
            RoleMappingPolicy::Fixed => RoleMapping::Direct,
            RoleMappingPolicy::Random => {
                if rng.gen_bool(0.5) {
                    RoleMapping::Swapped
                } else {
                    RoleMapping::Direct
                }
            }
        }
    }

    pub fn speaker_for<'a>(&self, role: Role, speaker_a: &'a str, speaker_b: &'a str) -> &'a str {
        match (self, role) {
            (RoleMapping::Direct, Role::A) | (RoleMapping::Swapped, Role::B) => speaker_a,
            (RoleMapping::Direct, Role::B) | (RoleMapping::Swapped, Role::A) => speaker_b,
        }
    }

    pub fn apply(&self, turns: &[RoleUtterance], speaker_a: &str, speaker_b: &str) -> Vec<Utterance> {
        turns
            .iter()
            .map(|t| Utterance::new(self.speaker_for(t.role, speaker_a, speaker_b), t.text.clone()))
            .collect()
    }
}
