use std::fmt::Display;

use serde::{Deserialize, Serialize, Serializer, ser::SerializeSeq};
use thiserror::Error;

/// Effective premium tier after expiry has been applied. Ordered by generosity.
#[derive(
    Default, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    #[default]
    Free,
    Premium,
    PremiumPlus,
}

impl PlanTier {
    /// Dedicated bot instances an account on this tier may run at once.
    pub fn bot_slots(&self) -> u32 {
        match self {
            PlanTier::Free => 0,
            PlanTier::Premium | PlanTier::PremiumPlus => 1,
        }
    }

    pub fn feature_ceiling(&self) -> FeatureCeiling {
        match self {
            PlanTier::Free => FeatureCeiling {
                capabilities: CapabilitySet::EMPTY,
                max_volume: 100,
            },
            PlanTier::Premium => FeatureCeiling {
                capabilities: CapabilitySet::from_iter([
                    Capability::CustomName,
                    Capability::Autoplay,
                    Capability::VoteSkip,
                ]),
                max_volume: 150,
            },
            PlanTier::PremiumPlus => FeatureCeiling {
                capabilities: CapabilitySet::ALL,
                max_volume: 200,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Premium => "premium",
            PlanTier::PremiumPlus => "premium_plus",
        }
    }
}

impl Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    CustomName,
    Autoplay,
    VoteSkip,
    /// Stay connected without idle shutdown (24/7 mode).
    PersistentPresence,
}

impl Capability {
    pub const ALL: [Capability; 4] = [
        Capability::CustomName,
        Capability::Autoplay,
        Capability::VoteSkip,
        Capability::PersistentPresence,
    ];

    fn bit(self) -> u8 {
        match self {
            Capability::CustomName => 1 << 0,
            Capability::Autoplay => 1 << 1,
            Capability::VoteSkip => 1 << 2,
            Capability::PersistentPresence => 1 << 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::CustomName => "custom_name",
            Capability::Autoplay => "autoplay",
            Capability::VoteSkip => "vote_skip",
            Capability::PersistentPresence => "247",
        }
    }

    /// Accepts the snake_case names plus the legacy camelCase feature strings.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "custom_name" | "customName" => Some(Capability::CustomName),
            "autoplay" => Some(Capability::Autoplay),
            "vote_skip" | "voteSkip" => Some(Capability::VoteSkip),
            "247" | "enable247" | "persistent_presence" => Some(Capability::PersistentPresence),
            _ => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown plan feature: {0}")]
pub struct UnknownCapability(pub String);

/// Closed set of capabilities, stored as a bitmask.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CapabilitySet(u8);

impl CapabilitySet {
    pub const EMPTY: CapabilitySet = CapabilitySet(0);
    pub const ALL: CapabilitySet = CapabilitySet(0b1111);

    pub fn contains(&self, capability: Capability) -> bool {
        self.0 & capability.bit() != 0
    }

    pub fn with(self, capability: Capability) -> Self {
        CapabilitySet(self.0 | capability.bit())
    }

    pub fn union(self, other: CapabilitySet) -> Self {
        CapabilitySet(self.0 | other.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        Capability::ALL.into_iter().filter(|c| self.contains(*c))
    }

    /// Parses raw feature strings (e.g. `PremiumFeature.features`); any unknown entry is rejected.
    pub fn parse_features<I, S>(features: I) -> Result<Self, UnknownCapability>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        features.into_iter().try_fold(Self::EMPTY, |set, raw| {
            let raw = raw.as_ref();
            Capability::parse(raw)
                .map(|capability| set.with(capability))
                .ok_or_else(|| UnknownCapability(raw.to_string()))
        })
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<T: IntoIterator<Item = Capability>>(iter: T) -> Self {
        iter.into_iter().fold(Self::EMPTY, |set, c| set.with(c))
    }
}

impl Serialize for CapabilitySet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(None)?;
        for capability in self.iter() {
            seq.serialize_element(capability.as_str())?;
        }
        seq.end()
    }
}

/// Upper bound on what a running bot may do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeatureCeiling {
    pub capabilities: CapabilitySet,
    pub max_volume: u16,
}

impl FeatureCeiling {
    pub fn allows(&self, capability: Capability) -> bool {
        self.capabilities.contains(capability)
    }

    /// Most generous of two ceilings, used when an account plan and a guild plan both apply.
    pub fn most_generous(self, other: FeatureCeiling) -> FeatureCeiling {
        FeatureCeiling {
            capabilities: self.capabilities.union(other.capabilities),
            max_volume: self.max_volume.max(other.max_volume),
        }
    }

    pub fn clamp_volume(&self, requested: i32) -> u16 {
        let requested = u16::try_from(requested.max(0)).unwrap_or(u16::MAX);
        requested.min(self.max_volume)
    }
}

impl Default for FeatureCeiling {
    fn default() -> Self {
        PlanTier::Free.feature_ceiling()
    }
}
