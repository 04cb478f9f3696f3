//! Memory and location records as the scheduler sees them.
//!
//! Both types are owned by external collaborators (the memory store and the
//! location sampler). The engine only reads them.

use serde::{Deserialize, Serialize};

use crate::geo::Coordinates;

/// A geotagged audio note that can trigger playback inside its radius.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub radius_m: Option<f64>,
    #[serde(default)]
    pub audio_ref: Option<String>,
    pub owner_id: String,
    #[serde(default)]
    pub created_at_ms: u64,
    /// Normalized affect in `[0, 1]`.
    #[serde(default)]
    pub emotion: Option<f64>,
}

impl Memory {
    #[must_use]
    pub fn coordinates(&self) -> Option<Coordinates> {
        Coordinates::checked(self.latitude?, self.longitude?)
    }

    #[must_use]
    pub fn trigger_radius_m(&self) -> Option<f64> {
        self.radius_m.filter(|r| r.is_finite() && *r >= 0.0)
    }

    /// Audio reference, ignoring blank strings.
    #[must_use]
    pub fn playable_audio(&self) -> Option<&str> {
        self.audio_ref
            .as_deref()
            .map(str::trim)
            .filter(|audio| !audio.is_empty())
    }
}

/// One sample from the external location source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UserLocation {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub accuracy_m: f64,
    pub timestamp_ms: u64,
}

impl UserLocation {
    #[must_use]
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }
}

/// How the listening user relates to a memory's owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relationship {
    Owner,
    Friend,
    Public,
}

impl Relationship {
    /// Owner takes precedence when both flags are set.
    #[must_use]
    pub fn from_flags(is_owner: bool, is_friend: bool) -> Self {
        if is_owner {
            Self::Owner
        } else if is_friend {
            Self::Friend
        } else {
            Self::Public
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Friend => "friend",
            Self::Public => "public",
        }
    }
}
