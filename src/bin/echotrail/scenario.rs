//! Scenario files: memories, clip durations, a location track, and scripted controls.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use echotrail::area::InMemoryStore;
use echotrail::memory::{Memory, UserLocation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum ControlAction {
    Skip,
    Mute,
    Unmute,
    Clear,
}

impl ControlAction {
    pub(crate) fn label(self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::Mute => "mute",
            Self::Unmute => "unmute",
            Self::Clear => "clear",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ScriptedControl {
    pub(crate) at_ms: u64,
    pub(crate) action: ControlAction,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Scenario {
    #[serde(default)]
    pub(crate) user_id: Option<String>,
    #[serde(default)]
    pub(crate) friends: Vec<String>,
    /// Overrides the configured fetch radius.
    #[serde(default)]
    pub(crate) radius_m: Option<f64>,
    #[serde(default)]
    pub(crate) memories: Vec<Memory>,
    /// Audio reference -> clip duration in ms. Unknown references fail to load.
    #[serde(default)]
    pub(crate) clips: HashMap<String, u64>,
    pub(crate) track: Vec<UserLocation>,
    #[serde(default)]
    pub(crate) controls: Vec<ScriptedControl>,
}

impl Scenario {
    pub(crate) fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let scenario = if is_json {
            Self::from_json(&content)
        } else {
            Self::from_yaml(&content)
        }
        .with_context(|| format!("invalid scenario {}", path.display()))?;
        Ok(scenario)
    }

    pub(crate) fn from_yaml(content: &str) -> Result<Self> {
        let mut scenario: Self = serde_norway::from_str(content)?;
        scenario.normalize()?;
        Ok(scenario)
    }

    pub(crate) fn from_json(content: &str) -> Result<Self> {
        let mut scenario: Self = serde_json::from_str(content)?;
        scenario.normalize()?;
        Ok(scenario)
    }

    pub(crate) fn store(&self) -> InMemoryStore {
        let mut store = InMemoryStore::new(self.memories.clone());
        if let Some(user) = self.user_id.as_deref() {
            for friend in &self.friends {
                store = store.with_friend(user, friend);
            }
        }
        store
    }

    fn normalize(&mut self) -> Result<()> {
        if self.track.is_empty() {
            bail!("scenario track has no location samples");
        }
        self.track.sort_by_key(|sample| sample.timestamp_ms);
        self.controls.sort_by_key(|control| control.at_ms);
        Ok(())
    }
}
