use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

pub(crate) const VITAL_MIN: f64 = 0.0;
pub(crate) const VITAL_MAX: f64 = 100.0;
pub(crate) const VITAL_DEFAULT: f64 = 50.0;

pub(crate) fn clamp_vital(v: f64) -> f64 {
    if v.is_nan() {
        return VITAL_MIN;
    }
    v.clamp(VITAL_MIN, VITAL_MAX)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Emotion {
    Happy,
    Neutral,
    Sad,
}

impl Emotion {
    /// Strictly above 80 is happy, strictly below 30 is sad.
    pub(crate) fn from_happiness(happiness: f64) -> Self {
        if happiness > 80.0 {
            Emotion::Happy
        } else if happiness < 30.0 {
            Emotion::Sad
        } else {
            Emotion::Neutral
        }
    }

    pub(crate) fn name(self) -> &'static str {
        match self {
            Emotion::Happy => "happy",
            Emotion::Neutral => "neutral",
            Emotion::Sad => "sad",
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum ActionToken {
    Eating,
    Playing,
    Cleaning,
    Sleeping,
    Learning,
    Myob,
}

impl ActionToken {
    pub(crate) fn name(self) -> &'static str {
        match self {
            ActionToken::Eating => "eating",
            ActionToken::Playing => "playing",
            ActionToken::Cleaning => "cleaning",
            ActionToken::Sleeping => "sleeping",
            ActionToken::Learning => "learning",
            ActionToken::Myob => "myob",
        }
    }
}

impl fmt::Display for ActionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct Vitals {
    pub(crate) hunger: f64,
    pub(crate) happiness: f64,
    pub(crate) energy: f64,
    pub(crate) health: f64,
    pub(crate) love: f64,
}

impl Default for Vitals {
    fn default() -> Self {
        Self {
            hunger: VITAL_DEFAULT,
            happiness: VITAL_DEFAULT,
            energy: VITAL_DEFAULT,
            health: VITAL_DEFAULT,
            love: VITAL_DEFAULT,
        }
    }
}

impl Vitals {
    pub(crate) fn clamped(self) -> Self {
        Self {
            hunger: clamp_vital(self.hunger),
            happiness: clamp_vital(self.happiness),
            energy: clamp_vital(self.energy),
            health: clamp_vital(self.health),
            love: clamp_vital(self.love),
        }
    }

    pub(crate) fn apply(self, d: &VitalsDelta) -> Self {
        Self {
            hunger: self.hunger + d.hunger,
            happiness: self.happiness + d.happiness,
            energy: self.energy + d.energy,
            health: self.health + d.health,
            love: self.love + d.love,
        }
        .clamped()
    }
}

/// Signed per-vital adjustment.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) struct VitalsDelta {
    pub(crate) hunger: f64,
    pub(crate) happiness: f64,
    pub(crate) energy: f64,
    pub(crate) health: f64,
    pub(crate) love: f64,
}

/// Point-in-time read of the pet, also the `metrics` field of sync messages.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct Metrics {
    pub(crate) hunger: f64,
    pub(crate) happiness: f64,
    pub(crate) energy: f64,
    pub(crate) health: f64,
    pub(crate) love: f64,
    /// Whole days.
    pub(crate) age: u32,
    pub(crate) emotion: Emotion,
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics::from_vitals(&Vitals::default(), 0.0)
    }
}

impl Metrics {
    pub(crate) fn from_vitals(v: &Vitals, age: f64) -> Self {
        Self {
            hunger: v.hunger,
            happiness: v.happiness,
            energy: v.energy,
            health: v.health,
            love: v.love,
            age: age.max(0.0).floor() as u32,
            emotion: Emotion::from_happiness(v.happiness),
        }
    }

    pub(crate) fn bars(&self) -> [(&'static str, f64); 5] {
        [
            ("Hunger", self.hunger),
            ("Happy ", self.happiness),
            ("Energy", self.energy),
            ("Health", self.health),
            ("Love  ", self.love),
        ]
    }
}

pub(crate) fn percent(v: f64) -> u8 {
    clamp_vital(v).floor() as u8
}

fn default_vital() -> f64 {
    VITAL_DEFAULT
}

// A field holding the wrong type falls back on its own instead of failing
// the whole record.
fn lenient_vital<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    Ok(serde_json::Value::deserialize(d)?.as_f64().unwrap_or(VITAL_DEFAULT))
}

fn lenient_age<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    Ok(serde_json::Value::deserialize(d)?.as_f64().unwrap_or(0.0))
}

fn lenient_millis<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
    let v = serde_json::Value::deserialize(d)?;
    Ok(v.as_i64().and_then(DateTime::from_timestamp_millis))
}

/// The single flat record written to disk. Every field defaults on its own
/// so a partially written or older file still loads.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SaveRecord {
    #[serde(default = "default_vital", deserialize_with = "lenient_vital")]
    pub(crate) hunger: f64,
    #[serde(default = "default_vital", deserialize_with = "lenient_vital")]
    pub(crate) happiness: f64,
    #[serde(default = "default_vital", deserialize_with = "lenient_vital")]
    pub(crate) energy: f64,
    #[serde(default = "default_vital", deserialize_with = "lenient_vital")]
    pub(crate) health: f64,
    #[serde(default = "default_vital", deserialize_with = "lenient_vital")]
    pub(crate) love: f64,
    #[serde(default, deserialize_with = "lenient_age")]
    pub(crate) age: f64,
    #[serde(
        default,
        serialize_with = "chrono::serde::ts_milliseconds_option::serialize",
        deserialize_with = "lenient_millis"
    )]
    pub(crate) last_tick: Option<DateTime<Utc>>,
}

impl Default for SaveRecord {
    fn default() -> Self {
        Self::from_parts(&Vitals::default(), 0.0, None)
    }
}

impl SaveRecord {
    pub(crate) fn from_parts(v: &Vitals, age: f64, last_tick: Option<DateTime<Utc>>) -> Self {
        Self {
            hunger: v.hunger,
            happiness: v.happiness,
            energy: v.energy,
            health: v.health,
            love: v.love,
            age,
            last_tick,
        }
    }

    pub(crate) fn vitals(&self) -> Vitals {
        Vitals {
            hunger: self.hunger,
            happiness: self.happiness,
            energy: self.energy,
            health: self.health,
            love: self.love,
        }
        .clamped()
    }
}
