//! Selectable entities and the step-scoped lists that hold them.

use crate::selection::Fingerprint;
use crate::step::StepId;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a remote entity.
///
/// The remote API is not consistent about numeric vs string ids, so both are normalised
/// into their textual form.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Date and start time of an appointment slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotTime {
    pub date: NaiveDate,
    pub time: NaiveTime,
}

impl fmt::Display for SlotTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.date.format("%Y-%m-%d"), self.time.format("%H:%M"))
    }
}

/// One selectable entity in a step's choice list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub id: EntityId,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<SlotTime>,
}

impl Choice {
    /// A plain id/label choice.
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: EntityId::new(id),
            label: label.into(),
            location: None,
            price: None,
            slot: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_slot(mut self, slot: SlotTime) -> Self {
        self.slot = Some(slot);
        self
    }

    /// Converts one element of a remote JSON collection into a choice for `step`.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem when the entity has no usable label, a price that
    /// is not a non-negative number, or (for slots) a missing/invalid date or time.
    pub fn from_remote(step: StepId, entity: RemoteEntity) -> Result<Self, String> {
        let id = match entity.id {
            Some(RawId::Text(s)) if !s.trim().is_empty() => s.trim().to_owned(),
            Some(RawId::Text(_)) => return Err("empty id".into()),
            Some(RawId::Number(n)) => n.to_string(),
            None => return Err("missing id".into()),
        };

        let price = match entity.price {
            None => None,
            Some(RawPrice::Number(p)) => Some(p),
            Some(RawPrice::Text(s)) => Some(
                s.trim()
                    .parse::<f64>()
                    .map_err(|_| format!("entity {}: price '{}' is not a number", id, s))?,
            ),
        };
        if let Some(p) = price {
            if !p.is_finite() || p < 0.0 {
                return Err(format!("entity {}: price {} is not valid", id, p));
            }
        }

        let slot = if step == StepId::Slot {
            let date = entity
                .date
                .as_deref()
                .ok_or_else(|| format!("slot {}: missing date", id))?;
            let time = entity
                .time
                .as_deref()
                .ok_or_else(|| format!("slot {}: missing time", id))?;
            Some(parse_slot_time(date, time).map_err(|e| format!("slot {}: {}", id, e))?)
        } else {
            None
        };

        let name = [entity.name, entity.label, entity.title]
            .into_iter()
            .flatten()
            .find(|n| !n.trim().is_empty());

        let label = match (name, slot) {
            (Some(name), _) => name.trim().to_owned(),
            (_, Some(slot)) => slot.to_string(),
            _ => return Err(format!("entity {}: missing name", id)),
        };

        Ok(Self {
            id: EntityId(id),
            label,
            location: entity.location.filter(|l| !l.trim().is_empty()),
            price,
            slot,
        })
    }

    /// Decodes and converts one raw element of a remote collection.
    ///
    /// Elements are decoded one at a time so a single malformed entry can be skipped
    /// without losing the rest of the collection.
    pub fn from_value(step: StepId, value: serde_json::Value) -> Result<Self, String> {
        let entity: RemoteEntity = serde_json::from_value(value)
            .map_err(|e| format!("undecodable entity: {}", e))?;
        Self::from_remote(step, entity)
    }
}

fn parse_slot_time(date: &str, time: &str) -> Result<SlotTime, String> {
    let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .map_err(|e| format!("invalid date '{}': {}", date, e))?;
    let time = NaiveTime::parse_from_str(time.trim(), "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(time.trim(), "%H:%M"))
        .map_err(|e| format!("invalid time '{}': {}", time, e))?;
    Ok(SlotTime { date, time })
}

/// Wire shape of one entity in a remote collection.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteEntity {
    #[serde(default)]
    pub id: Option<RawId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub price: Option<RawPrice>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Text(String),
    Number(serde_json::Number),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawPrice {
    Number(f64),
    Text(String),
}

/// Fetched, step-scoped list of choices.
///
/// Tagged with the fingerprint of the upstream selections that produced it; the controller
/// only shows or selects from a `ChoiceSet` whose fingerprint matches the current chain.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChoiceSet {
    pub step: StepId,
    pub fingerprint: Fingerprint,
    pub choices: Vec<Choice>,
    pub fetched_at: DateTime<Utc>,
}

impl ChoiceSet {
    pub fn new(step: StepId, fingerprint: Fingerprint, choices: Vec<Choice>) -> Self {
        Self {
            step,
            fingerprint,
            choices,
            fetched_at: Utc::now(),
        }
    }

    pub fn find(&self, id: &EntityId) -> Option<&Choice> {
        self.choices.iter().find(|c| &c.id == id)
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.find(id).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.choices.is_empty()
    }

    pub fn len(&self) -> usize {
        self.choices.len()
    }
}
