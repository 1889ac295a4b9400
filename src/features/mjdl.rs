//! MJDL, a minimal job description language.
//!
//! Reference grammar for the capability model, matching on:
//!
//! - `platform`: exact match (absent matches any platform)
//! - `memory`, `free_memory`, `swap`, `free_swap`: minimum thresholds in
//!   arbitrary units (absent removes the limit)
//! - `packages`: required set, satisfied when the offer's set is a superset
//! - `priority`: not a predicate; orders candidates, higher preferred
//!
//! Descriptors are JSON objects; unknown fields are ignored.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{FeatureFactory, FeatureMatcher, FeatureOffer, FeatureRequirement, FormatError};

/// An MJDL job requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MjdlRequirement {
    pub platform: Option<String>,
    pub memory: Option<u64>,
    pub free_memory: Option<u64>,
    pub swap: Option<u64>,
    pub free_swap: Option<u64>,
    pub packages: Option<BTreeSet<String>>,
    #[serde(default)]
    pub priority: i64,
}

impl MjdlRequirement {
    fn from_descriptor(descriptor: &Value) -> Result<Self, FormatError> {
        let obj = as_object(descriptor)?;
        Ok(Self {
            platform: opt_string(obj, "platform")?,
            memory: opt_threshold(obj, "memory")?,
            free_memory: opt_threshold(obj, "free_memory")?,
            swap: opt_threshold(obj, "swap")?,
            free_swap: opt_threshold(obj, "free_swap")?,
            packages: opt_packages(obj)?,
            priority: opt_priority(obj)?,
        })
    }
}

impl FeatureRequirement for MjdlRequirement {
    const GRAMMAR: &'static str = "mjdl";

    /// Key segments follow a fixed order; unconstrained fields contribute an
    /// empty segment so explicitly-null and absent fields collide. Free-form
    /// values have their delimiters escaped so distinct requirements never
    /// share a key.
    fn slot_key(&self) -> String {
        let packages = match &self.packages {
            // BTreeSet iteration is sorted, so the segment is independent of
            // descriptor ordering.
            Some(packages) => packages
                .iter()
                .map(|p| escape_segment(p))
                .collect::<Vec<_>>()
                .join(","),
            None => String::new(),
        };
        format!(
            "mjdl:{}:{}:{}:{}:{}:{}:{}",
            escape_segment(self.platform.as_deref().unwrap_or("")),
            segment(self.memory),
            segment(self.free_memory),
            segment(self.swap),
            segment(self.free_swap),
            packages,
            self.priority,
        )
    }

    fn priority(&self) -> i64 {
        self.priority
    }
}

/// An MJDL capability offer. Absent numeric capabilities count as zero,
/// absent packages as the empty set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MjdlOffer {
    pub platform: Option<String>,
    pub memory: u64,
    pub free_memory: u64,
    pub swap: u64,
    pub free_swap: u64,
    pub packages: BTreeSet<String>,
}

impl MjdlOffer {
    fn from_descriptor(descriptor: &Value) -> Result<Self, FormatError> {
        let obj = as_object(descriptor)?;
        Ok(Self {
            platform: opt_string(obj, "platform")?,
            memory: opt_threshold(obj, "memory")?.unwrap_or(0),
            free_memory: opt_threshold(obj, "free_memory")?.unwrap_or(0),
            swap: opt_threshold(obj, "swap")?.unwrap_or(0),
            free_swap: opt_threshold(obj, "free_swap")?.unwrap_or(0),
            packages: opt_packages(obj)?.unwrap_or_default(),
        })
    }

    fn satisfied_by(&self, req: &MjdlRequirement) -> bool {
        if let Some(platform) = &req.platform {
            if self.platform.as_deref() != Some(platform.as_str()) {
                return false;
            }
        }
        if req.memory.is_some_and(|min| self.memory < min) {
            return false;
        }
        if req.free_memory.is_some_and(|min| self.free_memory < min) {
            return false;
        }
        if req.swap.is_some_and(|min| self.swap < min) {
            return false;
        }
        if req.free_swap.is_some_and(|min| self.free_swap < min) {
            return false;
        }
        if let Some(packages) = &req.packages {
            if !packages.is_subset(&self.packages) {
                return false;
            }
        }
        true
    }
}

impl FeatureOffer for MjdlOffer {
    fn describe(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Single-use matcher over MJDL requirements.
pub struct MjdlMatcher {
    offer: MjdlOffer,
    candidates: Vec<MjdlRequirement>,
}

impl MjdlMatcher {
    fn new(offer: MjdlOffer) -> Self {
        Self {
            offer,
            candidates: Vec::new(),
        }
    }
}

impl FeatureMatcher for MjdlMatcher {
    type Requirement = MjdlRequirement;

    fn add_requirement(&mut self, req: MjdlRequirement) {
        if !self.offer.satisfied_by(&req) {
            return;
        }
        // Insert before the first strictly-lower priority, so equal
        // priorities keep their insertion order.
        let at = self
            .candidates
            .iter()
            .position(|c| c.priority < req.priority)
            .unwrap_or(self.candidates.len());
        self.candidates.insert(at, req);
    }

    fn next_best(&mut self) -> Option<MjdlRequirement> {
        if self.candidates.is_empty() {
            None
        } else {
            Some(self.candidates.remove(0))
        }
    }
}

/// Factory for the MJDL grammar.
#[derive(Debug, Clone, Copy, Default)]
pub struct MjdlFactory;

impl FeatureFactory for MjdlFactory {
    type Requirement = MjdlRequirement;
    type Offer = MjdlOffer;
    type Matcher = MjdlMatcher;

    fn create_requirement(&self, descriptor: &Value) -> Result<MjdlRequirement, FormatError> {
        MjdlRequirement::from_descriptor(descriptor)
    }

    fn create_offer(&self, descriptor: &Value) -> Result<MjdlOffer, FormatError> {
        MjdlOffer::from_descriptor(descriptor)
    }

    fn create_matcher(&self, offer: MjdlOffer) -> MjdlMatcher {
        MjdlMatcher::new(offer)
    }
}

fn as_object(descriptor: &Value) -> Result<&Map<String, Value>, FormatError> {
    descriptor.as_object().ok_or(FormatError::NotAnObject)
}

fn opt_string(obj: &Map<String, Value>, field: &'static str) -> Result<Option<String>, FormatError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(FormatError::InvalidField {
            field,
            expected: "a string",
        }),
    }
}

fn opt_threshold(obj: &Map<String, Value>, field: &'static str) -> Result<Option<u64>, FormatError> {
    let invalid = FormatError::InvalidField {
        field,
        expected: "a non-negative number",
    };
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => {
            // Integers pass through; fractional values coerce by truncation.
            if let Some(value) = n.as_u64() {
                Ok(Some(value))
            } else {
                match n.as_f64() {
                    Some(value) if value.is_finite() && value >= 0.0 => Ok(Some(value as u64)),
                    _ => Err(invalid),
                }
            }
        }
        Some(_) => Err(invalid),
    }
}

fn opt_packages(obj: &Map<String, Value>) -> Result<Option<BTreeSet<String>>, FormatError> {
    const FIELD: &str = "packages";
    let invalid = FormatError::InvalidField {
        field: FIELD,
        expected: "an array of strings",
    };
    match obj.get(FIELD) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => {
            let mut packages = BTreeSet::new();
            for item in items {
                match item.as_str() {
                    Some(name) => {
                        packages.insert(name.to_string());
                    }
                    None => return Err(invalid),
                }
            }
            // An empty required set constrains nothing; normalize it away so
            // it produces the same slot key as an absent field.
            if packages.is_empty() {
                Ok(None)
            } else {
                Ok(Some(packages))
            }
        }
        Some(_) => Err(invalid),
    }
}

fn opt_priority(obj: &Map<String, Value>) -> Result<i64, FormatError> {
    match obj.get("priority") {
        None | Some(Value::Null) => Ok(0),
        Some(Value::Number(n)) => n.as_i64().ok_or(FormatError::InvalidField {
            field: "priority",
            expected: "an integer",
        }),
        Some(_) => Err(FormatError::InvalidField {
            field: "priority",
            expected: "an integer",
        }),
    }
}

fn segment(value: Option<u64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Escape the slot-key delimiters in a free-form value.
fn escape_segment(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | ':' | ',') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
