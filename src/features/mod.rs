//! Capability model: requirements, offers and matchmaking.
//!
//! Producers attach a *requirement* descriptor to a job (what the job needs);
//! consumers present an *offer* descriptor when dequeuing (what they can
//! provide). A pluggable grammar turns both into typed values and decides
//! which requirements an offer satisfies. The queue engine only sees the
//! grammar through the traits in this module:
//!
//! - [`FeatureFactory`]: validates raw JSON descriptors into typed values
//! - [`FeatureRequirement`]: deterministic slot key + scheduling priority
//! - [`FeatureOffer`]: descriptive form for notifications
//! - [`FeatureMatcher`]: per-dequeue priority-ordered candidate elimination
//!
//! The [`mjdl`] submodule is the reference grammar.

pub mod mjdl;

pub use mjdl::{MjdlFactory, MjdlMatcher, MjdlOffer, MjdlRequirement};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A descriptor could not be interpreted by the grammar.
///
/// Raised while validating producer/consumer input, before any queue state
/// is touched.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("descriptor must be a JSON object")]
    NotAnObject,

    #[error("field '{field}' must be {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },
}

/// A stored requirement envelope could not be turned back into a typed value.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("stored requirement is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported stored requirement version {0}")]
    UnsupportedVersion(u32),

    #[error("stored requirement grammar '{found}' does not match expected '{expected}'")]
    GrammarMismatch {
        expected: &'static str,
        found: String,
    },
}

/// A validated job requirement.
///
/// Requirements with identical effective attribute values must produce the
/// same slot key, independent of descriptor field order or whether an
/// unconstrained field was explicitly null or simply absent.
pub trait FeatureRequirement: Serialize + DeserializeOwned + Send + Sync {
    /// Identifier of the grammar that produced this requirement, recorded in
    /// the stored envelope so foreign entries are rejected on decode.
    const GRAMMAR: &'static str;

    /// Deterministic key of the slot this requirement's jobs queue under.
    fn slot_key(&self) -> String;

    /// Scheduling priority; higher is preferred. Defaults to 0 in grammars.
    fn priority(&self) -> i64;
}

/// A validated consumer capability offer.
pub trait FeatureOffer: Send + Sync {
    /// Descriptive JSON form of the offer, carried by `queue.miss` events.
    fn describe(&self) -> Value;
}

/// Priority-ordered elimination over candidate requirements, bound to one
/// offer for the duration of a single dequeue call.
///
/// Matchers are single-use: build one per pop, drain it, discard it.
pub trait FeatureMatcher: Send {
    type Requirement: FeatureRequirement;

    /// Test `req` against the bound offer. Requirements that fail any
    /// predicate are silently dropped; the rest are kept sorted by
    /// descending priority with stable insertion order on ties.
    fn add_requirement(&mut self, req: Self::Requirement);

    /// Remove and return the current best candidate, or `None` once the
    /// candidate list is exhausted. Pure in-memory bookkeeping.
    fn next_best(&mut self) -> Option<Self::Requirement>;
}

/// Creates the typed values of one grammar from raw descriptors.
pub trait FeatureFactory: Send + Sync {
    type Requirement: FeatureRequirement;
    type Offer: FeatureOffer;
    type Matcher: FeatureMatcher<Requirement = Self::Requirement>;

    /// Validate a producer descriptor into a requirement.
    fn create_requirement(&self, descriptor: &Value) -> Result<Self::Requirement, FormatError>;

    /// Validate a consumer descriptor into an offer.
    fn create_offer(&self, descriptor: &Value) -> Result<Self::Offer, FormatError>;

    /// Build a single-use matcher bound to `offer`.
    fn create_matcher(&self, offer: Self::Offer) -> Self::Matcher;
}

/// Current version of the stored requirement envelope.
pub const STORED_VERSION: u32 = 1;

/// Versioned, language-neutral envelope for requirements at rest.
///
/// Requirements are persisted as JSON records rather than opaque native
/// serialization, so the storage format is decoupled from the in-memory
/// representation and mismatched entries fail loudly on decode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRequirement {
    pub version: u32,
    pub grammar: String,
    pub attrs: Value,
}

impl StoredRequirement {
    /// Serialize a requirement into its storage envelope.
    pub fn encode<R: FeatureRequirement>(requirement: &R) -> Result<String, serde_json::Error> {
        let envelope = Self {
            version: STORED_VERSION,
            grammar: R::GRAMMAR.to_string(),
            attrs: serde_json::to_value(requirement)?,
        };
        serde_json::to_string(&envelope)
    }

    /// Deserialize a storage envelope back into a typed requirement.
    ///
    /// # Errors
    /// Returns [`DecodeError`] when the payload is not valid JSON, carries an
    /// unsupported version, or was written by a different grammar.
    pub fn decode<R: FeatureRequirement>(raw: &str) -> Result<R, DecodeError> {
        let envelope: Self = serde_json::from_str(raw)?;

        if envelope.version != STORED_VERSION {
            return Err(DecodeError::UnsupportedVersion(envelope.version));
        }
        if envelope.grammar != R::GRAMMAR {
            return Err(DecodeError::GrammarMismatch {
                expected: R::GRAMMAR,
                found: envelope.grammar,
            });
        }

        Ok(serde_json::from_value(envelope.attrs)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_round_trips_requirement() {
        let factory = MjdlFactory;
        let req = factory
            .create_requirement(&json!({"platform": "x86_64", "memory": 512, "priority": 3}))
            .unwrap();

        let raw = StoredRequirement::encode(&req).unwrap();
        let decoded: MjdlRequirement = StoredRequirement::decode(&raw).unwrap();

        assert_eq!(decoded.slot_key(), req.slot_key());
        assert_eq!(decoded.priority(), 3);
    }

    #[test]
    fn envelope_rejects_unsupported_version() {
        let raw = json!({"version": 99, "grammar": "mjdl", "attrs": {}}).to_string();
        let err = StoredRequirement::decode::<MjdlRequirement>(&raw).unwrap_err();
        assert!(matches!(err, DecodeError::UnsupportedVersion(99)));
    }

    #[test]
    fn envelope_rejects_foreign_grammar() {
        let raw = json!({"version": 1, "grammar": "jdl2", "attrs": {}}).to_string();
        let err = StoredRequirement::decode::<MjdlRequirement>(&raw).unwrap_err();
        assert!(matches!(err, DecodeError::GrammarMismatch { .. }));
    }

    #[test]
    fn envelope_rejects_garbage() {
        let err = StoredRequirement::decode::<MjdlRequirement>("not json").unwrap_err();
        assert!(matches!(err, DecodeError::Json(_)));
    }
}
