//! Identification outcome and confidence policy.
//!
//! The domain classifier's arg-max class is the animal id and its probability
//! the confidence. The configured threshold is applied here, under one of two
//! policies:
//! - gate (default): below-threshold results are reported as no match and the
//!   user is prompted to enroll
//! - annotate: the match is always reported, with a caveat below threshold

use herd_shared::model::AnimalId;
use serde::{Deserialize, Serialize};

/// How below-threshold identifications are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidencePolicy {
    #[default]
    Gate,
    Annotate,
}

/// Raw identifier output: predicted class and its probability.
#[derive(Debug, Clone, PartialEq)]
pub struct Identification {
    pub animal_id: AnimalId,
    pub confidence: f32,
}

/// Identifier output after the confidence policy has been applied.
#[derive(Debug, Clone, PartialEq)]
pub enum IdentifyOutcome {
    Match {
        animal_id: AnimalId,
        confidence: f32,
        /// True when the score is below threshold under the annotate policy.
        uncertain: bool,
    },
    NoMatch {
        animal_id: AnimalId,
        confidence: f32,
    },
}

/// Apply the confidence policy to a raw identification.
pub fn resolve(
    ident: Identification,
    threshold: f32,
    policy: ConfidencePolicy,
) -> IdentifyOutcome {
    let below = ident.confidence < threshold;
    match policy {
        ConfidencePolicy::Gate if below => IdentifyOutcome::NoMatch {
            animal_id: ident.animal_id,
            confidence: ident.confidence,
        },
        ConfidencePolicy::Gate => IdentifyOutcome::Match {
            animal_id: ident.animal_id,
            confidence: ident.confidence,
            uncertain: false,
        },
        ConfidencePolicy::Annotate => IdentifyOutcome::Match {
            animal_id: ident.animal_id,
            confidence: ident.confidence,
            uncertain: below,
        },
    }
}
