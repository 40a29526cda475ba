//! Species gate - accept/reject decision before identification is attempted.
//!
//! The general-purpose classifier ranks labels for the photo; the gate
//! accepts when any of the top-K labels matches a configured target label.
//! Rejection is a normal outcome, not an error, and has no side effects.

use crate::vision::RankedLabel;

/// Outcome of the species gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// The photo plausibly depicts the target species; identification may run.
    Candidate,
    /// None of the top-K labels matched the target set.
    NotACandidate,
}

/// Compare the classifier's top-K labels against the target set,
/// case-insensitively.
pub fn assess(labels: &[RankedLabel], targets: &[String], top_k: usize) -> GateDecision {
    let hit = labels
        .iter()
        .take(top_k)
        .any(|ranked| targets.iter().any(|t| t.eq_ignore_ascii_case(&ranked.label)));
    if hit {
        GateDecision::Candidate
    } else {
        GateDecision::NotACandidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranked(labels: &[(&str, f32)]) -> Vec<RankedLabel> {
        labels
            .iter()
            .map(|(label, score)| RankedLabel {
                label: label.to_string(),
                score: *score,
            })
            .collect()
    }

    fn targets() -> Vec<String> {
        vec!["cow".to_string(), "ox".to_string()]
    }

    #[test]
    fn test_accepts_target_in_top_k() {
        let labels = ranked(&[("hay", 0.5), ("cow", 0.3), ("barn", 0.1)]);
        assert_eq!(assess(&labels, &targets(), 3), GateDecision::Candidate);
    }

    #[test]
    fn test_rejects_when_target_ranked_below_k() {
        let labels = ranked(&[("dog", 0.6), ("wolf", 0.2), ("fox", 0.1), ("ox", 0.05)]);
        assert_eq!(assess(&labels, &targets(), 3), GateDecision::NotACandidate);
    }

    #[test]
    fn test_label_match_ignores_case() {
        let labels = ranked(&[("Ox", 0.9)]);
        assert_eq!(assess(&labels, &targets(), 3), GateDecision::Candidate);
    }

    #[test]
    fn test_empty_ranking_is_rejected() {
        assert_eq!(assess(&[], &targets(), 3), GateDecision::NotACandidate);
    }
}
