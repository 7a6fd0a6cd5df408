use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable 0-based identifier assigned to a vector in insertion order.
///
/// Signed so that stale or sentinel ids (`-1`) can be passed to the label
/// ledger and resolved to [`UNKNOWN_LABEL`] instead of failing.
pub type VectorId = i64;

/// Label returned when nothing can be resolved.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// A stored vector found by a k-NN search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    /// Id of the stored vector.
    pub id: VectorId,
    /// Squared L2 distance to the query.
    pub distance: f32,
}

/// A neighbor with its resolved label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: VectorId,
    pub distance: f32,
    pub label: String,
}

/// Outcome of a majority vote over one query's neighbors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Winning label, or [`UNKNOWN_LABEL`] when no neighbors were found.
    pub label: String,
    /// Votes cast for the winning label.
    pub votes: usize,
    /// Neighbors that took part in the vote.
    pub neighbors: usize,
    /// Distance to the closest neighbor, if any.
    pub nearest_distance: Option<f32>,
}

impl Prediction {
    /// The prediction for a query with no neighbors.
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            label: UNKNOWN_LABEL.to_string(),
            votes: 0,
            neighbors: 0,
            nearest_distance: None,
        }
    }

    /// Returns `true` if no neighbor supported this prediction.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.neighbors == 0
    }

    /// Fraction of neighbors that voted for the winning label, in `[0.0, 1.0]`.
    #[must_use]
    pub fn confidence(&self) -> f32 {
        if self.neighbors == 0 {
            0.0
        } else {
            self.votes as f32 / self.neighbors as f32
        }
    }
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}/{} votes", self.label, self.votes, self.neighbors)?;
        if let Some(d) = self.nearest_distance {
            write!(f, ", nearest={d:.4}")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_prediction() {
        let p = Prediction::unknown();
        assert_eq!(p.label, UNKNOWN_LABEL);
        assert!(p.is_unknown());
        assert_eq!(p.confidence(), 0.0);
    }

    #[test]
    fn confidence_is_vote_share() {
        let p = Prediction {
            label: "cat".into(),
            votes: 3,
            neighbors: 4,
            nearest_distance: Some(0.5),
        };
        assert!((p.confidence() - 0.75).abs() < f32::EPSILON);
        assert_eq!(p.to_string(), "cat (3/4 votes, nearest=0.5000)");
    }

    #[test]
    fn prediction_serialization_roundtrip() {
        let p = Prediction {
            label: "dog".into(),
            votes: 2,
            neighbors: 5,
            nearest_distance: Some(1.25),
        };
        let json = serde_json::to_string(&p).unwrap();
        let back: Prediction = serde_json::from_str(&json).unwrap();
        assert_eq!(p, back);
    }
}
