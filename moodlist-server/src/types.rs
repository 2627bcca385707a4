//! Core value types flowing through a detect cycle
//!
//! frame → [`ClassifierOutcome`] → [`EmotionLabel`] → catalog query → [`PlaylistResult`]s

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Facial expressions scored by the detector
///
/// Declaration order is the canonical ordering used for tie-breaks
/// (`Ord` is derived from it, so `BTreeMap` iteration follows it too).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Expression {
    Neutral,
    Happy,
    Sad,
    Angry,
    Fearful,
    Disgusted,
    Surprised,
}

impl Expression {
    /// All expressions in canonical order
    pub const ALL: [Expression; 7] = [
        Expression::Neutral,
        Expression::Happy,
        Expression::Sad,
        Expression::Angry,
        Expression::Fearful,
        Expression::Disgusted,
        Expression::Surprised,
    ];

    /// Wire name, also used verbatim as the catalog query term
    pub fn as_str(&self) -> &'static str {
        match self {
            Expression::Neutral => "neutral",
            Expression::Happy => "happy",
            Expression::Sad => "sad",
            Expression::Angry => "angry",
            Expression::Fearful => "fearful",
            Expression::Disgusted => "disgusted",
            Expression::Surprised => "surprised",
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a score map was rejected as a distribution
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DistributionError {
    #[error("expression distribution is empty")]
    Empty,

    #[error("score for {expression} out of range: {score}")]
    OutOfRange { expression: Expression, score: f64 },
}

/// Per-expression confidence for one detected face
///
/// Invariant: non-empty, every score finite and within [0, 1].
/// Scores need not sum to 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<Expression, f64>", into = "BTreeMap<Expression, f64>")]
pub struct ExpressionDistribution {
    scores: BTreeMap<Expression, f64>,
}

impl ExpressionDistribution {
    pub fn new(scores: BTreeMap<Expression, f64>) -> Result<Self, DistributionError> {
        if scores.is_empty() {
            return Err(DistributionError::Empty);
        }
        for (&expression, &score) in &scores {
            if !score.is_finite() || !(0.0..=1.0).contains(&score) {
                return Err(DistributionError::OutOfRange { expression, score });
            }
        }
        Ok(Self { scores })
    }

    /// Build from `(expression, score)` pairs; later duplicates overwrite earlier ones
    pub fn from_pairs<I>(pairs: I) -> Result<Self, DistributionError>
    where
        I: IntoIterator<Item = (Expression, f64)>,
    {
        Self::new(pairs.into_iter().collect())
    }

    pub fn score(&self, expression: Expression) -> Option<f64> {
        self.scores.get(&expression).copied()
    }

    /// Scores in canonical expression order
    pub fn iter(&self) -> impl Iterator<Item = (Expression, f64)> + '_ {
        self.scores.iter().map(|(&e, &s)| (e, s))
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

impl TryFrom<BTreeMap<Expression, f64>> for ExpressionDistribution {
    type Error = DistributionError;

    fn try_from(scores: BTreeMap<Expression, f64>) -> Result<Self, Self::Error> {
        Self::new(scores)
    }
}

impl From<ExpressionDistribution> for BTreeMap<Expression, f64> {
    fn from(distribution: ExpressionDistribution) -> Self {
        distribution.scores
    }
}

/// Result of running the detector on one frame
///
/// "No face" is kept apart from "face present, uncertain expression".
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifierOutcome {
    Face(ExpressionDistribution),
    NoFaceFound,
}

/// Sentinel text for [`EmotionLabel::NoFaceDetected`]
pub const NO_FACE_DETECTED: &str = "NoFaceDetected";

/// Discrete label produced by the decision policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmotionLabel {
    Expression(Expression),
    NoFaceDetected,
}

impl EmotionLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionLabel::Expression(expression) => expression.as_str(),
            EmotionLabel::NoFaceDetected => NO_FACE_DETECTED,
        }
    }

    /// Catalog query term, or `None` for the sentinel
    pub fn query_term(&self) -> Option<&'static str> {
        match self {
            EmotionLabel::Expression(expression) => Some(expression.as_str()),
            EmotionLabel::NoFaceDetected => None,
        }
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EmotionLabel {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Playlist shaped for the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistResult {
    /// Display name, never empty
    pub name: String,
    /// Canonical external link
    pub url: String,
    /// First cover image, empty when the record has none
    pub image: String,
}
