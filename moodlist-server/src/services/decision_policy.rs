//! Decision policy: score distribution → one emotion label
//!
//! Deterministic arg-max. Ties resolve to the earliest expression in the
//! canonical order of [`Expression`], never to map iteration order.

use crate::types::{ClassifierOutcome, EmotionLabel, Expression, ExpressionDistribution};

/// Reduce a classifier outcome to a label
///
/// `NoFaceFound` short-circuits to [`EmotionLabel::NoFaceDetected`] without
/// touching any distribution.
pub fn decide(outcome: &ClassifierOutcome) -> EmotionLabel {
    match outcome {
        ClassifierOutcome::Face(distribution) => EmotionLabel::Expression(arg_max(distribution)),
        ClassifierOutcome::NoFaceFound => EmotionLabel::NoFaceDetected,
    }
}

/// Expression with the strictly greatest score
pub fn arg_max(distribution: &ExpressionDistribution) -> Expression {
    let mut best: Option<(Expression, f64)> = None;

    // Canonical order; a later entry must be strictly greater to win
    for (expression, score) in distribution.iter() {
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((expression, score)),
        }
    }

    // Distributions are non-empty by construction
    best.map(|(expression, _)| expression)
        .unwrap_or(Expression::ALL[0])
}
