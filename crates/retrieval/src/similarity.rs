//! Cosine similarity with an explicit policy for degenerate vectors.

use std::cmp::Ordering;

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns `None` when the score is undefined: empty input, mismatched
/// lengths, a zero-norm vector, or non-finite components.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 || !denom.is_finite() {
        return None;
    }

    let sim = dot / denom;
    if !sim.is_finite() {
        return None;
    }

    Some(sim.clamp(-1.0, 1.0) as f32)
}

/// Descending order for optional scores; undefined scores sort last.
pub fn compare_scores(a: Option<f32>, b: Option<f32>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
