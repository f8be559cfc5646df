const EPS: f32 = 1e-12;

/// `1 - (q·v)/(‖q‖·‖v‖)`, with a small epsilon guarding the division (§4.F).
/// Zero-norm vectors are rejected before reaching here; this guard only
/// protects against vectors that are merely very small.
pub(super) fn cosine_distance(query: &[f32], candidate: &[f32]) -> f32 {
    let dot: f32 = query.iter().zip(candidate).map(|(a, b)| a * b).sum();
    let q_norm: f32 = query.iter().map(|v| v * v).sum::<f32>().sqrt();
    let c_norm: f32 = candidate.iter().map(|v| v * v).sum::<f32>().sqrt();
    1.0 - dot / (q_norm * c_norm + EPS)
}

#[cfg(test)]
mod tests {
    use super::cosine_distance;

    #[test]
    fn identical_vectors_have_zero_distance() {
        let v = vec![0.1, 0.2, 0.7];
        let d = cosine_distance(&v, &v);
        assert!(d.abs() < 1e-5, "expected ~0, got {d}");
    }

    #[test]
    fn orthogonal_vectors_have_distance_one() {
        let d = cosine_distance(&[1.0, 0.0], &[0.0, 1.0]);
        assert!((d - 1.0).abs() < 1e-5, "expected ~1, got {d}");
    }

    #[test]
    fn opposite_vectors_have_distance_two() {
        let d = cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]);
        assert!((d - 2.0).abs() < 1e-5, "expected ~2, got {d}");
    }
}
