use std::collections::HashMap;

/// Reciprocal rank fusion: `Σ_i 1/(k + rank_i(doc))`, `rank_i` the 1-based
/// position of `doc` in list `i` (absent ⇒ that list contributes 0). Pure
/// helper — no I/O, composes whatever ranked id lists the caller already
/// produced (FTS hits, fuzzy hits, vector hits, ...).
pub fn rerank(lists: &[Vec<String>], k: u32) -> Vec<String> {
    let mut scores: HashMap<&str, f64> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();
    for list in lists {
        for (idx, id) in list.iter().enumerate() {
            let rank = (idx + 1) as f64;
            let entry = scores.entry(id.as_str()).or_insert_with(|| {
                order.push(id.as_str());
                0.0
            });
            *entry += 1.0 / (k as f64 + rank);
        }
    }
    order.sort_by(|a, b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.cmp(b))
    });
    order.into_iter().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::rerank;

    #[test]
    fn doc_first_everywhere_wins() {
        let lists = vec![
            vec!["a".to_string(), "b".to_string(), "c".to_string()],
            vec!["a".to_string(), "c".to_string(), "b".to_string()],
        ];
        let fused = rerank(&lists, 60);
        assert_eq!(fused[0], "a");
    }

    #[test]
    fn absent_from_a_list_still_scores() {
        let lists = vec![
            vec!["x".to_string(), "y".to_string()],
            vec!["y".to_string()],
        ];
        let fused = rerank(&lists, 60);
        assert_eq!(fused[0], "y");
    }
}
