/// Cosine similarity of two vectors. Zero-length or mismatched vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(dot, na, nb), (x, y)| {
            (dot + x * y, na + x * x, nb + y * y)
        });

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Greedy maximal marginal relevance selection.
///
/// Returns indices into `candidates`, in selection order. Each step picks the
/// candidate maximising `lambda * sim(query, c) - (1 - lambda) * max sim(c, selected)`;
/// ties go to the earlier candidate.
pub fn maximal_marginal_relevance(
    query: &[f32],
    candidates: &[Vec<f32>],
    k: usize,
    lambda_mult: f32,
) -> Vec<usize> {
    let lambda = lambda_mult.clamp(0.0, 1.0);
    let relevance: Vec<f32> = candidates
        .iter()
        .map(|c| cosine_similarity(query, c))
        .collect();

    let mut selected: Vec<usize> = Vec::with_capacity(k.min(candidates.len()));
    // Highest similarity of each candidate to anything selected so far.
    let mut redundancy = vec![f32::NEG_INFINITY; candidates.len()];

    while selected.len() < k.min(candidates.len()) {
        let mut best: Option<(usize, f32)> = None;
        for (i, rel) in relevance.iter().enumerate() {
            if selected.contains(&i) {
                continue;
            }
            let penalty = if selected.is_empty() { 0.0 } else { redundancy[i] };
            let score = lambda * rel - (1.0 - lambda) * penalty;
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((i, score));
            }
        }

        let Some((chosen, _)) = best else { break };
        selected.push(chosen);
        for (i, candidate) in candidates.iter().enumerate() {
            let sim = cosine_similarity(&candidates[chosen], candidate);
            if sim > redundancy[i] {
                redundancy[i] = sim;
            }
        }
    }

    selected
}
