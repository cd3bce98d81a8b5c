//! Second-pass reranking over the fused candidate set.

use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use siterag_core::config::RerankConfig;
use siterag_core::text::query_terms;
use siterag_core::types::RetrievalResult;

use crate::fusion::min_max_normalize;

/// Joint query + chunk relevance scoring. One score per candidate, aligned
/// with `candidates`, higher is better. Implementations must not mutate
/// anything; a failure only costs the rerank, never the response.
pub trait Reranker: Send + Sync {
    fn name(&self) -> &str;
    fn score(&self, query: &str, candidates: &[RetrievalResult]) -> anyhow::Result<Vec<f32>>;
}

const COVERAGE_WEIGHT: f32 = 0.6;
const PROXIMITY_WEIGHT: f32 = 0.25;
const PHRASE_WEIGHT: f32 = 0.15;

/// Scores a chunk by how much of the query it covers, how close together
/// the matched terms sit, and whether the query appears as a phrase.
#[derive(Debug, Clone, Copy, Default)]
pub struct TermProximityReranker;

impl TermProximityReranker {
    fn score_one(terms: &[String], content: &str) -> f32 {
        let tokens: Vec<String> =
            content.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()).map(str::to_lowercase).collect();
        let term_ids: HashMap<&str, usize> = terms.iter().enumerate().map(|(i, t)| (t.as_str(), i)).collect();
        let hits: Vec<(usize, usize)> =
            tokens.iter().enumerate().filter_map(|(pos, tok)| term_ids.get(tok.as_str()).map(|&id| (pos, id))).collect();
        let matched: HashSet<usize> = hits.iter().map(|&(_, id)| id).collect();
        if matched.is_empty() {
            return 0.0;
        }

        let coverage = matched.len() as f32 / terms.len() as f32;
        let window = tightest_window(&hits, matched.len());
        let proximity = matched.len() as f32 / window as f32;
        let phrase = if terms.len() > 1 && tokens.windows(terms.len()).any(|w| w == terms) { 1.0 } else { 0.0 };

        COVERAGE_WEIGHT * coverage + PROXIMITY_WEIGHT * proximity + PHRASE_WEIGHT * phrase
    }
}

/// Length in tokens of the shortest span containing every distinct term in
/// `hits` (`(position, term_id)` pairs in position order).
fn tightest_window(hits: &[(usize, usize)], distinct: usize) -> usize {
    let mut counts: HashMap<usize, usize> = HashMap::new();
    let mut best = usize::MAX;
    let mut left = 0;
    for &(pos, id) in hits {
        *counts.entry(id).or_insert(0) += 1;
        while counts.len() == distinct {
            best = best.min(pos - hits[left].0 + 1);
            let leaving = hits[left].1;
            if let Some(n) = counts.get_mut(&leaving) {
                *n -= 1;
                if *n == 0 {
                    counts.remove(&leaving);
                }
            }
            left += 1;
        }
    }
    best.max(1)
}

impl Reranker for TermProximityReranker {
    fn name(&self) -> &str {
        "term-proximity"
    }

    fn score(&self, query: &str, candidates: &[RetrievalResult]) -> anyhow::Result<Vec<f32>> {
        let terms = query_terms(query);
        if terms.is_empty() {
            return Ok(vec![0.0; candidates.len()]);
        }
        Ok(candidates.iter().map(|c| Self::score_one(&terms, &c.content)).collect())
    }
}

/// Rerank the head of `candidates` (at most `config.max_candidates`).
///
/// Both the incoming scores and the rerank scores are min-max normalized
/// over the head, then blended as `(1 - w) * fused + w * rerank`. The tail
/// keeps its order behind the head. Returns the candidates and whether the
/// rerank was applied; on any reranker failure the input order is kept.
pub fn apply_rerank(
    reranker: &dyn Reranker,
    query: &str,
    mut candidates: Vec<RetrievalResult>,
    config: &RerankConfig,
) -> (Vec<RetrievalResult>, bool) {
    if candidates.len() < 2 {
        return (candidates, false);
    }
    let head_len = candidates.len().min(config.max_candidates.max(1));
    let tail = candidates.split_off(head_len);
    let mut head = candidates;

    let rerank_scores = match reranker.score(query, &head) {
        Ok(scores) if scores.len() == head.len() && scores.iter().all(|s| s.is_finite()) => scores,
        Ok(scores) => {
            warn!("Reranker {} returned {} usable scores for {} candidates; keeping fused order", reranker.name(), scores.len(), head.len());
            head.extend(tail);
            return (head, false);
        }
        Err(e) => {
            warn!("Reranker {} failed, keeping fused order: {}", reranker.name(), e);
            head.extend(tail);
            return (head, false);
        }
    };

    let fused_norm = min_max_normalize(&head.iter().map(|r| r.score).collect::<Vec<_>>());
    let rerank_norm = min_max_normalize(&rerank_scores);
    let w = config.blend_weight;
    let mut blended: Vec<(usize, f32, RetrievalResult)> = head
        .into_iter()
        .enumerate()
        .map(|(pos, mut result)| {
            result.scores.rerank = Some(rerank_norm[pos]);
            let score = (1.0 - w) * fused_norm[pos] + w * rerank_norm[pos];
            result.score = score;
            (pos, score, result)
        })
        .collect();
    blended.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    debug!("Reranked {} candidates with {}", blended.len(), reranker.name());

    let mut out: Vec<RetrievalResult> = blended.into_iter().map(|(_, _, r)| r).collect();
    out.extend(tail);
    (out, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use siterag_core::types::{Meta, Provenance, ScoreBreakdown};

    fn hit(id: &str, content: &str, score: f32) -> RetrievalResult {
        RetrievalResult {
            chunk_id: id.to_string(),
            content_id: "doc".to_string(),
            chunk_index: 0,
            org_id: "org".to_string(),
            content: content.to_string(),
            score,
            provenance: Provenance::Fused,
            scores: ScoreBreakdown::default(),
            metadata: Meta::new(),
        }
    }

    struct Broken;

    impl Reranker for Broken {
        fn name(&self) -> &str {
            "broken"
        }
        fn score(&self, _query: &str, _candidates: &[RetrievalResult]) -> anyhow::Result<Vec<f32>> {
            anyhow::bail!("model failed to load")
        }
    }

    struct Short;

    impl Reranker for Short {
        fn name(&self) -> &str {
            "short"
        }
        fn score(&self, _query: &str, _candidates: &[RetrievalResult]) -> anyhow::Result<Vec<f32>> {
            Ok(vec![1.0])
        }
    }

    #[test]
    fn window_spans_distinct_terms() {
        // positions 0..: a x b a b
        let hits = vec![(0, 0), (2, 1), (3, 0), (4, 1)];
        assert_eq!(tightest_window(&hits, 2), 2);
        assert_eq!(tightest_window(&[(5, 0)], 1), 1);
    }

    #[test]
    fn proximity_prefers_phrase_and_tight_matches() {
        let r = TermProximityReranker;
        let scores = r
            .score(
                "refund policy",
                &[
                    hit("far", "refund requests go to billing; see the travel policy", 1.0),
                    hit("phrase", "our refund policy covers annual plans", 1.0),
                    hit("half", "refund timing varies", 1.0),
                    hit("none", "parking and visitor badges", 1.0),
                ],
            )
            .unwrap();
        assert!(scores[1] > scores[0]);
        assert!(scores[0] > scores[2]);
        assert_eq!(scores[3], 0.0);
    }

    #[test]
    fn rerank_reorders_and_records_scores() {
        let config = RerankConfig { enabled: true, max_candidates: 10, blend_weight: 1.0 };
        let candidates = vec![hit("a", "nothing relevant", 0.9), hit("b", "the refund policy", 0.5)];
        let (out, applied) = apply_rerank(&TermProximityReranker, "refund policy", candidates, &config);
        assert!(applied);
        assert_eq!(out[0].chunk_id, "b");
        assert_eq!(out[0].scores.rerank, Some(1.0));
        assert_eq!(out[1].scores.rerank, Some(0.0));
    }

    #[test]
    fn failures_keep_the_fused_order() {
        let config = RerankConfig { enabled: true, max_candidates: 10, blend_weight: 1.0 };
        let candidates = vec![hit("a", "x", 0.9), hit("b", "refund policy", 0.5), hit("c", "y", 0.1)];
        let (out, applied) = apply_rerank(&Broken, "refund policy", candidates.clone(), &config);
        assert!(!applied);
        assert_eq!(out, candidates);
        let (out, applied) = apply_rerank(&Short, "refund policy", candidates.clone(), &config);
        assert!(!applied);
        assert_eq!(out, candidates);
    }

    #[test]
    fn only_the_head_is_reranked() {
        let config = RerankConfig { enabled: true, max_candidates: 2, blend_weight: 1.0 };
        let candidates = vec![hit("a", "x", 0.9), hit("b", "refund", 0.5), hit("c", "refund policy", 0.1)];
        let (out, applied) = apply_rerank(&TermProximityReranker, "refund policy", candidates, &config);
        assert!(applied);
        let ids: Vec<&str> = out.iter().map(|r| r.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
        assert_eq!(out[2].scores.rerank, None);
    }
}
