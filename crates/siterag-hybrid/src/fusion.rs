//! Score fusion for hybrid retrieval.
//!
//! Raw scores are not comparable across strategies (BM25 is unbounded,
//! cosine lives in [-1, 1]), so each list is min-max normalized on its own
//! before the weighted sum. A chunk found by both strategies collects both
//! weighted terms; a chunk found by one collects only that one.
//!
//! Scores alone cannot keep an agreeing chunk near the top: min-max sends
//! the tail of each list to zero. After the score sort, chunks found by both
//! strategies are therefore pulled forward so each sits no lower than its
//! best rank in either list, earliest such rank first. Two agreeing chunks
//! can share a best rank (one leads each list); only one can take that slot
//! and the other follows right after.

use std::cmp::Ordering;
use std::collections::HashMap;

use siterag_core::config::RetrievalConfig;
use siterag_core::similarity::by_score_desc;
use siterag_core::types::{Provenance, RetrievalResult};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionWeights {
    pub lexical: f32,
    pub vector: f32,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self { lexical: 0.4, vector: 0.6 }
    }
}

impl FusionWeights {
    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self { lexical: config.lexical_weight, vector: config.vector_weight }
    }

    /// The strategy whose rank breaks score ties first.
    fn primary(&self) -> Provenance {
        if self.vector >= self.lexical {
            Provenance::Vector
        } else {
            Provenance::Lexical
        }
    }
}

/// Min-max normalize to [0, 1]. A list whose scores are all equal maps to
/// 1.0; non-finite scores map to 0.0.
pub fn min_max_normalize(scores: &[f32]) -> Vec<f32> {
    let (min, max) = scores
        .iter()
        .filter(|s| s.is_finite())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &s| (lo.min(s), hi.max(s)));
    let range = max - min;
    scores
        .iter()
        .map(|&s| {
            if !s.is_finite() {
                0.0
            } else if range <= f32::EPSILON {
                1.0
            } else {
                (s - min) / range
            }
        })
        .collect()
}

/// One candidate with its 0-based rank and raw score in each list.
struct Candidate {
    result: RetrievalResult,
    lexical: Option<(usize, f32)>,
    vector: Option<(usize, f32)>,
    fused: f32,
}

impl Candidate {
    fn sources(&self) -> usize {
        usize::from(self.lexical.is_some()) + usize::from(self.vector.is_some())
    }

    fn rank(&self, strategy: Provenance) -> usize {
        let slot = match strategy {
            Provenance::Lexical => self.lexical,
            _ => self.vector,
        };
        slot.map_or(usize::MAX, |(rank, _)| rank)
    }
}

/// Fuse a lexical and a vector result list into one ranking.
///
/// Ordering: fused score desc, number of strategies that found the chunk
/// desc, rank in the higher-weighted strategy, rank in the other, chunk
/// identity. When one list is empty the other is returned unchanged.
pub fn fuse(lexical: Vec<RetrievalResult>, vector: Vec<RetrievalResult>, weights: FusionWeights) -> Vec<RetrievalResult> {
    if vector.is_empty() {
        return lexical;
    }
    if lexical.is_empty() {
        return vector;
    }

    let lexical_norm = min_max_normalize(&lexical.iter().map(|r| r.score).collect::<Vec<_>>());
    let vector_norm = min_max_normalize(&vector.iter().map(|r| r.score).collect::<Vec<_>>());

    let mut candidates: Vec<Candidate> = Vec::with_capacity(lexical.len() + vector.len());
    let mut by_identity: HashMap<String, usize> = HashMap::new();

    // ranks count distinct chunks; a repeated chunk keeps its first (best) entry
    for (result, norm) in lexical.into_iter().zip(lexical_norm) {
        let identity = result.identity();
        if by_identity.contains_key(&identity) {
            continue;
        }
        let rank = candidates.len();
        by_identity.insert(identity, rank);
        let raw = result.score;
        candidates.push(Candidate { result, lexical: Some((rank, raw)), vector: None, fused: weights.lexical * norm });
    }

    let mut rank = 0;
    for (result, norm) in vector.into_iter().zip(vector_norm) {
        let identity = result.identity();
        match by_identity.get(&identity) {
            Some(&idx) => {
                let candidate = &mut candidates[idx];
                if candidate.vector.is_some() {
                    continue;
                }
                candidate.vector = Some((rank, result.score));
                candidate.fused += weights.vector * norm;
            }
            None => {
                by_identity.insert(identity, candidates.len());
                let raw = result.score;
                candidates.push(Candidate { result, lexical: None, vector: Some((rank, raw)), fused: weights.vector * norm });
            }
        }
        rank += 1;
    }

    let primary = weights.primary();
    let secondary = match primary {
        Provenance::Vector => Provenance::Lexical,
        _ => Provenance::Vector,
    };
    candidates.sort_by(|a, b| {
        by_score_desc(a.fused, b.fused)
            .then_with(|| b.sources().cmp(&a.sources()))
            .then_with(|| a.rank(primary).cmp(&b.rank(primary)))
            .then_with(|| a.rank(secondary).cmp(&b.rank(secondary)))
            .then_with(|| compare_identity(&a.result, &b.result))
    });

    promote_agreement(candidates)
        .into_iter()
        .map(|c| {
            let mut result = c.result;
            result.score = c.fused;
            result.scores.lexical = c.lexical.map(|(_, raw)| raw);
            result.scores.vector = c.vector.map(|(_, raw)| raw);
            result.provenance = match (c.lexical.is_some(), c.vector.is_some()) {
                (true, true) => Provenance::Fused,
                (true, false) => Provenance::Lexical,
                _ => Provenance::Vector,
            };
            result
        })
        .collect()
}

/// Reorder score-sorted candidates so that every chunk found by both
/// strategies lands at or above its best single-strategy rank whenever the
/// agreeing chunks' best ranks leave room for all of them.
///
/// Slots are filled in score order except when some agreeing chunks would
/// otherwise run out of slots before their deadline; the one with the
/// earliest deadline is placed then. This is earliest-deadline-first over
/// unit slots, so it meets every deadline that any ordering could meet, and
/// chunks only ever move forward past single-source ones.
fn promote_agreement(sorted: Vec<Candidate>) -> Vec<Candidate> {
    // (deadline, score-order index) of each agreeing chunk, earliest first
    let mut agreeing: Vec<(usize, usize)> = sorted
        .iter()
        .enumerate()
        .filter(|(_, c)| c.sources() == 2)
        .map(|(i, c)| (c.rank(Provenance::Lexical).min(c.rank(Provenance::Vector)), i))
        .collect();
    if agreeing.is_empty() {
        return sorted;
    }
    agreeing.sort_unstable();

    let mut slots: Vec<Option<Candidate>> = sorted.into_iter().map(Some).collect();
    let mut order = Vec::with_capacity(slots.len());
    let mut next = 0;
    for position in 0..slots.len() {
        // the k-th pending deadline d needs k+1 of the slots up to d
        let tight = agreeing.iter().enumerate().any(|(k, &(deadline, _))| deadline <= position + k);
        let pick = if tight {
            agreeing.remove(0).1
        } else {
            while slots[next].is_none() {
                next += 1;
            }
            if let Some(k) = agreeing.iter().position(|&(_, i)| i == next) {
                agreeing.remove(k);
            }
            next
        };
        order.extend(slots[pick].take());
    }
    order
}

fn compare_identity(a: &RetrievalResult, b: &RetrievalResult) -> Ordering {
    a.identity().cmp(&b.identity())
}
