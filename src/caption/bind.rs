//! Speaker-face binder
//!
//! Decides one display identity per diarization cluster for the whole
//! file, by pooling the face candidates of every turn the cluster spoke,
//! then propagates it back to each turn.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::align::Alignment;
use super::diagnostics::{EvidenceReason, Warning};
use super::types::{ClusterId, DiarizationTurn, Identity, Millis};
use crate::config::CaptionConfig;

/// Identity decision for one cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterBinding {
    pub cluster: ClusterId,
    pub identity: Identity,
    /// Pooled overlap behind the cluster's best candidate (0 when none)
    pub weight: Millis,
}

/// Identities for every cluster and every turn of one file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpeakerBindings {
    /// In order of first appearance
    pub clusters: Vec<ClusterBinding>,
    /// Parallel to the normalized turns
    pub turns: Vec<Identity>,
}

impl SpeakerBindings {
    #[must_use]
    pub fn identity_of(&self, cluster: &ClusterId) -> Option<&Identity> {
        self.clusters
            .iter()
            .find(|b| &b.cluster == cluster)
            .map(|b| &b.identity)
    }

    #[must_use]
    pub fn named(&self) -> usize {
        self.clusters.iter().filter(|b| b.identity.is_resolved()).count()
    }

    #[must_use]
    pub fn anonymous(&self) -> usize {
        self.clusters.len() - self.named()
    }
}

/// Outcome of step 2, before name conflicts are settled
enum Proposal {
    Name(String),
    Fallback(EvidenceReason),
}

/// Bind clusters to names, appending insufficient-evidence warnings.
pub fn bind(
    turns: &[DiarizationTurn],
    alignment: &Alignment,
    config: &CaptionConfig,
    warnings: &mut Vec<Warning>,
) -> SpeakerBindings {
    let threshold = config.min_cluster_overlap();

    // First-appearance order; turns are already sorted by start.
    let mut ordinal_of: BTreeMap<&ClusterId, usize> = BTreeMap::new();
    let mut order: Vec<&ClusterId> = Vec::new();
    for turn in turns {
        ordinal_of.entry(&turn.cluster).or_insert_with(|| {
            order.push(&turn.cluster);
            order.len() - 1
        });
    }

    // Pool candidate overlap per track identity, `None` = unidentified face.
    let mut pooled: Vec<BTreeMap<Option<&str>, Millis>> = vec![BTreeMap::new(); order.len()];
    for (turn, candidates) in turns.iter().zip(&alignment.candidates) {
        let pool = &mut pooled[ordinal_of[&turn.cluster]];
        for candidate in candidates {
            let key = alignment.tracks[candidate.track].identity.as_deref();
            *pool.entry(key).or_insert(0) += candidate.overlap;
        }
    }

    let mut weights = Vec::with_capacity(order.len());
    let mut proposals = Vec::with_capacity(order.len());
    for (cluster, pool) in order.iter().zip(&pooled) {
        let best = best_candidate(pool);
        let weight = best.map_or(0, |(_, w)| w);
        let proposal = match best {
            None => Proposal::Fallback(EvidenceReason::NoFaceCandidates),
            Some((_, w)) if w < threshold => {
                Proposal::Fallback(EvidenceReason::BelowThreshold { weight_ms: w })
            }
            Some((None, w)) => Proposal::Fallback(EvidenceReason::UnidentifiedFace { weight_ms: w }),
            Some((Some(name), _)) => Proposal::Name(name.to_string()),
        };
        debug!(%cluster, weight, candidates = pool.len(), "pooled face evidence");
        weights.push(weight);
        proposals.push(proposal);
    }

    // A name identifies at most one cluster: most evidence wins, earlier
    // appearance keeps exact ties.
    let mut owner: BTreeMap<&str, usize> = BTreeMap::new();
    for (k, proposal) in proposals.iter().enumerate() {
        if let Proposal::Name(name) = proposal {
            match owner.get(name.as_str()) {
                Some(&holder) if weights[holder] >= weights[k] => {}
                _ => {
                    owner.insert(name.as_str(), k);
                }
            }
        }
    }

    let mut clusters = Vec::with_capacity(order.len());
    for (k, (cluster, proposal)) in order.iter().zip(&proposals).enumerate() {
        let ordinal = u32::try_from(k + 1).unwrap_or(u32::MAX);
        let identity = match proposal {
            Proposal::Name(name) if owner.get(name.as_str()) == Some(&k) => {
                Identity::Name(name.clone())
            }
            Proposal::Name(name) => {
                let winner = order[owner[name.as_str()]].clone();
                warnings.push(Warning::ClusterEvidence {
                    cluster: (*cluster).clone(),
                    reason: EvidenceReason::LostNameConflict {
                        name: name.clone(),
                        winner,
                    },
                });
                Identity::Anonymous(ordinal)
            }
            Proposal::Fallback(reason) => {
                warnings.push(Warning::ClusterEvidence {
                    cluster: (*cluster).clone(),
                    reason: reason.clone(),
                });
                Identity::Anonymous(ordinal)
            }
        };

        clusters.push(ClusterBinding {
            cluster: (*cluster).clone(),
            identity,
            weight: weights[k],
        });
    }

    let turn_identities = turns
        .iter()
        .map(|turn| clusters[ordinal_of[&turn.cluster]].identity.clone())
        .collect();

    let bindings = SpeakerBindings {
        clusters,
        turns: turn_identities,
    };
    info!(
        clusters = bindings.clusters.len(),
        named = bindings.named(),
        anonymous = bindings.anonymous(),
        "bound speakers"
    );
    bindings
}

/// Heaviest pooled key; named beats unidentified, then the smaller name.
fn best_candidate<'a>(pool: &BTreeMap<Option<&'a str>, Millis>) -> Option<(Option<&'a str>, Millis)> {
    let mut best: Option<(Option<&'a str>, Millis)> = None;
    for (&key, &weight) in pool {
        let better = match best {
            None => true,
            Some((best_key, best_weight)) => {
                weight > best_weight || (weight == best_weight && best_key.is_none() && key.is_some())
            }
        };
        if better {
            best = Some((key, weight));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caption::align::Candidate;
    use crate::caption::types::{FaceTrack, Span};

    fn turn(start: Millis, end: Millis, cluster: &str) -> DiarizationTurn {
        DiarizationTurn {
            span: Span::new(start, end),
            cluster: ClusterId::new(cluster),
        }
    }

    fn track(name: Option<&str>) -> FaceTrack {
        FaceTrack {
            span: Span::new(0, 1),
            identity: name.map(str::to_string),
            mean_similarity: 0.8,
            observations: 1,
        }
    }

    fn cand(track: usize, overlap: Millis) -> Candidate {
        Candidate { track, overlap }
    }

    #[test]
    fn test_evidence_pooled_across_turns() {
        let turns = vec![turn(0, 1500, "A"), turn(5000, 6500, "A")];
        let alignment = Alignment {
            tracks: vec![track(Some("Alice"))],
            candidates: vec![vec![cand(0, 1200)], vec![cand(0, 1000)]],
        };
        let mut warnings = Vec::new();

        let bindings = bind(&turns, &alignment, &CaptionConfig::default(), &mut warnings);

        // neither turn alone reaches 2s, together they do
        assert_eq!(bindings.clusters[0].identity, Identity::Name("Alice".into()));
        assert_eq!(bindings.clusters[0].weight, 2200);
        assert_eq!(bindings.turns.len(), 2);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_no_candidates_gets_placeholder() {
        let turns = vec![turn(0, 3000, "narrator")];
        let alignment = Alignment {
            tracks: vec![],
            candidates: vec![vec![]],
        };
        let mut warnings = Vec::new();

        let bindings = bind(&turns, &alignment, &CaptionConfig::default(), &mut warnings);

        assert_eq!(bindings.turns[0], Identity::Anonymous(1));
        assert_eq!(
            warnings,
            vec![Warning::ClusterEvidence {
                cluster: ClusterId::new("narrator"),
                reason: EvidenceReason::NoFaceCandidates,
            }]
        );
    }

    #[test]
    fn test_unidentified_face_blocks_name() {
        let turns = vec![turn(0, 6000, "A")];
        let alignment = Alignment {
            tracks: vec![track(None), track(Some("Alice"))],
            candidates: vec![vec![cand(0, 5000), cand(1, 2500)]],
        };
        let mut warnings = Vec::new();

        let bindings = bind(&turns, &alignment, &CaptionConfig::default(), &mut warnings);

        assert_eq!(bindings.clusters[0].identity, Identity::Anonymous(1));
        assert!(matches!(
            warnings[0],
            Warning::ClusterEvidence {
                reason: EvidenceReason::UnidentifiedFace { weight_ms: 5000 },
                ..
            }
        ));
    }

    #[test]
    fn test_name_conflict_keeps_heavier_cluster() {
        let turns = vec![turn(0, 2000, "B"), turn(2000, 9000, "A")];
        let alignment = Alignment {
            tracks: vec![track(Some("Bob"))],
            candidates: vec![vec![cand(0, 2000)], vec![cand(0, 5000)]],
        };
        let mut warnings = Vec::new();

        let bindings = bind(&turns, &alignment, &CaptionConfig::default(), &mut warnings);

        assert_eq!(
            bindings.identity_of(&ClusterId::new("A")),
            Some(&Identity::Name("Bob".into()))
        );
        assert_eq!(
            bindings.identity_of(&ClusterId::new("B")),
            Some(&Identity::Anonymous(1))
        );
        assert_eq!(bindings.named(), 1);
        assert_eq!(bindings.anonymous(), 1);
        assert!(matches!(
            &warnings[0],
            Warning::ClusterEvidence {
                reason: EvidenceReason::LostNameConflict { name, winner },
                ..
            } if name == "Bob" && winner == &ClusterId::new("A")
        ));
    }

    #[test]
    fn test_equal_conflict_goes_to_first_cluster() {
        let turns = vec![turn(0, 3000, "A"), turn(3000, 6000, "B")];
        let alignment = Alignment {
            tracks: vec![track(Some("Bob"))],
            candidates: vec![vec![cand(0, 3000)], vec![cand(0, 3000)]],
        };
        let mut warnings = Vec::new();

        let bindings = bind(&turns, &alignment, &CaptionConfig::default(), &mut warnings);

        assert_eq!(bindings.turns[0], Identity::Name("Bob".into()));
        assert_eq!(bindings.turns[1], Identity::Anonymous(2));
    }
}
