//! Stream reordering.
//!
//! Turns scored streams into the canonical presentation order:
//! descending by score, with a stable tie-break that preserves the
//! current relative order among equal scores so repeated checks do not
//! oscillate.

/// One scored stream, in the channel's currently persisted order.
#[derive(Debug, Clone, Copy)]
pub struct ScoredStream {
    pub stream_id: i64,
    pub score: f64,
}

/// Compute the new stream order for a channel.
///
/// Returns `Some(order)` only when the result differs from the current
/// persisted order; `None` means the channel is already canonical and
/// no repository write should be issued.
pub fn plan_order(current: &[ScoredStream]) -> Option<Vec<i64>> {
    let mut sorted: Vec<&ScoredStream> = current.iter().collect();
    // sort_by is stable: equal scores keep their current relative
    // order, minimizing churn.
    sorted.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let new_order: Vec<i64> = sorted.iter().map(|s| s.stream_id).collect();
    let unchanged = new_order
        .iter()
        .zip(current.iter())
        .all(|(new_id, cur)| *new_id == cur.stream_id);

    if unchanged {
        None
    } else {
        Some(new_order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(pairs: &[(i64, f64)]) -> Vec<ScoredStream> {
        pairs
            .iter()
            .map(|(id, score)| ScoredStream {
                stream_id: *id,
                score: *score,
            })
            .collect()
    }

    #[test]
    fn test_sorts_descending_by_score() {
        let streams = scored(&[(1, 0.2), (2, 0.9), (3, 0.5)]);
        assert_eq!(plan_order(&streams), Some(vec![2, 3, 1]));
    }

    #[test]
    fn test_already_sorted_is_noop() {
        let streams = scored(&[(2, 0.9), (3, 0.5), (1, 0.2)]);
        assert_eq!(plan_order(&streams), None);
    }

    #[test]
    fn test_ties_preserve_current_order() {
        let streams = scored(&[(7, 0.5), (8, 0.5), (9, 0.5)]);
        assert_eq!(plan_order(&streams), None);

        // A tie behind a higher score still keeps relative order.
        let streams = scored(&[(7, 0.5), (8, 0.9), (9, 0.5)]);
        assert_eq!(plan_order(&streams), Some(vec![8, 7, 9]));
    }

    #[test]
    fn test_idempotent() {
        let streams = scored(&[(1, 0.1), (2, 0.8), (3, 0.8)]);
        let order = plan_order(&streams).unwrap();
        assert_eq!(order, vec![2, 3, 1]);

        // Re-planning with the new order and unchanged scores is a
        // no-op.
        let replanned = scored(&[(2, 0.8), (3, 0.8), (1, 0.1)]);
        assert_eq!(plan_order(&replanned), None);
    }

    #[test]
    fn test_empty_and_single() {
        assert_eq!(plan_order(&[]), None);
        assert_eq!(plan_order(&scored(&[(1, 0.4)])), None);
    }
}
