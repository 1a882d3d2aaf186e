//! Chain lineage reconstruction from parent references.

use std::collections::HashSet;

use serde::Serialize;
use tracing::warn;

use taodiv_core::JobId;

/// Default bound on parent hops walked from the last stage.
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Job identifiers of a chain, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainLineage {
    pub ids: Vec<JobId>,
    /// More ancestors existed beyond the depth bound (or the parent data looped).
    pub truncated: bool,
}

impl ChainLineage {
    /// Walk `parent_of` from `last` for at most `max_depth` hops.
    ///
    /// With `D <= max_depth` ancestors the result holds `D + 1` ids. When the
    /// bound is hit with ancestors remaining, the result holds exactly
    /// `max_depth` ids (the oldest ones are dropped) and `truncated` is set.
    pub fn reconstruct<F>(last: JobId, max_depth: usize, parent_of: F) -> Self
    where
        F: Fn(JobId) -> Option<JobId>,
    {
        let max_depth = max_depth.max(1);
        let mut ids = Vec::new();
        let mut seen = HashSet::new();
        let mut current = last;
        let mut depth = 0;
        let mut looped = false;
        seen.insert(current);

        while depth < max_depth {
            match parent_of(current) {
                Some(parent) => {
                    ids.push(current);
                    if !seen.insert(parent) {
                        looped = true;
                        break;
                    }
                    current = parent;
                    depth += 1;
                }
                None => break,
            }
        }

        let truncated = looped || parent_of(current).is_some();
        if !truncated {
            ids.push(current);
        }
        ids.reverse();

        if truncated {
            warn!(
                last = %last,
                max_depth,
                kept = ids.len(),
                cyclic = looped,
                "chain lineage truncated"
            );
        }

        Self { ids, truncated }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn linear_chain(len: usize) -> (Vec<JobId>, HashMap<JobId, JobId>) {
        let ids: Vec<JobId> = (0..len).map(|_| JobId::new()).collect();
        let parents = ids.windows(2).map(|w| (w[1], w[0])).collect();
        (ids, parents)
    }

    #[test]
    fn two_stage_chain_is_complete() {
        let (ids, parents) = linear_chain(2);
        let lineage = ChainLineage::reconstruct(ids[1], DEFAULT_MAX_DEPTH, |id| {
            parents.get(&id).copied()
        });
        assert_eq!(lineage.ids, ids);
        assert!(!lineage.truncated);
    }

    #[test]
    fn single_job_lineage_is_itself() {
        let id = JobId::new();
        let lineage = ChainLineage::reconstruct(id, DEFAULT_MAX_DEPTH, |_| None);
        assert_eq!(lineage.ids, vec![id]);
        assert!(!lineage.truncated);
    }

    #[test]
    fn depth_exactly_at_bound_is_not_truncated() {
        // max_depth hops means max_depth + 1 jobs.
        let (ids, parents) = linear_chain(4);
        let lineage = ChainLineage::reconstruct(ids[3], 3, |id| parents.get(&id).copied());
        assert_eq!(lineage.ids, ids);
        assert!(!lineage.truncated);
    }

    #[test]
    fn deeper_chain_keeps_the_newest_max_depth_ids() {
        let (ids, parents) = linear_chain(12);
        let lineage = ChainLineage::reconstruct(ids[11], 10, |id| parents.get(&id).copied());
        assert!(lineage.truncated);
        assert_eq!(lineage.len(), 10);
        assert_eq!(lineage.ids, ids[2..].to_vec());
    }

    #[test]
    fn cyclic_parents_stop_the_walk() {
        let a = JobId::new();
        let b = JobId::new();
        let parents: HashMap<JobId, JobId> = [(a, b), (b, a)].into_iter().collect();
        let lineage = ChainLineage::reconstruct(a, 10, |id| parents.get(&id).copied());
        assert!(lineage.truncated);
        assert_eq!(lineage.ids, vec![b, a]);
    }

    #[test]
    fn self_parent_keeps_the_job_once() {
        let a = JobId::new();
        let lineage = ChainLineage::reconstruct(a, 10, |_| Some(a));
        assert!(lineage.truncated);
        assert_eq!(lineage.ids, vec![a]);
    }

    proptest::proptest! {
        #[test]
        fn lineage_length_follows_the_depth_bound(chain_len in 1usize..40, max_depth in 1usize..15) {
            let (ids, parents) = linear_chain(chain_len);
            let last = ids[chain_len - 1];
            let lineage = ChainLineage::reconstruct(last, max_depth, |id| parents.get(&id).copied());

            let ancestors = chain_len - 1;
            proptest::prop_assert_eq!(lineage.truncated, ancestors > max_depth);
            let expected_len = if ancestors > max_depth { max_depth } else { chain_len };
            proptest::prop_assert_eq!(lineage.len(), expected_len);
            proptest::prop_assert_eq!(lineage.ids.last().copied(), Some(last));
            proptest::prop_assert_eq!(&lineage.ids[..], &ids[chain_len - lineage.len()..]);
        }
    }
}
