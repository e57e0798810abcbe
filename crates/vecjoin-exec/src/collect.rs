//! Turning resolved probe heads into output row pairs.

use crate::join_type::CollectMode;
use crate::probe_scratch::ProbeScratch;

/// Result of one collection pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Collected {
    /// Output rows gathered into the scratch index lists.
    pub n_results: usize,
    /// First probe row with work left when the output filled up.
    pub resume_idx: Option<usize>,
}

#[inline]
fn same_next(same: &[usize], id: usize) -> usize {
    if same.is_empty() { 0 } else { same[id] }
}

/// Collect output pairs for probe rows `start..` of the current batch, at
/// most `max_results` of them.
///
/// Each probe row's matches are its head followed by the head's same-key
/// chain. When the output fills up mid-row, that row's head is advanced in
/// place to the first unemitted match so the next call resumes exactly there.
pub fn collect(
    scratch: &mut ProbeScratch,
    same: &[usize],
    mode: CollectMode,
    start: usize,
    max_results: usize,
) -> Collected {
    scratch.clear_collected();
    let n = scratch.probe_rows.len();
    let mut n_results = 0;
    for i in start..n {
        let head = scratch.head_id[i];
        let probe_row = scratch.probe_rows[i];
        match mode {
            CollectMode::Pairs { probe_outer } => {
                if head == 0 {
                    if !probe_outer {
                        continue;
                    }
                    if n_results == max_results {
                        return Collected {
                            n_results,
                            resume_idx: Some(i),
                        };
                    }
                    scratch.build_idx.push(0);
                    scratch.probe_idx.push(probe_row);
                    scratch.probe_row_unmatched.push(true);
                    n_results += 1;
                    continue;
                }
                let mut cur = head;
                while cur != 0 {
                    if n_results == max_results {
                        scratch.head_id[i] = cur;
                        return Collected {
                            n_results,
                            resume_idx: Some(i),
                        };
                    }
                    scratch.build_idx.push(cur);
                    scratch.probe_idx.push(probe_row);
                    scratch.probe_row_unmatched.push(false);
                    n_results += 1;
                    cur = same_next(same, cur);
                }
            }
            CollectMode::ProbeIfMatched | CollectMode::ProbeIfUnmatched => {
                let wanted = matches!(mode, CollectMode::ProbeIfMatched);
                if (head != 0) != wanted {
                    continue;
                }
                if n_results == max_results {
                    return Collected {
                        n_results,
                        resume_idx: Some(i),
                    };
                }
                scratch.probe_idx.push(probe_row);
                n_results += 1;
            }
            CollectMode::MarkBuildMatches => {
                let mut cur = head;
                while cur != 0 {
                    scratch.build_row_matched[cur - 1] = true;
                    cur = same_next(same, cur);
                }
            }
        }
    }
    Collected {
        n_results,
        resume_idx: None,
    }
}
