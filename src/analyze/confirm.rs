//! Third phase: score a replayed stimulus by the reaction it caused.
use crate::analyze::baseline::Baseline;
use crate::analyze::buffer::CaptureBuffer;
use crate::analyze::hypothesis::Hypothesis;

/// Key of the initial zero weight. Wins when no stimulus scored.
pub const NOT_FOUND: &str = "Not found";

/// Counts how often the history IDs other than the stimulus moved bits that the hypothesis saw changing.
///
/// For every such ID the frames in `capture` are walked in order. After the second sample each sample adds one to the weight while the accumulated XOR of consecutive samples overlaps the bits of interest.
pub fn correlation_weight(baseline: &Baseline, hypothesis: &Hypothesis, stimulus_id: u32, capture: &CaptureBuffer) -> u32 {
    let mut weight = 0;

    for &id in hypothesis.history() {
        if id == stimulus_id {
            continue;
        }

        let samples: Vec<u64> = capture.frames_by_id(id).map(|f| f.bit_vector()).collect();
        if samples.len() < 2 {
            continue;
        }

        let learned = baseline.diff_mask(id);
        let looking = learned ^ hypothesis.record(id).map(|r| r.diff_mask).unwrap_or(0);

        let mut changed = 0u64;
        for pair in samples.windows(2) {
            changed |= pair[0] ^ pair[1];
            if looking & changed != 0 {
                weight += 1;
            }
        }
    }

    weight
}

/// Entry with the highest weight. Ties keep the entry inserted first, [`NOT_FOUND`] with weight 0 always comes first.
pub fn best_stimulus(weights: &[(String, u32)]) -> (String, u32) {
    let mut best = (NOT_FOUND.to_string(), 0);
    for (key, weight) in weights {
        if *weight > best.1 {
            best = (key.clone(), *weight);
        }
    }
    best
}
