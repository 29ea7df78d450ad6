//! Cadence predicate: does a batch window cross an interval boundary?
//!
//! Logging, reporting, and checkpointing each run on their own interval,
//! measured in phase steps, while the engine advances the counter by a whole
//! batch at a time. A naive `phase_step % interval == 0` check silently
//! misses every interval that falls strictly inside a batch window whenever
//! the batch size does not divide the interval. The predicate here compares
//! floor divisions of the window endpoints instead, so every interval
//! boundary the batch completes — any multiple of the interval in
//! `(phase_step, phase_step + batch_size]` — fires exactly once.

/// Returns whether the batch window starting at `phase_step` is due for an
/// action with the given interval.
///
/// - `every` of `None` (or `Some(0)`, which a validated schedule never
///   produces) means the action never fires.
/// - The first batch of a phase (`phase_step == 0`) always fires when the
///   cadence is enabled.
/// - Otherwise fires iff the batch completes a multiple of `every`, i.e.
///   `(phase_step, phase_step + batch_size]` contains one.
#[must_use]
pub fn is_due(phase_step: u64, batch_size: u64, every: Option<u64>) -> bool {
    let Some(every) = every else {
        return false;
    };
    if every == 0 {
        return false;
    }
    if phase_step == 0 {
        return true;
    }
    phase_step / every != (phase_step + batch_size) / every
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_cadence_never_fires() {
        for step in 0..100 {
            assert!(!is_due(step, 1, None));
            assert!(!is_due(step, 7, Some(0)));
        }
    }

    #[test]
    fn first_batch_always_fires() {
        for every in [1, 5, 13, 10_000] {
            for batch in [1, 3, 7] {
                assert!(is_due(0, batch, Some(every)));
            }
        }
    }

    #[test]
    fn window_crosses_multiple() {
        // Reference semantics: true iff the batch completes a multiple of
        // `every`, i.e. a multiple lies in (step, step + batch].
        for step in 0..10_000u64 {
            for batch in [1u64, 3, 7] {
                for every in [1u64, 5, 13] {
                    let expected = step == 0
                        || (step + 1..=step + batch).any(|s| s % every == 0);
                    assert_eq!(
                        is_due(step, batch, Some(every)),
                        expected,
                        "step={step} batch={batch} every={every}"
                    );
                }
            }
        }
    }

    #[test]
    fn skipped_multiple_still_fires() {
        // Batch of 3 advances 4 -> 7 over the multiple at 5.
        assert!(is_due(4, 3, Some(5)));
        // Quiet when no multiple is completed by the window.
        assert!(!is_due(5, 3, Some(5)));
    }

    #[test]
    fn fires_once_per_interval() {
        // Every interval boundary fires on exactly one batch window.
        for batch in [1u64, 3, 7] {
            let every = 13u64;
            let fired: Vec<u64> = (1..1000)
                .step_by(batch as usize)
                .filter(|&s| is_due(s, batch, Some(every)))
                .collect();
            // Consecutive hits are at least one full interval apart in
            // completed steps.
            for pair in fired.windows(2) {
                assert!(pair[1] - pair[0] >= every - batch + 1);
            }
        }
    }
}
