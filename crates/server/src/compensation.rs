//! Lag compensation over the authoritative history
//!
//! A delayed client action (a hit, a pickup) is accepted as if it happened
//! at the client's perceived time: the history frame at that time is
//! located, the action is applied to it, and every later frame is
//! resimulated forward from the altered one. Timestamps and frame count
//! are preserved; a rejected or out-of-window request leaves history
//! untouched.

use crate::error::HistoryError;
use crate::history::TimestampedBuffer;

/// A client action to be evaluated against historical state.
pub trait LagCompensationRequest {
    /// Client-perceived time of the action.
    fn timestamp_ms(&self) -> u64;
}

/// What a validator gets to look at when accepting or rejecting a request.
pub struct CompensationContext<'a, W> {
    /// The server's authoritative history, untouched at validation time.
    pub history: &'a TimestampedBuffer<W>,

    /// Age of the request when it reached the server (`now − request
    /// timestamp`), the observable proxy for the client's latency.
    pub request_age_ms: u64,
}

/// Inputs to one forward resimulation step.
///
/// The resimmer computes the replacement for `old_current` given how its
/// predecessor changed. It must be pure with respect to these three
/// values.
pub struct ResimulationStep<'a, W> {
    /// The predecessor frame as originally recorded.
    pub old_previous: (u64, &'a W),

    /// The predecessor frame after rewriting.
    pub new_previous: &'a W,

    /// The frame being resimulated, as originally recorded.
    pub old_current: (u64, &'a W),
}

/// Game-supplied policy for one kind of compensated action: validation,
/// application at the perceived time, and forward resimulation.
pub trait LagCompensator<W> {
    /// The request kind this compensator evaluates.
    type Request: LagCompensationRequest;

    /// Accepts or rejects the request. Rejection has no side effects.
    /// Timestamp-window checks against `ctx.request_age_ms` belong here.
    fn validate(&self, request: &Self::Request, ctx: &CompensationContext<'_, W>) -> bool;

    /// Applies the request to the state at the perceived time, producing
    /// the replacement for that frame.
    fn apply(&self, base: &W, request: &Self::Request) -> W;

    /// Produces the replacement for one subsequent frame.
    fn resimulate(&self, step: ResimulationStep<'_, W>) -> W;
}

/// Runs one request against the history.
///
/// Returns `Ok(false)` when the request is out of window (nothing recorded
/// at or after its timestamp) or rejected by the validator; in both cases
/// the history is untouched. Returns `Ok(true)` after a successful rewrite.
/// `Err` means a rewrite failed, which cannot happen for frames just
/// sliced from the same buffer and indicates a bug.
pub fn process_request<W, C>(
    history: &mut TimestampedBuffer<W>,
    compensator: &C,
    request: &C::Request,
    now_ms: u64,
) -> Result<bool, HistoryError>
where
    W: Clone,
    C: LagCompensator<W>,
{
    let frames: Vec<(u64, W)> = history
        .slice(request.timestamp_ms())
        .map(|(ts, state)| (ts, state.clone()))
        .collect();
    if frames.is_empty() {
        tracing::debug!(
            timestamp_ms = request.timestamp_ms(),
            "lag compensation request out of history window"
        );
        return Ok(false);
    }

    let context = CompensationContext {
        history,
        request_age_ms: now_ms.saturating_sub(request.timestamp_ms()),
    };
    if !compensator.validate(request, &context) {
        tracing::debug!(
            timestamp_ms = request.timestamp_ms(),
            "lag compensation request rejected by validator"
        );
        return Ok(false);
    }

    let mut rewritten: Vec<(u64, W)> = Vec::with_capacity(frames.len());
    rewritten.push((frames[0].0, compensator.apply(&frames[0].1, request)));
    for i in 1..frames.len() {
        let state = compensator.resimulate(ResimulationStep {
            old_previous: (frames[i - 1].0, &frames[i - 1].1),
            new_previous: &rewritten[i - 1].1,
            old_current: (frames[i].0, &frames[i].1),
        });
        rewritten.push((frames[i].0, state));
    }

    for (timestamp_ms, state) in rewritten {
        history.rewrite(timestamp_ms, state)?;
    }

    tracing::debug!(
        timestamp_ms = request.timestamp_ms(),
        frames = frames.len(),
        "lag compensation applied"
    );
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct HitAt {
        timestamp_ms: u64,
    }

    impl LagCompensationRequest for HitAt {
        fn timestamp_ms(&self) -> u64 {
            self.timestamp_ms
        }
    }

    /// Marks the base frame and carries it forward unchanged.
    struct CarryForward {
        max_age_ms: u64,
    }

    impl LagCompensator<String> for CarryForward {
        type Request = HitAt;

        fn validate(&self, _request: &HitAt, ctx: &CompensationContext<'_, String>) -> bool {
            ctx.request_age_ms <= self.max_age_ms
        }

        fn apply(&self, base: &String, _request: &HitAt) -> String {
            format!("{base}'")
        }

        fn resimulate(&self, step: ResimulationStep<'_, String>) -> String {
            step.new_previous.clone()
        }
    }

    fn seeded_history() -> TimestampedBuffer<String> {
        let mut history = TimestampedBuffer::new(10_000);
        for (ts, state) in [(100, "A"), (110, "B"), (120, "C"), (130, "D")] {
            history.record(ts, state.to_owned()).unwrap();
        }
        history
    }

    fn states(history: &TimestampedBuffer<String>) -> Vec<String> {
        history.slice(100).map(|(_, s)| s.clone()).collect()
    }

    #[test]
    fn rewrites_base_frame_and_carries_forward() {
        let mut history = seeded_history();
        let compensator = CarryForward { max_age_ms: 1_000 };

        let accepted =
            process_request(&mut history, &compensator, &HitAt { timestamp_ms: 110 }, 140)
                .unwrap();
        assert!(accepted);
        assert_eq!(states(&history), ["A", "B'", "B'", "B'"]);
    }

    #[test]
    fn out_of_window_request_is_rejected_without_side_effects() {
        let mut history = seeded_history();
        let compensator = CarryForward { max_age_ms: 1_000 };

        let accepted =
            process_request(&mut history, &compensator, &HitAt { timestamp_ms: 50 }, 140)
                .unwrap();
        assert!(!accepted);
        assert_eq!(states(&history), ["A", "B", "C", "D"]);
    }

    #[test]
    fn validator_rejection_leaves_history_untouched() {
        let mut history = seeded_history();
        // request age is 140 - 110 = 30, over the 10ms budget
        let compensator = CarryForward { max_age_ms: 10 };

        let accepted =
            process_request(&mut history, &compensator, &HitAt { timestamp_ms: 110 }, 140)
                .unwrap();
        assert!(!accepted);
        assert_eq!(states(&history), ["A", "B", "C", "D"]);
    }

    #[test]
    fn single_frame_request_skips_the_resimulation_loop() {
        let mut history = seeded_history();
        let compensator = CarryForward { max_age_ms: 1_000 };

        let accepted =
            process_request(&mut history, &compensator, &HitAt { timestamp_ms: 130 }, 140)
                .unwrap();
        assert!(accepted);
        assert_eq!(states(&history), ["A", "B", "C", "D'"]);
    }

    #[test]
    fn timestamps_are_preserved_across_rewrites() {
        let mut history = seeded_history();
        let before: Vec<u64> = history.slice(100).map(|(ts, _)| ts).collect();

        let compensator = CarryForward { max_age_ms: 1_000 };
        process_request(&mut history, &compensator, &HitAt { timestamp_ms: 100 }, 140).unwrap();

        let after: Vec<u64> = history.slice(100).map(|(ts, _)| ts).collect();
        assert_eq!(before, after);
        assert_eq!(history.len(), 4);
    }
}
