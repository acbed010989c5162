//! Dynamic frame-size selection: per-subframe transient energy, the
//! transient-boost heuristic, and a 16-state Viterbi search over frame
//! durations, plus the static `frame_size_select` duration validator.

use crate::error::OpusError;
use crate::SamplingRate;

/// Number of 2.5 ms subframes of history carried across calls.
const HISTORY: usize = 3;

/// Persistent transient-energy history for [`optimize_framesize`].
#[derive(Clone, Copy, Debug)]
pub struct FrameSizerMemory {
    e: [f32; HISTORY],
    e_1: [f32; HISTORY],
    last_sample: i16,
}

impl Default for FrameSizerMemory {
    fn default() -> Self {
        Self { e: [0.0; HISTORY], e_1: [0.0; HISTORY], last_sample: 0 }
    }
}

/// A requested frame duration, as handed to [`frame_size_select`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FrameSize {
    /// Accept `requested` verbatim if it is one of the representable
    /// step durations.
    Arg,
    /// Choose the largest representable duration not exceeding
    /// `requested`.
    Variable,
    /// 2.5 ms.
    Ms2_5,
    /// 5 ms.
    Ms5,
    /// 10 ms.
    Ms10,
    /// 20 ms.
    Ms20,
    /// 40 ms.
    Ms40,
    /// 60 ms.
    Ms60,
}

/// Returns the representable durations, in samples, in ascending order:
/// 2.5/5/10/20/40/60 ms.
fn duration_table(fs: usize) -> [usize; 6] {
    [fs / 400, fs / 200, fs / 100, fs / 50, fs / 25, 3 * fs / 50]
}

/// Validates and/or selects a frame duration (in samples) for `fs`.
///
/// `Arg` requires `requested` to already equal one of the six
/// representable durations. `Variable` picks the largest representable
/// duration that does not exceed `requested`. The fixed variants
/// (`Ms2_5`..`Ms60`) return their own duration, erroring if it exceeds
/// `requested`.
///
/// # Errors
/// Returns [`OpusError::BadArg`] if no representable duration satisfies
/// the request.
pub fn frame_size_select(requested: usize, variant: FrameSize, fs: SamplingRate) -> Result<usize, OpusError> {
    let table = duration_table(fs as usize);

    let fixed = |duration: usize| if duration <= requested { Ok(duration) } else { Err(OpusError::BadArg) };

    match variant {
        FrameSize::Ms2_5 => fixed(table[0]),
        FrameSize::Ms5 => fixed(table[1]),
        FrameSize::Ms10 => fixed(table[2]),
        FrameSize::Ms20 => fixed(table[3]),
        FrameSize::Ms40 => fixed(table[4]),
        FrameSize::Ms60 => fixed(table[5]),
        FrameSize::Arg => {
            if table.contains(&requested) {
                Ok(requested)
            } else {
                Err(OpusError::BadArg)
            }
        }
        FrameSize::Variable => table.into_iter().rev().find(|&d| d <= requested).ok_or(OpusError::BadArg),
    }
}

fn transient_boost(sum_e: f32, sum_e1: f32, subframes: usize) -> f32 {
    let m = subframes as f32;
    let metric = (sum_e * sum_e1) / (m * m);
    (0.05 * (metric - 2.0)).max(0.0).sqrt().min(1.0)
}

/// Selects the best frame-size `LM` (`0..=3`, i.e. 2.5/5/10/20 ms) for the
/// upcoming `frame_size`-sample buffer via a 16-state Viterbi search over
/// transient energy.
///
/// `downmix` writes `subframe_len` mono samples from `pcm` (starting at
/// sample `offset`, with channel `stride`) into `out`; the `-2` `flag`
/// argument signals signed 16-bit PCM input, matching the reference
/// downmix callback convention.
#[must_use]
pub fn optimize_framesize<S, F>(
    pcm: &[S],
    frame_size: usize,
    channels: usize,
    fs: u32,
    bitrate: i32,
    tonality: i32,
    mem: &mut FrameSizerMemory,
    buffering: usize,
    mut downmix: F,
) -> i32
where
    S: Copy,
    F: FnMut(&[S], &mut [i16], usize, usize, usize, i32, usize),
{
    let subframe_len = (fs as usize / 400).max(1);
    let new_subframes = frame_size / subframe_len;
    let buffered = if buffering > 0 { HISTORY } else { 0 };
    let n = buffered + new_subframes;
    if n == 0 {
        return 0;
    }

    let mut e = vec![0f32; n];
    let mut e_1 = vec![0f32; n];
    if buffered > 0 {
        e[..HISTORY].copy_from_slice(&mem.e);
        e_1[..HISTORY].copy_from_slice(&mem.e_1);
    }

    let mut scratch = vec![0i16; subframe_len];
    let mut last_sample = mem.last_sample;
    for k in 0..new_subframes {
        downmix(pcm, &mut scratch, subframe_len, k * subframe_len, channels, -2, channels);
        let mut sum = 0f32;
        let mut prev = last_sample;
        for &s in &scratch {
            let d = f32::from(s) - f32::from(prev);
            sum += d * d;
            prev = s;
        }
        last_sample = prev;
        let idx = buffered + k;
        e[idx] = sum;
        e_1[idx] = 1.0 / (1.0 + sum);
    }
    mem.last_sample = last_sample;
    if new_subframes >= HISTORY {
        mem.e.copy_from_slice(&e[n - HISTORY..]);
        mem.e_1.copy_from_slice(&e_1[n - HISTORY..]);
    }

    let rate = (bitrate.max(0) as f32) / 1000.0;
    let factor = (((rate - 80.0) / 80.0).clamp(0.0, 1.0)).max(0.0);
    let frame_cost = 28.0 + 0.01 * f32::from(tonality.clamp(0, i32::from(i16::MAX)) as i16);

    const UNREACHABLE: f32 = f32::INFINITY;
    const BEGIN_STATES: [usize; 4] = [1, 2, 4, 8];
    const TERMINAL: [usize; 4] = [1, 3, 7, 15];

    let mut cost = vec![[UNREACHABLE; 16]; n];
    let mut bstates = vec![[0usize; 16]; n];

    let boost0 = transient_boost(e[0], e_1[0], 1);
    for (j, &begin_state) in BEGIN_STATES.iter().enumerate() {
        let duration = 1usize << j;
        let marginal = (frame_cost + rate * duration as f32) * (1.0 + factor * boost0);
        cost[0][begin_state] = marginal;
    }

    for i in 1..n {
        // Continuations: every state other than the "just began" state 1
        // can be reached by advancing from s-1 at the previous subframe.
        for s in 2..16 {
            if cost[i - 1][s - 1].is_finite() {
                cost[i][s] = cost[i - 1][s - 1];
                bstates[i][s] = s - 1;
            }
        }

        // New-frame transitions: a frame of duration 2^j may start here
        // only immediately after a terminating state from the previous
        // subframe.
        for (j, &begin_state) in BEGIN_STATES.iter().enumerate() {
            let duration = 1usize << j;
            let span = duration.min(n - i);
            let sum_e: f32 = e[i..i + span].iter().sum();
            let sum_e1: f32 = e_1[i..i + span].iter().sum();
            let boost = transient_boost(sum_e, sum_e1, span);
            let scale = span as f32 / duration as f32;

            let mut best = UNREACHABLE;
            let mut best_from = 0usize;
            for &t in &TERMINAL {
                if cost[i - 1][t].is_finite() && cost[i - 1][t] < best {
                    best = cost[i - 1][t];
                    best_from = t;
                }
            }
            if best.is_finite() {
                let marginal = (frame_cost + rate * duration as f32) * (1.0 + factor * boost) * scale;
                // Begin states are never continuation targets, so this
                // overwrites rather than mins against the stale
                // continuation value the loop above wrote into this slot.
                cost[i][begin_state] = best + marginal;
                bstates[i][begin_state] = best_from;
            }
        }
    }

    let mut final_state = 1usize;
    let mut best_cost = UNREACHABLE;
    for s in 1..16 {
        if cost[n - 1][s] < best_cost {
            best_cost = cost[n - 1][s];
            final_state = s;
        }
    }

    let mut state = final_state;
    for i in (1..n).rev() {
        state = bstates[i][state];
    }

    state.trailing_zeros() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn downmix_i16(input: &[i16], out: &mut [i16], len: usize, offset: usize, stride: usize, _flag: i32, _channels: usize) {
        for i in 0..len {
            out[i] = input[(offset + i) * stride];
        }
    }

    #[test]
    fn frame_size_select_rejects_nonrepresentable_duration() {
        assert!(frame_size_select(480, FrameSize::Arg, SamplingRate::Hz48000).is_err());
    }

    #[test]
    fn frame_size_select_accepts_representable_arg() {
        assert_eq!(frame_size_select(960, FrameSize::Arg, SamplingRate::Hz48000).unwrap(), 960);
    }

    #[test]
    fn frame_size_select_variable_picks_largest_fit() {
        // 20ms (960) <= 1000 < 40ms (1920)
        assert_eq!(frame_size_select(1000, FrameSize::Variable, SamplingRate::Hz48000).unwrap(), 960);
    }

    #[test]
    fn frame_size_select_is_idempotent() {
        for fs in [SamplingRate::Hz8000, SamplingRate::Hz48000] {
            for variant in [FrameSize::Ms2_5, FrameSize::Ms20, FrameSize::Variable] {
                let once = frame_size_select(fs as usize, variant, fs).unwrap();
                let twice = frame_size_select(once, variant, fs).unwrap();
                assert_eq!(once, twice);
            }
        }
    }

    #[test]
    fn frame_size_select_rejects_duration_larger_than_requested() {
        assert!(frame_size_select(100, FrameSize::Ms20, SamplingRate::Hz48000).is_err());
    }

    #[test]
    fn optimize_framesize_returns_valid_lm() {
        let pcm = vec![0i16; 960];
        let mut mem = FrameSizerMemory::default();
        let lm = optimize_framesize(&pcm, 960, 1, 48_000, 160_000, 0, &mut mem, 0, downmix_i16);
        assert!((0..=3).contains(&lm));
    }

    #[test]
    fn optimize_framesize_prefers_longest_frame_for_constant_low_energy() {
        let pcm = vec![100i16; 960];
        let mut mem = FrameSizerMemory::default();
        let lm = optimize_framesize(&pcm, 960, 1, 48_000, 160_000, 0, &mut mem, 0, downmix_i16);
        assert_eq!(lm, 3);
    }
}
