//! Front-end signal conditioning: the biquad high-pass filter, the DC
//! rejection filter, the stereo/gain/smooth cross-fades, and the soft
//! clipper.
//!
//! Every routine here owns no state of its own; state that must survive
//! between calls (`HighPassMemory`, `DcRejectMemory`, `DeclipMemory`) is a
//! plain struct the caller holds and passes in by `&mut`, matching the
//! teacher's `softclip_mem: &mut [f32]` convention in `pcm_soft_clip`.

use crate::fixed_math::{mult16_16_q15, mult16_32_q15, mult_q, pshr32, saturate};

const MAX_DSP_CHANNELS: usize = 2;

/// Biquad high-pass filter state: two Q28 history words per channel.
#[derive(Clone, Copy, Debug, Default)]
pub struct HighPassMemory {
    mem: [[i32; 2]; MAX_DSP_CHANNELS],
}

/// DC-reject filter state: two cascaded leaky-integrator accumulators per
/// channel.
#[derive(Clone, Copy, Debug, Default)]
pub struct DcRejectMemory {
    stage: [[i32; 2]; MAX_DSP_CHANNELS],
}

/// Soft-clip continuity state: one coefficient `a` per channel, carried
/// across calls so the non-linearity stays continuous frame to frame.
#[derive(Clone, Debug)]
pub struct DeclipMemory(Vec<f32>);

impl DeclipMemory {
    /// Creates zeroed state for `channels` channels.
    #[must_use]
    pub fn new(channels: usize) -> Self {
        Self(vec![0.0; channels])
    }
}

/// Q28 biquad coefficients produced by [`hp_cutoff_coefficients`].
#[derive(Clone, Copy, Debug)]
pub struct HpCoefficients {
    b0: i32,
    b1: i32,
    b2: i32,
    a1: i32,
    a2: i32,
}

/// Designs the high-pass biquad coefficients for `cutoff_hz` at sample
/// rate `fs`, all in Q28.
///
/// `Fc` (the normalized cutoff) is computed in Q19 first, then widened to
/// Q28 before combining with the pole radius `r`, exactly as the spec's
/// §4.3 describes.
#[must_use]
pub fn hp_cutoff_coefficients(cutoff_hz: u32, fs: u32) -> HpCoefficients {
    const THREE_PI_OVER_TWO_Q19: i64 = 2_470_159; // round(1.5*pi * 2^19)

    let fc_q19 = (THREE_PI_OVER_TWO_Q19 * i64::from(cutoff_hz) + i64::from(fs) / 2) / i64::from(fs);
    let fc_q28 = (fc_q19 << 9) as i32; // Q19 -> Q28

    let one_q28 = 1i64 << 28;
    let r_q28 = (one_q28 - (92 * i64::from(fc_q28)) / 100) as i32;

    let fc2_q28 = mult_q(fc_q28, fc_q28, 28); // Q28 x Q28 >> 28 -> Q28
    let two_minus_fc2_q28 = ((2i64 << 28) - i64::from(fc2_q28)) as i32;

    HpCoefficients {
        b0: r_q28,
        b1: -2 * r_q28,
        b2: r_q28,
        a1: -mult_q(r_q28, two_minus_fc2_q28, 28),
        a2: mult_q(r_q28, r_q28, 28),
    }
}

/// Applies the biquad high-pass filter in place to interleaved `pcm`
/// (`channels` channels), advancing `mem` by one filter state per channel.
pub fn hp_cutoff(pcm: &mut [i16], coeffs: &HpCoefficients, channels: usize, mem: &mut HighPassMemory) {
    debug_assert!(channels <= MAX_DSP_CHANNELS);

    for c in 0..channels {
        let [mut m0, mut m1] = mem.mem[c];
        let mut i = c;
        while i < pcm.len() {
            let x = i32::from(pcm[i]);
            let vout_q28 = i64::from(coeffs.b0) * i64::from(x) + i64::from(m0);
            let new_m0 = i64::from(m1) + i64::from(coeffs.b1) * i64::from(x)
                - ((i64::from(coeffs.a1) * vout_q28) >> 28);
            let new_m1 = i64::from(coeffs.b2) * i64::from(x) - ((i64::from(coeffs.a2) * vout_q28) >> 28);
            m0 = new_m0 as i32;
            m1 = new_m1 as i32;
            pcm[i] = saturate(pshr32(vout_q28 as i32, 28), i32::from(i16::MAX)) as i16;
            i += channels;
        }
        mem.mem[c] = [m0, m1];
    }
}

/// Applies the two-stage cascaded DC-reject leaky integrator in place.
pub fn dc_reject(pcm: &mut [i16], cutoff_hz: u32, fs: u32, channels: usize, mem: &mut DcRejectMemory) {
    debug_assert!(channels <= MAX_DSP_CHANNELS);
    let denom = (3 * cutoff_hz).max(1);
    let shift = crate::fixed_math::celt_ilog2((fs / denom).max(1) as i32).max(1) as u32;

    for c in 0..channels {
        let [mut m0, mut m1] = mem.stage[c];
        let mut i = c;
        while i < pcm.len() {
            let x0 = i32::from(pcm[i]) << 15; // Q15
            let y0 = x0 - m0;
            m0 += (x0 - m0) >> shift;

            let y1 = y0 - m1;
            m1 += (y0 - m1) >> shift;

            pcm[i] = saturate(pshr32(y1, 15), i32::from(i16::MAX)) as i16;
            i += channels;
        }
        mem.stage[c] = [m0, m1];
    }
}

/// Q15 raised-cosine overlap window sample at `index` out of `length`
/// total entries, squared per the spec's `window[i]^2` weighting.
fn window_q15_sq(index: usize, length: usize) -> i32 {
    if length == 0 {
        return 32767;
    }
    let x = (index as f64 + 0.5) / length as f64 * std::f64::consts::FRAC_PI_2;
    let w = x.sin();
    saturate((w * w * 32767.0).round() as i32, 32767)
}

fn overlap_and_increment(overlap48: usize, fs: u32) -> (usize, usize) {
    let ratio = (48_000 / fs).max(1) as usize;
    ((overlap48 / ratio).max(1), ratio)
}

/// Collapses the stereo image toward mono across an overlap window as the
/// side-channel gain ramps from `g1` (prior frame) to `g2` (current
/// frame), both Q15.
pub fn stereo_fade(pcm: &mut [i16], g1: i16, g2: i16, overlap48: usize, frame_size: usize, fs: u32) {
    let (overlap, inc) = overlap_and_increment(overlap48, fs);
    let ramp_len = overlap.min(frame_size);

    for i in 0..ramp_len {
        let w = window_q15_sq(i * inc, overlap48);
        let g = mult16_32_q15(g2, w) + mult16_32_q15(g1, 32767 - w);
        apply_stereo_collapse(pcm, i, g as i16);
    }
    for i in ramp_len..frame_size {
        apply_stereo_collapse(pcm, i, g2);
    }
}

fn apply_stereo_collapse(pcm: &mut [i16], i: usize, g: i16) {
    let l = i32::from(pcm[2 * i]);
    let r = i32::from(pcm[2 * i + 1]);
    let diff = ((l - r) / 2) as i16;
    let adjust = mult16_16_q15(g, diff);
    pcm[2 * i] = saturate(l - adjust, i32::from(i16::MAX)) as i16;
    pcm[2 * i + 1] = saturate(r + adjust, i32::from(i16::MAX)) as i16;
}

/// Scales every channel uniformly as the gain ramps from `g1` to `g2`
/// (both Q15) across an overlap window.
pub fn gain_fade(pcm: &mut [i16], g1: i16, g2: i16, overlap48: usize, channels: usize, frame_size: usize, fs: u32) {
    let (overlap, inc) = overlap_and_increment(overlap48, fs);
    let ramp_len = overlap.min(frame_size);

    for i in 0..ramp_len {
        let w = window_q15_sq(i * inc, overlap48);
        let g = (mult16_32_q15(g2, w) + mult16_32_q15(g1, 32767 - w)) as i16;
        for c in 0..channels {
            let idx = i * channels + c;
            pcm[idx] = saturate(mult16_16_q15(g, pcm[idx]), i32::from(i16::MAX)) as i16;
        }
    }
    for i in ramp_len..frame_size {
        for c in 0..channels {
            let idx = i * channels + c;
            pcm[idx] = saturate(mult16_16_q15(g2, pcm[idx]), i32::from(i16::MAX)) as i16;
        }
    }
}

/// Sample-wise cross-fades `in1` (prior frame tail) into `in2` (current
/// frame head), writing into `out`, across an overlap window.
pub fn smooth_fade(in1: &[i16], in2: &[i16], out: &mut [i16], overlap48: usize, channels: usize, frame_size: usize, fs: u32) {
    let (overlap, inc) = overlap_and_increment(overlap48, fs);
    let ramp_len = overlap.min(frame_size);

    for i in 0..ramp_len {
        let w = window_q15_sq(i * inc, overlap48);
        for c in 0..channels {
            let idx = i * channels + c;
            let blended = mult16_32_q15(in2[idx], w) + mult16_32_q15(in1[idx], 32767 - w);
            out[idx] = saturate(blended, i32::from(i16::MAX)) as i16;
        }
    }
    for i in ramp_len..frame_size {
        for c in 0..channels {
            let idx = i * channels + c;
            out[idx] = in2[idx];
        }
    }
}

/// Applies soft-clipping to bring a float signal within `[-1, 1]`. If the
/// signal is already in that range nothing is done; otherwise it is
/// clipped as smoothly as possible, continuing the non-linearity from the
/// previous call via `mem` to avoid discontinuities at frame boundaries.
pub fn soft_clip(pcm: &mut [f32], channels: usize, mem: &mut DeclipMemory) {
    if pcm.is_empty() || channels == 0 || mem.0.len() < channels {
        return;
    }
    let frame_size = pcm.len() / channels;

    // Saturate to +/-2, the domain of the quadratic non-linearity; at that
    // level the derivative is already zero so this adds no discontinuity.
    pcm.iter_mut().for_each(|x| *x = x.clamp(-2.0, 2.0));

    for c in 0..channels {
        let mut a = mem.0[c];

        for i in 0..frame_size {
            let off = c + i * channels;
            if pcm[off] * a >= 0.0 {
                break;
            }
            pcm[off] += a * pcm[off] * pcm[off];
        }

        let mut curr = 0;
        let x0 = pcm[c];

        loop {
            let mut pos = frame_size;
            for i in curr..frame_size {
                if pcm[c + i * channels] > 1.0 || pcm[c + i * channels] < -1.0 {
                    pos = i;
                    break;
                }
            }

            if pos == frame_size {
                a = 0.0;
                break;
            }

            let mut peak_pos = pos;
            let mut start = pos;
            let mut end = pos;
            let mut maxval = pcm[c + pos * channels].abs();

            while start > 0 && pcm[c + pos * channels] * pcm[c + (start - 1) * channels] >= 0.0 {
                start -= 1;
            }

            while end < frame_size && pcm[c + pos * channels] * pcm[c + end * channels] >= 0.0 {
                if pcm[c + end * channels].abs() > maxval {
                    maxval = pcm[c + end * channels].abs();
                    peak_pos = end;
                }
                end += 1;
            }

            let special = start == 0 && (pcm[c + pos * channels] * pcm[c]) >= 0.0;

            a = (maxval - 1.0) / (maxval * maxval);
            a += a * 2.4e-7;
            if pcm[c + pos * channels] > 0.0 {
                a = -a;
            }

            for i in start..end {
                let off = c + i * channels;
                pcm[off] += a * pcm[off] * pcm[off];
            }

            if special && peak_pos >= 2 {
                let mut offset = x0 - pcm[c];
                let delta = offset / peak_pos as f32;
                for i in curr..peak_pos {
                    let off = c + i * channels;
                    offset -= delta;
                    pcm[off] = (pcm[off] + offset).clamp(-1.0, 1.0);
                }
            }

            curr = end;
            if curr == frame_size {
                break;
            }
        }
        mem.0[c] = a;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hp_cutoff_coefficients_produce_stable_pole() {
        let c = hp_cutoff_coefficients(3000, 48_000);
        // r must be < 1.0 in Q28 for a stable (decaying) pole.
        assert!(c.b0 > 0 && c.b0 < (1 << 28));
        assert_eq!(c.b1, -2 * c.b0);
        assert_eq!(c.b2, c.b0);
    }

    #[test]
    fn hp_cutoff_attenuates_dc() {
        let coeffs = hp_cutoff_coefficients(3000, 48_000);
        let mut mem = HighPassMemory::default();
        let mut pcm = vec![10_000i16; 960];
        hp_cutoff(&mut pcm, &coeffs, 1, &mut mem);
        // A high-pass filter driven by a DC step decays toward zero.
        let head = pcm[0].unsigned_abs() as i32;
        let tail = pcm[pcm.len() - 1].unsigned_abs() as i32;
        assert!(tail < head);
    }

    #[test]
    fn dc_reject_removes_constant_offset() {
        let mut mem = DcRejectMemory::default();
        let mut pcm = vec![5_000i16; 4800];
        dc_reject(&mut pcm, 3, 48_000, 1, &mut mem);
        let head = pcm[10].unsigned_abs() as i32;
        let tail = pcm[pcm.len() - 1].unsigned_abs() as i32;
        assert!(tail < head);
    }

    #[test]
    fn stereo_fade_collapses_toward_mono_at_full_gain() {
        let mut pcm = vec![0i16; 2 * 64];
        for i in 0..64 {
            pcm[2 * i] = 1000;
            pcm[2 * i + 1] = -1000;
        }
        stereo_fade(&mut pcm, 32767, 32767, 0, 64, 48_000);
        // Q15ONE (32767) is one LSB short of 1.0, so the very first sample
        // (the only one that goes through the interpolated weight rather
        // than the exact g2 branch) collapses to within 1 of mono, not
        // exactly 0.
        for i in 0..64 {
            assert!(pcm[2 * i].abs() <= 1);
            assert!(pcm[2 * i + 1].abs() <= 1);
        }
    }

    #[test]
    fn stereo_fade_is_no_op_at_zero_gain() {
        let mut pcm = vec![0i16; 2 * 16];
        for i in 0..16 {
            pcm[2 * i] = 1000;
            pcm[2 * i + 1] = -500;
        }
        let before = pcm.clone();
        stereo_fade(&mut pcm, 0, 0, 0, 16, 48_000);
        assert_eq!(pcm, before);
    }

    #[test]
    fn gain_fade_scales_uniformly_at_full_gain() {
        let mut pcm = vec![16384i16; 32];
        gain_fade(&mut pcm, 32767, 32767, 0, 1, 32, 48_000);
        for &s in &pcm {
            assert!((s - 16383).abs() <= 1);
        }
    }

    #[test]
    fn smooth_fade_uses_in2_past_overlap() {
        let in1 = vec![100i16; 16];
        let in2 = vec![200i16; 16];
        let mut out = vec![0i16; 16];
        smooth_fade(&in1, &in2, &mut out, 0, 1, 16, 48_000);
        assert_eq!(out, in2);
    }

    #[test]
    fn soft_clip_never_exceeds_unity_after_processing() {
        let mut pcm = [0f32; 256];
        for (i, s) in pcm.iter_mut().enumerate() {
            *s = ((i % 64) as f32 / 16.0) - 2.0;
        }
        let mut mem = DeclipMemory::new(1);
        soft_clip(&mut pcm, 1, &mut mem);
        for &s in &pcm {
            assert!(s <= 1.0 + 1e-4, "sample {s} exceeds +1");
            assert!(s >= -1.0 - 1e-4, "sample {s} exceeds -1");
        }
    }

    #[test]
    fn soft_clip_leaves_in_range_signal_untouched() {
        let mut pcm = [0.1f32, -0.2, 0.3, -0.05];
        let original = pcm;
        let mut mem = DeclipMemory::new(1);
        soft_clip(&mut pcm, 1, &mut mem);
        assert_eq!(pcm, original);
    }
}
