//! Opus packet framing: the Table-of-Contents (TOC) byte, the 1-or-2 byte
//! length codec, and the multi-frame packet walker.
//!
//! Every byte position here is protocol-defined (RFC 6716 §3). These
//! routines never allocate and never panic on malformed input; truncated
//! or internally inconsistent packets are reported through [`OpusError`].

use crate::error::OpusError;
use crate::{Bandwidth, Channels, OpusMode, SamplingRate};

/// Maximum number of frames a single packet may carry (RFC 6716 §3.2.5).
pub const MAX_FRAMES: usize = 48;

/// Maximum size in bytes of a single Opus frame.
pub const MAX_FRAME_BYTES: usize = 1275;

/// Maximum number of PCM samples any packet may decode to, at 48 kHz
/// (120 ms).
pub const MAX_PACKET_SAMPLES_48K: usize = 5760;

/// The result of parsing a packet's TOC and framing region.
///
/// Only the first `frame_count` entries of `frame_offsets`/`frame_sizes`
/// are meaningful; the rest are left at `0`. Mirrors the teacher's
/// `[usize; 48]` out-parameters, returned by value instead.
#[derive(Clone, Copy, Debug)]
pub struct ParsedPacket {
    /// The packet's Table-of-Contents byte (`packet[0]`).
    pub toc: u8,
    /// Byte offset of each frame's payload within the packet.
    pub frame_offsets: [usize; MAX_FRAMES],
    /// Byte length of each frame's payload.
    pub frame_sizes: [usize; MAX_FRAMES],
    /// Number of valid entries in `frame_offsets`/`frame_sizes`.
    pub frame_count: usize,
    /// Offset of the first frame's payload (after TOC + length fields).
    pub payload_offset: usize,
    /// Offset of the next packet, including any trailing padding consumed.
    pub packet_offset: usize,
}

impl ParsedPacket {
    /// Returns the byte slices of each parsed frame's payload.
    #[must_use]
    pub fn frames<'a>(&self, packet: &'a [u8]) -> impl Iterator<Item = &'a [u8]> + 'a {
        let offsets = self.frame_offsets;
        let sizes = self.frame_sizes;
        (0..self.frame_count).map(move |i| &packet[offsets[i]..offsets[i] + sizes[i]])
    }
}

const BANDWIDTH_TABLE: [Bandwidth; 32] = [
    Bandwidth::Narrowband,
    Bandwidth::Narrowband,
    Bandwidth::Narrowband,
    Bandwidth::Narrowband,
    Bandwidth::Mediumband,
    Bandwidth::Mediumband,
    Bandwidth::Mediumband,
    Bandwidth::Mediumband,
    Bandwidth::Wideband,
    Bandwidth::Wideband,
    Bandwidth::Wideband,
    Bandwidth::Wideband,
    Bandwidth::Superwideband,
    Bandwidth::Superwideband,
    Bandwidth::Fullband,
    Bandwidth::Fullband,
    Bandwidth::Narrowband,
    Bandwidth::Narrowband,
    Bandwidth::Narrowband,
    Bandwidth::Narrowband,
    Bandwidth::Wideband,
    Bandwidth::Wideband,
    Bandwidth::Wideband,
    Bandwidth::Wideband,
    Bandwidth::Superwideband,
    Bandwidth::Superwideband,
    Bandwidth::Superwideband,
    Bandwidth::Superwideband,
    Bandwidth::Fullband,
    Bandwidth::Fullband,
    Bandwidth::Fullband,
    Bandwidth::Fullband,
];

/// Synthesizes a single-frame TOC byte for `mode`/`framerate_hz`/
/// `bandwidth`/`channels`.
///
/// `framerate_hz` is the *frame* rate (frames per second), not the audio
/// sampling rate, e.g. `50` for 20 ms frames. The frame-count bits
/// (bits 0-1) are always `0` (one frame); callers building multi-frame
/// packets OR in the frame-count code separately.
#[must_use]
pub fn gen_toc(mode: OpusMode, framerate_hz: u32, bandwidth: Bandwidth, channels: Channels) -> u8 {
    let mut framerate = framerate_hz.max(1);
    let mut period = 0u32;
    while framerate < 400 {
        framerate <<= 1;
        period += 1;
    }

    let config = match mode {
        OpusMode::SilkOnly => {
            let bw_offset = (bandwidth as i32 - Bandwidth::Narrowband as i32).max(0) as u8;
            let period_code = (period.saturating_sub(2) as u8) & 0x3;
            (bw_offset << 5) | (period_code << 3)
        }
        OpusMode::CeltOnly => {
            let bw_offset = (bandwidth as i32 - Bandwidth::Mediumband as i32).max(0) as u8;
            0x80 | (bw_offset << 5) | ((period as u8 & 0x3) << 3)
        }
        OpusMode::Hybrid => {
            let bw_offset = (bandwidth as i32 - Bandwidth::Superwideband as i32).max(0) as u8;
            0x60 | (bw_offset << 4) | ((period.saturating_sub(2) as u8 & 0x1) << 3)
        }
    };

    let stereo_bit = if channels == Channels::Stereo { 0x4 } else { 0x0 };
    config | stereo_bit
}

/// Encodes a frame length `n` (`0..=1275`) into `out`, returning the
/// number of bytes written (`1` or `2`).
///
/// # Errors
/// Returns [`OpusError::BadArg`] if `n > 1275` or `out` is too small.
pub fn encode_size(n: u16, out: &mut [u8]) -> Result<usize, OpusError> {
    if n > MAX_FRAME_BYTES as u16 {
        return Err(OpusError::BadArg);
    }
    if n < 252 {
        if out.is_empty() {
            return Err(OpusError::BadArg);
        }
        out[0] = n as u8;
        Ok(1)
    } else {
        if out.len() < 2 {
            return Err(OpusError::BadArg);
        }
        let b0 = 252 + (n & 3);
        let b1 = (n - b0) >> 2;
        out[0] = b0 as u8;
        out[1] = b1 as u8;
        Ok(2)
    }
}

/// Decodes a frame length from the front of `data`, returning
/// `(value, bytes_consumed)`.
///
/// # Errors
/// Returns [`OpusError::InvalidPacket`] if `data` is truncated.
pub fn parse_size(data: &[u8]) -> Result<(usize, usize), OpusError> {
    match data.first() {
        None => Err(OpusError::InvalidPacket),
        Some(&b0) if b0 < 252 => Ok((b0 as usize, 1)),
        Some(&b0) => match data.get(1) {
            None => Err(OpusError::InvalidPacket),
            Some(&b1) => Ok((4 * usize::from(b1) + usize::from(b0), 2)),
        },
    }
}

/// Returns the codec mode encoded in a packet's TOC byte.
#[must_use]
pub fn mode(packet: &[u8]) -> OpusMode {
    if packet[0] & 0x80 != 0 {
        OpusMode::CeltOnly
    } else if packet[0] & 0x60 == 0x60 {
        OpusMode::Hybrid
    } else {
        OpusMode::SilkOnly
    }
}

/// Returns the audio bandwidth encoded in a packet's TOC byte.
#[must_use]
pub fn bandwidth(packet: &[u8]) -> Bandwidth {
    let config = (packet[0] & 0xF8) >> 3;
    BANDWIDTH_TABLE[config as usize]
}

/// Returns the channel count encoded in a packet's TOC byte.
#[must_use]
pub fn channels(packet: &[u8]) -> Channels {
    if packet[0] & 0x4 != 0 {
        Channels::Stereo
    } else {
        Channels::Mono
    }
}

/// Returns the number of samples per frame a packet's TOC byte encodes,
/// for sample rate `fs`.
///
/// Pure TOC decode; does not look at the framing region. The SILK-only
/// 60 ms case (`period == 3`) is special-cased because `(fs << 3) / 100`
/// overshoots it.
#[must_use]
pub fn num_samples_per_frame(packet: &[u8], fs: SamplingRate) -> usize {
    let fs = fs as usize;
    if packet[0] & 0x80 != 0 {
        // CELT-only: periods 0..3 are 2.5/5/10/20 ms.
        let period = usize::from((packet[0] >> 3) & 0x3);
        (fs << period) / 400
    } else if (packet[0] & 0x60) == 0x60 {
        // Hybrid: only 10 ms / 20 ms are valid.
        if packet[0] & 0x08 != 0 {
            fs / 50
        } else {
            fs / 100
        }
    } else {
        // SILK-only: periods 0..3 are 10/20/40/60 ms.
        let period = usize::from((packet[0] >> 3) & 0x3);
        if period == 3 {
            fs * 60 / 1000
        } else {
            (fs << period) / 100
        }
    }
}

/// Returns the number of frames encoded in a packet's TOC + frame-count
/// byte, reading at most the first two bytes.
///
/// # Errors
/// Returns [`OpusError::InvalidPacket`] if the packet is empty, or uses
/// frame-count code 3 without its auxiliary byte.
pub fn num_frames(packet: &[u8]) -> Result<usize, OpusError> {
    if packet.is_empty() {
        return Err(OpusError::InvalidPacket);
    }
    match packet[0] & 0x3 {
        0 => Ok(1),
        1 | 2 => Ok(2),
        _ => {
            if packet.len() < 2 {
                Err(OpusError::InvalidPacket)
            } else {
                Ok(usize::from(packet[1] & 0x3F))
            }
        }
    }
}

/// Returns the total number of PCM samples a packet decodes to at sample
/// rate `fs`.
///
/// # Errors
/// Returns [`OpusError::InvalidPacket`] if the packet is malformed, or if
/// the decoded duration would exceed 120 ms.
pub fn num_samples(packet: &[u8], fs: SamplingRate) -> Result<usize, OpusError> {
    let count = num_frames(packet)?;
    let samples = count * num_samples_per_frame(packet, fs);
    if samples * 25 > fs as usize * 3 {
        Err(OpusError::InvalidPacket)
    } else {
        Ok(samples)
    }
}

/// Parses a packet's TOC byte and framing region into a [`ParsedPacket`].
///
/// `self_delimited` selects the self-delimited framing variant (RFC 6716
/// Appendix B), in which the last frame always carries an explicit length
/// prefix instead of being sized by the remainder of the buffer.
///
/// # Errors
/// Returns [`OpusError::InvalidPacket`] on any truncation or arithmetic
/// inconsistency (odd CBR remainder, oversized VBR length, frame count
/// outside `1..=48`, aggregate duration over 120 ms, trailing size over
/// 1275 bytes in non-self-delimited framing, ...).
pub fn parse_packet(packet: &[u8], self_delimited: bool) -> Result<ParsedPacket, OpusError> {
    if packet.is_empty() {
        return Err(OpusError::InvalidPacket);
    }

    let toc = packet[0];
    let framesize = num_samples_per_frame(packet, SamplingRate::Hz48000);

    let mut sizes = [0usize; MAX_FRAMES];
    let mut offset = 1usize;
    let mut len = packet.len() - offset;
    let mut last_size = len;
    let mut cbr = false;
    let mut pad = 0usize;

    let count = match toc & 0x3 {
        0 => 1,
        1 => {
            // Two CBR frames.
            cbr = true;
            if !self_delimited {
                if len & 0x1 == 1 {
                    return Err(OpusError::InvalidPacket);
                }
                last_size = len / 2;
                sizes[0] = last_size;
            }
            2
        }
        2 => {
            // Two VBR frames: one explicit length, one remainder.
            let (size0, consumed) = parse_size(&packet[offset..])?;
            len = len.checked_sub(consumed).ok_or(OpusError::InvalidPacket)?;
            if size0 > len {
                return Err(OpusError::InvalidPacket);
            }
            sizes[0] = size0;
            offset += consumed;
            last_size = len - size0;
            2
        }
        _ => {
            // Code 3: multi-frame, auxiliary count/flags byte.
            if len < 1 {
                return Err(OpusError::InvalidPacket);
            }
            let aux = usize::from(packet[offset]);
            offset += 1;
            len -= 1;

            let count = aux & 0x3F;
            if count == 0 || count > MAX_FRAMES || framesize * count > MAX_PACKET_SAMPLES_48K {
                return Err(OpusError::InvalidPacket);
            }

            // Padding flag is bit 6; each padding byte <255 terminates the
            // run and contributes its own value, 255 means "254 more, and
            // keep reading".
            if aux & 0x40 != 0 {
                loop {
                    let b = *packet.get(offset).ok_or(OpusError::InvalidPacket)?;
                    offset += 1;
                    len = len.checked_sub(1).ok_or(OpusError::InvalidPacket)?;
                    let chunk = if b == 255 { 254 } else { usize::from(b) };
                    len = len.checked_sub(chunk).ok_or(OpusError::InvalidPacket)?;
                    pad += chunk;
                    if b != 255 {
                        break;
                    }
                }
            }

            // VBR flag is bit 7 (inverted: clear means VBR).
            cbr = aux & 0x80 == 0;
            if !cbr {
                last_size = len;
                for size in sizes.iter_mut().take(count - 1) {
                    let (s, consumed) = parse_size(&packet[offset..])?;
                    len = len.checked_sub(consumed).ok_or(OpusError::InvalidPacket)?;
                    if s > len {
                        return Err(OpusError::InvalidPacket);
                    }
                    *size = s;
                    offset += consumed;
                    last_size = last_size
                        .checked_sub(consumed + s)
                        .ok_or(OpusError::InvalidPacket)?;
                }
            } else if !self_delimited {
                last_size = len / count;
                if last_size * count != len {
                    return Err(OpusError::InvalidPacket);
                }
                for size in sizes.iter_mut().take(count - 1) {
                    *size = last_size;
                }
            }
            count
        }
    };

    if self_delimited {
        let (size, consumed) = parse_size(&packet[offset..])?;
        len = len.checked_sub(consumed).ok_or(OpusError::InvalidPacket)?;
        if size > len {
            return Err(OpusError::InvalidPacket);
        }
        sizes[count - 1] = size;
        offset += consumed;
        if cbr {
            if size * count > len {
                return Err(OpusError::InvalidPacket);
            }
            for s in sizes.iter_mut().take(count - 1) {
                *s = size;
            }
        } else if consumed + size > last_size {
            return Err(OpusError::InvalidPacket);
        }
    } else {
        if last_size > MAX_FRAME_BYTES {
            return Err(OpusError::InvalidPacket);
        }
        sizes[count - 1] = last_size;
    }

    let payload_offset = offset;
    let mut frame_offsets = [0usize; MAX_FRAMES];
    for i in 0..count {
        frame_offsets[i] = offset;
        offset += sizes[i];
    }

    Ok(ParsedPacket {
        toc,
        frame_offsets,
        frame_sizes: sizes,
        frame_count: count,
        payload_offset,
        packet_offset: pad + offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nanorand::RNG;

    const TEST_PACKET_SINGLE: &[u8] = &[
        0x04, 0xDE, 0xAD,
    ];
    const TEST_PACKET_CBR: &[u8] = &[
        0x05, 0xAA, 0xBB, 0xCC, 0xDD,
    ];
    const TEST_PACKET_CBR_ODD: &[u8] = &[0x05, 0xAA, 0xBB, 0xCC];

    #[test]
    fn gen_toc_silk_wb_matches_reference() {
        assert_eq!(
            gen_toc(OpusMode::SilkOnly, 50, Bandwidth::Wideband, Channels::Mono),
            0x48
        );
    }

    #[test]
    fn gen_toc_sets_stereo_bit() {
        let toc = gen_toc(OpusMode::CeltOnly, 400, Bandwidth::Fullband, Channels::Stereo);
        assert_eq!(toc & 0x4, 0x4);
        assert_eq!(toc & 0x3, 0);
    }

    #[test]
    fn encode_size_round_trips_entire_domain() {
        let mut buf = [0u8; 2];
        for n in 0..=1275u16 {
            let written = encode_size(n, &mut buf).unwrap();
            let (value, consumed) = parse_size(&buf[..written]).unwrap();
            assert_eq!(value, n as usize);
            assert_eq!(consumed, written);
            assert!(consumed == 1 || consumed == 2);
        }
    }

    #[test]
    fn encode_size_matches_worked_example() {
        let mut buf = [0u8; 2];
        assert_eq!(encode_size(100, &mut buf).unwrap(), 1);
        assert_eq!(buf[0], 100);

        assert_eq!(encode_size(1000, &mut buf).unwrap(), 2);
        assert_eq!(buf, [252, 187]);
    }

    #[test]
    fn encode_size_rejects_out_of_range() {
        let mut buf = [0u8; 2];
        assert!(encode_size(1276, &mut buf).is_err());
    }

    #[test]
    fn parse_packet_single_frame() {
        let parsed = parse_packet(TEST_PACKET_SINGLE, false).unwrap();
        assert_eq!(parsed.toc, 0x04);
        assert_eq!(parsed.frame_count, 1);
        assert_eq!(parsed.frame_sizes[0], 2);
        assert_eq!(parsed.payload_offset, 1);
        assert_eq!(&parsed.frames(TEST_PACKET_SINGLE).collect::<Vec<_>>()[0], &[0xDE, 0xAD]);
    }

    #[test]
    fn parse_packet_two_cbr_frames() {
        let parsed = parse_packet(TEST_PACKET_CBR, false).unwrap();
        assert_eq!(parsed.frame_count, 2);
        assert_eq!(parsed.frame_sizes[0], 2);
        assert_eq!(parsed.frame_sizes[1], 2);
        assert_eq!(parsed.packet_offset, TEST_PACKET_CBR.len());
    }

    #[test]
    fn parse_packet_rejects_odd_cbr_remainder() {
        assert!(parse_packet(TEST_PACKET_CBR_ODD, false).is_err());
    }

    #[test]
    fn num_samples_per_frame_silk_nb_20ms() {
        // TOC 0x08: SILK-only, NB, period 1 -> config 1 in the RFC 6716
        // table 2 layout -> 20 ms -> 960 samples at 48 kHz.
        assert_eq!(num_samples_per_frame(&[0x08], SamplingRate::Hz48000), 960);
    }

    #[test]
    fn num_samples_hybrid_largest_case_has_no_overflow() {
        // Hybrid, 20 ms, stays within a 32-bit signed domain.
        let toc = 0x60 | 0x08;
        assert_eq!(num_samples_per_frame(&[toc], SamplingRate::Hz48000), 960);
    }

    #[test]
    fn num_samples_silk_60ms_is_2880_at_48k() {
        // period == 3 special case: (fs << 3) / 100 would overshoot.
        let toc = 0x18; // SILK-only, NB, period 3
        assert_eq!(num_samples_per_frame(&[toc], SamplingRate::Hz48000), 2880);
    }

    #[test]
    fn num_samples_rejects_over_120ms() {
        // 48 frames of 60ms SILK would be 2880ms, far over the 120ms cap.
        let mut packet = vec![0x18 | 0x3, 48];
        packet.extend(std::iter::repeat(0u8).take(48));
        assert!(num_samples(&packet, SamplingRate::Hz48000).is_err());
    }

    #[test]
    fn bandwidth_table_matches_reference_layout() {
        let bandwidths: Vec<Bandwidth> = (0..32u8).map(|c| bandwidth(&[c << 3])).collect();
        assert_eq!(bandwidths[0], Bandwidth::Narrowband);
        assert_eq!(bandwidths[4], Bandwidth::Mediumband);
        assert_eq!(bandwidths[8], Bandwidth::Wideband);
        assert_eq!(bandwidths[12], Bandwidth::Superwideband);
        assert_eq!(bandwidths[14], Bandwidth::Fullband);
    }

    #[test]
    fn channels_reads_stereo_bit() {
        assert_eq!(channels(&[0]), Channels::Mono);
        assert_eq!(channels(&[0x4]), Channels::Stereo);
    }

    #[test]
    fn encode_size_round_trips_random_frame_layouts() {
        let mut rnd = nanorand::WyRand::new_seed(42);
        let mut buf = [0u8; 2];
        for _ in 0..1024 {
            let n = rnd.generate_range::<u16>(0, MAX_FRAME_BYTES as u16 + 1);
            let written = encode_size(n, &mut buf).unwrap();
            let (value, consumed) = parse_size(&buf[..written]).unwrap();
            assert_eq!(value, n as usize);
            assert_eq!(consumed, written);
        }
    }

    #[test]
    fn num_frames_code_three_reads_aux_byte() {
        assert_eq!(num_frames(&[0]).unwrap(), 1);
        assert_eq!(num_frames(&[1]).unwrap(), 2);
        assert_eq!(num_frames(&[2]).unwrap(), 2);
        assert!(num_frames(&[3]).is_err());
        assert_eq!(num_frames(&[3, 5]).unwrap(), 5);
    }
}
