#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::panic)]
#![deny(clippy::unwrap_used)]
//! Opus packet framing, fixed-point DSP primitives and encoder-side frame
//! analysis.
//!
//! This crate implements the protocol-facing core of the Opus codec: the
//! Table-of-Contents (TOC) byte and multi-frame packet layout (RFC 6716
//! §3), the fixed-point Q-format arithmetic the reference encoder's
//! front-end is built from, the biquad high-pass/DC-reject/fade/soft-clip
//! signal conditioning applied before encoding, the recursive stereo
//! width estimator, and the Viterbi-based frame-size analyzer.
//!
//! The SILK and CELT payload codecs, the range coder and the Ogg
//! container are external collaborators and are out of scope here; this
//! crate only frames and conditions the PCM and packet bytes that flow
//! between a host application and those collaborators.

pub(crate) mod dsp;
pub(crate) mod error;
pub(crate) mod fixed_math;
pub(crate) mod framesizer;
pub(crate) mod packet;
pub(crate) mod stereo_width;
pub(crate) mod version;

pub use dsp::{dc_reject, hp_cutoff, hp_cutoff_coefficients, soft_clip, stereo_fade, gain_fade, smooth_fade};
pub use dsp::{DcRejectMemory, DeclipMemory, HighPassMemory, HpCoefficients};
pub use error::{strerror, OpusError};
pub use framesizer::{frame_size_select, optimize_framesize, FrameSize, FrameSizerMemory};
pub use packet::{
    bandwidth, channels, encode_size, gen_toc, mode, num_frames, num_samples, num_samples_per_frame,
    parse_packet, parse_size, ParsedPacket, MAX_FRAMES, MAX_FRAME_BYTES, MAX_PACKET_SAMPLES_48K,
};
pub use stereo_width::{compute_stereo_width, StereoWidthState};
pub use version::version_string;

// Affects the following targets: avr and msp430
#[cfg(any(target_pointer_width = "8", target_pointer_width = "16"))]
compile_error!("usize needs to be at least 32 bit wide");

/// Allows applications to use their own sample format.
pub trait Sample {
    /// Converts the given float into the custom sample.
    fn from_f32(float: f32) -> Self;
}

impl Sample for f32 {
    #[inline(always)]
    fn from_f32(float: f32) -> Self {
        float
    }
}

impl Sample for f64 {
    #[inline(always)]
    fn from_f32(float: f32) -> Self {
        float as f64
    }
}

impl Sample for i16 {
    #[inline(always)]
    fn from_f32(float: f32) -> Self {
        let float = float * 32768.0;
        if float > 32767.0 {
            32767
        } else if float < -32768.0 {
            -32768
        } else {
            float as i16
        }
    }
}

impl Sample for i32 {
    #[inline(always)]
    fn from_f32(float: f32) -> Self {
        let float = float * 2_147_483_648.0;
        if float > 2_147_483_647.0 {
            2_147_483_647
        } else if float < -2_147_483_648.0 {
            -2_147_483_648
        } else {
            float as i32
        }
    }
}

impl Sample for u16 {
    #[inline(always)]
    fn from_f32(float: f32) -> Self {
        let float = float * 32768.0 + 32768.0;
        if float > 32767.0 {
            32767
        } else if float < 0.0 {
            0
        } else {
            float as u16
        }
    }
}

impl Sample for u32 {
    #[inline(always)]
    fn from_f32(float: f32) -> Self {
        let float = float * 2_147_483_648.0 + 2_147_483_648.0;
        if float > 4_294_967_295.0 {
            4_294_967_295
        } else if float < 0.0 {
            0
        } else {
            float as u32
        }
    }
}

/// Audio channels.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Channels {
    /// Mono - 1 channel
    Mono = 1,
    /// Stereo - 2 channels
    Stereo = 2,
}

/// Samples per second.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SamplingRate {
    /// 8 kHz
    Hz8000 = 8000,
    /// 12 kHz
    Hz12000 = 12000,
    /// 16 kHz
    Hz16000 = 16000,
    /// 24 kHz
    Hz24000 = 24000,
    /// 48 kHz
    Hz48000 = 48000,
}

/// Audio bandwidth, ordered narrowest to widest. [`packet::gen_toc`]
/// relies on this ordering to compute the TOC's bandwidth-offset bits by
/// subtraction, so variants must not be reordered.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub enum Bandwidth {
    /// 4 kHz passband.
    Narrowband,
    /// 6 kHz passband.
    Mediumband,
    /// 8 kHz passband.
    Wideband,
    /// 12 kHz passband.
    Superwideband,
    /// 20 kHz passband.
    Fullband,
}

/// The three Opus operating modes, selecting which payload codec(s) a
/// frame uses.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OpusMode {
    /// SILK linear-prediction codec only (narrowband to wideband speech).
    SilkOnly,
    /// SILK below 8 kHz, CELT above (super-wideband/fullband speech).
    Hybrid,
    /// CELT MDCT codec only (music, low latency).
    CeltOnly,
}
