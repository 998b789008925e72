//! # PCM to WAV Encoding
//!
//! The speech upstream hands back headerless PCM, which browsers refuse to play.
//! This module prefixes the canonical 44-byte RIFF/WAVE header so the samples
//! can be embedded directly in a data URI.
//!
//! ## Header Layout (all integers little-endian):
//! ```text
//! 0  "RIFF"   4  36 + data_len   8  "WAVE"
//! 12 "fmt "   16 16              20 1 (PCM)      22 channels
//! 24 rate     28 byte rate       32 block align  34 bits per sample
//! 36 "data"   40 data_len        44 samples...
//! ```

use base64::{engine::general_purpose::STANDARD, Engine as _};
use byteorder::{ByteOrder, LittleEndian};

/// Sample rate assumed when the upstream mime type doesn't carry one.
pub const DEFAULT_SAMPLE_RATE: u32 = 24_000;

/// Size of the RIFF/WAVE header written before the sample data.
pub const WAV_HEADER_LEN: usize = 44;

const CHANNEL_COUNT: u16 = 1;
const BITS_PER_SAMPLE: u16 = 16;
const BYTES_PER_SAMPLE: u16 = BITS_PER_SAMPLE / 8;
const FORMAT_PCM: u16 = 1;
const FMT_CHUNK_LEN: u32 = 16;

/// Mono 16-bit PCM audio waiting to be wrapped in a container.
///
/// ## Lifecycle:
/// Built once from an upstream payload, consumed once by [`PcmAudioBuffer::encode_wav`].
/// The channel count is fixed at one; the speech endpoint only produces mono.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmAudioBuffer {
    /// Samples in playback order
    pub samples: Vec<i16>,

    /// Samples per second
    pub sample_rate: u32,
}

impl PcmAudioBuffer {
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    pub fn channel_count(&self) -> u16 {
        CHANNEL_COUNT
    }

    /// Reinterpret raw little-endian bytes as 16-bit samples.
    ///
    /// An odd byte count can't be 16-bit PCM, so it is rejected rather than
    /// silently dropping the trailing byte.
    pub fn from_le_bytes(data: &[u8], sample_rate: u32) -> Result<Self, String> {
        if data.len() % 2 != 0 {
            return Err(format!(
                "PCM payload length must be even for 16-bit samples, got {} bytes",
                data.len()
            ));
        }

        let mut samples = vec![0i16; data.len() / 2];
        LittleEndian::read_i16_into(data, &mut samples);

        Ok(Self::new(samples, sample_rate))
    }

    /// Decode a base64 PCM payload as returned in `inlineData.data`.
    pub fn from_base64(encoded: &str, sample_rate: u32) -> Result<Self, String> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| format!("Audio payload is not valid base64: {}", e))?;

        Self::from_le_bytes(&bytes, sample_rate)
    }

    /// Length of the sample data in bytes.
    pub fn data_len(&self) -> usize {
        self.samples.len() * BYTES_PER_SAMPLE as usize
    }

    /// Produce a complete WAV file: 44-byte header followed by the samples.
    ///
    /// Size fields are 32-bit, so they wrap exactly like any other RIFF writer
    /// would for payloads past 4 GiB. The sample rate is written as given.
    pub fn encode_wav(&self) -> Vec<u8> {
        let data_len = self.data_len();
        let data_len_field = data_len as u32;
        let channels = self.channel_count();
        let block_align = channels * BYTES_PER_SAMPLE;
        let byte_rate = self.sample_rate.wrapping_mul(block_align as u32);

        let mut out = vec![0u8; WAV_HEADER_LEN + data_len];

        out[0..4].copy_from_slice(b"RIFF");
        LittleEndian::write_u32(&mut out[4..8], data_len_field.wrapping_add(36));
        out[8..12].copy_from_slice(b"WAVE");

        out[12..16].copy_from_slice(b"fmt ");
        LittleEndian::write_u32(&mut out[16..20], FMT_CHUNK_LEN);
        LittleEndian::write_u16(&mut out[20..22], FORMAT_PCM);
        LittleEndian::write_u16(&mut out[22..24], channels);
        LittleEndian::write_u32(&mut out[24..28], self.sample_rate);
        LittleEndian::write_u32(&mut out[28..32], byte_rate);
        LittleEndian::write_u16(&mut out[32..34], block_align);
        LittleEndian::write_u16(&mut out[34..36], BITS_PER_SAMPLE);

        out[36..40].copy_from_slice(b"data");
        LittleEndian::write_u32(&mut out[40..44], data_len_field);

        LittleEndian::write_i16_into(&self.samples, &mut out[WAV_HEADER_LEN..]);

        out
    }
}

/// Pull the sample rate out of a mime type such as `audio/L16;codec=pcm;rate=24000`.
///
/// Falls back to [`DEFAULT_SAMPLE_RATE`] when there is no usable `rate=` parameter.
pub fn sample_rate_from_mime(mime_type: &str) -> u32 {
    mime_type
        .split(';')
        .filter_map(|param| param.trim().strip_prefix("rate="))
        .find_map(|value| {
            let digits: String = value.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse::<u32>().ok()
        })
        .unwrap_or(DEFAULT_SAMPLE_RATE)
}

/// Wrap an encoded WAV file in a data URI.
pub fn wav_data_uri(wav: &[u8]) -> String {
    format!("data:audio/wav;base64,{}", STANDARD.encode(wav))
}
