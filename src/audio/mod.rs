//! # Audio Encoding Module
//!
//! Turns the raw speech returned by the text-to-speech upstream into something
//! a browser can play straight from a JSON field.
//!
//! ## Audio Format:
//! - **Input**: base64 encoded 16-bit little-endian mono PCM, sample rate taken
//!   from the upstream mime type (`audio/L16;codec=pcm;rate=24000`)
//! - **Output**: a RIFF/WAVE file with a fixed 44-byte header, wrapped in a
//!   `data:audio/wav;base64,...` URI
//!
//! ## Key Components:
//! - **PcmAudioBuffer**: Decoded samples plus their sample rate
//! - **encode_wav**: Pure PCM → WAV transform

pub mod wav;    // PCM buffer, WAV container encoder, data URI helpers

pub use wav::{sample_rate_from_mime, wav_data_uri, PcmAudioBuffer};
