use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;

use base64::{engine::general_purpose, Engine as _};

use crate::audio::AudioBuffer;
use crate::error::Result;

/// Sample encoding used when writing WAV data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WavEncoding {
    /// 16-bit signed PCM, for the exported track.
    Pcm16,
    /// 32-bit IEEE float, lossless for cached clips.
    Float32,
}

impl WavEncoding {
    fn spec(self, buffer: &AudioBuffer) -> hound::WavSpec {
        match self {
            Self::Pcm16 => hound::WavSpec {
                channels: buffer.channels,
                sample_rate: buffer.sample_rate,
                bits_per_sample: 16,
                sample_format: hound::SampleFormat::Int,
            },
            Self::Float32 => hound::WavSpec {
                channels: buffer.channels,
                sample_rate: buffer.sample_rate,
                bits_per_sample: 32,
                sample_format: hound::SampleFormat::Float,
            },
        }
    }
}

/// Decode a WAV stream (integer PCM of any width, or float) into f32 samples.
pub fn read_wav<R: Read>(reader: R) -> Result<AudioBuffer> {
    let reader = hound::WavReader::new(reader)?;
    let spec = reader.spec();
    let samples = match spec.sample_format {
        hound::SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<Vec<_>, _>>()?
        }
    };
    AudioBuffer::new(samples, spec.sample_rate, spec.channels)
}

pub fn read_wav_file<P: AsRef<Path>>(path: P) -> Result<AudioBuffer> {
    let file = std::fs::File::open(path)?;
    read_wav(std::io::BufReader::new(file))
}

/// Encode `buffer` as a WAV stream.
pub fn write_wav<W: Write + Seek>(writer: W, buffer: &AudioBuffer, encoding: WavEncoding) -> Result<()> {
    let mut writer = hound::WavWriter::new(writer, encoding.spec(buffer))?;
    match encoding {
        WavEncoding::Pcm16 => {
            const I16_MAX_F32: f32 = i16::MAX as f32;
            for &s in &buffer.samples {
                writer.write_sample((s.clamp(-1.0, 1.0) * I16_MAX_F32) as i16)?;
            }
        }
        WavEncoding::Float32 => {
            for &s in &buffer.samples {
                writer.write_sample(s)?;
            }
        }
    }
    writer.finalize()?;
    Ok(())
}

pub fn write_wav_file<P: AsRef<Path>>(path: P, buffer: &AudioBuffer, encoding: WavEncoding) -> Result<()> {
    let file = std::fs::File::create(path)?;
    write_wav(std::io::BufWriter::new(file), buffer, encoding)
}

/// Encode as 16-bit PCM WAV and return Base64.
pub fn encode_wav_base64(buffer: &AudioBuffer) -> Result<String> {
    // WAV header (44 bytes) + 2 bytes per sample
    let mut cursor = Cursor::new(Vec::<u8>::with_capacity(44 + buffer.samples.len() * 2));
    write_wav(&mut cursor, buffer, WavEncoding::Pcm16)?;
    Ok(general_purpose::STANDARD.encode(cursor.into_inner()))
}
