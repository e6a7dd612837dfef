//! In-memory WAV encoding and decoding

use super::PcmBuffer;
use crate::{Result, VoiceError};
use std::io::Cursor;

/// Encode PCM as a 16-bit WAV file in memory
pub fn encode_wav(pcm: &PcmBuffer) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: pcm.channels,
        sample_rate: pcm.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for sample in &pcm.samples {
            writer.write_sample(*sample)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Decode a WAV file into 16-bit PCM
///
/// Accepts integer PCM of 8 to 32 bits and 32-bit float, converting to i16.
pub fn decode_wav(bytes: &[u8]) -> Result<PcmBuffer> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();

    let samples: Vec<i16> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, 16) => reader.samples::<i16>().collect::<std::result::Result<_, _>>()?,
        (hound::SampleFormat::Int, bits) if bits <= 32 => {
            let shift = bits as i32 - 16;
            reader
                .samples::<i32>()
                .map(|s| {
                    s.map(|v| {
                        if shift >= 0 {
                            (v >> shift) as i16
                        } else {
                            (v << -shift) as i16
                        }
                    })
                })
                .collect::<std::result::Result<_, _>>()?
        }
        (hound::SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * i16::MAX as f32) as i16))
            .collect::<std::result::Result<_, _>>()?,
        (format, bits) => {
            return Err(VoiceError::AudioDecode(format!(
                "unsupported WAV sample format {:?}/{} bits",
                format, bits
            )))
        }
    };

    if samples.is_empty() {
        return Err(VoiceError::AudioDecode("WAV contains no samples".to_string()));
    }

    Ok(PcmBuffer {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_then_decode() {
        let pcm = PcmBuffer::mono(vec![0, 1200, -1200, i16::MAX, i16::MIN], 16_000);
        let bytes = encode_wav(&pcm).unwrap();
        assert_eq!(&bytes[..4], b"RIFF");
        assert_eq!(decode_wav(&bytes).unwrap(), pcm);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = decode_wav(b"ID3\x03\x00 definitely an mp3").unwrap_err();
        assert!(matches!(err, VoiceError::AudioDecode(_)));
    }

    #[test]
    fn test_decode_rejects_empty_wav() {
        let bytes = encode_wav(&PcmBuffer::mono(Vec::new(), 8_000)).unwrap();
        assert!(decode_wav(&bytes).is_err());
    }
}
