//! WAV decoding and amplitude extraction for lip sync.

use std::io::Cursor;

use anyhow::Context;
use base64::Engine;

/// Samples per amplitude frame handed to the lip-sync animator.
pub const LIP_SYNC_HOP: usize = 1024;

/// Decode a WAV payload into mono f32 samples plus its sample rate.
pub fn decode_wav(wav: &[u8]) -> anyhow::Result<(Vec<f32>, u32)> {
    let mut reader =
        hound::WavReader::new(Cursor::new(wav)).context("synthesized payload is not valid WAV")?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let max = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max))
                .collect::<Result<_, _>>()
                .context("bad WAV sample")?
        }
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .context("bad WAV sample")?,
    };

    // Fold interleaved channels down to mono.
    let samples = if spec.channels > 1 {
        let ch = spec.channels as usize;
        samples
            .chunks(ch)
            .map(|frame| frame.iter().sum::<f32>() / ch as f32)
            .collect()
    } else {
        samples
    };

    Ok((samples, spec.sample_rate))
}

/// RMS amplitude per hop, the envelope driving the avatar's mouth.
pub fn amplitude_envelope(samples: &[f32], hop: usize) -> Vec<f32> {
    samples
        .chunks(hop)
        .map(|frame| {
            let energy: f32 = frame.iter().map(|s| s * s).sum();
            (energy / frame.len() as f32).sqrt()
        })
        .collect()
}

/// Encode a WAV payload as a base64 audio data URI for transport to the
/// renderer.
pub fn encode_wav_base64(wav: &[u8]) -> String {
    format!(
        "data:audio/wav;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(wav)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_wav(samples: &[f32], sample_rate: u32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer
                    .write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                    .unwrap();
            }
        }
        cursor.into_inner()
    }

    #[test]
    fn decode_round_trips_sample_rate_and_length() {
        let wav = test_wav(&[0.0, 0.5, -0.5, 0.25], 24000);
        let (samples, rate) = decode_wav(&wav).unwrap();
        assert_eq!(rate, 24000);
        assert_eq!(samples.len(), 4);
        assert!((samples[1] - 0.5).abs() < 0.001);
    }

    #[test]
    fn envelope_tracks_loudness() {
        let mut samples = vec![0.0f32; LIP_SYNC_HOP];
        samples.extend(vec![0.8f32; LIP_SYNC_HOP]);
        let env = amplitude_envelope(&samples, LIP_SYNC_HOP);
        assert_eq!(env.len(), 2);
        assert!(env[0] < 0.01);
        assert!((env[1] - 0.8).abs() < 0.01);
    }

    #[test]
    fn garbage_payload_is_rejected() {
        assert!(decode_wav(b"not a wav").is_err());
    }
}
