//! In-memory audio fixtures

use std::io::Cursor;

/// Mono 16-bit WAV of silence at 8 kHz
pub fn silent_wav(duration_seconds: u32) -> Vec<u8> {
    let sample_rate = 8000;
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut buf = Vec::new();
    let mut writer = hound::WavWriter::new(Cursor::new(&mut buf), spec).unwrap();
    for _ in 0..duration_seconds * sample_rate {
        writer.write_sample(0i16).unwrap();
    }
    writer.finalize().unwrap();
    buf
}
