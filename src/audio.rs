use hound::{WavReader, WavWriter};
use std::io::Cursor;
use std::path::Path;

pub fn wav_duration_seconds(path: &Path) -> Result<f64, hound::Error> {
    let reader = WavReader::open(path)?;
    Ok(reader_duration(&reader))
}

/// Duration of an in-memory WAV payload. Fails if the bytes are not a WAV.
pub fn wav_bytes_duration(bytes: &[u8]) -> Result<f64, hound::Error> {
    let reader = WavReader::new(Cursor::new(bytes))?;
    Ok(reader_duration(&reader))
}

fn reader_duration<R: std::io::Read>(reader: &WavReader<R>) -> f64 {
    let spec = reader.spec();
    let samples = reader.len();
    let frames = samples as f64 / spec.channels as f64;
    frames / spec.sample_rate as f64
}

/// Joins WAV payloads that share one format into a single WAV.
pub fn join_wav(parts: &[Vec<u8>]) -> Result<Vec<u8>, hound::Error> {
    if parts.len() == 1 {
        return Ok(parts[0].clone());
    }
    let first = parts.first().ok_or(hound::Error::FormatError("no audio parts to join"))?;
    let spec = WavReader::new(Cursor::new(first))?.spec();

    let mut out = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut out, spec)?;
        for part in parts {
            let mut reader = WavReader::new(Cursor::new(part))?;
            if reader.spec() != spec {
                return Err(hound::Error::FormatError("audio parts differ in format"));
            }
            for sample in reader.samples::<i16>() {
                writer.write_sample(sample?)?;
            }
        }
        writer.finalize()?;
    }
    Ok(out.into_inner())
}
