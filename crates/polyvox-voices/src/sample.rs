//! Minimal validation of uploaded voice samples

use crate::error::ProfileError;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Supported sample container formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    Wav,
    Mp3,
    Ogg,
}

impl SampleFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            SampleFormat::Wav => "wav",
            SampleFormat::Mp3 => "mp3",
            SampleFormat::Ogg => "ogg",
        }
    }
}

/// An uploaded speaker sample, referenced by path.
#[derive(Debug, Clone)]
pub struct VoiceSample {
    path: PathBuf,
}

impl VoiceSample {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Minimal validation: readable, non-empty, recognized container.
    /// WAV samples are additionally parsed to confirm a sane header.
    pub fn validate(&self) -> Result<SampleFormat, ProfileError> {
        let mut file = File::open(&self.path).map_err(|e| {
            ProfileError::InvalidSample(format!("{}: {}", self.path.display(), e))
        })?;

        let mut header = [0u8; 12];
        let read = file.read(&mut header).map_err(|e| {
            ProfileError::InvalidSample(format!("{}: {}", self.path.display(), e))
        })?;
        if read == 0 {
            return Err(ProfileError::InvalidSample(format!(
                "{}: empty file",
                self.path.display()
            )));
        }

        if read >= 12 && &header[0..4] == b"RIFF" && &header[8..12] == b"WAVE" {
            let reader = hound::WavReader::open(&self.path).map_err(|e| {
                ProfileError::InvalidSample(format!("{}: {}", self.path.display(), e))
            })?;
            if reader.duration() == 0 {
                return Err(ProfileError::InvalidSample(format!(
                    "{}: zero-length audio",
                    self.path.display()
                )));
            }
            return Ok(SampleFormat::Wav);
        }

        if read >= 4 && &header[0..4] == b"OggS" {
            return Ok(SampleFormat::Ogg);
        }

        // ID3-tagged or bare MPEG frame sync
        if read >= 3 && &header[0..3] == b"ID3" {
            return Ok(SampleFormat::Mp3);
        }
        if read >= 2 && header[0] == 0xFF && header[1] & 0xE0 == 0xE0 {
            return Ok(SampleFormat::Mp3);
        }

        Err(ProfileError::InvalidSample(format!(
            "{}: unsupported format",
            self.path.display()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(bytes: &[u8], ext: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(format!("sample.{}", ext));
        let mut f = File::create(&path).unwrap();
        f.write_all(bytes).unwrap();
        (dir, path)
    }

    fn write_wav(dir: &Path, samples: u32) -> PathBuf {
        let path = dir.join("sample.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 22_050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..samples {
            writer.write_sample((i % 128) as i16).unwrap();
        }
        writer.finalize().unwrap();
        path
    }

    #[test]
    fn valid_wav_passes() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), 2_048);
        assert_eq!(
            VoiceSample::new(&path).validate().unwrap(),
            SampleFormat::Wav
        );
    }

    #[test]
    fn zero_length_wav_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), 0);
        assert!(matches!(
            VoiceSample::new(&path).validate(),
            Err(ProfileError::InvalidSample(_))
        ));
    }

    #[test]
    fn empty_file_is_rejected() {
        let (_dir, path) = write_temp(b"", "wav");
        assert!(matches!(
            VoiceSample::new(&path).validate(),
            Err(ProfileError::InvalidSample(_))
        ));
    }

    #[test]
    fn missing_file_is_rejected() {
        let sample = VoiceSample::new("/nonexistent/sample.wav");
        assert!(matches!(
            sample.validate(),
            Err(ProfileError::InvalidSample(_))
        ));
    }

    #[test]
    fn mp3_and_ogg_magic_pass() {
        let (_d1, mp3) = write_temp(b"ID3\x04\x00rest-of-file", "mp3");
        assert_eq!(
            VoiceSample::new(&mp3).validate().unwrap(),
            SampleFormat::Mp3
        );

        let (_d2, sync) = write_temp(&[0xFF, 0xFB, 0x90, 0x00, 1, 2, 3], "mp3");
        assert_eq!(
            VoiceSample::new(&sync).validate().unwrap(),
            SampleFormat::Mp3
        );

        let (_d3, ogg) = write_temp(b"OggS\x00\x02more-bytes", "ogg");
        assert_eq!(
            VoiceSample::new(&ogg).validate().unwrap(),
            SampleFormat::Ogg
        );
    }

    #[test]
    fn unknown_format_is_rejected() {
        let (_dir, path) = write_temp(b"plain text, not audio", "txt");
        assert!(matches!(
            VoiceSample::new(&path).validate(),
            Err(ProfileError::InvalidSample(_))
        ));
    }
}
