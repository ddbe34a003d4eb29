//! Audio samples and the engine primitive that creates them.

use std::{
    fmt,
    io::Cursor,
    sync::{Arc, OnceLock},
    thread,
};

use bitflags::bitflags;
use thiserror::Error;

bitflags! {
    /// How the engine should create a sample.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct SampleFlags: u32 {
        /// Decode fully into memory instead of streaming from disk.
        const CREATE_SAMPLE = 1 << 0;
        /// Playable as a positioned 3D source.
        const SPATIAL_3D = 1 << 1;
        /// Return immediately and finish decoding in the background.
        const NON_BLOCKING = 1 << 2;
    }
}

/// Error reported by the audio engine, with its own code and description.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("({code}) {message}")]
pub struct AudioEngineError {
    pub code: i32,
    pub message: String,
}

impl AudioEngineError {
    pub const FILE_BAD: i32 = 19;
    pub const FORMAT: i32 = 25;

    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Interleaved `f32` samples in `[-1.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct SoundData {
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleState {
    Loading,
    Ready,
    Failed,
}

type SampleSlot = Arc<OnceLock<Result<SoundData, AudioEngineError>>>;

/// An engine-managed sample. A non-blocking sample may still be loading when
/// it is handed out.
pub struct Sample {
    flags: SampleFlags,
    data: SampleSlot,
}

impl Sample {
    pub fn loaded(flags: SampleFlags, data: SoundData) -> Self {
        let slot = OnceLock::new();
        let _ = slot.set(Ok(data));
        Sample {
            flags,
            data: Arc::new(slot),
        }
    }

    /// A sample whose data arrives later through the returned [`PendingSample`].
    pub fn pending(flags: SampleFlags) -> (Self, PendingSample) {
        let data: SampleSlot = Arc::default();
        (
            Sample {
                flags,
                data: data.clone(),
            },
            PendingSample { data },
        )
    }

    pub fn flags(&self) -> SampleFlags {
        self.flags
    }

    pub fn state(&self) -> SampleState {
        match self.data.get() {
            None => SampleState::Loading,
            Some(Ok(_)) => SampleState::Ready,
            Some(Err(_)) => SampleState::Failed,
        }
    }

    pub fn sound_data(&self) -> Option<&SoundData> {
        self.data.get().and_then(|r| r.as_ref().ok())
    }
}

impl fmt::Debug for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sample")
            .field("flags", &self.flags)
            .field("state", &self.state())
            .finish()
    }
}

/// Completes a sample created with [`Sample::pending`].
pub struct PendingSample {
    data: SampleSlot,
}

impl PendingSample {
    pub fn complete(self, result: Result<SoundData, AudioEngineError>) {
        let _ = self.data.set(result);
    }
}

/// Creates samples from encoded audio bytes.
pub trait AudioEngine: Send + Sync {
    fn create_sample(
        &self,
        path: &str,
        bytes: Vec<u8>,
        flags: SampleFlags,
    ) -> Result<Sample, AudioEngineError>;
}

/// Engine backed by `hound`: decodes RIFF/WAVE data, whatever the extension.
#[derive(Clone, Copy, Debug, Default)]
pub struct WavAudioEngine;

impl WavAudioEngine {
    fn decode(bytes: &[u8]) -> Result<SoundData, AudioEngineError> {
        let mut reader = hound::WavReader::new(Cursor::new(bytes))
            .map_err(|e| AudioEngineError::new(AudioEngineError::FORMAT, e.to_string()))?;
        let spec = reader.spec();

        let samples: Result<Vec<f32>, _> = match spec.sample_format {
            hound::SampleFormat::Float => reader.samples::<f32>().collect(),
            hound::SampleFormat::Int => {
                let max_value = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|sample| sample.map(|s| s as f32 / max_value))
                    .collect()
            }
        };
        let samples =
            samples.map_err(|e| AudioEngineError::new(AudioEngineError::FILE_BAD, e.to_string()))?;

        Ok(SoundData {
            samples,
            channels: spec.channels,
            sample_rate: spec.sample_rate,
        })
    }
}

impl AudioEngine for WavAudioEngine {
    fn create_sample(
        &self,
        path: &str,
        bytes: Vec<u8>,
        flags: SampleFlags,
    ) -> Result<Sample, AudioEngineError> {
        if !flags.contains(SampleFlags::NON_BLOCKING) {
            return Self::decode(&bytes).map(|data| Sample::loaded(flags, data));
        }

        let (sample, pending) = Sample::pending(flags);
        let path = path.to_owned();
        thread::spawn(move || {
            let result = Self::decode(&bytes);
            if let Err(e) = &result {
                log::error!("background decode of {path} failed: {e}");
            }
            pending.complete(result);
        });
        Ok(sample)
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::testing::wav_bytes;

    #[test]
    fn blocking_decode_is_ready() {
        let sample = WavAudioEngine
            .create_sample("a.wav", wav_bytes(8), SampleFlags::CREATE_SAMPLE)
            .unwrap();
        assert_eq!(sample.state(), SampleState::Ready);
        let data = sample.sound_data().unwrap();
        assert_eq!(data.samples.len(), 8);
        assert_eq!(data.channels, 1);
        assert_eq!(data.sample_rate, 22050);
    }

    #[test]
    fn non_blocking_decode_finishes_in_background() {
        let flags = SampleFlags::CREATE_SAMPLE | SampleFlags::NON_BLOCKING;
        let sample = WavAudioEngine
            .create_sample("a.wav", wav_bytes(64), flags)
            .unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while sample.state() == SampleState::Loading && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(sample.state(), SampleState::Ready);
        assert!(sample.flags().contains(SampleFlags::NON_BLOCKING));
    }

    #[test]
    fn bad_data_reports_engine_error() {
        let err = WavAudioEngine
            .create_sample("a.ogg", b"OggS....".to_vec(), SampleFlags::CREATE_SAMPLE)
            .unwrap_err();
        assert_eq!(err.code, AudioEngineError::FORMAT);
    }
}
