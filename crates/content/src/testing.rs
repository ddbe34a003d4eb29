//! Fixtures and test doubles shared by the unit tests.

use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::{
    AudioEngine, AudioEngineError, Bitmap, ColorConversion, ImageDecoder, Palette, Sample,
    SampleFlags, StandardImageDecoder, TextureError, TextureHandle, TextureUploader,
    WavAudioEngine,
};

/// An RGBA image whose first column is transparent and the rest light gray.
pub(crate) fn encoded(format: image::ImageFormat, width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_fn(width, height, |x, _| {
        if x == 0 {
            image::Rgba([0, 0, 0, 0])
        } else {
            image::Rgba([200, 200, 200, 255])
        }
    });
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut out, format)
        .unwrap();
    out.into_inner()
}

pub(crate) fn wav_bytes(frames: usize) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 22050,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut out = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut out, spec).unwrap();
        for i in 0..frames {
            writer.write_sample((i as i16) * 100).unwrap();
        }
        writer.finalize().unwrap();
    }
    out.into_inner()
}

/// Writes `rel` under `root`, creating parent directories.
pub(crate) fn write_file(root: &Path, rel: &str, bytes: &[u8]) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, bytes).unwrap();
}

pub(crate) fn write_png(root: &Path, rel: &str) {
    write_file(root, rel, &encoded(image::ImageFormat::Png, 4, 2));
}

pub(crate) fn write_bmp(root: &Path, rel: &str) {
    write_file(root, rel, &encoded(image::ImageFormat::Bmp, 4, 2));
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Records uploads and deletions instead of talking to a device.
#[derive(Default)]
pub(crate) struct RecordingUploader {
    uploads: Mutex<Vec<(TextureHandle, u32, u32)>>,
    deleted: Mutex<Vec<TextureHandle>>,
}

impl RecordingUploader {
    pub(crate) fn upload_count(&self) -> usize {
        lock(&self.uploads).len()
    }

    pub(crate) fn uploads(&self) -> Vec<(TextureHandle, u32, u32)> {
        lock(&self.uploads).clone()
    }

    pub(crate) fn deleted(&self) -> Vec<TextureHandle> {
        lock(&self.deleted).clone()
    }
}

impl TextureUploader for RecordingUploader {
    fn upload_texture_2d(
        &self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> Result<TextureHandle, TextureError> {
        TextureError::check_rgba(pixels, width, height)?;
        let handle = TextureHandle::new();
        lock(&self.uploads).push((handle, width, height));
        Ok(handle)
    }

    fn delete_texture(&self, handle: TextureHandle) {
        lock(&self.deleted).push(handle);
    }
}

/// Always refuses to allocate a texture.
pub(crate) struct FailingUploader;

impl TextureUploader for FailingUploader {
    fn upload_texture_2d(&self, _: &[u8], _: u32, _: u32) -> Result<TextureHandle, TextureError> {
        Err(TextureError::Rejected("out of video memory".into()))
    }

    fn delete_texture(&self, _: TextureHandle) {}
}

/// [`StandardImageDecoder`] that counts its calls.
#[derive(Default)]
pub(crate) struct CountingDecoder {
    calls: AtomicUsize,
}

impl CountingDecoder {
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ImageDecoder for CountingDecoder {
    fn decode(
        &self,
        bytes: &[u8],
        conversion: ColorConversion,
        palette: &Palette,
    ) -> Result<Bitmap, image::ImageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        StandardImageDecoder.decode(bytes, conversion, palette)
    }
}

/// [`WavAudioEngine`] that records every path and flag set it was asked for.
#[derive(Default)]
pub(crate) struct CountingEngine {
    requests: Mutex<Vec<(String, SampleFlags)>>,
}

impl CountingEngine {
    pub(crate) fn requests(&self) -> Vec<(String, SampleFlags)> {
        lock(&self.requests).clone()
    }
}

impl AudioEngine for CountingEngine {
    fn create_sample(
        &self,
        path: &str,
        bytes: Vec<u8>,
        flags: SampleFlags,
    ) -> Result<Sample, AudioEngineError> {
        lock(&self.requests).push((path.to_owned(), flags));
        WavAudioEngine.create_sample(path, bytes, flags)
    }
}
