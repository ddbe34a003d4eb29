use std::{fmt, sync::Arc};

use thiserror::Error;
use uuid::Uuid;

/// Device-side identity of an uploaded texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureHandle(Uuid);

impl TextureHandle {
    pub fn new() -> Self {
        TextureHandle(Uuid::new_v4())
    }
}

impl Default for TextureHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl From<TextureHandle> for Uuid {
    fn from(handle: TextureHandle) -> Self {
        handle.0
    }
}

impl fmt::Display for TextureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "texture:{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum TextureError {
    #[error("pixel buffer of {len} bytes does not match a {width}x{height} RGBA texture")]
    SizeMismatch { len: usize, width: u32, height: u32 },
    #[error("texture upload rejected: {0}")]
    Rejected(String),
    #[error("the graphics thread stopped servicing texture uploads")]
    Disconnected,
}

impl TextureError {
    pub(crate) fn check_rgba(pixels: &[u8], width: u32, height: u32) -> Result<(), TextureError> {
        if width == 0 || height == 0 || pixels.len() != width as usize * height as usize * 4 {
            return Err(TextureError::SizeMismatch {
                len: pixels.len(),
                width,
                height,
            });
        }
        Ok(())
    }
}

/// The GPU side of the content cache: creates 2D RGBA textures and deletes them.
///
/// Implementations must be called on the thread that owns the graphics
/// context; see [`crate::MarshalledUploader`] to call in from other threads.
pub trait TextureUploader: Send + Sync {
    fn upload_texture_2d(
        &self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> Result<TextureHandle, TextureError>;

    fn delete_texture(&self, handle: TextureHandle);

    /// Runs uploads deferred to the calling thread, if this uploader defers
    /// any. Called while a load waits on another thread's upload.
    fn service_pending(&self) -> usize {
        0
    }
}

/// A texture bound to the bitmap it was uploaded from. Dropping it deletes the
/// device texture.
pub struct GpuTexture {
    handle: TextureHandle,
    uploader: Arc<dyn TextureUploader>,
}

impl GpuTexture {
    pub(crate) fn upload(
        uploader: &Arc<dyn TextureUploader>,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Self, TextureError> {
        let handle = uploader.upload_texture_2d(pixels, width, height)?;
        Ok(GpuTexture {
            handle,
            uploader: uploader.clone(),
        })
    }

    pub fn handle(&self) -> TextureHandle {
        self.handle
    }
}

impl Drop for GpuTexture {
    fn drop(&mut self) {
        log::debug!("releasing {}", self.handle);
        self.uploader.delete_texture(self.handle);
    }
}

impl fmt::Debug for GpuTexture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("GpuTexture").field(&self.handle).finish()
    }
}
