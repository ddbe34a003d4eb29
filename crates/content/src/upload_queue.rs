//! Marshals texture uploads onto the thread that owns the graphics context.
//!
//! The queue is created on the graphics thread around the device-side
//! uploader. Loader threads hold a [`MarshalledUploader`]; every call becomes
//! a request on a channel and blocks until the graphics thread runs
//! [`TextureUploadQueue::pump`]. On the graphics thread itself the marshalled
//! uploader calls the device directly, and a cache lookup that waits on
//! another thread's upload services the queue while it waits.

use std::{
    sync::Arc,
    thread::{self, ThreadId},
    time::Duration,
};

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::{TextureError, TextureHandle, TextureUploader};

enum UploadRequest {
    Upload {
        pixels: Vec<u8>,
        width: u32,
        height: u32,
        reply: Sender<Result<TextureHandle, TextureError>>,
    },
    Delete(TextureHandle),
}

/// The request channel plus what the graphics thread needs to service it.
#[derive(Clone)]
struct Servicer {
    receiver: Receiver<UploadRequest>,
    target: Arc<dyn TextureUploader>,
    owner: ThreadId,
}

impl Servicer {
    fn on_owner_thread(&self) -> bool {
        thread::current().id() == self.owner
    }

    fn drain(&self) -> usize {
        let mut serviced = 0;
        while let Ok(request) = self.receiver.try_recv() {
            self.service(request);
            serviced += 1;
        }
        serviced
    }

    fn service(&self, request: UploadRequest) {
        match request {
            UploadRequest::Upload {
                pixels,
                width,
                height,
                reply,
            } => {
                let result = self.target.upload_texture_2d(&pixels, width, height);
                // The requester may have given up; nothing to do then.
                let _ = reply.send(result);
            }
            UploadRequest::Delete(handle) => self.target.delete_texture(handle),
        }
    }
}

/// Graphics-thread end of the upload channel.
pub struct TextureUploadQueue {
    sender: Sender<UploadRequest>,
    servicer: Servicer,
}

impl TextureUploadQueue {
    /// Must be called on the thread that owns the graphics context; that
    /// thread becomes the only one allowed to reach `target`.
    pub fn new(target: Arc<dyn TextureUploader>) -> Self {
        let (sender, receiver) = unbounded();
        Self {
            sender,
            servicer: Servicer {
                receiver,
                target,
                owner: thread::current().id(),
            },
        }
    }

    pub fn uploader(&self) -> MarshalledUploader {
        MarshalledUploader {
            sender: self.sender.clone(),
            servicer: self.servicer.clone(),
        }
    }

    /// Requests waiting to be serviced.
    pub fn pending(&self) -> usize {
        self.servicer.receiver.len()
    }

    /// Runs every pending request. Returns how many ran.
    pub fn pump(&self) -> usize {
        self.servicer.drain()
    }

    /// Waits up to `timeout` for one request and runs it.
    pub fn pump_one(&self, timeout: Duration) -> bool {
        match self.servicer.receiver.recv_timeout(timeout) {
            Ok(request) => {
                self.servicer.service(request);
                true
            }
            Err(_) => false,
        }
    }
}

/// A [`TextureUploader`] usable from any thread: loader threads forward to the
/// graphics thread, the graphics thread goes straight to the device.
#[derive(Clone)]
pub struct MarshalledUploader {
    sender: Sender<UploadRequest>,
    servicer: Servicer,
}

impl TextureUploader for MarshalledUploader {
    fn upload_texture_2d(
        &self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> Result<TextureHandle, TextureError> {
        if self.servicer.on_owner_thread() {
            return self.servicer.target.upload_texture_2d(pixels, width, height);
        }
        let (reply, response) = crossbeam_channel::bounded(1);
        self.sender
            .send(UploadRequest::Upload {
                pixels: pixels.to_vec(),
                width,
                height,
                reply,
            })
            .map_err(|_| TextureError::Disconnected)?;
        response.recv().map_err(|_| TextureError::Disconnected)?
    }

    fn delete_texture(&self, handle: TextureHandle) {
        if self.servicer.on_owner_thread() {
            self.servicer.target.delete_texture(handle);
        } else if self.sender.send(UploadRequest::Delete(handle)).is_err() {
            log::warn!("graphics thread gone, {handle} leaked");
        }
    }

    fn service_pending(&self) -> usize {
        if self.servicer.on_owner_thread() {
            self.servicer.drain()
        } else {
            0
        }
    }
}
