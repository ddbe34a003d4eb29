use thiserror::Error;

use crate::{AudioEngineError, TextureError};

/// How a caller must treat a failed load.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    /// Mandatory content is missing or broken; the caller cannot continue.
    Fatal,
    /// Optional content is absent; the caller treats it as "no resource".
    Recoverable,
}

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("failed to find file extension when trying to find file with path and name:\n{path}\n{location}")]
    MissingExtension { path: String, location: String },

    #[error("failed to find image file with following path and name:\n\n{path} or {alt_extension}\n{location}")]
    ImageNotFound {
        path: String,
        alt_extension: String,
        location: String,
    },

    #[error(
        "failed to load image file with following path and name:\n\n{path}\n{location}\nThe file may be corrupt, incorrectly converted or saved with unsupported parameters."
    )]
    ImageDecode {
        path: String,
        location: String,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to upload texture for {path}")]
    TextureUpload {
        path: String,
        #[source]
        source: TextureError,
    },

    #[error("failed to read {path} from the content store")]
    Store {
        path: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to find audio file with following path and name:\n\n{path} or any alternative supported file type\n{location}")]
    SoundNotFound { path: String, location: String },

    #[error("failed to create sound because the file was empty. The path and name were:\n\n{path}\n{location}")]
    EmptySound { path: String, location: String },

    #[error("failed to create sound because of audio engine error:\n{source}\nThe path and name were:\n\n{path}\n{location}")]
    SoundEngine {
        path: String,
        location: String,
        #[source]
        source: AudioEngineError,
    },

    #[error("unknown property {name:?} for ContentFile")]
    UnknownProperty { name: String },
}

impl ContentError {
    pub fn severity(&self) -> Severity {
        match self {
            ContentError::SoundNotFound { .. }
            | ContentError::EmptySound { .. }
            | ContentError::SoundEngine { .. } => Severity::Recoverable,
            _ => Severity::Fatal,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}
