use std::path::PathBuf;

/// Audio extensions probed, in order, when a requested sound is missing.
pub const DEFAULT_AUDIO_FORMATS: [&str; 3] = [".wav", ".ogg", ".flac"];

/// An OS directory mounted into the content VFS.
#[derive(Clone, Debug)]
pub struct MountConfig {
    pub prefix: PathBuf,
    pub root: PathBuf,
    pub name: String,
}

impl MountConfig {
    pub fn new(
        prefix: impl Into<PathBuf>,
        root: impl Into<PathBuf>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            root: root.into(),
            name: name.into(),
        }
    }
}

/// Runtime settings for a [`crate::ContentCache`].
#[derive(Clone, Debug)]
pub struct ContentConfig {
    /// When false every sound request returns "no resource" without touching the store.
    pub audio_enabled: bool,
    pub audio_formats: Vec<String>,
    pub mounts: Vec<MountConfig>,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            audio_enabled: true,
            audio_formats: DEFAULT_AUDIO_FORMATS.iter().map(|f| f.to_string()).collect(),
            mounts: Vec::new(),
        }
    }
}
