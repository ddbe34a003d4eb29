//! Alternate-file probing for content that is missing under its declared name.
//!
//! The resolver only probes; the cache applies a [`Resolution`] to the
//! descriptor and records the advisory [`LoadWarning`].

use std::fmt;

use crate::{
    ContentFile, Vfs,
    path::{alternate_image_extension, extension_of, frame_path},
};

/// A fallback that succeeded under another extension. Never a failure: it
/// points at an authoring inconsistency.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadWarning {
    pub path: String,
    pub location: String,
    pub alt_extension: String,
}

impl fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "data path \"{}\" not found, loaded the file with \"{}\" extension instead",
            self.path, self.alt_extension
        )?;
        if !self.location.is_empty() {
            write!(f, " (referenced in {})", self.location)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// The requested path exists as written.
    Exact,
    Substitute {
        /// File to decode.
        load_path: String,
        /// New path for the descriptor.
        descriptor_path: String,
        /// Substituted extension when the substitution deserves a warning.
        warning: Option<String>,
    },
    Missing {
        /// What was tried besides the requested path, for diagnostics.
        alternative: String,
    },
}

pub struct FallbackResolver<'a> {
    vfs: &'a Vfs,
}

impl<'a> FallbackResolver<'a> {
    pub fn new(vfs: &'a Vfs) -> Self {
        Self { vfs }
    }

    /// Single image or animation frame: swap `.png` and `.bmp`.
    pub fn image(&self, load_path: &str, file: &ContentFile) -> Resolution {
        if self.vfs.exists(load_path) {
            return Resolution::Exact;
        }
        let Some(extension) = extension_of(load_path) else {
            return Resolution::Missing {
                alternative: alternate_image_extension(file.extension()).to_owned(),
            };
        };
        let base = &load_path[..load_path.len() - extension.len()];
        let alt = alternate_image_extension(extension);

        let candidate = format!("{base}{alt}");
        if self.vfs.exists(&candidate) {
            return Resolution::Substitute {
                load_path: candidate,
                descriptor_path: format!("{}{alt}", file.path_without_extension()),
                warning: Some(alt.to_owned()),
            };
        }
        Resolution::Missing {
            alternative: alt.to_owned(),
        }
    }

    /// An animation declared with one frame may still be named like frame 0.
    /// The `000` name with the declared extension is normal and silent; with
    /// the other image extension it warns.
    pub fn first_frame(&self, file: &ContentFile) -> Resolution {
        if self.vfs.exists(file.data_path()) {
            return Resolution::Exact;
        }
        let base = file.path_without_extension();
        let same = frame_path(base, 0, file.extension());
        if self.vfs.exists(&same) {
            return Resolution::Substitute {
                load_path: same.clone(),
                descriptor_path: same,
                warning: None,
            };
        }
        let alt = alternate_image_extension(file.extension());
        let other = frame_path(base, 0, alt);
        if self.vfs.exists(&other) {
            return Resolution::Substitute {
                load_path: other.clone(),
                descriptor_path: other,
                warning: Some(alt.to_owned()),
            };
        }
        Resolution::Missing {
            alternative: format!("{same} or {other}"),
        }
    }

    /// Sounds: try each supported audio extension in order.
    pub fn audio(&self, file: &ContentFile, formats: &[String]) -> Resolution {
        if self.vfs.exists(file.data_path()) {
            return Resolution::Exact;
        }
        for extension in formats {
            let candidate = format!("{}{extension}", file.path_without_extension());
            if self.vfs.exists(&candidate) {
                return Resolution::Substitute {
                    load_path: candidate.clone(),
                    descriptor_path: candidate,
                    warning: Some(extension.clone()),
                };
            }
        }
        Resolution::Missing {
            alternative: "any alternative supported file type".to_owned(),
        }
    }
}
