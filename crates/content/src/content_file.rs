//! The per-asset descriptor handed to the content caches.

use std::sync::OnceLock;

use crate::{ContentError, ModuleRegistry, UNRESOLVED_MODULE, path};

/// Sink for the declarative form of a descriptor.
pub trait PropertyWriter {
    fn write_property(&mut self, name: &str, value: &str);
}

impl PropertyWriter for Vec<(String, String)> {
    fn write_property(&mut self, name: &str, value: &str) {
        self.push((name.to_owned(), value.to_owned()));
    }
}

/// Identifies one asset by its canonical path.
///
/// `extension`, `path_without_extension` and the content hash always match
/// `path`: [`ContentFile::set_data_path`] validates the new path before
/// replacing any of them. The descriptor never owns a decoded resource; many
/// descriptors may resolve to the same cached bitmap or sample.
#[derive(Debug, Default)]
pub struct ContentFile {
    path: String,
    extension: String,
    path_without_extension: String,
    /// Where the descriptor was declared, for diagnostics only.
    location: String,
    module_id: OnceLock<i32>,
    hash: OnceLock<u64>,
}

impl ContentFile {
    pub fn new(path: &str) -> Result<Self, ContentError> {
        let mut file = ContentFile::default();
        file.set_data_path(path)?;
        Ok(file)
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Canonicalizes `raw` and re-derives every path-dependent field.
    /// Fails without touching `self` when the path has no extension.
    pub fn set_data_path(&mut self, raw: &str) -> Result<(), ContentError> {
        let path = path::normalize_separators(raw);
        let extension = match path::extension_of(&path) {
            Some(ext) => ext.to_owned(),
            None => {
                return Err(ContentError::MissingExtension {
                    path,
                    location: self.location.clone(),
                });
            }
        };
        self.path_without_extension = path[..path.len() - extension.len()].to_owned();
        self.extension = extension;
        self.path = path;
        self.module_id = OnceLock::new();
        self.hash = OnceLock::new();
        Ok(())
    }

    pub fn data_path(&self) -> &str {
        &self.path
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn path_without_extension(&self) -> &str {
        &self.path_without_extension
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }

    pub fn content_hash(&self) -> u64 {
        *self.hash.get_or_init(|| path::content_hash(&self.path))
    }

    /// The memoized module id, or [`UNRESOLVED_MODULE`] if it was never resolved.
    pub fn cached_module_id(&self) -> i32 {
        self.module_id.get().copied().unwrap_or(UNRESOLVED_MODULE)
    }

    /// Resolves the owning module on first use. Unknown modules are not
    /// memoized so a later registration can still resolve them.
    pub fn data_module_id(&self, registry: &dyn ModuleRegistry) -> i32 {
        if let Some(id) = self.module_id.get() {
            return *id;
        }
        let id = registry.module_id_from_path(&self.path);
        if id != UNRESOLVED_MODULE {
            let _ = self.module_id.set(id);
        }
        id
    }

    pub fn read_property(&mut self, name: &str, value: &str) -> Result<(), ContentError> {
        match name {
            "FilePath" | "Path" => self.set_data_path(value),
            _ => Err(ContentError::UnknownProperty {
                name: name.to_owned(),
            }),
        }
    }

    pub fn save(&self, writer: &mut dyn PropertyWriter) {
        if !self.path.is_empty() {
            writer.write_property("FilePath", &self.path);
        }
    }
}

/// Copies the path and module id. The hash is re-derived on first use and the
/// declaration location belongs to the original only.
impl Clone for ContentFile {
    fn clone(&self) -> Self {
        ContentFile {
            path: self.path.clone(),
            extension: self.extension.clone(),
            path_without_extension: self.path_without_extension.clone(),
            location: String::new(),
            module_id: self.module_id.clone(),
            hash: OnceLock::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DataModules;

    #[test]
    fn path_parts_are_derived() {
        let file = ContentFile::new("x.png").unwrap();
        assert_eq!(file.data_path(), "x.png");
        assert_eq!(file.extension(), ".png");
        assert_eq!(file.path_without_extension(), "x");

        let file = ContentFile::new(r"Base.rte\Effects\smoke.bmp").unwrap();
        assert_eq!(file.data_path(), "Base.rte/Effects/smoke.bmp");
        assert_eq!(file.path_without_extension(), "Base.rte/Effects/smoke");
    }

    #[test]
    fn missing_extension_is_fatal() {
        let err = ContentFile::new("x").unwrap_err();
        assert!(matches!(err, ContentError::MissingExtension { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn trailing_dot_is_an_extension() {
        let file = ContentFile::new("Base.rte/odd.").unwrap();
        assert_eq!(file.extension(), ".");
        assert_eq!(file.path_without_extension(), "Base.rte/odd");
    }

    #[test]
    fn failed_set_keeps_previous_path() {
        let mut file = ContentFile::new("a.wav").unwrap();
        let hash = file.content_hash();
        assert!(file.set_data_path("no_extension").is_err());
        assert_eq!(file.data_path(), "a.wav");
        assert_eq!(file.extension(), ".wav");
        assert_eq!(file.content_hash(), hash);
    }

    #[test]
    fn hash_follows_path() {
        let mut file = ContentFile::new("a.png").unwrap();
        let before = file.content_hash();
        file.set_data_path("a.bmp").unwrap();
        assert_ne!(file.content_hash(), before);
        assert_eq!(file.content_hash(), path::content_hash("a.bmp"));
    }

    #[test]
    fn module_id_is_lazy_and_memoized() {
        let mut modules = DataModules::new();
        modules.register("Base.rte");
        let file = ContentFile::new("Base.rte/a.png").unwrap();
        assert_eq!(file.cached_module_id(), UNRESOLVED_MODULE);
        assert_eq!(file.data_module_id(&modules), 0);
        assert_eq!(file.cached_module_id(), 0);

        let copy = file.clone();
        assert_eq!(copy.cached_module_id(), 0);
    }

    #[test]
    fn clone_drops_location() {
        let file = ContentFile::new("a.png").unwrap().with_location("Actors.ini:12");
        let copy = file.clone();
        assert_eq!(copy.data_path(), "a.png");
        assert_eq!(copy.location(), "");
        assert_eq!(copy.content_hash(), file.content_hash());
    }

    #[test]
    fn properties_round_trip() {
        let mut file = ContentFile::default();
        file.read_property("Path", "Base.rte/a.png").unwrap();
        assert_eq!(file.data_path(), "Base.rte/a.png");
        file.read_property("FilePath", "Base.rte/b.png").unwrap();
        assert!(matches!(
            file.read_property("Frames", "3"),
            Err(ContentError::UnknownProperty { .. })
        ));

        let mut written: Vec<(String, String)> = Vec::new();
        file.save(&mut written);
        assert_eq!(
            written,
            vec![("FilePath".to_string(), "Base.rte/b.png".to_string())]
        );

        let mut written: Vec<(String, String)> = Vec::new();
        ContentFile::default().save(&mut written);
        assert!(written.is_empty());
    }
}
