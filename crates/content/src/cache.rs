//! The content cache service: bitmaps per color depth, audio samples, and the
//! bookkeeping shared between them.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use crate::{
    AudioEngine, BitDepth, Bitmap, ColorConversion, ContentConfig, ContentError, ContentFile,
    DataModules, FallbackResolver, GpuTexture, ImageDecoder, LoadWarning, ModuleRegistry, Palette,
    PathHashes, Resolution, Sample, SampleFlags, Severity, StandardImageDecoder, TextureUploader,
    Vfs,
    load_map::LoadMap,
    path::{extension_of, frame_path},
};

/// Loads content files at most once and hands out shared handles.
///
/// Construct one at startup with [`ContentCache::builder`], share it through an
/// `Arc`, and call [`ContentCache::free_all_loaded`] before the graphics
/// context goes away.
pub struct ContentCache {
    config: ContentConfig,
    vfs: Vfs,
    modules: Arc<dyn ModuleRegistry>,
    decoder: Arc<dyn ImageDecoder>,
    uploader: Option<Arc<dyn TextureUploader>>,
    audio: Option<Arc<dyn AudioEngine>>,
    palette: RwLock<Palette>,
    bitmaps: [LoadMap<Bitmap>; 2],
    samples: LoadMap<Sample>,
    hashes: PathHashes,
    warnings: Mutex<Vec<LoadWarning>>,
}

pub struct ContentCacheBuilder {
    config: ContentConfig,
    vfs: Option<Vfs>,
    modules: Arc<dyn ModuleRegistry>,
    decoder: Arc<dyn ImageDecoder>,
    uploader: Option<Arc<dyn TextureUploader>>,
    audio: Option<Arc<dyn AudioEngine>>,
    palette: Palette,
}

impl ContentCacheBuilder {
    pub fn config(mut self, config: ContentConfig) -> Self {
        self.config = config;
        self
    }

    /// Use an existing VFS instead of mounting `config.mounts`.
    pub fn vfs(mut self, vfs: Vfs) -> Self {
        self.vfs = Some(vfs);
        self
    }

    pub fn modules(mut self, modules: Arc<dyn ModuleRegistry>) -> Self {
        self.modules = modules;
        self
    }

    pub fn decoder(mut self, decoder: Arc<dyn ImageDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    /// Without an uploader 32-bit bitmaps are decoded but carry no texture.
    pub fn uploader(mut self, uploader: Arc<dyn TextureUploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    /// Without an engine every sound request returns "no resource".
    pub fn audio_engine(mut self, engine: Arc<dyn AudioEngine>) -> Self {
        self.audio = Some(engine);
        self
    }

    pub fn palette(mut self, palette: Palette) -> Self {
        self.palette = palette;
        self
    }

    pub fn build(self) -> ContentCache {
        let vfs = self.vfs.unwrap_or_else(|| Vfs::from_config(&self.config));
        ContentCache {
            config: self.config,
            vfs,
            modules: self.modules,
            decoder: self.decoder,
            uploader: self.uploader,
            audio: self.audio,
            palette: RwLock::new(self.palette),
            bitmaps: Default::default(),
            samples: LoadMap::default(),
            hashes: PathHashes::new(),
            warnings: Mutex::new(Vec::new()),
        }
    }
}

impl ContentCache {
    pub fn builder() -> ContentCacheBuilder {
        ContentCacheBuilder {
            config: ContentConfig::default(),
            vfs: None,
            modules: Arc::new(DataModules::new()),
            decoder: Arc::new(StandardImageDecoder),
            uploader: None,
            audio: None,
            palette: Palette::default(),
        }
    }

    pub fn vfs(&self) -> &Vfs {
        &self.vfs
    }

    /// Palette used by every later 8-bit decode. Already cached bitmaps keep
    /// the palette they were decoded with.
    pub fn set_palette(&self, palette: Palette) {
        *self.palette.write().unwrap_or_else(PoisonError::into_inner) = palette;
    }

    pub fn audio_enabled(&self) -> bool {
        self.config.audio_enabled && self.audio.is_some()
    }

    /// Records the descriptor in the hash table so its hash can be reversed.
    pub fn register(&self, file: &ContentFile) {
        if !file.is_empty() {
            self.hashes.record(file.content_hash(), file.data_path());
        }
    }

    pub fn path_for_hash(&self, hash: u64) -> Option<String> {
        self.hashes.lookup(hash)
    }

    pub fn data_module_id(&self, file: &ContentFile) -> i32 {
        file.data_module_id(self.modules.as_ref())
    }

    pub fn load_warnings(&self) -> Vec<LoadWarning> {
        lock(&self.warnings).clone()
    }

    pub fn loaded_image_count(&self, depth: BitDepth) -> usize {
        self.bitmaps[depth.index()].len()
    }

    pub fn is_image_loaded(&self, path: &str, depth: BitDepth) -> bool {
        self.bitmaps[depth.index()].contains(path)
    }

    pub fn loaded_sound_count(&self) -> usize {
        self.samples.len()
    }

    /// [`ContentCache::load_image`] storing into the cache, for the descriptor's own path.
    pub fn get_as_image(
        &self,
        file: &mut ContentFile,
        conversion: ColorConversion,
    ) -> Result<Option<Arc<Bitmap>>, ContentError> {
        self.load_image(file, conversion, true, None)
    }

    /// Returns the bitmap for `frame_path` (or the descriptor's path) at the
    /// depth `conversion` asks for, decoding it on the first request.
    ///
    /// A missing file is replaced by its `.png`/`.bmp` twin, rewriting the
    /// descriptor. Missing or undecodable images are fatal. With
    /// `store_in_cache` false a miss is decoded without being cached.
    pub fn load_image(
        &self,
        file: &mut ContentFile,
        conversion: ColorConversion,
        store_in_cache: bool,
        frame_path: Option<&str>,
    ) -> Result<Option<Arc<Bitmap>>, ContentError> {
        if file.is_empty() {
            return Ok(None);
        }
        if let Some(path) = frame_path
            && extension_of(path).is_none()
        {
            return Err(ContentError::MissingExtension {
                path: path.to_owned(),
                location: file.location().to_owned(),
            });
        }
        self.register(file);
        let partition = &self.bitmaps[conversion.bit_depth().index()];
        let mut load_path = frame_path.unwrap_or(file.data_path()).to_owned();

        if let Some(bitmap) = partition.get(&load_path) {
            return Ok(Some(bitmap));
        }

        match FallbackResolver::new(&self.vfs).image(&load_path, file) {
            Resolution::Exact => {}
            Resolution::Substitute {
                load_path: substitute,
                descriptor_path,
                warning,
            } => {
                if let Some(alt_extension) = warning {
                    self.warn(file, alt_extension);
                }
                self.rewrite(file, &descriptor_path)?;
                load_path = substitute;
                if let Some(bitmap) = partition.get(&load_path) {
                    return Ok(Some(bitmap));
                }
            }
            Resolution::Missing { alternative } => {
                return Err(ContentError::ImageNotFound {
                    path: load_path,
                    alt_extension: alternative,
                    location: file.location().to_owned(),
                });
            }
        }

        let decode = || self.decode_bitmap(&load_path, file.location(), conversion);
        let bitmap = if store_in_cache {
            partition.get_or_load(&load_path, &|| self.service_uploads(), decode)?
        } else {
            Arc::new(decode()?)
        };
        Ok(Some(bitmap))
    }

    fn decode_bitmap(
        &self,
        path: &str,
        location: &str,
        conversion: ColorConversion,
    ) -> Result<Bitmap, ContentError> {
        let bytes = self.vfs.read_bytes(path).map_err(|source| ContentError::Store {
            path: path.to_owned(),
            source,
        })?;
        let palette = self
            .palette
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let mut bitmap = self
            .decoder
            .decode(&bytes, conversion, &palette)
            .map_err(|source| ContentError::ImageDecode {
                path: path.to_owned(),
                location: location.to_owned(),
                source,
            })?;
        log::debug!(
            "decoded {path} ({}x{}, {:?})",
            bitmap.width(),
            bitmap.height(),
            bitmap.depth()
        );

        if bitmap.depth() == BitDepth::ThirtyTwo {
            if let Some(uploader) = &self.uploader {
                let texture =
                    GpuTexture::upload(uploader, bitmap.pixels(), bitmap.width(), bitmap.height())
                        .map_err(|source| ContentError::TextureUpload {
                            path: path.to_owned(),
                            source,
                        })?;
                log::debug!("uploaded {path} as {}", texture.handle());
                bitmap.bind_texture(texture);
            }
        }
        Ok(bitmap)
    }

    /// Loads `frame_count` frames named `{base}{000..}{ext}` in order. A single
    /// frame may also be stored under its plain name or as frame `000`.
    pub fn get_as_animation(
        &self,
        file: &mut ContentFile,
        frame_count: usize,
        conversion: ColorConversion,
    ) -> Result<Vec<Arc<Bitmap>>, ContentError> {
        if file.is_empty() || frame_count == 0 {
            return Ok(Vec::new());
        }
        self.register(file);

        let mut frames = Vec::with_capacity(frame_count);
        if frame_count == 1 {
            if let Resolution::Substitute {
                descriptor_path,
                warning,
                ..
            } = FallbackResolver::new(&self.vfs).first_frame(file)
            {
                if let Some(alt_extension) = warning {
                    self.warn(file, alt_extension);
                }
                self.rewrite(file, &descriptor_path)?;
            }
            frames.extend(self.get_as_image(file, conversion)?);
            return Ok(frames);
        }

        for frame in 0..frame_count {
            // Rebuilt every frame: a fallback may have changed the extension.
            let path = frame_path(file.path_without_extension(), frame, file.extension());
            frames.extend(self.load_image(file, conversion, true, Some(&path))?);
        }
        Ok(frames)
    }

    /// Returns the sample for the descriptor's path, creating it on the first
    /// request. Missing, empty, or undecodable sounds are logged and yield
    /// `None` unless `hard_fail` is set, in which case they are errors.
    pub fn get_as_sound(
        &self,
        file: &mut ContentFile,
        hard_fail: bool,
        async_load: bool,
    ) -> Result<Option<Arc<Sample>>, ContentError> {
        let Some(engine) = self.audio.as_ref().filter(|_| self.config.audio_enabled) else {
            return Ok(None);
        };
        if file.is_empty() {
            return Ok(None);
        }
        self.register(file);

        if let Some(sample) = self.samples.get(file.data_path()) {
            return Ok(Some(sample));
        }

        match FallbackResolver::new(&self.vfs).audio(file, &self.config.audio_formats) {
            Resolution::Exact => {}
            Resolution::Substitute {
                descriptor_path,
                warning,
                ..
            } => {
                if let Some(alt_extension) = warning {
                    self.warn(file, alt_extension);
                }
                self.rewrite(file, &descriptor_path)?;
                if let Some(sample) = self.samples.get(file.data_path()) {
                    return Ok(Some(sample));
                }
            }
            Resolution::Missing { .. } => {
                let err = ContentError::SoundNotFound {
                    path: file.data_path().to_owned(),
                    location: file.location().to_owned(),
                };
                return soften(err, hard_fail);
            }
        }

        let path = file.data_path().to_owned();
        let location = file.location().to_owned();
        let mut flags = SampleFlags::CREATE_SAMPLE | SampleFlags::SPATIAL_3D;
        if async_load {
            flags |= SampleFlags::NON_BLOCKING;
        }

        let created = self.samples.get_or_load(&path, &|| {}, || {
            // Unreadable sounds are reported as missing.
            let unreadable = |source: anyhow::Error| {
                log::debug!("{path}: {source:#}");
                ContentError::SoundNotFound {
                    path: path.clone(),
                    location: location.clone(),
                }
            };
            let size = self.vfs.file_size(&path).map_err(unreadable)?;
            if size == 0 {
                return Err(ContentError::EmptySound {
                    path: path.clone(),
                    location: location.clone(),
                });
            }
            let bytes = self.vfs.read_bytes(&path).map_err(unreadable)?;
            let sample = engine.create_sample(&path, bytes, flags).map_err(|source| {
                ContentError::SoundEngine {
                    path: path.clone(),
                    location: location.clone(),
                    source,
                }
            })?;
            log::debug!("created sample {path} ({flags:?})");
            Ok(sample)
        });

        match created {
            Ok(sample) => Ok(Some(sample)),
            Err(err) => soften(err, hard_fail),
        }
    }

    /// Drops every cached bitmap in both depths. Texture bindings are released
    /// with their bitmaps, so call this before the graphics context goes away
    /// and not while loads are in flight. Handles still held by callers keep
    /// their bitmap alive until they are dropped.
    pub fn free_all_loaded(&self) {
        let mut freed = 0;
        for partition in &self.bitmaps {
            freed += partition.drain().len();
        }
        log::info!("freed {freed} loaded bitmaps");
    }

    /// Drops every cached sample.
    pub fn clear_samples(&self) {
        let freed = self.samples.drain().len();
        log::info!("freed {freed} loaded samples");
    }

    /// A thread waiting on another thread's decode may owe that decode its
    /// texture upload.
    fn service_uploads(&self) {
        if let Some(uploader) = &self.uploader {
            uploader.service_pending();
        }
    }

    fn warn(&self, file: &ContentFile, alt_extension: String) {
        let warning = LoadWarning {
            path: file.data_path().to_owned(),
            location: file.location().to_owned(),
            alt_extension,
        };
        log::warn!("{warning}");
        lock(&self.warnings).push(warning);
    }

    fn rewrite(&self, file: &mut ContentFile, path: &str) -> Result<(), ContentError> {
        file.set_data_path(path)?;
        self.register(file);
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Recoverable errors become a logged absence unless the caller asked for
/// hard failure.
fn soften<T>(err: ContentError, hard_fail: bool) -> Result<Option<T>, ContentError> {
    if hard_fail || err.severity() == Severity::Fatal {
        return Err(err);
    }
    log::error!("{err}. The file was not loaded!");
    Ok(None)
}
