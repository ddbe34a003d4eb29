use std::{
    path::PathBuf,
    str::FromStr,
    sync::{Arc, Mutex, PoisonError},
    thread,
    time::Duration,
};

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use content::{
    BitDepth, ColorConversion, ContentCache, ContentConfig, ContentFile, DataModules, MountConfig,
    TextureError, TextureHandle, TextureUploadQueue, TextureUploader, WavAudioEngine,
};

/// Preloads content through the content cache and reports what it loaded.
#[derive(Parser, Debug)]
#[command(name = "preload", version, about)]
pub struct Args {
    /// Directory mounted as the content root.
    #[arg(long, default_value = ".")]
    root: PathBuf,
    /// Data module directories under the root, in load order.
    #[arg(long = "module")]
    modules: Vec<String>,
    /// Images to load as 8-bit paletted bitmaps.
    #[arg(long = "image")]
    images: Vec<String>,
    /// Images to load as 32-bit bitmaps with a texture.
    #[arg(long = "image32")]
    images32: Vec<String>,
    /// Animations as `PATH:FRAMES`, e.g. `Base.rte/walk.png:8`.
    #[arg(long = "animation")]
    animations: Vec<AnimationArg>,
    /// Sounds to create as samples.
    #[arg(long = "sound")]
    sounds: Vec<String>,
    /// Skip every sound request.
    #[arg(long)]
    no_audio: bool,
    /// Treat missing or broken sounds as errors.
    #[arg(long)]
    strict_audio: bool,
    /// Let the audio engine decode in the background.
    #[arg(long)]
    async_audio: bool,
}

#[derive(Clone, Debug)]
pub struct AnimationArg {
    path: String,
    frames: usize,
}

impl FromStr for AnimationArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (path, frames) = s
            .rsplit_once(':')
            .ok_or_else(|| format!("expected PATH:FRAMES, got {s:?}"))?;
        let frames = frames
            .parse()
            .map_err(|e| format!("invalid frame count in {s:?}: {e}"))?;
        Ok(AnimationArg {
            path: path.to_owned(),
            frames,
        })
    }
}

/// Stands in for the graphics device: hands out handles and tracks live ones.
#[derive(Default)]
struct HeadlessTextures {
    live: Mutex<Vec<TextureHandle>>,
}

impl HeadlessTextures {
    fn live(&self) -> usize {
        self.live.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl TextureUploader for HeadlessTextures {
    fn upload_texture_2d(
        &self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> Result<TextureHandle, TextureError> {
        if pixels.len() != width as usize * height as usize * 4 {
            return Err(TextureError::SizeMismatch {
                len: pixels.len(),
                width,
                height,
            });
        }
        let handle = TextureHandle::new();
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
        Ok(handle)
    }

    fn delete_texture(&self, handle: TextureHandle) {
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|h| *h != handle);
    }
}

#[derive(Debug, Default)]
struct Report {
    images: usize,
    frames: usize,
    sounds: usize,
    skipped_sounds: usize,
}

pub struct App {
    args: Args,
}

impl App {
    pub fn new(args: Args) -> Self {
        Self { args }
    }

    pub fn init(&mut self) -> Result<()> {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

        if !self.args.root.is_dir() {
            bail!("content root {:?} is not a directory", self.args.root);
        }

        let config = ContentConfig {
            audio_enabled: !self.args.no_audio,
            mounts: vec![MountConfig::new("", &self.args.root, "content")],
            ..ContentConfig::default()
        };
        let mut modules = DataModules::new();
        for name in &self.args.modules {
            let id = modules.register(name.as_str());
            log::info!("data module {name} has id {id}");
        }

        // Loading runs on a worker; this thread owns the textures and services
        // uploads until the worker is done.
        let device = Arc::new(HeadlessTextures::default());
        let queue = TextureUploadQueue::new(device.clone());
        let cache = Arc::new(
            ContentCache::builder()
                .config(config)
                .modules(Arc::new(modules))
                .uploader(Arc::new(queue.uploader()))
                .audio_engine(Arc::new(WavAudioEngine))
                .build(),
        );
        log::debug!("mounts: {:?}", cache.vfs().debug_list_mounts());

        let loader = {
            let cache = cache.clone();
            let args = self.args_for_loader();
            thread::spawn(move || load_all(&cache, &args))
        };
        while !loader.is_finished() {
            queue.pump_one(Duration::from_millis(10));
        }
        queue.pump();
        let report = loader
            .join()
            .map_err(|_| anyhow!("loader thread panicked"))??;

        for warning in cache.load_warnings() {
            println!("warning: {warning}");
        }
        println!(
            "loaded {} images, {} animation frames, {} sounds ({} skipped)",
            report.images, report.frames, report.sounds, report.skipped_sounds
        );
        for depth in BitDepth::ALL {
            println!(
                "cache holds {} bitmaps at depth {depth:?}",
                cache.loaded_image_count(depth)
            );
        }
        println!("{} textures live", device.live());

        cache.free_all_loaded();
        cache.clear_samples();
        queue.pump();
        log::info!("{} textures live after release", device.live());

        Ok(())
    }

    fn args_for_loader(&self) -> LoadList {
        LoadList {
            images: self.args.images.clone(),
            images32: self.args.images32.clone(),
            animations: self.args.animations.clone(),
            sounds: self.args.sounds.clone(),
            strict_audio: self.args.strict_audio,
            async_audio: self.args.async_audio,
        }
    }
}

struct LoadList {
    images: Vec<String>,
    images32: Vec<String>,
    animations: Vec<AnimationArg>,
    sounds: Vec<String>,
    strict_audio: bool,
    async_audio: bool,
}

fn descriptor(cache: &ContentCache, path: &str, location: &str) -> Result<ContentFile> {
    let file = ContentFile::new(path)
        .with_context(|| format!("invalid content path {path:?}"))?
        .with_location(location);
    log::debug!("{path} belongs to module {}", cache.data_module_id(&file));
    Ok(file)
}

fn load_all(cache: &ContentCache, list: &LoadList) -> Result<Report> {
    let mut report = Report::default();

    let requests = list
        .images
        .iter()
        .map(|p| (p, ColorConversion::Palette, "--image"))
        .chain(
            list.images32
                .iter()
                .map(|p| (p, ColorConversion::EightToThirtyTwo, "--image32")),
        );
    for (path, conversion, location) in requests {
        let mut file = descriptor(cache, path, location)?;
        if let Some(bitmap) = cache.get_as_image(&mut file, conversion)? {
            log::info!(
                "{} -> {}x{} {:?}",
                file.data_path(),
                bitmap.width(),
                bitmap.height(),
                bitmap.depth()
            );
            report.images += 1;
        }
    }

    for animation in &list.animations {
        let mut file = descriptor(cache, &animation.path, "--animation")?;
        let frames = cache.get_as_animation(&mut file, animation.frames, ColorConversion::Palette)?;
        log::info!("{} -> {} frames", file.data_path(), frames.len());
        report.frames += frames.len();
    }

    for path in &list.sounds {
        let mut file = descriptor(cache, path, "--sound")?;
        match cache.get_as_sound(&mut file, list.strict_audio, list.async_audio)? {
            Some(sample) => {
                log::info!("{} -> {:?}", file.data_path(), sample);
                report.sounds += 1;
            }
            None => report.skipped_sounds += 1,
        }
    }

    Ok(report)
}
