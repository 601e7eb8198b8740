//! Caller-supplied rules deciding what gets watched, what gets thumbnailed,
//! and where thumbnails are written.
//!
//! The engine holds a single `Arc<dyn ThumbnailPolicy>` fixed at construction.
//! Every default is conservative so an unconfigured engine never touches the
//! filesystem: nothing is watched, nothing is thumbnailed.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::paths;

pub trait ThumbnailPolicy: Send + Sync + 'static {
    /// Directory the thumbnail for `source` lives in.
    fn thumb_dir(&self, _source: &Path) -> PathBuf {
        std::env::temp_dir()
    }

    /// File name given to the thumbnail of `source`.
    fn thumb_name(&self, source: &Path) -> OsString {
        source
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default()
    }

    fn should_watch_subdir(&self, _root: &Path, _dir: &Path) -> bool {
        false
    }

    /// Whether `file` gets a thumbnail.
    ///
    /// Also consulted when a file disappears: its thumbnail is only removed
    /// if this still returns true for the vanished path. Decide from the
    /// path alone; a predicate that inspects the file itself will never
    /// see it again once deleted, and its thumbnail will be left behind.
    fn should_create_thumb(&self, _root: &Path, _file: &Path) -> bool {
        false
    }

    /// Full thumbnail path for `source`.
    fn thumb_path(&self, source: &Path) -> PathBuf {
        self.thumb_dir(source).join(self.thumb_name(source))
    }
}

/// Accepts nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultPolicy;

impl ThumbnailPolicy for DefaultPolicy {}

type DirFn = Box<dyn Fn(&Path) -> PathBuf + Send + Sync>;
type NameFn = Box<dyn Fn(&Path) -> OsString + Send + Sync>;
type PredicateFn = Box<dyn Fn(&Path, &Path) -> bool + Send + Sync>;

/// Policy assembled from closures. Unset functions fall back to the
/// [`DefaultPolicy`] behaviour.
#[derive(Default)]
pub struct FnPolicy {
    thumb_dir: Option<DirFn>,
    thumb_name: Option<NameFn>,
    should_watch_subdir: Option<PredicateFn>,
    should_create_thumb: Option<PredicateFn>,
}

impl FnPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn thumb_dir(mut self, f: impl Fn(&Path) -> PathBuf + Send + Sync + 'static) -> Self {
        self.thumb_dir = Some(Box::new(f));
        self
    }

    pub fn thumb_name(mut self, f: impl Fn(&Path) -> OsString + Send + Sync + 'static) -> Self {
        self.thumb_name = Some(Box::new(f));
        self
    }

    pub fn should_watch_subdir(
        mut self,
        f: impl Fn(&Path, &Path) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.should_watch_subdir = Some(Box::new(f));
        self
    }

    pub fn should_create_thumb(
        mut self,
        f: impl Fn(&Path, &Path) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.should_create_thumb = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for FnPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnPolicy")
            .field("thumb_dir", &self.thumb_dir.is_some())
            .field("thumb_name", &self.thumb_name.is_some())
            .field("should_watch_subdir", &self.should_watch_subdir.is_some())
            .field("should_create_thumb", &self.should_create_thumb.is_some())
            .finish()
    }
}

impl ThumbnailPolicy for FnPolicy {
    fn thumb_dir(&self, source: &Path) -> PathBuf {
        match &self.thumb_dir {
            Some(f) => f(source),
            None => DefaultPolicy.thumb_dir(source),
        }
    }

    fn thumb_name(&self, source: &Path) -> OsString {
        match &self.thumb_name {
            Some(f) => f(source),
            None => DefaultPolicy.thumb_name(source),
        }
    }

    fn should_watch_subdir(&self, root: &Path, dir: &Path) -> bool {
        self.should_watch_subdir
            .as_ref()
            .is_some_and(|f| f(root, dir))
    }

    fn should_create_thumb(&self, root: &Path, file: &Path) -> bool {
        self.should_create_thumb
            .as_ref()
            .is_some_and(|f| f(root, file))
    }
}

pub const DEFAULT_THUMB_DIR_NAME: &str = ".thumbs";

pub fn default_image_extensions() -> Vec<String> {
    ["png", "jpg", "jpeg", "gif", "bmp", "webp", "tif", "tiff"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Gallery layout: each thumbnail sits in a dot-directory next to its source
/// (`/g/album/photo.png` -> `/g/album/.thumbs/photo.png`).
///
/// Subdirectories up to `max_depth` levels below the root are watched
/// (0 = direct children only). The thumbnail directory itself is never
/// watched nor thumbnailed.
#[derive(Clone, Debug)]
pub struct MirrorPolicy {
    thumb_dir_name: String,
    extensions: Vec<String>,
    max_depth: usize,
    skip_hidden: bool,
}

impl Default for MirrorPolicy {
    fn default() -> Self {
        Self {
            thumb_dir_name: DEFAULT_THUMB_DIR_NAME.to_string(),
            extensions: default_image_extensions(),
            max_depth: 0,
            skip_hidden: true,
        }
    }
}

impl MirrorPolicy {
    pub fn new(thumb_dir_name: impl Into<String>) -> Self {
        Self {
            thumb_dir_name: thumb_dir_name.into(),
            ..Self::default()
        }
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_skip_hidden(mut self, skip_hidden: bool) -> Self {
        self.skip_hidden = skip_hidden;
        self
    }

    pub fn thumb_dir_name(&self) -> &str {
        &self.thumb_dir_name
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn skip_hidden(&self) -> bool {
        self.skip_hidden
    }

    fn is_thumb_dir(&self, dir: &Path) -> bool {
        dir.file_name()
            .is_some_and(|name| name == self.thumb_dir_name.as_str())
    }

    fn has_image_extension(&self, file: &Path) -> bool {
        file.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .is_some_and(|ext| self.extensions.iter().any(|allowed| *allowed == ext))
    }
}

impl ThumbnailPolicy for MirrorPolicy {
    fn thumb_dir(&self, source: &Path) -> PathBuf {
        source
            .parent()
            .map(|parent| parent.join(&self.thumb_dir_name))
            .unwrap_or_else(|| PathBuf::from(&self.thumb_dir_name))
    }

    fn should_watch_subdir(&self, root: &Path, dir: &Path) -> bool {
        if self.is_thumb_dir(dir) || (self.skip_hidden && paths::is_hidden(dir)) {
            return false;
        }
        paths::subdir_level(root, dir).is_some_and(|level| level <= self.max_depth)
    }

    fn should_create_thumb(&self, root: &Path, file: &Path) -> bool {
        if self.skip_hidden && paths::is_hidden(file) {
            return false;
        }
        if !file.starts_with(root) || file.parent().is_some_and(|dir| self.is_thumb_dir(dir)) {
            return false;
        }
        self.has_image_extension(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_accepts_nothing() {
        let policy = DefaultPolicy;
        let root = Path::new("/g");
        assert!(!policy.should_watch_subdir(root, Path::new("/g/album")));
        assert!(!policy.should_create_thumb(root, Path::new("/g/album/a.png")));
        assert_eq!(policy.thumb_dir(Path::new("/g/album/a.png")), std::env::temp_dir());
        assert_eq!(policy.thumb_name(Path::new("/g/album/a.png")), "a.png");
    }

    #[test]
    fn fn_policy_uses_supplied_closures() {
        let policy = FnPolicy::new()
            .thumb_dir(|source| source.parent().unwrap().join("thumbs"))
            .should_create_thumb(|_, file| file.extension().is_some_and(|e| e == "png"));
        let source = Path::new("/g/album/a.png");
        assert_eq!(policy.thumb_path(source), PathBuf::from("/g/album/thumbs/a.png"));
        assert!(ThumbnailPolicy::should_create_thumb(&policy, Path::new("/g"), source));
        assert!(!ThumbnailPolicy::should_watch_subdir(&policy, Path::new("/g"), Path::new("/g/album")));
    }

    #[test]
    fn mirror_policy_places_thumbs_next_to_sources() {
        let policy = MirrorPolicy::default();
        let source = Path::new("/g/album/photo.png");
        assert_eq!(
            policy.thumb_path(source),
            PathBuf::from("/g/album/.thumbs/photo.png")
        );
    }

    #[test]
    fn mirror_policy_watches_direct_children_only_by_default() {
        let policy = MirrorPolicy::default();
        let root = Path::new("/g");
        assert!(policy.should_watch_subdir(root, Path::new("/g/album")));
        assert!(!policy.should_watch_subdir(root, Path::new("/g/album/2024")));
        assert!(!policy.should_watch_subdir(root, Path::new("/g/.hidden")));
        assert!(!policy.should_watch_subdir(root, Path::new("/g/album/.thumbs")));

        let deep = MirrorPolicy::default().with_max_depth(1);
        assert!(deep.should_watch_subdir(root, Path::new("/g/album/2024")));
    }

    #[test]
    fn mirror_policy_filters_files() {
        let policy = MirrorPolicy::default().with_extensions([".PNG", "jpg"]);
        let root = Path::new("/g");
        assert!(policy.should_create_thumb(root, Path::new("/g/album/photo.png")));
        assert!(policy.should_create_thumb(root, Path::new("/g/album/photo.JPG")));
        assert!(!policy.should_create_thumb(root, Path::new("/g/album/clip.mp4")));
        assert!(!policy.should_create_thumb(root, Path::new("/g/album/.photo.png")));
        assert!(!policy.should_create_thumb(root, Path::new("/g/album/.thumbs/photo.png")));
        assert!(!policy.should_create_thumb(root, Path::new("/elsewhere/photo.png")));
    }
}
