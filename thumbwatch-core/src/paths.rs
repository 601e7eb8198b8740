//! Small path helpers shared by the built-in policies and by embedders
//! writing their own.

use std::io;
use std::path::{Component, Path, PathBuf};

/// Absolute paths of the directories directly inside `dir`.
///
/// Symlinks are followed. Entries that vanish while listing are skipped.
pub async fn subdirectories(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut dirs = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => dirs.push(path),
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err),
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Depth of `dir` below `root`: 0 for a direct child, 1 for a grandchild.
/// `None` when `dir` is not strictly inside `root` or contains `..`.
pub fn subdir_level(root: &Path, dir: &Path) -> Option<usize> {
    let rel = dir.strip_prefix(root).ok()?;
    let mut depth = 0usize;
    for component in rel.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            _ => return None,
        }
    }
    depth.checked_sub(1)
}

/// True if `dir` is the nth-level subdirectory of `root` (n = 0 means a
/// direct child).
pub fn nth_subdir(root: &Path, dir: &Path, n: usize) -> bool {
    subdir_level(root, dir) == Some(n)
}

/// True when the final component starts with a dot.
pub fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_relative_to_root() {
        let root = Path::new("/g");
        assert_eq!(subdir_level(root, Path::new("/g/album")), Some(0));
        assert_eq!(subdir_level(root, Path::new("/g/album/2024")), Some(1));
        assert_eq!(subdir_level(root, Path::new("/g")), None);
        assert_eq!(subdir_level(root, Path::new("/other/album")), None);
        assert_eq!(subdir_level(root, Path::new("/g/../etc")), None);
    }

    #[test]
    fn nth_subdir_matches_exact_depth() {
        let root = Path::new("/g");
        assert!(nth_subdir(root, Path::new("/g/album"), 0));
        assert!(!nth_subdir(root, Path::new("/g/album"), 1));
        assert!(nth_subdir(root, Path::new("/g/album/trip"), 1));
    }

    #[test]
    fn hidden_names_start_with_a_dot() {
        assert!(is_hidden(Path::new("/g/.hidden")));
        assert!(is_hidden(Path::new("/g/album/.thumbs")));
        assert!(!is_hidden(Path::new("/g/album/photo.png")));
    }

    #[tokio::test]
    async fn subdirectories_lists_only_directories() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("b")).unwrap();
        std::fs::create_dir(tmp.path().join("a")).unwrap();
        std::fs::write(tmp.path().join("photo.png"), b"x").unwrap();

        let dirs = subdirectories(tmp.path()).await.unwrap();
        assert_eq!(dirs, vec![tmp.path().join("a"), tmp.path().join("b")]);
    }
}
