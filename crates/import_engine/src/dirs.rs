use std::collections::HashSet;
use std::fs;
use std::io;
use std::sync::Mutex;

/// Joins path segments with forward slashes, dropping empty and `.`
/// segments and resolving `..` against earlier segments. Output paths are
/// always `/`-separated regardless of platform.
pub fn path_join(parts: &[&str]) -> String {
    let mut segments: Vec<&str> = Vec::new();
    let absolute = parts.first().is_some_and(|first| first.starts_with('/'));

    for part in parts {
        for segment in part.split(['/', '\\']) {
            match segment {
                "" | "." => {}
                ".." => {
                    if segments.last().is_some_and(|last| *last != "..") {
                        segments.pop();
                    } else if !absolute {
                        segments.push("..");
                    }
                }
                other => segments.push(other),
            }
        }
    }

    let joined = segments.join("/");
    if absolute {
        format!("/{joined}")
    } else {
        joined
    }
}

/// Idempotent directory creation for output paths.
///
/// Tracks which directories were already created this run so repeated asset
/// writes into the same folder cost one `create_dir_all` total.
#[derive(Debug, Default)]
pub struct DirectoryManager {
    created: Mutex<HashSet<String>>,
    dry_run: bool,
}

impl DirectoryManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_dry_run(&mut self, dry_run: bool) {
        self.dry_run = dry_run;
    }

    /// Everything before the final `/`-separated segment of `pathname`.
    pub fn parent_directory(pathname: &str) -> String {
        match pathname.rsplit_once('/') {
            Some((dir, _)) => dir.to_string(),
            None => String::new(),
        }
    }

    /// Creates the parent directory of `pathname` if it has not been
    /// created during this run.
    pub fn create_directory_for_path(&self, pathname: &str) -> io::Result<()> {
        if self.dry_run {
            return Ok(());
        }

        let dir = Self::parent_directory(pathname);
        if dir.is_empty() {
            return Ok(());
        }

        let mut created = self.created.lock().expect("directory set poisoned");
        if !created.contains(&dir) {
            fs::create_dir_all(&dir)?;
            created.insert(dir);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_and_normalizes() {
        assert_eq!(path_join(&["assets", "a.png"]), "assets/a.png");
        assert_eq!(path_join(&["out", "blog/", "post"]), "out/blog/post");
        assert_eq!(path_join(&[".", "assets", "b.png"]), "assets/b.png");
        assert_eq!(path_join(&["a/b", "../c"]), "a/c");
        assert_eq!(path_join(&["/root", "assets"]), "/root/assets");
    }

    #[test]
    fn parent_directory_drops_last_segment() {
        assert_eq!(DirectoryManager::parent_directory("a/b/c.md"), "a/b");
        assert_eq!(DirectoryManager::parent_directory("c.md"), "");
    }

    #[test]
    fn dry_run_skips_creation() {
        let temp = tempfile::TempDir::new().unwrap();
        let target = temp.path().join("nested/dir/file.png");
        let mut manager = DirectoryManager::new();
        manager.set_dry_run(true);
        manager
            .create_directory_for_path(target.to_str().unwrap())
            .unwrap();
        assert!(!target.parent().unwrap().exists());
    }

    #[test]
    fn creates_parent_once() {
        let temp = tempfile::TempDir::new().unwrap();
        let target = temp.path().join("nested/file.png");
        let manager = DirectoryManager::new();
        manager
            .create_directory_for_path(target.to_str().unwrap())
            .unwrap();
        assert!(target.parent().unwrap().is_dir());
        // Second call is a set-lookup no-op.
        manager
            .create_directory_for_path(target.to_str().unwrap())
            .unwrap();
    }
}
