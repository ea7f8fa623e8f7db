//! Filesystem path helpers used when locating configuration files.

use std::path::{Path, PathBuf};

use dirs_next::home_dir;

/// Expand a leading `~` to the current user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    let p = path.trim();
    if p == "~" {
        return home_dir().unwrap_or_else(|| PathBuf::from("~"));
    }
    if let Some(rest) = p.strip_prefix("~/").or_else(|| p.strip_prefix("~\\")) {
        return home_dir().unwrap_or_else(|| PathBuf::from("~")).join(rest);
    }
    PathBuf::from(p)
}

/// Walk from `start` towards the filesystem root and return the first
/// `file_name` that exists as a regular file.
pub fn find_in_ancestors(start: &Path, file_name: &str) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|directory| directory.join(file_name))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn plain_paths_are_unchanged() {
        assert_eq!(expand_tilde(" ./job.json "), PathBuf::from("./job.json"));
    }

    #[test]
    fn tilde_prefix_joins_home_directory() {
        if let Some(home) = home_dir() {
            assert_eq!(expand_tilde("~/tutorial/.env"), home.join("tutorial/.env"));
        }
    }

    #[test]
    fn finds_file_in_parent_directory() {
        let root = tempfile::tempdir().expect("tempdir");
        let nested = root.path().join("HorovodPytorch").join("src");
        fs::create_dir_all(&nested).expect("create nested dirs");
        fs::write(root.path().join(".env"), "GROUP_NAME=rg\n").expect("write env file");

        let found = find_in_ancestors(&nested, ".env").expect("env file found");
        assert_eq!(found, root.path().join(".env"));
    }

    #[test]
    fn ignores_directories_with_matching_name() {
        let root = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(root.path().join("config.env")).expect("create dir");
        assert_eq!(find_in_ancestors(root.path(), "config.env"), None);
    }
}
