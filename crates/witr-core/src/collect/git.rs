//! Git checkout detection for a working directory.

use std::fs;
use std::path::Path;

/// Repository name and branch of the checkout containing `cwd`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitInfo {
    pub repo: String,
    pub branch: Option<String>,
}

/// Walk up from `cwd` to the nearest directory holding a `.git` directory.
///
/// The filesystem root itself is never treated as a checkout.
pub fn detect_git_info(cwd: &Path) -> Option<GitInfo> {
    if !cwd.is_absolute() {
        return None;
    }
    for dir in cwd.ancestors() {
        if dir.parent().is_none() {
            break;
        }
        let git_dir = dir.join(".git");
        if !git_dir.is_dir() {
            continue;
        }
        let repo = dir.file_name()?.to_string_lossy().into_owned();
        let branch = fs::read_to_string(git_dir.join("HEAD"))
            .ok()
            .and_then(|head| branch_from_head(&head));
        return Some(GitInfo { repo, branch });
    }
    None
}

/// Branch named by a `HEAD` file; `None` for a detached head.
pub fn branch_from_head(head: &str) -> Option<String> {
    let reference = head.trim().strip_prefix("ref: ")?;
    let branch = reference
        .strip_prefix("refs/heads/")
        .or_else(|| reference.rsplit('/').next())?;
    (!branch.is_empty()).then(|| branch.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_branch_from_head() {
        assert_eq!(
            branch_from_head("ref: refs/heads/main\n").as_deref(),
            Some("main")
        );
        assert_eq!(
            branch_from_head("ref: refs/heads/feature/login\n").as_deref(),
            Some("feature/login")
        );
        assert_eq!(
            branch_from_head("3f2c9d0e8a1b4c5d6e7f8091a2b3c4d5e6f70812\n"),
            None
        );
    }

    #[test]
    fn test_detect_git_info_walks_up() {
        let dir = tempdir().unwrap();
        let repo = dir.path().join("shop");
        fs::create_dir_all(repo.join(".git")).unwrap();
        fs::write(repo.join(".git/HEAD"), "ref: refs/heads/develop\n").unwrap();
        let nested = repo.join("src/bin");
        fs::create_dir_all(&nested).unwrap();

        let info = detect_git_info(&nested).unwrap();
        assert_eq!(info.repo, "shop");
        assert_eq!(info.branch.as_deref(), Some("develop"));
    }

    #[test]
    fn test_detect_git_info_none_outside_checkout() {
        let dir = tempdir().unwrap();
        assert!(detect_git_info(dir.path()).is_none());
        assert!(detect_git_info(Path::new("relative/path")).is_none());
    }
}
