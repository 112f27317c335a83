/// Normalize a path-like string for remote use:
/// - converts backslashes to forward slashes
/// - collapses repeated slashes
/// - optionally preserves a trailing slash (an explicit "this is a directory" marker)
pub fn normalize_path(p: &str, preserve_trailing_slash: bool) -> String {
    if p.is_empty() {
        return String::new();
    }
    let mut s = p.replace('\\', "/");
    while s.contains("//") {
        s = s.replace("//", "/");
    }
    if !preserve_trailing_slash {
        // keep root "/"
        while s.len() > 1 && s.ends_with('/') {
            s.pop();
        }
    }
    s
}

/// Join a remote directory and a relative path with exactly one '/' between them.
pub fn join_remote(base: &str, rel: &str) -> String {
    let base = normalize_path(base, false);
    let rel = normalize_path(rel, false);
    let rel = rel.trim_start_matches('/');
    if rel.is_empty() {
        return base;
    }
    if base.is_empty() {
        return rel.to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), rel)
}

/// Parent directory of a remote path; "/" for top-level names.
pub fn remote_parent(path: &str) -> String {
    let p = normalize_path(path, false);
    match p.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(i) => p[..i].to_string(),
    }
}

/// Last segment of a remote path, ignoring a trailing slash.
pub fn remote_basename(path: &str) -> String {
    let p = normalize_path(path, false);
    match p.rfind('/') {
        Some(i) => p[i + 1..].to_string(),
        None => p,
    }
}

// Lightweight path display wrapper that renders with forward slashes.
pub(crate) struct DisplayPath<'a>(pub(crate) &'a std::path::Path);

impl std::fmt::Display for DisplayPath<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = self.0.to_string_lossy();
        f.write_str(&normalize_path(&s, true))
    }
}

pub(crate) fn display_path(p: &std::path::Path) -> DisplayPath<'_> {
    DisplayPath(p)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_empty() {
        assert_eq!(normalize_path("", true), "");
        assert_eq!(normalize_path("", false), "");
    }

    #[test]
    fn preserve_and_strip_trailing_slash() {
        assert_eq!(normalize_path("/a/b/", true), "/a/b/");
        assert_eq!(normalize_path("/a/b/", false), "/a/b");
        assert_eq!(normalize_path("/", true), "/");
        assert_eq!(normalize_path("/", false), "/");
    }

    #[test]
    fn backslashes_and_repeats_collapse() {
        assert_eq!(normalize_path("a\\b\\\\c", false), "a/b/c");
        assert_eq!(normalize_path("//a///b//c", false), "/a/b/c");
    }

    #[test]
    fn join_remote_cases() {
        assert_eq!(join_remote("/dest/", "a/b.txt"), "/dest/a/b.txt");
        assert_eq!(join_remote("/dest", "a\\b.txt"), "/dest/a/b.txt");
        assert_eq!(join_remote("/", "x"), "/x");
        assert_eq!(join_remote("dest", "x"), "dest/x");
        assert_eq!(join_remote("/dest", ""), "/dest");
    }

    #[test]
    fn parent_and_basename() {
        assert_eq!(remote_parent("/data/models/a.bin"), "/data/models");
        assert_eq!(remote_parent("/a.bin"), "/");
        assert_eq!(remote_parent("a.bin"), "/");
        assert_eq!(remote_parent("/data/models/"), "/data");
        assert_eq!(remote_basename("/data/models/"), "models");
        assert_eq!(remote_basename("a.bin"), "a.bin");
    }

    #[test]
    fn display_path_uses_forward_slashes() {
        let p = std::path::Path::new("C:\\some\\path\\");
        assert_eq!(format!("{}", display_path(p)), "C:/some/path/");
    }
}
