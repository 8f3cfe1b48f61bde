//! Path normalization for the slash-separated storage namespace
//!
//! Storage backends address content with `/`-separated virtual paths that are
//! independent of the host platform, so `std::path` is not used here.

/// Resolve a sequence of path segments into a single normalized path.
///
/// Segments are concatenated in order. A segment starting with `/` discards
/// everything accumulated before it. `.` and empty tokens are dropped, `..`
/// removes the previously accumulated entry. Popping past the beginning of
/// the path is a no-op, so `resolve_path(&["/", "../../b"])` is `/b`.
pub fn resolve_path<S: AsRef<str>>(segments: &[S]) -> String {
    let mut absolute = false;
    let mut tokens: Vec<&str> = Vec::new();
    for segment in segments {
        let segment = segment.as_ref();
        if segment.starts_with('/') {
            tokens.clear();
            absolute = true;
        }
        tokens.extend(segment.split('/'));
    }

    let mut stack: Vec<&str> = Vec::with_capacity(tokens.len());
    for token in tokens {
        match token {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            name => stack.push(name),
        }
    }

    if absolute {
        format!("/{}", stack.join("/"))
    } else {
        stack.join("/")
    }
}

/// Check whether `path` is `root` itself or lies beneath it.
pub fn is_within(root: &str, path: &str) -> bool {
    if root == "/" {
        return path.starts_with('/');
    }
    match path.strip_prefix(root) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Convert an absolute storage path into a path relative to `root`.
///
/// Paths outside of `root` are returned without their leading slash.
pub fn relative_to(root: &str, path: &str) -> String {
    if is_within(root, path) && root != "/" {
        return path[root.len()..].trim_start_matches('/').to_string();
    }
    path.trim_start_matches('/').to_string()
}

/// Return the last segment of a path (`""` for the root).
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or("")
}

/// Return the parent directory of an absolute path, `None` for the root.
pub fn parent(path: &str) -> Option<String> {
    let normalized = resolve_path(&["/", path]);
    if normalized == "/" {
        return None;
    }
    let idx = normalized.rfind('/').unwrap_or(0);
    if idx == 0 {
        Some("/".to_string())
    } else {
        Some(normalized[..idx].to_string())
    }
}
