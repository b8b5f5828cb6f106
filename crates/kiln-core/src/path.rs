//! Relative URL handling.

/// Normalize a slash-separated URL path.
///
/// Removes `.` segments and empty segments produced by repeated slashes, and
/// resolves `..` against the preceding segment. A leading slash is kept, as is
/// a trailing slash on a non-empty result. The function is idempotent.
///
/// ```
/// use kiln_core::path::normalize_url;
///
/// assert_eq!(normalize_url("/a/./b/../c"), "/a/c");
/// assert_eq!(normalize_url("/a//b"), "/a/b");
/// ```
#[must_use]
pub fn normalize_url(url: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in url.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    let mut normalized = String::with_capacity(url.len());
    if url.starts_with('/') {
        normalized.push('/');
    }
    normalized.push_str(&segments.join("/"));
    if url.ends_with('/') && !segments.is_empty() {
        normalized.push('/');
    }
    normalized
}

/// Append a segment to a relative URL and normalize the result.
#[must_use]
pub fn join_url(base: &str, segment: &str) -> String {
    if base.is_empty() {
        normalize_url(segment)
    } else {
        normalize_url(&format!("{base}/{segment}"))
    }
}

/// The non-empty segments of a relative URL.
#[must_use]
pub fn bread_crumb(relative_url: &str) -> Vec<String> {
    relative_url
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

/// The absolute URL of a page: `base_url + "/" + relative_url`.
#[must_use]
pub fn absolute_url(base_url: &str, relative_url: &str) -> String {
    format!("{}/{relative_url}", base_url.trim_end_matches('/'))
}

/// Whether a relative path stays inside the directory it is joined to.
#[must_use]
pub fn is_contained(relative: &str) -> bool {
    let mut depth: usize = 0;
    for segment in relative.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => match depth.checked_sub(1) {
                Some(d) => depth = d,
                None => return false,
            },
            _ => depth += 1,
        }
    }
    !relative.starts_with('/')
}
