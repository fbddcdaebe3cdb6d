// Ant-style path glob matching for the gateway public-path list
// `?` matches one character, `*` any run within a segment, `**` any number
// of whole segments. Matching runs against the normalized request path.

/// Compiled set of public-path patterns
#[derive(Debug, Clone)]
pub struct PathMatcher {
    patterns: Vec<Vec<String>>,
}

impl PathMatcher {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| {
                normalize_path(p.as_ref())
                    .split('/')
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .collect();

        Self { patterns }
    }

    /// True when any configured pattern matches the normalized path
    pub fn matches(&self, raw_path: &str) -> bool {
        let normalized = normalize_path(raw_path);
        let segments: Vec<&str> = normalized.split('/').filter(|s| !s.is_empty()).collect();

        self.patterns
            .iter()
            .any(|pattern| match_segments(pattern, &segments))
    }
}

/// Strip the query string and ensure a leading slash
pub fn normalize_path(raw: &str) -> String {
    let without_query = raw.split('?').next().unwrap_or("");
    if without_query.starts_with('/') {
        without_query.to_string()
    } else {
        format!("/{}", without_query)
    }
}

fn match_segments(pattern: &[String], path: &[&str]) -> bool {
    match pattern.first() {
        None => path.is_empty(),
        Some(p) if p == "**" => {
            // zero segments, or consume one and retry
            match_segments(&pattern[1..], path)
                || (!path.is_empty() && match_segments(pattern, &path[1..]))
        },
        Some(p) => {
            !path.is_empty()
                && match_segment(p, path[0])
                && match_segments(&pattern[1..], &path[1..])
        },
    }
}

fn match_segment(pattern: &str, segment: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let s: Vec<char> = segment.chars().collect();
    match_chars(&p, &s)
}

fn match_chars(pattern: &[char], segment: &[char]) -> bool {
    match pattern.first() {
        None => segment.is_empty(),
        Some('*') => {
            match_chars(&pattern[1..], segment)
                || (!segment.is_empty() && match_chars(pattern, &segment[1..]))
        },
        Some('?') => !segment.is_empty() && match_chars(&pattern[1..], &segment[1..]),
        Some(c) => {
            segment.first() == Some(c) && match_chars(&pattern[1..], &segment[1..])
        },
    }
}
