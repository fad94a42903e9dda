// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! URL and dev-server label detection over log content.

use once_cell::sync::Lazy;
use regex::Regex;

static URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"https?://[A-Za-z0-9.\-]+(?::\d+)?(?:/[^\s'\)\]>\"]*)?").expect("valid url regex")
});

static BRACKET_LABEL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*\[([^\]]+)\]").expect("valid bracket label regex")
});

static LOCAL_LABEL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)local:\s*$").expect("valid local label regex")
});

/// Finds every URL in `content`, paired with a best-effort label.
///
/// Heuristics are tried in order, first match wins, falling back to
/// `process_name`:
/// 1. A `Local:` prefix immediately before the URL (Vite/Next.js convention).
/// 2. A `[Name]` bracket prefix at the start of the line.
/// 3. The owning process's name.
pub fn detect_urls(content: &str, process_name: &str) -> Vec<(String, String)> {
    let mut found = Vec::new();
    for m in URL_RE.find_iter(content) {
        let url = m.as_str().to_string();
        let before = &content[..m.start()];
        let label = if LOCAL_LABEL_RE.is_match(before) {
            "Local".to_string()
        } else if let Some(caps) = BRACKET_LABEL_RE.captures(content) {
            caps.get(1).map(|g| g.as_str().to_string()).unwrap_or_else(|| process_name.to_string())
        } else {
            process_name.to_string()
        };
        found.push((url, label));
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_plain_url() {
        let found = detect_urls("Server listening on http://localhost:3000", "web");
        assert_eq!(found, vec![("http://localhost:3000".to_string(), "web".to_string())]);
    }

    #[test]
    fn prefers_local_label() {
        let found = detect_urls("  Local:   http://localhost:5173/", "vite-app");
        assert_eq!(found[0].1, "Local");
    }

    #[test]
    fn prefers_bracket_label() {
        let found = detect_urls("[Frontend] ready at http://localhost:8080", "any");
        assert_eq!(found[0].1, "Frontend");
    }

    #[test]
    fn no_urls_returns_empty() {
        assert!(detect_urls("nothing to see here", "x").is_empty());
    }

    #[test]
    fn detects_multiple_urls_in_one_line() {
        let found = detect_urls("api http://localhost:3000 docs http://localhost:3001/docs", "x");
        assert_eq!(found.len(), 2);
    }
}
