//! URL helpers.

/// Strips the `#fragment` from a URL, leaving path and query untouched.
///
/// Works on the raw string so opaque or relative URLs pass through.
pub fn normalize(url: &str) -> &str {
	match url.split_once('#') {
		Some((base, _)) => base,
		None => url,
	}
}

/// True if two URLs differ only by fragment.
pub fn same_document(a: &str, b: &str) -> bool {
	normalize(a) == normalize(b)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_strips_fragment_only() {
		assert_eq!(normalize("https://example.com/a/b?q=1#top"), "https://example.com/a/b?q=1");
		assert_eq!(normalize("https://example.com/a/b?q=1"), "https://example.com/a/b?q=1");
		assert_eq!(normalize("about:blank#"), "about:blank");
	}

	#[test]
	fn test_normalize_is_idempotent() {
		for url in ["https://example.com/x#a#b", "file:///tmp/index.html", "data:text/html,<p>#</p>", ""] {
			let once = normalize(url);
			assert_eq!(normalize(once), once);
		}
	}

	#[test]
	fn test_same_document() {
		assert!(same_document("https://example.com/#one", "https://example.com/#two"));
		assert!(!same_document("https://example.com/a", "https://example.com/b"));
	}
}
