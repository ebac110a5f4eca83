//! Key sanitization and canonical target-key construction.
//!
//! Catalog titles are free text; everything that ends up in a store key goes
//! through [`sanitize`] first. [`build_target_key`] composes the sanitized
//! lineage segments and file name into the canonical key an object should
//! live under, and is byte-identical across calls for fixed input so the
//! reconciler can detect no-ops by plain string comparison.

/// Fallback token for segments that sanitize away to nothing.
///
/// An empty segment would silently shift path depth for every descendant, so
/// it must never be produced.
pub const FALLBACK_SEGMENT: &str = "unknown";

/// Turn arbitrary text into a safe path segment.
///
/// Lowercases, trims, collapses whitespace runs to single hyphens, drops any
/// character outside `[a-z0-9-_.]`, collapses repeated hyphens and repeated
/// dots, and trims leading/trailing hyphens and dots so a segment can never
/// alias `.` or `..`. Inputs with no surviving alphanumeric character yield
/// [`FALLBACK_SEGMENT`]. Pure: same input, same output.
pub fn sanitize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last: Option<char> = None;
    for ch in input.trim().chars() {
        let mapped = if ch.is_whitespace() {
            Some('-')
        } else {
            match ch.to_ascii_lowercase() {
                c @ ('a'..='z' | '0'..='9' | '_' | '.' | '-') => Some(c),
                _ => None,
            }
        };
        let Some(c) = mapped else { continue };
        if (c == '-' || c == '.') && last == Some(c) {
            continue;
        }
        out.push(c);
        last = Some(c);
    }

    let trimmed = out.trim_matches(|c| c == '-' || c == '.');
    if !trimmed.chars().any(|c| c.is_ascii_alphanumeric()) {
        return FALLBACK_SEGMENT.to_string();
    }
    trimmed.to_string()
}

/// Sanitize a file name while keeping its extension attached.
///
/// The stem and extension are sanitized separately so `My Report.PDF` comes
/// out as `my-report.pdf` rather than losing the dot to collapse rules.
pub fn sanitize_file_name(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
            format!("{}.{}", sanitize(stem), sanitize(ext))
        }
        _ => sanitize(name),
    }
}

/// Build the canonical target key for an object with the given lineage.
///
/// Each lineage level is sanitized and joined with `/`, then the sanitized
/// file name is appended. An empty lineage places the object at the store
/// root under its own name.
pub fn build_target_key<S: AsRef<str>>(lineage: &[S], file_name: &str) -> String {
    let mut segments: Vec<String> = lineage.iter().map(|level| sanitize(level.as_ref())).collect();
    segments.push(sanitize_file_name(file_name));
    segments.join("/")
}

/// Like [`build_target_key`], with a content-hash disambiguator inserted
/// before the extension.
///
/// Used only when a *different* object already occupies the canonical key in
/// the same folder; the plain form stays canonical for no-op detection.
pub fn build_target_key_disambiguated<S: AsRef<str>>(
    lineage: &[S],
    file_name: &str,
    content_hash: &str,
) -> String {
    let tag: String = content_hash.chars().take(8).collect();
    let tagged = match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
            format!("{}-{}.{}", stem, tag, ext)
        }
        _ => format!("{}-{}", file_name, tag),
    };
    build_target_key(lineage, &tagged)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_hyphenates() {
        assert_eq!(sanitize("Intro To Robotics!"), "intro-to-robotics");
        assert_eq!(sanitize("Module 1"), "module-1");
    }

    #[test]
    fn collapses_whitespace_runs() {
        assert_eq!(sanitize("Lesson  One"), "lesson-one");
        assert_eq!(sanitize("  spaced \t out  "), "spaced-out");
    }

    #[test]
    fn strips_disallowed_characters() {
        assert_eq!(sanitize("a/b\\c:d"), "abcd");
        assert_eq!(sanitize("Ünïcode Näme"), "ncode-nme");
    }

    #[test]
    fn never_returns_an_empty_segment() {
        assert_eq!(sanitize(""), FALLBACK_SEGMENT);
        assert_eq!(sanitize("   "), FALLBACK_SEGMENT);
        assert_eq!(sanitize("!!!???"), FALLBACK_SEGMENT);
        assert_eq!(sanitize("---"), FALLBACK_SEGMENT);
        assert_eq!(sanitize(".."), FALLBACK_SEGMENT);
    }

    #[test]
    fn cannot_produce_traversal_segments() {
        assert_eq!(sanitize("a..b"), "a.b");
        assert_eq!(sanitize("..a.."), "a");
        assert!(!sanitize("x . . y").contains(".."));
    }

    #[test]
    fn file_names_keep_their_extension() {
        assert_eq!(sanitize_file_name("My Report (final).PDF"), "my-report-final.pdf");
        assert_eq!(sanitize_file_name("notes.pdf"), "notes.pdf");
        assert_eq!(sanitize_file_name("no-extension"), "no-extension");
    }

    #[test]
    fn target_key_matches_lineage_scenario() {
        let lineage = ["Intro To Robotics!", "Module 1", "Lesson  One"];
        assert_eq!(
            build_target_key(&lineage, "notes.pdf"),
            "intro-to-robotics/module-1/lesson-one/notes.pdf"
        );
    }

    #[test]
    fn target_key_is_deterministic() {
        let lineage = ["Course X", "Mod 2"];
        assert_eq!(
            build_target_key(&lineage, "a b.txt"),
            build_target_key(&lineage, "a b.txt")
        );
    }

    #[test]
    fn disambiguator_lands_before_the_extension() {
        let lineage = ["Course X"];
        assert_eq!(
            build_target_key_disambiguated(&lineage, "notes.pdf", "abcdef0123456789"),
            "course-x/notes-abcdef01.pdf"
        );
        assert_eq!(
            build_target_key_disambiguated(&lineage, "readme", "abcdef0123456789"),
            "course-x/readme-abcdef01"
        );
    }
}
