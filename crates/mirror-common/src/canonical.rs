/// Canonical local filenames for mirrored documentation pages.
///
/// A URL path such as `/docs/en/agents/overview` maps to `docs__en__agents__overview.md`:
/// - surrounding whitespace and leading/trailing slashes are dropped
/// - every remaining `/` becomes `__`
/// - ASCII letters, digits, `-` and `.` are kept as-is
/// - every other byte (including `_` and `%`) is written as `%XX`, so `__` can only
///   come from a separator and the mapping can be reversed
/// - the site root maps to `_index.md`
/// - stems longer than `MAX_STEM_LEN` are cut and suffixed with a SHA-256 digest of the path
///
/// The fetcher names files with [`canonicalize`] and the validators look files up with
/// the same function. Nothing else in the workspace builds document filenames.
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

use sha2::{Digest, Sha256};

/// Extension carried by every materialized document.
pub const DOC_EXTENSION: &str = ".md";

const SEPARATOR: &str = "__";
const ROOT_STEM: &str = "_index";
const MAX_STEM_LEN: usize = 180;
const DIGEST_HEX_LEN: usize = 16;

/// Map a discovered URL path to its filename inside the flat documents directory.
pub fn canonicalize(url_path: &str) -> String {
    let trimmed = normalize(url_path.trim());
    if trimmed.is_empty() {
        return format!("{ROOT_STEM}{DOC_EXTENSION}");
    }

    let mut stem = String::with_capacity(trimmed.len() + 8);
    for ch in trimmed.chars() {
        match ch {
            '/' => stem.push_str(SEPARATOR),
            c if c.is_ascii_alphanumeric() || c == '-' || c == '.' => stem.push(c),
            c => {
                let mut buf = [0u8; 4];
                for byte in c.encode_utf8(&mut buf).bytes() {
                    let _ = write!(stem, "%{byte:02X}");
                }
            }
        }
    }

    // The stem is pure ASCII at this point, so truncating by byte length is safe.
    if stem.len() > MAX_STEM_LEN {
        let digest = Sha256::digest(trimmed.as_bytes());
        let hex = format!("{digest:x}");
        stem.truncate(MAX_STEM_LEN - DIGEST_HEX_LEN - 1);
        stem.push('-');
        stem.push_str(&hex[..DIGEST_HEX_LEN]);
    }

    stem.push_str(DOC_EXTENSION);
    stem
}

/// Recover the URL path a canonical filename was produced from.
///
/// Returns `None` for names that `canonicalize` cannot have produced, and for
/// length-capped names whose tail was replaced by a digest.
pub fn source_path(filename: &str) -> Option<String> {
    let stem = filename.strip_suffix(DOC_EXTENSION)?;
    if stem == ROOT_STEM {
        return Some("/".to_string());
    }

    let bytes = stem.as_bytes();
    let mut decoded: Vec<u8> = Vec::with_capacity(bytes.len() + 1);
    decoded.push(b'/');
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' if bytes.get(i + 1) == Some(&b'_') => {
                decoded.push(b'/');
                i += 2;
            }
            b'%' => {
                let hex = stem.get(i + 1..i + 3)?;
                decoded.push(u8::from_str_radix(hex, 16).ok()?);
                i += 3;
            }
            b if b.is_ascii_alphanumeric() || b == b'-' || b == b'.' => {
                decoded.push(b);
                i += 1;
            }
            _ => return None,
        }
    }

    let path = String::from_utf8(decoded).ok()?;
    // Digest-suffixed names decode to something that no longer maps back to them.
    (canonicalize(&path) == filename).then_some(path)
}

/// Two or more distinct manifest paths that canonicalize to the same filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collision {
    pub filename: String,
    pub paths: Vec<String>,
}

/// Find every filename claimed by more than one distinct path.
///
/// Paths that differ only by leading/trailing slashes name the same page and are not
/// reported here; exact repeats are the duplicate check's concern.
pub fn find_collisions<'a, I>(paths: I) -> Vec<Collision>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut claims: BTreeMap<String, BTreeSet<&'a str>> = BTreeMap::new();
    for path in paths {
        claims
            .entry(canonicalize(path))
            .or_default()
            .insert(normalize(path));
    }

    claims
        .into_iter()
        .filter(|(_, owners)| owners.len() > 1)
        .map(|(filename, owners)| Collision {
            filename,
            paths: owners.into_iter().map(str::to_string).collect(),
        })
        .collect()
}

/// Strip leading and trailing slashes, the form paths are compared in.
pub fn normalize(url_path: &str) -> &str {
    url_path.trim_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_is_deterministic() {
        let paths = ["/docs/en/a", "/en/quickstart", "/docs/en/api/messages_batches", ""];
        for path in paths {
            assert_eq!(canonicalize(path), canonicalize(path), "unstable for {path:?}");
        }
    }

    #[test]
    fn test_canonicalize_uses_segment_names() {
        assert_eq!(canonicalize("/docs/en/agents/overview"), "docs__en__agents__overview.md");
        assert_eq!(canonicalize("/en/quickstart/"), "en__quickstart.md");
        assert_eq!(canonicalize("quickstart"), "quickstart.md");
        assert_eq!(canonicalize("/v1.2/release-notes"), "v1.2__release-notes.md");
    }

    #[test]
    fn test_canonicalize_root() {
        assert_eq!(canonicalize("/"), "_index.md");
        assert_eq!(canonicalize(""), "_index.md");
        assert_ne!(canonicalize("/index"), canonicalize("/"));
    }

    #[test]
    fn test_canonicalize_escapes_reserved_characters() {
        let name = canonicalize("/docs/en/a b?c=d:e\\f*g|h\"i<j>k");
        assert!(!name.contains('/'), "separator leaked into {name}");
        for reserved in [' ', '?', ':', '\\', '*', '|', '"', '<', '>', '='] {
            assert!(!name.contains(reserved), "{reserved:?} leaked into {name}");
        }
        assert_eq!(canonicalize("/a_b"), "a%5Fb.md");
        assert_eq!(canonicalize("/caf\u{e9}"), "caf%C3%A9.md");
    }

    #[test]
    fn test_canonicalize_separator_cannot_be_forged() {
        let nested = canonicalize("/a/b");
        let underscored = canonicalize("/a__b");
        let percent = canonicalize("/a%5Fb");
        assert_ne!(nested, underscored);
        assert_ne!(underscored, percent);
        assert_ne!(nested, percent);
    }

    #[test]
    fn test_canonicalize_caps_long_names() {
        let long_a = format!("/docs/en/{}a", "segment/".repeat(40));
        let long_b = format!("/docs/en/{}b", "segment/".repeat(40));
        let name_a = canonicalize(&long_a);
        let name_b = canonicalize(&long_b);
        assert!(name_a.len() <= MAX_STEM_LEN + DOC_EXTENSION.len());
        assert!(name_a.starts_with("docs__en__segment"));
        assert_ne!(name_a, name_b);
        assert_eq!(name_a, canonicalize(&long_a));
    }

    #[test]
    fn test_source_path_reverses_canonicalize() {
        for path in ["/docs/en/a", "/en/quick_start", "/caf\u{e9}/menu", "/a//b", "/"] {
            let name = canonicalize(path);
            assert_eq!(source_path(&name).as_deref(), Some(path), "via {name}");
        }
    }

    #[test]
    fn test_source_path_rejects_foreign_names() {
        assert_eq!(source_path("changelog.txt"), None);
        assert_eq!(source_path("single_underscore.md"), None);
        assert_eq!(source_path("bad%zzescape.md"), None);
        let long = format!("/docs/{}", "x".repeat(400));
        assert_eq!(source_path(&canonicalize(&long)), None);
    }

    #[test]
    fn test_find_collisions_ignores_slash_variants() {
        let paths = ["/docs/en/a", "docs/en/a/", "/docs/en/b"];
        assert!(find_collisions(paths).is_empty());
    }

    #[test]
    fn test_find_collisions_reports_shared_filename() {
        let paths = ["/docs/en/a", "/docs/en/a ", "/docs/en/b"];
        let collisions = find_collisions(paths);
        assert_eq!(collisions.len(), 1);
        assert_eq!(collisions[0].filename, "docs__en__a.md");
        assert_eq!(collisions[0].paths, vec!["docs/en/a", "docs/en/a "]);
    }
}
