//! Trust boundary between request URLs and the served directory tree.
//!
//! Every request path is decoded, joined onto the trusted root, lexically normalized and then
//! canonicalized before any other filesystem call touches it. The canonical result must sit
//! at or below the (also canonical) root, compared component-wise. Nothing here is cached:
//! a symlink planted after startup is caught on the next request. A swap between this check
//! and the later open is possible and accepted; the filesystem cannot be locked from here.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use path_absolutize::Absolutize;

use crate::error::{CatalogError, CatalogResult};

/// Canonical directory beyond which no request may reach. Fixed for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedRoot {
    root: PathBuf,
}

/// A request path that passed the trust check, paired with the URL path it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// Canonical, symlink-free filesystem path inside the trusted root.
    pub fs_path: PathBuf,
    /// Percent-decoded request path, exactly as the client sent it.
    pub request_path: String,
    /// Normalized location below the root in `/seg/seg` form, decoded. Hrefs are built from this.
    pub url_path: String,
}

impl TrustedRoot {
    /// Canonicalize `dir` once. Fails when it is missing or not a directory.
    pub fn new<P: AsRef<Path>>(dir: P) -> anyhow::Result<Self> {
        let dir = dir.as_ref();
        let root = std::fs::canonicalize(dir)
            .with_context(|| format!("catalog root {} cannot be resolved", dir.display()))?;
        if !root.is_dir() {
            bail!("catalog root {} is not a directory", root.display());
        }
        Ok(Self { root })
    }

    pub fn as_path(&self) -> &Path {
        &self.root
    }

    /// Map an untrusted, still percent-encoded URL path onto a canonical path inside the root.
    pub fn resolve(&self, raw_path: &str) -> CatalogResult<ResolvedPath> {
        let request_path = decode_request_path(raw_path)?;

        // Always relative to the root; an absolute request path must not replace it in join().
        let relative = request_path.trim_start_matches(['/', '\\']);
        let joined = self.root.join(relative);
        let normalized = joined
            .absolutize()
            .map_err(|source| CatalogError::PathUnresolvable { path: joined.clone(), source })?
            .to_path_buf();

        let canonical = std::fs::canonicalize(&normalized)
            .map_err(|source| CatalogError::PathUnresolvable { path: normalized.clone(), source })?;

        if !self.contains(&canonical) {
            return Err(CatalogError::PathEscapesRoot { path: canonical });
        }

        // A lexical climb out that a symlink outside the root brings back in: fall back to the canonical form.
        let below_root = normalized
            .strip_prefix(&self.root)
            .or_else(|_| canonical.strip_prefix(&self.root))
            .map_err(|_| CatalogError::PathEscapesRoot { path: canonical.clone() })?;
        let url_path = url_path_of(below_root);

        Ok(ResolvedPath { fs_path: canonical, request_path, url_path })
    }

    /// Component-wise containment of an already canonical path, so `/srv/books-evil` is not
    /// inside `/srv/books`.
    pub fn contains(&self, canonical: &Path) -> bool {
        canonical.starts_with(&self.root)
    }
}

fn url_path_of(below_root: &Path) -> String {
    let mut out = String::new();
    for seg in below_root.iter() {
        out.push('/');
        out.push_str(&seg.to_string_lossy());
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// Percent-decode a URL path, rejecting stray `%` escapes and non-UTF-8 results.
pub fn decode_request_path(raw: &str) -> CatalogResult<String> {
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes.len() > i + 2
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit();
            if !valid {
                return Err(CatalogError::MalformedPath { path: raw.to_string() });
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .map_err(|_| CatalogError::MalformedPath { path: raw.to_string() })
}

/// Join a decoded `/seg/seg` directory path and a child name into a percent-escaped href.
pub fn child_href(url_path: &str, child_name: &str) -> String {
    let mut href = String::with_capacity(url_path.len() + child_name.len() + 8);
    for seg in url_path.split('/').filter(|s| !s.is_empty()) {
        href.push('/');
        href.push_str(&urlencoding::encode(seg));
    }
    href.push('/');
    href.push_str(&urlencoding::encode(child_name));
    href
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn library() -> (tempfile::TempDir, TrustedRoot) {
        let tmp = tempfile::tempdir().unwrap();
        let books = tmp.path().join("books");
        fs::create_dir_all(books.join("mybook")).unwrap();
        fs::write(books.join("mybook").join("mybook copy.txt"), "Fixture").unwrap();
        fs::create_dir_all(tmp.path().join("books-evil")).unwrap();
        fs::write(tmp.path().join("secret.txt"), "top secret").unwrap();
        let root = TrustedRoot::new(&books).unwrap();
        (tmp, root)
    }

    #[test]
    fn resolves_root_and_children() {
        let (_tmp, root) = library();
        let top = root.resolve("/").unwrap();
        assert_eq!(top.fs_path, root.as_path());
        assert_eq!(top.request_path, "/");

        let file = root.resolve("/mybook/mybook%20copy.txt").unwrap();
        assert_eq!(file.fs_path, root.as_path().join("mybook").join("mybook copy.txt"));
        assert_eq!(file.request_path, "/mybook/mybook copy.txt");
    }

    #[test]
    fn dot_dot_inside_root_is_fine() {
        let (_tmp, root) = library();
        let p = root.resolve("/mybook/../mybook/./").unwrap();
        assert_eq!(p.fs_path, root.as_path().join("mybook"));
    }

    #[test]
    fn dot_dot_escape_is_rejected() {
        let (_tmp, root) = library();
        let err = root.resolve("/../secret.txt").unwrap_err();
        assert!(matches!(err, CatalogError::PathEscapesRoot { .. }), "{err:?}");
        let err = root.resolve("/mybook/%2e%2e/%2e%2e/secret.txt").unwrap_err();
        assert!(matches!(err, CatalogError::PathEscapesRoot { .. }), "{err:?}");
        assert_eq!(err.http_status(), 404);
    }

    #[test]
    fn sibling_with_shared_prefix_is_rejected() {
        let (_tmp, root) = library();
        let err = root.resolve("/../books-evil").unwrap_err();
        assert!(matches!(err, CatalogError::PathEscapesRoot { .. }), "{err:?}");
    }

    #[cfg(unix)]
    #[test]
    fn outward_symlink_is_rejected() {
        let (tmp, root) = library();
        std::os::unix::fs::symlink(tmp.path().join("secret.txt"), root.as_path().join("leak.txt")).unwrap();
        std::os::unix::fs::symlink(tmp.path(), root.as_path().join("up")).unwrap();

        let err = root.resolve("/leak.txt").unwrap_err();
        assert!(matches!(err, CatalogError::PathEscapesRoot { .. }), "{err:?}");
        let err = root.resolve("/up/secret.txt").unwrap_err();
        assert!(matches!(err, CatalogError::PathEscapesRoot { .. }), "{err:?}");
    }

    #[cfg(unix)]
    #[test]
    fn inward_symlink_is_followed() {
        let (_tmp, root) = library();
        std::os::unix::fs::symlink(root.as_path().join("mybook"), root.as_path().join("alias")).unwrap();
        let p = root.resolve("/alias/mybook%20copy.txt").unwrap();
        assert_eq!(p.fs_path, root.as_path().join("mybook").join("mybook copy.txt"));
        assert_eq!(p.url_path, "/alias/mybook copy.txt");
    }

    #[test]
    fn missing_paths_are_unresolvable() {
        let (_tmp, root) = library();
        let err = root.resolve("/nope/nothing.epub").unwrap_err();
        assert!(matches!(err, CatalogError::PathUnresolvable { .. }), "{err:?}");
        assert_eq!(err.http_status(), 404);
    }

    #[test]
    fn malformed_escapes_are_rejected() {
        let (_tmp, root) = library();
        for raw in ["/mybook%", "/mybook%2", "/my%zzbook", "/%ff%fe"] {
            let err = root.resolve(raw).unwrap_err();
            assert!(matches!(err, CatalogError::MalformedPath { .. }), "{raw}: {err:?}");
        }
    }

    #[test]
    fn root_must_be_a_directory() {
        let (tmp, _root) = library();
        assert!(TrustedRoot::new(tmp.path().join("secret.txt")).is_err());
        assert!(TrustedRoot::new(tmp.path().join("absent")).is_err());
    }

    #[test]
    fn url_path_is_normalized_below_the_root() {
        let (_tmp, root) = library();
        assert_eq!(root.resolve("/").unwrap().url_path, "/");
        assert_eq!(root.resolve("//mybook/").unwrap().url_path, "/mybook");
        assert_eq!(root.resolve("/mybook/./../mybook").unwrap().url_path, "/mybook");
        let p = root.resolve("/mybook/../mybook/mybook%20copy.txt").unwrap();
        assert_eq!(p.url_path, "/mybook/mybook copy.txt");
        assert_eq!(p.request_path, "/mybook/../mybook/mybook copy.txt");
    }

    #[test]
    fn containment_is_component_wise() {
        let (tmp, root) = library();
        assert!(root.contains(root.as_path()));
        assert!(root.contains(&root.as_path().join("mybook")));
        let evil = std::fs::canonicalize(tmp.path().join("books-evil")).unwrap();
        assert!(!root.contains(&evil));
    }

    #[test]
    fn hrefs_escape_each_segment() {
        assert_eq!(child_href("/", "mybook"), "/mybook");
        assert_eq!(child_href("/", "new folder"), "/new%20folder");
        assert_eq!(child_href("/mybook", "mybook copy.epub"), "/mybook/mybook%20copy.epub");
        assert_eq!(child_href("/new folder", "a#b.pdf"), "/new%20folder/a%23b.pdf");
    }
}
