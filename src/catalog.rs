//!
//! Directory classification and feed assembly
//! ------------------------------------------
//! A directory with at least one non-directory child is an acquisition catalog (its entries
//! are downloads); one with only subdirectories, or nothing at all, is a navigation catalog.
//! Only immediate children are inspected. Building a feed therefore costs one listing of the
//! target plus one listing per child directory, and never goes deeper.
//!
//! Classification always sees the unfiltered listing: a folder holding nothing but hidden
//! files is still an acquisition catalog even when those files are hidden from its feed.
//!
//! Symlinked children are canonicalized and checked against the trusted root before they are
//! stat'ed or listed. A link that leaves the root, or leads nowhere, is dropped from the listing
//! as if it did not exist, for classification as well as for entries.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::atom::{self, Entry, Feed, Link, Person};
use crate::clock::Clock;
use crate::error::{CatalogError, CatalogResult};
use crate::paths::{child_href, ResolvedPath, TrustedRoot};

pub mod filter;
pub mod mime_table;

pub use filter::FilterPolicy;

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "gif"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    RegularFile,
    /// At least one immediate child is not a directory.
    DirectoryOfFiles,
    /// Every immediate child is a directory (vacuously true when empty).
    DirectoryOfDirectories,
}

impl EntryKind {
    pub fn is_directory(self) -> bool {
        !matches!(self, EntryKind::RegularFile)
    }

    /// OPDS profile string describing the feed this kind renders as.
    pub fn feed_type(self) -> Option<&'static str> {
        match self {
            EntryKind::RegularFile => None,
            EntryKind::DirectoryOfFiles => Some(atom::ACQUISITION_TYPE),
            EntryKind::DirectoryOfDirectories => Some(atom::NAVIGATION_TYPE),
        }
    }

    /// Link relation for a child named `name` of this kind.
    pub fn relation(self, name: &str) -> &'static str {
        match self {
            EntryKind::DirectoryOfFiles | EntryKind::DirectoryOfDirectories => atom::REL_SUBSECTION,
            EntryKind::RegularFile => match mime_table::extension_of(name) {
                Some(ext) if IMAGE_EXTENSIONS.contains(&ext.as_str()) => atom::REL_THUMBNAIL,
                _ => atom::REL_ACQUISITION,
            },
        }
    }

    /// Link media type for a child named `name` of this kind.
    pub fn media_type(self, name: &str) -> Option<String> {
        match self {
            EntryKind::RegularFile => mime_table::type_for_name(name),
            EntryKind::DirectoryOfFiles | EntryKind::DirectoryOfDirectories => self.feed_type().map(str::to_string),
        }
    }
}

/// One immediate child as reported by a [`DirSource`]. Nothing here follows symlinks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirChild {
    pub name: String,
    pub is_dir: bool,
    pub is_symlink: bool,
}

/// A child that passed the root check, with the real path to stat it through.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Settled {
    name: String,
    is_dir: bool,
    path: PathBuf,
}

/// Read-only filesystem queries the catalog needs.
pub trait DirSource: Send + Sync {
    fn is_dir(&self, path: &Path) -> std::io::Result<bool>;
    /// Immediate children in no particular order.
    fn list(&self, path: &Path) -> std::io::Result<Vec<DirChild>>;
    fn modified(&self, path: &Path) -> Option<DateTime<Utc>>;
    fn canonicalize(&self, path: &Path) -> std::io::Result<PathBuf>;
}

/// [`DirSource`] over the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl DirSource for LocalFs {
    fn is_dir(&self, path: &Path) -> std::io::Result<bool> {
        Ok(std::fs::metadata(path)?.is_dir())
    }

    fn list(&self, path: &Path) -> std::io::Result<Vec<DirChild>> {
        let mut children = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            children.push(DirChild {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: file_type.is_dir(),
                is_symlink: file_type.is_symlink(),
            });
        }
        Ok(children)
    }

    fn modified(&self, path: &Path) -> Option<DateTime<Utc>> {
        let mtime = std::fs::metadata(path).ok()?.modified().ok()?;
        Some(DateTime::<Utc>::from(mtime))
    }

    fn canonicalize(&self, path: &Path) -> std::io::Result<PathBuf> {
        std::fs::canonicalize(path)
    }
}

/// Kind of a directory given its (unfiltered, settled) children.
fn classify_children(children: &[Settled]) -> EntryKind {
    if children.iter().any(|c| !c.is_dir) {
        EntryKind::DirectoryOfFiles
    } else {
        EntryKind::DirectoryOfDirectories
    }
}

/// A directory feed together with the classification that shaped it.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogFeed {
    pub kind: EntryKind,
    pub feed: Feed,
}

impl CatalogFeed {
    pub fn content_type(&self) -> &'static str {
        self.kind.feed_type().unwrap_or(atom::NAVIGATION_TYPE)
    }
}

/// What a resolved request path turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogTarget {
    File { path: PathBuf, media_type: Option<String> },
    Feed(CatalogFeed),
}

#[derive(Clone)]
pub struct CatalogBuilder {
    source: Arc<dyn DirSource>,
    clock: Arc<dyn Clock>,
    author: Option<Person>,
}

impl CatalogBuilder {
    pub fn new(source: Arc<dyn DirSource>, clock: Arc<dyn Clock>) -> Self {
        Self { source, clock, author: None }
    }

    pub fn with_author(mut self, author: Option<Person>) -> Self {
        self.author = author;
        self
    }

    /// Kind of `path`, which must already be canonical and inside `root`.
    pub fn classify(&self, root: &TrustedRoot, path: &Path) -> CatalogResult<EntryKind> {
        let is_dir = self.source.is_dir(path).map_err(|source| listing_failed(path, source))?;
        if !is_dir {
            return Ok(EntryKind::RegularFile);
        }
        let children = self.settled_children(root, path).map_err(|source| listing_failed(path, source))?;
        Ok(classify_children(&children))
    }

    /// Classify the target and, for directories, assemble its feed.
    pub fn lookup(&self, root: &TrustedRoot, resolved: &ResolvedPath, filter: &FilterPolicy) -> CatalogResult<CatalogTarget> {
        let path = &resolved.fs_path;
        let is_dir = self.source.is_dir(path).map_err(|source| listing_failed(path, source))?;
        if !is_dir {
            let media_type = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(mime_table::type_for_name);
            return Ok(CatalogTarget::File { path: path.clone(), media_type });
        }
        let children = self.settled_children(root, path).map_err(|source| listing_failed(path, source))?;
        Ok(CatalogTarget::Feed(self.assemble(root, resolved, children, filter)))
    }

    /// Feed for a resolved directory. A regular file is a listing failure here.
    pub fn build_feed(&self, root: &TrustedRoot, resolved: &ResolvedPath, filter: &FilterPolicy) -> CatalogResult<CatalogFeed> {
        match self.lookup(root, resolved, filter)? {
            CatalogTarget::Feed(feed) => Ok(feed),
            CatalogTarget::File { path, .. } => Err(CatalogError::ListingFailed {
                source: std::io::Error::other("not a directory"),
                path,
            }),
        }
    }

    /// List `dir` and resolve its symlinks, keeping only those that stay inside `root`.
    fn settled_children(&self, root: &TrustedRoot, dir: &Path) -> std::io::Result<Vec<Settled>> {
        let listed = self.source.list(dir)?;
        let mut settled = Vec::with_capacity(listed.len());
        for child in listed {
            let path = dir.join(&child.name);
            if !child.is_symlink {
                settled.push(Settled { name: child.name, is_dir: child.is_dir, path });
                continue;
            }
            let real = match self.source.canonicalize(&path) {
                Ok(real) if root.contains(&real) => real,
                Ok(_) => {
                    debug!(path = %path.display(), "symlink leaves the catalog root; skipped");
                    continue;
                }
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "dangling symlink; skipped");
                    continue;
                }
            };
            let is_dir = self.source.is_dir(&real).unwrap_or(false);
            settled.push(Settled { name: child.name, is_dir, path: real });
        }
        Ok(settled)
    }

    fn assemble(&self, root: &TrustedRoot, resolved: &ResolvedPath, mut children: Vec<Settled>, filter: &FilterPolicy) -> CatalogFeed {
        let kind = classify_children(&children);
        children.sort_by(|a, b| a.name.cmp(&b.name));

        let request_path = resolved.request_path.as_str();
        let entries: Vec<Entry> = children
            .into_iter()
            .filter(|child| filter.admits(&child.name))
            .map(|child| self.entry_for(root, resolved, child))
            .collect();

        debug!(request_path, ?kind, entries = entries.len(), "assembled feed");

        let mut feed = Feed {
            xmlns: atom::ATOM_NS,
            xmlns_dc: None,
            xmlns_opds: None,
            title: format!("Catalog in {request_path}"),
            id: request_path.to_string(),
            author: self.author.clone(),
            link: vec![Link {
                rel: atom::REL_START.to_string(),
                href: "/".to_string(),
                media_type: Some(atom::NAVIGATION_TYPE.to_string()),
                title: None,
            }],
            updated: self.clock.now(),
            entry: entries,
        };
        if kind == EntryKind::DirectoryOfFiles {
            feed.declare_acquisition_namespaces();
        }
        CatalogFeed { kind, feed }
    }

    fn entry_for(&self, root: &TrustedRoot, resolved: &ResolvedPath, child: Settled) -> Entry {
        let kind = if child.is_dir { self.classify_child_dir(root, &child.path) } else { EntryKind::RegularFile };
        let name = child.name;
        Entry {
            id: format!("{}{}", resolved.request_path, name),
            link: vec![Link {
                rel: kind.relation(&name).to_string(),
                href: child_href(&resolved.url_path, &name),
                media_type: kind.media_type(&name),
                title: Some(name.clone()),
            }],
            updated: self.source.modified(&child.path),
            title: name,
        }
    }

    /// An unreadable subdirectory still gets an entry rather than sinking the whole feed.
    fn classify_child_dir(&self, root: &TrustedRoot, path: &Path) -> EntryKind {
        match self.settled_children(root, path) {
            Ok(children) => classify_children(&children),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot list subdirectory; presenting it as navigation");
                EntryKind::DirectoryOfDirectories
            }
        }
    }
}

fn listing_failed(path: &Path, source: std::io::Error) -> CatalogError {
    CatalogError::ListingFailed { path: path.to_path_buf(), source }
}
