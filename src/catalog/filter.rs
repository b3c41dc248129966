const CURRENT_DIRECTORY: &str = ".";
const PARENT_DIRECTORY: &str = "..";
const HIDDEN_FILE_PREFIX: char = '.';

/// Substrings that mark Calibre library bookkeeping rather than books.
const CALIBRE_MARKERS: [&str; 6] = [
    ".opf",
    "cover.",
    "metadata.db",
    "metadata_db_prefs_backup.json",
    ".caltrash",
    ".calnotes",
];

/// Which directory children are left out of a feed. Parent classification ignores this.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterPolicy {
    pub hide_dot_files: bool,
    pub hide_calibre_files: bool,
}

impl FilterPolicy {
    pub fn admits(&self, name: &str) -> bool {
        if name == CURRENT_DIRECTORY || name == PARENT_DIRECTORY {
            return true;
        }
        if self.hide_dot_files && name.starts_with(HIDDEN_FILE_PREFIX) {
            return false;
        }
        if self.hide_calibre_files && CALIBRE_MARKERS.iter().any(|m| name.contains(m)) {
            return false;
        }
        true
    }
}
