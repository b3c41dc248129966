use std::collections::HashMap;
use std::path::Path;

use once_cell::sync::Lazy;

/// Ebook and comic types the platform tables either lack or get wrong.
static EBOOK_TYPES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("mobi", "application/x-mobipocket-ebook"),
        ("epub", "application/epub+zip"),
        ("cbz", "application/x-cbz"),
        ("cbr", "application/x-cbr"),
        ("fb2", "text/fb2+xml"),
        ("pdf", "application/pdf"),
    ])
});

/// Lower-cased extension of a file name, without the dot.
pub fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// MIME type for an extension (no leading dot). Text types are declared UTF-8.
pub fn type_by_extension(ext: &str) -> Option<String> {
    let ext = ext.trim_start_matches('.').to_ascii_lowercase();
    let base = match EBOOK_TYPES.get(ext.as_str()) {
        Some(t) => *t,
        None => mime_guess::from_ext(&ext).first_raw()?,
    };
    if base.starts_with("text/") && !base.contains("charset") {
        Some(format!("{base}; charset=utf-8"))
    } else {
        Some(base.to_string())
    }
}

pub fn type_for_name(name: &str) -> Option<String> {
    extension_of(name).and_then(|ext| type_by_extension(&ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ebook_overrides() {
        assert_eq!(type_by_extension("mobi").as_deref(), Some("application/x-mobipocket-ebook"));
        assert_eq!(type_by_extension(".epub").as_deref(), Some("application/epub+zip"));
        assert_eq!(type_by_extension("cbz").as_deref(), Some("application/x-cbz"));
        assert_eq!(type_by_extension("CBR").as_deref(), Some("application/x-cbr"));
        assert_eq!(type_by_extension("fb2").as_deref(), Some("text/fb2+xml; charset=utf-8"));
        assert_eq!(type_by_extension("pdf").as_deref(), Some("application/pdf"));
    }

    #[test]
    fn platform_fallback() {
        assert_eq!(type_for_name("mybook.txt").as_deref(), Some("text/plain; charset=utf-8"));
        assert_eq!(type_for_name("cover.png").as_deref(), Some("image/png"));
        assert_eq!(type_for_name("cover.JPG").as_deref(), Some("image/jpeg"));
    }

    #[test]
    fn unknown_or_missing_extension() {
        assert_eq!(type_for_name("notes.zzqx"), None);
        assert_eq!(type_for_name("README"), None);
        assert_eq!(extension_of("archive.tar.gz").as_deref(), Some("gz"));
    }
}
