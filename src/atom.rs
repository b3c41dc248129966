//! Atom/OPDS value objects and their XML encoding.
//!
//! Plain structs filled in by the catalog builder; field order is element order on the wire.
//! Attributes are the `@`-prefixed fields, which is how quick-xml's serde support spells them.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::error::{CatalogError, CatalogResult};

pub const XML_HEADER: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

pub const ATOM_NS: &str = "http://www.w3.org/2005/Atom";
pub const DC_NS: &str = "http://purl.org/dc/terms/";
pub const OPDS_NS: &str = "http://opds-spec.org/2010/catalog";

pub const NAVIGATION_TYPE: &str = "application/atom+xml;profile=opds-catalog;kind=navigation";
pub const ACQUISITION_TYPE: &str = "application/atom+xml;profile=opds-catalog;kind=acquisition";

pub const REL_START: &str = "start";
pub const REL_SUBSECTION: &str = "subsection";
pub const REL_ACQUISITION: &str = "http://opds-spec.org/acquisition";
pub const REL_THUMBNAIL: &str = "http://opds-spec.org/image/thumbnail";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    #[serde(rename = "@rel")]
    pub rel: String,
    #[serde(rename = "@href")]
    pub href: String,
    #[serde(rename = "@type", skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(rename = "@title", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Person {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub title: String,
    pub id: String,
    pub link: Vec<Link>,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "opt_atom_time")]
    pub updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Feed {
    #[serde(rename = "@xmlns")]
    pub xmlns: &'static str,
    #[serde(rename = "@xmlns:dc", skip_serializing_if = "Option::is_none")]
    pub xmlns_dc: Option<&'static str>,
    #[serde(rename = "@xmlns:opds", skip_serializing_if = "Option::is_none")]
    pub xmlns_opds: Option<&'static str>,
    pub title: String,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<Person>,
    pub link: Vec<Link>,
    #[serde(serialize_with = "atom_time")]
    pub updated: DateTime<Utc>,
    pub entry: Vec<Entry>,
}

impl Feed {
    /// Acquisition feeds declare the Dublin Core and OPDS namespaces on the root element.
    pub fn declare_acquisition_namespaces(&mut self) {
        self.xmlns_dc = Some(DC_NS);
        self.xmlns_opds = Some(OPDS_NS);
    }

    /// Serialize to a UTF-8 document with XML declaration.
    pub fn to_xml(&self) -> CatalogResult<String> {
        let mut doc = String::from(XML_HEADER);
        let mut ser = quick_xml::se::Serializer::with_root(&mut doc, Some("feed"))
            .map_err(|e| CatalogError::encoding(e.to_string()))?;
        ser.indent(' ', 2);
        self.serialize(ser).map_err(|e| CatalogError::encoding(e.to_string()))?;
        Ok(doc)
    }
}

/// RFC 3339 with a numeric offset (`+00:00`).
fn atom_time<S: Serializer>(t: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&t.to_rfc3339())
}

fn opt_atom_time<S: Serializer>(t: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error> {
    match t {
        Some(t) => atom_time(t, s),
        None => s.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct ParsedFeed {
        id: String,
        #[serde(default)]
        entry: Vec<ParsedEntry>,
    }

    #[derive(Debug, Deserialize)]
    struct ParsedEntry {
        id: String,
        link: Vec<ParsedLink>,
    }

    #[derive(Debug, Deserialize)]
    struct ParsedLink {
        #[serde(rename = "@href")]
        href: String,
    }

    fn sample() -> Feed {
        let updated = Utc.with_ymd_and_hms(2020, 5, 25, 0, 0, 0).unwrap();
        let entry = |name: &str, href: &str| Entry {
            title: name.to_string(),
            id: format!("/mybook{name}"),
            link: vec![Link {
                rel: REL_ACQUISITION.to_string(),
                href: href.to_string(),
                media_type: Some("application/epub+zip".to_string()),
                title: Some(name.to_string()),
            }],
            updated: None,
        };
        Feed {
            xmlns: ATOM_NS,
            xmlns_dc: None,
            xmlns_opds: None,
            title: "Catalog in /mybook".to_string(),
            id: "/mybook".to_string(),
            author: None,
            link: vec![Link {
                rel: REL_START.to_string(),
                href: "/".to_string(),
                media_type: Some(NAVIGATION_TYPE.to_string()),
                title: None,
            }],
            updated,
            entry: vec![
                entry("mybook copy.epub", "/mybook/mybook%20copy.epub"),
                entry("R&D <notes>.epub", "/mybook/R%26D%20%3Cnotes%3E.epub"),
            ],
        }
    }

    #[test]
    fn navigation_feed_has_only_atom_namespace() {
        let xml = sample().to_xml().unwrap();
        assert!(xml.starts_with(XML_HEADER), "{xml}");
        assert!(xml.contains(r#"<feed xmlns="http://www.w3.org/2005/Atom">"#), "{xml}");
        assert!(!xml.contains("xmlns:dc"));
        assert!(xml.contains("<updated>2020-05-25T00:00:00+00:00</updated>"));
        assert!(xml.contains(r#"<link rel="start" href="/" type="application/atom+xml;profile=opds-catalog;kind=navigation""#), "{xml}");
    }

    #[test]
    fn acquisition_feed_declares_extra_namespaces() {
        let mut feed = sample();
        feed.declare_acquisition_namespaces();
        let xml = feed.to_xml().unwrap();
        assert!(xml.contains(r#"xmlns:dc="http://purl.org/dc/terms/""#));
        assert!(xml.contains(r#"xmlns:opds="http://opds-spec.org/2010/catalog""#));
    }

    #[test]
    fn author_is_written_when_present() {
        let mut feed = sample();
        feed.author = Some(Person { name: "Librarian".into(), email: Some("lib@example.org".into()), uri: None });
        let xml = feed.to_xml().unwrap();
        assert!(xml.contains("<name>Librarian</name>"));
        assert!(xml.contains("<email>lib@example.org</email>"));
        assert!(!xml.contains("<uri>"));
    }

    #[test]
    fn reparsed_feed_keeps_ids_and_hrefs() {
        let feed = sample();
        let xml = feed.to_xml().unwrap();
        let parsed: ParsedFeed = quick_xml::de::from_str(&xml).unwrap();

        assert_eq!(parsed.id, feed.id);
        let ids: Vec<_> = parsed.entry.iter().map(|e| e.id.as_str()).collect();
        let want_ids: Vec<_> = feed.entry.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, want_ids);

        let hrefs: Vec<_> = parsed.entry.iter().flat_map(|e| e.link.iter().map(|l| l.href.as_str())).collect();
        let want_hrefs: Vec<_> = feed.entry.iter().flat_map(|e| e.link.iter().map(|l| l.href.as_str())).collect();
        assert_eq!(hrefs, want_hrefs);
    }
}
