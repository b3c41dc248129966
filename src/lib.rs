//! opdsdir: serve a directory tree as an OPDS catalog.
//!
//! Each directory becomes an Atom feed; each file becomes a downloadable acquisition link.
//! [`paths`] keeps requests inside the configured root, [`catalog`] decides what every
//! directory is and builds its feed, [`server`] puts both behind HTTP.

pub mod atom;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod error;
pub mod paths;
pub mod server;
