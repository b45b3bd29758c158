//! URL handling module for Shelfwatch
//!
//! This module provides URL normalization, relative link resolution, and the
//! derivation of record identities from source URLs.

mod identity;
mod normalize;
mod resolve;

pub use identity::derive_identity;
pub use normalize::normalize_url;
pub use resolve::resolve_link;
