//! Opaque media locators.
//!
//! A locator has the shape `content://<authority>/v1/<token>/<display-name>`.
//! It carries the ticket token and a display name only; the mount, host and
//! share path stay inside the ticket store.

use percent_encoding::percent_decode_str;
use url::Url;

use crate::error::UriError;

pub const URI_SCHEME: &str = "content";
pub const URI_VERSION: &str = "v1";

/// Default locator authority.
pub const DEFAULT_AUTHORITY: &str = "smbvfs.smbmedia";

/// Display name used when the caller supplies a blank one.
pub const FALLBACK_DISPLAY_NAME: &str = "media";

/// Builds and parses locators for one authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaUriBuilder {
    authority: String,
}

impl Default for MediaUriBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_AUTHORITY)
    }
}

impl MediaUriBuilder {
    pub fn new(authority: impl Into<String>) -> Self {
        Self {
            authority: authority.into(),
        }
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    fn base(&self) -> Result<Url, UriError> {
        let url = Url::parse(&format!("{URI_SCHEME}://{}/", self.authority))
            .map_err(|e| UriError::InvalidAuthority(e.to_string()))?;
        if url.host_str() != Some(self.authority.as_str()) {
            return Err(UriError::InvalidAuthority(self.authority.clone()));
        }
        Ok(url)
    }

    /// Build the locator for `token`.
    ///
    /// Path separators in the display name become `_` and a blank name becomes
    /// [`FALLBACK_DISPLAY_NAME`]; everything else is percent-encoded.
    pub fn build(&self, token: &str, display_name: &str) -> Result<String, UriError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(UriError::EmptyToken);
        }
        let mut url = self.base()?;
        url.path_segments_mut()
            .map_err(|_| UriError::InvalidAuthority(self.authority.clone()))?
            .clear()
            .push(URI_VERSION)
            .push(token)
            .push(&safe_display_name(display_name));
        Ok(url.into())
    }

    /// Split a locator of this authority into its segments after the version.
    fn segments(&self, locator: &str) -> Option<Vec<String>> {
        let url = Url::parse(locator.trim()).ok()?;
        if url.scheme() != URI_SCHEME || url.host_str() != Some(self.authority.as_str()) {
            return None;
        }
        let mut segs = url.path_segments()?;
        if segs.next()? != URI_VERSION {
            return None;
        }
        segs.map(|s| percent_decode_str(s).decode_utf8().ok().map(|s| s.into_owned()))
            .collect()
    }

    /// Extract the ticket token from a locator of this authority.
    pub fn parse_token(&self, locator: &str) -> Option<String> {
        let segs = self.segments(locator)?;
        let token = segs.first()?.trim();
        (!token.is_empty()).then(|| token.to_string())
    }

    /// Decoded display name from a locator of this authority.
    pub fn display_name(&self, locator: &str) -> Option<String> {
        let segs = self.segments(locator)?;
        match segs.as_slice() {
            [_, name, ..] if !name.is_empty() => Some(name.clone()),
            _ => None,
        }
    }
}

/// Replace path separators and fall back on blank names.
pub fn safe_display_name(name: &str) -> String {
    let name = name.trim();
    if name.is_empty() {
        return FALLBACK_DISPLAY_NAME.to_string();
    }
    name.replace(['/', '\\'], "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_versioned_locator() {
        let uris = MediaUriBuilder::new("com.example.smbmedia");
        let locator = uris.build("abc123", "a.mp4").unwrap();
        assert_eq!(locator, "content://com.example.smbmedia/v1/abc123/a.mp4");
        assert_eq!(uris.parse_token(&locator).as_deref(), Some("abc123"));
        assert_eq!(uris.display_name(&locator).as_deref(), Some("a.mp4"));
    }

    #[test]
    fn separators_and_blank_names() {
        let uris = MediaUriBuilder::default();
        let locator = uris.build("t", "dir/sub\\x.mkv").unwrap();
        assert!(locator.ends_with("/v1/t/dir_sub_x.mkv"), "{locator}");

        let locator = uris.build("t", "   ").unwrap();
        assert!(locator.ends_with("/v1/t/media"), "{locator}");
    }

    #[test]
    fn names_are_percent_encoded_and_decoded() {
        let uris = MediaUriBuilder::default();
        let locator = uris.build("t", "My Movie #1?.mp4").unwrap();
        assert!(!locator.contains(' '));
        assert!(!locator.contains('#'));
        assert_eq!(
            uris.display_name(&locator).as_deref(),
            Some("My Movie #1?.mp4")
        );
    }

    #[test]
    fn token_is_trimmed_and_required() {
        let uris = MediaUriBuilder::default();
        assert_eq!(uris.build("  ", "a"), Err(UriError::EmptyToken));
        let locator = uris.build(" tok ", "a").unwrap();
        assert_eq!(uris.parse_token(&locator).as_deref(), Some("tok"));
    }

    #[test]
    fn foreign_locators_are_rejected() {
        let uris = MediaUriBuilder::new("a.b");
        assert_eq!(uris.parse_token("content://other/v1/tok/x"), None);
        assert_eq!(uris.parse_token("https://a.b/v1/tok/x"), None);
        assert_eq!(uris.parse_token("content://a.b/v2/tok/x"), None);
        assert_eq!(uris.parse_token("content://a.b/v1/"), None);
        assert_eq!(uris.parse_token("not a url"), None);
    }

    #[test]
    fn bad_authority_is_an_error() {
        let uris = MediaUriBuilder::new("bad host/with path");
        assert!(matches!(
            uris.build("t", "a"),
            Err(UriError::InvalidAuthority(_))
        ));
    }
}
