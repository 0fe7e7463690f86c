//! Mapping from an original blob's URL to where its thumbnail is written.
//!
//! The destination is derived textually: the originals folder token in the
//! URL path is swapped for the thumbnails token and the extension of the
//! final segment is replaced. Containers are always the configured folders;
//! the object name is the last path segment.

use crate::models::{blob::BlobLocation, event::EventError};
use percent_encoding::percent_decode_str;

/// Pieces of an absolute URL: `scheme://authority`, the path, and any
/// query or fragment suffix.
struct SplitLocation<'a> {
    origin: &'a str,
    path: &'a str,
    suffix: &'a str,
}

impl<'a> SplitLocation<'a> {
    fn parse(url: &'a str) -> Result<Self, EventError> {
        let invalid = |reason| EventError::InvalidLocation {
            url: url.to_string(),
            reason,
        };

        let scheme_end = url.find("://").ok_or_else(|| invalid("not an absolute url"))?;
        if scheme_end == 0 {
            return Err(invalid("missing scheme"));
        }

        let suffix_start = url.find(['?', '#']).unwrap_or(url.len());
        let (without_suffix, suffix) = url.split_at(suffix_start);

        let authority_start = scheme_end + 3;
        if authority_start > without_suffix.len() {
            return Err(invalid("missing host"));
        }
        let path_start = without_suffix[authority_start..]
            .find('/')
            .map_or(without_suffix.len(), |i| authority_start + i);
        if path_start == authority_start {
            return Err(invalid("missing host"));
        }

        let (origin, path) = without_suffix.split_at(path_start);
        Ok(Self {
            origin,
            path,
            suffix,
        })
    }

    fn last_segment(&self) -> &'a str {
        self.path.rsplit('/').next().unwrap_or_default()
    }
}

/// Derive the thumbnail URL for `source_location`.
///
/// The first occurrence of `source_token` in the URL path is replaced with
/// `dest_token` (case-sensitive, no pattern matching). The extension of the
/// final path segment is then replaced with `dest_extension`, or appended
/// when the segment has none. A leading dot on `dest_extension` is optional.
///
/// When the token does not occur, the path is left as is and only the
/// extension changes. Strings that do not look like absolute URLs are
/// treated as bare paths.
pub fn resolve_destination(
    source_location: &str,
    source_token: &str,
    dest_token: &str,
    dest_extension: &str,
) -> String {
    let (origin, path, suffix) = match SplitLocation::parse(source_location) {
        Ok(split) => (split.origin, split.path, split.suffix),
        Err(_) => ("", source_location, ""),
    };

    let path = if source_token.is_empty() {
        path.to_string()
    } else {
        path.replacen(source_token, dest_token, 1)
    };

    format!(
        "{}{}{}",
        origin,
        replace_extension(&path, dest_extension),
        suffix
    )
}

/// Swap or append the extension of the last segment of `path`.
///
/// A dot in first position (`.hidden`) does not start an extension.
fn replace_extension(path: &str, extension: &str) -> String {
    let extension = extension.trim_start_matches('.');
    let segment_start = path.rfind('/').map_or(0, |i| i + 1);
    let stem_end = match path[segment_start..].rfind('.') {
        Some(dot) if dot > 0 => segment_start + dot,
        _ => path.len(),
    };

    if extension.is_empty() {
        path[..stem_end].to_string()
    } else {
        format!("{}.{}", &path[..stem_end], extension)
    }
}

/// Configured folder tokens plus the fixed thumbnail extension.
#[derive(Debug, Clone)]
pub struct BlobPathResolver {
    originals: String,
    thumbnails: String,
    extension: String,
}

impl BlobPathResolver {
    pub fn new(
        originals: impl Into<String>,
        thumbnails: impl Into<String>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            originals: originals.into(),
            thumbnails: thumbnails.into(),
            extension: extension.into(),
        }
    }

    pub fn originals(&self) -> &str {
        &self.originals
    }

    /// True when the URL path contains the originals token, i.e. when the
    /// destination will differ from the source by more than its extension.
    pub fn is_under_originals(&self, url: &str) -> bool {
        SplitLocation::parse(url)
            .map(|split| split.path.contains(self.originals.as_str()))
            .unwrap_or(false)
    }

    /// Where the original blob is read from.
    pub fn source(&self, url: &str) -> Result<BlobLocation, EventError> {
        Ok(BlobLocation::new(&self.originals, object_name(url)?))
    }

    /// Thumbnail URL and the location it is written to.
    pub fn destination(&self, url: &str) -> Result<(String, BlobLocation), EventError> {
        // Validate the source first so a malformed URL is never rewritten.
        object_name(url)?;
        let destination_url =
            resolve_destination(url, &self.originals, &self.thumbnails, &self.extension);
        let name = object_name(&destination_url)?;
        Ok((
            destination_url,
            BlobLocation::new(&self.thumbnails, name),
        ))
    }
}

/// Percent-decoded final path segment of an absolute URL.
fn object_name(url: &str) -> Result<String, EventError> {
    let split = SplitLocation::parse(url)?;
    let segment = split.last_segment();
    if segment.is_empty() {
        return Err(EventError::InvalidLocation {
            url: url.to_string(),
            reason: "no object name in path",
        });
    }
    Ok(percent_decode_str(segment).decode_utf8_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> BlobPathResolver {
        BlobPathResolver::new("originals", "thumbnails", ".png")
    }

    #[test]
    fn swaps_folder_and_extension() {
        assert_eq!(
            resolve_destination(
                "https://acct/originals/foo/bar.jpg",
                "originals",
                "thumbnails",
                ".png"
            ),
            "https://acct/thumbnails/foo/bar.png"
        );
    }

    #[test]
    fn only_first_token_in_path_is_replaced() {
        assert_eq!(
            resolve_destination(
                "https://originals.example/originals/originals.jpeg",
                "originals",
                "thumbnails",
                "png"
            ),
            "https://originals.example/thumbnails/originals.png"
        );
    }

    #[test]
    fn token_match_is_case_sensitive() {
        assert_eq!(
            resolve_destination("https://acct/Originals/a.gif", "originals", "thumbnails", ".png"),
            "https://acct/Originals/a.png"
        );
    }

    #[test]
    fn appends_extension_when_segment_has_none() {
        assert_eq!(
            resolve_destination(
                "https://acct/originals/v1.2/photo",
                "originals",
                "thumbnails",
                ".png"
            ),
            "https://acct/thumbnails/v1.2/photo.png"
        );
        assert_eq!(
            resolve_destination("https://acct/originals/.hidden", "originals", "thumbnails", ".png"),
            "https://acct/thumbnails/.hidden.png"
        );
    }

    #[test]
    fn only_last_extension_changes() {
        assert_eq!(
            resolve_destination(
                "https://acct/originals/archive.tar.gz",
                "originals",
                "thumbnails",
                ".png"
            ),
            "https://acct/thumbnails/archive.tar.png"
        );
    }

    #[test]
    fn query_string_is_preserved() {
        assert_eq!(
            resolve_destination(
                "https://acct/originals/a.jpg?sv=2024&sig=x.y",
                "originals",
                "thumbnails",
                ".png"
            ),
            "https://acct/thumbnails/a.png?sv=2024&sig=x.y"
        );
    }

    #[test]
    fn absent_token_passes_through() {
        assert_eq!(
            resolve_destination("https://acct/uploads/a.jpg", "originals", "thumbnails", ".png"),
            "https://acct/uploads/a.png"
        );
        assert!(!resolver().is_under_originals("https://acct/uploads/a.jpg"));
        assert!(resolver().is_under_originals("https://acct/originals/a.jpg"));
    }

    #[test]
    fn source_and_destination_locations() {
        let url = "https://acct.blob.core.windows.net/originals/my%20cat.jpg";
        let source = resolver().source(url).unwrap();
        assert_eq!(source, BlobLocation::new("originals", "my cat.jpg"));

        let (dest_url, dest) = resolver().destination(url).unwrap();
        assert_eq!(
            dest_url,
            "https://acct.blob.core.windows.net/thumbnails/my%20cat.png"
        );
        assert_eq!(dest, BlobLocation::new("thumbnails", "my cat.png"));
    }

    #[test]
    fn rejects_unusable_locations() {
        for url in [
            "originals/cat.jpg",
            "https://",
            "https:///originals/cat.jpg",
            "https://acct/originals/",
            "https://acct",
        ] {
            assert!(
                matches!(
                    resolver().source(url),
                    Err(EventError::InvalidLocation { .. })
                ),
                "{url} should be rejected"
            );
            assert!(resolver().destination(url).is_err(), "{url}");
        }
    }
}
