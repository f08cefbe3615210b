//! Photo filename derivation for imported pictures.

use std::borrow::Cow;

/// Derive a stable, flat filename from a remote photo URL.
///
/// The query string is stripped, percent-encoding is decoded, the photo id
/// directory and the basename are joined with `_`, and "square" thumbnail
/// names are upgraded to their "large" variants. The same URL always yields
/// the same filename, which is what makes photo attachment idempotent.
#[must_use]
pub fn derive_photo_filename(url: &str) -> String {
    let without_query = url.split('?').next().unwrap_or(url);
    let decoded: Cow<'_, str> = urlencoding::decode(without_query)
        .unwrap_or_else(|_| Cow::Borrowed(without_query));

    let mut segments = decoded.rsplit('/');
    let basename = segments.next().unwrap_or(&decoded);
    let upgraded = basename.replace("square", "large");

    match segments.next() {
        Some(parent) if !parent.is_empty() && !parent.ends_with(':') => {
            format!("{parent}_{upgraded}")
        }
        _ => upgraded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_query_and_upgrades_square() {
        assert_eq!(
            derive_photo_filename("https://static.inaturalist.org/photos/1234/square.jpg?1560"),
            "1234_large.jpg"
        );
    }

    #[test]
    fn test_decodes_percent_encoding() {
        assert_eq!(
            derive_photo_filename("https://example.org/photos%2F5678%2Fsquare.jpg?x=1"),
            "5678_large.jpg"
        );
    }

    #[test]
    fn test_non_thumbnail_name_is_kept() {
        assert_eq!(
            derive_photo_filename("https://static.inaturalist.org/photos/1234/original.jpeg"),
            "1234_original.jpeg"
        );
    }

    #[test]
    fn test_same_url_yields_same_filename() {
        let url = "https://static.inaturalist.org/photos/42/square.jpg?9999";
        assert_eq!(derive_photo_filename(url), derive_photo_filename(url));
    }

    #[test]
    fn test_distinct_photos_yield_distinct_filenames() {
        let first = derive_photo_filename("https://static.inaturalist.org/photos/1/square.jpg");
        let second = derive_photo_filename("https://static.inaturalist.org/photos/2/square.jpg");
        assert_ne!(first, second);
    }
}
