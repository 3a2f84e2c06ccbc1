//! Deterministic destination paths for mirrored files

/// Characters allowed verbatim in a stored file name; everything else becomes `_`
fn is_path_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/')
}

pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| if is_path_safe(c) { c } else { '_' })
        .collect()
}

/// `{category}/{year}/{record_id}/{sanitized file name}`
///
/// Same inputs always yield the same path, so a re-processed item overwrites
/// its previous upload instead of leaving an orphan next to it.
pub fn build_storage_path(category: &str, year: i32, record_id: &str, file_name: &str) -> String {
    format!(
        "{}/{}/{}/{}",
        category,
        year,
        record_id,
        sanitize_file_name(file_name)
    )
}

/// File name of an item: last segment of the requested storage path, else of the URL path
pub fn derive_file_name(storage_path: Option<&str>, file_url: &str) -> Option<String> {
    let from_path = storage_path
        .and_then(last_segment)
        .map(str::to_string);

    from_path.or_else(|| {
        let url = reqwest::Url::parse(file_url).ok()?;
        let segments = url.path_segments()?;
        segments
            .filter(|s| !s.is_empty())
            .last()
            .map(str::to_string)
    })
}

fn last_segment(path: &str) -> Option<&str> {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_replaces_unsafe_characters() {
        assert_eq!(sanitize_file_name("Report 2023 (final).pdf"), "Report_2023__final_.pdf");
        assert_eq!(sanitize_file_name("zákon-č.5.html"), "z_kon-_.5.html");
        assert_eq!(sanitize_file_name("plain_name-1.pdf"), "plain_name-1.pdf");
    }

    #[test]
    fn test_storage_path_is_deterministic() {
        let first = build_storage_path("parliament", 2024, "rec-42", "Bill #7.pdf");
        let second = build_storage_path("parliament", 2024, "rec-42", "Bill #7.pdf");

        assert_eq!(first, "parliament/2024/rec-42/Bill__7.pdf");
        assert_eq!(first, second);
    }

    #[test]
    fn test_file_name_prefers_storage_path() {
        assert_eq!(
            derive_file_name(Some("incoming/annex-1.pdf"), "https://gov.example/x/y.pdf"),
            Some("annex-1.pdf".to_string())
        );
        assert_eq!(
            derive_file_name(Some(""), "https://gov.example/docs/decree.html?lang=en"),
            Some("decree.html".to_string())
        );
        assert_eq!(
            derive_file_name(None, "https://gov.example/docs/attachments/"),
            Some("attachments".to_string())
        );
    }

    #[test]
    fn test_file_name_missing() {
        assert_eq!(derive_file_name(None, "https://gov.example/"), None);
        assert_eq!(derive_file_name(Some("/"), "not a url"), None);
    }
}
