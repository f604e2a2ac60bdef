use chrono::Local;
use std::path::Path;
use uuid::Uuid;

const FALLBACK_STEM: &str = "file";
const FALLBACK_EXTENSION: &str = "dat";

/// Turns an uploaded file name into a collision-free name that is safe to
/// write under the documents folder:
/// `<sanitized stem>_<YYYYmmdd_HHMMSS>_<8 hex chars>.<extension>`.
pub fn unique_file_name(original: &str) -> String {
    // Only the final path component counts; uploads may carry client paths.
    let original = original.rsplit(['/', '\\']).next().unwrap_or_default();
    let path = Path::new(original);

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(sanitize)
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| {
            tracing::warn!("Missing file extension in: {:?}", original);
            FALLBACK_EXTENSION.to_string()
        });

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .map(sanitize)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| FALLBACK_STEM.to_string());

    let suffix = format!(
        "{}_{}",
        Local::now().format("%Y%m%d_%H%M%S"),
        &Uuid::new_v4().simple().to_string()[..8]
    );

    let name = format!("{}_{}.{}", stem, suffix, extension);
    tracing::debug!("Original filename: {} | Cleaned: {}", original, name);
    name
}

fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect::<String>()
        .trim_matches('_')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split_name(name: &str) -> (String, String, String, String) {
        let (body, extension) = name.rsplit_once('.').unwrap();
        let parts: Vec<&str> = body.rsplitn(4, '_').collect();
        // rsplitn yields: hex, time, date, stem
        (
            parts[3].to_string(),
            format!("{}_{}", parts[2], parts[1]),
            parts[0].to_string(),
            extension.to_string(),
        )
    }

    #[test]
    fn test_name_keeps_stem_and_extension() {
        let name = unique_file_name("AlRashid.pdf");
        let (stem, timestamp, hex, extension) = split_name(&name);
        assert_eq!(stem, "AlRashid");
        assert_eq!(extension, "pdf");
        assert_eq!(timestamp.len(), "20240101_120000".len());
        assert_eq!(hex.len(), 8);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_non_word_characters_are_replaced() {
        let name = unique_file_name("Student Hand-book (2024).pdf");
        assert!(name.starts_with("Student_Hand_book__2024_"), "{}", name);
        assert!(name.ends_with(".pdf"));
    }

    #[test]
    fn test_missing_extension_defaults_to_dat() {
        assert!(unique_file_name("handbook").ends_with(".dat"));
    }

    #[test]
    fn test_empty_stem_defaults_to_file() {
        assert!(unique_file_name("---.txt").starts_with("file_"));
        assert!(unique_file_name("").starts_with("file_"));
    }

    #[test]
    fn test_client_directories_are_dropped() {
        let name = unique_file_name("../../etc/passwd.txt");
        assert!(name.starts_with("passwd_"));
        assert!(!name.contains('/'));
    }

    #[test]
    fn test_names_are_unique() {
        let first = unique_file_name("rules.pdf");
        let second = unique_file_name("rules.pdf");
        assert_ne!(first, second);
    }
}
