use std::path::{Path, PathBuf};
use tokio::fs;

use super::DocumentError;

/// Page index used for sources without pagination (plain text).
pub const NO_PAGE: i64 = -1;

#[derive(Debug, Clone)]
pub struct Page {
    pub index: i64,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub source: String,
    pub pages: Vec<Page>,
}

pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default()
}

pub async fn load(path: &Path) -> Result<LoadedDocument, DocumentError> {
    let source = path.display().to_string();
    let pages = match extension_of(path).as_str() {
        "pdf" => load_pdf(path).await?,
        "txt" => {
            let text = fs::read_to_string(path).await.map_err(|e| DocumentError::Io {
                path: source.clone(),
                source: e,
            })?;
            vec![Page { index: NO_PAGE, text }]
        }
        other => return Err(DocumentError::Unsupported(other.to_string())),
    };

    Ok(LoadedDocument { source, pages })
}

async fn load_pdf(path: &Path) -> Result<Vec<Page>, DocumentError> {
    let bytes = fs::read(path).await.map_err(|e| DocumentError::Io {
        path: path.display().to_string(),
        source: e,
    })?;

    let texts = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem_by_pages(&bytes))
        .await
        .map_err(|e| DocumentError::Extraction(format!("Task join error: {}", e)))?
        .map_err(|e| DocumentError::Extraction(format!("PDF extraction error: {}", e)))?;

    Ok(texts
        .into_iter()
        .enumerate()
        .map(|(i, text)| Page {
            index: i as i64,
            text,
        })
        .collect())
}

/// Lists the files directly under `dir` whose extension is in `allowed`,
/// sorted by file name.
pub async fn discover(dir: &Path, allowed: &[String]) -> Result<Vec<PathBuf>, DocumentError> {
    let mut entries = fs::read_dir(dir).await.map_err(|e| DocumentError::Io {
        path: dir.display().to_string(),
        source: e,
    })?;

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| DocumentError::Io {
        path: dir.display().to_string(),
        source: e,
    })? {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let extension = extension_of(&path);
        if allowed.iter().any(|a| a.eq_ignore_ascii_case(&extension)) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_text_file_is_a_single_unpaged_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.txt");
        std::fs::write(&path, "Exams start in June.").unwrap();

        let doc = load(&path).await.unwrap();
        assert_eq!(doc.pages.len(), 1);
        assert_eq!(doc.pages[0].index, NO_PAGE);
        assert_eq!(doc.pages[0].text, "Exams start in June.");
        assert!(doc.source.ends_with("rules.txt"));
    }

    #[tokio::test]
    async fn test_unsupported_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slides.pptx");
        std::fs::write(&path, "x").unwrap();

        let err = load(&path).await.unwrap_err();
        assert!(matches!(err, DocumentError::Unsupported(ext) if ext == "pptx"));
    }

    #[tokio::test]
    async fn test_missing_file_is_an_io_error() {
        let err = load(Path::new("/definitely/not/here.txt")).await.unwrap_err();
        assert!(matches!(err, DocumentError::Io { .. }));
    }

    #[tokio::test]
    async fn test_discover_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.txt", "a.PDF", "notes.md", "c.pdf"] {
            std::fs::write(dir.path().join(name), "x").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.pdf")).unwrap();

        let allowed = vec!["pdf".to_string(), "txt".to_string()];
        let files = discover(dir.path(), &allowed).await.unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.PDF", "b.txt", "c.pdf"]);
    }
}
