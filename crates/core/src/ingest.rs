use crate::embeddings::Embedder;
use crate::error::IndexError;
use crate::index::{build_index, Index};
use crate::models::{Document, IndexOptions};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

/// Lists the `.html`/`.htm` files directly inside `folder`, sorted by path.
pub fn discover_html_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .max_depth(1)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_html = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("html") || ext.eq_ignore_ascii_case("htm"));

        if is_html {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn load_documents_from_dir(folder: &Path) -> Result<Vec<Document>, IndexError> {
    let files = discover_html_files(folder);
    if files.is_empty() {
        return Err(IndexError::Build(format!(
            "no .html files found in {}",
            folder.display()
        )));
    }

    let mut documents = Vec::with_capacity(files.len());
    for path in files {
        let bytes = std::fs::read(&path)?;
        let source_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        let raw_text = String::from_utf8_lossy(&bytes).to_string();
        if raw_text.contains('\u{fffd}') {
            warn!(source = %source_name, "document is not valid UTF-8, decoded lossily");
        }
        documents.push(Document::new(source_name, raw_text));
    }

    info!(folder = %folder.display(), documents = documents.len(), "loaded documents");
    Ok(documents)
}

pub async fn build_index_from_dir<E>(
    folder: &Path,
    embedder: &E,
    options: &IndexOptions,
) -> Result<Index, IndexError>
where
    E: Embedder + ?Sized,
{
    let documents = load_documents_from_dir(folder)?;
    build_index(documents, embedder, options).await
}

#[cfg(test)]
mod tests {
    use super::{build_index_from_dir, discover_html_files, load_documents_from_dir};
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::error::IndexError;
    use crate::models::IndexOptions;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn discovery_is_flat_and_sorted() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let base = dir.path();
        let nested = base.join("nested");
        fs::create_dir(&nested)?;

        fs::write(base.join("b.html"), "<p>b</p>")?;
        fs::write(base.join("a.HTM"), "<p>a</p>")?;
        fs::write(base.join("notes.txt"), "skip")?;
        fs::write(nested.join("c.html"), "<p>c</p>")?;

        let files = discover_html_files(base);
        let names: Vec<_> = files
            .iter()
            .filter_map(|path| path.file_name().and_then(|name| name.to_str()))
            .collect();
        assert_eq!(names, vec!["a.HTM", "b.html"]);
        Ok(())
    }

    #[test]
    fn loading_fails_without_html() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("readme.md"), "# nothing")?;
        let result = load_documents_from_dir(dir.path());
        assert!(matches!(result, Err(IndexError::Build(_))));
        Ok(())
    }

    #[test]
    fn invalid_utf8_is_decoded_lossily() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("odd.html"), b"<p>caf\xe9</p>")?;
        let documents = load_documents_from_dir(dir.path())?;
        assert_eq!(documents[0].source_name, "odd.html");
        assert!(documents[0].raw_text.starts_with("<p>caf"));
        Ok(())
    }

    #[tokio::test]
    async fn folder_builds_into_an_index() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("one.html"), "<p>Physiotherapy sessions</p>")?;
        fs::write(dir.path().join("two.html"), "<p>Optometry services</p>")?;

        let embedder = CharacterNgramEmbedder::default();
        let index = build_index_from_dir(dir.path(), &embedder, &IndexOptions::default()).await?;
        assert_eq!(index.len(), 2);
        assert_eq!(index.metas()[1].source, "two.html");
        Ok(())
    }
}
