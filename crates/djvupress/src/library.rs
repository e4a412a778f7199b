use std::path::{Path, PathBuf};

use log::info;

/// Thin filesystem stand-in for a host application's library database:
/// documents are the convertible files under a root directory, enumerated in
/// sorted order so numeric ids stay stable between runs.
pub struct Library {
    root: PathBuf,
}

const CONVERTIBLE_EXTENSIONS: &[&str] = &["pdf", "ps", "eps"];

impl Library {
    #[must_use]
    pub fn open(root: PathBuf) -> Self {
        Self { root }
    }

    /// All convertible documents under the root, sorted by path.
    ///
    /// # Errors
    /// Returns an error when the root directory cannot be read.
    pub fn documents(&self) -> Result<Vec<PathBuf>, std::io::Error> {
        let mut documents = Vec::new();
        collect_documents(&self.root, &mut documents)?;
        documents.sort();
        Ok(documents)
    }

    /// Document with 1-based id `id` in the sorted enumeration.
    ///
    /// # Errors
    /// Returns an error for an out-of-range id or an unreadable root.
    pub fn document_by_id(&self, id: usize) -> Result<PathBuf, std::io::Error> {
        let documents = self.documents()?;
        if id == 0 || id > documents.len() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no document with id {id} (library holds {})", documents.len()),
            ));
        }
        Ok(documents[id - 1].clone())
    }
}

fn collect_documents(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), std::io::Error> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_documents(&path, out)?;
        } else if path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                CONVERTIBLE_EXTENSIONS
                    .iter()
                    .any(|known| known.eq_ignore_ascii_case(ext))
            })
        {
            out.push(path);
        }
    }
    Ok(())
}

/// Whether a DJVU rendition of `source` already exists alongside it.
#[must_use]
pub fn has_djvu_sibling(source: &Path) -> bool {
    source.with_extension("djvu").exists()
}

/// Promote a finished scratch output to its final place next to the source
/// document. Rename first; fall back to copy+remove when the scratch
/// directory is on another filesystem.
///
/// # Errors
/// Returns an error when neither rename nor copy succeeds.
pub fn promote_output(scratch: &Path, source: &Path) -> Result<PathBuf, std::io::Error> {
    let destination = source.with_extension("djvu");

    if std::fs::rename(scratch, &destination).is_err() {
        std::fs::copy(scratch, &destination)?;
        std::fs::remove_file(scratch)?;
    }

    info!("added {}", destination.display());
    Ok(destination)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{Library, has_djvu_sibling, promote_output};

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().expect("path should have a parent"))
            .expect("parent directory should be created");
        std::fs::write(path, b"stub").expect("fixture file should be written");
    }

    #[test]
    fn documents_are_sorted_and_filtered_recursively() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        touch(&dir.path().join("b.pdf"));
        touch(&dir.path().join("a.PS"));
        touch(&dir.path().join("notes.txt"));
        touch(&dir.path().join("nested/c.pdf"));

        let library = Library::open(dir.path().to_path_buf());
        let documents = library.documents().expect("library should enumerate");

        let names: Vec<String> = documents
            .iter()
            .map(|p| {
                p.strip_prefix(dir.path())
                    .expect("document should live under the root")
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        assert_eq!(names, ["a.PS", "b.pdf", "nested/c.pdf"]);
    }

    #[test]
    fn document_ids_are_one_based_and_bounded() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        touch(&dir.path().join("a.pdf"));
        touch(&dir.path().join("b.pdf"));

        let library = Library::open(dir.path().to_path_buf());

        assert!(
            library
                .document_by_id(1)
                .expect("id 1 should resolve")
                .ends_with("a.pdf")
        );
        assert!(library.document_by_id(0).is_err());
        assert!(library.document_by_id(3).is_err());
    }

    #[test]
    fn djvu_sibling_detection() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let source = dir.path().join("book.pdf");
        touch(&source);

        assert!(!has_djvu_sibling(&source));
        touch(&dir.path().join("book.djvu"));
        assert!(has_djvu_sibling(&source));
    }

    #[test]
    fn promote_moves_scratch_output_next_to_source() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let source = dir.path().join("library/book.pdf");
        touch(&source);
        let scratch = dir.path().join("scratch/book-x1.djvu");
        touch(&scratch);

        let destination =
            promote_output(&scratch, &source).expect("promotion should succeed");

        assert_eq!(destination, dir.path().join("library/book.djvu"));
        assert!(destination.exists());
        assert!(!scratch.exists());
    }
}
