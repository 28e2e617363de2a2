use crate::error::StoreError;
use crate::models::Property;
use crate::storage::workbook::read_workbook;
use crate::storage::DelimitedFile;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Subdirectory holding detail-enriched listings; preferred over raw listings
pub const DETAILED_DIR: &str = "detailed_properties";

/// A listing file and the source directory it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub source: String,
    pub path: PathBuf,
}

/// Extensions merged from each source directory
const LISTING_EXTENSIONS: [&str; 2] = ["tsv", "xlsx"];

fn listing_files_in(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| LISTING_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
        })
        .collect();
    files.sort();
    Ok(files)
}

fn is_workbook(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("xlsx"))
}

/// `*.tsv` and `*.xlsx` files of every source directory under `root`, taken
/// from its `detailed_properties/` subdirectory when it has one.
pub fn discover(root: &Path) -> io::Result<Vec<SourceFile>> {
    let mut sources: Vec<PathBuf> = fs::read_dir(root)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    sources.sort();

    let mut found = Vec::new();
    for dir in sources {
        let Some(source) = dir.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        let detailed = dir.join(DETAILED_DIR);
        let search = if detailed.is_dir() { detailed } else { dir };
        let files = listing_files_in(&search)?;
        if !files.is_empty() {
            info!(source, files = files.len(), "Found listing files");
        }
        found.extend(files.into_iter().map(|path| SourceFile {
            source: source.clone(),
            path,
        }));
    }
    Ok(found)
}

#[derive(Debug, Default)]
pub struct MergeReport {
    pub files_read: usize,
    pub files_failed: usize,
    pub rows: usize,
}

/// Read every discovered file, tag rows with their source, and write them to `output`.
pub fn merge(root: &Path, output: &DelimitedFile) -> Result<MergeReport, StoreError> {
    let files = discover(root).map_err(|source| StoreError::Io {
        path: root.to_path_buf(),
        source,
    })?;

    let mut report = MergeReport::default();
    let mut merged: Vec<Property> = Vec::new();
    for file in files {
        let rows = if is_workbook(&file.path) {
            read_workbook(&file.path)
        } else {
            DelimitedFile::new(&file.path).read_all()
        };
        match rows {
            Ok(records) => {
                info!(path = %file.path.display(), rows = records.len(), "Loaded rows");
                merged.extend(records.into_iter().map(|mut r| {
                    r.data_source = Some(file.source.clone());
                    r
                }));
                report.files_read += 1;
            }
            Err(e) => {
                warn!(path = %file.path.display(), error = %e, "Skipping unreadable file");
                report.files_failed += 1;
            }
        }
    }

    report.rows = output.write_all(&merged)?;
    info!(
        rows = report.rows,
        path = %output.path().display(),
        "Saved merged listings"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContractType;

    fn listing(description: &str) -> Property {
        Property {
            description: description.to_string(),
            contract_type: ContractType::Aluguel,
            ..Default::default()
        }
    }

    #[test]
    fn prefers_detailed_files_and_tags_sources() {
        let root = tempfile::tempdir().unwrap();
        let df = root.path().join("dfimoveis");
        DelimitedFile::new(df.join("dfimoveis_aluguel.tsv"))
            .append(&[listing("raw")])
            .unwrap();
        DelimitedFile::new(df.join(DETAILED_DIR).join("dfimoveis_aluguel.tsv"))
            .append(&[listing("detailed")])
            .unwrap();
        DelimitedFile::new(root.path().join("netimoveis/netimoveis_venda.tsv"))
            .append(&[listing("net 1"), listing("net 2")])
            .unwrap();
        fs::write(root.path().join("netimoveis/notes.txt"), "ignored").unwrap();

        let out_dir = tempfile::tempdir().unwrap();
        let output = DelimitedFile::new(out_dir.path().join("merged_properties.tsv"));
        let report = merge(root.path(), &output).unwrap();

        assert_eq!(report.files_read, 2);
        assert_eq!(report.rows, 3);
        let merged = output.read_all().unwrap();
        assert_eq!(merged[0].description, "detailed");
        assert_eq!(merged[0].data_source.as_deref(), Some("dfimoveis"));
        assert_eq!(merged[2].data_source.as_deref(), Some("netimoveis"));
    }

    #[test]
    fn unreadable_files_are_skipped() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("dfimoveis");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("bad.tsv"), b"description\n\xff\xfe\n").unwrap();
        DelimitedFile::new(dir.join("good.tsv"))
            .append(&[listing("ok")])
            .unwrap();

        let out_dir = tempfile::tempdir().unwrap();
        let output = DelimitedFile::new(out_dir.path().join("merged.tsv"));
        let report = merge(root.path(), &output).unwrap();
        assert_eq!(report.files_failed, 1);
        assert_eq!(report.rows, 1);
    }

    #[test]
    fn workbooks_are_merged_with_delimited_files() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("dfimoveis");
        fs::create_dir_all(&dir).unwrap();
        let fixture = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/dfimoveis_venda.xlsx");
        fs::copy(&fixture, dir.join("dfimoveis_venda.xlsx")).unwrap();
        DelimitedFile::new(dir.join("dfimoveis_aluguel.tsv"))
            .append(&[listing("Apartamento no Sudoeste")])
            .unwrap();

        let out_dir = tempfile::tempdir().unwrap();
        let output = DelimitedFile::new(out_dir.path().join("merged.tsv"));
        let report = merge(root.path(), &output).unwrap();

        assert_eq!(report.files_read, 2);
        assert_eq!(report.rows, 3);
        let merged = output.read_all().unwrap();
        let descriptions: Vec<_> = merged.iter().map(|r| r.description.as_str()).collect();
        assert_eq!(
            descriptions,
            vec![
                "Apartamento no Sudoeste",
                "Casa no Lago Sul com piscina",
                "Kitnet na Asa Norte"
            ]
        );
        assert!(merged
            .iter()
            .all(|r| r.data_source.as_deref() == Some("dfimoveis")));
        assert_eq!(merged[1].price, Some(1_500_000.0));
    }
}
