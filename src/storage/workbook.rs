use crate::error::StoreError;
use crate::models::Property;
use calamine::{open_workbook, Data, Reader, Xlsx};
use csv::StringRecord;
use std::path::Path;
use tracing::{debug, warn};

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Rows of the first sheet of an `.xlsx` workbook.
///
/// The first row names the columns, with the same aliases the delimited
/// files accept. Blank rows and rows that do not fit a record are skipped.
pub fn read_workbook(path: &Path) -> Result<Vec<Property>, StoreError> {
    let workbook_err = |source: calamine::XlsxError| StoreError::Workbook {
        path: path.to_path_buf(),
        source,
    };
    let mut workbook: Xlsx<_> = open_workbook(path).map_err(workbook_err)?;
    let Some(range) = workbook.worksheet_range_at(0) else {
        return Ok(Vec::new());
    };
    let range = range.map_err(workbook_err)?;

    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Ok(Vec::new());
    };
    let headers: StringRecord = header.iter().map(|c| cell_text(c).trim().to_string()).collect();

    let mut records = Vec::new();
    let mut skipped = 0usize;
    for row in rows {
        let fields: StringRecord = row.iter().map(cell_text).collect();
        if fields.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        match fields.deserialize::<Property>(Some(&headers)) {
            Ok(record) => records.push(record),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Skipping row");
                skipped += 1;
            }
        }
    }

    if skipped > 0 {
        warn!(
            path = %path.display(),
            skipped,
            kept = records.len(),
            "Skipped malformed rows"
        );
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContractType;

    fn fixture(name: &str) -> std::path::PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests/fixtures")
            .join(name)
    }

    #[test]
    fn reads_first_sheet_with_aliased_columns() {
        let records = read_workbook(&fixture("dfimoveis_venda.xlsx")).unwrap();
        assert_eq!(records.len(), 2);

        let house = &records[0];
        assert_eq!(house.description, "Casa no Lago Sul com piscina");
        assert_eq!(house.address, "SHIS QI 9, Lago Sul");
        assert_eq!(house.price, Some(1_500_000.0));
        assert_eq!(house.bedrooms, Some(4));
        assert_eq!(house.contract_type, ContractType::Venda);
        assert_eq!(house.link.as_deref(), Some("https://www.dfimoveis.com.br/imovel/1"));

        let flat = &records[1];
        assert_eq!(flat.description, "Kitnet na Asa Norte");
        assert_eq!(flat.price, None);
        assert_eq!(flat.bedrooms, Some(1));
    }

    #[test]
    fn missing_workbook_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            read_workbook(&dir.path().join("nope.xlsx")),
            Err(StoreError::Workbook { .. })
        ));
    }
}
