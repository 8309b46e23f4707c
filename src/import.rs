//! Brand library import from registry spreadsheets (xlsx, xls, xlsb, ods).
//!
//! Registry exports do not agree on a layout. Some start with a title block,
//! some have French headers, some have no header at all. The importer:
//!
//! 1. scans the first [`HEADER_SCAN_ROWS`] rows for one with a cell mentioning
//!    `marque`, `brand` or `name`, and uses row 0 when none does;
//! 2. maps each known column by the first header containing one of its
//!    keywords, with the brand name falling back to column 0;
//! 3. reads every later row with a non-blank name, keeping the first row
//!    per normalised name.
//!
//! Deduplication against the existing library is the store's job
//! ([`crate::store::MemoryStore::add_library_brands`]).

use crate::error::ImportError;
use crate::matching::normalize;
use crate::model::LibraryBrand;
use calamine::{open_workbook_auto, Data, Reader};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

/// How many leading rows are searched for the header row.
pub const HEADER_SCAN_ROWS: usize = 20;

const NAME_KEYS: &[&str] = &["marque", "brand", "name"];
const LOGO_KEYS: &[&str] = &["logo"];
const REGISTRATION_KEYS: &[&str] = &["enregistrement", "registration", "num", "d'enregistrement"];
const NICE_KEYS: &[&str] = &["nice", "class", "classification"];
const FILING_KEYS: &[&str] = &["dépôt", "filing", "deposit", "de dépôt", "depot"];
const EXPIRY_KEYS: &[&str] = &["expiration", "expiry", "d'expiration"];
const STATUS_KEYS: &[&str] = &["statut", "status"];

/// Spreadsheet extensions [`read_spreadsheet`] understands.
pub fn is_spreadsheet(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            matches!(
                e.to_ascii_lowercase().as_str(),
                "xlsx" | "xlsm" | "xlsb" | "xls" | "ods"
            )
        })
        .unwrap_or(false)
}

/// Index of the header row, or `None` when no row in the scan window names
/// a brand column.
pub fn find_header_row(rows: &[Vec<String>]) -> Option<usize> {
    rows.iter().take(HEADER_SCAN_ROWS).position(|row| {
        row.iter()
            .map(|cell| normalize(cell))
            .any(|cell| NAME_KEYS.iter().any(|k| cell.contains(k)))
    })
}

/// Column positions resolved from a header row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    pub name: usize,
    pub logo: Option<usize>,
    pub registration_number: Option<usize>,
    pub nice_class: Option<usize>,
    pub filing_date: Option<usize>,
    pub expiry_date: Option<usize>,
    pub status: Option<usize>,
}

impl ColumnMap {
    pub fn from_headers(headers: &[String]) -> Self {
        let headers: Vec<String> = headers.iter().map(|h| normalize(h)).collect();
        let find = |keys: &[&str]| {
            headers
                .iter()
                .position(|h| !h.is_empty() && keys.iter().any(|k| h.contains(k)))
        };
        Self {
            name: find(NAME_KEYS).unwrap_or(0),
            logo: find(LOGO_KEYS),
            registration_number: find(REGISTRATION_KEYS),
            nice_class: find(NICE_KEYS),
            filing_date: find(FILING_KEYS),
            expiry_date: find(EXPIRY_KEYS),
            status: find(STATUS_KEYS),
        }
    }
}

/// Turn raw sheet rows into library entries.
pub fn brands_from_rows(rows: &[Vec<String>]) -> Vec<LibraryBrand> {
    let header_idx = find_header_row(rows).unwrap_or(0);
    let Some(headers) = rows.get(header_idx) else {
        return Vec::new();
    };
    let columns = ColumnMap::from_headers(headers);
    debug!("Header at row {}: {:?}", header_idx, columns);

    let mut seen = HashSet::new();
    let mut brands = Vec::new();
    for row in &rows[header_idx + 1..] {
        let cell = |idx: Option<usize>| {
            idx.and_then(|i| row.get(i))
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let Some(name) = cell(Some(columns.name)) else {
            continue;
        };
        if !seen.insert(normalize(&name)) {
            continue;
        }
        brands.push(LibraryBrand {
            logo_text: cell(columns.logo),
            registration_number: cell(columns.registration_number),
            nice_class: cell(columns.nice_class),
            filing_date: cell(columns.filing_date),
            expiry_date: cell(columns.expiry_date),
            status: cell(columns.status),
            ..LibraryBrand::new(name)
        });
    }
    brands
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        other => other.to_string().trim().to_string(),
    }
}

/// Read the first sheet of a workbook and extract its brands.
///
/// Blocking; call from `spawn_blocking` inside async code.
pub fn read_spreadsheet(path: &Path) -> Result<Vec<LibraryBrand>, ImportError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| ImportError::Open {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ImportError::NoSheet {
            path: path.to_path_buf(),
        })?
        .map_err(|e| ImportError::Open {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;

    let rows: Vec<Vec<String>> = range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect();
    if rows.is_empty() {
        return Err(ImportError::EmptySheet {
            path: path.to_path_buf(),
        });
    }

    let brands = brands_from_rows(&rows);
    info!(
        "Read {} brands from {} ({} rows)",
        brands.len(),
        path.display(),
        rows.len()
    );
    Ok(brands)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(data: &[&[&str]]) -> Vec<Vec<String>> {
        data.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn header_found_below_title_block() {
        let sheet = rows(&[
            &["Registre national 2024"],
            &[""],
            &["N°", "Nom de la Marque", "Classe"],
            &["1", "Zara", "25"],
        ]);
        assert_eq!(find_header_row(&sheet), Some(2));
    }

    #[test]
    fn header_search_stops_after_window() {
        let mut sheet = vec![vec!["x".to_string()]; HEADER_SCAN_ROWS];
        sheet.push(vec!["Brand".to_string()]);
        assert_eq!(find_header_row(&sheet), None);
    }

    #[test]
    fn french_headers_map_every_column() {
        let headers = rows(&[&[
            "Marque",
            "Logo",
            "N° d'enregistrement",
            "Classification de Nice",
            "Date de dépôt",
            "Date d'expiration",
            "Statut",
        ]])
        .remove(0);
        let map = ColumnMap::from_headers(&headers);
        assert_eq!(
            map,
            ColumnMap {
                name: 0,
                logo: Some(1),
                registration_number: Some(2),
                nice_class: Some(3),
                filing_date: Some(4),
                expiry_date: Some(5),
                status: Some(6),
            }
        );
    }

    #[test]
    fn english_headers_in_any_order() {
        let headers = rows(&[&["Status", "Expiry", "Filing date", "Class", "Registration", "Brand"]])
            .remove(0);
        let map = ColumnMap::from_headers(&headers);
        assert_eq!(map.name, 5);
        assert_eq!(map.registration_number, Some(4));
        assert_eq!(map.nice_class, Some(3));
        assert_eq!(map.filing_date, Some(2));
        assert_eq!(map.expiry_date, Some(1));
        assert_eq!(map.status, Some(0));
        assert_eq!(map.logo, None);
    }

    #[test]
    fn name_falls_back_to_first_column() {
        let headers = rows(&[&["Titulaire", "Statut"]]).remove(0);
        let map = ColumnMap::from_headers(&headers);
        assert_eq!(map.name, 0);
        assert_eq!(map.status, Some(1));
    }

    #[test]
    fn rows_after_header_become_brands() {
        let sheet = rows(&[
            &["Export"],
            &["Brand", "Registration", "Status"],
            &["  Nike ", "R-1", "active"],
            &["", "R-2", "active"],
            &["NIKE", "R-3", "expired"],
            &["Adidas", "", ""],
        ]);
        let brands = brands_from_rows(&sheet);
        assert_eq!(brands.len(), 2);

        assert_eq!(brands[0].name, "Nike");
        assert_eq!(brands[0].normalized_name, "nike");
        assert_eq!(brands[0].registration_number.as_deref(), Some("R-1"));
        assert_eq!(brands[0].status.as_deref(), Some("active"));
        assert!(!brands[0].id.is_empty());

        assert_eq!(brands[1].name, "Adidas");
        assert!(brands[1].registration_number.is_none());
    }

    #[test]
    fn headerless_sheet_uses_row_zero_as_header() {
        let sheet = rows(&[&["Puma"], &["Reebok"]]);
        let brands = brands_from_rows(&sheet);
        let names: Vec<&str> = brands.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["Reebok"]);
    }

    #[test]
    fn spreadsheet_extensions() {
        assert!(is_spreadsheet(Path::new("brands.XLSX")));
        assert!(is_spreadsheet(Path::new("a/b.ods")));
        assert!(!is_spreadsheet(Path::new("brands.json")));
        assert!(!is_spreadsheet(Path::new("brands")));
    }

    #[test]
    fn unreadable_workbook_is_an_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.xlsx");
        std::fs::write(&path, b"not a zip").unwrap();
        let err = read_spreadsheet(&path).unwrap_err();
        assert!(matches!(err, ImportError::Open { .. }), "{err}");
    }
}
