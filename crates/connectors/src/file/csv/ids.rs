use crate::file::csv::error::FileError;
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use model::core::identifiers::ItemId;
use std::path::Path;
use tracing::info;

/// An input conference row that survived the keyword filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConferenceRow {
    pub id: ItemId,
    pub keywords: String,
}

fn open_reader(path: &Path) -> Result<csv::Reader<std::fs::File>, FileError> {
    if !path.exists() {
        return Err(FileError::NotFound(path.display().to_string()));
    }
    Ok(ReaderBuilder::new().flexible(true).from_path(path)?)
}

fn column_index(headers: &StringRecord, path: &Path, column: &str) -> Result<usize, FileError> {
    headers
        .iter()
        .position(|h| h.trim_start_matches('\u{feff}').trim().eq_ignore_ascii_case(column))
        .ok_or_else(|| FileError::MissingColumn {
            path: path.display().to_string(),
            column: column.to_string(),
        })
}

/// Reads conference ids, keeping only rows with a non-blank keyword cell.
pub fn load_conference_rows(
    path: &Path,
    id_column: &str,
    keyword_column: &str,
) -> Result<Vec<ConferenceRow>, FileError> {
    let mut reader = open_reader(path)?;
    let headers = reader.headers()?.clone();
    let id_idx = column_index(&headers, path, id_column)?;
    let kw_idx = column_index(&headers, path, keyword_column)?;

    let mut rows = Vec::new();
    let mut total = 0usize;
    for record in reader.records() {
        let record = record?;
        total += 1;
        let id = record.get(id_idx).unwrap_or_default().trim();
        let keywords = record.get(kw_idx).unwrap_or_default().trim();
        if id.is_empty() || keywords.is_empty() {
            continue;
        }
        rows.push(ConferenceRow {
            id: ItemId::from(id),
            keywords: keywords.to_string(),
        });
    }

    info!(
        path = %path.display(),
        total,
        kept = rows.len(),
        "Loaded conference ids"
    );
    Ok(rows)
}

/// Writes the `id,keywords` export of the kept rows.
pub fn write_filtered_ids(path: &Path, rows: &[ConferenceRow]) -> Result<(), FileError> {
    let mut writer = WriterBuilder::new().from_path(path)?;
    writer.write_record(["id", "keywords"])?;
    for row in rows {
        writer.write_record([row.id.as_str(), row.keywords.as_str()])?;
    }
    writer.flush()?;
    Ok(())
}

/// One entry per data row of `column`; blank cells stay blank so positions match row numbers.
pub fn load_url_column(path: &Path, column: &str) -> Result<Vec<ItemId>, FileError> {
    let mut reader = open_reader(path)?;
    let headers = reader.headers()?.clone();
    let idx = column_index(&headers, path, column)?;

    let mut urls = Vec::new();
    for record in reader.records() {
        let record = record?;
        urls.push(ItemId::from(record.get(idx).unwrap_or_default().trim()));
    }
    Ok(urls)
}

/// Ids to skip entirely, e.g. from an earlier failed-items report.
///
/// Uses the `id`, `conference_id` or `url` column when present, the first column otherwise.
pub fn load_exclusions(path: &Path) -> Result<Vec<ItemId>, FileError> {
    let mut reader = open_reader(path)?;
    let headers = reader.headers()?.clone();
    let idx = ["id", "conference_id", "url"]
        .iter()
        .find_map(|name| column_index(&headers, path, name).ok())
        .unwrap_or(0);

    let mut ids = Vec::new();
    for record in reader.records() {
        let record = record?;
        let id = record.get(idx).unwrap_or_default().trim();
        if !id.is_empty() {
            ids.push(ItemId::from(id));
        }
    }
    info!(path = %path.display(), count = ids.len(), "Loaded exclusions");
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn keeps_rows_with_keywords_and_exports_them() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("conferences.csv");
        fs::write(
            &input,
            "\u{feff}id,title,keywords\n11,A,\"bridge, steel\"\n12,B,\n13,C,   \n14,D,concrete\n",
        )
        .unwrap();

        let rows = load_conference_rows(&input, "id", "keywords").unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["11", "14"]);

        let filtered = dir.path().join("filtered.csv");
        write_filtered_ids(&filtered, &rows).unwrap();
        assert_eq!(
            fs::read_to_string(&filtered).unwrap(),
            "id,keywords\n11,\"bridge, steel\"\n14,concrete\n"
        );
    }

    #[test]
    fn missing_column_is_reported() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("sites.csv");
        fs::write(&input, "name,homepage\nx,https://x.test\n").unwrap();

        let err = load_url_column(&input, "website").unwrap_err();
        assert!(matches!(err, FileError::MissingColumn { ref column, .. } if column == "website"));
        assert!(matches!(
            load_url_column(&dir.path().join("nope.csv"), "website"),
            Err(FileError::NotFound(_))
        ));
    }

    #[test]
    fn url_column_keeps_row_positions() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("sites.csv");
        fs::write(&input, "name,website\na,https://a.test\nb,\nc,https://c.test\n").unwrap();

        let urls = load_url_column(&input, "website").unwrap();
        assert_eq!(urls.len(), 3);
        assert!(urls[1].is_blank());
    }

    #[test]
    fn exclusions_read_a_failed_items_report() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("failed.csv");
        fs::write(
            &input,
            "id,failure_kind,message,attempt_count\n10,NotFound,gone,0\n12,Timeout,slow,2\n",
        )
        .unwrap();

        let ids = load_exclusions(&input).unwrap();
        assert_eq!(ids, vec![ItemId::from("10"), ItemId::from("12")]);
    }
}
