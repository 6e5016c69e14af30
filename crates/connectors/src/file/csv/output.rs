use crate::file::csv::error::FileError;
use csv::WriterBuilder;
use engine_core::{
    connectors::output::{OutputPosition, OutputSink},
    error::OutputError,
};
use model::{
    execution::failed_item::{FAILED_ITEM_HEADER, FailedItem},
    records::{record::Record, schema::Schema},
};
use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// One append-only CSV file. A new or emptied file gets a BOM and the header
/// before its first rows.
struct CsvFile {
    path: PathBuf,
    file: File,
    header: Vec<String>,
}

impl CsvFile {
    fn open(path: &Path, header: Vec<String>) -> Result<Self, FileError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            header,
        })
    }

    fn io_err(&self, source: std::io::Error) -> OutputError {
        OutputError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    fn len(&self) -> Result<u64, OutputError> {
        self.file
            .metadata()
            .map(|m| m.len())
            .map_err(|e| self.io_err(e))
    }

    /// CSV bytes for `rows`, prefixed with BOM and header when `fresh`.
    fn encode<I, R>(&self, rows: I, fresh: bool) -> Result<Vec<u8>, OutputError>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator,
        R::Item: AsRef<[u8]>,
    {
        let mut buf = Vec::new();
        if fresh {
            buf.extend_from_slice(UTF8_BOM);
        }
        {
            let mut writer = WriterBuilder::new().flexible(true).from_writer(&mut buf);
            let encode = |e: csv::Error| OutputError::Encode {
                path: self.path.display().to_string(),
                message: e.to_string(),
            };
            if fresh {
                writer.write_record(&self.header).map_err(encode)?;
            }
            for row in rows {
                writer.write_record(row).map_err(encode)?;
            }
            writer.flush().map_err(|e| self.io_err(e))?;
        }
        Ok(buf)
    }

    fn append<I, R>(&mut self, rows: I) -> Result<u64, OutputError>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator,
        R::Item: AsRef<[u8]>,
    {
        let buf = self.encode(rows, self.len()? == 0)?;
        self.file.write_all(&buf).map_err(|e| self.io_err(e))?;
        self.file.sync_all().map_err(|e| self.io_err(e))?;
        self.len()
    }

    /// Swaps the file for one holding exactly `rows` (write, sync, rename).
    /// No rows leaves an empty file.
    fn replace<I, R>(&mut self, rows: I) -> Result<u64, OutputError>
    where
        I: ExactSizeIterator<Item = R>,
        R: IntoIterator,
        R::Item: AsRef<[u8]>,
    {
        let buf = if rows.len() == 0 {
            Vec::new()
        } else {
            self.encode(rows, true)?
        };

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);
        {
            let mut file = File::create(&tmp).map_err(|e| self.io_err(e))?;
            file.write_all(&buf).map_err(|e| self.io_err(e))?;
            file.sync_all().map_err(|e| self.io_err(e))?;
        }
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_err(e))?;

        self.file = OpenOptions::new()
            .read(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_err(e))?;
        self.len()
    }

    fn truncate(&mut self, position: u64) -> Result<(), OutputError> {
        let actual = self.len()?;
        if actual < position {
            return Err(OutputError::Truncated {
                path: self.path.display().to_string(),
                expected: position,
                actual,
            });
        }
        if actual > position {
            info!(
                path = %self.path.display(),
                from = actual,
                to = position,
                "Discarding uncommitted output"
            );
            self.file.set_len(position).map_err(|e| self.io_err(e))?;
            self.file.sync_all().map_err(|e| self.io_err(e))?;
        }
        Ok(())
    }
}

/// Success and failure CSV files. Positions are byte lengths of the two files.
pub struct CsvOutputSink {
    schema: Schema,
    records: CsvFile,
    failures: CsvFile,
}

impl CsvOutputSink {
    pub fn open(records: &Path, failures: &Path, schema: Schema) -> Result<Self, FileError> {
        let records = CsvFile::open(records, schema.header())?;
        let failures = CsvFile::open(
            failures,
            FAILED_ITEM_HEADER.iter().map(|s| s.to_string()).collect(),
        )?;
        Ok(Self {
            schema,
            records,
            failures,
        })
    }
}

impl OutputSink for CsvOutputSink {
    fn commit(
        &mut self,
        records: &[Record],
        failures: &[FailedItem],
    ) -> Result<OutputPosition, OutputError> {
        let schema = &self.schema;
        let records_len = self
            .records
            .append(records.iter().map(|r| r.to_row(schema)))?;
        let failures_len = self.failures.replace(failures.iter().map(FailedItem::to_row))?;

        debug!(
            records = records.len(),
            failures = failures.len(),
            records_bytes = records_len,
            failures_bytes = failures_len,
            "Committed CSV rows"
        );
        Ok(OutputPosition {
            records: records_len,
            failures: failures_len,
        })
    }

    fn rollback(
        &mut self,
        position: &OutputPosition,
        failures: &[FailedItem],
    ) -> Result<(), OutputError> {
        self.records.truncate(position.records)?;
        self.failures
            .replace(failures.iter().map(FailedItem::to_row))
            .map(|_| ())
    }

    fn position(&self) -> Result<OutputPosition, OutputError> {
        Ok(OutputPosition {
            records: self.records.len()?,
            failures: self.failures.len()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::{core::identifiers::ItemId, execution::fetch_result::FailureKind};
    use std::fs;
    use tempfile::tempdir;

    fn schema() -> Schema {
        Schema::new("url").required("final_url")
    }

    fn record(url: &str, final_url: &str) -> Record {
        Record::new(ItemId::from(url)).with("final_url", final_url)
    }

    #[test]
    fn writes_bom_and_header_once() {
        let dir = tempdir().unwrap();
        let ok = dir.path().join("out.csv");
        let failed = dir.path().join("failed.csv");
        let mut sink = CsvOutputSink::open(&ok, &failed, schema()).unwrap();

        sink.commit(&[record("a", "https://a.test/")], &[]).unwrap();
        let pos = sink
            .commit(
                &[record("b", "https://b.test/")],
                &[FailedItem::new(ItemId::from("c"), FailureKind::Timeout, "slow")],
            )
            .unwrap();

        let bytes = fs::read(&ok).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));
        let text = String::from_utf8(bytes[3..].to_vec()).unwrap();
        assert_eq!(text, "url,final_url\na,https://a.test/\nb,https://b.test/\n");
        assert_eq!(pos.records, fs::metadata(&ok).unwrap().len());

        let failed_text = fs::read_to_string(&failed).unwrap();
        assert!(failed_text.ends_with("id,failure_kind,message,attempt_count\nc,Timeout,slow,0\n"));
    }

    #[test]
    fn rollback_discards_the_uncommitted_tail() {
        let dir = tempdir().unwrap();
        let ok = dir.path().join("out.csv");
        let failed = dir.path().join("failed.csv");

        let committed = {
            let mut sink = CsvOutputSink::open(&ok, &failed, schema()).unwrap();
            let pos = sink.commit(&[record("a", "x")], &[]).unwrap();
            sink.commit(&[record("b", "y")], &[]).unwrap();
            pos
        };

        let mut sink = CsvOutputSink::open(&ok, &failed, schema()).unwrap();
        sink.rollback(&committed, &[]).unwrap();
        assert_eq!(sink.position().unwrap(), committed);

        let text = fs::read_to_string(&ok).unwrap();
        assert!(text.ends_with("url,final_url\na,x\n"));
    }

    #[test]
    fn rollback_to_zero_starts_over() {
        let dir = tempdir().unwrap();
        let ok = dir.path().join("out.csv");
        let failed = dir.path().join("failed.csv");
        fs::write(&ok, "stale,rows\n").unwrap();

        let mut sink = CsvOutputSink::open(&ok, &failed, schema()).unwrap();
        sink.rollback(&OutputPosition::default(), &[]).unwrap();
        sink.commit(&[record("a", "x")], &[]).unwrap();

        let text = fs::read_to_string(&ok).unwrap();
        assert_eq!(text.trim_start_matches('\u{feff}'), "url,final_url\na,x\n");
    }

    #[test]
    fn failure_report_holds_only_the_latest_set() {
        let dir = tempdir().unwrap();
        let ok = dir.path().join("out.csv");
        let failed = dir.path().join("failed.csv");
        let mut sink = CsvOutputSink::open(&ok, &failed, schema()).unwrap();

        sink.commit(
            &[],
            &[
                FailedItem::new(ItemId::from("a"), FailureKind::Timeout, "slow"),
                FailedItem::new(ItemId::from("b"), FailureKind::NotFound, "gone"),
            ],
        )
        .unwrap();
        let pos = sink
            .commit(
                &[record("a", "x")],
                &[FailedItem::new(ItemId::from("b"), FailureKind::NotFound, "gone")],
            )
            .unwrap();

        let text = fs::read_to_string(&failed).unwrap();
        assert_eq!(
            text.trim_start_matches('\u{feff}'),
            "id,failure_kind,message,attempt_count\nb,NotFound,gone,0\n"
        );
        assert_eq!(pos.failures, fs::metadata(&failed).unwrap().len());

        sink.rollback(&pos, &[]).unwrap();
        assert_eq!(fs::metadata(&failed).unwrap().len(), 0);
        assert!(!dir.path().join("failed.csv.tmp").exists());
    }

    #[test]
    fn shorter_file_than_committed_is_an_error() {
        let dir = tempdir().unwrap();
        let mut sink = CsvOutputSink::open(
            &dir.path().join("out.csv"),
            &dir.path().join("failed.csv"),
            schema(),
        )
        .unwrap();

        let err = sink
            .rollback(
                &OutputPosition {
                    records: 100,
                    failures: 0,
                },
                &[],
            )
            .unwrap_err();
        assert!(matches!(err, OutputError::Truncated { expected: 100, actual: 0, .. }));
    }
}
