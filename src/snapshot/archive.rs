//! Raw event archive.
//!
//! When enabled, every event set a snapshot is built from is also written
//! to parquet under `{output_dir}/raw/{snapshot_key}/`, so a document can be
//! audited against the logs it was derived from. Sets are collected while the
//! snapshot is assembled and only written once its document is complete.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{ArrayRef, FixedSizeBinaryBuilder, StringArray, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use serde_json::{Map, Value};

use crate::paginator::ResolvedWindow;
use crate::types::abi::to_json;
use crate::types::event::EventRecord;

use super::error::SnapshotError;

fn archive_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("block_number", DataType::UInt64, false),
        Field::new("block_timestamp", DataType::UInt64, true),
        Field::new("transaction_hash", DataType::FixedSizeBinary(32), false),
        Field::new("log_index", DataType::UInt64, false),
        Field::new("address", DataType::FixedSizeBinary(20), false),
        Field::new("args_json", DataType::Utf8, false),
    ]))
}

/// `{event}_{start}-{end}.parquet`, with `latest` as the end of a live window.
pub fn archive_file_name(event: &str, window: &ResolvedWindow) -> String {
    let end = if window.live_tail {
        "latest".to_string()
    } else {
        window.range.end.saturating_sub(1).to_string()
    };
    format!("{}_{}-{}.parquet", event, window.range.start, end)
}

/// One event set collected while a snapshot was assembled.
#[derive(Debug, Clone)]
pub struct ArchivedEvents {
    pub event: String,
    pub records: Vec<EventRecord>,
}

fn event_batch(records: &[EventRecord]) -> Result<RecordBatch, SnapshotError> {
    let mut arrays: Vec<ArrayRef> = Vec::new();

    let arr: UInt64Array = records.iter().map(|r| Some(r.block_number)).collect();
    arrays.push(Arc::new(arr));

    let arr: UInt64Array = records.iter().map(|r| r.timestamp).collect();
    arrays.push(Arc::new(arr));

    let mut tx_hashes = FixedSizeBinaryBuilder::with_capacity(records.len(), 32);
    for record in records {
        tx_hashes.append_value(record.transaction_hash.as_slice())?;
    }
    arrays.push(Arc::new(tx_hashes.finish()));

    let arr: UInt64Array = records.iter().map(|r| Some(r.log_index)).collect();
    arrays.push(Arc::new(arr));

    let mut addresses = FixedSizeBinaryBuilder::with_capacity(records.len(), 20);
    for record in records {
        addresses.append_value(record.address.as_slice())?;
    }
    arrays.push(Arc::new(addresses.finish()));

    let args: Vec<String> = records
        .iter()
        .map(|r| {
            let map: Map<String, Value> = r
                .args
                .iter()
                .map(|(name, value)| (name.clone(), to_json(value)))
                .collect();
            serde_json::to_string(&map)
        })
        .collect::<Result<_, _>>()?;
    arrays.push(Arc::new(StringArray::from(args)));

    Ok(RecordBatch::try_new(archive_schema(), arrays)?)
}

fn write_parquet(path: &Path, batch: &RecordBatch) -> Result<(), SnapshotError> {
    let file = File::create(path)?;
    let props = WriterProperties::builder()
        .set_compression(parquet::basic::Compression::SNAPPY)
        .build();

    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(batch)?;
    writer.close()?;
    Ok(())
}

fn discard(staged: &[(PathBuf, PathBuf)]) {
    for (tmp_path, _) in staged {
        let _ = fs::remove_file(tmp_path);
    }
}

/// Writes every set to `{output_dir}/raw/{snapshot_key}/`. Each file is first
/// encoded to a temporary sibling; nothing is renamed into place until every
/// set has been encoded.
pub fn write_archive(
    output_dir: &Path,
    snapshot_key: &str,
    window: &ResolvedWindow,
    sets: &[ArchivedEvents],
) -> Result<Vec<PathBuf>, SnapshotError> {
    if sets.is_empty() {
        return Ok(Vec::new());
    }

    let dir = output_dir.join("raw").join(snapshot_key);
    fs::create_dir_all(&dir)?;

    let mut staged = Vec::with_capacity(sets.len());
    for set in sets {
        let file_name = archive_file_name(&set.event, window);
        let tmp_path = dir.join(format!("{}.tmp", file_name));
        let written = event_batch(&set.records).and_then(|batch| write_parquet(&tmp_path, &batch));
        staged.push((tmp_path, dir.join(file_name)));
        if let Err(e) = written {
            discard(&staged);
            return Err(e);
        }
    }

    for (i, (tmp_path, path)) in staged.iter().enumerate() {
        if let Err(e) = fs::rename(tmp_path, path) {
            discard(&staged[i..]);
            return Err(e.into());
        }
    }

    for (set, (_, path)) in sets.iter().zip(&staged) {
        tracing::debug!(
            "Archived {} {} events to {}",
            set.records.len(),
            set.event,
            path.display()
        );
    }

    Ok(staged.into_iter().map(|(_, path)| path).collect())
}

#[cfg(test)]
mod tests {
    use alloy::primitives::Address;
    use arrow::array::{Array, AsArray};
    use arrow::datatypes::UInt64Type;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    use super::*;
    use crate::paginator::BlockRange;
    use crate::testing::transfer;

    fn window(live_tail: bool) -> ResolvedWindow {
        ResolvedWindow {
            range: BlockRange::new(100, 200).unwrap(),
            page_size: 50,
            live_tail,
        }
    }

    #[test]
    fn test_file_name_uses_inclusive_end() {
        assert_eq!(
            archive_file_name("Transfer", &window(false)),
            "Transfer_100-199.parquet"
        );
        assert_eq!(
            archive_file_name("Transfer", &window(true)),
            "Transfer_100-latest.parquet"
        );
    }

    #[test]
    fn test_written_rows_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let token = Address::repeat_byte(0x11);
        let mut first = transfer(token, Address::ZERO, Address::repeat_byte(0x22), 120, 7);
        first.timestamp = Some(1_600_000_000);
        let second = transfer(token, Address::repeat_byte(0x22), Address::repeat_byte(0x33), 150, 3);

        let sets = [ArchivedEvents {
            event: "Transfer".to_string(),
            records: vec![first, second],
        }];
        let paths = write_archive(dir.path(), "token_v1", &window(false), &sets).unwrap();
        assert_eq!(
            paths,
            vec![dir.path().join("raw/token_v1/Transfer_100-199.parquet")]
        );
        let path = &paths[0];

        let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(path).unwrap())
            .unwrap()
            .build()
            .unwrap();
        let batches: Vec<RecordBatch> = reader.map(|b| b.unwrap()).collect();
        assert_eq!(batches.len(), 1);
        let batch = &batches[0];
        assert_eq!(batch.num_rows(), 2);

        let blocks = batch.column(0).as_primitive::<UInt64Type>();
        assert_eq!(blocks.value(0), 120);
        assert_eq!(blocks.value(1), 150);

        let timestamps = batch.column(1).as_primitive::<UInt64Type>();
        assert_eq!(timestamps.value(0), 1_600_000_000);
        assert!(timestamps.is_null(1));

        let args = batch.column(5).as_string::<i32>();
        let decoded: Value = serde_json::from_str(args.value(1)).unwrap();
        assert_eq!(decoded["value"], "3");
        assert_eq!(
            decoded["to"],
            format!("0x{}", hex::encode(Address::repeat_byte(0x33)))
        );
    }

    #[test]
    fn test_empty_event_set_writes_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let sets = [ArchivedEvents {
            event: "Bid".to_string(),
            records: vec![],
        }];
        let paths = write_archive(dir.path(), "auction_v1", &window(false), &sets).unwrap();
        assert!(paths[0].exists());
    }

    #[test]
    fn test_nothing_collected_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_archive(dir.path(), "bpd_v1", &window(false), &[]).unwrap();
        assert!(paths.is_empty());
        assert!(!dir.path().join("raw").exists());
    }

    #[test]
    fn test_failed_set_leaves_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let token = Address::repeat_byte(0x11);
        let sets = [
            ArchivedEvents {
                event: "Transfer".to_string(),
                records: vec![transfer(token, Address::ZERO, Address::repeat_byte(0x22), 120, 7)],
            },
            ArchivedEvents {
                event: "missing/Approval".to_string(),
                records: vec![],
            },
        ];

        assert!(write_archive(dir.path(), "token_v1", &window(false), &sets).is_err());
        let left: Vec<_> = fs::read_dir(dir.path().join("raw/token_v1"))
            .unwrap()
            .collect();
        assert!(left.is_empty());
    }
}
