//! Ledger synchronizer
//!
//! Reconciles scanner output against an external tabular store keyed by the
//! derived filename stem. The store's managed columns are overwritten on
//! every sync; any other column a human added is preserved verbatim. The
//! whole sheet is read once per sync and writes go out as one batched
//! update plus one batched append.

pub mod sheets;

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::media::MediaRecord;

pub use sheets::GoogleSheetsStore;

/// Columns the system owns. Anything else in the sheet is custom and is
/// never initialized or altered, only carried through.
pub const MANAGED_HEADERS: &[&str] = &[
    "stem",
    "version",
    "filename",
    "ext",
    "path",
    "size_bytes",
    "codec",
    "width",
    "height",
    "fps",
    "duration_sec",
    "has_audio",
    "created_iso",
    "modified_iso",
];

/// One whole-row range update queued for the batched write
#[derive(Debug, Clone, PartialEq)]
pub struct RangeUpdate {
    /// A1-notation range without the sheet prefix, e.g. `"A5:N5"`
    pub range: String,
    pub values: Vec<Vec<Value>>,
}

/// Tabular ledger collaborator. Rows and columns are 1-based; ranges use
/// the column-letter scheme from [`col_letter`].
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// The header row; empty when the sheet has none yet
    async fn header(&self) -> Result<Vec<String>>;

    /// Overwrite the header row
    async fn write_header(&self, header: &[String]) -> Result<()>;

    /// The whole sheet, header row included, in row order
    async fn all_rows(&self) -> Result<Vec<Vec<Value>>>;

    /// Apply every queued range update in one round trip
    async fn batch_update(&self, updates: &[RangeUpdate]) -> Result<()>;

    /// Append full-width rows below the used range in one round trip
    async fn append_rows(&self, rows: &[Vec<Value>]) -> Result<()>;
}

/// Counts reported by one sync call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub updated: usize,
    pub appended: usize,
}

/// Map 1-based column numbers to letters: 1→A, 26→Z, 27→AA, …
pub fn col_letter(mut n: usize) -> String {
    let mut s = String::new();
    while n > 0 {
        let r = (n - 1) % 26;
        s.insert(0, (b'A' + r as u8) as char);
        n = (n - 1) / 26;
    }
    s
}

/// Reconcile the store's header with the managed set. A missing header is
/// written whole; an existing header gets exactly the missing managed names
/// appended on the right, never reordering what is already there.
async fn ensure_header(store: &dyn LedgerStore) -> Result<Vec<String>> {
    let existing = store.header().await?;
    if existing.is_empty() {
        let header: Vec<String> = MANAGED_HEADERS.iter().map(|h| h.to_string()).collect();
        store.write_header(&header).await?;
        return Ok(header);
    }

    let missing: Vec<String> = MANAGED_HEADERS
        .iter()
        .filter(|h| !existing.iter().any(|e| e == *h))
        .map(|h| h.to_string())
        .collect();
    if missing.is_empty() {
        return Ok(existing);
    }

    debug!(count = missing.len(), "Appending missing managed columns to header");
    let mut header = existing;
    header.extend(missing);
    store.write_header(&header).await?;
    Ok(header)
}

/// Merge scanned records into the store. Existing rows (matched on the
/// `stem` column) have only their managed cells overwritten; unknown stems
/// become appended rows with custom cells left blank. Re-running with an
/// unchanged record set writes identical values, so repeated syncs are safe.
pub async fn sync_records(
    store: &dyn LedgerStore,
    records: &[MediaRecord],
) -> Result<SyncReport> {
    let header = ensure_header(store).await?;
    let num_cols = header.len();

    let col_index: HashMap<&str, usize> = header
        .iter()
        .enumerate()
        .map(|(i, h)| (h.as_str(), i))
        .collect();
    let stem_col = *col_index
        .get("stem")
        .ok_or_else(|| Error::StoreAccess("sheet is missing the 'stem' column after header setup".into()))?;

    // One whole-sheet read per sync; rows with an empty stem are invisible.
    let all_values = store.all_rows().await?;
    let rows: &[Vec<Value>] = if all_values.len() > 1 {
        &all_values[1..]
    } else {
        &[]
    };
    let mut stem_to_rownum: HashMap<String, usize> = HashMap::new();
    for (i, row) in rows.iter().enumerate() {
        let stem = row.get(stem_col).map(cell_to_text).unwrap_or_default();
        let stem = stem.trim();
        if !stem.is_empty() {
            // 2-based row numbers: the header is row 1
            stem_to_rownum.insert(stem.to_string(), i + 2);
        }
    }

    let mut updates: Vec<RangeUpdate> = Vec::new();
    let mut appends: Vec<Vec<Value>> = Vec::new();

    for record in records {
        let managed = managed_values(record);
        let stem = record.key().stem;
        if stem.is_empty() {
            // No usable key; the record joins neither path.
            continue;
        }

        let (rownum, mut row_vec) = match stem_to_rownum.get(&stem) {
            Some(&rownum) => {
                let existing = rows.get(rownum - 2).cloned().unwrap_or_default();
                (Some(rownum), existing)
            }
            None => (None, Vec::new()),
        };

        // Normalize to full sheet width, then overwrite only the managed
        // positions.
        row_vec.resize(num_cols, Value::String(String::new()));
        for (name, value) in &managed {
            if let Some(&i) = col_index.get(name) {
                row_vec[i] = value.clone();
            }
        }

        match rownum {
            Some(rownum) => updates.push(RangeUpdate {
                range: format!("A{rownum}:{}{rownum}", col_letter(num_cols)),
                values: vec![row_vec],
            }),
            None => appends.push(row_vec),
        }
    }

    let report = SyncReport {
        updated: updates.len(),
        appended: appends.len(),
    };

    if !updates.is_empty() {
        store.batch_update(&updates).await?;
    }
    if !appends.is_empty() {
        store.append_rows(&appends).await?;
    }

    info!(updated = report.updated, appended = report.appended, "Ledger sync applied");
    Ok(report)
}

/// Managed cell values for one record. The version is written as a number
/// when present; every other managed field is text, with absent values as
/// empty cells.
fn managed_values(record: &MediaRecord) -> Vec<(&'static str, Value)> {
    let key = record.key();

    vec![
        ("stem", text(key.stem)),
        (
            "version",
            key.version
                .map(|v| Value::Number(v.into()))
                .unwrap_or_else(blank),
        ),
        ("filename", text(&record.name)),
        ("ext", text(&record.ext)),
        ("path", text(&record.path)),
        ("size_bytes", text(record.size_bytes.to_string())),
        ("codec", opt_text(record.attrs.codec.clone())),
        ("width", opt_text(record.attrs.width.map(|v| v.to_string()))),
        ("height", opt_text(record.attrs.height.map(|v| v.to_string()))),
        ("fps", opt_text(record.attrs.frame_rate.map(|v| v.to_string()))),
        (
            "duration_sec",
            opt_text(record.attrs.duration_secs.map(|v| v.to_string())),
        ),
        (
            "has_audio",
            opt_text(record.attrs.has_audio.map(|v| v.to_string())),
        ),
        (
            "created_iso",
            opt_text(record.created_at.map(|t| t.format("%Y-%m-%dT%H:%M:%S").to_string())),
        ),
        (
            "modified_iso",
            opt_text(record.modified_at.map(|t| t.format("%Y-%m-%dT%H:%M:%S").to_string())),
        ),
    ]
}

fn text(value: impl Into<String>) -> Value {
    Value::String(value.into())
}

fn opt_text(value: Option<String>) -> Value {
    value.map(Value::String).unwrap_or_else(blank)
}

fn blank() -> Value {
    Value::String(String::new())
}

/// Render a cell the way a header/key comparison needs it
fn cell_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{MediaAttributes, MediaRecord};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    /// In-memory store mirroring the sheet contract, with write counters
    /// so tests can assert batch application and idempotence.
    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<Vec<Vec<Value>>>,
        update_calls: Mutex<usize>,
        append_calls: Mutex<usize>,
    }

    impl MemoryStore {
        fn seeded(rows: Vec<Vec<Value>>) -> Self {
            Self {
                rows: Mutex::new(rows),
                ..Default::default()
            }
        }

        fn snapshot(&self) -> Vec<Vec<Value>> {
            self.rows.lock().clone()
        }
    }

    #[async_trait]
    impl LedgerStore for MemoryStore {
        async fn header(&self) -> Result<Vec<String>> {
            Ok(self
                .rows
                .lock()
                .first()
                .map(|r| r.iter().map(cell_to_text).collect())
                .unwrap_or_default())
        }

        async fn write_header(&self, header: &[String]) -> Result<()> {
            let mut rows = self.rows.lock();
            let header_row: Vec<Value> = header.iter().map(|h| text(h.clone())).collect();
            if rows.is_empty() {
                rows.push(header_row);
            } else {
                rows[0] = header_row;
            }
            Ok(())
        }

        async fn all_rows(&self) -> Result<Vec<Vec<Value>>> {
            Ok(self.snapshot())
        }

        async fn batch_update(&self, updates: &[RangeUpdate]) -> Result<()> {
            *self.update_calls.lock() += 1;
            let mut rows = self.rows.lock();
            for update in updates {
                let digits: String = update
                    .range
                    .chars()
                    .skip_while(|c| c.is_ascii_alphabetic())
                    .take_while(|c| c.is_ascii_digit())
                    .collect();
                let rownum: usize = digits.parse().expect("range row number");
                while rows.len() < rownum {
                    rows.push(Vec::new());
                }
                rows[rownum - 1] = update.values[0].clone();
            }
            Ok(())
        }

        async fn append_rows(&self, new_rows: &[Vec<Value>]) -> Result<()> {
            *self.append_calls.lock() += 1;
            self.rows.lock().extend(new_rows.iter().cloned());
            Ok(())
        }
    }

    fn record(name: &str) -> MediaRecord {
        MediaRecord {
            path: format!("/repo/{name}"),
            name: name.to_string(),
            ext: ".mov".to_string(),
            size_bytes: 1024,
            created_at: None,
            modified_at: None,
            attrs: MediaAttributes {
                codec: Some("h264".to_string()),
                width: Some(1920),
                height: Some(1080),
                frame_rate: Some(25.0),
                duration_secs: Some(10.0),
                has_audio: Some(true),
            },
        }
    }

    #[test]
    fn test_col_letter() {
        assert_eq!(col_letter(1), "A");
        assert_eq!(col_letter(14), "N");
        assert_eq!(col_letter(26), "Z");
        assert_eq!(col_letter(27), "AA");
        assert_eq!(col_letter(52), "AZ");
        assert_eq!(col_letter(53), "BA");
        assert_eq!(col_letter(702), "ZZ");
        assert_eq!(col_letter(703), "AAA");
    }

    #[tokio::test]
    async fn test_empty_store_gets_managed_header_and_appends() {
        let store = MemoryStore::default();
        let report = sync_records(&store, &[record("Intro_v2.mov"), record("Outro.mov")])
            .await
            .unwrap();

        assert_eq!(report, SyncReport { updated: 0, appended: 2 });

        let rows = store.snapshot();
        let header: Vec<String> = rows[0].iter().map(cell_to_text).collect();
        assert_eq!(header, MANAGED_HEADERS);

        // Version lands as a number, stem has the suffix stripped.
        assert_eq!(rows[1][0], text("Intro"));
        assert_eq!(rows[1][1], Value::Number(2.into()));
        assert_eq!(rows[2][0], text("Outro"));
        assert_eq!(rows[2][1], text(""));
    }

    #[tokio::test]
    async fn test_existing_header_keeps_custom_column_positions() {
        let store = MemoryStore::seeded(vec![vec![text("stem"), text("Review Notes")]]);
        sync_records(&store, &[record("Intro.mov")]).await.unwrap();

        let rows = store.snapshot();
        let header: Vec<String> = rows[0].iter().map(cell_to_text).collect();
        assert_eq!(header[0], "stem");
        assert_eq!(header[1], "Review Notes");
        // Missing managed names appended to the right, in order.
        assert_eq!(&header[2..], &MANAGED_HEADERS[1..]);
    }

    #[tokio::test]
    async fn test_update_preserves_custom_cells() {
        let mut header: Vec<Value> = MANAGED_HEADERS.iter().map(|h| text(*h)).collect();
        header.push(text("Review Notes"));
        let mut existing = vec![text("Intro"); 1];
        existing.resize(MANAGED_HEADERS.len(), text("stale"));
        existing.push(text("keep me"));
        let store = MemoryStore::seeded(vec![header, existing]);

        let report = sync_records(&store, &[record("Intro_v7.mov")]).await.unwrap();
        assert_eq!(report, SyncReport { updated: 1, appended: 0 });

        let rows = store.snapshot();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][0], text("Intro"));
        assert_eq!(rows[1][1], Value::Number(7.into()));
        assert_eq!(rows[1][2], text("Intro_v7.mov"));
        // The custom cell survives byte-for-byte.
        assert_eq!(rows[1][MANAGED_HEADERS.len()], text("keep me"));
    }

    #[tokio::test]
    async fn test_sync_is_idempotent() {
        let store = MemoryStore::default();
        let records = vec![record("Intro_v2.mov"), record("Outro.mov")];

        sync_records(&store, &records).await.unwrap();
        let after_first = store.snapshot();

        let report = sync_records(&store, &records).await.unwrap();
        let after_second = store.snapshot();

        assert_eq!(after_first, after_second);
        // Second run matched every stem: nothing was appended.
        assert_eq!(report.appended, 0);
        assert_eq!(report.updated, 2);
        assert_eq!(*store.append_calls.lock(), 1);
    }

    #[tokio::test]
    async fn test_empty_key_records_are_excluded() {
        let store = MemoryStore::default();
        // Stem "_v1" parses to an empty key.
        let report = sync_records(&store, &[record("_v1.mov")]).await.unwrap();

        assert_eq!(report, SyncReport { updated: 0, appended: 0 });
        assert_eq!(store.snapshot().len(), 1); // header only
        assert_eq!(*store.update_calls.lock(), 0);
        assert_eq!(*store.append_calls.lock(), 0);
    }

    #[tokio::test]
    async fn test_rows_with_blank_keys_are_invisible() {
        let mut header: Vec<Value> = MANAGED_HEADERS.iter().map(|h| text(*h)).collect();
        header.push(text("Review Notes"));
        let mut blank_row = vec![text(""); MANAGED_HEADERS.len()];
        blank_row.push(text("manual row"));
        let store = MemoryStore::seeded(vec![header, blank_row]);

        let report = sync_records(&store, &[record("Intro.mov")]).await.unwrap();

        // The blank-keyed row is not an update target; the record appends.
        assert_eq!(report, SyncReport { updated: 0, appended: 1 });
        let rows = store.snapshot();
        assert_eq!(rows.len(), 3);
        assert_eq!(cell_to_text(&rows[1][MANAGED_HEADERS.len()]), "manual row");
    }
}
