//! Packet-capture derived tables.
//!
//! The capture tool exports one tab-separated row per TCP segment with the
//! fields `time, src, dst, sport, dport, stream, length[, flags]`. Rows are
//! grouped by stream index into per-connection statistics.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use csv::StringRecord;

use super::types::*;

/// Rows read from a set of capture tables
#[derive(Debug, Clone, Default)]
pub struct CaptureTables {
    pub rows: Vec<CaptureRow>,
    pub skipped_rows: usize,
    pub missing: Vec<PathBuf>,
}

fn field_or_zero<T: std::str::FromStr + Default>(field: &str) -> Option<T> {
    let field = field.trim();
    if field.is_empty() {
        Some(T::default())
    } else {
        field.parse().ok()
    }
}

/// Convert one table row; `None` for short rows, unparseable numbers or a
/// time that is negative or not finite
pub fn parse_capture_row(record: &StringRecord) -> Option<CaptureRow> {
    if record.len() < 7 {
        return None;
    }
    let time: f64 = field_or_zero(&record[0])?;
    if !(time.is_finite() && time >= 0.0) {
        return None;
    }
    Some(CaptureRow {
        time,
        source_address: record[1].trim().to_string(),
        dest_address: record[2].trim().to_string(),
        source_port: field_or_zero(&record[3])?,
        dest_port: field_or_zero(&record[4])?,
        stream_id: field_or_zero(&record[5])?,
        length: field_or_zero(&record[6])?,
        flags: record.get(7).unwrap_or("").trim().to_string(),
    })
}

/// Read a tab-separated capture table
pub fn parse_capture_table(path: &Path) -> Result<(Vec<CaptureRow>, usize), SourceError> {
    let file = File::open(path).map_err(|e| SourceError::from_io(path, e))?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_reader(BufReader::new(file));

    let mut rows = Vec::new();
    let mut skipped = 0;
    for result in reader.records() {
        match result.ok().as_ref().and_then(parse_capture_row) {
            Some(row) => rows.push(row),
            None => skipped += 1,
        }
    }

    log::debug!(
        "Read {} capture rows from {} ({} skipped)",
        rows.len(),
        path.display(),
        skipped
    );
    Ok((rows, skipped))
}

/// Read several capture tables; missing ones contribute no rows
pub fn parse_capture_tables<P: AsRef<Path>>(paths: &[P]) -> CaptureTables {
    let mut tables = CaptureTables::default();
    for path in paths {
        let path = path.as_ref();
        match parse_capture_table(path) {
            Ok((rows, skipped)) => {
                tables.rows.extend(rows);
                tables.skipped_rows += skipped;
            }
            Err(SourceError::NotFound { path: missing }) => {
                log::warn!("Capture table not found: {}", missing);
                tables.missing.push(path.to_path_buf());
            }
            Err(e) => log::warn!("{}", e),
        }
    }
    log::info!("Read {} capture rows from {} tables", tables.rows.len(), paths.len());
    tables
}

/// Per-stream statistics ordered by stream id.
///
/// Endpoints are taken from the first row seen for each stream.
pub fn aggregate_streams(rows: &[CaptureRow]) -> Vec<StreamStats> {
    struct Stream<'a> {
        first: &'a CaptureRow,
        packets: u64,
        bytes: u64,
        start: SimTime,
        end: SimTime,
    }

    let mut streams: BTreeMap<u64, Stream> = BTreeMap::new();
    for row in rows {
        let stream = streams.entry(row.stream_id).or_insert(Stream {
            first: row,
            packets: 0,
            bytes: 0,
            start: row.time,
            end: row.time,
        });
        stream.packets += 1;
        stream.bytes += row.length;
        stream.start = stream.start.min(row.time);
        stream.end = stream.end.max(row.time);
    }

    streams
        .into_iter()
        .map(|(stream_id, s)| {
            let duration = s.end - s.start;
            StreamStats {
                stream_id,
                source_address: s.first.source_address.clone(),
                dest_address: s.first.dest_address.clone(),
                source_port: s.first.source_port,
                dest_port: s.first.dest_port,
                packet_count: s.packets,
                total_bytes: s.bytes,
                duration_seconds: duration,
                throughput_mbps: throughput_mbps(s.bytes, duration),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn table(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_parse_rows() {
        let file = table(
            "0.100\t10.0.0.1\t10.0.0.10\t49153\t6000\t0\t60\t0x0002\n\
             0.350\t10.0.0.10\t10.0.0.1\t6000\t49153\t0\t60\n\
             0.400\t10.0.0.1\t10.0.0.10\t49153\t6000\t0\t\t0x0010\n\
             broken\trow\n\
             x\t10.0.0.1\t10.0.0.10\t1\t2\t0\t60\n",
        );
        let (rows, skipped) = parse_capture_table(file.path()).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(skipped, 2);
        assert_eq!(rows[0].flags, "0x0002");
        assert_eq!(rows[1].flags, "");
        assert_eq!(rows[2].length, 0);
    }

    #[test]
    fn test_non_finite_times_are_skipped() {
        let file = table(
            "nan\t10.0.0.1\t10.0.0.10\t1\t2\t0\t60\n\
             inf\t10.0.0.1\t10.0.0.10\t1\t2\t0\t60\n\
             -1.5\t10.0.0.1\t10.0.0.10\t1\t2\t0\t60\n\
             0.5\t10.0.0.1\t10.0.0.10\t1\t2\t0\t60\n",
        );
        let (rows, skipped) = parse_capture_table(file.path()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(skipped, 3);

        let streams = aggregate_streams(&rows);
        assert_eq!(streams[0].duration_seconds, 0.0);
        let json = serde_json::to_string(&streams).unwrap();
        assert!(!json.contains("null"));
    }

    #[test]
    fn test_missing_table() {
        let result = parse_capture_table(Path::new("/nonexistent/tcp_fields.tsv"));
        assert!(matches!(result, Err(SourceError::NotFound { .. })));

        let tables = parse_capture_tables(&["/nonexistent/tcp_fields.tsv"]);
        assert!(tables.rows.is_empty());
        assert_eq!(tables.missing.len(), 1);
    }

    #[test]
    fn test_aggregate_streams() {
        let file = table(
            "1.0\t10.0.0.1\t10.0.0.10\t49153\t6000\t1\t500\n\
             2.0\t10.0.0.10\t10.0.0.1\t6000\t49153\t1\t500\n\
             0.5\t10.0.0.2\t10.0.0.10\t49154\t6000\t0\t100\n",
        );
        let (rows, _) = parse_capture_table(file.path()).unwrap();
        let streams = aggregate_streams(&rows);
        assert_eq!(streams.len(), 2);

        assert_eq!(streams[0].stream_id, 0);
        assert_eq!(streams[0].duration_seconds, 0.0);
        assert_eq!(streams[0].throughput_mbps, 0.0);

        let stream = &streams[1];
        assert_eq!(stream.source_address, "10.0.0.1");
        assert_eq!(stream.packet_count, 2);
        assert_eq!(stream.total_bytes, 1000);
        assert!((stream.throughput_mbps - 0.008).abs() < 1e-12);
    }
}
