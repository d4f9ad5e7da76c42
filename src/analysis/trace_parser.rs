//! Line-oriented parser for ns-3 ASCII traces.
//!
//! Each line is matched against a [`TraceGrammar`]: the line header gives the
//! event, time and per-line metadata, the innermost network-layer header gives
//! the endpoints, and transport headers printed after it give the ports.
//! Lines that do not match are skipped and counted.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use regex::Captures;

use super::grammar::{self, TraceFormat, TraceGrammar};
use super::types::*;

/// A trace file together with the formats to try on its lines
#[derive(Debug, Clone, PartialEq)]
pub struct TraceSource {
    pub path: PathBuf,
    /// `None` tries every built-in format
    pub format: Option<TraceFormat>,
}

impl TraceSource {
    pub fn new(path: impl Into<PathBuf>, format: Option<TraceFormat>) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }

    fn grammars(&self) -> Vec<&'static TraceGrammar> {
        match self.format {
            Some(format) => vec![format.grammar()],
            None => TraceFormat::ALL.iter().map(|f| f.grammar()).collect(),
        }
    }
}

/// Records parsed from a single file
#[derive(Debug, Clone, Default)]
pub struct ParsedFile {
    pub records: Vec<TraceRecord>,
    pub lines_read: usize,
    pub skipped_lines: usize,
}

/// Records parsed from a set of files
#[derive(Debug, Clone, Default)]
pub struct ParsedTraces {
    pub records: Vec<TraceRecord>,
    pub lines_read: usize,
    pub skipped_lines: usize,
    pub files_parsed: usize,
    /// Inputs that did not exist
    pub missing: Vec<PathBuf>,
    /// Inputs that existed but could not be opened
    pub unreadable: Vec<PathBuf>,
}

/// Lazy record iterator over a line source.
///
/// Lines are decoded leniently: invalid UTF-8 is replaced rather than
/// aborting the parse. Reading stops at the first I/O error.
pub struct TraceParser<'g, R> {
    reader: R,
    grammars: Vec<&'g TraceGrammar>,
    file_name: Option<String>,
    buf: Vec<u8>,
    lines_read: usize,
    skipped_lines: usize,
    finished: bool,
}

impl<'g, R: BufRead> TraceParser<'g, R> {
    pub fn new(reader: R, grammars: Vec<&'g TraceGrammar>, file_name: Option<String>) -> Self {
        Self {
            reader,
            grammars,
            file_name,
            buf: Vec::with_capacity(512),
            lines_read: 0,
            skipped_lines: 0,
            finished: false,
        }
    }

    /// Number of lines consumed so far
    pub fn lines_read(&self) -> usize {
        self.lines_read
    }

    /// Number of lines that produced no record
    pub fn skipped_lines(&self) -> usize {
        self.skipped_lines
    }
}

impl<'g, R: BufRead> Iterator for TraceParser<'g, R> {
    type Item = TraceRecord;

    fn next(&mut self) -> Option<TraceRecord> {
        while !self.finished {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => self.finished = true,
                Ok(_) => {
                    self.lines_read += 1;
                    let line = String::from_utf8_lossy(&self.buf);
                    let line = line.trim_end_matches(['\n', '\r']);
                    match parse_line(line, &self.grammars, self.file_name.as_deref()) {
                        Some(record) => return Some(record),
                        None => self.skipped_lines += 1,
                    }
                }
                Err(e) => {
                    log::warn!(
                        "Stopped reading {} after {} lines: {}",
                        self.file_name.as_deref().unwrap_or("<input>"),
                        self.lines_read,
                        e
                    );
                    self.finished = true;
                }
            }
        }
        None
    }
}

/// Parse one trace line with the first grammar whose line header matches.
///
/// Returns `None` for lines without a matching line header or without any
/// network-layer header.
pub fn parse_line(
    line: &str,
    grammars: &[&TraceGrammar],
    file_name: Option<&str>,
) -> Option<TraceRecord> {
    for grammar in grammars {
        if let Some(caps) = grammar.line_header.captures(line) {
            return parse_with_header(line, grammar, &caps, file_name);
        }
    }
    None
}

fn parse_with_header(
    line: &str,
    grammar: &TraceGrammar,
    header: &Captures,
    file_name: Option<&str>,
) -> Option<TraceRecord> {
    let event = TraceEvent::from_marker(header.name("event")?.as_str())?;
    let time: SimTime = header.name("time")?.as_str().parse().ok()?;
    if !time.is_finite() || time < 0.0 {
        return None;
    }

    // With encapsulation the outer header carries the tunnel endpoints, so
    // the last (innermost) header describes the payload.
    let network_headers: Vec<Captures> = grammar.network_header.captures_iter(line).collect();
    let chosen = network_headers.last()?;

    let tunnel = grammar.tunnel_header.captures(line);
    let tunneled = tunnel.is_some() || network_headers.len() >= 2;
    let tunnel_id = tunnel
        .as_ref()
        .and_then(|c| c.name("teid"))
        .and_then(|m| m.as_str().parse().ok());

    let body = chosen.name("body").map(|m| m.as_str()).unwrap_or("");
    let classified = grammar::header_protocol(body)
        .map(L4Protocol::from_number)
        .unwrap_or(L4Protocol::Unknown);

    // Ports are only bound from headers printed after the chosen one
    let header_end = chosen.get(0)?.end();
    let (layer4_protocol, ports) = bind_transport(&line[header_end..], grammar, classified);

    let node = header
        .name("node")
        .and_then(|m| m.as_str().parse().ok())
        .or_else(|| file_name.and_then(|f| grammar.node_from_filename(f)));

    let mac_summary = header.name("mac").map(|m| m.as_str());

    Some(TraceRecord {
        event,
        time,
        node,
        layer4_protocol,
        source_address: chosen.name("src").map(|m| m.as_str().to_string()),
        dest_address: chosen.name("dst").map(|m| m.as_str().to_string()),
        source_port: ports.map(|(src, _)| src),
        dest_port: ports.map(|(_, dst)| dst),
        packet_id: grammar::header_packet_id(body),
        byte_length: chosen.name("length").and_then(|m| m.as_str().parse().ok()),
        tunneled,
        tunnel_id,
        direction: header.name("direction").map(|m| m.as_str().to_string()),
        phy_rate: header.name("rate").map(|m| m.as_str().to_string()),
        mac_type: mac_summary.and_then(grammar::mac_type),
        mac_retry: mac_summary.and_then(grammar::mac_retry),
        source_file: file_name.map(str::to_string),
    })
}

/// Find the transport header in `tail` that matches the classified protocol.
///
/// UDP and TCP only bind their own header; an unclassified packet takes the
/// protocol of the earliest transport header present. TCP without a printed
/// header keeps its class with no ports.
fn bind_transport(
    tail: &str,
    grammar: &TraceGrammar,
    classified: L4Protocol,
) -> (L4Protocol, Option<(u16, u16)>) {
    let mut best: Option<(usize, L4Protocol, (u16, u16))> = None;

    for pattern in &grammar.transport_headers {
        let wanted = match classified {
            L4Protocol::Udp | L4Protocol::Tcp => pattern.protocol == classified,
            L4Protocol::Unknown => true,
            L4Protocol::Other => false,
        };
        if !wanted {
            continue;
        }
        let Some(caps) = pattern.regex.captures(tail) else {
            continue;
        };
        let ports = caps
            .name("src_port")
            .and_then(|m| m.as_str().parse::<u16>().ok())
            .zip(caps.name("dst_port").and_then(|m| m.as_str().parse::<u16>().ok()));
        let (Some(ports), Some(whole)) = (ports, caps.get(0)) else {
            continue;
        };
        if best.as_ref().map_or(true, |(start, _, _)| whole.start() < *start) {
            best = Some((whole.start(), pattern.protocol, ports));
        }
    }

    match best {
        Some((_, protocol, ports)) => (protocol, Some(ports)),
        None => (classified, None),
    }
}

/// Parse a single trace file
pub fn parse_trace_file(source: &TraceSource) -> Result<ParsedFile, SourceError> {
    let path = source.path.as_path();
    let file = File::open(path).map_err(|e| SourceError::from_io(path, e))?;
    let reader = BufReader::with_capacity(64 * 1024, file);

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned());
    let mut parser = TraceParser::new(reader, source.grammars(), file_name);
    let records: Vec<TraceRecord> = parser.by_ref().collect();

    Ok(ParsedFile {
        records,
        lines_read: parser.lines_read(),
        skipped_lines: parser.skipped_lines(),
    })
}

/// Parse trace files in order, trying every built-in format on each line
pub fn parse_traces<P: AsRef<Path>>(paths: &[P]) -> ParsedTraces {
    let sources: Vec<TraceSource> = paths
        .iter()
        .map(|p| TraceSource::new(p.as_ref(), None))
        .collect();
    parse_trace_sources(&sources)
}

/// Parse trace sources in order and concatenate their records.
///
/// Missing or unreadable files contribute no records; they are listed in
/// the result so callers can proceed with partial data.
pub fn parse_trace_sources(sources: &[TraceSource]) -> ParsedTraces {
    log::info!("Parsing {} trace files...", sources.len());

    let mut parsed = ParsedTraces::default();
    for source in sources {
        match parse_trace_file(source) {
            Ok(file) => {
                log::debug!(
                    "Parsed {}: {} records, {} skipped lines",
                    source.path.display(),
                    file.records.len(),
                    file.skipped_lines
                );
                parsed.files_parsed += 1;
                parsed.lines_read += file.lines_read;
                parsed.skipped_lines += file.skipped_lines;
                parsed.records.extend(file.records);
            }
            Err(SourceError::NotFound { path }) => {
                log::warn!("Trace file not found: {}", path);
                parsed.missing.push(source.path.clone());
            }
            Err(e) => {
                log::warn!("{}", e);
                parsed.unreadable.push(source.path.clone());
            }
        }
    }

    log::info!(
        "Parsed {} records from {} files ({} lines skipped)",
        parsed.records.len(),
        parsed.files_parsed,
        parsed.skipped_lines
    );
    parsed
}
