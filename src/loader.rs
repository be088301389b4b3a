use crate::error::{PipelineError, Result};
use crate::record::{Cell, Field, RawRow};
use csv::ReaderBuilder;
use encoding_rs::{GBK, UTF_8, WINDOWS_1252};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Columns the status partition cannot work without.
pub const REQUIRED_FIELDS: [Field; 4] = [
    Field::Status,
    Field::SystemSolution,
    Field::RequestFor,
    Field::Category,
];

// Signs of UTF-8 text that was decoded as Latin-1 somewhere upstream.
const MOJIBAKE_MARKERS: &[&str] = &["â€“", "Ã", "å", "æ", "é"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEncoding {
    Utf8Sig,
    Utf8,
    Gbk,
    Cp936,
    Latin1,
}

impl SourceEncoding {
    /// Trial order used for exports of unknown origin.
    pub const CANDIDATES: [SourceEncoding; 5] = [
        SourceEncoding::Utf8Sig,
        SourceEncoding::Utf8,
        SourceEncoding::Gbk,
        SourceEncoding::Cp936,
        SourceEncoding::Latin1,
    ];

    pub fn label(self) -> &'static str {
        match self {
            SourceEncoding::Utf8Sig => "utf-8-sig",
            SourceEncoding::Utf8 => "utf-8",
            SourceEncoding::Gbk => "gbk",
            SourceEncoding::Cp936 => "cp936",
            SourceEncoding::Latin1 => "latin1",
        }
    }

    /// Strict decode: `None` if any byte sequence is invalid for this encoding.
    pub fn decode(self, bytes: &[u8]) -> Option<String> {
        let decoded = match self {
            SourceEncoding::Utf8Sig => {
                let body = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
                UTF_8.decode_without_bom_handling_and_without_replacement(body)
            }
            SourceEncoding::Utf8 => UTF_8.decode_without_bom_handling_and_without_replacement(bytes),
            // cp936 is Microsoft's name for the same GBK table, so Cp936 is
            // never reached after Gbk; it stays in the list as a label.
            SourceEncoding::Gbk | SourceEncoding::Cp936 => {
                GBK.decode_without_bom_handling_and_without_replacement(bytes)
            }
            SourceEncoding::Latin1 => WINDOWS_1252.decode_without_bom_handling_and_without_replacement(bytes),
        };
        decoded.map(Cow::into_owned)
    }
}

#[derive(Debug)]
pub struct LoadedExport {
    pub rows: Vec<RawRow>,
    pub columns: Vec<String>,
    pub encoding: SourceEncoding,
    pub malformed_rows: usize,
}

/// Tries each candidate in order and returns the first clean decode.
pub fn decode_text(
    bytes: &[u8],
    candidates: &[SourceEncoding],
    path: &Path,
) -> Result<(String, SourceEncoding)> {
    for &encoding in candidates {
        match encoding.decode(bytes) {
            Some(text) => {
                info!("Decoded {} as {}", path.display(), encoding.label());
                return Ok((text, encoding));
            }
            None => debug!("Encoding {} rejected for {}", encoding.label(), path.display()),
        }
    }
    Err(PipelineError::EncodingFailure {
        path: path.to_path_buf(),
        tried: candidates
            .iter()
            .map(|e| e.label())
            .collect::<Vec<_>>()
            .join(", "),
    })
}

/// Undoes the UTF-8-read-as-Latin-1 garbling ("CafÃ©" -> "Café") when the
/// round trip is clean; otherwise returns the text untouched.
pub fn repair_mojibake(text: &str) -> Cow<'_, str> {
    if !MOJIBAKE_MARKERS.iter().any(|m| text.contains(m)) {
        return Cow::Borrowed(text);
    }
    let (bytes, _, unmappable) = WINDOWS_1252.encode(text);
    if unmappable {
        return Cow::Borrowed(text);
    }
    match String::from_utf8(bytes.into_owned()) {
        Ok(fixed) => Cow::Owned(fixed),
        Err(_) => Cow::Borrowed(text),
    }
}

pub fn load_export(path: &Path) -> Result<LoadedExport> {
    let file = File::open(path)?;
    let file_size = file.metadata()?.len();

    let pb_read = ProgressBar::new(file_size);
    pb_read.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} Reading [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes}")
            .map(|style| style.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    let mut reader = pb_read.wrap_read(file);
    let mut bytes = Vec::with_capacity(file_size as usize);
    reader.read_to_end(&mut bytes)?;
    pb_read.finish_and_clear();

    let (text, encoding) = decode_text(&bytes, &SourceEncoding::CANDIDATES, path)?;
    let export = parse_export(&text, encoding)?;
    info!(
        "Read {}: {} rows, {} columns ({} malformed rows skipped)",
        path.display(),
        export.rows.len(),
        export.columns.len(),
        export.malformed_rows
    );
    Ok(export)
}

/// Parses decoded CSV text. Columns are matched by header name; a row with
/// more fields than the header is malformed and skipped, a shorter row reads
/// its missing trailing cells as blank.
pub fn parse_export(text: &str, encoding: SourceEncoding) -> Result<LoadedExport> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let columns: Vec<String> = rdr
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    let header_map = build_header_map(&columns);
    for field in REQUIRED_FIELDS {
        if !header_map.contains_key(&field) {
            return Err(PipelineError::MissingColumn(field.header().to_string()));
        }
    }

    let mut rows = Vec::new();
    let mut malformed_rows = 0;
    for (i, result) in rdr.records().enumerate() {
        let record = match result {
            Ok(rec) => rec,
            Err(e) => {
                warn!("Error parsing CSV record {}: {}. Skipping.", i + 1, e);
                malformed_rows += 1;
                continue;
            }
        };
        let line = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(i + 2);
        if record.len() > columns.len() {
            warn!(
                "Line {} has {} fields but the header has {}. Skipping.",
                line,
                record.len(),
                columns.len()
            );
            malformed_rows += 1;
            continue;
        }

        let mut row = RawRow::new(line);
        for (&field, &idx) in &header_map {
            let raw = record.get(idx).unwrap_or("");
            let raw = repair_mojibake(raw);
            let cell = Cell::from_raw(field, &raw);
            if cell.is_none() && field.is_date() && !crate::record::is_na(&raw) {
                debug!("Line {}: unparseable {} '{}' read as blank", line, field.header(), raw);
            }
            row.set(field, cell);
        }
        rows.push(row);
    }

    Ok(LoadedExport {
        rows,
        columns,
        encoding,
        malformed_rows,
    })
}

fn build_header_map(columns: &[String]) -> HashMap<Field, usize> {
    let mut map = HashMap::new();
    for field in Field::ALL {
        let found = field
            .headers()
            .iter()
            .find_map(|name| columns.iter().position(|c| c == name));
        if let Some(idx) = found {
            map.insert(field, idx);
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Requester,Request For,Category,System/Solution,Status,Log Actor,Log Date,Expiration Date";

    #[test]
    fn utf8_sig_strips_bom() {
        let bytes = b"\xEF\xBB\xBFStatus\nok\n";
        let (text, enc) = decode_text(bytes, &SourceEncoding::CANDIDATES, Path::new("x.csv")).unwrap();
        assert_eq!(enc, SourceEncoding::Utf8Sig);
        assert!(text.starts_with("Status"));
    }

    #[test]
    fn gbk_bytes_fall_through_to_gbk() {
        // "审批" in GBK is not valid UTF-8.
        let (bytes, _, _) = GBK.encode("审批");
        let (text, enc) = decode_text(&bytes, &SourceEncoding::CANDIDATES, Path::new("x.csv")).unwrap();
        assert_eq!(enc, SourceEncoding::Gbk);
        assert_eq!(text, "审批");
    }

    #[test]
    fn cp936_decodes_exactly_what_gbk_decodes() {
        let (valid, _, _) = GBK.encode("审批人,状态");
        let invalid = [0x81u8, 0x20];
        for bytes in [&valid[..], &invalid[..]] {
            assert_eq!(SourceEncoding::Cp936.decode(bytes), SourceEncoding::Gbk.decode(bytes));
        }
        // So with Gbk ahead of it, Cp936 is never the chosen encoding.
        let (_, enc) = decode_text(&valid, &SourceEncoding::CANDIDATES, Path::new("x.csv")).unwrap();
        assert_eq!(enc, SourceEncoding::Gbk);
    }

    #[test]
    fn no_candidate_is_an_encoding_failure() {
        let bytes = [0xFFu8, 0xFE, 0xFD];
        let err = decode_text(&bytes, &[SourceEncoding::Utf8], Path::new("bad.csv")).unwrap_err();
        assert!(matches!(err, PipelineError::EncodingFailure { .. }));
    }

    #[test]
    fn repairs_latin1_garbled_text() {
        assert_eq!(repair_mojibake("CafÃ©"), "Café");
        assert_eq!(repair_mojibake("Café"), "Café");
        assert_eq!(repair_mojibake("审批通过"), "审批通过");
    }

    #[test]
    fn missing_required_column_is_fatal() {
        let err = parse_export("Requester,Status,Category\nA,Pending Review,X\n", SourceEncoding::Utf8).unwrap_err();
        match err {
            PipelineError::MissingColumn(name) => assert_eq!(name, "System/Solution"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn long_rows_are_skipped_and_short_rows_padded() {
        let text = format!(
            "{HEADER}\nAlice,Bob,CN01,SAP,Pending Review,Carol,2024-01-01 10:00:00,2024-02-01\n\
             ,,,,,,,,,extra,fields\n\
             ,,,,,Dave\n"
        );
        let export = parse_export(&text, SourceEncoding::Utf8).unwrap();
        assert_eq!(export.malformed_rows, 1);
        assert_eq!(export.rows.len(), 2);
        assert_eq!(export.rows[0].text(Field::Requester), Some("Alice"));
        assert!(export.rows[0].datetime(Field::LogDate).is_some());
        assert_eq!(export.rows[1].text(Field::LogActor), Some("Dave"));
        assert!(export.rows[1].is_blank(Field::LogDate));
        assert!(export.rows[1].is_blank(Field::Requester));
    }

    #[test]
    fn header_only_export_has_no_rows() {
        let export = parse_export(&format!("{HEADER}\n"), SourceEncoding::Utf8).unwrap();
        assert!(export.rows.is_empty());
        assert_eq!(export.columns.len(), 8);
    }

    #[test]
    fn site_column_aliases_are_recognised() {
        let text = "Site ID,Request For,Category,System/Solution,Status\nsh01,Bob,CN,SAP,Pending Review\n";
        let export = parse_export(text, SourceEncoding::Utf8).unwrap();
        assert_eq!(export.rows[0].text(Field::Site), Some("sh01"));
    }
}
