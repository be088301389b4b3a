use lazy_static::lazy_static;
use regex::Regex;
use time::format_description::well_known::Rfc3339;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};

lazy_static! {
    static ref SITE_SPLIT_RE: Regex = Regex::new(r"[,\s;/]+").unwrap();
}

/// Cell contents the export uses for "no value". Matched after trimming.
const NA_TOKENS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

const DATETIME_LAYOUTS: &[&[BorrowedFormatItem<'static>]] = &[
    format_description!("[year]-[month padding:none]-[day padding:none] [hour padding:none]:[minute]:[second]"),
    format_description!("[year]-[month padding:none]-[day padding:none] [hour padding:none]:[minute]:[second].[subsecond]"),
    format_description!("[year]-[month padding:none]-[day padding:none]T[hour padding:none]:[minute]:[second]"),
    format_description!("[year]-[month padding:none]-[day padding:none]T[hour padding:none]:[minute]:[second].[subsecond]"),
    format_description!("[year]-[month padding:none]-[day padding:none] [hour padding:none]:[minute]"),
    format_description!("[year]/[month padding:none]/[day padding:none] [hour padding:none]:[minute]:[second]"),
    format_description!("[year]/[month padding:none]/[day padding:none] [hour padding:none]:[minute]"),
    format_description!("[month padding:none]/[day padding:none]/[year] [hour padding:none]:[minute]:[second]"),
    format_description!("[month padding:none]/[day padding:none]/[year] [hour padding:none]:[minute]"),
    format_description!(
        "[month padding:none]/[day padding:none]/[year] [hour repr:12 padding:none]:[minute]:[second] [period case_sensitive:false]"
    ),
    format_description!(
        "[month padding:none]/[day padding:none]/[year] [hour repr:12 padding:none]:[minute] [period case_sensitive:false]"
    ),
];

const DATE_LAYOUTS: &[&[BorrowedFormatItem<'static>]] = &[
    format_description!("[year]-[month padding:none]-[day padding:none]"),
    format_description!("[year]/[month padding:none]/[day padding:none]"),
    format_description!("[month padding:none]/[day padding:none]/[year]"),
];

/// Columns of the compliance export the report reads, addressed by header name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Requester,
    RequesterEmail,
    RequestFor,
    RequestForEmail,
    RequestedDate,
    Area,
    Category,
    CategoryDescription,
    SystemSolution,
    SystemSolutionDescription,
    ApprovalText,
    OwnerGuidelines,
    ExpirationDate,
    MaxRequestAge,
    AccessType,
    TemporaryAccess,
    Privileged,
    Status,
    Confirmed,
    Reason,
    RemarkRole,
    EmployeeStatus,
    LogActor,
    LogActorEmail,
    LogStatus,
    LogDate,
    RequestId,
    Site,
}

impl Field {
    pub const COUNT: usize = 28;

    pub const ALL: [Field; Field::COUNT] = [
        Field::Requester,
        Field::RequesterEmail,
        Field::RequestFor,
        Field::RequestForEmail,
        Field::RequestedDate,
        Field::Area,
        Field::Category,
        Field::CategoryDescription,
        Field::SystemSolution,
        Field::SystemSolutionDescription,
        Field::ApprovalText,
        Field::OwnerGuidelines,
        Field::ExpirationDate,
        Field::MaxRequestAge,
        Field::AccessType,
        Field::TemporaryAccess,
        Field::Privileged,
        Field::Status,
        Field::Confirmed,
        Field::Reason,
        Field::RemarkRole,
        Field::EmployeeStatus,
        Field::LogActor,
        Field::LogActorEmail,
        Field::LogStatus,
        Field::LogDate,
        Field::RequestId,
        Field::Site,
    ];

    /// Header names accepted for this field, in priority order.
    pub fn headers(self) -> &'static [&'static str] {
        match self {
            Field::Requester => &["Requester"],
            Field::RequesterEmail => &["Requester Email"],
            Field::RequestFor => &["Request For"],
            Field::RequestForEmail => &["Request For Email"],
            Field::RequestedDate => &["Requested Date"],
            Field::Area => &["Area"],
            Field::Category => &["Category"],
            Field::CategoryDescription => &["Category Description"],
            Field::SystemSolution => &["System/Solution"],
            Field::SystemSolutionDescription => &["System/Solution Description"],
            Field::ApprovalText => &["Approval Text"],
            Field::OwnerGuidelines => &["Owner Guidelines"],
            Field::ExpirationDate => &["Expiration Date"],
            Field::MaxRequestAge => &["Max Request Age (Days)"],
            Field::AccessType => &["Access Type"],
            Field::TemporaryAccess => &["Temporary Access?"],
            Field::Privileged => &["Privileged?"],
            Field::Status => &["Status"],
            Field::Confirmed => &["Confirmed?"],
            Field::Reason => &["Reason"],
            Field::RemarkRole => &["Remark/Role"],
            Field::EmployeeStatus => &["Employee Status"],
            Field::LogActor => &["Log Actor"],
            Field::LogActorEmail => &["Log Actor Email"],
            Field::LogStatus => &["Log Status"],
            Field::LogDate => &["Log Date"],
            Field::RequestId => &["Request ID"],
            Field::Site => &["Site", "Site ID", "SiteID", "Site_Id"],
        }
    }

    pub fn header(self) -> &'static str {
        self.headers()[0]
    }

    pub fn is_date(self) -> bool {
        matches!(self, Field::RequestedDate | Field::ExpirationDate | Field::LogDate)
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// A non-blank cell value. Date columns are parsed once, when the row is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    Text(String),
    DateTime(PrimitiveDateTime),
}

impl Cell {
    /// Builds the cell for `field` from raw CSV text. NA tokens give `None`,
    /// and so do date cells no layout can parse.
    pub fn from_raw(field: Field, raw: &str) -> Option<Cell> {
        if is_na(raw) {
            return None;
        }
        if field.is_date() {
            return parse_datetime(raw).map(Cell::DateTime);
        }
        Some(Cell::Text(raw.to_string()))
    }
}

pub fn is_na(raw: &str) -> bool {
    let trimmed = raw.trim();
    NA_TOKENS.contains(&trimmed)
}

pub fn parse_datetime(raw: &str) -> Option<PrimitiveDateTime> {
    let value = raw.trim();
    for layout in DATETIME_LAYOUTS {
        if let Ok(dt) = PrimitiveDateTime::parse(value, layout) {
            return Some(dt);
        }
    }
    for layout in DATE_LAYOUTS {
        if let Ok(date) = Date::parse(value, layout) {
            return Some(PrimitiveDateTime::new(date, Time::MIDNIGHT));
        }
    }
    OffsetDateTime::parse(value, &Rfc3339)
        .ok()
        .map(|odt| PrimitiveDateTime::new(odt.date(), odt.time()))
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    /// 1-based line of the record in the source file (header is line 1).
    pub line: usize,
    cells: Vec<Option<Cell>>,
}

impl RawRow {
    pub fn new(line: usize) -> Self {
        Self {
            line,
            cells: vec![None; Field::COUNT],
        }
    }

    pub fn with(mut self, field: Field, raw: &str) -> Self {
        self.set(field, Cell::from_raw(field, raw));
        self
    }

    pub fn set(&mut self, field: Field, cell: Option<Cell>) {
        self.cells[field.index()] = cell;
    }

    pub fn get(&self, field: Field) -> Option<&Cell> {
        self.cells.get(field.index()).and_then(Option::as_ref)
    }

    pub fn is_blank(&self, field: Field) -> bool {
        self.get(field).is_none()
    }

    pub fn text(&self, field: Field) -> Option<&str> {
        match self.get(field) {
            Some(Cell::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn datetime(&self, field: Field) -> Option<PrimitiveDateTime> {
        match self.get(field) {
            Some(Cell::DateTime(dt)) => Some(*dt),
            _ => None,
        }
    }

    /// Upper-cased site identifiers, taken from the first non-blank of
    /// Site, Area and Category.
    pub fn site_tokens(&self) -> Vec<String> {
        for field in [Field::Site, Field::Area, Field::Category] {
            if let Some(raw) = self.text(field) {
                let tokens: Vec<String> = SITE_SPLIT_RE
                    .split(raw.trim())
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_uppercase)
                    .collect();
                if !tokens.is_empty() {
                    return tokens;
                }
            }
        }
        Vec::new()
    }
}
