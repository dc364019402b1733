//! Source table models and the form-map translation used by the CRUD surface.

use std::collections::HashMap;
use std::path::Path;

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use super::pg_enum;
use crate::error::CoreError;
use crate::schema::{source_table_columns, source_tables, sql_types};

/// File loader selected from the source file's extension.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = sql_types::LoaderType)]
#[serde(rename_all = "snake_case")]
pub enum LoaderType {
    Flat,
    Excel,
    Mdb,
    Dbf,
}

impl LoaderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flat => "flat",
            Self::Excel => "excel",
            Self::Mdb => "mdb",
            Self::Dbf => "dbf",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "flat" => Some(Self::Flat),
            "excel" => Some(Self::Excel),
            "mdb" => Some(Self::Mdb),
            "dbf" => Some(Self::Dbf),
            _ => None,
        }
    }

    /// Derive the loader from a file name's extension.
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let ext = Path::new(file_name).extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "csv" | "txt" | "tsv" => Some(Self::Flat),
            "xls" | "xlsx" => Some(Self::Excel),
            "mdb" | "accdb" => Some(Self::Mdb),
            "dbf" => Some(Self::Dbf),
            _ => None,
        }
    }

    /// Excel workbooks and MDB databases address a named sub-table.
    pub fn requires_sub_table(&self) -> bool {
        matches!(self, Self::Excel | Self::Mdb)
    }
}

pg_enum!(LoaderType, sql_types::LoaderType);

/// How the source file was collected from the provider.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = sql_types::CollectType)]
#[serde(rename_all = "snake_case")]
pub enum CollectType {
    Download,
    Email,
    Foia,
    Scrape,
    Manual,
    Other,
}

impl CollectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Download => "download",
            Self::Email => "email",
            Self::Foia => "foia",
            Self::Scrape => "scrape",
            Self::Manual => "manual",
            Self::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "download" => Some(Self::Download),
            "email" => Some(Self::Email),
            "foia" => Some(Self::Foia),
            "scrape" => Some(Self::Scrape),
            "manual" => Some(Self::Manual),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

pg_enum!(CollectType, sql_types::CollectType);

/// User-declared mapping between a source file (or sub-table within one) and
/// a destination database table.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = source_tables, primary_key(st_oid))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SourceTable {
    pub st_oid: i64,
    pub run_id: i64,
    pub table_name: String,
    pub file_id: String,
    pub file_name: String,
    pub loader_type: LoaderType,
    pub sub_table: Option<String>,
    pub delimiter: Option<String>,
    pub qualified: bool,
    pub encoding: String,
    pub collect_type: CollectType,
    pub analyze: bool,
    pub load: bool,
    pub record_count: i64,
    pub url: Option<String>,
    pub comments: Option<String>,
}

/// Per-column statistics written by the analyze task and consumed by the
/// load task to synthesize `CREATE TABLE` DDL.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = source_table_columns, primary_key(stc_oid))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SourceTableColumn {
    pub stc_oid: i64,
    pub st_oid: i64,
    pub name: String,
    pub column_type: String,
    pub max_length: i32,
    pub min_length: i32,
    pub label: String,
    pub column_index: i32,
}

/// Typed translation of the loose string form map submitted by the
/// source-table CRUD endpoints. Unknown fields are ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceTableForm {
    pub table_name: String,
    pub file_id: String,
    pub file_name: String,
    pub loader_type: LoaderType,
    pub sub_table: Option<String>,
    pub delimiter: Option<String>,
    pub qualified: bool,
    pub encoding: String,
    pub collect_type: CollectType,
    pub analyze: bool,
    pub load: bool,
    pub url: Option<String>,
    pub comments: Option<String>,
}

const DEFAULT_ENCODING: &str = "UTF8";

/// Checkbox-style form fields are true iff the value equals "on".
fn checkbox(params: &HashMap<String, String>, key: &str) -> bool {
    params.get(key).map(|v| v == "on").unwrap_or(false)
}

/// Blank values translate to NULL, anything else passes through.
fn blank_to_null(params: &HashMap<String, String>, key: &str) -> Option<String> {
    params
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
}

fn required<'a>(
    params: &'a HashMap<String, String>,
    key: &str,
) -> Result<&'a str, CoreError> {
    params
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| CoreError::bad_request(format!("{key} must be not null")))
}

impl SourceTableForm {
    /// Translate form fields to typed values, applying the per-field rules.
    pub fn from_map(params: &HashMap<String, String>) -> Result<Self, CoreError> {
        let table_name = required(params, "table_name")?.to_uppercase();
        if !table_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
            || table_name.starts_with(|c: char| c.is_ascii_digit())
        {
            return Err(CoreError::bad_request(format!(
                "table_name '{table_name}' must be alphanumeric with underscores"
            )));
        }

        let file_id = required(params, "file_id")?.to_string();
        if !is_file_id(&file_id) {
            return Err(CoreError::bad_request(format!(
                "file_id '{file_id}' must match F<digits>"
            )));
        }

        let file_name = required(params, "file_name")?.to_string();
        let loader_type = LoaderType::from_file_name(&file_name).ok_or_else(|| {
            CoreError::bad_request(format!(
                "file_name '{file_name}' must contain a supported extension"
            ))
        })?;

        let sub_table = blank_to_null(params, "sub_table");
        if loader_type.requires_sub_table() && sub_table.is_none() {
            return Err(CoreError::bad_request("Sub Table must be not null"));
        }

        let delimiter = blank_to_null(params, "delimiter");
        if loader_type == LoaderType::Flat {
            match &delimiter {
                None => return Err(CoreError::bad_request("Delimiter must be not null")),
                Some(d) if d.chars().count() != 1 => {
                    return Err(CoreError::bad_request(format!(
                        "delimiter '{d}' must be a single character"
                    )))
                }
                Some(_) => {}
            }
        }

        let encoding = blank_to_null(params, "encoding")
            .unwrap_or_else(|| DEFAULT_ENCODING.to_string());
        // Travels into a COPY ... ENCODING option verbatim.
        if !encoding
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(CoreError::bad_request(format!(
                "encoding '{encoding}' is not a valid encoding name"
            )));
        }

        let collect_type = match params.get("collect_type") {
            Some(raw) => CollectType::from_str(raw).ok_or_else(|| {
                CoreError::bad_request(format!("unknown collect_type '{raw}'"))
            })?,
            None => CollectType::Download,
        };

        Ok(Self {
            table_name,
            file_id,
            file_name,
            loader_type,
            sub_table,
            delimiter,
            qualified: checkbox(params, "qualified"),
            encoding,
            collect_type,
            analyze: checkbox(params, "analyze"),
            load: checkbox(params, "load"),
            url: blank_to_null(params, "url"),
            comments: blank_to_null(params, "comments"),
        })
    }
}

/// File ids follow the `F<digits>` pattern.
pub fn is_file_id(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next() == Some('F') && {
        let rest: Vec<char> = chars.collect();
        !rest.is_empty() && rest.iter().all(|c| c.is_ascii_digit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_map() -> HashMap<String, String> {
        let mut m = HashMap::new();
        m.insert("table_name".into(), "ACCOUNTS".into());
        m.insert("file_id".into(), "F101".into());
        m.insert("file_name".into(), "accounts.csv".into());
        m.insert("delimiter".into(), ",".into());
        m.insert("collect_type".into(), "download".into());
        m
    }

    #[test]
    fn test_loader_from_extension() {
        assert_eq!(LoaderType::from_file_name("a.csv"), Some(LoaderType::Flat));
        assert_eq!(LoaderType::from_file_name("a.TXT"), Some(LoaderType::Flat));
        assert_eq!(LoaderType::from_file_name("a.xlsx"), Some(LoaderType::Excel));
        assert_eq!(LoaderType::from_file_name("a.xls"), Some(LoaderType::Excel));
        assert_eq!(LoaderType::from_file_name("a.mdb"), Some(LoaderType::Mdb));
        assert_eq!(LoaderType::from_file_name("a.accdb"), Some(LoaderType::Mdb));
        assert_eq!(LoaderType::from_file_name("a.dbf"), Some(LoaderType::Dbf));
        assert_eq!(LoaderType::from_file_name("a.parquet"), None);
        assert_eq!(LoaderType::from_file_name("noextension"), None);
    }

    #[test]
    fn test_form_happy_path() {
        let mut m = base_map();
        m.insert("qualified".into(), "on".into());
        m.insert("analyze".into(), "on".into());
        m.insert("url".into(), "  ".into());
        let form = SourceTableForm::from_map(&m).unwrap();
        assert_eq!(form.loader_type, LoaderType::Flat);
        assert!(form.qualified);
        assert!(form.analyze);
        assert!(!form.load);
        assert_eq!(form.url, None);
        assert_eq!(form.encoding, "UTF8");
    }

    #[test]
    fn test_form_missing_required() {
        let mut m = base_map();
        m.remove("file_id");
        let err = SourceTableForm::from_map(&m).unwrap_err();
        assert!(err.to_string().contains("file_id"));
    }

    #[test]
    fn test_excel_requires_sub_table() {
        let mut m = base_map();
        m.insert("file_name".into(), "foo.xlsx".into());
        m.remove("delimiter");
        let err = SourceTableForm::from_map(&m).unwrap_err();
        assert_eq!(err.to_string(), "Sub Table must be not null");

        m.insert("sub_table".into(), "Sheet1".into());
        let form = SourceTableForm::from_map(&m).unwrap();
        assert_eq!(form.loader_type, LoaderType::Excel);
        assert_eq!(form.sub_table.as_deref(), Some("Sheet1"));
    }

    #[test]
    fn test_flat_requires_single_char_delimiter() {
        let mut m = base_map();
        m.remove("delimiter");
        assert!(SourceTableForm::from_map(&m).is_err());

        m.insert("delimiter".into(), "||".into());
        assert!(SourceTableForm::from_map(&m).is_err());

        m.insert("delimiter".into(), "|".into());
        let form = SourceTableForm::from_map(&m).unwrap();
        assert_eq!(form.delimiter.as_deref(), Some("|"));
    }

    #[test]
    fn test_checkbox_only_on() {
        let mut m = base_map();
        m.insert("load".into(), "true".into());
        let form = SourceTableForm::from_map(&m).unwrap();
        assert!(!form.load);

        m.insert("load".into(), "on".into());
        let form = SourceTableForm::from_map(&m).unwrap();
        assert!(form.load);
    }

    #[test]
    fn test_encoding_name_validated() {
        let mut m = base_map();
        m.insert("encoding".into(), "LATIN1".into());
        let form = SourceTableForm::from_map(&m).unwrap();
        assert_eq!(form.encoding, "LATIN1");

        m.insert("encoding".into(), "LATIN1'; DROP TABLE x --".into());
        assert!(SourceTableForm::from_map(&m).is_err());
    }

    #[test]
    fn test_unknown_collect_type() {
        let mut m = base_map();
        m.insert("collect_type".into(), "carrier_pigeon".into());
        assert!(SourceTableForm::from_map(&m).is_err());
    }

    #[test]
    fn test_file_id_pattern() {
        assert!(is_file_id("F1"));
        assert!(is_file_id("F1234"));
        assert!(!is_file_id("F"));
        assert!(!is_file_id("G12"));
        assert!(!is_file_id("F12a"));
        assert!(!is_file_id(""));
    }
}
