//! Script header parsing, validation and self-registration injection.
//!
//! Schema and Data scripts carry a positional header after blank lines are
//! dropped:
//!
//! ```text
//! Name = 'Create Table Foo'
//! DECLARE @Version INT = 2;
//! DECLARE @CreationDay DATETIME = '2024.01.15';
//! ```
//!
//! The parser records validation issues instead of failing; only a resource
//! name without a numeric id is fatal.
//!
//! Parsed bodies keep the header and the injected registration in their
//! canonical T-SQL form. [`executable_body`] renders what is actually sent to
//! the connected database: header lines become comments and the registration
//! carries literal values.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use super::resources::ScriptPatterns;
use crate::db::params::quote_literal;
use crate::error::{AppError, AppResult};
use crate::models::{Script, ScriptKind};

/// Statement every versioned script runs to record itself once applied.
pub const SCRIPT_REGISTRATION_INSERT: &str = "INSERT INTO SYSTEM_VERSIONING(ScriptId,Name,Version,CreationDay,ImpactedDay) VALUES (@ScriptId,@Name,@Version,@CreationDay,GETDATE())";

/// Marker for an emitted informational line.
pub const MESSAGE_TAG: &str = "@MESSAGE::";
/// Marker for an emitted warning line.
pub const WARNING_TAG: &str = "@WARNING::";

/// Position of the registration insert once the id line is in place.
const REGISTRATION_LINE: usize = 4;
const MIN_NAME_LENGTH: usize = 5;

static SCRIPT_ID_RE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\d{4}").ok());
static CREATION_DAY_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"'\d{4}[.]\d{2}[.]\d{2}'").ok());

/// `DECLARE @ScriptId INT = <id>;`
pub fn script_id_line(id: i32) -> String {
    format!("DECLARE @ScriptId INT = {};", id)
}

/// Header problem found while parsing a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationIssue {
    NameMissing,
    NameInvalid,
    VersionMissing,
    VersionInvalid,
    DateMissing,
    DateInvalid,
    MissingHeader,
    DatabaseDeclaration,
}

impl ValidationIssue {
    pub fn message(&self) -> &'static str {
        match self {
            Self::NameMissing => "The Name parameter is missing.",
            Self::NameInvalid => "The Name must be longer than 5 characters.",
            Self::VersionMissing => "The Version parameter is missing.",
            Self::VersionInvalid => "The Version value must be a number.",
            Self::DateMissing => "The Date parameter is missing.",
            Self::DateInvalid => "The Date must have the following format MM/DD/AAAA",
            Self::MissingHeader => "It's missing the header data of the script.",
            Self::DatabaseDeclaration => "The script should not specify which database is used.",
        }
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

/// A parsed script and the issues that exclude it from the catalog.
#[derive(Debug, Clone)]
pub struct ParsedScript {
    pub script: Script,
    pub issues: Vec<ValidationIssue>,
}

impl ParsedScript {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Split a body into trimmed, non-blank lines with carriage returns removed.
pub fn normalize_lines(raw: &str) -> Vec<String> {
    raw.replace('\r', " ")
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// First run of four digits in a resource name.
pub fn script_id_from_name(file_name: &str) -> AppResult<i32> {
    SCRIPT_ID_RE
        .as_ref()
        .and_then(|re| re.find(file_name))
        .and_then(|m| m.as_str().parse::<i32>().ok())
        .ok_or_else(|| AppError::ScriptId(file_name.to_string()))
}

/// Values following `token` on every line that contains it.
pub fn token_values(lines: &[String], token: &str) -> Vec<String> {
    lines
        .iter()
        .filter_map(|line| {
            line.find(token)
                .map(|idx| line[idx + token.len()..].to_string())
        })
        .collect()
}

/// Parse a raw resource body into a catalog script.
pub fn parse_script(
    file_name: &str,
    raw: &str,
    kind: ScriptKind,
    patterns: &ScriptPatterns,
) -> AppResult<ParsedScript> {
    let mut script = Script::new(file_name, kind);
    let mut issues = Vec::new();
    let mut lines = normalize_lines(raw);

    if lines.is_empty() {
        issues.push(ValidationIssue::MissingHeader);
        return Ok(ParsedScript { script, issues });
    }

    if kind.is_versioned() {
        read_name(&lines, &mut script, &mut issues);
        read_version(&lines, &mut script, &mut issues);
        read_creation_day(&lines, &mut script, &mut issues);

        script.id = script_id_from_name(file_name)?;
        inject_registration(&mut lines, script.id);
    } else {
        script.name = file_name.replace(patterns.prefix(), "");
    }

    if lines.iter().any(|line| is_database_selection(line)) {
        issues.push(ValidationIssue::DatabaseDeclaration);
    }

    script.body = lines.join("\n");
    Ok(ParsedScript { script, issues })
}

fn read_name(lines: &[String], script: &mut Script, issues: &mut Vec<ValidationIssue>) {
    let line = &lines[0];
    if !line.contains("Name") {
        issues.push(ValidationIssue::NameMissing);
        return;
    }

    let name = line
        .split('=')
        .nth(1)
        .map(|value| value.replace(['\'', ';'], "").trim().to_string())
        .unwrap_or_default();

    if name.chars().count() > MIN_NAME_LENGTH {
        script.name = name;
    } else {
        issues.push(ValidationIssue::NameInvalid);
    }
}

fn read_version(lines: &[String], script: &mut Script, issues: &mut Vec<ValidationIssue>) {
    let Some(line) = lines.get(1).filter(|l| l.starts_with("DECLARE @Version")) else {
        issues.push(ValidationIssue::VersionMissing);
        return;
    };

    match line
        .split(" INT =")
        .nth(1)
        .and_then(|value| value.replace(';', "").trim().parse::<i32>().ok())
    {
        Some(version) => script.version = version,
        None => issues.push(ValidationIssue::VersionInvalid),
    }
}

fn read_creation_day(lines: &[String], script: &mut Script, issues: &mut Vec<ValidationIssue>) {
    let Some(line) = lines.get(2).filter(|l| l.starts_with("DECLARE @CreationDay")) else {
        issues.push(ValidationIssue::DateMissing);
        return;
    };

    let date = CREATION_DAY_RE
        .as_ref()
        .and_then(|re| re.find(line))
        .and_then(|m| NaiveDate::parse_from_str(&m.as_str().replace('\'', ""), "%Y.%m.%d").ok());

    match date {
        Some(date) => script.creation_date = Some(date),
        None => issues.push(ValidationIssue::DateInvalid),
    }
}

/// Insert the id declaration and the registration statement unless present.
fn inject_registration(lines: &mut Vec<String>, id: i32) {
    let id_line = script_id_line(id);
    if !lines.contains(&id_line) {
        lines.insert(0, id_line);
    }

    if !lines.iter().any(|l| l == SCRIPT_REGISTRATION_INSERT) {
        let at = REGISTRATION_LINE.min(lines.len());
        lines.insert(at, SCRIPT_REGISTRATION_INSERT.to_string());
    }
}

/// Registration insert with the script's own values, valid on every
/// supported backend.
pub fn registration_insert(script: &Script) -> String {
    let creation_day = script
        .creation_date
        .map(|d| quote_literal(&d.format("%Y-%m-%d").to_string()))
        .unwrap_or_else(|| "CURRENT_TIMESTAMP".to_string());

    format!(
        "INSERT INTO system_versioning (scriptid, name, version, creationday, impactedday) VALUES ({}, {}, {}, {}, CURRENT_TIMESTAMP);",
        script.id,
        quote_literal(&script.name),
        script.version,
        creation_day
    )
}

/// Body of a versioned script as sent to the database.
///
/// Header lines ahead of the registration insert are commented out and the
/// insert is replaced by [`registration_insert`]. Bodies without the insert
/// are returned unchanged.
pub fn executable_body(script: &Script) -> String {
    let lines: Vec<&str> = script.body.lines().collect();
    let Some(at) = lines.iter().position(|l| *l == SCRIPT_REGISTRATION_INSERT) else {
        return script.body.clone();
    };

    lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            if i == at {
                registration_insert(script)
            } else if i < at && is_header_line(line) {
                format!("-- {}", line)
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_header_line(line: &str) -> bool {
    line.starts_with("DECLARE @") || line.starts_with("Name")
}

fn is_database_selection(line: &str) -> bool {
    line.strip_prefix("USE")
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILE: &str = "App.Resources.DB.1234.AddTable.Schema.Create.sql";

    fn patterns() -> ScriptPatterns {
        ScriptPatterns::new("App").unwrap()
    }

    fn header(name_line: &str) -> String {
        format!(
            "\r\n{}\r\n\r\n  DECLARE @Version INT = 2;\r\nDECLARE @CreationDay DATETIME = '2024.01.15';\r\nCREATE TABLE foo (id INT);\r\n",
            name_line
        )
    }

    #[test]
    fn test_parses_valid_header() {
        let parsed = parse_script(
            FILE,
            &header("Name = 'Create Table Foo'"),
            ScriptKind::Schema,
            &patterns(),
        )
        .unwrap();

        assert!(parsed.is_valid(), "{:?}", parsed.issues);
        let script = parsed.script;
        assert_eq!(script.id, 1234);
        assert_eq!(script.name, "Create Table Foo");
        assert_eq!(script.version, 2);
        assert_eq!(script.creation_date, NaiveDate::from_ymd_opt(2024, 1, 15));
    }

    #[test]
    fn test_injects_id_and_registration() {
        let parsed = parse_script(
            FILE,
            &header("Name = 'Create Table Foo'"),
            ScriptKind::Schema,
            &patterns(),
        )
        .unwrap();

        let lines: Vec<&str> = parsed.script.body.lines().collect();
        assert_eq!(lines[0], "DECLARE @ScriptId INT = 1234;");
        assert_eq!(lines[1], "Name = 'Create Table Foo'");
        assert_eq!(lines[4], SCRIPT_REGISTRATION_INSERT);
        assert_eq!(lines[5], "CREATE TABLE foo (id INT);");
    }

    #[test]
    fn test_injection_is_idempotent() {
        let first = parse_script(
            FILE,
            &header("Name = 'Create Table Foo'"),
            ScriptKind::Data,
            &patterns(),
        )
        .unwrap();
        let second =
            parse_script(FILE, &first.script.body, ScriptKind::Data, &patterns()).unwrap();
        assert_eq!(first.script.body, second.script.body);
    }

    #[test]
    fn test_executable_body_uses_literal_registration() {
        let parsed = parse_script(
            FILE,
            &header("Name = 'Create O'Brien Table'"),
            ScriptKind::Schema,
            &patterns(),
        )
        .unwrap();
        let body = executable_body(&parsed.script);
        let lines: Vec<&str> = body.lines().collect();

        assert_eq!(lines[0], "-- DECLARE @ScriptId INT = 1234;");
        assert!(lines[1].starts_with("-- Name ="));
        assert_eq!(lines[2], "-- DECLARE @Version INT = 2;");
        assert_eq!(
            lines[3],
            "-- DECLARE @CreationDay DATETIME = '2024.01.15';"
        );
        assert_eq!(
            lines[4],
            "INSERT INTO system_versioning (scriptid, name, version, creationday, impactedday) VALUES (1234, 'Create OBrien Table', 2, '2024-01-15', CURRENT_TIMESTAMP);"
        );
        assert_eq!(lines[5], "CREATE TABLE foo (id INT);");
        assert!(
            lines
                .iter()
                .filter(|l| !l.starts_with("--"))
                .all(|l| !l.contains('@') && !l.contains("GETDATE")),
            "{}",
            body
        );
    }

    #[test]
    fn test_registration_insert_escapes_name() {
        let mut script = Script::new(FILE, ScriptKind::Data);
        script.id = 7;
        script.name = "Fix O'Brien rows".to_string();
        script.version = 3;

        assert_eq!(
            registration_insert(&script),
            "INSERT INTO system_versioning (scriptid, name, version, creationday, impactedday) VALUES (7, 'Fix O''Brien rows', 3, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP);"
        );
    }

    #[test]
    fn test_executable_body_leaves_plain_scripts() {
        let mut script = Script::new(
            "App.Resources.DB.Orders.Integrity.Check.sql",
            ScriptKind::Integrity,
        );
        script.body = "DECLARE @x INT = 1;\nSELECT '@MESSAGE::ok';".to_string();
        assert_eq!(executable_body(&script), script.body);
    }

    #[test]
    fn test_short_body_appends_registration() {
        let raw = "Name = 'Create Table Foo'\nDECLARE @Version INT = 1;\nDECLARE @CreationDay DATETIME = '2024.01.15';";
        let parsed = parse_script(FILE, raw, ScriptKind::Schema, &patterns()).unwrap();
        let lines: Vec<&str> = parsed.script.body.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[4], SCRIPT_REGISTRATION_INSERT);
    }

    #[test]
    fn test_rejects_short_name() {
        let parsed =
            parse_script(FILE, &header("Name = 'Foo'"), ScriptKind::Schema, &patterns()).unwrap();
        assert_eq!(parsed.issues, vec![ValidationIssue::NameInvalid]);
        assert_eq!(
            parsed.issues[0].message(),
            "The Name must be longer than 5 characters."
        );
    }

    #[test]
    fn test_missing_and_invalid_fields() {
        let raw = "-- no header\nDECLARE @Version INT = two;\nSELECT 1;";
        let parsed = parse_script(FILE, raw, ScriptKind::Schema, &patterns()).unwrap();
        assert_eq!(
            parsed.issues,
            vec![
                ValidationIssue::NameMissing,
                ValidationIssue::VersionInvalid,
                ValidationIssue::DateMissing,
            ]
        );

        let raw = "Name = 'Create Table Foo'\nDECLARE @Version INT = 1;\nDECLARE @CreationDay DATETIME = '15/01/2024';";
        let parsed = parse_script(FILE, raw, ScriptKind::Schema, &patterns()).unwrap();
        assert_eq!(parsed.issues, vec![ValidationIssue::DateInvalid]);
    }

    #[test]
    fn test_empty_body_is_missing_header() {
        let parsed = parse_script(FILE, " \r\n\r\n", ScriptKind::Schema, &patterns()).unwrap();
        assert_eq!(parsed.issues, vec![ValidationIssue::MissingHeader]);
    }

    #[test]
    fn test_database_selection_rejected() {
        let raw = "USE master\nSELECT '@MESSAGE::ok'";
        let parsed = parse_script(
            "App.Resources.DB.Orders.Integrity.Check.sql",
            raw,
            ScriptKind::Integrity,
            &patterns(),
        )
        .unwrap();
        assert_eq!(parsed.issues, vec![ValidationIssue::DatabaseDeclaration]);
        assert_eq!(parsed.script.name, "DB.Orders.Integrity.Check.sql");

        assert!(!is_database_selection("USERS_TABLE_CHECK"));
    }

    #[test]
    fn test_missing_id_is_fatal() {
        let result = parse_script(
            "App.Resources.DB.abc.AddTable.Schema.Create.sql",
            &header("Name = 'Create Table Foo'"),
            ScriptKind::Schema,
            &patterns(),
        );
        assert!(matches!(result, Err(AppError::ScriptId(_))));
    }

    #[test]
    fn test_id_is_stable() {
        assert_eq!(script_id_from_name(FILE).unwrap(), 1234);
        assert_eq!(script_id_from_name(FILE).unwrap(), 1234);
        assert_eq!(script_id_from_name("DB.0042.x").unwrap(), 42);
    }

    #[test]
    fn test_token_values() {
        let lines = vec![
            "@MESSAGE::all good".to_string(),
            "row: @WARNING::orphans: 3".to_string(),
            "plain".to_string(),
        ];
        assert_eq!(token_values(&lines, MESSAGE_TAG), vec!["all good"]);
        assert_eq!(token_values(&lines, WARNING_TAG), vec!["orphans: 3"]);
    }
}
