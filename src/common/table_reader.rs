use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use chrono::NaiveDate;
use duckdb::{params_from_iter, Connection};
use thiserror::Error;
use tracing::{debug, info};

use super::params::{ParamsError, SeriesParams};
use super::types::TimeSeries;

/// Errors raised while loading a series.
#[derive(Debug, Error)]
pub enum SeriesError {
    #[error(transparent)]
    Params(#[from] ParamsError),

    #[error("query failed: {0}")]
    Query(#[from] duckdb::Error),

    #[error("cannot read spreadsheet '{path}': {reason}")]
    Workbook { path: String, reason: String },

    #[error("cannot parse '{value}' in column '{column}' as a date")]
    InvalidDate { column: String, value: String },

    #[error("no valid data found in '{location}' (columns '{first}', '{second}')")]
    NoData {
        location: String,
        first: String,
        second: String,
    },
}

/// Load a series from a file through a fresh in-memory DuckDB connection.
pub fn load_series(params: &SeriesParams) -> Result<TimeSeries, SeriesError> {
    let con = Connection::open_in_memory()?;
    read_time_series(&con, params)
}

/// Read a time series with DuckDB.
///
/// Executes `SELECT CAST(ts AS DATE), CAST(value AS DOUBLE) FROM source ORDER BY ts`,
/// which both parses the file and renames its columns to the (date, value)
/// shape the rest of the crate expects. Rows with a NULL date or value, or a
/// NaN value, are skipped.
pub fn read_time_series(
    con: &Connection,
    params: &SeriesParams,
) -> Result<TimeSeries, SeriesError> {
    params.validate()?;

    let ts = quote_identifier(&params.timestamp_col);
    let sql = format!(
        "SELECT CAST(CAST({ts} AS DATE) AS VARCHAR), TRY_CAST({val} AS DOUBLE) \
         FROM {rel} ORDER BY CAST({ts} AS DATE)",
        ts = ts,
        val = quote_identifier(&params.value_col),
        rel = relation(con, &params.source)?,
    );
    debug!(%sql, "reading time series");

    let mut stmt = con.prepare(&sql)?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, Option<String>>(0)?, row.get::<_, Option<f64>>(1)?))
    })?;

    let mut timestamps = Vec::new();
    let mut values = Vec::new();

    for row in rows {
        let (date, value) = match row? {
            (Some(d), Some(v)) if !v.is_nan() => (d, v),
            _ => continue,
        };
        let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|_| {
            SeriesError::InvalidDate {
                column: params.timestamp_col.clone(),
                value: date.clone(),
            }
        })?;
        timestamps.push(date);
        values.push(value);
    }

    if timestamps.is_empty() {
        return Err(SeriesError::NoData {
            location: params.source.clone(),
            first: params.timestamp_col.clone(),
            second: params.value_col.clone(),
        });
    }

    info!(
        source = %params.source,
        points = values.len(),
        "loaded time series"
    );
    Ok(TimeSeries::new(timestamps, values))
}

/// Read two numeric columns as index-aligned sequences.
///
/// Rows where either column is NULL are dropped as a pair so that the two
/// sequences stay aligned. When `order_by` is given the rows are sorted by it.
pub fn read_columns(
    con: &Connection,
    source: &str,
    first: &str,
    second: &str,
    order_by: Option<&str>,
) -> Result<(Vec<f64>, Vec<f64>), SeriesError> {
    if source.trim().is_empty() {
        return Err(ParamsError::Empty("source").into());
    }

    let order = match order_by {
        Some(col) => format!(" ORDER BY {}", quote_identifier(col)),
        None => String::new(),
    };
    let sql = format!(
        "SELECT TRY_CAST({a} AS DOUBLE), TRY_CAST({b} AS DOUBLE) FROM {rel}{order}",
        a = quote_identifier(first),
        b = quote_identifier(second),
        rel = relation(con, source)?,
        order = order,
    );
    debug!(%sql, "reading column pair");

    let mut stmt = con.prepare(&sql)?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, Option<f64>>(0)?, row.get::<_, Option<f64>>(1)?))
    })?;

    let mut a = Vec::new();
    let mut b = Vec::new();
    for row in rows {
        if let (Some(x), Some(y)) = row? {
            a.push(x);
            b.push(y);
        }
    }

    if a.is_empty() {
        return Err(SeriesError::NoData {
            location: source.to_string(),
            first: first.to_string(),
            second: second.to_string(),
        });
    }
    Ok((a, b))
}

/// SQL relation for a source: a file reader for known extensions, a staged
/// copy of the first sheet for spreadsheets, otherwise a quoted table name.
fn relation(con: &Connection, source: &str) -> Result<String, SeriesError> {
    let path = Path::new(source);
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    let literal = quote_literal(source);

    let rel = match ext.as_deref() {
        Some("csv") | Some("tsv") | Some("txt") => format!("read_csv_auto({})", literal),
        Some("parquet") => format!("read_parquet({})", literal),
        Some("xlsx") | Some("xlsm") | Some("xls") | Some("ods") => stage_workbook(con, source)?,
        _ if path.is_file() => format!("read_csv_auto({})", literal),
        _ => quote_identifier(source),
    };
    Ok(rel)
}

/// Temporary table holding the sheet of the last spreadsheet read.
const WORKBOOK_TABLE: &str = "carstats_workbook";

/// Copy the first sheet of a spreadsheet into a temporary table of text
/// columns named after its header row, so the usual casts apply to it.
fn stage_workbook(con: &Connection, path: &str) -> Result<String, SeriesError> {
    let workbook_error = |reason: String| SeriesError::Workbook {
        path: path.to_string(),
        reason,
    };

    let mut workbook = open_workbook_auto(path).map_err(|e| workbook_error(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| workbook_error("the workbook has no sheets".to_string()))?
        .map_err(|e| workbook_error(e.to_string()))?;

    let mut rows = range.rows();
    let header: Vec<String> = rows
        .next()
        .ok_or_else(|| workbook_error("the first sheet is empty".to_string()))?
        .iter()
        .enumerate()
        .map(|(i, cell)| cell_text(cell).unwrap_or_else(|| format!("column{}", i + 1)))
        .collect();

    let table = quote_identifier(WORKBOOK_TABLE);
    let columns: Vec<String> = header
        .iter()
        .map(|name| format!("{} VARCHAR", quote_identifier(name)))
        .collect();
    con.execute_batch(&format!(
        "CREATE OR REPLACE TEMP TABLE {} ({})",
        table,
        columns.join(", ")
    ))?;

    let placeholders = vec!["?"; header.len()].join(", ");
    let mut insert = con.prepare(&format!("INSERT INTO {} VALUES ({})", table, placeholders))?;
    let mut staged = 0usize;
    for row in rows {
        let cells: Vec<Option<String>> = (0..header.len())
            .map(|i| row.get(i).and_then(cell_text))
            .collect();
        if cells.iter().all(Option::is_none) {
            continue;
        }
        insert.execute(params_from_iter(cells))?;
        staged += 1;
    }
    debug!(path, sheet_rows = staged, "staged spreadsheet");

    Ok(table)
}

/// Text of a spreadsheet cell; dates become `YYYY-MM-DD`.
fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Data::Float(v) => Some(v.to_string()),
        Data::Int(v) => Some(v.to_string()),
        Data::Bool(v) => Some(v.to_string()),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| d.date().format("%Y-%m-%d").to_string()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Some(s.clone()),
    }
}

/// Quote a SQL identifier, doubling any internal double quotes.
fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a SQL string literal, doubling any internal single quotes.
fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_read_csv_with_renamed_columns() {
        let file = write_csv(
            "Mês,AUTOMÓVEIS\n\
             1990-03-31,300\n\
             1990-01-31,100\n\
             1990-02-28,200\n",
        );
        let source = file.path().to_string_lossy();
        let params = SeriesParams::new(source, "Mês", "AUTOMÓVEIS").unwrap();
        let series = load_series(&params).unwrap();

        assert_eq!(series.len(), 3);
        // Sorted by date regardless of file order
        assert_eq!(series.values, vec![100.0, 200.0, 300.0]);
        assert_eq!(
            series.timestamps[0],
            NaiveDate::from_ymd_opt(1990, 1, 31).unwrap()
        );
    }

    #[test]
    fn test_null_values_skipped() {
        let file = write_csv("ds,y\n2024-01-01,1.5\n2024-02-01,\n2024-03-01,3.5\n");
        let params = SeriesParams::new(file.path().to_string_lossy(), "ds", "y").unwrap();
        let series = load_series(&params).unwrap();
        assert_eq!(series.values, vec![1.5, 3.5]);
    }

    #[test]
    fn test_missing_column_is_query_error() {
        let file = write_csv("ds,y\n2024-01-01,1\n");
        let params = SeriesParams::new(file.path().to_string_lossy(), "ds", "nope").unwrap();
        let err = load_series(&params).unwrap_err();
        assert!(matches!(err, SeriesError::Query(_)), "got {:?}", err);
    }

    #[test]
    fn test_read_from_table() {
        let con = Connection::open_in_memory().unwrap();
        con.execute_batch(
            "CREATE TABLE sales (ds DATE, revenue DOUBLE);
             INSERT INTO sales VALUES ('2024-02-01', 20), ('2024-01-01', 10);",
        )
        .unwrap();
        let params = SeriesParams::new("sales", "ds", "revenue").unwrap();
        let series = read_time_series(&con, &params).unwrap();
        assert_eq!(series.values, vec![10.0, 20.0]);
    }

    #[test]
    fn test_empty_table_is_no_data() {
        let con = Connection::open_in_memory().unwrap();
        con.execute_batch("CREATE TABLE empty_t (ds DATE, y DOUBLE);")
            .unwrap();
        let params = SeriesParams::new("empty_t", "ds", "y").unwrap();
        let err = read_time_series(&con, &params).unwrap_err();
        assert!(matches!(err, SeriesError::NoData { .. }));
    }

    #[test]
    fn test_read_columns_keeps_pairs_aligned() {
        let file = write_csv("t,actual,predicted\n1,10,11\n2,,19\n3,30,29\n");
        let con = Connection::open_in_memory().unwrap();
        let source = file.path().to_string_lossy().to_string();
        let (a, p) = read_columns(&con, &source, "actual", "predicted", Some("t")).unwrap();
        assert_eq!(a, vec![10.0, 30.0]);
        assert_eq!(p, vec![11.0, 29.0]);
    }

    fn fixture(name: &str) -> String {
        format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name)
    }

    #[test]
    fn test_read_xlsx_sheet() {
        let params = SeriesParams::new(fixture("automoveis.xlsx"), "Mês", "AUTOMÓVEIS").unwrap();
        let series = load_series(&params).unwrap();

        // 24 months, one of them without a value
        assert_eq!(series.len(), 23);
        assert_eq!(
            series.timestamps[0],
            NaiveDate::from_ymd_opt(1990, 1, 31).unwrap()
        );
        assert_eq!(
            series.timestamps[4],
            NaiveDate::from_ymd_opt(1990, 6, 30).unwrap()
        );
        assert_eq!(series.values[..4], [50000.0, 50250.0, 53500.0, 50750.0]);
        assert_eq!(series.values.iter().sum::<f64>(), 1_236_000.0);
    }

    #[test]
    fn test_read_columns_from_xlsx() {
        let con = Connection::open_in_memory().unwrap();
        let (a, b) = read_columns(
            &con,
            &fixture("automoveis.xlsx"),
            "AUTOMÓVEIS",
            "AUTOMÓVEIS",
            Some("Mês"),
        )
        .unwrap();
        assert_eq!(a.len(), 23);
        assert_eq!(a, b);
    }

    #[test]
    fn test_unreadable_xlsx_is_workbook_error() {
        let mut file = tempfile::Builder::new().suffix(".xlsx").tempfile().unwrap();
        file.write_all(b"not a zip archive").unwrap();
        file.flush().unwrap();

        let params = SeriesParams::new(file.path().to_string_lossy(), "ds", "y").unwrap();
        let err = load_series(&params).unwrap_err();
        assert!(matches!(err, SeriesError::Workbook { .. }), "got {:?}", err);
        assert!(err.to_string().starts_with("cannot read spreadsheet"));
    }

    #[test]
    fn test_cell_text() {
        assert_eq!(cell_text(&Data::Empty), None);
        assert_eq!(cell_text(&Data::Float(1.5)), Some("1.5".to_string()));
        assert_eq!(cell_text(&Data::String("  Mês ".to_string())), Some("Mês".to_string()));
    }

    #[test]
    fn test_quote_identifier_escapes() {
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
        assert_eq!(quote_literal("it's.csv"), "'it''s.csv'");
    }
}
