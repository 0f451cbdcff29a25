//! Spreadsheet reader: workbook bytes -> polars `DataFrame` -> records.
//!
//! The first row of the selected sheet holds column headers; every following
//! row becomes one [`SpecRecord`].

use std::io::Cursor;

use calamine::{Data, DataType, Reader, Xlsx, open_workbook_from_rs};
use polars::prelude::{AnyValue, Column, DataFrame, IpcReader, NamedFrom, SerReader};
use tracing::debug;

use crate::spec::{EnumCellValue, ReadError, SpecReadOptions, SpecRecord};
use crate::util::{convert_cell_value_to_text, derive_unique_column_names};

/// Inclusive bound for treating an integral float as `i64`.
const N_I64_EXACT_MAX: f64 = 9_007_199_254_740_992.0;

/// Source cell after calamine decoding, before column typing.
#[derive(Debug, Clone, PartialEq)]
enum EnumSourceCell {
    Empty,
    Number(f64),
    Boolean(bool),
    Text(String),
}

impl EnumSourceCell {
    fn to_text(&self) -> Option<String> {
        match self {
            Self::Empty => None,
            Self::Number(n) => Some(convert_cell_value_to_text(&EnumCellValue::Number(*n))),
            Self::Boolean(b) => Some(derive_bool_text(*b).to_string()),
            Self::Text(s) => Some(s.clone()),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// #region WorkbookReader

/// Parse `.xlsx` bytes into a dataframe with one typed column per header.
pub fn read_workbook_dataframe(
    bytes: &[u8],
    options: &SpecReadOptions,
) -> Result<DataFrame, ReadError> {
    let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes))?;

    let l_sheet_names = workbook.sheet_names();
    let c_sheet_name = match &options.sheet_name {
        Some(name) => {
            if !l_sheet_names.iter().any(|c_name| c_name == name) {
                return Err(ReadError::SheetNotFound(name.clone()));
            }
            name.clone()
        }
        None => l_sheet_names.first().cloned().ok_or(ReadError::NoSheets)?,
    };

    let range = workbook.worksheet_range(&c_sheet_name)?;
    let mut iter_rows = range.rows();
    let Some(l_header_cells) = iter_rows.next() else {
        debug!(sheet = %c_sheet_name, "sheet is empty");
        return Ok(DataFrame::empty());
    };

    let l_raw_headers: Vec<String> = l_header_cells
        .iter()
        .map(|cell| derive_source_cell(cell).to_text().unwrap_or_default())
        .collect();
    let l_colnames = derive_unique_column_names(&l_raw_headers);

    let mut l_cells_by_col: Vec<Vec<EnumSourceCell>> = vec![Vec::new(); l_colnames.len()];
    for l_row in iter_rows {
        for (n_idx_col, l_col_cells) in l_cells_by_col.iter_mut().enumerate() {
            let cell = l_row
                .get(n_idx_col)
                .map_or(EnumSourceCell::Empty, derive_source_cell);
            l_col_cells.push(cell);
        }
    }

    let l_columns: Vec<Column> = l_colnames
        .iter()
        .zip(&l_cells_by_col)
        .map(|(c_name, l_cells)| derive_typed_column(c_name, l_cells))
        .collect();

    let df = DataFrame::new(l_columns)?;
    debug!(
        sheet = %c_sheet_name,
        height = df.height(),
        width = df.width(),
        "workbook parsed"
    );
    Ok(df)
}

/// Read a polars IPC payload into a dataframe.
pub fn read_dataframe_from_ipc_bytes(bytes: &[u8]) -> Result<DataFrame, ReadError> {
    IpcReader::new(Cursor::new(bytes))
        .finish()
        .map_err(|err| ReadError::Ipc(err.to_string()))
}

fn derive_source_cell(cell: &Data) -> EnumSourceCell {
    match cell {
        Data::Empty => EnumSourceCell::Empty,
        Data::Int(n) => EnumSourceCell::Number(*n as f64),
        Data::Float(n) => EnumSourceCell::Number(*n),
        Data::Bool(b) => EnumSourceCell::Boolean(*b),
        Data::String(s) => {
            if s.is_empty() {
                EnumSourceCell::Empty
            } else {
                EnumSourceCell::Text(s.clone())
            }
        }
        Data::DateTime(_) => match cell.as_datetime() {
            Some(dt) => EnumSourceCell::Text(dt.to_string()),
            None => EnumSourceCell::Text(cell.to_string()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => EnumSourceCell::Text(s.clone()),
        Data::Error(err) => EnumSourceCell::Text(err.to_string()),
    }
}

/// Pick the narrowest column type that holds every non-empty cell.
fn derive_typed_column(name: &str, cells: &[EnumSourceCell]) -> Column {
    let l_non_empty: Vec<&EnumSourceCell> = cells
        .iter()
        .filter(|cell| !matches!(cell, EnumSourceCell::Empty))
        .collect();
    let if_has_empty = l_non_empty.len() < cells.len();

    if !l_non_empty.is_empty()
        && l_non_empty
            .iter()
            .all(|cell| matches!(cell, EnumSourceCell::Number(_)))
    {
        let if_all_integral = l_non_empty.iter().all(|cell| match cell {
            EnumSourceCell::Number(n) => {
                n.is_finite() && n.fract() == 0.0 && n.abs() <= N_I64_EXACT_MAX
            }
            _ => false,
        });

        if if_all_integral && !if_has_empty {
            let l_values: Vec<i64> = cells
                .iter()
                .map(|cell| match cell {
                    EnumSourceCell::Number(n) => *n as i64,
                    _ => 0,
                })
                .collect();
            return Column::new(name.into(), l_values);
        }

        let l_values: Vec<Option<f64>> = cells
            .iter()
            .map(|cell| match cell {
                EnumSourceCell::Number(n) => Some(*n),
                _ => None,
            })
            .collect();
        return Column::new(name.into(), l_values);
    }

    if !l_non_empty.is_empty()
        && l_non_empty
            .iter()
            .all(|cell| matches!(cell, EnumSourceCell::Boolean(_)))
    {
        let l_values: Vec<Option<bool>> = cells
            .iter()
            .map(|cell| match cell {
                EnumSourceCell::Boolean(b) => Some(*b),
                _ => None,
            })
            .collect();
        return Column::new(name.into(), l_values);
    }

    let l_values: Vec<Option<String>> = cells.iter().map(EnumSourceCell::to_text).collect();
    Column::new(name.into(), l_values)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region RecordConversion

/// Convert every dataframe row into a [`SpecRecord`], in row order.
pub fn derive_records_from_dataframe(df: &DataFrame) -> Result<Vec<SpecRecord>, ReadError> {
    let l_colnames: Vec<String> = df
        .get_column_names_str()
        .into_iter()
        .map(ToString::to_string)
        .collect();
    let l_cols = df.get_columns();

    let mut l_records = Vec::with_capacity(df.height());
    for n_idx_row in 0..df.height() {
        let mut l_fields = Vec::with_capacity(l_cols.len());
        for (c_name, col) in l_colnames.iter().zip(l_cols) {
            let value = col.get(n_idx_row)?;
            l_fields.push((c_name.clone(), derive_cell_value_from_any_value(value)));
        }
        l_records.push(SpecRecord::new(n_idx_row, l_fields));
    }

    Ok(l_records)
}

fn derive_cell_value_from_any_value(value: AnyValue<'_>) -> EnumCellValue {
    match value {
        AnyValue::Null => EnumCellValue::None,
        AnyValue::String(val) => EnumCellValue::String(val.to_string()),
        AnyValue::StringOwned(val) => EnumCellValue::String(val.to_string()),
        AnyValue::Boolean(val) => EnumCellValue::String(derive_bool_text(val).to_string()),
        AnyValue::UInt8(val) => EnumCellValue::Number(val as f64),
        AnyValue::UInt16(val) => EnumCellValue::Number(val as f64),
        AnyValue::UInt32(val) => EnumCellValue::Number(val as f64),
        AnyValue::UInt64(val) => EnumCellValue::Number(val as f64),
        AnyValue::Int8(val) => EnumCellValue::Number(val as f64),
        AnyValue::Int16(val) => EnumCellValue::Number(val as f64),
        AnyValue::Int32(val) => EnumCellValue::Number(val as f64),
        AnyValue::Int64(val) => EnumCellValue::Number(val as f64),
        AnyValue::Float32(val) => EnumCellValue::Number(val as f64),
        AnyValue::Float64(val) => EnumCellValue::Number(val),
        _ => EnumCellValue::String(value.to_string()),
    }
}

fn derive_bool_text(value: bool) -> &'static str {
    if value { "True" } else { "False" }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Preview

/// First `n_rows` rows of `df`, for display before generation.
pub fn preview_dataframe(df: &DataFrame, n_rows: usize) -> DataFrame {
    df.head(Some(n_rows))
}

/// Column names plus the first `n_rows` rows rendered as display text.
pub fn derive_preview_grid(
    df: &DataFrame,
    n_rows: usize,
) -> Result<(Vec<String>, Vec<Vec<String>>), ReadError> {
    let df_head = preview_dataframe(df, n_rows);
    let l_colnames: Vec<String> = df_head
        .get_column_names_str()
        .into_iter()
        .map(ToString::to_string)
        .collect();

    let l_rows = derive_records_from_dataframe(&df_head)?
        .into_iter()
        .map(|record| {
            record
                .fields
                .iter()
                .map(|(_, value)| convert_cell_value_to_text(value))
                .collect()
        })
        .collect();

    Ok((l_colnames, l_rows))
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
