//! Materialized query results.

use std::fmt;

use serde::Serialize;

/// One cell of a result row, mirroring SQLite's storage classes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl CellValue {
    /// Text content if this cell holds text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => write!(f, "NULL"),
            CellValue::Integer(n) => write!(f, "{}", n),
            CellValue::Real(x) => {
                // Keep a visible fractional part so 3.0 doesn't read as an integer
                if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e16 {
                    write!(f, "{:.1}", x)
                } else {
                    write!(f, "{}", x)
                }
            }
            CellValue::Text(s) => write!(f, "{}", s),
            CellValue::Blob(bytes) => {
                write!(f, "x'")?;
                for b in bytes {
                    write!(f, "{:02X}", b)?;
                }
                write!(f, "'")
            }
        }
    }
}

impl From<i64> for CellValue {
    fn from(n: i64) -> Self {
        CellValue::Integer(n)
    }
}

impl From<i32> for CellValue {
    fn from(n: i32) -> Self {
        CellValue::Integer(n.into())
    }
}

impl From<f64> for CellValue {
    fn from(x: f64) -> Self {
        CellValue::Real(x)
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(CellValue::Null)
    }
}

pub type Row = Vec<CellValue>;

/// A row whose arity doesn't match the column list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeError {
    pub row: usize,
    pub expected: usize,
    pub found: usize,
}

impl fmt::Display for ShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "row {} has {} cell(s), expected {}",
            self.row, self.found, self.expected
        )
    }
}

impl std::error::Error for ShapeError {}

/// Columns plus rows of one query. Every row has exactly `columns.len()` cells.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultSet {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Result<Self, ShapeError> {
        if let Some((i, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != columns.len())
        {
            return Err(ShapeError {
                row: i,
                expected: columns.len(),
                found: row.len(),
            });
        }
        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows `[offset, offset + count)`, clipped to the end of the set.
    pub fn window(&self, offset: usize, count: usize) -> &[Row] {
        let start = offset.min(self.rows.len());
        let end = start.saturating_add(count).min(self.rows.len());
        &self.rows[start..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn arity_mismatch_rejected() {
        let err = ResultSet::new(
            cols(&["a", "b"]),
            vec![vec![1.into(), 2.into()], vec![3.into()]],
        )
        .unwrap_err();
        assert_eq!(err, ShapeError { row: 1, expected: 2, found: 1 });
        assert_eq!(err.to_string(), "row 1 has 1 cell(s), expected 2");
    }

    #[test]
    fn window_clips() {
        let rows: Vec<Row> = (0..5).map(|i| vec![CellValue::Integer(i)]).collect();
        let rs = ResultSet::new(cols(&["n"]), rows).unwrap();
        assert_eq!(rs.window(0, 2).len(), 2);
        assert_eq!(rs.window(4, 10).len(), 1);
        assert_eq!(rs.window(9, 10).len(), 0);
        assert_eq!(rs.window(3, usize::MAX).len(), 2);
    }

    #[test]
    fn display_values() {
        assert_eq!(CellValue::Null.to_string(), "NULL");
        assert_eq!(CellValue::Integer(-4).to_string(), "-4");
        assert_eq!(CellValue::Real(3.0).to_string(), "3.0");
        assert_eq!(CellValue::Real(2.5).to_string(), "2.5");
        assert_eq!(CellValue::Text("🦇".into()).to_string(), "🦇");
        assert_eq!(CellValue::Blob(vec![0x01, 0xAB]).to_string(), "x'01AB'");
        assert_eq!(CellValue::from(None::<i64>), CellValue::Null);
    }

    #[test]
    fn serializes_untagged() {
        let rs = ResultSet::new(
            cols(&["id", "emoji"]),
            vec![vec![1.into(), "🦇".into()], vec![2.into(), CellValue::Null]],
        )
        .unwrap();
        let json = serde_json::to_string(&rs).unwrap();
        assert_eq!(json, r#"{"columns":["id","emoji"],"rows":[[1,"🦇"],[2,null]]}"#);
    }
}
