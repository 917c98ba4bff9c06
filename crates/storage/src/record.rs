//! Row formatting

/// A record that can be written as one delimited row
pub trait DelimitedRecord {
    /// Column names, written once at the top of a new file
    fn header() -> &'static [&'static str];

    /// Cell values in header order. Empty strings become empty cells.
    fn fields(&self) -> Vec<String>;
}

/// Join cells with commas, quoting any cell that needs it
pub fn format_row<S: AsRef<str>>(cells: &[S]) -> String {
    let mut row = String::new();
    for (i, cell) in cells.iter().enumerate() {
        if i > 0 {
            row.push(',');
        }
        let cell = cell.as_ref();
        if cell.contains([',', '"', '\n', '\r']) {
            row.push('"');
            row.push_str(&cell.replace('"', "\"\""));
            row.push('"');
        } else {
            row.push_str(cell);
        }
    }
    row.push('\n');
    row
}
