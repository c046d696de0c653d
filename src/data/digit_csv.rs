//! Reader for the digit CSV: one row per image, the class label in the first
//! column followed by 784 row-major pixel intensities.
//!
//! - Optional header row, auto-detected: the first non-blank record is a
//!   header if any of its cells is non-numeric
//! - Blank lines and a leading byte-order mark are ignored
//! - Cells may be quoted and padded with whitespace
use std::io::Read;

use csv::{ReaderBuilder, Trim};

use crate::error::{Error, Result};
use crate::data::{IMAGE_PIXELS, NUM_CLASSES};

const BOM: char = '\u{feff}';

/// Parsed rows, flattened: `pixels[i * 784..(i + 1) * 784]` belongs to `labels[i]`.
#[derive(Debug, Clone, Default)]
pub struct RawDigits {
    pub labels: Vec<u8>,
    pub pixels: Vec<u8>,
}

impl RawDigits {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

pub fn parse_digit_csv<R: Read>(reader: R) -> Result<RawDigits> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);

    let mut digits = RawDigits::default();
    let mut first = true;
    for record in reader.records() {
        let record = record.map_err(csv_error)?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let line_no = record.position().map_or(0, |p| p.line());
        let cells: Vec<&str> = record.iter()
            .enumerate()
            .map(|(i, cell)| if i == 0 { cell.trim_start_matches(BOM).trim() } else { cell })
            .collect();

        if std::mem::take(&mut first) && is_header(&cells) {
            continue;
        }
        parse_row(&cells, line_no, &mut digits)?;
    }

    if digits.is_empty() {
        return Err(Error::InvalidData("CSV contains no data rows".into()));
    }
    Ok(digits)
}

fn parse_row(cells: &[&str], line_no: u64, digits: &mut RawDigits) -> Result<()> {
    if cells.len() != IMAGE_PIXELS + 1 {
        return Err(Error::InvalidData(format!(
            "line {}: expected {} columns (label + {} pixels), got {}",
            line_no, IMAGE_PIXELS + 1, IMAGE_PIXELS, cells.len()
        )));
    }

    let label = cells[0].parse::<u8>().ok()
        .filter(|&l| (l as usize) < NUM_CLASSES)
        .ok_or_else(|| Error::InvalidData(format!(
            "line {}: label '{}' is not a digit 0-9", line_no, cells[0]
        )))?;

    let start = digits.pixels.len();
    for (col, cell) in cells[1..].iter().enumerate() {
        match cell.parse::<u8>() {
            Ok(p) => digits.pixels.push(p),
            Err(_) => {
                digits.pixels.truncate(start);
                return Err(Error::InvalidData(format!(
                    "line {}: pixel {} value '{}' is not an integer in 0-255",
                    line_no, col, cell
                )));
            }
        }
    }
    digits.labels.push(label);
    Ok(())
}

fn is_header(cells: &[&str]) -> bool {
    cells.iter().any(|cell| !cell.is_empty() && cell.parse::<f64>().is_err())
}

fn csv_error(e: csv::Error) -> Error {
    let message = e.to_string();
    match e.into_kind() {
        csv::ErrorKind::Io(io) => Error::Io(io),
        _ => Error::InvalidData(message),
    }
}
