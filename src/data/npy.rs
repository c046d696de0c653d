//! Minimal NumPy `.npy` codec.
//!
//! Writes format version 1.0 in C order. Reads versions 1.0, 2.0 and 3.0 with
//! the little-endian dtypes the pipeline produces or is likely to be handed.
//!
//! ```text
//! bytes 0-5:  \x93NUMPY
//! byte  6-7:  major, minor version
//! v1:         u16 LE header length    v2/v3: u32 LE header length
//! header:     Python dict literal, e.g.
//!             {'descr': '<f4', 'fortran_order': False, 'shape': (10, 28, 28, 1), }
//!             space padded and '\n' terminated to a multiple of 64 bytes
//! data:       raw little-endian values
//! ```
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::{Error, Result};

const MAGIC: &[u8; 6] = b"\x93NUMPY";
const ALIGN: usize = 64;

/// Element types understood by the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dtype {
    F32,
    F64,
    I64,
    I32,
    U8,
    I8,
}

impl Dtype {
    fn parse(descr: &str) -> Option<Dtype> {
        match descr {
            "<f4" => Some(Dtype::F32),
            "<f8" => Some(Dtype::F64),
            "<i8" => Some(Dtype::I64),
            "<i4" => Some(Dtype::I32),
            "|u1" | "<u1" => Some(Dtype::U8),
            "|i1" | "<i1" => Some(Dtype::I8),
            _ => None,
        }
    }

    fn descr(self) -> &'static str {
        match self {
            Dtype::F32 => "<f4",
            Dtype::F64 => "<f8",
            Dtype::I64 => "<i8",
            Dtype::I32 => "<i4",
            Dtype::U8 => "|u1",
            Dtype::I8 => "|i1",
        }
    }

    fn size(self) -> usize {
        match self {
            Dtype::F64 | Dtype::I64 => 8,
            Dtype::F32 | Dtype::I32 => 4,
            Dtype::U8 | Dtype::I8 => 1,
        }
    }
}

/// Shape and dtype of an array, as declared in its header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub dtype: Dtype,
    pub shape: Vec<usize>,
}

impl Header {
    pub fn element_count(&self) -> usize {
        self.shape.iter().product()
    }
}

fn malformed(what: impl std::fmt::Display) -> Error {
    Error::ShapeMismatch(format!("malformed .npy file: {}", what))
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

fn write_header<W: Write>(w: &mut W, header: &Header) -> Result<()> {
    let shape = match header.shape.as_slice() {
        [n] => format!("({},)", n),
        dims => format!("({})", dims.iter().map(usize::to_string).collect::<Vec<_>>().join(", ")),
    };
    let mut dict = format!(
        "{{'descr': '{}', 'fortran_order': False, 'shape': {}, }}",
        header.dtype.descr(),
        shape
    );
    // magic + version + u16 length + dict + '\n'
    let unpadded = MAGIC.len() + 2 + 2 + dict.len() + 1;
    dict.extend(std::iter::repeat(' ').take((ALIGN - unpadded % ALIGN) % ALIGN));
    dict.push('\n');

    let len = u16::try_from(dict.len()).map_err(|_| malformed("header too long for version 1.0"))?;
    w.write_all(MAGIC)?;
    w.write_all(&[1, 0])?;
    w.write_all(&len.to_le_bytes())?;
    w.write_all(dict.as_bytes())?;
    Ok(())
}

pub fn write_f32<W: Write>(w: &mut W, shape: &[usize], data: &[f32]) -> Result<()> {
    check_len(shape, data.len())?;
    write_header(w, &Header { dtype: Dtype::F32, shape: shape.to_vec() })?;
    for v in data {
        w.write_all(&v.to_le_bytes())?;
    }
    Ok(())
}

pub fn write_i64<W: Write>(w: &mut W, shape: &[usize], data: &[i64]) -> Result<()> {
    check_len(shape, data.len())?;
    write_header(w, &Header { dtype: Dtype::I64, shape: shape.to_vec() })?;
    for v in data {
        w.write_all(&v.to_le_bytes())?;
    }
    Ok(())
}

fn check_len(shape: &[usize], len: usize) -> Result<()> {
    let expected: usize = shape.iter().product();
    if expected != len {
        return Err(Error::ShapeMismatch(format!(
            "shape {:?} needs {} values, got {}", shape, expected, len
        )));
    }
    Ok(())
}

/// Writes an `<f4` array to `path`, replacing any existing file.
pub fn save_f32(path: &Path, shape: &[usize], data: &[f32]) -> Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    write_f32(&mut w, shape, data)?;
    w.flush()?;
    Ok(())
}

/// Writes an `<i8` array to `path`, replacing any existing file.
pub fn save_i64(path: &Path, shape: &[usize], data: &[i64]) -> Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    write_i64(&mut w, shape, data)?;
    w.flush()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

pub fn read_header<R: Read>(r: &mut R) -> Result<Header> {
    let mut prefix = [0u8; 8];
    r.read_exact(&mut prefix).map_err(|_| malformed("file shorter than magic string"))?;
    if &prefix[..6] != MAGIC {
        return Err(malformed("missing \\x93NUMPY magic"));
    }

    let header_len = match prefix[6] {
        1 => {
            let mut len = [0u8; 2];
            r.read_exact(&mut len).map_err(|_| malformed("truncated header length"))?;
            u16::from_le_bytes(len) as usize
        }
        2 | 3 => {
            let mut len = [0u8; 4];
            r.read_exact(&mut len).map_err(|_| malformed("truncated header length"))?;
            u32::from_le_bytes(len) as usize
        }
        v => return Err(malformed(format!("unsupported format version {}.{}", v, prefix[7]))),
    };

    let mut raw = vec![0u8; header_len];
    r.read_exact(&mut raw).map_err(|_| malformed("truncated header"))?;
    let dict = String::from_utf8(raw).map_err(|_| malformed("header is not text"))?;
    parse_dict(&dict)
}

/// Pulls `descr`, `fortran_order` and `shape` out of the header dict literal.
fn parse_dict(dict: &str) -> Result<Header> {
    let descr = dict_value(dict, "descr")?;
    let descr = descr.trim_matches(|c| c == '\'' || c == '"');
    let dtype = Dtype::parse(descr).ok_or_else(|| malformed(format!("unsupported dtype '{}'", descr)))?;

    match dict_value(dict, "fortran_order")? {
        "False" => {}
        "True" => return Err(malformed("Fortran-ordered arrays are not supported")),
        other => return Err(malformed(format!("bad fortran_order '{}'", other))),
    }

    let shape_src = dict_value(dict, "shape")?;
    let inner = shape_src.strip_prefix('(').and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| malformed(format!("bad shape '{}'", shape_src)))?;
    let shape = inner.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<usize>().map_err(|_| malformed(format!("bad dimension '{}'", s))))
        .collect::<Result<Vec<_>>>()?;

    Ok(Header { dtype, shape })
}

/// Raw text of the value stored under `key` in a flat dict literal.
fn dict_value<'a>(dict: &'a str, key: &str) -> Result<&'a str> {
    let needle = format!("'{}'", key);
    let start = dict.find(&needle).ok_or_else(|| malformed(format!("header lacks '{}'", key)))?;
    let rest = dict[start + needle.len()..].trim_start();
    let rest = rest.strip_prefix(':').ok_or_else(|| malformed(format!("no ':' after '{}'", key)))?.trim_start();

    // Tuples contain commas, so they end at the closing parenthesis.
    let end = if rest.starts_with('(') {
        rest.find(')').map(|i| i + 1)
    } else {
        rest.find(|c| c == ',' || c == '}')
    };
    let end = end.ok_or_else(|| malformed(format!("unterminated value for '{}'", key)))?;
    Ok(rest[..end].trim())
}

fn read_payload<R: Read>(r: &mut R, header: &Header) -> Result<Vec<u8>> {
    let bytes = header.element_count().checked_mul(header.dtype.size())
        .ok_or_else(|| malformed("array size overflows"))?;
    let mut payload = vec![0u8; bytes];
    r.read_exact(&mut payload).map_err(|_| {
        malformed(format!("expected {} data bytes for shape {:?}", bytes, header.shape))
    })?;
    Ok(payload)
}

/// Reads a floating point array (`<f4` or `<f8`) as `f32`.
pub fn read_f32<R: Read>(r: &mut R) -> Result<(Vec<usize>, Vec<f32>)> {
    let header = read_header(r)?;
    let payload = read_payload(r, &header)?;
    let data = match header.dtype {
        Dtype::F32 => payload.chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
        Dtype::F64 => payload.chunks_exact(8)
            .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f32)
            .collect(),
        other => return Err(malformed(format!("expected a float array, found {}", other.descr()))),
    };
    Ok((header.shape, data))
}

/// Reads an integer array (`<i8`, `<i4`, `|u1` or `|i1`) as `i64`.
pub fn read_i64<R: Read>(r: &mut R) -> Result<(Vec<usize>, Vec<i64>)> {
    let header = read_header(r)?;
    let payload = read_payload(r, &header)?;
    let data = match header.dtype {
        Dtype::I64 => payload.chunks_exact(8)
            .map(|b| i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
            .collect(),
        Dtype::I32 => payload.chunks_exact(4)
            .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as i64)
            .collect(),
        Dtype::U8 => payload.iter().map(|&b| b as i64).collect(),
        Dtype::I8 => payload.iter().map(|&b| b as i8 as i64).collect(),
        other => return Err(malformed(format!("expected an integer array, found {}", other.descr()))),
    };
    Ok((header.shape, data))
}

fn open(path: &Path) -> Result<BufReader<File>> {
    if !path.exists() {
        return Err(Error::missing(path));
    }
    Ok(BufReader::new(File::open(path)?))
}

pub fn load_f32(path: &Path) -> Result<(Vec<usize>, Vec<f32>)> {
    read_f32(&mut open(path)?)
}

pub fn load_i64(path: &Path) -> Result<(Vec<usize>, Vec<i64>)> {
    read_i64(&mut open(path)?)
}
