//! Just enough `multipart/form-data` parsing to pull an uploaded file out of a
//! buffered request body.

/// One file part of a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    /// Form field the file was sent under.
    pub field: Option<String>,
    pub filename: Option<String>,
    pub data: Vec<u8>,
}

/// Returns the index of the first occurrence of `needle` in `haystack`.
pub fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Splits `haystack` on every occurrence of `needle`, returning the pieces
/// between occurrences (excluding the needle itself).
pub fn split_on<'a>(haystack: &'a [u8], needle: &[u8]) -> Vec<&'a [u8]> {
    let mut result = Vec::new();
    let mut start = 0;
    while start <= haystack.len() {
        if let Some(pos) = find_subsequence(&haystack[start..], needle) {
            result.push(&haystack[start..start + pos]);
            start += pos + needle.len();
        } else {
            result.push(&haystack[start..]);
            break;
        }
    }
    result
}

/// Extracts the boundary token from a Content-Type header value like
/// `multipart/form-data; boundary=----WebKitFormBoundaryXXX`.
pub fn extract_boundary(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .map(|s| s.trim())
        .find(|s| s.starts_with("boundary="))
        .map(|s| s["boundary=".len()..].trim_matches('"').to_owned())
        .filter(|b| !b.is_empty())
}

/// Every file part of the body, in order.
pub fn file_parts(body: &[u8], boundary: &str) -> Vec<FilePart> {
    let delimiter = format!("--{}", boundary);
    let sep = b"\r\n\r\n";
    let mut files = Vec::new();

    for part in split_on(body, delimiter.as_bytes()) {
        let Some(sep_pos) = find_subsequence(part, sep) else { continue };
        let headers = String::from_utf8_lossy(&part[..sep_pos]);
        let Some(disposition) = headers.lines()
            .find(|l| l.to_ascii_lowercase().starts_with("content-disposition:"))
        else {
            continue;
        };

        let filename = disposition_param(disposition, "filename");
        if filename.is_none() {
            continue;
        }
        let raw = &part[sep_pos + sep.len()..];
        files.push(FilePart {
            field: disposition_param(disposition, "name"),
            filename,
            data: raw.strip_suffix(b"\r\n").unwrap_or(raw).to_vec(),
        });
    }
    files
}

/// The part uploaded under `field`, or the first file part if none matches.
pub fn extract_file(body: &[u8], boundary: &str, field: &str) -> Option<FilePart> {
    let mut files = file_parts(body, boundary);
    let pos = files.iter().position(|f| f.field.as_deref() == Some(field)).unwrap_or(0);
    if files.is_empty() {
        None
    } else {
        Some(files.swap_remove(pos))
    }
}

/// Reads `key="value"` (or an unquoted `key=value`) from a
/// `Content-Disposition` header line.
fn disposition_param(disposition: &str, key: &str) -> Option<String> {
    disposition.split(';').skip(1).find_map(|param| {
        let (k, v) = param.trim().split_once('=')?;
        if k.trim().eq_ignore_ascii_case(key) {
            Some(v.trim().trim_matches('"').to_owned())
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(parts: &[(&str, &[u8])]) -> Vec<u8> {
        let mut out = Vec::new();
        for (headers, data) in parts {
            out.extend_from_slice(b"--XyZ\r\n");
            out.extend_from_slice(headers.as_bytes());
            out.extend_from_slice(b"\r\n\r\n");
            out.extend_from_slice(data);
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"--XyZ--\r\n");
        out
    }

    #[test]
    fn boundary_from_content_type() {
        assert_eq!(
            extract_boundary("multipart/form-data; boundary=----WebKitFormBoundary7MA4").as_deref(),
            Some("----WebKitFormBoundary7MA4")
        );
        assert_eq!(extract_boundary("multipart/form-data; boundary=\"abc\"").as_deref(), Some("abc"));
        assert_eq!(extract_boundary("application/json"), None);
    }

    #[test]
    fn picks_named_file_and_keeps_binary_payload() {
        let payload: &[u8] = &[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x00, 0xff];
        let b = body(&[
            ("Content-Disposition: form-data; name=\"note\"", b"hi"),
            ("Content-Disposition: form-data; name=\"other\"; filename=\"a.bin\"", b"zz"),
            ("Content-Disposition: form-data; name=\"file\"; filename=\"seven.png\"\r\nContent-Type: image/png", payload),
        ]);

        let part = extract_file(&b, "XyZ", "file").unwrap();
        assert_eq!(part.filename.as_deref(), Some("seven.png"));
        assert_eq!(part.data, payload);
    }

    #[test]
    fn falls_back_to_first_file() {
        let b = body(&[("Content-Disposition: form-data; name=\"upload\"; filename=\"x.png\"", b"data")]);
        let part = extract_file(&b, "XyZ", "file").unwrap();
        assert_eq!(part.field.as_deref(), Some("upload"));
        assert_eq!(part.data, b"data");
    }

    #[test]
    fn text_fields_are_not_files() {
        let b = body(&[("Content-Disposition: form-data; name=\"file\"", b"plain")]);
        assert_eq!(extract_file(&b, "XyZ", "file"), None);
    }
}
