//! Part header parsing.
//!
//! A part's header block is a run of `Name: Value` lines terminated by an
//! empty line. Only `Content-Disposition` is interpreted; every other header
//! is kept verbatim under its lower-cased name.

use std::collections::HashMap;

use crate::error::DecodeError;
use crate::part::PartHeader;

/// RFC 2046 limits boundaries to 70 characters.
pub const MAX_BOUNDARY_LEN: usize = 70;

/// Check a boundary token against the RFC 2046 `bchars` grammar.
pub fn validate_boundary(boundary: &str) -> Result<(), &'static str> {
    if boundary.is_empty() {
        return Err("boundary is empty");
    }
    if boundary.len() > MAX_BOUNDARY_LEN {
        return Err("boundary is longer than 70 characters");
    }
    if boundary.ends_with(' ') {
        return Err("boundary ends with a space");
    }
    if !boundary.bytes().all(is_bchar) {
        return Err("boundary contains a character outside the RFC 2046 set");
    }
    Ok(())
}

fn is_bchar(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(
            b,
            b'\'' | b'(' | b')' | b'+' | b'_' | b',' | b'-' | b'.' | b'/' | b':' | b'=' | b'?'
                | b' '
        )
}

fn is_token_char(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(
            b,
            b'!' | b'#'
                | b'$'
                | b'%'
                | b'&'
                | b'\''
                | b'*'
                | b'+'
                | b'-'
                | b'.'
                | b'^'
                | b'_'
                | b'`'
                | b'|'
                | b'~'
        )
}

/// Parse a header block (without its terminating empty line) into a
/// [`PartHeader`].
pub(crate) fn parse_part_header(block: &[u8], part_index: usize) -> Result<PartHeader, DecodeError> {
    let text = std::str::from_utf8(block)
        .map_err(|_| DecodeError::headers(part_index, "header block is not valid UTF-8"))?;

    let mut headers: HashMap<String, String> = HashMap::new();
    let mut last: Option<String> = None;

    for line in text.split("\r\n") {
        if line.is_empty() {
            continue;
        }

        // Obsolete line folding: continuation of the previous header.
        if line.starts_with([' ', '\t']) {
            let Some(prev) = last.as_ref().and_then(|name| headers.get_mut(name)) else {
                return Err(DecodeError::headers(
                    part_index,
                    "continuation line before any header",
                ));
            };
            prev.push(' ');
            prev.push_str(line.trim());
            continue;
        }

        let Some((name, value)) = line.split_once(':') else {
            return Err(DecodeError::headers(
                part_index,
                format!("header line without colon: {line:?}"),
            ));
        };
        if name.is_empty() || !name.bytes().all(is_token_char) {
            return Err(DecodeError::headers(
                part_index,
                format!("invalid header name: {name:?}"),
            ));
        }

        let name = name.to_ascii_lowercase();
        headers.insert(name.clone(), value.trim().to_string());
        last = Some(name);
    }

    let disposition = headers
        .get("content-disposition")
        .ok_or_else(|| DecodeError::headers(part_index, "missing Content-Disposition header"))?;
    let (name, filename) = parse_content_disposition(disposition)
        .map_err(|detail| DecodeError::headers(part_index, detail))?;
    let content_type = headers.get("content-type").cloned();

    Ok(PartHeader::new(name, filename, content_type, headers))
}

/// Parse a `Content-Disposition` value.
///
/// Format: `form-data; name="field"; filename="file.txt"`. An RFC 5987
/// `filename*` parameter takes precedence over `filename`.
pub(crate) fn parse_content_disposition(
    value: &str,
) -> Result<(String, Option<String>), String> {
    let params = split_params(value);
    let mut iter = params.into_iter();

    let disposition = iter.next().unwrap_or_default();
    if !disposition.trim().eq_ignore_ascii_case("form-data") {
        return Err(format!(
            "expected form-data disposition, got {:?}",
            disposition.trim()
        ));
    }

    let mut name = None;
    let mut filename = None;
    let mut filename_ext = None;

    for param in iter {
        let Some((key, raw)) = param.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let raw = raw.trim();
        if key.eq_ignore_ascii_case("name") {
            name = Some(unquote(raw)?);
        } else if key.eq_ignore_ascii_case("filename") {
            filename = Some(unquote(raw)?);
        } else if key.eq_ignore_ascii_case("filename*") {
            filename_ext = Some(decode_ext_value(raw)?);
        }
    }

    let name = name.ok_or_else(|| "missing name parameter".to_string())?;
    let filename = filename_ext.or(filename);
    if filename.as_deref().is_some_and(|f| f.contains('\0')) {
        return Err("filename contains a NUL byte".to_string());
    }

    Ok((name, filename))
}

/// Split on `;` outside of quoted strings.
fn split_params(value: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;

    for (i, c) in value.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                out.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(&value[start..]);
    out
}

fn unquote(raw: &str) -> Result<String, String> {
    let Some(inner) = raw.strip_prefix('"') else {
        return Ok(raw.to_string());
    };
    let Some(inner) = inner.strip_suffix('"') else {
        return Err(format!("unterminated quoted string: {raw}"));
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    Ok(out)
}

/// Decode an RFC 5987 `ext-value` such as `UTF-8''na%C3%AFve.txt`.
fn decode_ext_value(raw: &str) -> Result<String, String> {
    let raw = unquote(raw)?;
    let mut pieces = raw.splitn(3, '\'');
    let charset = pieces.next().unwrap_or_default();
    let _language = pieces.next();
    let Some(encoded) = pieces.next() else {
        return Err(format!("malformed filename* value: {raw}"));
    };

    if !charset.eq_ignore_ascii_case("utf-8") && !charset.eq_ignore_ascii_case("iso-8859-1") {
        return Err(format!("unsupported filename* charset: {charset}"));
    }

    let bytes = percent_decode(encoded)?;
    if charset.eq_ignore_ascii_case("utf-8") {
        String::from_utf8(bytes).map_err(|_| "filename* is not valid UTF-8".to_string())
    } else {
        Ok(bytes.into_iter().map(char::from).collect())
    }
}

fn percent_decode(s: &str) -> Result<Vec<u8>, String> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes
                .get(i + 1..i + 3)
                .filter(|h| h.iter().all(u8::is_ascii_hexdigit))
                .and_then(|h| std::str::from_utf8(h).ok())
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .ok_or_else(|| format!("bad percent escape in {s}"))?;
            out.push(hex);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_validation() {
        assert!(validate_boundary("XYZ").is_ok());
        assert!(validate_boundary("----WebKitFormBoundary7MA4YWxkTrZu0gW").is_ok());
        assert!(validate_boundary("a b").is_ok());
        assert!(validate_boundary("").is_err());
        assert!(validate_boundary("trailing ").is_err());
        assert!(validate_boundary("semi;colon").is_err());
        assert!(validate_boundary(&"a".repeat(MAX_BOUNDARY_LEN)).is_ok());
        assert!(validate_boundary(&"a".repeat(MAX_BOUNDARY_LEN + 1)).is_err());
    }

    #[test]
    fn content_disposition_field() {
        let (name, filename) = parse_content_disposition("form-data; name=\"title\"").unwrap();
        assert_eq!(name, "title");
        assert_eq!(filename, None);
    }

    #[test]
    fn content_disposition_case_insensitive_params() {
        let (name, filename) =
            parse_content_disposition("Form-Data; Name=\"field\"; FileName=\"upload.txt\"")
                .expect("content disposition should parse");
        assert_eq!(name, "field");
        assert_eq!(filename.as_deref(), Some("upload.txt"));
    }

    #[test]
    fn content_disposition_quoted_semicolon_and_escapes() {
        let (_, filename) = parse_content_disposition(
            r#"form-data; name="doc"; filename="a;b \"quoted\".txt""#,
        )
        .unwrap();
        assert_eq!(filename.as_deref(), Some("a;b \"quoted\".txt"));
    }

    #[test]
    fn content_disposition_empty_filename_is_still_a_file() {
        let (_, filename) =
            parse_content_disposition("form-data; name=\"f\"; filename=\"\"").unwrap();
        assert_eq!(filename.as_deref(), Some(""));
    }

    #[test]
    fn content_disposition_extended_filename_wins() {
        let (_, filename) = parse_content_disposition(
            "form-data; name=\"f\"; filename=\"naive.txt\"; filename*=UTF-8''na%C3%AFve.txt",
        )
        .unwrap();
        assert_eq!(filename.as_deref(), Some("na\u{ef}ve.txt"));
    }

    #[test]
    fn percent_escapes_need_two_hex_digits() {
        assert_eq!(percent_decode("a%41%7e").unwrap(), b"aA~".to_vec());
        assert!(percent_decode("a%+1b").is_err());
        assert!(percent_decode("%4").is_err());
        assert!(percent_decode("% a").is_err());
    }

    #[test]
    fn content_disposition_errors() {
        assert!(parse_content_disposition("attachment; name=\"x\"").is_err());
        assert!(parse_content_disposition("form-data; filename=\"x\"").is_err());
        assert!(parse_content_disposition("form-data; name=\"x").is_err());
        assert!(parse_content_disposition("form-data; name=x; filename*=UTF-8''%zz").is_err());
        assert!(parse_content_disposition("form-data; name=x; filename*=UTF-8''a%+1b").is_err());
        assert!(parse_content_disposition("form-data; name=x; filename*=UTF-8''a%-1b").is_err());
    }

    #[test]
    fn header_block_parses_known_and_extra_headers() {
        let block = b"Content-Disposition: form-data; name=\"file\"; filename=\"a.txt\"\r\n\
Content-Type: text/plain\r\n\
X-Checksum:  abc123 ";
        let header = parse_part_header(block, 0).unwrap();
        assert_eq!(header.name(), "file");
        assert_eq!(header.filename(), Some("a.txt"));
        assert_eq!(header.content_type(), Some("text/plain"));
        assert_eq!(header.get("x-checksum"), Some("abc123"));
        assert_eq!(header.get("X-CHECKSUM"), Some("abc123"));
    }

    #[test]
    fn header_block_joins_folded_lines() {
        let block = b"Content-Disposition: form-data;\r\n name=\"folded\"";
        let header = parse_part_header(block, 0).unwrap();
        assert_eq!(header.name(), "folded");
    }

    #[test]
    fn header_block_errors_name_the_part() {
        let err = parse_part_header(b"no colon here", 4).unwrap_err();
        assert!(matches!(err, DecodeError::MalformedHeaders { part_index: 4, .. }));

        let err = parse_part_header(b"Content-Type: text/plain", 1).unwrap_err();
        match err {
            DecodeError::MalformedHeaders { part_index, detail } => {
                assert_eq!(part_index, 1);
                assert!(detail.contains("Content-Disposition"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = parse_part_header(b"Bad Name: x", 0).unwrap_err();
        assert!(matches!(err, DecodeError::MalformedHeaders { .. }));

        let err = parse_part_header(b" leading fold", 0).unwrap_err();
        assert!(matches!(err, DecodeError::MalformedHeaders { .. }));

        let err = parse_part_header(&[0xff, 0xfe, b':', b' ', b'x'], 2).unwrap_err();
        assert!(matches!(err, DecodeError::MalformedHeaders { part_index: 2, .. }));
    }
}
