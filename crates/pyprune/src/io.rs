//! Safe file reading and writing: permission checks up front, encoding
//! cookie and BOM handling, and newline preservation on write-back.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::PypruneError;

pub const CRLF: &str = "\r\n";
pub const LF: &str = "\n";

const FORM_FEED: char = '\x0c';
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// PEP 263 encoding declaration, significant on the first two lines only.
static ENCODING_COOKIE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"coding[:=]\s*([-_.\w]+)").expect("cookie pattern is valid"));

/// Encodings the rewriter can round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEncoding {
    Utf8 { bom: bool },
    Latin1,
}

/// Read a source file, returning its decoded content (newlines normalized
/// to `\n`), detected encoding, and original newline convention.
pub fn safe_read(
    path: &Path,
    check_write: bool,
) -> Result<(String, SourceEncoding, String), PypruneError> {
    if path
        .file_name()
        .is_some_and(|name| name == "__init__.py")
        && !path.exists()
    {
        return Err(PypruneError::InitFileDoesNotExist {
            path: path.to_path_buf(),
        });
    }

    let bytes = fs::read(path).map_err(|err| match err.kind() {
        ErrorKind::PermissionDenied => PypruneError::ReadPermission {
            path: path.to_path_buf(),
        },
        _ => PypruneError::UnparsableFile {
            path: path.to_path_buf(),
            line: None,
            column: None,
            reason: format!("OSError: {err}"),
            text: None,
        },
    })?;

    if check_write {
        let readonly = fs::metadata(path)
            .map(|meta| meta.permissions().readonly())
            .unwrap_or(false);
        if readonly {
            return Err(PypruneError::WritePermission {
                path: path.to_path_buf(),
            });
        }
    }

    let (body, has_bom) = match bytes.strip_prefix(UTF8_BOM) {
        Some(rest) => (rest, true),
        None => (bytes.as_slice(), false),
    };

    let encoding = match detect_cookie(body) {
        Some(name) => match name.as_str() {
            "utf-8" | "utf8" | "ascii" | "us-ascii" => SourceEncoding::Utf8 { bom: has_bom },
            "latin-1" | "latin1" | "iso-8859-1" => {
                if has_bom {
                    // A BOM pins the file to UTF-8; a disagreeing cookie
                    // makes the file unreadable, same as the interpreter.
                    return Err(unparsable(
                        path,
                        format!("SyntaxError: encoding declaration '{name}' conflicts with UTF-8 byte-order mark"),
                    ));
                }
                SourceEncoding::Latin1
            }
            other => {
                return Err(unparsable(
                    path,
                    format!("SyntaxError: unsupported encoding declaration '{other}'"),
                ));
            }
        },
        None => SourceEncoding::Utf8 { bom: has_bom },
    };

    let content = match encoding {
        SourceEncoding::Utf8 { .. } => String::from_utf8(body.to_vec()).map_err(|err| {
            unparsable(
                path,
                format!(
                    "UnicodeDecodeError: invalid byte in position {}",
                    err.utf8_error().valid_up_to()
                ),
            )
        })?,
        SourceEncoding::Latin1 => body.iter().map(|&byte| byte as char).collect(),
    };

    if content.contains(FORM_FEED) {
        return Err(unparsable(
            path,
            "ValueError: file contains a form feed character (\\f)".to_string(),
        ));
    }

    let newline = if content
        .split_once('\n')
        .is_some_and(|(first, _)| first.ends_with('\r'))
    {
        CRLF.to_string()
    } else {
        LF.to_string()
    };

    Ok((content.replace(CRLF, LF), encoding, newline))
}

/// Write fixed content back with the file's original encoding and newline.
pub fn safe_write(
    path: &Path,
    content: &str,
    encoding: SourceEncoding,
    newline: &str,
) -> Result<(), PypruneError> {
    let text = if newline == CRLF {
        content.replace(LF, CRLF)
    } else {
        content.to_string()
    };

    let mut bytes: Vec<u8> = Vec::with_capacity(text.len() + UTF8_BOM.len());
    match encoding {
        SourceEncoding::Utf8 { bom } => {
            if bom {
                bytes.extend_from_slice(UTF8_BOM);
            }
            bytes.extend_from_slice(text.as_bytes());
        }
        SourceEncoding::Latin1 => {
            bytes.extend(text.chars().map(|ch| if (ch as u32) < 256 { ch as u8 } else { b'?' }));
        }
    }

    fs::write(path, bytes).map_err(|err| match err.kind() {
        ErrorKind::PermissionDenied => PypruneError::WritePermission {
            path: path.to_path_buf(),
        },
        _ => PypruneError::UnparsableFile {
            path: path.to_path_buf(),
            line: None,
            column: None,
            reason: format!("OSError: {err}"),
            text: None,
        },
    })
}

fn unparsable(path: &Path, reason: String) -> PypruneError {
    PypruneError::UnparsableFile {
        path: path.to_path_buf(),
        line: None,
        column: None,
        reason,
        text: None,
    }
}

/// Look for a PEP 263 cookie on the first two lines, normalized to
/// lowercase with underscores mapped to dashes.
fn detect_cookie(body: &[u8]) -> Option<String> {
    let head_len = body
        .iter()
        .enumerate()
        .filter(|&(_, &byte)| byte == b'\n')
        .map(|(offset, _)| offset + 1)
        .nth(1)
        .unwrap_or(body.len());
    let head = String::from_utf8_lossy(&body[..head_len]);
    for line in head.lines() {
        // Only comment lines can carry the declaration.
        if !line.trim_start().starts_with('#') {
            continue;
        }
        if let Some(captures) = ENCODING_COOKIE.captures(line) {
            return Some(captures[1].to_lowercase().replace('_', "-"));
        }
    }
    None
}
