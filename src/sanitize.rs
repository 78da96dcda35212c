//! SQL normalization for trace labels.
//!
//! Replaces string and numeric literals with `?` so query text can be used
//! as a low-cardinality tracing label. This never touches the SQL that
//! goes on the wire -- it exists only so log and span fields do not leak
//! values or explode label cardinality.

/// Masks string and numeric literals in `sql` with `?`.
///
/// String literals honor `\'`, `\\`, and doubled-quote escapes; control
/// characters inside literals are passed over without complaint, matching
/// the permissive policy of the wire-side quoting. Numbers are masked only
/// where a literal can appear (not inside identifiers).
pub fn sanitize_sql(sql: &str) -> String {
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len());
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'\'' => {
                i += 1;
                while i < bytes.len() {
                    match bytes[i] {
                        b'\\' => i += 2,
                        b'\'' if bytes.get(i + 1) == Some(&b'\'') => i += 2,
                        b'\'' => {
                            i += 1;
                            break;
                        }
                        _ => i += 1,
                    }
                }
                out.push('?');
            }
            b'0'..=b'9' => {
                // A digit run is a literal only when it does not continue
                // an identifier.
                let prev = out.as_bytes().last().copied();
                let in_identifier = matches!(
                    prev,
                    Some(p) if p == b'_' || p.is_ascii_alphanumeric()
                );
                let start = i;
                i += 1;
                while i < bytes.len()
                    && (bytes[i].is_ascii_digit()
                        || bytes[i] == b'.'
                        || bytes[i] == b'e'
                        || bytes[i] == b'E'
                        || ((bytes[i] == b'+' || bytes[i] == b'-')
                            && matches!(bytes[i - 1], b'e' | b'E')))
                {
                    i += 1;
                }
                if in_identifier {
                    out.push_str(&sql[start..i]);
                } else {
                    out.push('?');
                }
            }
            _ => {
                // Copy the whole UTF-8 scalar, not just its leading byte.
                let width = utf8_width(b);
                out.push_str(&sql[i..i + width]);
                i += width;
            }
        }
    }
    out
}

fn utf8_width(leading: u8) -> usize {
    match leading {
        0x00..=0x7F => 1,
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        _ => 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masks_strings_and_numbers() {
        assert_eq!(
            sanitize_sql(
                "SELECT * FROM users WHERE name = 'Alice' AND age = 30"
            ),
            "SELECT * FROM users WHERE name = ? AND age = ?"
        );
    }

    #[test]
    fn test_identifiers_keep_digits() {
        assert_eq!(
            sanitize_sql("SELECT col1, t2.x FROM t2 WHERE col1 = 5"),
            "SELECT col1, t2.x FROM t2 WHERE col1 = ?"
        );
    }

    #[test]
    fn test_escaped_quotes() {
        assert_eq!(
            sanitize_sql(r"SELECT 'it\'s', 'a''b', 2.5e-3"),
            "SELECT ?, ?, ?"
        );
    }

    #[test]
    fn test_control_characters_tolerated() {
        assert_eq!(sanitize_sql("SELECT 'a\tb\nc'"), "SELECT ?");
    }

    #[test]
    fn test_no_literals_unchanged() {
        let sql = "SELECT name FROM users ORDER BY name";
        assert_eq!(sanitize_sql(sql), sql);
    }
}
