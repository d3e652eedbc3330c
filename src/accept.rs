/// The `Content-Encoding` token this crate negotiates and emits.
pub const ENCODING: &str = "br";

const TOKEN: &[u8] = b"br";

/// Returns whether an `Accept-Encoding` header value admits Brotli.
///
/// The token must appear case-insensitively on a token boundary (preceded by
/// start-of-value, comma, or space; followed by end-of-value, comma, space,
/// or semicolon). A `q` parameter of `0`, `0.0`, `0.00`, or `0.000` rejects
/// the encoding; any other weight, including a malformed one, accepts it.
///
/// Works on raw bytes so that non-UTF-8 header values are still scanned.
pub fn accepts(header: &[u8]) -> bool {
    let end = header.len();
    if end < TOKEN.len() {
        return false;
    }

    let mut cursor = 0;
    loop {
        let Some(pos) = find_token(header, cursor) else {
            return false;
        };

        let before = if pos == 0 { b' ' } else { header[pos - 1] };
        let mut i = pos + TOKEN.len();
        let after = if i >= end { b' ' } else { header[i] };

        // A false match restarts the scan past it instead of failing.
        cursor = i;
        if before != b',' && before != b' ' {
            continue;
        }
        if after != b',' && after != b' ' && after != b';' {
            continue;
        }

        // Token found; only a ";q=0[.0[0[0]]]" parameter can reject it now.
        while i < end && header[i] == b' ' {
            i += 1;
        }
        if i == end || header[i] != b';' {
            return true;
        }
        i += 1;
        while i < end && header[i] == b' ' {
            i += 1;
        }
        if i == end || (header[i] != b'q' && header[i] != b'Q') {
            return true;
        }
        i += 1;
        while i < end && header[i] == b' ' {
            i += 1;
        }
        if i == end || header[i] != b'=' {
            return true;
        }
        i += 1;
        while i < end && header[i] == b' ' {
            i += 1;
        }
        if i == end || header[i] != b'0' {
            return true;
        }
        i += 1;

        if i < end && header[i] == b'.' {
            i += 1;
            if i == end || !header[i].is_ascii_digit() {
                // "q=0." is malformed; the weight already read as zero.
                return false;
            }
            if header[i] > b'0' {
                return true;
            }
            i += 1;
            if i < end && header[i].is_ascii_digit() {
                if header[i] > b'0' {
                    return true;
                }
                i += 1;
                if i < end && header[i].is_ascii_digit() {
                    return header[i] > b'0';
                }
            }
        }

        // "q=0" with at most three zero fraction digits.
        return false;
    }
}

/// Case-insensitive search for the encoding token starting at `from`.
fn find_token(haystack: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(TOKEN.len())
        .position(|w| w.eq_ignore_ascii_case(TOKEN))
        .map(|p| from + p)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_token() {
        assert!(accepts(b"br"));
    }

    #[test]
    fn test_zero_weight_rejects() {
        assert!(!accepts(b"br;q=0"));
        assert!(!accepts(b"br;q=0.0"));
        assert!(!accepts(b"br;q=0.00"));
        assert!(!accepts(b"br;q=0.000"));
    }

    #[test]
    fn test_nonzero_weight_accepts() {
        assert!(accepts(b"br;q=0.001"));
        assert!(accepts(b"br;q=0.1"));
        assert!(accepts(b"br;q=0.01"));
        assert!(accepts(b"br;q=1"));
        assert!(accepts(b"br;q=0.5"));
    }

    #[test]
    fn test_token_in_list() {
        assert!(accepts(b"gzip, br"));
        assert!(accepts(b"gzip, br, zstd"));
        assert!(accepts(b"gzip,br;q=0.8"));
    }

    #[test]
    fn test_unbounded_token_rejects() {
        assert!(!accepts(b"brx"));
        assert!(!accepts(b"xbr"));
        assert!(!accepts(b"brotli-like"));
    }

    #[test]
    fn test_case_insensitive() {
        assert!(accepts(b"BR"));
        assert!(accepts(b"Br;Q=0.5"));
        assert!(!accepts(b"BR;Q=0"));
    }

    #[test]
    fn test_empty_and_short_values() {
        assert!(!accepts(b""));
        assert!(!accepts(b"b"));
    }

    #[test]
    fn test_whitespace_around_weight() {
        assert!(!accepts(b"br ; q = 0"));
        assert!(accepts(b"br ; q = 0.5"));
    }

    #[test]
    fn test_malformed_weight() {
        // A weight that never reads as zero passes through as acceptance.
        assert!(accepts(b"br;q"));
        assert!(accepts(b"br;q="));
        assert!(accepts(b"br;v=0"));
        // "q=0." read a zero weight before going malformed.
        assert!(!accepts(b"br;q=0."));
    }

    #[test]
    fn test_false_match_then_real_token() {
        assert!(accepts(b"abr, br"));
        assert!(!accepts(b"abr, cbr"));
    }

    #[test]
    fn test_zero_weight_then_other_entry() {
        // Scanning stops at the first bounded token; its weight decides.
        assert!(!accepts(b"br;q=0, gzip"));
    }
}
