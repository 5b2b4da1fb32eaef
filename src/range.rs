//! Lenient byte-range resolution.
//!
//! Download clients under test send everything from well-formed resume
//! ranges to outright garbage, and the server must keep serving either way.
//! The grammar here is the permissive `bytes=<start>-<end>` form with
//! either bound optional; anything that fails to parse degrades to the
//! full resource instead of being rejected.

/// A resolved byte range over a resource of known total length.
///
/// `end_exclusive` is one past the last byte to serve. HTTP byte ranges
/// are inclusive on the wire; translating to an exclusive end up front
/// keeps the length arithmetic and the empty case honest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRange {
    pub start: u64,
    pub end_exclusive: u64,
    /// Whether the response should be 206 Partial Content rather than 200.
    pub is_partial: bool,
}

impl ResolvedRange {
    /// The full resource, served as a plain 200.
    pub fn full(total_len: u64) -> Self {
        ResolvedRange {
            start: 0,
            end_exclusive: total_len,
            is_partial: false,
        }
    }

    /// Number of bytes the range covers.
    pub fn len(&self) -> u64 {
        self.end_exclusive - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end_exclusive
    }

    /// Last byte position, inclusive, as it appears in `Content-Range`.
    /// Only meaningful for non-empty ranges.
    pub fn last_byte(&self) -> u64 {
        self.end_exclusive - 1
    }
}

/// Resolve an optional `Range` header value against a resource length.
///
/// Pure function of its inputs. The fallback policy is deliberately
/// one-sided: no specifier, an unparsable specifier, a start beyond the
/// last byte, or a range that is inverted after clamping all resolve to
/// the full resource. The only validation applied to a well-formed
/// specifier is clamping `end` to the last byte.
pub fn resolve(total_len: u64, specifier: Option<&str>) -> ResolvedRange {
    let Some((start, end)) = specifier.and_then(parse_specifier) else {
        return ResolvedRange::full(total_len);
    };

    if total_len == 0 {
        return ResolvedRange::full(total_len);
    }

    let start = start.unwrap_or(0);
    // Omitted or oversized end means "through the last byte".
    let end_exclusive = match end {
        Some(end) => end.saturating_add(1).min(total_len),
        None => total_len,
    };

    if start >= end_exclusive {
        return ResolvedRange::full(total_len);
    }

    ResolvedRange {
        start,
        end_exclusive,
        is_partial: true,
    }
}

/// Parse `bytes=<start>-<end>` into its optional bounds.
///
/// Note the asymmetry with RFC 7233: `bytes=-500` is bytes 0..=500 here,
/// not a 500-byte suffix. Resume-testing clients always send an explicit
/// start, so the simpler reading wins.
fn parse_specifier(raw: &str) -> Option<(Option<u64>, Option<u64>)> {
    let spec = raw.trim().strip_prefix("bytes=")?;
    let (lo, hi) = spec.split_once('-')?;

    let parse = |s: &str| -> Option<Option<u64>> {
        let s = s.trim();
        if s.is_empty() {
            Some(None)
        } else {
            s.parse::<u64>().ok().map(Some)
        }
    };

    let start = parse(lo)?;
    let end = parse(hi)?;
    if start.is_none() && end.is_none() {
        // "bytes=-" carries no information.
        return None;
    }
    Some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partial(start: u64, end_exclusive: u64) -> ResolvedRange {
        ResolvedRange {
            start,
            end_exclusive,
            is_partial: true,
        }
    }

    #[test]
    fn test_resolve_table() {
        let total = 500;
        let tests = [
            (None, ResolvedRange::full(total)),
            (Some("bytes=0-99"), partial(0, 100)),
            (Some("bytes=100-199"), partial(100, 200)),
            (Some("bytes=100-"), partial(100, 500)),
            // omitted start defaults to zero, not a suffix
            (Some("bytes=-100"), partial(0, 101)),
            (Some("bytes=0-0"), partial(0, 1)),
            (Some("bytes=499-499"), partial(499, 500)),
            // end clamps to the last byte
            (Some("bytes=100-24646"), partial(100, 500)),
            (Some("bytes=0-"), partial(0, 500)),
            // degenerate and malformed specifiers fall back to full
            (Some("bytes=-"), ResolvedRange::full(total)),
            (Some("bytes=garbage"), ResolvedRange::full(total)),
            (Some("bytes=a-b"), ResolvedRange::full(total)),
            (Some("bytes=0-99,200-299"), ResolvedRange::full(total)),
            (Some("bits=0-99"), ResolvedRange::full(total)),
            (Some(""), ResolvedRange::full(total)),
            (Some("0-99"), ResolvedRange::full(total)),
            // out of bounds / inverted degrade rather than 416
            (Some("bytes=500-"), ResolvedRange::full(total)),
            (Some("bytes=9999-10000"), ResolvedRange::full(total)),
            (Some("bytes=30-20"), ResolvedRange::full(total)),
        ];

        for (i, (specifier, expected)) in tests.iter().enumerate() {
            let got = resolve(total, *specifier);
            assert_eq!(got, *expected, "case #{i}: {specifier:?}");
        }
    }

    #[test]
    fn test_whitespace_tolerated() {
        assert_eq!(resolve(500, Some(" bytes=0 - 9 ")), partial(0, 10));
    }

    #[test]
    fn test_empty_resource_always_full() {
        assert_eq!(resolve(0, None), ResolvedRange::full(0));
        assert_eq!(resolve(0, Some("bytes=0-9")), ResolvedRange::full(0));
        assert!(resolve(0, None).is_empty());
    }

    #[test]
    fn test_resolution_is_pure() {
        let first = resolve(10_485_760, Some("bytes=1024-2047"));
        let second = resolve(10_485_760, Some("bytes=1024-2047"));
        assert_eq!(first, second);
        assert_eq!(first.len(), 1024);
        assert_eq!(first.last_byte(), 2047);
    }
}
