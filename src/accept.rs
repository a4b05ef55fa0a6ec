//! Negotiation of `Accept-Encoding` style headers.
//!
//! Header values are parsed into weighted [`AcceptSpec`] entries and matched
//! against an ordered list of offers. Parsing never fails: a malformed entry
//! is dropped and parsing resumes after the next comma.

use crate::codec::Encoding;
use crate::error::{Error, Result};
use http::{HeaderMap, header};

const IS_TOKEN: u8 = 1 << 0;
const IS_SPACE: u8 = 1 << 1;

/// Octet classes from RFC 2616, section 2.2.
static OCTET_TYPES: [u8; 256] = octet_types();

const fn octet_types() -> [u8; 256] {
    let separators = b" \t\"(),/:;<=>?@[]\\{}";
    let mut table = [0u8; 256];
    let mut c = 0;
    while c < 256 {
        let is_ctl = c <= 31 || c == 127;
        let is_char = c <= 127;
        let mut is_separator = false;
        let mut i = 0;
        while i < separators.len() {
            if separators[i] as usize == c {
                is_separator = true;
            }
            i += 1;
        }

        let mut class = 0;
        if c == b' ' as usize || c == b'\t' as usize || c == b'\r' as usize || c == b'\n' as usize
        {
            class |= IS_SPACE;
        }
        if is_char && !is_ctl && !is_separator {
            class |= IS_TOKEN;
        }
        table[c] = class;
        c += 1;
    }
    table
}

/// One weighted entry of an `Accept-*` header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcceptSpec<'a> {
    /// The token, e.g. `gzip` or the wildcard `*`.
    pub value: &'a str,
    /// Quality weight; `0` rejects the token.
    pub q: f64,
}

/// Parses every header value into its entries, in header order.
pub fn parse_accept<S: AsRef<str>>(values: &[S]) -> Vec<AcceptSpec<'_>> {
    values
        .iter()
        .flat_map(|value| value.as_ref().split(','))
        .filter_map(parse_entry)
        .collect()
}

/// Picks the best offer for the given header values.
///
/// Offers are scanned in order and only a strictly greater quality replaces
/// the current best, so among equal qualities the earliest offer wins no
/// matter where the header lists it. Returns `None` when the best match has
/// quality `0`, and `fallback` when nothing matched at all.
pub fn negotiate<I, S, T>(values: I, offers: &[T], fallback: T) -> Option<T>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
    T: AsRef<str> + Clone,
{
    let values: Vec<S> = values.into_iter().collect();
    let specs = parse_accept(&values);

    let mut best_q = -1.0;
    let mut best = fallback;
    for offer in offers {
        for spec in &specs {
            if spec.q > best_q && (spec.value == "*" || spec.value == offer.as_ref()) {
                best_q = spec.q;
                best = offer.clone();
            }
        }
    }

    if best_q == 0.0 { None } else { Some(best) }
}

/// Negotiates a response encoding from the request's `Accept-Encoding` values.
///
/// The result may be [`Encoding::Identity`] when the header matched none of
/// the offers. Values that are not visible ASCII are ignored.
pub fn negotiate_encoding(headers: &HeaderMap, offers: &[Encoding]) -> Result<Encoding> {
    let values: Vec<&str> = headers
        .get_all(header::ACCEPT_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();

    if values.is_empty() {
        return Err(Error::ResponseNotCompressed);
    }

    negotiate(values.iter().copied(), offers, Encoding::Identity)
        .ok_or_else(|| Error::NotSupported(values.join(", ")))
}

/// Parses a single comma-delimited entry. The whole entry must be consumed.
fn parse_entry(s: &str) -> Option<AcceptSpec<'_>> {
    let (value, rest) = expect_token_slash(skip_space(s));
    if value.is_empty() {
        return None;
    }

    let mut q = 1.0;
    let mut rest = skip_space(rest);
    if let Some(param) = rest.strip_prefix(';') {
        let quality = skip_space(param).strip_prefix("q=")?;
        let (parsed, after) = expect_quality(quality)?;
        q = parsed;
        rest = skip_space(after);
    }

    rest.is_empty().then_some(AcceptSpec { value, q })
}

fn skip_space(s: &str) -> &str {
    let n = s
        .bytes()
        .take_while(|&b| OCTET_TYPES[b as usize] & IS_SPACE != 0)
        .count();
    &s[n..]
}

fn expect_token_slash(s: &str) -> (&str, &str) {
    let n = s
        .bytes()
        .take_while(|&b| OCTET_TYPES[b as usize] & IS_TOKEN != 0 || b == b'/')
        .count();
    s.split_at(n)
}

/// Parses `0`, `1`, or either followed by `.` and digits.
fn expect_quality(s: &str) -> Option<(f64, &str)> {
    let mut q = match s.as_bytes().first()? {
        b'0' => 0.0,
        b'1' => 1.0,
        _ => return None,
    };

    let s = &s[1..];
    let Some(fraction) = s.strip_prefix('.') else {
        return Some((q, s));
    };

    let digits = fraction.bytes().take_while(u8::is_ascii_digit).count();
    let mut numerator: u64 = 0;
    let mut denominator: u64 = 1;
    for b in fraction[..digits].bytes() {
        // Digits past u64 precision are consumed but no longer change the value.
        if denominator >= 1_000_000_000_000_000_000 {
            break;
        }
        numerator = numerator * 10 + u64::from(b - b'0');
        denominator *= 10;
    }
    q += numerator as f64 / denominator as f64;

    Some((q, &fraction[digits..]))
}
