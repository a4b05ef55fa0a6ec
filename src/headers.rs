use crate::codec::Encoding;
use http::header::{self, HeaderMap, HeaderValue};

/// Marks `headers` as carrying a body compressed with `encoding`.
///
/// Sets `Content-Encoding`, makes sure `Vary` covers `Accept-Encoding`, and
/// drops `Content-Length` and `Accept-Ranges`, neither of which hold for the
/// compressed body.
pub(crate) fn add_compress_headers(headers: &mut HeaderMap, encoding: Encoding) {
    add_vary_accept_encoding(headers);
    headers.insert(header::CONTENT_ENCODING, encoding.header_value());
    headers.remove(header::CONTENT_LENGTH);
    headers.remove(header::ACCEPT_RANGES);
}

/// Adds Accept-Encoding to the Vary header if not already present.
fn add_vary_accept_encoding(headers: &mut HeaderMap) {
    for vary in headers.get_all(header::VARY) {
        if let Ok(vary_str) = vary.to_str() {
            let covered = vary_str.split(',').any(|v| {
                let v = v.trim();
                v == "*" || v.eq_ignore_ascii_case("accept-encoding")
            });
            if covered {
                return;
            }
        }
    }

    headers.append(header::VARY, HeaderValue::from_static("Accept-Encoding"));
}
