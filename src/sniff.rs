//! Content-Type detection from the leading bytes of a body.
//!
//! Implements the subset of the WHATWG MIME sniffing algorithm that servers
//! commonly rely on. At most the first 512 bytes are considered, so the
//! result is only as good as the first write.

const SNIFF_LEN: usize = 512;

/// Fallback for data with binary octets.
pub const OCTET_STREAM: &str = "application/octet-stream";
/// Fallback for data without binary octets.
pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

const TEXT_HTML: &str = "text/html; charset=utf-8";

const HTML_TAGS: &[&[u8]] = &[
    b"<!DOCTYPE HTML",
    b"<HTML",
    b"<HEAD",
    b"<SCRIPT",
    b"<IFRAME",
    b"<H1",
    b"<DIV",
    b"<FONT",
    b"<TABLE",
    b"<A",
    b"<STYLE",
    b"<TITLE",
    b"<B",
    b"<BODY",
    b"<BR",
    b"<P",
    b"<!--",
];

struct Signature {
    pattern: &'static [u8],
    /// Bytes of the input are ANDed with the mask before comparing.
    mask: Option<&'static [u8]>,
    skip_whitespace: bool,
    content_type: &'static str,
}

const fn exact(pattern: &'static [u8], content_type: &'static str) -> Signature {
    Signature {
        pattern,
        mask: None,
        skip_whitespace: false,
        content_type,
    }
}

const fn masked(
    mask: &'static [u8],
    pattern: &'static [u8],
    content_type: &'static str,
) -> Signature {
    Signature {
        pattern,
        mask: Some(mask),
        skip_whitespace: false,
        content_type,
    }
}

const RIFF_MASK: &[u8] = b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF";

static SIGNATURES: &[Signature] = &[
    Signature {
        pattern: b"<?xml",
        mask: None,
        skip_whitespace: true,
        content_type: "text/xml; charset=utf-8",
    },
    exact(b"%PDF-", "application/pdf"),
    exact(b"%!PS-Adobe-", "application/postscript"),
    // Byte order marks.
    masked(b"\xFF\xFF", b"\xFE\xFF", "text/plain; charset=utf-16be"),
    masked(b"\xFF\xFF", b"\xFF\xFE", "text/plain; charset=utf-16le"),
    masked(b"\xFF\xFF\xFF", b"\xEF\xBB\xBF", TEXT_PLAIN),
    // Images.
    exact(b"\x00\x00\x01\x00", "image/x-icon"),
    exact(b"\x00\x00\x02\x00", "image/x-icon"),
    exact(b"BM", "image/bmp"),
    exact(b"GIF87a", "image/gif"),
    exact(b"GIF89a", "image/gif"),
    masked(
        b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF\xFF\xFF",
        b"RIFF\x00\x00\x00\x00WEBPVP",
        "image/webp",
    ),
    exact(b"\x89PNG\x0D\x0A\x1A\x0A", "image/png"),
    exact(b"\xFF\xD8\xFF", "image/jpeg"),
    // Audio and video.
    masked(RIFF_MASK, b"FORM\x00\x00\x00\x00AIFF", "audio/aiff"),
    exact(b"ID3", "audio/mpeg"),
    exact(b"OggS\x00", "application/ogg"),
    exact(b"MThd\x00\x00\x00\x06", "audio/midi"),
    masked(RIFF_MASK, b"RIFF\x00\x00\x00\x00AVI ", "video/avi"),
    masked(RIFF_MASK, b"RIFF\x00\x00\x00\x00WAVE", "audio/wave"),
    exact(b"\x1A\x45\xDF\xA3", "video/webm"),
    // Fonts.
    exact(b"wOFF", "font/woff"),
    exact(b"wOF2", "font/woff2"),
    exact(b"\x00\x01\x00\x00", "font/ttf"),
    exact(b"OTTO", "font/otf"),
    exact(b"ttcf", "font/collection"),
    // Archives.
    exact(b"\x1F\x8B\x08", "application/x-gzip"),
    exact(b"PK\x03\x04", "application/zip"),
    exact(b"Rar!\x1A\x07\x00", "application/x-rar-compressed"),
    exact(b"Rar!\x1A\x07\x01\x00", "application/x-rar-compressed"),
    exact(b"\x00\x61\x73\x6D", "application/wasm"),
];

/// Returns the Content-Type for a body starting with `data`.
///
/// Never fails: unrecognized text is `text/plain; charset=utf-8` and
/// anything else is `application/octet-stream`.
pub fn detect_content_type(data: &[u8]) -> &'static str {
    let data = &data[..data.len().min(SNIFF_LEN)];
    let first_non_ws = data
        .iter()
        .position(|&b| !is_whitespace(b))
        .unwrap_or(data.len());
    let trimmed = &data[first_non_ws..];

    if HTML_TAGS.iter().any(|tag| matches_html_tag(trimmed, tag)) {
        return TEXT_HTML;
    }

    for signature in SIGNATURES {
        let input = if signature.skip_whitespace { trimmed } else { data };
        if signature.matches(input) {
            return signature.content_type;
        }
    }

    if is_mp4(data) {
        return "video/mp4";
    }

    if trimmed.iter().any(|&b| is_binary(b)) {
        OCTET_STREAM
    } else {
        TEXT_PLAIN
    }
}

impl Signature {
    fn matches(&self, data: &[u8]) -> bool {
        let Some(head) = data.get(..self.pattern.len()) else {
            return false;
        };
        match self.mask {
            None => head == self.pattern,
            Some(mask) => head
                .iter()
                .zip(mask)
                .zip(self.pattern)
                .all(|((b, m), p)| b & m == *p),
        }
    }
}

/// Case-insensitive tag match, which must be followed by a space or `>`.
fn matches_html_tag(data: &[u8], tag: &[u8]) -> bool {
    let Some(head) = data.get(..tag.len()) else {
        return false;
    };
    if !head.eq_ignore_ascii_case(tag) {
        return false;
    }
    matches!(data.get(tag.len()), Some(b' ' | b'>'))
}

fn is_mp4(data: &[u8]) -> bool {
    if data.len() < 12 {
        return false;
    }
    let box_size = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if data.len() < box_size || box_size % 4 != 0 || &data[4..8] != b"ftyp" {
        return false;
    }
    (8..box_size)
        .step_by(4)
        .filter(|&start| start != 12)
        .any(|start| data.get(start..start + 3) == Some(&b"mp4"[..]))
}

fn is_whitespace(b: u8) -> bool {
    matches!(b, b'\t' | b'\n' | 0x0c | b'\r' | b' ')
}

fn is_binary(b: u8) -> bool {
    matches!(b, 0x00..=0x08 | 0x0b | 0x0e..=0x1a | 0x1c..=0x1f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html() {
        assert_eq!(detect_content_type(b"<html><body>hi</body></html>"), TEXT_HTML);
        assert_eq!(detect_content_type(b"  \n<!doctype html>"), TEXT_HTML);
        assert_eq!(detect_content_type(b"<p>para</p>"), TEXT_HTML);
        // A tag must be terminated.
        assert_eq!(detect_content_type(b"<pre"), TEXT_PLAIN);
    }

    #[test]
    fn test_xml() {
        assert_eq!(
            detect_content_type(b"\n<?xml version=\"1.0\"?>"),
            "text/xml; charset=utf-8"
        );
    }

    #[test]
    fn test_plain_text() {
        assert_eq!(detect_content_type(b"hello world"), TEXT_PLAIN);
        assert_eq!(detect_content_type(b""), TEXT_PLAIN);
        assert_eq!(detect_content_type(b"{\"json\": true}"), TEXT_PLAIN);
    }

    #[test]
    fn test_binary() {
        assert_eq!(detect_content_type(b"\x00\x01\x02binary"), OCTET_STREAM);
    }

    #[test]
    fn test_images() {
        assert_eq!(
            detect_content_type(b"\x89PNG\x0D\x0A\x1A\x0A\x00\x00"),
            "image/png"
        );
        assert_eq!(detect_content_type(b"GIF89a...."), "image/gif");
        assert_eq!(detect_content_type(b"\xFF\xD8\xFF\xE0"), "image/jpeg");
        assert_eq!(
            detect_content_type(b"RIFF\x10\x00\x00\x00WEBPVP8 "),
            "image/webp"
        );
    }

    #[test]
    fn test_riff_family() {
        assert_eq!(
            detect_content_type(b"RIFF\x24\x00\x00\x00WAVEfmt "),
            "audio/wave"
        );
        assert_eq!(
            detect_content_type(b"RIFF\x24\x00\x00\x00AVI LIST"),
            "video/avi"
        );
    }

    #[test]
    fn test_archives_and_documents() {
        assert_eq!(detect_content_type(b"%PDF-1.7"), "application/pdf");
        assert_eq!(
            detect_content_type(b"\x1F\x8B\x08\x00\x00"),
            "application/x-gzip"
        );
        assert_eq!(detect_content_type(b"PK\x03\x04rest"), "application/zip");
    }

    #[test]
    fn test_byte_order_marks() {
        assert_eq!(detect_content_type(b"\xEF\xBB\xBFtext"), TEXT_PLAIN);
        assert_eq!(
            detect_content_type(b"\xFF\xFEt\x00"),
            "text/plain; charset=utf-16le"
        );
    }

    #[test]
    fn test_mp4() {
        let mut data = vec![0, 0, 0, 0x18];
        data.extend_from_slice(b"ftypmp42\x00\x00\x00\x00mp42isom");
        assert_eq!(detect_content_type(&data), "video/mp4");
    }

    #[test]
    fn test_only_leading_bytes_are_considered() {
        let mut data = b"plain text ".repeat(100);
        data.push(0x00);
        assert_eq!(detect_content_type(&data), TEXT_PLAIN);
    }
}
