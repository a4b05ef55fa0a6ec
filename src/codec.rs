use crate::error::{Error, Result};
use flate2::Compression;
use flate2::read::{DeflateDecoder, MultiGzDecoder};
use flate2::write::{DeflateEncoder, GzEncoder};
use std::fmt;
use std::io::{self, Read, Write};
use std::str::FromStr;

/// Level passed by callers to request the codec's own default.
pub const DEFAULT_LEVEL: i32 = -1;

/// Brotli level used in place of [`DEFAULT_LEVEL`].
pub const BROTLI_DEFAULT_LEVEL: i32 = 6;

const BROTLI_BUFFER_SIZE: usize = 4096;
const BROTLI_LGWIN: u32 = 22;

/// Content codings known to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// `gzip`, a DEFLATE stream in a gzip container.
    Gzip,
    /// `deflate`, a raw DEFLATE stream.
    Deflate,
    /// `br`, a Brotli stream.
    Brotli,
    /// `snappy`, the Snappy framing format.
    Snappy,
    /// `s2`, written and read with the Snappy framing format.
    ///
    /// Snappy-framed bodies are valid S2 streams, so S2 clients can read what
    /// this crate writes. The reverse does not hold: bodies that use the S2
    /// stream identifier or S2-only block encodings fail when read.
    S2,
    /// `identity`, no transformation. Only valid as a negotiation outcome.
    Identity,
}

impl Encoding {
    /// Encodings offered for responses when the caller does not choose, in
    /// order of preference.
    pub const DEFAULT_OFFERS: &'static [Encoding] = &[
        Encoding::Gzip,
        Encoding::Deflate,
        Encoding::Brotli,
        Encoding::Snappy,
        Encoding::S2,
    ];

    /// Returns the token used in `Accept-Encoding` and `Content-Encoding`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Gzip => "gzip",
            Encoding::Deflate => "deflate",
            Encoding::Brotli => "br",
            Encoding::Snappy => "snappy",
            Encoding::S2 => "s2",
            Encoding::Identity => "identity",
        }
    }

    /// Returns the header value for this encoding.
    pub fn header_value(&self) -> http::HeaderValue {
        http::HeaderValue::from_static(self.as_str())
    }

    /// Resolves [`DEFAULT_LEVEL`] and checks the level against the codec.
    ///
    /// Snappy-family codecs have no levels and accept anything.
    pub fn effective_level(&self, level: i32) -> Result<i32> {
        let (default, max) = match self {
            Encoding::Gzip | Encoding::Deflate => (DEFAULT_LEVEL, 9),
            Encoding::Brotli => (BROTLI_DEFAULT_LEVEL, 11),
            Encoding::Snappy | Encoding::S2 => return Ok(level),
            Encoding::Identity => return Err(Error::NotSupported(self.as_str().to_owned())),
        };

        match level {
            DEFAULT_LEVEL => Ok(default),
            _ if (0..=max).contains(&level) => Ok(level),
            _ => Err(Error::InvalidLevel {
                encoding: *self,
                level,
            }),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for Encoding {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl FromStr for Encoding {
    type Err = Error;

    /// Tokens are matched exactly, as they appear on the wire.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "gzip" => Ok(Encoding::Gzip),
            "deflate" => Ok(Encoding::Deflate),
            "br" => Ok(Encoding::Brotli),
            "snappy" => Ok(Encoding::Snappy),
            "s2" => Ok(Encoding::S2),
            "identity" => Ok(Encoding::Identity),
            _ => Err(Error::NotSupported(s.to_owned())),
        }
    }
}

enum EncoderState<W: Write> {
    Gzip(GzEncoder<W>),
    Deflate(DeflateEncoder<W>),
    Brotli(Box<brotli::CompressorWriter<W>>),
    Snappy(snap::write::FrameEncoder<W>),
}

/// A compressing stream that writes encoded bytes into `W`.
///
/// Callers must [`finish`](Compressor::finish) the stream: dropping it
/// without finishing may leave the output without its trailer.
pub struct Compressor<W: Write> {
    encoding: Encoding,
    level: i32,
    state: EncoderState<W>,
}

impl<W: Write> Compressor<W> {
    /// Creates a compressor for `encoding` writing into `sink`.
    ///
    /// `level` is codec specific; [`DEFAULT_LEVEL`] selects the codec's
    /// default. `identity` is rejected: it means "do not transform" and has
    /// no compressing stream.
    pub fn new(sink: W, encoding: Encoding, level: i32) -> Result<Self> {
        let level = encoding.effective_level(level)?;
        let state = match encoding {
            Encoding::Gzip => EncoderState::Gzip(GzEncoder::new(sink, flate_level(level))),
            Encoding::Deflate => {
                EncoderState::Deflate(DeflateEncoder::new(sink, flate_level(level)))
            }
            Encoding::Brotli => EncoderState::Brotli(Box::new(brotli::CompressorWriter::new(
                sink,
                BROTLI_BUFFER_SIZE,
                level as u32,
                BROTLI_LGWIN,
            ))),
            Encoding::Snappy | Encoding::S2 => {
                EncoderState::Snappy(snap::write::FrameEncoder::new(sink))
            }
            Encoding::Identity => return Err(Error::NotSupported(encoding.to_string())),
        };

        Ok(Self {
            encoding,
            level,
            state,
        })
    }

    /// Returns the encoding this compressor produces.
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Returns the level in effect, after default resolution.
    pub fn level(&self) -> i32 {
        self.level
    }

    /// Returns a reference to the underlying sink.
    pub fn get_ref(&self) -> &W {
        match &self.state {
            EncoderState::Gzip(e) => e.get_ref(),
            EncoderState::Deflate(e) => e.get_ref(),
            EncoderState::Brotli(e) => e.get_ref(),
            EncoderState::Snappy(e) => e.get_ref(),
        }
    }

    /// Returns a mutable reference to the underlying sink.
    ///
    /// Only draining already written output is safe; writing to the sink
    /// directly corrupts the stream.
    pub fn get_mut(&mut self) -> &mut W {
        match &mut self.state {
            EncoderState::Gzip(e) => e.get_mut(),
            EncoderState::Deflate(e) => e.get_mut(),
            EncoderState::Brotli(e) => e.get_mut(),
            EncoderState::Snappy(e) => e.get_mut(),
        }
    }

    /// Writes any pending data plus the codec trailer and returns the sink.
    pub fn finish(self) -> io::Result<W> {
        match self.state {
            EncoderState::Gzip(e) => e.finish(),
            EncoderState::Deflate(e) => e.finish(),
            EncoderState::Brotli(mut e) => {
                e.flush()?;
                // into_inner writes the final block; errors there are dropped.
                Ok(e.into_inner())
            }
            EncoderState::Snappy(mut e) => {
                e.flush()?;
                e.into_inner()
                    .map_err(|e| io::Error::new(e.error().kind(), e.error().to_string()))
            }
        }
    }
}

impl<W: Write> Write for Compressor<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.state {
            EncoderState::Gzip(e) => e.write(buf),
            EncoderState::Deflate(e) => e.write(buf),
            EncoderState::Brotli(e) => e.write(buf),
            EncoderState::Snappy(e) => e.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.state {
            EncoderState::Gzip(e) => e.flush(),
            EncoderState::Deflate(e) => e.flush(),
            EncoderState::Brotli(e) => e.flush(),
            EncoderState::Snappy(e) => e.flush(),
        }
    }
}

impl<W: Write> fmt::Debug for Compressor<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compressor")
            .field("encoding", &self.encoding)
            .field("level", &self.level)
            .finish_non_exhaustive()
    }
}

enum DecoderState<R: Read> {
    Gzip(MultiGzDecoder<R>),
    Deflate(DeflateDecoder<R>),
    Brotli(Box<brotli::Decompressor<R>>),
    Snappy(snap::read::FrameDecoder<R>),
}

/// A decompressing stream reading encoded bytes from `R`.
///
/// None of the decoders need an explicit close: dropping the decompressor
/// releases the decoder and the source together.
pub struct Decompressor<R: Read> {
    encoding: Encoding,
    state: DecoderState<R>,
}

impl<R: Read> Decompressor<R> {
    /// Creates a decompressor for `encoding` reading from `source`.
    ///
    /// Malformed input is reported by [`Read::read`], not here.
    pub fn new(source: R, encoding: Encoding) -> Result<Self> {
        let state = match encoding {
            Encoding::Gzip => DecoderState::Gzip(MultiGzDecoder::new(source)),
            Encoding::Deflate => DecoderState::Deflate(DeflateDecoder::new(source)),
            Encoding::Brotli => DecoderState::Brotli(Box::new(brotli::Decompressor::new(
                source,
                BROTLI_BUFFER_SIZE,
            ))),
            Encoding::Snappy | Encoding::S2 => {
                DecoderState::Snappy(snap::read::FrameDecoder::new(source))
            }
            Encoding::Identity => return Err(Error::NotSupported(encoding.to_string())),
        };

        Ok(Self { encoding, state })
    }

    /// Returns the encoding being decoded.
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }
}

impl<R: Read> Read for Decompressor<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.state {
            DecoderState::Gzip(d) => d.read(buf),
            DecoderState::Deflate(d) => d.read(buf),
            DecoderState::Brotli(d) => d.read(buf),
            DecoderState::Snappy(d) => d.read(buf),
        }
    }
}

impl<R: Read> fmt::Debug for Decompressor<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decompressor")
            .field("encoding", &self.encoding)
            .finish_non_exhaustive()
    }
}

fn flate_level(level: i32) -> Compression {
    match u32::try_from(level) {
        Ok(level) => Compression::new(level),
        Err(_) => Compression::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &[u8] = b"The quick brown fox jumps over the lazy dog. \
        The quick brown fox jumps over the lazy dog. \
        The quick brown fox jumps over the lazy dog.";

    fn compress(encoding: Encoding, data: &[u8]) -> Vec<u8> {
        let mut compressor = Compressor::new(Vec::new(), encoding, DEFAULT_LEVEL).unwrap();
        compressor.write_all(data).unwrap();
        compressor.finish().unwrap()
    }

    fn decompress(encoding: Encoding, data: &[u8]) -> io::Result<Vec<u8>> {
        let mut decompressor = Decompressor::new(data, encoding).unwrap();
        let mut out = Vec::new();
        decompressor.read_to_end(&mut out)?;
        Ok(out)
    }

    #[test]
    fn test_as_str() {
        assert_eq!(Encoding::Gzip.as_str(), "gzip");
        assert_eq!(Encoding::Deflate.as_str(), "deflate");
        assert_eq!(Encoding::Brotli.as_str(), "br");
        assert_eq!(Encoding::Snappy.as_str(), "snappy");
        assert_eq!(Encoding::S2.as_str(), "s2");
        assert_eq!(Encoding::Identity.as_str(), "identity");
    }

    #[test]
    fn test_from_str() {
        for encoding in Encoding::DEFAULT_OFFERS {
            assert_eq!(encoding.as_str().parse::<Encoding>().unwrap(), *encoding);
        }
        assert_eq!("identity".parse::<Encoding>().unwrap(), Encoding::Identity);
        assert!(matches!(
            "zstd".parse::<Encoding>(),
            Err(Error::NotSupported(v)) if v == "zstd"
        ));
        assert!("GZIP".parse::<Encoding>().is_err());
    }

    #[test]
    fn test_round_trip_all_encodings() {
        for encoding in Encoding::DEFAULT_OFFERS {
            let compressed = compress(*encoding, SAMPLE);
            assert_ne!(compressed, SAMPLE, "{encoding} left data unchanged");
            assert_eq!(decompress(*encoding, &compressed).unwrap(), SAMPLE);
        }
    }

    #[test]
    fn test_round_trip_empty_input() {
        for encoding in Encoding::DEFAULT_OFFERS {
            let compressed = compress(*encoding, b"");
            assert!(decompress(*encoding, &compressed).unwrap().is_empty());
        }
    }

    #[test]
    fn test_round_trip_large_binary() {
        let data: Vec<u8> = (0..200_000u32).map(|i| (i * 7 % 251) as u8).collect();
        for encoding in Encoding::DEFAULT_OFFERS {
            let compressed = compress(*encoding, &data);
            assert_eq!(decompress(*encoding, &compressed).unwrap(), data);
        }
    }

    #[test]
    fn test_identity_is_not_a_codec() {
        assert!(matches!(
            Compressor::new(Vec::new(), Encoding::Identity, DEFAULT_LEVEL),
            Err(Error::NotSupported(_))
        ));
        assert!(matches!(
            Decompressor::new(&b""[..], Encoding::Identity),
            Err(Error::NotSupported(_))
        ));
    }

    #[test]
    fn test_brotli_default_level() {
        let compressor = Compressor::new(Vec::new(), Encoding::Brotli, DEFAULT_LEVEL).unwrap();
        assert_eq!(compressor.level(), BROTLI_DEFAULT_LEVEL);
        let compressor = Compressor::new(Vec::new(), Encoding::Brotli, 11).unwrap();
        assert_eq!(compressor.level(), 11);
    }

    #[test]
    fn test_invalid_levels() {
        assert!(matches!(
            Compressor::new(Vec::new(), Encoding::Gzip, 10),
            Err(Error::InvalidLevel {
                encoding: Encoding::Gzip,
                level: 10
            })
        ));
        assert!(matches!(
            Compressor::new(Vec::new(), Encoding::Brotli, 12),
            Err(Error::InvalidLevel { .. })
        ));
        assert!(matches!(
            Compressor::new(Vec::new(), Encoding::Deflate, -5),
            Err(Error::InvalidLevel { .. })
        ));
        // Snappy has no levels.
        assert!(Compressor::new(Vec::new(), Encoding::Snappy, 42).is_ok());
    }

    #[test]
    fn test_flush_emits_output() {
        for encoding in Encoding::DEFAULT_OFFERS {
            let mut compressor = Compressor::new(Vec::new(), *encoding, DEFAULT_LEVEL).unwrap();
            compressor.write_all(SAMPLE).unwrap();
            compressor.flush().unwrap();
            assert!(
                !compressor.get_ref().is_empty(),
                "{encoding} produced nothing on flush"
            );
        }
    }

    #[test]
    fn test_gzip_finish_writes_trailer() {
        let mut compressor = Compressor::new(Vec::new(), Encoding::Gzip, DEFAULT_LEVEL).unwrap();
        compressor.write_all(SAMPLE).unwrap();
        compressor.flush().unwrap();
        let flushed = compressor.get_ref().len();
        let out = compressor.finish().unwrap();

        assert!(out.len() > flushed);
        // ISIZE: the uncompressed length, little endian, closes the member.
        let isize = u32::from_le_bytes(out[out.len() - 4..].try_into().unwrap());
        assert_eq!(isize as usize, SAMPLE.len());
    }

    #[test]
    fn test_truncated_input_is_an_error() {
        let compressed = compress(Encoding::Gzip, SAMPLE);
        let truncated = &compressed[..compressed.len() - 6];
        assert!(decompress(Encoding::Gzip, truncated).is_err());
    }

    #[test]
    fn test_garbage_input_is_an_error() {
        assert!(decompress(Encoding::Gzip, b"definitely not gzip").is_err());
        assert!(decompress(Encoding::Snappy, b"definitely not snappy").is_err());
    }

    #[test]
    fn test_s2_reads_snappy_framing_only() {
        let framed = compress(Encoding::Snappy, SAMPLE);
        assert_eq!(decompress(Encoding::S2, &framed).unwrap(), SAMPLE);

        // Stream identifier chunk of a native S2 stream.
        let native = b"\xff\x06\x00\x00S2sTwO";
        assert!(decompress(Encoding::S2, native).is_err());
    }

    #[test]
    fn test_brotli_finish_ends_stream() {
        let mut compressor = Compressor::new(Vec::new(), Encoding::Brotli, DEFAULT_LEVEL).unwrap();
        compressor.write_all(SAMPLE).unwrap();
        let out = compressor.finish().unwrap();

        // A stream without its final block fails with an unexpected EOF.
        assert_eq!(decompress(Encoding::Brotli, &out).unwrap(), SAMPLE);
    }
}
