use crate::adler32::adler32;
use crate::common::*;
use crate::crc32::crc32;
use crate::inflate::{ErrorKind, InflateStatus, Inflator};
use std::io::{self, Read};

const STREAM_BUFFER_SIZE: usize = 16 * 1024;

/// Container expected around the DEFLATE payload. `Auto` sniffs the first
/// byte: the gzip magic, a zlib CMF, or neither (raw).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Format {
    Auto,
    Raw,
    Zlib,
    Gzip,
}

/// Decompressing reader over any [`Read`] source.
///
/// Peels the container header, streams the DEFLATE payload through an
/// [`Inflator`], maintains the container checksum over the produced bytes
/// and verifies the trailer when the stream ends.
pub struct InflateReader<R: Read> {
    inner: R,
    inflator: Inflator,
    format: Format,

    in_buf: Vec<u8>,
    in_pos: usize,
    in_cap: usize,

    dictionary: Option<Vec<u8>>,
    crc: u32,
    adler: u32,
    total_out: u64,
    check_crc: bool,
    check_adler: bool,

    header_done: bool,
    done: bool,
}

impl<R: Read> InflateReader<R> {
    /// Reader that detects the container from the leading bytes.
    pub fn new(inner: R) -> Self {
        Self::with_format(inner, Format::Auto)
    }

    /// Reader over a bare DEFLATE stream.
    pub fn raw(inner: R) -> Self {
        Self::with_format(inner, Format::Raw)
    }

    /// Reader over an RFC 1950 zlib stream; the Adler-32 trailer is
    /// verified at end of stream.
    pub fn zlib(inner: R) -> Self {
        Self::with_format(inner, Format::Zlib)
    }

    /// Reader over an RFC 1952 gzip member; CRC-32 and ISIZE are verified
    /// at end of stream.
    pub fn gzip(inner: R) -> Self {
        Self::with_format(inner, Format::Gzip)
    }

    pub fn with_format(inner: R, format: Format) -> Self {
        InflateReader {
            inner,
            inflator: Inflator::new(),
            format,
            in_buf: vec![0; STREAM_BUFFER_SIZE],
            in_pos: 0,
            in_cap: 0,
            dictionary: None,
            crc: 0,
            adler: 1,
            total_out: 0,
            check_crc: false,
            check_adler: false,
            header_done: false,
            done: false,
        }
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Provides the preset dictionary for zlib streams whose header
    /// demands one (FDICT), or seeds the history of a raw stream. Must be
    /// called before the first read.
    pub fn set_dictionary(&mut self, dict: &[u8]) -> io::Result<()> {
        if self.header_done {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "dictionary must be set before reading",
            ));
        }
        self.dictionary = Some(dict.to_vec());
        Ok(())
    }

    fn refill(&mut self) -> io::Result<usize> {
        if self.in_pos > 0 {
            self.in_buf.copy_within(self.in_pos..self.in_cap, 0);
            self.in_cap -= self.in_pos;
            self.in_pos = 0;
        }
        let n = self.inner.read(&mut self.in_buf[self.in_cap..])?;
        self.in_cap += n;
        Ok(n)
    }

    fn fetch_byte(&mut self) -> io::Result<u8> {
        if self.in_pos == self.in_cap && self.refill()? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "compressed stream truncated",
            ));
        }
        let b = self.in_buf[self.in_pos];
        self.in_pos += 1;
        Ok(b)
    }

    fn peek_byte(&mut self) -> io::Result<u8> {
        if self.in_pos == self.in_cap && self.refill()? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "compressed stream truncated",
            ));
        }
        Ok(self.in_buf[self.in_pos])
    }

    fn detect_format(&mut self) -> io::Result<Format> {
        let head = self.peek_byte()?;
        if head == GZIP_ID1 {
            return Ok(Format::Gzip);
        }
        match head & 0x0F {
            cm if cm == ZLIB_CM_DEFLATE => Ok(Format::Zlib),
            /* a raw stream can never start with the reserved block type */
            6 | 7 => Err(bad_data("unrecognized stream header")),
            _ => Ok(Format::Raw),
        }
    }

    fn parse_header(&mut self) -> io::Result<()> {
        let format = match self.format {
            Format::Auto => {
                let detected = self.detect_format()?;
                self.format = detected;
                detected
            }
            other => other,
        };

        match format {
            Format::Gzip => {
                self.check_crc = true;
                self.parse_gzip_header()?;
            }
            Format::Zlib => {
                self.check_adler = true;
                self.parse_zlib_header()?;
            }
            Format::Raw | Format::Auto => {
                if let Some(dict) = self.dictionary.take() {
                    self.inflator.set_dictionary(&dict);
                }
            }
        }
        self.header_done = true;
        Ok(())
    }

    fn parse_gzip_header(&mut self) -> io::Result<()> {
        if self.fetch_byte()? != GZIP_ID1 || self.fetch_byte()? != GZIP_ID2 {
            return Err(bad_data("not a gzip stream"));
        }
        if self.fetch_byte()? != GZIP_CM_DEFLATE {
            return Err(bad_data("unsupported gzip compression method"));
        }
        let flags = self.fetch_byte()?;
        if flags & GZIP_FRESERVED != 0 {
            return Err(bad_data("reserved gzip flags set"));
        }
        /* mtime, xfl, os */
        for _ in 0..6 {
            self.fetch_byte()?;
        }

        if flags & GZIP_FEXTRA != 0 {
            let a = self.fetch_byte()? as usize;
            let b = self.fetch_byte()? as usize;
            for _ in 0..(a | (b << 8)) {
                self.fetch_byte()?;
            }
        }
        if flags & GZIP_FNAME != 0 {
            while self.fetch_byte()? != 0 {}
        }
        if flags & GZIP_FCOMMENT != 0 {
            while self.fetch_byte()? != 0 {}
        }
        if flags & GZIP_FHCRC != 0 {
            self.fetch_byte()?;
            self.fetch_byte()?;
        }
        Ok(())
    }

    fn parse_zlib_header(&mut self) -> io::Result<()> {
        let cmf = self.fetch_byte()?;
        let flg = self.fetch_byte()?;

        let header = ((cmf as u16) << 8) | flg as u16;
        if header % 31 != 0 {
            return Err(bad_data("zlib header check failed"));
        }
        if cmf & 0x0F != ZLIB_CM_DEFLATE {
            return Err(bad_data("unsupported zlib compression method"));
        }
        if cmf >> 4 > ZLIB_CINFO_32K_WINDOW {
            return Err(bad_data("zlib window size too large"));
        }

        if flg & 0x20 != 0 {
            /* FDICT: the stored id is the Adler-32 of the dictionary */
            let mut id = 0u32;
            for _ in 0..4 {
                id = (id << 8) | self.fetch_byte()? as u32;
            }
            let dict = self
                .dictionary
                .take()
                .ok_or_else(|| bad_data("preset dictionary required"))?;
            if adler32(1, &dict) != id {
                return Err(bad_data("preset dictionary id mismatch"));
            }
            self.inflator.set_dictionary(&dict);
        }
        Ok(())
    }

    fn check_trailer(&mut self) -> io::Result<()> {
        match self.format {
            Format::Gzip => {
                let mut stored_crc = 0u32;
                for shift in [0, 8, 16, 24] {
                    stored_crc |= (self.fetch_byte()? as u32) << shift;
                }
                if stored_crc != self.crc {
                    return Err(bad_data("gzip crc32 mismatch"));
                }
                let mut stored_size = 0u32;
                for shift in [0, 8, 16, 24] {
                    stored_size |= (self.fetch_byte()? as u32) << shift;
                }
                if stored_size != self.total_out as u32 {
                    return Err(bad_data("gzip length mismatch"));
                }
            }
            Format::Zlib => {
                let mut stored_adler = 0u32;
                for _ in 0..4 {
                    stored_adler = (stored_adler << 8) | self.fetch_byte()? as u32;
                }
                if stored_adler != self.adler {
                    return Err(bad_data("zlib adler32 mismatch"));
                }
            }
            _ => {}
        }
        Ok(())
    }
}

impl<R: Read> Read for InflateReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.done {
            return Ok(0);
        }
        if !self.header_done {
            self.parse_header()?;
        }

        loop {
            let (status, consumed, produced) =
                self.inflator
                    .inflate(&self.in_buf[self.in_pos..self.in_cap], buf, false);
            self.in_pos += consumed;

            if produced > 0 {
                if self.check_crc {
                    self.crc = crc32(self.crc, &buf[..produced]);
                }
                if self.check_adler {
                    self.adler = adler32(self.adler, &buf[..produced]);
                }
                self.total_out += produced as u64;
            }

            match status {
                InflateStatus::Ok => {
                    self.done = true;
                    self.check_trailer()?;
                    return Ok(produced);
                }
                InflateStatus::TargetExhausted => return Ok(produced),
                InflateStatus::SourceExhausted => {
                    if produced > 0 {
                        return Ok(produced);
                    }
                    if self.refill()? == 0 {
                        return Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "compressed stream truncated",
                        ));
                    }
                }
                InflateStatus::Error => {
                    return Err(match self.inflator.error() {
                        Some(ErrorKind::Oom) => {
                            io::Error::new(io::ErrorKind::OutOfMemory, "decoder allocation failed")
                        }
                        _ => bad_data("invalid deflate stream"),
                    });
                }
            }
        }
    }
}

fn bad_data(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}
