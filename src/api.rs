use crate::adler32::adler32;
use crate::common::*;
use crate::crc32::crc32;
use crate::inflate::{InflateStatus, Inflator};
use std::io;

/// One-shot decompression of complete in-memory streams.
///
/// The caller supplies the expected size (or an output buffer); a
/// configurable expansion-ratio limit keeps hostile inputs from forcing
/// huge allocations.
pub struct Decompressor {
    inflator: Inflator,
    max_memory_limit: usize,
    limit_ratio: usize,
}

impl Decompressor {
    pub fn new() -> Self {
        Self {
            inflator: Inflator::new(),
            max_memory_limit: usize::MAX,
            limit_ratio: 2000,
        }
    }

    pub fn set_max_memory_limit(&mut self, limit: usize) {
        self.max_memory_limit = limit;
    }

    pub fn set_limit_ratio(&mut self, ratio: usize) {
        self.limit_ratio = ratio;
    }

    pub fn decompress_deflate(&mut self, data: &[u8], expected_size: usize) -> io::Result<Vec<u8>> {
        self.decompress_helper(data, expected_size, |this, data, out| {
            this.inflate_all(data, out).map(|(_, produced)| produced)
        })
    }

    pub fn decompress_deflate_into(&mut self, data: &[u8], output: &mut [u8]) -> io::Result<usize> {
        self.inflate_all(data, output).map(|(_, produced)| produced)
    }

    pub fn decompress_zlib(&mut self, data: &[u8], expected_size: usize) -> io::Result<Vec<u8>> {
        self.decompress_helper(data, expected_size, Self::zlib_into)
    }

    pub fn decompress_zlib_into(&mut self, data: &[u8], output: &mut [u8]) -> io::Result<usize> {
        self.zlib_into(data, output)
    }

    pub fn decompress_gzip(&mut self, data: &[u8], expected_size: usize) -> io::Result<Vec<u8>> {
        self.decompress_helper(data, expected_size, Self::gzip_into)
    }

    pub fn decompress_gzip_into(&mut self, data: &[u8], output: &mut [u8]) -> io::Result<usize> {
        self.gzip_into(data, output)
    }

    fn decompress_helper<F>(&mut self, data: &[u8], expected_size: usize, f: F) -> io::Result<Vec<u8>>
    where
        F: FnOnce(&mut Self, &[u8], &mut [u8]) -> io::Result<usize>,
    {
        /* deflate tops out near 1032:1, so anything past the configured
         * ratio is a hostile expected size, not a plausible stream */
        let limit = data
            .len()
            .saturating_mul(self.limit_ratio)
            .saturating_add(4096);
        if expected_size > limit {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "expected size {} exceeds safety limit for input size {}",
                    expected_size,
                    data.len()
                ),
            ));
        }
        if expected_size > self.max_memory_limit {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "expected size {} exceeds maximum memory limit {}",
                    expected_size, self.max_memory_limit
                ),
            ));
        }

        let mut output = Vec::new();
        output
            .try_reserve_exact(expected_size)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        output.resize(expected_size, 0);

        let produced = f(self, data, &mut output)?;
        output.truncate(produced);
        Ok(output)
    }

    /* whole-buffer inflate; returns consumed and produced counts */
    fn inflate_all(&mut self, data: &[u8], output: &mut [u8]) -> io::Result<(usize, usize)> {
        self.inflator.reset();
        let (status, consumed, produced) = self.inflator.inflate(data, output, true);
        match status {
            InflateStatus::Ok => Ok((consumed, produced)),
            InflateStatus::TargetExhausted => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "output buffer too small",
            )),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "decompression failed",
            )),
        }
    }

    fn zlib_into(&mut self, data: &[u8], output: &mut [u8]) -> io::Result<usize> {
        if data.len() < ZLIB_MIN_OVERHEAD {
            return Err(truncated());
        }

        let header = u16::from_be_bytes([data[0], data[1]]);
        if header % 31 != 0 {
            return Err(invalid("zlib header check failed"));
        }
        if ((header >> 8) & 0x0F) as u8 != ZLIB_CM_DEFLATE {
            return Err(invalid("unsupported zlib compression method"));
        }
        if ((header >> 12) & 0x0F) as u8 > ZLIB_CINFO_32K_WINDOW {
            return Err(invalid("zlib window size too large"));
        }
        if (header >> 5) & 1 != 0 {
            return Err(invalid("preset dictionaries are not supported here"));
        }

        let body = &data[ZLIB_MIN_HEADER_SIZE..data.len() - ZLIB_FOOTER_SIZE];
        let (consumed, produced) = self.inflate_all(body, output)?;

        let trailer = ZLIB_MIN_HEADER_SIZE + consumed;
        let stored_adler = u32::from_be_bytes([
            data[trailer],
            data[trailer + 1],
            data[trailer + 2],
            data[trailer + 3],
        ]);
        if adler32(1, &output[..produced]) != stored_adler {
            return Err(invalid("zlib adler32 mismatch"));
        }
        Ok(produced)
    }

    fn gzip_into(&mut self, data: &[u8], output: &mut [u8]) -> io::Result<usize> {
        if data.len() < GZIP_MIN_OVERHEAD {
            return Err(truncated());
        }
        if data[0] != GZIP_ID1 || data[1] != GZIP_ID2 {
            return Err(invalid("not a gzip stream"));
        }
        if data[2] != GZIP_CM_DEFLATE {
            return Err(invalid("unsupported gzip compression method"));
        }
        let flags = data[3];
        if flags & GZIP_FRESERVED != 0 {
            return Err(invalid("reserved gzip flags set"));
        }

        let mut pos = GZIP_MIN_HEADER_SIZE;
        if flags & GZIP_FEXTRA != 0 {
            if pos + 2 > data.len() {
                return Err(truncated());
            }
            let xlen = u16::from_le_bytes([data[pos], data[pos + 1]]) as usize;
            pos += 2 + xlen;
        }
        if flags & GZIP_FNAME != 0 {
            while pos < data.len() && data[pos] != 0 {
                pos += 1;
            }
            pos += 1;
        }
        if flags & GZIP_FCOMMENT != 0 {
            while pos < data.len() && data[pos] != 0 {
                pos += 1;
            }
            pos += 1;
        }
        if flags & GZIP_FHCRC != 0 {
            pos += 2;
        }
        if pos + GZIP_FOOTER_SIZE > data.len() {
            return Err(truncated());
        }

        let body = &data[pos..data.len() - GZIP_FOOTER_SIZE];
        let (consumed, produced) = self.inflate_all(body, output)?;

        let trailer = pos + consumed;
        let stored_crc = u32::from_le_bytes([
            data[trailer],
            data[trailer + 1],
            data[trailer + 2],
            data[trailer + 3],
        ]);
        if crc32(0, &output[..produced]) != stored_crc {
            return Err(invalid("gzip crc32 mismatch"));
        }
        let stored_size = u32::from_le_bytes([
            data[trailer + 4],
            data[trailer + 5],
            data[trailer + 6],
            data[trailer + 7],
        ]);
        if produced as u32 != stored_size {
            return Err(invalid("gzip length mismatch"));
        }
        Ok(produced)
    }
}

impl Default for Decompressor {
    fn default() -> Self {
        Self::new()
    }
}

fn invalid(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

fn truncated() -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, "compressed stream truncated")
}
