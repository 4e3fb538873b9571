use streamflate::{InflateStatus, Inflator};

fn hex(s: &str) -> Vec<u8> {
    let clean: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    clean
        .as_bytes()
        .chunks(2)
        .map(|p| u8::from_str_radix(std::str::from_utf8(p).unwrap(), 16).unwrap())
        .collect()
}

/* deterministic mix of matches and literals */
fn corpus(len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len + 64);
    let mut state = 0x2545_F491_4F6C_DD1Du64;
    while out.len() < len {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        match (state >> 60) & 3 {
            0 => out.extend_from_slice(b"the quick brown fox jumps over the lazy dog "),
            1 => out.extend_from_slice(b"incremental decoding must survive every boundary "),
            _ => out.push((state >> 32) as u8),
        }
    }
    out.truncate(len);
    out
}

fn deflate(data: &[u8]) -> Vec<u8> {
    let mut compressor =
        libdeflater::Compressor::new(libdeflater::CompressionLvl::new(9).unwrap());
    let mut out = vec![0u8; compressor.deflate_compress_bound(data.len())];
    let n = compressor.deflate_compress(data, &mut out).unwrap();
    out.truncate(n);
    out
}

/* feeds the stream in fixed-size input chunks, draining through a
 * fixed-size output buffer */
fn inflate_chunked(data: &[u8], in_chunk: usize, out_chunk: usize) -> Vec<u8> {
    let mut inflator = Inflator::new();
    let mut out = Vec::new();
    let mut buf = vec![0u8; out_chunk];
    let mut pos = 0usize;
    loop {
        let end = (pos + in_chunk).min(data.len());
        let (status, consumed, produced) =
            inflator.inflate(&data[pos..end], &mut buf, end == data.len());
        pos += consumed;
        out.extend_from_slice(&buf[..produced]);
        match status {
            InflateStatus::Ok => return out,
            InflateStatus::SourceExhausted | InflateStatus::TargetExhausted => {}
            InflateStatus::Error => panic!("decode error: {:?}", inflator.error()),
        }
    }
}

#[test]
fn chunk_size_does_not_change_output() {
    let vectors = [
        hex("01 00 00 ff ff"),
        hex("01 01 00 fe ff 41"),
        hex("f3 48 cd c9 c9 07 00"),
        hex("15 c5 b1 11 00 00 00 01 b1 59 1f 13 d8 bf 70 aa a0 62 72 06"),
        hex("8b 18 05 00"),
    ];

    for data in &vectors {
        let whole = inflate_chunked(data, data.len().max(1), 1 << 16);
        for in_chunk in [1usize, 7, 8192] {
            for out_chunk in [1usize, 3, 1 << 16] {
                let chunked = inflate_chunked(data, in_chunk, out_chunk);
                assert_eq!(chunked, whole, "in_chunk={in_chunk} out_chunk={out_chunk}");
            }
        }
    }
}

#[test]
fn stored_block_resumes_mid_copy() {
    /* 1 KiB stored payload pushed through one-byte buffers on both
     * sides */
    let payload: Vec<u8> = (0..1024u32).map(|i| (i % 251) as u8).collect();
    let mut data = Vec::new();
    data.push(0x01);
    data.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    data.extend_from_slice(&(!(payload.len() as u16)).to_le_bytes());
    data.extend_from_slice(&payload);

    assert_eq!(inflate_chunked(&data, 1, 1), payload);
    assert_eq!(inflate_chunked(&data, 9, 17), payload);
}

#[test]
fn long_match_resumes_mid_copy() {
    let expected = vec![b'X'; 259];
    /* output buffers smaller than the match force suspensions inside the
     * copy itself */
    assert_eq!(inflate_chunked(&hex("8b 18 05 00"), 1, 1), expected);
    assert_eq!(inflate_chunked(&hex("8b 18 05 00"), 2, 100), expected);
}

#[test]
fn round_trip_large_corpus() {
    let data = corpus(300_000);
    let compressed = deflate(&data);
    let out = inflate_chunked(&compressed, compressed.len(), data.len() + 1);
    assert_eq!(out, data);
}

#[test]
fn round_trip_with_small_buffers_uses_the_window() {
    /* output segments far smaller than the window force every long-range
     * match through the history buffer, including wrapped runs */
    let data = corpus(200_000);
    let compressed = deflate(&data);

    let out = inflate_chunked(&compressed, 1024, 777);
    assert_eq!(out, data);

    let out = inflate_chunked(&compressed, 13, 4096);
    assert_eq!(out, data);
}

#[test]
fn incompressible_input_round_trips() {
    /* stored blocks dominate when the data has no structure */
    let mut data = vec![0u8; 100_000];
    let mut state = 0x9E37_79B9_7F4A_7C15u64;
    for b in data.iter_mut() {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        *b = state as u8;
    }
    let compressed = deflate(&data);
    assert_eq!(inflate_chunked(&compressed, 4096, 4096), data);
    assert_eq!(inflate_chunked(&compressed, 7, 64), data);
}

#[test]
fn one_decoder_many_streams() {
    let mut inflator = Inflator::new();
    let data = corpus(50_000);
    let compressed = deflate(&data);

    for _ in 0..3 {
        inflator.reset();
        let mut out = vec![0u8; data.len() + 1];
        let (status, _, produced) = inflator.inflate(&compressed, &mut out, true);
        assert_eq!(status, InflateStatus::Ok);
        assert_eq!(&out[..produced], &data[..]);
    }
}
