use streamflate::{ErrorKind, InflateStatus, Inflator};

fn hex(s: &str) -> Vec<u8> {
    let clean: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    clean
        .as_bytes()
        .chunks(2)
        .map(|p| u8::from_str_radix(std::str::from_utf8(p).unwrap(), 16).unwrap())
        .collect()
}

fn inflate_all(data: &[u8]) -> Result<Vec<u8>, ErrorKind> {
    let mut inflator = Inflator::new();
    let mut out = vec![0u8; 1 << 16];
    let (status, _, produced) = inflator.inflate(data, &mut out, true);
    match status {
        InflateStatus::Ok => {
            out.truncate(produced);
            Ok(out)
        }
        InflateStatus::Error => Err(inflator.error().unwrap()),
        other => panic!("unexpected status {other:?}"),
    }
}

#[test]
fn empty_final_stored_block() {
    let out = inflate_all(&hex("01 00 00 ff ff")).unwrap();
    assert!(out.is_empty());
}

#[test]
fn one_byte_stored_block() {
    let out = inflate_all(&hex("01 01 00 fe ff 41")).unwrap();
    assert_eq!(out, b"A");
}

#[test]
fn empty_final_fixed_block() {
    let out = inflate_all(&hex("03 00")).unwrap();
    assert!(out.is_empty());
}

#[test]
fn fixed_huffman_hello() {
    let out = inflate_all(&hex("f3 48 cd c9 c9 07 00")).unwrap();
    assert_eq!(out, b"Hello");
}

#[test]
fn dynamic_huffman_abracadabra() {
    let out = inflate_all(&hex("15 c5 b1 11 00 00 00 01 b1 59 1f 13 d8 bf 70 aa a0 62 72 06"))
        .unwrap();
    assert_eq!(out, b"abracadabra");
}

#[test]
fn stored_then_fixed_block() {
    /* empty non-final stored block followed by a final fixed block */
    let out = inflate_all(&hex("00 00 00 ff ff f3 48 cd c9 c9 07 00")).unwrap();
    assert_eq!(out, b"Hello");
}

#[test]
fn stored_then_stored_block() {
    let out = inflate_all(&hex("00 01 00 fe ff 41 01 00 00 ff ff")).unwrap();
    assert_eq!(out, b"A");
}

#[test]
fn distance_one_replicates_previous_byte() {
    /* literal X then a length-258 distance-1 match */
    let out = inflate_all(&hex("8b 18 05 00")).unwrap();
    assert_eq!(out, vec![b'X'; 259]);
}

#[test]
fn reserved_block_type_is_rejected() {
    assert_eq!(inflate_all(&hex("06")).unwrap_err(), ErrorKind::BadBlock);
}

#[test]
fn stored_length_complement_mismatch() {
    assert_eq!(
        inflate_all(&hex("01 01 00 00 00 41")).unwrap_err(),
        ErrorKind::BadBlock
    );
}

#[test]
fn over_distance_reference() {
    /* literal A then a length-3 match at distance 4 with empty history */
    assert_eq!(inflate_all(&hex("73 04 62 00")).unwrap_err(), ErrorKind::FarOffset);
}

#[test]
fn truncated_dynamic_header_with_final_input() {
    assert_eq!(inflate_all(&hex("15 c5 b1")).unwrap_err(), ErrorKind::InputEnd);
}

#[test]
fn decoder_is_quiet_after_completion() {
    let mut inflator = Inflator::new();
    let mut out = vec![0u8; 64];
    let (status, consumed, produced) = inflator.inflate(&hex("f3 48 cd c9 c9 07 00"), &mut out, true);
    assert_eq!(status, InflateStatus::Ok);
    assert_eq!(consumed, 7);
    assert_eq!(produced, 5);
    assert!(inflator.is_done());

    let (status, consumed, produced) = inflator.inflate(b"garbage", &mut out, true);
    assert_eq!(status, InflateStatus::Ok);
    assert_eq!(consumed, 0);
    assert_eq!(produced, 0);
}

#[test]
fn dictionary_back_references() {
    let dict = b"The quick brown fox ";

    /* stream whose matches reach into the preset dictionary */
    let data = hex("0b c1 22 96 55 9a 5b 50 ac 90 5f 96 5a a4 50 02 94 ce 49 ac aa 54 48 c9 4f 07 00");
    let mut inflator = Inflator::new();
    assert!(inflator.set_dictionary(dict));
    let mut out = vec![0u8; 256];
    let (status, _, produced) = inflator.inflate(&data, &mut out, true);
    assert_eq!(status, InflateStatus::Ok);
    assert_eq!(&out[..produced], b"The quick brown fox jumps over the lazy dog");
}

#[test]
fn dictionary_only_match() {
    /* a single match of length 20 at distance 20 copies the entire
     * dictionary out of the window */
    let dict = b"The quick brown fox ";
    let mut inflator = Inflator::new();
    assert!(inflator.set_dictionary(dict));
    let mut out = vec![0u8; 64];
    let (status, _, produced) = inflator.inflate(&hex("c3 26 06 00"), &mut out, true);
    assert_eq!(status, InflateStatus::Ok);
    assert_eq!(&out[..produced], dict);
}

#[test]
fn dictionary_after_input_is_rejected() {
    let mut inflator = Inflator::new();
    let mut out = vec![0u8; 16];
    let _ = inflator.inflate(&hex("01"), &mut out, false);
    assert!(!inflator.set_dictionary(b"late"));
    assert_eq!(inflator.error(), Some(ErrorKind::BadState));
}

#[test]
fn reset_restores_a_clean_decoder() {
    let mut inflator = Inflator::new();
    let mut out = vec![0u8; 64];

    /* poison it, then reset and decode normally */
    let (status, _, _) = inflator.inflate(&hex("06"), &mut out, true);
    assert_eq!(status, InflateStatus::Error);

    inflator.reset();
    assert_eq!(inflator.error(), None);
    let (status, _, produced) = inflator.inflate(&hex("f3 48 cd c9 c9 07 00"), &mut out, true);
    assert_eq!(status, InflateStatus::Ok);
    assert_eq!(&out[..produced], b"Hello");

    inflator.reset();
    let (status, _, produced) = inflator.inflate(&hex("01 01 00 fe ff 41"), &mut out, true);
    assert_eq!(status, InflateStatus::Ok);
    assert_eq!(&out[..produced], b"A");
}

#[test]
fn trailing_bytes_are_not_consumed() {
    /* the consumed count must stop at the end of the stream so callers
     * can locate a trailer */
    let mut data = hex("f3 48 cd c9 c9 07 00");
    data.extend_from_slice(&[0xAA, 0xBB, 0xCC]);
    let mut inflator = Inflator::new();
    let mut out = vec![0u8; 64];
    let (status, consumed, produced) = inflator.inflate(&data, &mut out, false);
    assert_eq!(status, InflateStatus::Ok);
    assert_eq!(consumed, 7);
    assert_eq!(produced, 5);
}
