//! Resumable DEFLATE decoder.
//!
//! The decoder consumes input and produces output in caller-sized chunks;
//! whenever either side runs dry it suspends with its exact position saved
//! and continues from there on the next call. Decoded history beyond the
//! current output slice lives in a 32 KiB sliding window so back-references
//! keep resolving across calls.

mod fast;
mod tables;
mod window;

use crate::common::*;

use self::tables::{
    build_table, static_tables, Entry, TableKind, DIST_ENOUGH, DIST_ROOT_BITS, LITLEN_ENOUGH,
    LITLEN_ROOT_BITS, PRECODE_ROOT_BITS, TAG_END_OF_BLOCK, TAG_INVALID, TAG_LITERAL, TAG_SUBTABLE,
};
use self::window::Window;

/// Outcome of an [`Inflator::inflate`] call.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[must_use = "the decode result must be checked"]
pub enum InflateStatus {
    /// The stream is complete; further calls keep returning this.
    Ok,
    /// The input slice was fully consumed and more input may follow.
    SourceExhausted,
    /// The output slice is full; drain it and call again.
    TargetExhausted,
    /// The stream is dead; see [`Inflator::error`].
    Error,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ErrorKind {
    /// Operation attempted in the wrong order, e.g. installing a
    /// dictionary after input was consumed.
    BadState,
    /// Window or table storage could not be allocated.
    Oom,
    /// Reserved block type, or stored-block length complement mismatch.
    BadBlock,
    /// Malformed dynamic block header.
    BadTree,
    /// A bit pattern with no assigned code was consumed.
    BadCode,
    /// Back-reference beyond the decoded history.
    FarOffset,
    /// The caller declared the input complete but the stream needs more.
    InputEnd,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Stage {
    BlockHeader,
    Stored,
    Dynamic,
    Decode,
    Done,
    Bad,
}

/* micro-phases of the resumable loops, shared by whichever stage is
 * active; Decode uses all five */
const SUB_SYMBOL: u32 = 0;
const SUB_LENGTH_EXTRA: u32 = 1;
const SUB_DIST_SYMBOL: u32 = 2;
const SUB_DIST_EXTRA: u32 = 3;
const SUB_COPY: u32 = 4;

/* outcome of one stage's worth of work */
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum BlockStatus {
    Done,
    SourceExhausted,
    TargetExhausted,
    Error,
}

struct TableStore {
    /* literal/length table first, distance table after it */
    entries: Box<[Entry]>,
    /* scratch for the decoded code lengths of a dynamic header */
    lengths: Box<[u16]>,
}

impl TableStore {
    fn new() -> Self {
        TableStore {
            entries: Box::default(),
            lengths: Box::default(),
        }
    }

    fn allocate(&mut self) -> bool {
        if !self.entries.is_empty() {
            return true;
        }
        let mut entries = Vec::new();
        if entries.try_reserve_exact(LITLEN_ENOUGH + DIST_ENOUGH).is_err() {
            return false;
        }
        entries.resize(LITLEN_ENOUGH + DIST_ENOUGH, Entry::default());

        let mut lengths = Vec::new();
        let n = DEFLATE_NUM_LITLEN_SYMS + DEFLATE_NUM_OFFSET_SYMS;
        if lengths.try_reserve_exact(n).is_err() {
            return false;
        }
        lengths.resize(n, 0);

        self.entries = entries.into_boxed_slice();
        self.lengths = lengths.into_boxed_slice();
        true
    }
}

/* order in which the code-length code lengths are transmitted */
static CODE_LENGTH_ORDER: [usize; DEFLATE_NUM_PRECODE_SYMS] = [
    16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];

/// Streaming DEFLATE decompressor.
///
/// Create once, [`reset`](Inflator::reset) between streams. The window and
/// table storage are acquired on the first reset and kept for the lifetime
/// of the value.
pub struct Inflator {
    stage: Stage,
    error: Option<ErrorKind>,
    substate: u32,
    final_block: bool,
    final_input: bool,
    used: bool,

    /* dynamic header progress */
    lit_count: usize,
    dist_count: usize,
    pre_count: usize,
    len_index: usize,

    /* partially decoded stored block or match */
    stored_len: usize,
    match_len: usize,
    match_extra: u32,
    match_dist: usize,

    /* bit reservoir, least significant bits first */
    bit_buf: u64,
    bit_count: u32,

    window: Window,
    tables: TableStore,
    fixed_loaded: bool,
}

impl Inflator {
    pub fn new() -> Self {
        let mut inflator = Inflator {
            stage: Stage::BlockHeader,
            error: None,
            substate: 0,
            final_block: false,
            final_input: false,
            used: false,
            lit_count: 0,
            dist_count: 0,
            pre_count: 0,
            len_index: 0,
            stored_len: 0,
            match_len: 0,
            match_extra: 0,
            match_dist: 0,
            bit_buf: 0,
            bit_count: 0,
            window: Window::new(),
            tables: TableStore::new(),
            fixed_loaded: false,
        };
        inflator.reset();
        inflator
    }

    /// Prepares for a new stream. Storage allocated by a previous reset is
    /// reused; decode behavior does not depend on prior history.
    pub fn reset(&mut self) {
        self.stage = Stage::BlockHeader;
        self.error = None;
        self.substate = 0;
        self.final_block = false;
        self.final_input = false;
        self.used = false;
        self.lit_count = 0;
        self.dist_count = 0;
        self.pre_count = 0;
        self.len_index = 0;
        self.stored_len = 0;
        self.match_len = 0;
        self.match_extra = 0;
        self.match_dist = 0;
        self.bit_buf = 0;
        self.bit_count = 0;

        if !self.window.allocate() || !self.tables.allocate() {
            self.error = Some(ErrorKind::Oom);
            self.stage = Stage::Bad;
            return;
        }
        self.window.clear();
    }

    /// The error that moved the decoder into its dead state, if any.
    pub fn error(&self) -> Option<ErrorKind> {
        self.error
    }

    /// True once the final block has been fully decoded.
    pub fn is_done(&self) -> bool {
        self.stage == Stage::Done
    }

    /// Installs a preset dictionary; the trailing 32 KiB become visible to
    /// back-references of the first block. Only valid directly after a
    /// reset, before any input is consumed.
    pub fn set_dictionary(&mut self, dict: &[u8]) -> bool {
        if self.used || self.error.is_some() {
            self.error = Some(ErrorKind::BadState);
            self.stage = Stage::Bad;
            return false;
        }
        self.window.load(dict);
        self.used = true;
        true
    }

    /// Advances the stream, reading from `src` and writing to `dst`.
    /// Returns the status along with the consumed and produced byte
    /// counts. Each call treats `dst` as a fresh output segment; once the
    /// call returns the produced bytes have been absorbed into the window
    /// and the buffer may be reused.
    ///
    /// `final_input` promises that no input beyond `src` will ever arrive;
    /// running dry after that promise is an [`ErrorKind::InputEnd`] error.
    /// On suspension, bits of partially consumed bytes stay buffered in
    /// the reservoir and are picked up by the next call. Once the stream
    /// completes, whole unread bytes are given back so the consumed count
    /// stops exactly after the final block and the caller can read any
    /// trailer directly.
    pub fn inflate(
        &mut self,
        src: &[u8],
        dst: &mut [u8],
        final_input: bool,
    ) -> (InflateStatus, usize, usize) {
        if final_input {
            self.final_input = true;
        }
        self.used = true;

        if self.error.is_some() {
            return (InflateStatus::Error, 0, 0);
        }

        let mut in_pos = 0usize;
        let mut out_pos = 0usize;
        let status = self.run(src, &mut in_pos, dst, &mut out_pos);

        if status == InflateStatus::SourceExhausted && self.final_input {
            self.error = Some(ErrorKind::InputEnd);
            self.stage = Stage::Bad;
            return (InflateStatus::Error, in_pos, out_pos);
        }
        (status, in_pos, out_pos)
    }

    fn run(
        &mut self,
        src: &[u8],
        in_pos: &mut usize,
        dst: &mut [u8],
        out_pos: &mut usize,
    ) -> InflateStatus {
        loop {
            let step = match self.stage {
                Stage::BlockHeader => {
                    if !self.try_read_bits(src, in_pos, 3) {
                        BlockStatus::SourceExhausted
                    } else {
                        self.final_block = self.get_bits(1) != 0;
                        self.drop_bits(1);
                        let block_type = self.get_bits(2) as u8;
                        self.drop_bits(2);

                        match block_type {
                            DEFLATE_BLOCKTYPE_UNCOMPRESSED => self.stage = Stage::Stored,
                            DEFLATE_BLOCKTYPE_STATIC_HUFFMAN => {
                                self.load_fixed_tables();
                                self.stage = Stage::Decode;
                            }
                            DEFLATE_BLOCKTYPE_DYNAMIC_HUFFMAN => self.stage = Stage::Dynamic,
                            _ => {
                                self.fail(ErrorKind::BadBlock);
                                return InflateStatus::Error;
                            }
                        }
                        continue;
                    }
                }
                Stage::Stored => self.decode_stored(src, in_pos, dst, out_pos),
                Stage::Dynamic => {
                    let step = self.decode_dynamic_header(src, in_pos);
                    if step == BlockStatus::Done {
                        self.stage = Stage::Decode;
                        continue;
                    }
                    step
                }
                Stage::Decode => self.decode_block(src, in_pos, dst, out_pos),
                Stage::Done => {
                    self.trim_reservoir(in_pos);
                    return InflateStatus::Ok;
                }
                Stage::Bad => return InflateStatus::Error,
            };

            match step {
                BlockStatus::Done => {
                    if self.final_block {
                        self.stage = Stage::Done;
                        self.window.update(&dst[..*out_pos]);
                        self.trim_reservoir(in_pos);
                        return InflateStatus::Ok;
                    }
                    self.stage = Stage::BlockHeader;
                }
                BlockStatus::SourceExhausted => {
                    self.window.update(&dst[..*out_pos]);
                    return InflateStatus::SourceExhausted;
                }
                BlockStatus::TargetExhausted => {
                    self.window.update(&dst[..*out_pos]);
                    return InflateStatus::TargetExhausted;
                }
                BlockStatus::Error => return InflateStatus::Error,
            }
        }
    }

    fn fail(&mut self, kind: ErrorKind) -> BlockStatus {
        self.error = Some(kind);
        self.stage = Stage::Bad;
        BlockStatus::Error
    }

    /* bit reservoir: bytes shift in at bit_count, bits leave from the low
     * end */

    #[inline]
    fn try_read_bits(&mut self, src: &[u8], in_pos: &mut usize, n: u32) -> bool {
        while self.bit_count < n {
            if *in_pos >= src.len() {
                return false;
            }
            self.bit_buf |= (src[*in_pos] as u64) << self.bit_count;
            *in_pos += 1;
            self.bit_count += 8;
        }
        true
    }

    #[inline]
    fn fetch_byte(&mut self, src: &[u8], in_pos: &mut usize) -> bool {
        if *in_pos < src.len() {
            self.bit_buf |= (src[*in_pos] as u64) << self.bit_count;
            *in_pos += 1;
            self.bit_count += 8;
            return true;
        }
        false
    }

    #[inline]
    fn get_bits(&self, n: u32) -> u64 {
        self.bit_buf & ((1u64 << n) - 1)
    }

    #[inline]
    fn drop_bits(&mut self, n: u32) {
        self.bit_buf >>= n;
        self.bit_count -= n;
    }

    /* at end of stream, gives whole over-pulled bytes back to the input
     * cursor so the consumed count stops exactly after the final block;
     * the padding bits of a partially used byte are discarded */
    fn trim_reservoir(&mut self, in_pos: &mut usize) {
        let excess = (self.bit_count >> 3) as usize;
        *in_pos -= excess;
        self.bit_count &= 7;
        self.bit_buf &= (1u64 << self.bit_count) - 1;
    }

    fn load_fixed_tables(&mut self) {
        if self.fixed_loaded {
            return;
        }
        let st = static_tables();
        self.tables.entries[..LITLEN_ENOUGH].copy_from_slice(&st.litlen);
        self.tables.entries[LITLEN_ENOUGH..LITLEN_ENOUGH + DIST_ENOUGH].copy_from_slice(&st.dist);
        self.fixed_loaded = true;
    }

    /* stored block: align, LEN, ~LEN, then a byte-for-byte copy that can
     * suspend on either side */
    fn decode_stored(
        &mut self,
        src: &[u8],
        in_pos: &mut usize,
        dst: &mut [u8],
        out_pos: &mut usize,
    ) -> BlockStatus {
        if self.substate == 0 {
            if !self.try_read_bits(src, in_pos, 8) {
                return BlockStatus::SourceExhausted;
            }
            let skip = self.bit_count & 7;
            self.drop_bits(skip);
            self.substate = 1;
        }
        if self.substate == 1 {
            if !self.try_read_bits(src, in_pos, 16) {
                return BlockStatus::SourceExhausted;
            }
            self.stored_len = self.get_bits(16) as usize;
            self.drop_bits(16);
            self.substate = 2;
        }
        if self.substate == 2 {
            if !self.try_read_bits(src, in_pos, 16) {
                return BlockStatus::SourceExhausted;
            }
            let nlen = self.get_bits(16) as u16;
            self.drop_bits(16);
            if !(self.stored_len as u16) != nlen {
                return self.fail(ErrorKind::BadBlock);
            }
            self.substate = 3;
        }

        let source_left = src.len() - *in_pos;
        let target_left = dst.len() - *out_pos;
        let run = self.stored_len.min(source_left).min(target_left);

        dst[*out_pos..*out_pos + run].copy_from_slice(&src[*in_pos..*in_pos + run]);
        *in_pos += run;
        *out_pos += run;
        self.stored_len -= run;

        if self.stored_len > 0 {
            if target_left == run {
                return BlockStatus::TargetExhausted;
            }
            return BlockStatus::SourceExhausted;
        }
        self.substate = 0;
        BlockStatus::Done
    }

    /* dynamic block header: HLIT/HDIST/HCLEN, the code-length code, then
     * the run-length-encoded lengths for both main tables */
    fn decode_dynamic_header(&mut self, src: &[u8], in_pos: &mut usize) -> BlockStatus {
        if self.substate == 0 {
            if !self.try_read_bits(src, in_pos, 14) {
                return BlockStatus::SourceExhausted;
            }
            self.lit_count = self.get_bits(5) as usize + 257;
            self.drop_bits(5);
            self.dist_count = self.get_bits(5) as usize + 1;
            self.drop_bits(5);
            self.pre_count = self.get_bits(4) as usize + 4;
            self.drop_bits(4);

            if self.lit_count > 286 || self.dist_count > 30 {
                return self.fail(ErrorKind::BadTree);
            }
            self.substate = 1;
            self.len_index = 0;
        }

        if self.substate == 1 {
            while self.len_index < self.pre_count {
                if !self.try_read_bits(src, in_pos, 3) {
                    return BlockStatus::SourceExhausted;
                }
                self.tables.lengths[CODE_LENGTH_ORDER[self.len_index]] = self.get_bits(3) as u16;
                self.drop_bits(3);
                self.len_index += 1;
            }
            for i in self.pre_count..DEFLATE_NUM_PRECODE_SYMS {
                self.tables.lengths[CODE_LENGTH_ORDER[i]] = 0;
            }

            let tables = &mut self.tables;
            let built = build_table(
                &tables.lengths[..DEFLATE_NUM_PRECODE_SYMS],
                &mut tables.entries[..LITLEN_ENOUGH],
                TableKind::CodeLen,
            );
            if !built {
                return self.fail(ErrorKind::BadTree);
            }
            self.substate = 2;
            self.len_index = 0;
        }

        let step = self.read_code_lengths(src, in_pos);
        if step != BlockStatus::Done {
            return step;
        }

        if self.tables.lengths[DEFLATE_END_OF_BLOCK] == 0 {
            return self.fail(ErrorKind::BadTree);
        }

        let tables = &mut self.tables;
        let built = build_table(
            &tables.lengths[..self.lit_count],
            &mut tables.entries[..LITLEN_ENOUGH],
            TableKind::LitLen,
        );
        if !built {
            return self.fail(ErrorKind::BadTree);
        }
        let built = build_table(
            &tables.lengths[self.lit_count..self.lit_count + self.dist_count],
            &mut tables.entries[LITLEN_ENOUGH..],
            TableKind::Distance,
        );
        if !built {
            return self.fail(ErrorKind::BadTree);
        }

        self.fixed_loaded = false;
        self.substate = 0;
        BlockStatus::Done
    }

    fn read_code_lengths(&mut self, src: &[u8], in_pos: &mut usize) -> BlockStatus {
        /* extra bits and repeat base for symbols 16, 17, 18 */
        static REPEAT_INFO: [(u32, usize); 3] = [(2, 3), (3, 3), (7, 11)];

        let total = self.lit_count + self.dist_count;
        while self.len_index < total {
            let e = loop {
                let e = self.tables.entries[self.get_bits(PRECODE_ROOT_BITS as u32) as usize];
                if (e.length as u32) <= self.bit_count {
                    break e;
                }
                if !self.fetch_byte(src, in_pos) {
                    return BlockStatus::SourceExhausted;
                }
            };

            if e.info < 16 {
                self.tables.lengths[self.len_index] = e.info;
                self.len_index += 1;
                self.drop_bits(e.length as u32);
                continue;
            }

            let (extra_bits, base) = REPEAT_INFO[e.info as usize - 16];
            if !self.try_read_bits(src, in_pos, e.length as u32 + extra_bits) {
                return BlockStatus::SourceExhausted;
            }
            self.drop_bits(e.length as u32);
            let repeat = base + self.get_bits(extra_bits) as usize;
            self.drop_bits(extra_bits);

            let value = if e.info == 16 {
                if self.len_index == 0 {
                    return self.fail(ErrorKind::BadTree);
                }
                self.tables.lengths[self.len_index - 1]
            } else {
                0
            };

            if self.len_index + repeat > total {
                return self.fail(ErrorKind::BadTree);
            }
            for _ in 0..repeat {
                self.tables.lengths[self.len_index] = value;
                self.len_index += 1;
            }
        }
        BlockStatus::Done
    }

    /* pulls bytes until the selected literal/length entry's code fits in
     * the reservoir, resolving subtable redirections */
    fn read_litlen_symbol(&mut self, src: &[u8], in_pos: &mut usize) -> Option<Entry> {
        let mut e = loop {
            let e = self.tables.entries[self.get_bits(LITLEN_ROOT_BITS as u32) as usize];
            if (e.length as u32) <= self.bit_count {
                break e;
            }
            if !self.fetch_byte(src, in_pos) {
                return None;
            }
        };
        if e.etag == TAG_SUBTABLE {
            let base = e.info as usize;
            let bits = e.length as u32;
            e = loop {
                let sub = self.tables.entries
                    [base + (self.get_bits(bits) >> LITLEN_ROOT_BITS) as usize];
                if (sub.length as u32) <= self.bit_count {
                    break sub;
                }
                if !self.fetch_byte(src, in_pos) {
                    return None;
                }
            };
        }
        Some(e)
    }

    fn read_dist_symbol(&mut self, src: &[u8], in_pos: &mut usize) -> Option<Entry> {
        let mut e = loop {
            let e = self.tables.entries
                [LITLEN_ENOUGH + self.get_bits(DIST_ROOT_BITS as u32) as usize];
            if (e.length as u32) <= self.bit_count {
                break e;
            }
            if !self.fetch_byte(src, in_pos) {
                return None;
            }
        };
        if e.etag == TAG_SUBTABLE {
            let base = e.info as usize;
            let bits = e.length as u32;
            e = loop {
                let sub = self.tables.entries
                    [LITLEN_ENOUGH + base + (self.get_bits(bits) >> DIST_ROOT_BITS) as usize];
                if (sub.length as u32) <= self.bit_count {
                    break sub;
                }
                if !self.fetch_byte(src, in_pos) {
                    return None;
                }
            };
        }
        Some(e)
    }

    /* the literal/length/distance cycle; each arm is one resumable
     * micro-phase and falls through to the next by updating substate */
    fn decode_block(
        &mut self,
        src: &[u8],
        in_pos: &mut usize,
        dst: &mut [u8],
        out_pos: &mut usize,
    ) -> BlockStatus {
        let mut try_fast = true;
        loop {
            match self.substate {
                SUB_SYMBOL => {
                    if try_fast {
                        try_fast = false;
                        if src.len() - *in_pos >= fast::FAST_SOURCE_SLACK
                            && dst.len() - *out_pos >= fast::FAST_TARGET_SLACK
                        {
                            match fast::decode(self, src, in_pos, dst, out_pos) {
                                fast::FastStatus::BlockDone => return BlockStatus::Done,
                                fast::FastStatus::Error => return BlockStatus::Error,
                                fast::FastStatus::More => {}
                            }
                        }
                    }

                    let e = match self.read_litlen_symbol(src, in_pos) {
                        Some(e) => e,
                        None => return BlockStatus::SourceExhausted,
                    };

                    if e.etag == TAG_LITERAL {
                        if *out_pos >= dst.len() {
                            /* the code stays unconsumed and is re-read on
                             * resume */
                            return BlockStatus::TargetExhausted;
                        }
                        dst[*out_pos] = e.info as u8;
                        *out_pos += 1;
                        self.drop_bits(e.length as u32);
                        continue;
                    }
                    if e.etag == TAG_END_OF_BLOCK {
                        self.drop_bits(e.length as u32);
                        return BlockStatus::Done;
                    }
                    if e.etag == TAG_INVALID {
                        return self.fail(ErrorKind::BadCode);
                    }

                    self.drop_bits(e.length as u32);
                    self.match_len = e.info as usize;
                    self.match_extra = e.etag as u32;
                    self.substate = SUB_LENGTH_EXTRA;
                }
                SUB_LENGTH_EXTRA => {
                    let extra = self.match_extra;
                    if !self.try_read_bits(src, in_pos, extra) {
                        return BlockStatus::SourceExhausted;
                    }
                    self.match_len += self.get_bits(extra) as usize;
                    self.drop_bits(extra);
                    self.substate = SUB_DIST_SYMBOL;
                }
                SUB_DIST_SYMBOL => {
                    let e = match self.read_dist_symbol(src, in_pos) {
                        Some(e) => e,
                        None => return BlockStatus::SourceExhausted,
                    };
                    if e.etag == TAG_INVALID {
                        return self.fail(ErrorKind::BadCode);
                    }
                    self.drop_bits(e.length as u32);
                    self.match_dist = e.info as usize;
                    self.match_extra = e.etag as u32;
                    self.substate = SUB_DIST_EXTRA;
                }
                SUB_DIST_EXTRA => {
                    let extra = self.match_extra;
                    if !self.try_read_bits(src, in_pos, extra) {
                        return BlockStatus::SourceExhausted;
                    }
                    self.match_dist += self.get_bits(extra) as usize;
                    self.drop_bits(extra);
                    self.substate = SUB_COPY;
                }
                _ => {
                    let step = self.copy_match(dst, out_pos);
                    if step != BlockStatus::Done {
                        return step;
                    }
                    self.substate = SUB_SYMBOL;
                }
            }
        }
    }

    /* resolves one back-reference; the source is the current output
     * segment when the distance stays inside it, otherwise the window
     * first and the segment after the window run is exhausted */
    fn copy_match(&mut self, dst: &mut [u8], out_pos: &mut usize) -> BlockStatus {
        let mut length = self.match_len;
        let distance = self.match_dist;

        loop {
            let available = dst.len() - *out_pos;
            if available == 0 {
                self.match_len = length;
                return BlockStatus::TargetExhausted;
            }

            let produced = *out_pos;
            let run;
            if distance > produced {
                let back = distance - produced;
                let history = match self.window.lookback(back) {
                    Some(history) => history,
                    None => return self.fail(ErrorKind::FarOffset),
                };
                run = history.len().min(length).min(available);
                dst[produced..produced + run].copy_from_slice(&history[..run]);
            } else {
                run = length.min(available);
                let from = produced - distance;
                /* overlapping forward copy; byte order realizes repeats */
                for i in 0..run {
                    dst[produced + i] = dst[from + i];
                }
            }
            *out_pos += run;
            length -= run;
            if length == 0 {
                self.match_len = 0;
                return BlockStatus::Done;
            }
        }
    }
}

impl Default for Inflator {
    fn default() -> Self {
        Inflator::new()
    }
}
