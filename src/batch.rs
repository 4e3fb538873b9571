use crate::inflate::{InflateStatus, Inflator};
use rayon::prelude::*;

/// Decompresses many independent raw DEFLATE streams in parallel, one
/// decoder per worker. Single streams are never split across threads.
pub struct BatchDecompressor;

impl BatchDecompressor {
    pub fn new() -> Self {
        Self
    }

    pub fn decompress_batch(
        &self,
        inputs: &[&[u8]],
        max_out_sizes: &[usize],
    ) -> Vec<Option<Vec<u8>>> {
        inputs
            .par_iter()
            .zip(max_out_sizes.par_iter())
            .map_init(Inflator::new, |inflator, (&input, &max_size)| {
                let mut output = vec![0u8; max_size];
                inflator.reset();
                let (status, _, produced) = inflator.inflate(input, &mut output, true);
                if status == InflateStatus::Ok {
                    output.truncate(produced);
                    Some(output)
                } else {
                    None
                }
            })
            .collect()
    }
}

impl Default for BatchDecompressor {
    fn default() -> Self {
        Self::new()
    }
}
