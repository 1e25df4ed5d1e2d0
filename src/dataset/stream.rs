//! Endless shuffled batch stream
//!
//! Yields batches of sample indices over a finite dataset forever. Every pass
//! over the data is freshly shuffled; the final batch of a pass may be
//! shorter than `batch_size`. Two streams built with the same seed yield the
//! same sequence.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

#[derive(Debug, Clone)]
pub struct BatchStream {
    len: usize,
    batch_size: usize,
    rng: ChaCha8Rng,
    order: Vec<usize>,
    cursor: usize,
    passes: usize,
}

impl BatchStream {
    pub fn new(len: usize, batch_size: usize, seed: u64) -> Self {
        let mut stream = Self {
            len,
            batch_size: batch_size.max(1),
            rng: ChaCha8Rng::seed_from_u64(seed),
            order: Vec::new(),
            cursor: 0,
            passes: 0,
        };
        stream.reshuffle();
        stream
    }

    /// Number of completed passes over the data
    pub fn passes(&self) -> usize {
        self.passes
    }

    /// Batches in one full pass
    pub fn batches_per_pass(&self) -> usize {
        self.len.div_ceil(self.batch_size)
    }

    fn reshuffle(&mut self) {
        self.order = (0..self.len).collect();
        self.order.shuffle(&mut self.rng);
        self.cursor = 0;
    }
}

impl Iterator for BatchStream {
    type Item = Vec<usize>;

    /// `None` only for an empty dataset
    fn next(&mut self) -> Option<Vec<usize>> {
        if self.len == 0 {
            return None;
        }

        if self.cursor >= self.len {
            self.passes += 1;
            self.reshuffle();
        }

        let end = (self.cursor + self.batch_size).min(self.len);
        let batch = self.order[self.cursor..end].to_vec();
        self.cursor = end;
        Some(batch)
    }
}
