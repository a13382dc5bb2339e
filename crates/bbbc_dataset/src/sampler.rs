//! Deterministic contiguous-range sampling for train/validation splits.

use std::ops::Range;

/// Yields a contiguous range of dataset indices, `[start, start + num)`.
///
/// Used for the deterministic train/validation split: identical runs see
/// identical splits with no shuffling involved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSampler {
    num_samples: usize,
    start: usize,
}

impl ChunkSampler {
    pub fn new(num_samples: usize, start: usize) -> Self {
        Self { num_samples, start }
    }

    pub fn indices(&self) -> Range<usize> {
        self.start..self.start + self.num_samples
    }

    pub fn len(&self) -> usize {
        self.num_samples
    }

    pub fn is_empty(&self) -> bool {
        self.num_samples == 0
    }
}

impl IntoIterator for ChunkSampler {
    type Item = usize;
    type IntoIter = Range<usize>;

    fn into_iter(self) -> Self::IntoIter {
        self.indices()
    }
}

/// Split `len` samples into (train, val) samplers: the first `len / 2`
/// indices train, the remainder validate.
pub fn split_contiguous(len: usize) -> (ChunkSampler, ChunkSampler) {
    let num_train = len / 2;
    (
        ChunkSampler::new(num_train, 0),
        ChunkSampler::new(len - num_train, num_train),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampler_yields_contiguous_range() {
        let sampler = ChunkSampler::new(3, 5);
        let indices: Vec<usize> = sampler.into_iter().collect();
        assert_eq!(indices, vec![5, 6, 7]);
    }

    #[test]
    fn split_even_length() {
        let (train, val) = split_contiguous(10);
        assert_eq!(train.indices(), 0..5);
        assert_eq!(val.indices(), 5..10);
    }

    #[test]
    fn split_odd_length_gives_extra_sample_to_val() {
        let (train, val) = split_contiguous(7);
        assert_eq!(train.len(), 3);
        assert_eq!(val.len(), 4);
        assert_eq!(train.indices(), 0..3);
        assert_eq!(val.indices(), 3..7);
    }

    #[test]
    fn split_empty_dataset() {
        let (train, val) = split_contiguous(0);
        assert!(train.is_empty());
        assert!(val.is_empty());
    }

    #[test]
    fn split_single_sample_goes_to_val() {
        let (train, val) = split_contiguous(1);
        assert!(train.is_empty());
        assert_eq!(val.indices(), 0..1);
    }
}
