//! Round-robin distribution of cases across parallel workers.

use mdo_core::{MdoError, MdoResult};
use serde::{Deserialize, Serialize};
use std::iter::Enumerate;
use tracing::debug;

/// Position of one worker among `size` workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerComm {
    pub rank: usize,
    pub size: usize,
}

impl WorkerComm {
    pub fn new(rank: usize, size: usize) -> MdoResult<Self> {
        if size == 0 || rank >= size {
            return Err(MdoError::Config(format!(
                "worker rank {rank} is not valid for {size} workers"
            )));
        }
        Ok(Self { rank, size })
    }

    /// A single worker owning every case.
    pub fn serial() -> Self {
        Self { rank: 0, size: 1 }
    }

    pub fn owns(&self, index: usize) -> bool {
        index % self.size == self.rank
    }
}

/// Every case of the inner sequence is enumerated, but only the cases this
/// worker owns are yielded, with their global index.
pub struct ShardedCases<I> {
    inner: Enumerate<I>,
    comm: WorkerComm,
}

pub fn shard<I: IntoIterator>(cases: I, comm: WorkerComm) -> ShardedCases<I::IntoIter> {
    ShardedCases {
        inner: cases.into_iter().enumerate(),
        comm,
    }
}

impl<I: Iterator> Iterator for ShardedCases<I> {
    type Item = (usize, I::Item);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (index, case) = self.inner.next()?;
            if self.comm.owns(index) {
                return Some((index, case));
            }
            debug!(rank = self.comm.rank, index, "skipping case");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cases_are_dealt_round_robin() {
        let rank0: Vec<usize> = shard(0..5, WorkerComm::new(0, 2).unwrap())
            .map(|(i, _)| i)
            .collect();
        let rank1: Vec<usize> = shard(0..5, WorkerComm::new(1, 2).unwrap())
            .map(|(i, _)| i)
            .collect();
        assert_eq!(rank0, vec![0, 2, 4]);
        assert_eq!(rank1, vec![1, 3]);
    }

    #[test]
    fn serial_worker_owns_everything() {
        assert_eq!(shard("abc".chars(), WorkerComm::serial()).count(), 3);
    }

    #[test]
    fn invalid_ranks_are_rejected() {
        assert!(WorkerComm::new(2, 2).is_err());
        assert!(WorkerComm::new(0, 0).is_err());
    }
}
