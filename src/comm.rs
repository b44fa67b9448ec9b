//! Rank-addressed collective used by the aggregation step.

use std::any::{type_name, Any};
use std::sync::mpsc::{channel, Receiver, Sender};

use crate::error::{Error, Result};

pub const ROOT: usize = 0;

/// A fixed group of `size` workers addressed by rank; rank 0 is root.
pub trait Communicator {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    fn is_root(&self) -> bool {
        self.rank() == ROOT
    }

    /// Collects one value from every rank on root, in rank order.
    ///
    /// Root gets `Some(values)` with its own value at index 0; every other
    /// rank gets `None`. Fails with [`Error::WorkerLost`] when a peer has
    /// gone away instead of waiting for it.
    fn gather<T: Send + 'static>(&self, value: T) -> Result<Option<Vec<T>>>;
}

type Payload = Box<dyn Any + Send>;

enum Link {
    Root { inbound: Vec<Receiver<Payload>> },
    Worker { to_root: Sender<Payload> },
}

/// In-process communicator for a group of worker threads.
///
/// Every non-root endpoint owns the only sender of its channel to root, so
/// an endpoint dropped by a failed or panicked worker disconnects that
/// channel and root sees it on the next receive.
pub struct LocalComm {
    rank: usize,
    size: usize,
    link: Link,
}

impl LocalComm {
    /// One endpoint per rank, ordered by rank.
    pub fn group(size: usize) -> Result<Vec<LocalComm>> {
        if size == 0 {
            return Err(Error::Partition(
                "communicator group needs at least one rank".to_string(),
            ));
        }
        let mut inbound = Vec::with_capacity(size - 1);
        let mut workers = Vec::with_capacity(size - 1);
        for rank in 1..size {
            let (tx, rx) = channel();
            inbound.push(rx);
            workers.push(LocalComm {
                rank,
                size,
                link: Link::Worker { to_root: tx },
            });
        }
        let mut group = Vec::with_capacity(size);
        group.push(LocalComm {
            rank: ROOT,
            size,
            link: Link::Root { inbound },
        });
        group.extend(workers);
        Ok(group)
    }
}

impl Communicator for LocalComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn gather<T: Send + 'static>(&self, value: T) -> Result<Option<Vec<T>>> {
        match &self.link {
            Link::Worker { to_root } => {
                to_root
                    .send(Box::new(value))
                    .map_err(|_| Error::WorkerLost { rank: ROOT })?;
                Ok(None)
            }
            Link::Root { inbound } => {
                let mut values = Vec::with_capacity(self.size);
                values.push(value);
                for (idx, rx) in inbound.iter().enumerate() {
                    let rank = idx + 1;
                    let payload = rx.recv().map_err(|_| Error::WorkerLost { rank })?;
                    let value = payload.downcast::<T>().map_err(|_| Error::GatherMismatch {
                        extractor: String::new(),
                        rank,
                        detail: format!("payload is not a {}", type_name::<T>()),
                    })?;
                    values.push(*value);
                }
                Ok(Some(values))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn root_receives_values_in_rank_order() {
        let mut group = LocalComm::group(4).unwrap();
        let root = group.remove(0);
        let handles: Vec<_> = group
            .into_iter()
            .rev()
            .map(|comm| thread::spawn(move || comm.gather(comm.rank() * 10).unwrap()))
            .collect();

        let gathered = root.gather(0usize).unwrap();
        assert_eq!(gathered, Some(vec![0, 10, 20, 30]));
        for handle in handles {
            assert_eq!(handle.join().unwrap(), None);
        }
    }

    #[test]
    fn single_rank_group_is_its_own_root() {
        let group = LocalComm::group(1).unwrap();
        assert!(group[0].is_root());
        assert_eq!(group[0].gather("only").unwrap(), Some(vec!["only"]));
    }

    #[test]
    fn dropped_endpoint_reports_lost_worker() {
        let mut group = LocalComm::group(3).unwrap();
        let lost = group.remove(2);
        let root = group.remove(0);
        let survivor = group.remove(0);
        drop(lost);

        survivor.gather(1u8).unwrap();
        let err = root.gather(0u8).unwrap_err();
        assert!(matches!(err, Error::WorkerLost { rank: 2 }));
    }

    #[test]
    fn worker_notices_root_is_gone() {
        let mut group = LocalComm::group(2).unwrap();
        let worker = group.remove(1);
        drop(group);
        assert!(matches!(
            worker.gather(()).unwrap_err(),
            Error::WorkerLost { rank: ROOT }
        ));
    }

    #[test]
    fn empty_group_is_rejected() {
        assert!(LocalComm::group(0).is_err());
    }
}
