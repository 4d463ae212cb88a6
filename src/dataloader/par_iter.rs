use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver};
use tracing::debug;

/// Runs a batch source on a worker thread, keeping up to `prefetch_count`
/// items queued ahead of the consumer.
pub struct PrefetchIterator<T: Send + 'static> {
    receiver: Option<Receiver<T>>,
    worker: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> PrefetchIterator<T> {
    pub fn new<I>(source: I, prefetch_count: usize) -> Self
    where
        I: Iterator<Item = T> + Send + 'static,
    {
        let (sender, receiver) = bounded(prefetch_count);

        let worker = thread::spawn(move || {
            for item in source {
                // Receiver dropped, nobody wants more batches
                if sender.send(item).is_err() {
                    break;
                }
            }
            debug!("prefetch worker finished");
        });

        Self {
            receiver: Some(receiver),
            worker: Some(worker),
        }
    }
}

impl<T: Send + 'static> Iterator for PrefetchIterator<T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        self.receiver.as_ref()?.recv().ok()
    }
}

impl<T: Send + 'static> Drop for PrefetchIterator<T> {
    fn drop(&mut self) {
        // Closing the channel first unblocks a worker waiting on a full queue
        drop(self.receiver.take());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

pub trait Prefetch: Iterator + Send + Sized + 'static
where
    Self::Item: Send + 'static,
{
    fn prefetch(self, prefetch_count: usize) -> PrefetchIterator<Self::Item> {
        PrefetchIterator::new(self, prefetch_count)
    }
}

impl<I> Prefetch for I
where
    I: Iterator + Send + 'static,
    I::Item: Send + 'static,
{
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yields_items_in_order_then_ends() {
        let items: Vec<u32> = (0..10).prefetch(2).collect();
        assert_eq!(items, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn dropping_stops_an_endless_source() {
        let mut iter = (0u64..).prefetch(3);
        assert_eq!(iter.next(), Some(0));
        assert_eq!(iter.next(), Some(1));
        drop(iter);
    }
}
