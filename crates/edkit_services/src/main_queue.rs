//! Deferred hand-off to the main update loop
//!
//! Anything may post a message from any thread; the host drains the queue
//! once per frame on the main thread and acts on the messages there.

use std::sync::mpsc::{self, Receiver, Sender};

/// Receiving end, owned by whoever runs the main loop.
#[derive(Debug)]
pub struct MainQueue<T> {
    sender: Sender<T>,
    receiver: Receiver<T>,
}

/// Posting end. Cheap to clone and `Send` when `T` is.
#[derive(Debug)]
pub struct QueueSender<T> {
    sender: Sender<T>,
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<T> QueueSender<T> {
    /// Queue a message for the next drain. Messages posted after the queue
    /// was dropped are discarded.
    pub fn post(&self, message: T) {
        if self.sender.send(message).is_err() {
            tracing::trace!("main queue closed, message dropped");
        }
    }
}

impl<T> MainQueue<T> {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self { sender, receiver }
    }

    pub fn sender(&self) -> QueueSender<T> {
        QueueSender {
            sender: self.sender.clone(),
        }
    }

    /// Take every message posted so far, in posting order.
    pub fn drain(&self) -> Vec<T> {
        self.receiver.try_iter().collect()
    }
}

impl<T> Default for MainQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_in_order() {
        let queue = MainQueue::new();
        let sender = queue.sender();
        sender.post(1);
        sender.post(2);
        assert_eq!(queue.drain(), vec![1, 2]);
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn accepts_posts_from_other_threads() {
        let queue = MainQueue::new();
        let sender = queue.sender();
        std::thread::spawn(move || sender.post("from worker"))
            .join()
            .unwrap();
        assert_eq!(queue.drain(), vec!["from worker"]);
    }

    #[test]
    fn posting_after_drop_is_harmless() {
        let queue = MainQueue::<u8>::new();
        let sender = queue.sender();
        drop(queue);
        sender.post(1);
    }
}
