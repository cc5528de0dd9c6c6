// Location: src/processing/forward.rs

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::{
    config::StreamConfig,
    error::{EngineError, Result},
    types::StreamEvent,
};

use super::queue::TokenQueue;

/// Consumer thread that drains the handoff queue and delivers coalesced
/// fragments as [`StreamEvent`]s over a channel.
///
/// A batch is flushed once `flush_every_fragments` fragments have gathered
/// or `flush_interval` passed since the last flush. When the stream becomes
/// inactive the queue is drained, the remainder flushed, and `Done` sent.
pub struct StreamForwarder {
    events: Receiver<StreamEvent>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl StreamForwarder {
    pub(crate) fn spawn(queue: Arc<TokenQueue>, config: StreamConfig) -> Result<Self> {
        let (tx, rx) = unbounded();
        let stop = Arc::new(AtomicBool::new(false));

        let handle = {
            let stop = stop.clone();
            thread::Builder::new()
                .name("llama-forward".into())
                .spawn(move || forward_loop(&queue, &config, &stop, &tx))
                .map_err(|e| EngineError::WorkerError {
                    message: format!("failed to spawn stream forwarder: {}", e),
                })?
        };

        Ok(Self {
            events: rx,
            stop,
            handle: Some(handle),
        })
    }

    /// Channel the events arrive on
    pub fn events(&self) -> &Receiver<StreamEvent> {
        &self.events
    }

    /// Block until the next event; `None` once the forwarder has exited
    pub fn recv(&self) -> Option<StreamEvent> {
        self.events.recv().ok()
    }

    /// Block until `Done` and return the concatenated text
    pub fn collect_text(self) -> String {
        let mut text = String::new();
        while let Some(event) = self.recv() {
            match event {
                StreamEvent::Token(piece) => text.push_str(&piece),
                StreamEvent::Done => break,
            }
        }
        text
    }

    /// Stop the consumer thread. The stream itself keeps running.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("Stream forwarder panicked");
            }
        }
    }
}

impl Drop for StreamForwarder {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn forward_loop(queue: &TokenQueue, config: &StreamConfig, stop: &AtomicBool, tx: &Sender<StreamEvent>) {
    let mut buffer = String::new();
    let mut buffered = 0usize;
    let mut emitted = 0usize;
    let mut last_flush = Instant::now();

    let flush = |buffer: &mut String, buffered: &mut usize| -> bool {
        if buffer.is_empty() {
            return true;
        }
        *buffered = 0;
        tx.send(StreamEvent::Token(std::mem::take(buffer))).is_ok()
    };

    loop {
        if stop.load(Ordering::Acquire) {
            return;
        }

        match queue.pop_timeout(config.idle_poll_interval) {
            Some(piece) => {
                buffer.push_str(&piece);
                buffered += 1;
                emitted += 1;
            }
            None if !queue.is_active() => break,
            None => {}
        }

        if buffered >= config.flush_every_fragments
            || (buffered > 0 && last_flush.elapsed() >= config.flush_interval)
        {
            if !flush(&mut buffer, &mut buffered) {
                return;
            }
            last_flush = Instant::now();
        }
    }

    // Pushes are refused once the queue is inactive, so this drain is final.
    while let Some(piece) = queue.try_pop() {
        buffer.push_str(&piece);
        emitted += 1;
    }
    if flush(&mut buffer, &mut buffered) {
        let _ = tx.send(StreamEvent::Done);
    }
    tracing::debug!(fragments = emitted, "Stream forwarder done");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn fast_config() -> StreamConfig {
        StreamConfig {
            flush_every_fragments: 2,
            flush_interval: Duration::from_secs(60),
            idle_poll_interval: Duration::from_millis(2),
        }
    }

    #[test]
    fn test_batches_and_done() {
        let queue = Arc::new(TokenQueue::new());
        queue.open();
        for piece in ["a", "b", "c", "d", "e"] {
            queue.push(piece.to_string());
        }
        queue.close();

        let forwarder = StreamForwarder::spawn(queue, fast_config()).unwrap();
        let mut events = Vec::new();
        while let Some(event) = forwarder.recv() {
            let done = event == StreamEvent::Done;
            events.push(event);
            if done {
                break;
            }
        }

        assert_eq!(
            events,
            vec![
                StreamEvent::Token("ab".to_string()),
                StreamEvent::Token("cd".to_string()),
                StreamEvent::Token("e".to_string()),
                StreamEvent::Done,
            ]
        );
    }

    #[test]
    fn test_inactive_empty_queue_finishes_immediately() {
        let queue = Arc::new(TokenQueue::new());
        let forwarder = StreamForwarder::spawn(queue, fast_config()).unwrap();
        assert_eq!(forwarder.recv(), Some(StreamEvent::Done));
    }

    #[test]
    fn test_live_producer_text_is_preserved() {
        let queue = Arc::new(TokenQueue::new());
        queue.open();
        let forwarder = StreamForwarder::spawn(queue.clone(), fast_config()).unwrap();

        let producer = thread::spawn(move || {
            for i in 0..20 {
                queue.push(format!("{} ", i));
                thread::sleep(Duration::from_millis(1));
            }
            queue.close();
        });

        let text = forwarder.collect_text();
        producer.join().unwrap();
        let expected: String = (0..20).map(|i| format!("{} ", i)).collect();
        assert_eq!(text, expected);
    }

    #[test]
    fn test_stop_while_stream_active() {
        let queue = Arc::new(TokenQueue::new());
        queue.open();
        let forwarder = StreamForwarder::spawn(queue.clone(), fast_config()).unwrap();
        forwarder.stop();
        assert!(queue.is_active());
    }
}
