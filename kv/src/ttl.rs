//! TTL scheduler: a min-heap of pending expirations plus a background
//! deleter thread, driven by a `crossbeam-channel` so scheduling a new job
//! never blocks on the heap. Grounded on `examples/original_source/ttl.go`'s
//! heap + event-channel + deleter-goroutine design; translated to a
//! `std::thread` select loop with lazy invalidation in place of the
//! original's indexed heap removal (simpler, and cancellation is rare
//! enough that a stale heap entry costing one extra pop is no concern).

use std::collections::{BinaryHeap, HashMap};
use std::cmp::Reverse;
use std::sync::Mutex;
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crossbeam_channel::{bounded, Receiver, Sender};

pub(crate) fn now_ns() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos() as u64
}

enum Message {
    Schedule { key: Vec<u8>, expires_at_ns: u64 },
    Cancel { key: Vec<u8> },
    Stop,
}

pub struct TtlScheduler {
    sender: Sender<Message>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TtlScheduler {
    /// Spawns the deleter thread. `deleter` is called (off the scheduling
    /// thread) once per key whose TTL fires and hasn't since been
    /// rescheduled or canceled.
    pub fn start<F>(deleter: F) -> Self
    where
        F: Fn(&[u8]) + Send + 'static,
    {
        let (sender, receiver) = bounded(1024);
        let handle = std::thread::spawn(move || Self::run(receiver, deleter));
        TtlScheduler { sender, handle: Mutex::new(Some(handle)) }
    }

    pub fn schedule(&self, key: Vec<u8>, expires_at_ns: u64) {
        let _ = self.sender.send(Message::Schedule { key, expires_at_ns });
    }

    pub fn cancel(&self, key: Vec<u8>) {
        let _ = self.sender.send(Message::Cancel { key });
    }

    pub fn stop(&self) {
        let _ = self.sender.send(Message::Stop);
        if let Some(handle) = self.handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }

    fn run<F>(receiver: Receiver<Message>, deleter: F)
    where
        F: Fn(&[u8]),
    {
        let mut heap: BinaryHeap<Reverse<(u64, Vec<u8>)>> = BinaryHeap::new();
        // The *current* valid expiry for a key; a heap entry whose expiry
        // doesn't match this map's value for its key is stale and skipped.
        let mut current: HashMap<Vec<u8>, u64> = HashMap::new();

        loop {
            let timeout = heap
                .peek()
                .map(|Reverse((expires_at_ns, _))| {
                    let now = now_ns();
                    if *expires_at_ns <= now {
                        Duration::from_millis(0)
                    } else {
                        Duration::from_nanos(expires_at_ns - now)
                    }
                })
                .unwrap_or_else(|| Duration::from_secs(3600));

            match receiver.recv_timeout(timeout) {
                Ok(Message::Schedule { key, expires_at_ns }) => {
                    current.insert(key.clone(), expires_at_ns);
                    heap.push(Reverse((expires_at_ns, key)));
                }
                Ok(Message::Cancel { key }) => {
                    current.remove(&key);
                }
                Ok(Message::Stop) => break,
                Err(_) => {}
            }

            let now = now_ns();
            while let Some(Reverse((expires_at_ns, key))) = heap.peek().cloned() {
                if expires_at_ns > now {
                    break;
                }
                heap.pop();
                if current.get(&key) == Some(&expires_at_ns) {
                    current.remove(&key);
                    deleter(&key);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex as StdMutex};

    #[test]
    fn fires_after_expiry_and_respects_cancel() {
        let fired = Arc::new(StdMutex::new(Vec::new()));
        let fired_clone = fired.clone();
        let scheduler = TtlScheduler::start(move |key: &[u8]| {
            fired_clone.lock().unwrap().push(key.to_vec());
        });

        scheduler.schedule(b"a".to_vec(), now_ns() + 1);
        scheduler.schedule(b"b".to_vec(), now_ns() + 60_000_000_000);
        scheduler.cancel(b"b".to_vec());

        std::thread::sleep(Duration::from_millis(50));
        scheduler.stop();

        let got = fired.lock().unwrap();
        assert_eq!(got.as_slice(), [b"a".to_vec()]);
    }
}
