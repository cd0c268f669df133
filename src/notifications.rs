//! Per-job notification channel
//!
//! Each job gets a topic backed by a bounded [`broadcast`] channel. Publishing
//! never waits on subscribers: a subscriber that falls more than
//! `subscriber_buffer` events behind loses the oldest ones and carries on
//! from the oldest retained event.
//!
//! A topic remembers its latest event so a new subscriber starts from the
//! job's current state. Closing a topic sends the terminal event and drops
//! the sender; subscribers that arrive afterwards receive only the terminal
//! event. Every subscription yields exactly one terminal event and then ends.

use crate::types::{JobEvent, JobId};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::Stream;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

struct Topic {
    /// `None` once the terminal event has been sent
    sender: Option<broadcast::Sender<JobEvent>>,
    /// Most recent event (the terminal one once closed)
    last: Option<JobEvent>,
}

/// Fan-out of job events to subscribers
///
/// Cloning is cheap; all clones share the same topics.
#[derive(Clone)]
pub struct NotificationHub {
    topics: Arc<DashMap<JobId, Topic>>,
    capacity: usize,
}

impl NotificationHub {
    /// Create a hub whose per-subscriber buffer holds `capacity` events
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Attach to a job's events
    ///
    /// `current` describes the job as the caller last saw it and is replayed
    /// first unless the topic already holds a newer event.
    ///
    /// A terminal `current` for a job without a topic (already evicted, or
    /// not closed yet) is replayed without creating one.
    pub fn subscribe(&self, job_id: JobId, current: JobEvent) -> Subscription {
        let (receiver, pending) = match self.topics.entry(job_id) {
            Entry::Occupied(topic) => {
                let topic = topic.get();
                (
                    topic.sender.as_ref().map(broadcast::Sender::subscribe),
                    topic.last.clone().unwrap_or(current),
                )
            }
            Entry::Vacant(_) if current.is_terminal() => (None, current),
            Entry::Vacant(vacant) => {
                let sender = broadcast::channel(self.capacity).0;
                let receiver = sender.subscribe();
                vacant.insert(Topic {
                    sender: Some(sender),
                    last: None,
                });
                (Some(receiver), current)
            }
        };

        tracing::debug!(job_id = %job_id, "subscriber attached");

        Subscription {
            job_id,
            pending: Some(pending),
            receiver,
            hub: self.clone(),
            finished: false,
        }
    }

    /// Fan a non-terminal event out to the job's subscribers
    ///
    /// Ignored once the topic is closed. Returns the number of subscribers
    /// the event was queued for.
    pub fn publish(&self, event: JobEvent) -> usize {
        if event.is_terminal() {
            return usize::from(self.close(event));
        }

        let job_id = event.job_id();
        let mut topic = self.topics.entry(job_id).or_insert_with(|| Topic {
            sender: Some(broadcast::channel(self.capacity).0),
            last: None,
        });

        let Some(sender) = topic.sender.clone() else {
            return 0;
        };
        topic.last = Some(event.clone());
        // Sent under the shard lock so a concurrent subscribe either sees
        // this event as `last` or receives it on its channel, never both.
        sender.send(event).unwrap_or(0)
    }

    /// Send the terminal event and close the job's topic
    ///
    /// Only the first call has an effect; it returns `true`.
    pub fn close(&self, terminal: JobEvent) -> bool {
        let job_id = terminal.job_id();
        let mut topic = self.topics.entry(job_id).or_insert_with(|| Topic {
            sender: None,
            last: None,
        });

        if topic.last.as_ref().is_some_and(JobEvent::is_terminal) {
            return false;
        }

        topic.last = Some(terminal.clone());
        if let Some(sender) = topic.sender.take() {
            let delivered = sender.send(terminal).unwrap_or(0);
            tracing::debug!(job_id = %job_id, subscribers = delivered, "topic closed");
        }
        true
    }

    /// Forget a job's topic (after eviction)
    pub fn remove(&self, job_id: JobId) {
        self.topics.remove(&job_id);
    }

    /// Number of live receivers for a job
    pub fn subscriber_count(&self, job_id: JobId) -> usize {
        self.topics
            .get(&job_id)
            .and_then(|topic| topic.sender.as_ref().map(|s| s.receiver_count()))
            .unwrap_or(0)
    }

    fn terminal_event(&self, job_id: JobId) -> Option<JobEvent> {
        self.topics
            .get(&job_id)
            .and_then(|topic| topic.last.clone())
            .filter(JobEvent::is_terminal)
    }
}

/// One consumer's attachment to a job
///
/// Yields the job's current state, then live events in publication order,
/// then exactly one terminal event, then `None`.
pub struct Subscription {
    job_id: JobId,
    pending: Option<JobEvent>,
    receiver: Option<broadcast::Receiver<JobEvent>>,
    hub: NotificationHub,
    finished: bool,
}

impl Subscription {
    /// Job this subscription follows
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Next event, or `None` once the stream is over
    pub async fn recv(&mut self) -> Option<JobEvent> {
        if self.finished {
            return None;
        }

        if let Some(event) = self.pending.take() {
            return Some(self.emit(event));
        }

        loop {
            let Some(receiver) = self.receiver.as_mut() else {
                return self.finish_from_hub();
            };

            match receiver.recv().await {
                Ok(event) => return Some(self.emit(event)),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        job_id = %self.job_id,
                        skipped,
                        "subscriber lagging, oldest events dropped"
                    );
                }
                Err(RecvError::Closed) => {
                    self.receiver = None;
                }
            }
        }
    }

    /// Detach from the job; safe to call more than once
    pub fn unsubscribe(&mut self) {
        if !self.finished {
            tracing::debug!(job_id = %self.job_id, "subscriber detached");
        }
        self.finished = true;
        self.pending = None;
        self.receiver = None;
    }

    /// Whether the stream has ended
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Adapt into a [`Stream`] of events
    pub fn into_stream(self) -> impl Stream<Item = JobEvent> {
        futures::stream::unfold(self, |mut subscription| async move {
            subscription
                .recv()
                .await
                .map(|event| (event, subscription))
        })
    }

    fn emit(&mut self, event: JobEvent) -> JobEvent {
        if event.is_terminal() {
            self.finished = true;
            self.receiver = None;
        }
        event
    }

    /// The channel ended without us seeing the terminal event (e.g. the
    /// topic was removed); fall back to whatever the hub still remembers.
    fn finish_from_hub(&mut self) -> Option<JobEvent> {
        self.finished = true;
        self.hub.terminal_event(self.job_id)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
