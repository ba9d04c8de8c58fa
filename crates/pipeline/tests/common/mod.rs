#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use genbatch_core::{
    Credential, GenerationError, GenerationRequest, Job, JobId, JobState, RawResponse, ResultSink,
    RetryPolicy, SinkError, Ticket, Transport,
};
use genbatch_events::{JobEvent, JobEventKind};
use genbatch_pipeline::EventStream;
use tokio::time::Instant;

/// What the mock answers once its script is used up.
#[derive(Clone, Copy)]
pub enum Fallback {
    /// 200 with a fresh image URL per call.
    Succeed,
    /// The given HTTP status.
    Fail(u16),
}

/// Scriptable [`Transport`] that records how it was called.
pub struct MockTransport {
    script: Mutex<VecDeque<RawResponse>>,
    fallback: Fallback,
    latency: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    call_times: Mutex<Vec<Instant>>,
}

impl MockTransport {
    pub fn new(fallback: Fallback) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            call_times: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(Fallback::Succeed)
    }

    pub fn failing(status: u16) -> Self {
        Self::new(Fallback::Fail(status))
    }

    /// Answer the first calls with `responses`, in order.
    pub fn with_script(self, responses: impl IntoIterator<Item = RawResponse>) -> Self {
        self.script.lock().unwrap().extend(responses);
        self
    }

    /// Hold every call open for `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.call_times.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(
        &self,
        _url: &str,
        _credential: &Credential,
        _request: &GenerationRequest,
    ) -> Result<RawResponse, GenerationError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.call_times.lock().unwrap().push(Instant::now());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let scripted = self.script.lock().unwrap().pop_front();
        Ok(scripted.unwrap_or_else(|| match self.fallback {
            Fallback::Succeed => {
                RawResponse::ok_with_content(&format!("[点击下载](https://cdn.example/img-{n}.png)"))
            }
            Fallback::Fail(status) => RawResponse::new(status, "upstream unavailable"),
        }))
    }
}

/// [`ResultSink`] that records saves, or fails every one.
#[derive(Default)]
pub struct MockSink {
    pub fail: bool,
    pub saved: Mutex<Vec<(JobId, String)>>,
}

#[async_trait]
impl ResultSink for MockSink {
    async fn save(&self, job_id: &JobId, url: &str) -> Result<PathBuf, SinkError> {
        if self.fail {
            return Err(SinkError::Status(404));
        }
        self.saved.lock().unwrap().push((job_id.clone(), url.to_string()));
        Ok(PathBuf::from(format!("out/{job_id}.png")))
    }
}

pub fn job(id: &str, prompt: &str) -> Job {
    Job::new(id, prompt, Credential::new("sk-test"))
}

/// Default timing with jitter kept, so tests see real backoff delays.
pub fn policy() -> RetryPolicy {
    RetryPolicy::default()
}

/// Everything currently buffered in the stream.
pub fn drain(stream: &mut EventStream) -> Vec<JobEvent> {
    let mut events = Vec::new();
    while let Some(event) = stream.try_recv() {
        events.push(event);
    }
    events
}

/// Event kinds grouped by ticket, in emission order.
pub fn by_ticket(events: &[JobEvent]) -> BTreeMap<Ticket, Vec<JobEventKind>> {
    let mut map: BTreeMap<Ticket, Vec<JobEventKind>> = BTreeMap::new();
    for event in events {
        map.entry(event.ticket).or_default().push(event.kind.clone());
    }
    map
}

/// Only the state-changing events.
pub fn transitions(kinds: &[JobEventKind]) -> Vec<JobState> {
    kinds.iter().filter_map(JobEventKind::state).collect()
}

/// Whether `kinds` walks the job life-cycle from `Pending` to a terminal
/// state, one legal step at a time.
pub fn is_valid_path(kinds: &[JobEventKind]) -> bool {
    let states = transitions(kinds);
    let Some((first, rest)) = states.split_first() else {
        return false;
    };
    if *first != JobState::Pending {
        return false;
    }
    let mut current = first;
    for next in rest {
        if current.is_terminal() || !current.can_transition_to(next) {
            return false;
        }
        current = next;
    }
    current.is_terminal()
}

pub fn count_retries(kinds: &[JobEventKind]) -> usize {
    kinds
        .iter()
        .filter(|k| matches!(k, JobEventKind::RetryWaiting { .. }))
        .count()
}
