//! Scripted job service for tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::domain::JobStatus;
use crate::providers::traits::{JobResource, JobService, JobServiceError, JobServiceResult};

/// One scripted reply
#[derive(Debug, Clone)]
pub enum Reply {
    Job(JobResource),
    Error { status: u16, detail: String },
}

impl Reply {
    pub fn status(id: &str, status: JobStatus) -> Self {
        Reply::Job(JobResource {
            id: id.to_string(),
            status,
            input: None,
            output: None,
            error: None,
        })
    }

    pub fn succeeded(id: &str, output: &str) -> Self {
        Reply::Job(JobResource {
            id: id.to_string(),
            status: JobStatus::Succeeded,
            input: None,
            output: Some(output.to_string()),
            error: None,
        })
    }

    pub fn failed(id: &str, error: &str) -> Self {
        Reply::Job(JobResource {
            id: id.to_string(),
            status: JobStatus::Failed,
            input: None,
            output: None,
            error: Some(error.to_string()),
        })
    }

    pub fn error(status: u16, detail: &str) -> Self {
        Reply::Error {
            status,
            detail: detail.to_string(),
        }
    }

    fn into_result(self) -> JobServiceResult<JobResource> {
        match self {
            Reply::Job(resource) => Ok(resource),
            Reply::Error { status, detail } => Err(JobServiceError::Api { status, detail }),
        }
    }
}

/// Replays a fixed creation reply and a queue of status replies. The last
/// status reply repeats forever once the queue drains.
pub struct ScriptedJobService {
    create_reply: Mutex<Option<Reply>>,
    fetch_replies: Mutex<VecDeque<Reply>>,
    fetch_delay: Duration,
    create_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedJobService {
    pub fn new(create: Reply, fetches: Vec<Reply>) -> Self {
        Self {
            create_reply: Mutex::new(Some(create)),
            fetch_replies: Mutex::new(fetches.into()),
            fetch_delay: Duration::ZERO,
            create_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Each status call takes this long to answer
    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Highest number of status calls ever in flight at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_fetch(&self) -> Reply {
        let mut replies = self.fetch_replies.lock();
        if replies.len() > 1 {
            replies.pop_front().unwrap_or_else(|| Reply::error(500, "script exhausted"))
        } else {
            replies.front().cloned().unwrap_or_else(|| Reply::error(500, "script exhausted"))
        }
    }
}

#[async_trait]
impl JobService for ScriptedJobService {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn create_job(&self, image: &str) -> JobServiceResult<JobResource> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.create_reply.lock().clone().unwrap_or_else(|| Reply::error(500, "no create reply"));
        reply.into_result().map(|mut resource| {
            resource.input.get_or_insert_with(|| image.to_string());
            resource
        })
    }

    async fn fetch_job(&self, _id: &str) -> JobServiceResult<JobResource> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.fetch_delay.is_zero() {
            tokio::time::sleep(self.fetch_delay).await;
        }
        let reply = self.next_fetch();

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        reply.into_result()
    }
}
