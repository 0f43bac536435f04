// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory fakes for the control plane and provisioner plugins.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gantry_proto::{
    AcquiredJob, CancelledJob, CompletedJob, ControlPlane, JobUpdate, RpcError, UpdateStream,
};
use gantry_provisionerd::{Daemon, Options, Provisioners};
use gantry_sdk::{
    ParseRequest, ParseResponse, Provisioner, ProvisionRequest, ProvisionResponse,
};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub const WAIT: Duration = Duration::from_secs(5);

/// Everything the fake control plane observed, in arrival order.
#[derive(Debug)]
pub enum PlaneEvent {
    Acquired,
    Updated(JobUpdate),
    Cancelled(CancelledJob),
    Completed(CompletedJob),
}

/// Control plane serving a scripted queue of jobs. Once the queue is
/// drained every acquire returns the empty job.
pub struct FakeControlPlane {
    jobs: Mutex<VecDeque<AcquiredJob>>,
    events: mpsc::UnboundedSender<PlaneEvent>,
    stream_closed: CancellationToken,
}

impl FakeControlPlane {
    pub fn new(jobs: Vec<AcquiredJob>) -> (Arc<Self>, mpsc::UnboundedReceiver<PlaneEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let plane = Arc::new(Self {
            jobs: Mutex::new(jobs.into()),
            events,
            stream_closed: CancellationToken::new(),
        });
        (plane, events_rx)
    }
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    async fn acquire_job(&self) -> Result<AcquiredJob, RpcError> {
        let job = self.jobs.lock().pop_front().unwrap_or_default();
        let _ = self.events.send(PlaneEvent::Acquired);
        Ok(job)
    }

    async fn update_job(&self) -> Result<Box<dyn UpdateStream>, RpcError> {
        Ok(Box::new(FakeUpdateStream {
            events: self.events.clone(),
            closed: self.stream_closed.clone(),
        }))
    }

    async fn cancel_job(&self, job: CancelledJob) -> Result<(), RpcError> {
        let _ = self.events.send(PlaneEvent::Cancelled(job));
        Ok(())
    }

    async fn complete_job(&self, job: CompletedJob) -> Result<(), RpcError> {
        let _ = self.events.send(PlaneEvent::Completed(job));
        Ok(())
    }

    async fn close(&self) {
        self.stream_closed.cancel();
    }
}

struct FakeUpdateStream {
    events: mpsc::UnboundedSender<PlaneEvent>,
    closed: CancellationToken,
}

#[async_trait]
impl UpdateStream for FakeUpdateStream {
    async fn send(&self, update: JobUpdate) -> Result<(), RpcError> {
        if self.closed.is_cancelled() {
            return Err(RpcError::Closed);
        }
        let _ = self.events.send(PlaneEvent::Updated(update));
        Ok(())
    }

    async fn closed(&self) {
        self.closed.cancelled().await;
    }

    async fn close(&self) {
        self.closed.cancel();
    }
}

type Handler<Req, Resp> = Box<
    dyn Fn(Req, mpsc::Sender<Resp>) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync,
>;

/// Provisioner whose parse/provision behavior is scripted per test.
/// A method without a handler returns a stream that ends immediately.
#[derive(Default)]
pub struct FakeProvisioner {
    parse: Option<Handler<ParseRequest, ParseResponse>>,
    provision: Option<Handler<ProvisionRequest, ProvisionResponse>>,
}

impl FakeProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_parse<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(ParseRequest, mpsc::Sender<ParseResponse>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.parse = Some(Box::new(move |req, tx| {
            Box::pin(handler(req, tx)) as Pin<Box<dyn Future<Output = ()> + Send>>
        }));
        self
    }

    pub fn on_provision<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(ProvisionRequest, mpsc::Sender<ProvisionResponse>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.provision = Some(Box::new(move |req, tx| {
            Box::pin(handler(req, tx)) as Pin<Box<dyn Future<Output = ()> + Send>>
        }));
        self
    }
}

#[async_trait]
impl Provisioner for FakeProvisioner {
    async fn parse(
        &self,
        request: ParseRequest,
    ) -> Result<mpsc::Receiver<ParseResponse>, RpcError> {
        let (tx, rx) = mpsc::channel(16);
        if let Some(handler) = &self.parse {
            tokio::spawn(handler(request, tx));
        }
        Ok(rx)
    }

    async fn provision(
        &self,
        request: ProvisionRequest,
    ) -> Result<mpsc::Receiver<ProvisionResponse>, RpcError> {
        let (tx, rx) = mpsc::channel(16);
        if let Some(handler) = &self.provision {
            tokio::spawn(handler(request, tx));
        }
        Ok(rx)
    }
}

/// Build an in-memory tar of the files provided. Mode `0` exercises the
/// extractor's 0600 default. Entry names are written into the raw header
/// field: `tar::Builder` refuses `..` components, and hostile archives
/// are not that polite.
pub fn tar_archive(files: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0);
        header.as_gnu_mut().unwrap().name[..path.len()].copy_from_slice(path.as_bytes());
        header.set_cksum();
        builder.append(&header, content.as_bytes()).unwrap();
    }
    builder.into_inner().unwrap()
}

pub fn provisioners(entries: Vec<(&str, FakeProvisioner)>) -> Provisioners {
    let mut registry = Provisioners::new();
    for (kind, provisioner) in entries {
        registry.insert(kind, Arc::new(provisioner));
    }
    registry
}

/// Daemon wired to the fake control plane, polling fast.
pub fn new_daemon(
    plane: Arc<FakeControlPlane>,
    provisioners: Provisioners,
    work_directory: std::path::PathBuf,
) -> Daemon {
    let dialer = move || {
        let plane = Arc::clone(&plane);
        async move {
            let client: Arc<dyn ControlPlane> = plane;
            Ok(client)
        }
    };
    Daemon::new(
        dialer,
        Options { poll_interval: Duration::from_millis(50), provisioners, work_directory },
    )
}

pub async fn next_event(events: &mut mpsc::UnboundedReceiver<PlaneEvent>) -> PlaneEvent {
    tokio::time::timeout(WAIT, events.recv())
        .await
        .expect("timed out waiting for control plane event")
        .expect("event channel closed")
}

/// Wait until the control plane has seen `n` acquire attempts.
pub async fn wait_for_acquires(events: &mut mpsc::UnboundedReceiver<PlaneEvent>, n: usize) {
    let mut seen = 0;
    while seen < n {
        if let PlaneEvent::Acquired = next_event(events).await {
            seen += 1;
        }
    }
}

/// Wait for the next terminal cancellation, skipping other events.
pub async fn wait_for_cancel(events: &mut mpsc::UnboundedReceiver<PlaneEvent>) -> CancelledJob {
    loop {
        match next_event(events).await {
            PlaneEvent::Cancelled(job) => return job,
            PlaneEvent::Completed(job) => panic!("unexpected CompleteJob: {job:?}"),
            _ => {}
        }
    }
}

/// Drain everything the control plane has seen so far without blocking.
pub fn drain(events: &mut mpsc::UnboundedReceiver<PlaneEvent>) -> Vec<PlaneEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}
