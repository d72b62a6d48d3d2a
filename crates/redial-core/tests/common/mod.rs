//! Shared test harness: scriptable mock transport plus dispatcher setup.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use redial_core::background::{BackgroundHost, Foreground};
use redial_core::config::DispatchConfig;
use redial_core::dispatcher::Dispatcher;
use redial_core::error::TransportError;
use redial_core::reachability::{NetworkStatus, ReachabilityMonitor};
use redial_core::request::{Method, SessionKind, TaskKind};
use redial_core::transport::{
    ProgressSink, Response, Transport, TransportCall, TransportFailure, TransportResult,
};

/// Scripted outcome for one submission, consumed in order. An exhausted
/// script fails the call so runaway retries surface as test failures.
pub enum Step {
    Succeed {
        status: u16,
        body: Vec<u8>,
        progress: Vec<f32>,
    },
    Fail(TransportError),
    HttpError(u16),
    /// Never resolves (for cancellation tests).
    Hang,
}

impl Step {
    pub fn ok() -> Self {
        Step::Succeed {
            status: 200,
            body: b"ok".to_vec(),
            progress: Vec::new(),
        }
    }
}

/// What the mock saw for one submission.
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub url: String,
    pub method: Method,
    pub session: SessionKind,
    pub upload_fields: Vec<String>,
}

pub struct MockTransport {
    script: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
    records: Mutex<Vec<CallRecord>>,
    delay: Duration,
    download: Mutex<Option<Result<Vec<u8>, TransportError>>>,
}

impl MockTransport {
    pub fn scripted(steps: Vec<Step>) -> Self {
        Self {
            script: Mutex::new(steps.into()),
            calls: AtomicUsize::new(0),
            records: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            download: Mutex::new(None),
        }
    }

    /// Delay applied before each submission resolves.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn download_body(self, body: Result<Vec<u8>, TransportError>) -> Self {
        *self.download.lock().unwrap() = Some(body);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn records(&self) -> Vec<CallRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn perform(&self, call: TransportCall, progress: ProgressSink) -> TransportResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let upload_fields = match &call.task {
            TaskKind::Upload(items) => items.iter().map(|i| i.field_name().to_owned()).collect(),
            TaskKind::Data => Vec::new(),
        };
        self.records.lock().unwrap().push(CallRecord {
            url: call.url.to_string(),
            method: call.method,
            session: call.session,
            upload_fields,
        });

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(Step::Succeed {
                status,
                body,
                progress: fractions,
            }) => {
                for fraction in fractions {
                    progress.report(fraction);
                }
                Ok(Response { status, body })
            }
            Some(Step::Fail(error)) => Err(TransportFailure::from_error(error)),
            Some(Step::HttpError(status)) => Err(TransportFailure {
                response: Some(Response {
                    status,
                    body: Vec::new(),
                }),
                error: TransportError::Status(status),
            }),
            Some(Step::Hang) => std::future::pending().await,
            None => Err(TransportFailure::from_error(TransportError::Other(
                "script exhausted".into(),
            ))),
        }
    }

    async fn download(
        &self,
        _url: Url,
        destination: PathBuf,
        progress: ProgressSink,
    ) -> Result<PathBuf, TransportFailure> {
        let scripted = self.download.lock().unwrap().take();
        match scripted {
            Some(Ok(body)) => {
                tokio::fs::write(&destination, &body)
                    .await
                    .map_err(|e| TransportFailure::from_error(TransportError::Io(e)))?;
                progress.report(0.5);
                progress.report(1.0);
                Ok(destination)
            }
            Some(Err(error)) => Err(TransportFailure::from_error(error)),
            None => Err(TransportFailure::from_error(TransportError::Other(
                "no download scripted".into(),
            ))),
        }
    }
}

pub struct Harness {
    pub dispatcher: Dispatcher,
    pub monitor: ReachabilityMonitor,
    pub transport: Arc<MockTransport>,
}

/// Dispatcher over the given mock, reachable via WiFi, foreground host.
pub fn harness(transport: MockTransport) -> Harness {
    harness_with(transport, NetworkStatus::ViaWiFi, Arc::new(Foreground))
}

pub fn harness_with(
    transport: MockTransport,
    status: NetworkStatus,
    background: Arc<dyn BackgroundHost>,
) -> Harness {
    let transport = Arc::new(transport);
    let monitor = ReachabilityMonitor::with_status(status);
    let config = DispatchConfig::new(Url::parse("https://api.example.com/").unwrap());
    let dispatcher = Dispatcher::new(transport.clone(), &monitor, background, config);
    Harness {
        dispatcher,
        monitor,
        transport,
    }
}

/// Host that always reports the process as backgrounded.
pub struct Backgrounded;

impl BackgroundHost for Backgrounded {
    fn is_backgrounded(&self) -> bool {
        true
    }
}

/// Receives one value or fails the test after `secs`.
pub async fn recv_within<T>(rx: &mut tokio::sync::mpsc::UnboundedReceiver<T>, secs: u64) -> T {
    tokio::time::timeout(Duration::from_secs(secs), rx.recv())
        .await
        .expect("timed out waiting for handler")
        .expect("channel closed")
}
