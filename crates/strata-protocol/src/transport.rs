//! Resumable HTTP downloads behind the storage transport seam
//!
//! Each running download is a tokio task streaming the response body into
//! `<dest>.download`. A partial file left by an earlier attempt is resumed
//! with a `Range` request; the finished file is renamed into place. Tasks
//! report progress over a channel that [`HttpTransport::poll_event`] drains,
//! so the storage session sees events only when it ticks.

use crate::config::HttpTransportConfig;
use crate::error::{Result, TransportError};
use futures::StreamExt;
use reqwest::header::RANGE;
use reqwest::{Client, StatusCode};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use strata_client_storage::{DownloadId, DownloadTag, Transport, TransportEvent};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

/// Extension of the file a download streams into
pub const PARTIAL_EXTENSION: &str = "download";

/// Where the body of a download into `path` is written until it completes
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(PARTIAL_EXTENSION);
    PathBuf::from(name)
}

#[derive(Debug)]
struct Job {
    id: DownloadId,
    path: PathBuf,
    uri: String,
    tag: DownloadTag,
}

struct Running {
    job: Job,
    handle: JoinHandle<()>,
}

#[derive(Debug)]
enum Progress {
    Start { id: DownloadId, current_length: u64 },
    Update { id: DownloadId, current_length: u64 },
    Finished { id: DownloadId, result: Result<u64> },
}

/// HTTP transport with a fixed number of download agents
pub struct HttpTransport {
    client: Client,
    runtime: Handle,
    agent_count: usize,
    next_id: DownloadId,
    waiting: VecDeque<Job>,
    running: HashMap<DownloadId, Running>,
    sender: UnboundedSender<Progress>,
    receiver: UnboundedReceiver<Progress>,
    events: VecDeque<TransportEvent>,
}

impl HttpTransport {
    /// Transport spawning its downloads on the current tokio runtime
    pub fn new(config: &HttpTransportConfig) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| TransportError::NoRuntime(e.to_string()))?;
        Self::with_runtime(config, runtime)
    }

    /// Transport spawning its downloads on `runtime`
    pub fn with_runtime(config: &HttpTransportConfig, runtime: Handle) -> Result<Self> {
        config.validate()?;
        // Already installed is fine
        let _ = rustls::crypto::ring::default_provider().install_default();

        // Bodies are stored byte for byte so resumed ranges line up
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .user_agent(config.user_agent.as_str())
            .no_gzip()
            .build()?;
        let (sender, receiver) = mpsc::unbounded_channel();
        info!("HTTP transport with {} agents", config.agent_count);

        Ok(Self {
            client,
            runtime,
            agent_count: config.agent_count,
            next_id: 1,
            waiting: VecDeque::new(),
            running: HashMap::new(),
            sender,
            receiver,
            events: VecDeque::new(),
        })
    }

    /// Downloads currently streaming
    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    fn start_waiting(&mut self) {
        while self.running.len() < self.agent_count {
            let Some(job) = self.waiting.pop_front() else {
                break;
            };
            debug!("Downloading {} into {}", job.uri, job.path.display());
            let handle = self.runtime.spawn(download(
                self.client.clone(),
                job.id,
                job.uri.clone(),
                job.path.clone(),
                self.sender.clone(),
            ));
            self.running.insert(job.id, Running { job, handle });
        }
    }

    fn on_progress(&mut self, progress: Progress) {
        match progress {
            Progress::Start { id, current_length } => {
                if let Some(running) = self.running.get(&id) {
                    let job = &running.job;
                    self.events.push_back(TransportEvent::Start {
                        id,
                        tag: job.tag.clone(),
                        path: job.path.clone(),
                        uri: job.uri.clone(),
                        current_length,
                    });
                }
            }
            Progress::Update { id, current_length } => {
                if let Some(running) = self.running.get(&id) {
                    self.events.push_back(TransportEvent::Update {
                        id,
                        tag: running.job.tag.clone(),
                        current_length,
                    });
                }
            }
            Progress::Finished { id, result } => {
                // Unknown ids were removed while running
                let Some(Running { job, .. }) = self.running.remove(&id) else {
                    return;
                };
                match result {
                    Ok(length) => self.events.push_back(TransportEvent::Success {
                        id,
                        tag: job.tag,
                        path: job.path,
                        length,
                    }),
                    Err(e) => {
                        warn!(
                            "Download of {} failed (retryable: {}): {}",
                            job.uri,
                            e.should_retry(),
                            e
                        );
                        self.events.push_back(TransportEvent::Failure {
                            id,
                            tag: job.tag,
                            path: job.path,
                            message: e.to_string(),
                        });
                    }
                }
            }
        }
    }
}

impl Transport for HttpTransport {
    fn add_download(
        &mut self,
        path: &Path,
        uri: &str,
        tag: DownloadTag,
    ) -> strata_client_storage::Result<DownloadId> {
        let url = Url::parse(uri).map_err(|e| TransportError::InvalidUri {
            uri: uri.to_string(),
            message: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(TransportError::InvalidUri {
                uri: uri.to_string(),
                message: format!("unsupported scheme '{}'", url.scheme()),
            }
            .into());
        }

        let id = self.next_id;
        self.next_id += 1;
        self.waiting.push_back(Job {
            id,
            path: path.to_path_buf(),
            uri: uri.to_string(),
            tag,
        });
        self.start_waiting();
        Ok(id)
    }

    fn remove_download(&mut self, id: DownloadId) -> bool {
        self.events.retain(|event| event.id() != id);
        if let Some(index) = self.waiting.iter().position(|job| job.id == id) {
            self.waiting.remove(index);
            return true;
        }
        match self.running.remove(&id) {
            Some(running) => {
                // The partial file stays behind for a later resume
                running.handle.abort();
                debug!("Cancelled download of {}", running.job.uri);
                self.start_waiting();
                true
            }
            None => false,
        }
    }

    fn free_agent_count(&self) -> usize {
        self.agent_count.saturating_sub(self.running.len())
    }

    fn waiting_task_count(&self) -> usize {
        self.waiting.len()
    }

    fn poll_event(&mut self) -> Option<TransportEvent> {
        let mut finished = false;
        while let Ok(progress) = self.receiver.try_recv() {
            finished |= matches!(progress, Progress::Finished { .. });
            self.on_progress(progress);
        }
        if finished {
            self.start_waiting();
        }
        self.events.pop_front()
    }
}

async fn download(
    client: Client,
    id: DownloadId,
    uri: String,
    path: PathBuf,
    sender: UnboundedSender<Progress>,
) {
    let result = fetch(&client, id, &uri, &path, &sender).await;
    // The receiver is gone only when the transport was dropped
    let _ = sender.send(Progress::Finished { id, result });
}

async fn fetch(
    client: &Client,
    id: DownloadId,
    uri: &str,
    path: &Path,
    sender: &UnboundedSender<Progress>,
) -> Result<u64> {
    let partial = partial_path(path);
    let existing = fs::metadata(&partial).await.map_or(0, |m| m.len());

    let mut request = client.get(uri);
    if existing > 0 {
        request = request.header(RANGE, format!("bytes={existing}-"));
    }
    let response = request.send().await?;
    let status = response.status();

    let resumed = if existing > 0 && status == StatusCode::PARTIAL_CONTENT {
        true
    } else if existing > 0 && status == StatusCode::RANGE_NOT_SATISFIABLE {
        fs::remove_file(&partial).await?;
        return Err(TransportError::RangeNotSatisfiable);
    } else if status.is_success() {
        false
    } else {
        return Err(TransportError::HttpStatus(status));
    };

    let mut current = if resumed { existing } else { 0 };
    let _ = sender.send(Progress::Start {
        id,
        current_length: current,
    });

    if let Some(parent) = partial.parent() {
        fs::create_dir_all(parent).await?;
    }
    let mut file = if resumed {
        fs::OpenOptions::new().append(true).open(&partial).await?
    } else {
        fs::File::create(&partial).await?
    };

    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        current += chunk.len() as u64;
        let _ = sender.send(Progress::Update {
            id,
            current_length: current,
        });
    }
    file.flush().await?;
    drop(file);

    fs::rename(&partial, path).await?;
    Ok(current)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_path_appends_extension() {
        assert_eq!(
            partial_path(Path::new("/data/ui.1a2b3c4d.dat")),
            PathBuf::from("/data/ui.1a2b3c4d.dat.download")
        );
    }

    #[test]
    fn test_new_requires_a_runtime() {
        let result = HttpTransport::new(&HttpTransportConfig::default());
        assert!(matches!(result, Err(TransportError::NoRuntime(_))));
    }
}
