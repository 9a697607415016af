use crate::app::{AppEvent, Command};
use crate::stream::StreamHandle;
use anyhow::Context;
use crawlctl_core::{BackendClient, RunCoordinator, RunEpoch, ARTIFACT_FILE_NAME};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::debug;
use url::Url;

const STREAM_CLOSE_GRACE: Duration = Duration::from_millis(500);

/// Runs `Command`s as background tasks. Every task reports back through the
/// event channel and never touches the app state directly.
pub struct Dispatcher {
    client: BackendClient,
    stream_url: Url,
    download_dir: PathBuf,
    events: mpsc::Sender<AppEvent>,
    requests: Vec<JoinHandle<()>>,
    stream: Option<StreamHandle>,
}

impl Dispatcher {
    pub fn new(
        client: BackendClient,
        stream_url: Url,
        download_dir: PathBuf,
        events: mpsc::Sender<AppEvent>,
    ) -> Self {
        Self {
            client,
            stream_url,
            download_dir,
            events,
            requests: Vec::new(),
            stream: None,
        }
    }

    pub fn in_flight(&self) -> usize {
        self.requests.iter().filter(|task| !task.is_finished()).count()
    }

    pub fn dispatch(&mut self, command: Command) {
        self.requests.retain(|task| !task.is_finished());
        debug!(event = "command_dispatch", command = ?command);
        match command {
            Command::OpenStream => {
                // The previous connection has already ended; the tracker only
                // reopens from Disconnected or Errored.
                self.stream = Some(StreamHandle::spawn(
                    self.stream_url.clone(),
                    self.events.clone(),
                ));
            }
            Command::Start(request) => {
                let client = self.client.clone();
                self.spawn_request(async move {
                    let result = client.start(&request.url, request.max_depth).await;
                    AppEvent::StartFinished {
                        epoch: request.epoch,
                        result,
                    }
                });
            }
            Command::Stop => {
                let client = self.client.clone();
                self.spawn_request(async move {
                    AppEvent::StopFinished {
                        result: client.stop().await,
                    }
                });
            }
            Command::Probe(epoch) => {
                let client = self.client.clone();
                self.spawn_request(async move {
                    AppEvent::Status {
                        epoch,
                        result: client.status().await,
                    }
                });
            }
            Command::FetchArtifact => {
                let client = self.client.clone();
                self.spawn_request(async move {
                    AppEvent::ArtifactFetched {
                        result: client.download().await,
                    }
                });
            }
            Command::SaveArtifact => {
                let client = self.client.clone();
                let dir = self.download_dir.clone();
                self.spawn_request(async move {
                    AppEvent::ArtifactSaved {
                        result: save_artifact(&client, &dir).await,
                    }
                });
            }
        }
    }

    fn spawn_request<F>(&mut self, work: F)
    where
        F: Future<Output = AppEvent> + Send + 'static,
    {
        let events = self.events.clone();
        self.requests.push(tokio::spawn(async move {
            let event = work.await;
            let _ = events.send(event).await;
        }));
    }

    /// Aborts outstanding requests and closes the stream once.
    pub async fn shutdown(&mut self) {
        let aborted = self.in_flight();
        for task in self.requests.drain(..) {
            task.abort();
        }
        if let Some(stream) = self.stream.take() {
            stream.finish(STREAM_CLOSE_GRACE).await;
        }
        debug!(event = "dispatcher_shutdown", aborted);
    }
}

async fn save_artifact(client: &BackendClient, dir: &Path) -> anyhow::Result<PathBuf> {
    let text = client.download().await?;
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("creating {}", dir.display()))?;
    let path = dir.join(ARTIFACT_FILE_NAME);
    tokio::fs::write(&path, text)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

/// Status probing as a side effect of the Running state: the schedule exists
/// only while a run is active and restarts for every new run.
pub struct ProbeSchedule {
    period: Duration,
    active: Option<(RunEpoch, Interval)>,
}

impl ProbeSchedule {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            active: None,
        }
    }

    #[cfg(test)]
    fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn sync(&mut self, run: &RunCoordinator) {
        if !run.should_probe() {
            if self.active.take().is_some() {
                debug!(event = "probe_schedule_cancelled");
            }
            return;
        }
        let epoch = run.epoch();
        if matches!(&self.active, Some((current, _)) if *current == epoch) {
            return;
        }
        // First probe one full period after the run starts.
        let mut interval = interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(event = "probe_schedule_started", epoch = epoch.0);
        self.active = Some((epoch, interval));
    }

    pub fn cancel(&mut self) {
        self.active = None;
    }

    /// Resolves on the next probe tick; never resolves while inactive.
    pub async fn tick(&mut self) {
        match self.active.as_mut() {
            Some((_, interval)) => {
                interval.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crawlctl_core::client::DEFAULT_REQUEST_TIMEOUT;
    use crawlctl_core::StartRequest;
    use serde_json::json;
    use tokio::time::timeout;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test(start_paused = true)]
    async fn first_probe_waits_one_full_interval() {
        let mut run = RunCoordinator::new();
        let mut schedule = ProbeSchedule::new(Duration::from_secs(3));
        schedule.sync(&run);
        assert!(!schedule.is_active());

        run.start("https://example.com", 1).unwrap();
        schedule.sync(&run);
        assert!(schedule.is_active());

        let started = Instant::now();
        schedule.tick().await;
        assert_eq!(started.elapsed(), Duration::from_secs(3));
        schedule.tick().await;
        assert_eq!(started.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn schedule_stops_with_run_and_restarts_for_new_epoch() {
        let mut run = RunCoordinator::new();
        let mut schedule = ProbeSchedule::new(Duration::from_secs(3));
        run.start("https://example.com", 1).unwrap();
        schedule.sync(&run);
        tokio::time::advance(Duration::from_secs(2)).await;

        // Stop and restart before the loop gets to sync in between.
        run.stop();
        run.start("https://example.com", 1).unwrap();
        schedule.sync(&run);
        let restarted = Instant::now();
        schedule.tick().await;
        assert_eq!(restarted.elapsed(), Duration::from_secs(3));

        run.stop();
        schedule.sync(&run);
        assert!(!schedule.is_active());
        assert!(timeout(Duration::from_secs(30), schedule.tick())
            .await
            .is_err());
    }

    fn dispatcher_for(
        server: &MockServer,
        download_dir: PathBuf,
    ) -> (Dispatcher, mpsc::Receiver<AppEvent>) {
        let base = Url::parse(&server.uri()).unwrap();
        let client = BackendClient::new(base.clone(), DEFAULT_REQUEST_TIMEOUT).unwrap();
        let (tx, rx) = mpsc::channel(8);
        let stream_url = crawlctl_core::stream_endpoint(&base);
        (Dispatcher::new(client, stream_url, download_dir, tx), rx)
    }

    #[tokio::test]
    async fn start_command_reports_epoch_and_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/start"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"detail": "Scraper is already running"})),
            )
            .mount(&server)
            .await;
        let (mut dispatcher, mut rx) = dispatcher_for(&server, PathBuf::from("."));

        dispatcher.dispatch(Command::Start(StartRequest {
            epoch: RunEpoch(7),
            url: "https://example.com".to_string(),
            max_depth: 2,
        }));
        match rx.recv().await.unwrap() {
            AppEvent::StartFinished { epoch, result } => {
                assert_eq!(epoch, RunEpoch(7));
                assert!(result.is_err());
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn save_command_writes_artifact_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/download"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"a\":1}\n{\"b\":2}\n"))
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("artifacts");
        let (mut dispatcher, mut rx) = dispatcher_for(&server, target.clone());

        dispatcher.dispatch(Command::SaveArtifact);
        let saved = match rx.recv().await.unwrap() {
            AppEvent::ArtifactSaved { result } => result.unwrap(),
            other => panic!("unexpected event {other:?}"),
        };
        assert_eq!(saved, target.join(ARTIFACT_FILE_NAME));
        let written = std::fs::read_to_string(saved).unwrap();
        assert_eq!(written, "{\"a\":1}\n{\"b\":2}\n");
    }

    #[tokio::test]
    async fn shutdown_aborts_outstanding_requests() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"is_running": true}))
                    .set_delay(Duration::from_secs(30)),
            )
            .mount(&server)
            .await;
        let (mut dispatcher, mut rx) = dispatcher_for(&server, PathBuf::from("."));

        dispatcher.dispatch(Command::Probe(RunEpoch(1)));
        assert_eq!(dispatcher.in_flight(), 1);
        dispatcher.shutdown().await;
        assert_eq!(dispatcher.in_flight(), 0);
        drop(dispatcher);
        assert!(rx.recv().await.is_none());
    }
}
