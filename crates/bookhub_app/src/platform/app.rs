use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use bookhub_core::{SessionStatus, Snapshot, TabId};
use bookhub_engine::{
    relay_channel, with_auto_sync, BooksApiEnricher, Coordinator, DashboardBridge, DashboardPage,
    DirSnapshotStore, DurableDir, EnrichSettings, EnrichmentService, LocalEnricher, PageWindow,
    RelayClient, ReqwestFetcher, SnapshotStore,
};
use bookhub_logging::{bookhub_info, bookhub_warn, LogDestination};
use chrono::Utc;
use log::LevelFilter;
use tokio::sync::mpsc;
use url::Url;

use super::cli::{Cli, Commands};
use super::config::AppConfig;
use super::surfaces::{SurfaceEvent, TaskSurfaceHost};

const DASHBOARD_WINDOW: u64 = 1;
const DASHBOARD_ORIGIN: &str = "bookhub://dashboard";

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Commands::Init { force } = cli.command {
        return init_config(&cli.config, force);
    }

    let (config, origin) = AppConfig::load(&cli.config)?;
    let destination = if config.log_to_file {
        LogDestination::Both
    } else {
        LogDestination::Terminal
    };
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    bookhub_logging::initialize(destination, level);
    bookhub_info!("{}", origin);

    match cli.command {
        Commands::Sync { url } => {
            let source_url = match url {
                Some(url) => Url::parse(&url).with_context(|| format!("invalid --url {url:?}"))?,
                None => config.source_url()?,
            };
            let report = sync(&config, &source_url).await?;
            print!("{}", report.render());
            Ok(())
        }
        Commands::Snapshot { json } => {
            let store = snapshot_store(&config);
            let snapshot = store.read().await.context("reading snapshot")?;
            match (snapshot, json) {
                (None, _) => println!("No snapshot yet; run `bookhub sync` first."),
                (Some(snapshot), true) => println!("{}", serde_json::to_string_pretty(&snapshot)?),
                (Some(snapshot), false) => print!("{}", render_snapshot(&snapshot)),
            }
            Ok(())
        }
        Commands::Init { .. } => Ok(()),
    }
}

fn init_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!("{} already exists; pass --force to overwrite", path.display());
    }
    AppConfig::default().save(path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

fn snapshot_store(config: &AppConfig) -> Arc<dyn SnapshotStore> {
    Arc::new(DirSnapshotStore::new(DurableDir::new(&config.data_dir)))
}

fn enricher(config: &AppConfig) -> Arc<dyn EnrichmentService> {
    match &config.enrichment_endpoint {
        Some(endpoint) => Arc::new(BooksApiEnricher::new(EnrichSettings {
            endpoint: endpoint.clone(),
            ..EnrichSettings::default()
        })),
        None => Arc::new(LocalEnricher),
    }
}

/// Result of one `sync` command.
#[derive(Debug)]
pub struct SyncReport {
    pub snapshot: Option<Snapshot>,
    /// False when the stored snapshot predates this run.
    pub fresh: bool,
    /// Final state of the session that ran in the sync surface.
    pub status: Option<SessionStatus>,
}

impl SyncReport {
    fn render(&self) -> String {
        let mut out = match &self.status {
            Some(status) if status.state.is_finished() => format!("{}\n", status.summary()),
            Some(status) => format!("sync interrupted ({})\n", status.summary()),
            None => String::new(),
        };
        match (&self.snapshot, self.fresh) {
            (Some(snapshot), true) => out.push_str(&render_snapshot(snapshot)),
            (Some(snapshot), false) => out.push_str(&format!(
                "Sync did not produce a new snapshot; the last one is from {}.\n",
                snapshot.taken_at.to_rfc3339()
            )),
            (None, _) => out.push_str("Sync did not produce a snapshot; see the log for details.\n"),
        }
        out
    }
}

/// Runs one sync the way the dashboard would: ask the coordinator for a sync
/// surface over the bridge and wait for that surface to go away.
pub async fn sync(config: &AppConfig, source_url: &Url) -> anyhow::Result<SyncReport> {
    let store = snapshot_store(config);
    let started = Utc::now();
    let (relay, relay_rx) = relay_channel();
    let (host, mut events) = TaskSurfaceHost::new(
        relay.clone(),
        store.clone(),
        Arc::new(ReqwestFetcher::default()),
        config.harvest,
    );
    let host = Arc::new(host);
    let coordinator = Arc::new(Coordinator::new(
        host.clone(),
        enricher(config),
        store.clone(),
        with_auto_sync(source_url),
    ));
    tokio::spawn(Arc::clone(&coordinator).serve(relay_rx));

    let result = drive_dashboard(relay, &coordinator, &mut events).await;
    host.close_all();
    let (tab_id, snapshot) = result?;
    let status = host.session_status(tab_id);

    let fresh = snapshot
        .as_ref()
        .is_some_and(|snapshot| snapshot.taken_at >= started);
    if !fresh {
        bookhub_warn!("sync of {} left no new snapshot", source_url);
    }
    Ok(SyncReport {
        snapshot,
        fresh,
        status,
    })
}

async fn drive_dashboard(
    relay: RelayClient,
    coordinator: &Coordinator,
    events: &mut mpsc::UnboundedReceiver<SurfaceEvent>,
) -> anyhow::Result<(TabId, Option<Snapshot>)> {
    let window = PageWindow::new(DASHBOARD_WINDOW, DASHBOARD_ORIGIN);
    let mut bridge = DashboardBridge::new(relay);
    let listener = bridge.install(&window);
    let mut page = DashboardPage::new(window);

    let response = page
        .start_sync()
        .await
        .context("dashboard bridge closed before answering")?;
    if !response.ok {
        bail!(
            "could not start sync: {}",
            response.error.unwrap_or_else(|| "unknown error".to_string())
        );
    }
    let tab_id = response
        .surface_id
        .context("sync started without a surface id")?;
    bookhub_info!("waiting for sync surface {}", tab_id);

    while let Some(event) = events.recv().await {
        match event {
            SurfaceEvent::Closed(closed) if closed == tab_id => break,
            SurfaceEvent::Ended(ended) => {
                coordinator.surface_removed(ended);
                if ended == tab_id {
                    break;
                }
            }
            SurfaceEvent::Closed(_) => {}
        }
    }

    let snapshot = page.fetch_snapshot().await.flatten();
    drop(bridge);
    if let Some(listener) = listener {
        if let Err(err) = listener.await {
            bookhub_warn!("dashboard bridge listener failed: {}", err);
        }
    }
    Ok((tab_id, snapshot))
}

fn render_snapshot(snapshot: &Snapshot) -> String {
    let age = Utc::now() - snapshot.taken_at;
    let mut out = format!(
        "{} books from {} (taken {}, {} min ago)\n",
        snapshot.total,
        snapshot.source_url,
        snapshot.taken_at.to_rfc3339(),
        age.num_minutes()
    );
    for record in &snapshot.records {
        match &record.identifier {
            Some(identifier) => out.push_str(&format!("  {} [{}]\n", record.title, identifier)),
            None => out.push_str(&format!("  {}\n", record.title)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::sync::Once;

    use bookhub_core::{HarvestSettings, SessionState};
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    static INIT: Once = Once::new();

    fn init_logging() {
        INIT.call_once(bookhub_logging::initialize_for_tests);
    }

    fn config(data_dir: &Path) -> AppConfig {
        AppConfig {
            data_dir: data_dir.to_path_buf(),
            enrichment_endpoint: None,
            harvest: HarvestSettings {
                idle_tolerance: 2,
                interval_ms: 0,
                ..HarvestSettings::default()
            },
            ..AppConfig::default()
        }
    }

    async fn listing(server: &MockServer, number: &str, response: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path("/kindle-library"))
            .and(query_param("page", number))
            .respond_with(response)
            .mount(server)
            .await;
    }

    fn html(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_raw(body.to_string(), "text/html; charset=utf-8")
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sync_harvests_the_listing_into_the_data_dir() {
        init_logging();
        let server = MockServer::start().await;
        listing(
            &server,
            "1",
            html(r#"<div data-asin="B0APPTEST1"><p>First</p></div>"#),
        )
        .await;
        listing(
            &server,
            "2",
            html(r#"<div data-asin="B0APPTEST2"><p>Second</p></div>"#),
        )
        .await;
        listing(&server, "3", ResponseTemplate::new(404)).await;
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let source = Url::parse(&format!("{}/kindle-library", server.uri())).unwrap();

        let report = sync(&config, &source).await.unwrap();

        assert!(report.fresh);
        let status = report.status.clone().expect("session status");
        assert_eq!(status.state, SessionState::Succeeded);
        assert_eq!(status.total, 2);
        let snapshot = report.snapshot.clone().expect("snapshot");
        assert_eq!(snapshot.total, 2);
        let titles: Vec<_> = snapshot.records.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["First", "Second"]);

        let stored = snapshot_store(&config).read().await.unwrap().expect("stored");
        assert_eq!(stored, snapshot);
        assert!(report
            .render()
            .starts_with("sync complete: 2 records\n2 books from "));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_sync_keeps_the_previous_snapshot() {
        init_logging();
        let server = MockServer::start().await;
        listing(&server, "1", ResponseTemplate::new(503)).await;
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let source = Url::parse(&format!("{}/kindle-library", server.uri())).unwrap();

        let report = sync(&config, &source).await.unwrap();

        assert!(!report.fresh);
        assert!(report.snapshot.is_none());
        let status = report.status.clone().expect("session status");
        assert_eq!(status.state, SessionState::Failed);
        let rendered = report.render();
        assert!(rendered.starts_with("sync failed after 0 iterations: "));
        assert!(rendered.contains("503"));
        assert!(rendered.contains("did not produce a snapshot"));
    }

    #[test]
    fn init_refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bookhub.ron");

        init_config(&path, false).unwrap();
        assert!(init_config(&path, false).is_err());
        init_config(&path, true).unwrap();
        assert_eq!(AppConfig::load(&path).unwrap().0, AppConfig::default());
    }
}

#[cfg(test)]
mod report_tests {
    use bookhub_core::SessionState;

    use super::*;

    #[test]
    fn an_unfinished_session_is_reported_as_interrupted() {
        let report = SyncReport {
            snapshot: None,
            fresh: false,
            status: Some(SessionStatus {
                state: SessionState::Running,
                iteration: 4,
                total: 9,
                ..SessionStatus::default()
            }),
        };

        assert!(report
            .render()
            .starts_with("sync interrupted (syncing: iteration 4 (9 records, 0 idle))\n"));
    }
}
