use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use harvest_browser::{
    BrowserDriver, BrowserScriptEvaluator, ChromeSession, FingerprintConfig, RateLimiter,
};
use harvest_core::{encode_value, AppConfig};
use harvest_crawler::{
    DispatcherOptions, Dispatcher, DocApiHandler, DocFetchOptions, ListApiClient, ListApiHandler,
    ReprocessOptions, Reprocessor,
};
use harvest_db::Database;
use harvest_decoder::{Classifier, RuleSet};
use harvest_query::{case_seed, case_template, QueryDescriptor};
use harvest_queue::{Broker, ListApiTask, QueueOptions, Task, TaskQueue, TaskSink};
use harvest_session::{SessionOptions, SessionScheduler};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const SESSION_CHECK_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Parser)]
#[command(name = "harvester", about = "Court document harvester", version)]
struct Cli {
    /// Config file, instead of the per-user default
    #[arg(long, global = true, env = "HARVEST_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Consume tasks from the broker (default)
    Run {
        /// Publish a first-page task for every case sharing this case number's prefix
        #[arg(long)]
        case: Option<String>,

        /// Publish a first-page task for this `key:value,...` query
        #[arg(long)]
        param: Option<String>,

        /// Publish a full-text search task
        #[arg(long)]
        keyword: Option<String>,
    },
    /// Decode list payloads parked by earlier runs
    Reprocess,
    /// Write the effective configuration to the config file
    InitConfig,
}

fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,harvest=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => {
            let mut config = AppConfig::load_from(path)?;
            config.apply_env();
            config.validate()?;
            config
        }
        None => AppConfig::load_with_env()?,
    };
    Ok(config)
}

/// Everything both modes share.
struct Runtime {
    config: AppConfig,
    chrome: Arc<ChromeSession>,
    store: Arc<Database>,
    classifier: Arc<Classifier>,
    session: Arc<SessionScheduler>,
    cancel: CancellationToken,
}

impl Runtime {
    async fn start(config: AppConfig) -> Result<Self> {
        let db_path = config.database_path()?;
        let store = Arc::new(
            Database::open(&db_path)
                .await
                .with_context(|| format!("open database {}", db_path.display()))?,
        );

        let rules = match &config.crawl.rules_path {
            Some(path) => RuleSet::load(path)?,
            None => RuleSet::default(),
        };
        let classifier = Arc::new(Classifier::new(rules));

        let chrome = Arc::new(
            ChromeSession::launch(&config.browser, &FingerprintConfig::randomized())
                .await
                .context("launch browser")?,
        );
        let driver: Arc<dyn BrowserDriver> = chrome.clone();
        let evaluator = Arc::new(BrowserScriptEvaluator::new(driver.clone()));
        let limiter = Arc::new(RateLimiter::new(config.browser.rate_limit));

        let cancel = CancellationToken::new();
        let session = SessionScheduler::new(
            driver,
            evaluator,
            limiter,
            store.clone(),
            SessionOptions::from_config(&config),
        )
        .with_cancellation(cancel.clone());
        session.initialize().await.context("initialize session")?;

        Ok(Self {
            config,
            chrome,
            store,
            classifier,
            session: Arc::new(session),
            cancel,
        })
    }

    /// Revalidate the session until cancelled. A fatal error cancels
    /// everything.
    fn spawn_session_check(&self) -> tokio::task::JoinHandle<()> {
        let session = self.session.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(SESSION_CHECK_INTERVAL) => {}
                }
                match session.periodic_check().await {
                    Ok(true) => info!("session refreshed by periodic check"),
                    Ok(false) => {}
                    Err(e) if e.is_fatal() => {
                        error!("session lost: {}", e);
                        cancel.cancel();
                        break;
                    }
                    Err(e) => warn!("periodic session check failed: {}", e),
                }
            }
        })
    }

    async fn shutdown(self) {
        let Self {
            chrome,
            store,
            session,
            ..
        } = self;
        drop(session);
        match Arc::try_unwrap(chrome) {
            Ok(chrome) => chrome.shutdown().await,
            Err(_) => warn!("browser still in use, leaving it to exit with the process"),
        }
        match Arc::try_unwrap(store) {
            Ok(store) => store.close().await,
            Err(_) => warn!("database still in use"),
        }
    }
}

fn broker(config: &AppConfig) -> Result<Arc<dyn Broker>> {
    #[cfg(feature = "kafka")]
    {
        Ok(Arc::new(harvest_queue::KafkaBroker::new(&config.broker)?))
    }
    #[cfg(not(feature = "kafka"))]
    {
        let _ = config;
        warn!("built without the kafka feature, tasks stay in this process");
        Ok(Arc::new(harvest_queue::MemoryBroker::new()))
    }
}

fn seed(
    sink: &dyn TaskSink,
    case: Option<String>,
    param: Option<String>,
    keyword: Option<String>,
) -> Result<()> {
    if let Some(template) = case.as_deref().and_then(case_template) {
        let query = case_seed(&template).join();
        info!(query = %query, "seeding case number query");
        sink.push(Task::ListApi(ListApiTask::new(encode_value(&query), 1)));
    }
    if let Some(param) = param {
        let query = QueryDescriptor::split(&param)?.join();
        info!(query = %query, "seeding query");
        sink.push(Task::ListApi(ListApiTask::new(encode_value(&query), 1)));
    }
    if let Some(keyword) = keyword {
        info!(keyword = %keyword, "seeding full-text search");
        sink.push(Task::NormalSearch(keyword));
    }
    Ok(())
}

async fn run(
    runtime: &Runtime,
    case: Option<String>,
    param: Option<String>,
    keyword: Option<String>,
) -> Result<()> {
    let config = &runtime.config;
    let queue = Arc::new(TaskQueue::with_cancellation(
        broker(config)?,
        QueueOptions::from_config(&config.broker),
        runtime.cancel.clone(),
    ));
    let sink: Arc<dyn TaskSink> = queue.clone();

    let client = ListApiClient::new(
        &config.site,
        config.browser.active_proxy(),
        Duration::from_secs(config.browser.navigation_timeout_secs),
    )?;
    let list = ListApiHandler::new(
        runtime.session.clone(),
        client,
        runtime.classifier.clone(),
        runtime.store.clone(),
        sink.clone(),
    );
    let doc = DocApiHandler::new(
        runtime.session.clone(),
        runtime.classifier.clone(),
        runtime.store.clone(),
        DocFetchOptions::from_config(config),
    )
    .with_cancellation(runtime.cancel.clone());
    let dispatcher = Dispatcher::new(
        runtime.session.clone(),
        list,
        doc,
        sink.clone(),
        DispatcherOptions::from_config(config),
    );

    seed(sink.as_ref(), case, param, keyword)?;

    queue.start(Arc::new(dispatcher));
    let checker = runtime.spawn_session_check();
    info!("harvester running, ctrl-c to stop");

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("listen for ctrl-c")?;
            info!("interrupted, stopping");
        }
        () = runtime.cancel.cancelled() => warn!("stopped by a fatal error"),
    }

    let stopped = queue.stop().await;
    if let Err(e) = checker.await {
        warn!("session check task failed: {}", e);
    }
    stopped.context("task queue stopped with error")
}

async fn reprocess(runtime: &Runtime) -> Result<()> {
    // decoded records still produce content tasks
    let queue = Arc::new(TaskQueue::with_cancellation(
        broker(&runtime.config)?,
        QueueOptions::from_config(&runtime.config.broker),
        runtime.cancel.clone(),
    ));
    let reprocessor = Reprocessor::new(
        runtime.session.clone(),
        runtime.classifier.clone(),
        runtime.store.clone(),
        queue.clone(),
        ReprocessOptions::default(),
    )
    .with_cancellation(runtime.cancel.clone());

    let cancel = runtime.cancel.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted, stopping");
            cancel.cancel();
        }
    });

    let result = reprocessor.run().await;
    runtime.cancel.cancel();
    interrupt.abort();
    queue.stop().await?;
    Ok(result?)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    info!("Starting harvester v{}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    let command = cli.command.unwrap_or(Commands::Run {
        case: None,
        param: None,
        keyword: None,
    });

    if let Commands::InitConfig = command {
        let path = match cli.config {
            Some(path) => path,
            None => AppConfig::config_path()?,
        };
        config.save_to(&path)?;
        return Ok(());
    }

    let runtime = Runtime::start(config).await?;
    let result = match command {
        Commands::Run {
            case,
            param,
            keyword,
        } => run(&runtime, case, param, keyword).await,
        Commands::Reprocess => reprocess(&runtime).await,
        Commands::InitConfig => Ok(()),
    };

    runtime.shutdown().await;
    if let Err(e) = &result {
        error!("harvester stopped: {:#}", e);
    }
    result
}
