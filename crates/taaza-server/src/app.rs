//! Application assembly and lifecycle.

use anyhow::Context;
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use taaza_config::AppConfig;
use taaza_mail::{
    Clock, EmailService, HandlebarsRenderer, JobProcessor, MailTransport, MessageComposer,
    QueueStore, RateLimitBackend, RateLimiter, RecipientLimit, RedisQueueStore,
    RedisRateLimitBackend, RetryPolicy, SmtpTransport, StoreRetry, SystemClock, WorkerPool,
    WorkerPoolConfig,
};
use taaza_rest::{create_router, AppState};
use tokio::net::TcpListener;
use tracing::info;

/// External collaborators the application is built on.
pub struct Backends {
    pub store: Arc<dyn QueueStore>,
    pub rate_limit: Arc<dyn RateLimitBackend>,
    pub transport: Arc<dyn MailTransport>,
    pub clock: Arc<dyn Clock>,
}

/// A fully wired email service: queue store, worker pool, and HTTP router.
pub struct App {
    config: AppConfig,
    store: Arc<dyn QueueStore>,
    pool: Arc<WorkerPool>,
    router: Router,
}

impl App {
    /// Connect to Redis and the SMTP relay, then assemble the application.
    pub async fn connect(config: AppConfig) -> anyhow::Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let store = RedisQueueStore::open(&config.redis, clock.clone(), config.email.dequeue_wait())
            .await
            .context("Failed to connect to Redis")?;
        let rate_limit = Arc::new(RedisRateLimitBackend::new(
            store.pool().clone(),
            store.keys().clone(),
        ));
        let transport =
            Arc::new(SmtpTransport::new(&config.smtp).context("Failed to configure SMTP")?);

        Self::assemble(
            config,
            Backends {
                store: Arc::new(store),
                rate_limit,
                transport,
                clock,
            },
        )
    }

    /// Build the worker pool, the producer service, and the router on top of `backends`.
    pub fn assemble(config: AppConfig, backends: Backends) -> anyhow::Result<Self> {
        let Backends {
            store,
            rate_limit,
            transport,
            clock,
        } = backends;

        let renderer = HandlebarsRenderer::from_dir(&config.email.templates.dir)
            .context("Failed to load email templates")?;

        let limiter = if config.email.rate_limit.enabled {
            RateLimiter::new(rate_limit)
        } else {
            RateLimiter::disabled(rate_limit)
        };

        let processor = JobProcessor::new(
            store.clone(),
            limiter,
            MessageComposer::new(Arc::new(renderer), config.email.templates.app_url.clone()),
            transport,
            RetryPolicy::from(&config.email.retry),
            clock.clone(),
        )
        .with_recipient_limit(RecipientLimit::from(&config.email.rate_limit))
        .with_store_retry(StoreRetry::from(&config.email));

        let pool = Arc::new(WorkerPool::new(
            Arc::new(processor),
            WorkerPoolConfig::from(&config.email),
        ));

        let service =
            EmailService::new(store.clone(), clock).with_max_attempts(config.email.max_attempts);
        let state = AppState::new(service).with_worker_pool(pool.clone());
        let router = create_router(state, &config.server);

        Ok(Self {
            config,
            store,
            pool,
            router,
        })
    }

    /// The HTTP router.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// The worker pool.
    pub fn worker_pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Bind the listener, start the workers, and serve HTTP until `shutdown`
    /// resolves, then stop the workers and close the store. The store is
    /// closed on every exit path.
    pub async fn run<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.config.server.addr();
        let listener = match TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(e) => {
                self.store.close().await;
                return Err(e).with_context(|| format!("Failed to bind REST listener on {addr}"));
            }
        };

        if let Err(e) = self.pool.start() {
            self.store.close().await;
            return Err(e.into());
        }
        info!("Starting REST server on http://{}", addr);

        let served = axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await;

        self.pool.shutdown().await;
        self.store.close().await;

        served.context("REST server error")?;
        info!("Server shutdown complete");
        Ok(())
    }
}
