//! Process runner: starts what the configured role asks for and tears it
//! down in order on shutdown.

use crate::di::AppModule;
use crate::metrics;
use axum::Router;
use lumen_core::{LumenError, LumenResult};
use lumen_realtime::{create_router, start_heartbeat, AppState, RelayHandler};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// A configured Lumen process.
pub struct App {
    module: AppModule,
}

impl App {
    pub fn new(module: AppModule) -> Self {
        Self { module }
    }

    /// Runs until `shutdown` resolves.
    ///
    /// Sessions are closed first, then the worker pool drains its in-flight
    /// jobs within the configured shutdown timeout.
    pub async fn run<F>(self, shutdown: F) -> LumenResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let config = self.module.config().clone();

        let metrics_router = if config.observability.metrics_enabled {
            metrics::init_metrics()
                .map(|handle| metrics::router(&config.observability.metrics_path, handle))
        } else {
            None
        };

        let pool = config
            .role
            .runs_workers()
            .then(|| Arc::new(self.module.worker_pool()));
        let pool_task = pool.clone().map(|pool| {
            tokio::spawn(async move {
                if let Err(e) = pool.start().await {
                    error!(error = %e, "Worker pool failed");
                }
            })
        });

        let served = if config.role.runs_gateway() {
            self.serve_gateway(metrics_router, shutdown).await
        } else if let Some(router) = metrics_router {
            serve(&config.server.addr(), router, shutdown).await
        } else {
            shutdown.await;
            Ok(())
        };

        if let (Some(pool), Some(task)) = (pool, pool_task) {
            pool.stop();
            if let Err(e) = task.await {
                warn!(error = %e, "Worker pool task ended abnormally");
            }
        }

        info!("Server shutdown complete");
        served
    }

    async fn serve_gateway<F>(&self, extra: Option<Router>, shutdown: F) -> LumenResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let config = self.module.config();
        let gateway = self.module.gateway();

        let _relay = self
            .module
            .bus()
            .subscribe(Arc::new(RelayHandler::new(gateway.clone())))
            .await?;
        let heartbeat = start_heartbeat(gateway.clone(), config.realtime.heartbeat_interval());

        let state = AppState::new(
            gateway.clone(),
            self.module.job_service(),
            config.security.token_cookie.clone(),
        );
        let mut router = create_router(state, &config.server, &config.realtime);
        if let Some(extra) = extra {
            router = router.merge(extra);
        }

        // Open sockets would hold the graceful shutdown; close them first.
        let closing = gateway.clone();
        let result = serve(&config.server.addr(), router, async move {
            shutdown.await;
            closing.shutdown_all().await;
        })
        .await;

        heartbeat.abort();
        result
    }
}

async fn serve<F>(addr: &str, router: Router, shutdown: F) -> LumenResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| LumenError::Internal(format!("Failed to bind {addr}: {e}")))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| LumenError::Internal(format!("HTTP server error: {e}")))
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
        () = terminate => info!("Received terminate signal, initiating graceful shutdown..."),
    }
}
