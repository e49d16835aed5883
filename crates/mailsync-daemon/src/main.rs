//! Mailsync daemon - the mail ingestion worker's single binary.
//!
//! Builds a [`Core`] context (auth cache, HTTP client, DB pool, `Config`)
//! once at startup, serves the inbound HTTP surface, and runs the two
//! background loops (subscription renewal, delta backstop) until a
//! shutdown signal arrives.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use mailsync_core::config::Config;
use mailsync_core::domain::SubscriptionEnsureOutcome;
use mailsync_core::ports::{IMailProvider, IMailRepository};
use mailsync_db::{DatabasePool, SqliteMailRepository};
use mailsync_graph::auth::TokenCache;
use mailsync_graph::client::GraphClient;
use mailsync_graph::provider::GraphMailProvider;
use mailsync_ingest::attachments::AttachmentStore;
use mailsync_ingest::delta::{DeltaLimits, DeltaPoller};
use mailsync_ingest::pipeline::IngestionPipeline;
use mailsync_ingest::scheduler::{run_delta_loop, run_subscription_loop};
use mailsync_ingest::subscription::SubscriptionManager;

/// Shared, process-lifetime context handed to every request handler and
/// background task. Replaces the original's module-level globals
/// (`graph_auth`, `graph_client`, `settings`, `engine`).
struct Core {
    config: Config,
    pipeline: Arc<IngestionPipeline>,
    subscriptions: Arc<SubscriptionManager>,
    delta: Arc<DeltaPoller>,
    mailbox_id: i64,
}

fn init_logging(config: &Config) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter);
    if config.env == "prod" {
        builder.json().init();
    } else {
        builder.pretty().init();
    }
}

async fn build_core(config: Config) -> Result<Core> {
    let db_pool = DatabasePool::new(std::path::Path::new(&config.db_path))
        .await
        .context("failed to open database pool")?;
    let repo: Arc<dyn IMailRepository> = Arc::new(SqliteMailRepository::new(db_pool.pool().clone()));

    let mailbox = repo
        .get_mailbox_by_email(&config.graph.mailbox_email)
        .await
        .context("failed to look up mailbox")?
        .ok_or_else(|| {
            anyhow::anyhow!(
                "no mailbox row for {} - seed it via migration before starting the worker",
                config.graph.mailbox_email
            )
        })?;

    let tokens = Arc::new(TokenCache::new(
        config.graph.tenant_id.clone(),
        config.graph.client_id.clone(),
        config.graph.credential.clone(),
    ));
    let client = GraphClient::new(tokens);
    let provider: Arc<dyn IMailProvider> = Arc::new(GraphMailProvider::new(client));

    let attachments = Arc::new(AttachmentStore::new(
        config.attachments.dir.clone(),
        config.attachments.max_size_mb,
        config.attachments.allowed_extensions.clone(),
        config.attachments.blocked_extensions.clone(),
    ));

    let pipeline = Arc::new(IngestionPipeline::new(
        provider.clone(),
        repo.clone(),
        attachments,
        config.case_number_prefix.clone(),
        config.graph.mailbox_email.clone(),
    ));

    let subscriptions = Arc::new(SubscriptionManager::new(
        provider.clone(),
        repo.clone(),
        config.subscription.change_type.clone(),
        config.notification_url(),
        config.graph.client_state.clone(),
        config.subscription.lifetime_minutes,
        config.subscription.renew_threshold_minutes,
    ));

    let delta = Arc::new(DeltaPoller::new(
        provider.clone(),
        repo.clone(),
        pipeline.clone(),
        DeltaLimits {
            page_size: config.delta.page_size,
            max_pages_per_run: config.delta.max_pages_per_run,
            max_messages: config.delta.max_messages,
            concurrency: config.delta.concurrency,
        },
    ));

    Ok(Core {
        config,
        pipeline,
        subscriptions,
        delta,
        mailbox_id: mailbox.id,
    })
}

fn query_param<'a>(query: Option<&'a str>, key: &str) -> Option<&'a str> {
    query?.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == key).then_some(v)
    })
}

fn text_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("content-type", "text/plain")
        .body(Full::new(body.into()))
        .expect("building a response from a fixed status/body cannot fail")
}

fn json_response(status: StatusCode, value: &Value) -> Response<Full<Bytes>> {
    let body = serde_json::to_vec(value).unwrap_or_else(|_| b"{}".to_vec());
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .expect("building a response from a fixed status/body cannot fail")
}

fn is_admin_authorized(req: &Request<Incoming>, core: &Core) -> bool {
    req.headers()
        .get("x-admin-key")
        .and_then(|v| v.to_str().ok())
        == Some(core.config.admin_api_key.as_str())
}

/// Handles the `GET|POST /graph/webhook` validation handshake and
/// notification delivery. The handshake takes priority over body parsing
/// on either method, matching the original's check at the top of both
/// route handlers.
async fn handle_webhook(req: Request<Incoming>, core: Arc<Core>) -> Result<Response<Full<Bytes>>> {
    if let Some(token) = query_param(req.uri().query(), "validationToken") {
        let token = urlencoding_decode(token);
        return Ok(text_response(StatusCode::OK, token));
    }

    if req.method() != Method::POST {
        return Ok(text_response(StatusCode::BAD_REQUEST, "missing validationToken"));
    }

    let body = req.into_body().collect().await.context("reading webhook body")?.to_bytes();
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "webhook body is not valid JSON");
            return Ok(text_response(StatusCode::BAD_REQUEST, "invalid JSON"));
        }
    };

    let notifications = payload.get("value").and_then(|v| v.as_array()).cloned().unwrap_or_default();
    for notification in notifications {
        let client_state = notification.get("clientState").and_then(|v| v.as_str()).unwrap_or("");
        if client_state != core.config.graph.client_state {
            warn!("rejected webhook notification with mismatched clientState");
            return Ok(text_response(StatusCode::UNAUTHORIZED, "invalid clientState"));
        }

        let Some(message_id) = extract_message_id(&notification) else {
            warn!(notification = %notification, "webhook notification missing a usable message id");
            continue;
        };

        let core = core.clone();
        tokio::spawn(async move {
            if let Err(e) = core.pipeline.ingest(core.mailbox_id, &message_id).await {
                error!(message_id = %message_id, error = %e, "webhook-triggered ingestion failed");
            }
        });
    }

    Ok(text_response(StatusCode::ACCEPTED, ""))
}

fn extract_message_id(notification: &Value) -> Option<String> {
    if let Some(id) = notification.get("resourceData").and_then(|v| v.get("id")).and_then(|v| v.as_str()) {
        return Some(id.to_string());
    }
    let resource = notification.get("resource").and_then(|v| v.as_str())?;
    resource.rsplit_once("/messages/").map(|(_, id)| id.to_string())
}

/// Minimal percent-decoding for the `validationToken` query value; Graph
/// encodes it as an opaque token with no reserved characters in practice,
/// but `%XX` sequences are still unescaped defensively.
fn urlencoding_decode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        if c == '%' {
            let hi = chars.next();
            let lo = chars.next();
            if let (Some(hi), Some(lo)) = (hi, lo) {
                if let Ok(byte) = u8::from_str_radix(&format!("{hi}{lo}"), 16) {
                    out.push(byte as char);
                    continue;
                }
            }
            out.push('%');
        } else if c == '+' {
            out.push(' ');
        } else {
            out.push(c);
        }
    }
    out
}

async fn handle_subscription_ensure(req: Request<Incoming>, core: Arc<Core>) -> Result<Response<Full<Bytes>>> {
    if !is_admin_authorized(&req, &core) {
        return Ok(text_response(StatusCode::UNAUTHORIZED, "missing or invalid x-admin-key"));
    }
    let dry_run = query_param(req.uri().query(), "dry_run") == Some("1");
    let resource = core.config.subscription_resource();
    match core.subscriptions.ensure(core.mailbox_id, &resource, dry_run).await {
        Ok(outcome) => Ok(json_response(StatusCode::OK, &outcome_to_json(&outcome))),
        Err(e) => {
            error!(error = %e, "subscription ensure failed");
            Ok(json_response(StatusCode::INTERNAL_SERVER_ERROR, &json!({ "error": e.to_string() })))
        }
    }
}

fn outcome_to_json(outcome: &SubscriptionEnsureOutcome) -> Value {
    serde_json::to_value(outcome).unwrap_or_else(|_| json!({}))
}

async fn handle_delta_run(req: Request<Incoming>, core: Arc<Core>) -> Result<Response<Full<Bytes>>> {
    if !is_admin_authorized(&req, &core) {
        return Ok(text_response(StatusCode::UNAUTHORIZED, "missing or invalid x-admin-key"));
    }
    let results = core.delta.run_for_mailbox(core.mailbox_id, &core.config.graph.mailbox_email).await;
    let body: Vec<Value> = results
        .into_iter()
        .map(|(folder, outcome)| {
            json!({
                "folder_id": folder.provider_folder_id,
                "outcome": outcome_debug(&outcome),
            })
        })
        .collect();
    Ok(json_response(StatusCode::OK, &json!({ "folders": body })))
}

fn outcome_debug(outcome: &mailsync_core::domain::DeltaRunOutcome) -> String {
    format!("{outcome:?}")
}

async fn route(req: Request<Incoming>, core: Arc<Core>) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let result = match (method, path.as_str()) {
        (Method::GET, "/health") => Ok(json_response(
            StatusCode::OK,
            &json!({ "status": "ok", "env": core.config.env }),
        )),
        (Method::GET, "/graph/webhook") | (Method::POST, "/graph/webhook") => handle_webhook(req, core).await,
        (Method::POST, "/graph/subscription/ensure") => handle_subscription_ensure(req, core).await,
        (Method::POST, "/graph/delta/run") => handle_delta_run(req, core).await,
        _ => Ok(text_response(StatusCode::NOT_FOUND, "not found")),
    };

    Ok(result.unwrap_or_else(|e| {
        error!(error = %e, "request handler failed");
        text_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
    }))
}

async fn run_http_server(addr: SocketAddr, core: Arc<Core>, shutdown: CancellationToken) -> Result<()> {
    let listener = TcpListener::bind(addr).await.context("binding HTTP listener")?;
    info!(%addr, "HTTP server listening");

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, _) = result?;
                let io = TokioIo::new(stream);
                let core = core.clone();

                tokio::spawn(async move {
                    let service = service_fn(move |req| route(req, core.clone()));
                    if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                        error!(error = %e, "HTTP connection error");
                    }
                });
            }
            _ = shutdown.cancelled() => {
                info!("HTTP server shutting down");
                break;
            }
        }
    }

    Ok(())
}

async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("installing SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("loading configuration")?;
    init_logging(&config);

    let host = config.host.clone();
    let port = config.port;
    let sub_interval = config.scheduler.subscription_loop_interval;
    let sub_jitter = config.scheduler.subscription_loop_jitter;
    let delta_interval = config.scheduler.delta_loop_interval;
    let delta_jitter = config.scheduler.delta_loop_jitter;

    let core = Arc::new(build_core(config).await?);
    let shutdown = CancellationToken::new();

    let subscription_resource = core.config.subscription_resource();
    let subscriptions = core.subscriptions.clone();
    let mailbox_id = core.mailbox_id;
    let sub_loop = tokio::spawn(run_subscription_loop(
        subscriptions,
        mailbox_id,
        subscription_resource,
        sub_interval,
        sub_jitter,
        shutdown.clone(),
    ));

    let delta_poller = core.delta.clone();
    let mailbox_email = core.config.graph.mailbox_email.clone();
    let delta_loop = tokio::spawn(run_delta_loop(
        delta_poller,
        mailbox_id,
        mailbox_email,
        delta_interval,
        delta_jitter,
        shutdown.clone(),
    ));

    let addr: SocketAddr = format!("{host}:{port}").parse().context("parsing HOST:PORT")?;
    let server = tokio::spawn(run_http_server(addr, core.clone(), shutdown.clone()));

    wait_for_shutdown_signal().await;
    info!("shutdown signal received");
    shutdown.cancel();

    let _ = tokio::join!(sub_loop, delta_loop, server);
    info!("worker stopped");
    Ok(())
}
