//! Stratum v1 client: session orchestration and the dispatch matrix.
//!
//! `serve` runs the whole session: it sends `mining.authorize`, then loops
//! reading frames until the connection drops, a protocol-fatal error occurs
//! or shutdown is requested. Inbound frames are classified by the wire
//! format (request vs response), responses are correlated through the
//! pending-request table, and notifications drive the subscription
//! coordinator. Found shares are drained from the active job's channel into
//! `mining.submit` calls by a background task.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::connection::{Connection, TransportRead, TransportWrite};
use super::error::{StratumError, StratumResult};
use super::messages::{parse_notify_params, parse_subscribe_result, Message, RpcError};
use super::transport::{PendingCall, RpcTransport};
use crate::algorithm::Algorithm;
use crate::job::JobParams;
use crate::share::Share;
use crate::subscription::Subscription;

const METHOD_AUTHORIZE: &str = "mining.authorize";
const METHOD_SUBSCRIBE: &str = "mining.subscribe";
const METHOD_SUBMIT: &str = "mining.submit";
const METHOD_NOTIFY: &str = "mining.notify";
const METHOD_SET_DIFFICULTY: &str = "mining.set_difficulty";

/// Pool error code meaning the submitted job id is no longer known.
const ERROR_JOB_NOT_FOUND: i64 = 21;

/// Pool session configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Pool address: `stratum+tcp://host:port`, `tcp://host:port` or bare
    /// `host:port`.
    pub pool_address: String,

    /// Worker login (usually wallet address plus worker name).
    pub login: String,

    /// Worker password; most pools ignore it.
    pub password: String,

    /// Proof-of-work algorithm of the mined chain.
    pub algorithm: Algorithm,

    /// Number of parallel mining workers.
    pub miners_count: u32,

    /// User agent announced in `mining.subscribe`.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            pool_address: String::new(),
            login: String::new(),
            password: "x".to_string(),
            algorithm: Algorithm::Sha256d,
            miners_count: 1,
            user_agent: concat!("galena-miner/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Stratum v1 mining client.
///
/// [`serve`](Client::serve) blocks for the life of the session and returns
/// when the connection ends, a protocol-fatal error occurs, or the shutdown
/// token is cancelled.
pub struct Client {
    config: ClientConfig,
    shutdown: CancellationToken,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Client {
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that ends [`serve`](Client::serve) gracefully when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Connect to the pool and run the session to completion.
    pub async fn serve(self) -> StratumResult<()> {
        let connection = Connection::connect(&self.config.pool_address).await?;
        let (reader, writer) = connection.split();
        self.serve_transport(reader, Box::new(writer)).await
    }

    /// Run the session over pre-established transport halves.
    pub(crate) async fn serve_transport(
        self,
        mut reader: impl TransportRead,
        writer: Box<dyn TransportWrite>,
    ) -> StratumResult<()> {
        let Client { config, shutdown } = self;

        info!(pool = %config.pool_address, algorithm = %config.algorithm, workers = config.miners_count, "Session starting");

        let session = Arc::new(Session {
            config,
            subscription: Subscription::new(),
            transport: RpcTransport::new(writer),
            latest_params: Mutex::new(None),
        });

        session
            .transport
            .call(
                METHOD_AUTHORIZE,
                vec![
                    json!(session.config.login),
                    json!(session.config.password),
                ],
            )
            .await?;

        let result = loop {
            tokio::select! {
                frame = reader.read_frame() => match frame {
                    Ok(Some(line)) => {
                        if let Err(fatal) = Session::handle_frame(&session, &line).await {
                            error!(error = %fatal, "Session-fatal error");
                            break Err(fatal);
                        }
                    }
                    Ok(None) => {
                        info!("Connection closed by pool");
                        break Err(StratumError::Disconnected);
                    }
                    Err(error) => break Err(error),
                },
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested");
                    break Ok(());
                }
            }
        };

        session.subscription.shutdown().await;
        result
    }
}

/// Shared per-session state reachable from the reader loop and the
/// share-drain tasks.
struct Session {
    config: ClientConfig,
    subscription: Subscription,
    transport: RpcTransport,
    /// Most recently received job parameters, kept so an error-21 submit
    /// rejection can rebuild the job without waiting for the next notify.
    latest_params: Mutex<Option<JobParams>>,
}

impl Session {
    /// Classify and dispatch one frame. Returns `Err` only for
    /// session-fatal conditions.
    async fn handle_frame(session: &Arc<Session>, line: &str) -> StratumResult<()> {
        let message: Message = match serde_json::from_str(line) {
            Ok(message) => message,
            Err(parse_error) => {
                warn!(error = %parse_error, line, "Frame is neither request nor response, skipping");
                return Ok(());
            }
        };

        match message {
            Message::Request { method, params, .. } => {
                Session::handle_request(session, &method, &params).await;
                Ok(())
            }
            Message::Response { id, result, error } => {
                match session.transport.take_pending(id).await {
                    Some(call) => Session::handle_response(session, &call, result, error).await,
                    None => {
                        warn!(id, "Response has no matching pending request");
                        Ok(())
                    }
                }
            }
        }
    }

    /// Dispatch an inbound server request. Inbound requests carry no
    /// response members, so any `error` field is ignored. Failures here are
    /// logged and never end the session.
    async fn handle_request(session: &Arc<Session>, method: &str, params: &[Value]) {
        let result = match method {
            METHOD_SET_DIFFICULTY => session.on_set_difficulty(params).await,
            METHOD_NOTIFY => Session::on_notify(session, params).await,
            "client.reconnect" | "client.show_message" | "mining.set_extranonce" => {
                info!(method, ?params, "Ignoring pool request");
                Ok(())
            }
            _ => {
                warn!(method, "Unsupported method call");
                Ok(())
            }
        };

        if let Err(error) = result {
            error!(method, %error, "Failed to handle pool request");
        }
    }

    async fn on_set_difficulty(&self, params: &[Value]) -> StratumResult<()> {
        let [difficulty] = params else {
            return Err(StratumError::InvalidMessage(
                "mining.set_difficulty expects 1 param".into(),
            ));
        };
        let difficulty = difficulty.as_f64().ok_or_else(|| {
            StratumError::InvalidMessage("difficulty is not a number".into())
        })?;

        self.subscription.set_difficulty(difficulty).await?;
        info!(difficulty, "Difficulty updated");
        Ok(())
    }

    async fn on_notify(session: &Arc<Session>, params: &[Value]) -> StratumResult<()> {
        let (params, clean_jobs) = parse_notify_params(
            params,
            session.config.algorithm.hash_fn(),
            session.config.miners_count,
        )?;

        info!(
            job_id = %params.job_id,
            clean_jobs,
            merkle_branches = params.merkle_branches.len(),
            "New job notification",
        );

        *session.latest_params.lock().await = Some(params.clone());

        if clean_jobs || session.subscription.no_job().await {
            let shares = session.subscription.new_job(params).await?;
            Session::spawn_share_drain(session, shares);
        }

        Ok(())
    }

    /// Dispatch a correlated response by the method of its request.
    async fn handle_response(
        session: &Arc<Session>,
        call: &PendingCall,
        result: Option<Value>,
        error: Option<RpcError>,
    ) -> StratumResult<()> {
        match call.method.as_str() {
            METHOD_AUTHORIZE => session.on_authorize_response(result, error).await,
            METHOD_SUBSCRIBE => session.on_subscribe_response(result, error).await,
            METHOD_SUBMIT => {
                Session::on_submit_response(session, call, result, error).await;
                Ok(())
            }
            method => {
                debug!(method, "Response for untracked method");
                Ok(())
            }
        }
    }

    /// A declined or errored authorize is fatal; success triggers subscribe.
    async fn on_authorize_response(
        &self,
        result: Option<Value>,
        error: Option<RpcError>,
    ) -> StratumResult<()> {
        if let Some(error) = error {
            return Err(StratumError::AuthorizationFailed(error.to_string()));
        }
        if result.as_ref().and_then(Value::as_bool) != Some(true) {
            return Err(StratumError::AuthorizationFailed(
                "pool declined the login".into(),
            ));
        }

        info!(login = %self.config.login, "Authorized");
        self.transport
            .call(METHOD_SUBSCRIBE, vec![json!(self.config.user_agent)])
            .await?;
        Ok(())
    }

    /// An errored or malformed subscribe result is fatal.
    async fn on_subscribe_response(
        &self,
        result: Option<Value>,
        error: Option<RpcError>,
    ) -> StratumResult<()> {
        if let Some(error) = error {
            return Err(StratumError::SubscriptionFailed(error.to_string()));
        }
        let result = result
            .ok_or_else(|| StratumError::SubscriptionFailed("response has no result".into()))?;

        let (subscription_id, extra_nonce1, extra_nonce2_length) =
            parse_subscribe_result(&result)?;

        self.subscription
            .set(&subscription_id, &extra_nonce1, extra_nonce2_length)
            .await
            .map_err(|error| StratumError::SubscriptionFailed(error.to_string()))?;

        info!(subscription_id, extra_nonce1, extra_nonce2_length, "Subscribed");
        Ok(())
    }

    /// Submit responses are never session-fatal: error 21 rebuilds the job
    /// from the memoised parameters, any other error resumes the current
    /// sweep from its checkpoints.
    async fn on_submit_response(
        session: &Arc<Session>,
        call: &PendingCall,
        result: Option<Value>,
        error: Option<RpcError>,
    ) {
        let Some(error) = error else {
            if result.as_ref().and_then(Value::as_bool) == Some(false) {
                warn!(job = ?call.params.get(1), "Pool returned false for submitted share");
            } else {
                info!(job = ?call.params.get(1), "Share accepted");
            }
            return;
        };

        error!(code = ?error.code(), %error, job = ?call.params.get(1), "Share rejected");

        let restarted = if error.code() == Some(ERROR_JOB_NOT_FOUND) {
            let params = session.latest_params.lock().await.clone();
            match params {
                Some(params) => session.subscription.new_job(params).await,
                None => {
                    error!("No remembered job parameters to rebuild from");
                    return;
                }
            }
        } else {
            session.subscription.continue_job().await
        };

        match restarted {
            Ok(shares) => Session::spawn_share_drain(session, shares),
            Err(error) => error!(%error, "Failed to restart mining after rejection"),
        }
    }

    /// Drain found shares into `mining.submit` calls until the channel
    /// closes. Submit responses are handled by the reader loop.
    fn spawn_share_drain(session: &Arc<Session>, mut shares: mpsc::Receiver<Share>) {
        let session = Arc::clone(session);
        tokio::spawn(async move {
            while let Some(share) = shares.recv().await {
                info!(
                    job_id = %share.job_id,
                    extra_nonce2 = %share.extra_nonce2,
                    nonce = %share.nonce,
                    "Share found, submitting",
                );

                let submitted = session
                    .transport
                    .call(
                        METHOD_SUBMIT,
                        vec![
                            json!(session.config.login),
                            json!(share.job_id),
                            json!(share.extra_nonce2),
                            json!(share.ntime),
                            json!(share.nonce),
                        ],
                    )
                    .await;

                if let Err(error) = submitted {
                    warn!(%error, "Failed to submit share, ending drain");
                    break;
                }
            }
        });
    }
}
