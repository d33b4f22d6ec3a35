//! Subscription coordinator: session parameters and job lifecycle.
//!
//! One instance exists per client session. It owns the pool-assigned
//! subscription values (`extraNonce1`, extraNonce2 width), the current share
//! target, and the currently mining [`Job`]. A single mutex serialises every
//! lifecycle transition, so at any instant at most one job is mining and the
//! outgoing job is fully quiesced before its replacement is built.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::job::{Job, JobError, JobParams};
use crate::share::Share;
use crate::target::{difficulty_to_target, TargetError};

/// Coordinator errors surfaced to the client.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("invalid extraNonce1 hex: {0}")]
    InvalidExtraNonce1(#[from] hex::FromHexError),

    #[error(transparent)]
    Target(#[from] TargetError),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error("no job to continue")]
    NoJob,
}

/// Session-scoped mining state behind the coordinator mutex.
#[derive(Default)]
struct State {
    id: Option<String>,
    extra_nonce1: Vec<u8>,
    extra_nonce2_length: u32,
    difficulty: f64,
    /// All-zero (unreachable) until the first `set_difficulty`, so a job
    /// started early mines without emitting shares.
    target: [u8; 32],
    current_job: Option<Arc<Job>>,
}

/// The subscription coordinator.
pub struct Subscription {
    state: Mutex<State>,
}

impl Default for Subscription {
    fn default() -> Self {
        Self::new()
    }
}

impl Subscription {
    pub fn new() -> Self {
        Subscription {
            state: Mutex::new(State::default()),
        }
    }

    /// Store the parameters of a successful `mining.subscribe`.
    pub async fn set(
        &self,
        subscription_id: &str,
        extra_nonce1_hex: &str,
        extra_nonce2_length: u32,
    ) -> Result<(), SubscriptionError> {
        let extra_nonce1 = hex::decode(extra_nonce1_hex)?;

        let mut state = self.state.lock().await;
        state.id = Some(subscription_id.to_string());
        state.extra_nonce1 = extra_nonce1;
        state.extra_nonce2_length = extra_nonce2_length;
        Ok(())
    }

    /// Derive and store the share target for a new difficulty.
    ///
    /// On error (negative or non-finite difficulty) the previous target is
    /// kept.
    pub async fn set_difficulty(&self, difficulty: f64) -> Result<(), SubscriptionError> {
        let target = difficulty_to_target(difficulty)?;

        let mut state = self.state.lock().await;
        state.difficulty = difficulty;
        state.target = target;
        debug!(difficulty, target = %hex::encode(target), "Share target updated");
        Ok(())
    }

    /// Replace the current job.
    ///
    /// Stops the outgoing job (blocking until its workers quiesce), fills
    /// the session-scoped parameters into `params`, builds the new job and
    /// starts its workers. Returns the new job's shares channel.
    pub async fn new_job(
        &self,
        mut params: JobParams,
    ) -> Result<mpsc::Receiver<Share>, SubscriptionError> {
        let mut state = self.state.lock().await;

        if let Some(job) = state.current_job.take() {
            debug!(job_id = %job.id(), "Stopping outgoing job");
            job.stop().await;
        }

        params.target = state.target;
        params.extra_nonce1 = state.extra_nonce1.clone();
        params.extra_nonce2_length = state.extra_nonce2_length;

        let job = Arc::new(Job::build(params)?);
        let shares = Arc::clone(&job).mine().await;
        state.current_job = Some(job);
        Ok(shares)
    }

    /// Resume the current job from its checkpoints.
    pub async fn continue_job(&self) -> Result<mpsc::Receiver<Share>, SubscriptionError> {
        let state = self.state.lock().await;
        let job = state.current_job.as_ref().ok_or(SubscriptionError::NoJob)?;
        Ok(Arc::clone(job).mine().await)
    }

    /// True until the first job has been created.
    pub async fn no_job(&self) -> bool {
        self.state.lock().await.current_job.is_none()
    }

    /// Pool-assigned subscription id, if subscribed.
    pub async fn id(&self) -> Option<String> {
        self.state.lock().await.id.clone()
    }

    /// Most recently accepted difficulty.
    pub async fn difficulty(&self) -> f64 {
        self.state.lock().await.difficulty
    }

    /// Stop the current job, if any. Used at session teardown.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        if let Some(job) = state.current_job.take() {
            job.stop().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::Algorithm;

    fn notify_params(job_id: &str) -> JobParams {
        JobParams {
            job_id: job_id.into(),
            prev_hash: "aabbccdd112233445566778899aabbccdeadbeefcafebabef00dfacebadc0ffe"
                .into(),
            coinb1: "01000000".into(),
            coinb2: "ffffffff".into(),
            merkle_branches: Vec::new(),
            version: "20000000".into(),
            nbits: "1d00ffff".into(),
            ntime: "504e86b9".into(),
            target: [0u8; 32],
            extra_nonce1: Vec::new(),
            extra_nonce2_length: 0,
            hash: Algorithm::Sha256d.hash_fn(),
            workers: 1,
        }
    }

    /// Never below any target: the all-ones digest only ties the loosest one.
    fn stuck_hash(_data: &[u8]) -> [u8; 32] {
        [0xff; 32]
    }

    #[tokio::test]
    async fn set_stores_session_parameters() {
        let subscription = Subscription::new();
        subscription.set("deadbeef", "08000002", 4).await.unwrap();

        assert_eq!(subscription.id().await.as_deref(), Some("deadbeef"));
        let state = subscription.state.lock().await;
        assert_eq!(state.extra_nonce1, vec![0x08, 0x00, 0x00, 0x02]);
        assert_eq!(state.extra_nonce2_length, 4);
    }

    #[tokio::test]
    async fn set_rejects_bad_extra_nonce1_hex() {
        let subscription = Subscription::new();
        assert!(matches!(
            subscription.set("s", "not-hex", 4).await,
            Err(SubscriptionError::InvalidExtraNonce1(_))
        ));
    }

    #[tokio::test]
    async fn set_difficulty_derives_target() {
        let subscription = Subscription::new();
        subscription.set_difficulty(1.0).await.unwrap();

        let state = subscription.state.lock().await;
        assert_eq!(
            hex::encode(state.target),
            "00000000ffff0000000000000000000000000000000000000000000000000000",
        );
    }

    #[tokio::test]
    async fn negative_difficulty_keeps_previous_target() {
        let subscription = Subscription::new();
        subscription.set_difficulty(1.0).await.unwrap();
        let before = subscription.state.lock().await.target;

        assert!(subscription.set_difficulty(-3.0).await.is_err());

        assert_eq!(subscription.state.lock().await.target, before);
        assert_eq!(subscription.difficulty().await, 1.0);
    }

    #[tokio::test]
    async fn new_job_requires_subscription_parameters() {
        let subscription = Subscription::new();

        // Without a prior `set` the extraNonce2 width is zero.
        let result = subscription.new_job(notify_params("early")).await;
        assert!(matches!(
            result,
            Err(SubscriptionError::Job(JobError::UnsupportedExtraNonce2Length(0)))
        ));
        assert!(subscription.no_job().await);
    }

    #[tokio::test]
    async fn new_job_mines_and_emits_shares() {
        let subscription = Subscription::new();
        subscription.set("s1", "08000002", 4).await.unwrap();
        // Difficulty zero: every hash is a share.
        subscription.set_difficulty(0.0).await.unwrap();

        assert!(subscription.no_job().await);
        let mut shares = subscription.new_job(notify_params("job-a")).await.unwrap();
        assert!(!subscription.no_job().await);

        let share = shares.recv().await.expect("share expected");
        assert_eq!(share.job_id, "job-a");

        subscription.shutdown().await;
    }

    #[tokio::test]
    async fn new_job_stops_the_outgoing_job() {
        let subscription = Subscription::new();
        subscription.set("s1", "08000002", 4).await.unwrap();
        subscription.set_difficulty(0.0).await.unwrap();

        let mut first_params = notify_params("job-a");
        first_params.hash = stuck_hash;
        let mut first_shares = subscription.new_job(first_params).await.unwrap();

        let mut second_params = notify_params("job-b");
        second_params.hash = stuck_hash;
        let _second_shares = subscription.new_job(second_params).await.unwrap();

        // The first job's workers quiesced, so its channel is closed.
        assert!(first_shares.recv().await.is_none());

        let state = subscription.state.lock().await;
        assert_eq!(state.current_job.as_ref().unwrap().id(), "job-b");
        drop(state);

        subscription.shutdown().await;
    }

    #[tokio::test]
    async fn continue_job_requires_a_job() {
        let subscription = Subscription::new();
        assert!(matches!(
            subscription.continue_job().await,
            Err(SubscriptionError::NoJob)
        ));
    }

    #[tokio::test]
    async fn continue_job_resumes_after_stop() {
        let subscription = Subscription::new();
        subscription.set("s1", "08000002", 4).await.unwrap();
        subscription.set_difficulty(0.0).await.unwrap();

        let mut shares = subscription.new_job(notify_params("job-a")).await.unwrap();
        let first = shares.recv().await.expect("first share");

        // The finder stopped every worker; resume sweeps on from the
        // checkpoints and finds the next share.
        let mut shares = subscription.continue_job().await.unwrap();
        let second = shares.recv().await.expect("second share");

        assert_eq!(first.job_id, second.job_id);
        assert_ne!(first.nonce, second.nonce);

        subscription.shutdown().await;
    }
}
