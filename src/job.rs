//! Mining job: header assembly and the parallel nonce sweep.
//!
//! A [`Job`] is built from the hex parameters of a `mining.notify`, combined
//! with the session values the subscription coordinator fills in. Once built
//! it can be started, stopped and resumed: `mine` spawns one worker per
//! configured slot, `stop` signals the atomic stop flag and waits for every
//! worker to quiesce, and a later `mine` resumes each worker from its
//! recorded checkpoint.
//!
//! The search space is two-dimensional: for every 4-byte extraNonce2 value
//! the 32-bit header nonce is swept. Worker `k` of `N` owns the nonce
//! residue class `k mod N` (stride partition), so workers need no
//! coordination in the hot path and the header prefix is computed once per
//! extraNonce2.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::{self, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::algorithm::HashFn;
use crate::bytes::{restore_prev_hash_word_order, reversed};
use crate::share::Share;

/// Interval between hash-rate log records.
const HASH_RATE_INTERVAL: Duration = Duration::from_secs(10);

/// Parameters for building a [`Job`].
///
/// The hex fields arrive verbatim from `mining.notify`; `target`,
/// `extra_nonce1` and `extra_nonce2_length` are filled in by the
/// subscription coordinator before the job is built.
#[derive(Debug, Clone)]
pub struct JobParams {
    pub job_id: String,
    pub prev_hash: String,
    pub coinb1: String,
    pub coinb2: String,
    pub merkle_branches: Vec<String>,
    pub version: String,
    pub nbits: String,
    pub ntime: String,

    /// Share target, filled from the subscription.
    pub target: [u8; 32],
    /// Pool-assigned coinbase prefix nonce, filled from the subscription.
    pub extra_nonce1: Vec<u8>,
    /// Negotiated extraNonce2 width, filled from the subscription.
    pub extra_nonce2_length: u32,

    /// Proof-of-work hash function.
    pub hash: HashFn,
    /// Number of parallel workers.
    pub workers: u32,
}

/// Error building a job from notify parameters.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("invalid {field} hex: {source}")]
    InvalidHex {
        field: &'static str,
        source: hex::FromHexError,
    },

    #[error("{field} must be {expected} bytes, got {actual}")]
    InvalidLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("extraNonce2 length {0} is unsupported, only 4 is implemented")]
    UnsupportedExtraNonce2Length(u32),

    #[error("at least one worker is required")]
    NoWorkers,
}

/// A worker's position in the extraNonce2 × nonce space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Checkpoint {
    pub extra_nonce2: u32,
    pub nonce: u32,
}

/// One mining work unit.
///
/// Field byte order follows the block header (little-endian), so the decoded
/// notify fields are reversed on construction.
pub struct Job {
    id: String,
    prev_hash: [u8; 32],
    coinb1: Vec<u8>,
    coinb2: Vec<u8>,
    merkle_branches: Vec<[u8; 32]>,
    version: [u8; 4],
    nbits: [u8; 4],
    ntime: [u8; 4],

    target: [u8; 32],
    extra_nonce1: Vec<u8>,

    hash: HashFn,
    workers: u32,

    stop_flag: AtomicBool,
    /// Last recorded position per worker, written only by the owning worker.
    checkpoints: StdMutex<Vec<Option<Checkpoint>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,

    hash_counters: Vec<AtomicU64>,
    reporter_running: AtomicBool,
}

impl Job {
    /// Decode and validate notify parameters into a runnable job.
    pub fn build(params: JobParams) -> Result<Job, JobError> {
        if params.workers == 0 {
            return Err(JobError::NoWorkers);
        }
        if params.extra_nonce2_length != 4 {
            return Err(JobError::UnsupportedExtraNonce2Length(params.extra_nonce2_length));
        }

        let prev_hash: [u8; 32] = decode_fixed("prev_hash", &params.prev_hash)?;
        let merkle_branches = params
            .merkle_branches
            .iter()
            .map(|branch| decode_fixed::<32>("merkle_branch", branch))
            .collect::<Result<Vec<_>, _>>()?;

        let workers = params.workers;

        Ok(Job {
            id: params.job_id,
            prev_hash: reversed(restore_prev_hash_word_order(prev_hash)),
            coinb1: decode_hex("coinb1", &params.coinb1)?,
            coinb2: decode_hex("coinb2", &params.coinb2)?,
            merkle_branches,
            version: reversed(decode_fixed("version", &params.version)?),
            nbits: reversed(decode_fixed("nbits", &params.nbits)?),
            ntime: reversed(decode_fixed("ntime", &params.ntime)?),
            target: params.target,
            extra_nonce1: params.extra_nonce1,
            hash: params.hash,
            workers,
            stop_flag: AtomicBool::new(false),
            checkpoints: StdMutex::new(vec![None; workers as usize]),
            handles: Mutex::new(Vec::new()),
            hash_counters: (0..workers).map(|_| AtomicU64::new(0)).collect(),
            reporter_running: AtomicBool::new(false),
        })
    }

    /// Job identifier as assigned by the pool.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Start (or resume) the sweep.
    ///
    /// Clears the stop flag, spawns one worker per slot and returns a fresh
    /// shares channel. Workers resume from their stored checkpoints, so
    /// calling this after [`stop`](Job::stop) continues the sweep without
    /// revisiting any position.
    pub async fn mine(self: Arc<Self>) -> mpsc::Receiver<Share> {
        let (shares_tx, shares_rx) = mpsc::channel(1);

        self.stop_flag.store(false, Ordering::SeqCst);

        let mut handles = self.handles.lock().await;
        for worker_id in 0..self.workers {
            let job = Arc::clone(&self);
            let shares = shares_tx.clone();
            handles.push(task::spawn_blocking(move || job.worker(worker_id, shares)));
        }
        drop(handles);

        if !self.reporter_running.swap(true, Ordering::SeqCst) {
            tokio::spawn(Arc::clone(&self).report_hash_rate());
        }

        shares_rx
    }

    /// Stop the sweep and wait for every worker to quiesce.
    ///
    /// When this returns, no worker is running and each worker's last
    /// position is recorded in the checkpoint table.
    pub async fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);

        let mut handles = self.handles.lock().await;
        for handle in handles.drain(..) {
            if let Err(error) = handle.await {
                warn!(job_id = %self.id, %error, "Mining worker failed");
            }
        }
    }

    /// Compute the merkle root for the given extraNonce2.
    ///
    /// The coinbase is `coinb1 || extraNonce1 || extraNonce2 || coinb2`; its
    /// hash is folded with each merkle branch in order.
    fn merkle_root(&self, extra_nonce2: &[u8; 4]) -> [u8; 32] {
        let mut coinbase = Vec::with_capacity(
            self.coinb1.len() + self.extra_nonce1.len() + extra_nonce2.len() + self.coinb2.len(),
        );
        coinbase.extend_from_slice(&self.coinb1);
        coinbase.extend_from_slice(&self.extra_nonce1);
        coinbase.extend_from_slice(extra_nonce2);
        coinbase.extend_from_slice(&self.coinb2);

        let mut root = (self.hash)(&coinbase);

        let mut node = [0u8; 64];
        for branch in &self.merkle_branches {
            node[..32].copy_from_slice(&root);
            node[32..].copy_from_slice(branch);
            root = (self.hash)(&node);
        }

        root
    }

    /// Assemble the first 76 header bytes; the nonce completes them to 80.
    fn header_prefix(&self, extra_nonce2: &[u8; 4]) -> [u8; 76] {
        let merkle_root = self.merkle_root(extra_nonce2);

        let mut prefix = [0u8; 76];
        prefix[..4].copy_from_slice(&self.version);
        prefix[4..36].copy_from_slice(&self.prev_hash);
        prefix[36..68].copy_from_slice(&merkle_root);
        prefix[68..72].copy_from_slice(&self.ntime);
        prefix[72..76].copy_from_slice(&self.nbits);
        prefix
    }

    /// True iff `digest`, read as an unsigned big-endian integer, is
    /// strictly below the target.
    fn reach_target(&self, digest: &[u8; 32]) -> bool {
        digest < &self.target
    }

    fn store_checkpoint(&self, worker_id: u32, checkpoint: Checkpoint) {
        let mut checkpoints = self.checkpoints.lock().expect("checkpoint lock poisoned");
        checkpoints[worker_id as usize] = Some(checkpoint);
    }

    /// The worker loop for slot `worker_id`, run on the blocking pool.
    ///
    /// Sweeps nonces `worker_id, worker_id + N, worker_id + 2N, …` for each
    /// extraNonce2 in turn, checking the stop flag once per hash. On finding
    /// a share it arms the stop flag for its peers, records the next
    /// resumption point and emits the share (the send may block until the
    /// drain catches up).
    fn worker(&self, worker_id: u32, shares: mpsc::Sender<Share>) {
        let stride = self.workers;
        let resume = self.checkpoints.lock().expect("checkpoint lock poisoned")
            [worker_id as usize]
            .unwrap_or(Checkpoint {
                extra_nonce2: 0,
                nonce: worker_id,
            });

        let mut extra_nonce2 = resume.extra_nonce2;
        let mut next_nonce = resume.nonce;

        let counter = &self.hash_counters[worker_id as usize];
        let mut header = [0u8; 80];

        loop {
            let extra_nonce2_bytes = extra_nonce2.to_le_bytes();
            header[..76].copy_from_slice(&self.header_prefix(&extra_nonce2_bytes));

            let mut nonce = next_nonce;
            loop {
                if self.stop_flag.load(Ordering::Relaxed) {
                    self.store_checkpoint(worker_id, Checkpoint { extra_nonce2, nonce });
                    return;
                }

                header[76..].copy_from_slice(&nonce.to_le_bytes());
                let digest = (self.hash)(&header);
                counter.fetch_add(1, Ordering::Relaxed);

                if self.reach_target(&digest) {
                    self.stop_flag.store(true, Ordering::SeqCst);
                    debug!(job_id = %self.id, worker_id, extra_nonce2, nonce, "Worker found share");

                    let checkpoint = match nonce.checked_add(stride) {
                        Some(next) => Checkpoint { extra_nonce2, nonce: next },
                        None => Checkpoint {
                            extra_nonce2: extra_nonce2.wrapping_add(1),
                            nonce: worker_id,
                        },
                    };
                    self.store_checkpoint(worker_id, checkpoint);

                    let share =
                        Share::new(&self.id, extra_nonce2_bytes, self.ntime, nonce.to_le_bytes());
                    if shares.blocking_send(share).is_err() {
                        debug!(job_id = %self.id, worker_id, "Shares channel closed, share dropped");
                    }
                    return;
                }

                match nonce.checked_add(stride) {
                    Some(next) => nonce = next,
                    None => break,
                }
            }

            next_nonce = worker_id;
            match extra_nonce2.checked_add(1) {
                Some(next) => extra_nonce2 = next,
                None => break,
            }
        }

        debug!(job_id = %self.id, worker_id, "Search space exhausted");
    }

    /// Periodic hash-rate logger; one instance per job across pause/resume.
    async fn report_hash_rate(self: Arc<Self>) {
        let mut interval = tokio::time::interval(HASH_RATE_INTERVAL);
        interval.tick().await;
        let mut last = Instant::now();

        loop {
            interval.tick().await;
            if self.stop_flag.load(Ordering::SeqCst) {
                break;
            }

            let elapsed = last.elapsed().as_secs_f64();
            last = Instant::now();

            let hashes: u64 = self
                .hash_counters
                .iter()
                .map(|counter| counter.swap(0, Ordering::Relaxed))
                .sum();

            info!(
                job_id = %self.id,
                rate = %format_hash_rate(hashes as f64 / elapsed),
                "Hash rate",
            );
        }

        self.reporter_running.store(false, Ordering::SeqCst);
    }

    #[cfg(test)]
    pub(crate) fn checkpoint(&self, worker_id: u32) -> Option<Checkpoint> {
        self.checkpoints.lock().expect("checkpoint lock poisoned")[worker_id as usize]
    }

    #[cfg(test)]
    fn stopped(&self) -> bool {
        self.stop_flag.load(Ordering::SeqCst)
    }
}

fn decode_hex(field: &'static str, hex_str: &str) -> Result<Vec<u8>, JobError> {
    hex::decode(hex_str).map_err(|source| JobError::InvalidHex { field, source })
}

fn decode_fixed<const N: usize>(field: &'static str, hex_str: &str) -> Result<[u8; N], JobError> {
    let bytes = decode_hex(field, hex_str)?;
    let actual = bytes.len();
    bytes.try_into().map_err(|_| JobError::InvalidLength {
        field,
        expected: N,
        actual,
    })
}

fn format_hash_rate(mut rate: f64) -> String {
    let mut unit = "H/s";
    if rate >= 1000.0 {
        rate /= 1000.0;
        unit = "kH/s";
    }
    if rate >= 1000.0 {
        rate /= 1000.0;
        unit = "MH/s";
    }
    format!("{rate:.2} {unit}")
}
