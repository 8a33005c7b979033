//! Proof Pool
//!
//! Bounded worker pool for proof verification. A transaction opens a
//! `ProofBatch`, submits each proof as soon as it is parsed, runs its cheap
//! checks meanwhile and then waits for the batch.
//!
//! ```text
//!   verifier ── submit ──▶ ThreadPool (N workers) ── result ──┐
//!       │                                                     │
//!       └──────────────────── wait() ◀── channel ◀────────────┘
//! ```
//!
//! Dropping a batch cancels its checks that have not started yet.

use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use thiserror::Error;

use dece_config::VerifierConfig;
use dece_privacy::OracleError;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProofError {
    #[error("{what} proof rejected: {source}")]
    Rejected {
        what: &'static str,
        source: OracleError,
    },
    #[error("proof worker exited before reporting")]
    Lost,
}

type Report = (&'static str, Option<Result<(), OracleError>>);

pub struct ProofPool {
    pool: ThreadPool,
}

impl ProofPool {
    pub fn new(threads: usize) -> Result<Self, ThreadPoolBuildError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("dece-proof-{}", i))
            .build()?;
        log::info!("Proof pool started with {} threads", pool.current_num_threads());
        Ok(Self { pool })
    }

    /// Pool sized by the `[verifier]` section
    pub fn from_config(config: &VerifierConfig) -> Result<Self, ThreadPoolBuildError> {
        Self::new(config.threads)
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Open a result channel for one transaction
    pub fn batch(&self) -> ProofBatch<'_> {
        let (tx, rx) = mpsc::channel();
        ProofBatch {
            pool: &self.pool,
            tx: Some(tx),
            rx,
            pending: 0,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }
}

pub struct ProofBatch<'a> {
    pool: &'a ThreadPool,
    tx: Option<Sender<Report>>,
    rx: Receiver<Report>,
    pending: usize,
    cancel: Arc<AtomicBool>,
}

impl ProofBatch<'_> {
    /// Queue one check on the pool
    pub fn submit<F>(&mut self, what: &'static str, check: F)
    where
        F: FnOnce() -> Result<(), OracleError> + Send + 'static,
    {
        let Some(tx) = self.tx.clone() else {
            return;
        };
        let cancel = self.cancel.clone();
        self.pending += 1;

        self.pool.spawn(move || {
            let result = if cancel.load(Ordering::Acquire) {
                None
            } else {
                Some(check())
            };
            // the receiver is gone once the batch was dropped
            let _ = tx.send((what, result));
        });
    }

    pub fn len(&self) -> usize {
        self.pending
    }

    pub fn is_empty(&self) -> bool {
        self.pending == 0
    }

    /// Block until every submitted check reported. Returns the first failure;
    /// checks not yet started when it arrives are skipped.
    pub fn wait(mut self) -> Result<(), ProofError> {
        self.tx = None;
        let mut first = None;

        while self.pending > 0 {
            let Ok((what, result)) = self.rx.recv() else {
                return Err(first.unwrap_or(ProofError::Lost));
            };
            self.pending -= 1;

            if let Some(Err(source)) = result {
                if first.is_none() {
                    self.cancel.store(true, Ordering::Release);
                    first = Some(ProofError::Rejected { what, source });
                }
            }
        }

        match first {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Drop for ProofBatch<'_> {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn all_passing_checks_succeed() {
        let pool = ProofPool::new(2).unwrap();
        let mut batch = pool.batch();
        for _ in 0..8 {
            batch.submit("output", || Ok(()));
        }
        assert_eq!(batch.len(), 8);
        assert!(batch.wait().is_ok());
    }

    #[test]
    fn pool_follows_verifier_config() {
        let pool = ProofPool::from_config(&VerifierConfig { threads: 3 }).unwrap();
        assert_eq!(pool.threads(), 3);
        let pool = ProofPool::from_config(&VerifierConfig { threads: 0 }).unwrap();
        assert_eq!(pool.threads(), 1);
    }

    #[test]
    fn first_failure_is_reported() {
        let pool = ProofPool::new(1).unwrap();
        let mut batch = pool.batch();
        batch.submit("output", || Ok(()));
        batch.submit("input", || Err(OracleError::InvalidProof("input")));
        batch.submit("output", || Ok(()));

        assert_eq!(
            batch.wait(),
            Err(ProofError::Rejected {
                what: "input",
                source: OracleError::InvalidProof("input"),
            })
        );
    }

    #[test]
    fn empty_batch_returns_immediately() {
        let pool = ProofPool::new(1).unwrap();
        let batch = pool.batch();
        assert!(batch.is_empty());
        assert!(batch.wait().is_ok());
    }

    #[test]
    fn dropped_batch_skips_queued_checks() {
        let pool = ProofPool::new(1).unwrap();
        let ran = Arc::new(AtomicUsize::new(0));

        let mut batch = pool.batch();
        batch.submit("input", || {
            std::thread::sleep(Duration::from_millis(50));
            Ok(())
        });
        for _ in 0..4 {
            let ran = ran.clone();
            batch.submit("output", move || {
                ran.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
        drop(batch);

        // a fresh batch queues behind the cancelled ones on the single worker
        let mut after = pool.batch();
        after.submit("output", || Ok(()));
        assert!(after.wait().is_ok());
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }
}
