//! Processed-event ledger
//!
//! Per transaction id, the ordered set of signatures that have already been
//! acted on. The ledger is the only authority on "already handled".
//!
//! A read-then-append check alone lets two concurrent deliveries of the same
//! signature both pass, so stores also expose [`EventStore::claim`]: an
//! atomic compare-and-reserve that admits exactly one delivery per
//! (transaction id, signature) until it either appends or releases.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::reversal::error::{LedgerError, LedgerResult};
use crate::reversal::signature::Signature;

/// Result of trying to reserve a signature for processing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// Caller owns the reservation and must append or release it
    Acquired,
    /// Signature is already in the ledger
    AlreadyProcessed,
    /// Another delivery holds the reservation
    InFlight,
}

/// Durable store of processed event signatures
#[async_trait]
pub trait EventStore: Send + Sync + 'static {
    /// Signatures already processed for a transaction, in insertion order
    async fn get_processed(&self, transaction_id: &str) -> LedgerResult<Vec<Signature>>;

    /// Replace the ledger with the union of its signatures and `signatures`.
    ///
    /// Drops any reservation held for the appended signatures.
    async fn append(&self, transaction_id: &str, signatures: &[Signature]) -> LedgerResult<()>;

    /// Atomically reserve a signature for processing
    async fn claim(&self, transaction_id: &str, signature: &Signature) -> LedgerResult<Claim>;

    /// Drop a reservation without recording the signature
    async fn release(&self, transaction_id: &str, signature: &Signature) -> LedgerResult<()>;
}

/// Ledger contents shared by the store backends
#[derive(Debug, Default)]
struct LedgerState {
    processed: HashMap<String, Vec<Signature>>,
    in_flight: HashSet<(String, Signature)>,
}

impl LedgerState {
    fn from_snapshot(snapshot: LedgerSnapshot) -> Self {
        Self {
            processed: snapshot.transactions.into_iter().collect(),
            in_flight: HashSet::new(),
        }
    }

    fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            transactions: self
                .processed
                .iter()
                .map(|(id, sigs)| (id.clone(), sigs.clone()))
                .collect(),
        }
    }

    fn get(&self, transaction_id: &str) -> Vec<Signature> {
        self.processed
            .get(transaction_id)
            .cloned()
            .unwrap_or_default()
    }

    fn contains(&self, transaction_id: &str, signature: &Signature) -> bool {
        self.processed
            .get(transaction_id)
            .map(|sigs| sigs.contains(signature))
            .unwrap_or(false)
    }

    /// Ledger for `transaction_id` with `signatures` merged in, or `None`
    /// when every signature is already recorded
    fn merged(&self, transaction_id: &str, signatures: &[Signature]) -> Option<Vec<Signature>> {
        let mut merged = self.get(transaction_id);
        let before = merged.len();
        for signature in signatures {
            if !merged.contains(signature) {
                merged.push(signature.clone());
            }
        }
        (merged.len() > before).then_some(merged)
    }

    /// Install a merged ledger and drop the reservations it covers
    fn commit(&mut self, transaction_id: &str, merged: Option<Vec<Signature>>, signatures: &[Signature]) {
        if let Some(merged) = merged {
            self.processed.insert(transaction_id.to_string(), merged);
        }
        for signature in signatures {
            self.release(transaction_id, signature);
        }
    }

    fn snapshot_with(&self, transaction_id: &str, merged: &[Signature]) -> LedgerSnapshot {
        let mut snapshot = self.snapshot();
        snapshot
            .transactions
            .insert(transaction_id.to_string(), merged.to_vec());
        snapshot
    }

    fn claim(&mut self, transaction_id: &str, signature: &Signature) -> Claim {
        if self.contains(transaction_id, signature) {
            return Claim::AlreadyProcessed;
        }
        if self
            .in_flight
            .insert((transaction_id.to_string(), signature.clone()))
        {
            Claim::Acquired
        } else {
            Claim::InFlight
        }
    }

    fn release(&mut self, transaction_id: &str, signature: &Signature) {
        self.in_flight
            .remove(&(transaction_id.to_string(), signature.clone()));
    }
}

// =============================================================================
// In-memory store
// =============================================================================

/// Process-local event store
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    state: Mutex<LedgerState>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of transactions with at least one processed signature
    pub fn transaction_count(&self) -> usize {
        self.state.lock().processed.len()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn get_processed(&self, transaction_id: &str) -> LedgerResult<Vec<Signature>> {
        Ok(self.state.lock().get(transaction_id))
    }

    async fn append(&self, transaction_id: &str, signatures: &[Signature]) -> LedgerResult<()> {
        let mut state = self.state.lock();
        let merged = state.merged(transaction_id, signatures);
        state.commit(transaction_id, merged, signatures);
        Ok(())
    }

    async fn claim(&self, transaction_id: &str, signature: &Signature) -> LedgerResult<Claim> {
        Ok(self.state.lock().claim(transaction_id, signature))
    }

    async fn release(&self, transaction_id: &str, signature: &Signature) -> LedgerResult<()> {
        self.state.lock().release(transaction_id, signature);
        Ok(())
    }
}

// =============================================================================
// File-backed store
// =============================================================================

/// On-disk ledger document
#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerSnapshot {
    transactions: BTreeMap<String, Vec<Signature>>,
}

/// Event store persisted as a JSON document.
///
/// Writes go to a sibling temp file that is flushed to disk and then renamed
/// over the ledger, so a crash leaves either the old or the new document.
/// Memory only reflects what has been written. Reservations are not
/// persisted.
#[derive(Debug)]
pub struct FileEventStore {
    path: PathBuf,
    state: Mutex<LedgerState>,
    /// Serializes file writes so an older snapshot never overwrites a newer one
    write_lock: tokio::sync::Mutex<()>,
}

impl FileEventStore {
    /// Open a ledger file, creating an empty ledger if it does not exist.
    ///
    /// An existing but empty file is an error: the store itself never writes
    /// one, so it can only be a ledger truncated by a crash.
    pub async fn open(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let path = path.as_ref().to_path_buf();

        let snapshot = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => {
                return Err(LedgerError::Truncated(path.display().to_string()))
            }
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => LedgerSnapshot::default(),
            Err(e) => return Err(e.into()),
        };

        tracing::info!(
            path = %path.display(),
            transactions = snapshot.transactions.len(),
            "Loaded processed-event ledger"
        );

        Ok(Self {
            path,
            state: Mutex::new(LedgerState::from_snapshot(snapshot)),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, snapshot: &LedgerSnapshot) -> LedgerResult<()> {
        let bytes = serde_json::to_vec_pretty(snapshot)?;
        let tmp = self.path.with_extension("json.tmp");

        let parent = self.path.parent().filter(|p| !p.as_os_str().is_empty());
        if let Some(parent) = parent {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path).await?;

        // Make the rename itself durable
        #[cfg(unix)]
        {
            if let Some(parent) = parent {
                tokio::fs::File::open(parent).await?.sync_all().await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl EventStore for FileEventStore {
    async fn get_processed(&self, transaction_id: &str) -> LedgerResult<Vec<Signature>> {
        Ok(self.state.lock().get(transaction_id))
    }

    async fn append(&self, transaction_id: &str, signatures: &[Signature]) -> LedgerResult<()> {
        let _guard = self.write_lock.lock().await;

        let (merged, snapshot) = {
            let mut state = self.state.lock();
            match state.merged(transaction_id, signatures) {
                Some(merged) => {
                    let snapshot = state.snapshot_with(transaction_id, &merged);
                    (merged, snapshot)
                }
                None => {
                    state.commit(transaction_id, None, signatures);
                    return Ok(());
                }
            }
        };

        // Reservations stay held until the write lands, so a concurrent
        // delivery sees InFlight rather than an uncommitted entry
        self.persist(&snapshot).await?;

        self.state
            .lock()
            .commit(transaction_id, Some(merged), signatures);
        Ok(())
    }

    async fn claim(&self, transaction_id: &str, signature: &Signature) -> LedgerResult<Claim> {
        Ok(self.state.lock().claim(transaction_id, signature))
    }

    async fn release(&self, transaction_id: &str, signature: &Signature) -> LedgerResult<()> {
        self.state.lock().release(transaction_id, signature);
        Ok(())
    }
}
