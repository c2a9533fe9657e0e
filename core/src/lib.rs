//! Shroud Ledger Core
//!
//! Privacy-preserving UTXO ledger: commitment trees, spent set, balance
//! conservation and confidential transaction construction.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    TransactionBuilder                           │
//! │   SpendCandidateSource ─► AssetAccumulator ─► WitnessResolver   │
//! │                               │                                 │
//! │                               ▼                                 │
//! │                       ProofWorkerPool (ProofBackend)            │
//! └───────────────────────────────┬─────────────────────────────────┘
//!                                 │ Transaction
//!                                 ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       LedgerState                               │
//! │   legacy CommitmentTree · v1 CommitmentTree · spent set         │
//! │   OutputRecord store (versioned codec) · per-block records      │
//! └───────────────────────────────┬─────────────────────────────────┘
//!                                 ▼
//!                         KvStore (RocksDB)
//! ```

pub mod balance;
pub mod builder;
pub mod cmds;
pub mod codec;
pub mod error;
pub mod interfaces;
pub mod ledger;
pub mod pool;
pub mod prover;
pub mod record;
pub mod storage;
pub mod transaction;
pub mod tree;

pub use balance::AssetAccumulator;
pub use builder::{GenTxParam, PreTxParams, Reception, TransactionBuilder};
pub use cmds::Cmds;
pub use error::{AssetKey, LedgerError, Result};
pub use interfaces::{BlockHeader, ChainView, SpendCandidate, SpendCandidateSource, WitnessResolver};
pub use ledger::{BlockRecord, LedgerParams, LedgerState};
pub use pool::{PoolLease, ProofWorkerPool};
pub use prover::{MockProofBackend, Proof, ProofBackend, backend_from_config};
pub use record::{Generation, OutputRecord, OutputState, SchemaVersion, TreeFamily};
pub use storage::{KvStore, MemoryStore, RocksDbStore};
pub use transaction::{Transaction, verify_transaction};
pub use tree::{CommitmentTree, Witness};
