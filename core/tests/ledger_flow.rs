mod common;

use std::sync::Arc;

use common::{TestChain, TestSource, memory_ledger, sero};
use shroud_core::{
    Cmds, LedgerError, LedgerParams, LedgerState, MockProofBackend, OutputRecord, PreTxParams,
    ProofWorkerPool, Reception, RocksDbStore, SpendCandidate, TransactionBuilder, TreeFamily,
    verify_transaction,
};
use shroud_privacy::{AddressKind, Keypair, Token, currency_id};
use tempfile::TempDir;

fn request(from: &Keypair, to: &Keypair, amount: u64) -> PreTxParams {
    PreTxParams {
        from: from.address(AddressKind::Legacy),
        refund_to: None,
        receptions: vec![Reception {
            to: to.address(AddressKind::Native),
            asset: sero(amount),
            memo: Vec::new(),
        }],
        fee: Token::new(currency_id("SERO"), 5),
        roots: Vec::new(),
        cmds: Cmds::default(),
        confidential: true,
    }
}

#[test]
fn test_failed_apply_leaves_overlay_untouched() {
    let ledger = memory_ledger(4, 0);
    let alice = Keypair::from_seed(&[3u8; 64]);
    let bob = Keypair::from_seed(&[4u8; 64]);
    let root = ledger
        .add_output(OutputRecord::cleartext(
            alice.address(AddressKind::Legacy),
            sero(50),
            Vec::new(),
        ))
        .unwrap();
    ledger.commit().unwrap();
    ledger.next_block(1).unwrap();

    let source = TestSource {
        candidates: vec![SpendCandidate {
            root,
            asset: sero(50),
        }],
        refund: None,
    };
    let chain = TestChain::at(1);
    let pool = ProofWorkerPool::new(2);
    let tx = TransactionBuilder::new(
        &ledger,
        &chain,
        &source,
        Arc::new(MockProofBackend::new()),
        &pool,
        0,
    )
    .build_tx(&alice, &request(&alice, &bob, 45))
    .unwrap();

    ledger.apply_transaction(&tx).unwrap();
    let before = ledger.encode_overlay().unwrap();
    let pending = ledger.pending_roots();

    assert!(matches!(
        ledger.apply_transaction(&tx),
        Err(LedgerError::AlreadySpent(_))
    ));
    assert_eq!(ledger.encode_overlay().unwrap(), before);
    assert_eq!(ledger.pending_roots(), pending);
}

#[test]
fn test_snapshot_revert_around_transaction() {
    let ledger = memory_ledger(4, 0);
    let alice = Keypair::from_seed(&[3u8; 64]);
    let bob = Keypair::from_seed(&[4u8; 64]);
    let root = ledger
        .add_output(OutputRecord::cleartext(
            alice.address(AddressKind::Legacy),
            sero(50),
            Vec::new(),
        ))
        .unwrap();
    ledger.commit().unwrap();
    ledger.next_block(1).unwrap();

    let source = TestSource {
        candidates: vec![SpendCandidate {
            root,
            asset: sero(50),
        }],
        refund: None,
    };
    let chain = TestChain::at(1);
    let pool = ProofWorkerPool::new(2);
    let tx = TransactionBuilder::new(
        &ledger,
        &chain,
        &source,
        Arc::new(MockProofBackend::new()),
        &pool,
        0,
    )
    .build_tx(&alice, &request(&alice, &bob, 45))
    .unwrap();

    let empty = ledger.encode_overlay().unwrap();
    let status = ledger.tree_status().unwrap();
    let rev = ledger.snapshot();
    ledger.apply_transaction(&tx).unwrap();
    assert!(ledger.has_spent(&root).unwrap());

    ledger.revert(rev).unwrap();
    assert!(!ledger.has_spent(&root).unwrap());
    assert_eq!(ledger.encode_overlay().unwrap(), empty);
    assert_eq!(ledger.tree_status().unwrap(), status);

    // the same transaction applies cleanly after the revert
    ledger.apply_transaction(&tx).unwrap();
    let block = ledger.commit().unwrap();
    assert_eq!(block.height, 1);
    assert_eq!(block.roots.len(), 1);
}

#[test]
fn test_rocksdb_ledger_survives_restart() {
    let dir = TempDir::new().unwrap();
    let params = LedgerParams {
        tree_depth: 8,
        upgrade_height: 0,
    };
    let alice = Keypair::from_seed(&[5u8; 64]);
    let bob = Keypair::from_seed(&[6u8; 64]);

    let (funding, paid) = {
        let store = RocksDbStore::open(dir.path()).unwrap();
        let ledger = LedgerState::open(store, &params).unwrap();
        let funding = ledger
            .add_output(OutputRecord::cleartext(
                alice.address(AddressKind::Legacy),
                sero(100),
                Vec::new(),
            ))
            .unwrap();
        ledger.commit().unwrap();
        ledger.next_block(1).unwrap();

        let source = TestSource {
            candidates: vec![SpendCandidate {
                root: funding,
                asset: sero(100),
            }],
            refund: None,
        };
        let chain = TestChain::at(1);
        let pool = ProofWorkerPool::new(2);
        let backend = Arc::new(MockProofBackend::new());
        let tx = TransactionBuilder::new(&ledger, &chain, &source, backend.clone(), &pool, 0)
            .build_tx(&alice, &request(&alice, &bob, 80))
            .unwrap();
        verify_transaction(&tx, &ledger, backend.as_ref()).unwrap();
        let roots = ledger.apply_transaction(&tx).unwrap();
        ledger.commit().unwrap();
        (funding, roots[0])
    };

    let store = RocksDbStore::open(dir.path()).unwrap();
    let ledger = LedgerState::open(store, &params).unwrap();
    assert_eq!(ledger.height(), 2);
    assert!(ledger.has_spent(&funding).unwrap());

    let state = ledger.get_record(&paid).unwrap().unwrap();
    assert_eq!(state.record.owner_address(), &bob.address(AddressKind::Native));
    let witness = ledger.witness(&paid).unwrap();
    assert!(ledger.has_anchor(TreeFamily::V1, &witness.anchor).unwrap());

    let block = ledger.block_record(1, None).unwrap().unwrap();
    assert_eq!(block.roots.len(), 2);
    assert!(block.roots.contains(&paid));
    assert!(block.nullifiers.contains(&funding));
    assert!(ledger.block_record(7, None).unwrap().is_none());
}
