mod common;

use std::sync::Arc;

use common::{CountingBackend, TestChain, TestSource, memory_ledger, sero};
use shroud_core::builder::GenOut;
use shroud_core::transaction::SpendDescriptor;
use shroud_core::{
    Cmds, Generation, LedgerError, MockProofBackend, OutputRecord, PreTxParams, ProofWorkerPool,
    Reception, SpendCandidate, TransactionBuilder, backend_from_config, verify_transaction,
};
use shroud_config::ShroudConfig;
use shroud_privacy::{AddressKind, Keypair, Token, currency_id, try_decrypt_asset};

fn fee(amount: u64) -> Token {
    Token::new(currency_id("SERO"), amount)
}

fn sender() -> Keypair {
    Keypair::from_seed(&[1u8; 64])
}

fn recipient() -> Keypair {
    Keypair::from_seed(&[2u8; 64])
}

fn payment(keys: &Keypair, to: &Keypair, amount: u64, fee_amount: u64, confidential: bool) -> PreTxParams {
    PreTxParams {
        from: keys.address(AddressKind::Legacy),
        refund_to: None,
        receptions: vec![Reception {
            to: to.address(AddressKind::Native),
            asset: sero(amount),
            memo: b"invoice 7".to_vec(),
        }],
        fee: fee(fee_amount),
        roots: Vec::new(),
        cmds: Cmds::default(),
        confidential,
    }
}

#[test]
fn test_change_output_goes_to_refund_address() {
    let ledger = memory_ledger(4, 0);
    let keys = sender();
    let refund = keys.address(AddressKind::Native);
    let root = ledger
        .add_output(OutputRecord::cleartext(
            keys.address(AddressKind::Legacy),
            sero(100),
            Vec::new(),
        ))
        .unwrap();
    ledger.commit().unwrap();
    ledger.next_block(1).unwrap();

    let source = TestSource {
        candidates: vec![SpendCandidate {
            root,
            asset: sero(100),
        }],
        refund: Some(refund),
    };
    let chain = TestChain::at(1);
    let config = ShroudConfig::default();
    let pool = ProofWorkerPool::from_config(&config.prover);
    let backend = backend_from_config(&config.prover);
    let builder = TransactionBuilder::new(&ledger, &chain, &source, backend.clone(), &pool, 0);

    let param = builder
        .build_params(&keys, &payment(&keys, &recipient(), 60, 10, true))
        .unwrap();
    assert_eq!(param.inputs.len(), 1);
    assert_eq!(param.outputs.len(), 2);
    assert_eq!(
        param.outputs[1],
        GenOut {
            to: refund,
            asset: sero(30),
            memo: Vec::new(),
        }
    );

    let tx = builder.build(&keys, &param).unwrap();
    assert!(matches!(tx.spends[0], SpendDescriptor::Legacy { proof: None, .. }));
    assert!(
        tx.outputs
            .iter()
            .all(|o| o.record.generation() == Generation::V1a && o.proof.is_some())
    );
    assert!(tx.balance.is_some());
    verify_transaction(&tx, &ledger, backend.as_ref()).unwrap();

    let roots = ledger.apply_transaction(&tx).unwrap();
    assert_eq!(roots.len(), 2);
    ledger.commit().unwrap();

    // the recipient can open its output, the sender its change
    let paid = ledger.get_record(&roots[0]).unwrap().unwrap();
    let c = paid.record.confidential().unwrap();
    let opening = try_decrypt_asset(&c.encrypted, &recipient().privacy_secret(), &c.asset_cm).unwrap();
    assert_eq!(opening.asset, sero(60));
    assert_eq!(opening.memo, b"invoice 7".to_vec());

    let change = ledger.get_record(&roots[1]).unwrap().unwrap();
    assert_eq!(change.record.owner_address(), &refund);
    let c = change.record.confidential().unwrap();
    let opening = try_decrypt_asset(&c.encrypted, &keys.privacy_secret(), &c.asset_cm).unwrap();
    assert_eq!(opening.asset, sero(30));
}

#[test]
fn test_spent_input_fails_before_any_proof() {
    let ledger = memory_ledger(4, 0);
    let keys = sender();
    let root = ledger
        .add_output(OutputRecord::cleartext(
            keys.address(AddressKind::Legacy),
            sero(100),
            Vec::new(),
        ))
        .unwrap();
    ledger.commit().unwrap();
    ledger.next_block(1).unwrap();

    let source = TestSource {
        candidates: vec![SpendCandidate {
            root,
            asset: sero(100),
        }],
        refund: None,
    };
    let chain = TestChain::at(1);
    let pool = ProofWorkerPool::new(2);

    let first = {
        let builder = TransactionBuilder::new(
            &ledger,
            &chain,
            &source,
            Arc::new(MockProofBackend::new()),
            &pool,
            0,
        );
        builder
            .build_tx(&keys, &payment(&keys, &recipient(), 60, 10, true))
            .unwrap()
    };
    ledger.apply_transaction(&first).unwrap();
    ledger.commit().unwrap();
    ledger.next_block(2).unwrap();

    let counting = Arc::new(CountingBackend::default());
    let builder = TransactionBuilder::new(&ledger, &chain, &source, counting.clone(), &pool, 0);
    let mut req = payment(&keys, &recipient(), 50, 10, true);
    req.roots = vec![root];

    let err = builder.build_tx(&keys, &req).unwrap_err();
    assert!(matches!(err, LedgerError::AlreadySpent(_)));
    assert_eq!(counting.calls(), 0);

    // replaying the committed transaction is rejected the same way
    assert!(matches!(
        verify_transaction(&first, &ledger, counting.as_ref()),
        Err(LedgerError::AlreadySpent(_))
    ));
}

#[test]
fn test_v1_output_spent_publicly_and_confidentially() {
    let ledger = memory_ledger(4, 0);
    let alice = sender();
    let bob = recipient();
    let root = ledger
        .add_output(OutputRecord::cleartext(
            alice.address(AddressKind::Legacy),
            sero(200),
            Vec::new(),
        ))
        .unwrap();
    ledger.commit().unwrap();
    ledger.next_block(1).unwrap();

    let chain = TestChain::at(1);
    let pool = ProofWorkerPool::new(4);
    let backend = Arc::new(MockProofBackend::with_prove_time(2));

    // alice pays bob twice in one transaction
    let source = TestSource {
        candidates: vec![SpendCandidate {
            root,
            asset: sero(200),
        }],
        refund: None,
    };
    let mut req = payment(&alice, &bob, 60, 10, true);
    req.receptions.push(Reception {
        to: bob.address(AddressKind::Native),
        asset: sero(40),
        memo: Vec::new(),
    });
    let tx = TransactionBuilder::new(&ledger, &chain, &source, backend.clone(), &pool, 0)
        .build_tx(&alice, &req)
        .unwrap();
    verify_transaction(&tx, &ledger, backend.as_ref()).unwrap();
    let roots = ledger.apply_transaction(&tx).unwrap();
    ledger.commit().unwrap();
    ledger.next_block(2).unwrap();

    let bob_source = TestSource {
        candidates: vec![
            SpendCandidate {
                root: roots[0],
                asset: sero(60),
            },
            SpendCandidate {
                root: roots[1],
                asset: sero(40),
            },
        ],
        refund: None,
    };
    let bob_builder = TransactionBuilder::new(&ledger, &chain, &bob_source, backend.clone(), &pool, 0);

    // confidential build: root hidden, nullifier only
    let mut hidden = payment(&bob, &alice, 50, 10, true);
    hidden.from = bob.address(AddressKind::Native);
    hidden.roots = vec![roots[0]];
    let tx = bob_builder.build_tx(&bob, &hidden).unwrap();
    assert!(matches!(tx.spends[0], SpendDescriptor::Confidential { .. }));
    verify_transaction(&tx, &ledger, backend.as_ref()).unwrap();
    ledger.apply_transaction(&tx).unwrap();
    assert!(!ledger.has_spent(&roots[0]).unwrap());

    // public build to a legacy address: root revealed, cleartext output
    let mut public = payment(&bob, &alice, 30, 10, false);
    public.from = bob.address(AddressKind::Native);
    public.receptions[0].to = alice.address(AddressKind::Legacy);
    public.roots = vec![roots[1]];
    let tx = bob_builder.build_tx(&bob, &public).unwrap();
    assert!(matches!(tx.spends[0], SpendDescriptor::Public { .. }));
    assert_eq!(tx.outputs[0].record.generation(), Generation::Cleartext);
    verify_transaction(&tx, &ledger, backend.as_ref()).unwrap();
    ledger.apply_transaction(&tx).unwrap();
    assert!(ledger.has_spent(&roots[1]).unwrap());
}

#[test]
fn test_pre_upgrade_build_uses_legacy_generations() {
    let ledger = memory_ledger(4, 5);
    let keys = sender();
    let root = ledger
        .add_output(OutputRecord::cleartext(
            keys.address(AddressKind::Legacy),
            sero(100),
            Vec::new(),
        ))
        .unwrap();
    ledger.commit().unwrap();
    ledger.next_block(1).unwrap();

    let source = TestSource {
        candidates: vec![SpendCandidate {
            root,
            asset: sero(100),
        }],
        refund: None,
    };
    let chain = TestChain::at(1);
    let pool = ProofWorkerPool::new(2);
    let backend = Arc::new(MockProofBackend::new());
    let builder = TransactionBuilder::new(&ledger, &chain, &source, backend.clone(), &pool, 5);

    let tx = builder
        .build_tx(&keys, &payment(&keys, &recipient(), 60, 10, true))
        .unwrap();
    assert!(
        tx.outputs
            .iter()
            .all(|o| o.record.generation() == Generation::V0)
    );
    verify_transaction(&tx, &ledger, backend.as_ref()).unwrap();
    ledger.apply_transaction(&tx).unwrap();

    // before the upgrade only the root is marked spent
    assert!(ledger.has_spent(&root).unwrap());
    assert!(!ledger.has_spent(tx.spends[0].nullifier().as_bytes()).unwrap());
}

#[test]
fn test_stale_witness_rejected() {
    let ledger = memory_ledger(4, 0);
    let keys = sender();
    let root = ledger
        .add_output(OutputRecord::cleartext(
            keys.address(AddressKind::Legacy),
            sero(100),
            Vec::new(),
        ))
        .unwrap();
    ledger.commit().unwrap();
    ledger.next_block(1).unwrap();

    let source = TestSource {
        candidates: vec![SpendCandidate {
            root,
            asset: sero(100),
        }],
        refund: None,
    };
    let chain = TestChain::at(1);
    let pool = ProofWorkerPool::new(1);
    let builder = TransactionBuilder::new(
        &ledger,
        &chain,
        &source,
        Arc::new(MockProofBackend::new()),
        &pool,
        0,
    );

    let mut param = builder
        .build_params(&keys, &payment(&keys, &recipient(), 60, 10, false))
        .unwrap();
    param.inputs[0].witness.anchor = [9u8; 32];
    assert!(matches!(
        builder.build(&keys, &param),
        Err(LedgerError::WitnessStale(_))
    ));
}

#[test]
fn test_proof_failure_aborts_build() {
    let ledger = memory_ledger(4, 0);
    let keys = sender();
    let root = ledger
        .add_output(OutputRecord::cleartext(
            keys.address(AddressKind::Legacy),
            sero(100),
            Vec::new(),
        ))
        .unwrap();
    ledger.commit().unwrap();
    ledger.next_block(1).unwrap();

    let source = TestSource {
        candidates: vec![SpendCandidate {
            root,
            asset: sero(100),
        }],
        refund: None,
    };
    let chain = TestChain::at(1);
    let pool = ProofWorkerPool::new(2);
    let builder = TransactionBuilder::new(
        &ledger,
        &chain,
        &source,
        Arc::new(MockProofBackend::failing("prover offline")),
        &pool,
        0,
    );

    let err = builder
        .build_tx(&keys, &payment(&keys, &recipient(), 60, 10, true))
        .unwrap_err();
    assert!(matches!(err, LedgerError::ProofFailure(ref m) if m == "prover offline"));
    assert_eq!(pool.idle_sets(), 1);
}

#[test]
fn test_cleartext_transaction_has_no_balance_signature() {
    let ledger = memory_ledger(4, 0);
    let keys = sender();
    let root = ledger
        .add_output(OutputRecord::cleartext(
            keys.address(AddressKind::Legacy),
            sero(100),
            Vec::new(),
        ))
        .unwrap();
    ledger.commit().unwrap();
    ledger.next_block(1).unwrap();

    let source = TestSource {
        candidates: vec![SpendCandidate {
            root,
            asset: sero(100),
        }],
        refund: None,
    };
    let chain = TestChain::at(1);
    let pool = ProofWorkerPool::new(2);
    let counting = Arc::new(CountingBackend::default());
    let builder = TransactionBuilder::new(&ledger, &chain, &source, counting.clone(), &pool, 0);

    let mut req = payment(&keys, &recipient(), 70, 10, false);
    req.receptions[0].to = recipient().address(AddressKind::Legacy);
    let tx = builder.build_tx(&keys, &req).unwrap();

    assert!(tx.balance.is_none());
    assert_eq!(counting.calls(), 0);
    // change of 20 returns to the sender, in the clear
    assert_eq!(tx.outputs.len(), 2);
    assert!(
        tx.outputs
            .iter()
            .all(|o| o.record.generation() == Generation::Cleartext)
    );
    verify_transaction(&tx, &ledger, counting.as_ref()).unwrap();

    // tampering with an output breaks the sender signature
    let mut forged = tx.clone();
    forged.outputs[0].record = OutputRecord::cleartext(
        recipient().address(AddressKind::Legacy),
        sero(80),
        b"invoice 7".to_vec(),
    );
    assert!(verify_transaction(&forged, &ledger, counting.as_ref()).is_err());
}

#[test]
fn test_same_root_twice_rejected() {
    let ledger = memory_ledger(4, 0);
    let keys = sender();
    let root = ledger
        .add_output(OutputRecord::cleartext(
            keys.address(AddressKind::Legacy),
            sero(100),
            Vec::new(),
        ))
        .unwrap();
    ledger.commit().unwrap();
    ledger.next_block(1).unwrap();

    let source = TestSource {
        candidates: vec![SpendCandidate {
            root,
            asset: sero(100),
        }],
        refund: None,
    };
    let chain = TestChain::at(1);
    let pool = ProofWorkerPool::new(2);
    let counting = Arc::new(CountingBackend::default());
    let builder = TransactionBuilder::new(&ledger, &chain, &source, counting.clone(), &pool, 0);

    // explicit roots listing the same output twice
    let mut req = payment(&keys, &recipient(), 60, 10, true);
    req.roots = vec![root, root];
    assert!(matches!(
        builder.build_params(&keys, &req),
        Err(LedgerError::AlreadySpent(r)) if r == root
    ));

    // a resolved parameter set with a repeated input
    req.roots = vec![root];
    let mut param = builder.build_params(&keys, &req).unwrap();
    param.inputs.push(param.inputs[0].clone());
    assert!(matches!(
        builder.build(&keys, &param),
        Err(LedgerError::AlreadySpent(r)) if r == root
    ));
    assert_eq!(counting.calls(), 0);

    // a signed transaction that repeats a spend
    let tx = builder.build_tx(&keys, &req).unwrap();
    verify_transaction(&tx, &ledger, counting.as_ref()).unwrap();
    let mut doubled = tx.clone();
    doubled.spends.push(doubled.spends[0].clone());
    doubled.from_signature = keys.sign(&doubled.signing_hash());
    assert!(matches!(
        verify_transaction(&doubled, &ledger, counting.as_ref()),
        Err(LedgerError::AlreadySpent(_))
    ));
    assert!(ledger.apply_transaction(&doubled).is_err());
    assert!(!ledger.has_spent(&root).unwrap());
}
