use std::sync::Arc;

use dece_config::{ProtocolConfig, VerifierConfig};
use dece_privacy::{
    CryptoOracle, Currency, Family, MEMO_LEN, Memo, OracleError, PseudoAddress, Token,
};
use dece_transaction::{BuyShare, ClosePool, PkgClose, PkgId, RegistPool};

use super::{Wallet, dece, fund, init_logger, memory_state, oracle, record_at, tools};
use crate::ledger::{LedgerState, OutputPayload, OutputRecord, ShieldedView};
use crate::storage::MemoryStore;
use crate::txtool::{
    BuildError, Cmds, PkgCloseCmd, PkgCreateCmd, PkgTransferCmd, ProofPool, SignedTx, SpendIn,
    SpendOut, TxBuilder, TxParam, TxVerifier, confirm_out_c, dec_out, dec_outs,
};

const EHASH: [u8; 32] = [7u8; 32];

fn param(
    wallet: &Wallet,
    from: PseudoAddress,
    z: bool,
    ins: Vec<SpendIn>,
    outs: Vec<(PseudoAddress, u128)>,
) -> TxParam {
    TxParam {
        from,
        sk: wallet.sk,
        ehash: EHASH,
        fee: Token::dece(1),
        z,
        ins,
        outs: outs
            .into_iter()
            .map(|(pkr, value)| SpendOut {
                pkr,
                asset: dece(value),
                memo: Memo::default(),
            })
            .collect(),
        cmds: Cmds::default(),
    }
}

fn plain_in(record: OutputRecord) -> SpendIn {
    SpendIn {
        record,
        witness: None,
    }
}

fn anonymous_in(state: &LedgerState<MemoryStore>, record: OutputRecord) -> SpendIn {
    let witness = state.find_witness(record.family(), record.index).unwrap();
    SpendIn {
        record,
        witness: Some(witness),
    }
}

/// Build, verify against `state` and apply
fn submit(state: &LedgerState<MemoryStore>, param: &TxParam) -> SignedTx {
    let tools = tools();
    let signed = tools.builder.build(param).unwrap();
    tools
        .verifier
        .verify(&EHASH, &signed.tx, state.num(), state)
        .unwrap();
    state.add_tx(&signed.tx).unwrap();
    signed
}

#[test]
fn shielded_round_trip() {
    init_logger();
    let o = oracle();
    let alice = Wallet::new(o.as_ref(), 1);
    let bob = Wallet::new(o.as_ref(), 2);
    let state = memory_state(1);

    // plain 100 → shielded 60 + 39
    let funded = fund(&state, alice.pkr(o.as_ref()), 100, 1);
    let from = alice.pkr(o.as_ref());
    let alice_change = alice.pkr(o.as_ref());
    submit(
        &state,
        &param(
            &alice,
            from,
            true,
            vec![plain_in(funded)],
            vec![(bob.pkr(o.as_ref()), 60), (alice_change, 39)],
        ),
    );
    state.update().unwrap();
    let state = state.next().unwrap();

    // bob spends his 60 anonymously: 59 to alice, fee 1
    let to_bob = record_at(&state, Family::Shielded, 0);
    let bob_from = bob.pkr(o.as_ref());
    let signed = submit(
        &state,
        &param(
            &bob,
            bob_from,
            true,
            vec![anonymous_in(&state, to_bob.clone())],
            vec![(alice.pkr(o.as_ref()), 59)],
        ),
    );
    let tx = &signed.tx;
    assert!(tx.body.ins_p.is_empty());
    assert_eq!(tx.body.ins_c.len(), 1);
    assert_ne!(tx.body.ins_c[0].asset_cm, match &to_bob.payload {
        OutputPayload::Shielded(out) => out.asset_cm,
        OutputPayload::Plain(_) => unreachable!(),
    });
    assert!(state.has_in(&tx.body.ins_c[0].nil.0).unwrap());

    // the same output cannot be spent in the clear afterwards
    let tools = tools();
    let again = tools
        .builder
        .build(&param(&bob, bob_from, false, vec![plain_in(to_bob)], vec![(bob_from, 59)]))
        .unwrap();
    let err = tools.verifier.verify_with_state(&again.tx, &state).unwrap_err();
    assert_eq!(err.reason, "in_p nullifier already used");

    // alice spends her change in the clear, revealing the key
    let change = record_at(&state, Family::Shielded, 1);
    let signed = submit(
        &state,
        &param(&alice, from, false, vec![plain_in(change)], vec![(bob_from, 38)]),
    );
    assert!(signed.tx.body.ins_p[0].key.is_some());
    assert_eq!(signed.tx.balance, Default::default());
}

#[test]
fn owners_decode_their_outputs() {
    init_logger();
    let o = oracle();
    let alice = Wallet::new(o.as_ref(), 1);
    let bob = Wallet::new(o.as_ref(), 2);
    let state = memory_state(1);

    let funded = fund(&state, alice.pkr(o.as_ref()), 100, 1);
    let plain = dec_out(o.as_ref(), &alice.tk, &funded).unwrap();
    assert_eq!(plain.asset, dece(100));
    assert_eq!(plain.memo, Memo::default());
    assert_eq!(plain.key, None);
    assert_eq!(
        dec_out(o.as_ref(), &bob.tk, &funded).unwrap_err(),
        OracleError::NotOwner
    );

    let from = alice.pkr(o.as_ref());
    let mut spend = param(
        &alice,
        from,
        true,
        vec![plain_in(funded)],
        vec![(bob.pkr(o.as_ref()), 60), (from, 39)],
    );
    spend.outs[0].memo = Memo([9u8; MEMO_LEN]);
    let signed = submit(&state, &spend);
    assert_eq!(signed.tx.body.ins_p[0].nil, plain.nil);
    state.update().unwrap();
    let state = state.next().unwrap();

    let records = vec![
        record_at(&state, Family::Shielded, 0),
        record_at(&state, Family::Shielded, 1),
    ];
    let seen = dec_outs(o.as_ref(), &bob.tk, &records);
    assert_eq!(seen.len(), 2);
    assert!(seen[1].is_none());
    let to_bob = seen[0].clone().unwrap();
    assert_eq!(to_bob.asset, dece(60));
    assert_eq!(to_bob.memo, Memo([9u8; MEMO_LEN]));
    assert_eq!(to_bob.key, Some(signed.keys[0]));

    let change = dec_outs(o.as_ref(), &alice.tk, &records);
    assert!(change[0].is_none());
    assert_eq!(change[1].as_ref().unwrap().asset, dece(39));

    // the payload key opens the output only against its own commitment
    let out = &signed.tx.body.outs_c[0];
    let opened = confirm_out_c(o.as_ref(), &signed.keys[0], out).unwrap();
    assert_eq!(opened.asset, dece(60));
    let mut forged = out.clone();
    forged.asset_cm = signed.tx.body.outs_c[1].asset_cm;
    assert_eq!(
        confirm_out_c(o.as_ref(), &signed.keys[0], &forged).unwrap_err(),
        OracleError::CommitmentMismatch
    );

    // the decoded nullifier is the one the spend publishes
    let bob_from = bob.pkr(o.as_ref());
    let spent = submit(
        &state,
        &param(
            &bob,
            bob_from,
            true,
            vec![anonymous_in(&state, records[0].clone())],
            vec![(from, 59)],
        ),
    );
    assert_eq!(spent.tx.body.ins_c[0].nil, to_bob.nil);
}

#[test]
fn unbalanced_build_fails() {
    init_logger();
    let o = oracle();
    let alice = Wallet::new(o.as_ref(), 1);
    let state = memory_state(1);
    let from = alice.pkr(o.as_ref());
    let funded = fund(&state, from, 100, 1);
    let tools = tools();

    for z in [false, true] {
        let err = tools
            .builder
            .build(&param(&alice, from, z, vec![plain_in(funded.clone())], vec![(from, 100)]))
            .unwrap_err();
        assert!(matches!(err, BuildError::Balance(_)), "{:?}", err);
    }
}

#[test]
fn foreign_input_is_refused() {
    let o = oracle();
    let alice = Wallet::new(o.as_ref(), 1);
    let mallory = Wallet::new(o.as_ref(), 3);
    let state = memory_state(1);
    let funded = fund(&state, alice.pkr(o.as_ref()), 100, 1);

    let from = mallory.pkr(o.as_ref());
    let err = tools()
        .builder
        .build(&param(&mallory, from, false, vec![plain_in(funded)], vec![(from, 99)]))
        .unwrap_err();
    assert!(matches!(err, BuildError::Check(_)));
}

#[test]
fn tampered_balance_is_rejected() {
    init_logger();
    let o = oracle();
    let alice = Wallet::new(o.as_ref(), 1);
    let state = memory_state(1);
    let from = alice.pkr(o.as_ref());
    let funded = fund(&state, from, 100, 1);
    let tools = tools();

    let mut tx = tools
        .builder
        .build(&param(&alice, from, true, vec![plain_in(funded)], vec![(from, 99)]))
        .unwrap()
        .tx;
    tx.balance.bcr = [0u8; 32];

    // the balance proof is not covered by the stateless pass
    tools.verifier.verify_without_state(&EHASH, &tx, 1).unwrap();
    let err = tools.verifier.verify_with_state(&tx, &state).unwrap_err();
    assert!(err.reason.starts_with("balance"), "{}", err.reason);
}

#[test]
fn tampered_output_proof_is_rejected() {
    init_logger();
    let o = oracle();
    let alice = Wallet::new(o.as_ref(), 1);
    let state = memory_state(1);
    let from = alice.pkr(o.as_ref());
    let funded = fund(&state, from, 100, 1);
    let tools = tools();

    let mut tx = tools
        .builder
        .build(&param(&alice, from, true, vec![plain_in(funded)], vec![(from, 50), (from, 49)]))
        .unwrap()
        .tx;
    tx.body.outs_c[1].proof.0[0] ^= 1;

    let err = tools.verifier.verify_without_state(&EHASH, &tx, 1).unwrap_err();
    assert!(err.reason.contains("output proof rejected"), "{}", err.reason);
    assert_eq!(err.tx_hash, tx.hash());
}

#[test]
fn stateless_pass_checks_shape() {
    init_logger();
    let o = oracle();
    let alice = Wallet::new(o.as_ref(), 1);
    let state = memory_state(1);
    let from = alice.pkr(o.as_ref());
    let funded = fund(&state, from, 100, 1);
    let tools = tools();

    let tx = tools
        .builder
        .build(&param(&alice, from, false, vec![plain_in(funded)], vec![(from, 99)]))
        .unwrap()
        .tx;
    tools.verifier.verify_without_state(&EHASH, &tx, 1).unwrap();

    let err = tools.verifier.verify_without_state(&[0u8; 32], &tx, 1).unwrap_err();
    assert_eq!(err.reason, "ehash mismatch");

    let mut forged = tx.clone();
    forged.body.outs_p[0].asset = dece(98);
    let err = tools.verifier.verify_without_state(&EHASH, &forged, 1).unwrap_err();
    assert_eq!(err.reason, "invalid from signature");

    let mut doubled = tx.clone();
    doubled.desc_cmd.regist_pool = Some(RegistPool {
        value: 1,
        vote: from,
        fee_rate: 5000,
    });
    doubled.desc_pkg.close = Some(PkgClose {
        id: PkgId([1u8; 32]),
        sign: Default::default(),
    });
    doubled.sign = o.sign(&alice.sk, &doubled.signing_hash(), &from).unwrap();
    let err = tools.verifier.verify_without_state(&EHASH, &doubled, 1).unwrap_err();
    assert_eq!(err.reason, "pkg and cmd desc only exists one");
}

#[test]
fn limits_are_enforced_by_builder() {
    let o = oracle();
    let alice = Wallet::new(o.as_ref(), 1);
    let state = memory_state(1);
    let from = alice.pkr(o.as_ref());
    let funded = fund(&state, from, 100, 1);
    let tools = tools();

    // plain outputs share the one output cap
    let outs = (0..11).map(|_| (from, 9)).collect();
    let many = tools
        .builder
        .build(&param(&alice, from, false, vec![plain_in(funded.clone())], outs))
        .unwrap();
    assert_eq!(many.tx.body.outs_p.len(), 11);
    tools.verifier.verify(&EHASH, &many.tx, 1, &state).unwrap();

    let mut pool = param(&alice, from, false, vec![plain_in(funded.clone())], vec![]);
    pool.cmds.regist_pool = Some(RegistPool {
        value: 99,
        vote: from,
        fee_rate: 100,
    });
    assert!(matches!(
        tools.builder.build(&pool).unwrap_err(),
        BuildError::Command(_)
    ));

    pool.cmds.regist_pool = Some(RegistPool {
        value: 99,
        vote: from,
        fee_rate: 2500,
    });
    let signed = tools.builder.build(&pool).unwrap();
    tools.verifier.verify(&EHASH, &signed.tx, 1, &state).unwrap();

    let mut two = pool.clone();
    two.cmds.close_pool = Some(ClosePool {});
    assert!(matches!(
        tools.builder.build(&two).unwrap_err(),
        BuildError::Check(_)
    ));

    let mut costly = param(&alice, from, false, vec![plain_in(funded)], vec![(from, 99)]);
    costly.fee = Token::new(Currency::from_name("GOLD"), 1);
    assert!(matches!(
        tools.builder.build(&costly).unwrap_err(),
        BuildError::Fee(_)
    ));
}

#[test]
fn out_cap_counts_fee_and_commands() {
    init_logger();
    let o = oracle();
    let alice = Wallet::new(o.as_ref(), 1);
    let state = memory_state(1);
    let from = alice.pkr(o.as_ref());
    let funded = fund(&state, from, 100, 1);

    let tight = ProtocolConfig {
        max_z_out_length: 3,
        ..Default::default()
    };
    let pool = Arc::new(ProofPool::from_config(&VerifierConfig { threads: 1 }).unwrap());
    let builder = TxBuilder::new(o.clone(), tight.clone());
    let verifier = TxVerifier::new(o.clone(), pool, tight);

    // two outputs and the fee fill the cap
    let fits = param(&alice, from, true, vec![plain_in(funded.clone())], vec![(from, 50), (from, 49)]);
    let signed = builder.build(&fits).unwrap();
    assert_eq!(signed.tx.out_count(), 3);
    verifier.verify(&EHASH, &signed.tx, 1, &state).unwrap();

    let three = param(
        &alice,
        from,
        true,
        vec![plain_in(funded.clone())],
        vec![(from, 33), (from, 33), (from, 33)],
    );
    assert!(matches!(builder.build(&three).unwrap_err(), BuildError::Prepare(_)));

    let mut share = param(&alice, from, false, vec![plain_in(funded.clone())], vec![(from, 49), (from, 40)]);
    share.cmds.buy_share = Some(BuyShare {
        value: 10,
        vote: from,
        pool: None,
    });
    assert!(matches!(builder.build(&share).unwrap_err(), BuildError::Prepare(_)));

    // a transaction over the cap built elsewhere is refused without state
    let loose = TxBuilder::new(o.clone(), ProtocolConfig::default());
    let over = loose.build(&three).unwrap();
    assert_eq!(over.tx.out_count(), 4);
    let err = verifier.verify_without_state(&EHASH, &over.tx, 1).unwrap_err();
    assert!(err.reason.contains("4 outputs exceed 3"), "{}", err.reason);
}

#[test]
fn package_close_through_tx() {
    init_logger();
    let o = oracle();
    let alice = Wallet::new(o.as_ref(), 1);
    let bob = Wallet::new(o.as_ref(), 2);
    let state = memory_state(1);
    let from = alice.pkr(o.as_ref());
    let funded = fund(&state, from, 100, 1);
    let id = PkgId([8u8; 32]);

    // alice escrows 99 for herself
    let mut create = param(&alice, from, false, vec![plain_in(funded)], vec![]);
    create.cmds.pkg_create = Some(PkgCreateCmd {
        id,
        pkr: from,
        asset: dece(99),
        memo: Memo::default(),
    });
    let key = submit(&state, &create).pkg_key.unwrap();

    // and hands it to bob
    let bob_owner = bob.pkr(o.as_ref());
    let mut transfer = param(&alice, from, false, vec![], vec![]);
    transfer.fee = Token::dece(0);
    transfer.cmds.pkg_transfer = Some(PkgTransferCmd {
        id,
        pkr: bob_owner,
        owner: from,
    });
    submit(&state, &transfer);
    state.update().unwrap();
    let state = state.next().unwrap();

    // a transfer signed by the previous owner is refused now
    let tools = tools();
    let stale = tools.builder.build(&transfer).unwrap();
    let err = tools.verifier.verify_with_state(&stale.tx, &state).unwrap_err();
    assert!(err.reason.contains("owner signature invalid"), "{}", err.reason);

    // bob opens it with the creator's key and pays 98 out of it
    let pkg = state.get_pkg(&id).unwrap().unwrap();
    let (asset, _, ar) = o.decrypt_output(&key, &pkg.create.einfo).unwrap();
    assert_eq!(asset, dece(99));

    let bob_from = bob.pkr(o.as_ref());
    let mut close = param(&bob, bob_from, false, vec![], vec![(bob_from, 98)]);
    close.cmds.pkg_close = Some(PkgCloseCmd {
        id,
        owner: bob_owner,
        asset,
        ar,
        asset_cm: pkg.create.asset_cm,
    });
    let signed = submit(&state, &close);
    assert!(state.get_pkg(&id).unwrap().unwrap().closed);

    // closing twice fails
    let err = tools.verifier.verify_with_state(&signed.tx, &state).unwrap_err();
    assert!(err.reason.contains("is closed"), "{}", err.reason);
}
