use crate::keys::{PlotPool, PuzzleHash, derive_cache_keys};
use crate::mock_prover::{MockKeyDerivation, memo, public_key};

#[test]
fn pool_binding() {
    let pool = PlotPool::PublicKey(public_key(1));
    assert_eq!(pool.public_key(), Some(&public_key(1)));
    assert_eq!(pool.contract_puzzle_hash(), None);
    assert!(!pool.is_contract());

    let pool = PlotPool::ContractPuzzleHash(PuzzleHash::from([2; 32]));
    assert_eq!(pool.public_key(), None);
    assert_eq!(pool.contract_puzzle_hash(), Some(&PuzzleHash::from([2; 32])));
    assert!(pool.is_contract());
}

#[test]
fn derive_keys() {
    let key_derivation = MockKeyDerivation::default();
    let farmer_public_key = public_key(1);

    let pool_keys = derive_cache_keys(
        &key_derivation,
        &memo(PlotPool::PublicKey(public_key(2)), farmer_public_key, 3),
    )
    .unwrap();
    assert_eq!(pool_keys.farmer_public_key, farmer_public_key);
    assert_eq!(pool_keys.pool, PlotPool::PublicKey(public_key(2)));

    // Deterministic
    assert_eq!(
        derive_cache_keys(
            &key_derivation,
            &memo(PlotPool::PublicKey(public_key(2)), farmer_public_key, 3),
        )
        .unwrap(),
        pool_keys
    );

    // Pool contract plots derive a different plot key from the same secret
    let contract_keys = derive_cache_keys(
        &key_derivation,
        &memo(
            PlotPool::ContractPuzzleHash(PuzzleHash::from([4; 32])),
            farmer_public_key,
            3,
        ),
    )
    .unwrap();
    assert_ne!(contract_keys.plot_public_key, pool_keys.plot_public_key);
}

#[test]
fn invalid_memo() {
    let key_derivation = MockKeyDerivation::default();
    assert!(derive_cache_keys(&key_derivation, &[1, 2, 3]).is_err());
    assert!(derive_cache_keys(&key_derivation, &[]).is_err());
    assert_eq!(key_derivation.parsed(), 2);
}

#[test]
fn display() {
    assert_eq!(public_key(0xab).to_string(), "ab".repeat(48));
    assert_eq!(format!("{:?}", PuzzleHash::from([1; 32])), "01".repeat(32));
}
