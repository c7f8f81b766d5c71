//! End-to-end genesis generation tests

use playground_artifacts::keystore::{KEYSTORE_PASSWORD, Keystore};
use playground_artifacts::{ArtifactsBuilder, Error, L2Config, MIN_GENESIS_DELAY};
use playground_manifest::Output;
use serde_json::Value;
use tempfile::TempDir;

const GENESIS_TIME: u64 = 1_700_000_000;

fn session() -> (TempDir, Output) {
    let dir = TempDir::new().unwrap();
    let output = Output::new(dir.path()).unwrap();
    (dir, output)
}

fn read_json(output: &Output, name: &str) -> Value {
    serde_json::from_slice(&output.read(name).unwrap()).unwrap()
}

#[test]
fn test_fixed_genesis_time_is_reproducible() {
    let builder = ArtifactsBuilder::new().with_genesis_time(GENESIS_TIME);
    let (_a, out_a) = session();
    let (_b, out_b) = session();
    let a = builder.build(&out_a).unwrap();
    let b = builder.build(&out_b).unwrap();

    assert_eq!(a.l1_genesis_hash, b.l1_genesis_hash);
    assert_eq!(a.genesis_validators_root, b.genesis_validators_root);
    for file in ["genesis.json", "testnet/genesis.ssz", "testnet/config.yaml", "jwtsecret"] {
        assert_eq!(out_a.read(file).unwrap(), out_b.read(file).unwrap(), "{} differs", file);
    }
}

#[test]
fn test_l1_file_set() {
    let (dir, output) = session();
    let artifacts = ArtifactsBuilder::new()
        .with_genesis_time(GENESIS_TIME)
        .with_block_time(2)
        .build(&output)
        .unwrap();

    for file in [
        "genesis.json",
        "jwtsecret",
        "testnet/config.yaml",
        "testnet/genesis.ssz",
        "testnet/boot_enr.yaml",
        "testnet/deploy_block.txt",
        "testnet/deposit_contract_block.txt",
        "testnet/genesis_validators_root.txt",
    ] {
        assert!(output.exists(file), "missing {}", file);
    }
    assert!(!output.exists("l2-genesis.json"));
    assert_eq!(output.read("testnet/deploy_block.txt").unwrap(), b"0");
    assert_eq!(
        String::from_utf8(output.read("testnet/genesis_validators_root.txt").unwrap()).unwrap(),
        artifacts.genesis_validators_root.to_string()
    );
    assert_eq!(
        String::from_utf8(output.read("jwtsecret").unwrap()).unwrap(),
        "0x04592280e1778419b7aa954d43871cb2cfb2ebda754fb735e8adeb293a88f9bf"
    );

    let config = String::from_utf8(output.read("testnet/config.yaml").unwrap()).unwrap();
    assert!(config.contains("SECONDS_PER_SLOT: 2\n"));
    assert!(config.contains("FULU_FORK_EPOCH: 18446744073709551615\n"));

    let genesis = read_json(&output, "genesis.json");
    assert_eq!(genesis["config"]["chainId"], 1337);
    assert_eq!(genesis["alloc"].as_object().unwrap().len(), 10);

    let validators: Vec<_> = std::fs::read_dir(dir.path().join("data_validator/validators"))
        .unwrap()
        .collect();
    let secrets: Vec<_> = std::fs::read_dir(dir.path().join("data_validator/secrets"))
        .unwrap()
        .collect();
    assert_eq!(validators.len(), 100);
    assert_eq!(secrets.len(), 100);
}

#[test]
fn test_keystore_decrypts_to_interop_secret() {
    let (_dir, output) = session();
    ArtifactsBuilder::new().with_genesis_time(GENESIS_TIME).build(&output).unwrap();

    let key = playground_artifacts::cl::keys::ValidatorKey::interop(0).unwrap();
    let pubkey = key.pubkey_hex();
    let keystore: Keystore = serde_json::from_slice(
        &output
            .read(format!("data_validator/validators/{}/voting-keystore.json", pubkey))
            .unwrap(),
    )
    .unwrap();
    assert_eq!(keystore.path, "m/12381/3600/0/0/0");
    assert_eq!(keystore.decrypt(KEYSTORE_PASSWORD).unwrap(), key.secret.to_vec());
    assert_eq!(
        output.read(format!("data_validator/secrets/{}", pubkey)).unwrap(),
        KEYSTORE_PASSWORD.as_bytes()
    );
}

#[test]
fn test_genesis_delay_is_clamped() {
    assert_eq!(ArtifactsBuilder::new().with_genesis_delay(3).genesis_delay(), MIN_GENESIS_DELAY);
    assert_eq!(ArtifactsBuilder::new().with_genesis_delay(30).genesis_delay(), 30);
}

#[test]
fn test_latest_fork_enables_osaka_and_fulu() {
    let (_dir, output) = session();
    ArtifactsBuilder::new()
        .with_genesis_time(GENESIS_TIME)
        .with_latest_fork(true)
        .build(&output)
        .unwrap();
    let genesis = read_json(&output, "genesis.json");
    assert_eq!(genesis["config"]["osakaTime"], 0);
    let config = String::from_utf8(output.read("testnet/config.yaml").unwrap()).unwrap();
    assert!(config.contains("FULU_FORK_EPOCH: 0\n"));
}

fn build_l2(latest_fork: Option<u64>) -> (TempDir, Output) {
    let (dir, output) = session();
    ArtifactsBuilder::new()
        .with_genesis_time(GENESIS_TIME)
        .with_l2(L2Config::default().with_block_time(2).with_latest_fork(latest_fork))
        .build(&output)
        .unwrap();
    (dir, output)
}

#[test]
fn test_l2_fork_modes() {
    let (_d, isthmus) = build_l2(None);
    let rollup = read_json(&isthmus, "rollup.json");
    assert_eq!(rollup["isthmus_time"], 0);
    assert!(rollup.get("jovian_time").is_none());
    assert_eq!(rollup["genesis"]["l2_time"], GENESIS_TIME + 2);

    let (_d, at_genesis) = build_l2(Some(0));
    assert_eq!(read_json(&at_genesis, "rollup.json")["jovian_time"], 0);
    assert_eq!(read_json(&at_genesis, "l2-genesis.json")["config"]["jovianTime"], 0);

    let (_d, delayed) = build_l2(Some(3));
    assert_eq!(read_json(&delayed, "rollup.json")["jovian_time"], GENESIS_TIME + 8);
}

#[test]
fn test_l2_genesis_links_l1() {
    let (_dir, output) = session();
    let artifacts = ArtifactsBuilder::new()
        .with_genesis_time(GENESIS_TIME)
        .with_l2(L2Config::default())
        .build(&output)
        .unwrap();
    let l2 = artifacts.l2.unwrap();

    let rollup = read_json(&output, "rollup.json");
    assert_eq!(rollup["genesis"]["l1"]["hash"], artifacts.l1_genesis_hash.to_string());
    assert_eq!(rollup["genesis"]["l2"]["hash"], l2.genesis_hash.to_string());
    assert_eq!(rollup["chain_op_config"]["eip1559Elasticity"], 6);
    assert_eq!(rollup["chain_op_config"]["eip1559Denominator"], 50);
    assert_eq!(rollup["chain_op_config"]["eip1559DenominatorCanyon"], 250);

    let genesis = read_json(&output, "l2-genesis.json");
    assert_eq!(genesis["timestamp"], format!("{:#x}", GENESIS_TIME + 2));
    // template accounts plus the ten prefunded ones
    assert_eq!(genesis["alloc"].as_object().unwrap().len(), 12);
}

#[test]
fn test_predeploy_conflict_is_fatal() {
    let (dir, output) = session();
    let predeploys = dir.path().join("predeploys.json");
    std::fs::write(
        &predeploys,
        r#"{"0x4200000000000000000000000000000000000016": {"balance": "0x1"}}"#,
    )
    .unwrap();
    let err = ArtifactsBuilder::new()
        .with_genesis_time(GENESIS_TIME)
        .with_l2(L2Config::default().with_predeploys(&predeploys))
        .build(&output)
        .unwrap_err();
    assert!(matches!(err, Error::PredeployConflict(_)));
}

#[test]
fn test_enodes_are_sequential() {
    let (_dir, output) = session();
    let mut artifacts = ArtifactsBuilder::new().with_genesis_time(GENESIS_TIME).build(&output).unwrap();
    let first = artifacts.next_enode().unwrap();
    let second = artifacts.next_enode().unwrap();
    assert_eq!(first.key_file, "enode-key-1.txt");
    assert_eq!(second.key_file, "enode-key-2.txt");
    assert!(output.exists("enode-key-1.txt"));
}
