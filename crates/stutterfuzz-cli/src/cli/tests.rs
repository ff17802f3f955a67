use super::*;
use stutterfuzz_core::config::Profile;

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(args).unwrap()
}

const TARGET: &[&str] = &[
    "stutterfuzz",
    "--blob-dir",
    "/tmp/blobs",
    "--host",
    "127.0.0.1",
    "--port",
    "9000",
];

#[test]
fn cli_parse_required_target() {
    let cli = parse(TARGET);
    assert_eq!(cli.blob_dir, PathBuf::from("/tmp/blobs"));
    assert_eq!(cli.host, "127.0.0.1");
    assert_eq!(cli.port, 9000);
    assert!(cli.num_conns.is_none());
    assert!(cli.chunk_policy.is_none());
    assert!(cli.config.is_none());
}

#[test]
fn cli_parse_tuning_overrides() {
    let mut args = TARGET.to_vec();
    args.extend([
        "--num-conns",
        "32",
        "--tick-ms",
        "10",
        "--fastopen-chance",
        "2",
        "--close-chance",
        "0",
        "--chunk-policy",
        "sqrt",
        "--seed",
        "7",
    ]);
    let cli = parse(&args);
    assert_eq!(cli.num_conns, Some(32));
    assert_eq!(cli.tick_ms, Some(10));
    assert_eq!(cli.fastopen_chance, Some(2));
    assert_eq!(cli.close_chance, Some(0));
    assert_eq!(cli.chunk_policy, Some(ChunkPolicy::Sqrt));
    assert_eq!(cli.seed, Some(7));
}

#[test]
fn cli_parse_missing_target_fails() {
    assert!(Cli::try_parse_from(["stutterfuzz", "--host", "127.0.0.1"]).is_err());
    assert!(Cli::try_parse_from(["stutterfuzz", "--blob-dir", "/tmp/blobs"]).is_err());
}

#[test]
fn cli_parse_rejects_unknown_policy() {
    let mut args = TARGET.to_vec();
    args.extend(["--chunk-policy", "gaussian"]);
    assert!(Cli::try_parse_from(args).is_err());
}

#[test]
fn cli_overrides_apply_on_top_of_profile() {
    let mut args = TARGET.to_vec();
    args.extend(["--num-conns", "8", "--close-chance", "0", "--seed", "5"]);
    let cli = parse(&args);
    let profile = Profile::default();
    let mut config =
        Config::from_profile(cli.blob_dir.clone(), cli.host.clone(), cli.port, &profile);
    cli.apply_overrides(&mut config);
    assert_eq!(config.connections, 8);
    assert_eq!(config.tick_ms, profile.tick_ms);
    assert_eq!(config.fastopen_chance, profile.fastopen_chance);
    assert_eq!(config.close_chance, 0);
    assert_eq!(config.seed, Some(5));
    assert!(config.validate().is_ok());
}
