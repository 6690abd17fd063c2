use clap::Parser;
use iotap::cli::Args;
use iotap::config::{TapConfig, DEFAULT_OBJECT_PATH};
use iotap::domain::{ConfigError, Pid};
use iotap_common::config::ProbeLogLevel;
use iotap_common::{BatchPolicy, FaultPolicy, TransportMode};
use std::time::Duration;

fn parse(extra: &[&str]) -> Args {
    Args::try_parse_from(["iotap", "--pid", "42"].iter().chain(extra)).unwrap()
}

#[test]
fn test_defaults() {
    let config = TapConfig::from_args(&parse(&[]), Pid(42)).unwrap();

    assert_eq!(config.transport, TransportMode::Stream);
    assert_eq!(config.policy.fault, FaultPolicy::EmitPartial);
    assert_eq!(config.policy.batch, BatchPolicy::SkipEntry);
    assert_eq!(config.log_level, ProbeLogLevel::Off);
    assert_eq!(config.object.to_str(), Some(DEFAULT_OBJECT_PATH));
    assert_eq!(config.ring_bytes, 256 * 1024);
    assert_eq!(config.duration, None);
    assert!(config.labels.is_empty());
}

#[test]
fn test_policies_and_transport_flags() {
    let args = parse(&[
        "--transport",
        "counters",
        "--fault-policy",
        "discard",
        "--batch-policy",
        "abort-batch",
        "--bpf-log",
        "debug",
        "--duration",
        "5",
        "--capacity",
        "5000",
    ]);
    let config = TapConfig::from_args(&args, Pid(42)).unwrap();

    assert_eq!(config.transport, TransportMode::Counters);
    assert_eq!(config.policy.fault, FaultPolicy::Discard);
    assert_eq!(config.policy.batch, BatchPolicy::AbortBatch);
    assert_eq!(config.log_level, ProbeLogLevel::Debug);
    assert_eq!(config.duration, Some(Duration::from_secs(5)));
    assert!(config.ring_bytes >= 5000);
    assert!(config.ring_bytes.is_power_of_two());
}

#[test]
fn test_labels_override_builtins() {
    let args = parse(&["-L", "case:tls", "--label", "transport: custom "]);
    let labels = TapConfig::from_args(&args, Pid(42)).unwrap().report_labels();

    assert_eq!(labels["case"], "tls");
    assert_eq!(labels["transport"], "custom");
    assert_eq!(labels["bpf_log"], "off");
    assert!(labels.contains_key("version"));
}

#[test]
fn test_duplicate_label_rejected() {
    let args = parse(&["-L", "case:a", "-L", "case:b"]);
    let err = TapConfig::from_args(&args, Pid(42)).unwrap_err();
    assert_eq!(err, ConfigError::DuplicateLabel("case".into()));
}

#[test]
fn test_malformed_label_is_a_usage_error() {
    assert!(Args::try_parse_from(["iotap", "--pid", "42", "-L", "nocolon"]).is_err());
}

#[test]
fn test_zero_capacity_rejected() {
    let err = TapConfig::from_args(&parse(&["--capacity", "0"]), Pid(42)).unwrap_err();
    assert_eq!(err, ConfigError::ZeroCapacity);
}

#[test]
fn test_push_gateway_groups_by_report_labels() {
    let args = parse(&["--push-gateway", "http://gw:9091", "-L", "case:tls"]);
    let config = TapConfig::from_args(&args, Pid(42)).unwrap();

    let url = iotap::export::grouping_url(args.push_gateway.as_deref().unwrap(), &config.report_labels())
        .unwrap();
    assert!(url.path().starts_with("/metrics/job/iotap/bpf_log/off/case/tls/transport/stream/version/"));
}
