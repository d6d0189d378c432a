//! 连接参数构建测试

use chrono::TimeDelta;
use flare_discovery::{ConnectOption, ConnectOptions, DiscoveryError, NEAR_IP};
use std::time::Duration;

fn full_set() -> Vec<ConnectOption> {
    vec![
        ConnectOption::Tag("grpc".to_string()),
        ConnectOption::Healthy(true),
        ConnectOption::Wait(TimeDelta::seconds(10)),
        ConnectOption::Insecure(false),
        ConnectOption::Near(NEAR_IP.to_string()),
        ConnectOption::Limit(3),
        ConnectOption::Timeout(TimeDelta::seconds(30)),
        ConnectOption::MaxBackoff(TimeDelta::milliseconds(500)),
        ConnectOption::Token("secret".to_string()),
        ConnectOption::Datacenter("dc1".to_string()),
        ConnectOption::AllowStale(true),
        ConnectOption::RequireConsistent(false),
    ]
}

#[test]
fn snapshot_is_independent_of_setter_order() {
    let forward = ConnectOptions::from_options(full_set()).unwrap();
    let reversed = ConnectOptions::from_options(full_set().into_iter().rev()).unwrap();

    let mut interleaved = full_set();
    interleaved.rotate_left(5);
    let rotated = ConnectOptions::from_options(interleaved).unwrap();

    assert_eq!(forward, reversed);
    assert_eq!(forward, rotated);
    assert_eq!(forward.tag(), Some("grpc"));
    assert_eq!(forward.wait(), Some(Duration::from_secs(10)));
    assert_eq!(forward.limit(), Some(3));
    assert_eq!(forward.max_backoff(), Some(Duration::from_millis(500)));
    assert_eq!(forward.require_consistent(), Some(false));
}

#[test]
fn builder_matches_option_list() {
    let built = ConnectOptions::builder()
        .tag("grpc")
        .healthy(true)
        .wait(TimeDelta::seconds(10))
        .insecure(false)
        .near(NEAR_IP)
        .limit(3)
        .timeout(TimeDelta::seconds(30))
        .max_backoff(TimeDelta::milliseconds(500))
        .token("secret")
        .dc("dc1")
        .allow_stale(true)
        .require_consistent(false)
        .build()
        .unwrap();

    assert_eq!(built, ConnectOptions::from_options(full_set()).unwrap());
}

#[test]
fn negative_values_are_rejected_without_mutation() {
    let base = ConnectOptions::from_options(full_set()).unwrap();

    for option in [
        ConnectOption::Wait(TimeDelta::seconds(-1)),
        ConnectOption::Timeout(TimeDelta::milliseconds(-5)),
        ConnectOption::MaxBackoff(TimeDelta::seconds(-30)),
        ConnectOption::Limit(-1),
    ] {
        let mut snapshot = base.clone();
        let err = option.apply(&mut snapshot).unwrap_err();
        assert!(matches!(err, DiscoveryError::Validation(_)), "{:?}", err);
        assert_eq!(snapshot, base);
    }
}

#[test]
fn builder_fails_fast_on_invalid_option() {
    let err = ConnectOptions::builder()
        .tag("grpc")
        .limit(-10)
        .healthy(true)
        .build()
        .unwrap_err();

    assert_eq!(err.to_string(), "invalid option: limit cannot be less than zero");
}

#[test]
fn zero_and_default_values_stay_unset() {
    let options = ConnectOptions::builder()
        .tag("")
        .healthy(false)
        .wait(TimeDelta::zero())
        .insecure(true)
        .limit(0)
        .timeout(TimeDelta::zero())
        .max_backoff(TimeDelta::zero())
        .token("")
        .dc("")
        .build()
        .unwrap();

    assert_eq!(options, ConnectOptions::default());
    assert!(options.query_pairs().is_empty());
}

#[test]
fn near_accepts_only_the_ip_hint() {
    let set = ConnectOptions::builder().near(NEAR_IP).build().unwrap();
    assert_eq!(set.near(), Some("_ip"));

    let ignored = ConnectOptions::builder().near("_agent").build().unwrap();
    assert_eq!(ignored.near(), None);

    let empty = ConnectOptions::builder().near("").build().unwrap();
    assert_eq!(empty.near(), None);
}

#[test]
fn query_pairs_are_sorted_and_use_consul_durations() {
    let options = ConnectOptions::from_options(full_set()).unwrap();
    let keys: Vec<&str> = options.query_pairs().iter().map(|(k, _)| *k).collect();

    assert_eq!(
        keys,
        vec![
            "allow-stale",
            "dc",
            "healthy",
            "insecure",
            "limit",
            "max-backoff",
            "near",
            "require-consistent",
            "tag",
            "timeout",
            "token",
            "wait",
        ]
    );

    let pairs = options.query_pairs();
    let value = |key: &str| pairs.iter().find(|(k, _)| *k == key).map(|(_, v)| v.as_str());
    assert_eq!(value("wait"), Some("10s"));
    assert_eq!(value("max-backoff"), Some("500ms"));
    assert_eq!(value("insecure"), Some("false"));
    assert_eq!(value("allow-stale"), Some("true"));
}

#[test]
fn query_pairs_parse_back_into_the_same_snapshot() {
    let options = ConnectOptions::from_options(full_set()).unwrap();
    let pairs = options.query_pairs();
    let parsed =
        ConnectOptions::from_query_pairs(pairs.iter().map(|(k, v)| (*k, v.as_str()))).unwrap();

    assert_eq!(parsed, options);
}
