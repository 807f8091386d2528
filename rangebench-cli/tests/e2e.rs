use std::time::Duration;

use rangebench_cli::config::{Config, ConfigSecret, OutputTarget};
use rangebench_cli::session::run_session;
use rangebench_core::{HardwareConcurrency, HostInfo, StaticTopology};
use rangebench_test::server::RangeServer;
use secrecy::SecretBox;
use tokio_util::sync::CancellationToken;

const BUCKET: &str = "bench";
const KEY: &str = "large.bin";
const OBJECT_SIZE: usize = 8 * 1024 * 1024;

fn topology() -> StaticTopology {
    StaticTopology {
        host: HostInfo {
            host_id: "test-host".into(),
            instance_class: None,
        },
        region: None,
        concurrency: HardwareConcurrency {
            cores: 1,
            threads: 1,
        },
    }
}

/// Payloads of 1, 2 and 4 MiB with 1, 2 and 4 threads, four reads each.
fn config(server: &RangeServer) -> Config {
    let mut config = Config::default();
    config.storage.endpoint = Some(server.endpoint());
    config.storage.bucket = BUCKET.into();
    config.storage.key = KEY.into();
    config.storage.access_key = Some("AKID".into());
    config.storage.secret_key = Some(SecretBox::new(Box::new(ConfigSecret::from("secret"))));

    config.payloads.min = 1;
    config.payloads.max = 4;
    config.payloads.step = 2;
    config.threads.min = 1.0;
    config.threads.max = 4.0;
    config.threads.step = 2.0;
    config.threads.fixed = true;
    config.samples.count = 4;

    config.output.results = Some("run".into());
    config
}

#[tokio::test]
async fn uploads_results_to_bucket() {
    rangebench_test::tracing::init();
    let server = RangeServer::new().await;
    server.insert_random(BUCKET, KEY, OBJECT_SIZE);
    let config = config(&server);

    let report = run_session(&config, &topology(), false, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.runs, 9);
    assert_eq!(report.flushes, 1);
    assert!(!report.interrupted);
    assert_eq!(server.range_reads(), 36);

    let results = server
        .object(BUCKET, "results/run-unknown-instance.csv")
        .unwrap();
    let results = std::str::from_utf8(&results).unwrap();
    assert_eq!(results.lines().count(), 10);
    assert!(results.lines().nth(1).unwrap().starts_with("test-host,unknown-instance,1048576,1,"));

    // no stats prefix, no stats file
    assert_eq!(
        server.keys(BUCKET),
        vec![KEY.to_owned(), "results/run-unknown-instance.csv".to_owned()]
    );

    let authorization = server.last_authorization().unwrap();
    assert!(authorization.starts_with("AWS4-HMAC-SHA256 Credential=AKID/"));
}

#[tokio::test]
async fn writes_results_and_stats_to_filesystem() {
    rangebench_test::tracing::init();
    let server = RangeServer::new().await;
    server.insert_random(BUCKET, KEY, OBJECT_SIZE);
    let dir = tempfile::tempdir().unwrap();

    let mut config = config(&server);
    config.output.stats = Some("usage".into());
    config.output.target = OutputTarget::FileSystem {
        path: dir.path().into(),
    };

    let report = run_session(&config, &topology(), false, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.runs, 9);

    let results =
        std::fs::read_to_string(dir.path().join("results/run-unknown-instance.csv")).unwrap();
    assert_eq!(results.lines().count(), 10);

    let stats =
        std::fs::read_to_string(dir.path().join("stats/usage-unknown-instance.csv")).unwrap();
    assert_eq!(stats.lines().count(), 10);

    // nothing is uploaded
    assert_eq!(server.keys(BUCKET), vec![KEY.to_owned()]);
}

#[tokio::test]
async fn rejects_full_object_responses() {
    rangebench_test::tracing::init();
    let server = RangeServer::new().await;
    server.insert_random(BUCKET, KEY, OBJECT_SIZE);
    server.ignore_ranges();

    let err = run_session(&config(&server), &topology(), false, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(format!("{err:#}").contains("206"), "{err:#}");
    assert_eq!(server.keys(BUCKET), vec![KEY.to_owned()]);
}

#[tokio::test]
async fn failed_reads_abort_without_results() {
    rangebench_test::tracing::init();
    let server = RangeServer::new().await;
    server.insert_random(BUCKET, KEY, OBJECT_SIZE);
    server.fail_reads(503);

    let err = run_session(&config(&server), &topology(), false, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(format!("{err:#}").contains("503"), "{err:#}");
    assert_eq!(server.keys(BUCKET), vec![KEY.to_owned()]);
}

#[tokio::test]
async fn oversized_payload_fails_before_reads() {
    rangebench_test::tracing::init();
    let server = RangeServer::new().await;
    server.insert_random(BUCKET, KEY, 2 * 1024 * 1024);

    let err = run_session(&config(&server), &topology(), false, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(format!("{err:#}").contains("benchmark session failed"));
    assert_eq!(server.range_reads(), 0);
}

#[tokio::test]
async fn missing_object_fails_before_reads() {
    rangebench_test::tracing::init();
    let server = RangeServer::new().await;

    let err = run_session(&config(&server), &topology(), false, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(format!("{err:#}").contains("failed to get the size of"), "{err:#}");
    assert_eq!(server.range_reads(), 0);
}

#[tokio::test]
async fn dry_run_reads_and_writes_nothing() {
    rangebench_test::tracing::init();
    let server = RangeServer::new().await;
    server.insert_random(BUCKET, KEY, OBJECT_SIZE);

    let report = run_session(&config(&server), &topology(), true, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.runs, 9);
    // the final flush is logged, not written
    assert_eq!(report.flushes, 1);
    assert_eq!(server.range_reads(), 0);
    assert_eq!(server.keys(BUCKET), vec![KEY.to_owned()]);
}

#[tokio::test]
async fn throttling_flushes_until_cancelled() {
    rangebench_test::tracing::init();
    let server = RangeServer::new().await;
    server.insert_random(BUCKET, KEY, OBJECT_SIZE);

    let mut config = config(&server);
    config.throttling.enabled = true;
    config.throttling.flush_interval = 2;
    config.payloads.max = 1;
    config.threads.max = 1.0;
    config.samples.count = 2;

    let topology = topology();
    let cancel = CancellationToken::new();
    let session = run_session(&config, &topology, false, cancel.clone());
    let stop = async {
        while server.range_reads() < 15 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cancel.cancel();
    };
    let (report, ()) = tokio::join!(session, stop);
    let report = report.unwrap();

    assert!(report.interrupted);
    assert!(report.runs >= 7);

    let keys = server.keys(BUCKET);
    let intervals = keys
        .iter()
        .filter(|key| key.starts_with("results/run-") && key.contains("-@"))
        .count() as u64;
    assert_eq!(intervals, report.runs / 2);

    let has_final = keys.iter().any(|key| key == "results/run-unknown-instance.csv");
    assert_eq!(has_final, report.runs % 2 == 1);
}
