//! Convergence and conflict behavior of a three-node masterless cluster.

use std::time::{Duration, Instant};

use serde_json::json;

use drift_core::ReplicationStrategy;

use crate::common::{delete, get, send, set, TestCluster, POLL};

/// Poll until every running node's store maps `key` to `expected`.
async fn wait_for_value(cluster: &TestCluster, key: &str, expected: Option<&str>, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    loop {
        let converged = cluster.running().into_iter().all(|id| {
            cluster.node(id).store().get(key).as_deref() == expected
        });
        if converged {
            return;
        }
        assert!(
            Instant::now() < deadline,
            "cluster did not converge on {key:?} = {expected:?} within {timeout:?}"
        );
        tokio::time::sleep(POLL).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_node_accepts_writes_and_all_converge() {
    let mut cluster = TestCluster::prepare(ReplicationStrategy::Masterless, 3).await;
    cluster.start_all().await;

    let reply = set(&cluster.addr(0), "from0", "a").await;
    assert_eq!(reply["status"], "ok");
    let reply = set(&cluster.addr(1), "from1", "b").await;
    assert_eq!(reply["status"], "ok");
    let reply = set(&cluster.addr(2), "from2", "c").await;
    assert_eq!(reply["status"], "ok");

    wait_for_value(&cluster, "from0", Some("a"), Duration::from_secs(2)).await;
    wait_for_value(&cluster, "from1", Some("b"), Duration::from_secs(2)).await;
    wait_for_value(&cluster, "from2", Some("c"), Duration::from_secs(2)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn deletes_replicate_too() {
    let mut cluster = TestCluster::prepare(ReplicationStrategy::Masterless, 3).await;
    cluster.start_all().await;

    set(&cluster.addr(0), "k", "v").await;
    wait_for_value(&cluster, "k", Some("v"), Duration::from_secs(2)).await;

    let reply = delete(&cluster.addr(1), "k").await;
    assert_eq!(reply["success"], true);
    wait_for_value(&cluster, "k", None, Duration::from_secs(2)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writes_resolve_to_the_higher_node_id() {
    let mut cluster = TestCluster::prepare(ReplicationStrategy::Masterless, 3).await;
    // Slow the pumps down so both writes land before either fans out,
    // which is what makes them genuinely concurrent.
    for config in &mut cluster.configs {
        config.fanout_interval_ms = 100;
    }
    cluster.start_all().await;

    let addr0 = cluster.addr(0);
    let addr2 = cluster.addr(2);
    let (a, b) = tokio::join!(set(&addr0, "k", "A"), set(&addr2, "k", "B"));
    assert_eq!(a["status"], "ok");
    assert_eq!(b["status"], "ok");

    // Node 2 outranks node 0, so "B" wins everywhere.
    wait_for_value(&cluster, "k", Some("B"), Duration::from_secs(2)).await;

    // The losing side detected and logged the conflict.
    let logged: usize = (0..3)
        .map(|id| cluster.node(id).masterless().unwrap().conflict_log().len())
        .sum();
    assert!(logged > 0, "no node recorded the conflict");

    let reply = send(&cluster.addr(0), json!({"command": "get_conflicts"})).await;
    assert_eq!(reply["status"], "ok");
    assert!(!reply["conflicts"].as_array().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn clocks_advance_once_per_accepted_write() {
    let mut cluster = TestCluster::prepare(ReplicationStrategy::Masterless, 3).await;
    cluster.start_all().await;

    for i in 0..3 {
        set(&cluster.addr(1), &format!("k{i}"), "v").await;
    }

    let reply = send(&cluster.addr(1), json!({"command": "get_clock"})).await;
    assert_eq!(reply["status"], "ok");
    assert_eq!(reply["clock"]["1"], 3);

    // Peers converge to the same component after fan-out.
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        let clock0 = cluster.node(0).masterless().unwrap().clock();
        if clock0.get(1) == 3 {
            break;
        }
        assert!(Instant::now() < deadline, "clock component did not propagate");
        tokio::time::sleep(POLL).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn a_late_starter_pulls_history_on_boot() {
    let mut cluster = TestCluster::prepare(ReplicationStrategy::Masterless, 3).await;
    cluster.start_node(0).await;
    cluster.start_node(1).await;

    set(&cluster.addr(0), "early", "bird").await;
    set(&cluster.addr(1), "second", "write").await;

    // Let the two running nodes converge first.
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        let ready = cluster.node(1).store().get("early").is_some()
            && cluster.node(0).store().get("second").is_some();
        if ready {
            break;
        }
        assert!(Instant::now() < deadline, "two-node cluster did not converge");
        tokio::time::sleep(POLL).await;
    }

    // Node 2 starts late and must catch up via startup sync.
    cluster.start_node(2).await;
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let store = cluster.node(2).store();
        if store.get("early").as_deref() == Some("bird")
            && store.get("second").as_deref() == Some("write")
        {
            break;
        }
        assert!(
            Instant::now() < deadline,
            "late starter did not sync history"
        );
        tokio::time::sleep(POLL).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reads_are_served_locally_everywhere() {
    let mut cluster = TestCluster::prepare(ReplicationStrategy::Masterless, 3).await;
    cluster.start_all().await;

    set(&cluster.addr(0), "k", "v").await;
    wait_for_value(&cluster, "k", Some("v"), Duration::from_secs(2)).await;

    for id in 0..3 {
        let reply = get(&cluster.addr(id), "k").await;
        assert_eq!(reply["status"], "ok");
        assert_eq!(reply["value"], "v");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn election_commands_are_refused() {
    let mut cluster = TestCluster::prepare(ReplicationStrategy::Masterless, 3).await;
    cluster.start_all().await;

    let reply = send(
        &cluster.addr(0),
        json!({"command": "request_vote", "term": 1, "candidate_id": 0}),
    )
    .await;
    assert_eq!(reply["status"], "error");
}
