use std::net::TcpListener;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use serial_test::serial;
use testkit::{MetricsCollector, sample_event};

fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    listener.local_addr().expect("local addr").port()
}

fn bin() -> &'static str {
    env!("CARGO_BIN_EXE_dialprobe")
}

fn spawn_serve(temp: &Path, port: u16, collector: &MetricsCollector) -> Child {
    Command::new(bin())
        .env("XDG_CONFIG_HOME", temp)
        .env_remove("DIALPROBE_CONFIG")
        .arg("serve")
        .arg("--listen")
        .arg(format!("127.0.0.1:{port}"))
        .arg("--metrics-endpoint")
        .arg(collector.endpoint())
        .arg("--metrics-protocol")
        .arg("grpc")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn dialprobe serve")
}

async fn wait_invoke_ready(port: u16, child: &mut Child) {
    let client = reqwest::Client::new();
    let deadline = Instant::now() + Duration::from_secs(20);
    loop {
        assert!(
            child.try_wait().expect("try_wait").is_none(),
            "dialprobe serve exited before ready"
        );
        if client
            .get(format!("http://127.0.0.1:{port}/invoke"))
            .send()
            .await
            .is_ok()
        {
            return;
        }
        assert!(Instant::now() < deadline, "timed out waiting for invoke HTTP");
        tokio::time::sleep(Duration::from_millis(150)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
#[ignore = "stress test; run manually"]
async fn stress_concurrent_invocations_share_one_exporter() {
    let temp = tempfile::tempdir().expect("tempdir");
    let collector = MetricsCollector::start_grpc().await.expect("start collector");
    let target = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind target");
    let target_port = target.local_addr().expect("target addr").port();
    let accept_task = tokio::spawn(async move {
        while let Ok((stream, _)) = target.accept().await {
            drop(stream);
        }
    });

    let port = free_port();
    let mut child = spawn_serve(temp.path(), port, &collector);
    wait_invoke_ready(port, &mut child).await;

    const INVOCATIONS: usize = 200;

    let client = reqwest::Client::new();
    let mut tasks = tokio::task::JoinSet::new();
    let start = Instant::now();
    for _ in 0..INVOCATIONS {
        let client = client.clone();
        tasks.spawn(async move {
            let resp = client
                .post(format!("http://127.0.0.1:{port}/invoke"))
                .header("content-type", "application/json")
                .body(sample_event(target_port))
                .send()
                .await
                .expect("post invoke");
            assert!(resp.status().is_success(), "invocation failed");
            assert_eq!(resp.text().await.expect("body"), "Done auth-svc!");
        });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.expect("join invoke task");
    }
    let elapsed = start.elapsed();

    let points = collector.points();
    assert_eq!(points.len(), INVOCATIONS * 2);
    assert!(
        points
            .iter()
            .filter(|p| p.name == "State")
            .all(|p| p.value == 1.0)
    );

    let _ = child.kill();
    let _ = child.wait();
    accept_task.abort();

    eprintln!("stress complete: {INVOCATIONS} invocations in {elapsed:?}");
}
