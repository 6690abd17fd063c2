use iotap::domain::ExportError;
use iotap::export::{grouping_url, push_metrics, RunMetrics};
use iotap::probes::EventAggregator;
use iotap_common::{IoEvent, OperationKind};
use reqwest::Client;
use std::collections::BTreeMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Accept one request, answer with `status`, hand back the raw request
async fn one_shot_gateway(status: &'static str) -> (String, tokio::task::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut raw = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            raw.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&raw);
            if let Some((head, body)) = text.split_once("\r\n\r\n") {
                let length = head
                    .lines()
                    .find_map(|l| l.to_ascii_lowercase().strip_prefix("content-length:").map(|v| v.trim().to_string()))
                    .and_then(|v| v.parse::<usize>().ok())
                    .unwrap_or(0);
                if body.len() >= length {
                    break;
                }
            }
            if n == 0 {
                break;
            }
        }
        let response = format!("HTTP/1.1 {status}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
        socket.write_all(response.as_bytes()).await.unwrap();
        String::from_utf8(raw).unwrap()
    });
    (base, handle)
}

fn aggregator() -> EventAggregator {
    let mut agg = EventAggregator::new();
    agg.add(IoEvent::new(OperationKind::Writev, 125));
    agg.add(IoEvent::new(OperationKind::RecvFrom, 1500));
    agg
}

fn run_labels() -> BTreeMap<String, String> {
    [("case", "baseline"), ("transport", "stream")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[tokio::test]
async fn test_push_puts_labelled_group() {
    let (base, gateway) = one_shot_gateway("200 OK").await;
    let url = grouping_url(&base, &run_labels()).unwrap();
    let client = Client::builder().no_proxy().build().unwrap();

    push_metrics(&client, url, &RunMetrics::collect(&aggregator()).unwrap()).await.unwrap();

    let request = gateway.await.unwrap();
    assert!(request.starts_with("PUT /metrics/job/iotap/case/baseline/transport/stream HTTP/1.1"));
    assert!(request.contains("iotap_io_bytes{kind=\"WRITEV\"} 125"));
    assert!(request.contains("iotap_io_calls{kind=\"RECVFROM\"} 1"));
    assert!(request.contains("iotap_runs 1"));
}

#[tokio::test]
async fn test_gateway_rejection_is_an_error() {
    let (base, gateway) = one_shot_gateway("400 Bad Request").await;
    let url = grouping_url(&base, &run_labels()).unwrap();
    let client = Client::builder().no_proxy().build().unwrap();

    let err = push_metrics(&client, url, &RunMetrics::collect(&aggregator()).unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, ExportError::Push(_)));
    gateway.await.unwrap();
}
