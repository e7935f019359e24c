mod common;

use common::{deadline_in, resilience};
use payment_router::gateway::{CircuitState, GatewayError, ResilientClient};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

const ANSWER_OK: u8 = 0;
const ANSWER_500: u8 = 1;
const HANG: u8 = 2;

/// Backend whose behaviour can be switched between requests.
struct SwitchableBackend {
    url: String,
    mode: Arc<AtomicU8>,
    accepted: Arc<AtomicUsize>,
}

impl SwitchableBackend {
    async fn start(mode: u8) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let mode = Arc::new(AtomicU8::new(mode));
        let accepted = Arc::new(AtomicUsize::new(0));

        let (current, counter) = (mode.clone(), accepted.clone());
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let mode = current.load(Ordering::SeqCst);
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buf = [0u8; 1024];
                    // every request here carries the two byte body `{}`
                    while !request.windows(6).any(|w| w == b"\r\n\r\n{}") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }
                    let reply: &[u8] = match mode {
                        ANSWER_OK => b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\n{}",
                        ANSWER_500 => b"HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                        _ => {
                            tokio::time::sleep(Duration::from_secs(10)).await;
                            return;
                        }
                    };
                    let _ = socket.write_all(reply).await;
                });
            }
        });

        Self { url, mode, accepted }
    }

    fn switch(&self, mode: u8) {
        self.mode.store(mode, Ordering::SeqCst);
    }

    fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

/// Fails three calls, then waits out the one second open timeout.
async fn trip_and_wait(client: &ResilientClient, backend: &SwitchableBackend) {
    backend.switch(ANSWER_500);
    for _ in 0..3 {
        assert!(matches!(call(client).await, Err(GatewayError::Failure { status: 500, .. })));
    }
    assert_eq!(client.circuit_state(), CircuitState::Open);
    tokio::time::sleep(Duration::from_millis(1100)).await;
}

async fn call(client: &ResilientClient) -> Result<Vec<u8>, GatewayError> {
    client
        .post("/deposit", "application/json", b"{}".to_vec(), deadline_in(2000))
        .await
}

#[tokio::test]
async fn test_circuit_breaker_starts_closed() {
    let client = ResilientClient::new("gw", "http://127.0.0.1:1", &resilience(0, true)).unwrap();
    assert_eq!(client.circuit_state(), CircuitState::Closed);
}

#[tokio::test]
async fn test_circuit_opens_after_repeated_failures() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/deposit")
        .with_status(500)
        .expect(3)
        .create_async()
        .await;

    let client = ResilientClient::new("gw", &server.url(), &resilience(0, true)).unwrap();

    for _ in 0..3 {
        let err = call(&client).await.unwrap_err();
        assert!(matches!(err, GatewayError::Failure { status: 500, .. }));
    }
    assert_eq!(client.circuit_state(), CircuitState::Open);

    // rejected without touching the backend
    let err = call(&client).await.unwrap_err();
    assert!(matches!(err, GatewayError::CircuitOpen(_)));

    mock.assert_async().await;
}

#[tokio::test]
async fn test_circuit_recovers_after_open_timeout() {
    let mut server = mockito::Server::new_async().await;
    let failing = server
        .mock("POST", "/deposit")
        .with_status(503)
        .create_async()
        .await;

    let client = ResilientClient::new("gw", &server.url(), &resilience(0, true)).unwrap();
    for _ in 0..3 {
        let _ = call(&client).await;
    }
    assert_eq!(client.circuit_state(), CircuitState::Open);

    failing.remove_async().await;
    let healthy = server
        .mock("POST", "/deposit")
        .with_status(200)
        .with_body("{}")
        .expect(1)
        .create_async()
        .await;

    tokio::time::sleep(Duration::from_millis(1100)).await;

    call(&client).await.unwrap();
    assert_eq!(client.circuit_state(), CircuitState::Closed);
    healthy.assert_async().await;
}

#[tokio::test]
async fn test_disabled_breaker_never_opens() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/deposit")
        .with_status(500)
        .expect(5)
        .create_async()
        .await;

    let client = ResilientClient::new("gw", &server.url(), &resilience(0, false)).unwrap();
    for _ in 0..5 {
        assert!(matches!(call(&client).await, Err(GatewayError::Failure { .. })));
    }

    assert_eq!(client.circuit_state(), CircuitState::Closed);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_successes_keep_ratio_below_threshold() {
    let mut server = mockito::Server::new_async().await;
    let ok = server
        .mock("POST", "/deposit")
        .with_status(200)
        .with_body("{}")
        .expect(3)
        .create_async()
        .await;

    let client = ResilientClient::new("gw", &server.url(), &resilience(0, true)).unwrap();
    for _ in 0..3 {
        call(&client).await.unwrap();
    }
    ok.assert_async().await;
    ok.remove_async().await;

    let _failing = server
        .mock("POST", "/deposit")
        .with_status(500)
        .create_async()
        .await;

    // 2 failures out of 5 stays under 0.5
    for _ in 0..2 {
        let _ = call(&client).await;
    }
    assert_eq!(client.circuit_state(), CircuitState::Closed);
}

#[tokio::test]
async fn test_cancelled_trial_releases_its_slot() {
    let backend = SwitchableBackend::start(ANSWER_OK).await;
    let client = ResilientClient::new("gw", &backend.url, &resilience(0, true)).unwrap();
    trip_and_wait(&client, &backend).await;

    // the only trial slot is taken by a call whose caller gives up
    backend.switch(HANG);
    assert!(tokio::time::timeout(Duration::from_millis(100), call(&client))
        .await
        .is_err());

    backend.switch(ANSWER_OK);
    call(&client).await.unwrap();
    assert_eq!(client.circuit_state(), CircuitState::Closed);
}

#[tokio::test]
async fn test_extra_half_open_calls_are_rejected() {
    let backend = SwitchableBackend::start(ANSWER_OK).await;
    let client = ResilientClient::new("gw", &backend.url, &resilience(0, true)).unwrap();
    trip_and_wait(&client, &backend).await;

    backend.switch(HANG);
    let trial = {
        let client = client.clone();
        tokio::spawn(async move { call(&client).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(client.circuit_state(), CircuitState::HalfOpen);
    let accepted = backend.accepted();

    let started = std::time::Instant::now();
    let err = call(&client).await.unwrap_err();
    assert!(matches!(err, GatewayError::CircuitOpen(_)));
    assert!(started.elapsed() < Duration::from_millis(500));
    // rejected before reaching the backend
    assert_eq!(backend.accepted(), accepted);

    trial.abort();
}
