use lead_funnel::config::DeliveryMode;
use lead_funnel::submitter::{DeliveryMethod, FailureKind};
use lead_funnel::{Config, LeadSubmission, LeadSubmitter, PageContext};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Clone)]
struct CapturedRequest {
    head: String,
    body: String,
}

type Captures = Arc<Mutex<Vec<CapturedRequest>>>;

/// Minimal HTTP/1.1 responder: answers every connection with the same canned
/// response and records what it received.
async fn spawn_responder(status: u16, body: &'static str) -> (String, Captures) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let captures: Captures = Arc::new(Mutex::new(Vec::new()));

    let sink = captures.clone();
    tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let sink = sink.clone();
            tokio::spawn(serve(stream, status, body, sink));
        }
    });

    (format!("http://{addr}"), captures)
}

async fn serve(
    mut stream: TcpStream,
    status: u16,
    body: &'static str,
    sink: Captures,
) -> Option<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
    let content_length = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok());
    let chunked = head.contains("transfer-encoding: chunked");

    loop {
        let received = buf.len() - header_end;
        let done = match content_length {
            Some(len) => received >= len,
            None if chunked => buf.ends_with(b"0\r\n\r\n"),
            None => true,
        };
        if done {
            break;
        }
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    // Record before answering so the client never observes a response first
    sink.lock().unwrap().push(CapturedRequest {
        head,
        body: String::from_utf8_lossy(&buf[header_end..]).to_string(),
    });

    let reason = match status {
        200 => "OK",
        201 => "Created",
        409 => "Conflict",
        _ => "Error",
    };
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\n\
         content-type: application/json\r\n\
         content-length: {}\r\n\
         connection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await.ok()?;
    stream.shutdown().await.ok();
    Some(())
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// An address that refuses connections.
fn closed_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

fn config(backend_url: &str, relay_url: &str) -> Config {
    let mut config = Config::default();
    config.backend.base_url = backend_url.to_string();
    config.backend.api_key = "test-key".to_string();
    config.backend.timeout_seconds = Some(5);
    config.relay.endpoint = relay_url.to_string();
    config.relay.recipient = "vendas@example.com".to_string();
    config.relay.cc = Some("gerente@example.com".to_string());
    config.relay.redirect_url = Some("https://site.example/obrigado".to_string());
    config.relay.timeout_seconds = Some(5);
    config.ip_lookup.enabled = false;
    config
}

fn ana() -> LeadSubmission {
    LeadSubmission {
        name: Some("Ana Silva".to_string()),
        email: Some("ana@test.com".to_string()),
        phone: Some("11999999999".to_string()),
        operator: Some("SulAmérica".to_string()),
        subject: None,
        message: Some(String::new()),
    }
}

fn page() -> PageContext {
    PageContext::new("https://site.example/planos").with_user_agent("Mozilla/5.0 (test)")
}

#[tokio::test]
async fn backend_write_carries_credentials_and_pruned_payload() {
    let (backend, backend_hits) =
        spawn_responder(201, r#"[{"id":42,"email":"ana@test.com"}]"#).await;
    let (relay, relay_hits) = spawn_responder(200, "{}").await;
    let submitter = LeadSubmitter::from_config(&config(&backend, &relay)).unwrap();

    let result = submitter.submit_lead(&ana(), &page()).await;

    assert!(result.is_success(), "{result:?}");
    assert_eq!(result.method(), Some(DeliveryMethod::Primary));
    assert!(relay_hits.lock().unwrap().is_empty());

    let request = backend_hits.lock().unwrap()[0].clone();
    assert!(request.head.starts_with("post /rest/v1/leads "));
    assert!(request.head.contains("apikey: test-key"));
    assert!(request.head.contains("authorization: bearer test-key"));
    assert!(request.head.contains("prefer: return=representation"));
    assert!(request.head.contains("content-type: application/json"));

    let payload: serde_json::Value = serde_json::from_str(&request.body).unwrap();
    assert_eq!(payload["operator"], "sulamerica");
    assert_eq!(payload["email"], "ana@test.com");
    assert_eq!(payload["subject"], "Lead do site");
    assert_eq!(payload["status"], "novo");
    assert_eq!(payload["source_page"], "https://site.example/planos");
    for key in ["message", "utm_source", "utm_medium", "utm_campaign", "ip_address"] {
        assert!(payload.get(key).is_none(), "{key} should not be transmitted");
    }
}

#[tokio::test]
async fn duplicate_rejection_skips_relay() {
    let (backend, _) = spawn_responder(
        409,
        r#"{"code":"23505","message":"duplicate key value violates unique constraint"}"#,
    )
    .await;
    let (relay, relay_hits) = spawn_responder(200, "{}").await;
    let submitter = LeadSubmitter::from_config(&config(&backend, &relay)).unwrap();

    let result = submitter.submit_lead(&ana(), &page()).await;

    assert_eq!(result.kind(), Some(FailureKind::Application));
    assert!(result.message().contains("já está cadastrado"));
    assert!(result.technical().unwrap().contains("409"));
    assert!(relay_hits.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unreachable_backend_falls_back_to_relay() {
    let (relay, relay_hits) = spawn_responder(200, r#"{"success":"true"}"#).await;
    let submitter = LeadSubmitter::from_config(&config(&closed_url(), &relay)).unwrap();

    let result = submitter
        .submit_lead(
            &ana(),
            &PageContext::new("https://site.example/?utm_source=instagram&utm_campaign=saude"),
        )
        .await;

    assert!(result.is_success(), "{result:?}");
    assert_eq!(result.method(), Some(DeliveryMethod::Fallback));
    assert!(result.warning().is_some());

    let request = relay_hits.lock().unwrap()[0].clone();
    assert!(request.head.starts_with("post /vendas@example.com "));
    assert!(request.head.contains("multipart/form-data"));
    assert!(request.body.contains("name=\"_subject\""));
    assert!(request.body.contains("Novo Lead: sulamerica - Ana Silva"));
    assert!(request.body.contains("name=\"_captcha\""));
    assert!(request.body.contains("name=\"_cc\""));
    assert!(request.body.contains("name=\"_next\""));
    assert!(request.body.contains("name=\"utm_source\""));
    assert!(request.body.contains("instagram"));
    assert!(!request.body.contains("name=\"utm_medium\""));
}

#[tokio::test]
async fn both_paths_failing_suggests_manual_contact() {
    let (relay, _) = spawn_responder(500, r#"{"message":"relay unavailable"}"#).await;
    let submitter = LeadSubmitter::from_config(&config(&closed_url(), &relay)).unwrap();

    let result = submitter.submit_lead(&ana(), &page()).await;

    assert!(!result.is_success());
    assert_eq!(result.kind(), Some(FailureKind::Delivery));
    assert!(result.action().is_some());
    let technical = result.technical().unwrap();
    assert!(technical.contains("backend"));
    assert!(technical.contains("relay unavailable"));
}

#[tokio::test]
async fn relay_only_mode_never_touches_backend() {
    let (backend, backend_hits) = spawn_responder(201, "[]").await;
    let (relay, relay_hits) = spawn_responder(200, "{}").await;
    let mut config = config(&backend, &relay);
    config.mode = DeliveryMode::RelayOnly;
    let submitter = LeadSubmitter::from_config(&config).unwrap();

    assert_eq!(submitter.channels(), vec!["relay"]);
    let result = submitter.submit_lead(&ana(), &page()).await;

    assert!(result.is_success());
    assert_eq!(result.method(), Some(DeliveryMethod::Primary));
    assert!(backend_hits.lock().unwrap().is_empty());
    assert_eq!(relay_hits.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn client_address_is_recorded_when_lookup_answers() {
    let (backend, backend_hits) = spawn_responder(201, "[]").await;
    let (lookup, _) = spawn_responder(200, r#"{"ip":"203.0.113.9"}"#).await;
    let mut config = config(&backend, &closed_url());
    config.ip_lookup.enabled = true;
    config.ip_lookup.url = lookup;
    let submitter = LeadSubmitter::from_config(&config).unwrap();

    let result = submitter.submit_lead(&ana(), &page()).await;
    assert!(result.is_success());

    let payload: serde_json::Value =
        serde_json::from_str(&backend_hits.lock().unwrap()[0].body).unwrap();
    assert_eq!(payload["ip_address"], "203.0.113.9");
}

#[tokio::test]
async fn failed_lookup_does_not_block_submission() {
    let (backend, backend_hits) = spawn_responder(201, "[]").await;
    let mut config = config(&backend, &closed_url());
    config.ip_lookup.enabled = true;
    config.ip_lookup.url = closed_url();
    config.ip_lookup.timeout_seconds = 1;
    let submitter = LeadSubmitter::from_config(&config).unwrap();

    let result = submitter.submit_lead(&ana(), &page()).await;
    assert!(result.is_success());

    let payload: serde_json::Value =
        serde_json::from_str(&backend_hits.lock().unwrap()[0].body).unwrap();
    assert!(payload.get("ip_address").is_none());
}

#[tokio::test]
async fn fourth_submission_within_window_is_refused() {
    let (backend, backend_hits) = spawn_responder(201, "[]").await;
    let submitter = LeadSubmitter::from_config(&config(&backend, &closed_url())).unwrap();

    let mut allowed = Vec::new();
    for _ in 0..6 {
        let result = submitter.submit_lead(&ana(), &page()).await;
        allowed.push(result.kind() != Some(FailureKind::RateLimited));
    }

    assert_eq!(allowed, vec![true, true, true, false, false, false]);
    assert_eq!(backend_hits.lock().unwrap().len(), 3);
}
