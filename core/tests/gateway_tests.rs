// tests/gateway_tests.rs
mod common;

use common::*;
use sheethub::gateway::paypal::PaymentDetailsResponse;
use sheethub::gateway::{MockOutcome, MockPaymentGateway, PayPalConfig, PayPalGateway};
use sheethub::{GatewayError, GatewayErrorKind, PaymentGateway};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

fn details(json: &str) -> PaymentDetailsResponse {
  serde_json::from_str(json).unwrap()
}

#[test]
fn test_error_kinds() {
  let transient = GatewayError::Transient("reset".to_string());
  let declined = GatewayError::Declined {
    reason: "denied".to_string(),
  };
  let not_found = GatewayError::NotFound {
    reference: "AP-x".to_string(),
  };
  let ambiguous = GatewayError::Ambiguous("pending".to_string());

  assert_eq!(transient.kind(), GatewayErrorKind::Transient);
  assert_eq!(declined.kind(), GatewayErrorKind::Declined);
  assert_eq!(not_found.kind(), GatewayErrorKind::Declined);
  assert_eq!(ambiguous.kind(), GatewayErrorKind::Ambiguous);

  assert!(transient.is_retryable());
  assert!(!declined.is_retryable() && !not_found.is_retryable() && !ambiguous.is_retryable());
  assert!(declined.is_terminal() && not_found.is_terminal());
  assert!(!ambiguous.is_terminal());
}

#[test]
fn test_completed_payment_reports_primary_receiver_amount() {
  let response = details(
    r#"{
      "responseEnvelope": {"ack": "Success"},
      "status": "COMPLETED",
      "payKey": "AP-123",
      "paymentInfoList": {"paymentInfo": [
        {"transactionId": "TX-1", "transactionStatus": "COMPLETED", "receiver": {"amount": "10.00", "primary": "true"}},
        {"transactionId": "TX-2", "transactionStatus": "COMPLETED", "receiver": {"amount": "3.00", "primary": "false"}}
      ]}
    }"#,
  );
  let confirmation = response.into_outcome("AP-123").unwrap();
  assert_eq!(confirmation.reference, "AP-123");
  assert_eq!(confirmation.settled_amount, Some(dollars(1000)));
  assert_eq!(confirmation.transaction_id.as_deref(), Some("TX-1"));
}

#[test]
fn test_completed_payment_sums_receivers_without_primary() {
  let response = details(
    r#"{
      "responseEnvelope": {"ack": "Success"},
      "status": "COMPLETED",
      "paymentInfoList": {"paymentInfo": [
        {"receiver": {"amount": "7.00"}},
        {"receiver": {"amount": "3.00"}}
      ]}
    }"#,
  );
  let confirmation = response.into_outcome("AP-9").unwrap();
  assert_eq!(confirmation.reference, "AP-9");
  assert_eq!(confirmation.settled_amount, Some(dollars(1000)));
  assert_eq!(confirmation.transaction_id, None);
}

#[test]
fn test_processor_statuses_are_classified() {
  let outcome = |status: &str| {
    details(&format!(
      r#"{{"responseEnvelope": {{"ack": "Success"}}, "status": "{}"}}"#,
      status
    ))
    .into_outcome("AP-1")
  };

  for pending in ["CREATED", "PENDING", "PROCESSING", "INCOMPLETE", "", "SOMETHING_NEW"] {
    assert!(
      matches!(outcome(pending), Err(GatewayError::Ambiguous(_))),
      "{} should be ambiguous",
      pending
    );
  }
  for refused in ["ERROR", "EXPIRED", "REVERSALERROR", "DENIED"] {
    assert!(
      matches!(outcome(refused), Err(GatewayError::Declined { .. })),
      "{} should be declined",
      refused
    );
  }
}

#[test]
fn test_failure_envelope_means_unknown_reference() {
  let response = details(
    r#"{
      "responseEnvelope": {"ack": "Failure"},
      "error": [{"errorId": "580022", "message": "The payKey is invalid"}]
    }"#,
  );
  assert_eq!(
    response.into_outcome("AP-bogus"),
    Err(GatewayError::NotFound {
      reference: "AP-bogus".to_string()
    })
  );
}

#[tokio::test]
async fn test_mock_gateway_replays_script() {
  setup_tracing();
  let gateway = MockPaymentGateway::new();
  gateway.script(
    "AP-1",
    vec![
      MockOutcome::Fail(GatewayError::Transient("blip".to_string())),
      MockOutcome::confirmed_for(dollars(500)),
    ],
  );
  gateway.set_default(MockOutcome::Fail(GatewayError::NotFound {
    reference: "unscripted".to_string(),
  }));

  assert!(gateway.confirm("AP-1").await.is_err());
  assert_eq!(gateway.confirm("AP-1").await.unwrap().settled_amount, Some(dollars(500)));
  assert_eq!(gateway.confirm("AP-1").await.unwrap().settled_amount, Some(dollars(500)));
  assert!(matches!(gateway.confirm("AP-2").await, Err(GatewayError::NotFound { .. })));
  assert_eq!(gateway.calls(), 4);
  assert_eq!(gateway.calls_for("AP-1"), 3);
}

/// Serves one canned HTTP response and returns the endpoint URL.
async fn serve_once(status_line: &'static str, body: &'static str) -> String {
  let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
  let address = listener.local_addr().unwrap();
  tokio::spawn(async move {
    let (mut socket, _) = listener.accept().await.unwrap();
    let mut request = Vec::new();
    let mut buffer = [0u8; 4096];
    loop {
      let read = socket.read(&mut buffer).await.unwrap();
      if read == 0 {
        break;
      }
      request.extend_from_slice(&buffer[..read]);
      let text = String::from_utf8_lossy(&request).to_string();
      if let Some(header_end) = text.find("\r\n\r\n") {
        let content_length = text[..header_end]
          .lines()
          .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length").then(|| value.trim().parse::<usize>().ok())?
          })
          .unwrap_or(0);
        if request.len() >= header_end + 4 + content_length {
          break;
        }
      }
    }
    let response = format!(
      "{}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
      status_line,
      body.len(),
      body
    );
    socket.write_all(response.as_bytes()).await.unwrap();
    socket.shutdown().await.ok();
  });
  format!("http://{}/AdaptivePayments/PaymentDetails", address)
}

fn paypal(endpoint: String) -> PayPalGateway {
  PayPalGateway::new(PayPalConfig {
    endpoint,
    user_id: "seller_api1.sheethub.test".to_string(),
    password: "password".to_string(),
    signature: "signature".to_string(),
    app_id: "APP-80W284485P519543T".to_string(),
    timeout: Duration::from_secs(5),
  })
  .unwrap()
}

#[tokio::test]
async fn test_paypal_gateway_confirms_completed_payment() {
  setup_tracing();
  let endpoint = serve_once(
    "HTTP/1.1 200 OK",
    r#"{"responseEnvelope":{"ack":"Success"},"status":"COMPLETED","payKey":"AP-77","paymentInfoList":{"paymentInfo":[{"transactionId":"TX-77","receiver":{"amount":"4.99","primary":"true"}}]}}"#,
  )
  .await;

  let confirmation = paypal(endpoint).confirm("AP-77").await.unwrap();
  assert_eq!(confirmation.settled_amount, Some(dollars(499)));
  assert_eq!(confirmation.transaction_id.as_deref(), Some("TX-77"));
}

#[tokio::test]
async fn test_paypal_gateway_classifies_http_failures() {
  setup_tracing();
  let unavailable = serve_once("HTTP/1.1 503 Service Unavailable", "{}").await;
  assert!(matches!(
    paypal(unavailable).confirm("AP-1").await,
    Err(GatewayError::Transient(_))
  ));

  let rejected = serve_once("HTTP/1.1 400 Bad Request", "{}").await;
  assert!(matches!(
    paypal(rejected).confirm("AP-1").await,
    Err(GatewayError::Declined { .. })
  ));

  let garbled = serve_once("HTTP/1.1 200 OK", "<html>maintenance</html>").await;
  assert!(matches!(
    paypal(garbled).confirm("AP-1").await,
    Err(GatewayError::Ambiguous(_))
  ));
}

#[tokio::test]
async fn test_paypal_gateway_unreachable_is_transient() {
  setup_tracing();
  let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
  let address = listener.local_addr().unwrap();
  drop(listener);

  let endpoint = format!("http://{}/AdaptivePayments/PaymentDetails", address);
  assert!(matches!(
    paypal(endpoint).confirm("AP-1").await,
    Err(GatewayError::Transient(_))
  ));
}
