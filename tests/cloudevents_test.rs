//! CloudEvents over HTTP 集成测试

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use flare_func_runtime::cloudevents::{CloudEventFunction, Data, HandleCtxEventReplyErr};
use flare_func_runtime::{
    BoxError, CancellationToken, CloudEventsTransport, DefaultHandler, Event, Function, Service,
};
use http::HeaderMap;
use reqwest::StatusCode;
use serde_json::json;

use common::{spawn, test_config};

/// 对 `ping` 事件回复 `pong`，`fail` 事件返回错误，其余事件不回复
struct PingPong;

#[async_trait]
impl HandleCtxEventReplyErr for PingPong {
    async fn handle(&self, _ctx: CancellationToken, event: Event) -> Result<Option<Event>, BoxError> {
        match event.ty.as_str() {
            "ping" => Ok(Some(
                Event::new(format!("{}-pong", event.id), "test://pingpong", "pong")
                    .with_json(json!({"echo": event.json_data()})),
            )),
            "fail" => Err("cannot handle".into()),
            _ => Ok(None),
        }
    }
}

impl Function for PingPong {}

impl CloudEventFunction for PingPong {
    fn as_ctx_event_reply_err_handler(self: Arc<Self>) -> Option<Arc<dyn HandleCtxEventReplyErr>> {
        Some(self)
    }
}

fn service<F: CloudEventFunction>(function: F) -> Service<CloudEventsTransport> {
    Service::new(function, CloudEventsTransport::new("127.0.0.1:0"))
        .unwrap()
        .with_config(test_config())
}

fn binary_request(client: &reqwest::Client, url: String, id: &str, ty: &str) -> reqwest::RequestBuilder {
    client
        .post(url)
        .header("ce-specversion", "1.0")
        .header("ce-id", id)
        .header("ce-source", "test://client")
        .header("ce-type", ty)
        .header("content-type", "application/json")
        .body(r#"{"n":1}"#)
}

#[tokio::test]
async fn binary_event_reply_is_binary_mode() {
    let running = spawn(service(PingPong)).await;
    let client = reqwest::Client::new();

    let response = binary_request(&client, running.url("/"), "42", "ping")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["ce-type"], "pong");
    assert_eq!(response.headers()["ce-id"], "42-pong");
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body, json!({"echo": {"n": 1}}));

    running.stop().await.unwrap();
}

#[tokio::test]
async fn structured_event_without_reply_is_accepted() {
    let running = spawn(service(PingPong)).await;
    let client = reqwest::Client::new();

    let event = Event::new("7", "test://client", "notify").with_json(json!({"hello": "world"}));
    let response = client
        .post(running.url("/"))
        .header("content-type", "application/cloudevents+json")
        .body(event.to_json().to_string())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert!(response.text().await.unwrap().is_empty());

    running.stop().await.unwrap();
}

#[tokio::test]
async fn undecodable_request_is_400_and_handler_error_is_500() {
    let running = spawn(service(PingPong)).await;
    let client = reqwest::Client::new();

    let response = client.post(running.url("/")).body("not an event").send().await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = binary_request(&client, running.url("/"), "1", "fail").send().await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!response.text().await.unwrap().contains("cannot handle"));

    running.stop().await.unwrap();
}

#[tokio::test]
async fn oversized_event_is_413() {
    let transport = CloudEventsTransport::new("127.0.0.1:0").with_max_event_size(64);
    let service = Service::new(PingPong, transport).unwrap().with_config(test_config());
    let running = spawn(service).await;
    let client = reqwest::Client::new();

    let event = Event::new("big", "test://client", "notify").with_json(json!({"pad": "x".repeat(1024)}));
    let response = client
        .post(running.url("/"))
        .header("content-type", "application/cloudevents+json")
        .body(event.to_json().to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

    let response = binary_request(&client, running.url("/"), "small", "notify")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    running.stop().await.unwrap();
}

#[tokio::test]
async fn default_handler_serves_events() {
    let handler = DefaultHandler::new(|_ctx, event: Event| async move {
        Ok::<_, BoxError>(Some(Event::new(event.id, "test://default", "handled")))
    });
    let running = spawn(service(handler)).await;
    let client = reqwest::Client::new();

    let response = binary_request(&client, running.url("/"), "9", "anything")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["ce-type"], "handled");

    let response = client.get(running.url("/health/readiness")).send().await.unwrap();
    assert_eq!(response.text().await.unwrap(), "READY");

    running.stop().await.unwrap();
}

#[test]
fn http_binary_mode_preserves_extensions_and_data() {
    let event = Event::new("id-1", "test://codec", "codec.check")
        .with_subject("subject-1")
        .with_extension("tenant", "acme")
        .with_binary("application/octet-stream", vec![0u8, 1, 2, 255]);

    let (headers, body) = event.to_http().unwrap();
    assert_eq!(headers["ce-tenant"], "acme");
    assert_eq!(headers["content-type"], "application/octet-stream");

    let decoded = Event::from_http(&headers, body).unwrap();
    assert_eq!(decoded, event);
}

#[test]
fn structured_mode_requires_core_attributes() {
    let missing_type = json!({"specversion": "1.0", "id": "1", "source": "s"});
    assert!(Event::from_json_slice(missing_type.to_string().as_bytes()).is_err());

    let wrong_version = json!({"specversion": "9.9", "id": "1", "source": "s", "type": "t"});
    assert!(Event::from_json_slice(wrong_version.to_string().as_bytes()).is_err());

    let binary = json!({
        "specversion": "1.0", "id": "1", "source": "s", "type": "t",
        "data_base64": "AAEC"
    });
    let event = Event::from_json_slice(binary.to_string().as_bytes()).unwrap();
    assert_eq!(event.data, Some(Data::Binary(vec![0u8, 1, 2].into())));
}

#[test]
fn request_without_event_headers_is_rejected() {
    let err = Event::from_http(&HeaderMap::new(), "{}".into()).unwrap_err();
    assert!(err.to_string().contains("not a cloudevent"));
}
