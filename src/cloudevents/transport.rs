//! CloudEvents over HTTP 传输层
//!
//! 入站请求按结构化或二进制模式解码为事件（失败响应 400，超过大小限制响应 413）。
//! 函数返回事件时以二进制模式回复，否则响应 `202 Accepted`、空消息体。

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::cloudevents::{CloudEventFunction, Event};
use crate::error::{SignatureError, TransportError};
use crate::health;
use crate::http::{bind_listener, dispatch_error_response, serve_router};
use crate::signature::Resolution;
use crate::transport::{Binding, Dispatch, Transport};

/// 单个事件的默认最大字节数
pub const MAX_EVENT_SIZE: usize = 10 * 1024 * 1024;

/// CloudEvents over HTTP 传输层
pub struct CloudEventsTransport {
    address: String,
    max_event_size: usize,
    listener: Option<TcpListener>,
}

impl CloudEventsTransport {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            max_event_size: MAX_EVENT_SIZE,
            listener: None,
        }
    }

    /// 设置单个事件的最大字节数
    pub fn with_max_event_size(mut self, bytes: usize) -> Self {
        self.max_event_size = bytes;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl Transport for CloudEventsTransport {
    type Request = Event;
    type Response = Option<Event>;

    fn name(&self) -> &'static str {
        "cloudevents"
    }

    async fn bind(&mut self) -> Result<(), TransportError> {
        self.listener = Some(bind_listener(&self.address).await?);
        Ok(())
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    async fn serve(
        self,
        dispatch: Dispatch<Event, Option<Event>>,
        shutdown: CancellationToken,
    ) -> Result<(), TransportError> {
        let listener = self.listener.ok_or(TransportError::NotBound)?;
        let router = health::router(dispatch.probes().clone()).merge(
            Router::new()
                .fallback(receive_event)
                .with_state(dispatch)
                .layer(DefaultBodyLimit::max(self.max_event_size)),
        );
        serve_router(listener, router, shutdown, "cloudevents").await
    }
}

impl<F: CloudEventFunction> Binding<F> for CloudEventsTransport {
    fn resolve(function: &Arc<F>) -> Result<Resolution<Event, Option<Event>>, SignatureError> {
        crate::cloudevents::resolve(function)
    }
}

async fn receive_event(
    State(dispatch): State<Dispatch<Event, Option<Event>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let event = match Event::from_http(&headers, body) {
        Ok(event) => event,
        Err(e) => {
            debug!(error = %e, "failed to decode cloudevent");
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    let ctx = CancellationToken::new();
    let _guard = ctx.clone().drop_guard();
    match dispatch.call(ctx, event).await {
        Ok(Some(reply)) => reply_response(&reply),
        Ok(None) => StatusCode::ACCEPTED.into_response(),
        Err(e) => dispatch_error_response(e),
    }
}

fn reply_response(reply: &Event) -> Response {
    match reply.to_http() {
        Ok((headers, body)) => {
            let mut response = Response::new(Body::from(body));
            *response.headers_mut() = headers;
            response
        }
        Err(e) => {
            error!(error = %e, "failed to encode reply event");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
        }
    }
}
