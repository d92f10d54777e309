//! HTTP 传输层
//!
//! axum 服务器：健康检查路由 + 其余所有请求转发给函数。

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::error::{SignatureError, TransportError};
use crate::health;
use crate::http::HttpFunction;
use crate::signature::Resolution;
use crate::transport::{Binding, Dispatch, DispatchError, Transport};

/// HTTP 传输层
pub struct HttpTransport {
    address: String,
    listener: Option<TcpListener>,
}

impl HttpTransport {
    /// `address` 为 `host:port`，端口为 0 时由系统分配
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            listener: None,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl Transport for HttpTransport {
    type Request = Request;
    type Response = Response;

    fn name(&self) -> &'static str {
        "http"
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
        dispatch: Dispatch<Request, Response>,
        shutdown: CancellationToken,
    ) -> Result<(), TransportError> {
        let listener = self.listener.ok_or(TransportError::NotBound)?;
        let router = health::router(dispatch.probes().clone()).merge(
            Router::new()
                .fallback(dispatch_request)
                .with_state(dispatch),
        );
        serve_router(listener, router, shutdown, "http").await
    }
}

impl<F: HttpFunction> Binding<F> for HttpTransport {
    fn resolve(function: &Arc<F>) -> Result<Resolution<Request, Response>, SignatureError> {
        crate::http::resolve(function)
    }
}

async fn dispatch_request(
    State(dispatch): State<Dispatch<Request, Response>>,
    request: Request,
) -> Response {
    let ctx = CancellationToken::new();
    let _guard = ctx.clone().drop_guard();
    match dispatch.call(ctx, request).await {
        Ok(response) => response,
        Err(e) => dispatch_error_response(e),
    }
}

/// 调度失败时的 HTTP 响应
pub(crate) fn dispatch_error_response(e: DispatchError) -> Response {
    match e {
        DispatchError::Closed => {
            (StatusCode::SERVICE_UNAVAILABLE, "function is shutting down").into_response()
        }
        DispatchError::Failed(e) => {
            error!(error = %e, "function returned error");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
        }
        DispatchError::Panicked(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
        }
    }
}

pub(crate) async fn bind_listener(address: &str) -> Result<TcpListener, TransportError> {
    let listener = TcpListener::bind(address)
        .await
        .map_err(|source| TransportError::Bind {
            address: address.to_string(),
            source,
        })?;
    if let Ok(local) = listener.local_addr() {
        info!(address = %local, "HTTP listener bound");
    }
    Ok(listener)
}

/// 运行 axum 服务器直到 `shutdown` 被取消，并等待在途请求完成
pub(crate) async fn serve_router(
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
    transport: &'static str,
) -> Result<(), TransportError> {
    let app = router.layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| TransportError::Serve {
            transport,
            source: Box::new(e),
        })
}
