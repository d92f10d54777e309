//! HTTP 请求 / 响应绑定
//!
//! 受支持的处理形态（按检测顺序）：
//! 1. [`HandleCtxRequest`]：`(ctx, request) -> response`
//! 2. [`HandleRequest`]：`request -> response`
//!
//! 另外 [`DefaultHandler`] 直接提供规范闭包，不经过形态匹配。
//! 处理函数返回错误或 panic 时响应 500。

mod transport;

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::Request;
use axum::response::Response;
use tokio_util::sync::CancellationToken;

use crate::error::{BoxError, Result, SignatureError};
use crate::function::Function;
use crate::runtime::{RuntimeConfig, Service};
use crate::signature::{self, DefaultHandler, Invocation, Resolution, Shape, invocation};

pub use transport::HttpTransport;
pub(crate) use transport::{bind_listener, dispatch_error_response, serve_router};

/// HTTP 规范调用闭包
pub type HttpInvocation = Invocation<Request, Response>;

/// `(ctx, request) -> response`
#[async_trait]
pub trait HandleCtxRequest: Send + Sync {
    async fn handle(&self, ctx: CancellationToken, request: Request) -> Result<Response, BoxError>;
}

/// `request -> response`
#[async_trait]
pub trait HandleRequest: Send + Sync {
    async fn handle(&self, request: Request) -> Result<Response, BoxError>;
}

/// 通过 HTTP 提供服务的函数
pub trait HttpFunction: Function {
    fn as_ctx_request_handler(self: Arc<Self>) -> Option<Arc<dyn HandleCtxRequest>> {
        None
    }

    fn as_request_handler(self: Arc<Self>) -> Option<Arc<dyn HandleRequest>> {
        None
    }

    /// 直接提供规范闭包（[`DefaultHandler`]）
    fn as_invocation(self: Arc<Self>) -> Option<HttpInvocation> {
        None
    }
}

impl HttpFunction for DefaultHandler<Request, Response> {
    fn as_invocation(self: Arc<Self>) -> Option<HttpInvocation> {
        Some(self.handler.clone())
    }
}

/// HTTP 处理形态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpShape {
    CtxRequest,
    Request,
}

impl Shape for HttpShape {
    type Request = Request;
    type Response = Response;

    const PRIORITY: &'static [Self] = &[HttpShape::CtxRequest, HttpShape::Request];
    const BINDING: &'static str = "http";

    fn name(&self) -> &'static str {
        match self {
            HttpShape::CtxRequest => "HandleCtxRequest",
            HttpShape::Request => "HandleRequest",
        }
    }
}

/// 解析函数实例的 HTTP 处理签名
pub fn resolve<F: HttpFunction>(function: &Arc<F>) -> Result<Resolution<Request, Response>, SignatureError> {
    signature::resolve_with::<HttpShape, _, _>(function, function.clone().as_invocation(), probe)
}

fn probe<F: HttpFunction>(shape: HttpShape, function: &Arc<F>) -> Option<HttpInvocation> {
    match shape {
        HttpShape::CtxRequest => function.clone().as_ctx_request_handler().map(|handler| {
            invocation(move |ctx, request| {
                let handler = handler.clone();
                async move { handler.handle(ctx, request).await }
            })
        }),
        HttpShape::Request => function.clone().as_request_handler().map(|handler| {
            invocation(move |_ctx, request| {
                let handler = handler.clone();
                async move { handler.handle(request).await }
            })
        }),
    }
}

/// 使用环境变量配置，以 HTTP 服务形式运行函数直到收到停止信号
pub async fn start<F: HttpFunction>(function: F) -> Result<()> {
    let config = RuntimeConfig::from_env()?;
    let transport = HttpTransport::new(config.listen_address.clone());
    Service::new(function, transport)?
        .with_config(config)
        .start(CancellationToken::new())
        .await
}
