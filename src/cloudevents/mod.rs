//! CloudEvents 绑定
//!
//! 受支持的处理形态共 12 种：可选的 ctx 参数 × 可选的事件参数 × 返回值
//! （无 / 仅错误 / 仅事件 / 事件与错误），返回事件的形态总是接收事件。
//! 解析器按下面的固定顺序检测，绑定第一个匹配的形态：
//!
//! | 顺序 | trait | 签名 |
//! |------|-------|------|
//! | 1 | [`HandleCtxEventReplyErr`] | `(ctx, event) -> Result<Option<Event>>` |
//! | 2 | [`HandleEventReplyErr`] | `(event) -> Result<Option<Event>>` |
//! | 3 | [`HandleCtxEventReply`] | `(ctx, event) -> Option<Event>` |
//! | 4 | [`HandleEventReply`] | `(event) -> Option<Event>` |
//! | 5 | [`HandleCtxEventErr`] | `(ctx, event) -> Result<()>` |
//! | 6 | [`HandleEventErr`] | `(event) -> Result<()>` |
//! | 7 | [`HandleCtxEvent`] | `(ctx, event)` |
//! | 8 | [`HandleEvent`] | `(event)` |
//! | 9 | [`HandleCtxErr`] | `(ctx) -> Result<()>` |
//! | 10 | [`HandleCtx`] | `(ctx)` |
//! | 11 | [`HandleErr`] | `() -> Result<()>` |
//! | 12 | [`Handle`] | `()` |
//!
//! 规范闭包统一为 `(ctx, Event) -> Result<Option<Event>, BoxError>`。

pub mod event;
mod transport;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{BoxError, Result, SignatureError};
use crate::function::Function;
use crate::runtime::{RuntimeConfig, Service};
use crate::signature::{self, DefaultHandler, Invocation, Resolution, Shape, invocation};

pub use event::{Data, Event, EventError};
pub use transport::{CloudEventsTransport, MAX_EVENT_SIZE};

/// CloudEvents 规范调用闭包
pub type EventInvocation = Invocation<Event, Option<Event>>;

#[async_trait]
pub trait HandleCtxEventReplyErr: Send + Sync {
    async fn handle(&self, ctx: CancellationToken, event: Event) -> Result<Option<Event>, BoxError>;
}

#[async_trait]
pub trait HandleEventReplyErr: Send + Sync {
    async fn handle(&self, event: Event) -> Result<Option<Event>, BoxError>;
}

#[async_trait]
pub trait HandleCtxEventReply: Send + Sync {
    async fn handle(&self, ctx: CancellationToken, event: Event) -> Option<Event>;
}

#[async_trait]
pub trait HandleEventReply: Send + Sync {
    async fn handle(&self, event: Event) -> Option<Event>;
}

#[async_trait]
pub trait HandleCtxEventErr: Send + Sync {
    async fn handle(&self, ctx: CancellationToken, event: Event) -> Result<(), BoxError>;
}

#[async_trait]
pub trait HandleEventErr: Send + Sync {
    async fn handle(&self, event: Event) -> Result<(), BoxError>;
}

#[async_trait]
pub trait HandleCtxEvent: Send + Sync {
    async fn handle(&self, ctx: CancellationToken, event: Event);
}

#[async_trait]
pub trait HandleEvent: Send + Sync {
    async fn handle(&self, event: Event);
}

#[async_trait]
pub trait HandleCtxErr: Send + Sync {
    async fn handle(&self, ctx: CancellationToken) -> Result<(), BoxError>;
}

#[async_trait]
pub trait HandleCtx: Send + Sync {
    async fn handle(&self, ctx: CancellationToken);
}

#[async_trait]
pub trait HandleErr: Send + Sync {
    async fn handle(&self) -> Result<(), BoxError>;
}

#[async_trait]
pub trait Handle: Send + Sync {
    async fn handle(&self);
}

/// 处理 CloudEvents 的函数
///
/// 实现某个处理 trait 后覆盖对应的访问器返回 `Some(self)`。
pub trait CloudEventFunction: Function {
    fn as_ctx_event_reply_err_handler(self: Arc<Self>) -> Option<Arc<dyn HandleCtxEventReplyErr>> {
        None
    }

    fn as_event_reply_err_handler(self: Arc<Self>) -> Option<Arc<dyn HandleEventReplyErr>> {
        None
    }

    fn as_ctx_event_reply_handler(self: Arc<Self>) -> Option<Arc<dyn HandleCtxEventReply>> {
        None
    }

    fn as_event_reply_handler(self: Arc<Self>) -> Option<Arc<dyn HandleEventReply>> {
        None
    }

    fn as_ctx_event_err_handler(self: Arc<Self>) -> Option<Arc<dyn HandleCtxEventErr>> {
        None
    }

    fn as_event_err_handler(self: Arc<Self>) -> Option<Arc<dyn HandleEventErr>> {
        None
    }

    fn as_ctx_event_handler(self: Arc<Self>) -> Option<Arc<dyn HandleCtxEvent>> {
        None
    }

    fn as_event_handler(self: Arc<Self>) -> Option<Arc<dyn HandleEvent>> {
        None
    }

    fn as_ctx_err_handler(self: Arc<Self>) -> Option<Arc<dyn HandleCtxErr>> {
        None
    }

    fn as_ctx_handler(self: Arc<Self>) -> Option<Arc<dyn HandleCtx>> {
        None
    }

    fn as_err_handler(self: Arc<Self>) -> Option<Arc<dyn HandleErr>> {
        None
    }

    fn as_handler(self: Arc<Self>) -> Option<Arc<dyn Handle>> {
        None
    }

    /// 直接提供规范闭包（[`DefaultHandler`]）
    fn as_invocation(self: Arc<Self>) -> Option<EventInvocation> {
        None
    }
}

impl CloudEventFunction for DefaultHandler<Event, Option<Event>> {
    fn as_invocation(self: Arc<Self>) -> Option<EventInvocation> {
        Some(self.handler.clone())
    }
}

/// CloudEvents 处理形态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudEventShape {
    CtxEventReplyErr,
    EventReplyErr,
    CtxEventReply,
    EventReply,
    CtxEventErr,
    EventErr,
    CtxEvent,
    Event,
    CtxErr,
    Ctx,
    Err,
    Unit,
}

impl Shape for CloudEventShape {
    type Request = Event;
    type Response = Option<Event>;

    const PRIORITY: &'static [Self] = &[
        CloudEventShape::CtxEventReplyErr,
        CloudEventShape::EventReplyErr,
        CloudEventShape::CtxEventReply,
        CloudEventShape::EventReply,
        CloudEventShape::CtxEventErr,
        CloudEventShape::EventErr,
        CloudEventShape::CtxEvent,
        CloudEventShape::Event,
        CloudEventShape::CtxErr,
        CloudEventShape::Ctx,
        CloudEventShape::Err,
        CloudEventShape::Unit,
    ];
    const BINDING: &'static str = "cloudevents";

    fn name(&self) -> &'static str {
        match self {
            CloudEventShape::CtxEventReplyErr => "HandleCtxEventReplyErr",
            CloudEventShape::EventReplyErr => "HandleEventReplyErr",
            CloudEventShape::CtxEventReply => "HandleCtxEventReply",
            CloudEventShape::EventReply => "HandleEventReply",
            CloudEventShape::CtxEventErr => "HandleCtxEventErr",
            CloudEventShape::EventErr => "HandleEventErr",
            CloudEventShape::CtxEvent => "HandleCtxEvent",
            CloudEventShape::Event => "HandleEvent",
            CloudEventShape::CtxErr => "HandleCtxErr",
            CloudEventShape::Ctx => "HandleCtx",
            CloudEventShape::Err => "HandleErr",
            CloudEventShape::Unit => "Handle",
        }
    }
}

/// 解析函数实例的 CloudEvents 处理签名
pub fn resolve<F: CloudEventFunction>(
    function: &Arc<F>,
) -> Result<Resolution<Event, Option<Event>>, SignatureError> {
    signature::resolve_with::<CloudEventShape, _, _>(function, function.clone().as_invocation(), probe)
}

macro_rules! bind {
    ($function:expr, $accessor:ident, |$handler:ident, $ctx:ident, $event:ident| $body:expr) => {
        $function.clone().$accessor().map(|$handler| {
            invocation(move |$ctx: CancellationToken, $event: Event| {
                let $handler = $handler.clone();
                async move { $body }
            })
        })
    };
}

fn probe<F: CloudEventFunction>(shape: CloudEventShape, function: &Arc<F>) -> Option<EventInvocation> {
    match shape {
        CloudEventShape::CtxEventReplyErr => bind!(function, as_ctx_event_reply_err_handler, |h, ctx, event| {
            h.handle(ctx, event).await
        }),
        CloudEventShape::EventReplyErr => bind!(function, as_event_reply_err_handler, |h, _ctx, event| {
            h.handle(event).await
        }),
        CloudEventShape::CtxEventReply => bind!(function, as_ctx_event_reply_handler, |h, ctx, event| {
            Ok(h.handle(ctx, event).await)
        }),
        CloudEventShape::EventReply => bind!(function, as_event_reply_handler, |h, _ctx, event| {
            Ok(h.handle(event).await)
        }),
        CloudEventShape::CtxEventErr => bind!(function, as_ctx_event_err_handler, |h, ctx, event| {
            h.handle(ctx, event).await.map(|()| None)
        }),
        CloudEventShape::EventErr => bind!(function, as_event_err_handler, |h, _ctx, event| {
            h.handle(event).await.map(|()| None)
        }),
        CloudEventShape::CtxEvent => bind!(function, as_ctx_event_handler, |h, ctx, event| {
            h.handle(ctx, event).await;
            Ok(None)
        }),
        CloudEventShape::Event => bind!(function, as_event_handler, |h, _ctx, event| {
            h.handle(event).await;
            Ok(None)
        }),
        CloudEventShape::CtxErr => bind!(function, as_ctx_err_handler, |h, ctx, _event| {
            h.handle(ctx).await.map(|()| None)
        }),
        CloudEventShape::Ctx => bind!(function, as_ctx_handler, |h, ctx, _event| {
            h.handle(ctx).await;
            Ok(None)
        }),
        CloudEventShape::Err => bind!(function, as_err_handler, |h, _ctx, _event| {
            h.handle().await.map(|()| None)
        }),
        CloudEventShape::Unit => bind!(function, as_handler, |h, _ctx, _event| {
            h.handle().await;
            Ok(None)
        }),
    }
}

/// 使用环境变量配置，以 CloudEvents（HTTP）服务形式运行函数直到收到停止信号
pub async fn start<F: CloudEventFunction>(function: F) -> Result<()> {
    let config = RuntimeConfig::from_env()?;
    let transport = CloudEventsTransport::new(config.listen_address.clone());
    Service::new(function, transport)?
        .with_config(config)
        .start(CancellationToken::new())
        .await
}
