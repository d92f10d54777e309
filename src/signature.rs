//! 处理签名解析
//!
//! 各传输绑定接受若干种历史遗留的处理方法形态。解析器按照固定优先级逐一检测，
//! 绑定第一个匹配的形态，得到一个规范的 [`Invocation`] 闭包。
//!
//! 解析只在构造 `Service` 时进行一次；没有任何形态匹配时构造直接失败，
//! 不会退化为空操作。

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::error::{BoxError, SignatureError};
use crate::function::Function;

/// 规范调用闭包：`(ctx, 入站数据) -> 出站数据 | 错误`
pub type Invocation<Req, Resp> =
    Arc<dyn Fn(CancellationToken, Req) -> BoxFuture<'static, Result<Resp, BoxError>> + Send + Sync>;

/// 将异步闭包包装为 [`Invocation`]
pub fn invocation<Req, Resp, F, Fut>(f: F) -> Invocation<Req, Resp>
where
    F: Fn(CancellationToken, Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Resp, BoxError>> + Send + 'static,
{
    Arc::new(move |ctx, req| f(ctx, req).boxed())
}

/// 处理方法形态
///
/// 每个传输绑定用一个枚举列出其受支持的形态，`PRIORITY` 给出检测顺序。
pub trait Shape: Copy + std::fmt::Debug + Send + Sync + 'static {
    type Request;
    type Response;

    /// 检测顺序：越具体的形态越靠前
    const PRIORITY: &'static [Self];

    /// 绑定名称，用于错误信息
    const BINDING: &'static str;

    fn name(&self) -> &'static str;
}

/// 解析结果
pub struct Resolution<Req, Resp> {
    /// 匹配到的形态名称
    pub shape: &'static str,
    pub invocation: Invocation<Req, Resp>,
}

impl<Req, Resp> Clone for Resolution<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            shape: self.shape,
            invocation: self.invocation.clone(),
        }
    }
}

impl<Req, Resp> std::fmt::Debug for Resolution<Req, Resp> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolution")
            .field("shape", &self.shape)
            .finish_non_exhaustive()
    }
}

/// 按 `S::PRIORITY` 顺序检测并绑定第一个匹配的形态
pub fn first_match<S, F, P>(
    function: &Arc<F>,
    probe: P,
) -> Result<(S, Invocation<S::Request, S::Response>), SignatureError>
where
    S: Shape,
    F: ?Sized,
    P: Fn(S, &Arc<F>) -> Option<Invocation<S::Request, S::Response>>,
{
    S::PRIORITY
        .iter()
        .find_map(|shape| probe(*shape, function).map(|invocation| (*shape, invocation)))
        .ok_or(SignatureError::Unsupported {
            binding: S::BINDING,
            function: std::any::type_name::<F>(),
        })
}

/// 绑定默认处理器时使用的形态名称
pub const DEFAULT_HANDLER_SHAPE: &str = "DefaultHandler";

/// 静态函数的便捷包装
///
/// 只定义一个处理函数的场景下，直接把 `handler` 字段当作规范调用闭包使用，
/// 不经过形态匹配。
pub struct DefaultHandler<Req, Resp> {
    pub handler: Invocation<Req, Resp>,
}

impl<Req, Resp> DefaultHandler<Req, Resp> {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(CancellationToken, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, BoxError>> + Send + 'static,
    {
        Self {
            handler: invocation(f),
        }
    }
}

/// 先检查函数是否直接提供了规范闭包，否则按形态优先级匹配
pub(crate) fn resolve_with<S, F, P>(
    function: &Arc<F>,
    direct: Option<Invocation<S::Request, S::Response>>,
    probe: P,
) -> Result<Resolution<S::Request, S::Response>, SignatureError>
where
    S: Shape,
    F: ?Sized,
    P: Fn(S, &Arc<F>) -> Option<Invocation<S::Request, S::Response>>,
{
    if let Some(invocation) = direct {
        return Ok(Resolution {
            shape: DEFAULT_HANDLER_SHAPE,
            invocation,
        });
    }
    let (shape, invocation) = first_match(function, probe)?;
    Ok(Resolution {
        shape: shape.name(),
        invocation,
    })
}

impl<Req, Resp> Function for DefaultHandler<Req, Resp>
where
    Req: 'static,
    Resp: 'static,
{
}
