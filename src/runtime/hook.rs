//! 有界钩子调用
//!
//! Stop 钩子和探针钩子都在有截止时间的上下文中运行：超时后取消传入的 token 并放弃等待，
//! 钩子中的 panic 在这里被捕获并转换为 [`HookError::Panicked`]。

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::error::{HookError, panic_message};

/// 在截止时间内运行钩子
///
/// `parent` 被取消时传入钩子的 token 同样被取消。
pub(crate) async fn bounded<T, F, Fut>(
    hook: &'static str,
    timeout: Duration,
    parent: Option<&CancellationToken>,
    f: F,
) -> Result<T, HookError>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = T>,
{
    let ctx = match parent {
        Some(parent) => parent.child_token(),
        None => CancellationToken::new(),
    };
    let call = AssertUnwindSafe(f(ctx.clone())).catch_unwind();

    let result = match tokio::time::timeout(timeout, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(payload)) => Err(HookError::Panicked {
            hook,
            message: panic_message(payload.as_ref()),
        }),
        Err(_) => Err(HookError::Timeout { hook, timeout }),
    };
    ctx.cancel();
    result
}

/// 不设截止时间，仅捕获 panic
pub(crate) async fn guarded<T, Fut>(hook: &'static str, fut: Fut) -> Result<T, HookError>
where
    Fut: Future<Output = T>,
{
    AssertUnwindSafe(fut)
        .catch_unwind()
        .await
        .map_err(|payload| HookError::Panicked {
            hook,
            message: panic_message(payload.as_ref()),
        })
}
