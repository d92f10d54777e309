//! 健康检查模块
//!
//! 就绪 / 存活探针每次请求都会调用函数实例的钩子（不缓存）。未实现对应角色时
//! 探针总是健康；钩子返回 `false`、返回错误或 panic 都会得到不可用的响应，
//! 但三者在 [`HealthStatus`] 中可以区分。

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tracing::debug;

use crate::error::HookError;
use crate::function::{LivenessReporter, ReadinessReporter, Roles};
use crate::runtime::hook;

/// 就绪探针路径
pub const READINESS_PATH: &str = "/health/readiness";
/// 存活探针路径
pub const LIVENESS_PATH: &str = "/health/liveness";

/// 默认探针超时
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// 健康状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// 健康（或未实现对应角色）
    Serving,
    /// 钩子明确报告未就绪 / 未存活
    NotServing,
    /// 钩子返回错误或超时
    Error(String),
    /// 钩子 panic
    Panicked(String),
}

impl HealthStatus {
    pub fn is_serving(&self) -> bool {
        matches!(self, HealthStatus::Serving)
    }
}

/// 探针类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeKind {
    Readiness,
    Liveness,
}

/// 探针结果，可直接作为 axum 响应返回
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub kind: ProbeKind,
    pub status: HealthStatus,
}

impl IntoResponse for ProbeReport {
    fn into_response(self) -> Response {
        let (ok_body, not_serving, check) = match self.kind {
            ProbeKind::Readiness => ("READY", "function not yet available\n", "readiness"),
            ProbeKind::Liveness => ("ALIVE", "function not alive", "liveness"),
        };
        match self.status {
            HealthStatus::Serving => (StatusCode::OK, ok_body.to_string()),
            HealthStatus::NotServing => (StatusCode::SERVICE_UNAVAILABLE, not_serving.to_string()),
            HealthStatus::Error(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("error checking {check}. {message}"),
            ),
            HealthStatus::Panicked(message) => (
                StatusCode::SERVICE_UNAVAILABLE,
                format!("{check} check panicked: {message}"),
            ),
        }
        .into_response()
    }
}

/// 探针集合
///
/// 由 `Service` 在构造时根据函数实例的角色创建，传给传输层用于提供健康端点。
#[derive(Clone)]
pub struct Probes {
    readiness: Option<Arc<dyn ReadinessReporter>>,
    liveness: Option<Arc<dyn LivenessReporter>>,
    timeout: Duration,
}

impl Probes {
    pub(crate) fn from_roles(roles: &Roles, timeout: Duration) -> Self {
        Self {
            readiness: roles.readiness.clone(),
            liveness: roles.liveness.clone(),
            timeout,
        }
    }

    /// 不带任何探针钩子（总是健康）
    pub fn always_healthy() -> Self {
        Self {
            readiness: None,
            liveness: None,
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// 就绪检查
    pub async fn ready(&self) -> HealthStatus {
        let Some(reporter) = self.readiness.clone() else {
            return HealthStatus::Serving;
        };
        let outcome = hook::bounded("ready", self.timeout, None, |ctx| async move {
            reporter.ready(ctx).await
        })
        .await;
        Self::status("readiness", outcome.and_then(|r| r.map_err(HookError::Ready)))
    }

    /// 存活检查
    pub async fn alive(&self) -> HealthStatus {
        let Some(reporter) = self.liveness.clone() else {
            return HealthStatus::Serving;
        };
        let outcome = hook::bounded("alive", self.timeout, None, |ctx| async move {
            reporter.alive(ctx).await
        })
        .await;
        Self::status("liveness", outcome.and_then(|r| r.map_err(HookError::Alive)))
    }

    fn status(check: &'static str, outcome: Result<bool, HookError>) -> HealthStatus {
        match outcome {
            Ok(true) => HealthStatus::Serving,
            Ok(false) => {
                debug!(check, "function reported not serving");
                HealthStatus::NotServing
            }
            Err(HookError::Panicked { message, .. }) => {
                tracing::error!(check, panic = %message, "probe hook panicked");
                HealthStatus::Panicked(message)
            }
            Err(HookError::Ready(source)) | Err(HookError::Alive(source)) => {
                debug!(check, error = %source, "error checking probe");
                HealthStatus::Error(source.to_string())
            }
            Err(e) => {
                debug!(check, error = %e, "error checking probe");
                HealthStatus::Error(e.to_string())
            }
        }
    }
}

/// 健康检查路由：`/health/readiness` 与 `/health/liveness`
pub fn router(probes: Probes) -> Router {
    Router::new()
        .route(READINESS_PATH, get(readiness))
        .route(LIVENESS_PATH, get(liveness))
        .with_state(probes)
}

async fn readiness(State(probes): State<Probes>) -> ProbeReport {
    ProbeReport {
        kind: ProbeKind::Readiness,
        status: probes.ready().await,
    }
}

async fn liveness(State(probes): State<Probes>) -> ProbeReport {
    ProbeReport {
        kind: ProbeKind::Liveness,
        status: probes.alive().await,
    }
}
