//! 信号处理测试
//!
//! 信号作用于整个进程，因此单独放在一个测试二进制中，并且只有一个测试用例。

#![cfg(target_os = "linux")]

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use flare_func_runtime::http::{HandleRequest, HttpFunction};
use flare_func_runtime::{
    BoxError, CancellationToken, Config, Function, HttpTransport, Service, ServiceState, Starter,
};
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;

use common::{Journal, test_config};

/// 只实现 Start 钩子
#[derive(Default)]
struct StartOnly {
    journal: Journal,
}

#[async_trait]
impl Starter for StartOnly {
    async fn start(&self, _ctx: CancellationToken, _config: Config) -> Result<(), BoxError> {
        self.journal.record("start");
        Ok(())
    }
}

#[async_trait]
impl HandleRequest for StartOnly {
    async fn handle(&self, _request: Request) -> Result<Response, BoxError> {
        Ok("ok".into_response())
    }
}

impl Function for StartOnly {
    fn as_starter(self: Arc<Self>) -> Option<Arc<dyn Starter>> {
        Some(self)
    }
}

impl HttpFunction for StartOnly {
    fn as_request_handler(self: Arc<Self>) -> Option<Arc<dyn HandleRequest>> {
        Some(self)
    }
}

#[tokio::test]
async fn sigterm_stops_cleanly_and_sigurg_is_ignored() {
    let function = StartOnly::default();
    let journal = function.journal.clone();
    let service = Service::new(function, HttpTransport::new("127.0.0.1:0"))
        .unwrap()
        .with_config(test_config().with_signal_handling(true));
    let capabilities = service.capabilities();
    assert!(capabilities.implements_start);
    assert!(!capabilities.implements_stop);

    let mut status = service.status();
    let task = tokio::spawn(service.start(CancellationToken::new()));

    status
        .wait_for(|s| s.state == ServiceState::Serving)
        .await
        .unwrap();
    journal.wait_for("start").await;

    kill(Pid::this(), Signal::SIGURG).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!task.is_finished(), "SIGURG must not stop the function");
    assert_eq!(status.borrow().state, ServiceState::Serving);

    kill(Pid::this(), Signal::SIGTERM).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(10), task)
        .await
        .expect("function did not stop after SIGTERM")
        .unwrap();

    assert!(result.is_ok(), "unexpected result: {result:?}");
    assert_eq!(journal.count("start"), 1);
    assert_eq!(status.borrow().state, ServiceState::Stopped);
}
