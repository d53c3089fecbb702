//! Gateway facade over a stack's controller
//!
//! Every unary call is forwarded once, with no retries; a failure comes back
//! as [`CoreError::RemoteCall`] carrying the operation name, the stack name
//! and the controller's message verbatim.

use std::io::Write;
use std::time::Duration;
use tracing::{debug, trace};

use super::{
    App, CmdResponse, Controller, Environment, LogStream, LogStreamRequest, ProcessRunRequest,
    RemoteError,
};
use crate::error::{CoreError, Result};

/// Local entry point for remote app, environment, process and log operations
pub struct Gateway {
    controller: Box<dyn Controller>,
    stack: String,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("stack", &self.stack)
            .finish_non_exhaustive()
    }
}

impl Gateway {
    pub fn new(controller: Box<dyn Controller>, stack: impl Into<String>) -> Self {
        Self {
            controller,
            stack: stack.into(),
        }
    }

    pub fn stack(&self) -> &str {
        &self.stack
    }

    pub async fn list_apps(&self) -> Result<Vec<App>> {
        self.controller
            .app_list()
            .await
            .map_err(|e| self.remote("app list", e))
    }

    pub async fn get_app(&self, name: &str) -> Result<App> {
        self.controller
            .app_get(name)
            .await
            .map_err(|e| self.remote("app get", e))
    }

    pub async fn create_app(&self, name: &str) -> Result<App> {
        self.controller
            .app_create(name)
            .await
            .map_err(|e| self.remote("app create", e))
    }

    pub async fn delete_app(&self, name: &str) -> Result<()> {
        self.controller
            .app_delete(name)
            .await
            .map_err(|e| self.remote("app delete", e))
    }

    pub async fn restart_app(&self, name: &str) -> Result<()> {
        self.controller
            .app_restart(name)
            .await
            .map_err(|e| self.remote("app restart", e))
    }

    pub async fn get_environment(&self, name: &str) -> Result<Environment> {
        self.controller
            .environment_get(name)
            .await
            .map_err(|e| self.remote("environment get", e))
    }

    /// Replace the environment of `name` with `data` (`KEY=VALUE` lines)
    pub async fn set_environment(&self, name: &str, data: &str) -> Result<()> {
        self.controller
            .environment_set(name, data)
            .await
            .map_err(|e| self.remote("environment set", e))
    }

    pub async fn run_process(&self, name: &str, args: &[String]) -> Result<CmdResponse> {
        let request = ProcessRunRequest {
            name: name.to_string(),
            command: args.to_vec(),
        };
        self.controller
            .process_run(&request)
            .await
            .map_err(|e| self.remote("process run", e))
    }

    /// Relay the log stream of `name` into `sink` until the stream ends
    ///
    /// Frames are written in arrival order, one write and flush per frame,
    /// before the next frame is requested. A clean end-of-stream returns
    /// `Ok`; any other receive error is returned after whatever arrived
    /// before it has been written. The send side is half-closed on every
    /// exit path. With `follow` set this only returns when the controller
    /// ends the stream or the process is interrupted.
    pub async fn stream_app_logs<W: Write>(
        &self,
        name: &str,
        follow: bool,
        since: Duration,
        sink: &mut W,
    ) -> Result<()> {
        let request = LogStreamRequest {
            name: name.to_string(),
            since,
            follow,
        };
        debug!(
            "Streaming logs for {} on stack {} (follow: {}, since: {:?})",
            name, self.stack, follow, since
        );

        let mut stream = self
            .controller
            .log_stream(&request)
            .await
            .map_err(|e| self.remote("log stream", e))?;

        let result = self.relay(stream.as_mut(), sink).await;
        stream.close_send().await;
        result
    }

    async fn relay<W: Write>(&self, stream: &mut dyn LogStream, sink: &mut W) -> Result<()> {
        loop {
            let chunk = match stream.recv().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => return Ok(()),
                Err(e) => return Err(self.remote("log stream", e)),
            };

            trace!("Relaying {} byte log frame", chunk.len());
            sink.write_all(&chunk)
                .and_then(|()| sink.flush())
                .map_err(|source| CoreError::Output {
                    context: "log stream".to_string(),
                    source,
                })?;
        }
    }

    fn remote(&self, operation: &'static str, error: RemoteError) -> CoreError {
        CoreError::RemoteCall {
            operation,
            stack: self.stack.clone(),
            message: error.message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    /// Scripted stream: yields each item in order, then end-of-stream
    struct ScriptedStream {
        frames: VecDeque<std::result::Result<Vec<u8>, RemoteError>>,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl LogStream for ScriptedStream {
        async fn recv(&mut self) -> std::result::Result<Option<Vec<u8>>, RemoteError> {
            self.frames.pop_front().transpose()
        }

        async fn close_send(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct FakeController {
        frames: Mutex<Vec<std::result::Result<Vec<u8>, RemoteError>>>,
        closed: Arc<AtomicBool>,
        requests: Arc<Mutex<Vec<LogStreamRequest>>>,
        fail_unary: Option<String>,
    }

    impl FakeController {
        fn check(&self) -> std::result::Result<(), RemoteError> {
            match &self.fail_unary {
                Some(message) => Err(RemoteError::new(message.clone())),
                None => Ok(()),
            }
        }
    }

    fn app(name: &str) -> App {
        App {
            name: name.to_string(),
            status: Some("running".to_string()),
            endpoint: None,
            release_id: None,
            extra: serde_json::Map::new(),
        }
    }

    #[async_trait]
    impl Controller for FakeController {
        async fn app_list(&self) -> std::result::Result<Vec<App>, RemoteError> {
            self.check()?;
            Ok(vec![app("web"), app("worker")])
        }
        async fn app_get(&self, name: &str) -> std::result::Result<App, RemoteError> {
            self.check()?;
            Ok(app(name))
        }
        async fn app_create(&self, name: &str) -> std::result::Result<App, RemoteError> {
            self.check()?;
            Ok(app(name))
        }
        async fn app_delete(&self, _name: &str) -> std::result::Result<(), RemoteError> {
            self.check()
        }
        async fn app_restart(&self, _name: &str) -> std::result::Result<(), RemoteError> {
            self.check()
        }
        async fn environment_get(
            &self,
            _name: &str,
        ) -> std::result::Result<Environment, RemoteError> {
            self.check()?;
            Ok(Environment::from([("PORT".to_string(), "8080".to_string())]))
        }
        async fn environment_set(
            &self,
            _name: &str,
            _data: &str,
        ) -> std::result::Result<(), RemoteError> {
            self.check()
        }
        async fn log_stream(
            &self,
            request: &LogStreamRequest,
        ) -> std::result::Result<Box<dyn LogStream>, RemoteError> {
            self.requests.lock().unwrap().push(request.clone());
            let frames = std::mem::take(&mut *self.frames.lock().unwrap());
            Ok(Box::new(ScriptedStream {
                frames: frames.into(),
                closed: self.closed.clone(),
            }))
        }
        async fn process_run(
            &self,
            request: &ProcessRunRequest,
        ) -> std::result::Result<CmdResponse, RemoteError> {
            self.check()?;
            Ok(CmdResponse {
                exit_code: 0,
                stdout: request.command.join(" "),
                stderr: String::new(),
                extra: serde_json::Map::new(),
            })
        }
    }

    fn gateway_with_frames(
        frames: Vec<std::result::Result<Vec<u8>, RemoteError>>,
    ) -> (Gateway, Arc<AtomicBool>) {
        let controller = FakeController {
            frames: Mutex::new(frames),
            ..FakeController::default()
        };
        let closed = controller.closed.clone();
        (Gateway::new(Box::new(controller), "demo"), closed)
    }

    #[tokio::test]
    async fn test_stream_writes_frames_in_order() {
        let (gateway, closed) = gateway_with_frames(vec![
            Ok(b"b1 ".to_vec()),
            Ok(b"b2 ".to_vec()),
            Ok(b"b3".to_vec()),
        ]);

        let mut sink = Vec::new();
        gateway
            .stream_app_logs("web", false, Duration::from_secs(120), &mut sink)
            .await
            .unwrap();

        assert_eq!(sink, b"b1 b2 b3");
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_stream_error_after_first_frame() {
        let (gateway, closed) = gateway_with_frames(vec![
            Ok(b"b1".to_vec()),
            Err(RemoteError::new("transport is closing")),
            Ok(b"never".to_vec()),
        ]);

        let mut sink = Vec::new();
        let err = gateway
            .stream_app_logs("web", true, Duration::from_secs(60), &mut sink)
            .await
            .unwrap_err();

        assert_eq!(sink, b"b1");
        assert!(err.is_remote());
        assert!(err.to_string().contains("transport is closing"));
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_stream_request_parameters() {
        let controller = FakeController::default();
        let requests = controller.requests.clone();
        let gateway = Gateway::new(Box::new(controller), "demo");

        let mut sink = Vec::new();
        gateway
            .stream_app_logs("web", true, Duration::from_secs(600), &mut sink)
            .await
            .unwrap();
        assert!(sink.is_empty());
        assert_eq!(
            requests.lock().unwrap().as_slice(),
            &[LogStreamRequest {
                name: "web".to_string(),
                since: Duration::from_secs(600),
                follow: true,
            }]
        );
    }

    #[tokio::test]
    async fn test_unary_errors_are_tagged() {
        let controller = FakeController {
            fail_unary: Some("app not found".to_string()),
            ..FakeController::default()
        };
        let gateway = Gateway::new(Box::new(controller), "demo");

        let err = gateway.restart_app("web").await.unwrap_err();
        match err {
            CoreError::RemoteCall {
                operation,
                stack,
                message,
            } => {
                assert_eq!(operation, "app restart");
                assert_eq!(stack, "demo");
                assert_eq!(message, "app not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unary_calls_pass_through() {
        let gateway = Gateway::new(Box::new(FakeController::default()), "demo");

        let apps = gateway.list_apps().await.unwrap();
        assert_eq!(apps.len(), 2);
        assert_eq!(gateway.get_app("web").await.unwrap().name, "web");
        assert_eq!(gateway.get_environment("web").await.unwrap()["PORT"], "8080");

        let response = gateway
            .run_process("web", &["rake".to_string(), "db:migrate".to_string()])
            .await
            .unwrap();
        assert_eq!(response.stdout, "rake db:migrate");
    }
}
