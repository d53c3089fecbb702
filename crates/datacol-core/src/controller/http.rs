//! HTTP client for the stack controller API
//!
//! | operation        | request                                   |
//! |------------------|-------------------------------------------|
//! | app list         | `GET /apps`                               |
//! | app get          | `GET /apps/{name}`                        |
//! | app create       | `POST /apps` `{"name"}`                   |
//! | app delete       | `DELETE /apps/{name}`                     |
//! | app restart      | `POST /apps/{name}/restart`               |
//! | environment get  | `GET /apps/{name}/environment`            |
//! | environment set  | `PUT /apps/{name}/environment` `{"data"}` |
//! | log stream       | `GET /apps/{name}/logs?follow=&since=`    |
//! | process run      | `POST /apps/{name}/processes`             |
//!
//! Requests carry basic auth with the stack API key. Unary calls use the
//! configured timeout; the log stream has none, since a follow stream is
//! expected to stay open until the process is interrupted.

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, trace};

use super::{
    App, CmdResponse, Controller, Environment, LogStream, LogStreamRequest, ProcessRunRequest,
    RemoteError,
};
use crate::config::Config;
use crate::error::{CoreError, Result};
use crate::registry::Auth;

/// User agent string for datacol HTTP requests
const DATACOL_USER_AGENT: &str = concat!("datacol/", env!("CARGO_PKG_VERSION"));

/// Controller client over HTTP
#[derive(Debug, Clone)]
pub struct HttpController {
    http: reqwest::Client,
    base_url: String,
    user: String,
    api_key: String,
    timeout: Duration,
}

#[derive(Deserialize)]
struct AppList {
    #[serde(default)]
    apps: Vec<App>,
}

#[derive(Serialize)]
struct AppCreate<'a> {
    name: &'a str,
}

#[derive(Serialize, Deserialize)]
struct EnvironmentBody<T> {
    data: T,
}

#[derive(Serialize)]
struct ProcessBody<'a> {
    command: &'a [String],
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(alias = "message")]
    error: String,
}

impl HttpController {
    /// Client for the controller described by an auth record
    pub fn from_auth(auth: &Auth, config: &Config) -> Result<Self> {
        Self::new(
            &base_url_for(&auth.api_server),
            &config.api_user,
            &auth.api_key,
            config.request_timeout(),
        )
    }

    pub fn new(base_url: &str, user: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(DATACOL_USER_AGENT)
            .build()
            .map_err(|e| CoreError::RemoteCall {
                operation: "client setup",
                stack: String::new(),
                message: e.to_string(),
            })?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            user: user.to_string(),
            api_key: api_key.to_string(),
            timeout,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        trace!("{} {}", method, url);
        self.http
            .request(method, url)
            .basic_auth(&self.user, Some(&self.api_key))
    }

    fn unary(&self, method: Method, path: &str) -> RequestBuilder {
        self.request(method, path).timeout(self.timeout)
    }

    async fn send(&self, request: RequestBuilder) -> std::result::Result<Response, RemoteError> {
        let response = request.send().await.map_err(transport_error)?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        debug!("Controller returned {}: {}", status, body);
        Err(RemoteError::new(error_message(status, &body)))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> std::result::Result<T, RemoteError> {
        let response = self.send(request).await?;
        response
            .json()
            .await
            .map_err(|e| RemoteError::new(format!("invalid controller response: {e}")))
    }
}

fn app_path(name: &str) -> String {
    format!("/apps/{}", urlencoding::encode(name))
}

/// `10.0.0.1` becomes `http://10.0.0.1`; full URLs are kept
fn base_url_for(api_server: &str) -> String {
    if api_server.starts_with("http://") || api_server.starts_with("https://") {
        api_server.to_string()
    } else {
        format!("http://{api_server}")
    }
}

fn transport_error(error: reqwest::Error) -> RemoteError {
    RemoteError::new(error.to_string())
}

fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        return parsed.error;
    }

    let body = body.trim();
    if body.is_empty() {
        status.to_string()
    } else {
        body.to_string()
    }
}

#[async_trait]
impl Controller for HttpController {
    async fn app_list(&self) -> std::result::Result<Vec<App>, RemoteError> {
        let list: AppList = self.send_json(self.unary(Method::GET, "/apps")).await?;
        Ok(list.apps)
    }

    async fn app_get(&self, name: &str) -> std::result::Result<App, RemoteError> {
        self.send_json(self.unary(Method::GET, &app_path(name)))
            .await
    }

    async fn app_create(&self, name: &str) -> std::result::Result<App, RemoteError> {
        let request = self
            .unary(Method::POST, "/apps")
            .json(&AppCreate { name });
        self.send_json(request).await
    }

    async fn app_delete(&self, name: &str) -> std::result::Result<(), RemoteError> {
        self.send(self.unary(Method::DELETE, &app_path(name)))
            .await
            .map(drop)
    }

    async fn app_restart(&self, name: &str) -> std::result::Result<(), RemoteError> {
        let path = format!("{}/restart", app_path(name));
        self.send(self.unary(Method::POST, &path)).await.map(drop)
    }

    async fn environment_get(&self, name: &str) -> std::result::Result<Environment, RemoteError> {
        let path = format!("{}/environment", app_path(name));
        let body: EnvironmentBody<Environment> =
            self.send_json(self.unary(Method::GET, &path)).await?;
        Ok(body.data)
    }

    async fn environment_set(&self, name: &str, data: &str) -> std::result::Result<(), RemoteError> {
        let path = format!("{}/environment", app_path(name));
        let request = self
            .unary(Method::PUT, &path)
            .json(&EnvironmentBody { data });
        self.send(request).await.map(drop)
    }

    async fn log_stream(
        &self,
        request: &LogStreamRequest,
    ) -> std::result::Result<Box<dyn LogStream>, RemoteError> {
        let path = format!(
            "{}/logs?follow={}&since={}s",
            app_path(&request.name),
            request.follow,
            request.since.as_secs()
        );

        let response = self.send(self.request(Method::GET, &path)).await?;
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(transport_error))
            .boxed();

        Ok(Box::new(HttpLogStream { body: Some(body) }))
    }

    async fn process_run(&self, request: &ProcessRunRequest) -> std::result::Result<CmdResponse, RemoteError> {
        let path = format!("{}/processes", app_path(&request.name));
        let builder = self.unary(Method::POST, &path).json(&ProcessBody {
            command: &request.command,
        });
        self.send_json(builder).await
    }
}

/// Chunked response body read frame by frame
struct HttpLogStream {
    body: Option<BoxStream<'static, std::result::Result<Vec<u8>, RemoteError>>>,
}

#[async_trait]
impl LogStream for HttpLogStream {
    async fn recv(&mut self) -> std::result::Result<Option<Vec<u8>>, RemoteError> {
        match self.body.as_mut() {
            Some(body) => body.next().await.transpose(),
            None => Ok(None),
        }
    }

    async fn close_send(&mut self) {
        // Dropping the body releases the connection
        if self.body.take().is_some() {
            trace!("Closed log stream");
        }
    }
}
