use crate::bootstrap::Ready;
use crate::dispatch;
use crate::engine::{CancelToken, Engine, InvocationContext, RawEvent};
use anyhow::Context;
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, CONTENT_TYPE, USER_AGENT};
use std::time::Duration;

pub const RUNTIME_API_ENV: &str = "AWS_LAMBDA_RUNTIME_API";
pub const RUNTIME_API_VERSION: &str = "2018-06-01";

const REQUEST_ID_HEADER: &str = "lambda-runtime-aws-request-id";
const DEADLINE_HEADER: &str = "lambda-runtime-deadline-ms";
const FUNCTION_ARN_HEADER: &str = "lambda-runtime-invoked-function-arn";
const TRACE_ID_HEADER: &str = "lambda-runtime-trace-id";
const ERROR_TYPE_HEADER: &str = "lambda-runtime-function-error-type";

/// One event delivered by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
  pub request_id: String,
  pub deadline_unix_ms: Option<u64>,
  pub invoked_function_arn: Option<String>,
  pub trace_id: Option<String>,
  pub body: Vec<u8>,
}

pub trait RuntimeApi {
  /// Blocks until the platform has work. `None` means no more invocations will come.
  fn next_invocation(&self) -> anyhow::Result<Option<Invocation>>;

  fn report_success(&self, request_id: &str) -> anyhow::Result<()>;

  fn report_failure(&self, request_id: &str, error: &anyhow::Error) -> anyhow::Result<()>;

  fn report_init_failure(&self, error: &anyhow::Error) -> anyhow::Result<()>;
}

/// Long-lived handler loop. Each invocation goes through [`dispatch::dispatch_once`]
/// against the same bootstrapped engine and configuration.
pub fn serve<A: RuntimeApi, E: Engine>(
  api: &A,
  ready: &Ready<E>,
  cancel: &CancelToken,
) -> anyhow::Result<()> {
  tracing::info!("registered as managed-function handler; waiting for invocations");

  let mut served: u64 = 0;
  loop {
    if cancel.is_cancelled() {
      tracing::info!("stop requested; leaving invocation loop");
      break;
    }

    let Some(invocation) = api.next_invocation().context("poll next invocation")? else {
      break;
    };

    let ctx = InvocationContext {
      request_id: invocation.request_id,
      deadline_unix_ms: invocation.deadline_unix_ms,
      invoked_function_arn: invocation.invoked_function_arn,
      trace_id: invocation.trace_id,
      cancel: cancel.clone(),
    };
    let event = RawEvent::new(invocation.body);

    match dispatch::dispatch_once(ready, &ctx, Some(&event)) {
      Ok(()) => api
        .report_success(&ctx.request_id)
        .with_context(|| format!("report success for {}", ctx.request_id))?,
      Err(e) => {
        tracing::error!(request_id = %ctx.request_id, error = ?e, "invocation failed");
        api
          .report_failure(&ctx.request_id, &e)
          .with_context(|| format!("report failure for {}", ctx.request_id))?;
      }
    }
    served += 1;
  }

  tracing::info!(served, "invocation loop exited");
  Ok(())
}

/// The platform's Runtime API over plain HTTP.
pub struct HttpRuntimeApi {
  client: Client,
  base: String,
}

impl HttpRuntimeApi {
  pub fn from_env() -> anyhow::Result<Self> {
    let endpoint = std::env::var(RUNTIME_API_ENV)
      .with_context(|| format!("{RUNTIME_API_ENV} is not set"))?;
    Self::new(&endpoint)
  }

  pub fn new(endpoint: &str) -> anyhow::Result<Self> {
    if endpoint.trim().is_empty() {
      anyhow::bail!("runtime API endpoint is empty");
    }
    // `next` long-polls until the platform has an event, so no request timeout.
    let client = Client::builder()
      .timeout(None::<Duration>)
      .build()
      .context("build runtime API client")?;
    Ok(Self {
      client,
      base: format!("http://{}/{RUNTIME_API_VERSION}", endpoint.trim()),
    })
  }

  fn post(&self, path: &str, body: String, error_type: Option<&str>) -> anyhow::Result<()> {
    let url = format!("{}/{path}", self.base);
    let mut req = self
      .client
      .post(&url)
      .header(USER_AGENT, user_agent())
      .header(CONTENT_TYPE, "application/json")
      .body(body);
    if let Some(t) = error_type {
      req = req.header(ERROR_TYPE_HEADER, t);
    }
    let response = req.send().with_context(|| format!("POST {path}"))?;
    ensure_accepted(&response, path)
  }
}

impl RuntimeApi for HttpRuntimeApi {
  fn next_invocation(&self) -> anyhow::Result<Option<Invocation>> {
    let url = format!("{}/runtime/invocation/next", self.base);
    let response = self
      .client
      .get(&url)
      .header(USER_AGENT, user_agent())
      .send()
      .context("GET runtime/invocation/next")?;
    ensure_accepted(&response, "runtime/invocation/next")?;

    let headers = response.headers().clone();
    let body = response
      .bytes()
      .context("read invocation body")?
      .to_vec();
    invocation_from_parts(&headers, body).map(Some)
  }

  fn report_success(&self, request_id: &str) -> anyhow::Result<()> {
    self.post(
      &format!("runtime/invocation/{request_id}/response"),
      "null".to_string(),
      None,
    )
  }

  fn report_failure(&self, request_id: &str, error: &anyhow::Error) -> anyhow::Result<()> {
    self.post(
      &format!("runtime/invocation/{request_id}/error"),
      error_body("HandlerError", error),
      Some("Unhandled"),
    )
  }

  fn report_init_failure(&self, error: &anyhow::Error) -> anyhow::Result<()> {
    self.post(
      "runtime/init/error",
      error_body("InitError", error),
      Some("Unhandled"),
    )
  }
}

fn invocation_from_parts(headers: &HeaderMap, body: Vec<u8>) -> anyhow::Result<Invocation> {
  let header = |name: &str| {
    headers
      .get(name)
      .and_then(|v| v.to_str().ok())
      .map(str::to_string)
  };

  let request_id = header(REQUEST_ID_HEADER)
    .filter(|id| !id.is_empty())
    .ok_or_else(|| anyhow::anyhow!("invocation is missing {REQUEST_ID_HEADER}"))?;

  Ok(Invocation {
    request_id,
    deadline_unix_ms: header(DEADLINE_HEADER).and_then(|v| v.parse().ok()),
    invoked_function_arn: header(FUNCTION_ARN_HEADER),
    trace_id: header(TRACE_ID_HEADER),
    body,
  })
}

fn error_body(error_type: &str, error: &anyhow::Error) -> String {
  serde_json::json!({
    "errorMessage": format!("{error:#}"),
    "errorType": error_type,
  })
  .to_string()
}

fn ensure_accepted(response: &Response, what: &str) -> anyhow::Result<()> {
  if !response.status().is_success() {
    anyhow::bail!(
      "unexpected HTTP status {} for {what}",
      response.status().as_u16()
    );
  }
  Ok(())
}

fn user_agent() -> String {
  format!("spot-agent/{}", env!("CARGO_PKG_VERSION"))
}
