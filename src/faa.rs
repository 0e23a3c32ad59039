use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::{debug, warn};

use crate::domain::file_name_from_url;
use crate::error::ChartError;

/// Access to the chart publisher's website.
pub trait ChartSource: Send + Sync {
    fn fetch_page(&self, url: &str) -> Result<String, ChartError>;
    /// Downloads `url` into `dest_dir` and returns the archive path.
    fn download(&self, url: &str, dest_dir: &Path) -> Result<PathBuf, ChartError>;
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * (attempt + 1)
    }
}

#[derive(Clone)]
pub struct FaaHttpClient {
    client: Client,
    retry: RetryPolicy,
}

impl FaaHttpClient {
    pub fn new(retry: RetryPolicy, timeout: Duration) -> Result<Self, ChartError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("aeronav-tiles/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| ChartError::Http(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| ChartError::Http(err.to_string()))?;
        Ok(Self { client, retry })
    }

    /// One request. Transport errors and retryable statuses come back as
    /// `Attempt::Retry` so the caller's budget decides what happens next.
    fn send_once(&self, url: &str) -> Attempt<Response> {
        match self.client.get(url).send() {
            Ok(resp) => {
                let status = resp.status().as_u16();
                if resp.status().is_success() {
                    return Attempt::Done(resp);
                }
                let err = ChartError::HttpStatus {
                    status,
                    url: url.to_string(),
                };
                if is_retryable_status(status) {
                    Attempt::Retry(err)
                } else {
                    Attempt::Fail(err)
                }
            }
            Err(err) if is_retryable_error(&err) => {
                Attempt::Retry(ChartError::Http(err.to_string()))
            }
            Err(err) => Attempt::Fail(ChartError::Http(err.to_string())),
        }
    }
}

/// Outcome of a single request attempt.
enum Attempt<T> {
    Done(T),
    Retry(ChartError),
    Fail(ChartError),
}

impl<T> Attempt<T> {
    fn and_then<U, F>(self, f: F) -> Attempt<U>
    where
        F: FnOnce(T) -> Attempt<U>,
    {
        match self {
            Attempt::Done(value) => f(value),
            Attempt::Retry(err) => Attempt::Retry(err),
            Attempt::Fail(err) => Attempt::Fail(err),
        }
    }
}

/// Runs `op` until it succeeds, fails permanently or `policy.retries` extra
/// attempts are used up. Request and body failures share this one budget.
fn run_with_retries<T, F>(policy: RetryPolicy, url: &str, mut op: F) -> Result<T, ChartError>
where
    F: FnMut() -> Attempt<T>,
{
    let mut attempt = 0u32;
    loop {
        match op() {
            Attempt::Done(value) => return Ok(value),
            Attempt::Fail(err) => return Err(err),
            Attempt::Retry(err) if attempt < policy.retries => {
                debug!(url, error = %err, attempt, "retrying request");
                thread::sleep(policy.delay_for(attempt));
                attempt += 1;
            }
            Attempt::Retry(err) => {
                warn!(url, error = %err, attempts = attempt + 1, "giving up");
                return Err(err);
            }
        }
    }
}

impl ChartSource for FaaHttpClient {
    fn fetch_page(&self, url: &str) -> Result<String, ChartError> {
        run_with_retries(self.retry, url, || {
            self.send_once(url).and_then(|resp| match resp.text() {
                Ok(body) => Attempt::Done(body),
                Err(err) => Attempt::Retry(ChartError::Http(err.to_string())),
            })
        })
    }

    fn download(&self, url: &str, dest_dir: &Path) -> Result<PathBuf, ChartError> {
        fs::create_dir_all(dest_dir).map_err(|err| ChartError::Filesystem(err.to_string()))?;
        let file_name = file_name_from_url(url);
        if file_name.is_empty() {
            return Err(ChartError::Http(format!("no file name in {url}")));
        }
        let destination = dest_dir.join(file_name);
        let partial = dest_dir.join(format!("{file_name}.part"));

        run_with_retries(self.retry, url, || {
            self.send_once(url)
                .and_then(|resp| match store_body(resp, &partial, &destination) {
                    Ok(()) => Attempt::Done(()),
                    // A body can fail mid-stream; the whole request is retried then.
                    Err(err) => Attempt::Retry(ChartError::Http(format!("{url}: {err}"))),
                })
        })?;
        Ok(destination)
    }
}

/// Streams `body` into `partial` and renames it to `destination` once it is
/// complete and synced. A failed write leaves neither file behind.
fn store_body<R: Read>(mut body: R, partial: &Path, destination: &Path) -> io::Result<()> {
    let written = File::create(partial).and_then(|mut file| {
        io::copy(&mut body, &mut file)?;
        file.flush()?;
        file.sync_all()
    });
    match written.and_then(|()| fs::rename(partial, destination)) {
        Ok(()) => Ok(()),
        Err(err) => {
            let _ = fs::remove_file(partial);
            Err(err)
        }
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
