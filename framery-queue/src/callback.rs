use std::collections::HashSet;
use std::net::IpAddr;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};
use url::{Host, Url};

use framery_core::{JobResult, JobStatus, Settings};

use crate::error::CallbackError;

/// Wire payload POSTed to `job.callbackUrl`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CallbackPayload<'a> {
    job_id: &'a str,
    status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a JobResult>,
}

/// True iff the hostname equals an allowed domain or is a subdomain of
/// one. An empty allow-list permits every host (development only).
pub fn host_allowed(hostname: &str, allowed_domains: &[String]) -> bool {
    if allowed_domains.is_empty() {
        return true;
    }
    allowed_domains.iter().any(|domain| {
        hostname == domain || hostname.ends_with(&format!(".{domain}"))
    })
}

fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                // Unique-local fc00::/7 and link-local fe80::/10.
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}

/// Validate a callback URL at job-submission time.
///
/// The scheme must be http or https and the host must pass the
/// allow-list. Outside development the host must not resolve to a
/// private or internal address.
pub async fn validate_callback_url(
    raw: &str,
    allowed_domains: &[String],
    development: bool,
) -> Result<(), CallbackError> {
    let url = Url::parse(raw).map_err(|e| CallbackError::InvalidUrl(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(CallbackError::BadScheme(url.scheme().to_string()));
    }
    let host = url
        .host()
        .ok_or_else(|| CallbackError::InvalidUrl("missing host".to_string()))?;

    let hostname = match &host {
        Host::Domain(domain) => domain.to_string(),
        Host::Ipv4(ip) => ip.to_string(),
        Host::Ipv6(ip) => ip.to_string(),
    };
    if !host_allowed(&hostname, allowed_domains) {
        return Err(CallbackError::HostNotAllowed(hostname));
    }

    if development {
        return Ok(());
    }

    match host {
        Host::Ipv4(ip) => {
            if is_private_ip(IpAddr::V4(ip)) {
                return Err(CallbackError::PrivateAddress(ip.to_string()));
            }
        }
        Host::Ipv6(ip) => {
            if is_private_ip(IpAddr::V6(ip)) {
                return Err(CallbackError::PrivateAddress(ip.to_string()));
            }
        }
        Host::Domain(domain) => {
            if domain.eq_ignore_ascii_case("localhost") {
                return Err(CallbackError::PrivateAddress(domain.to_string()));
            }
            let port = url.port_or_known_default().unwrap_or(443);
            let addrs = tokio::net::lookup_host((domain, port))
                .await
                .map_err(|e| CallbackError::InvalidUrl(e.to_string()))?;
            for addr in addrs {
                if is_private_ip(addr.ip()) {
                    return Err(CallbackError::PrivateAddress(format!(
                        "{domain} -> {}",
                        addr.ip()
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Best-effort, at-most-once delivery of the final job result.
///
/// Per attempt: hard timeout, success iff 2xx. Retries back off as
/// `retry_base * 2^(n-1)`. Failures are logged and never change the
/// job's status.
pub struct CallbackDispatcher {
    client: reqwest::Client,
    timeout: Duration,
    max_retries: u32,
    retry_base: Duration,
    delivered: Mutex<HashSet<(String, JobStatus)>>,
}

impl CallbackDispatcher {
    pub fn new(timeout: Duration, max_retries: u32, retry_base: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
            max_retries: max_retries.max(1),
            retry_base,
            delivered: Mutex::new(HashSet::new()),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.callback_timeout,
            settings.callback_max_retries,
            settings.api_retry_delay,
        )
    }

    /// Deliver `{jobId, status, result}` to `url`.
    ///
    /// Deduplicates by `(jobId, status)`: a repeated dispatch for the
    /// same final status is a no-op.
    pub async fn dispatch(
        &self,
        job_id: &str,
        status: JobStatus,
        result: Option<&JobResult>,
        url: &str,
    ) -> Result<(), CallbackError> {
        {
            let mut delivered = self.delivered.lock();
            if !delivered.insert((job_id.to_string(), status)) {
                info!(%job_id, %status, "callback already dispatched, skipping");
                return Ok(());
            }
        }

        let payload = CallbackPayload {
            job_id,
            status,
            result,
        };

        for attempt in 1..=self.max_retries {
            match self
                .client
                .post(url)
                .json(&payload)
                .timeout(self.timeout)
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => {
                    info!(%job_id, %status, attempt, "callback delivered");
                    return Ok(());
                }
                Ok(response) => {
                    warn!(
                        %job_id,
                        attempt,
                        http_status = response.status().as_u16(),
                        "callback attempt rejected"
                    );
                }
                Err(err) => {
                    warn!(%job_id, attempt, error = %err, "callback attempt failed");
                }
            }

            if attempt < self.max_retries {
                let backoff = self.retry_base * 2u32.saturating_pow(attempt - 1);
                tokio::time::sleep(backoff).await;
            }
        }

        warn!(%job_id, attempts = self.max_retries, "callback delivery gave up");
        Err(CallbackError::ExhaustedRetries {
            attempts: self.max_retries,
        })
    }
}
