//! Pluggable IP-based location lookup.
//!
//! IP lookup is one accuracy strategy, not a hardware fix: a request built
//! with [`Accuracy::IpLookup`](crate::policy::Accuracy::IpLookup) resolves
//! its position once through the injected service and terminates. Retry
//! logic, if any, belongs inside the service implementation, never in the
//! request core.
//!
//! The trait is dyn-compatible (`Pin<Box<dyn Future>>`) so services can be
//! stored behind `Arc<dyn IpLookupService>` inside the accuracy policy.

use std::future::Future;
use std::pin::Pin;

use serde::Deserialize;

use crate::error::SensorError;
use crate::sample::LocationSample;

/// Horizontal accuracy attributed to IP-derived fixes (city level at best).
pub const IP_LOOKUP_ACCURACY_M: f64 = 50_000.0;

/// Default lookup endpoint (ip-api.com JSON schema).
pub const DEFAULT_IP_API_ENDPOINT: &str = "http://ip-api.com/json";

/// A service resolving the device's approximate position from its IP.
pub trait IpLookupService: Send + Sync + 'static {
    /// Resolves the current position.
    ///
    /// The returned sample should carry [`IP_LOOKUP_ACCURACY_M`] (or a more
    /// honest figure if the service knows one).
    fn lookup(&self)
        -> Pin<Box<dyn Future<Output = Result<LocationSample, SensorError>> + Send + '_>>;
}

// =============================================================================
// ip-api.com implementation
// =============================================================================

/// Response schema of ip-api.com style endpoints.
#[derive(Debug, Deserialize)]
struct IpApiResponse {
    status: String,
    #[serde(default)]
    lat: f64,
    #[serde(default)]
    lon: f64,
    #[serde(default)]
    message: Option<String>,
}

/// [`IpLookupService`] backed by an ip-api.com style HTTP endpoint.
#[derive(Debug, Clone)]
pub struct IpApiService {
    endpoint: String,
    client: reqwest::Client,
}

impl IpApiService {
    /// Creates a service against the default public endpoint.
    pub fn new() -> Self {
        Self::with_endpoint(DEFAULT_IP_API_ENDPOINT)
    }

    /// Creates a service against a custom endpoint (self-hosted mirror,
    /// test server).
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
        }
    }
}

impl Default for IpApiService {
    fn default() -> Self {
        Self::new()
    }
}

impl IpLookupService for IpApiService {
    fn lookup(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<LocationSample, SensorError>> + Send + '_>> {
        Box::pin(async move {
            let response = self
                .client
                .get(&self.endpoint)
                .send()
                .await
                .map_err(SensorError::provider)?;
            let body: IpApiResponse = response.json().await.map_err(SensorError::provider)?;

            if body.status != "success" {
                let message = body
                    .message
                    .unwrap_or_else(|| format!("lookup status: {}", body.status));
                return Err(SensorError::Provider(message));
            }

            Ok(LocationSample::new(body.lat, body.lon, IP_LOOKUP_ACCURACY_M))
        })
    }
}

// =============================================================================
// Test support
// =============================================================================

/// Deterministic lookup services for tests and simulations.
pub mod test_support {
    use super::*;
    use std::time::Duration;

    /// A lookup service returning a fixed result, optionally after a delay.
    pub struct FixedLookup {
        result: Result<(f64, f64), String>,
        delay: Option<Duration>,
    }

    impl FixedLookup {
        /// Always resolves to the given coordinates.
        pub fn succeeding(latitude: f64, longitude: f64) -> Self {
            Self {
                result: Ok((latitude, longitude)),
                delay: None,
            }
        }

        /// Always fails with the given provider message.
        pub fn failing(message: impl Into<String>) -> Self {
            Self {
                result: Err(message.into()),
                delay: None,
            }
        }

        /// Adds an artificial resolution delay.
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }
    }

    impl IpLookupService for FixedLookup {
        fn lookup(
            &self,
        ) -> Pin<Box<dyn Future<Output = Result<LocationSample, SensorError>> + Send + '_>>
        {
            let result = self.result.clone();
            let delay = self.delay;
            Box::pin(async move {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                match result {
                    Ok((lat, lon)) => Ok(LocationSample::new(lat, lon, IP_LOOKUP_ACCURACY_M)),
                    Err(message) => Err(SensorError::Provider(message)),
                }
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::FixedLookup;
    use super::*;

    #[tokio::test]
    async fn test_fixed_lookup_success() {
        let svc = FixedLookup::succeeding(53.55, 9.99);
        let sample = svc.lookup().await.unwrap();
        assert_eq!(sample.latitude, 53.55);
        assert_eq!(sample.longitude, 9.99);
        assert_eq!(sample.horizontal_accuracy, IP_LOOKUP_ACCURACY_M);
    }

    #[tokio::test]
    async fn test_fixed_lookup_failure() {
        let svc = FixedLookup::failing("quota exceeded");
        let err = svc.lookup().await.unwrap_err();
        assert_eq!(err, SensorError::Provider("quota exceeded".to_string()));
    }

    #[test]
    fn test_ip_api_response_failure_schema() {
        // Failure responses omit lat/lon entirely.
        let body = r#"{"status":"fail","message":"private range"}"#;
        let parsed: IpApiResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.status, "fail");
        assert_eq!(parsed.message.as_deref(), Some("private range"));
    }

    #[test]
    fn test_ip_api_response_success_schema() {
        let body = r#"{"status":"success","lat":53.55,"lon":9.99}"#;
        let parsed: IpApiResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.status, "success");
        assert_eq!(parsed.lat, 53.55);
    }
}
