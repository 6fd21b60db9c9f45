use std::time::Duration;

use serde::{Deserialize, Deserializer};

use super::AcquisitionError;
use crate::types::{SensorReading, altitude_from_pressure, now_millis};

/// JSON body served by the ESP8266 at `GET /data`.
#[derive(Debug, Deserialize)]
struct DevicePayload {
    #[serde(deserialize_with = "number")]
    temperature: f64,
    #[serde(deserialize_with = "number")]
    humidity: f64,
    #[serde(deserialize_with = "number")]
    pressure: f64,
    #[serde(default, deserialize_with = "optional_number")]
    altitude: Option<f64>,
}

/// Firmware builds differ on whether they quote numbers.
#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(f64),
    Text(String),
}

impl NumberOrString {
    fn into_f64<E: serde::de::Error>(self) -> Result<f64, E> {
        match self {
            Self::Number(n) => Ok(n),
            Self::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("not a number: {s:?}"))),
        }
    }
}

fn number<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    NumberOrString::deserialize(d)?.into_f64()
}

fn optional_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    Option::<NumberOrString>::deserialize(d)?
        .map(|n| n.into_f64::<D::Error>())
        .transpose()
}

/// Parse a device body into a reading stamped `timestamp`.
pub fn parse_payload(body: &str, timestamp: i64) -> Result<SensorReading, AcquisitionError> {
    let p: DevicePayload =
        serde_json::from_str(body).map_err(|e| AcquisitionError::Malformed(e.to_string()))?;

    if ![p.temperature, p.humidity, p.pressure].iter().all(|v| v.is_finite()) {
        return Err(AcquisitionError::Malformed("non-finite measurement".into()));
    }

    let altitude = match p.altitude {
        Some(a) if a.is_finite() => a,
        _ => altitude_from_pressure(p.pressure),
    };

    Ok(SensorReading {
        timestamp,
        temperature: p.temperature,
        humidity: p.humidity,
        pressure: p.pressure,
        altitude,
    })
}

/// HTTP client for a single sensor device. No retries; the poll schedule is
/// the retry policy.
#[derive(Debug, Clone)]
pub struct DeviceClient {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl DeviceClient {
    /// `address` is a host or `host:port`, optionally prefixed with `http://`.
    pub fn new(address: &str, timeout: Duration) -> Self {
        let host = address
            .trim()
            .trim_start_matches("http://")
            .trim_end_matches('/');
        Self {
            client: reqwest::Client::new(),
            url: format!("http://{host}/data"),
            timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch one reading. Aborts the in-flight request once the timeout
    /// elapses.
    pub async fn fetch(&self) -> Result<SensorReading, AcquisitionError> {
        match tokio::time::timeout(self.timeout, self.request()).await {
            Ok(result) => result,
            Err(_) => {
                tracing::debug!(url = %self.url, timeout_ms = self.timeout.as_millis() as u64, "device fetch timed out");
                Err(AcquisitionError::Timeout(self.timeout))
            }
        }
    }

    async fn request(&self) -> Result<SensorReading, AcquisitionError> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| AcquisitionError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(AcquisitionError::Status(resp.status().as_u16()));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| AcquisitionError::Network(e.to_string()))?;
        parse_payload(&body, now_millis())
    }
}
