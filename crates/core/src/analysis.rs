use std::sync::Arc;
use std::time::Duration;

use envmon_llm::provider::{CompletionRequest, LlmError, LlmProvider};

use crate::types::{SensorReading, Thresholds};

/// Shown whenever an assessment cannot be produced.
pub const ANALYSIS_FALLBACK: &str =
    "AI analysis is currently unavailable. Please check the API key configuration.";

const SYSTEM_PROMPT: &str = "You are a smart-home and environmental health assistant.";

/// Build the assessment prompt for one reading.
pub fn build_prompt(reading: &SensorReading, thresholds: &Thresholds) -> String {
    format!(
        "Current sensor readings:\n\
         - Temperature: {:.1}°C (target range: {}-{}°C)\n\
         - Humidity: {:.1}% (target range: {}-{}%)\n\
         - Pressure: {:.1} hPa\n\
         - Altitude (approx.): {:.1} m\n\
         \n\
         Give a concise analysis (at most 3 sentences):\n\
         1. Is the current environment comfortable?\n\
         2. Are there health risks (e.g. mold, dehydration, heat stroke)?\n\
         3. Suggest one practical action (e.g. \"open a window\", \"turn on the humidifier\").",
        reading.temperature,
        thresholds.temp_min,
        thresholds.temp_max,
        reading.humidity,
        thresholds.humid_min,
        thresholds.humid_max,
        reading.pressure,
        reading.altitude,
    )
}

/// Natural-language environment assessments from a text-generation service.
#[derive(Clone)]
pub struct Analyst {
    provider: Option<Arc<dyn LlmProvider>>,
    timeout: Duration,
}

impl Analyst {
    /// `None` provider means no credential was configured; every call falls
    /// back.
    pub fn new(provider: Option<Arc<dyn LlmProvider>>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }

    /// Single-shot assessment. Never fails: any error yields
    /// [`ANALYSIS_FALLBACK`].
    pub async fn analyze(&self, reading: &SensorReading, thresholds: &Thresholds) -> String {
        match self.try_analyze(reading, thresholds).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "environment analysis failed, using fallback");
                ANALYSIS_FALLBACK.to_owned()
            }
        }
    }

    async fn try_analyze(
        &self,
        reading: &SensorReading,
        thresholds: &Thresholds,
    ) -> Result<String, LlmError> {
        let provider = self
            .provider
            .as_ref()
            .ok_or_else(|| LlmError::Unavailable("no API key configured".into()))?;

        // gemini-2.5 counts its thinking against this budget
        let request = CompletionRequest::with_system(SYSTEM_PROMPT, build_prompt(reading, thresholds), 1024);

        let response = tokio::time::timeout(self.timeout, provider.complete(request))
            .await
            .map_err(|_| LlmError::RequestFailed(format!("timed out after {:?}", self.timeout)))??;

        let text = response.content.trim();
        if text.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        tracing::info!(
            provider = provider.name(),
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            "environment analysis complete"
        );
        Ok(text.to_owned())
    }
}

impl std::fmt::Debug for Analyst {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyst")
            .field("provider", &self.provider.as_ref().map(|p| p.name().to_owned()))
            .field("timeout", &self.timeout)
            .finish()
    }
}
