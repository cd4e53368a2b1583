//! Natural-language summaries of the charted series from an external
//! text-generation service.
//!
//! Failures never reach the caller as errors: `request_summary` turns them
//! into display text. Request ids let the view drop responses that arrive
//! after the selection has moved on.

use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::config::SummaryConfig;
use crate::pivot::YearSeries;

/// Rows embedded in a prompt, to bound the payload.
pub const MAX_PROMPT_ROWS: usize = 25;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("client build failed: {message}")]
    BuildClient { message: String },
    #[error("http request failed: {message}")]
    Http { message: String },
    #[error("http status {code}: {message}")]
    HttpStatus { code: u16, message: String },
    #[error("decode response failed: {message}")]
    Decode { message: String },
    #[error("response contained no text")]
    EmptyResponse,
    #[error("no API key configured")]
    NotConfigured,
}

/// Opaque prompt-in, text-out service.
pub trait TextGenerator {
    fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

#[derive(Debug, Clone)]
pub struct GeminiClient {
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: Client,
}

impl GeminiClient {
    pub fn from_config(config: &SummaryConfig) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms.max(1)))
            .build()
            .map_err(|err| GenerationError::BuildClient { message: err.to_string() })?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            client,
        })
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateResponse {
    fn into_text(self) -> Option<String> {
        let text: String = self
            .candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .filter_map(|p| p.text)
            .collect();
        (!text.trim().is_empty()).then_some(text)
    }
}

impl TextGenerator for GeminiClient {
    fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let api_key = self.api_key.as_deref().ok_or(GenerationError::NotConfigured)?;
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let payload = GenerateRequest {
            contents: [Content { parts: [Part { text: prompt }] }],
        };

        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", api_key)
            .json(&payload)
            .send()
            .map_err(|err| GenerationError::Http { message: err.to_string() })?;

        let status = response.status();
        if status != StatusCode::OK {
            let message = response.text().unwrap_or_else(|_| "<no body>".to_string());
            return Err(GenerationError::HttpStatus { code: status.as_u16(), message });
        }

        let body: GenerateResponse = response
            .json()
            .map_err(|err| GenerationError::Decode { message: err.to_string() })?;
        body.into_text().ok_or(GenerationError::EmptyResponse)
    }
}

/// Labels the prompt is written around.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryContext<'a> {
    pub country: &'a str,
    pub commodity: &'a str,
}

fn or_na(value: Option<f64>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| v.to_string())
}

fn data_line(rows: &[YearSeries], keys: &[(&str, &str)]) -> String {
    rows.iter()
        .take(MAX_PROMPT_ROWS)
        .map(|row| {
            let mut line = format!("Year {}:", row.year);
            for (i, (label, key)) in keys.iter().enumerate() {
                let sep = if i == 0 { " " } else { ", " };
                let _ = write!(line, "{sep}{label}={}", or_na(row.get(key)));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("; ")
}

pub fn production_prompt(rows: &[YearSeries], context: &SummaryContext<'_>) -> String {
    let data = data_line(rows, &[("BGS", "BGS"), ("USGS", "USGS")]);
    format!(
        "As a geology and mineral market analyst, provide a concise, insightful summary in a single paragraph \
about the production of {commodity} in {country}.\n\
The data shows annual production quantity in metric tons from two sources: BGS (British Geological Survey) \
and USGS (United States Geological Survey).\n\n\
Based on the data below, analyze the following:\n\
1. Major production trends (e.g., increasing, decreasing, volatile, stable).\n\
2. Significant discrepancies or agreements between the BGS and USGS data sources.\n\
3. Any notable peaks, troughs, or periods of change.\n\n\
Data: {data}",
        commodity = context.commodity,
        country = context.country,
    )
}

pub fn trade_prompt(rows: &[YearSeries], context: &SummaryContext<'_>, hs_code: &str) -> String {
    let data = data_line(rows, &[("Export Value", "ExportValue"), ("Import Value", "ImportValue")]);
    format!(
        "As an international trade analyst specializing in raw materials, provide a concise, insightful summary \
in a single paragraph about the trade of {commodity} (HS code {hs_code}) for {country}.\n\
The data shows annual export and import values in thousands of USD.\n\n\
Based on the data below, analyze the following:\n\
1. The country's overall trade balance for this commodity (net exporter or net importer).\n\
2. Major trends in export and import values over the period.\n\
3. Any significant spikes, drops, or changes in trade activity.\n\n\
Data (Values in 1000 USD): {data}",
        commodity = context.commodity,
        country = context.country,
    )
}

/// Asks the generator for a summary; failures come back as readable text.
pub fn request_summary(generator: &dyn TextGenerator, prompt: &str) -> String {
    match generator.generate(prompt) {
        Ok(text) => text,
        Err(err) => {
            error!(error = %err, "summary request failed");
            format!("Error communicating with Gemini: {err}")
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(u64);

/// Loading flag, latest request id and the text on screen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummaryState {
    latest: u64,
    loading: bool,
    text: Option<String>,
}

impl SummaryState {
    /// Starts a request; `None` while one is already in flight.
    pub fn begin(&mut self) -> Option<RequestId> {
        if self.loading {
            return None;
        }
        self.latest += 1;
        self.loading = true;
        self.text = None;
        Some(RequestId(self.latest))
    }

    /// Shows `text` if it answers the latest request. Returns whether it was kept.
    pub fn apply(&mut self, id: RequestId, text: String) -> bool {
        if id.0 != self.latest {
            debug!(id = id.0, latest = self.latest, "dropping stale summary");
            return false;
        }
        self.loading = false;
        self.text = Some(text);
        true
    }

    /// Forgets the current summary and orphans any request in flight.
    pub fn invalidate(&mut self) {
        self.latest += 1;
        self.loading = false;
        self.text = None;
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }
}

pub type SharedGenerator = Arc<dyn TextGenerator + Send + Sync>;

/// Runs requests off the UI thread; results are polled from the event loop.
pub struct SummaryWorker {
    generator: SharedGenerator,
    tx: Sender<(RequestId, String)>,
    rx: Receiver<(RequestId, String)>,
}

impl SummaryWorker {
    pub fn new(generator: SharedGenerator) -> Self {
        let (tx, rx) = mpsc::channel();
        Self { generator, tx, rx }
    }

    pub fn submit(&self, id: RequestId, prompt: String) {
        info!(id = id.0, "requesting summary");
        let generator = Arc::clone(&self.generator);
        let tx = self.tx.clone();
        let spawned = thread::Builder::new()
            .name(format!("summary-{}", id.0))
            .spawn(move || {
                let text = request_summary(generator.as_ref(), &prompt);
                let _ = tx.send((id, text));
            });
        if let Err(err) = spawned {
            error!(error = %err, "could not start summary thread");
            let _ = self.tx.send((id, format!("Error communicating with Gemini: {err}")));
        }
    }

    pub fn try_recv(&self) -> Option<(RequestId, String)> {
        self.rx.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<(RequestId, String)> {
        self.rx.recv_timeout(timeout).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockGenerator {
        output: Option<String>,
        err: Option<GenerationError>,
        prompts: Mutex<Vec<String>>,
    }

    impl TextGenerator for MockGenerator {
        fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            match &self.err {
                Some(err) => Err(err.clone()),
                None => Ok(self.output.clone().unwrap_or_else(|| "steady output".to_string())),
            }
        }
    }

    fn row(year: i32, pairs: &[(&str, Option<f64>)]) -> YearSeries {
        YearSeries {
            year,
            values: pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect::<BTreeMap<_, _>>(),
        }
    }

    const CONTEXT: SummaryContext<'static> = SummaryContext { country: "Australia", commodity: "Ilmenite" };

    #[test]
    fn production_prompt_embeds_rows_and_labels() {
        let rows = vec![
            row(2020, &[("BGS", Some(1200.0)), ("USGS", None)]),
            row(2021, &[("BGS", Some(0.0)), ("USGS", Some(1300.5))]),
        ];
        let prompt = production_prompt(&rows, &CONTEXT);
        assert!(prompt.contains("production of Ilmenite in Australia"));
        assert!(prompt.contains("Data: Year 2020: BGS=1200, USGS=N/A; Year 2021: BGS=0, USGS=1300.5"));
        assert_eq!(prompt, production_prompt(&rows, &CONTEXT));
    }

    #[test]
    fn trade_prompt_caps_rows() {
        let rows: Vec<YearSeries> = (1990..2030)
            .map(|y| row(y, &[("ExportValue", Some(1.0)), ("ImportValue", None)]))
            .collect();
        let prompt = trade_prompt(&rows, &CONTEXT, "261400");
        assert!(prompt.contains("(HS code 261400) for Australia"));
        assert_eq!(prompt.matches("Year ").count(), MAX_PROMPT_ROWS);
        assert!(prompt.contains("Year 2014: Export Value=1, Import Value=N/A"));
        assert!(!prompt.contains("Year 2015"));
    }

    #[test]
    fn failures_become_text() {
        let generator = MockGenerator {
            err: Some(GenerationError::HttpStatus { code: 503, message: "overloaded".into() }),
            ..Default::default()
        };
        let text = request_summary(&generator, "prompt");
        assert_eq!(text, "Error communicating with Gemini: http status 503: overloaded");
    }

    #[test]
    fn success_passes_text_through() {
        let generator = MockGenerator { output: Some("Output rose.".into()), ..Default::default() };
        assert_eq!(request_summary(&generator, "p"), "Output rose.");
        assert_eq!(generator.prompts.lock().unwrap().as_slice(), ["p"]);
    }

    #[test]
    fn missing_key_is_reported_without_network() {
        let client = GeminiClient::from_config(&SummaryConfig::default()).unwrap();
        assert_eq!(client.generate("p"), Err(GenerationError::NotConfigured));
    }

    #[test]
    fn response_text_parts_are_joined() {
        let body: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"Hello "},{"text":"world"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(body.into_text().as_deref(), Some("Hello world"));

        let empty: GenerateResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert_eq!(empty.into_text(), None);
    }

    #[test]
    fn request_payload_shape() {
        let payload = GenerateRequest { contents: [Content { parts: [Part { text: "hi" }] }] };
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            serde_json::json!({"contents": [{"parts": [{"text": "hi"}]}]})
        );
    }

    #[test]
    fn only_one_request_in_flight() {
        let mut state = SummaryState::default();
        let id = state.begin().unwrap();
        assert!(state.is_loading());
        assert_eq!(state.begin(), None);
        assert!(state.apply(id, "done".into()));
        assert!(!state.is_loading());
        assert_eq!(state.text(), Some("done"));
    }

    #[test]
    fn stale_response_is_dropped() {
        let mut state = SummaryState::default();
        let first = state.begin().unwrap();
        state.invalidate();
        let second = state.begin().unwrap();
        assert!(!state.apply(first, "old".into()));
        assert!(state.is_loading());
        assert!(state.apply(second, "new".into()));
        assert_eq!(state.text(), Some("new"));
    }

    #[test]
    fn worker_delivers_on_channel() {
        let worker = SummaryWorker::new(Arc::new(MockGenerator {
            output: Some("ok".into()),
            ..Default::default()
        }));
        let mut state = SummaryState::default();
        let id = state.begin().unwrap();
        worker.submit(id, "prompt".into());
        let (got, text) = worker.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(got, id);
        assert_eq!(text, "ok");
    }
}
