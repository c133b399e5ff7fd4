//! Configuration management for DealDesk
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default.toml, config/{APP_ENV}.toml, config/local.toml)
//! - Default values
//!
//! Grounding thresholds are loaded raw here and validated once, at startup,
//! when a [`GroundingPolicy`](crate::grounding::GroundingPolicy) is built from them.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Grounding policy (thresholds, keywords)
    #[serde(default)]
    pub grounding: PolicyConfig,

    /// Knowledge source configuration
    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Budget for one question, fetch through render, in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

/// Raw grounding policy options, as recognized on the configuration surface
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PolicyConfig {
    /// Minimum top score for an ANSWERED outcome, in (0, 1)
    #[serde(default = "default_answer_threshold")]
    pub answer_threshold: f32,

    /// Score band below the top candidate inside which differing content is ambiguous, in [0, 1)
    #[serde(default = "default_ambiguity_margin")]
    pub ambiguity_margin: f32,

    /// Maximum candidates returned by retrieval
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Candidates scoring at or below this are discarded, in [0, 1)
    #[serde(default = "default_min_retrieval_floor")]
    pub min_retrieval_floor: f32,

    /// Words/phrases that route unresolved questions to a human
    #[serde(default = "default_escalation_keywords")]
    pub escalation_keywords: Vec<String>,

    /// Deal-term vocabulary used to detect required sub-facts
    #[serde(default = "default_term_vocabulary")]
    pub term_vocabulary: Vec<String>,

    /// Whole messages that are pure small talk ("thanks", "good morning")
    #[serde(default = "default_greeting_patterns")]
    pub greeting_patterns: Vec<String>,

    /// First words that make a message a greeting candidate
    #[serde(default = "default_greeting_starters")]
    pub greeting_starters: Vec<String>,

    /// Words with no business intent, ignored when inspecting a greeting candidate
    #[serde(default = "default_social_filler_words")]
    pub social_filler_words: Vec<String>,

    /// Words and phrases that mark a greeting candidate as a real question
    #[serde(default = "default_business_keywords")]
    pub business_keywords: Vec<String>,

    /// Greeting candidates longer than this are treated as questions
    #[serde(default = "default_greeting_max_words")]
    pub greeting_max_words: usize,

    /// Human-assigned policy label recorded on every audit row
    #[serde(default = "default_policy_version")]
    pub policy_version: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct KnowledgeConfig {
    /// JSON seed for the in-memory knowledge store
    pub seed_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout_ms() -> u64 { 5_000 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_answer_threshold() -> f32 { 0.75 }
fn default_ambiguity_margin() -> f32 { 0.05 }
fn default_top_k() -> usize { 5 }
fn default_min_retrieval_floor() -> f32 { 0.15 }
fn default_greeting_max_words() -> usize { 8 }
fn default_policy_version() -> String { "grounding-v1".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "dealdesk".to_string() }

fn default_escalation_keywords() -> Vec<String> {
    [
        "litigation", "lawsuit", "legal action", "sue", "subpoena",
        "regulator", "regulatory", "sec", "investigation", "fraud",
        "complaint", "refund", "breach", "whistleblower",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_term_vocabulary() -> Vec<String> {
    [
        "valuation", "cap", "discount", "fee", "carry", "minimum", "ticket",
        "liquidation", "preference", "allocation", "spv", "equity", "preferred",
        "common", "secondary", "distribution", "price", "lockup", "closing",
        "deadline", "revenue", "ebitda", "arr", "runway", "dilution",
        "warrant", "coupon", "maturity", "interest",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_greeting_patterns() -> Vec<String> {
    strings(&[
        "hello", "hi", "hey", "hiya", "howdy",
        "good morning", "good afternoon", "good evening", "good day",
        "how are you", "how r u", "whats up", "sup",
        "thanks", "thank you", "cheers",
        "bye", "goodbye", "see you", "talk later",
        "ok", "okay", "alright", "got it", "noted",
        "yes", "no", "sure", "great", "perfect", "sounds good",
    ])
}

fn default_greeting_starters() -> Vec<String> {
    strings(&[
        "hello", "hi", "hey", "hiya", "howdy", "good",
        "thanks", "thank", "bye", "goodbye", "ok", "okay", "alright",
    ])
}

fn default_social_filler_words() -> Vec<String> {
    strings(&[
        "hello", "hi", "hey", "hiya", "howdy", "good", "morning",
        "afternoon", "evening", "day", "how", "are", "you", "doing",
        "i", "am", "we", "bot", "there", "mate", "sir", "team",
        "thanks", "thank", "cheers", "bye", "goodbye", "ok", "okay",
        "alright", "sure", "great", "perfect", "noted", "got", "it",
        "very", "well", "fine", "nice", "sup", "whats", "up",
    ])
}

fn default_business_keywords() -> Vec<String> {
    strings(&[
        "minimum", "ticket", "investment", "deal", "structure",
        "payment", "date", "fee", "fees", "carry", "valuation", "cap",
        "return", "returns", "fund", "close", "closing", "allocation",
        "share", "shares", "price", "wire", "document", "documents",
        "sign", "subscription", "information", "details", "lockup",
        "lock", "period", "spv", "equity", "preferred", "common",
        "distribution", "ebitda", "arr", "revenue", "growth",
        "what", "when", "where", "which", "who", "why",
        "can you", "could you", "please", "tell me", "explain",
        "do you have", "is there", "are there", "how much", "how many",
        "how long", "how do",
    ])
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_ms: default_request_timeout_ms(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            answer_threshold: default_answer_threshold(),
            ambiguity_margin: default_ambiguity_margin(),
            top_k: default_top_k(),
            min_retrieval_floor: default_min_retrieval_floor(),
            escalation_keywords: default_escalation_keywords(),
            term_vocabulary: default_term_vocabulary(),
            greeting_patterns: default_greeting_patterns(),
            greeting_starters: default_greeting_starters(),
            social_filler_words: default_social_filler_words(),
            business_keywords: default_business_keywords(),
            greeting_max_words: default_greeting_max_words(),
            policy_version: default_policy_version(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

fn environment() -> Environment {
    // e.g., APP__GROUNDING__ANSWER_THRESHOLD=0.8
    //       APP__GROUNDING__ESCALATION_KEYWORDS=litigation,fraud
    Environment::with_prefix("APP")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("grounding.escalation_keywords")
        .with_list_parse_key("grounding.term_vocabulary")
        .with_list_parse_key("grounding.greeting_patterns")
        .with_list_parse_key("grounding.greeting_starters")
        .with_list_parse_key("grounding.social_filler_words")
        .with_list_parse_key("grounding.business_keywords")
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            .add_source(environment())
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific configuration file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(environment())
            .build()?;

        config.try_deserialize()
    }

    /// Get the per-question budget as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.server.request_timeout_ms)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }
}
