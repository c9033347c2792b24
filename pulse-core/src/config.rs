use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::models::specialty::Specialty;

#[derive(Debug, Deserialize, Clone)]
pub struct PulseConfig {
    pub service: ServiceConfig,
    pub agents: AgentsConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub sessions: SessionConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub enhancer: EnhancerConfig,
    #[serde(default)]
    pub doctors: DirectoryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub socket_path: String,
    pub log_level: String,
}

/// Bus addresses of the agents. A missing triage address leaves the
/// coordinator unable to start any consultation.
#[derive(Debug, Deserialize, Clone)]
pub struct AgentsConfig {
    pub coordinator: String,
    pub triage: Option<String>,
    pub cardiology: Option<String>,
    pub neurology: Option<String>,
    pub dermatology: Option<String>,
    pub default_specialist: Specialty,
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,
}

fn default_mailbox_capacity() -> usize {
    64
}

impl AgentsConfig {
    /// Configured router address, treating blank strings as absent.
    pub fn triage_address(&self) -> Option<&str> {
        self.triage.as_deref().map(str::trim).filter(|a| !a.is_empty())
    }

    pub fn specialist_address(&self, specialty: Specialty) -> Option<&str> {
        let address = match specialty {
            Specialty::Cardiology => self.cardiology.as_deref(),
            Specialty::Neurology => self.neurology.as_deref(),
            Specialty::Dermatology => self.dermatology.as_deref(),
        };
        address.map(str::trim).filter(|a| !a.is_empty())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8767,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SessionConfig {
    pub ttl_seconds: u64,
    pub sweep_interval_seconds: u64,
    pub poll_timeout_seconds: u64,
    pub poll_interval_ms: u64,
    pub max_message_chars: usize,
    pub heartbeat_interval_seconds: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 300,
            sweep_interval_seconds: 120,
            poll_timeout_seconds: 60,
            poll_interval_ms: 500,
            max_message_chars: 4000,
            heartbeat_interval_seconds: 3600,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RoutingConfig {
    /// Specialty chosen when no routing fact matched the input.
    pub unroutable_specialty: Specialty,
    pub secondary_threshold: f64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            unroutable_specialty: Specialty::Cardiology,
            secondary_threshold: 0.60,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EnhancerConfig {
    pub enabled: bool,
    pub api_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub api_key_env: String,
    pub timeout_seconds: u64,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for EnhancerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            api_key_env: "PULSE_ENHANCER_API_KEY".to_string(),
            timeout_seconds: 30,
            max_retries: 2,
            retry_delay_ms: 500,
            temperature: 0.3,
            max_tokens: 200,
        }
    }
}

impl EnhancerConfig {
    /// Explicit key first, then the configured environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DirectorySource {
    #[default]
    Static,
    Http,
    Disabled,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DirectoryConfig {
    pub source: DirectorySource,
    pub url: Option<String>,
    pub max_results: usize,
    pub entries: Vec<DoctorEntry>,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            source: DirectorySource::Static,
            url: None,
            max_results: 3,
            entries: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DoctorEntry {
    pub name: String,
    pub specialization: String,
    pub email: Option<String>,
}

impl PulseConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("PULSE").separator("__"))
            .build()?;
        s.try_deserialize()
    }

    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;
        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [service]
        socket_path = "/tmp/pulse.sock"
        log_level = "info"

        [agents]
        coordinator = "coordinator"
        triage = "triage"
        cardiology = "cardiology"
        default_specialist = "cardiology"
    "#;

    #[test]
    fn test_minimal_config_fills_defaults() {
        let config = PulseConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.sessions.ttl_seconds, 300);
        assert_eq!(config.sessions.sweep_interval_seconds, 120);
        assert_eq!(config.sessions.poll_interval_ms, 500);
        assert_eq!(config.routing.unroutable_specialty, Specialty::Cardiology);
        assert!(!config.enhancer.enabled);
        assert_eq!(config.doctors.max_results, 3);
        assert_eq!(config.agents.mailbox_capacity, 64);
        assert!(config.http.enabled);
    }

    #[test]
    fn test_blank_triage_address_is_missing() {
        let toml = MINIMAL.replace(r#"triage = "triage""#, r#"triage = "  ""#);
        let config = PulseConfig::from_toml_str(&toml).unwrap();
        assert_eq!(config.agents.triage_address(), None);
    }

    #[test]
    fn test_unconfigured_specialist_is_none() {
        let config = PulseConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(
            config.agents.specialist_address(Specialty::Cardiology),
            Some("cardiology")
        );
        assert_eq!(config.agents.specialist_address(Specialty::Neurology), None);
    }

    #[test]
    fn test_doctor_entries_parse() {
        let toml = format!(
            "{}\n[doctors]\nsource = \"static\"\n[[doctors.entries]]\nname = \"Ada Heart\"\nspecialization = \"Cardiologist\"\nemail = \"ada@example.org\"\n",
            MINIMAL
        );
        let config = PulseConfig::from_toml_str(&toml).unwrap();
        assert_eq!(config.doctors.entries.len(), 1);
        assert_eq!(config.doctors.entries[0].specialization, "Cardiologist");
    }

    #[test]
    fn test_unknown_specialty_rejected() {
        let toml = MINIMAL.replace(
            r#"default_specialist = "cardiology""#,
            r#"default_specialist = "oncology""#,
        );
        assert!(PulseConfig::from_toml_str(&toml).is_err());
    }
}
