//! Configuração do gerador carregada a partir de `mobility.toml`.
//!
//! A struct [`MobilityConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! Variáveis de ambiente (`GROQ_API_KEY`, `MODEL_NAME`, ...) têm precedência
//! sobre o arquivo; flags da CLI têm precedência sobre ambos.

use anyhow::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::MobilityError;
use crate::logging::LoggingConfig;
use crate::scheduler::ExecutionMode;
use crate::state_machine::RetryPolicy;

/// Nome do arquivo de configuração procurado no diretório atual.
pub const CONFIG_FILE: &str = "mobility.toml";

/// Limite superior (uma semana) para atrasos, esperas e o timeout da execução.
pub const MAX_CONFIG_SECS: u64 = 7 * 24 * 60 * 60;

/// Configuração de nível superior carregada de `mobility.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct MobilityConfig {
    /// Chave da API Groq (provedor padrão).
    #[serde(default)]
    pub groq_api_key: String,

    /// Chave da API Anthropic, usada no modo "money".
    #[serde(default)]
    pub anthropic_api_key: String,

    /// Chave da API Pexels. Opcional: sem ela as imagens vêm do Unsplash Source.
    #[serde(default)]
    pub pexels_api_key: String,

    /// Usa Claude em vez de Groq.
    #[serde(default)]
    pub money_mode: bool,

    /// Modelo primário no Groq.
    #[serde(default = "default_model_name")]
    pub model_name: String,

    /// Modelo de fallback no Groq.
    #[serde(default = "default_fallback_model")]
    pub fallback_model: String,

    /// Modelo primário no modo "money".
    #[serde(default = "default_claude_model")]
    pub claude_model: String,

    /// Modelo de fallback no modo "money".
    #[serde(default = "default_claude_fallback_model")]
    pub claude_fallback_model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Atraso mínimo (segundos) antes de cada tarefa.
    #[serde(default = "default_request_delay_min")]
    pub request_delay_min: f64,

    /// Atraso máximo (segundos) antes de cada tarefa.
    #[serde(default = "default_request_delay_max")]
    pub request_delay_max: f64,

    /// Desligado, as tarefas partem sem atraso aleatório.
    #[serde(default = "default_true")]
    pub enable_rate_limiting: bool,

    /// Executa as seções uma de cada vez.
    #[serde(default)]
    pub sequential_mode: bool,

    #[serde(default = "default_max_attempts_primary")]
    pub max_attempts_primary: u32,

    #[serde(default = "default_max_attempts_fallback")]
    pub max_attempts_fallback: u32,

    /// Espera (segundos) quando o 429 não traz dica.
    #[serde(default = "default_rate_limit_wait")]
    pub default_rate_limit_wait: f64,

    /// Teto (segundos) de qualquer espera de backoff.
    #[serde(default = "default_max_rate_limit_wait")]
    pub max_rate_limit_wait: f64,

    /// Prazo total da execução em segundos; 0 desativa.
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,

    /// Limite de tarefas simultâneas no modo paralelo.
    #[serde(default)]
    pub max_concurrency: Option<usize>,

    /// Quantidade de imagens buscadas para a seção `meta`.
    #[serde(default = "default_image_count")]
    pub image_count: usize,

    /// Pede ao modelo que conserte JSON inválido antes de desistir.
    #[serde(default = "default_true")]
    pub repair_json: bool,

    /// Diretório dos documentos gerados.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default)]
    pub debug: bool,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_model_name() -> String {
    "openai/gpt-oss-120b".to_string()
}

fn default_fallback_model() -> String {
    "llama-3.3-70b-versatile".to_string()
}

fn default_claude_model() -> String {
    "claude-haiku-4-5-20251001".to_string()
}

fn default_claude_fallback_model() -> String {
    "claude-sonnet-4-5-20250929".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_request_delay_min() -> f64 {
    1.0
}

fn default_request_delay_max() -> f64 {
    3.0
}

fn default_true() -> bool {
    true
}

fn default_max_attempts_primary() -> u32 {
    3
}

fn default_max_attempts_fallback() -> u32 {
    2
}

fn default_rate_limit_wait() -> f64 {
    10.0
}

fn default_max_rate_limit_wait() -> f64 {
    30.0
}

fn default_run_timeout_secs() -> u64 {
    600
}

fn default_image_count() -> usize {
    3
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("research_output")
}

impl Default for MobilityConfig {
    fn default() -> Self {
        Self {
            groq_api_key: String::new(),
            anthropic_api_key: String::new(),
            pexels_api_key: String::new(),
            money_mode: false,
            model_name: default_model_name(),
            fallback_model: default_fallback_model(),
            claude_model: default_claude_model(),
            claude_fallback_model: default_claude_fallback_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            request_delay_min: default_request_delay_min(),
            request_delay_max: default_request_delay_max(),
            enable_rate_limiting: default_true(),
            sequential_mode: false,
            max_attempts_primary: default_max_attempts_primary(),
            max_attempts_fallback: default_max_attempts_fallback(),
            default_rate_limit_wait: default_rate_limit_wait(),
            max_rate_limit_wait: default_max_rate_limit_wait(),
            run_timeout_secs: default_run_timeout_secs(),
            max_concurrency: None,
            image_count: default_image_count(),
            repair_json: default_true(),
            output_dir: default_output_dir(),
            debug: false,
            logging: LoggingConfig::default(),
        }
    }
}

impl MobilityConfig {
    /// Carrega `mobility.toml` do diretório atual e aplica as variáveis de ambiente.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(Path::new(CONFIG_FILE))?;
        config.apply_env_with(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Lê somente o arquivo, sem consultar o ambiente.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str::<MobilityConfig>(&contents)?)
    }

    /// Sobrescreve campos com variáveis de ambiente obtidas por `lookup`.
    /// Valores vazios são ignorados.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), MobilityError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("GROQ_API_KEY") {
            self.groq_api_key = v;
        }
        if let Some(v) = get("ANTHROPIC_API_KEY") {
            self.anthropic_api_key = v;
        }
        if let Some(v) = get("PEXELS_API_KEY") {
            self.pexels_api_key = v;
        }
        if let Some(v) = get("MODEL_NAME") {
            self.model_name = v;
        }
        if let Some(v) = get("FALLBACK_MODEL") {
            self.fallback_model = v;
        }
        if let Some(v) = get("CLAUDE_MODEL") {
            self.claude_model = v;
        }
        if let Some(v) = get("CLAUDE_FALLBACK_MODEL") {
            self.claude_fallback_model = v;
        }
        if let Some(v) = get("MONEY_MODE") {
            self.money_mode = parse_bool(&v);
        }
        if let Some(v) = get("ENABLE_RATE_LIMITING") {
            self.enable_rate_limiting = parse_bool(&v);
        }
        if let Some(v) = get("SEQUENTIAL_MODE") {
            self.sequential_mode = parse_bool(&v);
        }
        if let Some(v) = get("DEBUG") {
            self.debug = parse_bool(&v);
        }
        if let Some(v) = get("TEMPERATURE") {
            self.temperature = parse_number("TEMPERATURE", &v)?;
        }
        if let Some(v) = get("MAX_TOKENS") {
            self.max_tokens = parse_number("MAX_TOKENS", &v)?;
        }
        if let Some(v) = get("REQUEST_DELAY_MIN") {
            self.request_delay_min = parse_number("REQUEST_DELAY_MIN", &v)?;
        }
        if let Some(v) = get("REQUEST_DELAY_MAX") {
            self.request_delay_max = parse_number("REQUEST_DELAY_MAX", &v)?;
        }
        Ok(())
    }

    /// Nome do provedor selecionado.
    pub fn provider_name(&self) -> &'static str {
        if self.money_mode { "anthropic" } else { "groq" }
    }

    /// Chave da API do provedor selecionado.
    pub fn provider_api_key(&self) -> &str {
        if self.money_mode {
            &self.anthropic_api_key
        } else {
            &self.groq_api_key
        }
    }

    pub fn execution_mode(&self) -> ExecutionMode {
        if self.sequential_mode {
            ExecutionMode::Sequential
        } else {
            ExecutionMode::Parallel
        }
    }

    /// `None` quando `run_timeout_secs` é 0.
    pub fn run_timeout(&self) -> Option<Duration> {
        (self.run_timeout_secs > 0).then(|| Duration::from_secs(self.run_timeout_secs))
    }

    /// Valida a configuração antes de iniciar uma execução.
    pub fn validate(&self) -> Result<(), MobilityError> {
        if self.provider_api_key().is_empty() {
            let var = if self.money_mode {
                "ANTHROPIC_API_KEY"
            } else {
                "GROQ_API_KEY"
            };
            return Err(MobilityError::Config(format!(
                "{var} is required for the {} provider",
                self.provider_name()
            )));
        }
        for (name, value) in [
            ("request_delay_min", self.request_delay_min),
            ("request_delay_max", self.request_delay_max),
            ("default_rate_limit_wait", self.default_rate_limit_wait),
            ("max_rate_limit_wait", self.max_rate_limit_wait),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(MobilityError::Config(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
            if value > MAX_CONFIG_SECS as f64 {
                return Err(MobilityError::Config(format!(
                    "{name} must be at most {MAX_CONFIG_SECS} seconds, got {value}"
                )));
            }
        }
        if self.run_timeout_secs > MAX_CONFIG_SECS {
            return Err(MobilityError::Config(format!(
                "run_timeout_secs must be at most {MAX_CONFIG_SECS}, got {}",
                self.run_timeout_secs
            )));
        }
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(MobilityError::Config(format!(
                "temperature must be a non-negative number, got {}",
                self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(MobilityError::Config("max_tokens must be at least 1".into()));
        }
        self.retry_policy().validate().map_err(MobilityError::Config)
    }

    /// Política de retentativa derivada desta configuração.
    pub fn retry_policy(&self) -> RetryPolicy {
        let (primary_model, fallback_model) = if self.money_mode {
            (self.claude_model.clone(), self.claude_fallback_model.clone())
        } else {
            (self.model_name.clone(), self.fallback_model.clone())
        };
        let (jitter_min, jitter_max) = if self.enable_rate_limiting {
            (
                secs(self.request_delay_min),
                secs(self.request_delay_max),
            )
        } else {
            (Duration::ZERO, Duration::ZERO)
        };
        RetryPolicy {
            primary_model,
            fallback_model,
            max_attempts_primary: self.max_attempts_primary,
            max_attempts_fallback: self.max_attempts_fallback,
            default_wait: secs(self.default_rate_limit_wait),
            wait_ceiling: secs(self.max_rate_limit_wait),
            jitter_min,
            jitter_max,
        }
    }
}

// Segundos fracionários; valores inválidos viram zero (validate() os rejeita antes).
/// Negativos e NaN viram zero; valores grandes demais saturam.
fn secs(value: f64) -> Duration {
    if value.is_nan() || value <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(value).unwrap_or(Duration::MAX)
}

fn parse_bool(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, MobilityError> {
    value
        .parse()
        .map_err(|_| MobilityError::Config(format!("{name} has an invalid value: {value}")))
}
