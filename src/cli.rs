//! Interface de linha de comando baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (research, sections)
//! e flags globais (--model, --fallback-model, --max-attempts, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::MobilityConfig;

/// Gera documentos JSON de medidas de mobilidade seção por seção.
#[derive(Debug, Parser)]
#[command(name = "mobility-research", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Modelo primário (sobrescreve MODEL_NAME / CLAUDE_MODEL).
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Modelo de fallback (sobrescreve FALLBACK_MODEL / CLAUDE_FALLBACK_MODEL).
    #[arg(long, global = true)]
    pub fallback_model: Option<String>,

    /// Tentativas máximas no modelo primário.
    #[arg(long, global = true)]
    pub max_attempts: Option<u32>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Pesquisa uma medida de mobilidade e grava o documento.
    Research {
        /// Nome da medida (ex.: "Bike sharing"). Perguntado se omitido.
        measure: Option<String>,

        /// Contexto adicional para os prompts.
        #[arg(long, short)]
        context: Option<String>,

        /// Gera as seções uma de cada vez.
        #[arg(long, default_value_t = false)]
        sequential: bool,

        /// Imprime o documento JSON no stdout ao final.
        #[arg(long, default_value_t = false)]
        view: bool,

        /// Diretório de saída (padrão: research_output).
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Lista as seções do documento na ordem de montagem.
    Sections,
}

impl Cli {
    /// Aplica as flags sobre a configuração carregada.
    pub fn apply_to(&self, config: &mut MobilityConfig) {
        if let Some(model) = &self.model {
            if config.money_mode {
                config.claude_model = model.clone();
            } else {
                config.model_name = model.clone();
            }
        }
        if let Some(model) = &self.fallback_model {
            if config.money_mode {
                config.claude_fallback_model = model.clone();
            } else {
                config.fallback_model = model.clone();
            }
        }
        if let Some(n) = self.max_attempts {
            config.max_attempts_primary = n;
        }
        if let Command::Research {
            sequential,
            output_dir,
            ..
        } = &self.command
        {
            if *sequential {
                config.sequential_mode = true;
            }
            if let Some(dir) = output_dir {
                config.output_dir = dir.clone();
            }
        }
    }
}
