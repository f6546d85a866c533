//! Interface de terminal: spinner durante a execução e resumo colorido.
//!
//! Usa as crates `indicatif` para o spinner de progresso e `console` para
//! estilização com cores. Tudo vai para o stderr; o stdout fica livre para
//! o JSON do `--view`.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::orchestrator::RunReport;
use crate::sections::SectionSpec;
use crate::state_machine::{AttemptLog, Resolution, TaskOutcome};

/// Indicador visual de progresso de uma execução.
///
/// Mostra quantas seções já terminaram e imprime uma linha por seção
/// concluída: verde para sucesso, vermelho para falha.
pub struct RunProgress {
    // Spinner do indicatif.
    pb: ProgressBar,
    total: usize,
    done: usize,
    green: Style,
    red: Style,
    yellow: Style,
}

impl RunProgress {
    /// Inicia o spinner para a medida informada.
    pub fn start(measure: &str, total: usize) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} [{elapsed}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(format!("Researching \"{measure}\": 0/{total} sections"));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            total,
            done: 0,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Registra o término de uma seção.
    pub fn section_done(&mut self, key: &str, outcome: &TaskOutcome) {
        self.done += 1;
        let line = match outcome {
            TaskOutcome::Success { attempts, .. } if attempts.fell_back() => {
                format!("  {} {key} {}", self.green.apply_to("✓"), self.yellow.apply_to("(fallback)"))
            }
            TaskOutcome::Success { .. } => format!("  {} {key}", self.green.apply_to("✓")),
            TaskOutcome::Failed { reason, .. } => {
                format!("  {} {key}: {reason}", self.red.apply_to("✗"))
            }
        };
        self.pb.println(line);
        self.pb
            .set_message(format!("{}/{} sections", self.done, self.total));
    }

    /// Encerra o spinner.
    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }
}

/// Uma linha do resumo por seção, reconstruída apenas a partir do log.
pub fn resolution_line(key: &str, log: &AttemptLog) -> String {
    match log.resolution() {
        Resolution::ProducedBy { model, attempts } => {
            let via = if log.fell_back() { " via fallback" } else { "" };
            format!("{key}: {model}{via} ({attempts} call{})", if attempts == 1 { "" } else { "s" })
        }
        Resolution::Failed { cause } => format!("{key}: missing, {cause}"),
        Resolution::Unfinished => format!("{key}: unfinished"),
    }
}

/// Imprime o resumo final da execução no stderr.
pub fn print_summary(report: &RunReport) {
    let green = Style::new().green().bold();
    let red = Style::new().red();
    let yellow = Style::new().yellow().bold();
    let dim = Style::new().dim();
    let meta = report.metadata();

    eprintln!();
    if report.is_partial() {
        eprintln!("{} {}", yellow.apply_to("PARTIAL"), report.measure);
    } else {
        eprintln!("{} {}", green.apply_to("COMPLETE"), report.measure);
    }
    eprintln!(
        "  Completion: {:.1}% ({} sections)",
        meta.completion_percentage,
        report.attempts.len()
    );
    if !meta.missing_sections.is_empty() {
        eprintln!(
            "  Missing:    {}",
            red.apply_to(meta.missing_sections.join(", "))
        );
    }

    eprintln!();
    for (key, log) in &report.attempts {
        let line = resolution_line(key, log);
        if matches!(log.resolution(), Resolution::ProducedBy { .. }) {
            eprintln!("  {}", dim.apply_to(line));
        } else {
            eprintln!("  {}", red.apply_to(line));
        }
    }

    eprintln!();
    let size = std::fs::metadata(&report.output_path)
        .map(|m| format!(" ({:.1} KB)", m.len() as f64 / 1024.0))
        .unwrap_or_default();
    eprintln!("  Saved:   {}{size}", report.output_path.display());
    eprintln!(
        "  Run:     {} in {:.1}s",
        dim.apply_to(report.run_id),
        report.elapsed.as_secs_f64()
    );
}

/// Lista o catálogo de seções para o subcomando `sections`.
pub fn print_sections(specs: &[SectionSpec]) {
    let bold = Style::new().bold();
    for spec in specs {
        println!("{:>2}. {}", spec.order + 1, bold.apply_to(&spec.key));
    }
}
