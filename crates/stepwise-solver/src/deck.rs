//! Solver deck generation.

use std::path::Path;

use stepwise_core::CancelToken;
use tracing::info;

use crate::error::SolverResult;
use crate::subprocess::{find_binary, ToolProcess};

/// Binary used to generate LP decks from a MathProg model and datafile.
pub const GLPSOL: &str = "glpsol";

/// Turns a model definition plus a native data file into a solver deck.
pub trait DeckBuilder: Send + Sync {
    /// Write the deck to `deck`, logging tool output to `log`. A non-zero exit
    /// is an error.
    fn build_deck(
        &self,
        data_file: &Path,
        model: &Path,
        deck: &Path,
        log: &Path,
        cancel: &CancelToken,
    ) -> SolverResult<()>;
}

/// `glpsol -m <model> -d <data> --wlp <deck> --check`.
#[derive(Debug, Clone)]
pub struct GlpsolDeckBuilder {
    process: ToolProcess,
}

impl GlpsolDeckBuilder {
    pub fn new(timeout_seconds: u64) -> SolverResult<Self> {
        let binary = find_binary(GLPSOL)?;
        Ok(Self::with_binary(binary, timeout_seconds))
    }

    pub fn with_binary(binary: impl Into<std::path::PathBuf>, timeout_seconds: u64) -> Self {
        Self {
            process: ToolProcess::new(binary, timeout_seconds),
        }
    }

    pub fn args(data_file: &Path, model: &Path, deck: &Path) -> Vec<String> {
        vec![
            "-m".into(),
            model.display().to_string(),
            "-d".into(),
            data_file.display().to_string(),
            "--wlp".into(),
            deck.display().to_string(),
            "--check".into(),
        ]
    }
}

impl DeckBuilder for GlpsolDeckBuilder {
    fn build_deck(
        &self,
        data_file: &Path,
        model: &Path,
        deck: &Path,
        log: &Path,
        cancel: &CancelToken,
    ) -> SolverResult<()> {
        let cwd = deck.parent().unwrap_or(Path::new("."));
        self.process
            .run(&Self::args(data_file, model, deck), cwd, log, cancel)?;
        info!(deck = %deck.display(), "built solver deck");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glpsol_args_write_lp_without_solving() {
        let args = GlpsolDeckBuilder::args(
            Path::new("data.txt"),
            Path::new("model/osemosys.txt"),
            Path::new("model.lp"),
        );
        assert_eq!(
            args,
            vec!["-m", "model/osemosys.txt", "-d", "data.txt", "--wlp", "model.lp", "--check"]
        );
    }
}
