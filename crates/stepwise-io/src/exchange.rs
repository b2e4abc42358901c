//! Data exchange between the tabular row store and the solver's native forms.

use std::path::Path;

use anyhow::{Context, Result};
use stepwise_core::Dataset;
use tracing::debug;

use crate::datafile::{read_datafile, write_datafile, ParamDefaults};
use crate::solution::{read_variables, NativeSolution, ResultSchema};

/// Converts between tabular data and the model's native files.
///
/// Implementations must be deterministic: the same input always produces the
/// same native file.
pub trait DataExchange: Send + Sync {
    /// Write `input` as the model's native data file at `target`.
    fn to_model_form(&self, input: &Dataset, target: &Path) -> Result<()>;

    /// Read a solution back into result tables. `reference` is the data file
    /// the solution was produced from, used to name index columns.
    fn to_tabular(&self, solution: &NativeSolution, reference: Option<&Path>) -> Result<Dataset>;
}

/// [`DataExchange`] over GNU MathProg datafiles.
#[derive(Debug, Clone, Default)]
pub struct MathProgExchange {
    pub defaults: ParamDefaults,
    pub schema: ResultSchema,
}

impl MathProgExchange {
    pub fn new(defaults: ParamDefaults, schema: ResultSchema) -> Self {
        Self { defaults, schema }
    }
}

impl DataExchange for MathProgExchange {
    fn to_model_form(&self, input: &Dataset, target: &Path) -> Result<()> {
        write_datafile(input, &self.defaults, target)?;
        debug!(target = %target.display(), tables = input.len(), "wrote model datafile");
        Ok(())
    }

    fn to_tabular(&self, solution: &NativeSolution, reference: Option<&Path>) -> Result<Dataset> {
        let variables = read_variables(solution)?;
        let reference = match reference {
            Some(path) => Some(
                read_datafile(path)
                    .with_context(|| format!("reading reference datafile {}", path.display()))?
                    .0,
            ),
            None => None,
        };
        self.schema.tabulate(&variables, reference.as_ref())
    }
}
