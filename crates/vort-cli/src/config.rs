//! Trace configuration file (TOML).

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use vort_trace::{DensityEmission, GaussianBand, TraceSettings, TransferFunction};

/// Everything `vort trace` reads from `--config`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    /// Locator and traversal parameters.
    pub settings: TraceSettings,
    /// Emission model.
    pub transfer: TransferSpec,
    /// Zero densities of cells touching tetras whose circumcenter is outside
    /// the domain before tracing.
    pub limit_boundary_densities: bool,
}

/// Selectable transfer functions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransferSpec {
    /// Emission proportional to density.
    Density(DensityEmission),
    /// Gaussian window over one field.
    Gaussian(GaussianBand),
}

impl Default for TransferSpec {
    fn default() -> Self {
        TransferSpec::Density(DensityEmission::default())
    }
}

impl TransferSpec {
    /// Transfer function to trace with.
    pub fn as_transfer(&self) -> &dyn TransferFunction {
        match self {
            TransferSpec::Density(t) => t,
            TransferSpec::Gaussian(t) => t,
        }
    }

    /// Reject parameters that would make emission or absorption NaN.
    pub fn validate(&self) -> Result<()> {
        let sigma_t = match self {
            TransferSpec::Density(d) => d.sigma_t,
            TransferSpec::Gaussian(g) => {
                if !(g.sigma.is_finite() && g.sigma > 0.0) {
                    bail!("gaussian transfer needs a positive sigma, got {}", g.sigma);
                }
                if !g.center.is_finite() {
                    bail!("gaussian transfer center must be finite");
                }
                g.sigma_t
            }
        };
        if !(sigma_t.is_finite() && sigma_t >= 0.0) {
            bail!("sigma_t must be finite and non-negative, got {sigma_t}");
        }
        Ok(())
    }
}

impl TraceConfig {
    /// Read `path`, or defaults if none is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = toml::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.settings.validate()?;
        config
            .transfer
            .validate()
            .with_context(|| format!("invalid transfer in {}", path.display()))?;
        Ok(config)
    }
}
