//! Built-in model families.
//!
//! Each family is only a canned expression text: it goes through the same
//! parser and symbolic differentiation as a user-supplied model.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::compiled::{compile, CompiledModel};
use crate::error::ModelError;

/// The named model families offered alongside free-form expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuiltinModel {
    /// Boltzmann sigmoid
    Boltzmann,
    /// Exponential decay
    #[serde(rename = "expdecay")]
    ExpDecay,
    /// Gaussian peak on a baseline
    Gaussian,
    /// Hill equation
    Hill,
    /// Dose response (IC50)
    Ic50,
    /// Michaelis-Menten kinetics
    #[serde(rename = "mm")]
    MichaelisMenten,
    /// Modified sine wave
    #[serde(rename = "modsin")]
    ModSin,
}

impl BuiltinModel {
    /// Every built-in family, in menu order.
    pub const ALL: [BuiltinModel; 7] = [
        BuiltinModel::Boltzmann,
        BuiltinModel::ExpDecay,
        BuiltinModel::Gaussian,
        BuiltinModel::Hill,
        BuiltinModel::Ic50,
        BuiltinModel::MichaelisMenten,
        BuiltinModel::ModSin,
    ];

    /// Short identifier, e.g. `"mm"`.
    pub fn name(self) -> &'static str {
        match self {
            BuiltinModel::Boltzmann => "boltzmann",
            BuiltinModel::ExpDecay => "expdecay",
            BuiltinModel::Gaussian => "gaussian",
            BuiltinModel::Hill => "hill",
            BuiltinModel::Ic50 => "ic50",
            BuiltinModel::MichaelisMenten => "mm",
            BuiltinModel::ModSin => "modsin",
        }
    }

    /// Human-readable name.
    pub fn label(self) -> &'static str {
        match self {
            BuiltinModel::Boltzmann => "Boltzmann sigmoid",
            BuiltinModel::ExpDecay => "Exponential Decay",
            BuiltinModel::Gaussian => "Gaussian function",
            BuiltinModel::Hill => "Hill plot",
            BuiltinModel::Ic50 => "Dose Response (ic50)",
            BuiltinModel::MichaelisMenten => "Michaelis-Menten",
            BuiltinModel::ModSin => "Modified sine wave",
        }
    }

    /// The model text.
    pub fn expression(self) -> &'static str {
        match self {
            BuiltinModel::Boltzmann => "var0 + ((var1 - var0)/(1 + exp((var2 - x)/var3)))",
            BuiltinModel::ExpDecay => "var0 + var1 * exp(-var2 * x)",
            BuiltinModel::Gaussian => "var0 + var1 * exp(-(x - var2)^2 / var3^2)",
            BuiltinModel::Hill => "var0 / (1 + (var1 / x)^var2)",
            BuiltinModel::Ic50 => "1 - (var0 / (1 + (var1 / x)^var2))",
            BuiltinModel::MichaelisMenten => "(var0 * x) / (var1 + x)",
            BuiltinModel::ModSin => "var0 * sin(pi * (x - var1) / var2)",
        }
    }

    /// Number of free parameters.
    pub fn arity(self) -> usize {
        match self {
            BuiltinModel::Boltzmann | BuiltinModel::Gaussian => 4,
            BuiltinModel::ExpDecay
            | BuiltinModel::Hill
            | BuiltinModel::Ic50
            | BuiltinModel::ModSin => 3,
            BuiltinModel::MichaelisMenten => 2,
        }
    }

    /// Whether fitted curves of this family are usually drawn on a log x-axis.
    pub fn prefers_log_scale(self) -> bool {
        matches!(self, BuiltinModel::Hill | BuiltinModel::Ic50)
    }

    /// Compile the family's expression.
    pub fn compile(self) -> Result<CompiledModel, ModelError> {
        compile(self.expression())
    }
}

impl fmt::Display for BuiltinModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BuiltinModel {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        BuiltinModel::ALL
            .into_iter()
            .find(|model| model.name() == key)
            .ok_or_else(|| ModelError::InvalidExpression(format!("unknown built-in model '{}'", s)))
    }
}
