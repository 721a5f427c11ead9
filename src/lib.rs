//! # curvefit-rs
//!
//! `curvefit-rs` fits user-supplied model expressions to `(x, y)` data.
//!
//! The library provides:
//! - A model compiler that parses expressions such as
//!   `var0 + var1 * exp(-var2 * x)`, derives every partial derivative
//!   symbolically and lowers the results to vectorized evaluators
//! - A Levenberg-Marquardt solver with Nielsen's damping update
//! - Built-in model families (Michaelis-Menten, Hill, Gaussian, ...)
//! - A request-level API with JSON reports and parallel batch fitting
//!
//! ## Basic Usage
//!
//! ```
//! use curvefit_rs::{CurveFit, Dataset};
//!
//! let x: Vec<f64> = (1..=20).map(|i| i as f64 * 0.5).collect();
//! let y: Vec<f64> = x.iter().map(|x| 2.0 * x / (1.5 + x)).collect();
//! let data = Dataset::new(x, y).unwrap();
//!
//! let fitter = CurveFit::new("(param0 * x) / (param1 + x)").unwrap();
//! let report = fitter.fit(&data, &[1.0, 1.0]).unwrap();
//!
//! assert!((report.params[0] - 2.0).abs() < 1e-6);
//! assert!((report.params[1] - 1.5).abs() < 1e-6);
//! ```

pub mod dataset;
pub mod error;
pub mod fit;
pub mod lm;
pub mod model;
pub mod problem;

mod utils;

// Re-exports for convenience
pub use dataset::Dataset;
pub use error::{CurveFitError, ModelError, Result, SolverError};
pub use fit::{fit_batch, AxisScale, CurveFit, FitReport, FitRequest};
pub use lm::{LevenbergMarquardt, LmResult, SolverConfig, Termination};
pub use model::{compile, BuiltinModel, CompiledModel};
pub use problem::{CurveProblem, Problem};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
