pub mod evaluator;

pub use evaluator::{ProfitMeasurement, RiskEvaluator, SlippageMeasurement};
