pub mod best_effort;
pub mod health_evaluator;
pub mod lifecycle;
