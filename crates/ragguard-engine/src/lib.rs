pub mod citations;
pub mod confidence;
pub mod engine;
pub mod injection;
pub mod policy;
pub mod retriever;

pub use confidence::ConfidenceScorer;
pub use engine::{EvalConfig, GuardrailEngine};
pub use injection::SignatureSet;
pub use policy::{PolicyEngine, PolicyRule, RuleInput};
pub use retriever::Retriever;
