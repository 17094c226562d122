pub mod counters;
pub mod gate;
pub mod scoring;

pub use counters::{CounterStore, MemoryCounterStore};
pub use gate::{
    AssessmentStore, FraudAssessment, FraudGate, FraudPolicy, NewFraudAssessment, PaymentRequest,
};
pub use scoring::{score, Decision, FraudSignal, Indicator, Scorecard};
