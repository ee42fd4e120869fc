//! 任务分类：多层信号评估 -> Desktop / Browser / Sequential / Ambiguous

pub mod classifier;
pub mod signals;

pub use classifier::TaskClassifier;
pub use signals::{
    standard_evaluators, ActionVerbSignal, KeywordFamily, KeywordSignal, Lean, SequentialSignal,
    SignalContribution, SignalEvaluator, UrlSignal,
};
