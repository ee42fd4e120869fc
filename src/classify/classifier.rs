//! 任务分类器
//!
//! 按顺序运行各层信号评估器，把贡献累加进 Desktop / Browser 两个桶：
//! 1. 顺序标记层命中时无条件返回 Sequential（优先于桶多数，混合信号的目标不能塌缩到单一后端）；
//! 2. 否则取较高的桶，达到 `min_confidence` 即为结论，并列时取 Desktop；
//! 3. 都未达到阈值时返回 Ambiguous，由路由器使用配置的默认后端。
//!
//! 纯函数：不做 I/O，相同输入与信号配置得到相同结果，永不报错。

use crate::classify::signals::{standard_evaluators, Lean, SignalEvaluator};
use crate::core::{Classification, TaskType};
use crate::decompose::Decomposer;

const MAX_CONFIDENCE: f32 = 0.99;

/// 多层信号分类器
pub struct TaskClassifier {
    evaluators: Vec<Box<dyn SignalEvaluator>>,
    min_confidence: f32,
}

impl TaskClassifier {
    /// 内置评估器，阈值 0.4
    pub fn new() -> Self {
        Self::with_decomposer(Decomposer::new())
    }

    /// 顺序标记层使用给定的分解器配置（与路由器保持一致）
    pub fn with_decomposer(decomposer: Decomposer) -> Self {
        Self {
            evaluators: standard_evaluators(decomposer),
            min_confidence: 0.4,
        }
    }

    /// 自定义评估器列表（顺序即 matched_signals 的顺序）
    pub fn with_evaluators(evaluators: Vec<Box<dyn SignalEvaluator>>) -> Self {
        Self {
            evaluators,
            min_confidence: 0.4,
        }
    }

    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence.clamp(0.0, 1.0);
        self
    }

    pub fn evaluator_names(&self) -> Vec<String> {
        self.evaluators.iter().map(|e| e.name().to_string()).collect()
    }

    /// 分类
    pub fn classify(&self, text: &str) -> Classification {
        if text.trim().is_empty() {
            return Classification::ambiguous();
        }

        let mut desktop = 0.0_f32;
        let mut browser = 0.0_f32;
        let mut sequential: Option<f32> = None;
        let mut matched_signals = Vec::new();

        for evaluator in &self.evaluators {
            for contribution in evaluator.evaluate(text) {
                match contribution.lean {
                    Lean::Desktop => desktop += contribution.weight,
                    Lean::Browser => browser += contribution.weight,
                    Lean::Sequential => {
                        sequential = Some(sequential.unwrap_or(0.0).max(contribution.weight));
                    }
                }
                matched_signals.extend(contribution.signals);
            }
        }

        let (leader, leader_score) = if browser > desktop {
            (TaskType::Browser, browser)
        } else {
            (TaskType::Desktop, desktop)
        };
        let leader_score = leader_score.min(MAX_CONFIDENCE);
        let recommendation = (leader_score > 0.0 && leader_score >= self.min_confidence)
            .then_some(leader);

        let classification = if let Some(weight) = sequential {
            Classification {
                task_type: TaskType::Sequential,
                confidence: weight.min(MAX_CONFIDENCE),
                matched_signals,
                recommendation,
            }
        } else if let Some(task_type) = recommendation {
            Classification {
                task_type,
                confidence: leader_score,
                matched_signals,
                recommendation: None,
            }
        } else {
            Classification {
                task_type: TaskType::Ambiguous,
                confidence: leader_score,
                matched_signals,
                recommendation: None,
            }
        };

        tracing::debug!(
            task_type = %classification.task_type,
            confidence = classification.confidence,
            desktop,
            browser,
            signals = ?classification.matched_signals,
            "classified"
        );
        classification
    }
}

impl Default for TaskClassifier {
    fn default() -> Self {
        Self::new()
    }
}
