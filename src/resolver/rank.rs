//! 候选文件排序
//!
//! score = 0.6 × 关键字强度 + 0.25 × 新近度 + 0.15 × 大小合理性，均在 [0, 1]。
//! - 关键字强度：关键字是文件名完整词元记 1.0，只是子串记 0.5，取平均后占 0.7；
//!   命中字符覆盖文件主名的比例占 0.3（文件名越"纯"越靠前）。
//! - 新近度：在本候选集合内按修改时间线性归一化，全部相同时为 1.0。
//! - 大小合理性：落在该类型合理区间 1.0，空文件 0.0，其余 0.5。
//!
//! 同分时按修改时间（新者优先）再按路径排序，结果确定。

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::resolver::keywords::{extension_of, FileQuery};

/// 带相关度的候选文件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileCandidate {
    /// canonical 绝对路径（位于允许根之下）
    pub absolute_path: PathBuf,
    pub filename: String,
    pub last_modified: DateTime<Utc>,
    pub size_bytes: u64,
    pub relevance_score: f32,
}

/// 评分权重
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankWeights {
    pub keyword: f32,
    pub recency: f32,
    pub size: f32,
}

impl Default for RankWeights {
    fn default() -> Self {
        Self {
            keyword: 0.6,
            recency: 0.25,
            size: 0.15,
        }
    }
}

const KB: u64 = 1024;
const MB: u64 = 1024 * KB;
const GB: u64 = 1024 * MB;

fn plausible_size_range(filename: &str) -> (u64, u64) {
    match extension_of(filename).as_deref() {
        Some("pdf" | "doc" | "docx" | "odt" | "rtf" | "xls" | "xlsx" | "ppt" | "pptx") => {
            (KB, 100 * MB)
        }
        Some("txt" | "md" | "csv" | "json" | "xml") => (1, 50 * MB),
        Some("png" | "jpg" | "jpeg" | "gif") => (KB, 50 * MB),
        Some("zip") => (100, 2 * GB),
        _ => (1, 500 * MB),
    }
}

pub fn size_plausibility(filename: &str, size_bytes: u64) -> f32 {
    if size_bytes == 0 {
        return 0.0;
    }
    let (min, max) = plausible_size_range(filename);
    if (min..=max).contains(&size_bytes) {
        1.0
    } else {
        0.5
    }
}

fn tokens(s: &str) -> Vec<&str> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect()
}

pub fn keyword_strength(filename: &str, query: &FileQuery) -> f32 {
    if query.keywords.is_empty() {
        return 0.0;
    }
    let name = filename.to_lowercase();
    let name_tokens = tokens(&name);
    let stem = match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name.as_str(),
    };
    let stem_chars = stem.chars().filter(|c| c.is_alphanumeric()).count().max(1);

    let mut total = 0.0_f32;
    let mut matched_chars = 0usize;
    for keyword in &query.keywords {
        if name_tokens.iter().any(|t| t == keyword) {
            total += 1.0;
        } else if name.contains(keyword.as_str()) {
            total += 0.5;
        } else {
            continue;
        }
        if stem.contains(keyword.as_str()) {
            matched_chars += keyword.chars().count();
        }
    }

    let match_avg = total / query.keywords.len() as f32;
    let coverage = (matched_chars as f32 / stem_chars as f32).min(1.0);
    0.7 * match_avg + 0.3 * coverage
}

/// 计算 relevance_score 并排序（降序）
pub fn rank_candidates(
    mut candidates: Vec<FileCandidate>,
    query: &FileQuery,
    weights: RankWeights,
) -> Vec<FileCandidate> {
    let newest = candidates.iter().map(|c| c.last_modified).max();
    let oldest = candidates.iter().map(|c| c.last_modified).min();
    let span = match (newest, oldest) {
        (Some(n), Some(o)) => (n - o).num_milliseconds(),
        _ => 0,
    };

    for candidate in &mut candidates {
        let recency = match oldest {
            Some(o) if span > 0 => {
                (candidate.last_modified - o).num_milliseconds() as f32 / span as f32
            }
            _ => 1.0,
        };
        let score = weights.keyword * keyword_strength(&candidate.filename, query)
            + weights.recency * recency
            + weights.size * size_plausibility(&candidate.filename, candidate.size_bytes);
        candidate.relevance_score = score.clamp(0.0, 1.0);
    }

    candidates.sort_by(|a, b| {
        b.relevance_score
            .total_cmp(&a.relevance_score)
            .then_with(|| b.last_modified.cmp(&a.last_modified))
            .then_with(|| a.absolute_path.cmp(&b.absolute_path))
    });
    candidates
}
