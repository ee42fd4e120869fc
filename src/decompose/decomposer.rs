//! 顺序分解器
//!
//! 在顺序标记处切分目标，去掉标记本身、保持片段顺序；没有标记时整段作为唯一片段。
//! 相邻标记（如 "then finally"）之间没有内容时合并为一个边界；
//! 非空但字母数字字符不足 `min_segment_chars` 的片段标记为退化（degenerate），由路由器作为跳过的阶段处理。

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::decompose::markers::find_markers;

/// 片段首尾需要剥离的标点
const SEGMENT_PUNCT: &[char] = &[',', ';', ':', '.', '!', '?'];

/// 拼接片段时使用的过渡短语（`decompose_join` 的结果再次分解得到相同片段）
const JOIN_PHRASE: &str = ", then ";

/// 分解出的一个片段
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub text: String,
    /// 片段之前的标记短语（第一个片段若无前导标记则为 None）
    pub marker: Option<String>,
    /// 过短片段：不执行，作为跳过的阶段记录
    pub degenerate: bool,
    /// 本片段将产出的文件名（"save as report.docx"）
    pub file_hints: Vec<String>,
}

/// 分解结果（包含退化片段，供路由器生成跳过的阶段）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decomposition {
    pub segments: Vec<Segment>,
}

impl Decomposition {
    /// 有效片段的文本
    pub fn texts(&self) -> Vec<String> {
        self.segments
            .iter()
            .filter(|s| !s.degenerate)
            .map(|s| s.text.clone())
            .collect()
    }

    /// 至少两个有效片段才算顺序任务
    pub fn is_sequential(&self) -> bool {
        self.segments.iter().filter(|s| !s.degenerate).count() >= 2
    }
}

/// 顺序分解器：纯函数式，无 I/O，相同输入得到相同输出
#[derive(Debug, Clone)]
pub struct Decomposer {
    min_segment_chars: usize,
}

impl Decomposer {
    pub fn new() -> Self {
        Self {
            min_segment_chars: 3,
        }
    }

    pub fn with_min_segment_chars(mut self, min_segment_chars: usize) -> Self {
        self.min_segment_chars = min_segment_chars;
        self
    }

    /// 分解为有序子目标文本，长度 ≥ 1
    pub fn decompose(&self, text: &str) -> Vec<String> {
        self.decompose_detailed(text).texts()
    }

    /// 分解并保留退化片段、标记与文件提示
    pub fn decompose_detailed(&self, text: &str) -> Decomposition {
        let markers = find_markers(text);
        let mut segments = Vec::new();
        let mut cursor = 0;
        let mut pending_marker: Option<String> = None;

        for m in &markers {
            self.push_piece(&text[cursor..m.start], &mut pending_marker, &mut segments);
            pending_marker = merge_marker(pending_marker.take(), m.phrase.clone());
            cursor = m.end;
        }
        self.push_piece(&text[cursor..], &mut pending_marker, &mut segments);

        if segments.iter().all(|s| s.degenerate) {
            let whole = clean_segment(text);
            if !segments.is_empty() {
                tracing::warn!(
                    objective = %text,
                    "all segments degenerate, treating objective as a single phase"
                );
            }
            return Decomposition {
                segments: vec![Segment {
                    file_hints: extract_file_hints(&whole),
                    text: whole,
                    marker: None,
                    degenerate: false,
                }],
            };
        }

        Decomposition { segments }
    }

    fn push_piece(
        &self,
        piece: &str,
        pending_marker: &mut Option<String>,
        segments: &mut Vec<Segment>,
    ) {
        let cleaned = clean_segment(piece);
        if cleaned.is_empty() {
            return;
        }
        let alnum = cleaned.chars().filter(|c| c.is_alphanumeric()).count();
        let degenerate = alnum < self.min_segment_chars;
        if degenerate {
            tracing::warn!(segment = %cleaned, "degenerate segment skipped");
        }
        segments.push(Segment {
            file_hints: if degenerate {
                Vec::new()
            } else {
                extract_file_hints(&cleaned)
            },
            text: cleaned,
            marker: pending_marker.take(),
            degenerate,
        });
    }
}

impl Default for Decomposer {
    fn default() -> Self {
        Self::new()
    }
}

fn merge_marker(pending: Option<String>, next: String) -> Option<String> {
    match pending {
        Some(prev) => Some(format!("{prev} {next}")),
        None => Some(next),
    }
}

/// 把片段重新拼接成一个目标文本；再次分解得到相同片段
pub fn decompose_join(segments: &[String]) -> String {
    segments.join(JOIN_PHRASE)
}

fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        s.get(prefix.len()..)
    } else {
        None
    }
}

fn strip_suffix_ci<'a>(s: &'a str, suffix: &str) -> Option<&'a str> {
    let cut = s.len().checked_sub(suffix.len())?;
    let tail = s.get(cut..)?;
    if tail.eq_ignore_ascii_case(suffix) {
        s.get(..cut)
    } else {
        None
    }
}

/// 去掉首尾空白、标点，以及悬挂的 "and"
fn clean_segment(piece: &str) -> String {
    let mut s = piece.trim_matches(|c: char| c.is_whitespace() || SEGMENT_PUNCT.contains(&c));
    loop {
        let before = s.len();
        if s.eq_ignore_ascii_case("and") {
            s = "";
        }
        if let Some(rest) = strip_prefix_ci(s, "and ") {
            s = rest;
        }
        if let Some(rest) = strip_suffix_ci(s, " and") {
            s = rest;
        }
        s = s.trim_matches(|c: char| c.is_whitespace() || SEGMENT_PUNCT.contains(&c));
        if s.len() == before {
            break;
        }
    }
    s.to_string()
}

fn file_hint_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            // save it as report.docx / save the document to notes.txt
            r#"(?i)\b(?:save|saves|saved|saving)\b(?:\s+[\w']+){0,4}?\s+(?:as|to)\s+["'\u{201C}]?([^\s"'\u{201D},;]+\.[A-Za-z0-9]{1,5})"#,
            // file named notes / document called plan.txt
            r#"(?i)\b(?:file|document|spreadsheet|presentation)\s+(?:named|called)\s+["'\u{201C}]?([^\s"'\u{201D},;]+)"#,
            // name it budget.xlsx
            r#"(?i)\bname\s+(?:it|the\s+file)\s+(?:to\s+|as\s+)?["'\u{201C}]?([^\s"'\u{201D},;]+)"#,
        ]
        .iter()
        .map(|p| Regex::new(p).expect("file hint pattern is valid"))
        .collect()
    })
}

/// 提取片段将产出的文件名
pub fn extract_file_hints(segment: &str) -> Vec<String> {
    let mut hints: Vec<String> = Vec::new();
    for re in file_hint_patterns() {
        for caps in re.captures_iter(segment) {
            if let Some(m) = caps.get(1) {
                let hint = m.as_str().trim_end_matches('.').to_string();
                if !hint.is_empty() && !hints.contains(&hint) {
                    hints.push(hint);
                }
            }
        }
    }
    hints
}
