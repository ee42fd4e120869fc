//! 分类信号评估器
//!
//! 每一层信号都是独立的 `SignalEvaluator`，对小写文本给出若干贡献（倾向 + 权重 + 命中的信号 id）。
//! 分类器按顺序运行评估器并累加，不存在评估器之间的 if/elif 依赖。

use regex::Regex;

use crate::decompose::Decomposer;

/// 信号倾向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lean {
    Desktop,
    Browser,
    /// 顺序标记：优先级高于桶多数
    Sequential,
}

/// 单个评估器的一项贡献
#[derive(Debug, Clone, PartialEq)]
pub struct SignalContribution {
    pub lean: Lean,
    pub weight: f32,
    pub signals: Vec<String>,
}

/// 信号评估器：输入为原始文本，内部自行决定大小写处理
pub trait SignalEvaluator: Send + Sync {
    fn name(&self) -> &str;

    fn evaluate(&self, text: &str) -> Vec<SignalContribution>;
}

fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!(pattern = %pattern, error = %e, "invalid signal pattern ignored");
            None
        }
    }
}

/// 关键字列表 -> 整词匹配正则
fn word_alternation(keywords: &[&str]) -> Option<Regex> {
    if keywords.is_empty() {
        return None;
    }
    let alternation = keywords
        .iter()
        .map(|k| regex::escape(k))
        .collect::<Vec<_>>()
        .join("|");
    compile(&format!(r"(?i)\b(?:{alternation})\b"))
}

/// 第一层：URL / 裸域名，强浏览器信号
pub struct UrlSignal {
    patterns: Vec<Regex>,
}

impl UrlSignal {
    pub fn new() -> Self {
        let patterns = [
            r"(?i)\bhttps?://[^\s]+",
            r"(?i)\bwww\.[a-z0-9-]+(?:\.[a-z0-9-]+)*\.[a-z]{2,}\b",
            r"(?i)\b[a-z0-9-]+(?:\.[a-z0-9-]+)*\.(?:com|org|net|edu|gov|io|co|ai)\b(?:/[^\s]*)?",
        ]
        .iter()
        .filter_map(|p| compile(p))
        .collect();
        Self { patterns }
    }
}

impl Default for UrlSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalEvaluator for UrlSignal {
    fn name(&self) -> &str {
        "url"
    }

    fn evaluate(&self, text: &str) -> Vec<SignalContribution> {
        // 按起始位置去重：https://www.x.com 只算一次
        let mut spans: Vec<(usize, usize, String)> = Vec::new();
        for re in &self.patterns {
            for m in re.find_iter(text) {
                let overlaps = spans.iter().any(|(s, e, _)| m.start() < *e && *s < m.end());
                if !overlaps {
                    spans.push((m.start(), m.end(), m.as_str().to_lowercase()));
                }
            }
        }
        if spans.is_empty() {
            return Vec::new();
        }
        spans.sort_by_key(|(s, _, _)| *s);
        let weight = (0.85 + 0.05 * (spans.len() as f32 - 1.0)).min(0.99);
        vec![SignalContribution {
            lean: Lean::Browser,
            weight,
            signals: spans.into_iter().map(|(_, _, m)| format!("url:{m}")).collect(),
        }]
    }
}

/// 关键字族：同一族无论命中多少个同义词只计一次权重
pub struct KeywordFamily {
    pub name: &'static str,
    pub lean: Lean,
    pub weight: f32,
    matcher: Option<Regex>,
}

impl KeywordFamily {
    pub fn new(name: &'static str, lean: Lean, weight: f32, keywords: &[&str]) -> Self {
        Self {
            name,
            lean,
            weight,
            matcher: word_alternation(keywords),
        }
    }
}

/// 第二层：浏览器服务 / 桌面应用关键字族
pub struct KeywordSignal {
    families: Vec<KeywordFamily>,
}

impl KeywordSignal {
    pub fn new(families: Vec<KeywordFamily>) -> Self {
        Self { families }
    }

    /// 内置关键字族
    pub fn standard() -> Self {
        Self::new(vec![
            KeywordFamily::new(
                "web_services",
                Lean::Browser,
                0.4,
                &[
                    "gmail", "youtube", "google", "facebook", "twitter", "linkedin", "instagram",
                    "tiktok", "reddit", "github", "stackoverflow", "amazon", "netflix", "spotify",
                    "discord", "slack", "zoom", "outlook.com", "google docs", "google drive",
                    "wikipedia",
                ],
            ),
            KeywordFamily::new(
                "web_email",
                Lean::Browser,
                0.45,
                &[
                    "email", "e-mail", "inbox", "send an email", "compose", "mail it",
                    "attachment",
                ],
            ),
            KeywordFamily::new(
                "browser",
                Lean::Browser,
                0.4,
                &[
                    "browser", "chrome", "firefox", "safari", "edge", "new tab", "bookmark",
                    "address bar",
                ],
            ),
            KeywordFamily::new(
                "web_pages",
                Lean::Browser,
                0.25,
                &[
                    "website", "webpage", "web page", "web site", "site", "url", "online",
                    "link", "portal", "web app",
                ],
            ),
            KeywordFamily::new(
                "desktop_apps",
                Lean::Desktop,
                0.45,
                &[
                    "notepad", "calculator", "calc", "word", "microsoft word", "excel",
                    "powerpoint", "wordpad", "paint", "file explorer", "finder", "terminal",
                    "command prompt", "cmd", "powershell", "task manager", "control panel",
                    "vscode", "visual studio", "photoshop", "textedit", "libreoffice",
                    "snipping tool",
                ],
            ),
            KeywordFamily::new(
                "system",
                Lean::Desktop,
                0.35,
                &[
                    "volume", "brightness", "wallpaper", "screen resolution", "wifi",
                    "bluetooth", "display settings", "sound settings", "printer",
                    "system settings",
                ],
            ),
            KeywordFamily::new(
                "file_system",
                Lean::Desktop,
                0.3,
                &[
                    "folder", "directory", "desktop", "documents folder", "downloads folder",
                    "rename", "zip", "unzip", "recycle bin", "trash",
                ],
            ),
            KeywordFamily::new(
                "window_actions",
                Lean::Desktop,
                0.2,
                &[
                    "right click", "context menu", "drag and drop", "minimize", "maximize",
                    "taskbar", "start menu", "dock",
                ],
            ),
        ])
    }
}

impl SignalEvaluator for KeywordSignal {
    fn name(&self) -> &str {
        "keyword"
    }

    fn evaluate(&self, text: &str) -> Vec<SignalContribution> {
        self.families
            .iter()
            .filter_map(|family| {
                let re = family.matcher.as_ref()?;
                let mut hits: Vec<String> = Vec::new();
                for m in re.find_iter(text) {
                    let hit = m.as_str().to_lowercase();
                    if !hits.contains(&hit) {
                        hits.push(hit);
                    }
                }
                if hits.is_empty() {
                    return None;
                }
                Some(SignalContribution {
                    lean: family.lean,
                    weight: family.weight,
                    signals: hits
                        .into_iter()
                        .map(|h| format!("keyword:{}:{h}", family.name))
                        .collect(),
                })
            })
            .collect()
    }
}

/// 动作动词：每个命中计 `per_hit`，同一倾向累计上限 `cap`
pub struct ActionVerbSignal {
    verbs: Vec<(Lean, &'static str, Regex)>,
    per_hit: f32,
    cap: f32,
}

impl ActionVerbSignal {
    pub fn new() -> Self {
        let table: [(Lean, &'static str, &str); 14] = [
            (Lean::Browser, "navigate", r"(?i)\bnavigate\s+to\b"),
            (Lean::Browser, "go_to", r"(?i)\bgo\s+to\b"),
            (Lean::Browser, "visit", r"(?i)\bvisit\b"),
            (Lean::Browser, "search_web", r"(?i)\bsearch\s+(?:the\s+web|online|google|for)\b"),
            (Lean::Browser, "fill_form", r"(?i)\b(?:fill|submit)\s+(?:in\s+|out\s+)?(?:a\s+|the\s+)?form\b"),
            (Lean::Browser, "download", r"(?i)\bdownload\b"),
            (Lean::Browser, "upload", r"(?i)\b(?:upload|attach)\b"),
            (Lean::Browser, "sign_in", r"(?i)\b(?:log\s*in|sign\s*in|login)\b"),
            (Lean::Desktop, "open_app", r"(?i)\b(?:open|launch|start)\s+(?:the\s+)?(?:app|application|program)\b"),
            (Lean::Desktop, "launch", r"(?i)\blaunch\b"),
            (Lean::Desktop, "save_file", r"(?i)\bsave\b"),
            (Lean::Desktop, "type_text", r"(?i)\b(?:type|write)\b"),
            (Lean::Desktop, "keyboard", r"(?i)\b(?:press|hotkey|shortcut)\b"),
            (Lean::Desktop, "window", r"(?i)\b(?:close|switch\s+to)\s+(?:the\s+)?window\b"),
        ];
        let verbs = table
            .iter()
            .filter_map(|(lean, id, p)| compile(p).map(|re| (*lean, *id, re)))
            .collect();
        Self {
            verbs,
            per_hit: 0.15,
            cap: 0.45,
        }
    }
}

impl Default for ActionVerbSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalEvaluator for ActionVerbSignal {
    fn name(&self) -> &str {
        "action"
    }

    fn evaluate(&self, text: &str) -> Vec<SignalContribution> {
        [Lean::Browser, Lean::Desktop]
            .into_iter()
            .filter_map(|lean| {
                let signals: Vec<String> = self
                    .verbs
                    .iter()
                    .filter(|(l, _, re)| *l == lean && re.is_match(text))
                    .map(|(_, id, _)| format!("action:{id}"))
                    .collect();
                if signals.is_empty() {
                    return None;
                }
                let weight = (self.per_hit * signals.len() as f32).min(self.cap);
                Some(SignalContribution {
                    lean,
                    weight,
                    signals,
                })
            })
            .collect()
    }
}

/// 顺序标记层：分解出至少两个有效片段时给出 Sequential 贡献
pub struct SequentialSignal {
    decomposer: Decomposer,
}

impl SequentialSignal {
    pub fn new(decomposer: Decomposer) -> Self {
        Self { decomposer }
    }
}

impl Default for SequentialSignal {
    fn default() -> Self {
        Self::new(Decomposer::new())
    }
}

impl SignalEvaluator for SequentialSignal {
    fn name(&self) -> &str {
        "sequential"
    }

    fn evaluate(&self, text: &str) -> Vec<SignalContribution> {
        let decomposition = self.decomposer.decompose_detailed(text);
        if !decomposition.is_sequential() {
            return Vec::new();
        }
        let signals: Vec<String> = decomposition
            .segments
            .iter()
            .filter_map(|s| s.marker.as_ref())
            .map(|m| format!("sequential:{m}"))
            .collect();
        let weight = (0.8 + 0.05 * signals.len() as f32).min(0.99);
        vec![SignalContribution {
            lean: Lean::Sequential,
            weight,
            signals,
        }]
    }
}

/// 默认评估器顺序：URL、关键字、动作动词、顺序标记
pub fn standard_evaluators(decomposer: Decomposer) -> Vec<Box<dyn SignalEvaluator>> {
    vec![
        Box::new(UrlSignal::new()),
        Box::new(KeywordSignal::standard()),
        Box::new(ActionVerbSignal::new()),
        Box::new(SequentialSignal::new(decomposer)),
    ]
}
