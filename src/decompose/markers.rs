//! 顺序标记识别：小型分词器 + 有限的过渡短语文法
//!
//! 分词按空白切块，再把每块归为：单词、不透明块（文件名 / URL / 引号内文本）、子句分隔符、编号前缀。
//! 只有「单词」参与短语匹配，因此 `final_then_send.docx` 或 `"then"` 永远不会触发切分。
//!
//! 文法：
//! - `then` / `and then` / `after that` / `followed by` 等在任意位置都是标记；
//! - `next` / `finally` / `first` / `step N` 等只在子句开头生效（文本开头、标点之后、`and` 之后、紧接另一个标记）；
//! - 编号前缀 `1.` `2)` 须位于子句开头或续接上一个编号，且形成连续递增序列（≥ 2 个）时才生效。

use serde::Serialize;

/// 词法单元种类
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// 普通单词（已转小写）
    Word(String),
    /// 文件名、URL、引号内文本等：不参与标记匹配
    Opaque,
    /// 子句分隔：逗号、分号、句号、冒号、换行
    Separator,
    /// 编号步骤前缀（`1.` `2)` `(3)`）
    Enumeration(u32),
}

/// 带字节区间的词法单元
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

/// 标记种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerKind {
    /// 过渡短语：then / after that / finally ...
    Transition,
    /// 序数词：first / second / step 2
    Ordinal,
    /// 编号前缀：1. 2)
    Enumeration,
}

/// 在原文中识别出的一个顺序标记（字节区间）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Marker {
    pub start: usize,
    pub end: usize,
    pub phrase: String,
    pub kind: MarkerKind,
}

struct Phrase {
    words: &'static [&'static str],
    /// false 表示只在子句开头生效
    anywhere: bool,
    kind: MarkerKind,
}

const fn anywhere(words: &'static [&'static str]) -> Phrase {
    Phrase {
        words,
        anywhere: true,
        kind: MarkerKind::Transition,
    }
}

const fn clause_start(words: &'static [&'static str], kind: MarkerKind) -> Phrase {
    Phrase {
        words,
        anywhere: false,
        kind,
    }
}

// 同一位置按顺序尝试，较长的短语在前
const PHRASES: &[Phrase] = &[
    anywhere(&["and", "after", "that"]),
    clause_start(&["once", "that", "is", "done"], MarkerKind::Transition),
    clause_start(&["once", "that's", "done"], MarkerKind::Transition),
    anywhere(&["and", "then"]),
    anywhere(&["after", "that"]),
    anywhere(&["followed", "by"]),
    anywhere(&["and", "finally"]),
    anywhere(&["and", "lastly"]),
    clause_start(&["once", "done"], MarkerKind::Transition),
    clause_start(&["once", "finished"], MarkerKind::Transition),
    clause_start(&["when", "done"], MarkerKind::Transition),
    anywhere(&["then"]),
    clause_start(&["afterwards"], MarkerKind::Transition),
    clause_start(&["afterward"], MarkerKind::Transition),
    clause_start(&["subsequently"], MarkerKind::Transition),
    clause_start(&["next"], MarkerKind::Transition),
    clause_start(&["finally"], MarkerKind::Transition),
    clause_start(&["lastly"], MarkerKind::Transition),
    clause_start(&["first"], MarkerKind::Ordinal),
    clause_start(&["firstly"], MarkerKind::Ordinal),
    clause_start(&["second"], MarkerKind::Ordinal),
    clause_start(&["secondly"], MarkerKind::Ordinal),
    clause_start(&["third"], MarkerKind::Ordinal),
    clause_start(&["thirdly"], MarkerKind::Ordinal),
];

const TRAILING_PUNCT: &[char] = &[',', ';', ':', '.', '!', '?', ')', ']'];
const SEPARATOR_PUNCT: &[char] = &[',', ';', ':', '.', '!', '?'];
const LEADING_PUNCT: &[char] = &['(', '['];

fn closing_quote(c: char) -> Option<char> {
    match c {
        '"' => Some('"'),
        '\'' => Some('\''),
        '`' => Some('`'),
        '\u{201C}' => Some('\u{201D}'),
        '\u{2018}' => Some('\u{2019}'),
        _ => None,
    }
}

/// 把文本切成词法单元
pub fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut quote: Option<char> = None;
    let mut chunk_start: Option<usize> = None;

    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            if let Some(s) = chunk_start.take() {
                push_chunk(&text[s..i], s, &mut quote, &mut tokens);
            }
            if c == '\n' && quote.is_none() {
                tokens.push(Token {
                    kind: TokenKind::Separator,
                    start: i,
                    end: i + 1,
                });
            }
        } else if chunk_start.is_none() {
            chunk_start = Some(i);
        }
    }
    if let Some(s) = chunk_start {
        push_chunk(&text[s..], s, &mut quote, &mut tokens);
    }
    tokens
}

fn push_separator_if_any(trailing: &str, end: usize, tokens: &mut Vec<Token>) {
    if trailing.contains(SEPARATOR_PUNCT) {
        tokens.push(Token {
            kind: TokenKind::Separator,
            start: end - trailing.len(),
            end,
        });
    }
}

fn push_chunk(chunk: &str, offset: usize, quote: &mut Option<char>, tokens: &mut Vec<Token>) {
    let end = offset + chunk.len();

    // 引号内：整块不透明，遇到闭合引号退出
    if let Some(close) = *quote {
        tokens.push(Token {
            kind: TokenKind::Opaque,
            start: offset,
            end,
        });
        let stripped = chunk.trim_end_matches(TRAILING_PUNCT);
        if stripped.ends_with(close) {
            *quote = None;
            push_separator_if_any(&chunk[stripped.len()..], end, tokens);
        }
        return;
    }

    let mut chars = chunk.chars();
    if let Some(close) = chunk.chars().next().and_then(closing_quote) {
        chars.next();
        let rest = chars.as_str();
        let stripped = rest.trim_end_matches(TRAILING_PUNCT);
        tokens.push(Token {
            kind: TokenKind::Opaque,
            start: offset,
            end,
        });
        if !stripped.is_empty() && stripped.ends_with(close) {
            push_separator_if_any(&rest[stripped.len()..], end, tokens);
        } else {
            *quote = Some(close);
        }
        return;
    }

    let lead = chunk.len() - chunk.trim_start_matches(LEADING_PUNCT).len();
    let body = &chunk[lead..];
    let core = body.trim_end_matches(TRAILING_PUNCT);
    let trailing = &body[core.len()..];
    let core_start = offset + lead;
    let core_end = core_start + core.len();

    if core.is_empty() {
        push_separator_if_any(trailing, end, tokens);
        return;
    }

    if core.len() <= 2
        && core.chars().all(|c| c.is_ascii_digit())
        && (trailing.starts_with('.') || trailing.starts_with(')'))
    {
        if let Some(n) = core.parse::<u32>().ok().filter(|&n| opens_step(tokens, n)) {
            tokens.push(Token {
                kind: TokenKind::Enumeration(n),
                start: offset,
                end,
            });
            return;
        }
    }

    let is_word = core
        .chars()
        .all(|c| c.is_alphanumeric() || c == '\'' || c == '\u{2019}');
    let kind = if is_word {
        TokenKind::Word(core.to_lowercase())
    } else {
        TokenKind::Opaque
    };
    tokens.push(Token {
        kind,
        start: core_start,
        end: core_end,
    });
    push_separator_if_any(trailing, end, tokens);
}

/// 编号只在子句开头出现，或紧接上一个编号（n - 1）续写时才是步骤前缀；
/// 否则（"chapter 1."）按普通单词处理
fn opens_step(tokens: &[Token], n: u32) -> bool {
    if matches!(tokens.last().map(|t| &t.kind), None | Some(TokenKind::Separator)) {
        return true;
    }
    let previous = tokens.iter().rev().find_map(|t| match t.kind {
        TokenKind::Enumeration(m) => Some(m),
        _ => None,
    });
    previous.map_or(false, |m| m + 1 == n)
}

fn word_at<'a>(tokens: &'a [Token], i: usize) -> Option<&'a str> {
    match tokens.get(i).map(|t| &t.kind) {
        Some(TokenKind::Word(w)) => Some(w.as_str()),
        _ => None,
    }
}

fn is_clause_start(tokens: &[Token], i: usize, last_marker_end: Option<usize>) -> bool {
    if i == 0 || last_marker_end == Some(i) {
        return true;
    }
    match &tokens[i - 1].kind {
        TokenKind::Separator | TokenKind::Enumeration(_) => true,
        TokenKind::Word(w) => w == "and",
        TokenKind::Opaque => false,
    }
}

fn match_phrase(tokens: &[Token], i: usize, clause_start: bool) -> Option<(usize, MarkerKind)> {
    for phrase in PHRASES {
        if !phrase.anywhere && !clause_start {
            continue;
        }
        let n = phrase.words.len();
        let matched = (0..n).all(|k| word_at(tokens, i + k) == Some(phrase.words[k]));
        if matched {
            return Some((n, phrase.kind));
        }
    }
    // step N
    if clause_start && word_at(tokens, i) == Some("step") {
        let numbered = match tokens.get(i + 1).map(|t| &t.kind) {
            Some(TokenKind::Word(w)) => w.chars().all(|c| c.is_ascii_digit()),
            Some(TokenKind::Enumeration(_)) => true,
            _ => false,
        };
        if numbered {
            return Some((2, MarkerKind::Ordinal));
        }
    }
    None
}

/// 编号前缀只有构成连续递增序列时才算标记
fn enumeration_run_is_valid(tokens: &[Token]) -> bool {
    let numbers: Vec<u32> = tokens
        .iter()
        .filter_map(|t| match t.kind {
            TokenKind::Enumeration(n) => Some(n),
            _ => None,
        })
        .collect();
    numbers.len() >= 2 && numbers.windows(2).all(|w| w[1] == w[0] + 1)
}

/// 在文本中查找全部顺序标记（按出现顺序）
pub fn find_markers(text: &str) -> Vec<Marker> {
    let tokens = tokenize(text);
    let enumerations = enumeration_run_is_valid(&tokens);
    let mut markers = Vec::new();
    let mut last_marker_end: Option<usize> = None;
    let mut i = 0;

    while i < tokens.len() {
        if let TokenKind::Enumeration(_) = tokens[i].kind {
            if enumerations {
                markers.push(Marker {
                    start: tokens[i].start,
                    end: tokens[i].end,
                    phrase: text[tokens[i].start..tokens[i].end].to_string(),
                    kind: MarkerKind::Enumeration,
                });
                last_marker_end = Some(i + 1);
            }
            i += 1;
            continue;
        }

        let clause_start = is_clause_start(&tokens, i, last_marker_end);
        if let Some((len, kind)) = match_phrase(&tokens, i, clause_start) {
            let start = tokens[i].start;
            let end = tokens[i + len - 1].end;
            let phrase = tokens[i..i + len]
                .iter()
                .filter_map(|t| match &t.kind {
                    TokenKind::Word(w) => Some(w.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(" ");
            markers.push(Marker {
                start,
                end,
                phrase,
                kind,
            });
            i += len;
            last_marker_end = Some(i);
            continue;
        }
        i += 1;
    }
    markers
}

/// 文本中是否含有顺序标记
pub fn has_marker(text: &str) -> bool {
    !find_markers(text).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phrases(text: &str) -> Vec<String> {
        find_markers(text).into_iter().map(|m| m.phrase).collect()
    }

    #[test]
    fn test_tokenize_separates_trailing_punctuation() {
        let tokens = tokenize("hello, world");
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].kind, TokenKind::Word("hello".into()));
        assert_eq!(tokens[1].kind, TokenKind::Separator);
        assert_eq!(tokens[2].kind, TokenKind::Word("world".into()));
        assert_eq!(&"hello, world"[tokens[0].start..tokens[0].end], "hello");
    }

    #[test]
    fn test_filenames_and_urls_are_opaque() {
        let tokens = tokenize("save as final_then_send.docx and visit https://x.com/then");
        assert!(tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Opaque)
            .count()
            >= 2);
        assert!(phrases("save as final_then_send.docx").is_empty());
        assert!(phrases("open https://example.com/then/next").is_empty());
    }

    #[test]
    fn test_quoted_text_never_splits() {
        assert!(phrases(r#"type "first do this then that" in notepad"#).is_empty());
        assert!(phrases("write 'then' into the box").is_empty());
        assert_eq!(phrases(r#"type "hello" then save"#), vec!["then"]);
    }

    #[test]
    fn test_and_then_is_a_single_marker() {
        assert_eq!(phrases("open notepad and then type hi"), vec!["and then"]);
    }

    #[test]
    fn test_clause_start_markers() {
        assert_eq!(
            phrases("first open notepad, next type hello, finally save it"),
            vec!["first", "next", "finally"]
        );
        // 非子句开头：不是标记
        assert!(phrases("click the next button").is_empty());
        assert!(phrases("open the first file").is_empty());
    }

    #[test]
    fn test_adjacent_markers() {
        assert_eq!(phrases("open word then finally save"), vec!["then", "finally"]);
    }

    #[test]
    fn test_step_prefix() {
        assert_eq!(
            phrases("step 1: open notepad. step 2: type hi"),
            vec!["step 1", "step 2"]
        );
    }

    #[test]
    fn test_enumerations_require_consecutive_run() {
        let markers = find_markers("1. open notepad 2. type hello 3. save");
        assert_eq!(markers.len(), 3);
        assert!(markers.iter().all(|m| m.kind == MarkerKind::Enumeration));

        assert!(find_markers("install version 2. it is faster").is_empty());
        assert!(find_markers("1. open notepad 3. save").is_empty());

        // 句中的数字属于正文
        assert_eq!(
            phrases("write chapter 1. then write chapter 2. then save"),
            vec!["then", "then"]
        );
        assert_eq!(phrases("type 1. then type 2."), vec!["then"]);
        let tokens = tokenize("write chapter 1. then");
        assert_eq!(tokens[2].kind, TokenKind::Word("1".into()));
        assert_eq!(tokens[3].kind, TokenKind::Separator);
    }

    #[test]
    fn test_negative_corpus() {
        let negatives = [
            "open notepad and write hello",
            "go to example.com",
            "save as final_then_send.docx",
            "rename next_steps.txt to done.txt",
            "search for 'after that' lyrics",
            "email the report to bob",
        ];
        for text in negatives {
            assert!(!has_marker(text), "unexpected marker in: {text}");
        }
    }

    #[test]
    fn test_positive_corpus() {
        let positives = [
            "open notepad then type hello",
            "open word, write 5 words, save, then email the file via gmail",
            "download the invoice. after that, move it to documents",
            "open calculator followed by notepad",
            "first open excel. finally close it",
            "open chrome. once done, close it",
        ];
        for text in positives {
            assert!(has_marker(text), "missing marker in: {text}");
        }
    }
}
