//! 文件描述 -> 查询关键字
//!
//! 小写、按非字母数字切分、去停用词、去重保序；扩展名与类型词（spreadsheet、image…）另外记为扩展名提示，
//! 供关键字无命中时的扩展名回退使用。

/// 停用词（不参与文件名匹配）
const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "from", "with", "file", "files", "my", "me", "to",
    "of", "for", "in", "on", "at", "this", "that", "it", "its", "please", "named", "called",
    "attach", "upload", "send", "latest", "recent", "last", "which", "i", "is",
];

/// 扩展名回退时考虑的常见文档扩展名
pub const COMMON_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "txt", "csv", "xlsx", "xls", "pptx", "json", "xml", "md", "zip",
];

const KNOWN_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "txt", "csv", "xls", "xlsx", "ppt", "pptx", "json", "xml", "md",
    "zip", "rtf", "odt", "png", "jpg", "jpeg", "gif", "mp4", "mp3",
];

fn type_word_extensions(word: &str) -> &'static [&'static str] {
    match word {
        "spreadsheet" | "sheet" => &["xlsx", "xls", "csv"],
        "presentation" | "slides" | "deck" => &["pptx", "ppt"],
        "image" | "photo" | "picture" | "screenshot" => &["png", "jpg", "jpeg", "gif"],
        "document" | "doc" => &["docx", "doc", "pdf", "odt", "rtf", "txt"],
        "archive" => &["zip"],
        _ => &[],
    }
}

/// 解析后的文件查询
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileQuery {
    /// 文件名匹配关键字（小写）
    pub keywords: Vec<String>,
    /// 描述中提到的扩展名（含类型词展开）
    pub extensions: Vec<String>,
}

impl FileQuery {
    pub fn parse(description: &str) -> Self {
        let mut keywords: Vec<String> = Vec::new();
        let mut extensions: Vec<String> = Vec::new();

        for raw in description.split(|c: char| !c.is_alphanumeric()) {
            let word = raw.to_lowercase();
            if word.chars().count() < 2 || STOPWORDS.contains(&word.as_str()) {
                continue;
            }
            if KNOWN_EXTENSIONS.contains(&word.as_str()) && !extensions.contains(&word) {
                extensions.push(word.clone());
            }
            for ext in type_word_extensions(&word) {
                let ext = ext.to_string();
                if !extensions.contains(&ext) {
                    extensions.push(ext);
                }
            }
            if !keywords.contains(&word) {
                keywords.push(word);
            }
        }

        Self {
            keywords,
            extensions,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    /// 任一关键字是文件名（小写）的子串
    pub fn matches_name(&self, filename: &str) -> bool {
        let name = filename.to_lowercase();
        self.keywords.iter().any(|k| name.contains(k.as_str()))
    }

    /// 扩展名回退：描述给出扩展名时只接受这些，否则接受常见文档扩展名
    pub fn matches_fallback_extension(&self, filename: &str) -> bool {
        let Some(ext) = extension_of(filename) else {
            return false;
        };
        if self.extensions.is_empty() {
            COMMON_EXTENSIONS.contains(&ext.as_str())
        } else {
            self.extensions.contains(&ext)
        }
    }
}

/// 小写扩展名
pub fn extension_of(filename: &str) -> Option<String> {
    let (stem, ext) = filename.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}
