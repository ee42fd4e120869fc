//! 有界目录遍历
//!
//! 不跟随符号链接，按最大深度与排除集合剪枝；每进入一个目录检查截止时间，超时即停止并标记 truncated。
//! 目录项按文件名排序遍历。关键字命中不会提前结束遍历：按文件名关键字强度只保留最好的 `max_matches` 个，
//! 结果与文件系统的列目录顺序无关。
//! 一次遍历同时收集关键字命中与扩展名回退命中。

use std::cmp::Ordering;
use std::path::PathBuf;
use std::time::Instant;

use walkdir::WalkDir;

use crate::resolver::keywords::FileQuery;
use crate::resolver::rank::keyword_strength;
use crate::resolver::roots::ExclusionSet;

/// 遍历上限
#[derive(Debug, Clone)]
pub struct WalkLimits {
    pub max_depth: usize,
    /// 保留的关键字命中上限（按关键字强度取最好的）
    pub max_matches: usize,
    pub deadline: Instant,
}

/// 遍历结果
#[derive(Debug, Default)]
pub struct WalkOutcome {
    /// 按关键字强度降序（同分按路径）
    pub keyword_hits: Vec<PathBuf>,
    pub extension_hits: Vec<PathBuf>,
    /// 遍历中见到的关键字命中总数（含被淘汰的）
    pub keyword_matches_seen: usize,
    pub dirs_visited: usize,
    /// 因截止时间提前结束
    pub truncated: bool,
}

fn by_strength(a: &(f32, PathBuf), b: &(f32, PathBuf)) -> Ordering {
    b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1))
}

/// 只留下最好的 `keep` 个命中
fn retain_best(hits: &mut Vec<(f32, PathBuf)>, keep: usize) {
    hits.sort_by(by_strength);
    hits.truncate(keep);
}

pub fn walk_roots(
    roots: &[PathBuf],
    query: &FileQuery,
    exclusions: &ExclusionSet,
    limits: &WalkLimits,
) -> WalkOutcome {
    let mut outcome = WalkOutcome::default();
    let keep = limits.max_matches.max(1);
    let mut scored: Vec<(f32, PathBuf)> = Vec::new();

    'roots: for root in roots {
        if !root.is_dir() {
            tracing::debug!(root = %root.display(), "search root is not a directory, skipped");
            continue;
        }

        let walker = WalkDir::new(root)
            .follow_links(false)
            .max_depth(limits.max_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0 || !e.file_type().is_dir() || !exclusions.is_excluded(e.path())
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    // 无权限等错误：跳过该项继续
                    tracing::debug!(error = %e, "walk entry skipped");
                    continue;
                }
            };

            if entry.file_type().is_dir() {
                outcome.dirs_visited += 1;
                if Instant::now() >= limits.deadline {
                    outcome.truncated = true;
                    tracing::warn!(
                        dirs_visited = outcome.dirs_visited,
                        matches = outcome.keyword_matches_seen,
                        "file search deadline reached, returning partial results"
                    );
                    break 'roots;
                }
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            if query.matches_name(&name) {
                outcome.keyword_matches_seen += 1;
                scored.push((keyword_strength(&name, query), entry.into_path()));
                if scored.len() >= keep * 2 {
                    retain_best(&mut scored, keep);
                }
            } else if scored.is_empty()
                && outcome.extension_hits.len() < keep
                && query.matches_fallback_extension(&name)
            {
                outcome.extension_hits.push(entry.into_path());
            }
        }
    }

    if !scored.is_empty() {
        outcome.extension_hits.clear();
    }
    if outcome.keyword_matches_seen > keep {
        tracing::debug!(
            seen = outcome.keyword_matches_seen,
            kept = keep,
            "keyword matches beyond limit dropped by strength"
        );
    }
    retain_best(&mut scored, keep);
    outcome.keyword_hits = scored.into_iter().map(|(_, path)| path).collect();
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::roots::{default_excluded_dirs, ExclusionSet};
    use std::fs;
    use std::time::Duration;

    fn limits(max_depth: usize) -> WalkLimits {
        WalkLimits {
            max_depth,
            max_matches: 60,
            deadline: Instant::now() + Duration::from_secs(5),
        }
    }

    #[test]
    fn test_walk_prunes_excluded_dirs() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
        fs::create_dir_all(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("node_modules/pkg/n8n.js"), "x").unwrap();
        fs::write(dir.path().join("docs/n8n.md"), "x").unwrap();

        let exclusions = ExclusionSet::new(&default_excluded_dirs(), &[]);
        let out = walk_roots(
            &[dir.path().to_path_buf()],
            &FileQuery::parse("n8n"),
            &exclusions,
            &limits(10),
        );
        assert_eq!(out.keyword_hits.len(), 1);
        assert!(out.keyword_hits[0].ends_with("docs/n8n.md"));
        assert!(!out.truncated);
    }

    #[test]
    fn test_walk_respects_depth() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b/c")).unwrap();
        fs::write(dir.path().join("a/b/c/deep_n8n.txt"), "x").unwrap();
        fs::write(dir.path().join("a/n8n.txt"), "x").unwrap();

        let out = walk_roots(
            &[dir.path().to_path_buf()],
            &FileQuery::parse("n8n"),
            &ExclusionSet::default(),
            &limits(2),
        );
        assert_eq!(out.keyword_hits.len(), 1);
    }

    #[test]
    fn test_expired_deadline_truncates() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("n8n.txt"), "x").unwrap();
        let expired = WalkLimits {
            max_depth: 10,
            max_matches: 60,
            deadline: Instant::now(),
        };
        let out = walk_roots(
            &[dir.path().to_path_buf()],
            &FileQuery::parse("n8n"),
            &ExclusionSet::default(),
            &expired,
        );
        assert!(out.truncated);
        assert!(out.keyword_hits.is_empty());
    }

    #[test]
    fn test_match_limit_keeps_strongest_names() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..80 {
            fs::write(dir.path().join(format!("aa_budget_notes_{i:03}.txt")), "x").unwrap();
        }
        fs::write(dir.path().join("budget.xlsx"), "x").unwrap();

        let out = walk_roots(
            &[dir.path().to_path_buf()],
            &FileQuery::parse("budget"),
            &ExclusionSet::default(),
            &limits(10),
        );
        assert_eq!(out.keyword_matches_seen, 81);
        assert_eq!(out.keyword_hits.len(), 60);
        assert!(out.keyword_hits[0].ends_with("budget.xlsx"));
    }

    #[test]
    fn test_extension_fallback_collected_without_keyword_hits() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("summary.pdf"), "x").unwrap();
        fs::write(dir.path().join("song.mp3"), "x").unwrap();
        let out = walk_roots(
            &[dir.path().to_path_buf()],
            &FileQuery::parse("quarterly report"),
            &ExclusionSet::default(),
            &limits(10),
        );
        assert!(out.keyword_hits.is_empty());
        assert_eq!(out.extension_hits.len(), 1);
    }
}
