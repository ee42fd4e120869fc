//! 智能文件定位
//!
//! 把自然语言的文件描述解析为允许根目录之下、按相关度排序的候选文件。

pub mod engine;
pub mod keywords;
pub mod rank;
pub mod roots;
pub mod walk;

pub use engine::{FileResolver, Resolution, ResolverSettings};
pub use keywords::FileQuery;
pub use rank::{rank_candidates, FileCandidate, RankWeights};
pub use roots::{AllowedRoots, ExclusionSet, SearchScope};
