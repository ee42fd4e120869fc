//! 顺序分解：识别过渡标记并把复合目标切分为有序子目标

pub mod decomposer;
pub mod markers;

pub use decomposer::{decompose_join, extract_file_hints, Decomposer, Decomposition, Segment};
pub use markers::{find_markers, has_marker, Marker, MarkerKind};
