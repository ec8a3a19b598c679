use serde::Serialize;

use crate::descriptor::{BackendKind, DescriptorSet};
use crate::hamming;

/// 没有任何可比较行时的分数
pub const NO_MATCH_SCORE: f32 = 9999.;

/// 两组描述符的比较结果
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchResult {
    /// 原始距离分数，越低越相似
    pub score: f32,
    /// 参与计算的行数（或匹配对数）
    pub match_count: usize,
    /// 归一化到 0~1 的相似度，越高越相似
    pub similarity: f32,
    /// 产生该结果的后端
    pub backend: BackendKind,
}

impl MatchResult {
    /// 是否至少有一行参与了比较
    pub fn is_comparable(&self) -> bool {
        self.match_count > 0
    }
}

/// 原始距离到相似度的线性映射：距离 0 为 1，距离大于等于 `scale` 为 0
pub fn similarity_from_distance(score: f32, scale: f32) -> f32 {
    if !score.is_finite() || scale <= 0. {
        return 0.;
    }
    (1. - score / scale).clamp(0., 1.)
}

/// 按位置对齐比较两组描述符，计算平均 L1 距离
///
/// 第 `i` 个查询行只与第 `i` 个存储行比较，宽度不同的行跳过。
/// 这不是最近邻匹配，只对逐字节一致的描述符（例如内容哈希兜底）有意义。
///
/// 返回 `(score, match_count)`
pub fn positional_l1(query: &DescriptorSet, stored: &DescriptorSet) -> (f32, usize) {
    let mut total = 0u64;
    let mut count = 0usize;
    for (q, s) in query.rows.iter().zip(&stored.rows) {
        if q.is_empty() || q.len() != s.len() {
            continue;
        }
        total += q.iter().zip(s).map(|(a, b)| a.abs_diff(*b) as u64).sum::<u64>();
        count += 1;
    }
    match count {
        0 => (NO_MATCH_SCORE, 0),
        _ => (total as f32 / count as f32, count),
    }
}

/// 暴力汉明匹配 + 交叉验证，分数为互为最近邻的匹配对的平均汉明距离
///
/// 返回 `(score, match_count)`
pub fn cross_check_hamming(query: &DescriptorSet, stored: &DescriptorSet) -> (f32, usize) {
    let matches = hamming::cross_check_matches(&query.rows, &stored.rows);
    if matches.is_empty() {
        return (NO_MATCH_SCORE, 0);
    }
    let total = matches.iter().map(|&(_, _, d)| d as u64).sum::<u64>();
    (total as f32 / matches.len() as f32, matches.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(rows: Vec<Vec<u8>>) -> DescriptorSet {
        DescriptorSet::new(BackendKind::Fallback, rows)
    }

    #[test]
    fn test_identical_sets_score_zero() {
        let a = set(vec![vec![1, 2, 3], vec![200, 100, 0]]);
        assert_eq!(positional_l1(&a, &a), (0., 2));
        assert_eq!(cross_check_hamming(&a, &a), (0., 2));
    }

    #[test]
    fn test_positional_average() {
        let a = set(vec![vec![0, 0], vec![10, 10]]);
        let b = set(vec![vec![1, 1], vec![0, 0]]);
        // (2 + 20) / 2
        assert_eq!(positional_l1(&a, &b), (11., 2));
    }

    #[test]
    fn test_positional_only_common_prefix() {
        let a = set(vec![vec![0, 0], vec![10, 10], vec![5, 5]]);
        let b = set(vec![vec![0, 0]]);
        assert_eq!(positional_l1(&a, &b), (0., 1));
    }

    #[test]
    fn test_positional_skips_width_mismatch() {
        let a = set(vec![vec![0, 0], vec![4, 4]]);
        let b = set(vec![vec![0, 0, 0], vec![0, 0]]);
        assert_eq!(positional_l1(&a, &b), (8., 1));
    }

    #[test]
    fn test_no_comparable_rows() {
        let a = set(vec![]);
        let b = set(vec![vec![1]]);
        assert_eq!(positional_l1(&a, &b), (NO_MATCH_SCORE, 0));
        assert_eq!(cross_check_hamming(&a, &b), (NO_MATCH_SCORE, 0));
    }

    #[test]
    fn test_similarity_from_distance() {
        assert_eq!(similarity_from_distance(0., 100.), 1.);
        assert_eq!(similarity_from_distance(50., 100.), 0.5);
        assert_eq!(similarity_from_distance(NO_MATCH_SCORE, 100.), 0.);
        assert_eq!(similarity_from_distance(f32::NAN, 100.), 0.);
        assert_eq!(similarity_from_distance(10., 0.), 0.);
    }
}
