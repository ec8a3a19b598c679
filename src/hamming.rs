/// 计算两个等长字节向量的汉明距离
///
/// 长度不同时只比较公共前缀
#[inline(always)]
pub fn hamming(va: &[u8], vb: &[u8]) -> u32 {
    if va.len() == 32 && vb.len() == 32 {
        return hamming_32(va, vb);
    }
    hamming_naive(va, vb)
}

#[inline(always)]
pub fn hamming_naive(va: &[u8], vb: &[u8]) -> u32 {
    va.iter().zip(vb).map(|(a, b)| (a ^ b).count_ones()).sum()
}

/// ORB 描述符的常见宽度是 32 字节，按 u64 分块计算
#[inline(always)]
pub fn hamming_32(va: &[u8], vb: &[u8]) -> u32 {
    let mut sum = 0;
    for (ca, cb) in va.chunks_exact(8).zip(vb.chunks_exact(8)) {
        let a = u64::from_ne_bytes(ca.try_into().unwrap_or([0; 8]));
        let b = u64::from_ne_bytes(cb.try_into().unwrap_or([0; 8]));
        sum += (a ^ b).count_ones();
    }
    sum
}

/// 在 `vb` 中寻找与 `va` 汉明距离最小的行，返回 `(索引, 距离)`
///
/// 距离相同时保留先出现的行，`vb` 为空时返回 `None`
pub fn nearest<R: AsRef<[u8]>>(va: &[u8], vb: &[R]) -> Option<(usize, u32)> {
    let mut best: Option<(usize, u32)> = None;
    for (i, row) in vb.iter().enumerate() {
        let d = hamming(va, row.as_ref());
        if best.is_none_or(|(_, bd)| d < bd) {
            best = Some((i, d));
        }
    }
    best
}

/// 暴力最近邻匹配并做交叉验证：只保留互为最近邻的匹配对
///
/// 返回 `(查询索引, 存储索引, 距离)`，按查询索引排序
pub fn cross_check_matches<R: AsRef<[u8]>>(query: &[R], stored: &[R]) -> Vec<(usize, usize, u32)> {
    // 反向最近邻只需计算一次
    let backward = stored.iter().map(|row| nearest(row.as_ref(), query)).collect::<Vec<_>>();

    let mut matches = vec![];
    for (qi, row) in query.iter().enumerate() {
        let Some((si, d)) = nearest(row.as_ref(), stored) else {
            continue;
        };
        if let Some((back, _)) = backward[si] {
            if back == qi {
                matches.push((qi, si, d));
            }
        }
    }
    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hamming_identical() {
        let va = [0u8; 32];
        let vb = [0u8; 32];
        assert_eq!(hamming(&va, &vb), 0);
    }

    #[test]
    fn test_hamming_all_different() {
        let va = [0u8; 32];
        let vb = [255u8; 32];
        assert_eq!(hamming(&va, &vb), 256);
    }

    #[test]
    fn test_hamming_single_bit() {
        let va = [0u8; 1];
        let vb = [1u8; 1];
        assert_eq!(hamming(&va, &vb), 1);
    }

    #[test]
    fn test_hamming_32_matches_naive() {
        let va = (0..32).map(|i| (i * 7) as u8).collect::<Vec<_>>();
        let vb = (0..32).map(|i| (i * 13 + 5) as u8).collect::<Vec<_>>();
        assert_eq!(hamming_32(&va, &vb), hamming_naive(&va, &vb));
    }

    #[test]
    fn test_nearest() {
        let va = [0u8; 4];
        // 距离分别为 8, 1, 2
        let vb = vec![vec![255, 0, 0, 0], vec![1, 0, 0, 0], vec![3, 0, 0, 0]];
        assert_eq!(nearest(&va, &vb), Some((1, 1)));
        assert_eq!(nearest::<Vec<u8>>(&va, &[]), None);
    }

    #[test]
    fn test_cross_check_identical_sets() {
        let rows = vec![vec![0u8, 0], vec![255, 255], vec![15, 0]];
        let matches = cross_check_matches(&rows, &rows);
        assert_eq!(matches, vec![(0, 0, 0), (1, 1, 0), (2, 2, 0)]);
    }

    #[test]
    fn test_cross_check_drops_one_sided() {
        // 两个查询向量的最近邻都是存储中的第 0 行，只有更近的那个保留
        let query = vec![vec![0u8], vec![1u8]];
        let stored = vec![vec![0u8], vec![255u8]];
        let matches = cross_check_matches(&query, &stored);
        assert_eq!(matches, vec![(0, 0, 0)]);
    }
}
