use std::fmt;
use std::path::Path;

use image::imageops::FilterType;
use log::warn;
use serde::Serialize;

use crate::catalog::MediaRecord;
use crate::error::{Result, VisionError};

/// 默认哈希尺寸，生成 16x16 = 256 位的哈希
pub const DEFAULT_HASH_SIZE: u32 = 16;
/// [`PerceptualHashService::are_similar`] 的默认阈值
pub const DEFAULT_SIMILAR_THRESHOLD: u32 = 5;

/// 两个感知哈希之间相似程度的文字描述
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HashSimilarity {
    Identical,
    VerySimilar,
    Similar,
    SomewhatSimilar,
    Different,
}

impl fmt::Display for HashSimilarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Identical => "Identical",
            Self::VerySimilar => "Very Similar",
            Self::Similar => "Similar",
            Self::SomewhatSimilar => "Somewhat Similar",
            Self::Different => "Different",
        })
    }
}

/// 基于梯度（差值）哈希的感知哈希
///
/// 与特征后端无关，任意两张图片的哈希都可以比较
pub struct PerceptualHashService;

impl PerceptualHashService {
    /// 生成图片的感知哈希
    ///
    /// 图片转为灰度并缩放到 `(size + 1) x size`，每行相邻像素左边小于右边记为 1，
    /// 按行优先、高位在前打包成 `size² / 4` 个小写十六进制字符
    pub fn generate_hash(path: impl AsRef<Path>, size: u32) -> Result<String> {
        if size < 2 || size % 2 != 0 {
            return Err(VisionError::InvalidHashSize(size));
        }
        let image = image::open(path.as_ref())?;
        let gray = image.resize_exact(size + 1, size, FilterType::Triangle).to_luma8();

        let mut bits = Vec::with_capacity((size * size) as usize);
        for y in 0..size {
            for x in 0..size {
                let left = gray.get_pixel(x, y).0[0];
                let right = gray.get_pixel(x + 1, y).0[0];
                bits.push(left < right);
            }
        }
        Ok(encode_bits(&bits))
    }

    /// [`PerceptualHashService::generate_hash`] 的异步版本，在阻塞线程池中解码图片
    pub async fn generate_hash_async(path: impl AsRef<Path>, size: u32) -> Result<String> {
        let path = path.as_ref().to_path_buf();
        tokio::task::spawn_blocking(move || Self::generate_hash(path, size))
            .await
            .map_err(|e| VisionError::Extraction(format!("hash task failed: {}", e)))?
    }

    /// 逐字符比较两个哈希，返回不同字符的数量
    pub fn hamming_distance(a: &str, b: &str) -> Result<u32> {
        let (a, b) = (a.trim(), b.trim());
        if a.is_empty() {
            return Err(VisionError::InvalidHash(a.to_string()));
        }
        if b.is_empty() {
            return Err(VisionError::InvalidHash(b.to_string()));
        }
        let (len_a, len_b) = (a.chars().count(), b.chars().count());
        if len_a != len_b {
            return Err(VisionError::HashLengthMismatch(len_a, len_b));
        }
        Ok(a.chars().zip(b.chars()).filter(|(x, y)| x != y).count() as u32)
    }

    /// 两个哈希的距离不超过 `threshold` 时认为相似，任何一个哈希不合法都返回 `false`
    pub fn are_similar(a: &str, b: &str, threshold: u32) -> bool {
        let (Some(a), Some(b)) = (Self::normalize_hash(a), Self::normalize_hash(b)) else {
            warn!("无法比较感知哈希：哈希为空或格式不正确");
            return false;
        };
        match Self::hamming_distance(&a, &b) {
            Ok(distance) => distance <= threshold,
            Err(e) => {
                warn!("无法比较感知哈希: {}", e);
                false
            }
        }
    }

    pub fn are_identical(a: &str, b: &str) -> bool {
        Self::are_similar(a, b, 0)
    }

    pub fn similarity_description(distance: u32) -> HashSimilarity {
        match distance {
            0 => HashSimilarity::Identical,
            1..=2 => HashSimilarity::VerySimilar,
            3..=5 => HashSimilarity::Similar,
            6..=10 => HashSimilarity::SomewhatSimilar,
            _ => HashSimilarity::Different,
        }
    }

    /// 十六进制字符串且至少 8 个字符
    pub fn is_valid_hash(hash: &str) -> bool {
        let hash = hash.trim();
        hash.len() >= 8 && hash.chars().all(|c| c.is_ascii_hexdigit())
    }

    /// 去掉首尾空白并转为小写，不合法时返回 `None`
    pub fn normalize_hash(hash: &str) -> Option<String> {
        let hash = hash.trim().to_ascii_lowercase();
        Self::is_valid_hash(&hash).then_some(hash)
    }

    /// 在记录中查找与 `hash` 距离不超过 `threshold` 的记录，返回 `(记录, 距离)`，保持原有顺序
    pub fn find_similar<'a>(
        hash: &str,
        records: &'a [MediaRecord],
        threshold: u32,
    ) -> Vec<(&'a MediaRecord, u32)> {
        let Some(hash) = Self::normalize_hash(hash) else {
            return vec![];
        };
        records
            .iter()
            .filter_map(|record| {
                let stored = Self::normalize_hash(record.perceptual_hash.as_deref()?)?;
                let distance = Self::hamming_distance(&hash, &stored).ok()?;
                (distance <= threshold).then_some((record, distance))
            })
            .collect()
    }
}

/// 每 4 位编码为一个十六进制字符
fn encode_bits(bits: &[bool]) -> String {
    bits.chunks(4)
        .map(|nibble| {
            let value = nibble.iter().fold(0u32, |acc, &bit| (acc << 1) | bit as u32);
            char::from_digit(value, 16).unwrap_or('0')
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use image::{GrayImage, Luma};
    use rstest::*;

    use super::*;

    type PHash = PerceptualHashService;

    /// 水平渐变图，亮度从左到右递增
    fn gradient_image(dir: &Path, name: &str, reverse: bool) -> std::path::PathBuf {
        let image = GrayImage::from_fn(64, 48, |x, _| {
            let v = (x * 4) as u8;
            Luma([if reverse { 255 - v } else { v }])
        });
        let path = dir.join(name);
        image.save(&path).unwrap();
        path
    }

    #[test]
    fn test_encode_bits() {
        assert_eq!(encode_bits(&[true, false, true, false, false, false, false, true]), "a1");
    }

    #[test]
    fn test_generate_hash_shape_and_determinism() {
        let dir = tempfile::tempdir().unwrap();
        let path = gradient_image(dir.path(), "a.png", false);

        let h16 = PHash::generate_hash(&path, 16).unwrap();
        assert_eq!(h16.len(), 64);
        assert_eq!(h16, PHash::generate_hash(&path, 16).unwrap());
        assert_eq!(h16, h16.to_lowercase());

        let h8 = PHash::generate_hash(&path, 8).unwrap();
        assert_eq!(h8.len(), 16);
    }

    #[test]
    fn test_gradient_direction() {
        let dir = tempfile::tempdir().unwrap();
        let up = PHash::generate_hash(gradient_image(dir.path(), "up.png", false), 8).unwrap();
        let down = PHash::generate_hash(gradient_image(dir.path(), "down.png", true), 8).unwrap();
        assert_eq!(up, "f".repeat(16));
        assert_eq!(down, "0".repeat(16));
        assert!(!PHash::are_similar(&up, &down, DEFAULT_SIMILAR_THRESHOLD));
    }

    #[test]
    fn test_invalid_size() {
        assert!(matches!(PHash::generate_hash("x.png", 7), Err(VisionError::InvalidHashSize(7))));
        assert!(matches!(PHash::generate_hash("x.png", 0), Err(VisionError::InvalidHashSize(0))));
    }

    #[test]
    fn test_hamming_distance() {
        assert_eq!(PHash::hamming_distance("abcdef01", "abcdef01").unwrap(), 0);
        assert_eq!(PHash::hamming_distance("abcdef01", "abcdef02").unwrap(), 1);
        assert!(matches!(
            PHash::hamming_distance("abcdef01", "abcdef"),
            Err(VisionError::HashLengthMismatch(8, 6))
        ));
        assert!(PHash::hamming_distance("", "abcdef01").is_err());
        // 按字符而不是字节比较长度
        assert!(matches!(
            PHash::hamming_distance("é", "ab"),
            Err(VisionError::HashLengthMismatch(1, 2))
        ));
    }

    #[rstest]
    #[case("0123456789abcdef", "fedcba9876543210")]
    #[case("00000000", "0000ffff")]
    #[case("deadbeefdeadbeef", "deadbeefdeadbeee")]
    fn test_hamming_symmetry(#[case] a: &str, #[case] b: &str) {
        assert_eq!(PHash::hamming_distance(a, b).unwrap(), PHash::hamming_distance(b, a).unwrap());
    }

    #[test]
    fn test_identity() {
        let h = "0f0f0f0f0f0f0f0f";
        assert!(PHash::are_identical(h, h));
        assert_eq!(PHash::hamming_distance(h, h).unwrap(), 0);
    }

    #[test]
    fn test_threshold_monotonic() {
        let (a, b) = ("00000000", "000000ff");
        for t1 in 0..10 {
            if PHash::are_similar(a, b, t1) {
                for t2 in t1 + 1..12 {
                    assert!(PHash::are_similar(a, b, t2));
                }
            }
        }
        assert!(!PHash::are_similar(a, b, 1));
        assert!(PHash::are_similar(a, b, 2));
    }

    #[test]
    fn test_zero_threshold_distinct() {
        assert!(!PHash::are_similar("00000000", "00000001", 0));
    }

    #[test]
    fn test_are_similar_invalid_inputs() {
        assert!(!PHash::are_similar("", "00000000", 5));
        assert!(!PHash::are_similar("xyz12345", "00000000", 5));
        assert!(!PHash::are_similar("000000", "000000", 5));
        assert!(!PHash::are_similar("00000000", "0000000000", 5));
        // 大小写和空白不影响比较
        assert!(PHash::are_identical(" ABCDEF01 ", "abcdef01"));
    }

    #[rstest]
    #[case(0, HashSimilarity::Identical, "Identical")]
    #[case(2, HashSimilarity::VerySimilar, "Very Similar")]
    #[case(5, HashSimilarity::Similar, "Similar")]
    #[case(10, HashSimilarity::SomewhatSimilar, "Somewhat Similar")]
    #[case(11, HashSimilarity::Different, "Different")]
    fn test_similarity_description(
        #[case] distance: u32,
        #[case] expected: HashSimilarity,
        #[case] text: &str,
    ) {
        let desc = PHash::similarity_description(distance);
        assert_eq!(desc, expected);
        assert_eq!(desc.to_string(), text);
    }

    #[test]
    fn test_normalize_hash() {
        assert_eq!(PHash::normalize_hash(" ABCDEF0123 "), Some("abcdef0123".to_string()));
        assert_eq!(PHash::normalize_hash("abc"), None);
        assert_eq!(PHash::normalize_hash("ghijklmn"), None);
    }

    #[test]
    fn test_find_similar() {
        let record = |id: i64, hash: Option<&str>| MediaRecord {
            id,
            title: format!("media {}", id),
            descriptors: None,
            perceptual_hash: hash.map(str::to_string),
        };
        let records = vec![
            record(1, Some("00000000")),
            record(2, Some("000000ff")),
            record(3, None),
            record(4, Some("0000")),
            record(5, Some("00000001")),
        ];
        let found = PHash::find_similar("00000000", &records, 1);
        let ids = found.iter().map(|(r, d)| (r.id, *d)).collect::<Vec<_>>();
        assert_eq!(ids, vec![(1, 0), (5, 1)]);
    }
}
