use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;

use crate::descriptor::{BackendKind, Extraction};

/// 缓存统计信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub backend: Option<BackendKind>,
    pub size: usize,
    /// 缓存的文件名（不含目录）
    pub keys: Vec<String>,
}

impl CacheStats {
    pub fn empty(backend: Option<BackendKind>) -> Self {
        Self { backend, size: 0, keys: vec![] }
    }
}

/// 按图片路径缓存特征提取结果
///
/// 没有淘汰策略，只能通过 [`DescriptorCache::clear`] 清空
pub struct DescriptorCache {
    backend: BackendKind,
    entries: Mutex<HashMap<PathBuf, Extraction>>,
}

impl DescriptorCache {
    pub fn new(backend: BackendKind) -> Self {
        Self { backend, entries: Mutex::new(HashMap::new()) }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, Extraction>> {
        // 持锁期间不会 panic，中毒后继续使用内部数据
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, path: &Path) -> Option<Extraction> {
        self.lock().get(path).cloned()
    }

    pub fn insert(&self, path: PathBuf, extraction: Extraction) {
        self.lock().insert(path, extraction);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.lock();
        let mut keys = entries
            .keys()
            .map(|k| k.file_name().unwrap_or(k.as_os_str()).to_string_lossy().to_string())
            .collect::<Vec<_>>();
        keys.sort_unstable();
        CacheStats { backend: Some(self.backend), size: entries.len(), keys }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_clear() {
        let cache = DescriptorCache::new(BackendKind::Native);
        let path = PathBuf::from("/tmp/images/a.jpg");
        assert!(cache.get(&path).is_none());

        cache.insert(path.clone(), Extraction::new(BackendKind::Native, vec![vec![1, 2]]));
        assert_eq!(cache.get(&path).unwrap().feature_count, 1);

        let stats = cache.stats();
        assert_eq!(stats.size, 1);
        assert_eq!(stats.keys, vec!["a.jpg".to_string()]);
        assert_eq!(stats.backend, Some(BackendKind::Native));

        cache.clear();
        assert!(cache.is_empty());
    }
}
