//! 公式解析缓存
//!
//! 使用 DashMap 提供线程安全的语法树缓存。条目一经插入不再修改，
//! 只有解析成功的表达式会被缓存，达到容量上限后不再插入新条目。

use super::ast::Expr;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, instrument};

/// 语法树缓存
#[derive(Clone)]
pub struct FormulaCache {
    /// 表达式文本 -> 语法树
    entries: Arc<DashMap<String, Arc<Expr>>>,
    capacity: usize,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl FormulaCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            capacity,
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
        }
    }

    /// 获取当前缓存的条目数量
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 查找缓存的语法树
    pub fn get(&self, expression: &str) -> Option<Arc<Expr>> {
        match self.entries.get(expression) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(Arc::clone(entry.value()))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// 插入语法树，返回是否写入
    ///
    /// 已存在的条目保持不变。
    #[instrument(skip(self, expr))]
    pub fn insert(&self, expression: &str, expr: Arc<Expr>) -> bool {
        if self.entries.contains_key(expression) {
            return false;
        }

        if self.entries.len() >= self.capacity {
            debug!(capacity = self.capacity, "公式缓存已满，跳过缓存");
            return false;
        }

        self.entries
            .entry(expression.to_string())
            .or_insert(expr);
        true
    }

    /// 获取缓存统计信息
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;

        CacheStats {
            entries: self.entries.len(),
            capacity: self.capacity,
            hits,
            misses,
            hit_rate: if lookups > 0 {
                hits as f64 / lookups as f64
            } else {
                0.0
            },
        }
    }
}

/// 缓存统计信息
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// 当前条目数
    pub entries: usize,
    /// 条目上限
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    /// 命中率
    pub hit_rate: f64,
}
