//! 共享检测状态 - 最近一次检测结果的快照
//!
//! 每次发布整体替换快照 (Arc 交换),读者拿到的永远是某一次发布的完整记录。

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use crate::detection::Detection;

/// 最近一次检测结果
#[derive(Clone, Debug, Default, Serialize)]
pub struct DetectionSnapshot {
    pub frame: Option<String>, // base64 JPEG
    pub detections: Vec<Detection>,
    pub count: usize,
    pub timestamp: Option<String>, // RFC 3339
    pub processing: bool,
    pub fps: f64,
    pub sequence: u64, // 发布序号, 0 表示尚未发布
}

/// 一次待发布的检测结果
#[derive(Clone, Debug)]
pub struct PublishedResult {
    pub frame: String,
    pub detections: Vec<Detection>,
    pub timestamp: String,
    pub fps: f64,
}

#[derive(Default)]
pub struct SharedDetectionState {
    inner: RwLock<Arc<DetectionSnapshot>>,
}

impl SharedDetectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 整体替换快照, 返回新的发布序号
    pub fn publish(&self, result: PublishedResult) -> u64 {
        let mut guard = self.inner.write();
        let sequence = guard.sequence + 1;
        *guard = Arc::new(DetectionSnapshot {
            count: result.detections.len(),
            frame: Some(result.frame),
            detections: result.detections,
            timestamp: Some(result.timestamp),
            processing: false,
            fps: result.fps,
            sequence,
        });
        sequence
    }

    /// 读取最近一次发布的快照 (未发布时为默认空记录)
    pub fn read(&self) -> Arc<DetectionSnapshot> {
        self.inner.read().clone()
    }

    /// 标记处理中, 其余字段保持上一次发布的值
    pub fn begin_processing(&self) {
        self.set_processing(true);
    }

    /// 处理失败时清除处理中标记
    pub fn end_processing(&self) {
        self.set_processing(false);
    }

    fn set_processing(&self, processing: bool) {
        let mut guard = self.inner.write();
        if guard.processing != processing {
            Arc::make_mut(&mut guard).processing = processing;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(n: usize) -> PublishedResult {
        PublishedResult {
            frame: format!("frame-{}", n),
            detections: vec![
                Detection {
                    x: 1.0,
                    y: 2.0,
                    width: 3.0,
                    height: 4.0,
                    confidence: 0.9,
                };
                n
            ],
            timestamp: format!("t{}", n),
            fps: n as f64,
        }
    }

    #[test]
    fn test_default_before_publish() {
        let state = SharedDetectionState::new();
        let snapshot = state.read();
        assert_eq!(snapshot.sequence, 0);
        assert!(snapshot.frame.is_none());
        assert_eq!(snapshot.count, 0);
        assert!(!snapshot.processing);
    }

    #[test]
    fn test_publish_replaces_whole_record() {
        let state = SharedDetectionState::new();
        state.publish(result(2));
        let before = state.read();
        state.publish(result(5));
        let after = state.read();

        // 旧快照不受新发布影响
        assert_eq!(before.count, 2);
        assert_eq!(before.timestamp.as_deref(), Some("t2"));
        assert_eq!(after.count, 5);
        assert_eq!(after.detections.len(), 5);
        assert_eq!(after.sequence, 2);
    }

    #[test]
    fn test_processing_flag() {
        let state = SharedDetectionState::new();
        state.publish(result(1));
        state.begin_processing();
        let busy = state.read();
        assert!(busy.processing);
        assert_eq!(busy.count, 1);

        state.publish(result(3));
        assert!(!state.read().processing);

        state.begin_processing();
        state.end_processing();
        assert!(!state.read().processing);
    }
}
