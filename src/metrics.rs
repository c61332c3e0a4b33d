/// 帧率统计 (Rolling FPS window)
///
/// 固定容量环形缓冲区,保存最近 30 帧的处理耗时 (秒),
/// FPS = 1 / 平均耗时,窗口为空或平均值为 0 时返回 0。
pub const WINDOW_SIZE: usize = 30;

#[derive(Clone, Debug)]
pub struct MetricsWindow {
    durations: [f64; WINDOW_SIZE],
    head: usize, // 最旧元素的位置
    len: usize,
}

impl Default for MetricsWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsWindow {
    pub fn new() -> Self {
        Self {
            durations: [0.0; WINDOW_SIZE],
            head: 0,
            len: 0,
        }
    }

    /// 追加一帧耗时,满窗时淘汰最旧的一项
    pub fn record_duration(&mut self, seconds: f64) {
        let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
        if self.len < WINDOW_SIZE {
            let tail = (self.head + self.len) % WINDOW_SIZE;
            self.durations[tail] = seconds;
            self.len += 1;
        } else {
            self.durations[self.head] = seconds;
            self.head = (self.head + 1) % WINDOW_SIZE;
        }
    }

    pub fn current_fps(&self) -> f64 {
        if self.len == 0 {
            return 0.0;
        }
        let mean = self.iter().sum::<f64>() / self.len as f64;
        if mean > 0.0 {
            1.0 / mean
        } else {
            0.0
        }
    }

    /// 按插入顺序 (旧 → 新) 遍历
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.len).map(move |i| self.durations[(self.head + i) % WINDOW_SIZE])
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }
}
