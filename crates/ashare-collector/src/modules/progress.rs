//! 배치 진행률 로그.

use std::time::{Duration, Instant};

use ashare_core::FetchRequest;

/// 진행률 추적 (이동 평균 기반 ETA).
///
/// 10건마다, 마지막 건에서, 또는 마지막 로그 후 1분이 지나면 로그를 출력합니다.
pub(crate) struct ProgressTracker {
    label: String,
    overall_start: Instant,
    recent_durations: Vec<Duration>,
    window_size: usize,
    last_log_time: Instant,
    last_completion: Instant,
    completed: usize,
    failed: usize,
    total: usize,
}

impl ProgressTracker {
    pub(crate) fn new(label: impl Into<String>, total: usize) -> Self {
        let now = Instant::now();
        Self {
            label: label.into(),
            overall_start: now,
            recent_durations: Vec::with_capacity(50),
            window_size: 50,
            last_log_time: now,
            last_completion: now,
            completed: 0,
            failed: 0,
            total,
        }
    }

    /// 완료 기록. 결과 간 간격으로 이동 평균을 갱신합니다.
    pub(crate) fn record_completion(&mut self, success: bool) {
        self.completed += 1;
        if !success {
            self.failed += 1;
        }

        let now = Instant::now();
        if self.recent_durations.len() >= self.window_size {
            self.recent_durations.remove(0);
        }
        self.recent_durations.push(now.duration_since(self.last_completion));
        self.last_completion = now;
    }

    fn estimated_remaining(&self) -> Option<Duration> {
        if self.recent_durations.is_empty() || self.completed == 0 {
            return None;
        }
        let avg: Duration =
            self.recent_durations.iter().sum::<Duration>() / self.recent_durations.len() as u32;
        let remaining = self.total.saturating_sub(self.completed);
        Some(avg * remaining as u32)
    }

    fn should_log(&self) -> bool {
        self.completed % 10 == 0
            || self.completed == self.total
            || self.last_log_time.elapsed() >= Duration::from_secs(60)
    }

    pub(crate) fn log_progress(&mut self, current: &FetchRequest) {
        if !self.should_log() {
            return;
        }
        self.last_log_time = Instant::now();

        let percent = if self.total > 0 {
            (self.completed * 100) / self.total
        } else {
            0
        };
        let eta = self
            .estimated_remaining()
            .map(format_duration)
            .unwrap_or_else(|| "계산 중".to_string());

        tracing::info!(
            "[{}] [{}/{}] ({}%) | 실패: {} | ETA: {} | 경과: {} | 현재: {}",
            self.label,
            self.completed,
            self.total,
            percent,
            self.failed,
            eta,
            format_duration(self.overall_start.elapsed()),
            current,
        );
    }
}

/// Duration을 사람이 읽기 쉬운 문자열로 변환.
pub(crate) fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}
