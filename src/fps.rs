//! 起動からの累積平均FPSを計算するモジュール

use std::time::Instant;

/// 処理したフレーム数と計測開始時刻から累積平均FPSを求める構造体
///
/// 直近の区間だけのFPSが欲しい場合は、呼び出し側で窓を切ってください。
#[derive(Debug, Clone, Default)]
pub struct FrameRateEstimator {
    start: Option<Instant>,
    frame_count: u64,
}

impl FrameRateEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 現在時刻を計測開始時刻として記録します。すでに開始している場合は何もしません。
    pub fn start(&mut self) {
        self.start_at(Instant::now());
    }

    /// 指定した時刻を計測開始時刻として記録します。すでに開始している場合は何もしません。
    pub fn start_at(&mut self, t: Instant) {
        if self.start.is_none() {
            self.start = Some(t);
        }
    }

    /// フレーム数を1つ進めます。1フレームにつき1回だけ呼んでください。
    pub fn tick(&mut self) {
        self.frame_count = self.frame_count.saturating_add(1);
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// 現在時刻における累積平均FPSを返します。
    pub fn current_fps(&self) -> f64 {
        self.fps_at(Instant::now())
    }

    /// 指定した時刻における累積平均FPSを返します。
    ///
    /// # Args
    /// * `now` - 現在時刻
    ///
    /// # Return
    /// * `frame_count / 経過時間`。未開始または経過時間が0の場合は0
    pub fn fps_at(&self, now: Instant) -> f64 {
        let Some(start) = self.start else {
            return 0.0;
        };
        let elapsed = now.saturating_duration_since(start).as_secs_f64();
        if elapsed <= 0.0 {
            return 0.0;
        }
        self.frame_count as f64 / elapsed
    }
}
