//! 仿真时间类型
//!
//! 定义仿真时间及其单位转换。

/// 仿真时间（纳秒）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct SimTime(pub u64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0);

    pub fn from_micros(us: u64) -> SimTime {
        SimTime(us.saturating_mul(1_000))
    }

    pub fn from_millis(ms: u64) -> SimTime {
        SimTime(ms.saturating_mul(1_000_000))
    }

    pub fn from_secs(s: u64) -> SimTime {
        SimTime(s.saturating_mul(1_000_000_000))
    }

    /// 从浮点秒构造。配置层用秒表达时延；负值或 NaN 属于配置/编程错误，
    /// 必须立刻失败而不是悄悄截断。
    pub fn from_secs_f64(s: f64) -> SimTime {
        assert!(
            s.is_finite() && s >= 0.0,
            "SimTime::from_secs_f64: invalid duration {s}"
        );
        SimTime((s * 1e9).round() as u64)
    }

    /// 从浮点毫秒构造（配置层常用 ms）。
    pub fn from_millis_f64(ms: f64) -> SimTime {
        assert!(
            ms.is_finite() && ms >= 0.0,
            "SimTime::from_millis_f64: invalid duration {ms}"
        );
        SimTime((ms * 1e6).round() as u64)
    }

    /// 从浮点微秒构造。
    pub fn from_micros_f64(us: f64) -> SimTime {
        assert!(
            us.is_finite() && us >= 0.0,
            "SimTime::from_micros_f64: invalid duration {us}"
        );
        SimTime((us * 1e3).round() as u64)
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1e9
    }

    pub fn as_millis_f64(self) -> f64 {
        self.0 as f64 / 1e6
    }

    pub fn saturating_add(self, rhs: SimTime) -> SimTime {
        SimTime(self.0.saturating_add(rhs.0))
    }

    pub fn saturating_sub(self, rhs: SimTime) -> SimTime {
        SimTime(self.0.saturating_sub(rhs.0))
    }
}
