//! GPU 同步机制模块
//!
//! Fence 是一个单调递增的计数器：CPU 提交工作后请求队列在该工作之后
//! signal 一个新值，然后阻塞等待 GPU 时间线推进到这个值。
//!
//! 等待没有超时，GPU 挂起即无法恢复。

use std::sync::{Arc, Condvar, Mutex};

use super::lock;

/// Fence 值
///
/// 用于 CPU-GPU 同步的单调递增值。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FenceValue(u64);

impl FenceValue {
    /// 创建新的 Fence 值
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// 获取内部值
    pub fn value(&self) -> u64 {
        self.0
    }

    /// 下一个 Fence 值
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

/// Fence
///
/// GPU 时间线线程调用 [`Fence::signal`]，CPU 调用 [`Fence::wait`]。
#[derive(Debug, Default)]
pub struct Fence {
    completed: Mutex<FenceValue>,
    signaled: Condvar,
}

impl Fence {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// GPU 已完成的值
    pub fn completed_value(&self) -> FenceValue {
        *lock(&self.completed)
    }

    /// 指定值是否已经完成
    pub fn is_completed(&self, value: FenceValue) -> bool {
        self.completed_value() >= value
    }

    /// 推进完成值并唤醒等待者
    ///
    /// 完成值不会回退。
    pub fn signal(&self, value: FenceValue) {
        let mut completed = lock(&self.completed);
        if value > *completed {
            *completed = value;
        }
        self.signaled.notify_all();
    }

    /// 阻塞直到完成值不小于 `value`
    pub fn wait(&self, value: FenceValue) {
        let mut completed = lock(&self.completed);
        while *completed < value {
            completed = self
                .signaled
                .wait(completed)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }
}
