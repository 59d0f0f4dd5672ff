//! Explicit execution context passed to every inference call.

use std::fmt;

/// Device a model runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Device {
    /// CPU execution.
    #[default]
    Cpu,
    /// CUDA accelerator with the given device ordinal.
    Cuda(i32),
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda(id) => write!(f, "cuda:{}", id),
        }
    }
}

/// Where and how an inference call runs.
///
/// Two pipelines holding different contexts may share one backend; the
/// backend keeps whatever per-context state it needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExecutionContext {
    /// Target device.
    pub device: Device,
    /// Number of intra-op threads.
    pub intra_threads: usize,
}

impl ExecutionContext {
    /// CPU context with default threading.
    pub fn cpu() -> Self {
        Self::default()
    }

    /// CUDA context on the given device.
    pub fn cuda(device_id: i32) -> Self {
        Self {
            device: Device::Cuda(device_id),
            ..Self::default()
        }
    }

    /// Set the number of intra-op threads.
    pub fn with_intra_threads(mut self, threads: usize) -> Self {
        self.intra_threads = threads.max(1);
        self
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self {
            device: Device::Cpu,
            intra_threads: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_cpu() {
        let ctx = ExecutionContext::default();
        assert_eq!(ctx.device, Device::Cpu);
        assert_eq!(ctx.intra_threads, 4);
    }

    #[test]
    fn test_intra_threads_at_least_one() {
        let ctx = ExecutionContext::cuda(1).with_intra_threads(0);
        assert_eq!(ctx.device, Device::Cuda(1));
        assert_eq!(ctx.intra_threads, 1);
        assert_eq!(ctx.device.to_string(), "cuda:1");
    }
}
