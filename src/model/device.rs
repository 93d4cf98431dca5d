// 该文件是 Citodet （细胞检测） 项目的一部分。
// src/model/device.rs - 推理设备选择
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::fmt;

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Device {
  #[default]
  Cpu,
  Accelerator(usize),
}

impl Device {
  /// 有加速器时使用加速器，否则回退到 CPU；每个进程只调用一次
  pub fn select(force_cpu: bool) -> Self {
    if force_cpu {
      debug!("已强制使用 CPU");
      return Device::Cpu;
    }

    #[cfg(feature = "torch")]
    {
      if tch::Cuda::is_available() {
        debug!("检测到 CUDA 设备数量: {}", tch::Cuda::device_count());
        return Device::Accelerator(0);
      }
    }

    debug!("未检测到加速器，使用 CPU");
    Device::Cpu
  }

  pub fn is_accelerator(self) -> bool {
    matches!(self, Device::Accelerator(_))
  }
}

impl fmt::Display for Device {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Device::Cpu => f.write_str("cpu"),
      Device::Accelerator(ordinal) => write!(f, "cuda:{}", ordinal),
    }
  }
}

#[cfg(feature = "torch")]
impl From<Device> for tch::Device {
  fn from(device: Device) -> Self {
    match device {
      Device::Cpu => tch::Device::Cpu,
      Device::Accelerator(ordinal) => tch::Device::Cuda(ordinal),
    }
  }
}
