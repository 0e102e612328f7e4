// 该文件是 rknn-yolo-post 项目的一部分。
// src/runtime.rs - 推理运行时接口
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

use serde::{Deserialize, Serialize};

use crate::tensor::OutputTensor;

/// 模型输入张量的尺寸，NHWC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputShape {
  pub width: u32,
  pub height: u32,
  pub channels: u32,
}

impl InputShape {
  pub fn num_bytes(&self) -> usize {
    self.width as usize * self.height as usize * self.channels as usize
  }
}

/// 加速器运行时。
///
/// 接收 NHWC u8 输入，返回每个检测尺度一个量化输出张量及其量化参数。
pub trait Runtime {
  type Error: std::error::Error + Send + Sync + 'static;

  fn input_shape(&self) -> InputShape;

  fn num_outputs(&self) -> usize;

  fn run(&self, input: &[u8]) -> Result<Vec<OutputTensor>, Self::Error>;
}

mod replay;
pub use self::replay::{ReplayError, ReplayRuntime};
