// 该文件是 rknn-yolo-post 项目的一部分。
// src/tensor.rs - 量化输出张量
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

use crate::quant::QuantParam;

/// 输出张量的逻辑形状 (grid_h, grid_w, anchors, channels)，NHWC 排布
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorShape {
  pub grid_h: usize,
  pub grid_w: usize,
  pub anchors: usize,
  pub channels: usize,
}

impl TensorShape {
  pub fn new(grid_h: usize, grid_w: usize, anchors: usize, channels: usize) -> Self {
    Self {
      grid_h,
      grid_w,
      anchors,
      channels,
    }
  }

  /// 元素总数，乘积溢出时为 None
  pub fn num_elements(&self) -> Option<usize> {
    self
      .grid_h
      .checked_mul(self.grid_w)?
      .checked_mul(self.anchors)?
      .checked_mul(self.channels)
  }
}

impl std::fmt::Display for TensorShape {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "[{}, {}, {}, {}]",
      self.grid_h, self.grid_w, self.anchors, self.channels
    )
  }
}

/// 加速器输出缓冲区的只读视图。
///
/// 缓冲区按字节保存，每个字节按 i8 解释。
#[derive(Debug, Clone, Copy)]
pub struct RawTensor<'a> {
  data: &'a [u8],
  shape: TensorShape,
  quant: QuantParam,
}

impl<'a> RawTensor<'a> {
  pub fn new(data: &'a [u8], shape: TensorShape, quant: QuantParam) -> Self {
    Self { data, shape, quant }
  }

  pub fn data(&self) -> &'a [u8] {
    self.data
  }

  pub fn shape(&self) -> TensorShape {
    self.shape
  }

  pub fn quant(&self) -> QuantParam {
    self.quant
  }

  /// 缓冲区实际声明的元素数量
  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }
}

/// 运行时返回的输出张量，拥有自己的缓冲区
#[derive(Debug, Clone)]
pub struct OutputTensor {
  data: Box<[u8]>,
  shape: TensorShape,
  quant: QuantParam,
}

impl OutputTensor {
  pub fn new(data: impl Into<Box<[u8]>>, shape: TensorShape, quant: QuantParam) -> Self {
    Self {
      data: data.into(),
      shape,
      quant,
    }
  }

  /// 由 i8 数据构造，便于测试和回放
  pub fn from_i8(data: &[i8], shape: TensorShape, quant: QuantParam) -> Self {
    let bytes: Box<[u8]> = data.iter().map(|&v| v as u8).collect();
    Self::new(bytes, shape, quant)
  }

  pub fn view(&self) -> RawTensor<'_> {
    RawTensor::new(&self.data, self.shape, self.quant)
  }

  pub fn shape(&self) -> TensorShape {
    self.shape
  }

  pub fn quant(&self) -> QuantParam {
    self.quant
  }
}
